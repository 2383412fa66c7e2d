//! Fixpoint benchmarks: saturation versus naive iteration.
//!
//! Run with:
//! ```bash
//! cargo bench --bench saturation
//! ```

use criterion::{criterion_group, criterion_main, BenchmarkId, Criterion};
use ddd_rs::hom::StateHom;
use ddd_rs::manager::{Manager, ManagerConfig};
use ddd_rs::reference::{Ddd, Hom};
use ddd_rs::types::{Range, Val, Var};
use log::LevelFilter;
use simplelog::SimpleLogger;

// ============================================================================
// Helper: Towers of Hanoi (variable k = peg of disk k, smallest disk is 0)
// ============================================================================

const PEGS: Val = 3;

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
struct Clear {
    a: Val,
    b: Val,
}

impl StateHom<Ddd> for Clear {
    fn phi(&self, mgr: &Manager, var: Var, value: &Val) -> Hom {
        if *value == self.a || *value == self.b {
            mgr.constant(Ddd::NULL)
        } else {
            mgr.prefix(var, *value, mgr.state_hom(self.clone()))
        }
    }

    fn phi_one(&self, _mgr: &Manager) -> Ddd {
        Ddd::ONE
    }

    fn is_selector(&self) -> bool {
        true
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
struct Move {
    disk: Var,
    from: Val,
    to: Val,
    pass_through: bool,
}

impl StateHom<Ddd> for Move {
    fn phi(&self, mgr: &Manager, var: Var, value: &Val) -> Hom {
        if var > self.disk {
            return mgr.prefix(var, *value, mgr.state_hom(self.clone()));
        }
        if *value != self.from {
            return mgr.constant(Ddd::NULL);
        }
        mgr.prefix(var, self.to, mgr.state_hom(Clear { a: self.from, b: self.to }))
    }

    fn phi_one(&self, _mgr: &Manager) -> Ddd {
        Ddd::NULL
    }

    fn skip_variable(&self, var: Var) -> bool {
        self.pass_through && var > self.disk
    }

    fn range(&self) -> Range {
        Range::Vars((0..=self.disk).collect())
    }
}

/// Solve Hanoi reachability and return the reachable set.
fn solve_hanoi(mgr: &Manager, disks: Var, pass_through: bool) -> Ddd {
    let init: Vec<(Var, Val)> = (0..disks).rev().map(|k| (k, 0)).collect();
    let init = mgr.ddd_path(&init);

    let mut parts: Vec<Hom> = vec![mgr.identity()];
    for disk in 0..disks {
        for from in 0..PEGS {
            for to in (0..PEGS).filter(|&to| to != from) {
                parts.push(mgr.state_hom(Move {
                    disk,
                    from,
                    to,
                    pass_through,
                }));
            }
        }
    }
    let next = mgr.sum(parts);
    mgr.apply(mgr.fixpoint(next), init)
}

// ============================================================================
// Benchmark: saturation vs naive on growing puzzles
// ============================================================================

fn bench_hanoi(c: &mut Criterion) {
    let _ = SimpleLogger::init(LevelFilter::Warn, simplelog::Config::default());

    let mut group = c.benchmark_group("hom/hanoi");
    group.sample_size(10);

    for disks in [4, 6, 8] {
        group.bench_with_input(BenchmarkId::new("saturation", disks), &disks, |b, &disks| {
            b.iter(|| {
                let mgr = Manager::new();
                solve_hanoi(&mgr, disks, true)
            });
        });
        group.bench_with_input(BenchmarkId::new("naive", disks), &disks, |b, &disks| {
            b.iter(|| {
                let mgr = Manager::new();
                solve_hanoi(&mgr, disks, false)
            });
        });
    }

    group.finish();
}

// ============================================================================
// Benchmark: cache capacity under saturation
// ============================================================================

fn bench_cache_bits(c: &mut Criterion) {
    let mut group = c.benchmark_group("hom/hanoi_cache_bits");
    group.sample_size(10);

    let disks = 7;
    for cache_bits in [8, 12, 16] {
        group.bench_with_input(
            BenchmarkId::new(format!("disks={}", disks), format!("2^{}", cache_bits)),
            &cache_bits,
            |b, &cache_bits| {
                b.iter(|| {
                    let mgr = Manager::with_config(ManagerConfig::default().with_cache_bits(cache_bits));
                    let res = solve_hanoi(&mgr, disks, true);
                    (res, mgr.stats().hom_cache.hit_ratio())
                });
            },
        );
    }

    group.finish();
}

criterion_group!(benches, bench_hanoi, bench_cache_bits);
criterion_main!(benches);

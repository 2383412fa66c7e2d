//! Sharing one manager between threads.
//!
//! Run with:
//! ```bash
//! cargo test --features reentrant --test reentrant
//! ```

#![cfg(feature = "reentrant")]

use std::thread;

use ddd_rs::manager::Manager;
use ddd_rs::reference::Ddd;
use num_bigint::BigUint;

const THREADS: usize = 8;

fn build_paths(mgr: &Manager) -> Vec<Ddd> {
    (0..2000)
        .map(|i| mgr.ddd_path(&[(0, i % 17), (1, i % 5), (2, i)]))
        .collect()
}

// ─── Canonicity under contention ───────────────────────────────────────────────

#[test]
fn concurrent_construction_is_canonical() {
    let mgr = Manager::new();
    let results: Vec<Vec<Ddd>> = thread::scope(|s| {
        let workers: Vec<_> = (0..THREADS).map(|_| s.spawn(|| build_paths(&mgr))).collect();
        workers.into_iter().map(|w| w.join().unwrap()).collect()
    });

    for other in &results[1..] {
        assert_eq!(other, &results[0]);
    }
    assert_eq!(build_paths(&mgr), results[0]);
}

#[test]
fn concurrent_unions_agree() {
    let mgr = Manager::new();
    let results: Vec<Ddd> = thread::scope(|s| {
        let workers: Vec<_> = (0..THREADS)
            .map(|_| s.spawn(|| mgr.ddd_union_all(build_paths(&mgr))))
            .collect();
        workers.into_iter().map(|w| w.join().unwrap()).collect()
    });

    assert!(results.iter().all(|&u| u == results[0]));
    assert_eq!(mgr.ddd_nb_states(results[0]), BigUint::from(2000u32));
}

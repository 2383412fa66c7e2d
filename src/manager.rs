//! The manager: one context object owning every table.
//!
//! All diagrams and homomorphisms live in a [`Manager`]. It owns
//!
//! - the unique tables of flat ([`Ddd`]) and hierarchical ([`Sdd`]) nodes,
//! - the operation tables memoizing union, intersection, difference and
//!   concatenation instances,
//! - the homomorphism stores ([`Hom`], [`SHom`]) and their evaluation caches,
//! - the fixpoint interruption hook.
//!
//! Handles returned by the manager are plain ids. Wrap them in a [`Root`]
//! (see [`Manager::root`]) to keep them alive across [`Manager::garbage`].
//!
//! # Example
//!
//! ```
//! use ddd_rs::manager::Manager;
//! use ddd_rs::reference::Ddd;
//!
//! let mgr = Manager::new();
//! let a = mgr.ddd_path(&[(0, 1), (1, 2)]);
//! let b = mgr.ddd(0, 1, mgr.ddd(1, 2, Ddd::ONE));
//! assert_eq!(a, b);
//!
//! let root = mgr.root(a);
//! mgr.garbage();
//! assert_eq!(mgr.ddd_variable(*root), 0);
//! ```

use std::fmt;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};

use log::{debug, warn};

use crate::cache::{Cache, Op};
use crate::ddd::DddNode;
use crate::gc::GcStats;
use crate::hom::HomStore;
use crate::reference::{Ddd, Handle, Hom, Root, SHom, Sdd};
use crate::sdd::SddNode;
use crate::sync::Lock;
use crate::table::UniqueTable;
use crate::utils::rss_kb;

/// Slots reserved in node tables: `null`, `one`, `top`.
pub(crate) const NODE_PINNED: usize = 3;

/// Slots reserved in homomorphism tables: a single sentry.
pub(crate) const HOM_PINNED: usize = 1;

/// Manager configuration.
#[derive(Debug, Clone)]
pub struct ManagerConfig {
    /// Initial number of buckets (`2^table_bits`) of every unique table.
    pub table_bits: usize,
    /// Initial capacity (`2^cache_bits`) of every memo table.
    pub cache_bits: usize,
    /// Resident memory (KiB) above which [`Manager::should_garbage`] answers yes.
    pub gc_threshold_kb: Option<usize>,
    /// Largest table size above which [`Manager::should_garbage`] answers yes.
    pub table_threshold: Option<usize>,
}

impl Default for ManagerConfig {
    fn default() -> Self {
        Self {
            table_bits: 12,
            cache_bits: 12,
            gc_threshold_kb: None,
            table_threshold: None,
        }
    }
}

impl ManagerConfig {
    pub fn with_table_bits(mut self, bits: usize) -> Self {
        self.table_bits = bits;
        self
    }

    pub fn with_cache_bits(mut self, bits: usize) -> Self {
        self.cache_bits = bits;
        self
    }

    pub fn with_gc_threshold_kb(mut self, kb: usize) -> Self {
        self.gc_threshold_kb = Some(kb);
        self
    }

    pub fn with_table_threshold(mut self, size: usize) -> Self {
        self.table_threshold = Some(size);
        self
    }
}

/// Hook consulted at every iteration of a fixpoint loop.
///
/// Returning `true` stops the loop early: the last computed value is
/// returned, [`Manager::was_interrupted`] becomes `true`, and nothing computed
/// from that point on is cached.
pub trait FixObserver: Send + Sync {
    fn should_interrupt(&self, iteration: usize) -> bool;
}

impl<F> FixObserver for F
where
    F: Fn(usize) -> bool + Send + Sync,
{
    fn should_interrupt(&self, iteration: usize) -> bool {
        self(iteration)
    }
}

pub struct Manager {
    config: ManagerConfig,

    pub(crate) ddds: Lock<UniqueTable<DddNode>>,
    pub(crate) sdds: Lock<UniqueTable<SddNode>>,

    pub(crate) ddd_ops: Lock<Cache<Op<Ddd>, Ddd>>,
    pub(crate) sdd_ops: Lock<Cache<Op<Sdd>, Sdd>>,

    pub(crate) homs: HomStore<Ddd>,
    pub(crate) shoms: HomStore<Sdd>,

    pub(crate) hom_cache: Lock<Cache<(Hom, Ddd), Ddd>>,
    pub(crate) shom_cache: Lock<Cache<(SHom, Sdd), Sdd>>,

    observer: Lock<Option<Box<dyn FixObserver>>>,
    interrupted: AtomicBool,
    /// Depth of running `apply` calls.
    evaluating: AtomicUsize,
    table_threshold: AtomicUsize,
}

impl Manager {
    pub fn new() -> Self {
        Self::with_config(ManagerConfig::default())
    }

    pub fn with_config(config: ManagerConfig) -> Self {
        let bits = config.table_bits;
        let cache_bits = config.cache_bits;
        let table_threshold = config.table_threshold.unwrap_or(usize::MAX);

        Self {
            ddds: Lock::new(UniqueTable::new(bits, NODE_PINNED)),
            sdds: Lock::new(UniqueTable::new(bits, NODE_PINNED)),
            ddd_ops: Lock::new(Cache::new(cache_bits)),
            sdd_ops: Lock::new(Cache::new(cache_bits)),
            homs: HomStore::new(bits),
            shoms: HomStore::new(bits),
            hom_cache: Lock::new(Cache::new(cache_bits)),
            shom_cache: Lock::new(Cache::new(cache_bits)),
            observer: Lock::new(None),
            interrupted: AtomicBool::new(false),
            evaluating: AtomicUsize::new(0),
            table_threshold: AtomicUsize::new(table_threshold),
            config,
        }
    }

    pub fn config(&self) -> &ManagerConfig {
        &self.config
    }
}

impl Default for Manager {
    fn default() -> Self {
        Manager::new()
    }
}

impl fmt::Debug for Manager {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Manager")
            .field("ddds", &self.ddds.read().len())
            .field("sdds", &self.sdds.read().len())
            .field("homs", &self.homs.len())
            .field("shoms", &self.shoms.len())
            .finish()
    }
}

// ---- roots ---------------------------------------------------------------

impl Manager {
    /// Wrap a handle into a reference-counted [`Root`].
    pub fn root<H>(&self, handle: H) -> Root<'_, H>
    where
        H: Copy + Into<Handle>,
    {
        Root::new(self, handle)
    }

    pub(crate) fn protect(&self, handle: Handle) {
        match handle {
            Handle::Ddd(d) => self.ddds.write().inc_ref(d.raw()),
            Handle::Sdd(s) => self.sdds.write().inc_ref(s.raw()),
            Handle::Hom(h) => self.homs.table.write().inc_ref(h.raw()),
            Handle::SHom(h) => self.shoms.table.write().inc_ref(h.raw()),
        }
    }

    pub(crate) fn unprotect(&self, handle: Handle) {
        match handle {
            Handle::Ddd(d) => self.ddds.write().dec_ref(d.raw()),
            Handle::Sdd(s) => self.sdds.write().dec_ref(s.raw()),
            Handle::Hom(h) => self.homs.table.write().dec_ref(h.raw()),
            Handle::SHom(h) => self.shoms.table.write().dec_ref(h.raw()),
        }
    }

    /// External reference count of an object. Terminals report `0`.
    pub fn ref_count(&self, handle: impl Into<Handle>) -> u32 {
        match handle.into() {
            Handle::Ddd(d) => self.ddds.read().ref_count(d.raw()),
            Handle::Sdd(s) => self.sdds.read().ref_count(s.raw()),
            Handle::Hom(h) => self.homs.table.read().ref_count(h.raw()),
            Handle::SHom(h) => self.shoms.table.read().ref_count(h.raw()),
        }
    }

    /// Check whether a handle still designates a live object.
    ///
    /// Terminals are always live.
    pub fn is_live(&self, handle: impl Into<Handle>) -> bool {
        match handle.into() {
            Handle::Ddd(d) => d.is_terminal() || self.ddds.read().is_occupied(d.raw()),
            Handle::Sdd(s) => s.is_terminal() || self.sdds.read().is_occupied(s.raw()),
            Handle::Hom(h) => self.homs.table.read().is_occupied(h.raw()),
            Handle::SHom(h) => self.shoms.table.read().is_occupied(h.raw()),
        }
    }
}

// ---- interruption --------------------------------------------------------

impl Manager {
    /// Install the hook consulted by fixpoint loops.
    pub fn set_observer(&self, observer: impl FixObserver + 'static) {
        *self.observer.write() = Some(Box::new(observer));
    }

    pub fn clear_observer(&self) {
        *self.observer.write() = None;
    }

    /// `true` if a fixpoint loop was stopped early during the last outermost
    /// evaluation (or since [`clear_interrupted`](Manager::clear_interrupted)).
    pub fn was_interrupted(&self) -> bool {
        self.interrupted.load(Ordering::SeqCst)
    }

    pub fn clear_interrupted(&self) {
        self.interrupted.store(false, Ordering::SeqCst);
    }

    /// Ask the observer whether the current fixpoint loop must stop.
    ///
    /// Only the observer decides. The flag it raises keeps the results of the
    /// current evaluation out of the cache.
    pub(crate) fn check_interrupt(&self, iteration: usize) -> bool {
        let stop = match self.observer.read().as_ref() {
            Some(observer) => observer.should_interrupt(iteration),
            None => false,
        };
        if stop {
            warn!("fixpoint interrupted at iteration {}", iteration);
            self.interrupted.store(true, Ordering::SeqCst);
        }
        stop
    }

    pub(crate) fn enter_eval(&self) -> EvalGuard<'_> {
        self.evaluating.fetch_add(1, Ordering::SeqCst);
        EvalGuard { mgr: self }
    }

    /// `true` while some `apply` is running.
    pub fn is_evaluating(&self) -> bool {
        self.evaluating.load(Ordering::SeqCst) > 0
    }
}

/// Tracks a running evaluation, so that the collector can refuse to run under it.
pub(crate) struct EvalGuard<'m> {
    mgr: &'m Manager,
}

impl Drop for EvalGuard<'_> {
    fn drop(&mut self) {
        self.mgr.evaluating.fetch_sub(1, Ordering::SeqCst);
    }
}

// ---- collection policy ---------------------------------------------------

impl Manager {
    /// Size of the largest unique table.
    pub fn largest_table(&self) -> usize {
        [
            self.ddds.read().len(),
            self.sdds.read().len(),
            self.homs.len(),
            self.shoms.len(),
        ]
        .into_iter()
        .max()
        .unwrap_or(0)
    }

    /// Memory heuristic: `true` if a collection is advisable now.
    pub fn should_garbage(&self) -> bool {
        if self.largest_table() > self.table_threshold.load(Ordering::Relaxed) {
            return true;
        }
        match (self.config.gc_threshold_kb, rss_kb()) {
            (Some(limit), Some(rss)) => rss > limit,
            _ => false,
        }
    }

    /// Collect if [`should_garbage`](Manager::should_garbage) says so.
    ///
    /// Call it at safe points only, never from inside a homomorphism. If the
    /// collection could not bring the largest table under the size threshold,
    /// the threshold is doubled.
    pub fn maybe_garbage(&self) -> Option<GcStats> {
        if !self.should_garbage() {
            return None;
        }
        let stats = self.garbage();
        let threshold = self.table_threshold.load(Ordering::Relaxed);
        if threshold != usize::MAX && self.largest_table() > threshold {
            let doubled = threshold.saturating_mul(2);
            warn!("collection left {} entries, raising table threshold to {}", self.largest_table(), doubled);
            self.table_threshold.store(doubled, Ordering::Relaxed);
        }
        Some(stats)
    }

    /// Current size threshold used by [`should_garbage`](Manager::should_garbage).
    pub fn table_threshold(&self) -> Option<usize> {
        match self.table_threshold.load(Ordering::Relaxed) {
            usize::MAX => None,
            t => Some(t),
        }
    }
}

// ---- statistics ----------------------------------------------------------

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct TableStats {
    pub live: usize,
    pub peak: usize,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CacheStats {
    pub len: usize,
    pub hits: usize,
    pub misses: usize,
}

impl CacheStats {
    fn of<K, V>(cache: &Cache<K, V>) -> Self {
        Self {
            len: cache.len(),
            hits: cache.hits(),
            misses: cache.misses(),
        }
    }

    pub fn hit_ratio(&self) -> f64 {
        let total = self.hits + self.misses;
        if total == 0 {
            0.0
        } else {
            self.hits as f64 / total as f64
        }
    }
}

/// Sizes of every table and cache of a [`Manager`].
#[derive(Debug, Clone, Copy, Default)]
pub struct Stats {
    pub ddd: TableStats,
    pub sdd: TableStats,
    pub hom: TableStats,
    pub shom: TableStats,
    pub ddd_ops: CacheStats,
    pub sdd_ops: CacheStats,
    pub hom_cache: CacheStats,
    pub shom_cache: CacheStats,
}

impl fmt::Display for Stats {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let tables = [("ddd", self.ddd), ("sdd", self.sdd), ("hom", self.hom), ("shom", self.shom)];
        for (name, t) in tables {
            writeln!(f, "{:<10} live={:<8} peak={}", name, t.live, t.peak)?;
        }
        let caches = [
            ("ddd_ops", self.ddd_ops),
            ("sdd_ops", self.sdd_ops),
            ("hom_cache", self.hom_cache),
            ("shom_cache", self.shom_cache),
        ];
        for (name, c) in caches {
            writeln!(
                f,
                "{:<10} len={:<9} hits={:<8} misses={:<8} ratio={:.2}",
                name,
                c.len,
                c.hits,
                c.misses,
                c.hit_ratio()
            )?;
        }
        Ok(())
    }
}

impl Manager {
    pub fn stats(&self) -> Stats {
        let stats = Stats {
            ddd: {
                let t = self.ddds.read();
                TableStats { live: t.len(), peak: t.peak() }
            },
            sdd: {
                let t = self.sdds.read();
                TableStats { live: t.len(), peak: t.peak() }
            },
            hom: self.homs.stats(),
            shom: self.shoms.stats(),
            ddd_ops: CacheStats::of(&self.ddd_ops.read()),
            sdd_ops: CacheStats::of(&self.sdd_ops.read()),
            hom_cache: CacheStats::of(&self.hom_cache.read()),
            shom_cache: CacheStats::of(&self.shom_cache.read()),
        };
        debug!("stats: ddd={} sdd={} hom={} shom={}", stats.ddd.live, stats.sdd.live, stats.hom.live, stats.shom.live);
        stats
    }
}

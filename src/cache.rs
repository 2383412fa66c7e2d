//! Memo tables.
//!
//! [`Cache`] backs both the operation tables (union, intersection, difference
//! and concatenation instances, keyed by [`Op`]) and the evaluation caches of
//! homomorphisms (keyed by `(hom, node)`).
//!
//! Entries are never roots: the collector clears every cache before marking.
//! A key holds at most one result; inserting a different result for a key
//! already present is a determinism violation and panics.

use std::collections::HashMap;
use std::fmt;
use std::hash::Hash;
use std::sync::atomic::{AtomicUsize, Ordering};

/// An operation instance: opcode plus canonical operands.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Op<N> {
    /// N-ary union, operands sorted and deduplicated.
    Union(Box<[N]>),
    /// Binary intersection, operands ordered.
    Intersection(N, N),
    Difference(N, N),
    Concat(N, N),
}

impl<N: fmt::Display> fmt::Display for Op<N> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Op::Union(xs) => {
                write!(f, "(")?;
                for (i, x) in xs.iter().enumerate() {
                    if i > 0 {
                        write!(f, " + ")?;
                    }
                    write!(f, "{}", x)?;
                }
                write!(f, ")")
            }
            Op::Intersection(a, b) => write!(f, "({} * {})", a, b),
            Op::Difference(a, b) => write!(f, "({} - {})", a, b),
            Op::Concat(a, b) => write!(f, "({} ^ {})", a, b),
        }
    }
}

/// A cache backed by [HashMap], with hit/miss counters.
///
/// Counters are atomic so that lookups only need shared access.
pub struct Cache<K, V> {
    map: HashMap<K, V>,
    hits: AtomicUsize,
    misses: AtomicUsize,
}

impl<K, V> Default for Cache<K, V> {
    fn default() -> Self {
        Self::new(10)
    }
}

impl<K, V> Cache<K, V> {
    /// Creates a new cache with room for `2^bits` entries before the first resize.
    pub fn new(bits: usize) -> Self {
        Self {
            map: HashMap::with_capacity(1 << bits),
            hits: AtomicUsize::new(0),
            misses: AtomicUsize::new(0),
        }
    }

    /// Returns the number of entries in the cache.
    pub fn len(&self) -> usize {
        self.map.len()
    }

    /// Returns true if the cache is empty.
    pub fn is_empty(&self) -> bool {
        self.map.is_empty()
    }

    /// Returns the number of cache hits.
    pub fn hits(&self) -> usize {
        self.hits.load(Ordering::Relaxed)
    }

    /// Returns the number of cache misses.
    pub fn misses(&self) -> usize {
        self.misses.load(Ordering::Relaxed)
    }

    /// Clears all entries from the cache. Counters are kept.
    pub fn clear(&mut self) {
        self.map.clear();
    }
}

impl<K, V> Cache<K, V>
where
    K: Hash + Eq + fmt::Debug,
    V: Copy + Eq + fmt::Debug,
{
    /// Looks up a key in the cache.
    #[inline]
    pub fn get(&self, key: &K) -> Option<V> {
        match self.map.get(key) {
            Some(&v) => {
                self.hits.fetch_add(1, Ordering::Relaxed);
                Some(v)
            }
            None => {
                self.misses.fetch_add(1, Ordering::Relaxed);
                None
            }
        }
    }

    /// Inserts a result. Re-inserting the same result is a no-op.
    ///
    /// # Panics
    ///
    /// If `key` already maps to a different value.
    pub fn insert(&mut self, key: K, value: V) {
        if let Some(&old) = self.map.get(&key) {
            if old != value {
                panic!("Conflicting cache entry for {:?}: {:?} != {:?}", key, old, value);
            }
            return;
        }
        self.map.insert(key, value);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cache_basic() {
        let mut cache = Cache::<(u64, u64), i32>::new(4);

        cache.insert((1, 2), 42);
        cache.insert((3, 4), 99);

        assert_eq!(cache.get(&(1, 2)), Some(42));
        assert_eq!(cache.get(&(3, 4)), Some(99));
        assert_eq!(cache.get(&(5, 6)), None);

        assert_eq!(cache.hits(), 2);
        assert_eq!(cache.misses(), 1);
    }

    #[test]
    fn test_cache_clear() {
        let mut cache = Cache::<(u64, u64), i32>::new(4);

        cache.insert((1, 2), 42);
        assert_eq!(cache.get(&(1, 2)), Some(42));

        cache.clear();
        assert_eq!(cache.get(&(1, 2)), None);
        assert!(cache.is_empty());
        assert_eq!(cache.hits(), 1);
    }

    #[test]
    fn test_cache_same_insert_twice() {
        let mut cache = Cache::<u32, u32>::new(2);
        cache.insert(7, 1);
        cache.insert(7, 1);
        assert_eq!(cache.len(), 1);
    }

    #[test]
    #[should_panic(expected = "Conflicting cache entry")]
    fn test_cache_conflicting_insert() {
        let mut cache = Cache::<u32, u32>::new(2);
        cache.insert(7, 1);
        cache.insert(7, 2);
    }

    #[test]
    fn test_op_display() {
        let op: Op<u32> = Op::Union(vec![1, 2, 3].into_boxed_slice());
        assert_eq!(op.to_string(), "(1 + 2 + 3)");
        assert_eq!(Op::Difference(4u32, 5).to_string(), "(4 - 5)");
    }
}

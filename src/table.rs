//! Canonicalization arena.
//!
//! A [`UniqueTable`] maps a structural value to the single slot holding it.
//! Slots are small integers (the handles of [`reference`](crate::reference)).
//! Removed slots go to a free list and are recycled.
//!
//! The first `pinned` slots are reserved: they hold no value, are never
//! looked up, never counted and never swept. Node tables pin their three
//! terminals there; homomorphism tables pin a single sentry slot.
//!
//! Next to the values the table keeps two side tables used by the collector:
//! the external reference counts (roots) and the mark bits.

use std::hash::Hash;

use crate::utils::hash_of;

struct Entry<T> {
    value: Option<T>,
    hash: u64,
    /// Next slot in the same bucket, `0` terminates the chain.
    next: u32,
}

impl<T> Entry<T> {
    fn vacant() -> Self {
        Self {
            value: None,
            hash: 0,
            next: 0,
        }
    }
}

pub struct UniqueTable<T> {
    data: Vec<Entry<T>>,
    refs: Vec<u32>,
    marks: Vec<bool>,
    free: Vec<u32>,

    buckets: Vec<u32>,
    bitmask: u64,

    /// Number of reserved leading slots.
    pinned: usize,
    /// Number of occupied non-pinned slots.
    live: usize,
    /// Largest `live` observed at a collection.
    peak: usize,
}

impl<T> UniqueTable<T> {
    /// Create a new table with `2^bits` buckets and `pinned` reserved slots.
    pub fn new(bits: usize, pinned: usize) -> Self {
        assert!(bits <= 31, "Table bits should be in the range 0..=31");
        assert!(pinned >= 1, "Slot 0 must be reserved");

        let buckets_size = 1usize << bits;
        let mut data = Vec::with_capacity(pinned);
        data.resize_with(pinned, Entry::vacant);

        Self {
            data,
            refs: vec![0; pinned],
            marks: vec![false; pinned],
            free: Vec::new(),
            buckets: vec![0; buckets_size],
            bitmask: (buckets_size - 1) as u64,
            pinned,
            live: 0,
            peak: 0,
        }
    }

    /// Number of live (non-pinned) entries.
    pub fn len(&self) -> usize {
        self.live
    }

    pub fn is_empty(&self) -> bool {
        self.live == 0
    }

    /// Largest size observed right before a sweep, or the current size if larger.
    pub fn peak(&self) -> usize {
        self.peak.max(self.live)
    }

    pub fn bucket_count(&self) -> usize {
        self.buckets.len()
    }

    pub fn is_pinned(&self, index: u32) -> bool {
        (index as usize) < self.pinned
    }

    /// Check if the slot at the given index currently holds a value.
    pub fn is_occupied(&self, index: u32) -> bool {
        self.data.get(index as usize).is_some_and(|e| e.value.is_some())
    }

    /// Get the reference to the value at the given index.
    pub fn get(&self, index: u32) -> &T {
        match self.data.get(index as usize).and_then(|e| e.value.as_ref()) {
            Some(value) => value,
            None => panic!("Slot {} is not occupied (released handle?)", index),
        }
    }

    /// Iterate over live `(slot, value)` pairs.
    pub fn iter(&self) -> impl Iterator<Item = (u32, &T)> + '_ {
        self.data
            .iter()
            .enumerate()
            .skip(self.pinned)
            .filter_map(|(i, e)| e.value.as_ref().map(|v| (i as u32, v)))
    }

    fn bucket_of(&self, hash: u64) -> usize {
        (hash & self.bitmask) as usize
    }

    fn link(&mut self, index: u32) {
        let b = self.bucket_of(self.data[index as usize].hash);
        self.data[index as usize].next = self.buckets[b];
        self.buckets[b] = index;
    }

    /// Rebuild every chain from the stored hashes.
    fn rehash(&mut self, buckets_size: usize) {
        self.buckets = vec![0; buckets_size];
        self.bitmask = (buckets_size - 1) as u64;
        for i in self.pinned..self.data.len() {
            if self.data[i].value.is_some() {
                self.link(i as u32);
            }
        }
    }

    fn alloc(&mut self) -> u32 {
        if let Some(index) = self.free.pop() {
            return index;
        }
        let index = self.data.len();
        if index > u32::MAX as usize {
            panic!("Table is full");
        }
        self.data.push(Entry::vacant());
        self.refs.push(0);
        self.marks.push(false);
        index as u32
    }

    // ---- roots -----------------------------------------------------------

    /// Increment the external reference count of a slot. Pinned slots are not counted.
    pub fn inc_ref(&mut self, index: u32) {
        if self.is_pinned(index) {
            return;
        }
        assert!(self.is_occupied(index), "Cannot protect released slot {}", index);
        self.refs[index as usize] += 1;
    }

    /// Decrement the external reference count of a slot.
    pub fn dec_ref(&mut self, index: u32) {
        if self.is_pinned(index) {
            return;
        }
        let count = &mut self.refs[index as usize];
        assert!(*count > 0, "Unbalanced release of slot {}", index);
        *count -= 1;
    }

    pub fn ref_count(&self, index: u32) -> u32 {
        self.refs.get(index as usize).copied().unwrap_or(0)
    }

    /// Slots with a non-zero external reference count.
    pub fn roots(&self) -> Vec<u32> {
        self.refs
            .iter()
            .enumerate()
            .filter(|&(_, &c)| c > 0)
            .map(|(i, _)| i as u32)
            .collect()
    }

    // ---- mark & sweep ----------------------------------------------------

    /// Mark a slot. Returns `true` if it was not marked before.
    ///
    /// Pinned slots are never marked, they always survive.
    pub fn mark(&mut self, index: u32) -> bool {
        if self.is_pinned(index) {
            return false;
        }
        let i = index as usize;
        assert!(self.data[i].value.is_some(), "Marking released slot {}", index);
        if self.marks[i] {
            return false;
        }
        self.marks[i] = true;
        true
    }

    pub fn is_marked(&self, index: u32) -> bool {
        self.marks.get(index as usize).copied().unwrap_or(false)
    }

    pub fn update_peak(&mut self) {
        self.peak = self.peak.max(self.live);
    }

    /// Release every unmarked slot, reset the marks, return the number of released slots.
    pub fn sweep(&mut self) -> usize {
        let mut removed = 0;
        for i in self.pinned..self.data.len() {
            if self.data[i].value.is_some() && !self.marks[i] {
                assert_eq!(self.refs[i], 0, "Sweeping rooted slot {}", i);
                self.data[i] = Entry::vacant();
                self.free.push(i as u32);
                removed += 1;
            }
            self.marks[i] = false;
        }
        self.live -= removed;

        // Recycle lower slots first.
        self.free.sort_unstable_by(|a, b| b.cmp(a));
        self.rehash(self.buckets.len());
        removed
    }
}

impl<T> UniqueTable<T>
where
    T: Hash + Eq,
{
    fn find(&self, value: &T, hash: u64) -> Option<u32> {
        let mut index = self.buckets[self.bucket_of(hash)];
        while index != 0 {
            let entry = &self.data[index as usize];
            if entry.hash == hash && entry.value.as_ref() == Some(value) {
                return Some(index);
            }
            index = entry.next;
        }
        None
    }

    /// Look up the slot holding a value structurally equal to `value`.
    pub fn lookup(&self, value: &T) -> Option<u32> {
        self.find(value, hash_of(value))
    }

    /// Return the slot of `value`, inserting it if absent.
    pub fn put(&mut self, value: T) -> u32 {
        let hash = hash_of(&value);
        if let Some(index) = self.find(&value, hash) {
            return index;
        }

        let index = self.alloc();
        self.data[index as usize] = Entry {
            value: Some(value),
            hash,
            next: 0,
        };
        self.link(index);
        self.live += 1;

        if self.live > 2 * self.buckets.len() {
            self.rehash(2 * self.buckets.len());
        }

        index
    }
}

use std::collections::hash_map::DefaultHasher;
use std::hash::{Hash, Hasher};

/// Structural hash of a value, used to pick a bucket in the unique tables.
pub fn hash_of<T: Hash + ?Sized>(value: &T) -> u64 {
    let mut hasher = DefaultHasher::new();
    value.hash(&mut hasher);
    hasher.finish()
}

/// Resident set size of the current process, in KiB.
///
/// Returns `None` where `/proc/self/statm` is unavailable.
pub fn rss_kb() -> Option<usize> {
    let statm = std::fs::read_to_string("/proc/self/statm").ok()?;
    parse_statm_rss(&statm).map(|pages| pages * 4)
}

/// Second field of `/proc/self/statm`: resident pages.
fn parse_statm_rss(statm: &str) -> Option<usize> {
    statm.split_whitespace().nth(1)?.parse().ok()
}

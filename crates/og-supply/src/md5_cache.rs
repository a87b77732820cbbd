//! Content-MD5 by size
//!
//! Write bodies of a given size carry the MD5 of the fixed zero pattern of
//! that size. Digests are cached per supplier with a small LRU so repeated
//! sizes do not re-hash.

use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine;
use md5::{Digest, Md5};
use std::collections::HashMap;

/// Default cache capacity
pub const DEFAULT_CAPACITY: usize = 100;

/// LRU cache of base64 Content-MD5 values keyed by body size
#[derive(Debug)]
pub struct Md5Cache {
    entries: HashMap<u64, CacheEntry>,
    capacity: usize,
    /// Monotonic access clock for LRU eviction
    clock: u64,
}

#[derive(Debug)]
struct CacheEntry {
    digest: String,
    last_access: u64,
}

impl Md5Cache {
    pub fn new() -> Self {
        Self::with_capacity(DEFAULT_CAPACITY)
    }

    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            entries: HashMap::with_capacity(capacity.min(64)),
            capacity: capacity.max(1),
            clock: 0,
        }
    }

    /// The base64 MD5 of `size` zero bytes
    pub fn get(&mut self, size: u64) -> String {
        self.clock += 1;
        let clock = self.clock;
        if let Some(entry) = self.entries.get_mut(&size) {
            entry.last_access = clock;
            return entry.digest.clone();
        }

        let digest = md5_of_zeroes(size);
        if self.entries.len() >= self.capacity {
            self.evict_oldest();
        }
        self.entries.insert(
            size,
            CacheEntry {
                digest: digest.clone(),
                last_access: clock,
            },
        );
        digest
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    fn evict_oldest(&mut self) {
        if let Some(key) = self
            .entries
            .iter()
            .min_by_key(|(_, entry)| entry.last_access)
            .map(|(key, _)| *key)
        {
            self.entries.remove(&key);
        }
    }
}

impl Default for Md5Cache {
    fn default() -> Self {
        Self::new()
    }
}

fn md5_of_zeroes(size: u64) -> String {
    let mut hasher = Md5::new();
    let chunk = [0u8; 8192];
    let mut remaining = size;
    while remaining > 0 {
        let take = remaining.min(chunk.len() as u64) as usize;
        hasher.update(&chunk[..take]);
        remaining -= take as u64;
    }
    BASE64.encode(hasher.finalize())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_known_digests() {
        let mut cache = Md5Cache::new();
        // MD5 of the empty input
        assert_eq!(cache.get(0), "1B2M2Y8AsgTpgAmY7PhCfg==");
        // MD5 of a single zero byte
        assert_eq!(cache.get(1), "k7iFrf4NoInN9jSQT9WfcQ==");
    }

    #[test]
    fn test_cache_hit_is_stable() {
        let mut cache = Md5Cache::new();
        let first = cache.get(4096);
        let second = cache.get(4096);
        assert_eq!(first, second);
        assert_eq!(cache.len(), 1);
    }

    #[test]
    fn test_lru_eviction() {
        let mut cache = Md5Cache::with_capacity(2);
        cache.get(1);
        cache.get(2);
        // Touch 1 so 2 becomes the eviction victim
        cache.get(1);
        cache.get(3);
        assert_eq!(cache.len(), 2);
        assert!(cache.entries.contains_key(&1));
        assert!(cache.entries.contains_key(&3));
        assert!(!cache.entries.contains_key(&2));
    }
}

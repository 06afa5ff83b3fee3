//! Content-addressed memoization of loaded sources.
//!
//! Re-uploading an unchanged workbook is the common case in a session;
//! keying parsed results by the SHA-256 of the raw bytes makes that a map
//! lookup instead of a re-parse, and a changed file misses naturally.

use crate::error::Result;
use log::debug;
use sha2::{Digest, Sha256};
use std::collections::HashMap;

/// Hex digest of the raw source bytes.
pub fn content_hash(bytes: &[u8]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(bytes);
    hex::encode(hasher.finalize())
}

/// Memoizes one parsed source type by content hash.
#[derive(Debug, Default)]
pub struct SourceCache<T: Clone> {
    entries: HashMap<String, T>,
}

impl<T: Clone> SourceCache<T> {
    pub fn new() -> Self {
        SourceCache {
            entries: HashMap::new(),
        }
    }

    /// Returns the cached value for these bytes, loading and storing it on a
    /// miss. A load error is returned as-is and caches nothing.
    pub fn get_or_load(
        &mut self,
        bytes: &[u8],
        load: impl FnOnce(&[u8]) -> Result<T>,
    ) -> Result<T> {
        let key = content_hash(bytes);
        if let Some(cached) = self.entries.get(&key) {
            debug!("source cache hit for {}", &key[..12]);
            return Ok(cached.clone());
        }
        let value = load(bytes)?;
        self.entries.insert(key, value.clone());
        Ok(value)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::DashboardError;
    use std::cell::Cell;

    #[test]
    fn test_content_hash_is_stable_and_distinguishes_input() {
        let a = content_hash(b"hello");
        assert_eq!(a, content_hash(b"hello"));
        assert_ne!(a, content_hash(b"hello "));
        assert_eq!(a.len(), 64);
    }

    #[test]
    fn test_cache_loads_once_per_content() {
        let calls = Cell::new(0);
        let mut cache: SourceCache<usize> = SourceCache::new();

        let load = |bytes: &[u8]| {
            calls.set(calls.get() + 1);
            Ok(bytes.len())
        };

        assert_eq!(cache.get_or_load(b"abc", load).unwrap(), 3);
        assert_eq!(cache.get_or_load(b"abc", load).unwrap(), 3);
        assert_eq!(calls.get(), 1);

        assert_eq!(cache.get_or_load(b"abcd", load).unwrap(), 4);
        assert_eq!(calls.get(), 2);
        assert_eq!(cache.len(), 2);
    }

    #[test]
    fn test_cache_does_not_store_failures() {
        let mut cache: SourceCache<usize> = SourceCache::new();

        let err = cache
            .get_or_load(b"bad", |_| Err(DashboardError::EmptyRoster))
            .unwrap_err();
        assert!(matches!(err, DashboardError::EmptyRoster));
        assert!(cache.is_empty());

        assert_eq!(cache.get_or_load(b"bad", |b| Ok(b.len())).unwrap(), 3);
        assert_eq!(cache.len(), 1);
    }
}

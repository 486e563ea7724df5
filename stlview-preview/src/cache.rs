//! TTL-bounded preview cache
//!
//! Wraps an injected key/value byte store with entry timestamps and lazy
//! expiry. The cache is a pure optimization: every storage failure is
//! downgraded to a logged warning and the caller sees a miss, never an
//! error.

use crate::key::CacheKey;
use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::{Duration, SystemTime, UNIX_EPOCH};
use stlview_core::Result;

/// Entries older than this are treated as absent
pub const DEFAULT_TTL: Duration = Duration::from_secs(7 * 24 * 60 * 60);

/// A fallible key/value byte store the cache is layered on.
///
/// Implementations may be in-process maps, disk directories or remote
/// stores; the cache treats them all as size-limited and unreliable.
pub trait CacheStore: Send + Sync {
    fn get(&self, key: &str) -> Result<Option<Vec<u8>>>;
    fn set(&self, key: &str, value: &[u8]) -> Result<()>;
    fn delete(&self, key: &str) -> Result<()>;
    fn list_keys(&self, prefix: &str) -> Result<Vec<String>>;
}

/// An in-process store backed by a shared map
#[derive(Debug, Clone, Default)]
pub struct MemoryStore {
    entries: Arc<Mutex<HashMap<String, Vec<u8>>>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

impl CacheStore for MemoryStore {
    fn get(&self, key: &str) -> Result<Option<Vec<u8>>> {
        Ok(self.entries.lock().unwrap().get(key).cloned())
    }

    fn set(&self, key: &str, value: &[u8]) -> Result<()> {
        self.entries
            .lock()
            .unwrap()
            .insert(key.to_string(), value.to_vec());
        Ok(())
    }

    fn delete(&self, key: &str) -> Result<()> {
        self.entries.lock().unwrap().remove(key);
        Ok(())
    }

    fn list_keys(&self, prefix: &str) -> Result<Vec<String>> {
        Ok(self
            .entries
            .lock()
            .unwrap()
            .keys()
            .filter(|k| k.starts_with(prefix))
            .cloned()
            .collect())
    }
}

/// One stored preview: creation timestamp plus encoded image
#[derive(Debug, Clone, PartialEq)]
pub struct CacheEntry {
    pub created_at_ms: u64,
    pub image: Vec<u8>,
}

impl CacheEntry {
    fn encode(&self) -> Vec<u8> {
        let mut out = Vec::with_capacity(8 + self.image.len());
        out.extend_from_slice(&self.created_at_ms.to_le_bytes());
        out.extend_from_slice(&self.image);
        out
    }

    fn decode(bytes: &[u8]) -> Option<Self> {
        if bytes.len() < 8 {
            return None;
        }
        let mut stamp = [0u8; 8];
        stamp.copy_from_slice(&bytes[..8]);
        Some(Self {
            created_at_ms: u64::from_le_bytes(stamp),
            image: bytes[8..].to_vec(),
        })
    }
}

/// TTL-bounded cache of rendered previews
pub struct PreviewCache<S: CacheStore> {
    store: S,
    ttl: Duration,
}

impl<S: CacheStore> PreviewCache<S> {
    pub fn new(store: S) -> Self {
        Self {
            store,
            ttl: DEFAULT_TTL,
        }
    }

    pub fn with_ttl(store: S, ttl: Duration) -> Self {
        Self { store, ttl }
    }

    /// Look up a fresh entry, expiring a stale one as a side effect
    pub fn get(&self, key: &CacheKey) -> Option<Vec<u8>> {
        self.get_at(key, now_ms())
    }

    /// Freshness-checked lookup against an explicit clock
    pub fn get_at(&self, key: &CacheKey, now_ms: u64) -> Option<Vec<u8>> {
        let bytes = match self.store.get(key.as_str()) {
            Ok(Some(bytes)) => bytes,
            Ok(None) => return None,
            Err(e) => {
                log::warn!("preview cache read failed for {key}: {e}");
                return None;
            }
        };
        let Some(entry) = CacheEntry::decode(&bytes) else {
            log::warn!("preview cache entry for {key} is corrupt, dropping it");
            self.delete_quietly(key);
            return None;
        };
        let age_ms = now_ms.saturating_sub(entry.created_at_ms);
        if age_ms >= self.ttl.as_millis() as u64 {
            // Lazy expiry: stale entries are removed during the lookup that
            // finds them; there is no background sweep.
            self.delete_quietly(key);
            return None;
        }
        Some(entry.image)
    }

    /// Store an image, overwriting any previous entry for the key
    pub fn put(&self, key: &CacheKey, image: &[u8]) {
        self.put_at(key, image, now_ms());
    }

    pub fn put_at(&self, key: &CacheKey, image: &[u8], now_ms: u64) {
        let entry = CacheEntry {
            created_at_ms: now_ms,
            image: image.to_vec(),
        };
        if let Err(e) = self.store.set(key.as_str(), &entry.encode()) {
            log::warn!("preview cache write failed for {key}: {e}");
        }
    }

    /// Delete every preview entry whose key satisfies the predicate
    pub fn clear(&self, predicate: impl Fn(&str) -> bool) {
        for key in self.keys() {
            if predicate(&key) {
                if let Err(e) = self.store.delete(&key) {
                    log::warn!("preview cache delete failed for {key}: {e}");
                }
            }
        }
    }

    /// Total stored bytes across entries whose key satisfies the predicate
    pub fn size_of(&self, predicate: impl Fn(&str) -> bool) -> u64 {
        let mut total = 0u64;
        for key in self.keys() {
            if !predicate(&key) {
                continue;
            }
            match self.store.get(&key) {
                Ok(Some(bytes)) => total += bytes.len() as u64,
                Ok(None) => {}
                Err(e) => log::warn!("preview cache read failed for {key}: {e}"),
            }
        }
        total
    }

    fn keys(&self) -> Vec<String> {
        match self.store.list_keys(CacheKey::prefix()) {
            Ok(keys) => keys,
            Err(e) => {
                log::warn!("preview cache listing failed: {e}");
                Vec::new()
            }
        }
    }

    fn delete_quietly(&self, key: &CacheKey) {
        if let Err(e) = self.store.delete(key.as_str()) {
            log::warn!("preview cache delete failed for {key}: {e}");
        }
    }
}

fn now_ms() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_millis() as u64
}

#[cfg(test)]
mod tests {
    use super::*;
    use stlview_core::{Error, PreviewOptions};

    const TTL_MS: u64 = 7 * 24 * 60 * 60 * 1000;

    fn key(name: &str) -> CacheKey {
        CacheKey::derive(name, None, &PreviewOptions::default())
    }

    /// A store whose every operation fails, for the degraded path
    struct FailingStore;

    impl CacheStore for FailingStore {
        fn get(&self, _key: &str) -> Result<Option<Vec<u8>>> {
            Err(Error::CacheIo("store offline".to_string()))
        }
        fn set(&self, _key: &str, _value: &[u8]) -> Result<()> {
            Err(Error::CacheIo("quota exceeded".to_string()))
        }
        fn delete(&self, _key: &str) -> Result<()> {
            Err(Error::CacheIo("store offline".to_string()))
        }
        fn list_keys(&self, _prefix: &str) -> Result<Vec<String>> {
            Err(Error::CacheIo("store offline".to_string()))
        }
    }

    #[test]
    fn fresh_entries_round_trip_byte_identical() {
        let cache = PreviewCache::new(MemoryStore::new());
        let k = key("a.stl");
        let image = vec![9u8, 8, 7, 6];
        cache.put_at(&k, &image, 1_000);
        // Any query strictly before the TTL boundary sees the entry.
        assert_eq!(cache.get_at(&k, 1_000), Some(image.clone()));
        assert_eq!(cache.get_at(&k, 1_000 + TTL_MS - 1), Some(image));
    }

    #[test]
    fn entries_expire_at_exactly_the_ttl() {
        let store = MemoryStore::new();
        let cache = PreviewCache::new(store.clone());
        let k = key("a.stl");
        cache.put_at(&k, &[1, 2, 3], 5_000);
        assert_eq!(cache.get_at(&k, 5_000 + TTL_MS), None);
        // Expiry is lazy but real: the entry is gone from the store.
        assert_eq!(store.get(k.as_str()).unwrap(), None);
    }

    #[test]
    fn put_overwrites_unconditionally() {
        let cache = PreviewCache::new(MemoryStore::new());
        let k = key("a.stl");
        cache.put_at(&k, &[1], 1_000);
        cache.put_at(&k, &[2], 2_000);
        assert_eq!(cache.get_at(&k, 2_000), Some(vec![2]));
    }

    #[test]
    fn corrupt_entries_are_dropped_as_misses() {
        let store = MemoryStore::new();
        store.set(key("a.stl").as_str(), &[1, 2, 3]).unwrap();
        let cache = PreviewCache::new(store.clone());
        assert_eq!(cache.get_at(&key("a.stl"), 1_000), None);
        assert_eq!(store.get(key("a.stl").as_str()).unwrap(), None);
    }

    #[test]
    fn failing_store_degrades_to_misses_not_errors() {
        let cache = PreviewCache::new(FailingStore);
        let k = key("a.stl");
        // None of these may panic or propagate.
        cache.put_at(&k, &[1, 2, 3], 1_000);
        assert_eq!(cache.get_at(&k, 1_000), None);
        cache.clear(|_| true);
        assert_eq!(cache.size_of(|_| true), 0);
    }

    #[test]
    fn clear_and_size_honor_the_predicate() {
        let cache = PreviewCache::new(MemoryStore::new());
        let ka = key("a.stl");
        let kb = key("b.stl");
        cache.put_at(&ka, &[0u8; 100], 1_000);
        cache.put_at(&kb, &[0u8; 50], 1_000);

        // Timestamp header adds 8 bytes per entry.
        assert_eq!(cache.size_of(|_| true), 166);
        let keep = kb.as_str().to_string();
        cache.clear(|k| k != keep);
        assert_eq!(cache.get_at(&ka, 1_000), None);
        assert_eq!(cache.get_at(&kb, 1_000), Some(vec![0u8; 50]));
    }
}

use crate::config::CACHE_EXPIRY;
use lru::LruCache;
use parking_lot::Mutex;
use std::num::NonZeroUsize;
use std::sync::Arc;
use std::time::{Duration, Instant};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CacheEntry {
    pub word: String,
    pub definition: String,
    pub fetched_at: Instant,
}

/// Time-bounded memo of dictionary results, keyed by lowercase word.
///
/// Clones share the same entries. Expired entries are dropped lazily on
/// access; the LRU bound keeps long sessions from growing without limit.
#[derive(Clone)]
pub struct TranslationCache {
    entries: Arc<Mutex<LruCache<String, CacheEntry>>>,
    ttl: Duration,
}

impl Default for TranslationCache {
    fn default() -> Self {
        Self::new(CACHE_EXPIRY, NonZeroUsize::new(512).unwrap_or(NonZeroUsize::MIN))
    }
}

impl TranslationCache {
    pub fn new(ttl: Duration, capacity: NonZeroUsize) -> Self {
        Self {
            entries: Arc::new(Mutex::new(LruCache::new(capacity))),
            ttl,
        }
    }

    pub fn ttl(&self) -> Duration {
        self.ttl
    }

    pub fn get(&self, word: &str) -> Option<CacheEntry> {
        self.get_at(word, Instant::now())
    }

    /// Returns the entry for `word` unless it is older than the TTL, in which
    /// case it is evicted.
    pub fn get_at(&self, word: &str, now: Instant) -> Option<CacheEntry> {
        let key = word.to_lowercase();
        let mut entries = self.entries.lock();
        let expired = {
            let entry = entries.get(&key)?;
            now.saturating_duration_since(entry.fetched_at) > self.ttl
        };
        if expired {
            entries.pop(&key);
            return None;
        }
        entries.peek(&key).cloned()
    }

    pub fn put(&self, word: &str, definition: impl Into<String>) {
        self.put_at(word, definition, Instant::now());
    }

    pub fn put_at(&self, word: &str, definition: impl Into<String>, now: Instant) {
        let key = word.to_lowercase();
        let entry = CacheEntry {
            word: key.clone(),
            definition: definition.into(),
            fetched_at: now,
        };
        self.entries.lock().put(key, entry);
    }

    pub fn remove(&self, word: &str) -> Option<CacheEntry> {
        self.entries.lock().pop(&word.to_lowercase())
    }

    /// Drops every expired entry and returns how many were removed.
    pub fn purge_expired(&self, now: Instant) -> usize {
        let mut entries = self.entries.lock();
        let stale: Vec<String> = entries
            .iter()
            .filter(|(_, entry)| now.saturating_duration_since(entry.fetched_at) > self.ttl)
            .map(|(key, _)| key.clone())
            .collect();
        for key in &stale {
            entries.pop(key);
        }
        stale.len()
    }

    pub fn len(&self) -> usize {
        self.entries.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn clear(&self) {
        self.entries.lock().clear();
    }
}

use crate::config::STORAGE_KEY;
use crate::error::StorageError;
use crate::record::{WordCollection, WordRecord, canonical_word};
use crate::storage::StorageBackend;
use once_cell::sync::Lazy;
use regex::Regex;
use tokio::sync::Mutex;
use tracing::{debug, warn};

/// A single alphabetic token; hyphens are allowed between letters.
static WORD_SHAPE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^[a-z](?:[a-z-]*[a-z])?$").expect("valid word shape regex"));

const MIN_WORD_LEN: usize = 3;

/// Owner of the persisted word collection.
///
/// Every mutation is a read-whole / write-whole cycle against the backend.
/// Cycles issued through the same store are serialized, so interleaved
/// add/delete calls from one page never lose an update. Writers in other
/// processes are not coordinated; the last write wins.
pub struct WordStore<B> {
    backend: B,
    key: String,
    write_lock: Mutex<()>,
}

impl<B: StorageBackend> WordStore<B> {
    pub fn new(backend: B) -> Self {
        Self::with_key(backend, STORAGE_KEY)
    }

    pub fn with_key(backend: B, key: impl Into<String>) -> Self {
        Self {
            backend,
            key: key.into(),
            write_lock: Mutex::new(()),
        }
    }

    pub fn backend(&self) -> &B {
        &self.backend
    }

    pub async fn words(&self) -> Result<WordCollection, StorageError> {
        Ok(self.backend.get(&self.key).await?.unwrap_or_default())
    }

    pub async fn query_word(&self, word: &str) -> Result<Option<WordRecord>, StorageError> {
        let key = canonical_word(word);
        Ok(self.words().await?.remove(&key))
    }

    /// Canonical words that are tracked and not soft-deleted.
    pub async fn active_words(&self) -> Result<Vec<String>, StorageError> {
        Ok(self
            .words()
            .await?
            .into_values()
            .filter(WordRecord::is_active)
            .map(|record| record.word)
            .collect())
    }

    /// Returns `true` when `candidate` must not be added.
    ///
    /// Rejects anything shorter than three characters, anything that is not
    /// a single alphabetic token, and words that are already tracked and
    /// active. A storage failure also rejects.
    pub async fn filter_word(&self, candidate: &str) -> bool {
        let clean = canonical_word(candidate);
        if clean.chars().count() < MIN_WORD_LEN || !WORD_SHAPE.is_match(&clean) {
            return true;
        }
        match self.query_word(&clean).await {
            Ok(existing) => existing.is_some_and(|record| record.is_active()),
            Err(err) => {
                warn!(error = %err, word = %clean, "failed to read word list while filtering");
                true
            }
        }
    }

    /// Tracks `word`, reviving it if it was soft-deleted.
    pub async fn add_queried_word(&self, word: &str) -> Result<WordRecord, StorageError> {
        let key = canonical_word(word);
        self.update(|collection| {
            let record = collection
                .entry(key.clone())
                .and_modify(|record| {
                    record.query_times += 1;
                    record.delete_times += 1;
                    record.is_deleted = false;
                })
                .or_insert_with(|| WordRecord::new(&key));
            Some(record.clone())
        })
        .await
        .map(|record| record.unwrap_or_else(|| WordRecord::new(&key)))
    }

    /// Soft-deletes `word`. Unknown words are left alone.
    pub async fn delete_word(&self, word: &str) -> Result<Option<WordRecord>, StorageError> {
        let key = canonical_word(word);
        self.update(|collection| {
            let record = collection.get_mut(&key)?;
            record.is_deleted = true;
            record.delete_times += 1;
            Some(record.clone())
        })
        .await
    }

    /// Counts one lookup of `word` and remembers the definition shown.
    pub async fn record_query(
        &self,
        word: &str,
        definition: Option<&str>,
    ) -> Result<Option<WordRecord>, StorageError> {
        let key = canonical_word(word);
        self.update(|collection| {
            let record = collection.get_mut(&key)?;
            record.query_times += 1;
            if let Some(definition) = definition {
                record.definition = Some(definition.to_string());
            }
            Some(record.clone())
        })
        .await
    }

    async fn update<F>(&self, apply: F) -> Result<Option<WordRecord>, StorageError>
    where
        F: FnOnce(&mut WordCollection) -> Option<WordRecord>,
    {
        let _guard = self.write_lock.lock().await;
        let mut collection = self.words().await?;
        let Some(updated) = apply(&mut collection) else {
            return Ok(None);
        };
        self.backend.set(&self.key, &collection).await?;
        debug!(
            word = %updated.word,
            query_times = updated.query_times,
            delete_times = updated.delete_times,
            deleted = updated.is_deleted,
            "word record updated"
        );
        Ok(Some(updated))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::MemoryStorage;

    struct FailingStorage;

    impl StorageBackend for FailingStorage {
        async fn get(&self, _key: &str) -> Result<Option<WordCollection>, StorageError> {
            Err(StorageError::Backend("storage offline".into()))
        }

        async fn set(&self, _key: &str, _collection: &WordCollection) -> Result<(), StorageError> {
            Err(StorageError::Backend("storage offline".into()))
        }
    }

    #[tokio::test]
    async fn filter_rejects_short_and_malformed_words() {
        let store = WordStore::new(MemoryStorage::new());
        assert!(store.filter_word("ok").await);
        assert!(store.filter_word("  ").await);
        assert!(store.filter_word("two words").await);
        assert!(store.filter_word("abc1").await);
        assert!(store.filter_word("-dash").await);
        assert!(!store.filter_word("hello").await);
        assert!(!store.filter_word("well-known").await);
        assert!(!store.filter_word("  World ").await);
    }

    #[tokio::test]
    async fn filter_rejects_active_words_but_not_deleted_ones() {
        let store = WordStore::new(MemoryStorage::new());
        assert!(!store.filter_word("hello").await);
        store.add_queried_word("hello").await.unwrap();
        assert!(store.filter_word("hello").await);
        assert!(store.filter_word("HELLO").await);
        store.delete_word("hello").await.unwrap();
        assert!(!store.filter_word("hello").await);
    }

    #[tokio::test]
    async fn add_then_query_returns_canonical_record() {
        let store = WordStore::new(MemoryStorage::new());
        store.add_queried_word("Hello").await.unwrap();
        let record = store.query_word("hello").await.unwrap().unwrap();
        assert_eq!(record.word, "hello");
        assert_eq!(record.query_times, 1);
        assert!(!record.is_deleted);
    }

    #[tokio::test]
    async fn delete_then_requery_revives_with_counters() {
        let store = WordStore::new(MemoryStorage::new());
        store.add_queried_word("apple").await.unwrap();
        let deleted = store.delete_word("apple").await.unwrap().unwrap();
        assert!(deleted.is_deleted);
        assert_eq!(deleted.delete_times, 1);
        assert_eq!(deleted.query_times, 1);
        assert!(store.active_words().await.unwrap().is_empty());

        let revived = store.add_queried_word("apple").await.unwrap();
        assert!(!revived.is_deleted);
        assert_eq!(revived.query_times, 2);
        assert_eq!(revived.delete_times, 2);
        assert_eq!(store.active_words().await.unwrap(), vec!["apple".to_string()]);
    }

    #[tokio::test]
    async fn delete_unknown_word_is_noop() {
        let store = WordStore::new(MemoryStorage::new());
        assert_eq!(store.delete_word("ghost").await.unwrap(), None);
        assert!(store.words().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn record_query_counts_and_keeps_definition() {
        let store = WordStore::new(MemoryStorage::new());
        store.add_queried_word("apple").await.unwrap();
        let record = store
            .record_query("Apple", Some("n. fruit"))
            .await
            .unwrap()
            .unwrap();
        assert_eq!(record.query_times, 2);
        assert_eq!(record.definition.as_deref(), Some("n. fruit"));
        let record = store.record_query("apple", None).await.unwrap().unwrap();
        assert_eq!(record.query_times, 3);
        assert_eq!(record.definition.as_deref(), Some("n. fruit"));
        assert_eq!(store.record_query("pear", None).await.unwrap(), None);
    }

    #[tokio::test]
    async fn interleaved_updates_are_not_lost() {
        let store = WordStore::new(MemoryStorage::new());
        store.add_queried_word("apple").await.unwrap();
        let (a, b, c) = tokio::join!(
            store.add_queried_word("banana"),
            store.record_query("apple", None),
            store.add_queried_word("cherry"),
        );
        a.unwrap();
        b.unwrap();
        c.unwrap();
        let words = store.words().await.unwrap();
        assert_eq!(words.len(), 3);
        assert_eq!(words["apple"].query_times, 2);
    }

    #[tokio::test]
    async fn storage_failures_surface_as_errors() {
        let store = WordStore::new(FailingStorage);
        assert!(store.filter_word("hello").await);
        assert!(store.add_queried_word("hello").await.is_err());
        assert!(store.active_words().await.is_err());
    }
}

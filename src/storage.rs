//! Storage backends for the word collection.
//!
//! The extension treats storage as an opaque async key-value service. The
//! engine only ever reads or writes a whole [`WordCollection`] under one key.

use crate::error::StorageError;
use crate::record::WordCollection;
use parking_lot::Mutex;
use std::collections::{BTreeMap, HashMap};
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::fs;
use tracing::debug;

#[allow(async_fn_in_trait)]
pub trait StorageBackend {
    /// Returns the collection stored under `key`, or `None` when nothing was
    /// written yet.
    async fn get(&self, key: &str) -> Result<Option<WordCollection>, StorageError>;

    async fn set(&self, key: &str, collection: &WordCollection) -> Result<(), StorageError>;
}

/// Process-local backend. Clones share the same map.
#[derive(Clone, Default)]
pub struct MemoryStorage {
    entries: Arc<Mutex<HashMap<String, WordCollection>>>,
}

impl MemoryStorage {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_collection(key: &str, collection: WordCollection) -> Self {
        let storage = Self::new();
        storage.entries.lock().insert(key.to_string(), collection);
        storage
    }
}

impl StorageBackend for MemoryStorage {
    async fn get(&self, key: &str) -> Result<Option<WordCollection>, StorageError> {
        Ok(self.entries.lock().get(key).cloned())
    }

    async fn set(&self, key: &str, collection: &WordCollection) -> Result<(), StorageError> {
        self.entries
            .lock()
            .insert(key.to_string(), collection.clone());
        Ok(())
    }
}

/// JSON file holding `{ key: collection }`.
///
/// Writes go to a sibling temp file first and are renamed into place so a
/// crash never leaves a truncated collection behind.
#[derive(Debug, Clone)]
pub struct JsonFileStorage {
    path: PathBuf,
}

type FileLayout = BTreeMap<String, WordCollection>;

impl JsonFileStorage {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    async fn read_layout(&self) -> Result<FileLayout, StorageError> {
        match fs::read(&self.path).await {
            Ok(bytes) if bytes.iter().all(u8::is_ascii_whitespace) => Ok(FileLayout::new()),
            Ok(bytes) => Ok(serde_json::from_slice(&bytes)?),
            Err(err) if err.kind() == ErrorKind::NotFound => Ok(FileLayout::new()),
            Err(err) => Err(err.into()),
        }
    }
}

impl StorageBackend for JsonFileStorage {
    async fn get(&self, key: &str) -> Result<Option<WordCollection>, StorageError> {
        let mut layout = self.read_layout().await?;
        Ok(layout.remove(key))
    }

    async fn set(&self, key: &str, collection: &WordCollection) -> Result<(), StorageError> {
        let mut layout = self.read_layout().await?;
        layout.insert(key.to_string(), collection.clone());

        if let Some(parent) = self.path.parent() {
            if !parent.as_os_str().is_empty() {
                fs::create_dir_all(parent).await?;
            }
        }
        let bytes = serde_json::to_vec_pretty(&layout)?;
        let tmp = self.path.with_extension("json.tmp");
        fs::write(&tmp, &bytes).await?;
        fs::rename(&tmp, &self.path).await?;
        debug!(path = %self.path.display(), words = collection.len(), "wrote word collection");
        Ok(())
    }
}

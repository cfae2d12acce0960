//! Key-value storage for crashnote.
//!
//! The reporter reads the current user identifier from a small, read-mostly
//! key-value store. Reads may fail; callers decide how to recover.

mod file;

use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::RwLock;

use thiserror::Error;

pub use file::FileStore;

/// Errors raised by key-value store reads and writes.
#[derive(Debug, Error)]
pub enum StoreError {
    /// The store cannot be accessed at all.
    #[error("store unavailable: {0}")]
    Unavailable(String),

    /// Reading the backing file failed.
    #[error("failed to read store at {path}: {source}")]
    Read {
        /// Path of the backing file.
        path: PathBuf,
        /// The underlying error.
        #[source]
        source: std::io::Error,
    },

    /// Writing the backing file failed.
    #[error("failed to write store at {path}: {source}")]
    Write {
        /// Path of the backing file.
        path: PathBuf,
        /// The underlying error.
        #[source]
        source: std::io::Error,
    },

    /// The backing file does not hold a JSON object of strings.
    #[error("store at {path} is corrupt: {source}")]
    Corrupt {
        /// Path of the backing file.
        path: PathBuf,
        /// The underlying error.
        #[source]
        source: serde_json::Error,
    },
}

impl StoreError {
    /// Create an unavailable-store error.
    #[must_use]
    pub fn unavailable(message: impl Into<String>) -> Self {
        Self::Unavailable(message.into())
    }
}

/// Result type for store operations.
pub type StoreResult<T> = std::result::Result<T, StoreError>;

/// A read-only view of a string key-value store.
///
/// `Ok(None)` means the key is not set. An `Err` means the store itself could
/// not be read.
pub trait KeyValueStore: Send + Sync {
    /// The name of this store (for diagnostics).
    fn name(&self) -> &'static str;

    /// Read the value stored under `key`.
    ///
    /// # Errors
    ///
    /// Returns an error if the store cannot be read.
    fn get_item(&self, key: &str) -> StoreResult<Option<String>>;
}

/// An in-process store backed by a hash map.
#[derive(Debug, Default)]
pub struct MemoryStore {
    items: RwLock<HashMap<String, String>>,
}

impl MemoryStore {
    /// Create an empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a store pre-populated with the given pairs.
    #[must_use]
    pub fn with_items<K, V>(items: impl IntoIterator<Item = (K, V)>) -> Self
    where
        K: Into<String>,
        V: Into<String>,
    {
        Self {
            items: RwLock::new(
                items
                    .into_iter()
                    .map(|(k, v)| (k.into(), v.into()))
                    .collect(),
            ),
        }
    }

    /// Store `value` under `key`, replacing any previous value.
    ///
    /// # Errors
    ///
    /// Returns an error if the lock has been poisoned.
    pub fn set_item(&self, key: impl Into<String>, value: impl Into<String>) -> StoreResult<()> {
        let mut items = self
            .items
            .write()
            .map_err(|_| StoreError::unavailable("memory store lock poisoned"))?;
        items.insert(key.into(), value.into());
        Ok(())
    }

    /// Remove `key`, returning its previous value.
    ///
    /// # Errors
    ///
    /// Returns an error if the lock has been poisoned.
    pub fn remove_item(&self, key: &str) -> StoreResult<Option<String>> {
        let mut items = self
            .items
            .write()
            .map_err(|_| StoreError::unavailable("memory store lock poisoned"))?;
        Ok(items.remove(key))
    }
}

impl KeyValueStore for MemoryStore {
    fn name(&self) -> &'static str {
        "memory"
    }

    fn get_item(&self, key: &str) -> StoreResult<Option<String>> {
        let items = self
            .items
            .read()
            .map_err(|_| StoreError::unavailable("memory store lock poisoned"))?;
        Ok(items.get(key).cloned())
    }
}

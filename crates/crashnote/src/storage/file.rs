//! JSON-file backed key-value store.

use std::collections::BTreeMap;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use tracing::debug;

use super::{KeyValueStore, StoreError, StoreResult};

/// A key-value store persisted as a JSON object of strings.
///
/// The file is read on every lookup so that values written by another
/// process (for example `crashnote user set`) are seen immediately.
#[derive(Debug, Clone)]
pub struct FileStore {
    path: PathBuf,
}

impl FileStore {
    /// Create a store backed by the file at `path`.
    ///
    /// The file does not need to exist yet.
    #[must_use]
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    /// Get the path to the backing file.
    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Store `value` under `key`, rewriting the backing file.
    ///
    /// # Errors
    ///
    /// Returns an error if the existing file is unreadable or corrupt, or if
    /// the new contents cannot be written.
    pub fn set_item(&self, key: &str, value: &str) -> StoreResult<()> {
        let mut items = self.load()?;
        items.insert(key.to_string(), value.to_string());
        self.save(&items)
    }

    /// Remove `key`, returning its previous value.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be read or rewritten.
    pub fn remove_item(&self, key: &str) -> StoreResult<Option<String>> {
        let mut items = self.load()?;
        let previous = items.remove(key);
        if previous.is_some() {
            self.save(&items)?;
        }
        Ok(previous)
    }

    fn load(&self) -> StoreResult<BTreeMap<String, String>> {
        let raw = match std::fs::read_to_string(&self.path) {
            Ok(raw) => raw,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(BTreeMap::new()),
            Err(source) => {
                return Err(StoreError::Read {
                    path: self.path.clone(),
                    source,
                })
            }
        };

        if raw.trim().is_empty() {
            return Ok(BTreeMap::new());
        }

        serde_json::from_str(&raw).map_err(|source| StoreError::Corrupt {
            path: self.path.clone(),
            source,
        })
    }

    fn save(&self, items: &BTreeMap<String, String>) -> StoreResult<()> {
        let write_err = |source| StoreError::Write {
            path: self.path.clone(),
            source,
        };

        if let Some(parent) = self.path.parent() {
            if !parent.as_os_str().is_empty() && !parent.exists() {
                std::fs::create_dir_all(parent).map_err(write_err)?;
            }
        }

        let json = serde_json::to_string_pretty(items).map_err(|source| StoreError::Corrupt {
            path: self.path.clone(),
            source,
        })?;
        std::fs::write(&self.path, json).map_err(write_err)?;
        debug!(path = %self.path.display(), keys = items.len(), "Store written");
        Ok(())
    }
}

impl KeyValueStore for FileStore {
    fn name(&self) -> &'static str {
        "file"
    }

    fn get_item(&self, key: &str) -> StoreResult<Option<String>> {
        Ok(self.load()?.remove(key))
    }
}

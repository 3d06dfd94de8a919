//! Storage backend abstraction.
//!
//! A backend is a flat byte-oriented key-value store, the shape of browser
//! local storage: every collection is serialized under one key and written
//! back as a whole.
//!
//! # Implementations
//!
//! - [`FileStorage`]: one file per key in a directory (used by the CLI)
//! - `InMemoryStorage` (in `easypark-testing`): fast, deterministic testing

use std::fs;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use thiserror::Error;

/// Errors that can occur during storage operations.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum StorageError {
    /// Key contains characters the backend cannot store.
    #[error("Invalid storage key: {0}")]
    InvalidKey(String),

    /// Reading a key failed.
    #[error("Failed to read {key}: {reason}")]
    Read {
        /// Key being read
        key: String,
        /// Backend-specific reason
        reason: String,
    },

    /// Writing a key failed.
    #[error("Failed to write {key}: {reason}")]
    Write {
        /// Key being written
        key: String,
        /// Backend-specific reason
        reason: String,
    },

    /// Backend is unavailable (directory missing, quota exceeded, ...).
    #[error("Storage unavailable: {0}")]
    Unavailable(String),
}

/// Byte-oriented key-value storage.
///
/// Implementations must be safe to share between tasks. No operation is
/// transactional across keys.
pub trait Storage: Send + Sync {
    /// Get the value for a key. Returns `None` if the key does not exist.
    ///
    /// # Errors
    ///
    /// Returns [`StorageError`] if the backend cannot be read.
    fn load(&self, key: &str) -> Result<Option<Vec<u8>>, StorageError>;

    /// Store a value under a key, replacing any previous value.
    ///
    /// # Errors
    ///
    /// Returns [`StorageError`] if the backend cannot be written.
    fn save(&self, key: &str, value: &[u8]) -> Result<(), StorageError>;

    /// Remove a key. Removing a missing key is not an error.
    ///
    /// # Errors
    ///
    /// Returns [`StorageError`] if the backend cannot be written.
    fn remove(&self, key: &str) -> Result<(), StorageError>;

    /// List every stored key, sorted.
    ///
    /// # Errors
    ///
    /// Returns [`StorageError`] if the backend cannot be listed.
    fn keys(&self) -> Result<Vec<String>, StorageError>;
}

/// Checks that a key is safe to use as a file name.
///
/// # Errors
///
/// Returns [`StorageError::InvalidKey`] for empty keys or keys containing
/// anything other than ASCII alphanumerics, `_`, `-` and `.`.
pub fn validate_key(key: &str) -> Result<(), StorageError> {
    let valid = !key.is_empty()
        && !key.starts_with('.')
        && key
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || matches!(c, '_' | '-' | '.'));

    if valid {
        Ok(())
    } else {
        Err(StorageError::InvalidKey(key.to_string()))
    }
}

/// File-backed storage: each key is one `<key>.json` file inside a directory.
///
/// Writes go through a temporary file followed by a rename so a crash never
/// leaves a half-written value behind.
#[derive(Debug, Clone)]
pub struct FileStorage {
    root: PathBuf,
}

impl FileStorage {
    const EXTENSION: &'static str = "json";

    /// Open (and create if needed) a storage directory.
    ///
    /// # Errors
    ///
    /// Returns [`StorageError::Unavailable`] if the directory cannot be created.
    pub fn open(root: impl AsRef<Path>) -> Result<Self, StorageError> {
        let root = root.as_ref().to_path_buf();
        fs::create_dir_all(&root)
            .map_err(|e| StorageError::Unavailable(format!("{}: {e}", root.display())))?;

        tracing::debug!(root = %root.display(), "File storage opened");

        Ok(Self { root })
    }

    /// Directory holding the stored keys
    #[must_use]
    pub fn root(&self) -> &Path {
        &self.root
    }

    fn path_for(&self, key: &str) -> Result<PathBuf, StorageError> {
        validate_key(key)?;
        Ok(self.root.join(format!("{key}.{}", Self::EXTENSION)))
    }
}

impl Storage for FileStorage {
    fn load(&self, key: &str) -> Result<Option<Vec<u8>>, StorageError> {
        let path = self.path_for(key)?;
        match fs::read(&path) {
            Ok(bytes) => Ok(Some(bytes)),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(None),
            Err(e) => Err(StorageError::Read {
                key: key.to_string(),
                reason: e.to_string(),
            }),
        }
    }

    fn save(&self, key: &str, value: &[u8]) -> Result<(), StorageError> {
        let path = self.path_for(key)?;
        let tmp = path.with_extension("tmp");
        let write_error = |e: std::io::Error| StorageError::Write {
            key: key.to_string(),
            reason: e.to_string(),
        };

        fs::write(&tmp, value).map_err(write_error)?;
        fs::rename(&tmp, &path).map_err(write_error)
    }

    fn remove(&self, key: &str) -> Result<(), StorageError> {
        let path = self.path_for(key)?;
        match fs::remove_file(&path) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(()),
            Err(e) => Err(StorageError::Write {
                key: key.to_string(),
                reason: e.to_string(),
            }),
        }
    }

    fn keys(&self) -> Result<Vec<String>, StorageError> {
        let entries = fs::read_dir(&self.root)
            .map_err(|e| StorageError::Unavailable(format!("{}: {e}", self.root.display())))?;

        let mut keys = Vec::new();
        for entry in entries {
            let entry = entry.map_err(|e| StorageError::Unavailable(e.to_string()))?;
            let path = entry.path();
            if path.extension().and_then(|ext| ext.to_str()) != Some(Self::EXTENSION) {
                continue;
            }
            if let Some(stem) = path.file_stem().and_then(|stem| stem.to_str()) {
                keys.push(stem.to_string());
            }
        }
        keys.sort();
        Ok(keys)
    }
}

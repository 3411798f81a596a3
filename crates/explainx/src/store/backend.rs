//! [`StorageBackend`] implementations: JSON files on disk and an in-memory map.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Mutex;
use std::sync::atomic::{AtomicBool, Ordering};

use tracing::trace;

use super::StorageBackend;
use crate::error::StorageError;

/// One pretty-printed `<key>.json` file per key under a data directory.
///
/// Directory layout:
/// ```text
/// data_dir/
///   summaries.json
///   apiKey.json
/// ```
pub struct JsonFileBackend {
    dir: PathBuf,
}

impl JsonFileBackend {
    /// Create a backend rooted at `dir`, creating the directory if needed.
    pub fn new(dir: impl Into<PathBuf>) -> std::io::Result<Self> {
        let dir = dir.into();
        std::fs::create_dir_all(&dir)?;
        Ok(Self { dir })
    }

    /// The data directory.
    pub fn dir(&self) -> &Path {
        &self.dir
    }

    fn path_for(&self, key: &str) -> PathBuf {
        self.dir.join(format!("{key}.json"))
    }
}

impl StorageBackend for JsonFileBackend {
    fn read(&self, key: &str) -> Result<Option<serde_json::Value>, StorageError> {
        let path = self.path_for(key);
        if !path.exists() {
            return Ok(None);
        }
        let json = std::fs::read_to_string(&path).map_err(|source| StorageError::Io {
            key: key.to_string(),
            source,
        })?;
        let value = serde_json::from_str(&json).map_err(|e| StorageError::Corrupt {
            key: key.to_string(),
            reason: e.to_string(),
        })?;
        Ok(Some(value))
    }

    /// Atomic write: serialize to a temp file, then rename into place.
    fn write(&self, key: &str, value: serde_json::Value) -> Result<(), StorageError> {
        let final_path = self.path_for(key);
        let tmp_path = self.dir.join(format!(".{key}.json.tmp"));

        let json = serde_json::to_string_pretty(&value).map_err(|source| {
            StorageError::Serialize {
                key: key.to_string(),
                source,
            }
        })?;
        let io_err = |source| StorageError::Io {
            key: key.to_string(),
            source,
        };
        std::fs::write(&tmp_path, json).map_err(io_err)?;
        std::fs::rename(&tmp_path, &final_path).map_err(io_err)?;

        trace!("Wrote {}", final_path.display());
        Ok(())
    }
}

/// In-process backend. Nothing survives the process.
///
/// Writes can be made to fail on demand with [`MemoryBackend::set_fail_writes`],
/// which is how persistence failures are exercised.
#[derive(Default)]
pub struct MemoryBackend {
    values: Mutex<HashMap<String, serde_json::Value>>,
    fail_writes: AtomicBool,
}

impl MemoryBackend {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make every subsequent `write` fail (or succeed again).
    pub fn set_fail_writes(&self, fail: bool) {
        self.fail_writes.store(fail, Ordering::SeqCst);
    }

    /// Seed a raw value, bypassing the typed stores.
    pub fn insert_raw(&self, key: &str, value: serde_json::Value) {
        let mut values = self.values.lock().unwrap_or_else(|e| e.into_inner());
        values.insert(key.to_string(), value);
    }

    /// Read the raw value under `key`.
    pub fn get_raw(&self, key: &str) -> Option<serde_json::Value> {
        let values = self.values.lock().unwrap_or_else(|e| e.into_inner());
        values.get(key).cloned()
    }
}

impl StorageBackend for MemoryBackend {
    fn read(&self, key: &str) -> Result<Option<serde_json::Value>, StorageError> {
        Ok(self.get_raw(key))
    }

    fn write(&self, key: &str, value: serde_json::Value) -> Result<(), StorageError> {
        if self.fail_writes.load(Ordering::SeqCst) {
            return Err(StorageError::WriteRejected {
                key: key.to_string(),
            });
        }
        self.insert_raw(key, value);
        Ok(())
    }
}

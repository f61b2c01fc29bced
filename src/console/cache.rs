//! Local fallback cache
//!
//! A tiny key/value store addressed by fixed logical names. The file-backed
//! variant keeps one JSON document per key under the cache directory and
//! writes it atomically via temp file and rename.

use parking_lot::Mutex;
use serde::Serialize;
use serde::de::DeserializeOwned;
use std::collections::HashMap;
use std::fs::{self, File, OpenOptions};
use std::io::{self, Write};
use std::path::{Path, PathBuf};

use super::error::{CacheError, CacheResult};

/// Logical names of cached documents
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CacheKey {
    /// Excluded command list
    ExcludedCommands,
    /// Per-command notes
    CommandNotes,
    /// Per-field notes
    KeyNotes,
}

impl CacheKey {
    /// Stable name used as the file stem
    pub fn name(self) -> &'static str {
        match self {
            CacheKey::ExcludedCommands => "excludedCommands",
            CacheKey::CommandNotes => "commandNotes",
            CacheKey::KeyNotes => "keyNotes",
        }
    }
}

#[derive(Debug)]
enum Backing {
    Dir(PathBuf),
    Memory(Mutex<HashMap<CacheKey, Vec<u8>>>),
}

/// Persistent cache that survives across sessions
#[derive(Debug)]
pub struct LocalCache {
    backing: Backing,
}

impl LocalCache {
    /// Cache rooted at `dir` (created lazily on first write)
    pub fn in_dir(dir: impl Into<PathBuf>) -> Self {
        Self {
            backing: Backing::Dir(dir.into()),
        }
    }

    /// Process-local cache that is discarded on drop
    pub fn ephemeral() -> Self {
        Self {
            backing: Backing::Memory(Mutex::new(HashMap::new())),
        }
    }

    /// Path of the document for `key`, if file-backed
    pub fn path_for(&self, key: CacheKey) -> Option<PathBuf> {
        match &self.backing {
            Backing::Dir(dir) => Some(dir.join(format!("{}.json", key.name()))),
            Backing::Memory(_) => None,
        }
    }

    /// Read and decode the document stored under `key`
    ///
    /// Returns `Ok(None)` when nothing has been cached yet.
    pub fn load<T: DeserializeOwned>(&self, key: CacheKey) -> CacheResult<Option<T>> {
        let bytes = match &self.backing {
            Backing::Dir(dir) => {
                let path = dir.join(format!("{}.json", key.name()));
                match fs::read(&path) {
                    Ok(bytes) => bytes,
                    Err(err) if err.kind() == io::ErrorKind::NotFound => return Ok(None),
                    Err(err) => return Err(CacheError::Io(err)),
                }
            }
            Backing::Memory(map) => match map.lock().get(&key) {
                Some(bytes) => bytes.clone(),
                None => return Ok(None),
            },
        };
        Ok(Some(serde_json::from_slice(&bytes)?))
    }

    /// Encode and store `value` under `key`
    pub fn store<T: Serialize>(&self, key: CacheKey, value: &T) -> CacheResult<()> {
        let bytes = serde_json::to_vec_pretty(value)?;
        match &self.backing {
            Backing::Dir(dir) => {
                fs::create_dir_all(dir)?;
                write_atomic(&dir.join(format!("{}.json", key.name())), &bytes)
            }
            Backing::Memory(map) => {
                map.lock().insert(key, bytes);
                Ok(())
            }
        }
    }
}

/// Write data atomically to a file
///
/// Creates a temporary file, writes the data, syncs, then renames
pub fn write_atomic(path: &Path, data: &[u8]) -> CacheResult<()> {
    let temp_path = path.with_extension("tmp");
    let failed = |detail: String| CacheError::AtomicWriteFailed {
        path: path.to_path_buf(),
        detail,
    };

    let mut file = File::create(&temp_path)
        .map_err(|err| failed(format!("create {}: {err}", temp_path.display())))?;
    file.write_all(data)
        .map_err(|err| failed(format!("write: {err}")))?;
    file.sync_all().map_err(|err| failed(format!("sync: {err}")))?;
    drop(file);

    fs::rename(&temp_path, path).map_err(|err| failed(format!("rename: {err}")))?;

    // Directory sync is best effort; not every platform allows opening a directory.
    if let Some(parent) = path.parent() {
        if let Ok(dir) = OpenOptions::new().read(true).open(parent) {
            let _ = dir.sync_all();
        }
    }

    Ok(())
}

//! Per-file key/value metadata (`encoding`, `language`, `position`).
//!
//! [`MemoryMetadata`] lives for the process only; [`JsonMetadataStore`] is
//! backed by a JSON file, keeps at most `max_entries` files and evicts the
//! least recently accessed one when full.

use std::collections::{BTreeMap, HashMap};
use std::fs;
use std::io::{self, Write};
use std::path::{Path, PathBuf};

use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Key holding the charset name the file was last loaded or saved with.
pub const KEY_ENCODING: &str = "encoding";
/// Key holding the user-chosen language id.
pub const KEY_LANGUAGE: &str = "language";
/// Key holding the cursor offset (in chars) at close.
pub const KEY_POSITION: &str = "position";
/// Stored under [`KEY_LANGUAGE`] when the user explicitly chose no language.
pub const NO_LANGUAGE: &str = "_NORMAL_";

/// Default capacity of [`JsonMetadataStore`].
pub const DEFAULT_MAX_ENTRIES: usize = 1000;

/// Storage for per-path metadata.
///
/// Implementations use interior mutability so a store can be shared between
/// documents behind an `Arc`.
pub trait MetadataStore: Send + Sync {
    fn get(&self, path: &Path, key: &str) -> Option<String>;
    fn set(&self, path: &Path, key: &str, value: &str);
}

#[derive(Debug, Error)]
pub enum MetadataError {
    #[error("failed to access metadata file {}", .path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
    #[error("malformed metadata file {}", .path.display())]
    Parse {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },
}

fn path_key(path: &Path) -> String {
    path.to_string_lossy().into_owned()
}

/// In-memory store, used for tests and when persistence is disabled.
#[derive(Debug, Default)]
pub struct MemoryMetadata {
    entries: Mutex<HashMap<String, BTreeMap<String, String>>>,
}

impl MemoryMetadata {
    pub fn new() -> Self {
        Self::default()
    }
}

impl MetadataStore for MemoryMetadata {
    fn get(&self, path: &Path, key: &str) -> Option<String> {
        self.entries
            .lock()
            .get(&path_key(path))
            .and_then(|values| values.get(key).cloned())
    }

    fn set(&self, path: &Path, key: &str, value: &str) {
        self.entries
            .lock()
            .entry(path_key(path))
            .or_default()
            .insert(key.to_string(), value.to_string());
    }
}

#[derive(Debug, Default, Clone, Serialize, Deserialize)]
struct Entry {
    /// Logical access stamp; larger is more recent.
    atime: u64,
    values: BTreeMap<String, String>,
}

#[derive(Debug, Default, Serialize, Deserialize)]
struct StoreFile {
    clock: u64,
    entries: HashMap<String, Entry>,
}

#[derive(Debug, Default)]
struct State {
    file: StoreFile,
    dirty: bool,
}

impl State {
    fn tick(&mut self) -> u64 {
        self.file.clock += 1;
        self.file.clock
    }

    fn evict_to(&mut self, max_entries: usize) {
        while self.file.entries.len() > max_entries {
            let oldest = self
                .file
                .entries
                .iter()
                .min_by_key(|(_, entry)| entry.atime)
                .map(|(key, _)| key.clone());
            match oldest {
                Some(key) => {
                    log::debug!("metadata: evicting {key}");
                    self.file.entries.remove(&key);
                }
                None => break,
            }
        }
    }
}

/// JSON-file backed store with least-recently-accessed eviction.
#[derive(Debug)]
pub struct JsonMetadataStore {
    path: PathBuf,
    max_entries: usize,
    state: Mutex<State>,
}

impl JsonMetadataStore {
    /// Open the store at `path`. A missing file yields an empty store.
    pub fn open(path: impl Into<PathBuf>, max_entries: usize) -> Result<Self, MetadataError> {
        let path = path.into();
        let file = match fs::read(&path) {
            Ok(bytes) if bytes.is_empty() => StoreFile::default(),
            Ok(bytes) => serde_json::from_slice(&bytes).map_err(|source| MetadataError::Parse {
                path: path.clone(),
                source,
            })?,
            Err(err) if err.kind() == io::ErrorKind::NotFound => StoreFile::default(),
            Err(source) => return Err(MetadataError::Io { path, source }),
        };

        let mut state = State { file, dirty: false };
        let max_entries = max_entries.max(1);
        if state.file.entries.len() > max_entries {
            state.evict_to(max_entries);
            state.dirty = true;
        }

        log::debug!(
            "metadata: opened {} ({} entries)",
            path.display(),
            state.file.entries.len()
        );
        Ok(Self {
            path,
            max_entries,
            state: Mutex::new(state),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn len(&self) -> usize {
        self.state.lock().file.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Write pending changes to disk, replacing the file atomically.
    pub fn flush(&self) -> Result<(), MetadataError> {
        let mut state = self.state.lock();
        if !state.dirty {
            return Ok(());
        }

        let io_err = |source| MetadataError::Io {
            path: self.path.clone(),
            source,
        };
        let json = serde_json::to_vec_pretty(&state.file).map_err(|source| MetadataError::Parse {
            path: self.path.clone(),
            source,
        })?;

        let dir = match self.path.parent() {
            Some(parent) if !parent.as_os_str().is_empty() => parent.to_path_buf(),
            _ => PathBuf::from("."),
        };
        fs::create_dir_all(&dir).map_err(io_err)?;
        let mut tmp = tempfile::NamedTempFile::new_in(&dir).map_err(io_err)?;
        tmp.write_all(&json).map_err(io_err)?;
        tmp.as_file().sync_all().map_err(io_err)?;
        tmp.persist(&self.path).map_err(|err| io_err(err.error))?;

        state.dirty = false;
        Ok(())
    }
}

impl MetadataStore for JsonMetadataStore {
    /// Reads refresh the entry's access stamp in memory only, so a session
    /// that never writes leaves the file untouched.
    fn get(&self, path: &Path, key: &str) -> Option<String> {
        let mut state = self.state.lock();
        let now = state.tick();
        let entry = state.file.entries.get_mut(&path_key(path))?;
        entry.atime = now;
        entry.values.get(key).cloned()
    }

    fn set(&self, path: &Path, key: &str, value: &str) {
        let mut state = self.state.lock();
        let now = state.tick();
        let entry = state.file.entries.entry(path_key(path)).or_default();
        entry.atime = now;
        entry.values.insert(key.to_string(), value.to_string());
        state.dirty = true;
        state.evict_to(self.max_entries);
    }
}

impl Drop for JsonMetadataStore {
    fn drop(&mut self) {
        if let Err(err) = self.flush() {
            log::warn!("metadata: {err}");
        }
    }
}

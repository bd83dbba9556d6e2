//! State shared by every document of a registry: the effective file
//! settings, the metadata store and the untitled-number allocator.

use std::collections::BTreeSet;
use std::fmt;
use std::sync::Arc;

use parking_lot::Mutex;
use quire_config::FileSettings;
use quire_fs::{DetectionHints, Encoding, LoadOptions, MemoryMetadata, MetadataStore, SaveOptions};

/// Hands out the numbers shown in "Unsaved Document N".
///
/// The lowest positive number not currently in use is returned, so closing
/// "Unsaved Document 1" makes 1 available again.
#[derive(Debug, Default)]
pub struct UntitledNumbers {
    taken: BTreeSet<u32>,
}

impl UntitledNumbers {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn allocate(&mut self) -> u32 {
        let mut number = 1;
        for &taken in &self.taken {
            if taken != number {
                break;
            }
            number += 1;
        }
        self.taken.insert(number);
        number
    }

    /// Returns `false` if `number` was not allocated.
    pub fn release(&mut self, number: u32) -> bool {
        self.taken.remove(&number)
    }

    pub fn is_taken(&self, number: u32) -> bool {
        self.taken.contains(&number)
    }
}

pub struct DocumentContext {
    settings: FileSettings,
    metadata: Arc<dyn MetadataStore>,
    untitled: Mutex<UntitledNumbers>,
}

impl DocumentContext {
    pub fn new(settings: FileSettings, metadata: Arc<dyn MetadataStore>) -> Self {
        Self {
            settings,
            metadata,
            untitled: Mutex::new(UntitledNumbers::new()),
        }
    }

    /// Default settings with session-only metadata.
    pub fn in_memory() -> Self {
        Self::new(FileSettings::default(), Arc::new(MemoryMetadata::new()))
    }

    pub fn settings(&self) -> &FileSettings {
        &self.settings
    }

    pub fn metadata(&self) -> &dyn MetadataStore {
        self.metadata.as_ref()
    }

    pub fn allocate_untitled(&self) -> u32 {
        self.untitled.lock().allocate()
    }

    pub fn release_untitled(&self, number: u32) {
        if !self.untitled.lock().release(number) {
            log::warn!("untitled number {number} released twice");
        }
    }

    /// Encoding of documents that were never loaded from disk.
    pub fn default_encoding(&self) -> Encoding {
        Encoding::for_label(&self.settings.default_encoding).unwrap_or_else(|err| {
            log::warn!("default encoding: {err}, using UTF-8");
            Encoding::Utf8
        })
    }

    /// Detection inputs for a load: the remembered charset first, then the
    /// configured candidates. Unknown labels are skipped.
    pub fn detection_hints(&self, remembered: Option<Encoding>) -> DetectionHints {
        let candidates = self
            .settings
            .auto_detected_encodings
            .iter()
            .filter_map(|label| match Encoding::for_label(label) {
                Ok(encoding) => Some(encoding),
                Err(err) => {
                    log::warn!("auto_detected_encodings: {err}");
                    None
                }
            })
            .collect();

        DetectionHints {
            remembered,
            candidates,
            use_guess: self.settings.guess_encoding,
        }
    }

    pub fn load_options(&self, hints: DetectionHints) -> LoadOptions {
        LoadOptions {
            chunk_size: self.settings.chunk_size,
            hints,
        }
    }

    /// `keep_bom` keeps a byte order mark the file was loaded with.
    pub fn save_options(&self, keep_bom: bool) -> SaveOptions {
        SaveOptions {
            keep_backup: self.settings.keep_backup,
            backup_suffix: self.settings.backup_suffix.clone(),
            backup_dir: self.settings.backup_dir.clone(),
            ensure_trailing_newline: self.settings.ensure_trailing_newline,
            write_bom: self.settings.write_bom || keep_bom,
            ignore_mtime: false,
            chunk_size: self.settings.chunk_size,
        }
    }
}

impl fmt::Debug for DocumentContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DocumentContext")
            .field("settings", &self.settings)
            .field("untitled", &self.untitled)
            .finish_non_exhaustive()
    }
}

//! Settings sections of the configuration file.

use std::path::PathBuf;

use etcetera::base_strategy::{BaseStrategy, choose_base_strategy};
use serde::{Deserialize, Serialize};

/// `[files]`: load and save policy.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct FileSettings {
    /// Keep the backup of the previous content after saving
    pub keep_backup: bool,
    /// Suffix appended to backup file names
    pub backup_suffix: String,
    /// Put backups here instead of next to the file
    #[serde(skip_serializing_if = "Option::is_none")]
    pub backup_dir: Option<PathBuf>,
    /// Append a final newline on save when missing
    pub ensure_trailing_newline: bool,
    /// Write a byte order mark for Unicode encodings that have one
    pub write_bom: bool,
    /// Charsets tried in order when auto-detecting; `CURRENT` is the locale's
    pub auto_detected_encodings: Vec<String>,
    /// Fall back to a statistical guess when no candidate decodes cleanly
    pub guess_encoding: bool,
    /// Encoding for documents that were never loaded from disk
    pub default_encoding: String,
    /// Bytes read or written per I/O step
    pub chunk_size: usize,
}

impl Default for FileSettings {
    fn default() -> Self {
        Self {
            keep_backup: false,
            backup_suffix: "~".to_string(),
            backup_dir: None,
            ensure_trailing_newline: true,
            write_bom: false,
            auto_detected_encodings: vec![
                "UTF-8".to_string(),
                "CURRENT".to_string(),
                "ISO-8859-15".to_string(),
            ],
            guess_encoding: true,
            default_encoding: "UTF-8".to_string(),
            chunk_size: 64 * 1024,
        }
    }
}

/// `[metadata]`: per-file metadata persistence.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct MetadataSettings {
    /// Persist metadata to disk; otherwise it lives for the session only
    pub enabled: bool,
    /// Location of the metadata file (default: data dir)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub path: Option<PathBuf>,
    /// Number of files remembered before the least recently used is dropped
    pub max_entries: usize,
}

impl Default for MetadataSettings {
    fn default() -> Self {
        Self {
            enabled: true,
            path: None,
            max_entries: 1000,
        }
    }
}

impl MetadataSettings {
    /// Configured path, or `quire/metadata.json` under the user data
    /// directory (`~/.local/share` on Linux).
    pub fn resolved_path(&self) -> Option<PathBuf> {
        if let Some(path) = &self.path {
            return Some(path.clone());
        }
        match choose_base_strategy() {
            Ok(strategy) => Some(strategy.data_dir().join("quire").join("metadata.json")),
            Err(err) => {
                log::warn!("no data directory for metadata: {err}");
                None
            }
        }
    }
}

/// `[log]`: diagnostics output.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct LogSettings {
    /// One of off, error, warn, info, debug, trace
    pub level: String,
    /// Also append log lines to this file
    #[serde(skip_serializing_if = "Option::is_none")]
    pub file: Option<PathBuf>,
}

impl Default for LogSettings {
    fn default() -> Self {
        Self {
            level: "warn".to_string(),
            file: None,
        }
    }
}

pub const LOG_LEVELS: [&str; 6] = ["off", "error", "warn", "info", "debug", "trace"];

impl LogSettings {
    pub fn is_valid_level(&self) -> bool {
        LOG_LEVELS
            .iter()
            .any(|level| level.eq_ignore_ascii_case(&self.level))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_candidates() {
        let files = FileSettings::default();
        assert_eq!(
            files.auto_detected_encodings,
            vec!["UTF-8", "CURRENT", "ISO-8859-15"]
        );
        assert!(files.ensure_trailing_newline);
        assert!(!files.keep_backup);
        assert_eq!(files.backup_suffix, "~");
    }

    #[test]
    fn test_explicit_metadata_path() {
        let settings = MetadataSettings {
            path: Some(PathBuf::from("/var/lib/quire/meta.json")),
            ..MetadataSettings::default()
        };
        assert_eq!(
            settings.resolved_path(),
            Some(PathBuf::from("/var/lib/quire/meta.json"))
        );
    }

    #[test]
    fn test_default_metadata_path_is_in_data_dir() {
        let settings = MetadataSettings::default();
        let Ok(strategy) = choose_base_strategy() else {
            assert_eq!(settings.resolved_path(), None);
            return;
        };
        let path = settings.resolved_path().unwrap();
        assert!(path.starts_with(strategy.data_dir()));
        assert!(path.ends_with("quire/metadata.json"));
    }

    #[test]
    fn test_log_levels() {
        let mut log = LogSettings::default();
        assert!(log.is_valid_level());
        log.level = "DEBUG".to_string();
        assert!(log.is_valid_level());
        log.level = "loud".to_string();
        assert!(!log.is_valid_level());
    }
}

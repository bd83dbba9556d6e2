use crate::error::{ConfigError, ConfigResult};
use crate::settings::{FileSettings, LogSettings, MetadataSettings};
use etcetera::base_strategy::{BaseStrategy, choose_base_strategy};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};

/// Main configuration structure for quire
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct Config {
    /// Load/save behavior
    pub files: FileSettings,
    /// Per-file metadata persistence
    pub metadata: MetadataSettings,
    /// Logging
    pub log: LogSettings,
}

impl Config {
    /// Load configuration from a TOML file
    pub fn from_file(path: &Path) -> ConfigResult<Self> {
        let content = fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        Self::parse(&content, path)
    }

    /// Load configuration from TOML string
    pub fn from_toml_str(content: &str) -> ConfigResult<Self> {
        Self::parse(content, Path::new("<string>"))
    }

    fn parse(content: &str, origin: &Path) -> ConfigResult<Self> {
        let config: Config = toml::from_str(content).map_err(|source| ConfigError::Toml {
            path: origin.to_path_buf(),
            source: Box::new(source),
        })?;
        config.validate()?;
        Ok(config)
    }

    /// Save configuration to a TOML file
    pub fn save_to_file(&self, path: &Path) -> ConfigResult<()> {
        let toml_content = self.to_toml_string()?;
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent).map_err(|source| ConfigError::Io {
                path: parent.to_path_buf(),
                source,
            })?;
        }
        fs::write(path, toml_content).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })
    }

    /// Export configuration as TOML string
    pub fn to_toml_string(&self) -> ConfigResult<String> {
        Ok(toml::to_string_pretty(self)?)
    }

    /// Get configuration file search paths, most specific last
    pub fn config_paths() -> Vec<PathBuf> {
        let mut paths = Vec::new();

        // User-specific config
        if let Ok(strategy) = choose_base_strategy() {
            paths.push(strategy.home_dir().join(".quire").join("config.toml"));
            paths.push(strategy.config_dir().join("quire").join("config.toml"));
        }

        // System-wide config
        paths.push(PathBuf::from("/etc/quire/config.toml"));

        // Current directory
        if let Ok(current_dir) = std::env::current_dir() {
            paths.push(current_dir.join("quire.toml"));
        }

        paths
    }

    /// Load configuration with automatic path discovery
    pub fn load() -> ConfigResult<Self> {
        Self::load_with_paths(&Self::config_paths())
    }

    /// Load configuration from the first existing path, or defaults
    pub fn load_with_paths(paths: &[PathBuf]) -> ConfigResult<Self> {
        for path in paths {
            if path.exists() {
                log::debug!("loading configuration from {}", path.display());
                return Self::from_file(path);
            }
        }

        // Return default configuration if no config file found
        Ok(Self::default())
    }

    /// Create a new configuration file with default settings
    pub fn create_default_config(path: &Path) -> ConfigResult<()> {
        Self::default().save_to_file(path)
    }

    /// Validate the configuration
    pub fn validate(&self) -> ConfigResult<()> {
        let suffix = &self.files.backup_suffix;
        if suffix.is_empty() {
            return Err(ConfigError::Validation(
                "backup suffix must not be empty".to_string(),
            ));
        }
        if suffix.contains('/') {
            return Err(ConfigError::Validation(format!(
                "backup suffix {suffix:?} must not contain a path separator"
            )));
        }
        if self.files.auto_detected_encodings.is_empty() {
            return Err(ConfigError::Validation(
                "auto_detected_encodings needs at least one charset".to_string(),
            ));
        }
        if self.files.chunk_size == 0 {
            return Err(ConfigError::Validation(
                "chunk size must be greater than 0".to_string(),
            ));
        }
        if self.metadata.max_entries == 0 {
            return Err(ConfigError::Validation(
                "metadata max_entries must be greater than 0".to_string(),
            ));
        }
        if !self.log.is_valid_level() {
            return Err(ConfigError::Validation(format!(
                "unknown log level {:?}",
                self.log.level
            )));
        }

        Ok(())
    }
}

/// Configuration builder for creating custom configurations
#[derive(Debug, Default)]
pub struct ConfigBuilder {
    config: Config,
}

impl ConfigBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn files<F>(mut self, f: F) -> Self
    where
        F: FnOnce(&mut FileSettings),
    {
        f(&mut self.config.files);
        self
    }

    pub fn metadata<F>(mut self, f: F) -> Self
    where
        F: FnOnce(&mut MetadataSettings),
    {
        f(&mut self.config.metadata);
        self
    }

    pub fn log<F>(mut self, f: F) -> Self
    where
        F: FnOnce(&mut LogSettings),
    {
        f(&mut self.config.log);
        self
    }

    pub fn build(self) -> ConfigResult<Config> {
        self.config.validate()?;
        Ok(self.config)
    }
}

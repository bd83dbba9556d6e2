use crate::config::Config;
use crate::error::ConfigResult;
use parking_lot::RwLock;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::{Duration, Instant, SystemTime};

/// Configuration loader with caching and reload on modification
#[derive(Debug)]
pub struct ConfigLoader {
    /// Current configuration
    config: Arc<RwLock<Config>>,
    /// Configuration file paths
    paths: Vec<PathBuf>,
    /// Last modification times for each path
    last_modified: Vec<Option<SystemTime>>,
    /// Minimum time between modification checks
    reload_interval: Duration,
    /// Last reload time
    last_reload: Instant,
}

impl Default for ConfigLoader {
    fn default() -> Self {
        Self::new()
    }
}

impl ConfigLoader {
    /// Create a new configuration loader with default paths
    pub fn new() -> Self {
        Self::with_paths(Config::config_paths())
    }

    /// Create a new configuration loader with custom paths
    pub fn with_paths(paths: Vec<PathBuf>) -> Self {
        let len = paths.len();
        Self {
            config: Arc::new(RwLock::new(Config::default())),
            paths,
            last_modified: vec![None; len],
            reload_interval: Duration::from_secs(1),
            last_reload: Instant::now(),
        }
    }

    /// Set the minimum interval between modification checks
    pub fn with_reload_interval(mut self, interval: Duration) -> Self {
        self.reload_interval = interval;
        self
    }

    /// Load configuration from the first available path
    pub fn load(&mut self) -> ConfigResult<()> {
        let config = Config::load_with_paths(&self.paths)?;
        *self.config.write() = config;

        for (slot, path) in self.last_modified.iter_mut().zip(&self.paths) {
            *slot = modified_time(path);
        }

        self.last_reload = Instant::now();
        Ok(())
    }

    /// Shared handle to the current configuration
    pub fn get(&self) -> Arc<RwLock<Config>> {
        Arc::clone(&self.config)
    }

    /// Get a copy of the current configuration
    pub fn get_copy(&self) -> Config {
        self.config.read().clone()
    }

    /// Reload when a configuration file appeared, changed or was removed.
    ///
    /// Returns whether a reload happened. A file that fails to parse leaves
    /// the previous configuration in place.
    pub fn check_reload(&mut self) -> ConfigResult<bool> {
        if self.last_reload.elapsed() < self.reload_interval {
            return Ok(false);
        }

        let changed = self
            .paths
            .iter()
            .zip(&self.last_modified)
            .any(|(path, last)| match (modified_time(path), last) {
                (Some(now), Some(before)) => now > *before,
                (Some(_), None) | (None, Some(_)) => true,
                (None, None) => false,
            });

        if changed {
            log::info!("configuration changed on disk, reloading");
            self.load()?;
        } else {
            self.last_reload = Instant::now();
        }
        Ok(changed)
    }

    /// Update configuration with a function; the result must validate
    pub fn update<F>(&self, updater: F) -> ConfigResult<()>
    where
        F: FnOnce(&mut Config),
    {
        let mut config = self.config.write();
        let mut updated = config.clone();
        updater(&mut updated);
        updated.validate()?;
        *config = updated;
        Ok(())
    }
}

fn modified_time(path: &Path) -> Option<SystemTime> {
    path.metadata().and_then(|meta| meta.modified()).ok()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ConfigError;
    use std::fs;
    use tempfile::TempDir;

    #[test]
    fn test_load_and_copy() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("quire.toml");
        fs::write(&path, "[files]\nkeep_backup = true\n").unwrap();

        let mut loader = ConfigLoader::with_paths(vec![path]);
        loader.load().unwrap();
        assert!(loader.get_copy().files.keep_backup);
        assert!(loader.get().read().files.keep_backup);
    }

    #[test]
    fn test_reload_on_new_file() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("quire.toml");

        let mut loader =
            ConfigLoader::with_paths(vec![path.clone()]).with_reload_interval(Duration::ZERO);
        loader.load().unwrap();
        assert!(!loader.check_reload().unwrap());

        fs::write(&path, "[log]\nlevel = \"trace\"\n").unwrap();
        assert!(loader.check_reload().unwrap());
        assert_eq!(loader.get_copy().log.level, "trace");

        fs::remove_file(&path).unwrap();
        assert!(loader.check_reload().unwrap());
        assert_eq!(loader.get_copy(), Config::default());
    }

    #[test]
    fn test_invalid_reload_keeps_previous() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("quire.toml");
        fs::write(&path, "[files]\nwrite_bom = true\n").unwrap();

        let mut loader = ConfigLoader::with_paths(vec![path.clone()]);
        loader.load().unwrap();

        fs::write(&path, "[files\n").unwrap();
        assert!(loader.load().is_err());
        assert!(loader.get_copy().files.write_bom);
    }

    #[test]
    fn test_update_validates() {
        let loader = ConfigLoader::with_paths(Vec::new());
        loader.update(|config| config.files.keep_backup = true).unwrap();
        assert!(loader.get_copy().files.keep_backup);

        let err = loader
            .update(|config| config.metadata.max_entries = 0)
            .unwrap_err();
        assert!(matches!(err, ConfigError::Validation(_)));
        assert_eq!(loader.get_copy().metadata.max_entries, 1000);
    }
}

// src/config.rs

//! Configuration loading utilities.
//!
//! Everything lives under the storage directory: `config.toml` next to the
//! data files, and the scrape exports in `source.dir` (relative paths are
//! resolved against the storage directory).

use std::path::{Path, PathBuf};

use crate::error::{AppError, Result};
use crate::models::Config;

pub const CONFIG_FILE: &str = "config.toml";

pub fn config_path(storage_dir: &Path) -> PathBuf {
    storage_dir.join(CONFIG_FILE)
}

/// Load and validate the configuration of a storage directory.
///
/// A missing file means defaults. A file that fails to parse also falls back
/// to defaults, with a warning.
pub fn load_config(storage_dir: &Path) -> Result<Config> {
    let path = config_path(storage_dir);
    let config = if path.exists() {
        Config::load_or_default(&path)
    } else {
        log::info!("No config at {}, using defaults", path.display());
        Config::default()
    };

    config
        .validate()
        .map_err(|e| AppError::config(format!("Invalid config {}: {e}", path.display())))?;
    Ok(config)
}

/// Directory the file source reads `{slug}.json` exports from.
pub fn source_dir(config: &Config, storage_dir: &Path) -> PathBuf {
    if config.source.dir.is_absolute() {
        config.source.dir.clone()
    } else {
        storage_dir.join(&config.source.dir)
    }
}

/// Write the default configuration, refusing to overwrite an existing file.
pub fn write_default_config(storage_dir: &Path) -> Result<PathBuf> {
    let path = config_path(storage_dir);
    if path.exists() {
        return Err(AppError::config(format!(
            "{} already exists",
            path.display()
        )));
    }
    std::fs::create_dir_all(storage_dir)?;
    let content = toml::to_string_pretty(&Config::default())?;
    std::fs::write(&path, content)?;
    Ok(path)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_missing_config_uses_defaults() {
        let tmp = TempDir::new().unwrap();
        let config = load_config(tmp.path()).unwrap();
        assert_eq!(config.dispatch.max_attempts, 3);
    }

    #[test]
    fn test_invalid_values_are_rejected() {
        let tmp = TempDir::new().unwrap();
        std::fs::write(
            config_path(tmp.path()),
            "[dispatch]\nmax_concurrent = 0\n",
        )
        .unwrap();
        assert!(matches!(load_config(tmp.path()), Err(AppError::Config(_))));
    }

    #[test]
    fn test_default_config_round_trips() {
        let tmp = TempDir::new().unwrap();
        let path = write_default_config(tmp.path()).unwrap();
        let loaded = Config::load(&path).unwrap();
        assert_eq!(loaded.compose.terse_limit, 5);
        assert!(loaded.channels.email.enabled);
        assert!(!loaded.channels.sms.enabled);
        assert!(write_default_config(tmp.path()).is_err());
    }

    #[test]
    fn test_source_dir_is_relative_to_storage() {
        let config = Config::default();
        assert_eq!(
            source_dir(&config, Path::new("/data")),
            PathBuf::from("/data/scrapes")
        );
    }
}

//! Per-database configuration, stored next to the database file

use crate::model::Namespace;
use crate::store::DEFAULT_COMPRESSION_LEVEL;
use crate::{Error, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Settings for a database file, kept in `<db>.config` as JSON
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Namespace that commits are recorded under
    pub namespace: Namespace,
    /// zstd level for node blobs; 0 disables compression
    pub compression_level: i32,
    /// Default tracing filter when `RUST_LOG` is unset
    pub log_filter: String,
}

impl Default for Config {
    fn default() -> Self {
        Config {
            namespace: Namespace::default(),
            compression_level: DEFAULT_COMPRESSION_LEVEL,
            log_filter: "warn".to_string(),
        }
    }
}

impl Config {
    /// Load the config for a database, falling back to defaults
    pub fn load(db_path: &Path) -> Result<Self> {
        let config_path = Self::config_path(db_path);
        let config: Config = if config_path.exists() {
            let content = std::fs::read_to_string(&config_path)?;
            serde_json::from_str(&content)?
        } else {
            Self::default()
        };
        config.validate()?;
        Ok(config)
    }

    /// Save the config next to a database file
    pub fn save(&self, db_path: &Path) -> Result<()> {
        self.validate()?;
        let content = serde_json::to_string_pretty(self)?;
        std::fs::write(Self::config_path(db_path), content)?;
        Ok(())
    }

    fn validate(&self) -> Result<()> {
        if !(0..=22).contains(&self.compression_level) {
            return Err(Error::Config(format!(
                "compression_level must be between 0 and 22, got {}",
                self.compression_level
            )));
        }
        Ok(())
    }

    /// Get the config file path for a database
    pub fn config_path(db_path: &Path) -> PathBuf {
        let mut config_path = db_path.to_path_buf();
        let file_name = db_path
            .file_name()
            .map(|s| s.to_string_lossy().to_string())
            .unwrap_or_else(|| "state.mkvs".to_string());
        config_path.set_file_name(format!("{}.config", file_name));
        config_path
    }
}

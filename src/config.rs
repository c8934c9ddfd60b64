use std::fs;
use std::path::PathBuf;

use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::error::CardResult;
use crate::search::normalize::{WeightScheme, DEFAULT_MAX_DOCUMENT_BYTES};
use crate::search::MAX_RESULTS;
use crate::store::EditStrategy;

const APP_DIR: &str = "cardstack";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Where the database, search cache and log live. Empty means the
    /// platform data directory.
    pub data_dir: String,
    /// Second location, such as a synced folder, that snapshots are also
    /// written to. The newer of the two is loaded at startup.
    pub sync_dir: String,
    pub weight_scheme: WeightScheme,
    pub max_results: usize,
    pub history_limit: usize,
    pub edit_strategy: EditStrategy,
    /// Delete cards no longer reachable from the root when saving
    pub collect_garbage: bool,
    pub max_document_bytes: usize,
    /// Filter used when `RUST_LOG` is not set
    pub log_level: String,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            data_dir: String::new(),
            sync_dir: String::new(),
            weight_scheme: WeightScheme::Normalized,
            max_results: MAX_RESULTS,
            history_limit: 1000,
            edit_strategy: EditStrategy::InPlace,
            collect_garbage: false,
            max_document_bytes: DEFAULT_MAX_DOCUMENT_BYTES,
            log_level: "info".to_string(),
        }
    }
}

impl Config {
    pub fn config_dir() -> PathBuf {
        dirs::config_dir()
            .unwrap_or_else(|| {
                PathBuf::from(std::env::var("HOME").unwrap_or_default()).join(".config")
            })
            .join(APP_DIR)
    }

    pub fn config_path() -> PathBuf {
        Self::config_dir().join("config.toml")
    }

    /// Directory holding the database, search cache and log.
    pub fn data_path(&self) -> PathBuf {
        if self.data_dir.trim().is_empty() {
            return dirs::data_dir()
                .unwrap_or_else(|| {
                    PathBuf::from(std::env::var("HOME").unwrap_or_default())
                        .join(".local")
                        .join("share")
                })
                .join(APP_DIR);
        }
        PathBuf::from(shellexpand::tilde(&self.data_dir).to_string())
    }

    pub fn sync_path(&self) -> Option<PathBuf> {
        if self.sync_dir.trim().is_empty() {
            return None;
        }
        Some(PathBuf::from(shellexpand::tilde(&self.sync_dir).to_string()))
    }

    pub fn parse(text: &str) -> CardResult<Self> {
        Ok(toml::from_str(text)?)
    }

    /// Read the config file, falling back to defaults when it is missing or
    /// invalid.
    pub fn load() -> Self {
        let path = Self::config_path();
        match fs::read_to_string(&path) {
            Ok(text) => Self::parse(&text).unwrap_or_else(|e| {
                warn!(path = %path.display(), error = %e, "invalid config, using defaults");
                Self::default()
            }),
            Err(_) => Self::default(),
        }
    }

    /// Like [`Config::load`], but writes the defaults out when no config
    /// file exists yet.
    pub fn load_or_create() -> Self {
        let path = Self::config_path();
        if path.exists() {
            return Self::load();
        }
        let config = Self::default();
        if let Err(e) = config.save() {
            warn!(path = %path.display(), error = %e, "could not write default config");
        }
        config
    }

    pub fn save(&self) -> CardResult<()> {
        let path = Self::config_path();
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }
        fs::write(&path, toml::to_string_pretty(self)?)?;
        Ok(())
    }
}

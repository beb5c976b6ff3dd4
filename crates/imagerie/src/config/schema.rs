use std::path::PathBuf;
use std::time::Duration;

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EngineConfig {
    pub version: String,
    #[serde(default)]
    pub database: DatabaseConfig,
    #[serde(default)]
    pub scan: ScanConfig,
    #[serde(default)]
    pub jobs: JobsConfig,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            version: "1.0".to_string(),
            database: DatabaseConfig::default(),
            scan: ScanConfig::default(),
            jobs: JobsConfig::default(),
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct DatabaseConfig {
    /// Falls back to `~/.imagerie/data/imagerie.db` when unset.
    #[serde(default)]
    pub path: Option<PathBuf>,
}

impl DatabaseConfig {
    pub fn resolved_path(&self) -> Option<PathBuf> {
        self.path
            .clone()
            .or_else(crate::db::default_database_path)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScanConfig {
    #[serde(default = "default_image_extensions")]
    pub image_extensions: Vec<String>,
    #[serde(default = "default_ignored_prefixes")]
    pub ignored_entry_prefixes: Vec<String>,
    #[serde(default = "default_ignored_names")]
    pub ignored_entry_names: Vec<String>,
}

fn default_image_extensions() -> Vec<String> {
    ["jpg", "jpeg", "png", "gif", "webp", "bmp", "tif", "tiff", "avif", "heic", "jxl"]
        .iter()
        .map(|e| e.to_string())
        .collect()
}

fn default_ignored_prefixes() -> Vec<String> {
    vec!["__MACOSX/".to_string()]
}

fn default_ignored_names() -> Vec<String> {
    vec![
        ".DS_Store".to_string(),
        "Thumbs.db".to_string(),
        "desktop.ini".to_string(),
    ]
}

impl Default for ScanConfig {
    fn default() -> Self {
        Self {
            image_extensions: default_image_extensions(),
            ignored_entry_prefixes: default_ignored_prefixes(),
            ignored_entry_names: default_ignored_names(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JobsConfig {
    /// Non-terminal jobs started longer ago than this are reported stuck.
    #[serde(default = "default_stuck_after_secs")]
    pub stuck_after_secs: u64,
    #[serde(default = "default_timeout_after_secs")]
    pub timeout_after_secs: u64,
    #[serde(default = "default_sweep_interval_secs")]
    pub sweep_interval_secs: u64,
}

fn default_stuck_after_secs() -> u64 {
    30 * 60
}

fn default_timeout_after_secs() -> u64 {
    2 * 60 * 60
}

fn default_sweep_interval_secs() -> u64 {
    60
}

impl JobsConfig {
    pub fn stuck_after(&self) -> Duration {
        Duration::from_secs(self.stuck_after_secs)
    }

    pub fn timeout_after(&self) -> Duration {
        Duration::from_secs(self.timeout_after_secs)
    }

    pub fn sweep_interval(&self) -> Duration {
        Duration::from_secs(self.sweep_interval_secs)
    }
}

impl Default for JobsConfig {
    fn default() -> Self {
        Self {
            stuck_after_secs: default_stuck_after_secs(),
            timeout_after_secs: default_timeout_after_secs(),
            sweep_interval_secs: default_sweep_interval_secs(),
        }
    }
}

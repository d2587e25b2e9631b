use std::env;
use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use serde::Deserialize;
use textlabel_core::{ItemSource, DEFAULT_MAX_BYTES, DEFAULT_PATTERNS};

pub const DEFAULT_DATA_DIR: &str = "data";
pub const DEFAULT_BIND: &str = "0.0.0.0:8000";

#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    pub data: DataConfig,
    pub items: ItemsConfig,
    pub server: ServerConfig,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default)]
pub struct DataConfig {
    pub files_dir: PathBuf,
    pub table: PathBuf,
    pub labels: PathBuf,
    pub results: PathBuf,
}

impl DataConfig {
    pub fn rooted(root: &Path) -> Self {
        Self {
            files_dir: root.join("files"),
            table: root.join("items.csv"),
            labels: root.join("labels.json"),
            results: root.join("results.csv"),
        }
    }
}

impl Default for DataConfig {
    fn default() -> Self {
        Self::rooted(Path::new(DEFAULT_DATA_DIR))
    }
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default)]
pub struct ItemsConfig {
    pub patterns: String,
    pub max_bytes: u64,
}

impl Default for ItemsConfig {
    fn default() -> Self {
        Self {
            patterns: DEFAULT_PATTERNS.to_string(),
            max_bytes: DEFAULT_MAX_BYTES,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    pub bind: String,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind: DEFAULT_BIND.to_string(),
        }
    }
}

impl AppConfig {
    /// Reads the optional TOML file, then applies environment overrides.
    pub fn load(path: &Path) -> Result<Self> {
        Self::load_with(path, |key| env::var(key).ok())
    }

    fn load_with<F>(path: &Path, lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let mut cfg = if path.exists() {
            let raw = fs::read_to_string(path)
                .with_context(|| format!("failed to read config {}", path.display()))?;
            toml::from_str::<AppConfig>(&raw)
                .with_context(|| format!("invalid config {}", path.display()))?
        } else {
            AppConfig::default()
        };
        cfg.apply_env(lookup);
        Ok(cfg)
    }

    fn apply_env<F>(&mut self, lookup: F)
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(dir) = lookup("TEXTLABEL_DATA_DIR").filter(|v| !v.trim().is_empty()) {
            self.data = DataConfig::rooted(Path::new(dir.trim()));
        }
        if let Some(bind) = lookup("TEXTLABEL_BIND").filter(|v| !v.trim().is_empty()) {
            self.server.bind = bind.trim().to_string();
        }
    }

    pub fn item_source(&self) -> ItemSource {
        ItemSource::resolve(
            &self.data.files_dir,
            &self.data.table,
            &self.items.patterns,
            self.items.max_bytes,
        )
    }
}

//! Application configuration management.
//!
//! This module handles loading and saving the configuration: backend and
//! site URLs, local database name, asset cache generation and manifest, and
//! an optional data directory override.
//!
//! Configuration is stored at `~/.config/platecache/config.json`; environment
//! variables override individual fields after loading.

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::assets::manifest;

/// Application name used for config/data directory paths
const APP_NAME: &str = "platecache";

/// Config file name
const CONFIG_FILE: &str = "config.json";

const DEFAULT_API_BASE_URL: &str = "http://localhost:1337";
const DEFAULT_SITE_ORIGIN: &str = "http://localhost:8000";
const DEFAULT_DATABASE_NAME: &str = "restaurants";
const DEFAULT_CACHE_GENERATION: &str = "my-site-cache-v4";
const DEFAULT_OFFLINE_SLOT_KEY: &str = "review";

const ENV_API_URL: &str = "PLATECACHE_API_URL";
const ENV_ORIGIN: &str = "PLATECACHE_ORIGIN";
const ENV_DATA_DIR: &str = "PLATECACHE_DATA_DIR";
const ENV_CACHE_GENERATION: &str = "PLATECACHE_CACHE_GENERATION";

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Backend serving `/restaurants` and `/reviews/`
    pub api_base_url: String,
    /// Origin that relative asset manifest entries are resolved against
    pub site_origin: String,
    pub database_name: String,
    /// When false the local store opens as a no-op handle
    pub local_store: bool,
    /// Name of the current asset cache generation; change it to invalidate assets
    pub cache_generation: String,
    pub asset_manifest: Vec<String>,
    pub offline_slot_key: String,
    /// Overrides the platform data directory
    pub data_dir: Option<PathBuf>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            api_base_url: DEFAULT_API_BASE_URL.to_string(),
            site_origin: DEFAULT_SITE_ORIGIN.to_string(),
            database_name: DEFAULT_DATABASE_NAME.to_string(),
            local_store: true,
            cache_generation: DEFAULT_CACHE_GENERATION.to_string(),
            asset_manifest: manifest::default_manifest(),
            offline_slot_key: DEFAULT_OFFLINE_SLOT_KEY.to_string(),
            data_dir: None,
        }
    }
}

impl Config {
    /// Load from disk (defaults when absent) and apply environment overrides.
    pub fn load() -> Result<Self> {
        let mut config = Self::load_from(&Self::config_path()?)?;
        config.apply_env_overrides(|key| std::env::var(key).ok());
        Ok(config)
    }

    pub fn save(&self) -> Result<()> {
        self.save_to(&Self::config_path()?)
    }

    fn load_from(path: &Path) -> Result<Self> {
        if !path.exists() {
            return Ok(Self::default());
        }
        let contents = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config {}", path.display()))?;
        serde_json::from_str(&contents).with_context(|| format!("Failed to parse config {}", path.display()))
    }

    fn save_to(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let contents = serde_json::to_string_pretty(self)?;
        std::fs::write(path, contents)?;
        Ok(())
    }

    fn config_path() -> Result<PathBuf> {
        let config_dir = dirs::config_dir()
            .ok_or_else(|| anyhow::anyhow!("Could not find config directory"))?;
        Ok(config_dir.join(APP_NAME).join(CONFIG_FILE))
    }

    fn apply_env_overrides(&mut self, var: impl Fn(&str) -> Option<String>) {
        if let Some(url) = var(ENV_API_URL) {
            self.api_base_url = url;
        }
        if let Some(origin) = var(ENV_ORIGIN) {
            self.site_origin = origin;
        }
        if let Some(dir) = var(ENV_DATA_DIR) {
            self.data_dir = Some(PathBuf::from(dir));
        }
        if let Some(generation) = var(ENV_CACHE_GENERATION) {
            self.cache_generation = generation;
        }
    }

    pub fn data_dir(&self) -> Result<PathBuf> {
        if let Some(ref dir) = self.data_dir {
            return Ok(dir.clone());
        }
        let data_dir = dirs::data_dir()
            .ok_or_else(|| anyhow::anyhow!("Could not find data directory"))?;
        Ok(data_dir.join(APP_NAME))
    }

    /// Parent directory of the local database, or `None` when the store is unavailable.
    pub fn store_root(&self) -> Option<PathBuf> {
        if !self.local_store {
            return None;
        }
        match self.data_dir() {
            Ok(dir) => Some(dir.join("db")),
            Err(e) => {
                warn!(error = %e, "No data directory for the local store");
                None
            }
        }
    }

    pub fn offline_dir(&self) -> Result<PathBuf> {
        Ok(self.data_dir()?.join("offline"))
    }

    pub fn asset_cache_dir(&self) -> Result<PathBuf> {
        Ok(self.data_dir()?.join("asset-cache"))
    }
}

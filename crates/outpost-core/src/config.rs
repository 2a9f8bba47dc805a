//! Application configuration management.
//!
//! Holds the API server and app origin, the asset cache version and an
//! optional override of the precache manifest.
//!
//! Configuration is stored at `~/.config/outpost/config.json`.

use std::path::PathBuf;

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};

use crate::api::client::DEFAULT_API_BASE_URL;
use crate::worker::AssetManifest;

/// Application name used for config/cache directory paths
const APP_NAME: &str = "outpost";

/// Config file name
const CONFIG_FILE: &str = "config.json";

/// Persisted static asset cache, under the cache directory
const WORKER_CACHE_FILE: &str = "worker-cache.json";

/// Cache generation used when none is configured.
/// Bump on each release to invalidate previously cached assets.
pub const DEFAULT_CACHE_VERSION: &str = "outpost-v1";

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct Config {
    pub api_base_url: Option<String>,
    /// Origin the static app shell is served from. Defaults to the API server.
    pub app_origin: Option<String>,
    pub cache_version: Option<String>,
    pub asset_manifest: Option<Vec<String>>,
    pub last_username: Option<String>,
}

impl Config {
    pub fn load() -> Result<Self> {
        let path = Self::config_path()?;
        Self::load_from(&path)
    }

    pub fn load_from(path: &std::path::Path) -> Result<Self> {
        if path.exists() {
            let contents = std::fs::read_to_string(path)
                .with_context(|| format!("Failed to read config: {}", path.display()))?;
            serde_json::from_str(&contents)
                .with_context(|| format!("Failed to parse config: {}", path.display()))
        } else {
            Ok(Self::default())
        }
    }

    pub fn save(&self) -> Result<()> {
        let path = Self::config_path()?;
        self.save_to(&path)
    }

    pub fn save_to(&self, path: &std::path::Path) -> Result<()> {
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

    pub fn api_base_url(&self) -> &str {
        self.api_base_url.as_deref().unwrap_or(DEFAULT_API_BASE_URL)
    }

    pub fn app_origin(&self) -> &str {
        self.app_origin.as_deref().unwrap_or_else(|| self.api_base_url())
    }

    pub fn cache_version(&self) -> &str {
        self.cache_version.as_deref().unwrap_or(DEFAULT_CACHE_VERSION)
    }

    /// Configured precache manifest, or the built-in shell manifest.
    pub fn asset_manifest(&self) -> Result<AssetManifest> {
        match &self.asset_manifest {
            Some(paths) => Ok(AssetManifest::new(paths.clone())?),
            None => Ok(AssetManifest::default()),
        }
    }

    /// Durable location of the local data mirror.
    pub fn mirror_dir(&self) -> Result<PathBuf> {
        let data_dir = dirs::data_dir()
            .ok_or_else(|| anyhow::anyhow!("Could not find data directory"))?;
        Ok(data_dir.join(APP_NAME).join("mirror"))
    }

    pub fn cache_dir(&self) -> Result<PathBuf> {
        let cache_dir = dirs::cache_dir()
            .ok_or_else(|| anyhow::anyhow!("Could not find cache directory"))?;
        Ok(cache_dir.join(APP_NAME))
    }

    pub fn worker_cache_path(&self) -> Result<PathBuf> {
        Ok(self.cache_dir()?.join(WORKER_CACHE_FILE))
    }
}

//! Application configuration management.
//!
//! Configuration is stored at `~/.config/guestdir/config.json`. Every field
//! has a default, so a missing or partial file is fine. A few values can be
//! overridden from the environment (or a `.env` file):
//!
//! - `GUESTDIR_API_URL`
//! - `GUESTDIR_API_TOKEN`
//! - `GUESTDIR_SEARCH_MODE` (`local` or `remote`)
//!
//! Values are read once at start-up; changing them needs a restart.

use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};

use crate::cache::HydrationSettings;
use crate::search::{SearchMode, DEFAULT_RESULT_LIMIT};

/// Application name used for config/cache directory paths
const APP_NAME: &str = "guestdir";

/// Config file name
const CONFIG_FILE: &str = "config.json";

const DEFAULT_API_URL: &str = "http://localhost:8080/api";
const DEFAULT_PAGE_SIZE: u32 = 100;
/// Consider the guest cache stale after 1 hour.
const DEFAULT_TTL_MINUTES: i64 = 60;
const DEFAULT_DEBOUNCE_MS: u64 = 300;
const DEFAULT_MAX_PAGES: u32 = 10_000;

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub api_base_url: String,
    /// Usually supplied through `GUESTDIR_API_TOKEN` rather than saved.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub api_token: Option<String>,
    pub page_size: u32,
    pub cache_ttl_minutes: i64,
    pub search_mode: SearchMode,
    pub debounce_ms: u64,
    pub result_limit: usize,
    pub max_pages: u32,
    /// Overrides the platform cache directory.
    pub cache_dir: Option<PathBuf>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            api_base_url: DEFAULT_API_URL.to_string(),
            api_token: None,
            page_size: DEFAULT_PAGE_SIZE,
            cache_ttl_minutes: DEFAULT_TTL_MINUTES,
            search_mode: SearchMode::default(),
            debounce_ms: DEFAULT_DEBOUNCE_MS,
            result_limit: DEFAULT_RESULT_LIMIT,
            max_pages: DEFAULT_MAX_PAGES,
            cache_dir: None,
        }
    }
}

impl Config {
    /// Load from disk (or defaults) and apply environment overrides.
    pub fn load() -> Result<Self> {
        let path = Self::config_path()?;
        let mut config = if path.exists() {
            Self::load_from(&path)?
        } else {
            Self::default()
        };
        config.apply_env(|key| std::env::var(key).ok())?;
        Ok(config)
    }

    /// Write to `~/.config/guestdir/config.json`, returning the path.
    pub fn save(&self) -> Result<PathBuf> {
        let path = Self::config_path()?;
        self.save_to(&path)?;
        Ok(path)
    }

    pub fn save_to(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)
                .with_context(|| format!("Failed to create {}", parent.display()))?;
        }
        let contents = serde_json::to_string_pretty(self)?;
        std::fs::write(path, contents)
            .with_context(|| format!("Failed to write config file: {}", path.display()))?;
        Ok(())
    }

    pub fn load_from(path: &Path) -> Result<Self> {
        let contents = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {}", path.display()))?;
        serde_json::from_str(&contents)
            .with_context(|| format!("Failed to parse config file: {}", path.display()))
    }

    /// Apply overrides from a variable lookup (the process environment in
    /// production, a map in tests).
    pub fn apply_env(&mut self, lookup: impl Fn(&str) -> Option<String>) -> Result<()> {
        if let Some(url) = lookup("GUESTDIR_API_URL").filter(|v| !v.is_empty()) {
            self.api_base_url = url;
        }
        if let Some(token) = lookup("GUESTDIR_API_TOKEN").filter(|v| !v.is_empty()) {
            self.api_token = Some(token);
        }
        if let Some(mode) = lookup("GUESTDIR_SEARCH_MODE").filter(|v| !v.is_empty()) {
            self.search_mode = mode
                .parse()
                .map_err(|e: String| anyhow::anyhow!(e))
                .context("Invalid GUESTDIR_SEARCH_MODE")?;
        }
        Ok(())
    }

    fn config_path() -> Result<PathBuf> {
        let config_dir = dirs::config_dir()
            .ok_or_else(|| anyhow::anyhow!("Could not find config directory"))?;
        Ok(config_dir.join(APP_NAME).join(CONFIG_FILE))
    }

    pub fn cache_dir(&self) -> Result<PathBuf> {
        if let Some(ref dir) = self.cache_dir {
            return Ok(dir.clone());
        }
        let cache_dir = dirs::cache_dir()
            .ok_or_else(|| anyhow::anyhow!("Could not find cache directory"))?;
        Ok(cache_dir.join(APP_NAME))
    }

    pub fn hydration_settings(&self) -> HydrationSettings {
        HydrationSettings {
            page_size: self.page_size.max(1),
            // Out-of-range values saturate instead of overflowing.
            ttl: chrono::Duration::try_minutes(self.cache_ttl_minutes.max(0))
                .unwrap_or(chrono::Duration::MAX),
            max_pages: self.max_pages.max(1),
        }
    }

    pub fn debounce(&self) -> Duration {
        Duration::from_millis(self.debounce_ms)
    }
}

//! Offline layer settings
//!
//! Built-in defaults, then `~/.config/fieldbook/config.toml`, then any
//! `FIELDBOOK_*` variable set in the environment. Later sources win.

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;

const ENV_PREFIX: &str = "FIELDBOOK";

/// Settings shared by the storage, sync and connectivity components
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// Directory for local storage (queue and cache database)
    #[serde(default = "default_data_dir")]
    pub data_dir: PathBuf,

    /// Base URL of the remote record store (optional)
    #[serde(default)]
    pub remote_url: Option<String>,

    /// Bearer token sent to the remote store
    #[serde(default)]
    pub api_key: Option<String>,

    /// Seconds between scheduled drains of the mutation queue
    #[serde(default = "default_sync_interval_secs")]
    pub sync_interval_secs: u64,

    /// Minimum spacing between "became online" notifications
    #[serde(default = "default_debounce_ms")]
    pub debounce_ms: u64,

    /// Seconds between connectivity probes while someone is listening
    #[serde(default = "default_poll_interval_secs")]
    pub poll_interval_secs: u64,

    /// Cached reads younger than this are served without a remote fetch
    #[serde(default = "default_refresh_interval_secs")]
    pub refresh_interval_secs: u64,

    /// Oldest cached read that may still be served as a fallback
    #[serde(default = "default_max_cache_age_secs")]
    pub max_cache_age_secs: u64,

    /// Timeout for a single reachability probe
    #[serde(default = "default_probe_timeout_ms")]
    pub probe_timeout_ms: u64,

    /// Prefix shared by every cache key written by this application
    #[serde(default = "default_cache_prefix")]
    pub cache_prefix: String,

    /// Log file path (when logging is enabled via FIELDBOOK_LOG)
    #[serde(default)]
    pub log_file: Option<PathBuf>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            data_dir: default_data_dir(),
            remote_url: None,
            api_key: None,
            sync_interval_secs: default_sync_interval_secs(),
            debounce_ms: default_debounce_ms(),
            poll_interval_secs: default_poll_interval_secs(),
            refresh_interval_secs: default_refresh_interval_secs(),
            max_cache_age_secs: default_max_cache_age_secs(),
            probe_timeout_ms: default_probe_timeout_ms(),
            cache_prefix: default_cache_prefix(),
            log_file: None,
        }
    }
}

impl Config {
    /// Read the standard config file, falling back to defaults
    pub fn load() -> Result<Self> {
        Self::load_from_path(&Self::config_file_path())
    }

    /// Load configuration with an optional CLI-provided path
    pub fn load_with_cli_override(path: Option<&PathBuf>) -> Result<Self> {
        match path {
            Some(path) => Self::load_from_path(path),
            None => Self::load(),
        }
    }

    /// Read `path` if present, apply env overrides, create the data dir
    pub fn load_from_path(path: &PathBuf) -> Result<Self> {
        let mut config = if path.exists() {
            let content = std::fs::read_to_string(path)
                .with_context(|| format!("Cannot read {}", path.display()))?;
            toml::from_str(&content)
                .with_context(|| format!("Invalid settings in {}", path.display()))?
        } else {
            Self::default()
        };

        config.apply_env_overrides();
        config.ensure_data_dir()?;
        Ok(config)
    }

    /// Parse settings from TOML text, then apply env overrides
    pub fn load_from_str(toml_content: &str) -> Result<Self> {
        let mut config: Config =
            toml::from_str(toml_content).context("Invalid settings TOML")?;
        config.apply_env_overrides();
        Ok(config)
    }

    fn apply_env_overrides(&mut self) {
        if let Ok(val) = std::env::var(format!("{}_DATA_DIR", ENV_PREFIX)) {
            self.data_dir = PathBuf::from(val);
        }

        // Empty string clears the remote
        if let Ok(val) = std::env::var(format!("{}_REMOTE_URL", ENV_PREFIX)) {
            self.remote_url = if val.is_empty() { None } else { Some(val) };
        }

        if let Ok(val) = std::env::var(format!("{}_API_KEY", ENV_PREFIX)) {
            self.api_key = if val.is_empty() { None } else { Some(val) };
        }

        if let Some(secs) = env_u64("SYNC_INTERVAL_SECS") {
            self.sync_interval_secs = secs;
        }

        if let Some(ms) = env_u64("DEBOUNCE_MS") {
            self.debounce_ms = ms;
        }

        if let Some(secs) = env_u64("POLL_INTERVAL_SECS") {
            self.poll_interval_secs = secs;
        }
    }

    fn ensure_data_dir(&self) -> Result<()> {
        std::fs::create_dir_all(&self.data_dir)
            .with_context(|| format!("Cannot create data directory {}", self.data_dir.display()))
    }

    /// Write to the standard config file
    pub fn save(&self) -> Result<()> {
        self.save_to_path(&Self::config_file_path())
    }

    /// Save configuration to a specific file
    pub fn save_to_path(&self, config_path: &PathBuf) -> Result<()> {
        let text = toml::to_string_pretty(self).context("Cannot encode settings")?;
        if let Some(dir) = config_path.parent() {
            std::fs::create_dir_all(dir)
                .with_context(|| format!("Cannot create {}", dir.display()))?;
        }
        std::fs::write(config_path, text)
            .with_context(|| format!("Cannot write {}", config_path.display()))
    }

    /// `FIELDBOOK_CONFIG`, or `config.toml` under the platform config dir
    pub fn config_file_path() -> PathBuf {
        if let Ok(path) = std::env::var(format!("{}_CONFIG", ENV_PREFIX)) {
            return PathBuf::from(path);
        }

        dirs::config_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join("fieldbook")
            .join("config.toml")
    }

    /// Get the path to the SQLite database holding the queue and cache
    pub fn database_path(&self) -> PathBuf {
        self.data_dir.join("fieldbook.db")
    }

    /// Interval settings of 0 are read as 1 second
    pub fn sync_interval(&self) -> Duration {
        Duration::from_secs(self.sync_interval_secs.max(1))
    }

    pub fn debounce(&self) -> Duration {
        Duration::from_millis(self.debounce_ms)
    }

    pub fn poll_interval(&self) -> Duration {
        Duration::from_secs(self.poll_interval_secs.max(1))
    }

    pub fn refresh_interval(&self) -> Duration {
        Duration::from_secs(self.refresh_interval_secs.max(1))
    }

    pub fn max_cache_age(&self) -> Duration {
        Duration::from_secs(self.max_cache_age_secs)
    }

    pub fn probe_timeout(&self) -> Duration {
        Duration::from_millis(self.probe_timeout_ms)
    }

    /// Build the cache key for a collection-scoped listing
    pub fn cache_key(&self, name: &str) -> String {
        format!("{}{}", self.cache_prefix, name)
    }
}

fn env_u64(suffix: &str) -> Option<u64> {
    std::env::var(format!("{}_{}", ENV_PREFIX, suffix))
        .ok()
        .and_then(|val| val.trim().parse().ok())
}

fn default_data_dir() -> PathBuf {
    dirs::data_local_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("fieldbook")
}

fn default_sync_interval_secs() -> u64 {
    30
}

fn default_debounce_ms() -> u64 {
    3_000
}

fn default_poll_interval_secs() -> u64 {
    5
}

fn default_refresh_interval_secs() -> u64 {
    60
}

fn default_max_cache_age_secs() -> u64 {
    24 * 60 * 60
}

fn default_probe_timeout_ms() -> u64 {
    3_000
}

fn default_cache_prefix() -> String {
    "cache:".to_string()
}

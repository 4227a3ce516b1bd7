//! Command handlers

use anyhow::{bail, Context, Result};

use fieldbook_core::{Config, Database, OfflineLayer};

pub mod cache;
pub mod config;
pub mod fetch;
pub mod queue;
pub mod reset;
pub mod status;
pub mod sync;

/// Open the local database (queue and cache) without touching the network
pub fn open_database(config: &Config) -> Result<Database> {
    Database::open(config).with_context(|| {
        format!(
            "Failed to open local database at {}",
            config.database_path().display()
        )
    })
}

/// Open the full offline layer; requires a remote URL
pub fn open_layer(config: &Config) -> Result<OfflineLayer> {
    if config.remote_url.is_none() {
        bail!(
            "Remote URL not configured. Set it with:\n  \
             fieldbook config set remote_url https://your-server/api"
        );
    }
    OfflineLayer::open(config).context("Failed to open offline layer")
}

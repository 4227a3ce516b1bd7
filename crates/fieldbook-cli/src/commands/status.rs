//! Status command handler

use anyhow::Result;

use fieldbook_core::Config;

use crate::commands::{open_database, open_layer};
use crate::output::{Output, OutputFormat};

/// Show status information
pub async fn show(config: &Config, output: &Output) -> Result<()> {
    // Without a remote there is nothing to probe; report the local side only
    let (online, draining, pending, cache_entries) = match config.remote_url {
        Some(_) => {
            let layer = open_layer(config)?;
            let status = layer.status().await?;
            let cached = layer.cache().entries()?.len();
            (Some(status.online), status.draining, status.pending, cached)
        }
        None => {
            let db = open_database(config)?;
            let pending = fieldbook_core::MutationQueue::new(db.clone()).pending_count()?;
            let cached = fieldbook_core::QueryCache::new(db).entries()?.len();
            (None, false, pending, cached)
        }
    };

    match output.format {
        OutputFormat::Json => {
            println!(
                "{}",
                serde_json::json!({
                    "remote_url": config.remote_url,
                    "online": online,
                    "draining": draining,
                    "pending": pending,
                    "cache_entries": cache_entries,
                    "database": config.database_path()
                })
            );
        }
        OutputFormat::Quiet => {
            println!("{}", pending);
        }
        OutputFormat::Human => {
            println!("Fieldbook Status");
            println!("================");
            println!();
            println!("Remote:");
            match &config.remote_url {
                Some(url) => {
                    println!("  Server:  {}", url);
                    println!(
                        "  Network: {}",
                        if online == Some(true) {
                            "online"
                        } else {
                            "offline"
                        }
                    );
                    println!("  Sync:    {}", if draining { "syncing" } else { "idle" });
                }
                None => println!("  (not configured)"),
            }
            println!();
            println!("Local:");
            println!("  Database:       {}", config.database_path().display());
            println!("  Pending writes: {}", pending);
            println!("  Cached queries: {}", cache_entries);
        }
    }

    Ok(())
}

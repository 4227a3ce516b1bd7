//! Cache command handlers

use anyhow::{bail, Result};
use chrono::Utc;

use fieldbook_core::{Config, QueryCache};

use crate::commands::open_database;
use crate::output::{Output, OutputFormat};

/// List cached queries
pub fn list(config: &Config, output: &Output) -> Result<()> {
    let cache = QueryCache::new(open_database(config)?);
    output.print_cache_entries(&cache.entries()?, Utc::now());
    Ok(())
}

/// Print one cached payload regardless of age
pub fn show(config: &Config, key: String, output: &Output) -> Result<()> {
    let cache = QueryCache::new(open_database(config)?);
    let Some(entry) = cache.entry(&key)? else {
        bail!("No cache entry for '{}'", key);
    };

    match output.format {
        OutputFormat::Human => {
            println!("Key:     {}", entry.key);
            println!("Written: {}", entry.written_at.format("%Y-%m-%d %H:%M:%S"));
            println!("Age:     {}s", entry.age(Utc::now()).as_secs());
            println!();
            println!("{}", serde_json::to_string_pretty(&entry.payload)?);
        }
        OutputFormat::Json => output.json(&entry),
        OutputFormat::Quiet => println!("{}", entry.payload),
    }
    Ok(())
}

/// Evict every entry under the configured prefix
pub fn clear(config: &Config, output: &Output) -> Result<()> {
    let cache = QueryCache::new(open_database(config)?);
    let removed = cache.evict_all_with_prefix(&config.cache_prefix)?;
    output.success(&format!("Removed {} cached quer{}", removed, if removed == 1 { "y" } else { "ies" }));
    Ok(())
}

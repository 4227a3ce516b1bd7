//! Fetch command handler

use anyhow::Result;
use serde_json::Value;

use fieldbook_core::Config;

use crate::commands::open_layer;
use crate::output::Output;

/// Load a collection through the cache and print it
pub async fn fetch(config: &Config, collection: String, refresh: bool, output: &Output) -> Result<()> {
    let layer = open_layer(config)?;
    let resource = layer.collection::<Value>(&collection);

    let loaded = if refresh {
        resource.refresh().await?
    } else {
        resource.load().await?
    };

    output.print_records(&collection, &loaded.data, loaded.source);
    Ok(())
}

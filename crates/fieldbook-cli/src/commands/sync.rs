//! Sync command handlers

use std::time::Duration;

use anyhow::{Context, Result};
use tokio::signal;

use fieldbook_core::{Config, DrainState};

use crate::commands::open_layer;
use crate::output::Output;

/// Drain the queue once
pub async fn sync(config: &Config, output: &Output) -> Result<()> {
    let layer = open_layer(config)?;

    let pending = layer.queue().pending_count()?;
    output.message(&format!("Sending {} pending mutation(s)...", pending));

    let outcome = layer.flush_now().await;
    output.print_drain(&outcome);
    Ok(())
}

/// Run the scheduler until Ctrl-C
pub async fn watch(config: &Config, interval: Option<u64>, output: &Output) -> Result<()> {
    let mut config = config.clone();
    if let Some(secs) = interval {
        config.sync_interval_secs = secs.max(1);
    }

    let layer = open_layer(&config)?;
    let mut scheduler = layer.start_scheduler();
    let mut states = layer.coordinator().subscribe_state();

    output.message(&format!(
        "Syncing every {}s and on reconnect. Press Ctrl-C to stop.",
        config.sync_interval_secs
    ));

    loop {
        tokio::select! {
            result = signal::ctrl_c() => {
                result.context("Failed to listen for Ctrl-C")?;
                break;
            }
            changed = states.changed() => {
                if changed.is_err() {
                    break;
                }
                let state = *states.borrow_and_update();
                if state == DrainState::Idle {
                    let pending = layer.queue().pending_count()?;
                    output.message(&format!("Sync finished, {} pending", pending));
                }
            }
        }
    }

    scheduler.stop();

    // Let an in-flight drain finish its current item
    let mut settle = tokio::time::interval(Duration::from_millis(100));
    for _ in 0..50 {
        if !layer.coordinator().is_draining() {
            break;
        }
        settle.tick().await;
    }

    output.success("Stopped");
    Ok(())
}

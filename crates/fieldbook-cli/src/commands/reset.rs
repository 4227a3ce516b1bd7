//! Reset command handler

use std::io::{self, Write};

use anyhow::{bail, Result};

use fieldbook_core::{Config, MutationQueue, QueryCache};

use crate::commands::open_database;
use crate::output::Output;

/// Discard queued writes and cached reads
///
/// Works without a configured remote, so a broken setup can still be
/// cleaned up.
pub fn reset(config: &Config, yes: bool, output: &Output) -> Result<()> {
    let db = open_database(config)?;
    let queue = MutationQueue::new(db.clone());
    let cache = QueryCache::new(db);

    let pending = queue.pending_count()?;
    if pending > 0 && !yes {
        if !output.should_prompt() {
            bail!(
                "{} unsynced mutation(s) would be lost. Re-run with --yes to confirm.",
                pending
            );
        }

        print!(
            "{} unsynced mutation(s) will be lost. Continue? [y/N] ",
            pending
        );
        io::stdout().flush()?;

        let mut input = String::new();
        io::stdin().read_line(&mut input)?;
        if !matches!(input.trim(), "y" | "Y" | "yes") {
            output.message("Cancelled.");
            return Ok(());
        }
    }

    let mutations = queue.clear()?;
    let cache_entries = cache.evict_all_with_prefix(&config.cache_prefix)?;
    output.success(&format!(
        "Reset local state: {} mutation(s), {} cached quer{} removed",
        mutations,
        cache_entries,
        if cache_entries == 1 { "y" } else { "ies" }
    ));
    Ok(())
}

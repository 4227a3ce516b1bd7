//! Fieldbook CLI
//!
//! Command-line interface for the Fieldbook offline data layer: inspect and
//! drain the mutation queue, browse cached queries, and run the scheduler.

use std::fs::OpenOptions;
use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use tracing::debug;
use tracing_subscriber::EnvFilter;

use fieldbook_core::{Config, Operation, StorageError};

mod commands;
mod output;

use output::{Output, OutputFormat};

#[derive(Parser)]
#[command(name = "fieldbook")]
#[command(about = "Fieldbook - offline-first data layer toolkit")]
#[command(version)]
#[command(propagate_version = true)]
struct Cli {
    /// Output as JSON
    #[arg(long, global = true)]
    json: bool,

    /// Quiet mode - minimal output
    #[arg(short, long, global = true)]
    quiet: bool,

    /// Use an alternate config file
    #[arg(long, global = true, value_name = "PATH")]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Show connectivity, sync state and queue size
    Status,
    /// Inspect or edit the mutation queue
    Queue {
        #[command(subcommand)]
        command: QueueCommands,
    },
    /// Drain the mutation queue once
    Sync,
    /// Run the sync scheduler until interrupted
    Watch {
        /// Seconds between scheduled drains (defaults to sync_interval_secs)
        #[arg(short, long)]
        interval: Option<u64>,
    },
    /// Load a collection through the cache
    Fetch {
        /// Collection name
        collection: String,
        /// Skip the fresh-cache shortcut
        #[arg(short, long)]
        refresh: bool,
    },
    /// Inspect or clear the query cache
    Cache {
        #[command(subcommand)]
        command: CacheCommands,
    },
    /// Discard all queued mutations and cached queries
    Reset {
        /// Don't ask for confirmation
        #[arg(short, long)]
        yes: bool,
    },
    /// Show or set configuration
    Config {
        #[command(subcommand)]
        command: Option<ConfigCommands>,
    },
}

#[derive(Subcommand)]
enum QueueCommands {
    /// List queued mutations
    #[command(alias = "ls")]
    List {
        /// Include items already marked synced
        #[arg(short, long)]
        all: bool,
    },
    /// Queue a mutation
    Add {
        /// Target collection
        collection: String,
        /// create, update or delete
        operation: Operation,
        /// JSON object payload (update/delete need an "id")
        payload: String,
    },
    /// Remove every queued mutation
    Clear,
}

#[derive(Subcommand)]
enum CacheCommands {
    /// List cached queries
    #[command(alias = "ls")]
    List,
    /// Print one cached payload
    Show {
        /// Cache key
        key: String,
    },
    /// Remove cached queries written by this application
    Clear,
}

#[derive(Subcommand, Clone)]
enum ConfigCommands {
    /// Show current configuration
    Show,
    /// Set a configuration value
    Set {
        /// Configuration key (data_dir, remote_url, api_key, sync_interval_secs, ...)
        key: String,
        /// Configuration value
        value: String,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    let result = run(cli).await;

    if let Err(e) = &result {
        let hint = e
            .chain()
            .find_map(|cause| cause.downcast_ref::<StorageError>())
            .and_then(StorageError::recovery_suggestion);
        if let Some(hint) = hint {
            eprintln!("Hint: {}", hint);
        }
    }
    result
}

async fn run(cli: Cli) -> Result<()> {
    let output = Output::new(OutputFormat::from_flags(cli.json, cli.quiet));
    let config_path = cli.config.as_ref();

    // Config commands work even if the stored config is unusable
    if let Commands::Config { command } = &cli.command {
        return match command.clone() {
            Some(ConfigCommands::Show) | None => commands::config::show(config_path, &output),
            Some(ConfigCommands::Set { key, value }) => {
                commands::config::set(key, value, config_path, &output)
            }
        };
    }

    let config =
        Config::load_with_cli_override(config_path).context("Failed to load configuration")?;
    init_logging(&config);
    debug!("Using database {}", config.database_path().display());

    match cli.command {
        Commands::Status => commands::status::show(&config, &output).await,
        Commands::Queue { command } => match command {
            QueueCommands::List { all } => commands::queue::list(&config, all, &output),
            QueueCommands::Add {
                collection,
                operation,
                payload,
            } => commands::queue::add(&config, collection, operation, payload, &output),
            QueueCommands::Clear => commands::queue::clear(&config, &output),
        },
        Commands::Sync => commands::sync::sync(&config, &output).await,
        Commands::Watch { interval } => commands::sync::watch(&config, interval, &output).await,
        Commands::Fetch {
            collection,
            refresh,
        } => commands::fetch::fetch(&config, collection, refresh, &output).await,
        Commands::Cache { command } => match command {
            CacheCommands::List => commands::cache::list(&config, &output),
            CacheCommands::Show { key } => commands::cache::show(&config, key, &output),
            CacheCommands::Clear => commands::cache::clear(&config, &output),
        },
        Commands::Reset { yes } => commands::reset::reset(&config, yes, &output),
        Commands::Config { .. } => Ok(()), // Handled above
    }
}

/// Initialize logging
///
/// Only initializes if FIELDBOOK_LOG is set. Logs go to `log_file` when
/// configured, otherwise to stderr.
fn init_logging(config: &Config) {
    let Ok(log_level) = std::env::var("FIELDBOOK_LOG") else {
        return;
    };

    let env_filter = EnvFilter::try_new(format!(
        "fieldbook_core={},fieldbook_cli={}",
        log_level, log_level
    ))
    .unwrap_or_else(|_| EnvFilter::new("fieldbook_core=info,fieldbook_cli=info"));

    let builder = tracing_subscriber::fmt()
        .with_env_filter(env_filter)
        .with_target(false);

    match &config.log_file {
        Some(path) => {
            let file = match OpenOptions::new().create(true).append(true).open(path) {
                Ok(f) => f,
                Err(e) => {
                    eprintln!("Warning: Could not open log file {:?}: {}", path, e);
                    return;
                }
            };
            let _ = builder.with_ansi(false).with_writer(file).try_init();
        }
        None => {
            let _ = builder.with_writer(std::io::stderr).try_init();
        }
    }
}

//! Config command handlers

use std::path::PathBuf;

use anyhow::{bail, Context, Result};

use fieldbook_core::Config;

use crate::output::{Output, OutputFormat};

const KEYS: &str = "data_dir, remote_url, api_key, sync_interval_secs, debounce_ms, \
                    poll_interval_secs, refresh_interval_secs, max_cache_age_secs, \
                    probe_timeout_ms, cache_prefix, log_file";

/// Show current configuration
pub fn show(config_path: Option<&PathBuf>, output: &Output) -> Result<()> {
    let config =
        Config::load_with_cli_override(config_path).context("Failed to load configuration")?;

    match output.format {
        OutputFormat::Json => {
            let mut value = serde_json::to_value(&config)?;
            // Never echo the secret itself
            if let Some(key) = value.get_mut("api_key").filter(|k| !k.is_null()) {
                *key = serde_json::json!("********");
            }
            println!("{}", value);
        }
        OutputFormat::Quiet => {
            println!("{}", config.data_dir.display());
        }
        OutputFormat::Human => {
            let effective_path = config_path
                .cloned()
                .unwrap_or_else(Config::config_file_path);
            println!("Configuration:");
            println!("  data_dir:              {}", config.data_dir.display());
            println!(
                "  remote_url:            {}",
                config.remote_url.as_deref().unwrap_or("(not set)")
            );
            println!(
                "  api_key:               {}",
                if config.api_key.is_some() {
                    "(set)"
                } else {
                    "(not set)"
                }
            );
            println!("  sync_interval_secs:    {}", config.sync_interval_secs);
            println!("  debounce_ms:           {}", config.debounce_ms);
            println!("  poll_interval_secs:    {}", config.poll_interval_secs);
            println!("  refresh_interval_secs: {}", config.refresh_interval_secs);
            println!("  max_cache_age_secs:    {}", config.max_cache_age_secs);
            println!("  probe_timeout_ms:      {}", config.probe_timeout_ms);
            println!("  cache_prefix:          {}", config.cache_prefix);
            println!(
                "  log_file:              {}",
                config
                    .log_file
                    .as_ref()
                    .map(|p| p.display().to_string())
                    .unwrap_or_else(|| "(not set)".to_string())
            );
            println!();
            println!("Config file: {}", effective_path.display());
        }
    }

    Ok(())
}

/// Set a configuration value
pub fn set(
    key: String,
    value: String,
    config_path: Option<&PathBuf>,
    output: &Output,
) -> Result<()> {
    let mut config =
        Config::load_with_cli_override(config_path).context("Failed to load configuration")?;

    apply(&mut config, &key, &value)?;

    // Save to the CLI-specified path or default
    let save_path = config_path
        .cloned()
        .unwrap_or_else(Config::config_file_path);
    config
        .save_to_path(&save_path)
        .context("Failed to save configuration")?;

    let shown = if key == "api_key" { "********" } else { value.as_str() };
    output.success(&format!("Set {} = {}", key, shown));

    Ok(())
}

fn apply(config: &mut Config, key: &str, value: &str) -> Result<()> {
    let optional = |value: &str| {
        if value.is_empty() || value == "none" {
            None
        } else {
            Some(value.to_string())
        }
    };
    let number = |value: &str| -> Result<u64> {
        value
            .parse()
            .with_context(|| format!("Invalid value for {}. Expected a whole number.", key))
    };
    let positive = |value: &str| -> Result<u64> {
        match number(value)? {
            0 => bail!("{} must be at least 1", key),
            n => Ok(n),
        }
    };

    match key {
        "data_dir" => config.data_dir = value.into(),
        "remote_url" => config.remote_url = optional(value),
        "api_key" => config.api_key = optional(value),
        "sync_interval_secs" => config.sync_interval_secs = positive(value)?,
        "debounce_ms" => config.debounce_ms = number(value)?,
        "poll_interval_secs" => config.poll_interval_secs = positive(value)?,
        "refresh_interval_secs" => config.refresh_interval_secs = positive(value)?,
        "max_cache_age_secs" => config.max_cache_age_secs = number(value)?,
        "probe_timeout_ms" => config.probe_timeout_ms = number(value)?,
        "cache_prefix" => {
            if value.is_empty() {
                bail!("cache_prefix cannot be empty");
            }
            config.cache_prefix = value.to_string();
        }
        "log_file" => config.log_file = optional(value).map(PathBuf::from),
        _ => {
            bail!(
                "Unknown configuration key: '{}'\nValid keys: {}",
                key,
                KEYS
            );
        }
    }

    Ok(())
}

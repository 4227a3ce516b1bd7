//! Output formatting for CLI
//!
//! Provides consistent output formatting across all commands:
//! - Human-readable default output
//! - JSON output (--json flag)
//! - Quiet mode for scripting (--quiet flag)

use chrono::{DateTime, Utc};
use serde::Serialize;
use serde_json::Value;

use fieldbook_core::{DataSource, DrainOutcome, QueuedMutation};

/// Output format options
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OutputFormat {
    /// Human-readable output (default)
    Human,
    /// JSON output
    Json,
    /// Quiet mode - minimal output
    Quiet,
}

impl OutputFormat {
    /// Create format from CLI flags
    pub fn from_flags(json: bool, quiet: bool) -> Self {
        if quiet {
            OutputFormat::Quiet
        } else if json {
            OutputFormat::Json
        } else {
            OutputFormat::Human
        }
    }
}

/// Output helper for consistent formatting
pub struct Output {
    /// The output format
    pub format: OutputFormat,
}

impl Output {
    pub fn new(format: OutputFormat) -> Self {
        Self { format }
    }

    /// Check if output is in quiet mode
    pub fn is_quiet(&self) -> bool {
        matches!(self.format, OutputFormat::Quiet)
    }

    /// Print any serializable value as pretty JSON
    pub fn json<T: Serialize + ?Sized>(&self, value: &T) {
        match serde_json::to_string_pretty(value) {
            Ok(text) => println!("{}", text),
            Err(e) => eprintln!("Failed to encode output: {}", e),
        }
    }

    /// Print queued mutations
    pub fn print_mutations(&self, mutations: &[QueuedMutation]) {
        match self.format {
            OutputFormat::Human => {
                if mutations.is_empty() {
                    println!("Queue is empty.");
                    return;
                }
                for m in mutations {
                    println!(
                        "{} | {:<6} | {:<16} | {}{}",
                        &m.id.to_string()[..8],
                        m.operation.as_str(),
                        truncate(&m.collection, 16),
                        truncate(&m.payload.to_string(), 50),
                        if m.synced { " (synced)" } else { "" }
                    );
                }
                println!("\n{} mutation(s)", mutations.len());
            }
            OutputFormat::Json => self.json(mutations),
            OutputFormat::Quiet => {
                for m in mutations {
                    println!("{}", m.id);
                }
            }
        }
    }

    /// Print cache keys with their age
    pub fn print_cache_entries(&self, entries: &[(String, DateTime<Utc>)], now: DateTime<Utc>) {
        match self.format {
            OutputFormat::Human => {
                if entries.is_empty() {
                    println!("Cache is empty.");
                    return;
                }
                for (key, written_at) in entries {
                    println!(
                        "{:<40} {} ({} ago)",
                        truncate(key, 40),
                        written_at.format("%Y-%m-%d %H:%M:%S"),
                        human_age((now - *written_at).num_seconds())
                    );
                }
                println!("\n{} entr{}", entries.len(), if entries.len() == 1 { "y" } else { "ies" });
            }
            OutputFormat::Json => {
                let rows: Vec<_> = entries
                    .iter()
                    .map(|(key, written_at)| serde_json::json!({"key": key, "written_at": written_at}))
                    .collect();
                self.json(&rows);
            }
            OutputFormat::Quiet => {
                for (key, _) in entries {
                    println!("{}", key);
                }
            }
        }
    }

    /// Print records loaded through a resource
    pub fn print_records(&self, collection: &str, records: &[Value], source: DataSource) {
        match self.format {
            OutputFormat::Human => {
                let from = match source {
                    DataSource::Remote => "remote",
                    DataSource::Cache => "cache",
                };
                println!("{} ({} record(s) from {})", collection, records.len(), from);
                for record in records {
                    println!("  {}", truncate(&record.to_string(), 76));
                }
            }
            OutputFormat::Json => {
                self.json(&serde_json::json!({
                    "collection": collection,
                    "source": source,
                    "records": records
                }));
            }
            OutputFormat::Quiet => {
                for record in records {
                    println!("{}", record);
                }
            }
        }
    }

    /// Print the result of a drain
    pub fn print_drain(&self, outcome: &DrainOutcome) {
        match self.format {
            OutputFormat::Human => match outcome {
                DrainOutcome::Coalesced => println!("A sync is already running."),
                DrainOutcome::Offline => println!("Offline - nothing was sent."),
                DrainOutcome::Completed(report) => {
                    println!(
                        "✓ Sync complete: {} applied, {} failed, {} still pending",
                        report.applied, report.failed, report.remaining
                    );
                }
                DrainOutcome::Aborted(reason) => println!("Sync aborted: {}", reason),
            },
            OutputFormat::Json => {
                let value = match outcome {
                    DrainOutcome::Coalesced => serde_json::json!({"status": "coalesced"}),
                    DrainOutcome::Offline => serde_json::json!({"status": "offline"}),
                    DrainOutcome::Completed(report) => {
                        serde_json::json!({"status": "completed", "report": report})
                    }
                    DrainOutcome::Aborted(reason) => {
                        serde_json::json!({"status": "aborted", "reason": reason})
                    }
                };
                println!("{}", value);
            }
            OutputFormat::Quiet => {
                if let Some(report) = outcome.report() {
                    println!("{}", report.remaining);
                }
            }
        }
    }

    /// Print a success message
    pub fn success(&self, message: &str) {
        match self.format {
            OutputFormat::Human => println!("✓ {}", message),
            OutputFormat::Json => {
                println!(
                    "{}",
                    serde_json::json!({"status": "success", "message": message})
                );
            }
            OutputFormat::Quiet => {}
        }
    }

    /// Check if we should prompt for confirmation
    pub fn should_prompt(&self) -> bool {
        self.format == OutputFormat::Human
    }

    /// Print an informational message
    pub fn message(&self, msg: &str) {
        match self.format {
            OutputFormat::Human => println!("{}", msg),
            OutputFormat::Json => {
                println!("{}", serde_json::json!({"message": msg}));
            }
            OutputFormat::Quiet => {}
        }
    }
}

/// Truncate a string to max length, adding "..." if truncated
fn truncate(s: &str, max_len: usize) -> String {
    if s.chars().count() <= max_len {
        s.to_string()
    } else {
        let kept: String = s.chars().take(max_len.saturating_sub(3)).collect();
        format!("{}...", kept)
    }
}

/// Compact age like "42s", "5m", "3h", "2d"
fn human_age(seconds: i64) -> String {
    let seconds = seconds.max(0);
    match seconds {
        s if s < 60 => format!("{}s", s),
        s if s < 3600 => format!("{}m", s / 60),
        s if s < 86_400 => format!("{}h", s / 3600),
        s => format!("{}d", s / 86_400),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_format_from_flags() {
        assert_eq!(OutputFormat::from_flags(false, false), OutputFormat::Human);
        assert_eq!(OutputFormat::from_flags(true, false), OutputFormat::Json);
        assert_eq!(OutputFormat::from_flags(false, true), OutputFormat::Quiet);
        // Quiet takes precedence
        assert_eq!(OutputFormat::from_flags(true, true), OutputFormat::Quiet);
    }

    #[test]
    fn test_truncate() {
        assert_eq!(truncate("short", 10), "short");
        assert_eq!(truncate("this is a long string", 10), "this is...");
        assert_eq!(truncate("ñandú ñandú ñandú", 8), "ñandú...");
    }

    #[test]
    fn test_human_age() {
        assert_eq!(human_age(-5), "0s");
        assert_eq!(human_age(59), "59s");
        assert_eq!(human_age(60), "1m");
        assert_eq!(human_age(7200), "2h");
        assert_eq!(human_age(3 * 86_400 + 10), "3d");
    }
}

//! Queue command handlers

use anyhow::{bail, Context, Result};
use serde_json::Value;

use fieldbook_core::models::record_id_of;
use fieldbook_core::{Config, MutationQueue, Operation};

use crate::commands::open_database;
use crate::output::Output;

/// List queued mutations
pub fn list(config: &Config, all: bool, output: &Output) -> Result<()> {
    let queue = MutationQueue::new(open_database(config)?);
    let mutations = if all {
        queue.list_all()?
    } else {
        queue.list_pending()?
    };
    output.print_mutations(&mutations);
    Ok(())
}

/// Queue a mutation for the next sync
pub fn add(
    config: &Config,
    collection: String,
    operation: Operation,
    payload: String,
    output: &Output,
) -> Result<()> {
    let payload = parse_payload(operation, &payload)?;
    let queue = MutationQueue::new(open_database(config)?);
    let id = queue
        .enqueue(&collection, operation, payload)
        .context("Failed to queue mutation")?;

    if output.is_quiet() {
        println!("{}", id);
    } else {
        output.success(&format!(
            "Queued {} on '{}' ({}). Run `fieldbook sync` to send it.",
            operation.as_str(),
            collection,
            id
        ));
    }
    Ok(())
}

/// Drop every queued mutation
pub fn clear(config: &Config, output: &Output) -> Result<()> {
    let queue = MutationQueue::new(open_database(config)?);
    let removed = queue.clear()?;
    output.success(&format!("Removed {} queued mutation(s)", removed));
    Ok(())
}

fn parse_payload(operation: Operation, raw: &str) -> Result<Value> {
    let payload: Value = serde_json::from_str(raw).context("Payload is not valid JSON")?;
    if !payload.is_object() {
        bail!("Payload must be a JSON object");
    }
    if operation.requires_record_id() && record_id_of(&payload).is_none() {
        bail!(
            "A {} payload needs an \"id\" field naming the record",
            operation.as_str()
        );
    }
    Ok(payload)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::output::OutputFormat;
    use tempfile::TempDir;

    #[test]
    fn test_parse_payload() {
        assert!(parse_payload(Operation::Create, r#"{"name": "Ana"}"#).is_ok());
        assert!(parse_payload(Operation::Update, r#"{"id": 7, "name": "Ana"}"#).is_ok());
        assert!(parse_payload(Operation::Delete, r#"{"name": "Ana"}"#).is_err());
        assert!(parse_payload(Operation::Create, "[1, 2]").is_err());
        assert!(parse_payload(Operation::Create, "{oops").is_err());
    }

    #[test]
    fn test_add_then_clear() {
        let temp = TempDir::new().unwrap();
        let config = Config {
            data_dir: temp.path().to_path_buf(),
            ..Config::default()
        };
        let output = Output::new(OutputFormat::Quiet);

        add(
            &config,
            "clients".to_string(),
            Operation::Create,
            r#"{"name": "Ana"}"#.to_string(),
            &output,
        )
        .unwrap();

        let queue = MutationQueue::new(open_database(&config).unwrap());
        assert_eq!(queue.pending_count().unwrap(), 1);

        clear(&config, &output).unwrap();
        assert!(queue.is_empty().unwrap());
    }
}

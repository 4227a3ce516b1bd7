//! SQLite schema for the mutation queue and the query cache
//!
//! The version lives in `PRAGMA user_version`; 0 means a fresh file.

use rusqlite::{Connection, Result};

/// Current schema version for migrations
pub const SCHEMA_VERSION: i32 = 1;

const TABLES: &str = r#"
    CREATE TABLE IF NOT EXISTS mutation_queue (
        seq INTEGER PRIMARY KEY AUTOINCREMENT,
        id TEXT UNIQUE NOT NULL,
        collection TEXT NOT NULL,
        operation TEXT NOT NULL,
        payload TEXT NOT NULL,
        enqueued_at INTEGER NOT NULL,
        synced INTEGER NOT NULL DEFAULT 0
    );
    CREATE INDEX IF NOT EXISTS idx_mutation_queue_pending ON mutation_queue(synced, seq);
    CREATE INDEX IF NOT EXISTS idx_mutation_queue_collection ON mutation_queue(collection);

    CREATE TABLE IF NOT EXISTS query_cache (
        key TEXT PRIMARY KEY,
        payload TEXT NOT NULL,
        written_at INTEGER NOT NULL
    );
"#;

/// Create missing tables and stamp the version, in one transaction
pub fn init_schema(conn: &Connection) -> Result<()> {
    conn.execute_batch(&format!(
        "BEGIN;{}PRAGMA user_version = {};COMMIT;",
        TABLES, SCHEMA_VERSION
    ))
}

/// The stamped version, or `None` for a database never initialized
pub fn get_schema_version(conn: &Connection) -> Result<Option<i32>> {
    let version: i32 = conn.pragma_query_value(None, "user_version", |row| row.get(0))?;
    Ok((version > 0).then_some(version))
}

pub fn needs_init(conn: &Connection) -> bool {
    !matches!(get_schema_version(conn), Ok(Some(v)) if v >= SCHEMA_VERSION)
}

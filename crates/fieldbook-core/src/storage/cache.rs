//! Query cache store
//!
//! Keeps the last successful result of each named query with the time it
//! was written. One row per key; a write replaces the whole row in a single
//! statement, so readers never observe a partial overwrite.

use std::time::Duration;

use rusqlite::{params, OptionalExtension};
use serde_json::Value;

use crate::models::CacheEntry;
use crate::storage::database::{from_millis, Database};
use crate::storage::error::{StorageError, StorageResult};

/// Staleness-bounded store of query results
#[derive(Clone)]
pub struct QueryCache {
    db: Database,
}

impl QueryCache {
    pub fn new(db: Database) -> Self {
        Self { db }
    }

    /// Store `payload` under `key`, stamped with the current time
    pub fn write(&self, key: &str, payload: &Value) -> StorageResult<()> {
        let written_at = self.db.now();
        let payload_json = serde_json::to_string(payload)?;

        self.db.with_conn(|conn| {
            conn.execute(
                "INSERT OR REPLACE INTO query_cache (key, payload, written_at) VALUES (?1, ?2, ?3)",
                params![key, payload_json, written_at.timestamp_millis()],
            )?;
            Ok(())
        })
    }

    /// Cached payload for `key` if it is no older than `max_age`
    pub fn read(&self, key: &str, max_age: Duration) -> StorageResult<Option<Value>> {
        let now = self.db.now();
        Ok(self
            .entry(key)?
            .filter(|entry| entry.is_fresh(now, max_age))
            .map(|entry| entry.payload))
    }

    /// The stored entry for `key`, regardless of age
    pub fn entry(&self, key: &str) -> StorageResult<Option<CacheEntry>> {
        let row: Option<(String, i64)> = self.db.with_conn(|conn| {
            Ok(conn
                .query_row(
                    "SELECT payload, written_at FROM query_cache WHERE key = ?1",
                    params![key],
                    |row| Ok((row.get(0)?, row.get(1)?)),
                )
                .optional()?)
        })?;

        let Some((payload, written_at)) = row else {
            return Ok(None);
        };

        let written_at = from_millis(written_at).ok_or_else(|| StorageError::CorruptEntry {
            id: key.to_string(),
            details: format!("invalid timestamp {}", written_at),
        })?;

        Ok(Some(CacheEntry {
            key: key.to_string(),
            payload: serde_json::from_str(&payload)?,
            written_at,
        }))
    }

    /// Keys and write times of every cached query, newest first
    pub fn entries(&self) -> StorageResult<Vec<(String, chrono::DateTime<chrono::Utc>)>> {
        let rows: Vec<(String, i64)> = self.db.with_conn(|conn| {
            let mut stmt =
                conn.prepare("SELECT key, written_at FROM query_cache ORDER BY written_at DESC")?;
            let rows = stmt
                .query_map([], |row| Ok((row.get(0)?, row.get(1)?)))?
                .collect::<Result<Vec<_>, _>>()?;
            Ok(rows)
        })?;

        Ok(rows
            .into_iter()
            .filter_map(|(key, millis)| from_millis(millis).map(|at| (key, at)))
            .collect())
    }

    /// Remove a single key
    pub fn evict(&self, key: &str) -> StorageResult<bool> {
        self.db.with_conn(|conn| {
            let changed = conn.execute("DELETE FROM query_cache WHERE key = ?1", params![key])?;
            Ok(changed > 0)
        })
    }

    /// Remove every entry whose key starts with `prefix`
    pub fn evict_all_with_prefix(&self, prefix: &str) -> StorageResult<usize> {
        self.db.with_conn(|conn| {
            // substr comparison avoids LIKE wildcards hiding in the prefix
            let removed = conn.execute(
                "DELETE FROM query_cache WHERE substr(key, 1, length(?1)) = ?1",
                params![prefix],
            )?;
            Ok(removed)
        })
    }
}

//! Mutation queue store
//!
//! Persists pending create/update/delete operations in enqueue order.
//! Only the sync coordinator flips `synced` or removes items; removal and
//! `mark_synced` are idempotent.

use rusqlite::{params, OptionalExtension, Row};
use serde_json::Value;

use crate::models::{MutationId, Operation, QueuedMutation};
use crate::storage::database::{from_millis, Database};
use crate::storage::error::{StorageError, StorageResult};

const SELECT_COLUMNS: &str =
    "SELECT id, collection, operation, payload, enqueued_at, synced FROM mutation_queue";

/// Durable, ordered list of pending writes
#[derive(Clone)]
pub struct MutationQueue {
    db: Database,
}

impl MutationQueue {
    pub fn new(db: Database) -> Self {
        Self { db }
    }

    /// Append a new unsynced mutation and return its id
    pub fn enqueue(
        &self,
        collection: &str,
        operation: Operation,
        payload: Value,
    ) -> StorageResult<MutationId> {
        self.enqueue_with_id(MutationId::new(), collection, operation, payload)
    }

    /// Append a mutation whose id was assigned by the caller
    ///
    /// Used when the id must be known before the write is queued, e.g. to
    /// stamp it on an optimistic record.
    pub fn enqueue_with_id(
        &self,
        id: MutationId,
        collection: &str,
        operation: Operation,
        payload: Value,
    ) -> StorageResult<MutationId> {
        let enqueued_at = self.db.now();
        let payload_json = serde_json::to_string(&payload)?;

        self.db.with_conn(|conn| {
            conn.execute(
                "INSERT INTO mutation_queue (id, collection, operation, payload, enqueued_at, synced)
                 VALUES (?1, ?2, ?3, ?4, ?5, 0)",
                params![
                    id.to_string(),
                    collection,
                    operation.as_str(),
                    payload_json,
                    enqueued_at.timestamp_millis()
                ],
            )?;
            Ok(())
        })?;

        Ok(id)
    }

    /// All unsynced mutations, oldest first
    pub fn list_pending(&self) -> StorageResult<Vec<QueuedMutation>> {
        self.query_list(&format!("{} WHERE synced = 0 ORDER BY seq ASC", SELECT_COLUMNS))
    }

    /// Unsynced mutations for a single collection, oldest first
    pub fn list_pending_for(&self, collection: &str) -> StorageResult<Vec<QueuedMutation>> {
        let rows = self.db.with_conn(|conn| {
            let mut stmt = conn.prepare(&format!(
                "{} WHERE synced = 0 AND collection = ?1 ORDER BY seq ASC",
                SELECT_COLUMNS
            ))?;
            let rows = stmt
                .query_map(params![collection], RawRow::read)?
                .collect::<Result<Vec<_>, _>>()?;
            Ok(rows)
        })?;
        rows.into_iter().map(RawRow::into_mutation).collect()
    }

    /// Every stored mutation (synced or not), oldest first
    pub fn list_all(&self) -> StorageResult<Vec<QueuedMutation>> {
        self.query_list(&format!("{} ORDER BY seq ASC", SELECT_COLUMNS))
    }

    /// Look up a single mutation
    pub fn get(&self, id: &MutationId) -> StorageResult<Option<QueuedMutation>> {
        let row = self.db.with_conn(|conn| {
            let row = conn
                .query_row(
                    &format!("{} WHERE id = ?1", SELECT_COLUMNS),
                    params![id.to_string()],
                    RawRow::read,
                )
                .optional()?;
            Ok(row)
        })?;
        row.map(RawRow::into_mutation).transpose()
    }

    /// Flag a mutation as accepted by the remote store
    ///
    /// Returns whether a row changed. Unknown ids are a no-op.
    pub fn mark_synced(&self, id: &MutationId) -> StorageResult<bool> {
        self.db.with_conn(|conn| {
            let changed = conn.execute(
                "UPDATE mutation_queue SET synced = 1 WHERE id = ?1 AND synced = 0",
                params![id.to_string()],
            )?;
            Ok(changed > 0)
        })
    }

    /// Remove a mutation; removing an absent id is a no-op
    pub fn remove(&self, id: &MutationId) -> StorageResult<bool> {
        self.db.with_conn(|conn| {
            let changed = conn.execute(
                "DELETE FROM mutation_queue WHERE id = ?1",
                params![id.to_string()],
            )?;
            Ok(changed > 0)
        })
    }

    /// Remove mutations that were marked synced but never removed
    pub fn purge_synced(&self) -> StorageResult<usize> {
        self.db.with_conn(|conn| {
            Ok(conn.execute("DELETE FROM mutation_queue WHERE synced = 1", [])?)
        })
    }

    /// Drop every mutation (full local reset)
    pub fn clear(&self) -> StorageResult<usize> {
        self.db
            .with_conn(|conn| Ok(conn.execute("DELETE FROM mutation_queue", [])?))
    }

    /// Number of unsynced mutations
    pub fn pending_count(&self) -> StorageResult<usize> {
        self.db.with_conn(|conn| {
            let count: i64 = conn.query_row(
                "SELECT COUNT(*) FROM mutation_queue WHERE synced = 0",
                [],
                |row| row.get(0),
            )?;
            Ok(count as usize)
        })
    }

    /// Number of stored mutations
    pub fn len(&self) -> StorageResult<usize> {
        self.db.with_conn(|conn| {
            let count: i64 =
                conn.query_row("SELECT COUNT(*) FROM mutation_queue", [], |row| row.get(0))?;
            Ok(count as usize)
        })
    }

    pub fn is_empty(&self) -> StorageResult<bool> {
        Ok(self.len()? == 0)
    }

    fn query_list(&self, sql: &str) -> StorageResult<Vec<QueuedMutation>> {
        let rows = self.db.with_conn(|conn| {
            let mut stmt = conn.prepare(sql)?;
            let rows = stmt
                .query_map([], RawRow::read)?
                .collect::<Result<Vec<_>, _>>()?;
            Ok(rows)
        })?;
        rows.into_iter().map(RawRow::into_mutation).collect()
    }
}

/// Row as stored, before validation
struct RawRow {
    id: String,
    collection: String,
    operation: String,
    payload: String,
    enqueued_at: i64,
    synced: bool,
}

impl RawRow {
    fn read(row: &Row<'_>) -> rusqlite::Result<Self> {
        Ok(Self {
            id: row.get(0)?,
            collection: row.get(1)?,
            operation: row.get(2)?,
            payload: row.get(3)?,
            enqueued_at: row.get(4)?,
            synced: row.get(5)?,
        })
    }

    fn into_mutation(self) -> StorageResult<QueuedMutation> {
        let corrupt = |details: String| StorageError::CorruptEntry {
            id: self.id.clone(),
            details,
        };

        let id: MutationId = self
            .id
            .parse()
            .map_err(|e| corrupt(format!("invalid id: {}", e)))?;
        let operation: Operation = self.operation.parse().map_err(corrupt)?;
        let payload: Value = serde_json::from_str(&self.payload)
            .map_err(|e| corrupt(format!("invalid payload: {}", e)))?;
        let enqueued_at = from_millis(self.enqueued_at)
            .ok_or_else(|| corrupt(format!("invalid timestamp {}", self.enqueued_at)))?;

        Ok(QueuedMutation {
            id,
            collection: self.collection,
            operation,
            payload,
            enqueued_at,
            synced: self.synced,
        })
    }
}

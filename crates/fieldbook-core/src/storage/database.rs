//! Shared SQLite handle
//!
//! The queue and the cache live in one database file. The connection sits
//! behind a mutex so every statement is serialized; callers clone the
//! handle freely.

use std::path::Path;
use std::sync::{Arc, Mutex};

use chrono::{DateTime, TimeZone, Utc};
use rusqlite::Connection;

use crate::clock::{Clock, SystemClock};
use crate::config::Config;
use crate::storage::error::{StorageError, StorageResult};
use crate::storage::schema::{init_schema, needs_init};

/// Handle to the local database shared by the queue and cache stores
#[derive(Clone)]
pub struct Database {
    conn: Arc<Mutex<Connection>>,
    clock: Arc<dyn Clock>,
}

impl Database {
    /// Open or create the database at the configured location
    pub fn open(config: &Config) -> StorageResult<Self> {
        Self::open_at(&config.database_path())
    }

    /// Open or create the database at a specific path
    pub fn open_at(path: &Path) -> StorageResult<Self> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)
                .map_err(|e| StorageError::from_io(e, parent.to_path_buf()))?;
        }

        let conn = Connection::open(path).map_err(|source| StorageError::Open {
            path: path.to_path_buf(),
            source,
        })?;

        if needs_init(&conn) {
            init_schema(&conn)?;
        }

        Ok(Self::from_connection(conn))
    }

    /// Open an in-memory database (for testing)
    pub fn open_in_memory() -> StorageResult<Self> {
        let conn = Connection::open_in_memory()?;
        init_schema(&conn)?;
        Ok(Self::from_connection(conn))
    }

    fn from_connection(conn: Connection) -> Self {
        Self {
            conn: Arc::new(Mutex::new(conn)),
            clock: Arc::new(SystemClock),
        }
    }

    /// Replace the clock used for timestamps
    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    /// Current time according to the configured clock
    pub fn now(&self) -> DateTime<Utc> {
        self.clock.now()
    }

    /// Run `f` with exclusive access to the connection
    pub(crate) fn with_conn<T>(
        &self,
        f: impl FnOnce(&mut Connection) -> StorageResult<T>,
    ) -> StorageResult<T> {
        let mut conn = self.conn.lock().map_err(|_| StorageError::LockPoisoned)?;
        f(&mut conn)
    }
}

/// Convert a stored millisecond timestamp back to UTC
pub(crate) fn from_millis(millis: i64) -> Option<DateTime<Utc>> {
    Utc.timestamp_millis_opt(millis).single()
}

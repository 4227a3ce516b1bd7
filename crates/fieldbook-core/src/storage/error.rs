//! Storage errors
//!
//! Everything the queue and cache can fail with. A persistence failure is
//! returned to whoever asked for the write; the layer never hides it.

use std::fmt;
use std::io;
use std::path::PathBuf;

use rusqlite::ErrorCode;
use thiserror::Error;

/// Why a filesystem operation on the data directory failed
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IoFailure {
    PermissionDenied,
    DiskFull,
    Other,
}

impl IoFailure {
    fn classify(error: &io::Error) -> Self {
        if error.kind() == io::ErrorKind::PermissionDenied {
            return IoFailure::PermissionDenied;
        }
        let msg = error.to_string().to_lowercase();
        if ["no space left", "disk full", "quota exceeded", "not enough space"]
            .iter()
            .any(|needle| msg.contains(needle))
        {
            return IoFailure::DiskFull;
        }
        IoFailure::Other
    }
}

impl fmt::Display for IoFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            IoFailure::PermissionDenied => "permission denied",
            IoFailure::DiskFull => "disk full",
            IoFailure::Other => "i/o error",
        })
    }
}

/// Errors from the local queue and cache database
#[derive(Error, Debug)]
pub enum StorageError {
    #[error("Cannot prepare data directory '{path}' ({kind}): {source}")]
    Directory {
        path: PathBuf,
        kind: IoFailure,
        #[source]
        source: io::Error,
    },

    #[error("Cannot open local database '{path}': {source}")]
    Open {
        path: PathBuf,
        #[source]
        source: rusqlite::Error,
    },

    /// Another connection holds a write lock
    #[error("Local database is busy: {0}")]
    Busy(#[source] rusqlite::Error),

    #[error("SQLite error: {0}")]
    Sqlite(#[source] rusqlite::Error),

    #[error("Payload is not valid JSON: {0}")]
    Json(#[from] serde_json::Error),

    /// A stored row no longer decodes
    #[error("Unreadable entry '{id}': {details}")]
    CorruptEntry { id: String, details: String },

    #[error("Local database handle poisoned by an earlier panic")]
    LockPoisoned,
}

impl From<rusqlite::Error> for StorageError {
    fn from(error: rusqlite::Error) -> Self {
        match &error {
            rusqlite::Error::SqliteFailure(e, _)
                if matches!(e.code, ErrorCode::DatabaseBusy | ErrorCode::DatabaseLocked) =>
            {
                StorageError::Busy(error)
            }
            _ => StorageError::Sqlite(error),
        }
    }
}

impl StorageError {
    /// Wrap a filesystem error on `path`, classifying its cause
    pub fn from_io(error: io::Error, path: PathBuf) -> Self {
        StorageError::Directory {
            path,
            kind: IoFailure::classify(&error),
            source: error,
        }
    }

    /// Whether retrying the same call later may succeed
    pub fn is_transient(&self) -> bool {
        matches!(
            self,
            StorageError::Busy(_)
                | StorageError::Directory {
                    kind: IoFailure::DiskFull,
                    ..
                }
        )
    }

    /// A hint for the operator, when there is a useful one
    pub fn recovery_suggestion(&self) -> Option<&'static str> {
        match self {
            StorageError::Directory { kind, .. } => Some(match kind {
                IoFailure::DiskFull => "Free up disk space and try again.",
                IoFailure::PermissionDenied => {
                    "Check ownership and permissions of the data directory, or point data_dir elsewhere."
                }
                IoFailure::Other => "Check that the data directory path is valid and writable.",
            }),
            StorageError::Busy(_) => {
                Some("Another fieldbook process is using the database. Retry once it finishes.")
            }
            StorageError::CorruptEntry { .. } => Some(
                "A queued write cannot be read. Run `fieldbook queue clear` to discard pending writes.",
            ),
            _ => None,
        }
    }
}

/// Result type for storage operations
pub type StorageResult<T> = Result<T, StorageError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_io_classification() {
        let denied = StorageError::from_io(
            io::Error::new(io::ErrorKind::PermissionDenied, "access denied"),
            PathBuf::from("/srv/fieldbook"),
        );
        assert!(matches!(
            denied,
            StorageError::Directory {
                kind: IoFailure::PermissionDenied,
                ..
            }
        ));
        assert!(!denied.is_transient());

        let full = StorageError::from_io(
            io::Error::new(io::ErrorKind::Other, "No space left on device"),
            PathBuf::from("/full"),
        );
        assert!(full.is_transient());
        assert!(full.to_string().contains("disk full"));

        let other = StorageError::from_io(
            io::Error::new(io::ErrorKind::Other, "read-only file system"),
            PathBuf::from("/ro"),
        );
        assert!(matches!(
            other,
            StorageError::Directory {
                kind: IoFailure::Other,
                ..
            }
        ));
    }

    #[test]
    fn test_busy_database_is_transient() {
        let busy = rusqlite::Error::SqliteFailure(
            rusqlite::ffi::Error::new(rusqlite::ffi::SQLITE_BUSY),
            None,
        );
        let err = StorageError::from(busy);
        assert!(matches!(err, StorageError::Busy(_)));
        assert!(err.is_transient());

        let err = StorageError::from(rusqlite::Error::QueryReturnedNoRows);
        assert!(matches!(err, StorageError::Sqlite(_)));
        assert!(err.recovery_suggestion().is_none());
    }

    #[test]
    fn test_corrupt_entry_suggests_queue_clear() {
        let err = StorageError::CorruptEntry {
            id: "abc".to_string(),
            details: "unknown operation 'merge'".to_string(),
        };

        assert!(err.to_string().contains("abc"));
        assert!(err.recovery_suggestion().unwrap().contains("queue clear"));
    }
}

//! Data models for the offline layer
//!
//! Defines the queued write operations, cached query results, and the
//! network status reported by connectivity probes.

use std::fmt;
use std::str::FromStr;
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use uuid::Uuid;

/// Field holding a record's identifier in every payload
pub const ID_FIELD: &str = "id";

/// Identifier of a queued mutation
///
/// Assigned at enqueue time and stable for the item's lifetime.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct MutationId(Uuid);

impl MutationId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }

    pub fn as_uuid(&self) -> &Uuid {
        &self.0
    }
}

impl Default for MutationId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for MutationId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl FromStr for MutationId {
    type Err = uuid::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Uuid::parse_str(s).map(Self)
    }
}

/// Kind of write applied to a collection
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Operation {
    Create,
    Update,
    Delete,
}

impl Operation {
    pub fn as_str(&self) -> &'static str {
        match self {
            Operation::Create => "create",
            Operation::Update => "update",
            Operation::Delete => "delete",
        }
    }

    /// Whether the payload must carry the target record's identifier
    pub fn requires_record_id(&self) -> bool {
        matches!(self, Operation::Update | Operation::Delete)
    }
}

impl fmt::Display for Operation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Operation {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "create" | "insert" => Ok(Operation::Create),
            "update" | "patch" => Ok(Operation::Update),
            "delete" | "remove" => Ok(Operation::Delete),
            other => Err(format!("Unknown operation: {}", other)),
        }
    }
}

/// A pending write against a named collection
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct QueuedMutation {
    /// Unique identifier, assigned at enqueue time
    pub id: MutationId,
    /// Target record set
    pub collection: String,
    /// What to do with the payload
    pub operation: Operation,
    /// Record fields to write (includes the record id for update/delete)
    pub payload: Value,
    /// When the mutation was enqueued
    pub enqueued_at: DateTime<Utc>,
    /// Set only after the remote store accepted the operation
    pub synced: bool,
}

impl QueuedMutation {
    /// Create a new, unsynced mutation
    pub fn new(
        collection: impl Into<String>,
        operation: Operation,
        payload: Value,
        enqueued_at: DateTime<Utc>,
    ) -> Self {
        Self {
            id: MutationId::new(),
            collection: collection.into(),
            operation,
            payload,
            enqueued_at,
            synced: false,
        }
    }

    /// Identifier of the record this mutation targets, if the payload has one
    pub fn record_id(&self) -> Option<String> {
        record_id_of(&self.payload)
    }
}

/// Last-known-good result of a named query
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct CacheEntry {
    /// Logical query name
    pub key: String,
    /// Caller-defined value, opaque to the cache
    pub payload: Value,
    /// When the fetch that produced `payload` completed
    pub written_at: DateTime<Utc>,
}

impl CacheEntry {
    /// Age of the entry at `now` (zero if written in the future)
    pub fn age(&self, now: DateTime<Utc>) -> Duration {
        (now - self.written_at).to_std().unwrap_or(Duration::ZERO)
    }

    /// Fresh while `now - written_at <= max_age`
    pub fn is_fresh(&self, now: DateTime<Utc>, max_age: Duration) -> bool {
        self.age(now) <= max_age
    }
}

/// Point-in-time reading from the connectivity primitive
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct NetworkStatus {
    /// Device is attached to a network
    pub connected: bool,
    /// That network reaches the internet; `None` while undetermined
    pub internet_reachable: Option<bool>,
}

impl NetworkStatus {
    pub const OFFLINE: NetworkStatus = NetworkStatus {
        connected: false,
        internet_reachable: Some(false),
    };

    pub const ONLINE: NetworkStatus = NetworkStatus {
        connected: true,
        internet_reachable: Some(true),
    };

    /// Both attached and reachable; an unknown reachability is not online
    pub fn is_online(&self) -> bool {
        self.connected && self.internet_reachable == Some(true)
    }
}

/// A record type served through a [`crate::Resource`]
pub trait Record: Clone + Send + Sync + Serialize + DeserializeOwned + 'static {
    /// Identifier used to patch and delete the record
    fn record_id(&self) -> String;
}

impl Record for Value {
    fn record_id(&self) -> String {
        record_id_of(self).unwrap_or_default()
    }
}

/// Extract the `id` field of a JSON payload (string or number)
pub fn record_id_of(payload: &Value) -> Option<String> {
    match payload.get(ID_FIELD)? {
        Value::String(s) if !s.is_empty() => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        _ => None,
    }
}

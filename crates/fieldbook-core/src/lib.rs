//! Fieldbook Core Library
//!
//! Offline-first data layer for field apps: screens keep working without a
//! network, local writes show up immediately, and queued writes reach the
//! remote store once connectivity returns.
//!
//! # Architecture
//!
//! - **Mutation queue**: durable FIFO of pending writes (SQLite)
//! - **Query cache**: last-known-good results with write timestamps (SQLite)
//! - **Connectivity monitor**: reachability checks and debounced reconnect events
//! - **Sync coordinator**: single-flight drain of the queue
//! - **Sync scheduler**: drains on a timer and on reconnect
//! - **Resource**: per-collection facade with cache fallback and optimistic writes
//!
//! # Quick Start
//!
//! ```text
//! let layer = OfflineLayer::open(&Config::load()?)?;
//! let _scheduler = layer.start_scheduler();
//!
//! let clients = layer.collection::<serde_json::Value>("clients");
//! let loaded = clients.load().await?;
//! clients.mutate_optimistic(Operation::Create, json!({"name": "Ana"}))?;
//! ```
//!
//! # Modules
//!
//! - `layer`: the shared service object (main entry point)
//! - `resource`: data access facade
//! - `sync`: coordinator and scheduler
//! - `connectivity`: reachability probe and monitor
//! - `remote`: remote store interface and HTTP adapter
//! - `storage`: SQLite persistence for the queue and cache
//! - `models`: queued mutations, cache entries, network status
//! - `config`: application configuration

pub mod clock;
pub mod config;
pub mod connectivity;
pub mod layer;
pub mod models;
pub mod remote;
pub mod resource;
pub mod storage;
pub mod sync;

#[cfg(test)]
pub(crate) mod testing;

pub use clock::{Clock, ManualClock, SystemClock};
pub use config::Config;
pub use connectivity::{
    ConnectivityMonitor, ConnectivityProbe, HttpProbe, ManualProbe, MonitorConfig,
    OnlineSubscription,
};
pub use layer::{LayerError, LayerStatus, OfflineLayer, ResetReport};
pub use models::{CacheEntry, MutationId, NetworkStatus, Operation, QueuedMutation, Record};
pub use remote::{HttpRemoteStore, RemoteError, RemoteStore};
pub use resource::{
    DataSource, Loaded, Resource, ResourceContext, ResourceError, ResourceOptions, ResourceWatch,
    WriteTracker,
};
pub use storage::{Database, MutationQueue, QueryCache, StorageError};
pub use sync::{DrainOutcome, DrainReport, DrainState, SchedulerHandle, SyncCoordinator, SyncScheduler};

//! Offline layer
//!
//! `OfflineLayer` owns the shared pieces: one database holding the
//! mutation queue and the query cache, the remote store, the connectivity
//! monitor, and the sync coordinator. It is built once at start-up and
//! cloned into whatever needs it; every clone shares the same state.
//!
//! ```ignore
//! let layer = OfflineLayer::open(&config)?;
//! let _scheduler = layer.start_scheduler();
//!
//! let clients = layer.collection::<Client>("clients");
//! let loaded = clients.load().await?;
//! clients.mutate_optimistic(Operation::Create, json!({"name": "Ana"}))?;
//! ```

use std::sync::Arc;
use std::time::Duration;

use serde::Serialize;
use thiserror::Error;
use tracing::info;

use crate::config::Config;
use crate::connectivity::{ConnectivityMonitor, ConnectivityProbe, HttpProbe, MonitorConfig};
use crate::models::Record;
use crate::remote::{HttpRemoteStore, RemoteError, RemoteStore};
use crate::resource::{Resource, ResourceContext, ResourceOptions, WriteTracker};
use crate::storage::{Database, MutationQueue, QueryCache, StorageError, StorageResult};
use crate::sync::{DrainOutcome, SchedulerHandle, SyncCoordinator, SyncScheduler};

/// Errors opening the layer
#[derive(Error, Debug)]
pub enum LayerError {
    #[error(transparent)]
    Storage(#[from] StorageError),

    #[error(transparent)]
    Remote(#[from] RemoteError),
}

/// Snapshot for an "offline" / "syncing" indicator
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct LayerStatus {
    pub online: bool,
    pub draining: bool,
    pub pending: usize,
}

/// What a local reset removed
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct ResetReport {
    pub mutations: usize,
    pub cache_entries: usize,
}

/// Shared offline-first data layer
#[derive(Clone)]
pub struct OfflineLayer {
    queue: MutationQueue,
    cache: QueryCache,
    remote: Arc<dyn RemoteStore>,
    monitor: ConnectivityMonitor,
    coordinator: SyncCoordinator,
    writes: WriteTracker,
    options: ResourceOptions,
    sync_interval: Duration,
    cache_prefix: String,
}

impl OfflineLayer {
    /// Open the layer described by `config`
    ///
    /// Uses the configured database, an HTTP remote store at `remote_url`,
    /// and a reachability probe against the same URL.
    pub fn open(config: &Config) -> Result<Self, LayerError> {
        let url = config
            .remote_url
            .as_deref()
            .ok_or(RemoteError::NotConfigured)?;

        let database = Database::open(config)?;
        let remote = HttpRemoteStore::new(url, config.api_key.clone())?;
        let probe = HttpProbe::new(url, config.probe_timeout()).map_err(RemoteError::from)?;
        let monitor = ConnectivityMonitor::new(
            Arc::new(probe),
            MonitorConfig {
                poll_interval: Some(config.poll_interval()),
                debounce: config.debounce(),
            },
        );

        Ok(Self::new(config, database, Arc::new(remote), monitor))
    }

    /// Assemble the layer from explicit parts
    pub fn new(
        config: &Config,
        database: Database,
        remote: Arc<dyn RemoteStore>,
        monitor: ConnectivityMonitor,
    ) -> Self {
        let queue = MutationQueue::new(database.clone());
        let cache = QueryCache::new(database);
        let coordinator = SyncCoordinator::new(queue.clone(), remote.clone(), monitor.clone());

        Self {
            queue,
            cache,
            remote,
            monitor,
            coordinator,
            writes: WriteTracker::new(),
            options: ResourceOptions {
                refresh_interval: config.refresh_interval(),
                max_cache_age: config.max_cache_age(),
            },
            sync_interval: config.sync_interval(),
            cache_prefix: config.cache_prefix.clone(),
        }
    }

    /// Convenience constructor wiring a probe into a monitor
    pub fn with_probe(
        config: &Config,
        database: Database,
        remote: Arc<dyn RemoteStore>,
        probe: Arc<dyn ConnectivityProbe>,
    ) -> Self {
        let monitor = ConnectivityMonitor::new(
            probe,
            MonitorConfig {
                poll_interval: Some(config.poll_interval()),
                debounce: config.debounce(),
            },
        );
        Self::new(config, database, remote, monitor)
    }

    pub fn queue(&self) -> &MutationQueue {
        &self.queue
    }

    pub fn cache(&self) -> &QueryCache {
        &self.cache
    }

    pub fn remote(&self) -> &Arc<dyn RemoteStore> {
        &self.remote
    }

    pub fn monitor(&self) -> &ConnectivityMonitor {
        &self.monitor
    }

    pub fn coordinator(&self) -> &SyncCoordinator {
        &self.coordinator
    }

    /// Cache key for a named query
    pub fn cache_key(&self, name: &str) -> String {
        format!("{}{}", self.cache_prefix, name)
    }

    fn context(&self) -> ResourceContext {
        ResourceContext {
            cache: self.cache.clone(),
            queue: self.queue.clone(),
            monitor: self.monitor.clone(),
            coordinator: self.coordinator.clone(),
            writes: self.writes.clone(),
        }
    }

    /// Facade over `collection` with a custom fetch function
    pub fn resource<T, F, Fut>(&self, collection: &str, query: &str, fetch: F) -> Resource<T>
    where
        T: Record,
        F: Fn() -> Fut + Send + Sync + 'static,
        Fut: std::future::Future<Output = Result<Vec<T>, RemoteError>> + Send + 'static,
    {
        self.resource_with_options(collection, query, self.options, fetch)
    }

    /// Same as [`Self::resource`] with explicit freshness settings
    pub fn resource_with_options<T, F, Fut>(
        &self,
        collection: &str,
        query: &str,
        options: ResourceOptions,
        fetch: F,
    ) -> Resource<T>
    where
        T: Record,
        F: Fn() -> Fut + Send + Sync + 'static,
        Fut: std::future::Future<Output = Result<Vec<T>, RemoteError>> + Send + 'static,
    {
        Resource::new(
            self.context(),
            collection,
            self.cache_key(query),
            options,
            fetch,
        )
    }

    /// Facade listing a whole collection from the remote store
    pub fn collection<T: Record>(&self, collection: &str) -> Resource<T> {
        let remote = Arc::clone(&self.remote);
        let name = collection.to_string();

        self.resource(collection, collection, move || {
            let remote = Arc::clone(&remote);
            let name = name.clone();
            async move {
                remote
                    .list(&name)
                    .await?
                    .into_iter()
                    .map(|row| {
                        serde_json::from_value(row)
                            .map_err(|e| RemoteError::InvalidResponse(e.to_string()))
                    })
                    .collect::<Result<Vec<T>, RemoteError>>()
            }
        })
    }

    /// Drain the queue now (explicit "retry sync")
    pub async fn flush_now(&self) -> DrainOutcome {
        self.coordinator.flush_now().await
    }

    /// Start the periodic and on-reconnect drain triggers
    pub fn start_scheduler(&self) -> SchedulerHandle {
        SyncScheduler::start(self.coordinator.clone(), &self.monitor, self.sync_interval)
    }

    /// Current indicator state
    pub async fn status(&self) -> StorageResult<LayerStatus> {
        Ok(LayerStatus {
            online: self.monitor.is_online().await,
            draining: self.coordinator.is_draining(),
            pending: self.queue.pending_count()?,
        })
    }

    /// Drop every queued mutation and cached query (e.g. on sign-out)
    pub fn reset(&self) -> StorageResult<ResetReport> {
        let report = ResetReport {
            mutations: self.queue.clear()?,
            cache_entries: self.cache.evict_all_with_prefix(&self.cache_prefix)?,
        };
        info!(
            "Local state reset: {} mutation(s), {} cache entries removed",
            report.mutations, report.cache_entries
        );
        Ok(report)
    }
}

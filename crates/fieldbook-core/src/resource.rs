//! Data access facade
//!
//! A `Resource` is what screens talk to. It serves one collection through
//! the query cache, keeps an in-memory view of the records, and turns local
//! writes into queued mutations that are visible immediately.
//!
//! ## Loading
//!
//! - Online: a cache entry younger than `refresh_interval` is served as is;
//!   otherwise the fetch function runs and its result replaces the cache.
//!   A failed fetch falls back to any cache entry within `max_cache_age`.
//! - Offline: only the cache is consulted; the fetch function never runs.
//!
//! Mutations still waiting in the queue are replayed over whatever was
//! loaded, so a reload never hides an optimistic change.

use std::collections::HashMap;
use std::future::Future;
use std::pin::Pin;
use std::sync::{Arc, Mutex, MutexGuard, RwLock};
use std::time::Duration;

use serde::Serialize;
use serde_json::Value;
use thiserror::Error;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio::time::{interval_at, Instant, MissedTickBehavior};
use tracing::{debug, warn};

use crate::connectivity::ConnectivityMonitor;
use crate::models::{record_id_of, MutationId, Operation, Record, ID_FIELD};
use crate::remote::RemoteError;
use crate::storage::{MutationQueue, QueryCache, StorageError};
use crate::sync::SyncCoordinator;

/// Errors surfaced by a resource
#[derive(Error, Debug)]
pub enum ResourceError {
    #[error("No data available for '{key}': remote unavailable and nothing cached")]
    NoData { key: String },

    #[error("Invalid {operation} mutation: {reason}")]
    InvalidMutation {
        operation: &'static str,
        reason: String,
    },

    #[error("Cached data for '{key}' is unreadable: {source}")]
    Decode {
        key: String,
        #[source]
        source: serde_json::Error,
    },

    #[error(transparent)]
    Storage(#[from] StorageError),
}

pub type FetchFuture<T> = Pin<Box<dyn Future<Output = Result<Vec<T>, RemoteError>> + Send>>;

type FetchFn<T> = Arc<dyn Fn() -> FetchFuture<T> + Send + Sync>;

/// Freshness settings for a resource
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ResourceOptions {
    /// Online loads reuse a cache entry younger than this
    pub refresh_interval: Duration,
    /// Oldest cache entry that may be served at all
    pub max_cache_age: Duration,
}

impl Default for ResourceOptions {
    fn default() -> Self {
        Self {
            refresh_interval: Duration::from_secs(60),
            max_cache_age: Duration::from_secs(24 * 60 * 60),
        }
    }
}

/// Where loaded data came from
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum DataSource {
    Remote,
    Cache,
}

/// Records returned by a load
#[derive(Debug, Clone)]
pub struct Loaded<T> {
    pub data: Vec<T>,
    pub source: DataSource,
}

/// Shared handles a resource needs
#[derive(Clone)]
pub struct ResourceContext {
    pub cache: QueryCache,
    pub queue: MutationQueue,
    pub monitor: ConnectivityMonitor,
    pub coordinator: SyncCoordinator,
    pub writes: WriteTracker,
}

/// Local-write bookkeeping shared by every facade over the same stores
///
/// A cache entry may stand in for a fetch only if it was fetched after the
/// last local write to its collection had drained.
#[derive(Clone, Default)]
pub struct WriteTracker {
    inner: Arc<Mutex<TrackerState>>,
}

#[derive(Default)]
struct TrackerState {
    /// Bumped on every local write to a collection
    generations: HashMap<String, u64>,
    /// Generation each cache key was verified at; `None` marks it stale
    verified: HashMap<String, Option<u64>>,
}

impl TrackerState {
    fn generation(&self, collection: &str) -> u64 {
        self.generations.get(collection).copied().unwrap_or(0)
    }
}

impl WriteTracker {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, TrackerState> {
        self.inner.lock().unwrap_or_else(|e| e.into_inner())
    }

    pub fn generation(&self, collection: &str) -> u64 {
        self.lock().generation(collection)
    }

    pub fn record_write(&self, collection: &str) {
        *self.lock().generations.entry(collection.to_string()).or_insert(0) += 1;
    }

    /// Whether `key` reflects every local write to `collection`
    ///
    /// Keys never fetched in this process are trusted until the first write.
    pub fn is_current(&self, collection: &str, key: &str) -> bool {
        let state = self.lock();
        let generation = state.generation(collection);
        match state.verified.get(key) {
            Some(Some(at)) => *at == generation,
            Some(None) => false,
            None => generation == 0,
        }
    }

    fn record_fetch(&self, key: &str, verified_at: Option<u64>) {
        self.lock().verified.insert(key.to_string(), verified_at);
    }
}

/// Cached, optimistic view of one collection
#[derive(Clone)]
pub struct Resource<T: Record> {
    collection: String,
    key: String,
    fetch: FetchFn<T>,
    options: ResourceOptions,
    ctx: ResourceContext,
    view: Arc<RwLock<Vec<T>>>,
}

impl<T: Record> Resource<T> {
    pub fn new<F, Fut>(
        ctx: ResourceContext,
        collection: impl Into<String>,
        cache_key: impl Into<String>,
        options: ResourceOptions,
        fetch: F,
    ) -> Self
    where
        F: Fn() -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<Vec<T>, RemoteError>> + Send + 'static,
    {
        Self {
            collection: collection.into(),
            key: cache_key.into(),
            fetch: Arc::new(move || -> FetchFuture<T> { Box::pin(fetch()) }),
            options,
            ctx,
            view: Arc::new(RwLock::new(Vec::new())),
        }
    }

    pub fn collection(&self) -> &str {
        &self.collection
    }

    pub fn cache_key(&self) -> &str {
        &self.key
    }

    pub fn options(&self) -> ResourceOptions {
        self.options
    }

    /// Current in-memory view
    pub fn snapshot(&self) -> Vec<T> {
        self.view.read().unwrap_or_else(|e| e.into_inner()).clone()
    }

    /// Load through the cache
    pub async fn load(&self) -> Result<Loaded<T>, ResourceError> {
        let loaded = if self.ctx.monitor.is_online().await {
            match self.fresh_cache()? {
                Some(data) => Loaded {
                    data,
                    source: DataSource::Cache,
                },
                None => self.fetch_or_fallback().await?,
            }
        } else {
            debug!("Offline, serving '{}' from cache", self.key);
            self.cached_or_no_data()?
        };

        self.publish(loaded)
    }

    /// Load, bypassing the fresh-cache shortcut when online
    pub async fn refresh(&self) -> Result<Loaded<T>, ResourceError> {
        let loaded = if self.ctx.monitor.is_online().await {
            self.fetch_or_fallback().await?
        } else {
            self.cached_or_no_data()?
        };

        self.publish(loaded)
    }

    /// Apply a write locally, queue it, and request a drain
    ///
    /// The change is in the view when this returns. A create without an
    /// `id` gets the mutation id as its record id. If queueing fails the
    /// error is returned but the view keeps the change.
    pub fn mutate_optimistic(
        &self,
        operation: Operation,
        mut payload: Value,
    ) -> Result<MutationId, ResourceError> {
        let invalid = |reason: &str| ResourceError::InvalidMutation {
            operation: operation.as_str(),
            reason: reason.to_string(),
        };

        if !payload.is_object() {
            return Err(invalid("payload must be a JSON object"));
        }

        let mutation_id = MutationId::new();
        if operation.requires_record_id() {
            if record_id_of(&payload).is_none() {
                return Err(invalid("payload has no record id"));
            }
        } else if let Some(fields) = payload.as_object_mut() {
            fields
                .entry(ID_FIELD)
                .or_insert_with(|| Value::String(mutation_id.to_string()));
        }

        {
            let mut view = self.view.write().unwrap_or_else(|e| e.into_inner());
            apply_mutation(&mut view, operation, &payload)
                .map_err(|e| invalid(&e.to_string()))?;
        }
        self.ctx.writes.record_write(&self.collection);

        self.ctx
            .queue
            .enqueue_with_id(mutation_id, &self.collection, operation, payload)?;
        debug!(
            "Queued {} on '{}' ({})",
            operation.as_str(),
            self.collection,
            mutation_id
        );

        self.request_drain();
        Ok(mutation_id)
    }

    /// Reload on every refresh interval and whenever the network returns
    ///
    /// Must be called inside a tokio runtime. Dropping the returned handle
    /// stops watching.
    pub fn watch(&self) -> ResourceWatch<T> {
        let (tx, rx) = mpsc::unbounded_channel();
        let resource = self.clone();
        let mut online = self.ctx.monitor.on_became_online();
        let period = self.options.refresh_interval.max(Duration::from_millis(1));

        let task = tokio::spawn(async move {
            let mut ticker = interval_at(Instant::now() + period, period);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

            loop {
                let result = tokio::select! {
                    _ = ticker.tick() => resource.load().await,
                    event = online.recv() => {
                        if event.is_none() {
                            break;
                        }
                        resource.refresh().await
                    }
                };

                match result {
                    Ok(loaded) => {
                        if tx.send(loaded).is_err() {
                            break;
                        }
                    }
                    Err(e) => warn!("Reload of '{}' failed: {}", resource.key, e),
                }
            }
        });

        ResourceWatch { task, rx }
    }

    fn fresh_cache(&self) -> Result<Option<Vec<T>>, ResourceError> {
        if !self.ctx.writes.is_current(&self.collection, &self.key) || self.has_pending()? {
            return Ok(None);
        }
        self.read_cache(self.options.refresh_interval)
    }

    fn has_pending(&self) -> Result<bool, ResourceError> {
        Ok(!self.ctx.queue.list_pending_for(&self.collection)?.is_empty())
    }

    async fn fetch_or_fallback(&self) -> Result<Loaded<T>, ResourceError> {
        let generation = self.ctx.writes.generation(&self.collection);
        let pending_before = self.has_pending()?;

        match (self.fetch)().await {
            Ok(data) => {
                // Writes still in flight may land after this response was built
                let settled =
                    !pending_before && generation == self.ctx.writes.generation(&self.collection);
                self.ctx
                    .writes
                    .record_fetch(&self.key, settled.then_some(generation));
                match serde_json::to_value(&data) {
                    Ok(payload) => {
                        if let Err(e) = self.ctx.cache.write(&self.key, &payload) {
                            warn!("Failed to cache '{}': {}", self.key, e);
                        }
                    }
                    Err(e) => warn!("Failed to encode '{}' for cache: {}", self.key, e),
                }
                Ok(Loaded {
                    data,
                    source: DataSource::Remote,
                })
            }
            Err(e) => {
                warn!("Fetch for '{}' failed, falling back to cache: {}", self.key, e);
                self.cached_or_no_data()
            }
        }
    }

    fn cached_or_no_data(&self) -> Result<Loaded<T>, ResourceError> {
        match self.read_cache(self.options.max_cache_age)? {
            Some(data) => Ok(Loaded {
                data,
                source: DataSource::Cache,
            }),
            None => Err(ResourceError::NoData {
                key: self.key.clone(),
            }),
        }
    }

    fn read_cache(&self, max_age: Duration) -> Result<Option<Vec<T>>, ResourceError> {
        let Some(payload) = self.ctx.cache.read(&self.key, max_age)? else {
            return Ok(None);
        };
        serde_json::from_value(payload)
            .map(Some)
            .map_err(|source| ResourceError::Decode {
                key: self.key.clone(),
                source,
            })
    }

    /// Replay pending mutations over `loaded` and install it as the view
    fn publish(&self, mut loaded: Loaded<T>) -> Result<Loaded<T>, ResourceError> {
        for mutation in self.ctx.queue.list_pending_for(&self.collection)? {
            if let Err(e) = apply_mutation(&mut loaded.data, mutation.operation, &mutation.payload)
            {
                warn!("Cannot replay pending mutation {}: {}", mutation.id, e);
            }
        }

        *self.view.write().unwrap_or_else(|e| e.into_inner()) = loaded.data.clone();
        Ok(loaded)
    }

    fn request_drain(&self) {
        let Ok(runtime) = tokio::runtime::Handle::try_current() else {
            debug!("No async runtime; drain deferred to the scheduler");
            return;
        };
        let coordinator = self.ctx.coordinator.clone();
        runtime.spawn(async move {
            coordinator.request_drain().await;
        });
    }
}

/// Handle returned by [`Resource::watch`]
pub struct ResourceWatch<T> {
    task: JoinHandle<()>,
    rx: mpsc::UnboundedReceiver<Loaded<T>>,
}

impl<T> ResourceWatch<T> {
    /// Wait for the next reload
    pub async fn next(&mut self) -> Option<Loaded<T>> {
        self.rx.recv().await
    }
}

impl<T> Drop for ResourceWatch<T> {
    fn drop(&mut self) {
        self.task.abort();
    }
}

/// Apply one mutation to a list of records
///
/// Creates skip records whose id is already present, so replaying a
/// mutation that has since reached the remote is harmless.
fn apply_mutation<T: Record>(
    records: &mut Vec<T>,
    operation: Operation,
    payload: &Value,
) -> Result<(), serde_json::Error> {
    let id = record_id_of(payload);

    match operation {
        Operation::Create => {
            let record: T = serde_json::from_value(payload.clone())?;
            let exists = records
                .iter()
                .any(|r| Some(r.record_id()) == id || r.record_id() == record.record_id());
            if !exists {
                records.push(record);
            }
        }
        Operation::Update => {
            let Some(id) = id else { return Ok(()) };
            for record in records.iter_mut().filter(|r| r.record_id() == id) {
                let mut merged = serde_json::to_value(&*record)?;
                if let (Some(target), Some(fields)) = (merged.as_object_mut(), payload.as_object()) {
                    for (k, v) in fields {
                        target.insert(k.clone(), v.clone());
                    }
                }
                *record = serde_json::from_value(merged)?;
            }
        }
        Operation::Delete => {
            let Some(id) = id else { return Ok(()) };
            records.retain(|r| r.record_id() != id);
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::ManualClock;
    use crate::connectivity::ManualProbe;
    use crate::remote::RemoteStore;
    use crate::storage::Database;
    use crate::testing::{go, push_only_monitor, FakeRemote};
    use chrono::{TimeZone, Utc};
    use serde::Deserialize;
    use serde_json::json;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
    struct Client {
        id: String,
        name: String,
    }

    impl Record for Client {
        fn record_id(&self) -> String {
            self.id.clone()
        }
    }

    struct Fixture {
        ctx: ResourceContext,
        db: Database,
        remote: Arc<FakeRemote>,
        probe: Arc<ManualProbe>,
        clock: Arc<ManualClock>,
    }

    fn fixture(online: bool) -> Fixture {
        let clock = Arc::new(ManualClock::new(
            Utc.with_ymd_and_hms(2024, 6, 1, 10, 0, 0).unwrap(),
        ));
        let db = Database::open_in_memory().unwrap().with_clock(clock.clone());
        let queue = MutationQueue::new(db.clone());
        let remote = FakeRemote::new();
        let probe = Arc::new(if online {
            ManualProbe::online()
        } else {
            ManualProbe::offline()
        });
        let monitor = push_only_monitor(probe.clone());
        let coordinator = SyncCoordinator::new(queue.clone(), remote.clone(), monitor.clone());

        Fixture {
            ctx: ResourceContext {
                cache: QueryCache::new(db.clone()),
                queue,
                monitor,
                coordinator,
                writes: WriteTracker::new(),
            },
            db,
            remote,
            probe,
            clock,
        }
    }

    fn clients(fx: &Fixture) -> Resource<Client> {
        let remote = fx.remote.clone();
        Resource::new(
            fx.ctx.clone(),
            "clients",
            "cache:clients",
            ResourceOptions {
                refresh_interval: Duration::from_secs(60),
                max_cache_age: Duration::from_secs(3600),
            },
            move || {
                let remote = remote.clone();
                async move {
                    let rows = remote.list("clients").await?;
                    rows.into_iter()
                        .map(|row| {
                            serde_json::from_value(row)
                                .map_err(|e| RemoteError::InvalidResponse(e.to_string()))
                        })
                        .collect::<Result<Vec<Client>, RemoteError>>()
                }
            },
        )
    }

    fn names(records: &[Client]) -> Vec<&str> {
        records.iter().map(|c| c.name.as_str()).collect()
    }

    #[tokio::test]
    async fn test_online_load_fetches_and_caches() {
        let fx = fixture(true);
        fx.remote.seed("clients", vec![json!({"id": "1", "name": "Ana"})]);
        let resource = clients(&fx);

        let loaded = resource.load().await.unwrap();
        assert_eq!(loaded.source, DataSource::Remote);
        assert_eq!(names(&loaded.data), vec!["Ana"]);
        assert!(fx.ctx.cache.entry("cache:clients").unwrap().is_some());
        assert_eq!(names(&resource.snapshot()), vec!["Ana"]);
    }

    #[tokio::test]
    async fn test_fresh_cache_is_reused_until_refresh_interval() {
        let fx = fixture(true);
        fx.remote.seed("clients", vec![json!({"id": "1", "name": "Ana"})]);
        let resource = clients(&fx);

        resource.load().await.unwrap();
        let again = resource.load().await.unwrap();
        assert_eq!(again.source, DataSource::Cache);
        assert_eq!(fx.remote.list_calls(), 1);

        fx.clock.advance(Duration::from_secs(61));
        let later = resource.load().await.unwrap();
        assert_eq!(later.source, DataSource::Remote);
        assert_eq!(fx.remote.list_calls(), 2);

        resource.refresh().await.unwrap();
        assert_eq!(fx.remote.list_calls(), 3);
    }

    #[tokio::test]
    async fn test_offline_load_never_fetches() {
        let calls = Arc::new(AtomicUsize::new(0));
        let fx = fixture(false);
        let counted = calls.clone();
        let resource: Resource<Client> = Resource::new(
            fx.ctx.clone(),
            "clients",
            "cache:clients",
            ResourceOptions::default(),
            move || {
                counted.fetch_add(1, Ordering::SeqCst);
                async { Ok(Vec::new()) }
            },
        );

        // Absent cache
        assert!(matches!(
            resource.load().await,
            Err(ResourceError::NoData { .. })
        ));

        // Stale cache
        fx.ctx
            .cache
            .write("cache:clients", &json!([{"id": "1", "name": "Ana"}]))
            .unwrap();
        fx.clock.advance(Duration::from_secs(2 * 24 * 60 * 60));
        assert!(resource.load().await.is_err());
        assert!(resource.refresh().await.is_err());

        assert_eq!(calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_offline_load_serves_cache() {
        let fx = fixture(false);
        fx.ctx
            .cache
            .write("cache:clients", &json!([{"id": "1", "name": "Ana"}]))
            .unwrap();
        let resource = clients(&fx);

        let loaded = resource.load().await.unwrap();
        assert_eq!(loaded.source, DataSource::Cache);
        assert_eq!(names(&loaded.data), vec!["Ana"]);
        assert_eq!(fx.remote.list_calls(), 0);
    }

    #[tokio::test]
    async fn test_failed_fetch_falls_back_to_cache() {
        let fx = fixture(true);
        fx.ctx
            .cache
            .write("cache:clients", &json!([{"id": "1", "name": "Ana"}]))
            .unwrap();
        fx.clock.advance(Duration::from_secs(600));
        fx.remote.set_unreachable(true);
        let resource = clients(&fx);

        let loaded = resource.load().await.unwrap();
        assert_eq!(loaded.source, DataSource::Cache);
        assert_eq!(fx.remote.list_calls(), 1);
    }

    #[tokio::test]
    async fn test_failed_fetch_without_cache_is_no_data() {
        let fx = fixture(true);
        fx.remote.set_unreachable(true);
        let resource = clients(&fx);

        let err = resource.load().await.unwrap_err();
        assert!(matches!(err, ResourceError::NoData { ref key } if key == "cache:clients"));
    }

    #[tokio::test]
    async fn test_optimistic_create_then_reconcile() {
        let fx = fixture(true);
        let resource = clients(&fx);
        let release = fx.remote.block_next_write();

        let id = resource
            .mutate_optimistic(Operation::Create, json!({"name": "Ana"}))
            .unwrap();

        // Visible before the remote has answered
        let view = resource.snapshot();
        assert_eq!(names(&view), vec!["Ana"]);
        assert_eq!(view[0].id, id.to_string());
        assert_eq!(fx.ctx.queue.pending_count().unwrap(), 1);

        fx.remote.write_started().await;
        release.send(()).unwrap();
        while !fx.ctx.queue.is_empty().unwrap() {
            tokio::task::yield_now().await;
        }

        assert_eq!(fx.remote.records("clients")[0]["id"], id.to_string());
        let reloaded = resource.load().await.unwrap();
        assert_eq!(reloaded.source, DataSource::Remote);
        assert_eq!(names(&reloaded.data), vec!["Ana"]);
    }

    #[tokio::test]
    async fn test_update_and_delete_apply_to_view() {
        let fx = fixture(false);
        fx.ctx
            .cache
            .write(
                "cache:clients",
                &json!([{"id": "1", "name": "Ana"}, {"id": "2", "name": "Bo"}]),
            )
            .unwrap();
        let resource = clients(&fx);
        resource.load().await.unwrap();

        resource
            .mutate_optimistic(Operation::Update, json!({"id": "1", "name": "Ana B"}))
            .unwrap();
        resource
            .mutate_optimistic(Operation::Delete, json!({"id": "2"}))
            .unwrap();

        assert_eq!(names(&resource.snapshot()), vec!["Ana B"]);
    }

    #[tokio::test]
    async fn test_pending_mutations_survive_reload() {
        let fx = fixture(false);
        fx.ctx
            .cache
            .write("cache:clients", &json!([{"id": "1", "name": "Ana"}]))
            .unwrap();
        let resource = clients(&fx);
        resource
            .mutate_optimistic(Operation::Create, json!({"id": "2", "name": "Bo"}))
            .unwrap();

        // A second resource over the same stores sees the queued write
        let other = clients(&fx);
        let loaded = other.load().await.unwrap();
        assert_eq!(names(&loaded.data), vec!["Ana", "Bo"]);
    }

    #[tokio::test]
    async fn test_mutation_without_id_is_rejected() {
        let fx = fixture(false);
        let resource = clients(&fx);

        let err = resource
            .mutate_optimistic(Operation::Update, json!({"name": "x"}))
            .unwrap_err();
        assert!(matches!(err, ResourceError::InvalidMutation { operation: "update", .. }));

        let err = resource
            .mutate_optimistic(Operation::Create, json!(["not", "an", "object"]))
            .unwrap_err();
        assert!(matches!(err, ResourceError::InvalidMutation { .. }));
        assert!(fx.ctx.queue.is_empty().unwrap());
    }

    #[tokio::test]
    async fn test_local_write_bypasses_fresh_cache() {
        let fx = fixture(true);
        fx.remote.seed("clients", vec![json!({"id": "1", "name": "Ana"})]);
        let resource = clients(&fx);
        resource.load().await.unwrap();

        resource
            .mutate_optimistic(Operation::Create, json!({"id": "2", "name": "Bo"}))
            .unwrap();
        while !fx.ctx.queue.is_empty().unwrap() {
            tokio::task::yield_now().await;
        }

        let loaded = resource.load().await.unwrap();
        assert_eq!(loaded.source, DataSource::Remote);
        assert_eq!(names(&loaded.data), vec!["Ana", "Bo"]);
    }

    #[tokio::test]
    async fn test_write_through_one_screen_shows_on_another() {
        let fx = fixture(true);
        fx.remote.seed("clients", vec![json!({"id": "1", "name": "Ana"})]);
        let list_screen = clients(&fx);
        let form_screen = clients(&fx);
        list_screen.load().await.unwrap();

        form_screen
            .mutate_optimistic(Operation::Create, json!({"id": "2", "name": "Bo"}))
            .unwrap();
        while !fx.ctx.queue.is_empty().unwrap() {
            tokio::task::yield_now().await;
        }
        assert_eq!(fx.remote.records("clients").len(), 2);

        let loaded = list_screen.load().await.unwrap();
        assert_eq!(loaded.source, DataSource::Remote);
        assert_eq!(names(&loaded.data), vec!["Ana", "Bo"]);

        // Settled again, so the next load may use the cache
        let again = list_screen.load().await.unwrap();
        assert_eq!(again.source, DataSource::Cache);
        assert_eq!(names(&again.data), vec!["Ana", "Bo"]);
    }

    #[tokio::test]
    async fn test_fetch_during_pending_write_is_not_trusted() {
        let fx = fixture(true);
        let tracker = &fx.ctx.writes;
        assert!(tracker.is_current("clients", "cache:clients"));

        tracker.record_write("clients");
        assert!(!tracker.is_current("clients", "cache:clients"));

        tracker.record_fetch("cache:clients", None);
        assert!(!tracker.is_current("clients", "cache:clients"));

        tracker.record_fetch("cache:clients", Some(tracker.generation("clients")));
        assert!(tracker.is_current("clients", "cache:clients"));
        assert!(tracker.is_current("jobs", "cache:jobs"));
    }

    #[tokio::test]
    async fn test_failed_enqueue_keeps_optimistic_change() {
        let fx = fixture(false);
        let resource = clients(&fx);
        fx.db
            .with_conn(|conn| {
                conn.execute_batch("DROP TABLE mutation_queue")?;
                Ok(())
            })
            .unwrap();

        let err = resource
            .mutate_optimistic(Operation::Create, json!({"id": "7", "name": "Cy"}))
            .unwrap_err();

        assert!(matches!(err, ResourceError::Storage(_)));
        assert_eq!(names(&resource.snapshot()), vec!["Cy"]);
    }

    #[tokio::test(start_paused = true)]
    async fn test_watch_reloads_when_back_online() {
        let fx = fixture(false);
        fx.remote.seed("clients", vec![json!({"id": "1", "name": "Ana"})]);
        let resource = clients(&fx);
        let mut watch = resource.watch();

        fx.ctx.monitor.observe(crate::models::NetworkStatus::OFFLINE);
        go(&fx.probe, &fx.ctx.monitor, true);

        let loaded = watch.next().await.unwrap();
        assert_eq!(loaded.source, DataSource::Remote);
        assert_eq!(names(&resource.snapshot()), vec!["Ana"]);
    }

    #[test]
    fn test_apply_mutation_create_is_idempotent() {
        let mut records = vec![Client {
            id: "1".to_string(),
            name: "Ana".to_string(),
        }];
        apply_mutation(&mut records, Operation::Create, &json!({"id": "1", "name": "Ana"})).unwrap();
        assert_eq!(records.len(), 1);
    }
}

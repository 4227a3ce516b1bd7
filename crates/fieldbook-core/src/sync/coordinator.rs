//! Sync coordinator
//!
//! Drains the mutation queue against the remote store. Only one drain runs
//! at a time: a request that arrives while a drain is in flight is coalesced
//! into it and returns immediately.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use serde::Serialize;
use tokio::sync::watch;
use tracing::{debug, info, warn};

use crate::connectivity::ConnectivityMonitor;
use crate::models::{Operation, QueuedMutation};
use crate::remote::{RemoteError, RemoteStore};
use crate::storage::MutationQueue;

/// Coordinator state
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum DrainState {
    Idle,
    Draining,
}

/// Counts from one completed drain
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct DrainReport {
    /// Items applied remotely and removed from the queue
    pub applied: usize,
    /// Items the remote rejected; they stay queued
    pub failed: usize,
    /// Items still pending after the drain
    pub remaining: usize,
}

/// Result of a drain request
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DrainOutcome {
    /// Another drain was already running
    Coalesced,
    /// The device was offline; nothing was touched
    Offline,
    Completed(DrainReport),
    /// The local queue could not be read
    Aborted(String),
}

impl DrainOutcome {
    pub fn report(&self) -> Option<&DrainReport> {
        match self {
            DrainOutcome::Completed(report) => Some(report),
            _ => None,
        }
    }
}

/// Single-flight drain of the mutation queue
#[derive(Clone)]
pub struct SyncCoordinator {
    inner: Arc<Inner>,
}

struct Inner {
    queue: MutationQueue,
    remote: Arc<dyn RemoteStore>,
    monitor: ConnectivityMonitor,
    draining: AtomicBool,
    state_tx: watch::Sender<DrainState>,
}

/// Holds the Draining flag; dropping it returns the coordinator to Idle
struct DrainGuard<'a> {
    inner: &'a Inner,
}

impl<'a> DrainGuard<'a> {
    fn acquire(inner: &'a Inner) -> Option<Self> {
        inner
            .draining
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .ok()?;
        inner.state_tx.send_replace(DrainState::Draining);
        Some(Self { inner })
    }
}

impl Drop for DrainGuard<'_> {
    fn drop(&mut self) {
        self.inner.draining.store(false, Ordering::Release);
        self.inner.state_tx.send_replace(DrainState::Idle);
    }
}

impl SyncCoordinator {
    pub fn new(
        queue: MutationQueue,
        remote: Arc<dyn RemoteStore>,
        monitor: ConnectivityMonitor,
    ) -> Self {
        let (state_tx, _) = watch::channel(DrainState::Idle);
        Self {
            inner: Arc::new(Inner {
                queue,
                remote,
                monitor,
                draining: AtomicBool::new(false),
                state_tx,
            }),
        }
    }

    /// Current state
    pub fn state(&self) -> DrainState {
        *self.inner.state_tx.borrow()
    }

    pub fn is_draining(&self) -> bool {
        self.state() == DrainState::Draining
    }

    /// Watch state changes (for "syncing" indicators)
    pub fn subscribe_state(&self) -> watch::Receiver<DrainState> {
        self.inner.state_tx.subscribe()
    }

    /// Request a drain through the single-flight gate
    pub async fn request_drain(&self) -> DrainOutcome {
        // Check-and-set happens before the first await
        let Some(_guard) = DrainGuard::acquire(&self.inner) else {
            debug!("Drain already in flight, request coalesced");
            return DrainOutcome::Coalesced;
        };

        self.drain().await
    }

    /// Explicit "retry sync" action; same as a single drain request
    pub async fn flush_now(&self) -> DrainOutcome {
        debug!("Manual flush requested");
        self.request_drain().await
    }

    async fn drain(&self) -> DrainOutcome {
        let inner = &self.inner;

        if !inner.monitor.is_online().await {
            debug!("Offline, skipping drain");
            return DrainOutcome::Offline;
        }

        // Items marked synced whose removal did not complete last time
        match inner.queue.purge_synced() {
            Ok(0) => {}
            Ok(n) => debug!("Purged {} already-synced item(s)", n),
            Err(e) => warn!("Failed to purge synced items: {}", e),
        }

        let pending = match inner.queue.list_pending() {
            Ok(pending) => pending,
            Err(e) if e.is_transient() => {
                debug!("Mutation queue busy, next trigger retries: {}", e);
                return DrainOutcome::Aborted(e.to_string());
            }
            Err(e) => {
                warn!("Cannot read mutation queue: {}", e);
                return DrainOutcome::Aborted(e.to_string());
            }
        };

        if pending.is_empty() {
            debug!("Mutation queue empty");
            return DrainOutcome::Completed(DrainReport::default());
        }

        info!("Draining {} pending mutation(s)", pending.len());
        let mut report = DrainReport::default();

        for mutation in &pending {
            match self.apply(mutation).await {
                Ok(()) => {
                    self.settle(mutation);
                    report.applied += 1;
                }
                Err(e) => {
                    warn!(
                        "Failed to apply {} on '{}' ({}): {}",
                        mutation.operation.as_str(),
                        mutation.collection,
                        mutation.id,
                        e
                    );
                    report.failed += 1;
                }
            }
        }

        report.remaining = inner.queue.pending_count().unwrap_or(report.failed);
        info!(
            "Drain finished: {} applied, {} failed, {} remaining",
            report.applied, report.failed, report.remaining
        );
        DrainOutcome::Completed(report)
    }

    async fn apply(&self, mutation: &QueuedMutation) -> Result<(), RemoteError> {
        let remote = &self.inner.remote;
        let collection = mutation.collection.as_str();

        match mutation.operation {
            Operation::Create => {
                remote.insert(collection, &mutation.payload).await?;
            }
            Operation::Update => {
                let id = self.require_id(mutation)?;
                remote.patch_by_id(collection, &id, &mutation.payload).await?;
            }
            Operation::Delete => {
                let id = self.require_id(mutation)?;
                remote.delete_by_id(collection, &id).await?;
            }
        }

        debug!(
            "Applied {} on '{}' ({})",
            mutation.operation.as_str(),
            collection,
            mutation.id
        );
        Ok(())
    }

    fn require_id(&self, mutation: &QueuedMutation) -> Result<String, RemoteError> {
        mutation
            .record_id()
            .ok_or_else(|| RemoteError::MissingRecordId {
                collection: mutation.collection.clone(),
                operation: mutation.operation.as_str(),
            })
    }

    /// Mark then remove an applied item
    ///
    /// If removal fails the synced flag keeps it out of later drains until
    /// the next purge.
    fn settle(&self, mutation: &QueuedMutation) {
        let queue = &self.inner.queue;
        if let Err(e) = queue.mark_synced(&mutation.id) {
            warn!("Failed to mark {} synced: {}", mutation.id, e);
        }
        if let Err(e) = queue.remove(&mutation.id) {
            warn!("Failed to remove {} from queue: {}", mutation.id, e);
        }
    }
}

//! In-memory fakes for the collaborator traits

use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use serde_json::Value;
use tokio::sync::{oneshot, Notify};

use crate::connectivity::{ConnectivityMonitor, ManualProbe, MonitorConfig};
use crate::models::{record_id_of, NetworkStatus};
use crate::remote::{RemoteError, RemoteStore};

/// A call received by [`FakeRemote`]
#[derive(Debug, Clone, PartialEq)]
pub enum RemoteCall {
    Insert { collection: String, payload: Value },
    Patch { collection: String, id: String, payload: Value },
    Delete { collection: String, id: String },
}

impl RemoteCall {
    /// `name` field of the payload, for asserting order
    pub fn name(&self) -> Option<&str> {
        match self {
            RemoteCall::Insert { payload, .. } | RemoteCall::Patch { payload, .. } => {
                payload.get("name").and_then(Value::as_str)
            }
            RemoteCall::Delete { .. } => None,
        }
    }
}

/// Remote store backed by a map of collections
#[derive(Default)]
pub struct FakeRemote {
    records: Mutex<HashMap<String, Vec<Value>>>,
    calls: Mutex<Vec<RemoteCall>>,
    rejected_names: Mutex<HashSet<String>>,
    unreachable: AtomicBool,
    list_calls: AtomicUsize,
    entered: Notify,
    gate: Mutex<Option<oneshot::Receiver<()>>>,
}

impl FakeRemote {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn seed(&self, collection: &str, records: Vec<Value>) {
        self.records
            .lock()
            .unwrap()
            .insert(collection.to_string(), records);
    }

    pub fn records(&self, collection: &str) -> Vec<Value> {
        self.records
            .lock()
            .unwrap()
            .get(collection)
            .cloned()
            .unwrap_or_default()
    }

    pub fn calls(&self) -> Vec<RemoteCall> {
        self.calls.lock().unwrap().clone()
    }

    pub fn list_calls(&self) -> usize {
        self.list_calls.load(Ordering::SeqCst)
    }

    /// Reject writes whose payload has this `name`
    pub fn reject_named(&self, name: &str) {
        self.rejected_names.lock().unwrap().insert(name.to_string());
    }

    /// Make every call fail with a network-style error
    pub fn set_unreachable(&self, unreachable: bool) {
        self.unreachable.store(unreachable, Ordering::SeqCst);
    }

    /// Hold the next write until the returned sender fires (or is dropped)
    pub fn block_next_write(&self) -> oneshot::Sender<()> {
        let (tx, rx) = oneshot::channel();
        *self.gate.lock().unwrap() = Some(rx);
        tx
    }

    /// Resolves once a write has started
    pub async fn write_started(&self) {
        self.entered.notified().await;
    }

    async fn begin_write(&self, payload: Option<&Value>) -> Result<(), RemoteError> {
        self.entered.notify_one();

        let gate = self.gate.lock().unwrap().take();
        if let Some(gate) = gate {
            let _ = gate.await;
        }

        if self.unreachable.load(Ordering::SeqCst) {
            return Err(RemoteError::InvalidResponse("connection reset".to_string()));
        }

        let name = payload
            .and_then(|p| p.get("name"))
            .and_then(Value::as_str)
            .map(str::to_string);
        if let Some(name) = name {
            if self.rejected_names.lock().unwrap().contains(&name) {
                return Err(RemoteError::Status {
                    method: "POST",
                    path: name,
                    status: 422,
                    body: "rejected".to_string(),
                });
            }
        }
        Ok(())
    }
}

#[async_trait]
impl RemoteStore for FakeRemote {
    async fn insert(&self, collection: &str, payload: &Value) -> Result<Value, RemoteError> {
        self.calls.lock().unwrap().push(RemoteCall::Insert {
            collection: collection.to_string(),
            payload: payload.clone(),
        });
        self.begin_write(Some(payload)).await?;

        self.records
            .lock()
            .unwrap()
            .entry(collection.to_string())
            .or_default()
            .push(payload.clone());
        Ok(payload.clone())
    }

    async fn patch_by_id(
        &self,
        collection: &str,
        id: &str,
        payload: &Value,
    ) -> Result<(), RemoteError> {
        self.calls.lock().unwrap().push(RemoteCall::Patch {
            collection: collection.to_string(),
            id: id.to_string(),
            payload: payload.clone(),
        });
        self.begin_write(Some(payload)).await?;

        let mut records = self.records.lock().unwrap();
        for record in records.entry(collection.to_string()).or_default() {
            if record_id_of(record).as_deref() == Some(id) {
                if let (Some(target), Some(fields)) = (record.as_object_mut(), payload.as_object())
                {
                    for (k, v) in fields {
                        target.insert(k.clone(), v.clone());
                    }
                }
            }
        }
        Ok(())
    }

    async fn delete_by_id(&self, collection: &str, id: &str) -> Result<(), RemoteError> {
        self.calls.lock().unwrap().push(RemoteCall::Delete {
            collection: collection.to_string(),
            id: id.to_string(),
        });
        self.begin_write(None).await?;

        self.records
            .lock()
            .unwrap()
            .entry(collection.to_string())
            .or_default()
            .retain(|r| record_id_of(r).as_deref() != Some(id));
        Ok(())
    }

    async fn list(&self, collection: &str) -> Result<Vec<Value>, RemoteError> {
        self.list_calls.fetch_add(1, Ordering::SeqCst);
        if self.unreachable.load(Ordering::SeqCst) {
            return Err(RemoteError::InvalidResponse("connection reset".to_string()));
        }
        Ok(self.records(collection))
    }
}

/// Monitor without a background poller, driven by `observe`
pub fn push_only_monitor(probe: Arc<ManualProbe>) -> ConnectivityMonitor {
    ConnectivityMonitor::new(
        probe,
        MonitorConfig {
            poll_interval: None,
            debounce: Duration::from_secs(3),
        },
    )
}

/// Flip a probe and tell the monitor about it
pub fn go(probe: &ManualProbe, monitor: &ConnectivityMonitor, online: bool) {
    probe.set_online(online);
    monitor.observe(if online {
        NetworkStatus::ONLINE
    } else {
        NetworkStatus::OFFLINE
    });
}

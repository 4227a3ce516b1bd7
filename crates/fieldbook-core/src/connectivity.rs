//! Connectivity monitor
//!
//! Combines a point-in-time reachability probe with a background listener
//! that reports offline → online transitions.
//!
//! ## Subscriptions
//!
//! The monitor is shared by every caller. The first subscription starts a
//! single polling task; later subscriptions reuse it, and dropping the last
//! one stops it. Each transition into the online state notifies subscribers
//! at most once per debounce window, so a flapping network produces one
//! notification instead of a storm. A transition swallowed by the window is
//! re-checked when the window closes and notified then if still online.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, Weak};
use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tracing::{debug, info, warn};

use crate::models::NetworkStatus;

/// Connectivity primitive: reports whether the device can reach the network
#[async_trait]
pub trait ConnectivityProbe: Send + Sync {
    async fn probe(&self) -> NetworkStatus;
}

/// Probe that issues a HEAD request against a health URL
pub struct HttpProbe {
    client: Client,
    url: String,
}

impl HttpProbe {
    pub fn new(url: impl Into<String>, timeout: Duration) -> Result<Self, reqwest::Error> {
        let client = Client::builder()
            .timeout(timeout)
            .connect_timeout(timeout)
            .build()?;
        Ok(Self {
            client,
            url: url.into(),
        })
    }
}

#[async_trait]
impl ConnectivityProbe for HttpProbe {
    async fn probe(&self) -> NetworkStatus {
        match self.client.head(&self.url).send().await {
            // Any HTTP answer means the round trip worked
            Ok(_) => NetworkStatus::ONLINE,
            Err(e) if e.is_connect() => NetworkStatus::OFFLINE,
            Err(e) if e.is_timeout() => NetworkStatus {
                connected: true,
                internet_reachable: None,
            },
            Err(e) => {
                debug!("Reachability probe failed: {}", e);
                NetworkStatus {
                    connected: true,
                    internet_reachable: Some(false),
                }
            }
        }
    }
}

/// Probe whose answer is set by hand
///
/// Used for tests and for forcing offline mode.
#[derive(Debug)]
pub struct ManualProbe {
    status: Mutex<NetworkStatus>,
}

impl ManualProbe {
    pub fn new(status: NetworkStatus) -> Self {
        Self {
            status: Mutex::new(status),
        }
    }

    pub fn online() -> Self {
        Self::new(NetworkStatus::ONLINE)
    }

    pub fn offline() -> Self {
        Self::new(NetworkStatus::OFFLINE)
    }

    pub fn set(&self, status: NetworkStatus) {
        *self.status.lock().unwrap_or_else(|e| e.into_inner()) = status;
    }

    pub fn set_online(&self, online: bool) {
        self.set(if online {
            NetworkStatus::ONLINE
        } else {
            NetworkStatus::OFFLINE
        });
    }
}

#[async_trait]
impl ConnectivityProbe for ManualProbe {
    async fn probe(&self) -> NetworkStatus {
        *self.status.lock().unwrap_or_else(|e| e.into_inner())
    }
}

/// Monitor settings
#[derive(Debug, Clone)]
pub struct MonitorConfig {
    /// How often the background listener probes; `None` disables polling
    /// and relies on [`ConnectivityMonitor::observe`] being fed externally
    pub poll_interval: Option<Duration>,
    /// Minimum spacing between "became online" notifications
    pub debounce: Duration,
}

impl Default for MonitorConfig {
    fn default() -> Self {
        Self {
            poll_interval: Some(Duration::from_secs(5)),
            debounce: Duration::from_secs(3),
        }
    }
}

/// Process-wide connectivity monitor
///
/// Cheap to clone; clones share listeners and state.
#[derive(Clone)]
pub struct ConnectivityMonitor {
    inner: Arc<Inner>,
}

struct Inner {
    probe: Arc<dyn ConnectivityProbe>,
    config: MonitorConfig,
    state: Mutex<MonitorState>,
    status_tx: watch::Sender<Option<NetworkStatus>>,
}

#[derive(Default)]
struct MonitorState {
    /// Last observed online flag; `None` until the first observation
    last_online: Option<bool>,
    last_notified: Option<Instant>,
    /// Timer re-checking a transition that arrived inside the window
    trailing: Option<JoinHandle<()>>,
    listeners: HashMap<u64, mpsc::UnboundedSender<()>>,
    next_listener_id: u64,
    poller: Option<JoinHandle<()>>,
}

impl ConnectivityMonitor {
    pub fn new(probe: Arc<dyn ConnectivityProbe>, config: MonitorConfig) -> Self {
        let (status_tx, _) = watch::channel(None);
        Self {
            inner: Arc::new(Inner {
                probe,
                config,
                state: Mutex::new(MonitorState::default()),
                status_tx,
            }),
        }
    }

    /// Point-in-time check: attached to a network that reaches the internet
    pub async fn is_online(&self) -> bool {
        self.inner.probe.probe().await.is_online()
    }

    /// Most recent status seen by the listener (or fed via `observe`)
    pub fn last_status(&self) -> Option<NetworkStatus> {
        *self.inner.status_tx.borrow()
    }

    /// Watch observed statuses
    pub fn subscribe_status(&self) -> watch::Receiver<Option<NetworkStatus>> {
        self.inner.status_tx.subscribe()
    }

    /// Record a status reading and notify subscribers on an online transition
    pub fn observe(&self, status: NetworkStatus) {
        self.inner.observe(status);
    }

    /// Register for "became online" notifications
    ///
    /// Must be called from within a tokio runtime when polling is enabled.
    pub fn on_became_online(&self) -> OnlineSubscription {
        let (tx, rx) = mpsc::unbounded_channel();
        let mut state = self.inner.lock_state();

        let id = state.next_listener_id;
        state.next_listener_id += 1;
        state.listeners.insert(id, tx);

        if state.poller.is_none() {
            if let Some(interval) = self.inner.config.poll_interval {
                let interval = interval.max(MIN_POLL_INTERVAL);
                state.poller = spawn_poller(Arc::downgrade(&self.inner), interval);
            }
        }

        debug!("Connectivity subscriber {} added ({} total)", id, state.listeners.len());

        OnlineSubscription {
            id,
            inner: Arc::clone(&self.inner),
            rx,
        }
    }

    /// Number of live subscriptions
    pub fn subscriber_count(&self) -> usize {
        self.inner.lock_state().listeners.len()
    }

    /// Whether the background listener task is running
    pub fn is_listening(&self) -> bool {
        self.inner
            .lock_state()
            .poller
            .as_ref()
            .is_some_and(|handle| !handle.is_finished())
    }
}

impl Inner {
    fn lock_state(&self) -> std::sync::MutexGuard<'_, MonitorState> {
        self.state.lock().unwrap_or_else(|e| e.into_inner())
    }

    fn observe(self: &Arc<Self>, status: NetworkStatus) {
        let online = status.is_online();
        self.status_tx.send_replace(Some(status));

        let mut state = self.lock_state();
        let was_online = state.last_online.replace(online);

        if !online || was_online == Some(true) {
            return;
        }

        let now = Instant::now();
        if let Some(last) = state.last_notified {
            let window_end = last + self.config.debounce;
            if now < window_end {
                debug!("Online transition within debounce window, deferring");
                if state.trailing.as_ref().map_or(true, |t| t.is_finished()) {
                    state.trailing = spawn_trailing_check(Arc::downgrade(self), window_end);
                }
                return;
            }
        }
        state.notify(now);
    }

    /// Runs when a debounce window closes with a deferred transition
    fn trailing_check(&self) {
        let mut state = self.lock_state();
        state.trailing = None;
        if state.last_online != Some(true) {
            debug!("Network went away again before the debounce window closed");
            return;
        }
        let now = Instant::now();
        let in_window = state
            .last_notified
            .is_some_and(|last| now < last + self.config.debounce);
        if !in_window {
            state.notify(now);
        }
    }
}

impl MonitorState {
    fn notify(&mut self, now: Instant) {
        self.last_notified = Some(now);
        if let Some(trailing) = self.trailing.take() {
            trailing.abort();
        }
        info!("Network became reachable, notifying {} subscriber(s)", self.listeners.len());
        self.listeners.retain(|_, tx| tx.send(()).is_ok());
    }
}

/// Floor for the listener's probe interval
const MIN_POLL_INTERVAL: Duration = Duration::from_millis(100);

fn spawn_trailing_check(inner: Weak<Inner>, at: Instant) -> Option<JoinHandle<()>> {
    let runtime = tokio::runtime::Handle::try_current().ok()?;
    Some(runtime.spawn(async move {
        tokio::time::sleep_until(at).await;
        if let Some(inner) = inner.upgrade() {
            inner.trailing_check();
        }
    }))
}

fn spawn_poller(inner: Weak<Inner>, interval: Duration) -> Option<JoinHandle<()>> {
    let Ok(runtime) = tokio::runtime::Handle::try_current() else {
        warn!("No async runtime; connectivity polling disabled");
        return None;
    };

    debug!("Starting connectivity listener (every {:?})", interval);
    Some(runtime.spawn(async move {
        loop {
            let Some(inner) = inner.upgrade() else {
                break;
            };
            let status = inner.probe.probe().await;
            inner.observe(status);
            drop(inner);

            tokio::time::sleep(interval).await;
        }
    }))
}

/// Handle returned by [`ConnectivityMonitor::on_became_online`]
///
/// Dropping it unsubscribes; the last drop stops the background listener.
pub struct OnlineSubscription {
    id: u64,
    inner: Arc<Inner>,
    rx: mpsc::UnboundedReceiver<()>,
}

impl OnlineSubscription {
    /// Wait for the next "became online" notification
    pub async fn recv(&mut self) -> Option<()> {
        self.rx.recv().await
    }

    /// Take a pending notification without waiting
    pub fn try_recv(&mut self) -> Option<()> {
        self.rx.try_recv().ok()
    }

    /// Explicitly unsubscribe (same as dropping)
    pub fn unsubscribe(self) {}
}

impl Drop for OnlineSubscription {
    fn drop(&mut self) {
        let mut state = self.inner.lock_state();
        state.listeners.remove(&self.id);

        if state.listeners.is_empty() {
            if let Some(poller) = state.poller.take() {
                debug!("Last connectivity subscriber gone, stopping listener");
                poller.abort();
            }
            if let Some(trailing) = state.trailing.take() {
                trailing.abort();
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn push_only(debounce: Duration) -> ConnectivityMonitor {
        ConnectivityMonitor::new(
            Arc::new(ManualProbe::offline()),
            MonitorConfig {
                poll_interval: None,
                debounce,
            },
        )
    }

    fn drain(sub: &mut OnlineSubscription) -> usize {
        let mut count = 0;
        while sub.try_recv().is_some() {
            count += 1;
        }
        count
    }

    #[tokio::test]
    async fn test_is_online_uses_probe() {
        let probe = Arc::new(ManualProbe::offline());
        let monitor = ConnectivityMonitor::new(probe.clone(), MonitorConfig::default());

        assert!(!monitor.is_online().await);
        probe.set_online(true);
        assert!(monitor.is_online().await);

        // Attached but reachability unknown is not online
        probe.set(NetworkStatus {
            connected: true,
            internet_reachable: None,
        });
        assert!(!monitor.is_online().await);
    }

    #[tokio::test(start_paused = true)]
    async fn test_offline_to_online_notifies() {
        let monitor = push_only(Duration::from_secs(3));
        let mut sub = monitor.on_became_online();

        monitor.observe(NetworkStatus::OFFLINE);
        assert_eq!(drain(&mut sub), 0);

        monitor.observe(NetworkStatus::ONLINE);
        assert_eq!(drain(&mut sub), 1);

        // Staying online is not a transition
        monitor.observe(NetworkStatus::ONLINE);
        assert_eq!(drain(&mut sub), 0);
        assert_eq!(monitor.last_status(), Some(NetworkStatus::ONLINE));
    }

    #[tokio::test(start_paused = true)]
    async fn test_flapping_is_debounced() {
        let monitor = push_only(Duration::from_secs(3));
        let mut sub = monitor.on_became_online();

        // 5 rapid transitions inside one window
        for online in [true, false, true, false, true] {
            monitor.observe(if online {
                NetworkStatus::ONLINE
            } else {
                NetworkStatus::OFFLINE
            });
            tokio::time::advance(Duration::from_millis(200)).await;
        }
        assert_eq!(drain(&mut sub), 1);

        // After the window, a new transition notifies again
        monitor.observe(NetworkStatus::OFFLINE);
        tokio::time::advance(Duration::from_secs(3)).await;
        monitor.observe(NetworkStatus::ONLINE);
        assert_eq!(drain(&mut sub), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_flap_ending_online_notifies_when_window_closes() {
        let monitor = push_only(Duration::from_secs(3));
        let mut sub = monitor.on_became_online();

        monitor.observe(NetworkStatus::ONLINE);
        tokio::time::advance(Duration::from_millis(500)).await;
        monitor.observe(NetworkStatus::OFFLINE);
        tokio::time::advance(Duration::from_millis(500)).await;
        monitor.observe(NetworkStatus::ONLINE);
        assert_eq!(drain(&mut sub), 1);

        // Still online when the window closes
        let late = tokio::time::timeout(Duration::from_secs(5), sub.recv()).await;
        assert_eq!(late, Ok(Some(())));
        assert_eq!(drain(&mut sub), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_flap_ending_offline_stays_quiet() {
        let monitor = push_only(Duration::from_secs(3));
        let mut sub = monitor.on_became_online();

        monitor.observe(NetworkStatus::ONLINE);
        monitor.observe(NetworkStatus::OFFLINE);
        monitor.observe(NetworkStatus::ONLINE);
        monitor.observe(NetworkStatus::OFFLINE);
        assert_eq!(drain(&mut sub), 1);

        tokio::time::sleep(Duration::from_secs(5)).await;
        assert_eq!(drain(&mut sub), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_every_subscriber_is_notified() {
        let monitor = push_only(Duration::from_secs(1));
        let mut first = monitor.on_became_online();
        let mut second = monitor.on_became_online();

        monitor.observe(NetworkStatus::ONLINE);
        assert_eq!(drain(&mut first), 1);
        assert_eq!(drain(&mut second), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_unsubscribe_stops_notifications() {
        let monitor = push_only(Duration::from_secs(1));
        let sub = monitor.on_became_online();
        let mut other = monitor.on_became_online();
        assert_eq!(monitor.subscriber_count(), 2);

        sub.unsubscribe();
        assert_eq!(monitor.subscriber_count(), 1);

        monitor.observe(NetworkStatus::ONLINE);
        assert_eq!(drain(&mut other), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_single_listener_shared_by_subscribers() {
        let probe = Arc::new(ManualProbe::offline());
        let monitor = ConnectivityMonitor::new(
            probe.clone(),
            MonitorConfig {
                poll_interval: Some(Duration::from_secs(5)),
                debounce: Duration::from_secs(1),
            },
        );
        assert!(!monitor.is_listening());

        let mut first = monitor.on_became_online();
        let second = monitor.on_became_online();
        assert!(monitor.is_listening());

        // Poller picks up the transition on its next probe
        tokio::time::sleep(Duration::from_millis(10)).await;
        probe.set_online(true);
        tokio::time::sleep(Duration::from_secs(6)).await;
        assert_eq!(first.recv().await, Some(()));

        drop(second);
        assert!(monitor.is_listening());
        drop(first);
        assert!(!monitor.is_listening());
    }
}

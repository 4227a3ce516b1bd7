//! Sync scheduler
//!
//! Requests a drain on a fixed interval and whenever the connectivity
//! monitor reports that the network came back. Drains always go through
//! the coordinator's single-flight gate, so overlapping triggers collapse
//! into one drain.

use std::time::Duration;

use tokio::task::JoinHandle;
use tokio::time::{interval_at, Instant, MissedTickBehavior};
use tracing::{debug, info};

use crate::connectivity::{ConnectivityMonitor, OnlineSubscription};
use crate::sync::coordinator::SyncCoordinator;

const MIN_PERIOD: Duration = Duration::from_millis(1);

/// Entry point for starting the background trigger task
pub struct SyncScheduler;

impl SyncScheduler {
    /// Start the scheduler; must be called inside a tokio runtime
    ///
    /// Periods shorter than one millisecond are raised to one millisecond.
    pub fn start(
        coordinator: SyncCoordinator,
        monitor: &ConnectivityMonitor,
        interval: Duration,
    ) -> SchedulerHandle {
        let interval = interval.max(MIN_PERIOD);
        let subscription = monitor.on_became_online();
        info!("Sync scheduler started (every {:?})", interval);

        SchedulerHandle {
            task: Some(tokio::spawn(scheduler_task(
                coordinator,
                subscription,
                interval,
            ))),
        }
    }
}

/// Handle to a running scheduler
///
/// Stopping cancels the timer and the connectivity subscription. Dropping
/// the handle stops it too.
pub struct SchedulerHandle {
    task: Option<JoinHandle<()>>,
}

impl SchedulerHandle {
    /// Stop the scheduler; calling it again does nothing
    pub fn stop(&mut self) {
        if let Some(task) = self.task.take() {
            task.abort();
            info!("Sync scheduler stopped");
        }
    }

    pub fn is_running(&self) -> bool {
        self.task.as_ref().is_some_and(|task| !task.is_finished())
    }
}

impl Drop for SchedulerHandle {
    fn drop(&mut self) {
        self.stop();
    }
}

async fn scheduler_task(
    coordinator: SyncCoordinator,
    mut subscription: OnlineSubscription,
    period: Duration,
) {
    // First tick one period from now, not immediately
    let mut ticker = interval_at(Instant::now() + period, period);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

    loop {
        tokio::select! {
            _ = ticker.tick() => {
                debug!("Sync interval elapsed");
            }
            event = subscription.recv() => {
                if event.is_none() {
                    break;
                }
                debug!("Connectivity restored");
            }
        }

        // Never drain inline; the gate decides whether this request runs
        let coordinator = coordinator.clone();
        tokio::spawn(async move {
            coordinator.request_drain().await;
        });
    }
}

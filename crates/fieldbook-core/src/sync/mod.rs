//! Background synchronization
//!
//! - `coordinator`: drains queued mutations, one drain at a time
//! - `scheduler`: triggers drains on a timer and on reconnect

mod coordinator;
mod scheduler;

pub use coordinator::{DrainOutcome, DrainReport, DrainState, SyncCoordinator};
pub use scheduler::{SchedulerHandle, SyncScheduler};

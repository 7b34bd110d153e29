//! # Partition Backfill Scheduling
//!
//! Admission control and cooperative scheduling for partition backfills: the
//! bulk reads that bring a replication consumer up to date before it follows
//! live mutations.
//!
//! ## Features
//!
//! - **Bounded admission**: A bucket-wide tracker caps concurrently running
//!   backfills, derived from the bucket memory quota or set explicitly
//! - **Fair waiting**: Schedulers that could not admit are offered freed slots
//!   in FIFO order
//! - **Round-robin or sequential servicing**: Switchable at runtime per
//!   connection
//! - **Snoozing**: Backfills waiting on an external event park outside the
//!   rotation until woken
//! - **Exactly-once slot release**: Admission is held as a drop guard
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │                  AdmissionTracker (per bucket)               │
//! │  (running count, max_running, FIFO of waiting schedulers)   │
//! └─────────────────────────────────────────────────────────────┘
//!                ▲ try_admit / release        ▲
//!                │                            │
//! ┌──────────────────────────┐   ┌──────────────────────────┐
//! │ BackfillScheduler (conn) │   │ BackfillScheduler (conn) │
//! │ pending → initializing → │   │           ...            │
//! │ active ⇄ snoozing        │   │                          │
//! └──────────────────────────┘   └──────────────────────────┘
//!                ▲ step()                     ▲ step()
//! ┌──────────────────────────┐   ┌──────────────────────────┐
//! │     SchedulerDriver      │   │     SchedulerDriver      │
//! └──────────────────────────┘   └──────────────────────────┘
//! ```
//!
//! ## Example
//!
//! ```ignore
//! use partition_backfill::prelude::*;
//!
//! let config = BackfillConfig::from_env()?;
//! let tracker = Arc::new(AdmissionTracker::new(config.admission.clone()));
//! let scheduler = Arc::new(BackfillScheduler::new(
//!     tracker.clone(),
//!     config.scheduler("replica-1"),
//! ));
//!
//! scheduler.schedule(disk_backfill);
//! let driver = SchedulerDriver::new(scheduler.clone(), config.driver.clone())
//!     .with_tracker(tracker)
//!     .spawn();
//! ```

pub mod backfill;
pub mod config;
pub mod driver;
pub mod scheduler;
pub mod stats;
pub mod tracker;

/// Prelude for common imports
pub mod prelude {
    pub use crate::backfill::{Backfill, BackfillError, PartitionId, RunOutcome};
    pub use crate::config::{BackfillConfig, ConfigError};
    pub use crate::driver::{DriverConfig, DriverHandle, DriverSummary, SchedulerDriver};
    pub use crate::scheduler::{
        BackfillScheduler, ScheduleOrder, ScheduleResult, SchedulerConfig, SnoozeConfig,
        StepStatus,
    };
    pub use crate::tracker::{AdmissionConfig, AdmissionTracker, BackfillTracker, SchedulerId};
    pub use std::sync::Arc;
}

// Re-export key types at crate root
pub use backfill::{Backfill, BackfillError, PartitionId, RunOutcome};
pub use config::{BackfillConfig, ConfigError};
pub use driver::{DriverConfig, DriverError, DriverHandle, DriverSummary, SchedulerDriver};
pub use scheduler::{
    BackfillBuffer, BackfillScheduler, ScheduleOrder, ScheduleResult, SchedulerConfig,
    SchedulerStats, SnoozeConfig, SnoozePolicy, StepStatus,
};
pub use tracker::{AdmissionConfig, AdmissionSlot, AdmissionTracker, BackfillTracker, SchedulerId, TrackerStats};

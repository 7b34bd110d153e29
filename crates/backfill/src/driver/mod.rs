//! Async execution loop for backfill schedulers
//!
//! This module provides:
//! - [`SchedulerDriver`] - Steps one scheduler on a tokio task
//! - [`DriverConfig`] - Back-off and yielding behaviour
//! - [`DriverHandle`] - Shutdown and join for a spawned driver
//!
//! # Loop
//!
//! ```text
//!            ┌──────────── MoreWork (yield every N steps) ───────────┐
//!            ▼                                                        │
//!   ┌─────────────────┐                                              │
//!   │ scheduler.step()│──────────────────────────────────────────────┘
//!   └─────────────────┘
//!       │ Blocked                         │ Idle
//!       ▼                                 ▼
//!   sleep(backoff) or wake on          wait for new work
//!   work / buffer drain / capacity     (or exit if stop_when_idle)
//! ```
//!
//! # Example
//!
//! ```ignore
//! use partition_backfill::driver::{DriverConfig, SchedulerDriver};
//!
//! let handle = SchedulerDriver::new(scheduler.clone(), DriverConfig::default())
//!     .with_tracker(tracker.clone())
//!     .spawn();
//!
//! // ... later
//! let summary = handle.shutdown().await?;
//! ```

mod runner;

pub use runner::{spawn, DriverConfig, DriverError, DriverHandle, DriverSummary, SchedulerDriver};

//! Bucket-wide admission control for backfills
//!
//! This module provides:
//! - [`BackfillTracker`] - The admission capability schedulers consult
//! - [`AdmissionTracker`] - Bounded slot counter with a fair waiter queue
//! - [`AdmissionSlot`] - A held slot, released exactly once on drop
//! - [`AdmissionConfig`] - Slot ceiling, optionally derived from memory quota
//!
//! # Architecture
//!
//! ```text
//! ┌──────────────┐  ┌──────────────┐  ┌──────────────┐
//! │ Scheduler A  │  │ Scheduler B  │  │ Scheduler C  │   one per connection
//! └──────┬───────┘  └──────┬───────┘  └──────┬───────┘
//!        │ try_admit /     │                 │
//!        │ release         │                 │
//!        ▼                 ▼                 ▼
//! ┌─────────────────────────────────────────────────────┐
//! │                 AdmissionTracker                     │
//! │  running / max_running        waiters: [B, C]  FIFO │
//! │  (single lock guards both)                          │
//! └─────────────────────────────────────────────────────┘
//! ```

mod admission;
mod limits;
mod slot;

pub use admission::{AdmissionTracker, BackfillTracker, SchedulerId, TrackerStats};
pub use limits::{
    AdmissionConfig, FILE_MEMORY_PER_BACKFILL, MAX_RUNNING_CEILING, MEMORY_QUOTA_PERCENT,
};
pub use slot::AdmissionSlot;

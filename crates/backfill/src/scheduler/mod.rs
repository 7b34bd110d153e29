//! Per-connection backfill scheduling
//!
//! This module provides:
//! - [`BackfillScheduler`] - Queues and step algorithm for one connection
//! - [`ScheduleOrder`] - Round-robin or sequential servicing of active backfills
//! - [`SnoozePolicy`] - When snoozing backfills rejoin the rotation
//! - [`BackfillBuffer`] - Read-ahead byte budget gating the scheduler
//!
//! # Backfill lifecycle
//!
//! ```text
//!  schedule ──► pending ──(admitted)──► initializing ──(first run)──► active ◄──► snoozing
//!      │                                                                 │
//!      └─────────────(admitted)──────────► initializing                  ▼
//!                                                            finished / failed / dead
//!                                                              (slot released)
//! ```

mod buffer;
mod manager;
mod queues;
mod snooze;
mod types;

pub use buffer::{BackfillBuffer, BufferConfig, DEFAULT_BUFFER_BYTES};
pub use manager::{BackfillScheduler, SchedulerConfig, SchedulerStats};
pub use queues::QueueCounts;
pub use snooze::{Cooldown, SnoozeConfig, SnoozePolicy, WakeWhenIdle};
pub use types::{ScheduleOrder, ScheduleResult, StepStatus};

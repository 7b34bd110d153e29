//! Flat key/value stat export
//!
//! Stats are emitted through a caller-supplied sink so they can feed whatever
//! stats endpoint the embedding server exposes. Scheduler keys are prefixed
//! with the scheduler name, e.g. `replica-1:backfill_num_active`.

use crate::scheduler::SchedulerStats;
use crate::tracker::TrackerStats;

/// Emit scheduler stats as `<name>:<key>` pairs
pub fn add_scheduler_stats<F>(stats: &SchedulerStats, mut add_stat: F)
where
    F: FnMut(&str, String),
{
    let mut add = |key: &str, value: String| {
        add_stat(&format!("{}:{}", stats.name, key), value);
    };

    add("backfill_num_pending", stats.queues.pending.to_string());
    add("backfill_num_initializing", stats.queues.initializing.to_string());
    add("backfill_num_active", stats.queues.active.to_string());
    add("backfill_num_snoozing", stats.queues.snoozing.to_string());
    add("backfill_num_in_flight", stats.in_flight.to_string());
    add("backfill_order", stats.order.to_string());
    add("backfill_runs", stats.runs.to_string());
    add("backfill_finished", stats.finished.to_string());
    add("backfill_failed", stats.failed.to_string());
    add("backfill_discarded", stats.discarded.to_string());
    add("backfill_buffer_bytes_read", stats.buffer_bytes_read.to_string());
    add("backfill_buffer_max_bytes", stats.buffer_max_bytes.to_string());
    add("backfill_buffer_full", stats.buffer_full.to_string());
}

/// Emit bucket-wide tracker stats
pub fn add_tracker_stats<F>(stats: &TrackerStats, mut add_stat: F)
where
    F: FnMut(&str, String),
{
    add_stat("num_running_backfills", stats.running.to_string());
    add_stat("max_running_backfills", stats.max_running.to_string());
    add_stat("num_waiting_backfill_schedulers", stats.waiting.to_string());
    add_stat("backfills_admitted", stats.admitted.to_string());
    add_stat("backfills_released", stats.released.to_string());
    add_stat("backfills_denied", stats.denied.to_string());
    add_stat("backfill_invalid_releases", stats.invalid_releases.to_string());
}

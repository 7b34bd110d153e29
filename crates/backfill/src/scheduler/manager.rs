//! Per-connection backfill scheduler
//!
//! Owns the pending/initializing/active/snoozing queues of one replication
//! connection and advances them one step at a time.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Instant;

use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use tokio::sync::Notify;
use tracing::{debug, info, instrument, trace, warn};

use super::buffer::{BackfillBuffer, BufferConfig};
use super::queues::{AdmittedBackfill, BackfillQueues, QueueCounts, SnoozingBackfill};
use super::snooze::{SnoozeConfig, SnoozePolicy};
use super::types::{ScheduleOrder, ScheduleResult, StepStatus};
use crate::backfill::{Backfill, PartitionId, RunOutcome};
use crate::tracker::{AdmissionSlot, BackfillTracker, SchedulerId};

/// Scheduler configuration
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct SchedulerConfig {
    /// Name used in logs and stat keys (usually the connection name)
    pub name: String,

    /// Initial servicing order of active backfills
    pub order: ScheduleOrder,

    /// Snooze wake-up policy
    pub snooze: SnoozeConfig,

    /// Read-ahead buffer
    pub buffer: BufferConfig,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            name: "backfills".to_string(),
            order: ScheduleOrder::default(),
            snooze: SnoozeConfig::default(),
            buffer: BufferConfig::default(),
        }
    }
}

impl SchedulerConfig {
    /// Create a configuration for the named connection
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ..Default::default()
        }
    }

    /// Set the servicing order
    pub fn with_order(mut self, order: ScheduleOrder) -> Self {
        self.order = order;
        self
    }

    /// Set the snooze policy
    pub fn with_snooze(mut self, snooze: SnoozeConfig) -> Self {
        self.snooze = snooze;
        self
    }

    /// Set the read-ahead budget in bytes
    pub fn with_buffer_bytes(mut self, max_bytes: usize) -> Self {
        self.buffer = BufferConfig { max_bytes };
        self
    }
}

/// Point-in-time scheduler counters
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SchedulerStats {
    pub name: String,
    pub order: ScheduleOrder,
    #[serde(flatten)]
    pub queues: QueueCounts,
    /// Backfill taken off its queue for the `run` in progress (0 or 1)
    pub in_flight: usize,
    pub buffer_bytes_read: usize,
    pub buffer_max_bytes: usize,
    pub buffer_full: bool,
    /// `run` calls made
    pub runs: u64,
    /// Backfills that reported `Finished`
    pub finished: u64,
    /// Backfills that reported an error
    pub failed: u64,
    /// Backfills discarded because their stream was dead
    pub discarded: u64,
}

#[derive(Debug, Default, Clone, Copy)]
struct Counters {
    runs: u64,
    finished: u64,
    failed: u64,
    discarded: u64,
}

struct SchedulerState {
    queues: BackfillQueues,
    order: ScheduleOrder,
    /// Registered with the tracker as a waiter
    waiting: bool,
    /// Admitted backfill being run outside the lock
    in_flight: usize,
    counters: Counters,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Source {
    Initializing,
    Active,
}

/// Marks a step in progress; cleared on drop, including unwinding
struct StepGuard<'a>(&'a AtomicBool);

impl<'a> StepGuard<'a> {
    fn enter(flag: &'a AtomicBool) -> Option<Self> {
        flag.compare_exchange(false, true, Ordering::Acquire, Ordering::Relaxed)
            .ok()
            .map(|_| Self(flag))
    }
}

impl Drop for StepGuard<'_> {
    fn drop(&mut self) {
        self.0.store(false, Ordering::Release);
    }
}

/// Backfill scheduler for one replication connection
///
/// New backfills are admitted through the shared [`BackfillTracker`]; those
/// that cannot be admitted wait in `pending`. Each admitted backfill first
/// gets one uncontested run from `initializing`, then joins the `active`
/// rotation. Backfills that snooze park in `snoozing` until the snooze policy
/// or an explicit wake moves them back to `active`.
///
/// [`step`](Self::step) performs at most one admission attempt and at most one
/// `run` call. `schedule` may be called from any thread; `step` is meant to be
/// called by a single driver and reports [`StepStatus::Busy`] when re-entered.
///
/// Dropping the scheduler releases the slot of every admitted backfill still
/// queued and removes it from the tracker's waiters. It never calls `run` or
/// `cancel` on the backfills it drops.
///
/// # Example
///
/// ```ignore
/// use partition_backfill::prelude::*;
///
/// let tracker = Arc::new(AdmissionTracker::with_max_running(64));
/// let scheduler = BackfillScheduler::new(tracker, SchedulerConfig::new("replica-1"));
///
/// scheduler.schedule(disk_backfill);
/// while scheduler.step() != StepStatus::Idle {}
/// ```
pub struct BackfillScheduler {
    id: SchedulerId,
    name: String,
    tracker: Arc<dyn BackfillTracker>,
    state: Mutex<SchedulerState>,
    snooze_policy: Box<dyn SnoozePolicy>,
    buffer: Arc<BackfillBuffer>,
    stepping: AtomicBool,
    work: Notify,
}

impl BackfillScheduler {
    /// Create a scheduler admitting through `tracker`
    pub fn new(tracker: Arc<dyn BackfillTracker>, config: SchedulerConfig) -> Self {
        let id = SchedulerId::next();
        debug!(
            %id,
            name = %config.name,
            order = %config.order,
            "Creating backfill scheduler"
        );

        Self {
            id,
            tracker,
            snooze_policy: config.snooze.build(),
            buffer: Arc::new(BackfillBuffer::new(config.buffer)),
            state: Mutex::new(SchedulerState {
                queues: BackfillQueues::default(),
                order: config.order,
                waiting: false,
                in_flight: 0,
                counters: Counters::default(),
            }),
            name: config.name,
            stepping: AtomicBool::new(false),
            work: Notify::new(),
        }
    }

    /// Replace the snooze policy with a custom one
    pub fn with_snooze_policy(mut self, policy: Box<dyn SnoozePolicy>) -> Self {
        self.snooze_policy = policy;
        self
    }

    /// Identity used with the tracker
    pub fn id(&self) -> SchedulerId {
        self.id
    }

    /// Name used in logs and stats
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Read-ahead buffer shared with this scheduler's backfills
    pub fn buffer(&self) -> &Arc<BackfillBuffer> {
        &self.buffer
    }

    /// Hand a backfill to the scheduler
    ///
    /// Every call asks the tracker for a slot. Admitted backfills go to the
    /// back of `initializing`; denied ones join the back of `pending` and the
    /// scheduler registers as a waiter.
    #[instrument(level = "trace", skip_all, fields(scheduler = %self.name))]
    pub fn schedule<B: Backfill + 'static>(&self, backfill: B) -> ScheduleResult {
        let backfill: Box<dyn Backfill> = Box::new(backfill);
        let partition = backfill.partition_id();

        let result = {
            let mut state = self.state.lock();
            match AdmissionSlot::try_acquire(&self.tracker, self.id) {
                Some(slot) => {
                    state
                        .queues
                        .initializing
                        .push_back(AdmittedBackfill::new(backfill, slot));
                    ScheduleResult::Active
                }
                None => {
                    state.queues.pending.push_back(backfill);
                    if !state.waiting {
                        self.tracker.register_waiting(self.id);
                        state.waiting = true;
                    }
                    ScheduleResult::Pending
                }
            }
        };

        debug!(scheduler = %self.name, %partition, ?result, "Scheduled backfill");
        self.work.notify_one();
        result
    }

    /// Current servicing order
    pub fn order(&self) -> ScheduleOrder {
        self.state.lock().order
    }

    /// Change how `active` is serviced; takes effect on the next step
    pub fn set_order(&self, order: ScheduleOrder) {
        let mut state = self.state.lock();
        if state.order != order {
            debug!(scheduler = %self.name, from = %state.order, to = %order, "Changing backfill order");
            state.order = order;
        }
    }

    /// Advance the scheduler by at most one admission and one `run`
    ///
    /// 1. If `pending` is non-empty, try to admit its front into
    ///    `initializing`.
    /// 2. Run the front of `initializing` once, if any.
    /// 3. Otherwise run the front of `active`: round-robin rotates it to the
    ///    back on `Success`, sequential keeps it at the front.
    /// 4. Otherwise wake snoozing backfills the snooze policy reports ready.
    ///
    /// `Finished`, failed, and dead-source backfills are discarded and their
    /// slot released. `Snooze` parks the backfill in `snoozing`. Nothing runs
    /// while the read-ahead buffer is full.
    #[instrument(level = "trace", skip(self), fields(scheduler = %self.name))]
    pub fn step(&self) -> StepStatus {
        let Some(_guard) = StepGuard::enter(&self.stepping) else {
            return StepStatus::Busy;
        };

        let mut state = self.state.lock();
        let admitted = self.admit_pending(&mut state);

        if self.buffer.is_full() {
            trace!(bytes_read = self.buffer.bytes_read(), "Backfill buffer full, not running");
            return if admitted {
                StepStatus::MoreWork
            } else {
                StepStatus::Blocked
            };
        }

        let (entry, source) = if let Some(entry) = state.queues.initializing.pop_front() {
            (entry, Source::Initializing)
        } else if let Some(entry) = state.queues.active.pop_front() {
            (entry, Source::Active)
        } else if !state.queues.snoozing.is_empty() {
            let promoted = state
                .queues
                .promote_ready(Instant::now(), self.snooze_policy.as_ref());
            if promoted > 0 {
                debug!(scheduler = %self.name, promoted, "Woke snoozing backfills");
                return StepStatus::MoreWork;
            }
            return StepStatus::Blocked;
        } else if !state.queues.pending.is_empty() {
            return StepStatus::Blocked;
        } else {
            return StepStatus::Idle;
        };

        let order = state.order;
        state.in_flight += 1;
        drop(state);

        self.run_entry(entry, source, order)
    }

    /// Run one admitted backfill outside the queue lock and re-queue it by
    /// outcome
    fn run_entry(&self, mut entry: AdmittedBackfill, source: Source, order: ScheduleOrder) -> StepStatus {
        let partition = entry.partition_id();

        let outcome = if entry.backfill.is_source_dead() {
            entry.backfill.cancel();
            None
        } else {
            Some(entry.backfill.run())
        };

        let mut state = self.state.lock();
        state.in_flight -= 1;
        match outcome {
            None => {
                state.counters.discarded += 1;
                debug!(scheduler = %self.name, %partition, "Discarding backfill for dead stream");
                drop(entry);
            }
            Some(Ok(RunOutcome::Success)) => {
                state.counters.runs += 1;
                match (source, order) {
                    (Source::Active, ScheduleOrder::Sequential) => {
                        state.queues.active.push_front(entry)
                    }
                    _ => state.queues.active.push_back(entry),
                }
            }
            Some(Ok(RunOutcome::Finished)) => {
                state.counters.runs += 1;
                state.counters.finished += 1;
                debug!(scheduler = %self.name, %partition, "Backfill finished");
                drop(entry);
            }
            Some(Ok(RunOutcome::Snooze)) => {
                state.counters.runs += 1;
                trace!(scheduler = %self.name, %partition, "Backfill snoozing");
                state.queues.snoozing.push_back(SnoozingBackfill {
                    entry,
                    since: Instant::now(),
                });
            }
            Some(Err(error)) => {
                state.counters.runs += 1;
                state.counters.failed += 1;
                warn!(
                    scheduler = %self.name,
                    %partition,
                    error = %error,
                    "Backfill failed, discarding"
                );
                drop(entry);
            }
        }

        if state.queues.is_empty() {
            StepStatus::Idle
        } else {
            StepStatus::MoreWork
        }
    }

    /// Try to move the front of `pending` into `initializing`
    fn admit_pending(&self, state: &mut SchedulerState) -> bool {
        if state.queues.pending.is_empty() {
            return false;
        }

        let Some(slot) = AdmissionSlot::try_acquire(&self.tracker, self.id) else {
            trace!(pending = state.queues.pending.len(), "Pending backfill not admitted");
            return false;
        };

        let admitted = match state.queues.pending.pop_front() {
            Some(backfill) => {
                debug!(
                    scheduler = %self.name,
                    partition = %backfill.partition_id(),
                    "Admitted pending backfill"
                );
                state
                    .queues
                    .initializing
                    .push_back(AdmittedBackfill::new(backfill, slot));
                true
            }
            None => false,
        };

        if state.queues.pending.is_empty() && state.waiting {
            self.tracker.unregister_waiting(self.id);
            state.waiting = false;
        }
        admitted
    }

    /// Wake snoozing backfills of `partition` regardless of the snooze policy
    pub fn wake_snoozing(&self, partition: PartitionId) -> usize {
        let woken = self.state.lock().queues.wake_matching(|p| p == partition);
        if woken > 0 {
            debug!(scheduler = %self.name, %partition, woken, "Woke snoozing backfills");
            self.work.notify_one();
        }
        woken
    }

    /// Wake every snoozing backfill regardless of the snooze policy
    pub fn wake_all_snoozing(&self) -> usize {
        let woken = self.state.lock().queues.wake_matching(|_| true);
        if woken > 0 {
            self.work.notify_one();
        }
        woken
    }

    /// Number of backfills in each queue
    ///
    /// A backfill whose `run` is in progress sits in no queue; it is reported
    /// as [`SchedulerStats::in_flight`] instead.
    pub fn queue_counts(&self) -> QueueCounts {
        self.state.lock().queues.counts()
    }

    /// Whether any queue holds a backfill or one is being run
    pub fn has_work(&self) -> bool {
        let state = self.state.lock();
        state.in_flight > 0 || !state.queues.is_empty()
    }

    /// Snapshot of the scheduler counters
    pub fn stats(&self) -> SchedulerStats {
        let state = self.state.lock();
        SchedulerStats {
            name: self.name.clone(),
            order: state.order,
            queues: state.queues.counts(),
            in_flight: state.in_flight,
            buffer_bytes_read: self.buffer.bytes_read(),
            buffer_max_bytes: self.buffer.max_bytes(),
            buffer_full: self.buffer.is_full(),
            runs: state.counters.runs,
            finished: state.counters.finished,
            failed: state.counters.failed,
            discarded: state.counters.discarded,
        }
    }

    /// Signalled when new work arrives or snoozing backfills are woken
    pub(crate) fn work_notify(&self) -> &Notify {
        &self.work
    }
}

impl Drop for BackfillScheduler {
    fn drop(&mut self) {
        let state = self.state.get_mut();
        let counts = state.queues.counts();

        if state.waiting {
            self.tracker.unregister_waiting(self.id);
            state.waiting = false;
        }

        // Admitted entries release their slots as they drop
        drop(std::mem::take(&mut state.queues));

        if counts.total() > 0 {
            info!(
                scheduler = %self.name,
                pending = counts.pending,
                initializing = counts.initializing,
                active = counts.active,
                snoozing = counts.snoozing,
                "Dropped backfill scheduler with queued backfills"
            );
        } else {
            debug!(scheduler = %self.name, "Dropped backfill scheduler");
        }
    }
}

impl std::fmt::Debug for BackfillScheduler {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BackfillScheduler")
            .field("id", &self.id)
            .field("name", &self.name)
            .field("queues", &self.queue_counts())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backfill::BackfillError;
    use crate::tracker::AdmissionTracker;

    /// Backfill that succeeds `remaining` times then finishes
    struct Countdown {
        partition: PartitionId,
        remaining: usize,
    }

    impl Backfill for Countdown {
        fn run(&mut self) -> Result<RunOutcome, BackfillError> {
            if self.remaining == 0 {
                return Ok(RunOutcome::Finished);
            }
            self.remaining -= 1;
            Ok(RunOutcome::Success)
        }
        fn cancel(&mut self) {
            self.remaining = 0;
        }
        fn partition_id(&self) -> PartitionId {
            self.partition
        }
        fn is_source_dead(&self) -> bool {
            false
        }
    }

    fn countdown(partition: u16, remaining: usize) -> Countdown {
        Countdown {
            partition: PartitionId::new(partition),
            remaining,
        }
    }

    #[test]
    fn test_default_config() {
        let config = SchedulerConfig::default();
        assert_eq!(config.name, "backfills");
        assert_eq!(config.order, ScheduleOrder::RoundRobin);
        assert_eq!(config.buffer, BufferConfig::default());
    }

    #[test]
    fn test_config_builder() {
        let config = SchedulerConfig::new("replica-7")
            .with_order(ScheduleOrder::Sequential)
            .with_snooze(SnoozeConfig::WhenIdle)
            .with_buffer_bytes(4096);

        assert_eq!(config.name, "replica-7");
        assert_eq!(config.order, ScheduleOrder::Sequential);
        assert_eq!(config.snooze, SnoozeConfig::WhenIdle);
        assert_eq!(config.buffer.max_bytes, 4096);
    }

    #[test]
    fn test_empty_scheduler_is_idle() {
        let tracker = Arc::new(AdmissionTracker::with_max_running(1));
        let scheduler = BackfillScheduler::new(tracker, SchedulerConfig::default());
        assert_eq!(scheduler.step(), StepStatus::Idle);
        assert!(!scheduler.has_work());
    }

    #[test]
    fn test_step_reports_busy_when_reentered() {
        let tracker = Arc::new(AdmissionTracker::with_max_running(1));
        let scheduler = BackfillScheduler::new(tracker, SchedulerConfig::default());

        let _guard = StepGuard::enter(&scheduler.stepping).expect("not stepping");
        assert_eq!(scheduler.step(), StepStatus::Busy);
    }

    #[test]
    fn test_drains_and_releases_all_slots() {
        let tracker = Arc::new(AdmissionTracker::with_max_running(2));
        let scheduler = BackfillScheduler::new(tracker.clone(), SchedulerConfig::default());

        for partition in 0..4 {
            scheduler.schedule(countdown(partition, 2));
        }
        assert_eq!(scheduler.queue_counts().pending, 2);

        let mut steps = 0;
        while scheduler.step() != StepStatus::Idle {
            steps += 1;
            assert!(steps < 100, "scheduler did not drain");
        }

        let stats = scheduler.stats();
        assert_eq!(stats.finished, 4);
        assert_eq!(stats.runs, 12);
        assert_eq!(tracker.running(), 0);
        assert_eq!(tracker.stats().admitted, tracker.stats().released);
        assert_eq!(tracker.waiting_count(), 0);
    }

    #[test]
    fn test_full_buffer_blocks_runs() {
        let tracker = Arc::new(AdmissionTracker::with_max_running(1));
        let scheduler = BackfillScheduler::new(
            tracker,
            SchedulerConfig::default().with_buffer_bytes(10),
        );
        scheduler.schedule(countdown(1, 1));

        scheduler.buffer().force_read(11);
        assert_eq!(scheduler.step(), StepStatus::Blocked);
        assert_eq!(scheduler.stats().runs, 0);

        scheduler.buffer().sent(11);
        assert_eq!(scheduler.step(), StepStatus::MoreWork);
        assert_eq!(scheduler.stats().runs, 1);
    }

    #[test]
    fn test_set_order() {
        let tracker = Arc::new(AdmissionTracker::with_max_running(1));
        let scheduler = BackfillScheduler::new(tracker, SchedulerConfig::default());
        scheduler.set_order(ScheduleOrder::Sequential);
        assert_eq!(scheduler.order(), ScheduleOrder::Sequential);
        assert_eq!(scheduler.stats().order, ScheduleOrder::Sequential);
    }

    /// Backfill that records what its scheduler reports while it runs
    struct Observer {
        scheduler: Arc<std::sync::OnceLock<std::sync::Weak<BackfillScheduler>>>,
        seen: Arc<Mutex<Option<(usize, QueueCounts, bool)>>>,
    }

    impl Backfill for Observer {
        fn run(&mut self) -> Result<RunOutcome, BackfillError> {
            if let Some(scheduler) = self.scheduler.get().and_then(|s| s.upgrade()) {
                let stats = scheduler.stats();
                *self.seen.lock() = Some((stats.in_flight, stats.queues, scheduler.has_work()));
            }
            Ok(RunOutcome::Finished)
        }
        fn cancel(&mut self) {}
        fn partition_id(&self) -> PartitionId {
            PartitionId::new(0)
        }
        fn is_source_dead(&self) -> bool {
            false
        }
    }

    #[test]
    fn test_running_backfill_counts_as_in_flight() {
        let tracker = Arc::new(AdmissionTracker::with_max_running(1));
        let scheduler = Arc::new(BackfillScheduler::new(tracker.clone(), SchedulerConfig::default()));
        let handle = Arc::new(std::sync::OnceLock::new());
        handle.set(Arc::downgrade(&scheduler)).unwrap();
        let seen = Arc::new(Mutex::new(None));

        scheduler.schedule(Observer {
            scheduler: handle,
            seen: seen.clone(),
        });
        assert_eq!(scheduler.step(), StepStatus::Idle);

        let (in_flight, queues, has_work) = seen.lock().take().expect("backfill was not run");
        assert_eq!(in_flight, 1);
        assert_eq!(queues.total(), 0);
        assert!(has_work);

        assert_eq!(scheduler.stats().in_flight, 0);
        assert!(!scheduler.has_work());
        assert_eq!(tracker.running(), 0);
    }

    #[test]
    fn test_stats_serialization_flattens_queue_counts() {
        let tracker = Arc::new(AdmissionTracker::with_max_running(1));
        let scheduler = BackfillScheduler::new(tracker, SchedulerConfig::new("conn"));
        scheduler.schedule(countdown(1, 0));
        scheduler.schedule(countdown(2, 0));

        let json = serde_json::to_value(scheduler.stats()).unwrap();
        assert_eq!(json["name"], "conn");
        assert_eq!(json["order"], "round_robin");
        assert_eq!(json["initializing"], 1);
        assert_eq!(json["pending"], 1);
        assert_eq!(json["in_flight"], 0);
    }
}

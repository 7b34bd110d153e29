//! Bounded, fair admission of backfills across schedulers

use std::collections::{HashSet, VecDeque};
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};

use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use tokio::sync::futures::Notified;
use tokio::sync::Notify;
use tracing::{debug, error, info};

use super::limits::AdmissionConfig;

/// Identity of a scheduler as seen by the tracker
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SchedulerId(u64);

impl SchedulerId {
    /// Allocate a process-unique id
    pub fn next() -> Self {
        static NEXT: AtomicU64 = AtomicU64::new(1);
        Self(NEXT.fetch_add(1, Ordering::Relaxed))
    }

    /// Raw numeric id
    pub fn get(self) -> u64 {
        self.0
    }
}

impl fmt::Display for SchedulerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "scheduler:{}", self.0)
    }
}

/// Admission capability consulted by every scheduler
///
/// Implementations must be safe to call concurrently from many schedulers.
/// None of the operations block or fail.
pub trait BackfillTracker: Send + Sync {
    /// Take a slot if one is free for `scheduler`
    ///
    /// On `true` the caller holds one slot and must call [`release`] exactly
    /// once for it. On `false` nothing changed.
    ///
    /// [`release`]: BackfillTracker::release
    fn try_admit(&self, scheduler: SchedulerId) -> bool;

    /// Return a slot taken by a successful [`try_admit`](BackfillTracker::try_admit)
    fn release(&self);

    /// Record that `scheduler` has backfills waiting for a slot
    fn register_waiting(&self, scheduler: SchedulerId);

    /// Record that `scheduler` no longer has backfills waiting
    fn unregister_waiting(&self, scheduler: SchedulerId);
}

/// Point-in-time tracker counters
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TrackerStats {
    /// Slots currently held
    pub running: usize,
    /// Configured ceiling
    pub max_running: usize,
    /// Schedulers registered as waiters
    pub waiting: usize,
    /// Successful admissions since creation
    pub admitted: u64,
    /// Releases since creation
    pub released: u64,
    /// Denied admission attempts since creation
    pub denied: u64,
    /// Releases with no slot held (programming errors)
    pub invalid_releases: u64,
}

#[derive(Debug)]
struct TrackerState {
    running: usize,
    max_running: usize,
    waiters: VecDeque<SchedulerId>,
    waiting: HashSet<SchedulerId>,
    admitted: u64,
    released: u64,
    denied: u64,
    invalid_releases: u64,
}

impl TrackerState {
    /// Position of `scheduler` in the waiter queue, or the queue length when
    /// it is not waiting
    fn queue_position(&self, scheduler: SchedulerId) -> usize {
        if !self.waiting.contains(&scheduler) {
            return self.waiters.len();
        }
        self.waiters
            .iter()
            .position(|w| *w == scheduler)
            .unwrap_or(self.waiters.len())
    }
}

/// Bucket-wide admission tracker
///
/// Counts running backfills against a ceiling and keeps a FIFO of schedulers
/// with pending work. Free slots are offered to registered waiters in queue
/// order before fresh requests: a caller at waiter position `p` (or a fresh
/// caller, behind all waiters) is admitted only if `running + p < max_running`.
/// An admitted waiter rotates to the back of the queue.
///
/// Count and queue are guarded by a single lock.
///
/// # Example
///
/// ```
/// use partition_backfill::tracker::{AdmissionConfig, AdmissionTracker, BackfillTracker, SchedulerId};
///
/// let tracker = AdmissionTracker::new(AdmissionConfig::new().with_max_running(1));
/// let id = SchedulerId::next();
///
/// assert!(tracker.try_admit(id));
/// assert!(!tracker.try_admit(id));
/// tracker.release();
/// assert!(tracker.try_admit(id));
/// ```
pub struct AdmissionTracker {
    state: Mutex<TrackerState>,
    capacity: Notify,
}

impl AdmissionTracker {
    /// Create a tracker from configuration
    pub fn new(config: AdmissionConfig) -> Self {
        let max_running = config.effective_max_running();
        debug!(max_running, "Creating admission tracker");
        Self {
            state: Mutex::new(TrackerState {
                running: 0,
                max_running,
                waiters: VecDeque::new(),
                waiting: HashSet::new(),
                admitted: 0,
                released: 0,
                denied: 0,
                invalid_releases: 0,
            }),
            capacity: Notify::new(),
        }
    }

    /// Create a tracker with a fixed ceiling
    pub fn with_max_running(max_running: usize) -> Self {
        Self::new(AdmissionConfig::new().with_max_running(max_running))
    }

    /// Slots currently held
    pub fn running(&self) -> usize {
        self.state.lock().running
    }

    /// Current ceiling
    pub fn max_running(&self) -> usize {
        self.state.lock().max_running
    }

    /// Change the ceiling (floored at 1)
    ///
    /// A lower ceiling does not evict running backfills; it only holds back
    /// admissions until enough slots are released.
    pub fn set_max_running(&self, max_running: usize) {
        let max_running = max_running.max(1);
        let previous = {
            let mut state = self.state.lock();
            std::mem::replace(&mut state.max_running, max_running)
        };
        if previous != max_running {
            info!(previous, max_running, "Updated maximum running backfills");
        }
        if max_running > previous {
            self.capacity.notify_waiters();
        }
    }

    /// Recompute the ceiling for a new bucket memory quota
    pub fn update_for_memory_quota(&self, quota: u64) {
        self.set_max_running(AdmissionConfig::max_running_for_quota(quota));
    }

    /// Number of schedulers registered as waiting
    pub fn waiting_count(&self) -> usize {
        self.state.lock().waiters.len()
    }

    /// Whether `scheduler` is registered as waiting
    pub fn is_waiting(&self, scheduler: SchedulerId) -> bool {
        self.state.lock().waiting.contains(&scheduler)
    }

    /// Registered waiters in the order they will be offered slots
    pub fn waiters(&self) -> Vec<SchedulerId> {
        self.state.lock().waiters.iter().copied().collect()
    }

    /// Future that completes the next time a slot is released or the ceiling
    /// is raised
    pub fn capacity_released(&self) -> Notified<'_> {
        self.capacity.notified()
    }

    /// Snapshot of the tracker counters
    pub fn stats(&self) -> TrackerStats {
        let state = self.state.lock();
        TrackerStats {
            running: state.running,
            max_running: state.max_running,
            waiting: state.waiters.len(),
            admitted: state.admitted,
            released: state.released,
            denied: state.denied,
            invalid_releases: state.invalid_releases,
        }
    }
}

impl BackfillTracker for AdmissionTracker {
    fn try_admit(&self, scheduler: SchedulerId) -> bool {
        let mut state = self.state.lock();
        let position = state.queue_position(scheduler);

        if state.running + position >= state.max_running {
            state.denied += 1;
            debug!(
                %scheduler,
                running = state.running,
                max_running = state.max_running,
                position,
                "Backfill admission denied"
            );
            return false;
        }

        state.running += 1;
        state.admitted += 1;

        // Give the other waiters their turn before this one is served again
        if position < state.waiters.len() {
            if let Some(waiter) = state.waiters.remove(position) {
                state.waiters.push_back(waiter);
            }
        }
        true
    }

    /// Releasing with no slot held is counted and logged; debug builds
    /// panic after the lock is dropped.
    fn release(&self) {
        let held = {
            let mut state = self.state.lock();
            if state.running > 0 {
                state.running -= 1;
                state.released += 1;
                true
            } else {
                state.invalid_releases += 1;
                error!(
                    invalid_releases = state.invalid_releases,
                    "Backfill slot released with none held"
                );
                false
            }
        };

        debug_assert!(held, "backfill slot released with none held");
        if held {
            self.capacity.notify_waiters();
        }
    }

    fn register_waiting(&self, scheduler: SchedulerId) {
        let mut state = self.state.lock();
        if state.waiting.insert(scheduler) {
            state.waiters.push_back(scheduler);
            debug!(%scheduler, waiting = state.waiters.len(), "Scheduler waiting for backfill slot");
        }
    }

    fn unregister_waiting(&self, scheduler: SchedulerId) {
        let mut state = self.state.lock();
        if state.waiting.remove(&scheduler) {
            state.waiters.retain(|w| *w != scheduler);
            debug!(%scheduler, waiting = state.waiters.len(), "Scheduler no longer waiting");
        }
    }
}

impl fmt::Debug for AdmissionTracker {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let state = self.state.lock();
        f.debug_struct("AdmissionTracker")
            .field("running", &state.running)
            .field("max_running", &state.max_running)
            .field("waiters", &state.waiters)
            .finish()
    }
}

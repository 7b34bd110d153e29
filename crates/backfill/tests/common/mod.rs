// Shared fixtures for scheduler integration tests
#![allow(dead_code)]

use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;

use parking_lot::Mutex;
use partition_backfill::backfill::{Backfill, BackfillError, PartitionId, RunOutcome};
use partition_backfill::tracker::{BackfillTracker, SchedulerId};

/// Order in which backfills were run, shared between a test and its backfills
pub type RunLog = Arc<Mutex<Vec<u16>>>;

pub fn run_log() -> RunLog {
    Arc::new(Mutex::new(Vec::new()))
}

/// Backfill that replays a fixed list of outcomes, then reports `Finished`
pub struct ScriptedBackfill {
    partition: PartitionId,
    script: VecDeque<Result<RunOutcome, BackfillError>>,
    log: RunLog,
    dead: Arc<AtomicBool>,
    cancelled: Arc<AtomicBool>,
}

impl ScriptedBackfill {
    pub fn new(partition: u16, log: &RunLog) -> Self {
        Self {
            partition: PartitionId::new(partition),
            script: VecDeque::new(),
            log: log.clone(),
            dead: Arc::new(AtomicBool::new(false)),
            cancelled: Arc::new(AtomicBool::new(false)),
        }
    }

    /// Report `Success` this many times before the rest of the script
    pub fn successes(mut self, count: usize) -> Self {
        self.script
            .extend(std::iter::repeat_with(|| Ok(RunOutcome::Success)).take(count));
        self
    }

    pub fn then(mut self, outcome: RunOutcome) -> Self {
        self.script.push_back(Ok(outcome));
        self
    }

    pub fn then_fail(mut self, reason: &str) -> Self {
        self.script
            .push_back(Err(BackfillError::snapshot(self.partition, reason)));
        self
    }

    /// Handle that marks the source stream dead
    pub fn dead_flag(&self) -> Arc<AtomicBool> {
        self.dead.clone()
    }

    /// Handle set once `cancel` was called
    pub fn cancelled_flag(&self) -> Arc<AtomicBool> {
        self.cancelled.clone()
    }
}

impl Backfill for ScriptedBackfill {
    fn run(&mut self) -> Result<RunOutcome, BackfillError> {
        self.log.lock().push(self.partition.get());
        self.script.pop_front().unwrap_or(Ok(RunOutcome::Finished))
    }

    fn cancel(&mut self) {
        self.cancelled.store(true, Ordering::SeqCst);
        self.script.clear();
    }

    fn partition_id(&self) -> PartitionId {
        self.partition
    }

    fn is_source_dead(&self) -> bool {
        self.dead.load(Ordering::SeqCst)
    }
}

/// Tracker whose admission answers are scripted by the test
///
/// Once the script runs out every request is admitted.
#[derive(Default)]
pub struct ScriptedTracker {
    answers: Mutex<VecDeque<bool>>,
    pub admits: AtomicUsize,
    pub releases: AtomicUsize,
    pub registered: Mutex<Vec<SchedulerId>>,
    pub unregistered: Mutex<Vec<SchedulerId>>,
}

impl ScriptedTracker {
    pub fn new(answers: impl IntoIterator<Item = bool>) -> Arc<Self> {
        Arc::new(Self {
            answers: Mutex::new(answers.into_iter().collect()),
            ..Default::default()
        })
    }

    pub fn admits(&self) -> usize {
        self.admits.load(Ordering::SeqCst)
    }

    pub fn releases(&self) -> usize {
        self.releases.load(Ordering::SeqCst)
    }
}

impl BackfillTracker for ScriptedTracker {
    fn try_admit(&self, _scheduler: SchedulerId) -> bool {
        let admit = self.answers.lock().pop_front().unwrap_or(true);
        if admit {
            self.admits.fetch_add(1, Ordering::SeqCst);
        }
        admit
    }

    fn release(&self) {
        self.releases.fetch_add(1, Ordering::SeqCst);
    }

    fn register_waiting(&self, scheduler: SchedulerId) {
        self.registered.lock().push(scheduler);
    }

    fn unregister_waiting(&self, scheduler: SchedulerId) {
        self.unregistered.lock().push(scheduler);
    }
}

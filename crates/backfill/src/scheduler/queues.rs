//! The four per-scheduler backfill queues
//!
//! Each backfill lives in exactly one queue (or is in flight inside a step).
//! Only `pending` entries are unadmitted; the other three carry their
//! [`AdmissionSlot`], so removing an entry from them without re-queuing it
//! releases the slot.

use std::collections::VecDeque;
use std::fmt;
use std::time::Instant;

use serde::{Deserialize, Serialize};

use super::snooze::SnoozePolicy;
use crate::backfill::{Backfill, PartitionId};
use crate::tracker::AdmissionSlot;

/// A backfill together with the slot it was admitted under
pub(crate) struct AdmittedBackfill {
    pub(crate) backfill: Box<dyn Backfill>,
    slot: AdmissionSlot,
}

impl AdmittedBackfill {
    pub(crate) fn new(backfill: Box<dyn Backfill>, slot: AdmissionSlot) -> Self {
        Self { backfill, slot }
    }

    pub(crate) fn partition_id(&self) -> PartitionId {
        self.backfill.partition_id()
    }
}

impl fmt::Debug for AdmittedBackfill {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AdmittedBackfill")
            .field("partition", &self.partition_id())
            .field("slot", &self.slot)
            .finish()
    }
}

#[derive(Debug)]
pub(crate) struct SnoozingBackfill {
    pub(crate) entry: AdmittedBackfill,
    pub(crate) since: Instant,
}

/// Number of backfills in each queue
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct QueueCounts {
    pub pending: usize,
    pub initializing: usize,
    pub active: usize,
    pub snoozing: usize,
}

impl QueueCounts {
    /// Backfills holding a tracker slot
    pub fn admitted(&self) -> usize {
        self.initializing + self.active + self.snoozing
    }

    /// All queued backfills
    pub fn total(&self) -> usize {
        self.pending + self.admitted()
    }
}

#[derive(Default)]
pub(crate) struct BackfillQueues {
    pub(crate) pending: VecDeque<Box<dyn Backfill>>,
    pub(crate) initializing: VecDeque<AdmittedBackfill>,
    pub(crate) active: VecDeque<AdmittedBackfill>,
    pub(crate) snoozing: VecDeque<SnoozingBackfill>,
}

impl BackfillQueues {
    pub(crate) fn counts(&self) -> QueueCounts {
        QueueCounts {
            pending: self.pending.len(),
            initializing: self.initializing.len(),
            active: self.active.len(),
            snoozing: self.snoozing.len(),
        }
    }

    pub(crate) fn is_empty(&self) -> bool {
        self.counts().total() == 0
    }

    /// Move snoozing entries the policy reports ready to the back of
    /// `active`, front first, stopping at the first entry that is not ready
    pub(crate) fn promote_ready(&mut self, now: Instant, policy: &dyn SnoozePolicy) -> usize {
        let mut promoted = 0;
        while let Some(front) = self.snoozing.front() {
            if !policy.should_wake(now.saturating_duration_since(front.since)) {
                break;
            }
            if let Some(snoozed) = self.snoozing.pop_front() {
                self.active.push_back(snoozed.entry);
                promoted += 1;
            }
        }
        promoted
    }

    /// Move every snoozing entry matching `wake` to the back of `active`,
    /// preserving snooze order
    pub(crate) fn wake_matching(&mut self, wake: impl Fn(PartitionId) -> bool) -> usize {
        let mut still_snoozing = VecDeque::with_capacity(self.snoozing.len());
        let mut woken = 0;
        for snoozed in self.snoozing.drain(..) {
            if wake(snoozed.entry.partition_id()) {
                self.active.push_back(snoozed.entry);
                woken += 1;
            } else {
                still_snoozing.push_back(snoozed);
            }
        }
        self.snoozing = still_snoozing;
        woken
    }
}

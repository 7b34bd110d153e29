//! Held admission slot

use std::fmt;
use std::sync::Arc;

use super::admission::{BackfillTracker, SchedulerId};

/// One admission slot held against a [`BackfillTracker`]
///
/// Created only by a successful admission; dropping it calls
/// [`BackfillTracker::release`] exactly once. Every exit path of an admitted
/// backfill (finished, failed, discarded, scheduler dropped) goes through this
/// drop.
pub struct AdmissionSlot {
    tracker: Arc<dyn BackfillTracker>,
}

impl AdmissionSlot {
    /// Try to take a slot for `scheduler`
    pub fn try_acquire(tracker: &Arc<dyn BackfillTracker>, scheduler: SchedulerId) -> Option<Self> {
        tracker.try_admit(scheduler).then(|| Self {
            tracker: Arc::clone(tracker),
        })
    }
}

impl Drop for AdmissionSlot {
    fn drop(&mut self) {
        self.tracker.release();
    }
}

impl fmt::Debug for AdmissionSlot {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AdmissionSlot").finish_non_exhaustive()
    }
}

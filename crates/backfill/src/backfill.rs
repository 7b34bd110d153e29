//! The unit of replay work handed to a scheduler
//!
//! A [`Backfill`] replays one partition's history to a replication stream.
//! The storage layer owns the implementations (disk scan, in-memory scan, ...);
//! the scheduler only drives them through this trait and looks at the
//! [`RunOutcome`] of each call.

use std::fmt;

use serde::{Deserialize, Serialize};

/// Identifier of an independently replicated shard of the keyspace
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct PartitionId(pub u16);

impl PartitionId {
    /// Create a partition id
    pub const fn new(id: u16) -> Self {
        Self(id)
    }

    /// Raw numeric id
    pub const fn get(self) -> u16 {
        self.0
    }
}

impl fmt::Display for PartitionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "partition:{}", self.0)
    }
}

impl From<u16> for PartitionId {
    fn from(id: u16) -> Self {
        Self(id)
    }
}

/// Result of a single [`Backfill::run`] call
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RunOutcome {
    /// Made progress, more work remains
    Success,
    /// Complete; `run` must not be called again
    Finished,
    /// Temporarily blocked; retry later
    Snooze,
}

impl fmt::Display for RunOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Success => write!(f, "success"),
            Self::Finished => write!(f, "finished"),
            Self::Snooze => write!(f, "snooze"),
        }
    }
}

/// Failure reported by a backfill implementation
///
/// Any error from [`Backfill::run`] is fatal to that backfill only: the
/// scheduler discards it and frees its admission slot.
#[derive(Debug, Clone, thiserror::Error)]
pub enum BackfillError {
    /// Reading the partition snapshot failed
    #[error("snapshot read failed for {partition}: {reason}")]
    Snapshot {
        partition: PartitionId,
        reason: String,
    },

    /// The implementation reached a state it cannot report as an outcome
    #[error("backfill for {partition} violated its run contract: {reason}")]
    Contract {
        partition: PartitionId,
        reason: String,
    },
}

impl BackfillError {
    /// Create a snapshot read error
    pub fn snapshot(partition: PartitionId, reason: impl Into<String>) -> Self {
        Self::Snapshot {
            partition,
            reason: reason.into(),
        }
    }

    /// Create a contract violation error
    pub fn contract(partition: PartitionId, reason: impl Into<String>) -> Self {
        Self::Contract {
            partition,
            reason: reason.into(),
        }
    }

    /// Partition the failed backfill was replaying
    pub fn partition(&self) -> PartitionId {
        match self {
            Self::Snapshot { partition, .. } | Self::Contract { partition, .. } => *partition,
        }
    }
}

/// A single unit of replay work for one partition
///
/// Implementations are moved into a scheduler and owned by exactly one of its
/// queues at a time. `run` is only ever invoked by one thread at a time.
pub trait Backfill: Send {
    /// Advance the backfill by one bounded chunk of work
    fn run(&mut self) -> Result<RunOutcome, BackfillError>;

    /// Abandon the backfill; the next `run` (if any) should report `Finished`
    fn cancel(&mut self);

    /// Partition this backfill replays
    fn partition_id(&self) -> PartitionId;

    /// Whether the stream this backfill feeds has gone away
    fn is_source_dead(&self) -> bool;
}

impl<B: Backfill + ?Sized> Backfill for Box<B> {
    fn run(&mut self) -> Result<RunOutcome, BackfillError> {
        (**self).run()
    }

    fn cancel(&mut self) {
        (**self).cancel()
    }

    fn partition_id(&self) -> PartitionId {
        (**self).partition_id()
    }

    fn is_source_dead(&self) -> bool {
        (**self).is_source_dead()
    }
}

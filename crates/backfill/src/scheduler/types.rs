//! Scheduler result and ordering types

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::config::ConfigError;

/// How a scheduler services its active backfills
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ScheduleOrder {
    /// Rotate through active backfills, one run each
    #[default]
    RoundRobin,
    /// Run the oldest active backfill to completion before the next
    Sequential,
}

impl fmt::Display for ScheduleOrder {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::RoundRobin => write!(f, "round-robin"),
            Self::Sequential => write!(f, "sequential"),
        }
    }
}

impl FromStr for ScheduleOrder {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().replace('_', "-").as_str() {
            "round-robin" | "roundrobin" => Ok(Self::RoundRobin),
            "sequential" => Ok(Self::Sequential),
            other => Err(ConfigError::invalid(format!(
                "unknown schedule order '{other}'"
            ))),
        }
    }
}

/// Outcome of handing a backfill to a scheduler
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ScheduleResult {
    /// Admitted; holds a tracker slot and will run on the next steps
    Active,
    /// Not yet admitted; queued until a slot frees up
    Pending,
}

/// What a single [`step`](super::BackfillScheduler::step) achieved
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StepStatus {
    /// Progress was made and work remains; step again
    MoreWork,
    /// Work remains but nothing could run; back off before stepping again
    Blocked,
    /// All queues are empty
    Idle,
    /// Another step is running on this scheduler; nothing was done
    Busy,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_order_is_round_robin() {
        assert_eq!(ScheduleOrder::default(), ScheduleOrder::RoundRobin);
    }

    #[test]
    fn test_order_parsing() {
        assert_eq!(
            "round_robin".parse::<ScheduleOrder>().unwrap(),
            ScheduleOrder::RoundRobin
        );
        assert_eq!(
            "Round-Robin".parse::<ScheduleOrder>().unwrap(),
            ScheduleOrder::RoundRobin
        );
        assert_eq!(
            "sequential".parse::<ScheduleOrder>().unwrap(),
            ScheduleOrder::Sequential
        );
        assert!("random".parse::<ScheduleOrder>().is_err());
    }

    #[test]
    fn test_order_display_round_trips() {
        for order in [ScheduleOrder::RoundRobin, ScheduleOrder::Sequential] {
            assert_eq!(order.to_string().parse::<ScheduleOrder>().unwrap(), order);
        }
    }
}

//! Wake-up policy for snoozing backfills

use std::fmt;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::config::duration_millis;

/// Decides when a snoozing backfill may rejoin the active rotation
///
/// Consulted only when a scheduler has nothing initializing or active, for
/// entries in snooze order, front first.
pub trait SnoozePolicy: Send + Sync + fmt::Debug {
    /// Whether an entry that has been snoozing for `snoozed_for` may wake
    fn should_wake(&self, snoozed_for: Duration) -> bool;
}

/// Wake snoozing backfills as soon as nothing else is runnable
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct WakeWhenIdle;

impl SnoozePolicy for WakeWhenIdle {
    fn should_wake(&self, _snoozed_for: Duration) -> bool {
        true
    }
}

/// Keep backfills snoozing for at least a fixed interval
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Cooldown(pub Duration);

impl Default for Cooldown {
    fn default() -> Self {
        Self(Duration::from_secs(1))
    }
}

impl SnoozePolicy for Cooldown {
    fn should_wake(&self, snoozed_for: Duration) -> bool {
        snoozed_for >= self.0
    }
}

/// Serializable choice of [`SnoozePolicy`]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "policy", rename_all = "snake_case")]
pub enum SnoozeConfig {
    /// See [`WakeWhenIdle`]
    WhenIdle,
    /// See [`Cooldown`]
    Cooldown {
        #[serde(with = "duration_millis")]
        interval: Duration,
    },
}

impl Default for SnoozeConfig {
    fn default() -> Self {
        Self::Cooldown {
            interval: Cooldown::default().0,
        }
    }
}

impl SnoozeConfig {
    /// Cooldown policy with the given interval
    pub fn cooldown(interval: Duration) -> Self {
        Self::Cooldown { interval }
    }

    /// Build the policy this configuration describes
    pub fn build(&self) -> Box<dyn SnoozePolicy> {
        match *self {
            Self::WhenIdle => Box::new(WakeWhenIdle),
            Self::Cooldown { interval } if interval.is_zero() => Box::new(WakeWhenIdle),
            Self::Cooldown { interval } => Box::new(Cooldown(interval)),
        }
    }
}

//! Read-ahead byte budget shared by a scheduler's backfills
//!
//! Backfills account bytes they read from disk; the stream accounts bytes it
//! has sent to the consumer. While the difference exceeds the budget the
//! scheduler stops running backfills.

use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use tokio::sync::Notify;
use tracing::trace;

/// Default read-ahead budget per scheduler
pub const DEFAULT_BUFFER_BYTES: usize = 20 * 1024 * 1024;

/// Buffer configuration
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub struct BufferConfig {
    /// Maximum bytes read but not yet sent
    pub max_bytes: usize,
}

impl Default for BufferConfig {
    fn default() -> Self {
        Self {
            max_bytes: DEFAULT_BUFFER_BYTES,
        }
    }
}

#[derive(Debug, Default)]
struct BufferState {
    bytes_read: usize,
    full: bool,
}

/// Byte budget for data read by backfills and not yet sent
#[derive(Debug)]
pub struct BackfillBuffer {
    max_bytes: usize,
    state: Mutex<BufferState>,
    drained: Notify,
}

impl BackfillBuffer {
    /// Create a buffer from configuration
    pub fn new(config: BufferConfig) -> Self {
        Self {
            max_bytes: config.max_bytes.max(1),
            state: Mutex::new(BufferState::default()),
            drained: Notify::new(),
        }
    }

    /// Account `bytes` about to be read
    ///
    /// An empty buffer always accepts, so a single item larger than the budget
    /// can still make progress. Otherwise a read that would exceed the budget
    /// is refused and the buffer is marked full.
    pub fn try_read(&self, bytes: usize) -> bool {
        let mut state = self.state.lock();
        if state.bytes_read == 0 || state.bytes_read + bytes <= self.max_bytes {
            state.bytes_read += bytes;
            true
        } else {
            state.full = true;
            trace!(bytes, bytes_read = state.bytes_read, "Backfill buffer full");
            false
        }
    }

    /// Account `bytes` that were read regardless of the budget
    pub fn force_read(&self, bytes: usize) {
        let mut state = self.state.lock();
        state.bytes_read += bytes;
        if state.bytes_read > self.max_bytes {
            state.full = true;
        }
    }

    /// Account `bytes` handed to the consumer
    pub fn sent(&self, bytes: usize) {
        let reopened = {
            let mut state = self.state.lock();
            state.bytes_read = state.bytes_read.saturating_sub(bytes);
            if state.full && state.bytes_read < self.max_bytes {
                state.full = false;
                true
            } else {
                false
            }
        };
        if reopened {
            self.drained.notify_waiters();
        }
    }

    /// Whether the budget is exhausted
    pub fn is_full(&self) -> bool {
        self.state.lock().full
    }

    /// Bytes read and not yet sent
    pub fn bytes_read(&self) -> usize {
        self.state.lock().bytes_read
    }

    /// Configured budget
    pub fn max_bytes(&self) -> usize {
        self.max_bytes
    }

    pub(crate) fn drained(&self) -> &Notify {
        &self.drained
    }
}

impl Default for BackfillBuffer {
    fn default() -> Self {
        Self::new(BufferConfig::default())
    }
}

//! Checkpoint policy configuration.
//!
//! Checkpoints bound recovery time: restart only replays the log from the
//! last successful checkpoint. The recovery manager tracks how much work
//! has happened since the last checkpoint and reports when a new one is
//! due according to this policy.

/// Default number of committed transactions between checkpoints.
pub const DEFAULT_TXN_THRESHOLD: u64 = 1000;

/// Default number of log bytes appended between checkpoints (4MB).
pub const DEFAULT_BYTES_THRESHOLD: u64 = 4 * 1024 * 1024;

/// Thresholds that trigger an automatic checkpoint.
#[derive(Debug, Copy, Clone)]
pub struct CheckpointPolicy {
    /// Number of committed transactions between automatic checkpoints.
    /// Set to 0 to disable transaction-based checkpoints.
    pub txn_threshold: u64,

    /// Number of bytes appended to the log between automatic checkpoints.
    /// Set to 0 to disable byte-based checkpoints.
    pub bytes_threshold: u64,
}

impl Default for CheckpointPolicy {
    fn default() -> Self {
        Self {
            txn_threshold: DEFAULT_TXN_THRESHOLD,
            bytes_threshold: DEFAULT_BYTES_THRESHOLD,
        }
    }
}

impl CheckpointPolicy {
    /// Create a new checkpoint policy.
    #[must_use]
    pub const fn new(txn_threshold: u64, bytes_threshold: u64) -> Self {
        Self {
            txn_threshold,
            bytes_threshold,
        }
    }

    /// Disable automatic checkpoints (manual only).
    #[must_use]
    pub const fn disabled() -> Self {
        Self {
            txn_threshold: 0,
            bytes_threshold: 0,
        }
    }

    /// Whether the given accounting since the last checkpoint crosses a
    /// threshold.
    #[must_use]
    pub const fn is_due(&self, txns_since: u64, bytes_since: u64) -> bool {
        (self.txn_threshold > 0 && txns_since >= self.txn_threshold)
            || (self.bytes_threshold > 0 && bytes_since >= self.bytes_threshold)
    }
}

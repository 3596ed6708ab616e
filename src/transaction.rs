//! Transaction handles as seen by the lock and recovery managers.
//!
//! The engine's transaction machinery (begin/commit plumbing, statement
//! execution, cursor management) lives outside this crate. The lock manager
//! and recovery manager only need a narrow view of a transaction: its
//! number, its status, the blocking protocol used while a lock request is
//! queued, and a cleanup hook invoked when the transaction completes.

use std::sync::Arc;

/// Lifecycle status of a transaction.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Status {
    /// Actively executing operations.
    Running,
    /// Commit record written; waiting for completion.
    Committing,
    /// Abort requested; changes are being rolled back.
    Aborting,
    /// Was mid-flight at crash time and is being rolled back during
    /// restart. Distinguished from an explicit user abort.
    RecoveryAborting,
    /// Finished, either committed or fully rolled back.
    Complete,
}

impl Status {
    /// Whether restart analysis may move a transaction from `self` to
    /// `next` when merging a checkpoint snapshot.
    ///
    /// Only forward transitions out of `Running` are permitted; statuses
    /// never move backward.
    #[must_use]
    pub fn can_transition_to(self, next: Self) -> bool {
        self == Self::Running
            && matches!(
                next,
                Self::Committing | Self::Aborting | Self::RecoveryAborting
            )
    }
}

impl std::fmt::Display for Status {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Running => write!(f, "running"),
            Self::Committing => write!(f, "committing"),
            Self::Aborting => write!(f, "aborting"),
            Self::RecoveryAborting => write!(f, "recovery-aborting"),
            Self::Complete => write!(f, "complete"),
        }
    }
}

/// The view of a transaction consumed by the lock and recovery managers.
///
/// Blocking is a two-phase protocol: the lock manager calls
/// [`prepare_block`](TransactionHandle::prepare_block) while holding its
/// monitor (marking the transaction as pending), then calls
/// [`block`](TransactionHandle::block) after releasing it. The transaction
/// stays blocked until a queue drain on some release path calls
/// [`unblock`](TransactionHandle::unblock). The split keeps the releaser's
/// drain path from re-entering the monitor.
pub trait TransactionHandle: Send + Sync {
    /// The transaction number.
    fn trans_num(&self) -> crate::TxnId;

    /// Current lifecycle status.
    fn status(&self) -> Status;

    /// Update the lifecycle status.
    fn set_status(&self, status: Status);

    /// Mark the transaction as about to block. Called with the lock
    /// manager monitor held.
    fn prepare_block(&self);

    /// Block until [`unblock`](TransactionHandle::unblock) is called.
    /// Called outside the lock manager monitor.
    fn block(&self);

    /// Wake the transaction after its queued lock request was granted.
    fn unblock(&self);

    /// Release all resources held by the transaction (locks, pinned
    /// pages). Called when the transaction reaches
    /// [`Status::Complete`].
    fn cleanup(&self);
}

/// Shared handle to a transaction.
pub type TxnRef = Arc<dyn TransactionHandle>;

//! Multigranularity lock management.
//!
//! Locking is layered:
//!
//! - [`LockManager`] owns the raw bookkeeping: which transactions hold
//!   which locks on which resources, and the FIFO queues of requests that
//!   could not be granted. It knows nothing about hierarchy.
//! - [`LockContext`] wraps the manager in a tree mirroring the resource
//!   hierarchy (database → table → page) and enforces the
//!   multigranularity rules: intent locks on ancestors before real locks
//!   on descendants, no releasing a lock that still covers child locks.
//! - [`ensure_sufficient_lock_held`] is the declarative layer callers
//!   should use: given a context and a requested capability (S, X or NL)
//!   it acquires, promotes, and escalates whatever the transaction is
//!   missing, and nothing more.

mod context;
mod lock_mode;
mod manager;
mod resource;
mod util;

pub use context::LockContext;
pub use lock_mode::LockMode;
pub use manager::{Lock, LockManager};
pub use resource::ResourceName;
pub use util::ensure_sufficient_lock_held;

use crate::TxnId;

/// Why a lock request would put the lock manager in an invalid state.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum InvalidLockKind {
    /// The parent context's lock does not permit this mode on a child.
    ParentMode {
        /// Mode held on the parent resource.
        parent_mode: LockMode,
        /// Mode requested on the child resource.
        mode: LockMode,
    },
    /// The new mode does not substitute for the currently held mode.
    NotAPromotion {
        /// Mode currently held.
        from: LockMode,
        /// Mode requested.
        to: LockMode,
    },
    /// Releasing this lock would orphan locks held on descendants.
    ChildLocksHeld {
        /// Resource whose lock was to be released.
        name: ResourceName,
        /// Number of descendant locks still held.
        count: usize,
    },
    /// An ancestor already holds SIX, making this SIX redundant.
    RedundantSix {
        /// The ancestor holding SIX.
        ancestor: ResourceName,
    },
}

/// Errors raised at the lock-layer boundaries.
///
/// Validation happens before any mutation: an error leaves the lock
/// manager and every context unchanged.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LockError {
    /// The transaction already holds the requested lock.
    DuplicateLockRequest {
        /// Requesting transaction.
        trans_num: TxnId,
        /// Resource already locked.
        name: ResourceName,
    },
    /// The operation requires an existing lock that is absent.
    NoLockHeld {
        /// Requesting transaction.
        trans_num: TxnId,
        /// Resource with no lock held.
        name: ResourceName,
    },
    /// The request would violate multigranularity or substitutability
    /// constraints.
    InvalidLock(InvalidLockKind),
    /// Mutating call on a readonly context.
    UnsupportedOperation {
        /// The readonly resource.
        name: ResourceName,
    },
}

impl std::fmt::Display for LockError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::DuplicateLockRequest { trans_num, name } => {
                write!(f, "transaction {trans_num} already holds a lock on {name}")
            }
            Self::NoLockHeld { trans_num, name } => {
                write!(f, "transaction {trans_num} holds no lock on {name}")
            }
            Self::InvalidLock(kind) => match kind {
                InvalidLockKind::ParentMode { parent_mode, mode } => {
                    write!(f, "parent lock {parent_mode} does not permit child lock {mode}")
                }
                InvalidLockKind::NotAPromotion { from, to } => {
                    write!(f, "{to} is not a promotion of {from}")
                }
                InvalidLockKind::ChildLocksHeld { name, count } => {
                    write!(f, "cannot release {name}: {count} descendant lock(s) held")
                }
                InvalidLockKind::RedundantSix { ancestor } => {
                    write!(f, "ancestor {ancestor} already holds SIX")
                }
            },
            Self::UnsupportedOperation { name } => {
                write!(f, "context {name} is readonly")
            }
        }
    }
}

impl std::error::Error for LockError {}

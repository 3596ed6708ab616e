//! Test doubles and harness helpers.
//!
//! [`TestTransaction`] is a deterministic stand-in for the engine's
//! transaction machinery: blocking is recorded as a flag instead of
//! suspending the thread, so single-threaded tests can drive the lock
//! manager through conflict scenarios and assert on who would be
//! blocked. Cleanup calls are counted for the same reason.

use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Mutex;

use crate::transaction::{Status, TransactionHandle};
use crate::TxnId;

/// A deterministic transaction double.
///
/// `block` does not suspend the calling thread; it records the blocked
/// state, which tests inspect through [`is_blocked`](Self::is_blocked).
/// A real engine passes a handle whose `block`/`unblock` park and wake
/// the transaction's thread.
pub struct TestTransaction {
    trans_num: TxnId,
    status: Mutex<Status>,
    pending_block: AtomicBool,
    blocked: AtomicBool,
    cleanups: AtomicUsize,
}

impl TestTransaction {
    /// Create a running transaction with the given number.
    #[must_use]
    pub fn new(trans_num: TxnId) -> Self {
        Self {
            trans_num,
            status: Mutex::new(Status::Running),
            pending_block: AtomicBool::new(false),
            blocked: AtomicBool::new(false),
            cleanups: AtomicUsize::new(0),
        }
    }

    /// Whether the transaction is (or would be) blocked on a lock
    /// request.
    #[must_use]
    pub fn is_blocked(&self) -> bool {
        self.blocked.load(Ordering::Acquire) || self.pending_block.load(Ordering::Acquire)
    }

    /// How many times `cleanup` was invoked.
    #[must_use]
    pub fn cleanup_count(&self) -> usize {
        self.cleanups.load(Ordering::Acquire)
    }
}

impl TransactionHandle for TestTransaction {
    fn trans_num(&self) -> TxnId {
        self.trans_num
    }

    #[allow(clippy::expect_used)] // Mutex poisoning indicates unrecoverable state
    fn status(&self) -> Status {
        *self.status.lock().expect("lock poisoned")
    }

    #[allow(clippy::expect_used)] // Mutex poisoning indicates unrecoverable state
    fn set_status(&self, status: Status) {
        *self.status.lock().expect("lock poisoned") = status;
    }

    fn prepare_block(&self) {
        self.pending_block.store(true, Ordering::Release);
    }

    fn block(&self) {
        self.pending_block.store(false, Ordering::Release);
        self.blocked.store(true, Ordering::Release);
    }

    fn unblock(&self) {
        self.pending_block.store(false, Ordering::Release);
        self.blocked.store(false, Ordering::Release);
    }

    fn cleanup(&self) {
        self.cleanups.fetch_add(1, Ordering::AcqRel);
    }
}

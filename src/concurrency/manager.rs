//! The lock manager.
//!
//! Tracks which transactions hold which locks on which resources, and
//! queues requests that cannot be granted. The manager is deliberately
//! flat: multigranularity is layered on top by
//! [`LockContext`](crate::concurrency::LockContext), and most code should
//! go through a context rather than calling the manager directly.
//!
//! # Queueing
//!
//! Each resource has a FIFO queue of requests that could not be satisfied
//! when they arrived. The queue is drained every time a lock on the
//! resource is released, front to back, stopping at the first request
//! that is incompatible with the remaining granted locks. Head-of-line
//! blocking is intentional: a queued upgrade is never starved by
//! compatible readers that arrived after it.
//!
//! # Blocking
//!
//! All operations hold a single coarse monitor across validation and
//! mutation. Blocking a transaction is split in two: `prepare_block` is
//! called with the monitor held (so the enqueue and the pending mark are
//! atomic), and `block` is called after the monitor is released (so the
//! releaser's drain path never needs to re-enter the monitor to wake us).

use std::collections::{HashMap, VecDeque};
use std::sync::Mutex;

use crate::concurrency::{LockError, LockMode, ResourceName};
use crate::transaction::TxnRef;
use crate::TxnId;

/// A granted lock.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Lock {
    /// The locked resource.
    pub name: ResourceName,
    /// The held mode.
    pub mode: LockMode,
    /// The holding transaction.
    pub trans_num: TxnId,
}

/// A request that could not be granted immediately.
#[derive(Clone)]
struct LockRequest {
    /// The blocked transaction, woken when the request is granted.
    transaction: TxnRef,
    /// The lock to grant.
    lock: Lock,
    /// Resources to release once the lock is granted (deferred
    /// acquire-and-release).
    release_names: Vec<ResourceName>,
}

/// Granted locks and the wait queue for one resource.
#[derive(Default)]
struct ResourceEntry {
    /// Granted locks, in acquisition order. Invariant: pairwise
    /// compatible except between locks of the same transaction.
    granted: Vec<Lock>,
    /// Requests waiting for a release, in arrival order.
    queue: VecDeque<LockRequest>,
}

#[derive(Default)]
struct Inner {
    /// Locks held per transaction, in acquisition order.
    transaction_locks: HashMap<TxnId, Vec<Lock>>,
    /// Per-resource granted locks and wait queues.
    resources: HashMap<ResourceName, ResourceEntry>,
}

impl Inner {
    fn mode_of(&self, trans_num: TxnId, name: &ResourceName) -> LockMode {
        self.resources.get(name).map_or(LockMode::NL, |entry| {
            entry
                .granted
                .iter()
                .find(|lock| lock.trans_num == trans_num)
                .map_or(LockMode::NL, |lock| lock.mode)
        })
    }

    /// Whether `mode` is compatible with every granted lock on `name`,
    /// ignoring locks held by `except` (a transaction replacing its own
    /// lock never conflicts with itself).
    fn check_compatible(&self, name: &ResourceName, mode: LockMode, except: Option<TxnId>) -> bool {
        let Some(entry) = self.resources.get(name) else {
            return true;
        };
        entry
            .granted
            .iter()
            .all(|held| LockMode::compatible(held.mode, mode) || Some(held.trans_num) == except)
    }

    /// Grant `lock`, or update the transaction's existing lock on the
    /// resource in place. In-place update preserves acquisition order in
    /// both indexes.
    fn grant_or_update(&mut self, lock: Lock) {
        let txn_locks = self.transaction_locks.entry(lock.trans_num).or_default();
        if let Some(existing) = txn_locks.iter_mut().find(|held| held.name == lock.name) {
            existing.mode = lock.mode;
            if let Some(entry) = self.resources.get_mut(&lock.name) {
                if let Some(granted) = entry
                    .granted
                    .iter_mut()
                    .find(|held| held.trans_num == lock.trans_num)
                {
                    granted.mode = lock.mode;
                }
            }
        } else {
            txn_locks.push(lock.clone());
            self.resources
                .entry(lock.name.clone())
                .or_default()
                .granted
                .push(lock);
        }
    }

    fn remove_lock(&mut self, trans_num: TxnId, name: &ResourceName) {
        if let Some(txn_locks) = self.transaction_locks.get_mut(&trans_num) {
            txn_locks.retain(|lock| lock.name != *name);
        }
        if let Some(entry) = self.resources.get_mut(name) {
            entry.granted.retain(|lock| lock.trans_num != trans_num);
        }
    }

    fn release_and_drain(&mut self, trans_num: TxnId, name: &ResourceName) {
        self.remove_lock(trans_num, name);
        self.process_queue(name);
    }

    /// Grant queued requests front to back, stopping at the first one
    /// that cannot be granted.
    fn process_queue(&mut self, name: &ResourceName) {
        loop {
            let Some(front) = self
                .resources
                .get(name)
                .and_then(|entry| entry.queue.front())
                .cloned()
            else {
                return;
            };
            if !self.check_compatible(name, front.lock.mode, Some(front.lock.trans_num)) {
                // Head-of-line blocking: later requests are not considered.
                return;
            }
            if let Some(entry) = self.resources.get_mut(name) {
                entry.queue.pop_front();
            }
            self.grant_or_update(front.lock.clone());
            for release in &front.release_names {
                if release == name {
                    continue; // replaced in place by the grant above
                }
                self.release_and_drain(front.lock.trans_num, release);
            }
            front.transaction.unblock();
        }
    }
}

/// The lock manager. All operations are atomic under a single monitor.
#[derive(Default)]
pub struct LockManager {
    inner: Mutex<Inner>,
}

impl LockManager {
    /// Create an empty lock manager.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[allow(clippy::expect_used)] // Mutex poisoning indicates unrecoverable state
    fn lock_inner(&self) -> std::sync::MutexGuard<'_, Inner> {
        self.inner.lock().expect("lock poisoned")
    }

    /// Acquire a `mode` lock on `name` for `transaction`.
    ///
    /// If the lock conflicts with another transaction's lock, or the
    /// resource's queue is non-empty, the request is placed at the back
    /// of the queue and the transaction blocks.
    ///
    /// # Errors
    /// [`LockError::DuplicateLockRequest`] if the transaction already
    /// holds any lock on `name`.
    pub fn acquire(
        &self,
        transaction: &TxnRef,
        name: &ResourceName,
        mode: LockMode,
    ) -> Result<(), LockError> {
        let trans_num = transaction.trans_num();
        let should_block;
        {
            let mut inner = self.lock_inner();
            if inner.mode_of(trans_num, name) != LockMode::NL {
                return Err(LockError::DuplicateLockRequest {
                    trans_num,
                    name: name.clone(),
                });
            }
            let queue_empty = inner
                .resources
                .get(name)
                .map_or(true, |entry| entry.queue.is_empty());
            should_block = !inner.check_compatible(name, mode, None) || !queue_empty;
            let lock = Lock {
                name: name.clone(),
                mode,
                trans_num,
            };
            if should_block {
                inner
                    .resources
                    .entry(name.clone())
                    .or_default()
                    .queue
                    .push_back(LockRequest {
                        transaction: transaction.clone(),
                        lock,
                        release_names: Vec::new(),
                    });
                transaction.prepare_block();
            } else {
                inner.grant_or_update(lock);
            }
        }
        if should_block {
            transaction.block();
        }
        Ok(())
    }

    /// Release `transaction`'s lock on `name` and drain the resource's
    /// queue.
    ///
    /// # Errors
    /// [`LockError::NoLockHeld`] if the transaction holds no lock on
    /// `name`.
    pub fn release(&self, transaction: &TxnRef, name: &ResourceName) -> Result<(), LockError> {
        let trans_num = transaction.trans_num();
        let mut inner = self.lock_inner();
        if inner.mode_of(trans_num, name) == LockMode::NL {
            return Err(LockError::NoLockHeld {
                trans_num,
                name: name.clone(),
            });
        }
        inner.release_and_drain(trans_num, name);
        Ok(())
    }

    /// Acquire a `mode` lock on `name` and release every lock in
    /// `release_names`, atomically.
    ///
    /// If the transaction already holds a lock on `name` and `name` is in
    /// `release_names`, the lock is replaced in place, preserving its
    /// acquisition time relative to the transaction's other locks.
    ///
    /// If the new lock is not compatible with another transaction's lock,
    /// the request is placed at the *front* of the queue (the transaction
    /// already has a lock present on the resource) and the releases are
    /// deferred until the request is granted.
    ///
    /// # Errors
    /// - [`LockError::DuplicateLockRequest`] if a lock on `name` is held
    ///   and is not being released.
    /// - [`LockError::NoLockHeld`] if the transaction holds no lock on
    ///   some name in `release_names`.
    pub fn acquire_and_release(
        &self,
        transaction: &TxnRef,
        name: &ResourceName,
        mode: LockMode,
        release_names: &[ResourceName],
    ) -> Result<(), LockError> {
        let trans_num = transaction.trans_num();
        let should_block;
        {
            let mut inner = self.lock_inner();
            if inner.mode_of(trans_num, name) != LockMode::NL && !release_names.contains(name) {
                return Err(LockError::DuplicateLockRequest {
                    trans_num,
                    name: name.clone(),
                });
            }
            for release in release_names {
                if inner.mode_of(trans_num, release) == LockMode::NL {
                    return Err(LockError::NoLockHeld {
                        trans_num,
                        name: release.clone(),
                    });
                }
            }
            should_block = !inner.check_compatible(name, mode, Some(trans_num));
            let lock = Lock {
                name: name.clone(),
                mode,
                trans_num,
            };
            if should_block {
                inner
                    .resources
                    .entry(name.clone())
                    .or_default()
                    .queue
                    .push_front(LockRequest {
                        transaction: transaction.clone(),
                        lock,
                        release_names: release_names.to_vec(),
                    });
                transaction.prepare_block();
            } else {
                inner.grant_or_update(lock);
                for release in release_names {
                    if release == name {
                        continue; // replaced in place above
                    }
                    inner.release_and_drain(trans_num, release);
                }
            }
        }
        if should_block {
            transaction.block();
        }
        Ok(())
    }

    /// Promote `transaction`'s lock on `name` to `new_mode`.
    ///
    /// A promotion does not change the lock's acquisition time. If the
    /// new mode conflicts with another transaction's lock, the request is
    /// placed at the *front* of the queue and the transaction blocks.
    ///
    /// # Errors
    /// - [`LockError::DuplicateLockRequest`] if the held mode already
    ///   equals `new_mode`.
    /// - [`LockError::NoLockHeld`] if no lock on `name` is held.
    /// - [`LockError::InvalidLock`] if `new_mode` does not substitute for
    ///   the held mode.
    pub fn promote(
        &self,
        transaction: &TxnRef,
        name: &ResourceName,
        new_mode: LockMode,
    ) -> Result<(), LockError> {
        let trans_num = transaction.trans_num();
        let should_block;
        {
            let mut inner = self.lock_inner();
            let old_mode = inner.mode_of(trans_num, name);
            if old_mode == new_mode {
                return Err(LockError::DuplicateLockRequest {
                    trans_num,
                    name: name.clone(),
                });
            }
            if old_mode == LockMode::NL {
                return Err(LockError::NoLockHeld {
                    trans_num,
                    name: name.clone(),
                });
            }
            if !LockMode::substitutable(new_mode, old_mode) {
                return Err(LockError::InvalidLock(
                    crate::concurrency::InvalidLockKind::NotAPromotion {
                        from: old_mode,
                        to: new_mode,
                    },
                ));
            }
            should_block = !inner.check_compatible(name, new_mode, Some(trans_num));
            let lock = Lock {
                name: name.clone(),
                mode: new_mode,
                trans_num,
            };
            if should_block {
                inner
                    .resources
                    .entry(name.clone())
                    .or_default()
                    .queue
                    .push_front(LockRequest {
                        transaction: transaction.clone(),
                        lock,
                        release_names: Vec::new(),
                    });
                transaction.prepare_block();
            } else {
                inner.grant_or_update(lock);
            }
        }
        if should_block {
            transaction.block();
        }
        Ok(())
    }

    /// The mode `trans_num` holds on `name`, or NL.
    #[must_use]
    pub fn lock_mode(&self, trans_num: TxnId, name: &ResourceName) -> LockMode {
        self.lock_inner().mode_of(trans_num, name)
    }

    /// Locks held by `trans_num`, in acquisition order.
    #[must_use]
    pub fn locks_of_transaction(&self, trans_num: TxnId) -> Vec<Lock> {
        self.lock_inner()
            .transaction_locks
            .get(&trans_num)
            .cloned()
            .unwrap_or_default()
    }

    /// Locks granted on `name`, in acquisition order.
    #[must_use]
    pub fn locks_on_resource(&self, name: &ResourceName) -> Vec<Lock> {
        self.lock_inner()
            .resources
            .get(name)
            .map(|entry| entry.granted.clone())
            .unwrap_or_default()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::TestTransaction;
    use std::sync::Arc;

    fn txn(n: TxnId) -> (Arc<TestTransaction>, TxnRef) {
        let t = Arc::new(TestTransaction::new(n));
        let handle: TxnRef = t.clone();
        (t, handle)
    }

    fn name(parts: &[&str]) -> ResourceName {
        let mut name = ResourceName::root(parts[0]);
        for part in &parts[1..] {
            name = name.child(*part);
        }
        name
    }

    #[test]
    fn test_acquire_and_read_back() {
        let lockman = LockManager::new();
        let (_, t1) = txn(1);
        let a = name(&["database", "a"]);

        lockman.acquire(&t1, &a, LockMode::S).expect("acquire");
        assert_eq!(lockman.lock_mode(1, &a), LockMode::S);
        assert_eq!(lockman.locks_on_resource(&a).len(), 1);
        assert_eq!(lockman.locks_of_transaction(1).len(), 1);
    }

    #[test]
    fn test_duplicate_acquire_rejected() {
        let lockman = LockManager::new();
        let (_, t1) = txn(1);
        let a = name(&["database", "a"]);

        lockman.acquire(&t1, &a, LockMode::S).expect("acquire");
        let result = lockman.acquire(&t1, &a, LockMode::X);
        assert!(matches!(
            result,
            Err(LockError::DuplicateLockRequest { trans_num: 1, .. })
        ));
    }

    #[test]
    fn test_compatible_locks_coexist() {
        let lockman = LockManager::new();
        let (raw1, t1) = txn(1);
        let (raw2, t2) = txn(2);
        let a = name(&["database", "a"]);

        lockman.acquire(&t1, &a, LockMode::S).expect("acquire t1");
        lockman.acquire(&t2, &a, LockMode::S).expect("acquire t2");

        assert!(!raw1.is_blocked());
        assert!(!raw2.is_blocked());
        assert_eq!(lockman.locks_on_resource(&a).len(), 2);
    }

    #[test]
    fn test_conflicting_acquire_blocks() {
        let lockman = LockManager::new();
        let (_, t1) = txn(1);
        let (raw2, t2) = txn(2);
        let a = name(&["database", "a"]);

        lockman.acquire(&t1, &a, LockMode::X).expect("acquire t1");
        lockman.acquire(&t2, &a, LockMode::S).expect("enqueue t2");

        assert!(raw2.is_blocked());
        assert_eq!(lockman.lock_mode(2, &a), LockMode::NL);
    }

    #[test]
    fn test_release_grants_queued_request() {
        let lockman = LockManager::new();
        let (_, t1) = txn(1);
        let (raw2, t2) = txn(2);
        let a = name(&["database", "a"]);

        lockman.acquire(&t1, &a, LockMode::X).expect("acquire t1");
        lockman.acquire(&t2, &a, LockMode::S).expect("enqueue t2");
        lockman.release(&t1, &a).expect("release t1");

        assert!(!raw2.is_blocked());
        assert_eq!(lockman.lock_mode(2, &a), LockMode::S);
    }

    #[test]
    fn test_queue_head_of_line_blocking() {
        // Granted X(t1); queue arrivals S(t2), X(t3), S(t4). After t1
        // releases, only t2 is granted: t3 is incompatible and t4 stays
        // behind it even though S/S would be compatible.
        let lockman = LockManager::new();
        let (_, t1) = txn(1);
        let (raw2, t2) = txn(2);
        let (raw3, t3) = txn(3);
        let (raw4, t4) = txn(4);
        let a = name(&["database", "a"]);

        lockman.acquire(&t1, &a, LockMode::X).expect("acquire t1");
        lockman.acquire(&t2, &a, LockMode::S).expect("enqueue t2");
        lockman.acquire(&t3, &a, LockMode::X).expect("enqueue t3");
        lockman.acquire(&t4, &a, LockMode::S).expect("enqueue t4");

        lockman.release(&t1, &a).expect("release t1");

        assert_eq!(lockman.lock_mode(2, &a), LockMode::S);
        assert!(!raw2.is_blocked());
        assert_eq!(lockman.lock_mode(3, &a), LockMode::NL);
        assert!(raw3.is_blocked());
        assert_eq!(lockman.lock_mode(4, &a), LockMode::NL);
        assert!(raw4.is_blocked());
    }

    #[test]
    fn test_nonempty_queue_blocks_compatible_acquire() {
        // S(t3) would be compatible with S(t1), but X(t2) is already
        // queued; granting t3 past it would starve the writer.
        let lockman = LockManager::new();
        let (_, t1) = txn(1);
        let (_, t2) = txn(2);
        let (raw3, t3) = txn(3);
        let a = name(&["database", "a"]);

        lockman.acquire(&t1, &a, LockMode::S).expect("acquire t1");
        lockman.acquire(&t2, &a, LockMode::X).expect("enqueue t2");
        lockman.acquire(&t3, &a, LockMode::S).expect("enqueue t3");

        assert!(raw3.is_blocked());
        assert_eq!(lockman.lock_mode(3, &a), LockMode::NL);
    }

    #[test]
    fn test_release_without_lock_rejected() {
        let lockman = LockManager::new();
        let (_, t1) = txn(1);
        let a = name(&["database", "a"]);

        let result = lockman.release(&t1, &a);
        assert!(matches!(
            result,
            Err(LockError::NoLockHeld { trans_num: 1, .. })
        ));
    }

    #[test]
    fn test_promote_in_place_preserves_order() {
        let lockman = LockManager::new();
        let (_, t1) = txn(1);
        let a = name(&["database", "a"]);
        let b = name(&["database", "b"]);

        lockman.acquire(&t1, &a, LockMode::S).expect("acquire a");
        lockman.acquire(&t1, &b, LockMode::X).expect("acquire b");
        lockman.promote(&t1, &a, LockMode::X).expect("promote a");

        let locks = lockman.locks_of_transaction(1);
        assert_eq!(locks[0].name, a);
        assert_eq!(locks[0].mode, LockMode::X);
        assert_eq!(locks[1].name, b);
    }

    #[test]
    fn test_promote_validation() {
        let lockman = LockManager::new();
        let (_, t1) = txn(1);
        let a = name(&["database", "a"]);

        assert!(matches!(
            lockman.promote(&t1, &a, LockMode::X),
            Err(LockError::NoLockHeld { .. })
        ));

        lockman.acquire(&t1, &a, LockMode::S).expect("acquire");
        assert!(matches!(
            lockman.promote(&t1, &a, LockMode::S),
            Err(LockError::DuplicateLockRequest { .. })
        ));
        assert!(matches!(
            lockman.promote(&t1, &a, LockMode::IX),
            Err(LockError::InvalidLock(_))
        ));
    }

    #[test]
    fn test_promote_conflict_goes_to_queue_front() {
        let lockman = LockManager::new();
        let (_, t1) = txn(1);
        let (raw2, t2) = txn(2);
        let (raw3, t3) = txn(3);
        let a = name(&["database", "a"]);

        lockman.acquire(&t1, &a, LockMode::S).expect("acquire t1");
        lockman.acquire(&t2, &a, LockMode::S).expect("acquire t2");
        // t3 queues behind the two readers.
        lockman.acquire(&t3, &a, LockMode::X).expect("enqueue t3");
        // t2's upgrade conflicts with t1's S and goes to the FRONT.
        lockman.promote(&t2, &a, LockMode::X).expect("enqueue promote");

        lockman.release(&t1, &a).expect("release t1");

        // The promotion is serviced before t3's X.
        assert_eq!(lockman.lock_mode(2, &a), LockMode::X);
        assert!(!raw2.is_blocked());
        assert!(raw3.is_blocked());
    }

    #[test]
    fn test_acquire_and_release_atomic_swap() {
        let lockman = LockManager::new();
        let (_, t1) = txn(1);
        let a = name(&["database", "a"]);
        let b = name(&["database", "b"]);

        lockman.acquire(&t1, &a, LockMode::S).expect("acquire a");
        lockman.acquire(&t1, &b, LockMode::S).expect("acquire b");
        lockman
            .acquire_and_release(&t1, &a, LockMode::X, &[a.clone(), b.clone()])
            .expect("swap");

        assert_eq!(lockman.lock_mode(1, &a), LockMode::X);
        assert_eq!(lockman.lock_mode(1, &b), LockMode::NL);
    }

    #[test]
    fn test_acquire_and_release_preserves_acquisition_time() {
        // Acquired S(a) then X(b); replacing a's lock keeps it first.
        let lockman = LockManager::new();
        let (_, t1) = txn(1);
        let a = name(&["database", "a"]);
        let b = name(&["database", "b"]);

        lockman.acquire(&t1, &a, LockMode::S).expect("acquire a");
        lockman.acquire(&t1, &b, LockMode::X).expect("acquire b");
        lockman
            .acquire_and_release(&t1, &a, LockMode::X, &[a.clone()])
            .expect("swap");

        let locks = lockman.locks_of_transaction(1);
        assert_eq!(locks[0].name, a);
        assert_eq!(locks[0].mode, LockMode::X);
        assert_eq!(locks[1].name, b);
    }

    #[test]
    fn test_acquire_and_release_validates_before_mutating() {
        let lockman = LockManager::new();
        let (_, t1) = txn(1);
        let a = name(&["database", "a"]);
        let b = name(&["database", "b"]);

        lockman.acquire(&t1, &a, LockMode::S).expect("acquire a");

        // b is not held: the whole operation must fail without touching a.
        let result = lockman.acquire_and_release(&t1, &a, LockMode::X, &[a.clone(), b.clone()]);
        assert!(matches!(result, Err(LockError::NoLockHeld { .. })));
        assert_eq!(lockman.lock_mode(1, &a), LockMode::S);
    }

    #[test]
    fn test_acquire_and_release_duplicate_without_release() {
        let lockman = LockManager::new();
        let (_, t1) = txn(1);
        let a = name(&["database", "a"]);

        lockman.acquire(&t1, &a, LockMode::S).expect("acquire a");
        let result = lockman.acquire_and_release(&t1, &a, LockMode::X, &[]);
        assert!(matches!(
            result,
            Err(LockError::DuplicateLockRequest { .. })
        ));
    }

    #[test]
    fn test_blocked_acquire_and_release_defers_releases() {
        let lockman = LockManager::new();
        let (_, t1) = txn(1);
        let (raw2, t2) = txn(2);
        let a = name(&["database", "a"]);
        let b = name(&["database", "b"]);

        lockman.acquire(&t1, &a, LockMode::X).expect("acquire t1 a");
        lockman.acquire(&t2, &b, LockMode::S).expect("acquire t2 b");

        // t2 wants X(a) releasing b, but t1 holds X(a): request queues and
        // b stays held until the grant.
        lockman
            .acquire_and_release(&t2, &a, LockMode::X, &[b.clone()])
            .expect("enqueue swap");
        assert!(raw2.is_blocked());
        assert_eq!(lockman.lock_mode(2, &b), LockMode::S);

        lockman.release(&t1, &a).expect("release t1 a");
        assert!(!raw2.is_blocked());
        assert_eq!(lockman.lock_mode(2, &a), LockMode::X);
        assert_eq!(lockman.lock_mode(2, &b), LockMode::NL);
    }

    #[test]
    fn test_drain_cascades_through_deferred_releases() {
        // When a queued acquire-and-release is granted, its deferred
        // releases drain the queues of the released resources too.
        let lockman = LockManager::new();
        let (_, t1) = txn(1);
        let (_, t2) = txn(2);
        let (raw3, t3) = txn(3);
        let a = name(&["database", "a"]);
        let b = name(&["database", "b"]);

        lockman.acquire(&t1, &a, LockMode::X).expect("t1 a");
        lockman.acquire(&t2, &b, LockMode::X).expect("t2 b");
        lockman
            .acquire_and_release(&t2, &a, LockMode::X, &[b.clone()])
            .expect("t2 swap queued");
        lockman.acquire(&t3, &b, LockMode::S).expect("t3 queued on b");
        assert!(raw3.is_blocked());

        // t1 releases a; t2's swap is granted, releasing b, which grants t3.
        lockman.release(&t1, &a).expect("release t1 a");
        assert_eq!(lockman.lock_mode(2, &a), LockMode::X);
        assert_eq!(lockman.lock_mode(3, &b), LockMode::S);
        assert!(!raw3.is_blocked());
    }

    #[test]
    fn test_granted_locks_pairwise_compatible() {
        // Invariant check across a small workload: on every resource, any
        // two granted locks of different transactions are compatible.
        let lockman = LockManager::new();
        let (_, t1) = txn(1);
        let (_, t2) = txn(2);
        let (_, t3) = txn(3);
        let a = name(&["database", "a"]);
        let b = name(&["database", "b"]);

        lockman.acquire(&t1, &a, LockMode::IS).expect("t1 a");
        lockman.acquire(&t2, &a, LockMode::IX).expect("t2 a");
        lockman.acquire(&t3, &a, LockMode::S).expect("t3 a");
        lockman.acquire(&t1, &b, LockMode::S).expect("t1 b");
        lockman.acquire(&t2, &b, LockMode::S).expect("t2 b");

        for resource in [&a, &b] {
            let locks = lockman.locks_on_resource(resource);
            for (i, lhs) in locks.iter().enumerate() {
                for rhs in &locks[i + 1..] {
                    if lhs.trans_num != rhs.trans_num {
                        assert!(
                            LockMode::compatible(lhs.mode, rhs.mode),
                            "incompatible granted pair {lhs:?} / {rhs:?}"
                        );
                    }
                }
            }
        }
    }
}

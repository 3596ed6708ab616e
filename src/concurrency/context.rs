//! The lock context tree.
//!
//! A [`LockContext`] is a node in a tree mirroring the resource hierarchy
//! (database → table → page). It layers the multigranularity rules over
//! the flat [`LockManager`]: a transaction must hold a suitable intent
//! lock on a parent before locking a child, and may not release a lock
//! that still covers locks on descendants.
//!
//! Each context tracks, per transaction, how many locks the transaction
//! holds on the context's children (`num_child_locks`). The counters are
//! maintained on every acquire, release, promote, and escalate that
//! changes a descendant lock's held status.
//!
//! Contexts are shared handles: children hold weak back-references to
//! their parents, and parents own their children. The root is owned by
//! the engine and outlives every handle obtained through it.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, Weak};

use crate::concurrency::{InvalidLockKind, LockError, LockManager, LockMode, ResourceName};
use crate::transaction::TxnRef;
use crate::TxnId;

/// A node in the lock hierarchy.
pub struct LockContext {
    /// The underlying lock manager.
    lockman: Arc<LockManager>,
    /// Parent context; `None` at the root.
    parent: Option<Weak<LockContext>>,
    /// Full resource name of this node.
    name: ResourceName,
    /// Readonly contexts reject every mutating operation.
    readonly: bool,
    /// When set, new children are created readonly. Used for indexes and
    /// temporary tables, where finer-grain locks are not allowed.
    child_locks_disabled: AtomicBool,
    /// Per-transaction count of locks held on this context's children.
    num_child_locks: Mutex<HashMap<TxnId, usize>>,
    /// Child contexts, lazily populated.
    children: Mutex<HashMap<String, Arc<LockContext>>>,
}

impl LockContext {
    /// Create a root context over `lockman`.
    #[must_use]
    pub fn root(lockman: Arc<LockManager>, name: impl Into<String>) -> Arc<Self> {
        Arc::new(Self {
            lockman,
            parent: None,
            name: ResourceName::root(name),
            readonly: false,
            child_locks_disabled: AtomicBool::new(false),
            num_child_locks: Mutex::new(HashMap::new()),
            children: Mutex::new(HashMap::new()),
        })
    }

    /// Get (or lazily create) the child context named `name`.
    #[must_use]
    #[allow(clippy::expect_used)] // Mutex poisoning indicates unrecoverable state
    pub fn child(self: &Arc<Self>, name: impl Into<String>) -> Arc<Self> {
        let name = name.into();
        let mut children = self.children.lock().expect("lock poisoned");
        Arc::clone(children.entry(name.clone()).or_insert_with(|| {
            Arc::new(Self {
                lockman: Arc::clone(&self.lockman),
                parent: Some(Arc::downgrade(self)),
                name: self.name.child(name),
                readonly: self.child_locks_disabled.load(Ordering::Acquire) || self.readonly,
                child_locks_disabled: AtomicBool::new(false),
                num_child_locks: Mutex::new(HashMap::new()),
                children: Mutex::new(HashMap::new()),
            })
        }))
    }

    /// The full resource name of this context.
    #[must_use]
    pub fn name(&self) -> &ResourceName {
        &self.name
    }

    /// The parent context, or `None` at the root.
    #[must_use]
    #[allow(clippy::expect_used)] // the root outlives handles obtained through it
    pub fn parent(&self) -> Option<Arc<Self>> {
        self.parent
            .as_ref()
            .map(|weak| weak.upgrade().expect("parent context dropped"))
    }

    /// Mark all new child contexts readonly, disallowing finer-grain
    /// locks below this level.
    pub fn disable_child_locks(&self) {
        self.child_locks_disabled.store(true, Ordering::Release);
    }

    /// Number of locks `trans_num` holds on children of this context.
    #[must_use]
    #[allow(clippy::expect_used)] // Mutex poisoning indicates unrecoverable state
    pub fn num_child_locks(&self, trans_num: TxnId) -> usize {
        let counts = self.num_child_locks.lock().expect("lock poisoned");
        counts.get(&trans_num).copied().unwrap_or(0)
    }

    /// Acquire a `mode` lock on this resource for `transaction`.
    ///
    /// # Errors
    /// - [`LockError::UnsupportedOperation`] if the context is readonly.
    /// - [`LockError::DuplicateLockRequest`] if the transaction already
    ///   holds a lock here.
    /// - [`LockError::InvalidLock`] if the parent's lock does not permit
    ///   `mode` on a child.
    pub fn acquire(&self, transaction: &TxnRef, mode: LockMode) -> Result<(), LockError> {
        self.check_mutable()?;
        let trans_num = transaction.trans_num();
        if self.explicit_lock_mode(trans_num) != LockMode::NL {
            return Err(LockError::DuplicateLockRequest {
                trans_num,
                name: self.name.clone(),
            });
        }
        if let Some(parent) = self.parent() {
            let parent_mode = parent.explicit_lock_mode(trans_num);
            if !LockMode::can_be_parent(parent_mode, mode) {
                return Err(LockError::InvalidLock(InvalidLockKind::ParentMode {
                    parent_mode,
                    mode,
                }));
            }
        }
        self.lockman.acquire(transaction, &self.name, mode)?;
        if let Some(parent) = self.parent() {
            parent.adjust_child_count(trans_num, 1);
        }
        Ok(())
    }

    /// Release `transaction`'s lock on this resource.
    ///
    /// # Errors
    /// - [`LockError::UnsupportedOperation`] if the context is readonly.
    /// - [`LockError::NoLockHeld`] if no lock is held here.
    /// - [`LockError::InvalidLock`] if the transaction still holds locks
    ///   on descendants (releasing would orphan them).
    pub fn release(&self, transaction: &TxnRef) -> Result<(), LockError> {
        self.check_mutable()?;
        let trans_num = transaction.trans_num();
        if self.explicit_lock_mode(trans_num) == LockMode::NL {
            return Err(LockError::NoLockHeld {
                trans_num,
                name: self.name.clone(),
            });
        }
        let child_locks = self.num_child_locks(trans_num);
        if child_locks > 0 {
            return Err(LockError::InvalidLock(InvalidLockKind::ChildLocksHeld {
                name: self.name.clone(),
                count: child_locks,
            }));
        }
        self.lockman.release(transaction, &self.name)?;
        if let Some(parent) = self.parent() {
            parent.adjust_child_count(trans_num, -1);
        }
        Ok(())
    }

    /// Promote `transaction`'s lock here to `new_mode`.
    ///
    /// Promoting to SIX from IS, IX, or S simultaneously releases every
    /// S and IS lock the transaction holds on descendants (they become
    /// redundant under SIX) in one atomic acquire-and-release.
    ///
    /// # Errors
    /// - [`LockError::UnsupportedOperation`] if the context is readonly.
    /// - [`LockError::NoLockHeld`] if no lock is held here.
    /// - [`LockError::DuplicateLockRequest`] if `new_mode` is already
    ///   held.
    /// - [`LockError::InvalidLock`] if `new_mode` is not a promotion, or
    ///   an ancestor already holds SIX.
    pub fn promote(&self, transaction: &TxnRef, new_mode: LockMode) -> Result<(), LockError> {
        self.check_mutable()?;
        let trans_num = transaction.trans_num();
        let old_mode = self.explicit_lock_mode(trans_num);
        if old_mode == LockMode::NL {
            return Err(LockError::NoLockHeld {
                trans_num,
                name: self.name.clone(),
            });
        }
        if old_mode == new_mode {
            return Err(LockError::DuplicateLockRequest {
                trans_num,
                name: self.name.clone(),
            });
        }
        if new_mode == LockMode::SIX {
            if let Some(ancestor) = self.six_ancestor(trans_num) {
                return Err(LockError::InvalidLock(InvalidLockKind::RedundantSix {
                    ancestor,
                }));
            }
            if !matches!(old_mode, LockMode::IS | LockMode::IX | LockMode::S) {
                return Err(LockError::InvalidLock(InvalidLockKind::NotAPromotion {
                    from: old_mode,
                    to: new_mode,
                }));
            }
            let redundant = self.sis_descendants(trans_num);
            let mut release_names = vec![self.name.clone()];
            release_names.extend(redundant.iter().cloned());
            self.lockman
                .acquire_and_release(transaction, &self.name, LockMode::SIX, &release_names)?;
            for released in &redundant {
                if released.parent().as_ref() == Some(&self.name) {
                    self.adjust_child_count(trans_num, -1);
                } else if let Some(parent) = self.parent_context_of(released) {
                    parent.adjust_child_count(trans_num, -1);
                }
            }
            Ok(())
        } else {
            if !LockMode::substitutable(new_mode, old_mode) {
                return Err(LockError::InvalidLock(InvalidLockKind::NotAPromotion {
                    from: old_mode,
                    to: new_mode,
                }));
            }
            self.lockman.promote(transaction, &self.name, new_mode)
        }
    }

    /// Replace `transaction`'s locks on this context and all descendants
    /// with a single lock here: X if any of them is X, IX, or SIX,
    /// otherwise S.
    ///
    /// Makes exactly one mutating call to the lock manager, and none at
    /// all if the resulting lock state would be unchanged (escalating
    /// twice in a row is a no-op the second time).
    ///
    /// # Errors
    /// - [`LockError::UnsupportedOperation`] if the context is readonly.
    /// - [`LockError::NoLockHeld`] if the transaction holds no lock here.
    pub fn escalate(&self, transaction: &TxnRef) -> Result<(), LockError> {
        self.check_mutable()?;
        let trans_num = transaction.trans_num();
        let old_mode = self.explicit_lock_mode(trans_num);
        if old_mode == LockMode::NL {
            return Err(LockError::NoLockHeld {
                trans_num,
                name: self.name.clone(),
            });
        }

        let mut target = LockMode::S;
        let mut descendants = Vec::new();
        for lock in self.lockman.locks_of_transaction(trans_num) {
            if lock.name == self.name || lock.name.is_descendant_of(&self.name) {
                if matches!(lock.mode, LockMode::X | LockMode::IX | LockMode::SIX) {
                    target = LockMode::X;
                }
                if lock.name != self.name {
                    descendants.push(lock.name);
                }
            }
        }
        if target == old_mode && descendants.is_empty() {
            return Ok(());
        }

        let mut release_names = vec![self.name.clone()];
        release_names.extend(descendants.iter().cloned());
        self.lockman
            .acquire_and_release(transaction, &self.name, target, &release_names)?;
        self.zero_child_counts(trans_num);
        Ok(())
    }

    /// The lock `trans_num` holds directly on this resource, or NL.
    #[must_use]
    pub fn explicit_lock_mode(&self, trans_num: TxnId) -> LockMode {
        self.lockman.lock_mode(trans_num, &self.name)
    }

    /// The lock `trans_num` effectively holds here, explicitly or
    /// inherited from an ancestor: an ancestor's S or X applies here
    /// directly, SIX grants S, and bare intent locks (IS, IX) grant
    /// nothing by themselves.
    #[must_use]
    pub fn effective_lock_mode(&self, trans_num: TxnId) -> LockMode {
        let explicit = self.explicit_lock_mode(trans_num);
        if explicit != LockMode::NL {
            return explicit;
        }
        let mut current = self.parent();
        while let Some(ctx) = current {
            match ctx.explicit_lock_mode(trans_num) {
                LockMode::NL => current = ctx.parent(),
                mode @ (LockMode::S | LockMode::X) => return mode,
                LockMode::SIX => return LockMode::S,
                LockMode::IS | LockMode::IX => return LockMode::NL,
            }
        }
        LockMode::NL
    }

    fn check_mutable(&self) -> Result<(), LockError> {
        if self.readonly {
            return Err(LockError::UnsupportedOperation {
                name: self.name.clone(),
            });
        }
        Ok(())
    }

    #[allow(clippy::expect_used)] // Mutex poisoning indicates unrecoverable state
    fn adjust_child_count(&self, trans_num: TxnId, delta: isize) {
        let mut counts = self.num_child_locks.lock().expect("lock poisoned");
        let count = counts.entry(trans_num).or_insert(0);
        *count = count.saturating_add_signed(delta);
    }

    #[allow(clippy::expect_used)] // Mutex poisoning indicates unrecoverable state
    fn zero_child_counts(&self, trans_num: TxnId) {
        {
            let mut counts = self.num_child_locks.lock().expect("lock poisoned");
            counts.remove(&trans_num);
        }
        let children: Vec<Arc<Self>> = {
            let children = self.children.lock().expect("lock poisoned");
            children.values().map(Arc::clone).collect()
        };
        for child in children {
            child.zero_child_counts(trans_num);
        }
    }

    /// The name of an ancestor on which `trans_num` holds SIX, if any.
    fn six_ancestor(&self, trans_num: TxnId) -> Option<ResourceName> {
        let mut current = self.parent();
        while let Some(ctx) = current {
            if ctx.explicit_lock_mode(trans_num) == LockMode::SIX {
                return Some(ctx.name.clone());
            }
            current = ctx.parent();
        }
        None
    }

    /// Names of every S or IS lock `trans_num` holds on strict
    /// descendants of this context.
    fn sis_descendants(&self, trans_num: TxnId) -> Vec<ResourceName> {
        self.lockman
            .locks_of_transaction(trans_num)
            .into_iter()
            .filter(|lock| {
                lock.name.is_descendant_of(&self.name)
                    && matches!(lock.mode, LockMode::S | LockMode::IS)
            })
            .map(|lock| lock.name)
            .collect()
    }

    /// The context that is the direct parent of the strict descendant
    /// `name`, walking this context's children. Callers handle direct
    /// children (whose parent is this context) themselves. `None` if the
    /// descendant chain was never materialized (locks taken through the
    /// manager directly).
    #[allow(clippy::expect_used)] // Mutex poisoning indicates unrecoverable state
    fn parent_context_of(&self, name: &ResourceName) -> Option<Arc<Self>> {
        debug_assert!(name.is_descendant_of(&self.name));
        let relative: Vec<&str> = name.components().skip(self.name.depth()).collect();
        debug_assert!(relative.len() > 1);
        let mut current: Option<Arc<Self>> = None;
        for component in &relative[..relative.len() - 1] {
            let next = match &current {
                None => {
                    let children = self.children.lock().expect("lock poisoned");
                    children.get(*component).map(Arc::clone)
                }
                Some(ctx) => {
                    let children = ctx.children.lock().expect("lock poisoned");
                    children.get(*component).map(Arc::clone)
                }
            };
            match next {
                Some(ctx) => current = Some(ctx),
                None => return None,
            }
        }
        current
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::TestTransaction;

    fn setup() -> (Arc<LockManager>, Arc<LockContext>) {
        let lockman = Arc::new(LockManager::new());
        let db = LockContext::root(Arc::clone(&lockman), "database");
        (lockman, db)
    }

    fn txn(n: TxnId) -> TxnRef {
        Arc::new(TestTransaction::new(n))
    }

    #[test]
    fn test_hierarchy_acquire_updates_counts() {
        let (_, db) = setup();
        let table = db.child("orders");
        let page = table.child("1");
        let t1 = txn(1);

        db.acquire(&t1, LockMode::IS).expect("IS db");
        table.acquire(&t1, LockMode::IS).expect("IS table");
        page.acquire(&t1, LockMode::S).expect("S page");

        assert_eq!(db.explicit_lock_mode(1), LockMode::IS);
        assert_eq!(table.explicit_lock_mode(1), LockMode::IS);
        assert_eq!(page.explicit_lock_mode(1), LockMode::S);
        assert_eq!(db.num_child_locks(1), 1);
        assert_eq!(table.num_child_locks(1), 1);
        assert_eq!(page.num_child_locks(1), 0);
    }

    #[test]
    fn test_acquire_requires_parent_intent() {
        let (_, db) = setup();
        let table = db.child("orders");
        let t1 = txn(1);

        // No lock on the database: S on the table is illegal.
        let result = table.acquire(&t1, LockMode::S);
        assert!(matches!(
            result,
            Err(LockError::InvalidLock(InvalidLockKind::ParentMode {
                parent_mode: LockMode::NL,
                mode: LockMode::S,
            }))
        ));

        // IS on the database does not permit X on the table either.
        db.acquire(&t1, LockMode::IS).expect("IS db");
        let result = table.acquire(&t1, LockMode::X);
        assert!(matches!(
            result,
            Err(LockError::InvalidLock(InvalidLockKind::ParentMode { .. }))
        ));
    }

    #[test]
    fn test_duplicate_acquire_rejected() {
        let (_, db) = setup();
        let t1 = txn(1);

        db.acquire(&t1, LockMode::IS).expect("IS db");
        assert!(matches!(
            db.acquire(&t1, LockMode::IS),
            Err(LockError::DuplicateLockRequest { .. })
        ));
    }

    #[test]
    fn test_release_with_child_locks_rejected() {
        let (_, db) = setup();
        let table = db.child("orders");
        let t1 = txn(1);

        db.acquire(&t1, LockMode::IS).expect("IS db");
        table.acquire(&t1, LockMode::S).expect("S table");

        let result = db.release(&t1);
        assert!(matches!(
            result,
            Err(LockError::InvalidLock(InvalidLockKind::ChildLocksHeld {
                count: 1,
                ..
            }))
        ));

        // Releasing bottom-up works and restores the counters.
        table.release(&t1).expect("release table");
        assert_eq!(db.num_child_locks(1), 0);
        db.release(&t1).expect("release db");
        assert_eq!(db.explicit_lock_mode(1), LockMode::NL);
    }

    #[test]
    fn test_release_without_lock_rejected() {
        let (_, db) = setup();
        let t1 = txn(1);
        assert!(matches!(
            db.release(&t1),
            Err(LockError::NoLockHeld { .. })
        ));
    }

    #[test]
    fn test_promote_six_releases_redundant_descendants() {
        let (lockman, db) = setup();
        let table = db.child("orders");
        let page1 = table.child("1");
        let page2 = table.child("2");
        let t1 = txn(1);

        db.acquire(&t1, LockMode::IX).expect("IX db");
        table.acquire(&t1, LockMode::IS).expect("IS table");
        page1.acquire(&t1, LockMode::S).expect("S page1");
        page2.acquire(&t1, LockMode::S).expect("S page2");

        table.promote(&t1, LockMode::SIX).expect("promote SIX");

        assert_eq!(table.explicit_lock_mode(1), LockMode::SIX);
        assert_eq!(page1.explicit_lock_mode(1), LockMode::NL);
        assert_eq!(page2.explicit_lock_mode(1), LockMode::NL);
        assert_eq!(table.num_child_locks(1), 0);
        // The database lock is untouched.
        assert_eq!(db.explicit_lock_mode(1), LockMode::IX);
        assert_eq!(db.num_child_locks(1), 1);
        assert_eq!(lockman.locks_of_transaction(1).len(), 2);
    }

    #[test]
    fn test_promote_six_under_six_ancestor_rejected() {
        let (_, db) = setup();
        let table = db.child("orders");
        let t1 = txn(1);

        db.acquire(&t1, LockMode::SIX).expect("SIX db");
        table.acquire(&t1, LockMode::IX).expect("IX table");

        let result = table.promote(&t1, LockMode::SIX);
        assert!(matches!(
            result,
            Err(LockError::InvalidLock(InvalidLockKind::RedundantSix { .. }))
        ));
    }

    #[test]
    fn test_promote_plain_substitution() {
        let (_, db) = setup();
        let t1 = txn(1);

        db.acquire(&t1, LockMode::S).expect("S db");
        db.promote(&t1, LockMode::X).expect("promote X");
        assert_eq!(db.explicit_lock_mode(1), LockMode::X);

        // X cannot be "promoted" downward.
        assert!(matches!(
            db.promote(&t1, LockMode::S),
            Err(LockError::InvalidLock(InvalidLockKind::NotAPromotion { .. }))
        ));
    }

    #[test]
    fn test_escalate_to_x() {
        let (lockman, db) = setup();
        let table = db.child("orders");
        let page3 = table.child("3");
        let page5 = table.child("5");
        let t1 = txn(1);

        db.acquire(&t1, LockMode::IX).expect("IX db");
        table.acquire(&t1, LockMode::IX).expect("IX table");
        page3.acquire(&t1, LockMode::S).expect("S page3");
        page5.acquire(&t1, LockMode::X).expect("X page5");

        table.escalate(&t1).expect("escalate");

        assert_eq!(db.explicit_lock_mode(1), LockMode::IX);
        assert_eq!(table.explicit_lock_mode(1), LockMode::X);
        assert_eq!(page3.explicit_lock_mode(1), LockMode::NL);
        assert_eq!(page5.explicit_lock_mode(1), LockMode::NL);
        assert_eq!(table.num_child_locks(1), 0);
        assert_eq!(db.num_child_locks(1), 1);
        assert_eq!(lockman.locks_of_transaction(1).len(), 2);
    }

    #[test]
    fn test_escalate_to_s() {
        let (_, db) = setup();
        let table = db.child("orders");
        let page = table.child("1");
        let t1 = txn(1);

        db.acquire(&t1, LockMode::IS).expect("IS db");
        table.acquire(&t1, LockMode::IS).expect("IS table");
        page.acquire(&t1, LockMode::S).expect("S page");

        table.escalate(&t1).expect("escalate");

        assert_eq!(table.explicit_lock_mode(1), LockMode::S);
        assert_eq!(page.explicit_lock_mode(1), LockMode::NL);
        assert_eq!(table.num_child_locks(1), 0);
    }

    #[test]
    fn test_escalate_is_idempotent() {
        let (lockman, db) = setup();
        let table = db.child("orders");
        let page = table.child("1");
        let t1 = txn(1);

        db.acquire(&t1, LockMode::IX).expect("IX db");
        table.acquire(&t1, LockMode::IX).expect("IX table");
        page.acquire(&t1, LockMode::X).expect("X page");

        table.escalate(&t1).expect("first escalate");
        let after_first = lockman.locks_of_transaction(1);

        table.escalate(&t1).expect("second escalate");
        let after_second = lockman.locks_of_transaction(1);

        assert_eq!(after_first, after_second);
        assert_eq!(table.explicit_lock_mode(1), LockMode::X);
    }

    #[test]
    fn test_escalate_without_lock_rejected() {
        let (_, db) = setup();
        let t1 = txn(1);
        assert!(matches!(
            db.escalate(&t1),
            Err(LockError::NoLockHeld { .. })
        ));
    }

    #[test]
    fn test_readonly_context_rejects_mutation() {
        let (_, db) = setup();
        let table = db.child("orders");
        table.disable_child_locks();
        let index = table.child("idx_price");
        let t1 = txn(1);

        db.acquire(&t1, LockMode::IS).expect("IS db");
        table.acquire(&t1, LockMode::IS).expect("IS table");

        for result in [
            index.acquire(&t1, LockMode::S),
            index.release(&t1),
            index.promote(&t1, LockMode::X),
            index.escalate(&t1),
        ] {
            assert!(matches!(
                result,
                Err(LockError::UnsupportedOperation { .. })
            ));
        }
    }

    #[test]
    fn test_effective_lock_mode_inheritance() {
        let (_, db) = setup();
        let table = db.child("orders");
        let page = table.child("1");

        let t1 = txn(1);
        db.acquire(&t1, LockMode::X).expect("X db");
        assert_eq!(page.effective_lock_mode(1), LockMode::X);
        assert_eq!(page.explicit_lock_mode(1), LockMode::NL);
        db.release(&t1).expect("release X db");

        let t2 = txn(2);
        db.acquire(&t2, LockMode::SIX).expect("SIX db");
        assert_eq!(table.effective_lock_mode(2), LockMode::S);
        assert_eq!(page.effective_lock_mode(2), LockMode::S);

        let t3 = txn(3);
        db.acquire(&t3, LockMode::IS).expect("IS db");
        assert_eq!(page.effective_lock_mode(3), LockMode::NL);
        table.acquire(&t3, LockMode::S).expect("S table");
        assert_eq!(page.effective_lock_mode(3), LockMode::S);
        assert_eq!(table.effective_lock_mode(3), LockMode::S);
    }

    #[test]
    fn test_child_counts_match_held_locks() {
        // The counter at each context equals the number of locks the
        // transaction holds on that context's children.
        let (lockman, db) = setup();
        let table_a = db.child("a");
        let table_b = db.child("b");
        let page = table_a.child("1");
        let t1 = txn(1);

        db.acquire(&t1, LockMode::IX).expect("IX db");
        table_a.acquire(&t1, LockMode::IX).expect("IX a");
        table_b.acquire(&t1, LockMode::S).expect("S b");
        page.acquire(&t1, LockMode::X).expect("X page");

        for ctx in [&db, &table_a, &table_b, &page] {
            let held_on_children = lockman
                .locks_of_transaction(1)
                .iter()
                .filter(|lock| lock.name.parent().as_ref() == Some(ctx.name()))
                .count();
            assert_eq!(
                ctx.num_child_locks(1),
                held_on_children,
                "count mismatch at {}",
                ctx.name()
            );
        }
    }
}

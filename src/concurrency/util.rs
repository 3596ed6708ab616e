//! Declarative lock acquisition.
//!
//! Callers that want to read or write a resource should not juggle intent
//! locks by hand: [`ensure_sufficient_lock_held`] takes the capability
//! they need (S, X, or NL) and acquires, promotes, or escalates whatever
//! is missing — and nothing more than the least permissive sufficient set.

use std::sync::Arc;

use crate::concurrency::{LockContext, LockError, LockMode};
use crate::transaction::TxnRef;

/// Ensure `transaction` can perform actions requiring `requested` on
/// `context`.
///
/// `requested` must be one of S, X, or NL. On return the effective lock
/// mode at `context` substitutes for `requested`, and every ancestor
/// holds the minimum intent lock sufficient to permit it (IS below a
/// read, IX below a write, SIX where a read lock already covered the
/// subtree).
///
/// # Errors
/// Propagates lock-layer errors; the common ones are
/// [`LockError::UnsupportedOperation`] on readonly contexts.
///
/// # Panics
/// Panics if `requested` is an intent mode.
pub fn ensure_sufficient_lock_held(
    transaction: &TxnRef,
    context: &Arc<LockContext>,
    requested: LockMode,
) -> Result<(), LockError> {
    assert!(
        matches!(requested, LockMode::NL | LockMode::S | LockMode::X),
        "requested mode must be NL, S, or X"
    );
    if requested == LockMode::NL {
        return Ok(());
    }
    let required_intent = if requested == LockMode::S {
        LockMode::IS
    } else {
        LockMode::IX
    };

    ensure_ancestor_intents(transaction, context, required_intent)?;

    let trans_num = transaction.trans_num();
    loop {
        let effective = context.effective_lock_mode(trans_num);
        if LockMode::substitutable(effective, requested) {
            return Ok(());
        }
        let explicit = context.explicit_lock_mode(trans_num);
        if explicit == LockMode::IX && requested == LockMode::S {
            return context.promote(transaction, LockMode::SIX);
        }
        if explicit.is_intent() {
            // Collapse the subtree to a single lock here, then re-check:
            // escalation may already have produced a sufficient mode.
            context.escalate(transaction)?;
            continue;
        }
        return if explicit == LockMode::NL {
            context.acquire(transaction, requested)
        } else {
            context.promote(transaction, requested)
        };
    }
}

/// Put the minimum sufficient intent lock on every ancestor of
/// `context`, walking from the root downward.
fn ensure_ancestor_intents(
    transaction: &TxnRef,
    context: &Arc<LockContext>,
    required: LockMode,
) -> Result<(), LockError> {
    let mut ancestors = Vec::new();
    let mut current = context.parent();
    while let Some(ctx) = current {
        current = ctx.parent();
        ancestors.push(ctx);
    }
    let trans_num = transaction.trans_num();
    for ancestor in ancestors.into_iter().rev() {
        let held = ancestor.effective_lock_mode(trans_num);
        if held == required || LockMode::substitutable(held, required) {
            continue;
        }
        if held == LockMode::NL {
            ancestor.acquire(transaction, required)?;
        } else if held == LockMode::S && required == LockMode::IX {
            // Keep the read coverage while adding write intent.
            ancestor.promote(transaction, LockMode::SIX)?;
        } else {
            ancestor.promote(transaction, required)?;
        }
    }
    Ok(())
}

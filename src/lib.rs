//! Concurrency control and crash recovery for a disk-based relational
//! storage engine.
//!
//! Two tightly coupled subsystems live here:
//!
//! - [`concurrency`] — a multigranularity lock manager: intent locks
//!   (IS, IX, SIX) and shared/exclusive locks (S, X) over a tree of named
//!   resources (database → table → page), with promotion, escalation, and
//!   FIFO request queueing.
//! - [`recovery`] — a write-ahead-logging recovery manager implementing
//!   ARIES: forward-processing log generation with an in-memory dirty page
//!   table and transaction table, fuzzy checkpointing, and a three-pass
//!   restart (analysis, redo, undo).
//!
//! Peripheral engine concerns (buffer pool, disk layout, catalog, query
//! operators) are collaborators consumed through the typed interfaces in
//! [`storage`]; [`storage::memory`] provides in-memory implementations
//! used by the tests and suitable for embedding.
//!
//! # Usage
//!
//! ```ignore
//! use keystone::concurrency::{ensure_sufficient_lock_held, LockContext, LockManager, LockMode};
//!
//! let lockman = Arc::new(LockManager::new());
//! let db = LockContext::root(Arc::clone(&lockman), "database");
//! let table = db.child("orders");
//!
//! // Acquires IS(database) then S(orders) on behalf of `txn`.
//! ensure_sufficient_lock_held(&txn, &table, LockMode::S)?;
//! ```

// Forbid unwrap() in production code to prevent panics from corrupt data.
// Test code is allowed to use unwrap() for convenience.
#![cfg_attr(not(test), deny(clippy::unwrap_used))]

pub mod concurrency;
pub mod config;
pub mod recovery;
pub mod storage;
pub mod testing;
pub mod transaction;

/// Log Sequence Number - monotonically increasing identifier for log records.
///
/// LSN 0 is reserved for the master record; a `prev_lsn` of 0 marks the
/// start of a transaction's log chain.
pub type Lsn = u64;

/// Transaction number.
pub type TxnId = u64;

/// Page number. The owning partition is encoded in the upper 32 bits
/// (see [`storage::part_of`]).
pub type PageNum = u64;

/// Partition number. Partition 0 is reserved for the log.
pub type PartNum = u32;

//! The ARIES recovery manager.
//!
//! During normal operation ("forward processing") every page write,
//! space allocation, commit, and abort passes through here: the matching
//! log record is appended, the dirty page table (DPT) and transaction
//! table (XT) are kept current, and the log is flushed where durability
//! demands it (commits and space allocations, whose effects are visible
//! on disk immediately).
//!
//! After a crash, [`RecoveryManager::restart`] brings the database back
//! to a transaction-consistent state in three passes over the log:
//!
//! 1. *Analysis* reconstructs the DPT and XT from the last checkpoint.
//! 2. *Redo* replays history from the earliest recLSN so the database
//!    reflects everything logged, committed or not.
//! 3. *Undo* rolls back every transaction that was mid-flight at crash
//!    time, writing compensation records so progress survives repeated
//!    crashes.
//!
//! No new transactions may start until `restart` returns.

use std::collections::{BTreeMap, BinaryHeap, HashMap, HashSet};
use std::io::{Read, Seek, Write};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};

use crate::config::CheckpointPolicy;
use crate::recovery::record::RecordType;
use crate::recovery::{LogManager, LogPayload, LogRecord, RecoveryError};
use crate::storage::{
    part_of, BufferManager, DiskSpaceManager, EFFECTIVE_PAGE_SIZE, LOG_PARTITION,
};
use crate::transaction::{Status, TxnRef};
use crate::{Lsn, PageNum, PartNum, TxnId};

/// Per-transaction recovery metadata.
pub struct TransactionTableEntry {
    /// Handle to the transaction.
    pub transaction: TxnRef,
    /// LSN of the transaction's most recent log record.
    pub last_lsn: Lsn,
    /// Named savepoints: rollback targets within the transaction.
    savepoints: HashMap<String, Lsn>,
}

impl TransactionTableEntry {
    fn new(transaction: TxnRef) -> Self {
        Self {
            transaction,
            last_lsn: 0,
            savepoints: HashMap::new(),
        }
    }
}

/// The in-memory recovery tables.
struct RecoveryState {
    /// Dirty page table: page → recLSN, the first LSN that dirtied the
    /// page since it was last clean on disk.
    dirty_pages: BTreeMap<PageNum, Lsn>,
    /// Transaction table: every transaction with undone work.
    txn_table: HashMap<TxnId, TransactionTableEntry>,
}

impl RecoveryState {
    /// Record that `page_num` was dirtied at `lsn`, keeping the earliest
    /// LSN if the page is already present (a later record can race an
    /// earlier one to the insertion).
    fn dirty_page(&mut self, page_num: PageNum, lsn: Lsn) {
        let rec_lsn = self.dirty_pages.entry(page_num).or_insert(lsn);
        if *rec_lsn > lsn {
            *rec_lsn = lsn;
        }
    }
}

/// Log, tables, and checkpoint accounting, guarded together by the
/// manager's monitor.
struct Core<F: Read + Write + Seek> {
    log: LogManager<F>,
    state: RecoveryState,
    txns_since_checkpoint: u64,
    bytes_at_last_checkpoint: u64,
}

impl<F: Read + Write + Seek> Core<F> {
    /// Roll back `trans_num`'s actions down to (but not including)
    /// `target_lsn`. For each undoable record a CLR is appended and
    /// immediately redone against the storage collaborators; the walk
    /// follows `undo_next_lsn` where present (skipping work already
    /// compensated) and `prev_lsn` otherwise.
    fn rollback_to_lsn(
        &mut self,
        disk: &dyn DiskSpaceManager,
        buffer: &dyn BufferManager,
        trans_num: TxnId,
        target_lsn: Lsn,
    ) -> Result<(), RecoveryError> {
        let mut last_record_lsn = self
            .state
            .txn_table
            .get(&trans_num)
            .ok_or(RecoveryError::UnknownTransaction(trans_num))?
            .last_lsn;
        let last_record = self.log.fetch(last_record_lsn)?;
        let mut current_lsn = last_record.undo_next_lsn().unwrap_or(last_record.lsn);

        while current_lsn > target_lsn {
            let record = self.log.fetch(current_lsn)?.clone();
            if let Some(clr) = record.undo(last_record_lsn) {
                let clr_lsn = self.log.append(clr.clone())?;
                let clr_record = LogRecord::new(clr_lsn, clr);
                let state = &mut self.state;
                clr_record.redo(disk, buffer, &mut |page, lsn| state.dirty_page(page, lsn))?;
                last_record_lsn = clr_lsn;
            }
            current_lsn = record
                .undo_next_lsn()
                .or_else(|| record.prev_lsn())
                .unwrap_or(0);
        }

        if let Some(entry) = self.state.txn_table.get_mut(&trans_num) {
            entry.last_lsn = last_record_lsn;
        }
        Ok(())
    }
}

/// The recovery manager. See the module docs for the big picture.
pub struct RecoveryManager<F: Read + Write + Seek> {
    disk: Arc<dyn DiskSpaceManager>,
    buffer: Arc<dyn BufferManager>,
    /// Creates transaction handles for transactions discovered during
    /// restart analysis.
    new_transaction: Box<dyn Fn(TxnId) -> TxnRef + Send + Sync>,
    policy: CheckpointPolicy,
    core: Mutex<Core<F>>,
    /// Set once the redo pass (or initialization) finishes; DPT entries
    /// may not be evicted by disk I/O before then.
    redo_complete: AtomicBool,
}

impl<F: Read + Write + Seek> RecoveryManager<F> {
    /// Create a recovery manager over the given collaborators and log.
    pub fn new(
        disk: Arc<dyn DiskSpaceManager>,
        buffer: Arc<dyn BufferManager>,
        log: LogManager<F>,
        new_transaction: Box<dyn Fn(TxnId) -> TxnRef + Send + Sync>,
        policy: CheckpointPolicy,
    ) -> Self {
        Self {
            disk,
            buffer,
            new_transaction,
            policy,
            core: Mutex::new(Core {
                log,
                state: RecoveryState {
                    dirty_pages: BTreeMap::new(),
                    txn_table: HashMap::new(),
                },
                txns_since_checkpoint: 0,
                bytes_at_last_checkpoint: 0,
            }),
            redo_complete: AtomicBool::new(false),
        }
    }

    #[allow(clippy::expect_used)] // Mutex poisoning indicates unrecoverable state
    fn lock_core(&self) -> MutexGuard<'_, Core<F>> {
        self.core.lock().expect("lock poisoned")
    }

    /// Set up the log of a brand-new database: write the master record
    /// and take the first checkpoint. Called exactly once, instead of
    /// [`restart`](Self::restart).
    ///
    /// # Errors
    /// Log I/O errors.
    pub fn initialize(&self) -> Result<(), RecoveryError> {
        {
            let mut guard = self.lock_core();
            guard.log.rewrite_master(0)?;
        }
        self.checkpoint()?;
        self.redo_complete.store(true, Ordering::Release);
        Ok(())
    }

    /// Register a newly started transaction in the transaction table.
    pub fn start_transaction(&self, transaction: TxnRef) {
        let mut guard = self.lock_core();
        let core = &mut *guard;
        core.state
            .txn_table
            .insert(transaction.trans_num(), TransactionTableEntry::new(transaction));
    }

    /// Begin committing `trans_num`: append the commit record, flush the
    /// log through it, and move the transaction to
    /// [`Status::Committing`].
    ///
    /// # Errors
    /// [`RecoveryError::UnknownTransaction`] if the transaction is not
    /// in the table; log errors otherwise.
    pub fn commit(&self, trans_num: TxnId) -> Result<Lsn, RecoveryError> {
        let mut guard = self.lock_core();
        let core = &mut *guard;
        let entry = core
            .state
            .txn_table
            .get(&trans_num)
            .ok_or(RecoveryError::UnknownTransaction(trans_num))?;
        let prev_lsn = entry.last_lsn;
        let transaction = Arc::clone(&entry.transaction);
        let lsn = core.log.append(LogPayload::Commit {
            trans_num,
            prev_lsn,
        })?;
        core.log.flush_to_lsn(lsn)?;
        if let Some(entry) = core.state.txn_table.get_mut(&trans_num) {
            entry.last_lsn = lsn;
        }
        transaction.set_status(Status::Committing);
        core.txns_since_checkpoint += 1;
        Ok(lsn)
    }

    /// Mark `trans_num` as aborting. No rollback happens here; the
    /// rollback runs when the transaction ends.
    ///
    /// # Errors
    /// [`RecoveryError::UnknownTransaction`] if the transaction is not
    /// in the table; log errors otherwise.
    pub fn abort(&self, trans_num: TxnId) -> Result<Lsn, RecoveryError> {
        let mut guard = self.lock_core();
        let core = &mut *guard;
        let entry = core
            .state
            .txn_table
            .get(&trans_num)
            .ok_or(RecoveryError::UnknownTransaction(trans_num))?;
        let prev_lsn = entry.last_lsn;
        let transaction = Arc::clone(&entry.transaction);
        let lsn = core.log.append(LogPayload::Abort {
            trans_num,
            prev_lsn,
        })?;
        if let Some(entry) = core.state.txn_table.get_mut(&trans_num) {
            entry.last_lsn = lsn;
        }
        transaction.set_status(Status::Aborting);
        Ok(lsn)
    }

    /// Finish `trans_num`: roll back its changes if it is aborting,
    /// remove it from the transaction table, append the end record, and
    /// move it to [`Status::Complete`].
    ///
    /// # Errors
    /// [`RecoveryError::UnknownTransaction`] if the transaction is not
    /// in the table; log or storage errors during rollback otherwise.
    pub fn end(&self, trans_num: TxnId) -> Result<Lsn, RecoveryError> {
        let mut guard = self.lock_core();
        let core = &mut *guard;
        let entry = core
            .state
            .txn_table
            .get(&trans_num)
            .ok_or(RecoveryError::UnknownTransaction(trans_num))?;
        let transaction = Arc::clone(&entry.transaction);
        if transaction.status() == Status::Aborting {
            core.rollback_to_lsn(&*self.disk, &*self.buffer, trans_num, 0)?;
        }
        let prev_lsn = core
            .state
            .txn_table
            .get(&trans_num)
            .map_or(0, |entry| entry.last_lsn);
        let lsn = core.log.append(LogPayload::End {
            trans_num,
            prev_lsn,
        })?;
        core.state.txn_table.remove(&trans_num);
        transaction.set_status(Status::Complete);
        Ok(lsn)
    }

    /// Log a byte-range write to a data page and track the page as
    /// dirty.
    ///
    /// `before` and `after` must be the same length, at most half the
    /// effective page size; this is never called on log pages.
    ///
    /// # Errors
    /// [`RecoveryError::UnknownTransaction`] if the transaction is not
    /// in the table; log errors otherwise.
    ///
    /// # Panics
    /// Panics if the image lengths differ or exceed the bound.
    pub fn log_page_write(
        &self,
        trans_num: TxnId,
        page_num: PageNum,
        offset: u16,
        before: &[u8],
        after: &[u8],
    ) -> Result<Lsn, RecoveryError> {
        assert_eq!(before.len(), after.len(), "images must be the same length");
        assert!(
            before.len() <= EFFECTIVE_PAGE_SIZE / 2,
            "image exceeds half a page"
        );
        debug_assert_ne!(part_of(page_num), LOG_PARTITION);

        let mut guard = self.lock_core();
        let core = &mut *guard;
        let entry = core
            .state
            .txn_table
            .get(&trans_num)
            .ok_or(RecoveryError::UnknownTransaction(trans_num))?;
        let prev_lsn = entry.last_lsn;
        let lsn = core.log.append(LogPayload::UpdatePage {
            trans_num,
            page_num,
            prev_lsn,
            offset,
            before: before.to_vec(),
            after: after.to_vec(),
        })?;
        if let Some(entry) = core.state.txn_table.get_mut(&trans_num) {
            entry.last_lsn = lsn;
        }
        core.state.dirty_pages.entry(page_num).or_insert(lsn);
        Ok(lsn)
    }

    /// Log a partition allocation. Returns `None` for the log partition.
    ///
    /// The log is flushed through the record: the allocation is visible
    /// on disk as soon as this returns.
    ///
    /// # Errors
    /// [`RecoveryError::UnknownTransaction`] if the transaction is not
    /// in the table; log errors otherwise.
    pub fn log_alloc_part(
        &self,
        trans_num: TxnId,
        part_num: PartNum,
    ) -> Result<Option<Lsn>, RecoveryError> {
        if part_num == LOG_PARTITION {
            return Ok(None);
        }
        self.log_flushed_op(trans_num, None, |prev_lsn| LogPayload::AllocPart {
            trans_num,
            part_num,
            prev_lsn,
        })
        .map(Some)
    }

    /// Log a partition free. Returns `None` for the log partition.
    ///
    /// # Errors
    /// [`RecoveryError::UnknownTransaction`] if the transaction is not
    /// in the table; log errors otherwise.
    pub fn log_free_part(
        &self,
        trans_num: TxnId,
        part_num: PartNum,
    ) -> Result<Option<Lsn>, RecoveryError> {
        if part_num == LOG_PARTITION {
            return Ok(None);
        }
        self.log_flushed_op(trans_num, None, |prev_lsn| LogPayload::FreePart {
            trans_num,
            part_num,
            prev_lsn,
        })
        .map(Some)
    }

    /// Log a page allocation. Returns `None` for pages in the log
    /// partition.
    ///
    /// # Errors
    /// [`RecoveryError::UnknownTransaction`] if the transaction is not
    /// in the table; log errors otherwise.
    pub fn log_alloc_page(
        &self,
        trans_num: TxnId,
        page_num: PageNum,
    ) -> Result<Option<Lsn>, RecoveryError> {
        if part_of(page_num) == LOG_PARTITION {
            return Ok(None);
        }
        self.log_flushed_op(trans_num, None, |prev_lsn| LogPayload::AllocPage {
            trans_num,
            page_num,
            prev_lsn,
        })
        .map(Some)
    }

    /// Log a page free. Returns `None` for pages in the log partition.
    /// The freed page leaves the dirty page table: its image is on disk.
    ///
    /// # Errors
    /// [`RecoveryError::UnknownTransaction`] if the transaction is not
    /// in the table; log errors otherwise.
    pub fn log_free_page(
        &self,
        trans_num: TxnId,
        page_num: PageNum,
    ) -> Result<Option<Lsn>, RecoveryError> {
        if part_of(page_num) == LOG_PARTITION {
            return Ok(None);
        }
        self.log_flushed_op(trans_num, Some(page_num), |prev_lsn| LogPayload::FreePage {
            trans_num,
            page_num,
            prev_lsn,
        })
        .map(Some)
    }

    /// Append a space-allocation record, update `last_lsn`, optionally
    /// drop a page from the DPT, and flush the log through the record.
    fn log_flushed_op(
        &self,
        trans_num: TxnId,
        drop_from_dpt: Option<PageNum>,
        build: impl FnOnce(Lsn) -> LogPayload,
    ) -> Result<Lsn, RecoveryError> {
        let mut guard = self.lock_core();
        let core = &mut *guard;
        let entry = core
            .state
            .txn_table
            .get(&trans_num)
            .ok_or(RecoveryError::UnknownTransaction(trans_num))?;
        let prev_lsn = entry.last_lsn;
        let lsn = core.log.append(build(prev_lsn))?;
        if let Some(entry) = core.state.txn_table.get_mut(&trans_num) {
            entry.last_lsn = lsn;
        }
        if let Some(page_num) = drop_from_dpt {
            core.state.dirty_pages.remove(&page_num);
        }
        core.log.flush_to_lsn(lsn)?;
        Ok(lsn)
    }

    /// Record a savepoint at the transaction's current position. An
    /// existing savepoint with the same name is replaced.
    ///
    /// # Errors
    /// [`RecoveryError::UnknownTransaction`] if the transaction is not
    /// in the table.
    pub fn savepoint(&self, trans_num: TxnId, name: &str) -> Result<(), RecoveryError> {
        let mut guard = self.lock_core();
        let core = &mut *guard;
        let entry = core
            .state
            .txn_table
            .get_mut(&trans_num)
            .ok_or(RecoveryError::UnknownTransaction(trans_num))?;
        entry.savepoints.insert(name.to_string(), entry.last_lsn);
        Ok(())
    }

    /// Delete a savepoint.
    ///
    /// # Errors
    /// [`RecoveryError::UnknownTransaction`] if the transaction is not
    /// in the table.
    pub fn release_savepoint(&self, trans_num: TxnId, name: &str) -> Result<(), RecoveryError> {
        let mut guard = self.lock_core();
        let core = &mut *guard;
        let entry = core
            .state
            .txn_table
            .get_mut(&trans_num)
            .ok_or(RecoveryError::UnknownTransaction(trans_num))?;
        entry.savepoints.remove(name);
        Ok(())
    }

    /// Undo everything the transaction did after the savepoint, in
    /// reverse order, writing CLRs. The transaction status is unchanged.
    ///
    /// # Errors
    /// [`RecoveryError::UnknownSavepoint`] if no such savepoint exists;
    /// log or storage errors during the rollback otherwise.
    pub fn rollback_to_savepoint(&self, trans_num: TxnId, name: &str) -> Result<(), RecoveryError> {
        let mut guard = self.lock_core();
        let core = &mut *guard;
        let target_lsn = core
            .state
            .txn_table
            .get(&trans_num)
            .ok_or(RecoveryError::UnknownTransaction(trans_num))?
            .savepoints
            .get(name)
            .copied()
            .ok_or_else(|| RecoveryError::UnknownSavepoint {
                trans_num,
                name: name.to_string(),
            })?;
        core.rollback_to_lsn(&*self.disk, &*self.buffer, trans_num, target_lsn)
    }

    /// Take a fuzzy checkpoint: snapshot the DPT and XT into as many
    /// end-checkpoint records as needed, flush, and point the master
    /// record at the new checkpoint. Runs without quiescing anything.
    ///
    /// # Errors
    /// Log I/O errors.
    pub fn checkpoint(&self) -> Result<(), RecoveryError> {
        let mut guard = self.lock_core();
        let core = &mut *guard;
        let begin_lsn = core.log.append(LogPayload::BeginCheckpoint)?;

        let mut chkpt_dpt = BTreeMap::new();
        let mut chkpt_txns = BTreeMap::new();
        let mut chunks = Vec::new();
        for (&page_num, &rec_lsn) in &core.state.dirty_pages {
            if !LogPayload::fits_in_one_record(chkpt_dpt.len() + 1, chkpt_txns.len()) {
                chunks.push(LogPayload::EndCheckpoint {
                    dirty_pages: std::mem::take(&mut chkpt_dpt),
                    txn_table: std::mem::take(&mut chkpt_txns),
                });
            }
            chkpt_dpt.insert(page_num, rec_lsn);
        }
        for (&trans_num, entry) in &core.state.txn_table {
            if !LogPayload::fits_in_one_record(chkpt_dpt.len(), chkpt_txns.len() + 1) {
                chunks.push(LogPayload::EndCheckpoint {
                    dirty_pages: std::mem::take(&mut chkpt_dpt),
                    txn_table: std::mem::take(&mut chkpt_txns),
                });
            }
            chkpt_txns.insert(trans_num, (entry.transaction.status(), entry.last_lsn));
        }
        chunks.push(LogPayload::EndCheckpoint {
            dirty_pages: chkpt_dpt,
            txn_table: chkpt_txns,
        });

        let mut end_lsn = begin_lsn;
        for chunk in chunks {
            end_lsn = core.log.append(chunk)?;
        }
        core.log.flush_to_lsn(end_lsn)?;
        core.log.rewrite_master(begin_lsn)?;

        core.txns_since_checkpoint = 0;
        core.bytes_at_last_checkpoint = core.log.bytes_written();
        tracing::debug!("checkpoint complete, begin LSN {begin_lsn}");
        Ok(())
    }

    /// Whether the configured checkpoint policy says a checkpoint is
    /// due.
    #[must_use]
    pub fn should_checkpoint(&self) -> bool {
        let core = self.lock_core();
        let bytes_since = core.log.bytes_written() - core.bytes_at_last_checkpoint;
        self.policy.is_due(core.txns_since_checkpoint, bytes_since)
    }

    /// Flush the log through `lsn`.
    ///
    /// # Errors
    /// Log I/O errors.
    pub fn flush_to_lsn(&self, lsn: Lsn) -> Result<(), RecoveryError> {
        let mut guard = self.lock_core();
        let core = &mut *guard;
        core.log.flush_to_lsn(lsn)?;
        Ok(())
    }

    /// Called before a data page with `page_lsn` is written to disk:
    /// the write-ahead rule requires the log to reach the page first.
    ///
    /// # Errors
    /// Log I/O errors.
    pub fn page_flush_hook(&self, page_lsn: Lsn) -> Result<(), RecoveryError> {
        self.flush_to_lsn(page_lsn)
    }

    /// Called after a data page has been written to disk: the page is
    /// clean, so it leaves the DPT. Ignored while the redo pass is still
    /// running (redo must see the log-derived table).
    pub fn disk_io_hook(&self, page_num: PageNum) {
        if self.redo_complete.load(Ordering::Acquire) {
            let mut guard = self.lock_core();
            guard.state.dirty_pages.remove(&page_num);
        }
    }

    /// Record that `page_num` was dirtied at `lsn`, keeping the earliest
    /// LSN on a race.
    pub fn dirty_page(&self, page_num: PageNum, lsn: Lsn) {
        let mut guard = self.lock_core();
        let core = &mut *guard;
        core.state.dirty_page(page_num, lsn);
    }

    /// Snapshot of the dirty page table.
    #[must_use]
    pub fn dirty_page_table(&self) -> BTreeMap<PageNum, Lsn> {
        self.lock_core().state.dirty_pages.clone()
    }

    /// Snapshot of the transaction table as `(trans_num, last_lsn,
    /// status)`.
    #[must_use]
    pub fn transaction_table(&self) -> Vec<(TxnId, Lsn, Status)> {
        let core = self.lock_core();
        let mut entries: Vec<(TxnId, Lsn, Status)> = core
            .state
            .txn_table
            .iter()
            .map(|(&trans_num, entry)| (trans_num, entry.last_lsn, entry.transaction.status()))
            .collect();
        entries.sort_unstable_by_key(|&(trans_num, _, _)| trans_num);
        entries
    }

    /// Checkpoint and hand back the log. Called on clean shutdown.
    ///
    /// # Errors
    /// Log I/O errors from the final checkpoint.
    pub fn close(self) -> Result<LogManager<F>, RecoveryError> {
        self.checkpoint()?;
        Ok(self.into_log())
    }

    /// Consume the manager and return the log without flushing anything
    /// further. Models a crash in tests.
    #[allow(clippy::expect_used)] // Mutex poisoning indicates unrecoverable state
    #[allow(clippy::missing_panics_doc)]
    pub fn into_log(self) -> LogManager<F> {
        self.core.into_inner().expect("lock poisoned").log
    }

    // Restart recovery ////////////////////////////////////////////////////

    /// Perform restart recovery: analysis, redo, DPT cleanup, undo, and
    /// a final checkpoint. Must run to completion before any new
    /// transaction starts.
    ///
    /// # Errors
    /// Any log or storage error is fatal: startup must not proceed.
    pub fn restart(&self) -> Result<(), RecoveryError> {
        tracing::info!("restart recovery: analysis");
        self.restart_analysis()?;
        tracing::info!("restart recovery: redo");
        self.restart_redo()?;
        self.redo_complete.store(true, Ordering::Release);
        self.clean_dpt();
        tracing::info!("restart recovery: undo");
        self.restart_undo()?;
        self.checkpoint()?;
        tracing::info!("restart recovery complete");
        Ok(())
    }

    /// Analysis pass: scan forward from the last checkpoint,
    /// reconstructing the DPT and XT, then settle every surviving
    /// transaction (committing ones end; running ones start aborting).
    fn restart_analysis(&self) -> Result<(), RecoveryError> {
        let mut guard = self.lock_core();
        let core = &mut *guard;

        let master = core
            .log
            .fetch(0)
            .map_err(|_| RecoveryError::MissingMasterRecord)?;
        let LogPayload::Master {
            last_checkpoint_lsn,
        } = master.payload
        else {
            return Err(RecoveryError::MissingMasterRecord);
        };

        let mut ended_txns: HashSet<TxnId> = HashSet::new();
        let start = last_checkpoint_lsn.max(1);
        for lsn in start..core.log.next_lsn() {
            let record = core.log.fetch(lsn)?.clone();

            if let Some(trans_num) = record.trans_num() {
                let entry = core
                    .state
                    .txn_table
                    .entry(trans_num)
                    .or_insert_with(|| {
                        TransactionTableEntry::new((self.new_transaction)(trans_num))
                    });
                entry.last_lsn = entry.last_lsn.max(lsn);
            }

            if let Some(page_num) = record.page_num() {
                match record.payload.record_type() {
                    RecordType::UpdatePage | RecordType::UndoUpdatePage => {
                        core.state.dirty_pages.entry(page_num).or_insert(lsn);
                    }
                    RecordType::FreePage | RecordType::UndoAllocPage => {
                        // The free was flushed when logged: the page is
                        // clean on disk.
                        core.state.dirty_pages.remove(&page_num);
                    }
                    _ => {}
                }
            }

            match &record.payload {
                LogPayload::Commit { trans_num, .. } => {
                    if let Some(entry) = core.state.txn_table.get(trans_num) {
                        entry.transaction.set_status(Status::Committing);
                    }
                }
                LogPayload::Abort { trans_num, .. } => {
                    if let Some(entry) = core.state.txn_table.get(trans_num) {
                        entry.transaction.set_status(Status::RecoveryAborting);
                    }
                }
                LogPayload::End { trans_num, .. } => {
                    if let Some(entry) = core.state.txn_table.remove(trans_num) {
                        entry.transaction.cleanup();
                        entry.transaction.set_status(Status::Complete);
                    }
                    ended_txns.insert(*trans_num);
                }
                LogPayload::EndCheckpoint {
                    dirty_pages,
                    txn_table,
                } => {
                    for (&page_num, &rec_lsn) in dirty_pages {
                        // Snapshot entries reflect state at BeginCheckpoint
                        // time, so they can never postdate the scan.
                        debug_assert!(rec_lsn <= lsn, "checkpoint recLSN from the future");
                        core.state.dirty_pages.insert(page_num, rec_lsn);
                    }
                    for (&trans_num, &(snap_status, snap_last_lsn)) in txn_table {
                        if ended_txns.contains(&trans_num) {
                            continue;
                        }
                        let entry = core
                            .state
                            .txn_table
                            .entry(trans_num)
                            .or_insert_with(|| {
                                TransactionTableEntry::new((self.new_transaction)(trans_num))
                            });
                        entry.last_lsn = entry.last_lsn.max(snap_last_lsn);
                        let next = match snap_status {
                            Status::Aborting | Status::RecoveryAborting => {
                                Some(Status::RecoveryAborting)
                            }
                            Status::Committing => Some(Status::Committing),
                            Status::Running | Status::Complete => None,
                        };
                        if let Some(next) = next {
                            if entry.transaction.status().can_transition_to(next) {
                                entry.transaction.set_status(next);
                            }
                        }
                    }
                }
                _ => {}
            }
        }

        // Settle what the scan left: committing transactions finish,
        // running ones are aborted as of the crash.
        let trans_nums: Vec<TxnId> = core.state.txn_table.keys().copied().collect();
        for trans_num in trans_nums {
            let Some(entry) = core.state.txn_table.get(&trans_num) else {
                continue;
            };
            let transaction = Arc::clone(&entry.transaction);
            let last_lsn = entry.last_lsn;
            match transaction.status() {
                Status::Committing => {
                    transaction.cleanup();
                    transaction.set_status(Status::Complete);
                    core.state.txn_table.remove(&trans_num);
                    core.log.append(LogPayload::End {
                        trans_num,
                        prev_lsn: last_lsn,
                    })?;
                }
                Status::Running => {
                    transaction.set_status(Status::RecoveryAborting);
                    let lsn = core.log.append(LogPayload::Abort {
                        trans_num,
                        prev_lsn: last_lsn,
                    })?;
                    if let Some(entry) = core.state.txn_table.get_mut(&trans_num) {
                        entry.last_lsn = lsn;
                    }
                }
                _ => {}
            }
        }
        Ok(())
    }

    /// Redo pass: replay history from the earliest recLSN in the DPT.
    fn restart_redo(&self) -> Result<(), RecoveryError> {
        let mut guard = self.lock_core();
        let core = &mut *guard;
        let Some(redo_start) = core.state.dirty_pages.values().min().copied() else {
            tracing::debug!("redo: dirty page table empty, nothing to replay");
            return Ok(());
        };

        for lsn in redo_start..core.log.next_lsn() {
            let record = core.log.fetch(lsn)?.clone();
            if !record.is_redoable() {
                continue;
            }
            match record.payload.record_type() {
                // Partition changes and page allocations redo
                // unconditionally: later records depend on them existing.
                RecordType::AllocPart
                | RecordType::FreePart
                | RecordType::UndoAllocPart
                | RecordType::UndoFreePart
                | RecordType::AllocPage
                | RecordType::UndoFreePage => {
                    let state = &mut core.state;
                    record.redo(&*self.disk, &*self.buffer, &mut |page, lsn| {
                        state.dirty_page(page, lsn);
                    })?;
                }
                RecordType::UpdatePage
                | RecordType::UndoUpdatePage
                | RecordType::FreePage
                | RecordType::UndoAllocPage => {
                    let Some(page_num) = record.page_num() else {
                        continue;
                    };
                    let Some(&rec_lsn) = core.state.dirty_pages.get(&page_num) else {
                        continue;
                    };
                    if lsn < rec_lsn {
                        continue;
                    }
                    let page_lsn = {
                        let page = self.buffer.fetch_page(page_num)?;
                        page.page_lsn()
                    };
                    if page_lsn < lsn {
                        let state = &mut core.state;
                        record.redo(&*self.disk, &*self.buffer, &mut |page, lsn| {
                            state.dirty_page(page, lsn);
                        })?;
                    }
                }
                _ => {}
            }
        }
        Ok(())
    }

    /// Drop DPT entries for pages the buffer manager does not actually
    /// hold dirty: pages that were dirtied and written back during the
    /// same session stay in the log-derived table otherwise.
    fn clean_dpt(&self) {
        let mut actually_dirty = HashSet::new();
        self.buffer.iter_page_nums(&mut |page_num, dirty| {
            if dirty {
                actually_dirty.insert(page_num);
            }
        });
        let mut guard = self.lock_core();
        let core = &mut *guard;
        let before = core.state.dirty_pages.len();
        core.state
            .dirty_pages
            .retain(|page_num, _| actually_dirty.contains(page_num));
        tracing::debug!(
            "DPT cleanup dropped {} stale entries",
            before - core.state.dirty_pages.len()
        );
    }

    /// Undo pass: repeatedly undo the record with the largest lastLSN
    /// among all recovery-aborting transactions, ending each transaction
    /// when its chain is exhausted.
    fn restart_undo(&self) -> Result<(), RecoveryError> {
        let mut guard = self.lock_core();
        let core = &mut *guard;
        let mut heap: BinaryHeap<Lsn> = core
            .state
            .txn_table
            .values()
            .filter(|entry| entry.transaction.status() == Status::RecoveryAborting)
            .map(|entry| entry.last_lsn)
            .collect();

        while let Some(lsn) = heap.pop() {
            let record = core.log.fetch(lsn)?.clone();
            let Some(trans_num) = record.trans_num() else {
                continue;
            };

            if record.is_undoable() {
                let last_lsn = core
                    .state
                    .txn_table
                    .get(&trans_num)
                    .ok_or(RecoveryError::UnknownTransaction(trans_num))?
                    .last_lsn;
                if let Some(clr) = record.undo(last_lsn) {
                    let clr_lsn = core.log.append(clr.clone())?;
                    if let Some(entry) = core.state.txn_table.get_mut(&trans_num) {
                        entry.last_lsn = clr_lsn;
                    }
                    let clr_record = LogRecord::new(clr_lsn, clr);
                    let state = &mut core.state;
                    clr_record.redo(&*self.disk, &*self.buffer, &mut |page, lsn| {
                        state.dirty_page(page, lsn);
                    })?;
                }
            }

            let next_lsn = record
                .undo_next_lsn()
                .or_else(|| record.prev_lsn())
                .unwrap_or(0);
            if next_lsn == 0 {
                if let Some(entry) = core.state.txn_table.remove(&trans_num) {
                    entry.transaction.cleanup();
                    entry.transaction.set_status(Status::Complete);
                    core.log.append(LogPayload::End {
                        trans_num,
                        prev_lsn: entry.last_lsn,
                    })?;
                }
            } else {
                heap.push(next_lsn);
            }
        }
        Ok(())
    }
}

//! Log records.
//!
//! Every change the engine makes is described by a [`LogRecord`]: a
//! tagged payload plus the LSN the log manager assigned on append.
//! Records chain backward per transaction through `prev_lsn`;
//! compensation records (CLRs) written during rollback additionally carry
//! `undo_next_lsn`, the next record of the transaction left to undo.
//!
//! # Wire format
//!
//! ```text
//! +----------+--------------------------------------------------+
//! | 0-3      | record_length (4 bytes, includes header+payload) |
//! | 4        | record_type (1 byte)                             |
//! | 5-12     | lsn (8 bytes)                                    |
//! | 13-N     | payload (variable, depends on type)              |
//! | N-N+3    | CRC32 checksum (4 bytes)                         |
//! +----------+--------------------------------------------------+
//! ```
//!
//! Records never span log pages, so a record is bounded by the log page
//! size; before/after images of a page update are each bounded by half
//! the effective page size.

use std::collections::BTreeMap;

use crate::recovery::{LogError, RecoveryError};
use crate::storage::{BufferManager, DiskSpaceManager, EFFECTIVE_PAGE_SIZE};
use crate::transaction::Status;
use crate::{Lsn, PageNum, PartNum, TxnId};

/// Record header size: length (4) + type (1) + lsn (8).
pub(crate) const RECORD_HEADER_SIZE: usize = 13;

/// CRC32 checksum size at end of record.
pub(crate) const CHECKSUM_SIZE: usize = 4;

/// Log record types.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum RecordType {
    /// The master record at LSN 0.
    Master = 0x01,
    /// Start of a fuzzy checkpoint.
    BeginCheckpoint = 0x02,
    /// Checkpoint snapshot chunk (DPT and transaction table entries).
    EndCheckpoint = 0x03,
    /// Transaction commit.
    Commit = 0x04,
    /// Transaction abort requested.
    Abort = 0x05,
    /// Transaction finished.
    End = 0x06,
    /// Byte-range page update.
    UpdatePage = 0x07,
    /// CLR for a page update.
    UndoUpdatePage = 0x08,
    /// Partition allocated.
    AllocPart = 0x09,
    /// CLR for a partition allocation.
    UndoAllocPart = 0x0A,
    /// Partition freed.
    FreePart = 0x0B,
    /// CLR for a partition free.
    UndoFreePart = 0x0C,
    /// Page allocated.
    AllocPage = 0x0D,
    /// CLR for a page allocation.
    UndoAllocPage = 0x0E,
    /// Page freed.
    FreePage = 0x0F,
    /// CLR for a page free.
    UndoFreePage = 0x10,
}

impl TryFrom<u8> for RecordType {
    type Error = u8;

    fn try_from(value: u8) -> Result<Self, Self::Error> {
        match value {
            0x01 => Ok(Self::Master),
            0x02 => Ok(Self::BeginCheckpoint),
            0x03 => Ok(Self::EndCheckpoint),
            0x04 => Ok(Self::Commit),
            0x05 => Ok(Self::Abort),
            0x06 => Ok(Self::End),
            0x07 => Ok(Self::UpdatePage),
            0x08 => Ok(Self::UndoUpdatePage),
            0x09 => Ok(Self::AllocPart),
            0x0A => Ok(Self::UndoAllocPart),
            0x0B => Ok(Self::FreePart),
            0x0C => Ok(Self::UndoFreePart),
            0x0D => Ok(Self::AllocPage),
            0x0E => Ok(Self::UndoAllocPage),
            0x0F => Ok(Self::FreePage),
            0x10 => Ok(Self::UndoFreePage),
            _ => Err(value),
        }
    }
}

const fn status_to_byte(status: Status) -> u8 {
    match status {
        Status::Running => 0,
        Status::Committing => 1,
        Status::Aborting => 2,
        Status::RecoveryAborting => 3,
        Status::Complete => 4,
    }
}

fn status_from_byte(byte: u8) -> Result<Status, LogError> {
    match byte {
        0 => Ok(Status::Running),
        1 => Ok(Status::Committing),
        2 => Ok(Status::Aborting),
        3 => Ok(Status::RecoveryAborting),
        4 => Ok(Status::Complete),
        _ => Err(LogError::CorruptRecord),
    }
}

/// Payload for each record type.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LogPayload {
    /// Master record: where the last successful checkpoint begins.
    Master {
        /// LSN of the last BeginCheckpoint record.
        last_checkpoint_lsn: Lsn,
    },
    /// Start of a fuzzy checkpoint.
    BeginCheckpoint,
    /// One chunk of the checkpoint snapshot.
    EndCheckpoint {
        /// Dirty page table entries: page → recLSN.
        dirty_pages: BTreeMap<PageNum, Lsn>,
        /// Transaction table entries: transaction → (status, lastLSN).
        txn_table: BTreeMap<TxnId, (Status, Lsn)>,
    },
    /// Transaction commit.
    Commit {
        /// Committing transaction.
        trans_num: TxnId,
        /// Previous record of this transaction.
        prev_lsn: Lsn,
    },
    /// Transaction abort requested. No rollback happens at this point.
    Abort {
        /// Aborting transaction.
        trans_num: TxnId,
        /// Previous record of this transaction.
        prev_lsn: Lsn,
    },
    /// Transaction finished (committed or fully rolled back).
    End {
        /// Finished transaction.
        trans_num: TxnId,
        /// Previous record of this transaction.
        prev_lsn: Lsn,
    },
    /// Byte-range update of a data page.
    UpdatePage {
        /// Writing transaction.
        trans_num: TxnId,
        /// Updated page.
        page_num: PageNum,
        /// Previous record of this transaction.
        prev_lsn: Lsn,
        /// Offset of the write within the page's data area.
        offset: u16,
        /// Bytes at `offset` before the write.
        before: Vec<u8>,
        /// Bytes at `offset` after the write.
        after: Vec<u8>,
    },
    /// CLR restoring a page update's before-image.
    UndoUpdatePage {
        /// Rolling-back transaction.
        trans_num: TxnId,
        /// Page being restored.
        page_num: PageNum,
        /// Previous record of this transaction.
        prev_lsn: Lsn,
        /// Next record of this transaction left to undo.
        undo_next_lsn: Lsn,
        /// Offset of the restored bytes within the page's data area.
        offset: u16,
        /// The before-image written back on redo.
        before: Vec<u8>,
    },
    /// Partition allocated.
    AllocPart {
        /// Allocating transaction.
        trans_num: TxnId,
        /// The new partition.
        part_num: PartNum,
        /// Previous record of this transaction.
        prev_lsn: Lsn,
    },
    /// CLR for a partition allocation; frees the partition on redo.
    UndoAllocPart {
        /// Rolling-back transaction.
        trans_num: TxnId,
        /// The partition to free.
        part_num: PartNum,
        /// Previous record of this transaction.
        prev_lsn: Lsn,
        /// Next record of this transaction left to undo.
        undo_next_lsn: Lsn,
    },
    /// Partition freed.
    FreePart {
        /// Freeing transaction.
        trans_num: TxnId,
        /// The freed partition.
        part_num: PartNum,
        /// Previous record of this transaction.
        prev_lsn: Lsn,
    },
    /// CLR for a partition free; re-allocates the partition on redo.
    UndoFreePart {
        /// Rolling-back transaction.
        trans_num: TxnId,
        /// The partition to re-allocate.
        part_num: PartNum,
        /// Previous record of this transaction.
        prev_lsn: Lsn,
        /// Next record of this transaction left to undo.
        undo_next_lsn: Lsn,
    },
    /// Page allocated.
    AllocPage {
        /// Allocating transaction.
        trans_num: TxnId,
        /// The new page.
        page_num: PageNum,
        /// Previous record of this transaction.
        prev_lsn: Lsn,
    },
    /// CLR for a page allocation; frees the page on redo.
    UndoAllocPage {
        /// Rolling-back transaction.
        trans_num: TxnId,
        /// The page to free.
        page_num: PageNum,
        /// Previous record of this transaction.
        prev_lsn: Lsn,
        /// Next record of this transaction left to undo.
        undo_next_lsn: Lsn,
    },
    /// Page freed.
    FreePage {
        /// Freeing transaction.
        trans_num: TxnId,
        /// The freed page.
        page_num: PageNum,
        /// Previous record of this transaction.
        prev_lsn: Lsn,
    },
    /// CLR for a page free; re-allocates the page on redo.
    UndoFreePage {
        /// Rolling-back transaction.
        trans_num: TxnId,
        /// The page to re-allocate.
        page_num: PageNum,
        /// Previous record of this transaction.
        prev_lsn: Lsn,
        /// Next record of this transaction left to undo.
        undo_next_lsn: Lsn,
    },
}

impl LogPayload {
    /// The record type tag for this payload.
    #[must_use]
    pub const fn record_type(&self) -> RecordType {
        match self {
            Self::Master { .. } => RecordType::Master,
            Self::BeginCheckpoint => RecordType::BeginCheckpoint,
            Self::EndCheckpoint { .. } => RecordType::EndCheckpoint,
            Self::Commit { .. } => RecordType::Commit,
            Self::Abort { .. } => RecordType::Abort,
            Self::End { .. } => RecordType::End,
            Self::UpdatePage { .. } => RecordType::UpdatePage,
            Self::UndoUpdatePage { .. } => RecordType::UndoUpdatePage,
            Self::AllocPart { .. } => RecordType::AllocPart,
            Self::UndoAllocPart { .. } => RecordType::UndoAllocPart,
            Self::FreePart { .. } => RecordType::FreePart,
            Self::UndoFreePart { .. } => RecordType::UndoFreePart,
            Self::AllocPage { .. } => RecordType::AllocPage,
            Self::UndoAllocPage { .. } => RecordType::UndoAllocPage,
            Self::FreePage { .. } => RecordType::FreePage,
            Self::UndoFreePage { .. } => RecordType::UndoFreePage,
        }
    }

    /// The transaction this record belongs to, if any.
    #[must_use]
    pub const fn trans_num(&self) -> Option<TxnId> {
        match self {
            Self::Master { .. } | Self::BeginCheckpoint | Self::EndCheckpoint { .. } => None,
            Self::Commit { trans_num, .. }
            | Self::Abort { trans_num, .. }
            | Self::End { trans_num, .. }
            | Self::UpdatePage { trans_num, .. }
            | Self::UndoUpdatePage { trans_num, .. }
            | Self::AllocPart { trans_num, .. }
            | Self::UndoAllocPart { trans_num, .. }
            | Self::FreePart { trans_num, .. }
            | Self::UndoFreePart { trans_num, .. }
            | Self::AllocPage { trans_num, .. }
            | Self::UndoAllocPage { trans_num, .. }
            | Self::FreePage { trans_num, .. }
            | Self::UndoFreePage { trans_num, .. } => Some(*trans_num),
        }
    }

    /// The page this record touches, if any.
    #[must_use]
    pub const fn page_num(&self) -> Option<PageNum> {
        match self {
            Self::UpdatePage { page_num, .. }
            | Self::UndoUpdatePage { page_num, .. }
            | Self::AllocPage { page_num, .. }
            | Self::UndoAllocPage { page_num, .. }
            | Self::FreePage { page_num, .. }
            | Self::UndoFreePage { page_num, .. } => Some(*page_num),
            _ => None,
        }
    }

    /// The partition this record touches, if any.
    #[must_use]
    pub const fn part_num(&self) -> Option<PartNum> {
        match self {
            Self::AllocPart { part_num, .. }
            | Self::UndoAllocPart { part_num, .. }
            | Self::FreePart { part_num, .. }
            | Self::UndoFreePart { part_num, .. } => Some(*part_num),
            _ => None,
        }
    }

    /// The previous record of the owning transaction, if any.
    #[must_use]
    pub const fn prev_lsn(&self) -> Option<Lsn> {
        match self {
            Self::Master { .. } | Self::BeginCheckpoint | Self::EndCheckpoint { .. } => None,
            Self::Commit { prev_lsn, .. }
            | Self::Abort { prev_lsn, .. }
            | Self::End { prev_lsn, .. }
            | Self::UpdatePage { prev_lsn, .. }
            | Self::UndoUpdatePage { prev_lsn, .. }
            | Self::AllocPart { prev_lsn, .. }
            | Self::UndoAllocPart { prev_lsn, .. }
            | Self::FreePart { prev_lsn, .. }
            | Self::UndoFreePart { prev_lsn, .. }
            | Self::AllocPage { prev_lsn, .. }
            | Self::UndoAllocPage { prev_lsn, .. }
            | Self::FreePage { prev_lsn, .. }
            | Self::UndoFreePage { prev_lsn, .. } => Some(*prev_lsn),
        }
    }

    /// For CLRs, the next record of the owning transaction left to undo.
    #[must_use]
    pub const fn undo_next_lsn(&self) -> Option<Lsn> {
        match self {
            Self::UndoUpdatePage { undo_next_lsn, .. }
            | Self::UndoAllocPart { undo_next_lsn, .. }
            | Self::UndoFreePart { undo_next_lsn, .. }
            | Self::UndoAllocPage { undo_next_lsn, .. }
            | Self::UndoFreePage { undo_next_lsn, .. } => Some(*undo_next_lsn),
            _ => None,
        }
    }

    /// Whether this record carries a redo action.
    #[must_use]
    pub const fn is_redoable(&self) -> bool {
        !matches!(
            self,
            Self::Master { .. }
                | Self::BeginCheckpoint
                | Self::EndCheckpoint { .. }
                | Self::Commit { .. }
                | Self::Abort { .. }
                | Self::End { .. }
        )
    }

    /// Whether this record can be undone. CLRs are never undone.
    #[must_use]
    pub const fn is_undoable(&self) -> bool {
        matches!(
            self,
            Self::UpdatePage { .. }
                | Self::AllocPart { .. }
                | Self::FreePart { .. }
                | Self::AllocPage { .. }
                | Self::FreePage { .. }
        )
    }

    /// Construct the CLR that undoes this record, chaining it after
    /// `last_lsn` (the issuing transaction's current lastLSN). Does not
    /// apply the inverse; the caller appends the CLR and redoes it.
    ///
    /// Returns `None` for records that are not undoable.
    #[must_use]
    pub fn undo(&self, last_lsn: Lsn) -> Option<Self> {
        match self {
            Self::UpdatePage {
                trans_num,
                page_num,
                prev_lsn,
                offset,
                before,
                ..
            } => Some(Self::UndoUpdatePage {
                trans_num: *trans_num,
                page_num: *page_num,
                prev_lsn: last_lsn,
                undo_next_lsn: *prev_lsn,
                offset: *offset,
                before: before.clone(),
            }),
            Self::AllocPart {
                trans_num,
                part_num,
                prev_lsn,
            } => Some(Self::UndoAllocPart {
                trans_num: *trans_num,
                part_num: *part_num,
                prev_lsn: last_lsn,
                undo_next_lsn: *prev_lsn,
            }),
            Self::FreePart {
                trans_num,
                part_num,
                prev_lsn,
            } => Some(Self::UndoFreePart {
                trans_num: *trans_num,
                part_num: *part_num,
                prev_lsn: last_lsn,
                undo_next_lsn: *prev_lsn,
            }),
            Self::AllocPage {
                trans_num,
                page_num,
                prev_lsn,
            } => Some(Self::UndoAllocPage {
                trans_num: *trans_num,
                page_num: *page_num,
                prev_lsn: last_lsn,
                undo_next_lsn: *prev_lsn,
            }),
            Self::FreePage {
                trans_num,
                page_num,
                prev_lsn,
            } => Some(Self::UndoFreePage {
                trans_num: *trans_num,
                page_num: *page_num,
                prev_lsn: last_lsn,
                undo_next_lsn: *prev_lsn,
            }),
            _ => None,
        }
    }

    /// How many bytes an EndCheckpoint record with the given entry counts
    /// would occupy, and whether it still fits on a log page.
    #[must_use]
    pub const fn fits_in_one_record(dpt_count: usize, txn_count: usize) -> bool {
        let size = RECORD_HEADER_SIZE + 8 + dpt_count * 16 + txn_count * 17 + CHECKSUM_SIZE;
        size <= EFFECTIVE_PAGE_SIZE
    }
}

/// A log record: an assigned LSN plus the payload.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LogRecord {
    /// Position in the log, assigned by the log manager on append.
    pub lsn: Lsn,
    /// The record payload.
    pub payload: LogPayload,
}

impl LogRecord {
    /// Create a record with an assigned LSN.
    #[must_use]
    pub const fn new(lsn: Lsn, payload: LogPayload) -> Self {
        Self { lsn, payload }
    }

    /// See [`LogPayload::trans_num`].
    #[must_use]
    pub const fn trans_num(&self) -> Option<TxnId> {
        self.payload.trans_num()
    }

    /// See [`LogPayload::page_num`].
    #[must_use]
    pub const fn page_num(&self) -> Option<PageNum> {
        self.payload.page_num()
    }

    /// See [`LogPayload::prev_lsn`].
    #[must_use]
    pub const fn prev_lsn(&self) -> Option<Lsn> {
        self.payload.prev_lsn()
    }

    /// See [`LogPayload::undo_next_lsn`].
    #[must_use]
    pub const fn undo_next_lsn(&self) -> Option<Lsn> {
        self.payload.undo_next_lsn()
    }

    /// See [`LogPayload::is_redoable`].
    #[must_use]
    pub const fn is_redoable(&self) -> bool {
        self.payload.is_redoable()
    }

    /// See [`LogPayload::is_undoable`].
    #[must_use]
    pub const fn is_undoable(&self) -> bool {
        self.payload.is_undoable()
    }

    /// See [`LogPayload::undo`].
    #[must_use]
    pub fn undo(&self, last_lsn: Lsn) -> Option<LogPayload> {
        self.payload.undo(last_lsn)
    }

    /// Apply this record's effect to the storage collaborators. Reports
    /// each page write through `dirty` so the caller can maintain its
    /// dirty page table.
    ///
    /// # Errors
    /// [`RecoveryError::NotRedoable`] for records without a redo action;
    /// storage errors otherwise.
    pub fn redo(
        &self,
        disk: &dyn DiskSpaceManager,
        buffer: &dyn BufferManager,
        dirty: &mut dyn FnMut(PageNum, Lsn),
    ) -> Result<(), RecoveryError> {
        match &self.payload {
            LogPayload::UpdatePage {
                page_num,
                offset,
                after,
                ..
            } => {
                let mut page = buffer.fetch_page(*page_num)?;
                page.write(*offset as usize, after);
                page.set_page_lsn(self.lsn);
                dirty(*page_num, self.lsn);
                Ok(())
            }
            LogPayload::UndoUpdatePage {
                page_num,
                offset,
                before,
                ..
            } => {
                let mut page = buffer.fetch_page(*page_num)?;
                page.write(*offset as usize, before);
                page.set_page_lsn(self.lsn);
                dirty(*page_num, self.lsn);
                Ok(())
            }
            LogPayload::AllocPart { part_num, .. } | LogPayload::UndoFreePart { part_num, .. } => {
                disk.alloc_part(*part_num)?;
                Ok(())
            }
            LogPayload::FreePart { part_num, .. } | LogPayload::UndoAllocPart { part_num, .. } => {
                disk.free_part(*part_num)?;
                Ok(())
            }
            LogPayload::AllocPage { page_num, .. } | LogPayload::UndoFreePage { page_num, .. } => {
                disk.alloc_page(*page_num)?;
                Ok(())
            }
            LogPayload::FreePage { page_num, .. } | LogPayload::UndoAllocPage { page_num, .. } => {
                buffer.discard_page(*page_num);
                disk.free_page(*page_num)?;
                Ok(())
            }
            _ => Err(RecoveryError::NotRedoable(self.payload.record_type())),
        }
    }

    /// Serialize this record to bytes.
    #[must_use]
    pub fn to_bytes(&self) -> Vec<u8> {
        let mut body = Vec::new();
        match &self.payload {
            LogPayload::Master {
                last_checkpoint_lsn,
            } => {
                body.extend_from_slice(&last_checkpoint_lsn.to_le_bytes());
            }
            LogPayload::BeginCheckpoint => {}
            LogPayload::EndCheckpoint {
                dirty_pages,
                txn_table,
            } => {
                body.extend_from_slice(&(dirty_pages.len() as u32).to_le_bytes());
                body.extend_from_slice(&(txn_table.len() as u32).to_le_bytes());
                for (page_num, rec_lsn) in dirty_pages {
                    body.extend_from_slice(&page_num.to_le_bytes());
                    body.extend_from_slice(&rec_lsn.to_le_bytes());
                }
                for (trans_num, (status, last_lsn)) in txn_table {
                    body.extend_from_slice(&trans_num.to_le_bytes());
                    body.push(status_to_byte(*status));
                    body.extend_from_slice(&last_lsn.to_le_bytes());
                }
            }
            LogPayload::Commit {
                trans_num,
                prev_lsn,
            }
            | LogPayload::Abort {
                trans_num,
                prev_lsn,
            }
            | LogPayload::End {
                trans_num,
                prev_lsn,
            } => {
                body.extend_from_slice(&trans_num.to_le_bytes());
                body.extend_from_slice(&prev_lsn.to_le_bytes());
            }
            LogPayload::UpdatePage {
                trans_num,
                page_num,
                prev_lsn,
                offset,
                before,
                after,
            } => {
                body.extend_from_slice(&trans_num.to_le_bytes());
                body.extend_from_slice(&page_num.to_le_bytes());
                body.extend_from_slice(&prev_lsn.to_le_bytes());
                body.extend_from_slice(&offset.to_le_bytes());
                body.extend_from_slice(&(before.len() as u16).to_le_bytes());
                body.extend_from_slice(&(after.len() as u16).to_le_bytes());
                body.extend_from_slice(before);
                body.extend_from_slice(after);
            }
            LogPayload::UndoUpdatePage {
                trans_num,
                page_num,
                prev_lsn,
                undo_next_lsn,
                offset,
                before,
            } => {
                body.extend_from_slice(&trans_num.to_le_bytes());
                body.extend_from_slice(&page_num.to_le_bytes());
                body.extend_from_slice(&prev_lsn.to_le_bytes());
                body.extend_from_slice(&undo_next_lsn.to_le_bytes());
                body.extend_from_slice(&offset.to_le_bytes());
                body.extend_from_slice(&(before.len() as u16).to_le_bytes());
                body.extend_from_slice(before);
            }
            LogPayload::AllocPart {
                trans_num,
                part_num,
                prev_lsn,
            }
            | LogPayload::FreePart {
                trans_num,
                part_num,
                prev_lsn,
            } => {
                body.extend_from_slice(&trans_num.to_le_bytes());
                body.extend_from_slice(&part_num.to_le_bytes());
                body.extend_from_slice(&prev_lsn.to_le_bytes());
            }
            LogPayload::UndoAllocPart {
                trans_num,
                part_num,
                prev_lsn,
                undo_next_lsn,
            }
            | LogPayload::UndoFreePart {
                trans_num,
                part_num,
                prev_lsn,
                undo_next_lsn,
            } => {
                body.extend_from_slice(&trans_num.to_le_bytes());
                body.extend_from_slice(&part_num.to_le_bytes());
                body.extend_from_slice(&prev_lsn.to_le_bytes());
                body.extend_from_slice(&undo_next_lsn.to_le_bytes());
            }
            LogPayload::AllocPage {
                trans_num,
                page_num,
                prev_lsn,
            }
            | LogPayload::FreePage {
                trans_num,
                page_num,
                prev_lsn,
            } => {
                body.extend_from_slice(&trans_num.to_le_bytes());
                body.extend_from_slice(&page_num.to_le_bytes());
                body.extend_from_slice(&prev_lsn.to_le_bytes());
            }
            LogPayload::UndoAllocPage {
                trans_num,
                page_num,
                prev_lsn,
                undo_next_lsn,
            }
            | LogPayload::UndoFreePage {
                trans_num,
                page_num,
                prev_lsn,
                undo_next_lsn,
            } => {
                body.extend_from_slice(&trans_num.to_le_bytes());
                body.extend_from_slice(&page_num.to_le_bytes());
                body.extend_from_slice(&prev_lsn.to_le_bytes());
                body.extend_from_slice(&undo_next_lsn.to_le_bytes());
            }
        }

        let total_len = RECORD_HEADER_SIZE + body.len() + CHECKSUM_SIZE;
        let mut bytes = Vec::with_capacity(total_len);
        bytes.extend_from_slice(&(total_len as u32).to_le_bytes());
        bytes.push(self.payload.record_type() as u8);
        bytes.extend_from_slice(&self.lsn.to_le_bytes());
        bytes.extend_from_slice(&body);

        let checksum = crc32fast::hash(&bytes);
        bytes.extend_from_slice(&checksum.to_le_bytes());
        bytes
    }

    /// Deserialize a record from bytes.
    ///
    /// Returns the record and the number of bytes consumed.
    ///
    /// # Errors
    /// [`LogError::CorruptRecord`] on truncation,
    /// [`LogError::ChecksumMismatch`] on corruption,
    /// [`LogError::InvalidRecordType`] on an unknown tag.
    pub fn from_bytes(bytes: &[u8]) -> Result<(Self, usize), LogError> {
        if bytes.len() < RECORD_HEADER_SIZE + CHECKSUM_SIZE {
            return Err(LogError::CorruptRecord);
        }
        let record_len = u32::from_le_bytes([bytes[0], bytes[1], bytes[2], bytes[3]]) as usize;
        if record_len < RECORD_HEADER_SIZE + CHECKSUM_SIZE || record_len > bytes.len() {
            return Err(LogError::CorruptRecord);
        }

        let stored_checksum = u32::from_le_bytes([
            bytes[record_len - 4],
            bytes[record_len - 3],
            bytes[record_len - 2],
            bytes[record_len - 1],
        ]);
        let computed_checksum = crc32fast::hash(&bytes[..record_len - 4]);
        if stored_checksum != computed_checksum {
            return Err(LogError::ChecksumMismatch {
                expected: stored_checksum,
                actual: computed_checksum,
            });
        }

        let record_type = RecordType::try_from(bytes[4]).map_err(LogError::InvalidRecordType)?;
        let mut reader = Reader::new(&bytes[5..record_len - CHECKSUM_SIZE]);
        let lsn = reader.u64()?;

        let payload = match record_type {
            RecordType::Master => LogPayload::Master {
                last_checkpoint_lsn: reader.u64()?,
            },
            RecordType::BeginCheckpoint => LogPayload::BeginCheckpoint,
            RecordType::EndCheckpoint => {
                let dpt_count = reader.u32()? as usize;
                let txn_count = reader.u32()? as usize;
                let mut dirty_pages = BTreeMap::new();
                for _ in 0..dpt_count {
                    let page_num = reader.u64()?;
                    let rec_lsn = reader.u64()?;
                    dirty_pages.insert(page_num, rec_lsn);
                }
                let mut txn_table = BTreeMap::new();
                for _ in 0..txn_count {
                    let trans_num = reader.u64()?;
                    let status = status_from_byte(reader.u8()?)?;
                    let last_lsn = reader.u64()?;
                    txn_table.insert(trans_num, (status, last_lsn));
                }
                LogPayload::EndCheckpoint {
                    dirty_pages,
                    txn_table,
                }
            }
            RecordType::Commit => LogPayload::Commit {
                trans_num: reader.u64()?,
                prev_lsn: reader.u64()?,
            },
            RecordType::Abort => LogPayload::Abort {
                trans_num: reader.u64()?,
                prev_lsn: reader.u64()?,
            },
            RecordType::End => LogPayload::End {
                trans_num: reader.u64()?,
                prev_lsn: reader.u64()?,
            },
            RecordType::UpdatePage => {
                let trans_num = reader.u64()?;
                let page_num = reader.u64()?;
                let prev_lsn = reader.u64()?;
                let offset = reader.u16()?;
                let before_len = reader.u16()? as usize;
                let after_len = reader.u16()? as usize;
                let before = reader.bytes(before_len)?.to_vec();
                let after = reader.bytes(after_len)?.to_vec();
                LogPayload::UpdatePage {
                    trans_num,
                    page_num,
                    prev_lsn,
                    offset,
                    before,
                    after,
                }
            }
            RecordType::UndoUpdatePage => {
                let trans_num = reader.u64()?;
                let page_num = reader.u64()?;
                let prev_lsn = reader.u64()?;
                let undo_next_lsn = reader.u64()?;
                let offset = reader.u16()?;
                let before_len = reader.u16()? as usize;
                let before = reader.bytes(before_len)?.to_vec();
                LogPayload::UndoUpdatePage {
                    trans_num,
                    page_num,
                    prev_lsn,
                    undo_next_lsn,
                    offset,
                    before,
                }
            }
            RecordType::AllocPart => LogPayload::AllocPart {
                trans_num: reader.u64()?,
                part_num: reader.u32()?,
                prev_lsn: reader.u64()?,
            },
            RecordType::FreePart => LogPayload::FreePart {
                trans_num: reader.u64()?,
                part_num: reader.u32()?,
                prev_lsn: reader.u64()?,
            },
            RecordType::UndoAllocPart => LogPayload::UndoAllocPart {
                trans_num: reader.u64()?,
                part_num: reader.u32()?,
                prev_lsn: reader.u64()?,
                undo_next_lsn: reader.u64()?,
            },
            RecordType::UndoFreePart => LogPayload::UndoFreePart {
                trans_num: reader.u64()?,
                part_num: reader.u32()?,
                prev_lsn: reader.u64()?,
                undo_next_lsn: reader.u64()?,
            },
            RecordType::AllocPage => LogPayload::AllocPage {
                trans_num: reader.u64()?,
                page_num: reader.u64()?,
                prev_lsn: reader.u64()?,
            },
            RecordType::FreePage => LogPayload::FreePage {
                trans_num: reader.u64()?,
                page_num: reader.u64()?,
                prev_lsn: reader.u64()?,
            },
            RecordType::UndoAllocPage => LogPayload::UndoAllocPage {
                trans_num: reader.u64()?,
                page_num: reader.u64()?,
                prev_lsn: reader.u64()?,
                undo_next_lsn: reader.u64()?,
            },
            RecordType::UndoFreePage => LogPayload::UndoFreePage {
                trans_num: reader.u64()?,
                page_num: reader.u64()?,
                prev_lsn: reader.u64()?,
                undo_next_lsn: reader.u64()?,
            },
        };

        Ok((Self { lsn, payload }, record_len))
    }
}

/// Bounds-checked little-endian field reader.
struct Reader<'a> {
    buf: &'a [u8],
    pos: usize,
}

impl<'a> Reader<'a> {
    const fn new(buf: &'a [u8]) -> Self {
        Self { buf, pos: 0 }
    }

    fn bytes(&mut self, len: usize) -> Result<&'a [u8], LogError> {
        if self.pos + len > self.buf.len() {
            return Err(LogError::CorruptRecord);
        }
        let slice = &self.buf[self.pos..self.pos + len];
        self.pos += len;
        Ok(slice)
    }

    fn u8(&mut self) -> Result<u8, LogError> {
        Ok(self.bytes(1)?[0])
    }

    fn u16(&mut self) -> Result<u16, LogError> {
        let bytes = self.bytes(2)?;
        Ok(u16::from_le_bytes([bytes[0], bytes[1]]))
    }

    fn u32(&mut self) -> Result<u32, LogError> {
        let bytes = self.bytes(4)?;
        Ok(u32::from_le_bytes([bytes[0], bytes[1], bytes[2], bytes[3]]))
    }

    fn u64(&mut self) -> Result<u64, LogError> {
        let bytes = self.bytes(8)?;
        let mut array = [0u8; 8];
        array.copy_from_slice(bytes);
        Ok(u64::from_le_bytes(array))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::memory::{MemoryBufferManager, MemoryDiskManager};
    use crate::storage::page_num;
    use std::sync::Arc;

    #[test]
    fn test_update_page_round_trip() {
        let record = LogRecord::new(
            42,
            LogPayload::UpdatePage {
                trans_num: 7,
                page_num: page_num(1, 3),
                prev_lsn: 40,
                offset: 128,
                before: vec![0, 0, 0],
                after: vec![1, 2, 3],
            },
        );

        let bytes = record.to_bytes();
        let (decoded, consumed) = LogRecord::from_bytes(&bytes).expect("decode");
        assert_eq!(consumed, bytes.len());
        assert_eq!(decoded, record);
        assert_eq!(decoded.trans_num(), Some(7));
        assert_eq!(decoded.page_num(), Some(page_num(1, 3)));
        assert_eq!(decoded.prev_lsn(), Some(40));
        assert_eq!(decoded.undo_next_lsn(), None);
    }

    #[test]
    fn test_end_checkpoint_round_trip() {
        let mut dirty_pages = BTreeMap::new();
        dirty_pages.insert(page_num(1, 0), 10);
        dirty_pages.insert(page_num(2, 5), 17);
        let mut txn_table = BTreeMap::new();
        txn_table.insert(3, (Status::Running, 12));
        txn_table.insert(9, (Status::Committing, 20));

        let record = LogRecord::new(
            21,
            LogPayload::EndCheckpoint {
                dirty_pages,
                txn_table,
            },
        );
        let bytes = record.to_bytes();
        let (decoded, _) = LogRecord::from_bytes(&bytes).expect("decode");
        assert_eq!(decoded, record);
    }

    #[test]
    fn test_master_round_trip() {
        let record = LogRecord::new(
            0,
            LogPayload::Master {
                last_checkpoint_lsn: 55,
            },
        );
        let bytes = record.to_bytes();
        let (decoded, _) = LogRecord::from_bytes(&bytes).expect("decode");
        assert_eq!(decoded, record);
        assert!(!decoded.is_redoable());
        assert!(!decoded.is_undoable());
    }

    #[test]
    fn test_checksum_detects_corruption() {
        let record = LogRecord::new(
            5,
            LogPayload::Commit {
                trans_num: 1,
                prev_lsn: 3,
            },
        );
        let mut bytes = record.to_bytes();
        bytes[6] ^= 0xFF;
        assert!(matches!(
            LogRecord::from_bytes(&bytes),
            Err(LogError::ChecksumMismatch { .. })
        ));
    }

    #[test]
    fn test_truncated_record_rejected() {
        let record = LogRecord::new(
            5,
            LogPayload::Abort {
                trans_num: 1,
                prev_lsn: 3,
            },
        );
        let bytes = record.to_bytes();
        assert!(matches!(
            LogRecord::from_bytes(&bytes[..bytes.len() - 5]),
            Err(LogError::CorruptRecord)
        ));
    }

    #[test]
    fn test_undo_builds_clr_chain() {
        // A record's CLR points backward: prev_lsn is the transaction's
        // current lastLSN, undo_next_lsn is the undone record's prev_lsn.
        let update = LogPayload::UpdatePage {
            trans_num: 1,
            page_num: page_num(1, 0),
            prev_lsn: 5,
            offset: 0,
            before: vec![0xAA],
            after: vec![0xBB],
        };
        let clr = update.undo(10).expect("undoable");
        match &clr {
            LogPayload::UndoUpdatePage {
                trans_num,
                prev_lsn,
                undo_next_lsn,
                before,
                ..
            } => {
                assert_eq!(*trans_num, 1);
                assert_eq!(*prev_lsn, 10);
                assert_eq!(*undo_next_lsn, 5);
                assert_eq!(before, &vec![0xAA]);
            }
            other => panic!("expected UndoUpdatePage, got {other:?}"),
        }
        // CLRs are redoable but never undone themselves.
        assert!(clr.is_redoable());
        assert!(!clr.is_undoable());
    }

    #[test]
    fn test_space_record_undo_inverts() {
        let alloc = LogPayload::AllocPage {
            trans_num: 2,
            page_num: page_num(1, 9),
            prev_lsn: 0,
        };
        assert!(matches!(
            alloc.undo(4),
            Some(LogPayload::UndoAllocPage { undo_next_lsn: 0, prev_lsn: 4, .. })
        ));

        let free = LogPayload::FreePart {
            trans_num: 2,
            part_num: 3,
            prev_lsn: 7,
        };
        assert!(matches!(
            free.undo(9),
            Some(LogPayload::UndoFreePart { undo_next_lsn: 7, prev_lsn: 9, .. })
        ));

        // Status records have no inverse.
        assert!(LogPayload::BeginCheckpoint.undo(1).is_none());
        assert!(LogPayload::Commit {
            trans_num: 1,
            prev_lsn: 0
        }
        .undo(1)
        .is_none());
    }

    #[test]
    fn test_redo_update_applies_bytes_and_page_lsn() {
        let disk = Arc::new(MemoryDiskManager::new());
        disk.alloc_part(1).expect("alloc part");
        let num = page_num(1, 0);
        disk.alloc_page(num).expect("alloc page");
        let buffer = MemoryBufferManager::new(Arc::clone(&disk));

        let record = LogRecord::new(
            30,
            LogPayload::UpdatePage {
                trans_num: 1,
                page_num: num,
                prev_lsn: 0,
                offset: 16,
                before: vec![0, 0, 0, 0],
                after: b"data".to_vec(),
            },
        );

        let mut dirtied = Vec::new();
        record
            .redo(&*disk, &buffer, &mut |page, lsn| dirtied.push((page, lsn)))
            .expect("redo");

        let page = buffer.fetch_page(num).expect("fetch");
        let mut buf = [0u8; 4];
        page.read(16, &mut buf);
        assert_eq!(&buf, b"data");
        assert_eq!(page.page_lsn(), 30);
        assert_eq!(dirtied, vec![(num, 30)]);
    }

    #[test]
    fn test_redo_alloc_and_free_page() {
        let disk = Arc::new(MemoryDiskManager::new());
        disk.alloc_part(1).expect("alloc part");
        let buffer = MemoryBufferManager::new(Arc::clone(&disk));
        let num = page_num(1, 4);

        let alloc = LogRecord::new(
            3,
            LogPayload::AllocPage {
                trans_num: 1,
                page_num: num,
                prev_lsn: 0,
            },
        );
        alloc.redo(&*disk, &buffer, &mut |_, _| {}).expect("redo alloc");
        assert!(disk.is_allocated(num));

        // Redo is idempotent: replaying the allocation is a no-op.
        alloc.redo(&*disk, &buffer, &mut |_, _| {}).expect("redo again");

        let free = LogRecord::new(
            8,
            LogPayload::FreePage {
                trans_num: 1,
                page_num: num,
                prev_lsn: 3,
            },
        );
        free.redo(&*disk, &buffer, &mut |_, _| {}).expect("redo free");
        assert!(!disk.is_allocated(num));
    }

    #[test]
    fn test_status_records_not_redoable() {
        let disk = MemoryDiskManager::new();
        let buffer = MemoryBufferManager::new(Arc::new(MemoryDiskManager::new()));
        let record = LogRecord::new(
            2,
            LogPayload::Commit {
                trans_num: 1,
                prev_lsn: 0,
            },
        );
        assert!(matches!(
            record.redo(&disk, &buffer, &mut |_, _| {}),
            Err(RecoveryError::NotRedoable(RecordType::Commit))
        ));
    }

    #[test]
    fn test_fits_in_one_record_bounds() {
        assert!(LogPayload::fits_in_one_record(0, 0));
        assert!(LogPayload::fits_in_one_record(100, 100));
        // The whole point of the predicate: very large tables do not fit.
        assert!(!LogPayload::fits_in_one_record(1000, 0));
        assert!(!LogPayload::fits_in_one_record(0, 1000));
    }
}

//! Write-ahead logging and ARIES crash recovery.
//!
//! The pieces, bottom up:
//!
//! - [`record`] — the log record model: a closed tagged union covering
//!   transaction status changes, page updates, space allocation, and
//!   checkpoints, with uniform redo/undo capabilities and a
//!   checksummed wire format.
//! - [`log`] — the append-only, LSN-addressed log with page-granular
//!   flushes and an overwritable master record at LSN 0.
//! - [`manager`] — the ARIES recovery manager: forward-processing hooks
//!   that keep the dirty page table and transaction table current,
//!   savepoints, fuzzy checkpoints, and the three-pass restart
//!   (analysis, redo, undo).

pub mod log;
pub mod manager;
pub mod record;

pub use log::LogManager;
pub use manager::{RecoveryManager, TransactionTableEntry};
pub use record::{LogPayload, LogRecord, RecordType};

use crate::storage::StorageError;
use crate::{Lsn, TxnId};

/// Errors from the log itself.
#[derive(Debug)]
pub enum LogError {
    /// I/O error on the backing file.
    Io(std::io::Error),
    /// Truncated or structurally invalid log record.
    CorruptRecord,
    /// Invalid record type byte.
    InvalidRecordType(u8),
    /// Checksum mismatch.
    ChecksumMismatch {
        /// Checksum stored in the record.
        expected: u32,
        /// Checksum computed over the record bytes.
        actual: u32,
    },
    /// No record with this LSN exists.
    LsnNotFound(Lsn),
    /// Record too large to fit on a log page.
    RecordTooLarge {
        /// Serialized size in bytes.
        size: usize,
    },
}

impl std::fmt::Display for LogError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Io(e) => write!(f, "log I/O error: {e}"),
            Self::CorruptRecord => write!(f, "corrupt log record"),
            Self::InvalidRecordType(t) => write!(f, "invalid log record type: 0x{t:02x}"),
            Self::ChecksumMismatch { expected, actual } => write!(
                f,
                "log checksum mismatch: expected 0x{expected:08x}, got 0x{actual:08x}"
            ),
            Self::LsnNotFound(lsn) => write!(f, "LSN {lsn} not found in log"),
            Self::RecordTooLarge { size } => {
                write!(f, "log record of {size} bytes exceeds a log page")
            }
        }
    }
}

impl std::error::Error for LogError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Self::Io(e) => Some(e),
            _ => None,
        }
    }
}

impl From<std::io::Error> for LogError {
    fn from(e: std::io::Error) -> Self {
        Self::Io(e)
    }
}

/// Errors during forward processing or restart. Restart treats all of
/// these as fatal.
#[derive(Debug)]
pub enum RecoveryError {
    /// Log error.
    Log(LogError),
    /// Storage collaborator error.
    Storage(StorageError),
    /// Operation on a transaction absent from the transaction table.
    UnknownTransaction(TxnId),
    /// The log has no master record at LSN 0.
    MissingMasterRecord,
    /// Attempted to redo a record that carries no redo action.
    NotRedoable(RecordType),
    /// Rollback referenced a savepoint that does not exist.
    UnknownSavepoint {
        /// Transaction owning the savepoints.
        trans_num: TxnId,
        /// The missing savepoint name.
        name: String,
    },
}

impl std::fmt::Display for RecoveryError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Log(e) => write!(f, "recovery log error: {e}"),
            Self::Storage(e) => write!(f, "recovery storage error: {e}"),
            Self::UnknownTransaction(trans_num) => {
                write!(f, "transaction {trans_num} is not in the transaction table")
            }
            Self::MissingMasterRecord => write!(f, "log has no master record"),
            Self::NotRedoable(record_type) => {
                write!(f, "{record_type:?} records cannot be redone")
            }
            Self::UnknownSavepoint { trans_num, name } => {
                write!(f, "transaction {trans_num} has no savepoint named {name:?}")
            }
        }
    }
}

impl std::error::Error for RecoveryError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Self::Log(e) => Some(e),
            Self::Storage(e) => Some(e),
            _ => None,
        }
    }
}

impl From<LogError> for RecoveryError {
    fn from(e: LogError) -> Self {
        Self::Log(e)
    }
}

impl From<StorageError> for RecoveryError {
    fn from(e: StorageError) -> Self {
        Self::Storage(e)
    }
}

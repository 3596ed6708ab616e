//! The append-only log.
//!
//! Records receive dense, monotonically increasing LSNs and are packed
//! into fixed-size log pages (a record never spans two pages). Pages are
//! held in memory and written back page-at-a-time: flushing to an LSN
//! durably writes every log page up to and including the one holding that
//! record, so records sharing the final page become durable with it.
//!
//! LSN 0 is the master record. It lives alone on log page 0 and is
//! rewritten in place whenever a checkpoint completes; everything else in
//! the log is immutable once appended.
//!
//! The log is backed by any `Read + Write + Seek` target. Log pages
//! bypass the dirty page table entirely: the recovery manager never
//! tracks them, and they never pass through the buffer manager.

use std::collections::BTreeMap;
use std::io::{Read, Seek, SeekFrom, Write};

use crate::recovery::record::{CHECKSUM_SIZE, RECORD_HEADER_SIZE};
use crate::recovery::{LogError, LogPayload, LogRecord};
use crate::storage::PAGE_SIZE;
use crate::Lsn;

/// Size of one log page.
pub const LOG_PAGE_SIZE: usize = PAGE_SIZE;

/// The append-only, LSN-addressed log.
pub struct LogManager<F: Read + Write + Seek> {
    /// Backing store. Contains only durably flushed pages.
    file: F,
    /// All log pages, master page first. The tail page may hold records
    /// not yet flushed.
    pages: Vec<Vec<u8>>,
    /// Page index of each record (master excluded).
    page_of: BTreeMap<Lsn, usize>,
    /// Decoded records, master included, keyed by LSN.
    records: BTreeMap<Lsn, LogRecord>,
    /// Next LSN to assign.
    next_lsn: Lsn,
    /// Highest LSN durably on disk.
    flushed_lsn: Lsn,
    /// First page that differs from the backing store.
    first_unflushed_page: usize,
    /// Write position within the tail page.
    tail_pos: usize,
    /// Total record bytes appended over this manager's lifetime. Drives
    /// the byte-based checkpoint trigger.
    bytes_written: u64,
}

impl<F: Read + Write + Seek> LogManager<F> {
    /// Create a fresh, empty log over `file`.
    #[must_use]
    pub fn new(file: F) -> Self {
        Self {
            file,
            pages: vec![vec![0u8; LOG_PAGE_SIZE]],
            page_of: BTreeMap::new(),
            records: BTreeMap::new(),
            next_lsn: 1,
            flushed_lsn: 0,
            first_unflushed_page: 0,
            tail_pos: 0,
            bytes_written: 0,
        }
    }

    /// Open an existing log, rebuilding in-memory state by scanning every
    /// page and verifying record checksums.
    ///
    /// # Errors
    /// I/O errors, and [`LogError::CorruptRecord`] /
    /// [`LogError::ChecksumMismatch`] on damaged records.
    pub fn open(mut file: F) -> Result<Self, LogError> {
        file.seek(SeekFrom::Start(0))?;
        let mut raw = Vec::new();
        file.read_to_end(&mut raw)?;

        let page_count = raw.len() / LOG_PAGE_SIZE;
        let mut pages: Vec<Vec<u8>> = (0..page_count)
            .map(|idx| raw[idx * LOG_PAGE_SIZE..(idx + 1) * LOG_PAGE_SIZE].to_vec())
            .collect();
        if pages.is_empty() {
            pages.push(vec![0u8; LOG_PAGE_SIZE]);
        }

        let mut records = BTreeMap::new();
        let mut page_of = BTreeMap::new();

        let master_len = u32::from_le_bytes([pages[0][0], pages[0][1], pages[0][2], pages[0][3]]);
        if master_len != 0 {
            let (master, _) = LogRecord::from_bytes(&pages[0])?;
            records.insert(master.lsn, master);
        }

        let mut tail_pos = 0;
        for idx in 1..pages.len() {
            let mut pos = 0;
            while pos + RECORD_HEADER_SIZE + CHECKSUM_SIZE <= LOG_PAGE_SIZE {
                let page = &pages[idx];
                let len = u32::from_le_bytes([
                    page[pos],
                    page[pos + 1],
                    page[pos + 2],
                    page[pos + 3],
                ]);
                if len == 0 {
                    break;
                }
                let (record, consumed) = LogRecord::from_bytes(&page[pos..])?;
                page_of.insert(record.lsn, idx);
                records.insert(record.lsn, record);
                pos += consumed;
            }
            if idx == pages.len() - 1 {
                tail_pos = pos;
            }
        }

        let flushed_lsn = page_of.keys().next_back().copied().unwrap_or(0);
        let next_lsn = flushed_lsn + 1;
        let first_unflushed_page = pages.len() - 1;
        Ok(Self {
            file,
            pages,
            page_of,
            records,
            next_lsn,
            flushed_lsn,
            first_unflushed_page,
            tail_pos,
            bytes_written: 0,
        })
    }

    /// Append `payload`, assigning and returning its LSN. The record is
    /// not durable until a flush covers it.
    ///
    /// # Errors
    /// [`LogError::RecordTooLarge`] if the record cannot fit on one log
    /// page.
    pub fn append(&mut self, payload: LogPayload) -> Result<Lsn, LogError> {
        let lsn = self.next_lsn;
        let record = LogRecord::new(lsn, payload);
        let bytes = record.to_bytes();
        if bytes.len() > LOG_PAGE_SIZE {
            return Err(LogError::RecordTooLarge { size: bytes.len() });
        }

        let needs_new_page =
            self.pages.len() == 1 || self.tail_pos + bytes.len() > LOG_PAGE_SIZE;
        if needs_new_page {
            self.pages.push(vec![0u8; LOG_PAGE_SIZE]);
            self.tail_pos = 0;
        }
        let page_idx = self.pages.len() - 1;
        self.pages[page_idx][self.tail_pos..self.tail_pos + bytes.len()].copy_from_slice(&bytes);
        self.tail_pos += bytes.len();

        self.page_of.insert(lsn, page_idx);
        self.records.insert(lsn, record);
        self.next_lsn += 1;
        self.bytes_written += bytes.len() as u64;
        Ok(lsn)
    }

    /// Durably flush every log page up to and including the page holding
    /// the record at `lsn`. Records after `lsn` that share its page
    /// become durable as well.
    ///
    /// # Errors
    /// I/O errors from the backing store.
    pub fn flush_to_lsn(&mut self, lsn: Lsn) -> Result<(), LogError> {
        let Some(last_lsn) = self.page_of.keys().next_back().copied() else {
            return Ok(());
        };
        let target = lsn.min(last_lsn);
        if target == 0 || target <= self.flushed_lsn {
            return Ok(());
        }
        let Some(&target_page) = self.page_of.get(&target) else {
            return Err(LogError::LsnNotFound(target));
        };

        for idx in self.first_unflushed_page..=target_page {
            if idx >= self.pages.len() {
                break;
            }
            self.file
                .seek(SeekFrom::Start((idx * LOG_PAGE_SIZE) as u64))?;
            self.file.write_all(&self.pages[idx])?;
        }
        self.file.flush()?;

        self.flushed_lsn = self
            .page_of
            .iter()
            .rev()
            .find(|(_, &page)| page <= target_page)
            .map_or(self.flushed_lsn, |(&lsn, _)| lsn);
        self.first_unflushed_page = target_page;
        Ok(())
    }

    /// Rewrite the master record in place and flush it.
    ///
    /// # Errors
    /// I/O errors from the backing store.
    pub fn rewrite_master(&mut self, last_checkpoint_lsn: Lsn) -> Result<(), LogError> {
        let record = LogRecord::new(
            0,
            LogPayload::Master {
                last_checkpoint_lsn,
            },
        );
        let bytes = record.to_bytes();
        let mut page = vec![0u8; LOG_PAGE_SIZE];
        page[..bytes.len()].copy_from_slice(&bytes);
        self.pages[0] = page;
        self.records.insert(0, record);

        self.file.seek(SeekFrom::Start(0))?;
        self.file.write_all(&self.pages[0])?;
        self.file.flush()?;
        Ok(())
    }

    /// The record at `lsn`.
    ///
    /// # Errors
    /// [`LogError::LsnNotFound`] if no such record exists.
    pub fn fetch(&self, lsn: Lsn) -> Result<&LogRecord, LogError> {
        self.records.get(&lsn).ok_or(LogError::LsnNotFound(lsn))
    }

    /// Records from `lsn` (inclusive) to the end of the log, in order.
    pub fn scan_from(&self, lsn: Lsn) -> impl Iterator<Item = &LogRecord> {
        self.records.range(lsn..).map(|(_, record)| record)
    }

    /// The next LSN that will be assigned.
    #[must_use]
    pub const fn next_lsn(&self) -> Lsn {
        self.next_lsn
    }

    /// The highest LSN durably on disk (0 if none).
    #[must_use]
    pub const fn flushed_lsn(&self) -> Lsn {
        self.flushed_lsn
    }

    /// Total record bytes appended over this manager's lifetime.
    #[must_use]
    pub const fn bytes_written(&self) -> u64 {
        self.bytes_written
    }

    /// Consume the manager and return the backing store. Only flushed
    /// pages have been written to it.
    pub fn into_file(self) -> F {
        self.file
    }
}

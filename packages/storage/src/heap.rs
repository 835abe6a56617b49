//! The paged heap file ("memory river"): a flat, append-mostly store of
//! fixed-size records addressed by byte offset, fronted by a small header
//! of integer metadata slots.
//!
//! This is the L0 layer everything else in this crate is built on. It
//! never interprets the bytes it stores — that's the job of
//! [`crate::codec::FixedSizeRecord`] and whatever sits on top (the B+ tree,
//! the seat inventory).

use std::fs::{File, OpenOptions};
use std::io::{Read, Seek, SeekFrom, Write};
use std::marker::PhantomData;
use std::path::Path;

use crate::codec::FixedSizeRecord;
use crate::error::{Error, Result};

const HEADER_SLOT_SIZE: i64 = 8;

/// A fixed-size-record heap file with `info_len` leading `i64` header slots.
pub struct PagedHeap<T: FixedSizeRecord> {
    file: File,
    info_len: usize,
    _marker: PhantomData<T>,
}

impl<T: FixedSizeRecord> PagedHeap<T> {
    /// Opens `path`, creating and initializing it with a zeroed header if
    /// it does not already exist. An existing file is opened as-is; its
    /// header and records are trusted to be whatever a prior clean
    /// shutdown left behind.
    pub fn open(path: impl AsRef<Path>, info_len: usize) -> Result<Self> {
        Self::open_with_defaults(path, &vec![0i64; info_len])
    }

    /// Like [`PagedHeap::open`], but a brand-new file's header slots are
    /// initialized to `defaults` instead of all zero. Used by the B+ tree
    /// to seed `root = -1` on a fresh index file rather than `0`, which
    /// would otherwise be indistinguishable from a valid root offset.
    pub fn open_with_defaults(path: impl AsRef<Path>, defaults: &[i64]) -> Result<Self> {
        let path = path.as_ref();
        let is_new = !path.exists();
        let info_len = defaults.len();
        let file = OpenOptions::new()
            .read(true)
            .write(true)
            .create(true)
            .open(path)?;
        let mut heap = Self {
            file,
            info_len,
            _marker: PhantomData,
        };
        if is_new {
            heap.file.set_len(info_len as u64 * HEADER_SLOT_SIZE as u64)?;
            for (i, value) in defaults.iter().enumerate() {
                heap.write_info(i + 1, *value)?;
            }
        }
        Ok(heap)
    }

    fn data_start(&self) -> i64 {
        self.info_len as i64 * HEADER_SLOT_SIZE
    }

    fn header_offset(&self, slot: usize) -> Result<i64> {
        if slot == 0 || slot > self.info_len {
            return Err(Error::HeaderSlotOutOfBounds {
                slot,
                info_len: self.info_len,
            });
        }
        Ok((slot as i64 - 1) * HEADER_SLOT_SIZE)
    }

    /// Reads header slot `n` (1-based).
    pub fn get_info(&mut self, n: usize) -> Result<i64> {
        let offset = self.header_offset(n)?;
        self.file.seek(SeekFrom::Start(offset as u64))?;
        let mut buf = [0u8; 8];
        self.file.read_exact(&mut buf)?;
        Ok(i64::from_le_bytes(buf))
    }

    /// Writes header slot `n` (1-based).
    pub fn write_info(&mut self, n: usize, value: i64) -> Result<()> {
        let offset = self.header_offset(n)?;
        self.file.seek(SeekFrom::Start(offset as u64))?;
        self.file.write_all(&value.to_le_bytes())?;
        self.file.flush()?;
        Ok(())
    }

    /// Appends `record` at end-of-file and returns its byte offset.
    pub fn write(&mut self, record: &T) -> Result<i64> {
        let offset = self.file.seek(SeekFrom::End(0))?;
        let mut buf = vec![0u8; T::SIZE];
        record.write_to(&mut buf);
        self.file.write_all(&buf)?;
        self.file.flush()?;
        Ok(offset as i64)
    }

    /// Appends `count` copies of `record` contiguously, returning the
    /// offset of the first one. Used by the seat inventory to allocate a
    /// whole per-train extent of `SeatMap` records in one call.
    pub fn write_many(&mut self, record: &T, count: usize) -> Result<i64> {
        let offset = self.file.seek(SeekFrom::End(0))?;
        let mut buf = vec![0u8; T::SIZE];
        record.write_to(&mut buf);
        for _ in 0..count {
            self.file.write_all(&buf)?;
        }
        self.file.flush()?;
        Ok(offset as i64)
    }

    /// Overwrites the record at `offset`.
    pub fn update(&mut self, record: &T, offset: i64) -> Result<()> {
        let mut buf = vec![0u8; T::SIZE];
        record.write_to(&mut buf);
        self.file.seek(SeekFrom::Start(offset as u64))?;
        self.file.write_all(&buf)?;
        self.file.flush()?;
        Ok(())
    }

    /// Reads the record at `offset`.
    pub fn read(&mut self, offset: i64) -> Result<T> {
        let mut buf = vec![0u8; T::SIZE];
        self.file.seek(SeekFrom::Start(offset as u64))?;
        self.file.read_exact(&mut buf)?;
        Ok(T::read_from(&buf))
    }

    /// Shifts the tail of the file left by `T::SIZE` bytes, dropping the
    /// record at `offset`. The core never calls this for B+ tree pages
    /// (they grow-only); kept for parity with the reference "memory
    /// river" contract and available to callers that accept the cost.
    pub fn delete(&mut self, offset: i64) -> Result<()> {
        let total_len = self.file.seek(SeekFrom::End(0))?;
        let record_size = T::SIZE as u64;
        if offset as u64 + record_size >= total_len {
            return Ok(());
        }
        let tail_len = total_len - offset as u64 - record_size;
        let mut tail = vec![0u8; tail_len as usize];
        self.file
            .seek(SeekFrom::Start(offset as u64 + record_size))?;
        self.file.read_exact(&mut tail)?;
        self.file.seek(SeekFrom::Start(offset as u64))?;
        self.file.write_all(&tail)?;
        self.file.set_len(offset as u64 + tail_len)?;
        self.file.flush()?;
        Ok(())
    }

    pub fn flush(&mut self) -> Result<()> {
        self.file.flush()?;
        Ok(())
    }

    /// The start-of-records offset, for callers that want to assert a
    /// candidate offset actually lands on a record boundary.
    pub fn is_record_boundary(&self, offset: i64) -> bool {
        offset >= self.data_start() && (offset - self.data_start()) % T::SIZE as i64 == 0
    }
}

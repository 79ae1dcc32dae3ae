use crate::digest::{self, DigestStatus};
use crate::errors::BridgeError;
use crate::header::SeqlockHeader;
use crate::region::{RegionLadder, Tier};
use crate::retry::RetryConfig;
use memmap2::{Mmap, MmapOptions};
use record::SnapshotRecord;
use std::fs::File;
use std::path::Path;
use std::ptr;
use std::sync::atomic::{Ordering, fence};
use std::thread;

/// Read-only consumer of a snapshot region.
///
/// Readers never take the write lock. A copy is accepted only if
/// `write_sequence` was even before it and unchanged after it.
pub struct SnapshotReader {
    _file: File,
    mmap: Mmap,
    retry: RetryConfig,
    last_version: u32,
}

impl SnapshotReader {
    pub fn open(path: impl AsRef<Path>) -> Result<Self, BridgeError> {
        let file = File::open(path)?;
        let len = file.metadata()?.len() as usize;
        if len != SnapshotRecord::SIZE {
            return Err(BridgeError::SizeMismatch {
                expected: SnapshotRecord::SIZE,
                actual: len,
            });
        }

        let mmap = unsafe { MmapOptions::new().len(len).map(&file) }.map_err(BridgeError::MapFailed)?;

        Ok(Self {
            _file: file,
            mmap,
            retry: RetryConfig::default(),
            last_version: 0,
        })
    }

    /// Open the first tier of `ladder` that holds a region.
    pub fn open_ladder(ladder: &RegionLadder) -> Result<(Self, Tier), BridgeError> {
        let mut last_err = None;
        for (tier, path) in ladder.tiers() {
            match Self::open(path) {
                Ok(reader) => return Ok((reader, tier)),
                Err(e) => last_err = Some(format!("{tier}: {e}")),
            }
        }
        Err(BridgeError::RegionUnavailable(last_err.unwrap_or_default()))
    }

    pub fn with_retry(mut self, retry: RetryConfig) -> Self {
        self.retry = retry;
        self
    }

    fn header(&self) -> &SeqlockHeader {
        unsafe { SeqlockHeader::from_ptr(self.mmap.as_ptr()) }
    }

    pub fn current_sequence(&self) -> u32 {
        self.header().write_sequence.load(Ordering::Acquire)
    }

    pub fn current_snapshot_version(&self) -> u32 {
        self.header().snapshot_version.load(Ordering::Acquire)
    }

    /// Copy a consistent record, retrying while a write is in progress.
    pub fn read(&self) -> Result<SnapshotRecord, BridgeError> {
        let header = self.header();

        for attempt in 0..self.retry.max_attempts {
            let before = header.write_sequence.load(Ordering::Acquire);
            if before % 2 == 0 {
                let copy = unsafe { ptr::read_volatile(self.mmap.as_ptr() as *const SnapshotRecord) };
                fence(Ordering::Acquire);
                let after = header.write_sequence.load(Ordering::Relaxed);

                if before == after {
                    return Ok(record::decode(copy.as_bytes())?);
                }
            }

            if attempt + 1 < self.retry.max_attempts {
                thread::sleep(self.retry.delay_for_attempt(attempt));
            }
        }

        Err(BridgeError::NotReady)
    }

    /// `read` plus the digest check.
    pub fn read_verified(&self) -> Result<(SnapshotRecord, DigestStatus), BridgeError> {
        let record = self.read()?;
        let status = digest::verify(&record);
        Ok((record, status))
    }

    /// True if content changed since the last `mark_read`.
    pub fn has_new_data(&self) -> bool {
        self.current_snapshot_version() != self.last_version
    }

    pub fn mark_read(&mut self, record: &SnapshotRecord) {
        self.last_version = record.snapshot_version;
    }

    pub fn last_version(&self) -> u32 {
        self.last_version
    }
}

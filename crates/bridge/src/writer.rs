//! Write side of the snapshot seqlock.
//!
//! A write holds the named lock for its whole duration and brackets the
//! record update with an odd `write_sequence`. The mutator edits a staged
//! copy; the copy is sealed with its digest and stored into the region while
//! the sequence is still odd, then the next even value is published.
//!
//! The even value is published and the lock released from
//! `WriteGuard::drop`, so a failing mutator, a panic unwinding through
//! `commit`, or a guard that is simply dropped all leave the region with an
//! even sequence, a digest that matches, and a free lock. A writer process
//! that dies mid-write loses its lock with its descriptors; the next writer
//! finds the sequence odd and skips past it.

use crate::digest::{self, DigestStatus};
use crate::errors::BridgeError;
use crate::lock::{FileLock, LockError};
use crate::region::Region;
use record::{ABI_VERSION, SnapshotRecord, StatusFlags};
use std::path::Path;
use std::sync::Arc;
use std::sync::atomic::{Ordering, fence};
use std::time::Duration;

/// Flags owned by the writer and recomputed on every write.
const WRITER_FLAGS: StatusFlags = StatusFlags::HASH_MISMATCH.union(StatusFlags::SEQUENCE_STALLED);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WriteOutcome {
    pub write_sequence: u32,
    pub snapshot_version: u32,
    pub changed: bool,
    pub flags: StatusFlags,
}

pub struct SnapshotWriter {
    region: Arc<Region>,
    lock: FileLock,
    digest_enabled: bool,
}

impl SnapshotWriter {
    /// Attach to `region`, serialising with other writers through the lock
    /// file at `lock_path` (usually [`crate::paths::lock_path_for`]).
    pub fn new(region: Arc<Region>, lock_path: &Path) -> Result<Self, BridgeError> {
        let lock = FileLock::open(lock_path)?;
        Ok(Self {
            region,
            lock,
            digest_enabled: true,
        })
    }

    /// With the digest disabled every write publishes an all-zero digest.
    pub fn with_digest(mut self, enabled: bool) -> Self {
        self.digest_enabled = enabled;
        self
    }

    pub fn region(&self) -> &Arc<Region> {
        &self.region
    }

    /// Take the lock and mark the record as being written.
    pub fn begin_write(&self, timeout: Duration) -> Result<WriteGuard<'_>, BridgeError> {
        match self.lock.acquire(timeout) {
            Ok(()) => {}
            Err(LockError::Timeout) => {
                tracing::warn!(timeout_ms = timeout.as_millis() as u64, "Snapshot lock wait timed out");
                return Err(BridgeError::LockTimeout(timeout));
            }
            Err(e) => return Err(e.into()),
        }

        let header = self.region.header();
        let current = header.write_sequence.load(Ordering::Acquire);
        let mut flags = StatusFlags::empty();

        let odd = if current % 2 == 0 {
            if digest::verify(&self.region.snapshot()) == DigestStatus::Mismatch {
                tracing::warn!(write_sequence = current, "Published digest does not match region content");
                flags |= StatusFlags::HASH_MISMATCH;
            }
            current.wrapping_add(1)
        } else {
            tracing::warn!(write_sequence = current, "Previous write never completed");
            flags |= StatusFlags::SEQUENCE_STALLED;
            current.wrapping_add(2)
        };

        header.write_sequence.store(odd, Ordering::Relaxed);
        fence(Ordering::Release);

        Ok(WriteGuard {
            writer: self,
            odd,
            flags,
            committed: false,
        })
    }

    /// `begin_write` followed by `commit`.
    pub fn write<F>(&self, timeout: Duration, mutator: F) -> Result<WriteOutcome, BridgeError>
    where
        F: FnOnce(&mut SnapshotRecord) -> anyhow::Result<()>,
    {
        self.begin_write(timeout)?.commit(mutator)
    }

    fn seal(&self, record: &mut SnapshotRecord) {
        if self.digest_enabled {
            digest::recompute(record);
        } else {
            digest::clear(record);
        }
    }
}

/// An open write. Dropping it without `commit` keeps the previous content.
pub struct WriteGuard<'a> {
    writer: &'a SnapshotWriter,
    odd: u32,
    flags: StatusFlags,
    committed: bool,
}

impl WriteGuard<'_> {
    /// The odd sequence readers currently see.
    pub fn sequence(&self) -> u32 {
        self.odd
    }

    fn final_sequence(&self) -> u32 {
        self.odd.wrapping_add(1)
    }

    /// Apply `mutator` to the record and publish the result.
    ///
    /// Header words are restored after the mutator runs, whatever it wrote.
    /// `snapshot_version` advances only if the content bytes changed. On
    /// error the region keeps its previous content.
    pub fn commit<F>(mut self, mutator: F) -> Result<WriteOutcome, BridgeError>
    where
        F: FnOnce(&mut SnapshotRecord) -> anyhow::Result<()>,
    {
        let region = &self.writer.region;
        let before = region.snapshot();

        let mut staged = before;
        staged.set_status_flags(staged.status_flags() - WRITER_FLAGS);

        if let Err(e) = mutator(&mut staged) {
            tracing::error!(error = %format!("{e:#}"), "Snapshot mutation failed, keeping previous content");
            return Err(BridgeError::MutationFailed(format!("{e:#}")));
        }

        let final_sequence = self.final_sequence();
        staged.abi_version = ABI_VERSION;
        staged.reserved_header = 0;
        staged.set_status_flags(staged.status_flags() | self.flags);

        let changed = staged.content() != before.content();
        staged.snapshot_version = if changed {
            before.snapshot_version.wrapping_add(1)
        } else {
            before.snapshot_version
        };

        // Seal against the value readers will see, store under the odd one.
        staged.write_sequence = final_sequence;
        self.writer.seal(&mut staged);
        staged.write_sequence = self.odd;
        region.store(&staged);
        self.committed = true;

        tracing::debug!(
            write_sequence = final_sequence,
            snapshot_version = staged.snapshot_version,
            changed,
            temp_sensors = staged.temp_sensor_count,
            "Snapshot written"
        );

        Ok(WriteOutcome {
            write_sequence: final_sequence,
            snapshot_version: staged.snapshot_version,
            changed,
            flags: staged.status_flags(),
        })
    }
}

impl Drop for WriteGuard<'_> {
    fn drop(&mut self) {
        let region = &self.writer.region;
        let final_sequence = self.final_sequence();

        if !self.committed {
            // Content stays as it was, but what begin_write found is still
            // published before the record is sealed again.
            let before = region.snapshot();
            let mut current = before;
            current.set_status_flags((current.status_flags() - WRITER_FLAGS) | self.flags);
            if current.content() != before.content() {
                current.snapshot_version = before.snapshot_version.wrapping_add(1);
            }

            current.write_sequence = final_sequence;
            self.writer.seal(&mut current);
            current.write_sequence = self.odd;
            region.store(&current);
        }

        region
            .header()
            .write_sequence
            .store(final_sequence, Ordering::Release);

        if let Err(e) = self.writer.lock.release() {
            tracing::error!(error = %e, "Failed to release snapshot lock");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::paths::lock_path_for;
    use crate::region::Tier;
    use std::path::PathBuf;
    use tempfile::TempDir;

    struct Fixture {
        _dir: TempDir,
        lock_path: PathBuf,
        writer: SnapshotWriter,
    }

    fn fixture() -> Fixture {
        let dir = tempfile::tempdir().unwrap();
        let region_path = dir.path().join("region");
        let region = Arc::new(Region::open(Tier::Unqualified, &region_path).unwrap());
        let lock_path = lock_path_for(&region_path);
        let writer = SnapshotWriter::new(region, &lock_path).unwrap();
        Fixture {
            _dir: dir,
            lock_path,
            writer,
        }
    }

    const TIMEOUT: Duration = Duration::from_millis(500);

    #[test]
    fn test_write_publishes_even_sequence_and_digest() {
        let f = fixture();

        let outcome = f
            .writer
            .write(TIMEOUT, |record| {
                record.cpu_logical_cores = 8;
                Ok(())
            })
            .unwrap();

        assert_eq!(outcome.write_sequence, 2);
        assert_eq!(outcome.snapshot_version, 1);
        assert!(outcome.changed);

        let record = f.writer.region().snapshot();
        assert_eq!(record.write_sequence, 2);
        assert_eq!(record.abi_version, ABI_VERSION);
        assert_eq!(record.cpu_logical_cores, 8);
        assert_eq!(digest::verify(&record), DigestStatus::Valid);
    }

    #[test]
    fn test_unchanged_content_keeps_snapshot_version() {
        let f = fixture();

        f.writer
            .write(TIMEOUT, |record| {
                record.memory_total_mb = 32_768;
                Ok(())
            })
            .unwrap();
        let outcome = f
            .writer
            .write(TIMEOUT, |record| {
                record.memory_total_mb = 32_768;
                Ok(())
            })
            .unwrap();

        assert!(!outcome.changed);
        assert_eq!(outcome.snapshot_version, 1);
        assert_eq!(outcome.write_sequence, 4);
    }

    #[test]
    fn test_header_writes_from_mutator_are_discarded() {
        let f = fixture();

        let outcome = f
            .writer
            .write(TIMEOUT, |record| {
                record.write_sequence = 99;
                record.snapshot_version = 1234;
                record.abi_version = 1;
                Ok(())
            })
            .unwrap();

        let record = f.writer.region().snapshot();
        assert_eq!(record.write_sequence, outcome.write_sequence);
        assert_eq!(record.abi_version, ABI_VERSION);
        assert_eq!(record.snapshot_version, 0, "Header edits are not content");
    }

    #[test]
    fn test_failed_mutation_restores_sequence_and_content() {
        let f = fixture();
        f.writer
            .write(TIMEOUT, |record| {
                record.cpu_logical_cores = 4;
                Ok(())
            })
            .unwrap();

        let err = f
            .writer
            .write(TIMEOUT, |record| {
                record.cpu_logical_cores = 64;
                anyhow::bail!("sensor read failed")
            })
            .unwrap_err();
        assert!(matches!(err, BridgeError::MutationFailed(ref m) if m.contains("sensor read failed")));

        let record = f.writer.region().snapshot();
        assert_eq!(record.write_sequence, 4);
        assert_eq!(record.cpu_logical_cores, 4);
        assert_eq!(digest::verify(&record), DigestStatus::Valid);

        // Lock was released.
        f.writer.write(TIMEOUT, |_| Ok(())).unwrap();
    }

    #[test]
    fn test_dropped_guard_releases_lock() {
        let f = fixture();

        let guard = f.writer.begin_write(TIMEOUT).unwrap();
        assert_eq!(guard.sequence(), 1);
        assert_eq!(f.writer.region().header().write_sequence.load(Ordering::Acquire), 1);
        drop(guard);

        assert_eq!(f.writer.region().header().write_sequence.load(Ordering::Acquire), 2);
        assert!(f.writer.begin_write(TIMEOUT).is_ok());
    }

    #[test]
    fn test_lock_timeout_when_held() {
        let f = fixture();

        let _held = f.writer.begin_write(TIMEOUT).unwrap();
        let err = f
            .writer
            .begin_write(Duration::from_millis(20))
            .err()
            .expect("second writer must time out");
        assert!(matches!(err, BridgeError::LockTimeout(_)));
    }

    #[test]
    fn test_odd_sequence_recovers_and_flags_stall() {
        let f = fixture();
        f.writer.region().header().write_sequence.store(7, Ordering::Release);

        let outcome = f.writer.write(TIMEOUT, |_| Ok(())).unwrap();
        assert_eq!(outcome.write_sequence, 10, "7 skips to 9, then publishes 10");
        assert!(outcome.flags.contains(StatusFlags::SEQUENCE_STALLED));

        let outcome = f.writer.write(TIMEOUT, |_| Ok(())).unwrap();
        assert_eq!(outcome.write_sequence, 12);
        assert!(!outcome.flags.contains(StatusFlags::SEQUENCE_STALLED));
        assert!(outcome.changed, "Clearing the flag changes content");
    }

    #[test]
    fn test_corrupted_digest_is_flagged_on_next_write() {
        let f = fixture();
        f.writer.write(TIMEOUT, |_| Ok(())).unwrap();

        let mut tampered = f.writer.region().snapshot();
        tampered.memory_used_mb = 1;
        f.writer.region().store(&tampered);

        let outcome = f.writer.write(TIMEOUT, |_| Ok(())).unwrap();
        assert!(outcome.flags.contains(StatusFlags::HASH_MISMATCH));
        assert_eq!(
            digest::verify(&f.writer.region().snapshot()),
            DigestStatus::Valid,
            "The new write is sealed again"
        );
    }

    #[test]
    fn test_disabled_digest_publishes_zeros() {
        let f = fixture();
        let writer = SnapshotWriter::new(Arc::clone(f.writer.region()), &f.lock_path)
            .unwrap()
            .with_digest(false);

        writer.write(TIMEOUT, |_| Ok(())).unwrap();
        assert_eq!(
            digest::verify(&writer.region().snapshot()),
            DigestStatus::Unverifiable
        );
    }

    #[test]
    fn test_lock_timeout_against_other_writer() {
        let f = fixture();
        let other = SnapshotWriter::new(Arc::clone(f.writer.region()), &f.lock_path).unwrap();

        let _held = f.writer.begin_write(TIMEOUT).unwrap();
        let err = other.write(Duration::from_millis(20), |_| Ok(())).unwrap_err();
        assert!(matches!(err, BridgeError::LockTimeout(_)));
    }

    #[test]
    fn test_writer_that_vanished_mid_write_does_not_wedge_the_lock() {
        let f = fixture();
        let region = Arc::clone(f.writer.region());
        let Fixture { _dir, lock_path, writer } = f;

        let guard = writer.begin_write(TIMEOUT).unwrap();
        assert_eq!(guard.sequence(), 1);
        // Neither Drop runs; closing the writer's descriptor is all a dead
        // process leaves behind.
        std::mem::forget(guard);
        drop(writer);
        assert_eq!(region.header().write_sequence.load(Ordering::Acquire), 1);

        let restarted = SnapshotWriter::new(Arc::clone(&region), &lock_path).unwrap();
        let guard = restarted.begin_write(Duration::from_millis(200)).unwrap();
        assert_eq!(guard.sequence(), 3, "Odd sequence is skipped by two");

        let outcome = guard
            .commit(|record| {
                record.cpu_logical_cores = 2;
                Ok(())
            })
            .unwrap();
        assert_eq!(outcome.write_sequence, 4);
        assert!(outcome.flags.contains(StatusFlags::SEQUENCE_STALLED));
        assert_eq!(digest::verify(&region.snapshot()), DigestStatus::Valid);
    }

    #[test]
    fn test_failed_write_after_corruption_still_reports_mismatch() {
        let f = fixture();
        f.writer
            .write(TIMEOUT, |record| {
                record.memory_used_mb = 127;
                Ok(())
            })
            .unwrap();
        let version = f.writer.region().snapshot().snapshot_version;

        let mut tampered = f.writer.region().snapshot();
        tampered.memory_total_mb = 1;
        f.writer.region().store(&tampered);
        assert_eq!(digest::verify(&tampered), DigestStatus::Mismatch);

        let err = f
            .writer
            .write(TIMEOUT, |_| anyhow::bail!("collector gave up"))
            .unwrap_err();
        assert!(matches!(err, BridgeError::MutationFailed(_)));

        let record = f.writer.region().snapshot();
        assert_eq!(record.write_sequence, 4);
        assert!(
            record.status_flags().contains(StatusFlags::HASH_MISMATCH),
            "Corruption found by begin_write must stay visible"
        );
        assert_eq!(record.memory_used_mb, 127);
        assert_eq!(record.snapshot_version, version + 1, "Flag change is a content change");
        assert_eq!(digest::verify(&record), DigestStatus::Valid);
    }

    #[test]
    fn test_abandoned_write_after_stall_publishes_stall_flag() {
        let f = fixture();
        f.writer.region().header().write_sequence.store(5, Ordering::Release);

        drop(f.writer.begin_write(TIMEOUT).unwrap());

        let record = f.writer.region().snapshot();
        assert_eq!(record.write_sequence, 8);
        assert!(record.status_flags().contains(StatusFlags::SEQUENCE_STALLED));
    }
}

//! SHA-256 integrity digest over the record.
//!
//! The digest covers every byte before it, header words included, so it is
//! only meaningful for a copy taken while `write_sequence` was even. An
//! all-zero digest means the writer published without one.

use record::{DIGEST_LEN, SnapshotRecord};
use sha2::{Digest, Sha256};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DigestStatus {
    Valid,
    Mismatch,
    /// The digest field is all zeros.
    Unverifiable,
}

pub fn compute(record: &SnapshotRecord) -> [u8; DIGEST_LEN] {
    Sha256::digest(record.digest_input()).into()
}

pub fn recompute(record: &mut SnapshotRecord) {
    record.digest = compute(record);
}

pub fn clear(record: &mut SnapshotRecord) {
    record.digest = [0; DIGEST_LEN];
}

pub fn verify(record: &SnapshotRecord) -> DigestStatus {
    if record.digest == [0; DIGEST_LEN] {
        DigestStatus::Unverifiable
    } else if compute(record) == record.digest {
        DigestStatus::Valid
    } else {
        DigestStatus::Mismatch
    }
}

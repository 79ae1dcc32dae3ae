use record::{HEADER_LEN, SnapshotRecord};
use std::mem::offset_of;
use std::sync::atomic::AtomicU32;

/// Atomic view over the first [`HEADER_LEN`] bytes of a mapped record.
///
/// Writer protocol:
/// 1. Store an odd `write_sequence`, then a `Release` fence
/// 2. Copy the record body
/// 3. Store the next even `write_sequence` with `Release`
///
/// Reader protocol:
/// 1. Load `write_sequence` with `Acquire`; retry while odd
/// 2. Copy the record body, then an `Acquire` fence
/// 3. Reload `write_sequence`; the copy is consistent only if unchanged
///
/// `#[repr(C, align(8))]` matches the record, whose mapping is page aligned.
#[repr(C, align(8))]
pub struct SeqlockHeader {
    pub abi_version: AtomicU32,
    pub write_sequence: AtomicU32,
    pub snapshot_version: AtomicU32,
    pub reserved: AtomicU32,
}

impl SeqlockHeader {
    pub const SIZE: usize = std::mem::size_of::<Self>();

    /// # Safety
    /// `ptr` must be 8-byte aligned and valid for [`SeqlockHeader::SIZE`]
    /// bytes for the lifetime `'a`.
    pub(crate) unsafe fn from_ptr<'a>(ptr: *const u8) -> &'a Self {
        unsafe { &*(ptr as *const Self) }
    }
}

const _: () = assert!(SeqlockHeader::SIZE == HEADER_LEN);
const _: () = assert!(
    offset_of!(SeqlockHeader, write_sequence) == offset_of!(SnapshotRecord, write_sequence)
);
const _: () = assert!(
    offset_of!(SeqlockHeader, snapshot_version) == offset_of!(SnapshotRecord, snapshot_version)
);

pub mod errors;
pub mod flags;
pub mod layout;
pub mod offsets;
pub mod text;

pub use errors::RecordError;
pub use flags::StatusFlags;
pub use layout::*;

/// Copy a record out of raw bytes, refusing layouts this build doesn't know.
pub fn decode(bytes: &[u8]) -> Result<SnapshotRecord, RecordError> {
    if bytes.len() < RECORD_SIZE {
        return Err(RecordError::Truncated {
            expected: RECORD_SIZE,
            actual: bytes.len(),
        });
    }

    let record: SnapshotRecord = bytemuck::pod_read_unaligned(&bytes[..RECORD_SIZE]);
    if record.abi_version != ABI_VERSION {
        return Err(RecordError::UnknownAbi(record.abi_version));
    }
    Ok(record)
}

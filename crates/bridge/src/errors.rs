use crate::lock::LockError;
use record::RecordError;
use std::io;
use std::path::PathBuf;
use std::time::Duration;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum BridgeError {
    #[error("IO error: {0}")]
    IoError(#[from] io::Error),

    #[error("Failed to map region: {0}")]
    MapFailed(#[source] io::Error),

    #[error("Cannot set permissions on {path}: {source}")]
    Permissions {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("Region size mismatch: expected {expected} bytes, found {actual}")]
    SizeMismatch { expected: usize, actual: usize },

    #[error("No region tier could be opened: {0}")]
    RegionUnavailable(String),

    #[error("No data available yet")]
    NoDataAvailable,

    #[error("Snapshot not ready after retries")]
    NotReady,

    #[error("Unknown record ABI {0:#010x}")]
    UnknownAbi(u32),

    #[error("Writer lock error: {0}")]
    Lock(#[from] LockError),

    #[error("Timed out after {0:?} waiting for the snapshot lock")]
    LockTimeout(Duration),

    #[error("Snapshot mutation failed: {0}")]
    MutationFailed(String),
}

impl From<RecordError> for BridgeError {
    fn from(err: RecordError) -> Self {
        match err {
            // A region nobody has published into yet.
            RecordError::UnknownAbi(0) => BridgeError::NoDataAvailable,
            RecordError::UnknownAbi(abi) => BridgeError::UnknownAbi(abi),
            RecordError::Truncated { expected, actual } => BridgeError::SizeMismatch { expected, actual },
        }
    }
}

impl BridgeError {
    /// The OS error code behind this failure, when there is one.
    pub fn raw_os_error(&self) -> Option<i32> {
        match self {
            BridgeError::IoError(e) | BridgeError::MapFailed(e) => e.raw_os_error(),
            BridgeError::Permissions { source, .. } => source.raw_os_error(),
            BridgeError::Lock(LockError::Os(errno)) => Some(*errno as i32),
            BridgeError::Lock(LockError::Open { source, .. }) => source.raw_os_error(),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display_formatting() {
        let io_err = io::Error::new(io::ErrorKind::NotFound, "file not found");
        assert_eq!(
            BridgeError::IoError(io_err).to_string(),
            "IO error: file not found",
            "IoError should display with 'IO error:' prefix"
        );

        let err = BridgeError::SizeMismatch {
            expected: 3768,
            actual: 4096,
        };
        assert_eq!(
            err.to_string(),
            "Region size mismatch: expected 3768 bytes, found 4096"
        );

        assert_eq!(
            BridgeError::UnknownAbi(0x0001_0000).to_string(),
            "Unknown record ABI 0x00010000"
        );

        assert_eq!(
            BridgeError::LockTimeout(Duration::from_millis(5)).to_string(),
            "Timed out after 5ms waiting for the snapshot lock"
        );

        assert_eq!(
            BridgeError::MutationFailed("bad sample".to_string()).to_string(),
            "Snapshot mutation failed: bad sample"
        );
    }

    #[test]
    fn test_error_conversion_from_io_error() {
        fn returns_io_error() -> Result<(), io::Error> {
            Err(io::Error::from_raw_os_error(libc::EACCES))
        }

        fn uses_question_mark() -> Result<(), BridgeError> {
            returns_io_error()?;
            Ok(())
        }

        let err = uses_question_mark().unwrap_err();
        assert!(matches!(err, BridgeError::IoError(_)));
        assert_eq!(err.raw_os_error(), Some(libc::EACCES));
    }

    #[test]
    fn test_record_errors_map_to_reader_errors() {
        assert!(matches!(
            BridgeError::from(RecordError::UnknownAbi(0)),
            BridgeError::NoDataAvailable
        ));
        assert!(matches!(
            BridgeError::from(RecordError::UnknownAbi(0x0001_0014)),
            BridgeError::UnknownAbi(0x0001_0014)
        ));
        assert!(matches!(
            BridgeError::from(RecordError::Truncated {
                expected: 3768,
                actual: 16
            }),
            BridgeError::SizeMismatch {
                expected: 3768,
                actual: 16
            }
        ));
    }

    #[test]
    fn test_raw_os_error_absent_for_logical_failures() {
        assert_eq!(BridgeError::NotReady.raw_os_error(), None);
        assert_eq!(
            BridgeError::Lock(LockError::Timeout).raw_os_error(),
            None
        );
    }
}

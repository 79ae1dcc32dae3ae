use std::io;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum DiagnosticsError {
    #[error("IO error: {0}")]
    IoError(#[from] io::Error),

    #[error("JSON encoding failed: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Frame of {0} bytes exceeds the limit")]
    FrameTooLarge(usize),
}

//! Local diagnostics channel: one JSON frame per second describing the
//! published record, its layout and the recent log lines.

pub mod errors;
pub mod frame;
pub mod server;

pub use errors::DiagnosticsError;
pub use frame::{DiagnosticsFrame, read_frame, write_frame};
pub use server::{DiagnosticsConfig, DiagnosticsHandle, DiagnosticsServer};

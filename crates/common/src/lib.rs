pub mod config;
pub mod log_ring;
pub mod logging;
pub mod wait;

pub use config::Environment;
pub use log_ring::{LogRing, LogRingLayer};
pub use logging::setup_logging;
pub use wait::sleep_unless_stopped;

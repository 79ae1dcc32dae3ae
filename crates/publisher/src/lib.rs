pub mod collectors;
pub mod config;
pub mod projection;
pub mod publisher;
pub mod sample;

pub use collectors::{Collector, CollectorKind, collect_all, default_collectors};
pub use config::PublisherConfig;
pub use publisher::Publisher;
pub use sample::{BoardInfo, DiskHealth, SystemSample, TemperatureReading};

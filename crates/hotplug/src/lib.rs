//! Removable-volume watcher.
//!
//! A background thread polls a [`VolumeSource`], feeds the result to a
//! [`DeviceTracker`] and reports each state transition to an observer.

pub mod device;
pub mod source;
pub mod tracker;
pub mod watcher;

pub use device::{DeviceEvent, TrackedDevice, VolumeInfo, VolumeState};
pub use source::{SysinfoVolumes, VolumeSource, has_update_marker};
pub use tracker::DeviceTracker;
pub use watcher::{HotplugWatcher, WatcherConfig};

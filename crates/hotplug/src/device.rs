use std::path::PathBuf;
use std::time::SystemTime;

/// Lifecycle of a removable volume. Values match the record's `state` byte.
#[repr(u8)]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VolumeState {
    Removed = 0,
    Inserted = 1,
    UpdateReady = 2,
}

impl VolumeState {
    pub fn from_u8(value: u8) -> Option<Self> {
        match value {
            0 => Some(VolumeState::Removed),
            1 => Some(VolumeState::Inserted),
            2 => Some(VolumeState::UpdateReady),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            VolumeState::Removed => "removed",
            VolumeState::Inserted => "inserted",
            VolumeState::UpdateReady => "update_ready",
        }
    }
}

/// One mounted removable volume as reported by a source.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VolumeInfo {
    pub mount_point: PathBuf,
    pub label: String,
    pub total_bytes: u64,
    pub free_bytes: u64,
}

/// A volume the tracker knows about.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TrackedDevice {
    pub drive_path: PathBuf,
    pub label: String,
    pub total_bytes: u64,
    pub free_bytes: u64,
    pub state: VolumeState,
    pub update_ready: bool,
    pub last_update: SystemTime,
}

impl TrackedDevice {
    pub fn last_update_unix(&self) -> i64 {
        self.last_update
            .duration_since(SystemTime::UNIX_EPOCH)
            .map(|d| d.as_secs() as i64)
            .unwrap_or(0)
    }
}

/// A state transition, carrying the device as it looked after it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeviceEvent {
    pub device: TrackedDevice,
    pub previous: Option<VolumeState>,
}

impl DeviceEvent {
    pub fn state(&self) -> VolumeState {
        self.device.state
    }
}

use crate::device::{DeviceEvent, TrackedDevice, VolumeInfo, VolumeState};
use crate::source::has_update_marker;
use std::collections::{BTreeMap, HashSet};
use std::path::{Path, PathBuf};
use std::time::SystemTime;

/// Pure state machine over successive volume listings.
///
/// Transitions per mount point:
/// - unseen → `Inserted`, then `UpdateReady` in the same poll if the marker
///   is present
/// - `Inserted` → `UpdateReady` once the marker appears
/// - any → `Removed` when the volume is no longer listed; the device is
///   then forgotten
///
/// An `UpdateReady` volume stays so while mounted even if the marker goes.
pub struct DeviceTracker {
    devices: BTreeMap<PathBuf, TrackedDevice>,
    marker: String,
}

impl DeviceTracker {
    pub fn new(marker: impl Into<String>) -> Self {
        Self {
            devices: BTreeMap::new(),
            marker: marker.into(),
        }
    }

    /// Fold one listing into the tracked set, probing the filesystem for
    /// the update marker.
    pub fn apply(&mut self, volumes: &[VolumeInfo], now: SystemTime) -> Vec<DeviceEvent> {
        let marker = self.marker.clone();
        self.apply_with(volumes, now, |root| has_update_marker(root, &marker))
    }

    pub(crate) fn apply_with<P>(
        &mut self,
        volumes: &[VolumeInfo],
        now: SystemTime,
        probe: P,
    ) -> Vec<DeviceEvent>
    where
        P: Fn(&Path) -> bool,
    {
        let mut events = Vec::new();
        let mut seen = HashSet::new();

        for volume in volumes {
            if !seen.insert(volume.mount_point.clone()) {
                continue;
            }

            match self.devices.get_mut(&volume.mount_point) {
                Some(device) => {
                    device.label.clone_from(&volume.label);
                    device.total_bytes = volume.total_bytes;
                    device.free_bytes = volume.free_bytes;

                    if device.state == VolumeState::Inserted && probe(&volume.mount_point) {
                        events.push(promote(device, now));
                    }
                }
                None => {
                    let mut device = TrackedDevice {
                        drive_path: volume.mount_point.clone(),
                        label: volume.label.clone(),
                        total_bytes: volume.total_bytes,
                        free_bytes: volume.free_bytes,
                        state: VolumeState::Inserted,
                        update_ready: false,
                        last_update: now,
                    };
                    tracing::info!(path = %device.drive_path.display(), label = %device.label, "Removable volume inserted");
                    events.push(DeviceEvent {
                        device: device.clone(),
                        previous: None,
                    });

                    if probe(&volume.mount_point) {
                        events.push(promote(&mut device, now));
                    }
                    self.devices.insert(volume.mount_point.clone(), device);
                }
            }
        }

        let gone: Vec<PathBuf> = self
            .devices
            .keys()
            .filter(|path| !seen.contains(*path))
            .cloned()
            .collect();
        for path in gone {
            if let Some(mut device) = self.devices.remove(&path) {
                let previous = device.state;
                device.state = VolumeState::Removed;
                device.last_update = now;
                tracing::info!(path = %path.display(), label = %device.label, "Removable volume removed");
                events.push(DeviceEvent {
                    device,
                    previous: Some(previous),
                });
            }
        }

        events
    }

    /// Currently mounted devices, ordered by path.
    pub fn devices(&self) -> Vec<TrackedDevice> {
        self.devices.values().cloned().collect()
    }

    pub fn len(&self) -> usize {
        self.devices.len()
    }

    pub fn is_empty(&self) -> bool {
        self.devices.is_empty()
    }
}

fn promote(device: &mut TrackedDevice, now: SystemTime) -> DeviceEvent {
    let previous = device.state;
    device.state = VolumeState::UpdateReady;
    device.update_ready = true;
    device.last_update = now;
    tracing::info!(path = %device.drive_path.display(), "Update volume detected");
    DeviceEvent {
        device: device.clone(),
        previous: Some(previous),
    }
}

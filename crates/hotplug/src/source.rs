use crate::device::VolumeInfo;
use std::fs;
use std::path::Path;
use sysinfo::Disks;

/// Enumerates mounted removable volumes.
pub trait VolumeSource: Send {
    fn removable_volumes(&mut self) -> anyhow::Result<Vec<VolumeInfo>>;
}

/// [`VolumeSource`] over `sysinfo`'s disk list, keeping removable disks only.
pub struct SysinfoVolumes {
    disks: Disks,
}

impl SysinfoVolumes {
    pub fn new() -> Self {
        Self {
            disks: Disks::new_with_refreshed_list(),
        }
    }
}

impl Default for SysinfoVolumes {
    fn default() -> Self {
        Self::new()
    }
}

impl VolumeSource for SysinfoVolumes {
    fn removable_volumes(&mut self) -> anyhow::Result<Vec<VolumeInfo>> {
        // Full refresh: volumes come and go between polls.
        self.disks.refresh(true);

        Ok(self
            .disks
            .list()
            .iter()
            .filter(|disk| disk.is_removable())
            .map(|disk| VolumeInfo {
                mount_point: disk.mount_point().to_path_buf(),
                label: disk.name().to_string_lossy().into_owned(),
                total_bytes: disk.total_space(),
                free_bytes: disk.available_space(),
            })
            .collect())
    }
}

/// True if `<root>/<marker>` is a directory with at least one entry.
pub fn has_update_marker(root: &Path, marker: &str) -> bool {
    match fs::read_dir(root.join(marker)) {
        Ok(mut entries) => entries.next().is_some(),
        Err(_) => false,
    }
}

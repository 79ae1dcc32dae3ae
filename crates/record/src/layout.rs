//! Binary layout of the shared snapshot record.
//!
//! The record is plain old data with natural alignment and every padding
//! byte declared as a named field. `bytemuck::Pod` refuses to derive for a
//! type with implicit padding, so the absence of compiler padding is checked
//! at build time; the `const` assertions below pin the total size and the
//! position of the digest so that a layout change cannot slip in without an
//! ABI bump.

use bytemuck::{Pod, Zeroable};
use std::mem::{offset_of, size_of};

/// Layout revision tag stored in the first word of the record.
/// Any change to this file that moves a byte requires a new value.
pub const ABI_VERSION: u32 = 0x0002_0001;

pub const MAX_TEMP_SENSORS: usize = 32;
pub const MAX_SMART_DISKS: usize = 16;
pub const MAX_USB_DEVICES: usize = 8;

pub const RECORD_SIZE: usize = 3768;
pub const DIGEST_LEN: usize = 32;
/// Bytes `[0, DIGEST_OFFSET)` are covered by the digest.
pub const DIGEST_OFFSET: usize = RECORD_SIZE - DIGEST_LEN;

/// Sentinel for signed scalar fields that could not be sampled.
pub const UNAVAILABLE: i16 = -1;

/// Sensor flag: the value was sampled and is within range.
pub const SENSOR_VALID: u8 = 0x01;

#[repr(C)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Pod, Zeroable)]
pub struct TemperatureSensor {
    pub name: [u8; 32],
    /// Degrees Celsius times ten, `-1` when unavailable.
    pub value_c_x10: i16,
    /// bit0 = valid
    pub flags: u8,
    pub _pad: u8,
}

#[repr(C)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Pod, Zeroable)]
pub struct SmartDiskScore {
    pub disk_id: [u8; 32],
    /// 0-100, `-1` when unavailable.
    pub score: i16,
    /// 0-100, `-1` when unavailable.
    pub wear_percent: i16,
    pub hours_on: i32,
    pub reallocated: u16,
    pub pending: u16,
    pub uncorrectable: u16,
    pub temperature_c: i16,
    /// bit0 = reallocated count grew, bit1 = wear jumped
    pub recent_growth_flags: u8,
    pub _pad: [u8; 3],
}

#[repr(C)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Pod, Zeroable)]
pub struct UsbDeviceSlot {
    pub drive_path: [u8; 64],
    pub volume_label: [u8; 32],
    pub total_bytes: u64,
    pub free_bytes: u64,
    pub last_update_unix: i64,
    pub is_update_ready: u8,
    /// 0 = removed, 1 = inserted, 2 = update ready
    pub state: u8,
    pub _pad: [u8; 6],
}

/// The fixed-size record shared between the writer and every reader.
///
/// Field order and widths are part of the ABI identified by [`ABI_VERSION`].
/// The four header words are owned by the write synchronizer; everything
/// between the header and [`SnapshotRecord::digest`] is content.
#[repr(C)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Pod, Zeroable)]
pub struct SnapshotRecord {
    pub abi_version: u32,
    /// Odd while a write is in progress.
    pub write_sequence: u32,
    /// Bumped once per write that changed content.
    pub snapshot_version: u32,
    pub reserved_header: u32,

    pub cpu_logical_cores: u16,
    pub cpu_usage_percent_x10: i16,
    pub _pad0: [u8; 4],
    pub memory_total_mb: u64,
    pub memory_used_mb: u64,

    pub temp_sensors: [TemperatureSensor; MAX_TEMP_SENSORS],
    pub temp_sensor_count: u16,
    pub smart_disk_count: u8,
    pub usb_device_count: u8,
    pub smart_disks: [SmartDiskScore; MAX_SMART_DISKS],

    pub baseboard_manufacturer: [u8; 128],
    pub baseboard_product: [u8; 64],
    pub baseboard_version: [u8; 64],
    pub baseboard_serial: [u8; 64],
    pub bios_vendor: [u8; 64],
    pub bios_version: [u8; 64],
    pub bios_date: [u8; 32],
    /// 0 = off, 1 = on, 0xFF = unknown
    pub secure_boot_enabled: u8,
    pub tpm_present: u8,
    pub memory_slots_total: u16,
    pub memory_slots_used: u16,
    pub _pad1: [u8; 6],

    pub usb_devices: [UsbDeviceSlot; MAX_USB_DEVICES],

    /// Byte 0 carries [`crate::StatusFlags`]; the rest is zero.
    pub future_reserved: [u8; 64],
    pub extension_pad: [u8; 128],
    /// SHA-256 over `[0, DIGEST_OFFSET)`; all zeros means unverifiable.
    pub digest: [u8; DIGEST_LEN],
}

const _: () = assert!(size_of::<TemperatureSensor>() == 36);
const _: () = assert!(size_of::<SmartDiskScore>() == 52);
const _: () = assert!(size_of::<UsbDeviceSlot>() == 128);
const _: () = assert!(size_of::<SnapshotRecord>() == RECORD_SIZE);
const _: () = assert!(offset_of!(SnapshotRecord, digest) == DIGEST_OFFSET);
const _: () = assert!(offset_of!(SnapshotRecord, write_sequence) == 4);

/// Header words the synchronizer rewrites after every mutation.
pub const HEADER_LEN: usize = 16;

impl SnapshotRecord {
    pub const SIZE: usize = size_of::<Self>();

    /// An all-zero record, the state of a freshly created region.
    pub fn zeroed() -> Self {
        Zeroable::zeroed()
    }

    /// A zeroed record stamped with the current ABI and `-1` sentinels.
    pub fn empty() -> Self {
        let mut record = Self::zeroed();
        record.abi_version = ABI_VERSION;
        record.cpu_usage_percent_x10 = UNAVAILABLE;
        record.secure_boot_enabled = 0xFF;
        record
    }

    pub fn as_bytes(&self) -> &[u8] {
        bytemuck::bytes_of(self)
    }

    /// The bytes covered by the digest.
    pub fn digest_input(&self) -> &[u8] {
        &self.as_bytes()[..DIGEST_OFFSET]
    }

    /// Everything between the header and the digest.
    pub fn content(&self) -> &[u8] {
        &self.as_bytes()[HEADER_LEN..DIGEST_OFFSET]
    }

    pub fn temp_sensors(&self) -> &[TemperatureSensor] {
        let count = (self.temp_sensor_count as usize).min(MAX_TEMP_SENSORS);
        &self.temp_sensors[..count]
    }

    pub fn smart_disks(&self) -> &[SmartDiskScore] {
        let count = (self.smart_disk_count as usize).min(MAX_SMART_DISKS);
        &self.smart_disks[..count]
    }

    pub fn usb_devices(&self) -> &[UsbDeviceSlot] {
        let count = (self.usb_device_count as usize).min(MAX_USB_DEVICES);
        &self.usb_devices[..count]
    }

    pub fn status_flags(&self) -> crate::StatusFlags {
        crate::StatusFlags::from_bits_truncate(self.future_reserved[0])
    }

    pub fn set_status_flags(&mut self, flags: crate::StatusFlags) {
        self.future_reserved[0] = flags.bits();
    }
}

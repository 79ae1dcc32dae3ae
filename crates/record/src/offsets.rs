//! Self-describing offset table for tools that locate fields without
//! compiling against [`SnapshotRecord`].

use crate::SnapshotRecord;
use std::mem::offset_of;

/// `(name, byte offset)` pairs for the key sub-structures, in layout order.
pub const OFFSETS: [(&str, usize); 9] = [
    ("tempSensors", offset_of!(SnapshotRecord, temp_sensors)),
    ("tempSensorCount", offset_of!(SnapshotRecord, temp_sensor_count)),
    ("smartDiskCount", offset_of!(SnapshotRecord, smart_disk_count)),
    ("usbDeviceCount", offset_of!(SnapshotRecord, usb_device_count)),
    ("smartDisks", offset_of!(SnapshotRecord, smart_disks)),
    ("usbDevices", offset_of!(SnapshotRecord, usb_devices)),
    ("futureReserved", offset_of!(SnapshotRecord, future_reserved)),
    ("extensionPad", offset_of!(SnapshotRecord, extension_pad)),
    ("digest", offset_of!(SnapshotRecord, digest)),
];

//! Mapping of a [`SystemSample`] and the watcher's device list onto the
//! record's fixed fields.
//!
//! Every content field is rewritten on each cycle, so entries that vanished
//! since the previous cycle do not linger. Arrays are truncated to their
//! capacity, keeping the first entries in order.

use crate::sample::{DiskHealth, SystemSample, TemperatureReading};
use bytemuck::Zeroable;
use hotplug::TrackedDevice;
use record::text::write_fixed;
use record::{
    MAX_SMART_DISKS, MAX_TEMP_SENSORS, MAX_USB_DEVICES, SENSOR_VALID, SmartDiskScore,
    SnapshotRecord, StatusFlags, TemperatureSensor, UNAVAILABLE, UsbDeviceSlot,
};

const MIN_PLAUSIBLE_C: f32 = -50.0;
const MAX_PLAUSIBLE_C: f32 = 150.0;

/// Percent times ten; out of `[0, 100]` or non-finite becomes the sentinel.
pub fn cpu_percent_x10(percent: Option<f32>) -> i16 {
    match percent {
        Some(p) if p.is_finite() && (0.0..=100.0).contains(&p) => (p * 10.0).round() as i16,
        _ => UNAVAILABLE,
    }
}

/// Degrees times ten and the sensor flags byte.
pub fn temperature_x10(celsius: Option<f32>) -> (i16, u8) {
    match celsius {
        Some(c) if c.is_finite() && (MIN_PLAUSIBLE_C..=MAX_PLAUSIBLE_C).contains(&c) => {
            ((c * 10.0).round() as i16, SENSOR_VALID)
        }
        _ => (UNAVAILABLE, 0),
    }
}

/// A 0-100 score, or the sentinel.
pub fn percent_or_unavailable(value: Option<i32>) -> i16 {
    match value {
        Some(v) if (0..=100).contains(&v) => v as i16,
        _ => UNAVAILABLE,
    }
}

pub fn project(sample: &SystemSample, devices: &[TrackedDevice], record: &mut SnapshotRecord) {
    record.cpu_logical_cores = sample.cpu_logical_cores.unwrap_or(0);
    record.cpu_usage_percent_x10 = cpu_percent_x10(sample.cpu_usage_percent);
    record.memory_total_mb = sample.memory_total_mb.unwrap_or(0);
    record.memory_used_mb = sample.memory_used_mb.unwrap_or(0);
    record.memory_slots_total = sample.memory_slots_total.unwrap_or(0);
    record.memory_slots_used = sample.memory_slots_used.unwrap_or(0);

    project_temperatures(&sample.temperatures, record);
    project_disks(&sample.disks, record);
    project_board(sample, record);
    project_devices(devices, record);

    let mut flags = record.status_flags();
    flags.set(StatusFlags::DEGRADED, sample.degraded);
    record.set_status_flags(flags);
}

fn project_temperatures(readings: &[TemperatureReading], record: &mut SnapshotRecord) {
    if readings.len() > MAX_TEMP_SENSORS {
        tracing::debug!(
            reported = readings.len(),
            kept = MAX_TEMP_SENSORS,
            "Temperature sensors truncated"
        );
    }

    record.temp_sensors = [TemperatureSensor::zeroed(); MAX_TEMP_SENSORS];
    let kept = readings.len().min(MAX_TEMP_SENSORS);
    for (slot, reading) in record.temp_sensors.iter_mut().zip(&readings[..kept]) {
        write_fixed(&mut slot.name, &reading.name);
        let (value, flags) = temperature_x10(reading.celsius);
        slot.value_c_x10 = value;
        slot.flags = flags;
    }
    record.temp_sensor_count = kept as u16;
}

fn project_disks(disks: &[DiskHealth], record: &mut SnapshotRecord) {
    record.smart_disks = [SmartDiskScore::zeroed(); MAX_SMART_DISKS];
    let kept = disks.len().min(MAX_SMART_DISKS);
    for (slot, disk) in record.smart_disks.iter_mut().zip(&disks[..kept]) {
        write_fixed(&mut slot.disk_id, &disk.id);
        slot.score = percent_or_unavailable(disk.score);
        slot.wear_percent = percent_or_unavailable(disk.wear_percent);
        slot.hours_on = i32::try_from(disk.hours_on).unwrap_or(i32::MAX);
        slot.reallocated = disk.reallocated;
        slot.pending = disk.pending;
        slot.uncorrectable = disk.uncorrectable;
        slot.temperature_c = disk.temperature_c.unwrap_or(UNAVAILABLE);
        slot.recent_growth_flags = u8::from(disk.reallocated_grew) | (u8::from(disk.wear_jumped) << 1);
    }
    record.smart_disk_count = kept as u8;
}

fn project_board(sample: &SystemSample, record: &mut SnapshotRecord) {
    let board = &sample.board;
    write_fixed(&mut record.baseboard_manufacturer, &board.manufacturer);
    write_fixed(&mut record.baseboard_product, &board.product);
    write_fixed(&mut record.baseboard_version, &board.version);
    write_fixed(&mut record.baseboard_serial, &board.serial);
    write_fixed(&mut record.bios_vendor, &board.bios_vendor);
    write_fixed(&mut record.bios_version, &board.bios_version);
    write_fixed(&mut record.bios_date, &board.bios_date);

    record.secure_boot_enabled = match sample.secure_boot {
        Some(true) => 1,
        Some(false) => 0,
        None => 0xFF,
    };
    record.tpm_present = u8::from(sample.tpm_present.unwrap_or(false));
}

fn project_devices(devices: &[TrackedDevice], record: &mut SnapshotRecord) {
    record.usb_devices = [UsbDeviceSlot::zeroed(); MAX_USB_DEVICES];
    let kept = devices.len().min(MAX_USB_DEVICES);
    for (slot, device) in record.usb_devices.iter_mut().zip(&devices[..kept]) {
        write_fixed(&mut slot.drive_path, &device.drive_path.to_string_lossy());
        write_fixed(&mut slot.volume_label, &device.label);
        slot.total_bytes = device.total_bytes;
        slot.free_bytes = device.free_bytes;
        slot.last_update_unix = device.last_update_unix();
        slot.is_update_ready = u8::from(device.update_ready);
        slot.state = device.state as u8;
    }
    record.usb_device_count = kept as u8;
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sample::BoardInfo;
    use hotplug::VolumeState;
    use record::text::read_fixed;
    use std::path::PathBuf;
    use std::time::{Duration, SystemTime};

    fn reading(i: usize) -> TemperatureReading {
        TemperatureReading {
            name: format!("sensor{i}"),
            celsius: Some(40.0 + i as f32 / 10.0),
        }
    }

    fn device(i: usize) -> TrackedDevice {
        TrackedDevice {
            drive_path: PathBuf::from(format!("/media/usb{i}")),
            label: format!("DISK{i}"),
            total_bytes: 1 << 34,
            free_bytes: 1 << 33,
            state: VolumeState::Inserted,
            update_ready: false,
            last_update: SystemTime::UNIX_EPOCH + Duration::from_secs(1_000),
        }
    }

    #[test]
    fn test_temperature_array_truncates_in_order() {
        let sample = SystemSample {
            temperatures: (0..33).map(reading).collect(),
            ..SystemSample::default()
        };
        let mut record = SnapshotRecord::empty();
        project(&sample, &[], &mut record);

        assert_eq!(record.temp_sensor_count as usize, MAX_TEMP_SENSORS);
        for (i, sensor) in record.temp_sensors().iter().enumerate() {
            assert_eq!(read_fixed(&sensor.name), format!("sensor{i}"));
        }
        assert_eq!(record.temp_sensors[31].value_c_x10, 431);
    }

    #[test]
    fn test_out_of_range_values_become_sentinels() {
        assert_eq!(cpu_percent_x10(Some(37.46)), 375);
        assert_eq!(cpu_percent_x10(Some(100.5)), UNAVAILABLE);
        assert_eq!(cpu_percent_x10(Some(-0.1)), UNAVAILABLE);
        assert_eq!(cpu_percent_x10(Some(f32::NAN)), UNAVAILABLE);
        assert_eq!(cpu_percent_x10(None), UNAVAILABLE);

        assert_eq!(temperature_x10(Some(45.25)), (453, SENSOR_VALID));
        assert_eq!(temperature_x10(Some(151.0)), (UNAVAILABLE, 0));
        assert_eq!(temperature_x10(Some(-50.0)), (-500, SENSOR_VALID));
        assert_eq!(temperature_x10(None), (UNAVAILABLE, 0));

        assert_eq!(percent_or_unavailable(Some(100)), 100);
        assert_eq!(percent_or_unavailable(Some(101)), UNAVAILABLE);
        assert_eq!(percent_or_unavailable(Some(-3)), UNAVAILABLE);
    }

    #[test]
    fn test_shrinking_lists_clear_stale_slots() {
        let mut record = SnapshotRecord::empty();
        let many = SystemSample {
            temperatures: (0..4).map(reading).collect(),
            ..SystemSample::default()
        };
        project(&many, &[device(0), device(1)], &mut record);

        let few = SystemSample {
            temperatures: vec![reading(9)],
            ..SystemSample::default()
        };
        project(&few, &[], &mut record);

        assert_eq!(record.temp_sensor_count, 1);
        assert_eq!(record.temp_sensors[1], TemperatureSensor::zeroed());
        assert_eq!(record.usb_device_count, 0);
        assert_eq!(record.usb_devices[0], UsbDeviceSlot::zeroed());
    }

    #[test]
    fn test_usb_devices_truncate_to_capacity() {
        let mut devices: Vec<_> = (0..10).map(device).collect();
        devices[0].state = VolumeState::UpdateReady;
        devices[0].update_ready = true;

        let mut record = SnapshotRecord::empty();
        project(&SystemSample::default(), &devices, &mut record);

        assert_eq!(record.usb_device_count as usize, MAX_USB_DEVICES);
        let first = &record.usb_devices[0];
        assert_eq!(read_fixed(&first.drive_path), "/media/usb0");
        assert_eq!(first.state, VolumeState::UpdateReady as u8);
        assert_eq!(first.is_update_ready, 1);
        assert_eq!(first.last_update_unix, 1_000);
        assert_eq!(read_fixed(&record.usb_devices[7].volume_label), "DISK7");
    }

    #[test]
    fn test_board_and_platform_fields() {
        let sample = SystemSample {
            board: BoardInfo {
                manufacturer: "ACME".to_string(),
                ..BoardInfo::default()
            },
            tpm_present: Some(true),
            secure_boot: None,
            ..SystemSample::default()
        };
        let mut record = SnapshotRecord::empty();
        project(&sample, &[], &mut record);

        assert_eq!(read_fixed(&record.baseboard_manufacturer), "ACME");
        assert_eq!(read_fixed(&record.bios_vendor), BoardInfo::UNKNOWN);
        assert_eq!(record.tpm_present, 1);
        assert_eq!(record.secure_boot_enabled, 0xFF);
    }

    #[test]
    fn test_degraded_flag_follows_sample() {
        let mut record = SnapshotRecord::empty();
        record.set_status_flags(StatusFlags::SEQUENCE_STALLED);

        let degraded = SystemSample {
            degraded: true,
            ..SystemSample::default()
        };
        project(&degraded, &[], &mut record);
        assert_eq!(
            record.status_flags(),
            StatusFlags::DEGRADED | StatusFlags::SEQUENCE_STALLED
        );

        project(&SystemSample::default(), &[], &mut record);
        assert_eq!(record.status_flags(), StatusFlags::SEQUENCE_STALLED);
    }

    #[test]
    fn test_disk_scores_and_growth_flags() {
        let sample = SystemSample {
            disks: vec![DiskHealth {
                id: "nvme0n1".to_string(),
                score: Some(87),
                wear_percent: Some(250),
                hours_on: 12_000,
                temperature_c: Some(38),
                wear_jumped: true,
                ..DiskHealth::default()
            }],
            ..SystemSample::default()
        };
        let mut record = SnapshotRecord::empty();
        project(&sample, &[], &mut record);

        let disk = &record.smart_disks()[0];
        assert_eq!(read_fixed(&disk.disk_id), "nvme0n1");
        assert_eq!(disk.score, 87);
        assert_eq!(disk.wear_percent, UNAVAILABLE);
        assert_eq!(disk.hours_on, 12_000);
        assert_eq!(disk.recent_growth_flags, 0b10);
    }
}

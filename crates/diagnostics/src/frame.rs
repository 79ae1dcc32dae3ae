//! Frame format: little-endian `u32` body length, then a UTF-8 JSON object.

use crate::errors::DiagnosticsError;
use bridge::Tier;
use record::{SnapshotRecord, offsets::OFFSETS};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::io::{Read, Write};
use std::time::{SystemTime, UNIX_EPOCH};

pub const MAX_FRAME_LEN: usize = 1 << 20;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DiagnosticsFrame {
    /// Milliseconds since the Unix epoch.
    pub timestamp: u64,
    pub abi_version: u32,
    pub write_sequence: u32,
    pub snapshot_version: u32,
    pub cpu_logical_cores: u16,
    pub cpu_usage_percent_x10: i16,
    #[serde(rename = "memoryTotalMB")]
    pub memory_total_mb: u64,
    #[serde(rename = "memoryUsedMB")]
    pub memory_used_mb: u64,
    pub temp_sensor_count: u16,
    pub smart_disk_count: u8,
    pub usb_device_count: u8,
    pub status_flags: u8,
    pub region_tier: String,
    pub expected_size: usize,
    pub offsets: BTreeMap<String, usize>,
    pub logs: Vec<String>,
}

impl DiagnosticsFrame {
    pub fn build(record: &SnapshotRecord, tier: Tier, logs: Vec<String>) -> Self {
        let timestamp = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|d| d.as_millis() as u64)
            .unwrap_or(0);

        Self {
            timestamp,
            abi_version: record.abi_version,
            write_sequence: record.write_sequence,
            snapshot_version: record.snapshot_version,
            cpu_logical_cores: record.cpu_logical_cores,
            cpu_usage_percent_x10: record.cpu_usage_percent_x10,
            memory_total_mb: record.memory_total_mb,
            memory_used_mb: record.memory_used_mb,
            temp_sensor_count: record.temp_sensor_count,
            smart_disk_count: record.smart_disk_count,
            usb_device_count: record.usb_device_count,
            status_flags: record.future_reserved[0],
            region_tier: tier.as_str().to_string(),
            expected_size: SnapshotRecord::SIZE,
            offsets: OFFSETS
                .iter()
                .map(|(name, offset)| (name.to_string(), *offset))
                .collect(),
            logs,
        }
    }
}

pub fn write_frame<W: Write>(writer: &mut W, frame: &DiagnosticsFrame) -> Result<(), DiagnosticsError> {
    let body = serde_json::to_vec(frame)?;
    if body.len() > MAX_FRAME_LEN {
        return Err(DiagnosticsError::FrameTooLarge(body.len()));
    }

    writer.write_all(&(body.len() as u32).to_le_bytes())?;
    writer.write_all(&body)?;
    writer.flush()?;
    Ok(())
}

pub fn read_frame<R: Read>(reader: &mut R) -> Result<DiagnosticsFrame, DiagnosticsError> {
    let mut len = [0u8; 4];
    reader.read_exact(&mut len)?;
    let len = u32::from_le_bytes(len) as usize;
    if len > MAX_FRAME_LEN {
        return Err(DiagnosticsError::FrameTooLarge(len));
    }

    let mut body = vec![0u8; len];
    reader.read_exact(&mut body)?;
    Ok(serde_json::from_slice(&body)?)
}

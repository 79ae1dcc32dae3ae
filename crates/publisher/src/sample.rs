//! Plain values gathered by collectors before they are projected into the
//! record. `None` means the value could not be sampled.

#[derive(Debug, Clone, Default, PartialEq)]
pub struct SystemSample {
    pub cpu_logical_cores: Option<u16>,
    pub cpu_usage_percent: Option<f32>,
    pub memory_total_mb: Option<u64>,
    pub memory_used_mb: Option<u64>,
    pub memory_slots_total: Option<u16>,
    pub memory_slots_used: Option<u16>,
    pub temperatures: Vec<TemperatureReading>,
    pub disks: Vec<DiskHealth>,
    pub board: BoardInfo,
    pub tpm_present: Option<bool>,
    pub secure_boot: Option<bool>,
    /// Set when any collector failed this cycle.
    pub degraded: bool,
}

#[derive(Debug, Clone, PartialEq)]
pub struct TemperatureReading {
    pub name: String,
    pub celsius: Option<f32>,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct DiskHealth {
    pub id: String,
    pub score: Option<i32>,
    pub wear_percent: Option<i32>,
    pub hours_on: u32,
    pub reallocated: u16,
    pub pending: u16,
    pub uncorrectable: u16,
    pub temperature_c: Option<i16>,
    pub reallocated_grew: bool,
    pub wear_jumped: bool,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BoardInfo {
    pub manufacturer: String,
    pub product: String,
    pub version: String,
    pub serial: String,
    pub bios_vendor: String,
    pub bios_version: String,
    pub bios_date: String,
}

impl BoardInfo {
    pub const UNKNOWN: &'static str = "unknown";
}

impl Default for BoardInfo {
    fn default() -> Self {
        let unknown = || Self::UNKNOWN.to_string();
        Self {
            manufacturer: unknown(),
            product: unknown(),
            version: unknown(),
            serial: unknown(),
            bios_vendor: unknown(),
            bios_version: unknown(),
            bios_date: unknown(),
        }
    }
}

//! Samplers feeding [`SystemSample`]. Each collector owns one capability and
//! fails on its own; a failure marks the sample degraded and the rest still
//! run.

use crate::sample::{BoardInfo, SystemSample, TemperatureReading};
use anyhow::bail;
use std::fs;
use std::panic::{self, AssertUnwindSafe};
use std::path::{Path, PathBuf};
use sysinfo::{Components, System};

const DMI_ROOT: &str = "/sys/class/dmi/id";
const TPM_DEVICE: &str = "/sys/class/tpm/tpm0";
const SECURE_BOOT_VAR: &str =
    "/sys/firmware/efi/efivars/SecureBoot-8be4df61-93ca-11d2-aa0d-00e098032b8c";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CollectorKind {
    Cpu,
    Memory,
    Temperature,
    Board,
    Tpm,
}

impl CollectorKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            CollectorKind::Cpu => "cpu",
            CollectorKind::Memory => "memory",
            CollectorKind::Temperature => "temperature",
            CollectorKind::Board => "board",
            CollectorKind::Tpm => "tpm",
        }
    }
}

pub trait Collector: Send {
    fn kind(&self) -> CollectorKind;
    fn collect(&mut self, sample: &mut SystemSample) -> anyhow::Result<()>;
}

/// Run every collector into a fresh sample.
pub fn collect_all(collectors: &mut [Box<dyn Collector>]) -> SystemSample {
    let mut sample = SystemSample::default();

    for collector in collectors.iter_mut() {
        let kind = collector.kind();
        match panic::catch_unwind(AssertUnwindSafe(|| collector.collect(&mut sample))) {
            Ok(Ok(())) => {}
            Ok(Err(e)) => {
                tracing::warn!(collector = kind.as_str(), error = %format!("{e:#}"), "Collector failed");
                sample.degraded = true;
            }
            Err(_) => {
                tracing::error!(collector = kind.as_str(), "Collector panicked");
                sample.degraded = true;
            }
        }
    }

    sample
}

pub fn default_collectors() -> Vec<Box<dyn Collector>> {
    vec![
        Box::new(CpuCollector::new()),
        Box::new(MemoryCollector::new()),
        Box::new(TemperatureCollector::new()),
        Box::new(BoardCollector::new()),
        Box::new(TpmCollector::new()),
    ]
}

pub struct CpuCollector {
    system: System,
}

impl CpuCollector {
    pub fn new() -> Self {
        let mut system = System::new();
        // Usage is a delta; prime it so the first cycle has a baseline.
        system.refresh_cpu_usage();
        Self { system }
    }
}

impl Default for CpuCollector {
    fn default() -> Self {
        Self::new()
    }
}

impl Collector for CpuCollector {
    fn kind(&self) -> CollectorKind {
        CollectorKind::Cpu
    }

    fn collect(&mut self, sample: &mut SystemSample) -> anyhow::Result<()> {
        self.system.refresh_cpu_usage();
        let cores = self.system.cpus().len();
        if cores == 0 {
            bail!("no logical processors reported");
        }

        sample.cpu_logical_cores = Some(u16::try_from(cores).unwrap_or(u16::MAX));
        sample.cpu_usage_percent = Some(self.system.global_cpu_usage());
        Ok(())
    }
}

pub struct MemoryCollector {
    system: System,
}

impl MemoryCollector {
    pub fn new() -> Self {
        Self {
            system: System::new(),
        }
    }
}

impl Default for MemoryCollector {
    fn default() -> Self {
        Self::new()
    }
}

impl Collector for MemoryCollector {
    fn kind(&self) -> CollectorKind {
        CollectorKind::Memory
    }

    fn collect(&mut self, sample: &mut SystemSample) -> anyhow::Result<()> {
        self.system.refresh_memory();
        let total = self.system.total_memory();
        if total == 0 {
            bail!("total memory reported as zero");
        }

        sample.memory_total_mb = Some(total / (1024 * 1024));
        sample.memory_used_mb = Some(self.system.used_memory() / (1024 * 1024));
        Ok(())
    }
}

pub struct TemperatureCollector {
    components: Components,
}

impl TemperatureCollector {
    pub fn new() -> Self {
        Self {
            components: Components::new_with_refreshed_list(),
        }
    }
}

impl Default for TemperatureCollector {
    fn default() -> Self {
        Self::new()
    }
}

impl Collector for TemperatureCollector {
    fn kind(&self) -> CollectorKind {
        CollectorKind::Temperature
    }

    fn collect(&mut self, sample: &mut SystemSample) -> anyhow::Result<()> {
        self.components.refresh(true);
        sample.temperatures = self
            .components
            .list()
            .iter()
            .map(|component| TemperatureReading {
                name: component.label().to_string(),
                celsius: component.temperature(),
            })
            .collect();
        Ok(())
    }
}

/// Board and BIOS identity from the kernel's DMI export.
pub struct BoardCollector {
    root: PathBuf,
}

impl BoardCollector {
    pub fn new() -> Self {
        Self::with_root(DMI_ROOT)
    }

    pub fn with_root(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    fn field(&self, name: &str) -> String {
        read_trimmed(&self.root.join(name))
            .filter(|value| !value.is_empty())
            .unwrap_or_else(|| BoardInfo::UNKNOWN.to_string())
    }
}

impl Default for BoardCollector {
    fn default() -> Self {
        Self::new()
    }
}

impl Collector for BoardCollector {
    fn kind(&self) -> CollectorKind {
        CollectorKind::Board
    }

    fn collect(&mut self, sample: &mut SystemSample) -> anyhow::Result<()> {
        if !self.root.is_dir() {
            bail!("DMI tables not exposed at {}", self.root.display());
        }

        sample.board = BoardInfo {
            manufacturer: self.field("board_vendor"),
            product: self.field("board_name"),
            version: self.field("board_version"),
            // Readable by root only.
            serial: self.field("board_serial"),
            bios_vendor: self.field("bios_vendor"),
            bios_version: self.field("bios_version"),
            bios_date: self.field("bios_date"),
        };
        Ok(())
    }
}

/// TPM presence and UEFI Secure Boot state.
pub struct TpmCollector {
    tpm_device: PathBuf,
    secure_boot_var: PathBuf,
}

impl TpmCollector {
    pub fn new() -> Self {
        Self::with_paths(TPM_DEVICE, SECURE_BOOT_VAR)
    }

    pub fn with_paths(tpm_device: impl Into<PathBuf>, secure_boot_var: impl Into<PathBuf>) -> Self {
        Self {
            tpm_device: tpm_device.into(),
            secure_boot_var: secure_boot_var.into(),
        }
    }
}

impl Default for TpmCollector {
    fn default() -> Self {
        Self::new()
    }
}

impl Collector for TpmCollector {
    fn kind(&self) -> CollectorKind {
        CollectorKind::Tpm
    }

    fn collect(&mut self, sample: &mut SystemSample) -> anyhow::Result<()> {
        sample.tpm_present = Some(self.tpm_device.exists());

        // efivarfs: 4 attribute bytes, then the value byte.
        sample.secure_boot = match fs::read(&self.secure_boot_var) {
            Ok(bytes) if bytes.len() >= 5 => Some(bytes[4] == 1),
            Ok(bytes) => bail!(
                "{} holds {} bytes, expected at least 5",
                self.secure_boot_var.display(),
                bytes.len()
            ),
            Err(_) => None,
        };
        Ok(())
    }
}

fn read_trimmed(path: &Path) -> Option<String> {
    fs::read_to_string(path).ok().map(|s| s.trim().to_string())
}

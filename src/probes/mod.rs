pub mod command;
pub mod linux;
pub mod macos;
pub mod windows;

use crate::snapshot::{
    round2, CoreCount, CpuMetrics, InterfaceInfo, MemoryMetrics, SensorReadings, SystemInfo,
    VolumeUsage,
};
use command::{CommandRunner, ProbeError};
use std::collections::BTreeMap;
use std::future::Future;
use std::sync::Mutex;
use std::time::Duration;
use sysinfo::{DiskExt, System, SystemExt};
use tracing::warn;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OsFamily {
    Linux,
    Mac,
    Windows,
    Other,
}

impl OsFamily {
    pub fn detect() -> Self {
        match std::env::consts::OS {
            "linux" => OsFamily::Linux,
            "macos" => OsFamily::Mac,
            "windows" => OsFamily::Windows,
            _ => OsFamily::Other,
        }
    }

    pub fn label(&self) -> &'static str {
        match self {
            OsFamily::Linux => "linux",
            OsFamily::Mac => "macos",
            OsFamily::Windows => "windows",
            OsFamily::Other => "other",
        }
    }
}

/// The acquisition seam between the collector and the platform. Each method
/// gathers one metric category; every method is independently fallible.
pub trait ProbeSource: Send + Sync {
    fn system_info(&self) -> impl Future<Output = Result<SystemInfo, ProbeError>> + Send;
    fn cpu(&self) -> impl Future<Output = Result<CpuMetrics, ProbeError>> + Send;
    fn memory(&self) -> impl Future<Output = Result<MemoryMetrics, ProbeError>> + Send;
    fn disk(&self) -> impl Future<Output = Result<BTreeMap<String, VolumeUsage>, ProbeError>> + Send;
    fn network(
        &self,
    ) -> impl Future<Output = Result<BTreeMap<String, InterfaceInfo>, ProbeError>> + Send;
    fn sensors(&self) -> impl Future<Output = Result<SensorReadings, ProbeError>> + Send;
}

/// Probes for the machine the daemon runs on. The OS family picks the
/// concrete probe variant once, at construction.
pub struct HostProbes {
    family: OsFamily,
    runner: CommandRunner,
    system: Mutex<System>,
}

impl HostProbes {
    pub fn new(probe_timeout: Duration) -> Self {
        Self::with_family(OsFamily::detect(), probe_timeout)
    }

    pub fn with_family(family: OsFamily, probe_timeout: Duration) -> Self {
        Self {
            family,
            runner: CommandRunner::new(probe_timeout),
            system: Mutex::new(System::new()),
        }
    }

    pub fn family(&self) -> OsFamily {
        self.family
    }

    fn system(&self) -> std::sync::MutexGuard<'_, System> {
        match self.system.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        }
    }
}

impl ProbeSource for HostProbes {
    async fn system_info(&self) -> Result<SystemInfo, ProbeError> {
        let system = self.system();
        let boot_time = system.boot_time();
        Ok(SystemInfo {
            platform: system.name(),
            release: system.os_version(),
            kernel: system.kernel_version(),
            architecture: std::env::consts::ARCH.to_string(),
            hostname: system.host_name(),
            boot_time_unix: (boot_time > 0).then_some(boot_time),
        })
    }

    async fn cpu(&self) -> Result<CpuMetrics, ProbeError> {
        let percent = match self.family {
            OsFamily::Linux => linux::cpu_percent(&self.runner).await?,
            OsFamily::Mac => macos::cpu_percent(&self.runner).await?,
            OsFamily::Windows => windows::cpu_percent(&self.runner).await?,
            OsFamily::Other => return Err(ProbeError::Unsupported("cpu usage probe")),
        };

        let (physical, logical) = {
            let mut system = self.system();
            system.refresh_cpu();
            (system.physical_core_count(), system.cpus().len())
        };

        Ok(CpuMetrics {
            percent,
            count: CoreCount { physical, logical },
        })
    }

    async fn memory(&self) -> Result<MemoryMetrics, ProbeError> {
        let virtual_memory = match self.family {
            OsFamily::Linux => linux::memory(&self.runner).await?,
            OsFamily::Mac => macos::memory(&self.runner).await?,
            OsFamily::Windows => windows::memory(&self.runner).await?,
            OsFamily::Other => return Err(ProbeError::Unsupported("memory probe")),
        };
        Ok(MemoryMetrics { virtual_memory })
    }

    async fn disk(&self) -> Result<BTreeMap<String, VolumeUsage>, ProbeError> {
        let mut system = self.system();
        system.refresh_disks_list();
        system.refresh_disks();

        let mut volumes = BTreeMap::new();
        for disk in system.disks() {
            let mount = disk.mount_point().to_string_lossy().to_string();
            let total = disk.total_space();
            if total == 0 {
                warn!(volume = %mount, "skipping volume with no reported capacity");
                continue;
            }
            let free = disk.available_space();
            let used = total.saturating_sub(free);
            volumes.insert(
                mount,
                VolumeUsage {
                    total,
                    used,
                    free,
                    percent_used: round2(used as f64 / total as f64 * 100.0),
                },
            );
        }

        Ok(volumes)
    }

    async fn network(&self) -> Result<BTreeMap<String, InterfaceInfo>, ProbeError> {
        match self.family {
            OsFamily::Linux => linux::network(&self.runner).await,
            OsFamily::Mac => macos::network(&self.runner).await,
            OsFamily::Windows => windows::network(&self.runner).await,
            OsFamily::Other => Err(ProbeError::Unsupported("network probe")),
        }
    }

    async fn sensors(&self) -> Result<SensorReadings, ProbeError> {
        match self.family {
            OsFamily::Linux => linux::sensors(),
            OsFamily::Mac => macos::sensors(&self.runner).await,
            OsFamily::Windows => windows::sensors(),
            OsFamily::Other => Ok(SensorReadings {
                temperature: BTreeMap::new(),
                battery: None,
                note: Some("Hardware sensors are not supported on this platform".to_string()),
            }),
        }
    }
}

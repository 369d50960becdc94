use serde::Serialize;
use serde_json::{json, Value};
use std::collections::BTreeMap;

/// One fallible slot of a snapshot: either the collected value or the reason
/// the probe for it failed. Serializes as the value itself or `{"error": ...}`.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum Section<T> {
    Value(T),
    Failed { error: String },
}

impl<T> Section<T> {
    pub fn value(&self) -> Option<&T> {
        match self {
            Section::Value(v) => Some(v),
            Section::Failed { .. } => None,
        }
    }

    pub fn error(&self) -> Option<&str> {
        match self {
            Section::Value(_) => None,
            Section::Failed { error } => Some(error),
        }
    }
}

/// One point-in-time normalized bundle of system metrics.
///
/// Sub-probes run sequentially inside a single critical section, so fields are
/// mutually consistent but not an atomic point-in-time OS sample.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Snapshot {
    pub timestamp: String,
    pub timestamp_unix: i64,
    pub system_info: Section<SystemInfo>,
    pub basic_metrics: BasicMetrics,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub sensors: Option<Section<SensorReadings>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub disk: Option<Section<BTreeMap<String, VolumeUsage>>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub network: Option<Section<BTreeMap<String, InterfaceInfo>>>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SystemInfo {
    pub platform: Option<String>,
    pub release: Option<String>,
    pub kernel: Option<String>,
    pub architecture: String,
    pub hostname: Option<String>,
    pub boot_time_unix: Option<u64>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct BasicMetrics {
    pub cpu: Section<CpuMetrics>,
    pub memory: Section<MemoryMetrics>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CpuMetrics {
    /// Averaged load in percent; None when the platform output could not be
    /// parsed (fail-soft, not an error).
    pub percent: Option<f64>,
    pub count: CoreCount,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CoreCount {
    pub physical: Option<usize>,
    pub logical: usize,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct MemoryMetrics {
    #[serde(rename = "virtual")]
    pub virtual_memory: VirtualMemory,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct VirtualMemory {
    pub total: Option<u64>,
    pub available: Option<u64>,
    pub percent: Option<f64>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SensorReadings {
    pub temperature: BTreeMap<String, f64>,
    pub battery: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub note: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct VolumeUsage {
    pub total: u64,
    pub used: u64,
    pub free: u64,
    pub percent_used: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct InterfaceInfo {
    pub ip: String,
}

impl VirtualMemory {
    /// Usage percent from total/available, rounded to two decimals. None when
    /// total is missing or zero.
    pub fn from_totals(total: Option<u64>, available: Option<u64>) -> Self {
        let percent = match (total, available) {
            (Some(total), Some(available)) if total > 0 => {
                let used = total.saturating_sub(available);
                Some(round2(used as f64 / total as f64 * 100.0))
            }
            _ => None,
        };
        Self {
            total,
            available,
            percent,
        }
    }
}

pub fn round2(value: f64) -> f64 {
    (value * 100.0).round() / 100.0
}

impl Snapshot {
    /// Flattens the snapshot into the loosely-typed document the health
    /// analyzer evaluates: `cpu.current_usage`, `cpu.temperature`,
    /// `memory.percent_used` and the per-volume disk map.
    pub fn health_document(&self) -> Value {
        let mut doc = serde_json::Map::new();

        if let Some(cpu) = self.basic_metrics.cpu.value() {
            doc.insert(
                "cpu".to_string(),
                json!({
                    "current_usage": cpu.percent,
                    "temperature": self.cpu_temperature(),
                }),
            );
        }

        if let Some(memory) = self.basic_metrics.memory.value() {
            doc.insert(
                "memory".to_string(),
                json!({
                    "percent_used": memory.virtual_memory.percent,
                }),
            );
        }

        if let Some(disk) = self.disk.as_ref().and_then(Section::value) {
            let volumes: serde_json::Map<String, Value> = disk
                .iter()
                .map(|(volume, usage)| {
                    (
                        volume.clone(),
                        json!({ "percent_used": usage.percent_used }),
                    )
                })
                .collect();
            doc.insert("disk".to_string(), Value::Object(volumes));
        }

        Value::Object(doc)
    }

    /// Best-guess CPU package temperature from the collected sensor zones:
    /// prefer zones whose name marks them as CPU-related, fall back to the
    /// hottest plausible zone.
    fn cpu_temperature(&self) -> Option<f64> {
        const CPU_MARKERS: [&str; 6] = ["cpu", "package", "coretemp", "k10temp", "tctl", "tdie"];

        let sensors = self.sensors.as_ref().and_then(Section::value)?;
        let plausible = sensors
            .temperature
            .iter()
            .filter(|(_, temp)| (0.0..=130.0).contains(*temp));

        let primary = plausible
            .clone()
            .filter(|(zone, _)| {
                let zone = zone.to_lowercase();
                CPU_MARKERS.iter().any(|m| zone.contains(m))
            })
            .map(|(_, temp)| *temp)
            .max_by(|a, b| a.total_cmp(b));
        if primary.is_some() {
            return primary;
        }

        plausible.map(|(_, temp)| *temp).max_by(|a, b| a.total_cmp(b))
    }
}

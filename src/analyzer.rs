use crate::config::Thresholds;
use serde::Serialize;
use serde_json::{Map, Value};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum HealthStatus {
    Healthy,
    Warning,
    Error,
}

#[derive(Debug, Clone, Serialize)]
pub struct HealthReport {
    pub status: HealthStatus,
    pub warnings: Vec<String>,
    pub components: Components,
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct Components {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub cpu: Option<ComponentHealth>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub memory: Option<ComponentHealth>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub storage: Option<ComponentHealth>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub gpu: Option<ComponentHealth>,
}

#[derive(Debug, Clone, Serialize)]
pub struct ComponentHealth {
    pub status: HealthStatus,
    pub warnings: Vec<String>,
    pub metrics: Map<String, Value>,
}

/// Outcome of reading one metric out of the health document.
enum MetricReading {
    Absent,
    Invalid,
    Value(f64),
}

/// Stateless threshold evaluator. Never fails: malformed input is reported
/// through the returned status, so downstream consumers always have something
/// renderable.
pub struct HealthAnalyzer {
    thresholds: Thresholds,
}

impl HealthAnalyzer {
    pub fn new(thresholds: Thresholds) -> Self {
        Self { thresholds }
    }

    pub fn analyze(&self, data: &Value) -> HealthReport {
        let Some(document) = data.as_object() else {
            return HealthReport {
                status: HealthStatus::Error,
                warnings: vec!["Invalid diagnostics data".to_string()],
                components: Components::default(),
            };
        };

        let mut warnings = Vec::new();
        let mut components = Components::default();

        if let Some(cpu) = document.get("cpu") {
            let health = self.analyze_cpu(cpu);
            warnings.extend(health.warnings.iter().cloned());
            components.cpu = Some(health);
        }
        if let Some(memory) = document.get("memory") {
            let health = self.analyze_memory(memory);
            warnings.extend(health.warnings.iter().cloned());
            components.memory = Some(health);
        }
        if let Some(disk) = document.get("disk") {
            let health = self.analyze_storage(disk);
            warnings.extend(health.warnings.iter().cloned());
            components.storage = Some(health);
        }
        if let Some(gpu) = document.get("gpu") {
            let health = self.analyze_gpu(gpu);
            warnings.extend(health.warnings.iter().cloned());
            components.gpu = Some(health);
        }

        let status = if warnings.is_empty() {
            HealthStatus::Healthy
        } else {
            HealthStatus::Warning
        };

        HealthReport {
            status,
            warnings,
            components,
        }
    }

    fn analyze_cpu(&self, data: &Value) -> ComponentHealth {
        let Some(cpu) = non_empty_object(data) else {
            return unavailable("CPU data unavailable", &["usage", "temperature"]);
        };

        let mut warnings = Vec::new();
        let mut status = HealthStatus::Healthy;
        let mut metrics = Map::new();

        let usage = match read_metric(cpu.get("current_usage")) {
            MetricReading::Value(usage) => {
                if usage > self.thresholds.cpu_usage_max {
                    warnings.push(format!("CPU usage is critically high: {usage}%"));
                    status = HealthStatus::Warning;
                }
                Some(usage)
            }
            MetricReading::Invalid => {
                warnings.push("Invalid CPU usage value".to_string());
                None
            }
            MetricReading::Absent => None,
        };
        metrics.insert("usage".to_string(), number_or_null(usage));

        let temperature = match read_metric(cpu.get("temperature")) {
            MetricReading::Value(temperature) => {
                if temperature > self.thresholds.cpu_temp_max {
                    warnings.push(format!(
                        "CPU temperature is critically high: {temperature}°C"
                    ));
                    status = HealthStatus::Warning;
                }
                Some(temperature)
            }
            MetricReading::Invalid => {
                warnings.push("Invalid temperature value".to_string());
                None
            }
            MetricReading::Absent => None,
        };
        metrics.insert("temperature".to_string(), number_or_null(temperature));

        ComponentHealth {
            status,
            warnings,
            metrics,
        }
    }

    fn analyze_memory(&self, data: &Value) -> ComponentHealth {
        let Some(memory) = non_empty_object(data) else {
            return unavailable("Memory data unavailable", &["usage_percent", "swap_percent"]);
        };

        let mut warnings = Vec::new();
        let mut status = HealthStatus::Healthy;
        let mut metrics = Map::new();

        let usage = match read_metric(memory.get("percent_used")) {
            MetricReading::Value(usage) => {
                if usage > self.thresholds.memory_usage_max {
                    warnings.push(format!("Memory usage is critically high: {usage}%"));
                    status = HealthStatus::Warning;
                }
                Some(usage)
            }
            MetricReading::Invalid => {
                warnings.push("Invalid memory usage value".to_string());
                None
            }
            MetricReading::Absent => None,
        };
        metrics.insert("usage_percent".to_string(), number_or_null(usage));

        let swap_value = memory
            .get("swap_memory")
            .and_then(Value::as_object)
            .and_then(|swap| swap.get("percent"));
        let swap = match read_metric(swap_value) {
            MetricReading::Value(swap) => {
                // Same ceiling as virtual memory, as configured upstream.
                if swap > self.thresholds.memory_usage_max {
                    warnings.push(format!("Swap usage is critically high: {swap}%"));
                    status = HealthStatus::Warning;
                }
                Some(swap)
            }
            MetricReading::Invalid => {
                warnings.push("Invalid swap usage value".to_string());
                None
            }
            MetricReading::Absent => None,
        };
        metrics.insert("swap_percent".to_string(), number_or_null(swap));

        ComponentHealth {
            status,
            warnings,
            metrics,
        }
    }

    fn analyze_storage(&self, data: &Value) -> ComponentHealth {
        let Some(volumes) = non_empty_object(data) else {
            return unavailable("Storage data unavailable", &[]);
        };

        let mut warnings = Vec::new();
        let mut status = HealthStatus::Healthy;
        let mut metrics = Map::new();

        for (device, entry) in volumes {
            let Some(volume) = entry.as_object() else {
                continue;
            };
            match read_metric(volume.get("percent_used")) {
                MetricReading::Value(percent_used) => {
                    metrics.insert(device.clone(), Value::from(percent_used));
                    if percent_used > self.thresholds.disk_usage_max {
                        warnings.push(format!(
                            "Disk usage on {device} is critically high: {percent_used}%"
                        ));
                        status = HealthStatus::Warning;
                    }
                }
                MetricReading::Invalid => {
                    warnings.push(format!("Invalid disk usage value on {device}"));
                    metrics.insert(device.clone(), Value::Null);
                }
                MetricReading::Absent => {}
            }
        }

        ComponentHealth {
            status,
            warnings,
            metrics,
        }
    }

    fn analyze_gpu(&self, data: &Value) -> ComponentHealth {
        let Some(gpus) = data.as_array().filter(|list| !list.is_empty()) else {
            return unavailable("GPU data unavailable", &[]);
        };

        let mut warnings = Vec::new();
        let mut status = HealthStatus::Healthy;
        let mut metrics = Map::new();

        for (index, entry) in gpus.iter().enumerate() {
            let Some(gpu) = entry.as_object() else {
                continue;
            };
            let name = gpu
                .get("name")
                .and_then(Value::as_str)
                .map(str::to_string)
                .unwrap_or_else(|| format!("GPU {index}"));

            match read_metric(gpu.get("temperature")) {
                MetricReading::Value(temperature) => {
                    metrics.insert(format!("{name}_temp"), Value::from(temperature));
                    if temperature > self.thresholds.gpu_temp_max {
                        warnings.push(format!(
                            "GPU temperature is critically high on {name}: {temperature}°C"
                        ));
                        status = HealthStatus::Warning;
                    }
                }
                MetricReading::Invalid => {
                    warnings.push(format!("Invalid GPU temperature value on {name}"));
                    metrics.insert(format!("{name}_temp"), Value::Null);
                }
                MetricReading::Absent => {}
            }

            match read_metric(gpu.get("load")) {
                MetricReading::Value(load) => {
                    metrics.insert(format!("{name}_load"), Value::from(load));
                    // GPU load shares the CPU usage ceiling, as configured
                    // upstream.
                    if load > self.thresholds.cpu_usage_max {
                        warnings.push(format!(
                            "GPU load is critically high on {name}: {load}%"
                        ));
                        status = HealthStatus::Warning;
                    }
                }
                MetricReading::Invalid => {
                    warnings.push(format!("Invalid GPU load value on {name}"));
                    metrics.insert(format!("{name}_load"), Value::Null);
                }
                MetricReading::Absent => {}
            }
        }

        ComponentHealth {
            status,
            warnings,
            metrics,
        }
    }
}

fn non_empty_object(data: &Value) -> Option<&Map<String, Value>> {
    data.as_object().filter(|map| !map.is_empty())
}

fn unavailable(message: &str, metric_keys: &[&str]) -> ComponentHealth {
    let mut metrics = Map::new();
    for key in metric_keys {
        metrics.insert((*key).to_string(), Value::Null);
    }
    ComponentHealth {
        status: HealthStatus::Error,
        warnings: vec![message.to_string()],
        metrics,
    }
}

fn read_metric(value: Option<&Value>) -> MetricReading {
    match value {
        None | Some(Value::Null) => MetricReading::Absent,
        Some(Value::Number(n)) => n
            .as_f64()
            .map(MetricReading::Value)
            .unwrap_or(MetricReading::Invalid),
        Some(Value::String(s)) => s
            .trim()
            .parse::<f64>()
            .map(MetricReading::Value)
            .unwrap_or(MetricReading::Invalid),
        Some(_) => MetricReading::Invalid,
    }
}

fn number_or_null(value: Option<f64>) -> Value {
    value.map(Value::from).unwrap_or(Value::Null)
}

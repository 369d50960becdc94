use serde::de::Error as DeError;
use serde::{Deserialize, Deserializer, Serialize};
use std::fs;
use std::net::SocketAddr;
use std::path::Path;
use std::str::FromStr;
use thiserror::Error;

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct Config {
    pub listen: String,
    #[serde(default = "default_cache_duration_secs")]
    pub cache_duration_secs: u64,
    #[serde(default = "default_probe_timeout_ms")]
    pub probe_timeout_ms: u64,
    #[serde(default)]
    pub features: CapabilityMap,
    #[serde(default)]
    pub thresholds: Thresholds,
}

/// Which optional probe categories the current platform/privilege combination
/// allows. CPU and memory collection is unconditional and has no flag.
#[derive(Debug, Clone, Copy, Deserialize, Serialize)]
pub struct CapabilityMap {
    #[serde(default = "default_enabled")]
    pub hardware_sensors: bool,
    #[serde(default = "default_enabled")]
    pub disk_metrics: bool,
    #[serde(default = "default_enabled")]
    pub network_metrics: bool,
}

impl Default for CapabilityMap {
    fn default() -> Self {
        Self {
            hardware_sensors: true,
            disk_metrics: true,
            network_metrics: true,
        }
    }
}

/// Numeric ceilings used to classify metrics as healthy or warning.
/// Values may be given as numbers or numeric strings; anything else is
/// rejected while the config is being read.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct Thresholds {
    #[serde(default = "default_cpu_temp_max", deserialize_with = "numeric_ceiling")]
    pub cpu_temp_max: f64,
    #[serde(default = "default_cpu_usage_max", deserialize_with = "numeric_ceiling")]
    pub cpu_usage_max: f64,
    #[serde(
        default = "default_memory_usage_max",
        deserialize_with = "numeric_ceiling"
    )]
    pub memory_usage_max: f64,
    #[serde(
        default = "default_disk_usage_max",
        deserialize_with = "numeric_ceiling"
    )]
    pub disk_usage_max: f64,
    #[serde(default = "default_gpu_temp_max", deserialize_with = "numeric_ceiling")]
    pub gpu_temp_max: f64,
}

impl Default for Thresholds {
    fn default() -> Self {
        Self {
            cpu_temp_max: default_cpu_temp_max(),
            cpu_usage_max: default_cpu_usage_max(),
            memory_usage_max: default_memory_usage_max(),
            disk_usage_max: default_disk_usage_max(),
            gpu_temp_max: default_gpu_temp_max(),
        }
    }
}

fn numeric_ceiling<'de, D>(deserializer: D) -> Result<f64, D::Error>
where
    D: Deserializer<'de>,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum Raw {
        Number(f64),
        Text(String),
    }

    match Raw::deserialize(deserializer)? {
        Raw::Number(v) => Ok(v),
        Raw::Text(s) => s
            .trim()
            .parse::<f64>()
            .map_err(|_| D::Error::custom(format!("threshold value '{s}' is not numeric"))),
    }
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config file {path}: {source}")]
    Read {
        path: String,
        source: std::io::Error,
    },
    #[error("failed to parse YAML in {path}: {source}")]
    Parse {
        path: String,
        source: serde_yaml::Error,
    },
    #[error("config validation error: {0}")]
    Validation(String),
}

impl Config {
    pub fn load_from_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path_ref = path.as_ref();
        let path_display = path_ref.display().to_string();
        let text = fs::read_to_string(path_ref).map_err(|source| ConfigError::Read {
            path: path_display.clone(),
            source,
        })?;

        let cfg: Config = serde_yaml::from_str(&text).map_err(|source| ConfigError::Parse {
            path: path_display,
            source,
        })?;

        cfg.validate()?;
        Ok(cfg)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.listen.trim().is_empty() {
            return Err(ConfigError::Validation(
                "listen field is required".to_string(),
            ));
        }
        if SocketAddr::from_str(&self.listen).is_err() {
            return Err(ConfigError::Validation(
                "listen must be a valid host:port address".to_string(),
            ));
        }
        if self.cache_duration_secs < 1 {
            return Err(ConfigError::Validation(
                "cache_duration_secs must be >= 1".to_string(),
            ));
        }
        if self.probe_timeout_ms < 1 {
            return Err(ConfigError::Validation(
                "probe_timeout_ms must be >= 1".to_string(),
            ));
        }

        validate_thresholds(&self.thresholds)?;

        Ok(())
    }

    pub fn example_yaml() -> &'static str {
        include_str!("../config.yaml.example")
    }
}

fn validate_thresholds(thresholds: &Thresholds) -> Result<(), ConfigError> {
    if thresholds.cpu_temp_max <= 0.0 {
        return Err(ConfigError::Validation(
            "thresholds.cpu_temp_max must be > 0".to_string(),
        ));
    }
    if thresholds.gpu_temp_max <= 0.0 {
        return Err(ConfigError::Validation(
            "thresholds.gpu_temp_max must be > 0".to_string(),
        ));
    }
    if !(0.0..=100.0).contains(&thresholds.cpu_usage_max) {
        return Err(ConfigError::Validation(
            "thresholds.cpu_usage_max must be in range 0..100".to_string(),
        ));
    }
    if !(0.0..=100.0).contains(&thresholds.memory_usage_max) {
        return Err(ConfigError::Validation(
            "thresholds.memory_usage_max must be in range 0..100".to_string(),
        ));
    }
    if !(0.0..=100.0).contains(&thresholds.disk_usage_max) {
        return Err(ConfigError::Validation(
            "thresholds.disk_usage_max must be in range 0..100".to_string(),
        ));
    }

    Ok(())
}

const fn default_cache_duration_secs() -> u64 {
    5
}

const fn default_probe_timeout_ms() -> u64 {
    5000
}

const fn default_enabled() -> bool {
    true
}

const fn default_cpu_temp_max() -> f64 {
    85.0
}

const fn default_cpu_usage_max() -> f64 {
    90.0
}

const fn default_memory_usage_max() -> f64 {
    90.0
}

const fn default_disk_usage_max() -> f64 {
    90.0
}

const fn default_gpu_temp_max() -> f64 {
    85.0
}

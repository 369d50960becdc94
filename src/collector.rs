use crate::config::CapabilityMap;
use crate::metrics::Metrics;
use crate::probes::command::ProbeError;
use crate::probes::ProbeSource;
use crate::snapshot::{BasicMetrics, Section, Snapshot};
use serde::Serialize;
use std::future::Future;
use std::sync::Arc;
use std::time::{Duration, Instant, SystemTime, UNIX_EPOCH};
use thiserror::Error;
use tokio::sync::Mutex;
use tracing::{debug, info, warn};

#[derive(Debug, Error)]
pub enum CollectError {
    #[error("no system metrics could be collected: {0}")]
    NoMetrics(String),
}

#[derive(Debug, Clone, Serialize)]
pub struct CacheInfo {
    pub last_update: Option<String>,
    pub age: Option<String>,
    pub cache_duration: String,
    pub cached_bytes: u64,
}

#[derive(Default)]
struct CacheState {
    snapshot: Option<Snapshot>,
    last_update: Option<Instant>,
}

/// Collects diagnostics on demand and memoizes the result for the cache
/// window. One lock guards the whole check-probe-store sequence, so at most
/// one acquisition is in flight and concurrent callers inside the window all
/// receive the same snapshot.
pub struct DiagnosticsCollector<P> {
    probes: P,
    capabilities: CapabilityMap,
    cache_duration: Duration,
    metrics: Arc<Metrics>,
    cache: Mutex<CacheState>,
}

impl<P: ProbeSource> DiagnosticsCollector<P> {
    pub fn new(
        probes: P,
        capabilities: CapabilityMap,
        cache_duration: Duration,
        metrics: Arc<Metrics>,
    ) -> Self {
        Self {
            probes,
            capabilities,
            cache_duration,
            metrics,
            cache: Mutex::new(CacheState::default()),
        }
    }

    /// Returns the cached snapshot while it is fresh, otherwise runs the
    /// probes and replaces the cache. A failed acquisition leaves any stale
    /// cache entry in place.
    pub async fn collect(&self) -> Result<Snapshot, CollectError> {
        let mut cache = self.cache.lock().await;

        if let (Some(snapshot), Some(last_update)) = (&cache.snapshot, cache.last_update) {
            if last_update.elapsed() < self.cache_duration {
                self.metrics.inc_cache_hit();
                debug!("serving cached diagnostics snapshot");
                return Ok(snapshot.clone());
            }
        }

        self.metrics.inc_cache_miss();
        let started = Instant::now();
        let snapshot = self.acquire().await?;
        self.metrics.observe_collect(&snapshot, started.elapsed());
        info!(
            elapsed_ms = started.elapsed().as_millis() as u64,
            "collected fresh diagnostics snapshot"
        );

        cache.snapshot = Some(snapshot.clone());
        cache.last_update = Some(Instant::now());
        Ok(snapshot)
    }

    /// Forces the next collect() to probe again.
    pub async fn reset_cache(&self) {
        let mut cache = self.cache.lock().await;
        cache.snapshot = None;
        cache.last_update = None;
        info!("diagnostics cache cleared");
    }

    pub async fn cache_info(&self) -> CacheInfo {
        let cache = self.cache.lock().await;
        let cached_bytes = cache
            .snapshot
            .as_ref()
            .and_then(|s| serde_json::to_vec(s).ok())
            .map(|encoded| encoded.len() as u64)
            .unwrap_or(0);

        CacheInfo {
            last_update: cache.snapshot.as_ref().map(|s| s.timestamp.clone()),
            age: cache.last_update.map(|last| {
                humantime::format_duration(Duration::from_secs(last.elapsed().as_secs()))
                    .to_string()
            }),
            cache_duration: humantime::format_duration(self.cache_duration).to_string(),
            cached_bytes,
        }
    }

    async fn acquire(&self) -> Result<Snapshot, CollectError> {
        let now = SystemTime::now();

        let system_info = self.section("system_info", self.probes.system_info()).await;
        let cpu = self.section("cpu", self.probes.cpu()).await;
        let memory = self.section("memory", self.probes.memory()).await;

        let sensors = if self.capabilities.hardware_sensors {
            Some(self.section("sensors", self.probes.sensors()).await)
        } else {
            None
        };
        let disk = if self.capabilities.disk_metrics {
            Some(self.section("disk", self.probes.disk()).await)
        } else {
            None
        };
        let network = if self.capabilities.network_metrics {
            Some(self.section("network", self.probes.network()).await)
        } else {
            None
        };

        if let (Some(info_err), Some(cpu_err), Some(memory_err)) =
            (system_info.error(), cpu.error(), memory.error())
        {
            return Err(CollectError::NoMetrics(format!(
                "system info: {info_err}; cpu: {cpu_err}; memory: {memory_err}"
            )));
        }

        Ok(Snapshot {
            timestamp: humantime::format_rfc3339_seconds(now).to_string(),
            timestamp_unix: now
                .duration_since(UNIX_EPOCH)
                .map(|d| d.as_secs() as i64)
                .unwrap_or(0),
            system_info,
            basic_metrics: BasicMetrics { cpu, memory },
            sensors,
            disk,
            network,
        })
    }

    async fn section<T>(
        &self,
        category: &'static str,
        probe: impl Future<Output = Result<T, ProbeError>>,
    ) -> Section<T> {
        match probe.await {
            Ok(value) => Section::Value(value),
            Err(err) => {
                warn!(category, error = %err, "probe failed");
                self.metrics.inc_probe_error(category);
                Section::Failed {
                    error: err.to_string(),
                }
            }
        }
    }
}

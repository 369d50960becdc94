use crate::snapshot::{Section, Snapshot};
use prometheus::core::Collector;
use prometheus::{opts, Counter, CounterVec, Encoder, Gauge, GaugeVec, Registry, TextEncoder};
use std::sync::Arc;
use std::time::Duration;

#[derive(Clone)]
pub struct Metrics {
    registry: Registry,
    pub diag_cpu_usage_percent: Gauge,
    pub diag_memory_usage_percent: Gauge,
    pub diag_disk_usage_percent: GaugeVec,
    pub diag_sensor_temperature_celsius: GaugeVec,
    pub diag_cache_hits_total: Counter,
    pub diag_cache_misses_total: Counter,
    pub diag_probe_errors_total: CounterVec,
    pub diag_scrape_count_total: Counter,
    pub diag_collect_duration_seconds: Gauge,
    pub diag_last_collect_timestamp_seconds: Gauge,
}

impl Metrics {
    pub fn new() -> Result<Arc<Self>, prometheus::Error> {
        let registry = Registry::new();

        let diag_cpu_usage_percent = Gauge::with_opts(opts!(
            "diag_cpu_usage_percent",
            "CPU usage from the last collected snapshot in percent (0..100)"
        ))?;
        let diag_memory_usage_percent = Gauge::with_opts(opts!(
            "diag_memory_usage_percent",
            "Virtual memory usage from the last collected snapshot in percent"
        ))?;
        let diag_disk_usage_percent = GaugeVec::new(
            opts!(
                "diag_disk_usage_percent",
                "Disk usage in percent by volume"
            ),
            &["volume"],
        )?;
        let diag_sensor_temperature_celsius = GaugeVec::new(
            opts!(
                "diag_sensor_temperature_celsius",
                "Temperature by sensor zone in Celsius"
            ),
            &["zone"],
        )?;
        let diag_cache_hits_total = Counter::with_opts(opts!(
            "diag_cache_hits_total",
            "Snapshot requests served from the cache"
        ))?;
        let diag_cache_misses_total = Counter::with_opts(opts!(
            "diag_cache_misses_total",
            "Snapshot requests that triggered a fresh acquisition"
        ))?;
        let diag_probe_errors_total = CounterVec::new(
            opts!(
                "diag_probe_errors_total",
                "Probe failures by metric category"
            ),
            &["category"],
        )?;
        let diag_scrape_count_total = Counter::with_opts(opts!(
            "diag_scrape_count_total",
            "Number of /metrics scrapes"
        ))?;
        let diag_collect_duration_seconds = Gauge::with_opts(opts!(
            "diag_collect_duration_seconds",
            "Duration of the last full acquisition in seconds"
        ))?;
        let diag_last_collect_timestamp_seconds = Gauge::with_opts(opts!(
            "diag_last_collect_timestamp_seconds",
            "Unix timestamp of the last collected snapshot"
        ))?;

        register(&registry, &diag_cpu_usage_percent)?;
        register(&registry, &diag_memory_usage_percent)?;
        register(&registry, &diag_disk_usage_percent)?;
        register(&registry, &diag_sensor_temperature_celsius)?;
        register(&registry, &diag_cache_hits_total)?;
        register(&registry, &diag_cache_misses_total)?;
        register(&registry, &diag_probe_errors_total)?;
        register(&registry, &diag_scrape_count_total)?;
        register(&registry, &diag_collect_duration_seconds)?;
        register(&registry, &diag_last_collect_timestamp_seconds)?;

        Ok(Arc::new(Self {
            registry,
            diag_cpu_usage_percent,
            diag_memory_usage_percent,
            diag_disk_usage_percent,
            diag_sensor_temperature_celsius,
            diag_cache_hits_total,
            diag_cache_misses_total,
            diag_probe_errors_total,
            diag_scrape_count_total,
            diag_collect_duration_seconds,
            diag_last_collect_timestamp_seconds,
        }))
    }

    pub fn observe_collect(&self, snapshot: &Snapshot, elapsed: Duration) {
        self.diag_collect_duration_seconds.set(elapsed.as_secs_f64());
        self.diag_last_collect_timestamp_seconds
            .set(snapshot.timestamp_unix as f64);
        self.update_from_snapshot(snapshot);
    }

    fn update_from_snapshot(&self, snapshot: &Snapshot) {
        if let Some(cpu) = snapshot.basic_metrics.cpu.value() {
            if let Some(percent) = cpu.percent {
                self.diag_cpu_usage_percent.set(percent);
            }
        }
        if let Some(memory) = snapshot.basic_metrics.memory.value() {
            if let Some(percent) = memory.virtual_memory.percent {
                self.diag_memory_usage_percent.set(percent);
            }
        }
        if let Some(disk) = snapshot.disk.as_ref().and_then(Section::value) {
            for (volume, usage) in disk {
                self.diag_disk_usage_percent
                    .with_label_values(&[volume])
                    .set(usage.percent_used);
            }
        }
        if let Some(sensors) = snapshot.sensors.as_ref().and_then(Section::value) {
            for (zone, temperature) in &sensors.temperature {
                self.diag_sensor_temperature_celsius
                    .with_label_values(&[zone])
                    .set(*temperature);
            }
        }
    }

    pub fn inc_cache_hit(&self) {
        self.diag_cache_hits_total.inc();
    }

    pub fn inc_cache_miss(&self) {
        self.diag_cache_misses_total.inc();
    }

    pub fn inc_probe_error(&self, category: &str) {
        self.diag_probe_errors_total
            .with_label_values(&[category])
            .inc();
    }

    pub fn inc_scrape_count(&self) {
        self.diag_scrape_count_total.inc();
    }

    pub fn encode_metrics(&self) -> Result<Vec<u8>, prometheus::Error> {
        let mut buf = Vec::new();
        let encoder = TextEncoder::new();
        let mf = self.registry.gather();
        encoder.encode(&mf, &mut buf)?;
        Ok(buf)
    }
}

fn register<T: Collector + Clone + 'static>(
    registry: &Registry,
    collector: &T,
) -> Result<(), prometheus::Error> {
    registry.register(Box::new(collector.clone()))
}

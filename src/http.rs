use crate::analyzer::HealthAnalyzer;
use crate::collector::DiagnosticsCollector;
use crate::metrics::Metrics;
use crate::probes::ProbeSource;
use axum::body::Body;
use axum::extract::State;
use axum::http::{header::CONTENT_TYPE, HeaderValue, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use serde_json::json;
use std::sync::Arc;

pub struct HttpAppState<P> {
    pub collector: Arc<DiagnosticsCollector<P>>,
    pub analyzer: Arc<HealthAnalyzer>,
    pub metrics: Arc<Metrics>,
}

impl<P> Clone for HttpAppState<P> {
    fn clone(&self) -> Self {
        Self {
            collector: self.collector.clone(),
            analyzer: self.analyzer.clone(),
            metrics: self.metrics.clone(),
        }
    }
}

pub fn build_router<P>(
    collector: Arc<DiagnosticsCollector<P>>,
    analyzer: Arc<HealthAnalyzer>,
    metrics: Arc<Metrics>,
) -> Router
where
    P: ProbeSource + 'static,
{
    Router::new()
        .route("/healthz", get(healthz))
        .route("/metrics", get(metrics_handler::<P>))
        .route("/api/diagnostics", get(diagnostics_handler::<P>))
        .route("/api/health", get(health_handler::<P>))
        .route("/api/cache", get(cache_info_handler::<P>))
        .route("/api/cache/reset", post(cache_reset_handler::<P>))
        .with_state(HttpAppState {
            collector,
            analyzer,
            metrics,
        })
}

async fn healthz() -> impl IntoResponse {
    (StatusCode::OK, "ok")
}

async fn metrics_handler<P: ProbeSource>(State(state): State<HttpAppState<P>>) -> Response {
    state.metrics.inc_scrape_count();
    match state.metrics.encode_metrics() {
        Ok(encoded) => {
            let mut response = Response::new(Body::from(encoded));
            response.headers_mut().insert(
                CONTENT_TYPE,
                HeaderValue::from_static("text/plain; version=0.0.4"),
            );
            response
        }
        Err(err) => (
            StatusCode::INTERNAL_SERVER_ERROR,
            format!("failed to encode metrics: {err}"),
        )
            .into_response(),
    }
}

async fn diagnostics_handler<P: ProbeSource>(State(state): State<HttpAppState<P>>) -> Response {
    match state.collector.collect().await {
        Ok(snapshot) => Json(snapshot).into_response(),
        Err(err) => collection_failure(err).into_response(),
    }
}

async fn health_handler<P: ProbeSource>(State(state): State<HttpAppState<P>>) -> Response {
    match state.collector.collect().await {
        Ok(snapshot) => {
            let analysis = state.analyzer.analyze(&snapshot.health_document());
            Json(json!({
                "timestamp": snapshot.timestamp,
                "diagnostics": snapshot,
                "analysis": analysis,
            }))
            .into_response()
        }
        Err(err) => collection_failure(err).into_response(),
    }
}

async fn cache_info_handler<P: ProbeSource>(
    State(state): State<HttpAppState<P>>,
) -> impl IntoResponse {
    Json(state.collector.cache_info().await)
}

async fn cache_reset_handler<P: ProbeSource>(
    State(state): State<HttpAppState<P>>,
) -> impl IntoResponse {
    state.collector.reset_cache().await;
    Json(json!({"status": "ok"}))
}

fn collection_failure(err: crate::collector::CollectError) -> (StatusCode, Json<serde_json::Value>) {
    (
        StatusCode::INTERNAL_SERVER_ERROR,
        Json(json!({
            "error": "Failed to collect system data",
            "details": err.to_string(),
        })),
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{CapabilityMap, Thresholds};
    use crate::probes::command::ProbeError;
    use crate::snapshot::{
        CoreCount, CpuMetrics, InterfaceInfo, MemoryMetrics, SensorReadings, SystemInfo,
        VirtualMemory, VolumeUsage,
    };
    use axum::body::to_bytes;
    use axum::http::Request;
    use std::collections::BTreeMap;
    use std::time::Duration;
    use tower::ServiceExt;

    struct StaticProbes;

    impl ProbeSource for StaticProbes {
        async fn system_info(&self) -> Result<SystemInfo, ProbeError> {
            Ok(SystemInfo {
                platform: Some("TestOS".to_string()),
                release: Some("1.0".to_string()),
                kernel: Some("6.0".to_string()),
                architecture: "x86_64".to_string(),
                hostname: Some("testhost".to_string()),
                boot_time_unix: Some(1_700_000_000),
            })
        }

        async fn cpu(&self) -> Result<CpuMetrics, ProbeError> {
            Ok(CpuMetrics {
                percent: Some(97.0),
                count: CoreCount {
                    physical: Some(4),
                    logical: 8,
                },
            })
        }

        async fn memory(&self) -> Result<MemoryMetrics, ProbeError> {
            Ok(MemoryMetrics {
                virtual_memory: VirtualMemory::from_totals(
                    Some(8_000_000_000),
                    Some(6_000_000_000),
                ),
            })
        }

        async fn disk(&self) -> Result<BTreeMap<String, VolumeUsage>, ProbeError> {
            let mut volumes = BTreeMap::new();
            volumes.insert(
                "/".to_string(),
                VolumeUsage {
                    total: 100,
                    used: 25,
                    free: 75,
                    percent_used: 25.0,
                },
            );
            Ok(volumes)
        }

        async fn network(&self) -> Result<BTreeMap<String, InterfaceInfo>, ProbeError> {
            Ok(BTreeMap::new())
        }

        async fn sensors(&self) -> Result<SensorReadings, ProbeError> {
            Ok(SensorReadings {
                temperature: BTreeMap::new(),
                battery: None,
                note: None,
            })
        }
    }

    fn test_app() -> Router {
        let metrics = Metrics::new().expect("metrics");
        let collector = Arc::new(DiagnosticsCollector::new(
            StaticProbes,
            CapabilityMap::default(),
            Duration::from_secs(60),
            metrics.clone(),
        ));
        let analyzer = Arc::new(HealthAnalyzer::new(Thresholds::default()));
        build_router(collector, analyzer, metrics)
    }

    async fn body_text(response: Response) -> String {
        let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        String::from_utf8(bytes.to_vec()).unwrap()
    }

    #[tokio::test]
    async fn healthz_returns_ok() {
        let response = test_app()
            .oneshot(
                Request::builder()
                    .uri("/healthz")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(body_text(response).await, "ok");
    }

    #[tokio::test]
    async fn diagnostics_endpoint_serves_snapshot_json() {
        let response = test_app()
            .oneshot(
                Request::builder()
                    .uri("/api/diagnostics")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::OK);
        let value: serde_json::Value =
            serde_json::from_str(&body_text(response).await).expect("json body");
        assert_eq!(value["basic_metrics"]["cpu"]["percent"], json!(97.0));
        assert_eq!(value["system_info"]["hostname"], json!("testhost"));
    }

    #[tokio::test]
    async fn health_endpoint_combines_snapshot_and_analysis() {
        let response = test_app()
            .oneshot(
                Request::builder()
                    .uri("/api/health")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::OK);
        let value: serde_json::Value =
            serde_json::from_str(&body_text(response).await).expect("json body");
        assert_eq!(value["analysis"]["status"], json!("warning"));
        assert_eq!(
            value["analysis"]["warnings"][0],
            json!("CPU usage is critically high: 97%")
        );
        assert!(value["diagnostics"]["basic_metrics"].is_object());
    }

    #[tokio::test]
    async fn metrics_endpoint_exposes_prometheus_text() {
        let response = test_app()
            .oneshot(
                Request::builder()
                    .uri("/metrics")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::OK);
        let text = body_text(response).await;
        assert!(text.contains("diag_scrape_count_total"));
    }

    #[tokio::test]
    async fn cache_endpoints_report_and_reset_state() {
        let app = test_app();

        let response = app
            .clone()
            .oneshot(
                Request::builder()
                    .uri("/api/diagnostics")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);

        let response = app
            .clone()
            .oneshot(
                Request::builder()
                    .uri("/api/cache")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        let value: serde_json::Value =
            serde_json::from_str(&body_text(response).await).expect("json body");
        assert!(value["cached_bytes"].as_u64().unwrap() > 0);

        let response = app
            .clone()
            .oneshot(
                Request::builder()
                    .method("POST")
                    .uri("/api/cache/reset")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);

        let response = app
            .oneshot(
                Request::builder()
                    .uri("/api/cache")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        let value: serde_json::Value =
            serde_json::from_str(&body_text(response).await).expect("json body");
        assert_eq!(value["cached_bytes"], json!(0));
    }
}

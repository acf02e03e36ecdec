// observability/metrics.rs - Prometheus Metrics

use metrics::{counter, describe_counter, describe_histogram, histogram};
use metrics_exporter_prometheus::{PrometheusBuilder, PrometheusHandle};
use std::net::SocketAddr;
use std::time::Duration;

/// Configuration for metrics
#[derive(Clone, Debug)]
pub struct MetricsConfig {
    /// Address to expose metrics endpoint
    pub listen_addr: SocketAddr,

    /// Histogram buckets for request handling latency (in seconds)
    pub latency_buckets: Vec<f64>,
}

impl Default for MetricsConfig {
    fn default() -> Self {
        Self {
            listen_addr: SocketAddr::from(([0, 0, 0, 0], 9090)),
            latency_buckets: vec![
                0.0005, 0.001, 0.005, 0.01, 0.025, 0.05, 0.1, 0.25, 0.5, 1.0, 2.5, 5.0,
            ],
        }
    }
}

/// Handle to the Prometheus metrics exporter
#[derive(Clone)]
pub struct MetricsHandle {
    handle: PrometheusHandle,
}

impl MetricsHandle {
    /// Render metrics in Prometheus text format
    pub fn render(&self) -> String {
        self.handle.render()
    }
}

/// Request-serving metrics, shared by registry and communicators
pub struct RequestMetrics;

impl RequestMetrics {
    pub const HANDLED_TOTAL: &'static str = "trustshare_requests_handled_total";
    pub const REFUSED_TOTAL: &'static str = "trustshare_requests_refused_total";
    pub const LATENCY_SECONDS: &'static str = "trustshare_request_latency_seconds";
}

/// Registry metrics
pub struct RegistryMetrics;

impl RegistryMetrics {
    pub const CERTIFICATES_SIGNED_TOTAL: &'static str = "trustshare_certificates_signed_total";
    pub const FILES_PUBLISHED_TOTAL: &'static str = "trustshare_files_published_total";
}

/// Communicator metrics
pub struct PeerMetrics;

impl PeerMetrics {
    pub const EXCHANGES_TOTAL: &'static str = "trustshare_certificate_exchanges_total";
    pub const FETCHES_TOTAL: &'static str = "trustshare_file_fetches_total";
}

/// Initialize the metrics system
///
/// Starts an HTTP server on the configured address to expose Prometheus metrics.
/// Returns a handle that can be used to render metrics programmatically.
pub fn init_metrics(config: MetricsConfig) -> Result<MetricsHandle, Box<dyn std::error::Error>> {
    let builder = PrometheusBuilder::new().set_buckets_for_metric(
        metrics_exporter_prometheus::Matcher::Full(RequestMetrics::LATENCY_SECONDS.into()),
        &config.latency_buckets,
    )?;

    let handle = builder.install_recorder()?;
    let metrics_handle = MetricsHandle {
        handle: handle.clone(),
    };

    let listen_addr = config.listen_addr;
    let shared_handle = std::sync::Arc::new(handle);

    tokio::spawn(async move {
        use axum::{http::StatusCode, routing::get, Json, Router};
        use serde::Serialize;

        #[derive(Serialize)]
        struct HealthResponse {
            status: &'static str,
            version: &'static str,
            uptime_secs: u64,
        }

        let start_time = std::time::Instant::now();

        let handle_for_route = shared_handle.clone();
        let app = Router::new()
            .route(
                "/metrics",
                get(move || {
                    let h = handle_for_route.clone();
                    async move { h.render() }
                }),
            )
            .route(
                "/health",
                get(move || {
                    let uptime = start_time.elapsed().as_secs();
                    async move {
                        Json(HealthResponse {
                            status: "healthy",
                            version: env!("CARGO_PKG_VERSION"),
                            uptime_secs: uptime,
                        })
                    }
                }),
            )
            .route("/ready", get(|| async { StatusCode::OK }));

        match tokio::net::TcpListener::bind(listen_addr).await {
            Ok(listener) => {
                tracing::info!(addr = %listen_addr, "Metrics HTTP server started");
                if let Err(e) = axum::serve(listener, app).await {
                    tracing::error!(error = %e, "Metrics server error");
                }
            }
            Err(e) => {
                tracing::error!(error = %e, addr = %listen_addr, "Failed to bind metrics server");
            }
        }
    });

    describe_counter!(
        RequestMetrics::HANDLED_TOTAL,
        "Total number of requests answered"
    );
    describe_counter!(
        RequestMetrics::REFUSED_TOTAL,
        "Total number of requests answered with a refusal"
    );
    describe_histogram!(
        RequestMetrics::LATENCY_SECONDS,
        "Request handling latency in seconds"
    );

    describe_counter!(
        RegistryMetrics::CERTIFICATES_SIGNED_TOTAL,
        "Total number of communicator certificates signed"
    );
    describe_counter!(
        RegistryMetrics::FILES_PUBLISHED_TOTAL,
        "Total number of file descriptors published"
    );

    describe_counter!(
        PeerMetrics::EXCHANGES_TOTAL,
        "Peer certificate exchanges by outcome"
    );
    describe_counter!(PeerMetrics::FETCHES_TOTAL, "Remote file fetches by outcome");

    tracing::info!(addr = %config.listen_addr, "Metrics initialized");

    Ok(metrics_handle)
}

// Recording functions

/// Record a request answered by a server
pub fn record_request_handled(kind: &str, refused: bool) {
    counter!(RequestMetrics::HANDLED_TOTAL, "kind" => kind.to_string()).increment(1);
    if refused {
        counter!(RequestMetrics::REFUSED_TOTAL, "kind" => kind.to_string()).increment(1);
    }
}

/// Record how long a handler took
pub fn record_request_latency(kind: &str, latency: Duration) {
    histogram!(RequestMetrics::LATENCY_SECONDS, "kind" => kind.to_string())
        .record(latency.as_secs_f64());
}

pub fn record_certificate_signed() {
    counter!(RegistryMetrics::CERTIFICATES_SIGNED_TOTAL).increment(1);
}

pub fn record_files_published(count: usize) {
    counter!(RegistryMetrics::FILES_PUBLISHED_TOTAL).increment(count as u64);
}

/// Record a certificate exchange, initiated or answered
pub fn record_exchange(role: &str, trusted: bool) {
    counter!(
        PeerMetrics::EXCHANGES_TOTAL,
        "role" => role.to_string(),
        "trusted" => trusted.to_string()
    )
    .increment(1);
}

/// Record a remote file fetch
pub fn record_fetch(outcome: &'static str) {
    counter!(PeerMetrics::FETCHES_TOTAL, "outcome" => outcome).increment(1);
}

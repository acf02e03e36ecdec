// observability/mod.rs - Tracing and Metrics

//! Observability module providing structured logging and Prometheus metrics.
//!
//! # Example
//!
//! ```ignore
//! use trustshare::observability::{init_tracing, init_metrics, MetricsConfig, TracingConfig};
//!
//! init_tracing(TracingConfig::default());
//! let handle = init_metrics(MetricsConfig::default()).unwrap();
//! ```

mod metrics;
mod tracing_setup;

pub use metrics::{
    init_metrics, record_certificate_signed, record_exchange, record_fetch,
    record_files_published, record_request_handled, record_request_latency, MetricsConfig,
    MetricsHandle, PeerMetrics, RegistryMetrics, RequestMetrics,
};

pub use tracing_setup::{init_tracing, TracingConfig, TracingFormat};

// bin/registry.rs - Central Registry Binary

use anyhow::{Context, Result};
use clap::Parser;
use std::net::SocketAddr;
use std::path::PathBuf;
use tracing::{info, warn};

use trustshare::control::InterruptGate;
use trustshare::observability::{init_metrics, init_tracing, MetricsConfig, TracingConfig, TracingFormat};
use trustshare::platform::Registry;
use trustshare::settings::Settings;

/// Central registry: signs communicator certificates and brokers discovery
#[derive(Parser, Debug)]
#[command(name = "trustshare-registry")]
#[command(author = "SavageS")]
#[command(version)]
#[command(about = "Trust anchor and directory for trustshare nodes", long_about = None)]
struct Args {
    /// Config file path
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Registry name
    #[arg(long)]
    name: Option<String>,

    /// Listen address
    #[arg(short, long)]
    listen: Option<SocketAddr>,

    /// Log level (trace, debug, info, warn, error)
    #[arg(long)]
    log_level: Option<String>,

    /// Log format (pretty, compact, json)
    #[arg(long)]
    log_format: Option<String>,

    /// Serve Prometheus metrics on this address
    #[arg(long)]
    metrics_addr: Option<SocketAddr>,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    let mut settings = Settings::load(args.config.as_deref()).context("loading configuration")?;
    if let Some(name) = args.name {
        settings.registry.name = name;
    }
    if let Some(listen) = args.listen {
        settings.registry.listen = listen;
    }
    if let Some(level) = args.log_level {
        settings.telemetry.log_level = level;
    }
    if let Some(format) = args.log_format {
        settings.telemetry.log_format = format;
    }
    if args.metrics_addr.is_some() {
        settings.telemetry.metrics_addr = args.metrics_addr;
    }

    let telemetry = &settings.telemetry;
    init_tracing(TracingConfig::from_level(
        &telemetry.log_level,
        TracingFormat::parse(&telemetry.log_format),
    ));

    let _metrics_handle = match telemetry.metrics_addr {
        Some(listen_addr) => match init_metrics(MetricsConfig {
            listen_addr,
            ..Default::default()
        }) {
            Ok(handle) => {
                info!(addr = %listen_addr, "Metrics recorder initialized");
                Some(handle)
            }
            Err(e) => {
                warn!(error = %e, "Failed to initialize metrics");
                None
            }
        },
        None => None,
    };

    // Interrupts are held back until the registry is serving
    let mut interrupts = InterruptGate::install();

    info!(name = %settings.registry.name, listen = %settings.registry.listen, "Starting central registry");

    let mut registry = Registry::bind(settings.registry.clone())
        .await
        .context("binding registry listener")?;
    registry.start().context("starting registry server")?;

    info!(
        addr = %registry.local_addr(),
        fingerprint = %registry.certificate().fingerprint().short(),
        "Registry ready"
    );
    info!("Press Ctrl+C to shutdown");

    interrupts.arm();
    interrupts.wait().await;

    info!("Shutting down registry");
    registry.shutdown().await.context("draining registry connections")?;
    info!("Registry stopped");

    Ok(())
}

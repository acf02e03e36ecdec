// bin/node.rs - Service Provider Node Binary

use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use std::net::SocketAddr;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{info, warn};

use trustshare::control::InterruptGate;
use trustshare::directory::{FileDescriptor, FileId};
use trustshare::observability::{
    init_metrics, init_tracing, MetricsConfig, MetricsHandle, TracingConfig, TracingFormat,
};
use trustshare::platform::Communicator;
use trustshare::settings::{Settings, TelemetrySettings};
use trustshare::storage::{save_buffer, HomeDirectories, LocalIndex};

/// Service provider node
#[derive(Parser, Debug)]
#[command(name = "trustshare-node")]
#[command(author = "SavageS")]
#[command(version)]
#[command(about = "Publish, list and fetch files through a trustshare registry", long_about = None)]
struct Args {
    /// Config file path
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// Node name placed in the certificate
    #[arg(long, global = true)]
    name: Option<String>,

    /// Listen address for peer requests
    #[arg(short, long, global = true)]
    listen: Option<SocketAddr>,

    /// Address advertised to peers (defaults to the bound address)
    #[arg(long, global = true)]
    advertise: Option<SocketAddr>,

    /// Registry address
    #[arg(short, long, global = true)]
    registry: Option<SocketAddr>,

    /// Accept fetched files whose reply signature does not verify
    #[arg(long, global = true)]
    lenient_replies: bool,

    /// Log level (trace, debug, info, warn, error)
    #[arg(long, global = true)]
    log_level: Option<String>,

    /// Log format (pretty, compact, json)
    #[arg(long, global = true)]
    log_format: Option<String>,

    /// Serve Prometheus metrics on this address
    #[arg(long, global = true)]
    metrics_addr: Option<SocketAddr>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Publish the files in a home directory and serve them to peers
    Serve {
        /// Directory holding the files to publish
        #[arg(long)]
        home: PathBuf,

        /// Author name for the published files
        #[arg(long)]
        author: String,
    },

    /// List files published by other nodes
    List {
        /// Print JSON instead of a table
        #[arg(long)]
        json: bool,
    },

    /// Fetch a file from the node that owns it
    Fetch {
        /// Registry-assigned file id
        file_id: FileId,

        /// Requesting username
        #[arg(short, long)]
        user: String,

        /// Write the file here instead of printing it
        #[arg(short, long)]
        out: Option<PathBuf>,
    },
}

fn init_telemetry(telemetry: &TelemetrySettings) -> Option<MetricsHandle> {
    init_tracing(TracingConfig::from_level(
        &telemetry.log_level,
        TracingFormat::parse(&telemetry.log_format),
    ));

    let listen_addr = telemetry.metrics_addr?;
    match init_metrics(MetricsConfig {
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
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    let mut settings = Settings::load(args.config.as_deref()).context("loading configuration")?;
    let node = &mut settings.node;
    if let Some(name) = args.name {
        node.name = name;
    }
    if let Some(listen) = args.listen {
        node.listen = listen;
    }
    if args.advertise.is_some() {
        node.advertise = args.advertise;
    }
    if let Some(registry) = args.registry {
        node.registry = registry;
    }
    if args.lenient_replies {
        node.strict_reply_verification = false;
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

    let _metrics_handle = init_telemetry(&settings.telemetry);

    // Interrupts are held back until the node has a signed identity
    let mut interrupts = InterruptGate::install();

    let mut homes = HomeDirectories::new();
    if let Command::Serve { home, author } = &args.command {
        homes.add(author.clone(), home.clone());
    }
    let homes = Arc::new(homes);

    info!(name = %settings.node.name, registry = %settings.node.registry, "Bootstrapping node identity");
    let mut communicator = Communicator::bootstrap(settings.node.clone(), homes.clone())
        .await
        .context("bootstrapping against the registry")?;

    match args.command {
        Command::Serve { .. } => serve(&mut communicator, &homes, &mut interrupts).await,
        Command::List { json } => {
            interrupts.arm();
            tokio::select! {
                result = list(&communicator, json) => result,
                _ = interrupts.wait() => bail!("interrupted"),
            }
        }
        Command::Fetch { file_id, user, out } => {
            interrupts.arm();
            tokio::select! {
                result = fetch(&communicator, file_id, &user, out.as_deref()) => result,
                _ = interrupts.wait() => bail!("interrupted"),
            }
        }
    }
}

async fn serve(
    communicator: &mut Communicator,
    homes: &HomeDirectories,
    interrupts: &mut InterruptGate,
) -> Result<()> {
    communicator.start().context("starting peer server")?;

    let descriptors = homes.load_all().context("loading descriptors")?;
    let published = communicator
        .publish(descriptors)
        .await
        .context("publishing files")?;
    let index = LocalIndex::build(&published);

    for descriptor in index.all() {
        info!(
            file_id = descriptor.file_id_or_unset(),
            file = %descriptor.name,
            author = %descriptor.author,
            "Published file"
        );
    }
    info!(
        com_id = communicator.com_id(),
        addr = %communicator.address(),
        files = index.len(),
        "Node ready"
    );
    info!("Press Ctrl+C to shutdown");

    interrupts.arm();
    interrupts.wait().await;

    info!("Shutting down node");
    communicator.shutdown().await.context("draining peer connections")?;
    info!("Node stopped");
    Ok(())
}

async fn list(communicator: &Communicator, json: bool) -> Result<()> {
    let remote = communicator.fetch_remote().await.context("fetching directories")?;

    if json {
        let files: Vec<&FileDescriptor> = remote.values().collect();
        println!("{}", serde_json::to_string_pretty(&files)?);
    } else {
        println!("{}", FileDescriptor::header());
        for descriptor in remote.values() {
            println!("{descriptor}");
        }
    }
    Ok(())
}

async fn fetch(
    communicator: &Communicator,
    file_id: FileId,
    user: &str,
    out: Option<&Path>,
) -> Result<()> {
    let remote = communicator.fetch_remote().await.context("fetching directories")?;
    let Some(descriptor) = remote.get(&file_id) else {
        bail!("file {file_id} is not published by another node");
    };

    let buffer = communicator.new_buffer(descriptor.clone());
    let Some(buffer) = communicator.fetch_file(buffer, user).await else {
        bail!("fetching file {file_id} from node {} failed", descriptor.com_id_or_unset());
    };

    match out {
        Some(path) => {
            let dir = match path.parent() {
                Some(parent) if !parent.as_os_str().is_empty() => parent,
                _ => Path::new("."),
            };
            let name = path
                .file_name()
                .and_then(|name| name.to_str())
                .with_context(|| format!("invalid output path {}", path.display()))?;

            let saved = save_buffer(&buffer, dir, name)
                .with_context(|| format!("saving file {file_id}"))?;
            info!(file_id, path = %saved.display(), lines = buffer.lines.len(), "Saved file");
        }
        None => println!("{buffer}"),
    }
    Ok(())
}

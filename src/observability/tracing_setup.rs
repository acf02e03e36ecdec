// observability/tracing_setup.rs - Log Output Setup

use tracing_subscriber::{
    fmt::{self, format::FmtSpan},
    layer::SubscriberExt,
    util::SubscriberInitExt,
    EnvFilter, Layer, Registry,
};

/// Log line layout
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum TracingFormat {
    /// Multi-line, human-readable
    #[default]
    Pretty,
    /// One line per event
    Compact,
    /// One JSON object per event
    Json,
}

impl TracingFormat {
    /// Parse a `--log-format` value; anything unknown is `Pretty`
    pub fn parse(value: &str) -> Self {
        match value {
            "json" => TracingFormat::Json,
            "compact" => TracingFormat::Compact,
            _ => TracingFormat::Pretty,
        }
    }
}

/// Subscriber settings derived from the telemetry configuration
#[derive(Clone, Debug)]
pub struct TracingConfig {
    /// `EnvFilter` directives, overridden by `RUST_LOG` when set
    pub filter: String,

    pub format: TracingFormat,

    /// Span open/close events, source locations and thread ids
    pub verbose: bool,
}

impl Default for TracingConfig {
    fn default() -> Self {
        Self::from_level("info", TracingFormat::Pretty)
    }
}

impl TracingConfig {
    /// Apply `level` to every target; `debug` and `trace` turn on verbose output
    pub fn from_level(level: &str, format: TracingFormat) -> Self {
        Self {
            filter: format!("{level},trustshare={level}"),
            format,
            verbose: matches!(level, "debug" | "trace"),
        }
    }
}

/// Install the global subscriber. Call once, at process start.
pub fn init_tracing(config: TracingConfig) {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&config.filter));

    let span_events = if config.verbose {
        FmtSpan::NEW | FmtSpan::CLOSE
    } else {
        FmtSpan::NONE
    };

    let events = fmt::layer()
        .with_span_events(span_events)
        .with_file(config.verbose)
        .with_line_number(config.verbose)
        .with_thread_ids(config.verbose);

    let output: Box<dyn Layer<Registry> + Send + Sync> = match config.format {
        TracingFormat::Pretty => events.pretty().boxed(),
        TracingFormat::Compact => events.compact().boxed(),
        TracingFormat::Json => events.json().with_ansi(false).boxed(),
    };

    tracing_subscriber::registry().with(output).with(filter).init();

    tracing::info!(filter = %config.filter, format = ?config.format, "Tracing initialized");
}

//! # Observability
//!
//! Logging setup shared by the reaction-stream crates.
//!
//! ## Design Philosophy
//!
//! Crates are **log producers**. Libraries only use `tracing` macros; the
//! binary calls `observability::init_with_config()` once at startup and
//! decides where lines go.
//!
//! ## Formats
//!
//! - [`LogFormat::Compact`] - human-readable lines on stderr
//! - [`LogFormat::Json`] - one JSON object per line appended to a file
//!   (default `~/.reaction-stream/logs/reaction.jsonl`), optionally mirrored
//!   to stderr
//!
//! `RUST_LOG` overrides the configured level in both formats.
//!
//! ## Usage
//!
//! ```rust,ignore
//! observability::init_with_config(observability::LogConfig {
//!     service_name: "reactionctl".into(),
//!     default_level: "debug".into(),
//!     format: observability::LogFormat::Json,
//!     ..Default::default()
//! })?;
//! tracing::info!("ready");
//! ```

mod json_layer;
mod writer;

use std::io;
use std::path::PathBuf;

use tracing_subscriber::fmt;
use tracing_subscriber::fmt::format::{Compact, DefaultFields, Format};
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{EnvFilter, Layer};

pub use json_layer::{JsonLayer, LogLine};
pub use writer::LogFileWriter;

/// Output format of the installed subscriber.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum LogFormat {
    #[default]
    Compact,
    Json,
}

impl std::str::FromStr for LogFormat {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "compact" | "text" => Ok(LogFormat::Compact),
            "json" | "jsonl" => Ok(LogFormat::Json),
            other => Err(format!("unknown log format: {other}")),
        }
    }
}

/// Configuration for the logging system.
#[derive(Debug, Clone)]
pub struct LogConfig {
    /// Name of the service, written into every JSON line.
    pub service_name: String,

    /// Default level filter (e.g. "debug", "info").
    /// Overridden by `RUST_LOG`.
    pub default_level: String,

    /// Log file for the JSON format. Defaults to [`default_log_path`].
    pub log_path: Option<PathBuf>,

    /// Mirror JSON output to stderr in compact form.
    pub also_stderr: bool,

    pub format: LogFormat,
}

impl Default for LogConfig {
    fn default() -> Self {
        Self {
            service_name: "unknown".into(),
            default_level: "info".into(),
            log_path: None,
            also_stderr: false,
            format: LogFormat::Compact,
        }
    }
}

/// Default JSONL location, `~/.reaction-stream/logs/reaction.jsonl`.
pub fn default_log_path() -> io::Result<PathBuf> {
    let home = dirs::home_dir()
        .ok_or_else(|| io::Error::new(io::ErrorKind::NotFound, "home directory not found"))?;
    Ok(home.join(".reaction-stream").join("logs").join("reaction.jsonl"))
}

/// Installs a compact stderr subscriber for `service_name` at `info`.
pub fn init(service_name: &str) -> io::Result<()> {
    init_with_config(LogConfig {
        service_name: service_name.into(),
        ..Default::default()
    })
}

/// Installs the global subscriber described by `config`.
///
/// Fails if the log file cannot be opened or a subscriber is already set.
pub fn init_with_config(config: LogConfig) -> io::Result<()> {
    let installed = match config.format {
        LogFormat::Compact => tracing_subscriber::registry()
            .with(stderr_layer().with_filter(env_filter(&config.default_level)))
            .try_init(),
        LogFormat::Json => {
            let log_path = match &config.log_path {
                Some(path) => path.clone(),
                None => default_log_path()?,
            };
            let writer = LogFileWriter::open(&log_path)?;
            let mirror = config.also_stderr.then(stderr_layer);

            let result = tracing_subscriber::registry()
                .with(
                    JsonLayer::new(config.service_name.clone(), writer)
                        .with_filter(env_filter(&config.default_level)),
                )
                .with(mirror.map(|l| l.with_filter(env_filter(&config.default_level))))
                .try_init();
            if result.is_ok() {
                tracing::info!(log_path = %log_path.display(), "observability initialized");
            }
            result
        }
    };

    installed.map_err(|e| io::Error::new(io::ErrorKind::AlreadyExists, e.to_string()))
}

fn env_filter(default_level: &str) -> EnvFilter {
    EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level))
}

type StderrLayer<S> = fmt::Layer<S, DefaultFields, Format<Compact>, fn() -> io::Stderr>;

fn stderr_layer<S>() -> StderrLayer<S> {
    fmt::layer()
        .with_target(true)
        .with_file(false)
        .with_line_number(false)
        .compact()
        .with_writer(io::stderr as fn() -> io::Stderr)
}

/// Re-export tracing macros for convenience.
pub use tracing::{debug, error, info, instrument, trace, warn};

pub use tracing::Level;

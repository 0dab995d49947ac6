//! Logging initialization for the reaction tools.
//!
//! Thin wrapper over the observability crate so every binary sets up
//! `tracing` the same way.

use crate::Paths;
use observability::{LogConfig, LogFormat};

/// Initialize logging for `service_name`.
///
/// `LogFormat::Json` writes to `paths.log_file()` and mirrors to stderr.
/// `RUST_LOG` takes precedence over `level`.
///
/// ```ignore
/// init_logging("reactionctl", "info", LogFormat::Compact, &paths)?;
/// tracing::info!("started");
/// ```
pub fn init_logging(
    service_name: &str,
    level: &str,
    format: LogFormat,
    paths: &Paths,
) -> std::io::Result<()> {
    observability::init_with_config(LogConfig {
        service_name: service_name.into(),
        default_level: level.into(),
        log_path: Some(paths.log_file()),
        also_stderr: format == LogFormat::Json,
        format,
    })
}

/// Parse a log level string into a tracing Level.
pub fn parse_level(level: &str) -> tracing::Level {
    match level.to_lowercase().as_str() {
        "trace" => tracing::Level::TRACE,
        "debug" => tracing::Level::DEBUG,
        "info" => tracing::Level::INFO,
        "warn" | "warning" => tracing::Level::WARN,
        "error" => tracing::Level::ERROR,
        _ => tracing::Level::INFO,
    }
}

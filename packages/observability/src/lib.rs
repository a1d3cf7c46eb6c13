//! # Observability
//!
//! Logging setup for the fan-out listener binaries.
//!
//! Services call `observability::init_with_config()` once at startup and use
//! standard `tracing` macros everywhere else. Where the lines end up is
//! decided here:
//!
//! - no `log_path`: compact, human-readable lines on stderr
//! - with `log_path`: structured JSONL appended to that file, plus stderr
//!   when `also_stderr` is set
//!
//! The JSONL file is append-only with per-line flushes, so
//! `tail -f listener.jsonl | jq` works while several nodes share a host.
//!
//! ## Usage
//!
//! ```rust,ignore
//! observability::init_with_config(observability::LogConfig {
//!     service_name: "fanout-listener".into(),
//!     default_level: "debug".into(),
//!     log_path: Some("/var/log/fanout/listener.jsonl".into()),
//!     also_stderr: true,
//! })?;
//! ```

mod file;
mod json_layer;

pub use file::LogFileWriter;
pub use json_layer::{JsonLayer, LogEntry};

use std::io;
use std::path::PathBuf;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{EnvFilter, Layer};

/// Configuration for the logging system.
#[derive(Debug, Clone)]
pub struct LogConfig {
    /// Name of the service, included in every JSONL line.
    pub service_name: String,

    /// Default filter (e.g. "debug", "info,aws_config=warn").
    /// `RUST_LOG` takes precedence when set.
    pub default_level: String,

    /// JSONL log file. `None` logs to stderr only.
    pub log_path: Option<PathBuf>,

    /// Also log to stderr when writing to a file.
    pub also_stderr: bool,
}

impl Default for LogConfig {
    fn default() -> Self {
        Self {
            service_name: "unknown".into(),
            default_level: "info".into(),
            log_path: None,
            also_stderr: false,
        }
    }
}

/// Install the global subscriber described by `config`.
///
/// Fails if the log file cannot be opened or a subscriber is already set.
pub fn init_with_config(config: LogConfig) -> io::Result<()> {
    let json_layer = match &config.log_path {
        Some(path) => {
            let writer = LogFileWriter::open(path)?;
            Some(
                JsonLayer::new(config.service_name.clone(), writer)
                    .with_filter(env_filter(&config.default_level)),
            )
        }
        None => None,
    };

    let stderr_layer = (config.log_path.is_none() || config.also_stderr).then(|| {
        tracing_subscriber::fmt::layer()
            .with_target(true)
            .with_file(false)
            .with_line_number(false)
            .compact()
            .with_writer(io::stderr)
            .with_filter(env_filter(&config.default_level))
    });

    tracing_subscriber::registry()
        .with(json_layer)
        .with(stderr_layer)
        .try_init()
        .map_err(io::Error::other)?;

    if let Some(path) = &config.log_path {
        tracing::debug!(log_path = %path.display(), "observability initialized");
    }
    Ok(())
}

/// Filter from `RUST_LOG`, falling back to `default_level`, then to `info`
/// if `default_level` does not parse.
pub fn env_filter(default_level: &str) -> EnvFilter {
    EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(default_level))
        .unwrap_or_else(|_| EnvFilter::new("info"))
}

//! Tracing/logging initialization.
//!
//! Filtering comes from `RUST_LOG` with an `info` fallback. The output format
//! comes from `ARCHERP_LOG_FORMAT` (`json` or `text`); JSON is the default so
//! log shippers get structured lines without extra configuration.

use tracing_subscriber::EnvFilter;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogFormat {
    /// One JSON object per line.
    Json,
    /// Human-readable single-line output for local runs.
    Text,
}

impl LogFormat {
    fn from_env() -> Self {
        match std::env::var("ARCHERP_LOG_FORMAT").as_deref() {
            Ok("text") => LogFormat::Text,
            _ => LogFormat::Json,
        }
    }
}

/// Initialize tracing for the process.
///
/// Safe to call multiple times; only the first call installs a subscriber.
pub fn init() {
    init_with_format(LogFormat::from_env());
}

pub fn init_with_format(format: LogFormat) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));

    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_timer(tracing_subscriber::fmt::time::SystemTime)
        .with_target(false);

    let result = match format {
        LogFormat::Json => builder.json().try_init(),
        LogFormat::Text => builder.try_init(),
    };
    let _ = result;
}

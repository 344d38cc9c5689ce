//! Logging setup shared by the orchestrator binaries.
//!
//! Logs go to stderr so stdout stays parseable JSON. `RUST_LOG` wins over the
//! default level when set, and `OPSBENCH_LOG_FORMAT=json` switches to JSON lines.

use tracing::Level;
use tracing_subscriber::{EnvFilter, FmtSubscriber};

/// Env var selecting the log line format
pub const LOG_FORMAT_VAR: &str = "OPSBENCH_LOG_FORMAT";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogFormat {
    Text,
    Json,
}

impl LogFormat {
    pub fn from_value(value: Option<&str>) -> Self {
        match value {
            Some(v) if v.eq_ignore_ascii_case("json") => LogFormat::Json,
            _ => LogFormat::Text,
        }
    }
}

/// Default log level for a CLI run
pub fn level_for(verbose: bool) -> Level {
    if verbose {
        Level::DEBUG
    } else {
        Level::WARN
    }
}

/// Install the global subscriber. Later calls are no-ops.
pub fn init(verbose: bool) {
    let format = LogFormat::from_value(std::env::var(LOG_FORMAT_VAR).ok().as_deref());
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(level_for(verbose).to_string()));

    let builder = FmtSubscriber::builder()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(std::io::stderr);

    // Already installed when this is not the first call
    let _ = match format {
        LogFormat::Json => tracing::subscriber::set_global_default(builder.json().finish()),
        LogFormat::Text => tracing::subscriber::set_global_default(builder.finish()),
    };
}

//! Tracing subscriber setup.
//!
//! Logs go to stderr so stdout stays machine-readable, and optionally to a
//! file through a non-blocking writer.

use std::path::Path;

use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::{EnvFilter, Registry, layer::SubscriberExt};

use crate::{Error, Result};

/// Environment variable holding an `EnvFilter` directive.
pub const LOG_ENV: &str = "BEARING_LOG";

/// Build the filter: `BEARING_LOG` if set, else `fallback`.
pub fn env_filter(fallback: &str) -> Result<EnvFilter> {
    match std::env::var(LOG_ENV) {
        Ok(directive) if !directive.trim().is_empty() => EnvFilter::try_new(&directive)
            .map_err(|e| Error::Config(format!("Invalid {}: {}", LOG_ENV, e))),
        _ => EnvFilter::try_new(fallback)
            .map_err(|e| Error::Config(format!("Invalid log level '{}': {}", fallback, e))),
    }
}

/// Install the global subscriber.
///
/// The returned guard must be held for the life of the process when a log
/// file is configured, or buffered lines are lost on exit.
pub fn init(level: &str, file: Option<&Path>) -> Result<Option<WorkerGuard>> {
    let filter = env_filter(level)?;
    let stderr = tracing_subscriber::fmt::layer().with_writer(std::io::stderr);

    match file {
        Some(path) => {
            if let Some(parent) = path.parent() {
                if !parent.as_os_str().is_empty() {
                    std::fs::create_dir_all(parent)?;
                }
            }
            let log_file = std::fs::OpenOptions::new()
                .create(true)
                .append(true)
                .open(path)?;
            let (writer, guard) = tracing_appender::non_blocking(log_file);
            let subscriber = Registry::default().with(filter).with(stderr).with(
                tracing_subscriber::fmt::layer()
                    .with_writer(writer)
                    .with_ansi(false),
            );
            tracing::subscriber::set_global_default(subscriber).ok();
            Ok(Some(guard))
        }
        None => {
            let subscriber = Registry::default().with(filter).with(stderr);
            tracing::subscriber::set_global_default(subscriber).ok();
            Ok(None)
        }
    }
}

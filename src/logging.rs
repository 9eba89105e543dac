//! Logging setup for the host process.
//!
//! The binary calls [`init`] once and keeps the returned [`LogHandle`] alive for
//! the whole run (it owns the non-blocking file writer guard). Library
//! components never install subscribers themselves; they receive a
//! [`tracing::Span`] at construction and log inside it.

use std::fs;
use std::path::PathBuf;

use tracing::Span;
use tracing_appender::{non_blocking::WorkerGuard, rolling};
use tracing_subscriber::{EnvFilter, Registry, fmt, prelude::*};

use crate::config::LoggingConfig;

const TIME_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

/// Errors that may occur while initializing logging.
#[derive(Debug, thiserror::Error)]
pub enum LoggingError {
    /// Failed to create the directory holding the log file.
    #[error("Failed to prepare log directory {path}: {source}")]
    CreateDir {
        path: PathBuf,
        source: std::io::Error,
    },
    /// The configured log file has no file name component.
    #[error("Log file path {0} has no file name")]
    BadFileName(PathBuf),
    /// Failed to set the global tracing subscriber.
    #[error("Failed to install global tracing subscriber: {0}")]
    SetGlobal(tracing::subscriber::SetGlobalDefaultError),
}

/// Host-owned logging context.
///
/// Dropping it flushes and closes the log file writer.
pub struct LogHandle {
    _guard: Option<WorkerGuard>,
    root: Span,
}

impl LogHandle {
    /// A handle that logs nowhere special; useful for embedding and tests.
    pub fn detached() -> Self {
        Self {
            _guard: None,
            root: Span::none(),
        }
    }

    /// Span handed to one pipeline component at construction.
    pub fn component(&self, name: &'static str) -> Span {
        tracing::info_span!(parent: &self.root, "churn", component = name)
    }
}

/// Install a stderr subscriber (plus an optional log file) and return the handle.
pub fn init(config: &LoggingConfig) -> Result<LogHandle, LoggingError> {
    let timer = fmt::time::ChronoLocal::new(TIME_FORMAT.to_string());
    let stderr_layer = fmt::layer()
        .with_timer(timer.clone())
        .with_writer(std::io::stderr);

    let (file_layer, guard) = match &config.log_file {
        Some(path) => {
            let dir = path
                .parent()
                .filter(|p| !p.as_os_str().is_empty())
                .map(PathBuf::from)
                .unwrap_or_else(|| PathBuf::from("."));
            fs::create_dir_all(&dir).map_err(|source| LoggingError::CreateDir {
                path: dir.clone(),
                source,
            })?;
            let file_name = path
                .file_name()
                .ok_or_else(|| LoggingError::BadFileName(path.clone()))?;
            let appender = rolling::never(&dir, file_name);
            let (writer, guard) = tracing_appender::non_blocking(appender);
            let layer = fmt::layer()
                .with_ansi(false)
                .with_timer(timer)
                .with_writer(writer);
            (Some(layer), Some(guard))
        }
        None => (None, None),
    };

    let subscriber = Registry::default()
        .with(build_env_filter(&config.level))
        .with(stderr_layer)
        .with(file_layer);
    tracing::subscriber::set_global_default(subscriber).map_err(LoggingError::SetGlobal)?;

    let root = tracing::info_span!("churn_risk");
    match &config.log_file {
        Some(path) => tracing::info!("Logging initialized; log file at {}", path.display()),
        None => tracing::debug!("Logging initialized (stderr only)"),
    }
    Ok(LogHandle {
        _guard: guard,
        root,
    })
}

/// `RUST_LOG` wins over the configured level; unparseable levels fall back to `info`.
fn build_env_filter(level: &str) -> EnvFilter {
    EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(level))
        .unwrap_or_else(|_| EnvFilter::new("info"))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn detached_handle_hands_out_spans() {
        let handle = LogHandle::detached();
        let span = handle.component("cleaner");
        let _entered = span.enter();
        tracing::info!("no subscriber installed, still fine");
    }
}

//! Logging setup.
//!
//! Installs a `tracing` subscriber with:
//! - an `EnvFilter` built from the configured level (`RUST_LOG` wins when set)
//! - a compact stderr layer
//! - optionally, a daily-rolling file layer under `log_dir`
//!
//! Keep the returned [`LoggingGuard`] alive for the life of the process; the
//! file writer flushes when it drops.

use std::path::PathBuf;

use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{fmt, EnvFilter};

/// Default filter when neither the config nor `RUST_LOG` sets one.
pub const DEFAULT_LOG_LEVEL: &str = "info";

/// Default file name prefix for rolling log files.
pub const DEFAULT_LOG_FILE_PREFIX: &str = "layerkeep.log";

/// Logging configuration.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct LoggingConfig {
    /// Filter directive, e.g. `info` or `layerkeep=debug`.
    ///
    /// Default: info.
    pub level: String,

    /// Directory for rolling log files; `None` logs to stderr only.
    ///
    /// Default: None.
    pub log_dir: Option<PathBuf>,

    /// File name prefix inside `log_dir`.
    ///
    /// Default: layerkeep.log.
    pub file_prefix: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: DEFAULT_LOG_LEVEL.to_string(),
            log_dir: None,
            file_prefix: DEFAULT_LOG_FILE_PREFIX.to_string(),
        }
    }
}

impl LoggingConfig {
    /// Stderr-only logging at `level`.
    pub fn with_level(level: impl Into<String>) -> Self {
        Self {
            level: level.into(),
            ..Self::default()
        }
    }

    fn filter(&self) -> EnvFilter {
        EnvFilter::try_from_default_env()
            .or_else(|_| EnvFilter::try_new(&self.level))
            .unwrap_or_else(|_| EnvFilter::new(DEFAULT_LOG_LEVEL))
    }
}

/// Keeps the background log writer alive.
#[must_use = "dropping the guard stops file logging"]
pub struct LoggingGuard {
    _file: Option<WorkerGuard>,
}

impl std::fmt::Debug for LoggingGuard {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LoggingGuard")
            .field("file", &self._file.is_some())
            .finish()
    }
}

/// Installs the global subscriber.
///
/// Calling this twice is harmless: the second install is ignored.
pub fn init_logging(config: &LoggingConfig) -> LoggingGuard {
    let stderr_layer = fmt::layer()
        .with_writer(std::io::stderr)
        .with_target(false)
        .compact();

    let (file_layer, guard) = match &config.log_dir {
        Some(dir) => {
            let appender = tracing_appender::rolling::daily(dir, &config.file_prefix);
            let (writer, guard) = tracing_appender::non_blocking(appender);
            let layer = fmt::layer().with_writer(writer).with_ansi(false);
            (Some(layer), Some(guard))
        }
        None => (None, None),
    };

    let installed = tracing_subscriber::registry()
        .with(config.filter())
        .with(stderr_layer)
        .with(file_layer)
        .try_init()
        .is_ok();

    if installed {
        tracing::debug!(level = %config.level, log_dir = ?config.log_dir, "Logging initialized");
    }

    LoggingGuard { _file: guard }
}

use std::io::IsTerminal;
use std::path::{Path, PathBuf};
use std::sync::Once;

use thiserror::Error;
use tracing::subscriber::SetGlobalDefaultError;
use tracing_appender::non_blocking::WorkerGuard;
use tracing_log::LogTracer;
use tracing_log::log::SetLoggerError;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::{EnvFilter, Layer, Registry, fmt};

/// Environment variable enabling log output in tests.
pub const ENABLE_TEST_TRACING_ENV_NAME: &str = "ENABLE_TRACING";

/// Filter applied when `RUST_LOG` is not set.
const DEFAULT_LOG_FILTER: &str = "info";

#[derive(Debug, Error)]
pub enum TracingError {
    #[error("failed to create log directory `{path}`: {source}")]
    LogDirectory {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("failed to install the log bridge: {0}")]
    LogBridge(#[from] SetLoggerError),

    #[error("failed to install the global tracing subscriber: {0}")]
    Subscriber(#[from] SetGlobalDefaultError),
}

/// Keeps the non-blocking file writer alive. Buffered log lines are flushed on drop.
#[must_use]
#[derive(Debug)]
pub struct TracingGuard {
    _file_guard: Option<WorkerGuard>,
}

/// Installs the global tracing subscriber of `app_name`.
///
/// Events are written to stdout and, when `log_dir` is set, to a daily rotated file named after
/// the application. The filter comes from `RUST_LOG` and defaults to `info`. Records emitted
/// through the `log` crate are forwarded to tracing.
pub fn init_tracing(app_name: &str, log_dir: Option<&Path>) -> Result<TracingGuard, TracingError> {
    LogTracer::init()?;

    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| DEFAULT_LOG_FILTER.into());

    let stdout_layer = fmt::layer().with_ansi(std::io::stdout().is_terminal());

    let (file_layer, file_guard) = match log_dir {
        Some(log_dir) => {
            std::fs::create_dir_all(log_dir).map_err(|source| TracingError::LogDirectory {
                path: log_dir.to_path_buf(),
                source,
            })?;

            let appender = tracing_appender::rolling::daily(log_dir, format!("{app_name}.log"));
            let (non_blocking, guard) = tracing_appender::non_blocking(appender);
            let file_layer = fmt::layer().with_ansi(false).with_writer(non_blocking);

            (Some(file_layer), Some(guard))
        }
        None => (None, None),
    };

    let subscriber =
        Registry::default().with(stdout_layer.and_then(file_layer).with_filter(filter));
    tracing::subscriber::set_global_default(subscriber)?;

    Ok(TracingGuard {
        _file_guard: file_guard,
    })
}

static INIT_TEST_TRACING: Once = Once::new();

/// Installs a subscriber writing through the test harness, once per process.
///
/// Output is only produced when the `ENABLE_TRACING` environment variable is set.
pub fn init_test_tracing() {
    INIT_TEST_TRACING.call_once(|| {
        if std::env::var_os(ENABLE_TEST_TRACING_ENV_NAME).is_none() {
            return;
        }

        let filter =
            EnvFilter::try_from_default_env().unwrap_or_else(|_| DEFAULT_LOG_FILTER.into());
        let _ = fmt()
            .with_env_filter(filter)
            .with_test_writer()
            .try_init();
    });
}

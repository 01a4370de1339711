//! Migrator service binary.
//!
//! Loads the configured migrations, starts the configured runs and waits for them to finish.
//! SIGINT and SIGTERM stop every running migration gracefully.

use std::path::PathBuf;
use std::process::ExitCode;

use ::config::shared::MigratorConfig;
use telemetry::metrics::init_metrics_handle;
use telemetry::tracing::init_tracing;
use tracing::{debug, error};

use crate::config::load_migrator_config;
use crate::core::start_migrator_with_config;
use crate::error::{MigratorError, MigratorResult};

mod config;
mod core;
mod error;
mod jsonl;

/// Environment variable holding the directory log files are written to.
const LOG_DIR_ENV_NAME: &str = "APP_LOG_DIR";

fn main() -> ExitCode {
    match run() {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            eprint!("{}", err.render_report());
            ExitCode::FAILURE
        }
    }
}

fn run() -> MigratorResult<()> {
    let migrator_config = load_migrator_config()?;

    let log_dir = std::env::var_os(LOG_DIR_ENV_NAME).map(PathBuf::from);
    let _log_flusher =
        init_tracing(env!("CARGO_BIN_NAME"), log_dir.as_deref()).map_err(MigratorError::config)?;

    tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()?
        .block_on(async_main(migrator_config))
}

async fn async_main(migrator_config: MigratorConfig) -> MigratorResult<()> {
    migration::metrics::register_metrics();
    let metrics_handle = init_metrics_handle().map_err(MigratorError::config)?;

    let result = start_migrator_with_config(migrator_config).await;
    if let Err(err) = &result {
        error!("{err}");
    }

    debug!(metrics = %metrics_handle.render(), "final metrics snapshot");

    result
}

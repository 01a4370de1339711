use std::sync::Arc;

use anyhow::{Context, bail};
use config::shared::{MigrationConfig, MigrationRunConfig, MigratorConfig};
use migration::destination::memory::MemoryDestination;
use migration::error::{MigrationError, MigrationResult};
use migration::factory::RegistryMigrationFactory;
use migration::manager::MigrationManager;
use migration::monitor::MigrationObserver;
use migration::orchestrator::DataMigration;
use migration::types::{MigrationId, MigrationInformation, MigrationParameters, MigrationStatus};
use serde_json::Value;
use tokio::signal::unix::{SignalKind, signal};
use tokio::task::JoinSet;
use tracing::{debug, error, info, warn};

use crate::error::{MigratorError, MigratorResult};
use crate::jsonl::{JsonLinesDestination, JsonLinesSource};

/// Builds the factory of every configured migration.
///
/// Sources and destinations are chosen from the binding names of each migration.
pub fn build_factory(migrations: &[MigrationConfig]) -> anyhow::Result<RegistryMigrationFactory> {
    let mut factory = RegistryMigrationFactory::new();

    for migration in migrations {
        debug!(
            migration_name = %migration.name,
            source = %migration.source,
            destination = %migration.destination,
            model = %migration.model,
            "registering migration"
        );

        let registered = match (migration.source.as_str(), migration.destination.as_str()) {
            ("jsonl", "jsonl") => factory.register(migration.clone(), |_: &MigrationParameters| {
                Ok((JsonLinesSource::new(), JsonLinesDestination::new()))
            }),
            ("jsonl", "memory") => factory.register(migration.clone(), |_: &MigrationParameters| {
                Ok((JsonLinesSource::new(), MemoryDestination::<Value>::new()))
            }),
            (source, destination) => bail!(
                "migration `{}` uses unsupported bindings `{source}` -> `{destination}`",
                migration.name
            ),
        };
        registered.with_context(|| format!("failed to register migration `{}`", migration.name))?;
    }

    Ok(factory)
}

/// Logs every snapshot of the migrations it is subscribed to.
struct ProgressLogger;

impl MigrationObserver for ProgressLogger {
    fn on_next(&self, information: &MigrationInformation) -> MigrationResult<()> {
        match information.status {
            MigrationStatus::Exception => error!(
                migration_id = %information.id,
                migration_name = %information.name,
                produced = information.total_records_produced,
                consumed = information.total_records_consumed,
                errors = information.total_records_errors,
                error = %information.last_error_message().unwrap_or_default(),
                "migration failed"
            ),
            status => info!(
                migration_id = %information.id,
                migration_name = %information.name,
                %status,
                produced = information.total_records_produced,
                consumed = information.total_records_consumed,
                errors = information.total_records_errors,
                "migration progress"
            ),
        }

        Ok(())
    }
}

/// Starts every configured run and waits for all of them to finish.
///
/// SIGINT and SIGTERM stop every running migration. Fails if any run ended with an error.
pub async fn start_migrator_with_config(migrator_config: MigratorConfig) -> MigratorResult<()> {
    info!(
        migrations = migrator_config.migrations.len(),
        runs = migrator_config.runs.len(),
        "starting migrator service"
    );

    let factory = build_factory(&migrator_config.migrations)?;
    let manager = Arc::new(MigrationManager::new(
        Arc::new(factory),
        &migrator_config.manager,
    )?);

    // Every run is created before any is started, so a failed creation leaves nothing running.
    let migrations = create_runs(&manager, migrator_config.runs)?;

    let observer: Arc<dyn MigrationObserver> = Arc::new(ProgressLogger);
    let mut subscriptions = Vec::with_capacity(migrations.len());
    let mut runs = JoinSet::new();
    for migration in migrations {
        subscriptions.push(migration.subscribe(Arc::clone(&observer)));

        runs.spawn(async move { migration.start().await });
    }

    if runs.is_empty() {
        warn!("no migration runs configured, nothing to do");
        return Ok(());
    }

    let shutdown_manager = Arc::clone(&manager);
    let shutdown_handle = tokio::spawn(async move {
        let mut sigterm = match signal(SignalKind::terminate()) {
            Ok(sigterm) => sigterm,
            Err(err) => {
                warn!(error = %err, "failed to register sigterm handler, only ctrl+c stops migrations");
                if tokio::signal::ctrl_c().await.is_ok() {
                    info!("sigint (ctrl+c) received, stopping migrations");
                    shutdown_manager.stop_all();
                }
                return;
            }
        };

        tokio::select! {
            _ = tokio::signal::ctrl_c() => {
                info!("sigint (ctrl+c) received, stopping migrations");
            }
            _ = sigterm.recv() => {
                info!("sigterm received, stopping migrations");
            }
        }

        shutdown_manager.stop_all();
    });

    let mut failures = Vec::new();
    while let Some(result) = runs.join_next().await {
        match result {
            Ok(Ok(information)) => {
                if let Some(err) = information.last_error {
                    failures.push(err);
                }
            }
            Ok(Err(err)) => failures.push(err),
            Err(err) => {
                return Err(MigratorError::Setup(
                    anyhow::Error::new(err).context("migration task failed"),
                ));
            }
        }
    }

    shutdown_handle.abort();
    let _ = shutdown_handle.await;

    for subscription in subscriptions {
        subscription.unsubscribe();
    }

    log_summary(&manager);

    if !failures.is_empty() {
        return Err(MigrationError::from(failures).into());
    }

    Ok(())
}

fn create_runs(
    manager: &MigrationManager,
    runs: Vec<MigrationRunConfig>,
) -> MigrationResult<Vec<Arc<dyn DataMigration>>> {
    runs.into_iter()
        .map(|run| {
            let parameters: MigrationParameters = run.parameters.into_iter().collect();
            manager.create(MigrationId::new_v4(), &run.name, parameters)
        })
        .collect()
}

fn log_summary(manager: &MigrationManager) {
    for information in manager.list() {
        info!(
            migration_id = %information.id,
            migration_name = %information.name,
            status = %information.status,
            produced = information.total_records_produced,
            consumed = information.total_records_consumed,
            errors = information.total_records_errors,
            "migration finished"
        );
    }
}

use std::collections::BTreeMap;
use std::sync::Arc;

use config::shared::MigrationConfig;
use tracing::debug;

use crate::bail;
use crate::destination::Destination;
use crate::error::{ErrorKind, MigrationResult};
use crate::orchestrator::{DataMigration, MigrationOrchestrator};
use crate::source::Source;
use crate::types::{MigrationId, MigrationParameters};

/// Builds migrations by name.
pub trait MigrationFactory: Send + Sync {
    /// Creates a new, not yet started, migration named `name`.
    fn create(
        &self,
        id: MigrationId,
        name: &str,
        parameters: MigrationParameters,
    ) -> MigrationResult<Arc<dyn DataMigration>>;
}

type BuildMigration = dyn Fn(MigrationId, MigrationParameters) -> MigrationResult<Arc<dyn DataMigration>>
    + Send
    + Sync;

struct Registration {
    config: MigrationConfig,
    create: Arc<BuildMigration>,
}

/// [`MigrationFactory`] over a set of named migration configurations.
///
/// Every registered name maps to its settings and to a function building the source and
/// destination pair from the parameters of a run.
#[derive(Default)]
pub struct RegistryMigrationFactory {
    registrations: BTreeMap<String, Registration>,
}

impl RegistryMigrationFactory {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers the migration described by `config`.
    ///
    /// Fails if the configuration is invalid or a migration with the same name is already
    /// registered.
    pub fn register<T, S, D, F>(&mut self, config: MigrationConfig, build: F) -> MigrationResult<()>
    where
        T: Send + 'static,
        S: Source<T> + Clone + 'static,
        D: Destination<T> + Clone + 'static,
        F: Fn(&MigrationParameters) -> MigrationResult<(S, D)> + Send + Sync + 'static,
    {
        config.validate()?;

        if self.registrations.contains_key(&config.name) {
            bail!(
                ErrorKind::ConfigError,
                "Migration is already registered",
                format!("duplicate migration `{}`", config.name)
            );
        }

        let name: Arc<str> = Arc::from(config.name.as_str());
        let settings = config.settings_or_default();
        let create: Arc<BuildMigration> = Arc::new(
            move |id: MigrationId,
                  parameters: MigrationParameters|
                  -> MigrationResult<Arc<dyn DataMigration>> {
                let (source, destination) = build(&parameters)?;
                let migration = MigrationOrchestrator::<T, S, D>::new(
                    id,
                    Arc::clone(&name),
                    parameters,
                    settings.clone(),
                    source,
                    destination,
                )?;

                Ok(Arc::new(migration))
            },
        );

        debug!(migration_name = %config.name, "registered migration");
        self.registrations
            .insert(config.name.clone(), Registration { config, create });

        Ok(())
    }

    /// Returns the registered configurations ordered by name.
    pub fn configurations(&self) -> Vec<&MigrationConfig> {
        self.registrations
            .values()
            .map(|registration| &registration.config)
            .collect()
    }

    pub fn contains(&self, name: &str) -> bool {
        self.registrations.contains_key(name)
    }
}

impl MigrationFactory for RegistryMigrationFactory {
    fn create(
        &self,
        id: MigrationId,
        name: &str,
        parameters: MigrationParameters,
    ) -> MigrationResult<Arc<dyn DataMigration>> {
        if name.trim().is_empty() {
            bail!(ErrorKind::ConfigError, "Migration name cannot be blank");
        }

        let Some(registration) = self.registrations.get(name) else {
            bail!(
                ErrorKind::ConfigError,
                "No migration registered under this name",
                format!("unknown migration `{name}`")
            );
        };

        (registration.create)(id, parameters)
    }
}

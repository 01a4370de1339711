use std::sync::Arc;

use config::shared::ManagerConfig;
use tracing::{debug, info};

use crate::error::{ErrorKind, MigrationResult};
use crate::factory::MigrationFactory;
use crate::migration_error;
use crate::orchestrator::DataMigration;
use crate::registry::BoundedRegistry;
use crate::types::{MigrationId, MigrationInformation, MigrationParameters};

/// Entry point mapping migration ids to their migrations.
///
/// Migrations are built by the injected [`MigrationFactory`] and tracked in a
/// [`BoundedRegistry`], so the oldest ones are forgotten once
/// [`ManagerConfig::max_tracked_migrations`] is exceeded. The manager never starts or stops a
/// migration on its own, apart from [`MigrationManager::stop_all`].
pub struct MigrationManager {
    factory: Arc<dyn MigrationFactory>,
    migrations: BoundedRegistry<MigrationId, Arc<dyn DataMigration>>,
}

impl MigrationManager {
    pub fn new(factory: Arc<dyn MigrationFactory>, config: &ManagerConfig) -> MigrationResult<Self> {
        config.validate()?;

        Ok(Self {
            factory,
            migrations: BoundedRegistry::new(config.max_tracked_migrations, config.trim_batch)?,
        })
    }

    /// Returns the migration tracked under `id`, building and tracking it first if needed.
    ///
    /// `name` and `parameters` are ignored when a migration with this id already exists.
    pub fn create(
        &self,
        id: MigrationId,
        name: &str,
        parameters: MigrationParameters,
    ) -> MigrationResult<Arc<dyn DataMigration>> {
        self.migrations.get_or_try_insert_with(id, || {
            let migration = self.factory.create(id, name, parameters)?;
            info!(migration_id = %id, migration_name = name, "created migration");

            Ok(migration)
        })
    }

    /// Returns the migration tracked under `id`.
    pub fn get(&self, id: MigrationId) -> MigrationResult<Arc<dyn DataMigration>> {
        self.migrations.get(&id).ok_or_else(|| {
            migration_error!(
                ErrorKind::MigrationNotFound,
                "Migration not found",
                format!("no migration is tracked under id {id}")
            )
        })
    }

    /// Returns a snapshot of every tracked migration, oldest first.
    pub fn list(&self) -> Vec<MigrationInformation> {
        self.migrations
            .values()
            .iter()
            .map(|migration| migration.information())
            .collect()
    }

    /// Stops tracking the migration under `id` and returns it.
    pub fn remove(&self, id: MigrationId) -> Option<Arc<dyn DataMigration>> {
        let migration = self.migrations.remove(&id);
        if migration.is_some() {
            debug!(migration_id = %id, "removed migration");
        }

        migration
    }

    /// Requests every tracked migration to stop.
    pub fn stop_all(&self) {
        let migrations = self.migrations.values();
        info!(migrations = migrations.len(), "stopping all migrations");

        for migration in migrations {
            migration.stop();
        }
    }

    pub fn len(&self) -> usize {
        self.migrations.len()
    }

    pub fn is_empty(&self) -> bool {
        self.migrations.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use config::shared::MigrationConfig;

    use super::*;
    use crate::destination::memory::MemoryDestination;
    use crate::factory::RegistryMigrationFactory;
    use crate::source::memory::MemorySource;

    fn manager(config: &ManagerConfig) -> MigrationManager {
        let mut factory = RegistryMigrationFactory::new();
        factory
            .register(
                MigrationConfig {
                    name: "numbers".to_string(),
                    source: "memory".to_string(),
                    destination: "memory".to_string(),
                    model: "u32".to_string(),
                    settings: None,
                },
                |_: &MigrationParameters| {
                    Ok((MemorySource::new(0..3u32), MemoryDestination::<u32>::new()))
                },
            )
            .unwrap();

        MigrationManager::new(Arc::new(factory), config).unwrap()
    }

    #[test]
    fn create_returns_the_tracked_migration() {
        let manager = manager(&ManagerConfig::default());
        let id = MigrationId::new_v4();

        let first = manager
            .create(id, "numbers", MigrationParameters::new())
            .unwrap();
        let second = manager
            .create(id, "numbers", MigrationParameters::new())
            .unwrap();

        assert!(Arc::ptr_eq(&first, &second));
        assert_eq!(manager.len(), 1);
    }

    #[test]
    fn get_unknown_id_is_not_found() {
        let manager = manager(&ManagerConfig::default());

        let err = manager.get(MigrationId::new_v4()).err().unwrap();

        assert_eq!(err.kind(), ErrorKind::MigrationNotFound);
    }

    #[test]
    fn failed_creation_is_not_tracked() {
        let manager = manager(&ManagerConfig::default());

        let err = manager
            .create(MigrationId::new_v4(), "unknown", MigrationParameters::new())
            .err()
            .unwrap();

        assert_eq!(err.kind(), ErrorKind::ConfigError);
        assert!(manager.is_empty());
    }

    #[test]
    fn oldest_migrations_are_forgotten() {
        let manager = manager(&ManagerConfig {
            max_tracked_migrations: 2,
            trim_batch: 1,
        });
        let ids: Vec<_> = (0..3).map(|_| MigrationId::new_v4()).collect();

        for id in &ids {
            manager
                .create(*id, "numbers", MigrationParameters::new())
                .unwrap();
        }

        assert!(manager.get(ids[0]).is_err());
        assert!(manager.get(ids[2]).is_ok());
        assert_eq!(manager.list().len(), 2);
    }

    #[test]
    fn remove_stops_tracking() {
        let manager = manager(&ManagerConfig::default());
        let id = MigrationId::new_v4();
        manager
            .create(id, "numbers", MigrationParameters::new())
            .unwrap();

        assert!(manager.remove(id).is_some());
        assert!(manager.remove(id).is_none());
        assert!(manager.get(id).is_err());
    }
}

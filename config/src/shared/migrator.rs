use std::collections::{BTreeMap, HashSet};

use serde::{Deserialize, Serialize};

use crate::Config;
use crate::shared::{ManagerConfig, MigrationConfig, ValidationError};

/// Top-level configuration of the `migrator` service.
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub struct MigratorConfig {
    /// Migrations that can be started, keyed by their unique name.
    pub migrations: Vec<MigrationConfig>,
    #[serde(default)]
    pub manager: ManagerConfig,
    /// Runs started when the service boots.
    #[serde(default)]
    pub runs: Vec<MigrationRunConfig>,
}

impl MigratorConfig {
    /// Validates every migration, the manager bounds and that runs only refer to known
    /// migrations.
    pub fn validate(&self) -> Result<(), ValidationError> {
        self.manager.validate()?;

        let mut names = HashSet::with_capacity(self.migrations.len());
        for migration in &self.migrations {
            migration.validate()?;

            if !names.insert(migration.name.as_str()) {
                return Err(ValidationError::DuplicateMigration(migration.name.clone()));
            }
        }

        for run in &self.runs {
            if !names.contains(run.name.as_str()) {
                return Err(ValidationError::UnknownMigration(run.name.clone()));
            }
        }

        Ok(())
    }
}

impl Config for MigratorConfig {
    const LIST_PARSE_KEYS: &'static [&'static str] = &[];
}

/// A migration run to start at boot.
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub struct MigrationRunConfig {
    /// Name of the migration to run.
    pub name: String,
    /// Parameters handed verbatim to the source and destination.
    #[serde(default)]
    pub parameters: BTreeMap<String, String>,
}

use serde::{Deserialize, Serialize};

use crate::shared::{MigrationSettings, ValidationError};

/// Declares a named migration and the bindings it is built from.
///
/// `source` and `destination` name the implementations the factory wires together, `model`
/// names the record type and is informational only.
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub struct MigrationConfig {
    pub name: String,
    pub source: String,
    pub destination: String,
    #[serde(default)]
    pub model: String,
    /// Default settings of the migration, [`MigrationSettings::default`] when absent.
    #[serde(default)]
    pub settings: Option<MigrationSettings>,
}

impl MigrationConfig {
    /// Returns the configured settings or the defaults.
    pub fn settings_or_default(&self) -> MigrationSettings {
        self.settings.clone().unwrap_or_default()
    }

    pub fn validate(&self) -> Result<(), ValidationError> {
        if self.name.trim().is_empty() {
            return Err(ValidationError::BlankMigrationName);
        }

        for (field, value) in [("source", &self.source), ("destination", &self.destination)] {
            if value.trim().is_empty() {
                return Err(ValidationError::BlankBinding {
                    migration: self.name.clone(),
                    field,
                });
            }
        }

        if let Some(settings) = &self.settings {
            settings.validate()?;
        }

        Ok(())
    }
}

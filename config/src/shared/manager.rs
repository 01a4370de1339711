use serde::{Deserialize, Serialize};

use crate::shared::ValidationError;

/// Bounds on how many migrations the manager keeps track of.
///
/// Once `max_tracked_migrations + trim_batch` migrations are tracked, the oldest
/// `trim_batch` of them are forgotten in one step.
#[derive(Clone, Copy, Debug, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub struct ManagerConfig {
    #[serde(default = "default_max_tracked_migrations")]
    pub max_tracked_migrations: usize,
    #[serde(default = "default_trim_batch")]
    pub trim_batch: usize,
}

impl ManagerConfig {
    /// Default capacity of the migration registry.
    pub const DEFAULT_MAX_TRACKED_MIGRATIONS: usize = 100;

    /// Default number of entries evicted at once.
    pub const DEFAULT_TRIM_BATCH: usize = 10;

    pub fn validate(&self) -> Result<(), ValidationError> {
        if self.max_tracked_migrations == 0 {
            return Err(ValidationError::ManagerConfig(
                "`max_tracked_migrations` must be greater than zero".to_owned(),
            ));
        }

        if self.trim_batch == 0 {
            return Err(ValidationError::ManagerConfig(
                "`trim_batch` must be greater than zero".to_owned(),
            ));
        }

        Ok(())
    }
}

impl Default for ManagerConfig {
    fn default() -> Self {
        Self {
            max_tracked_migrations: default_max_tracked_migrations(),
            trim_batch: default_trim_batch(),
        }
    }
}

fn default_max_tracked_migrations() -> usize {
    ManagerConfig::DEFAULT_MAX_TRACKED_MIGRATIONS
}

fn default_trim_batch() -> usize {
    ManagerConfig::DEFAULT_TRIM_BATCH
}

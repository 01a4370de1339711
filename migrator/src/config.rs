use config::load_config;
use config::shared::MigratorConfig;

use crate::error::{MigratorError, MigratorResult};

/// Loads and validates the migrator configuration.
pub fn load_migrator_config() -> MigratorResult<MigratorConfig> {
    let config = load_config::<MigratorConfig>().map_err(MigratorError::config)?;
    config.validate().map_err(MigratorError::config)?;

    Ok(config)
}

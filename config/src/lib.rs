//! Configuration types and loading for the migration workspace.
//!
//! The [`shared`] module holds the serde-deserializable configuration used by both the
//! migration engine and the `migrator` service, while [`load_config`] reads it from the
//! `configuration` directory and `APP_` environment overrides.

pub mod environment;
mod load;
pub mod shared;

pub use load::{Config, LoadConfigError, load_config, load_config_from};

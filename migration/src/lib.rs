//! Batch data migration engine.
//!
//! A migration moves records of one type from a [`source::Source`] to a
//! [`destination::Destination`]. The [`orchestrator::MigrationOrchestrator`] drives the run:
//! it pulls batches through the producer fan-out, optionally buffered ahead of time by a
//! [`concurrency::buffered::BufferedProducer`], splits them over concurrent consumers, keeps
//! cumulative counts in a [`status::StatusCollector`] and reports progress to observers
//! registered on its [`monitor::MigrationMonitor`].
//!
//! Migrations are built by name through a [`factory::MigrationFactory`] and tracked by id in
//! the [`manager::MigrationManager`].
//!
//! ```rust,no_run
//! use std::sync::Arc;
//!
//! use config::shared::{ManagerConfig, MigrationConfig};
//! use migration::destination::memory::MemoryDestination;
//! use migration::error::MigrationResult;
//! use migration::factory::RegistryMigrationFactory;
//! use migration::manager::MigrationManager;
//! use migration::source::memory::MemorySource;
//! use migration::types::{MigrationId, MigrationParameters};
//!
//! # async fn example(config: MigrationConfig) -> MigrationResult<()> {
//! let mut factory = RegistryMigrationFactory::new();
//! factory.register(config, |_: &MigrationParameters| {
//!     Ok((MemorySource::new(0..100u32), MemoryDestination::<u32>::new()))
//! })?;
//!
//! let manager = MigrationManager::new(Arc::new(factory), &ManagerConfig::default())?;
//! let migration = manager.create(MigrationId::new_v4(), "numbers", MigrationParameters::new())?;
//! let information = migration.start().await?;
//! println!("{}: {}", information.name, information.status);
//! # Ok(())
//! # }
//! ```

pub mod concurrency;
pub mod destination;
pub mod error;
pub mod factory;
mod macros;
pub mod manager;
pub mod metrics;
pub mod monitor;
pub mod orchestrator;
pub mod registry;
pub mod source;
pub mod status;
#[cfg(any(test, feature = "test-utils"))]
pub mod test_utils;
pub mod types;

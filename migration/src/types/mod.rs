//! Common types exchanged between the migration engine, its observers and callers.

mod information;
mod status;

pub use information::*;
pub use status::*;

use std::collections::BTreeMap;

/// Process-unique identifier of a migration.
pub type MigrationId = uuid::Uuid;

/// Opaque parameters handed verbatim to the source and destination when they are prepared.
pub type MigrationParameters = BTreeMap<String, String>;

//! Destinations records are migrated to.

mod base;
pub mod memory;

pub use base::Destination;

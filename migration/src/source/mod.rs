//! Sources records are migrated from.

mod base;
pub mod memory;

pub use base::Source;

mod base;
mod manager;
mod migration;
mod migrator;
mod settings;

pub use base::*;
pub use manager::*;
pub use migration::*;
pub use migrator::*;
pub use settings::*;

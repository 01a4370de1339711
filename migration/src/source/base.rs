use std::future::Future;

use crate::error::MigrationResult;
use crate::types::{MigrationParameters, MigrationStatus};

/// Pull-based supplier of records for a migration.
///
/// A source is prepared once with the run parameters, then asked for batches until it returns an
/// empty one, which signals exhaustion. Sources are not restartable.
///
/// Several produce calls may run concurrently when the migration is configured with more than
/// one producer, each on its own clone of the source. Clones must therefore share the underlying
/// cursor so that no record is handed out twice.
pub trait Source<T>: Send + Sync {
    /// Returns the name of the source, used in logs.
    fn name() -> &'static str;

    /// Prepares the source for a run with the given parameters.
    fn prepare(
        &self,
        parameters: &MigrationParameters,
    ) -> impl Future<Output = MigrationResult<()>> + Send;

    /// Returns up to `batch_size` records, or an empty batch once the source is exhausted.
    fn produce(&self, batch_size: usize) -> impl Future<Output = MigrationResult<Vec<T>>> + Send;

    /// Releases resources held by the source once the run ended with `status`.
    ///
    /// Called exactly once per started run, whatever the outcome. The default implementation is
    /// a no-op.
    fn cleanup(&self, status: MigrationStatus) -> impl Future<Output = MigrationResult<()>> + Send {
        let _ = status;
        async { Ok(()) }
    }
}

use std::future::Future;

use crate::error::MigrationResult;
use crate::types::{MigrationParameters, MigrationStatus};

/// Receiver of migrated records.
///
/// Several consume calls may run concurrently, each with a disjoint slice of the batch, when the
/// migration is configured with more than one consumer.
pub trait Destination<T>: Send + Sync {
    /// Returns the name of the destination, used in logs.
    fn name() -> &'static str;

    /// Prepares the destination for a run with the given parameters.
    fn prepare(
        &self,
        parameters: &MigrationParameters,
    ) -> impl Future<Output = MigrationResult<()>> + Send;

    /// Writes `records` and returns how many of them were written successfully.
    ///
    /// The returned count must not exceed `records.len()`. The gap between the two is accounted
    /// as failed records, the destination does not need to say which ones failed.
    fn consume(&self, records: Vec<T>) -> impl Future<Output = MigrationResult<usize>> + Send;

    /// Releases resources held by the destination once the run ended with `status`.
    ///
    /// Called exactly once per started run, whatever the outcome. The default implementation is
    /// a no-op.
    fn cleanup(&self, status: MigrationStatus) -> impl Future<Output = MigrationResult<()>> + Send {
        let _ = status;
        async { Ok(()) }
    }
}

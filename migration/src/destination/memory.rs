use std::sync::Arc;

use tokio::sync::Mutex;
use tracing::debug;

use crate::destination::Destination;
use crate::error::MigrationResult;
use crate::types::{MigrationParameters, MigrationStatus};

#[derive(Debug)]
struct Inner<T> {
    records: Vec<T>,
    consume_calls: usize,
    parameters: Option<MigrationParameters>,
    cleanup_status: Option<MigrationStatus>,
}

/// Destination keeping every consumed record in memory.
///
/// Useful for tests and dry runs, clones share the same storage.
#[derive(Debug)]
pub struct MemoryDestination<T> {
    inner: Arc<Mutex<Inner<T>>>,
}

impl<T> MemoryDestination<T> {
    pub fn new() -> Self {
        Self {
            inner: Arc::new(Mutex::new(Inner {
                records: Vec::new(),
                consume_calls: 0,
                parameters: None,
                cleanup_status: None,
            })),
        }
    }

    /// Returns a copy of every record consumed so far.
    pub async fn records(&self) -> Vec<T>
    where
        T: Clone,
    {
        self.inner.lock().await.records.clone()
    }

    /// Returns how many times [`Destination::consume`] was called.
    pub async fn consume_calls(&self) -> usize {
        self.inner.lock().await.consume_calls
    }

    pub async fn parameters(&self) -> Option<MigrationParameters> {
        self.inner.lock().await.parameters.clone()
    }

    pub async fn cleanup_status(&self) -> Option<MigrationStatus> {
        self.inner.lock().await.cleanup_status
    }
}

impl<T> Default for MemoryDestination<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T> Clone for MemoryDestination<T> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl<T> Destination<T> for MemoryDestination<T>
where
    T: Send + Sync,
{
    fn name() -> &'static str {
        "memory"
    }

    async fn prepare(&self, parameters: &MigrationParameters) -> MigrationResult<()> {
        self.inner.lock().await.parameters = Some(parameters.clone());
        Ok(())
    }

    async fn consume(&self, records: Vec<T>) -> MigrationResult<usize> {
        let consumed = records.len();
        let mut inner = self.inner.lock().await;
        inner.records.extend(records);
        inner.consume_calls += 1;

        debug!(records = consumed, "consumed records into memory");

        Ok(consumed)
    }

    async fn cleanup(&self, status: MigrationStatus) -> MigrationResult<()> {
        self.inner.lock().await.cleanup_status = Some(status);
        Ok(())
    }
}

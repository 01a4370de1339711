use std::collections::VecDeque;
use std::sync::Arc;

use tokio::sync::Mutex;
use tracing::debug;

use crate::error::MigrationResult;
use crate::source::Source;
use crate::types::{MigrationParameters, MigrationStatus};

#[derive(Debug)]
struct Inner<T> {
    records: VecDeque<T>,
    parameters: Option<MigrationParameters>,
    cleanup_status: Option<MigrationStatus>,
}

/// Source handing out records held in memory, in insertion order.
///
/// Clones share the same records, which makes the source usable with several producers.
#[derive(Debug)]
pub struct MemorySource<T> {
    inner: Arc<Mutex<Inner<T>>>,
}

impl<T> MemorySource<T> {
    pub fn new(records: impl IntoIterator<Item = T>) -> Self {
        Self {
            inner: Arc::new(Mutex::new(Inner {
                records: records.into_iter().collect(),
                parameters: None,
                cleanup_status: None,
            })),
        }
    }

    /// Returns how many records have not been produced yet.
    pub async fn remaining(&self) -> usize {
        self.inner.lock().await.records.len()
    }

    /// Returns the parameters the source was prepared with.
    pub async fn parameters(&self) -> Option<MigrationParameters> {
        self.inner.lock().await.parameters.clone()
    }

    /// Returns the status the source was cleaned up with.
    pub async fn cleanup_status(&self) -> Option<MigrationStatus> {
        self.inner.lock().await.cleanup_status
    }
}

impl<T> Clone for MemorySource<T> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl<T> Source<T> for MemorySource<T>
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

    async fn produce(&self, batch_size: usize) -> MigrationResult<Vec<T>> {
        let mut inner = self.inner.lock().await;
        let take = batch_size.min(inner.records.len());
        let batch: Vec<T> = inner.records.drain(..take).collect();

        debug!(records = batch.len(), remaining = inner.records.len(), "produced records from memory");

        Ok(batch)
    }

    async fn cleanup(&self, status: MigrationStatus) -> MigrationResult<()> {
        self.inner.lock().await.cleanup_status = Some(status);
        Ok(())
    }
}

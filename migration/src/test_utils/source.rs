use std::collections::VecDeque;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::time::Duration;

use tokio::sync::Mutex;

use crate::bail;
use crate::error::{ErrorKind, MigrationResult};
use crate::source::Source;
use crate::types::{MigrationParameters, MigrationStatus};

/// Step returned by a [`ScriptedSource`] on one produce call.
#[derive(Debug, Clone)]
pub enum ScriptStep<T> {
    Batch(Vec<T>),
    Fail,
    Panic,
    /// Never returns, until the produce call is dropped.
    Hang,
}

#[derive(Debug)]
struct ScriptedInner<T> {
    steps: VecDeque<ScriptStep<T>>,
    cleanup_status: Option<MigrationStatus>,
    fail_prepare: bool,
}

/// Source returning a fixed sequence of steps, then empty batches.
///
/// The requested batch size is ignored, every step is returned as scripted.
#[derive(Debug)]
pub struct ScriptedSource<T> {
    inner: Arc<Mutex<ScriptedInner<T>>>,
    produce_calls: Arc<AtomicUsize>,
}

impl<T> ScriptedSource<T> {
    pub fn new(steps: impl IntoIterator<Item = ScriptStep<T>>) -> Self {
        Self {
            inner: Arc::new(Mutex::new(ScriptedInner {
                steps: steps.into_iter().collect(),
                cleanup_status: None,
                fail_prepare: false,
            })),
            produce_calls: Arc::new(AtomicUsize::new(0)),
        }
    }

    /// Creates a source returning each of `batches` once.
    pub fn batches(batches: impl IntoIterator<Item = Vec<T>>) -> Self {
        Self::new(batches.into_iter().map(ScriptStep::Batch))
    }

    /// Makes [`Source::prepare`] fail.
    pub async fn fail_prepare(&self) {
        self.inner.lock().await.fail_prepare = true;
    }

    pub fn produce_calls(&self) -> usize {
        self.produce_calls.load(Ordering::SeqCst)
    }

    pub async fn cleanup_status(&self) -> Option<MigrationStatus> {
        self.inner.lock().await.cleanup_status
    }
}

impl<T> Clone for ScriptedSource<T> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
            produce_calls: Arc::clone(&self.produce_calls),
        }
    }
}

impl<T> Source<T> for ScriptedSource<T>
where
    T: Send + Sync,
{
    fn name() -> &'static str {
        "scripted"
    }

    async fn prepare(&self, _parameters: &MigrationParameters) -> MigrationResult<()> {
        if self.inner.lock().await.fail_prepare {
            bail!(ErrorKind::SourcePrepareFailed, "Scripted source prepare failed");
        }

        Ok(())
    }

    async fn produce(&self, _batch_size: usize) -> MigrationResult<Vec<T>> {
        self.produce_calls.fetch_add(1, Ordering::SeqCst);

        let step = self.inner.lock().await.steps.pop_front();
        match step {
            Some(ScriptStep::Batch(batch)) => Ok(batch),
            Some(ScriptStep::Fail) => {
                bail!(ErrorKind::SourceProduceFailed, "Scripted source produce failed")
            }
            Some(ScriptStep::Panic) => panic!("scripted source panicked"),
            Some(ScriptStep::Hang) => std::future::pending().await,
            None => Ok(Vec::new()),
        }
    }

    async fn cleanup(&self, status: MigrationStatus) -> MigrationResult<()> {
        self.inner.lock().await.cleanup_status = Some(status);
        Ok(())
    }
}

/// Source that never runs out, yielding increasing numbers.
#[derive(Debug, Clone, Default)]
pub struct EndlessSource {
    next: Arc<AtomicU64>,
    produce_calls: Arc<AtomicUsize>,
    delay: Duration,
}

impl EndlessSource {
    pub fn new() -> Self {
        Self::default()
    }

    /// Delays every produce call by `delay`.
    pub fn with_delay(delay: Duration) -> Self {
        Self {
            delay,
            ..Self::default()
        }
    }

    pub fn produce_calls(&self) -> usize {
        self.produce_calls.load(Ordering::SeqCst)
    }

    /// Returns how many records were handed out.
    pub fn produced(&self) -> u64 {
        self.next.load(Ordering::SeqCst)
    }
}

impl Source<u64> for EndlessSource {
    fn name() -> &'static str {
        "endless"
    }

    async fn prepare(&self, _parameters: &MigrationParameters) -> MigrationResult<()> {
        Ok(())
    }

    async fn produce(&self, batch_size: usize) -> MigrationResult<Vec<u64>> {
        self.produce_calls.fetch_add(1, Ordering::SeqCst);
        if !self.delay.is_zero() {
            tokio::time::sleep(self.delay).await;
        }

        let start = self.next.fetch_add(batch_size as u64, Ordering::SeqCst);

        Ok((start..start + batch_size as u64).collect())
    }
}

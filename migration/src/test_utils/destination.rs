use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use tokio::sync::Mutex;

use crate::bail;
use crate::error::{ErrorKind, MigrationResult};
use crate::destination::Destination;
use crate::types::{MigrationParameters, MigrationStatus};

#[derive(Debug)]
struct Inner<T> {
    records: Vec<T>,
    slice_sizes: Vec<usize>,
    parameters: Option<MigrationParameters>,
    cleanup_status: Option<MigrationStatus>,
    cleanup_calls: usize,
}

/// Destination recording every consume call.
///
/// It can under-report its success count, delay each call and fail its cleanup, and keeps track
/// of how many consume calls were in flight at the same time.
#[derive(Debug)]
pub struct RecordingDestination<T> {
    inner: Arc<Mutex<Inner<T>>>,
    in_flight: Arc<AtomicUsize>,
    max_in_flight: Arc<AtomicUsize>,
    under_report: usize,
    delay: Duration,
    fail_consume: bool,
    fail_cleanup: bool,
}

impl<T> RecordingDestination<T> {
    pub fn new() -> Self {
        Self {
            inner: Arc::new(Mutex::new(Inner {
                records: Vec::new(),
                slice_sizes: Vec::new(),
                parameters: None,
                cleanup_status: None,
                cleanup_calls: 0,
            })),
            in_flight: Arc::new(AtomicUsize::new(0)),
            max_in_flight: Arc::new(AtomicUsize::new(0)),
            under_report: 0,
            delay: Duration::ZERO,
            fail_consume: false,
            fail_cleanup: false,
        }
    }

    /// Reports `count` fewer records than received on every consume call.
    pub fn under_reporting(mut self, count: usize) -> Self {
        self.under_report = count;
        self
    }

    /// Sleeps for `delay` inside every consume call.
    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = delay;
        self
    }

    pub fn failing_consume(mut self) -> Self {
        self.fail_consume = true;
        self
    }

    pub fn failing_cleanup(mut self) -> Self {
        self.fail_cleanup = true;
        self
    }

    pub async fn records(&self) -> Vec<T>
    where
        T: Clone,
    {
        self.inner.lock().await.records.clone()
    }

    /// Returns the size of the slice received by every consume call, in call order.
    pub async fn slice_sizes(&self) -> Vec<usize> {
        self.inner.lock().await.slice_sizes.clone()
    }

    pub async fn consume_calls(&self) -> usize {
        self.inner.lock().await.slice_sizes.len()
    }

    /// Returns the largest number of consume calls observed running at the same time.
    pub fn max_in_flight(&self) -> usize {
        self.max_in_flight.load(Ordering::SeqCst)
    }

    pub async fn parameters(&self) -> Option<MigrationParameters> {
        self.inner.lock().await.parameters.clone()
    }

    pub async fn cleanup_status(&self) -> Option<MigrationStatus> {
        self.inner.lock().await.cleanup_status
    }

    pub async fn cleanup_calls(&self) -> usize {
        self.inner.lock().await.cleanup_calls
    }
}

impl<T> Default for RecordingDestination<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T> Clone for RecordingDestination<T> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
            in_flight: Arc::clone(&self.in_flight),
            max_in_flight: Arc::clone(&self.max_in_flight),
            under_report: self.under_report,
            delay: self.delay,
            fail_consume: self.fail_consume,
            fail_cleanup: self.fail_cleanup,
        }
    }
}

impl<T> Destination<T> for RecordingDestination<T>
where
    T: Send + Sync,
{
    fn name() -> &'static str {
        "recording"
    }

    async fn prepare(&self, parameters: &MigrationParameters) -> MigrationResult<()> {
        self.inner.lock().await.parameters = Some(parameters.clone());
        Ok(())
    }

    async fn consume(&self, records: Vec<T>) -> MigrationResult<usize> {
        let in_flight = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.max_in_flight.fetch_max(in_flight, Ordering::SeqCst);

        if !self.delay.is_zero() {
            tokio::time::sleep(self.delay).await;
        }

        let received = records.len();
        {
            let mut inner = self.inner.lock().await;
            inner.slice_sizes.push(received);
            inner.records.extend(records);
        }

        self.in_flight.fetch_sub(1, Ordering::SeqCst);

        if self.fail_consume {
            bail!(ErrorKind::DestinationConsumeFailed, "Recording destination consume failed");
        }

        Ok(received.saturating_sub(self.under_report))
    }

    async fn cleanup(&self, status: MigrationStatus) -> MigrationResult<()> {
        {
            let mut inner = self.inner.lock().await;
            inner.cleanup_status = Some(status);
            inner.cleanup_calls += 1;
        }

        if self.fail_cleanup {
            bail!(ErrorKind::DestinationCleanupFailed, "Recording destination cleanup failed");
        }

        Ok(())
    }
}

use std::collections::VecDeque;
use std::future::Future;
use std::panic::AssertUnwindSafe;
use std::sync::{Arc, Mutex as StdMutex, PoisonError};
use std::time::{Duration, Instant};

use config::shared::BufferConfig;
use futures::FutureExt;
use futures::future::BoxFuture;
use metrics::gauge;
use tokio::sync::{Mutex, Notify};
use tokio::task::JoinHandle;
use tracing::{Instrument, debug, error, info, info_span};

use crate::concurrency::hysteresis::HysteresisTracker;
use crate::concurrency::pause::{PauseRx, PauseTx, create_pause_channel};
use crate::concurrency::shutdown::{
    ShutdownResult, ShutdownRx, ShutdownTx, create_shutdown_channel, run_until_shutdown,
};
use crate::error::{ErrorKind, MigrationError, MigrationResult, panic_message};
use crate::metrics::{MIGRATION_BUFFERED_RECORDS, MIGRATION_NAME_LABEL};
use crate::migration_error;

/// Upper bound of a single wait in [`BufferedProducer::get`] before the waiter logs and checks
/// again.
const GET_WAIT_TIMEOUT: Duration = Duration::from_secs(5);

#[derive(Debug)]
struct Cache<T> {
    records: VecDeque<T>,
    finished: bool,
    failure: Option<MigrationError>,
}

#[derive(Debug)]
struct Shared<T> {
    name: Arc<str>,
    cache: Mutex<Cache<T>>,
    data_available: Notify,
    room_available: Notify,
}

impl<T> Shared<T> {
    /// Appends `records` and returns the cache size afterwards.
    async fn append(&self, records: Vec<T>) -> usize {
        let cached = {
            let mut cache = self.cache.lock().await;
            cache.records.extend(records);
            cache.records.len()
        };

        self.record_cached(cached);
        self.data_available.notify_waiters();

        cached
    }

    async fn finish(&self, failure: Option<MigrationError>) {
        {
            let mut cache = self.cache.lock().await;
            cache.finished = true;
            if failure.is_some() {
                cache.failure = failure;
            }
        }

        self.data_available.notify_waiters();
    }

    fn record_cached(&self, cached: usize) {
        gauge!(
            MIGRATION_BUFFERED_RECORDS,
            MIGRATION_NAME_LABEL => self.name.to_string()
        )
        .set(cached as f64);
    }
}

/// Decouples batch consumption from production with a background pull loop.
///
/// Once started, a background task repeatedly pulls batches from the wrapped produce function
/// into an in-memory cache, while [`BufferedProducer::get`] hands cached records out in FIFO
/// order. The task stops pulling when the [`HysteresisTracker`] reports the cache as full, when
/// paused, when stopped, or when the produce function returns an empty batch. A failure or a
/// panic of the produce function is returned by the next call to [`BufferedProducer::get`].
pub struct BufferedProducer<T> {
    shared: Arc<Shared<T>>,
    producer_loop: StdMutex<Option<BoxFuture<'static, ()>>>,
    handle: StdMutex<Option<JoinHandle<()>>>,
    shutdown_tx: ShutdownTx,
    pause_tx: PauseTx,
}

impl<T> BufferedProducer<T>
where
    T: Send + 'static,
{
    /// Creates a producer pulling `batch_size` records per call to `produce`.
    ///
    /// Nothing is pulled until [`BufferedProducer::start`] is called.
    pub fn new<F, Fut>(
        name: impl Into<Arc<str>>,
        config: BufferConfig,
        batch_size: usize,
        produce: F,
    ) -> Self
    where
        F: FnMut(usize) -> Fut + Send + 'static,
        Fut: Future<Output = MigrationResult<Vec<T>>> + Send + 'static,
    {
        let name = name.into();
        let shared = Arc::new(Shared {
            name: Arc::clone(&name),
            cache: Mutex::new(Cache {
                records: VecDeque::new(),
                finished: false,
                failure: None,
            }),
            data_available: Notify::new(),
            room_available: Notify::new(),
        });

        let (shutdown_tx, shutdown_rx) = create_shutdown_channel();
        let (pause_tx, pause_rx) = create_pause_channel();

        let producer_loop = supervise(
            Arc::clone(&shared),
            produce_loop(
                Arc::clone(&shared),
                produce,
                batch_size,
                HysteresisTracker::new(config),
                shutdown_rx,
                pause_rx,
            ),
        )
        .instrument(info_span!("buffered_producer", migration_name = %name))
        .boxed();

        Self {
            shared,
            producer_loop: StdMutex::new(Some(producer_loop)),
            handle: StdMutex::new(None),
            shutdown_tx,
            pause_tx,
        }
    }

    /// Spawns the background pull loop on the current tokio runtime.
    ///
    /// Returns `false` if the loop was already started. A producer cannot be restarted.
    pub fn start(&self) -> bool {
        let producer_loop = self
            .producer_loop
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take();

        match producer_loop {
            Some(producer_loop) => {
                let handle = tokio::spawn(producer_loop);
                *self.handle.lock().unwrap_or_else(PoisonError::into_inner) = Some(handle);
                true
            }
            None => {
                debug!("buffered producer already started");
                false
            }
        }
    }

    /// Requests the background loop to finish. An in-flight produce call is dropped.
    pub fn stop(&self) {
        self.shutdown_tx.shutdown();
    }

    /// Requests the background loop to finish and waits until it has.
    ///
    /// Returns immediately if the loop was never started.
    pub async fn stop_and_wait(&self) {
        self.stop();

        let handle = self
            .handle
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take();

        if let Some(handle) = handle
            && let Err(err) = handle.await
        {
            error!(error = %err, "buffered producer task did not complete");
        }
    }

    /// Suspends pulling after the in-flight batch, until [`BufferedProducer::resume`].
    pub fn pause(&self) {
        debug!("pausing buffered producer");
        self.pause_tx.pause();
    }

    pub fn resume(&self) {
        debug!("resuming buffered producer");
        self.pause_tx.resume();
    }

    /// Returns the number of records waiting in the cache.
    pub async fn cached_records(&self) -> usize {
        self.shared.cache.lock().await.records.len()
    }

    /// Removes and returns up to `batch_size` records from the front of the cache.
    ///
    /// Waits while the cache is empty and production is still running. Returns an empty batch
    /// once production finished and the cache is drained, or the failure that ended production.
    pub async fn get(&self, batch_size: usize) -> MigrationResult<Vec<T>> {
        let started_at = Instant::now();

        loop {
            let data_available = self.shared.data_available.notified();
            tokio::pin!(data_available);
            data_available.as_mut().enable();

            {
                let mut cache = self.shared.cache.lock().await;

                if !cache.records.is_empty() {
                    let take = batch_size.min(cache.records.len());
                    let records: Vec<T> = cache.records.drain(..take).collect();
                    let cached = cache.records.len();
                    drop(cache);

                    self.shared.record_cached(cached);
                    self.shared.room_available.notify_one();

                    debug!(
                        records = records.len(),
                        cached,
                        waited_ms = started_at.elapsed().as_millis() as u64,
                        "took records from buffer"
                    );

                    return Ok(records);
                }

                if let Some(err) = cache.failure.take() {
                    return Err(err);
                }

                if cache.finished {
                    debug!(
                        waited_ms = started_at.elapsed().as_millis() as u64,
                        "buffer drained and production finished"
                    );

                    return Ok(Vec::new());
                }
            }

            if tokio::time::timeout(GET_WAIT_TIMEOUT, &mut data_available)
                .await
                .is_err()
            {
                debug!(
                    waited_ms = started_at.elapsed().as_millis() as u64,
                    "still waiting for buffered records"
                );
            }
        }
    }
}

impl<T> Drop for BufferedProducer<T> {
    fn drop(&mut self) {
        self.shutdown_tx.shutdown();
    }
}

/// Turns a panic of the producer loop into a failure returned to getters.
async fn supervise<T, F>(shared: Arc<Shared<T>>, producer_loop: F)
where
    F: Future<Output = ()>,
{
    if let Err(panic) = AssertUnwindSafe(producer_loop).catch_unwind().await {
        let detail = panic_message(panic.as_ref());
        error!(panic = %detail, "buffered producer panicked");

        shared
            .finish(Some(migration_error!(
                ErrorKind::BufferedProducerPanic,
                "Buffered producer panicked",
                detail
            )))
            .await;
    }
}

async fn produce_loop<T, F, Fut>(
    shared: Arc<Shared<T>>,
    mut produce: F,
    batch_size: usize,
    mut tracker: HysteresisTracker,
    mut shutdown_rx: ShutdownRx,
    mut pause_rx: PauseRx,
) where
    F: FnMut(usize) -> Fut,
    Fut: Future<Output = MigrationResult<Vec<T>>>,
{
    info!(batch_size, "buffered producer started");

    loop {
        tracker.reset();

        let batch = match run_until_shutdown(produce(batch_size), &mut shutdown_rx).await {
            ShutdownResult::Ok(Ok(batch)) => batch,
            ShutdownResult::Ok(Err(err)) => {
                error!(error = %err.message(), "buffered producer failed to pull records");
                shared.finish(Some(err)).await;

                return;
            }
            ShutdownResult::Shutdown => {
                info!("buffered producer stopped while pulling records");
                shared.finish(None).await;

                return;
            }
        };

        let pulled = batch.len();
        if pulled > 0 {
            let cached = shared.append(batch).await;
            tracker.observe(cached);

            debug!(pulled, cached, "buffered producer cached records");
        }

        let stopped = shutdown_rx.is_shutdown();
        if pulled == 0 || stopped {
            info!(stopped, "buffered producer finished");
            shared.finish(None).await;

            return;
        }

        if !wait_for_room(&shared, &tracker, &mut shutdown_rx, &mut pause_rx).await {
            info!("buffered producer stopped while waiting for room");
            shared.finish(None).await;

            return;
        }
    }
}

/// Waits until the tracker allows another pull. Returns `false` if stopped meanwhile.
async fn wait_for_room<T>(
    shared: &Shared<T>,
    tracker: &HysteresisTracker,
    shutdown_rx: &mut ShutdownRx,
    pause_rx: &mut PauseRx,
) -> bool {
    loop {
        let room_available = shared.room_available.notified();
        tokio::pin!(room_available);
        room_available.as_mut().enable();

        let cached = shared.cache.lock().await.records.len();
        let paused = *pause_rx.borrow_and_update();
        if tracker.may_produce(cached, paused) {
            return true;
        }

        debug!(cached, paused, "buffered producer waiting for room");

        tokio::select! {
            biased;

            _ = shutdown_rx.wait() => return false,
            changed = pause_rx.changed() => {
                // The pause sender lives as long as the producer handle.
                if changed.is_err() {
                    return false;
                }
            }
            _ = &mut room_available => {}
        }
    }
}

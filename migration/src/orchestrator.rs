//! State machine driving a single migration run.

use std::future::Future;
use std::marker::PhantomData;
use std::panic::AssertUnwindSafe;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use config::shared::{BufferConfig, MigrationSettings};
use futures::FutureExt;
use metrics::counter;
use tracing::{Instrument, debug, error, info, info_span, warn};

use crate::bail;
use crate::concurrency::buffered::BufferedProducer;
use crate::concurrency::fan_out;
use crate::concurrency::shutdown::{
    ShutdownResult, ShutdownTx, create_shutdown_channel, run_until_shutdown,
};
use crate::destination::Destination;
use crate::error::{ErrorKind, MigrationError, MigrationResult, panic_message};
use crate::metrics::{
    MIGRATION_NAME_LABEL, MIGRATION_RECORD_ERRORS_TOTAL, MIGRATION_RECORDS_CONSUMED_TOTAL,
    MIGRATION_RECORDS_PRODUCED_TOTAL, MIGRATION_RUNS_TOTAL, STATUS_LABEL,
};
use crate::migration_error;
use crate::monitor::{MigrationMonitor, MigrationObserver, Subscription};
use crate::source::Source;
use crate::status::{RecordCounts, StatusCollector};
use crate::types::{MigrationId, MigrationInformation, MigrationParameters, MigrationStatus};

/// Object-safe handle on a migration, independent of its record type.
#[async_trait]
pub trait DataMigration: Send + Sync {
    fn id(&self) -> MigrationId;

    fn name(&self) -> &str;

    fn status(&self) -> MigrationStatus;

    /// Returns a snapshot of the migration.
    fn information(&self) -> MigrationInformation;

    /// Runs the migration to a terminal status and returns its final snapshot.
    ///
    /// Failures of the run are reported through the snapshot. An error is only returned when the
    /// migration was already started.
    async fn start(&self) -> MigrationResult<MigrationInformation>;

    /// Requests cooperative cancellation of the run.
    fn stop(&self);

    fn subscribe(&self, observer: Arc<dyn MigrationObserver>) -> Subscription;
}

/// How a run left its batch loop without error.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum RunOutcome {
    Completed,
    Cancelled,
}

#[derive(Debug, Default)]
struct RunState {
    status: MigrationStatus,
    counts: RecordCounts,
    last_error: Option<MigrationError>,
    started_at: Option<DateTime<Utc>>,
    ended_at: Option<DateTime<Utc>>,
}

/// Moves records from a [`Source`] to a [`Destination`] in batches.
///
/// Every cycle pulls one batch through the producer fan-out (or the buffered producer when a
/// [`BufferConfig`] is set), hands it to the consumer fan-out, accounts it in a
/// [`StatusCollector`] and waits for the configured delay. The run ends once the source is
/// exhausted, a limit is reached, an error occurs or a stop is requested. The source and the
/// destination are cleaned up exactly once, whatever the outcome.
pub struct MigrationOrchestrator<T, S, D> {
    id: MigrationId,
    name: Arc<str>,
    parameters: Arc<MigrationParameters>,
    settings: MigrationSettings,
    source: S,
    destination: D,
    monitor: MigrationMonitor,
    state: Mutex<RunState>,
    shutdown_tx: ShutdownTx,
    _record: PhantomData<fn() -> T>,
}

impl<T, S, D> MigrationOrchestrator<T, S, D>
where
    T: Send + 'static,
    S: Source<T> + Clone + 'static,
    D: Destination<T> + Clone + 'static,
{
    /// Creates a migration that has not started yet.
    ///
    /// Fails with a configuration error if `name` is blank or `settings` are invalid, before any
    /// record flows.
    pub fn new(
        id: MigrationId,
        name: impl Into<Arc<str>>,
        parameters: MigrationParameters,
        settings: MigrationSettings,
        source: S,
        destination: D,
    ) -> MigrationResult<Self> {
        let name = name.into();
        if name.trim().is_empty() {
            bail!(ErrorKind::ConfigError, "Migration name cannot be blank");
        }

        settings.validate()?;

        let (shutdown_tx, _) = create_shutdown_channel();

        Ok(Self {
            id,
            name,
            parameters: Arc::new(parameters),
            settings,
            source,
            destination,
            monitor: MigrationMonitor::new(),
            state: Mutex::new(RunState::default()),
            shutdown_tx,
            _record: PhantomData,
        })
    }

    pub fn settings(&self) -> &MigrationSettings {
        &self.settings
    }

    fn state(&self) -> MutexGuard<'_, RunState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn snapshot(&self) -> MigrationInformation {
        let state = self.state();

        MigrationInformation {
            id: self.id,
            name: Arc::clone(&self.name),
            status: state.status,
            parameters: Arc::clone(&self.parameters),
            last_error: state.last_error.clone(),
            total_records_produced: state.counts.produced,
            total_records_consumed: state.counts.consumed,
            total_records_errors: state.counts.errors,
            started_at: state.started_at,
            ended_at: state.ended_at,
        }
    }

    fn set_status(&self, status: MigrationStatus) {
        self.state().status = status;
        info!(%status, "migration status changed");
    }

    fn notify(&self) -> MigrationResult<()> {
        self.monitor.notify(&self.snapshot())
    }

    async fn run(&self) -> MigrationInformation {
        info!(
            source = S::name(),
            destination = D::name(),
            batch_size = self.settings.batch_size,
            number_of_producers = self.settings.number_of_producers,
            number_of_consumers = self.settings.number_of_consumers,
            buffered = self.settings.buffer.is_some(),
            "starting migration"
        );

        let outcome = match AssertUnwindSafe(self.execute()).catch_unwind().await {
            Ok(outcome) => outcome,
            Err(panic) => Err(migration_error!(
                ErrorKind::Unknown,
                "Migration run panicked",
                panic_message(panic.as_ref())
            )),
        };

        let status = match outcome {
            Ok(RunOutcome::Completed) => MigrationStatus::Completed,
            Ok(RunOutcome::Cancelled) => MigrationStatus::Cancelled,
            Err(err) => {
                error!(error = %err, "migration failed");
                self.state().last_error = Some(err);
                MigrationStatus::Exception
            }
        };

        {
            let mut state = self.state();
            state.status = status;
            state.ended_at = Some(Utc::now());
        }

        counter!(
            MIGRATION_RUNS_TOTAL,
            MIGRATION_NAME_LABEL => self.name.to_string(),
            STATUS_LABEL => status.as_str()
        )
        .increment(1);

        let information = self.snapshot();
        info!(
            %status,
            produced = information.total_records_produced,
            consumed = information.total_records_consumed,
            errors = information.total_records_errors,
            "migration finished"
        );

        if let Err(err) = self.monitor.notify(&information) {
            warn!(error = %err.message(), "failed to notify final migration status");
        }

        self.cleanup(status).await;

        information
    }

    async fn execute(&self) -> MigrationResult<RunOutcome> {
        self.notify()?;

        self.source.prepare(&self.parameters).await?;
        self.destination.prepare(&self.parameters).await?;

        self.set_status(MigrationStatus::Running);
        self.notify()?;

        match self.settings.buffer {
            Some(buffer) => self.run_buffered(buffer).await,
            None => {
                let number_of_producers = self.settings.number_of_producers;
                let batch_size = self.settings.batch_size;

                self.run_batches(|| fan_out::produce(&self.source, number_of_producers, batch_size))
                    .await
            }
        }
    }

    async fn run_buffered(&self, buffer: BufferConfig) -> MigrationResult<RunOutcome> {
        let source = self.source.clone();
        let number_of_producers = self.settings.number_of_producers;
        let batch_size = self.settings.batch_size;

        let producer = BufferedProducer::new(
            Arc::clone(&self.name),
            buffer,
            batch_size,
            move |batch_size| {
                let source = source.clone();
                async move { fan_out::produce(&source, number_of_producers, batch_size).await }
            },
        );
        producer.start();

        let outcome = self.run_batches(|| producer.get(batch_size)).await;
        producer.stop_and_wait().await;

        outcome
    }

    /// Runs produce, consume and accounting cycles until `produce` returns an empty batch.
    async fn run_batches<P, Fut>(&self, mut produce: P) -> MigrationResult<RunOutcome>
    where
        P: FnMut() -> Fut,
        Fut: Future<Output = MigrationResult<Vec<T>>>,
    {
        let mut shutdown_rx = self.shutdown_tx.subscribe();
        let mut collector = StatusCollector::new(&self.settings);
        let delay = self.settings.delay_between_batches();
        let name_label = self.name.to_string();

        loop {
            let batch = match run_until_shutdown(produce(), &mut shutdown_rx).await {
                ShutdownResult::Ok(batch) => batch?,
                ShutdownResult::Shutdown => {
                    info!("migration cancelled before producing the next batch");
                    return Ok(RunOutcome::Cancelled);
                }
            };

            if batch.is_empty() {
                info!("source exhausted");
                return Ok(RunOutcome::Completed);
            }

            let produced = batch.len();
            let reported = fan_out::consume(
                &self.destination,
                self.settings.number_of_consumers,
                batch,
            )
            .await?;

            let consumed = if reported > produced {
                warn!(
                    reported,
                    produced, "destination reported more records than it was given"
                );
                produced
            } else {
                reported
            };
            let errors = produced - consumed;

            counter!(MIGRATION_RECORDS_PRODUCED_TOTAL, MIGRATION_NAME_LABEL => name_label.clone())
                .increment(produced as u64);
            counter!(MIGRATION_RECORDS_CONSUMED_TOTAL, MIGRATION_NAME_LABEL => name_label.clone())
                .increment(consumed as u64);
            counter!(MIGRATION_RECORD_ERRORS_TOTAL, MIGRATION_NAME_LABEL => name_label.clone())
                .increment(errors as u64);

            let update = collector.update(produced as u64, consumed as u64, errors as u64);
            self.state().counts = collector.counts();

            let status_notify = update?;
            debug!(produced, consumed, errors, status_notify, "migrated batch");

            if status_notify {
                self.notify()?;
            }

            if run_until_shutdown(tokio::time::sleep(delay), &mut shutdown_rx)
                .await
                .should_shutdown()
            {
                info!("migration cancelled between batches");
                return Ok(RunOutcome::Cancelled);
            }
        }
    }

    async fn cleanup(&self, status: MigrationStatus) {
        if let Err(err) = self.source.cleanup(status).await {
            warn!(error = %err.message(), source = S::name(), "source cleanup failed");
        }

        if let Err(err) = self.destination.cleanup(status).await {
            warn!(
                error = %err.message(),
                destination = D::name(),
                "destination cleanup failed"
            );
        }
    }
}

#[async_trait]
impl<T, S, D> DataMigration for MigrationOrchestrator<T, S, D>
where
    T: Send + 'static,
    S: Source<T> + Clone + 'static,
    D: Destination<T> + Clone + 'static,
{
    fn id(&self) -> MigrationId {
        self.id
    }

    fn name(&self) -> &str {
        &self.name
    }

    fn status(&self) -> MigrationStatus {
        self.state().status
    }

    fn information(&self) -> MigrationInformation {
        self.snapshot()
    }

    async fn start(&self) -> MigrationResult<MigrationInformation> {
        {
            let mut state = self.state();
            if state.status != MigrationStatus::NotStarted {
                bail!(
                    ErrorKind::InvalidState,
                    "Migration can only be started once",
                    format!("migration `{}` is {}", self.name, state.status)
                );
            }

            state.status = MigrationStatus::Starting;
            state.started_at = Some(Utc::now());
        }

        let span = info_span!("migration", migration_id = %self.id, migration_name = %self.name);

        Ok(self.run().instrument(span).await)
    }

    fn stop(&self) {
        let status = self.status();
        if status.is_terminal() {
            debug!(migration_id = %self.id, %status, "ignoring stop of finished migration");
            return;
        }

        info!(migration_id = %self.id, %status, "stop requested");
        self.shutdown_tx.shutdown();
    }

    fn subscribe(&self, observer: Arc<dyn MigrationObserver>) -> Subscription {
        self.monitor.subscribe(observer)
    }
}

impl<T, S, D> Drop for MigrationOrchestrator<T, S, D> {
    fn drop(&mut self) {
        self.monitor.dispose();
    }
}

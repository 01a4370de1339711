use std::sync::Arc;
use std::time::Duration;

use config::shared::MigrationSettings;
use migration::destination::Destination;
use migration::error::{ErrorKind, MigrationResult};
use migration::migration_error;
use migration::monitor::MigrationObserver;
use migration::orchestrator::{DataMigration, MigrationOrchestrator};
use migration::source::Source;
use migration::test_utils::destination::RecordingDestination;
use migration::test_utils::observer::CollectingObserver;
use migration::test_utils::source::{EndlessSource, ScriptStep, ScriptedSource};
use migration::types::{MigrationId, MigrationInformation, MigrationParameters, MigrationStatus};
use telemetry::tracing::init_test_tracing;

fn settings() -> MigrationSettings {
    MigrationSettings {
        delay_between_batches_ms: 0,
        ..MigrationSettings::default()
    }
}

fn orchestrator<T, S, D>(
    settings: MigrationSettings,
    source: S,
    destination: D,
) -> Arc<MigrationOrchestrator<T, S, D>>
where
    T: Send + 'static,
    S: Source<T> + Clone + 'static,
    D: Destination<T> + Clone + 'static,
{
    let parameters = MigrationParameters::from([("table".to_string(), "people".to_string())]);

    Arc::new(
        MigrationOrchestrator::new(
            MigrationId::new_v4(),
            "people",
            parameters,
            settings,
            source,
            destination,
        )
        .unwrap(),
    )
}

#[tokio::test(flavor = "multi_thread")]
async fn single_record_run_completes() {
    init_test_tracing();

    let source = ScriptedSource::batches([vec!["test".to_string()]]);
    let destination = RecordingDestination::new();
    let migration = orchestrator(
        MigrationSettings {
            batch_size: 1,
            ..settings()
        },
        source.clone(),
        destination.clone(),
    );

    let information = migration.start().await.unwrap();

    assert_eq!(information.status, MigrationStatus::Completed);
    assert_eq!(information.total_records_produced, 1);
    assert_eq!(information.total_records_consumed, 1);
    assert_eq!(information.total_records_errors, 0);
    assert!(information.last_error.is_none());
    assert_eq!(destination.records().await, vec!["test".to_string()]);
    assert_eq!(
        destination.parameters().await.unwrap().get("table").map(String::as_str),
        Some("people")
    );
    assert_eq!(source.cleanup_status().await, Some(MigrationStatus::Completed));
    assert_eq!(destination.cleanup_calls().await, 1);
}

#[tokio::test(flavor = "multi_thread")]
async fn error_threshold_ends_the_run() {
    init_test_tracing();

    let destination = RecordingDestination::new().under_reporting(1);
    let migration = orchestrator(
        MigrationSettings {
            batch_size: 1,
            error_threshold_before_exit: 2,
            ..settings()
        },
        EndlessSource::new(),
        destination.clone(),
    );

    let information = migration.start().await.unwrap();

    assert_eq!(information.status, MigrationStatus::Exception);
    assert_eq!(
        information.last_error_message().as_deref(),
        Some("Error threshold reached and hence exiting.\nErrors: 2 Threshold: 2")
    );
    assert_eq!(
        information.last_error.as_ref().map(|err| err.kind()),
        Some(ErrorKind::ErrorThresholdReached)
    );
    assert_eq!(information.total_records_produced, 2);
    assert_eq!(information.total_records_consumed, 0);
    assert_eq!(information.total_records_errors, 2);
    assert_eq!(destination.cleanup_status().await, Some(MigrationStatus::Exception));
}

#[tokio::test(flavor = "multi_thread")]
async fn max_number_of_records_ends_the_run() {
    init_test_tracing();

    let source = EndlessSource::new();
    let migration = orchestrator(
        MigrationSettings {
            batch_size: 1,
            max_number_of_records: 10,
            ..settings()
        },
        source.clone(),
        RecordingDestination::new(),
    );

    let information = migration.start().await.unwrap();

    assert_eq!(information.status, MigrationStatus::Exception);
    assert_eq!(
        information.last_error_message().as_deref(),
        Some("Max threshold reached and hence exiting.\nCurrent: 10 MaxLimit: 10")
    );
    assert_eq!(information.total_records_produced, 10);
    assert_eq!(source.produced(), 10);
}

#[tokio::test(flavor = "multi_thread")]
async fn batch_is_split_over_concurrent_consumers() {
    init_test_tracing();

    let destination = RecordingDestination::new().with_delay(Duration::from_millis(50));
    let migration = orchestrator(
        MigrationSettings {
            batch_size: 3,
            number_of_consumers: 3,
            ..settings()
        },
        ScriptedSource::batches([vec![1, 2, 3]]),
        destination.clone(),
    );

    let information = migration.start().await.unwrap();

    assert_eq!(information.status, MigrationStatus::Completed);
    assert_eq!(destination.slice_sizes().await, vec![1, 1, 1]);
    assert_eq!(destination.max_in_flight(), 3);

    let mut records = destination.records().await;
    records.sort_unstable();
    assert_eq!(records, vec![1, 2, 3]);
}

#[tokio::test(flavor = "multi_thread")]
async fn consumers_are_clamped_to_the_batch_size() {
    init_test_tracing();

    let destination = RecordingDestination::new();
    let migration = orchestrator(
        MigrationSettings {
            batch_size: 3,
            number_of_consumers: 10,
            ..settings()
        },
        ScriptedSource::batches([vec![1, 2, 3]]),
        destination.clone(),
    );

    migration.start().await.unwrap();

    assert_eq!(destination.consume_calls().await, 3);
    assert_eq!(destination.slice_sizes().await, vec![1, 1, 1]);
}

#[tokio::test(flavor = "multi_thread")]
async fn remainder_goes_to_the_last_consumer() {
    init_test_tracing();

    let destination = RecordingDestination::new();
    let migration = orchestrator(
        MigrationSettings {
            batch_size: 7,
            number_of_consumers: 3,
            ..settings()
        },
        ScriptedSource::batches([(0..7).collect::<Vec<u32>>()]),
        destination.clone(),
    );

    let information = migration.start().await.unwrap();

    assert_eq!(information.total_records_consumed, 7);
    let mut slice_sizes = destination.slice_sizes().await;
    slice_sizes.sort_unstable();
    assert_eq!(slice_sizes, vec![2, 2, 3]);
}

#[tokio::test(flavor = "multi_thread")]
async fn invalid_consumer_count_is_rejected_before_any_record_flows() {
    init_test_tracing();

    for number_of_consumers in [0, 33] {
        let source = EndlessSource::new();
        let result = MigrationOrchestrator::<u64, _, _>::new(
            MigrationId::new_v4(),
            "people",
            MigrationParameters::new(),
            MigrationSettings {
                number_of_consumers,
                ..settings()
            },
            source.clone(),
            RecordingDestination::<u64>::new(),
        );

        assert_eq!(result.err().map(|err| err.kind()), Some(ErrorKind::InvalidSettings));
        assert_eq!(source.produce_calls(), 0);
    }
}

#[tokio::test(flavor = "multi_thread")]
async fn stopping_a_running_migration_cancels_it() {
    init_test_tracing();

    let destination = RecordingDestination::new();
    let migration = orchestrator(
        MigrationSettings {
            batch_size: 5,
            delay_between_batches_ms: 10,
            ..settings()
        },
        EndlessSource::new(),
        destination.clone(),
    );
    let observer = CollectingObserver::new();
    let running = observer.notify_on(|snapshots| {
        snapshots
            .iter()
            .any(|snapshot| snapshot.status == MigrationStatus::Running)
    });
    let _subscription = migration.subscribe(Arc::new(observer.clone()));

    let handle = tokio::spawn({
        let migration = Arc::clone(&migration);
        async move { migration.start().await }
    });

    running.notified().await;
    migration.stop();

    let information = handle.await.unwrap().unwrap();

    assert_eq!(information.status, MigrationStatus::Cancelled);
    assert!(information.last_error.is_none());
    assert!(information.ended_at.is_some());
    assert_eq!(destination.cleanup_status().await, Some(MigrationStatus::Cancelled));
    assert_eq!(observer.statuses().last(), Some(&MigrationStatus::Cancelled));
}

#[tokio::test(flavor = "multi_thread")]
async fn progress_is_notified_every_frequency_records() {
    init_test_tracing();

    let migration = orchestrator(
        MigrationSettings {
            batch_size: 1,
            notify_status_record_size_frequency: 2,
            ..settings()
        },
        ScriptedSource::batches((0..5u32).map(|record| vec![record])),
        RecordingDestination::new(),
    );
    let observer = CollectingObserver::new();
    let _subscription = migration.subscribe(Arc::new(observer.clone()));

    migration.start().await.unwrap();

    assert_eq!(
        observer.statuses(),
        vec![
            MigrationStatus::Starting,
            MigrationStatus::Running,
            MigrationStatus::Running,
            MigrationStatus::Running,
            MigrationStatus::Completed,
        ]
    );

    let produced: Vec<_> = observer
        .snapshots()
        .iter()
        .map(|snapshot| snapshot.total_records_produced)
        .collect();
    assert_eq!(produced, vec![0, 0, 2, 4, 5]);
}

struct FailingObserver;

impl MigrationObserver for FailingObserver {
    fn on_next(&self, _information: &MigrationInformation) -> MigrationResult<()> {
        Err(migration_error!(ErrorKind::ObserverFailed, "Observer rejected snapshot"))
    }
}

#[tokio::test(flavor = "multi_thread")]
async fn failing_observer_ends_the_run_without_starving_others() {
    init_test_tracing();

    let source = ScriptedSource::batches([vec![1u32]]);
    let migration = orchestrator(settings(), source.clone(), RecordingDestination::new());
    let observer = CollectingObserver::new();
    let _failing = migration.subscribe(Arc::new(FailingObserver));
    let _collecting = migration.subscribe(Arc::new(observer.clone()));

    let information = migration.start().await.unwrap();

    assert_eq!(information.status, MigrationStatus::Exception);
    assert_eq!(
        information.last_error.as_ref().map(|err| err.kind()),
        Some(ErrorKind::ObserverFailed)
    );
    assert_eq!(
        observer.statuses(),
        vec![MigrationStatus::Starting, MigrationStatus::Exception]
    );
    assert_eq!(source.produce_calls(), 0);
    assert_eq!(source.cleanup_status().await, Some(MigrationStatus::Exception));
}

#[tokio::test(flavor = "multi_thread")]
async fn source_failure_is_reported_as_exception() {
    init_test_tracing();

    let source = ScriptedSource::new([ScriptStep::Batch(vec![1u32, 2]), ScriptStep::Fail]);
    let destination = RecordingDestination::new();
    let migration = orchestrator(settings(), source.clone(), destination.clone());

    let information = migration.start().await.unwrap();

    assert_eq!(information.status, MigrationStatus::Exception);
    assert_eq!(
        information.last_error.as_ref().map(|err| err.kind()),
        Some(ErrorKind::SourceProduceFailed)
    );
    assert_eq!(information.total_records_consumed, 2);
    assert_eq!(destination.cleanup_status().await, Some(MigrationStatus::Exception));
}

#[tokio::test(flavor = "multi_thread")]
async fn producer_panic_is_reported_as_exception() {
    init_test_tracing();

    let source = ScriptedSource::<u32>::new([ScriptStep::Panic]);
    let migration = orchestrator(settings(), source.clone(), RecordingDestination::new());

    let information = migration.start().await.unwrap();

    assert_eq!(information.status, MigrationStatus::Exception);
    assert_eq!(
        information.last_error.as_ref().map(|err| err.kind()),
        Some(ErrorKind::ProducerWorkerPanic)
    );
    assert_eq!(source.cleanup_status().await, Some(MigrationStatus::Exception));
}

#[tokio::test(flavor = "multi_thread")]
async fn prepare_failure_still_cleans_up() {
    init_test_tracing();

    let source = ScriptedSource::batches([vec![1u32]]);
    source.fail_prepare().await;
    let destination = RecordingDestination::new();
    let migration = orchestrator(settings(), source.clone(), destination.clone());

    let information = migration.start().await.unwrap();

    assert_eq!(information.status, MigrationStatus::Exception);
    assert_eq!(
        information.last_error.as_ref().map(|err| err.kind()),
        Some(ErrorKind::SourcePrepareFailed)
    );
    assert_eq!(destination.parameters().await, None);
    assert_eq!(destination.cleanup_calls().await, 1);
}

#[tokio::test(flavor = "multi_thread")]
async fn cleanup_failure_keeps_the_terminal_status() {
    init_test_tracing();

    let destination = RecordingDestination::new().failing_cleanup();
    let migration = orchestrator(
        settings(),
        ScriptedSource::batches([vec![1u32, 2]]),
        destination.clone(),
    );

    let information = migration.start().await.unwrap();

    assert_eq!(information.status, MigrationStatus::Completed);
    assert_eq!(destination.cleanup_calls().await, 1);
}

#[tokio::test(flavor = "multi_thread")]
async fn several_producers_contribute_to_one_batch() {
    init_test_tracing();

    let source = EndlessSource::new();
    let destination = RecordingDestination::new();
    let migration = orchestrator(
        MigrationSettings {
            batch_size: 2,
            number_of_producers: 3,
            max_number_of_records: 12,
            ..settings()
        },
        source.clone(),
        destination.clone(),
    );

    let information = migration.start().await.unwrap();

    assert_eq!(information.status, MigrationStatus::Exception);
    assert_eq!(information.total_records_produced, 12);
    assert_eq!(source.produce_calls(), 6);
    assert_eq!(destination.slice_sizes().await, vec![6, 6]);
}

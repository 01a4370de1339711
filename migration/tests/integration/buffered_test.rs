use std::sync::Arc;
use std::time::Duration;

use config::shared::{BufferConfig, MigrationSettings};
use migration::concurrency::buffered::BufferedProducer;
use migration::error::ErrorKind;
use migration::orchestrator::{DataMigration, MigrationOrchestrator};
use migration::source::Source;
use migration::test_utils::destination::RecordingDestination;
use migration::test_utils::observer::CollectingObserver;
use migration::test_utils::source::{EndlessSource, ScriptStep, ScriptedSource};
use migration::types::{MigrationId, MigrationParameters, MigrationStatus};
use telemetry::tracing::init_test_tracing;

fn buffered_settings(batch_size: usize, top_limit: usize, bottom_limit: usize) -> MigrationSettings {
    MigrationSettings {
        batch_size,
        delay_between_batches_ms: 0,
        buffer: Some(BufferConfig {
            top_limit,
            bottom_limit,
        }),
        ..MigrationSettings::default()
    }
}

#[tokio::test(flavor = "multi_thread")]
async fn buffered_run_stops_at_the_record_ceiling() {
    init_test_tracing();

    let source = EndlessSource::new();
    let destination = RecordingDestination::new();
    let migration = MigrationOrchestrator::new(
        MigrationId::new_v4(),
        "numbers",
        MigrationParameters::new(),
        MigrationSettings {
            max_number_of_records: 50,
            ..buffered_settings(5, 20, 5)
        },
        source.clone(),
        destination.clone(),
    )
    .unwrap();

    let information = migration.start().await.unwrap();

    assert_eq!(information.status, MigrationStatus::Exception);
    assert_eq!(
        information.last_error_message().as_deref(),
        Some("Max threshold reached and hence exiting.\nCurrent: 50 MaxLimit: 50")
    );
    assert_eq!(destination.records().await, (0..50).collect::<Vec<u64>>());
    // Bounded by the consumed records, the cache ceiling and one in-flight batch.
    assert!(source.produced() <= 50 + 20 + 5 + 5);
}

#[tokio::test(flavor = "multi_thread")]
async fn buffered_run_returns_cached_records_before_the_failure() {
    init_test_tracing();

    let destination = RecordingDestination::new();
    let migration = MigrationOrchestrator::new(
        MigrationId::new_v4(),
        "numbers",
        MigrationParameters::new(),
        buffered_settings(5, 20, 5),
        ScriptedSource::new([
            ScriptStep::Batch(vec![1u32, 2]),
            ScriptStep::Batch(vec![3]),
            ScriptStep::Fail,
        ]),
        destination.clone(),
    )
    .unwrap();

    let information = migration.start().await.unwrap();

    assert_eq!(information.status, MigrationStatus::Exception);
    assert_eq!(
        information.last_error.as_ref().map(|err| err.kind()),
        Some(ErrorKind::SourceProduceFailed)
    );
    assert_eq!(information.total_records_consumed, 3);
    assert_eq!(destination.records().await, vec![1, 2, 3]);
}

#[tokio::test(flavor = "multi_thread")]
async fn stopping_a_buffered_run_cancels_it() {
    init_test_tracing();

    let source = EndlessSource::with_delay(Duration::from_millis(5));
    let destination = RecordingDestination::new();
    let migration = Arc::new(
        MigrationOrchestrator::new(
            MigrationId::new_v4(),
            "numbers",
            MigrationParameters::new(),
            MigrationSettings {
                delay_between_batches_ms: 10,
                ..buffered_settings(5, 50, 10)
            },
            source.clone(),
            destination.clone(),
        )
        .unwrap(),
    );
    let observer = CollectingObserver::new();
    let running = observer.notify_on_status(MigrationStatus::Running);
    let _subscription = migration.subscribe(Arc::new(observer.clone()));

    let handle = tokio::spawn({
        let migration = Arc::clone(&migration);
        async move { migration.start().await }
    });

    running.notified().await;
    migration.stop();

    let information = handle.await.unwrap().unwrap();
    assert_eq!(information.status, MigrationStatus::Cancelled);
    assert_eq!(destination.cleanup_status().await, Some(MigrationStatus::Cancelled));

    // The background producer is joined before cleanup, so production is over.
    let produced = source.produced();
    tokio::time::sleep(Duration::from_millis(50)).await;
    assert_eq!(source.produced(), produced);
}

#[tokio::test(flavor = "multi_thread")]
async fn buffered_producer_respects_the_watermarks() {
    init_test_tracing();

    let source = EndlessSource::new();
    let producer = BufferedProducer::new(
        "numbers",
        BufferConfig {
            top_limit: 10,
            bottom_limit: 4,
        },
        3,
        {
            let source = source.clone();
            move |batch_size| {
                let source = source.clone();
                async move { source.produce(batch_size).await }
            }
        },
    );
    producer.start();

    // Filling stops at the first append reaching the top limit: 3, 6, 9, 12.
    tokio::time::sleep(Duration::from_millis(100)).await;
    assert_eq!(producer.cached_records().await, 12);
    assert_eq!(source.produce_calls(), 4);

    // Still above the bottom limit after taking 7 records, nothing is pulled.
    assert_eq!(producer.get(7).await.unwrap().len(), 7);
    tokio::time::sleep(Duration::from_millis(100)).await;
    assert_eq!(producer.cached_records().await, 5);
    assert_eq!(source.produce_calls(), 4);

    // Dropping to the bottom limit resumes pulling until the top limit is reached again.
    assert_eq!(producer.get(1).await.unwrap().len(), 1);
    tokio::time::sleep(Duration::from_millis(100)).await;
    assert_eq!(producer.cached_records().await, 10);
    assert_eq!(source.produce_calls(), 6);

    producer.stop_and_wait().await;
}

#[tokio::test(flavor = "multi_thread")]
async fn stopping_a_buffered_run_does_not_wait_for_a_slow_source() {
    init_test_tracing();

    let source = EndlessSource::with_delay(Duration::from_secs(30));
    let destination = RecordingDestination::new();
    let migration = Arc::new(
        MigrationOrchestrator::new(
            MigrationId::new_v4(),
            "numbers",
            MigrationParameters::new(),
            buffered_settings(1, 10, 2),
            source.clone(),
            destination.clone(),
        )
        .unwrap(),
    );
    let observer = CollectingObserver::new();
    let running = observer.notify_on_status(MigrationStatus::Running);
    let _subscription = migration.subscribe(Arc::new(observer));

    let handle = tokio::spawn({
        let migration = Arc::clone(&migration);
        async move { migration.start().await }
    });

    running.notified().await;
    tokio::time::sleep(Duration::from_millis(50)).await;
    migration.stop();

    let information = tokio::time::timeout(Duration::from_secs(5), handle)
        .await
        .expect("stopped run did not finish while the source was still producing")
        .unwrap()
        .unwrap();

    assert_eq!(information.status, MigrationStatus::Cancelled);
    assert_eq!(information.total_records_produced, 0);
    assert_eq!(source.produced(), 0);
    assert_eq!(destination.cleanup_status().await, Some(MigrationStatus::Cancelled));
}

#[tokio::test(flavor = "multi_thread")]
async fn buffered_consume_failure_does_not_wait_for_a_hanging_source() {
    init_test_tracing();

    let source = ScriptedSource::new([ScriptStep::Batch(vec![1u32, 2]), ScriptStep::Hang]);
    let destination = RecordingDestination::new().failing_consume();
    let migration = MigrationOrchestrator::new(
        MigrationId::new_v4(),
        "numbers",
        MigrationParameters::new(),
        buffered_settings(5, 20, 5),
        source.clone(),
        destination.clone(),
    )
    .unwrap();

    let information = tokio::time::timeout(Duration::from_secs(5), migration.start())
        .await
        .expect("failed run did not finish while the source was hanging")
        .unwrap();

    assert_eq!(information.status, MigrationStatus::Exception);
    assert_eq!(
        information.last_error.as_ref().map(|err| err.kind()),
        Some(ErrorKind::DestinationConsumeFailed)
    );
    assert_eq!(source.cleanup_status().await, Some(MigrationStatus::Exception));
    assert_eq!(destination.cleanup_status().await, Some(MigrationStatus::Exception));
}

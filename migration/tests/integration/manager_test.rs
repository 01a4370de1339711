use std::sync::Arc;

use config::shared::{ManagerConfig, MigrationConfig, MigrationSettings};
use migration::error::ErrorKind;
use migration::factory::RegistryMigrationFactory;
use migration::manager::MigrationManager;
use migration::registry::BoundedRegistry;
use migration::test_utils::destination::RecordingDestination;
use migration::test_utils::observer::CollectingObserver;
use migration::test_utils::source::{EndlessSource, ScriptedSource};
use migration::types::{MigrationId, MigrationParameters, MigrationStatus};
use telemetry::tracing::init_test_tracing;

fn migration_config(name: &str, settings: MigrationSettings) -> MigrationConfig {
    MigrationConfig {
        name: name.to_string(),
        source: "test".to_string(),
        destination: "test".to_string(),
        model: "string".to_string(),
        settings: Some(settings),
    }
}

fn manager(config: ManagerConfig) -> MigrationManager {
    let settings = MigrationSettings {
        delay_between_batches_ms: 1,
        ..MigrationSettings::default()
    };

    let mut factory = RegistryMigrationFactory::new();
    factory
        .register(
            migration_config("words", settings.clone()),
            |parameters: &MigrationParameters| {
                let words = parameters
                    .get("words")
                    .map(|words| words.split(',').map(str::to_string).collect::<Vec<_>>())
                    .unwrap_or_default();

                Ok((
                    ScriptedSource::batches([words]),
                    RecordingDestination::<String>::new(),
                ))
            },
        )
        .unwrap();
    factory
        .register(
            migration_config("endless", settings),
            |_: &MigrationParameters| Ok((EndlessSource::new(), RecordingDestination::<u64>::new())),
        )
        .unwrap();

    MigrationManager::new(Arc::new(factory), &config).unwrap()
}

#[tokio::test(flavor = "multi_thread")]
async fn created_migration_runs_with_its_parameters() {
    init_test_tracing();

    let manager = manager(ManagerConfig::default());
    let id = MigrationId::new_v4();
    let parameters = MigrationParameters::from([("words".to_string(), "a,b,c".to_string())]);

    let migration = manager.create(id, "words", parameters).unwrap();
    assert_eq!(manager.get(id).unwrap().id(), id);
    assert_eq!(migration.status(), MigrationStatus::NotStarted);

    let information = migration.start().await.unwrap();

    assert_eq!(information.status, MigrationStatus::Completed);
    assert_eq!(information.total_records_consumed, 3);
    assert_eq!(
        information.parameters.get("words").map(String::as_str),
        Some("a,b,c")
    );

    let listed = manager.list();
    assert_eq!(listed.len(), 1);
    assert_eq!(listed[0].status, MigrationStatus::Completed);
}

#[tokio::test(flavor = "multi_thread")]
async fn started_migration_cannot_be_started_again() {
    init_test_tracing();

    let manager = manager(ManagerConfig::default());
    let id = MigrationId::new_v4();
    let migration = manager
        .create(id, "words", MigrationParameters::new())
        .unwrap();
    migration.start().await.unwrap();

    let err = manager.get(id).unwrap().start().await.unwrap_err();

    assert_eq!(err.kind(), ErrorKind::InvalidState);
}

#[tokio::test(flavor = "multi_thread")]
async fn stop_all_cancels_running_migrations() {
    init_test_tracing();

    let manager = manager(ManagerConfig::default());
    let mut handles = Vec::new();
    let mut running = Vec::new();
    for _ in 0..3 {
        let migration = manager
            .create(MigrationId::new_v4(), "endless", MigrationParameters::new())
            .unwrap();
        let observer = CollectingObserver::new();
        running.push(observer.notify_on_status(MigrationStatus::Running));
        let _subscription = migration.subscribe(Arc::new(observer));

        handles.push(tokio::spawn(async move { migration.start().await }));
    }

    for notify in running {
        notify.notified().await;
    }
    manager.stop_all();

    for handle in handles {
        let information = handle.await.unwrap().unwrap();
        assert_eq!(information.status, MigrationStatus::Cancelled);
    }
    assert!(
        manager
            .list()
            .iter()
            .all(|information| information.status == MigrationStatus::Cancelled)
    );
}

#[tokio::test(flavor = "multi_thread")]
async fn oldest_migrations_are_evicted_in_batches() {
    init_test_tracing();

    let manager = manager(ManagerConfig {
        max_tracked_migrations: 10,
        trim_batch: 2,
    });
    let ids: Vec<_> = (0..15).map(|_| MigrationId::new_v4()).collect();
    for id in &ids {
        manager
            .create(*id, "words", MigrationParameters::new())
            .unwrap();
    }

    assert!(manager.len() <= 12);
    for id in &ids[..4] {
        assert_eq!(
            manager.get(*id).err().map(|err| err.kind()),
            Some(ErrorKind::MigrationNotFound)
        );
    }
    for id in &ids[4..] {
        assert!(manager.get(*id).is_ok());
    }
}

#[test]
fn updating_a_key_never_evicts() {
    let registry = BoundedRegistry::new(10, 2).unwrap();
    for key in 0..11 {
        registry.insert(key, key);
    }

    for _ in 0..100 {
        registry.insert(10, 0);
    }

    assert_eq!(registry.len(), 11);
    assert_eq!(registry.get(&0), Some(0));
    assert_eq!(registry.get(&10), Some(0));
}

use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use tokio::sync::Notify;

use crate::error::MigrationResult;
use crate::monitor::MigrationObserver;
use crate::test_utils::notify::TimedNotify;
use crate::types::{MigrationInformation, MigrationStatus};

type SnapshotCondition = Box<dyn Fn(&[MigrationInformation]) -> bool + Send + Sync>;

#[derive(Default)]
struct Inner {
    snapshots: Vec<MigrationInformation>,
    conditions: Vec<(SnapshotCondition, Arc<Notify>)>,
}

impl Inner {
    fn check_conditions(&mut self) {
        let snapshots = &self.snapshots;
        self.conditions.retain(|(condition, notify)| {
            let should_retain = !condition(snapshots);
            if !should_retain {
                notify.notify_one();
            }
            should_retain
        });
    }
}

/// Observer keeping every snapshot it receives.
#[derive(Clone, Default)]
pub struct CollectingObserver {
    inner: Arc<Mutex<Inner>>,
}

impl CollectingObserver {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, Inner> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn snapshots(&self) -> Vec<MigrationInformation> {
        self.lock().snapshots.clone()
    }

    /// Returns the status of every received snapshot, in delivery order.
    pub fn statuses(&self) -> Vec<MigrationStatus> {
        self.lock()
            .snapshots
            .iter()
            .map(|snapshot| snapshot.status)
            .collect()
    }

    /// Returns a notification fired once a snapshot with `status` was received.
    pub fn notify_on_status(&self, status: MigrationStatus) -> TimedNotify {
        self.notify_on(move |snapshots| snapshots.iter().any(|snapshot| snapshot.status == status))
    }

    /// Returns a notification fired once `condition` holds for the received snapshots.
    pub fn notify_on<F>(&self, condition: F) -> TimedNotify
    where
        F: Fn(&[MigrationInformation]) -> bool + Send + Sync + 'static,
    {
        let notify = Arc::new(Notify::new());
        let mut inner = self.lock();
        inner
            .conditions
            .push((Box::new(condition), Arc::clone(&notify)));
        inner.check_conditions();

        TimedNotify::new(notify)
    }
}

impl MigrationObserver for CollectingObserver {
    fn on_next(&self, information: &MigrationInformation) -> MigrationResult<()> {
        let mut inner = self.lock();
        inner.snapshots.push(information.clone());
        inner.check_conditions();

        Ok(())
    }
}

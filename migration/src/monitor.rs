//! Observer registry relaying migration snapshots.

use std::panic::{AssertUnwindSafe, catch_unwind};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError, Weak};

use tracing::{error, warn};

use crate::error::{ErrorKind, MigrationError, MigrationResult, panic_message};
use crate::migration_error;
use crate::types::MigrationInformation;

/// Receives snapshots of a migration on every status change and progress tick.
pub trait MigrationObserver: Send + Sync {
    /// Handles a snapshot. Must not block for long, notifications are delivered synchronously.
    fn on_next(&self, information: &MigrationInformation) -> MigrationResult<()>;
}

impl<F> MigrationObserver for F
where
    F: Fn(&MigrationInformation) + Send + Sync,
{
    fn on_next(&self, information: &MigrationInformation) -> MigrationResult<()> {
        self(information);
        Ok(())
    }
}

type ObserverId = u64;

#[derive(Default)]
struct MonitorInner {
    next_id: ObserverId,
    observers: Vec<(ObserverId, Arc<dyn MigrationObserver>)>,
}

fn lock(inner: &Mutex<MonitorInner>) -> MutexGuard<'_, MonitorInner> {
    inner.lock().unwrap_or_else(PoisonError::into_inner)
}

/// Registry of [`MigrationObserver`]s.
///
/// Observers are notified in registration order. A failing or panicking observer does not stop
/// delivery to the others, its failure is logged and returned once every observer was called.
#[derive(Clone, Default)]
pub struct MigrationMonitor {
    inner: Arc<Mutex<MonitorInner>>,
}

impl MigrationMonitor {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers `observer` until the returned [`Subscription`] is unsubscribed or the monitor is
    /// disposed.
    pub fn subscribe(&self, observer: Arc<dyn MigrationObserver>) -> Subscription {
        let mut inner = lock(&self.inner);
        let id = inner.next_id;
        inner.next_id += 1;
        inner.observers.push((id, observer));

        Subscription {
            id,
            monitor: Arc::downgrade(&self.inner),
        }
    }

    /// Delivers `information` to every registered observer.
    pub fn notify(&self, information: &MigrationInformation) -> MigrationResult<()> {
        // Observers may subscribe or unsubscribe from within `on_next`.
        let observers: Vec<_> = lock(&self.inner)
            .observers
            .iter()
            .map(|(_, observer)| Arc::clone(observer))
            .collect();

        let mut errors: Vec<MigrationError> = Vec::new();
        for observer in observers {
            match catch_unwind(AssertUnwindSafe(|| observer.on_next(information))) {
                Ok(Ok(())) => {}
                Ok(Err(err)) => {
                    error!(
                        migration_id = %information.id,
                        status = %information.status,
                        error = %err.message(),
                        "migration observer failed"
                    );
                    errors.push(err);
                }
                Err(panic) => {
                    let detail = panic_message(panic.as_ref());
                    error!(
                        migration_id = %information.id,
                        status = %information.status,
                        panic = %detail,
                        "migration observer panicked"
                    );
                    errors.push(migration_error!(
                        ErrorKind::ObserverPanic,
                        "Migration observer panicked",
                        detail
                    ));
                }
            }
        }

        if errors.is_empty() {
            Ok(())
        } else {
            Err(errors.into())
        }
    }

    /// Unsubscribes every observer.
    pub fn dispose(&self) {
        let observers = std::mem::take(&mut lock(&self.inner).observers);
        if !observers.is_empty() {
            warn!(
                observers = observers.len(),
                "disposing monitor with active subscriptions"
            );
        }
    }

    pub fn observer_count(&self) -> usize {
        lock(&self.inner).observers.len()
    }
}

/// Registration of an observer on a [`MigrationMonitor`].
///
/// Dropping a subscription does not unsubscribe, call [`Subscription::unsubscribe`].
#[derive(Debug)]
#[must_use = "observers stay registered until `unsubscribe` is called"]
pub struct Subscription {
    id: ObserverId,
    monitor: Weak<Mutex<MonitorInner>>,
}

impl Subscription {
    /// Removes the observer from its monitor.
    ///
    /// Returns `false` if the observer was already removed, e.g. because the monitor was
    /// disposed.
    pub fn unsubscribe(self) -> bool {
        let Some(monitor) = self.monitor.upgrade() else {
            return false;
        };

        let mut inner = lock(&monitor);
        let before = inner.observers.len();
        inner.observers.retain(|(id, _)| *id != self.id);

        inner.observers.len() != before
    }

    /// Returns whether the observer is still registered.
    pub fn is_active(&self) -> bool {
        self.monitor
            .upgrade()
            .is_some_and(|monitor| lock(&monitor).observers.iter().any(|(id, _)| *id == self.id))
    }
}

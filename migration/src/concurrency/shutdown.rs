use std::future::Future;

use tokio::sync::watch;

/// Transmitter side of the cancellation channel of a migration run.
///
/// Cancellation is sticky, once requested it stays requested.
#[derive(Debug, Clone)]
pub struct ShutdownTx(watch::Sender<bool>);

impl ShutdownTx {
    /// Requests cancellation. Works even when no receiver is subscribed yet.
    pub fn shutdown(&self) {
        self.0.send_replace(true);
    }

    pub fn is_shutdown(&self) -> bool {
        *self.0.borrow()
    }

    pub fn subscribe(&self) -> ShutdownRx {
        ShutdownRx(self.0.subscribe())
    }
}

/// Receiver side of the cancellation channel.
#[derive(Debug, Clone)]
pub struct ShutdownRx(watch::Receiver<bool>);

impl ShutdownRx {
    pub fn is_shutdown(&self) -> bool {
        *self.0.borrow()
    }

    /// Resolves once cancellation has been requested.
    ///
    /// Never resolves if every [`ShutdownTx`] was dropped without requesting cancellation.
    pub async fn wait(&mut self) {
        if self.0.wait_for(|shutdown| *shutdown).await.is_err() {
            std::future::pending::<()>().await;
        }
    }
}

/// Outcome of a future raced against the cancellation channel.
#[derive(Debug)]
pub enum ShutdownResult<T> {
    Ok(T),
    Shutdown,
}

impl<T> ShutdownResult<T> {
    pub fn should_shutdown(&self) -> bool {
        matches!(self, ShutdownResult::Shutdown)
    }
}

/// Runs `future` to completion unless cancellation is requested first, in which case the future
/// is dropped.
pub async fn run_until_shutdown<F>(future: F, shutdown_rx: &mut ShutdownRx) -> ShutdownResult<F::Output>
where
    F: Future,
{
    if shutdown_rx.is_shutdown() {
        return ShutdownResult::Shutdown;
    }

    tokio::select! {
        biased;

        _ = shutdown_rx.wait() => ShutdownResult::Shutdown,
        output = future => ShutdownResult::Ok(output),
    }
}

/// Creates a new cancellation channel in the non-cancelled state.
pub fn create_shutdown_channel() -> (ShutdownTx, ShutdownRx) {
    let (tx, rx) = watch::channel(false);
    (ShutdownTx(tx), ShutdownRx(rx))
}

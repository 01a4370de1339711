use tokio::sync::watch;

/// Transmitter side of the pause channel of a buffered producer.
///
/// While paused, the producer finishes its in-flight batch and then waits without pulling more
/// records. Pausing is level-triggered, repeated calls are idempotent.
#[derive(Debug, Clone)]
pub struct PauseTx(watch::Sender<bool>);

impl PauseTx {
    pub fn pause(&self) {
        self.0.send_replace(true);
    }

    pub fn resume(&self) {
        self.0.send_replace(false);
    }

    pub fn is_paused(&self) -> bool {
        *self.0.borrow()
    }

    pub fn subscribe(&self) -> PauseRx {
        self.0.subscribe()
    }
}

/// Receiver side of the pause channel, `true` while paused.
pub type PauseRx = watch::Receiver<bool>;

/// Creates a new pause channel in the running state.
pub fn create_pause_channel() -> (PauseTx, PauseRx) {
    let (tx, rx) = watch::channel(false);
    (PauseTx(tx), rx)
}

//! Manually driven scheduler.

use async_trait::async_trait;
use tokio::sync::{Mutex, mpsc};
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;

use super::Scheduler;

/// Scheduler that ticks only when [`Stepper::next`] is called.
///
/// Useful for tests and for driving the gateway one cycle at a time.
pub struct Stepper {
    tx: mpsc::Sender<Instant>,
    rx: Mutex<mpsc::Receiver<Instant>>,
    cancellation_token: CancellationToken,
}

impl Default for Stepper {
    fn default() -> Self {
        Self::new()
    }
}

impl Stepper {
    pub fn new() -> Self {
        let (tx, rx) = mpsc::channel(1);
        Self {
            tx,
            rx: Mutex::new(rx),
            cancellation_token: CancellationToken::new(),
        }
    }

    /// Emit one tick, waiting until the previous one was taken.
    ///
    /// Returns `false` if the stepper was stopped.
    pub async fn next(&self) -> bool {
        tokio::select! {
            biased;
            _ = self.cancellation_token.cancelled() => false,
            sent = self.tx.send(Instant::now()) => sent.is_ok(),
        }
    }

    pub fn is_stopped(&self) -> bool {
        self.cancellation_token.is_cancelled()
    }
}

#[async_trait]
impl Scheduler for Stepper {
    async fn wait_tick(&self) -> Option<Instant> {
        if self.cancellation_token.is_cancelled() {
            return None;
        }

        let mut rx = self.rx.lock().await;
        tokio::select! {
            biased;
            _ = self.cancellation_token.cancelled() => None,
            tick = rx.recv() => tick,
        }
    }

    fn stop(&self) {
        self.cancellation_token.cancel();
    }
}

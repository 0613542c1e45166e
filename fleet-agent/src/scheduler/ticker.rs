//! Timer-driven schedulers.

use std::time::Duration;

use async_trait::async_trait;
use parking_lot::Mutex;
use tokio::sync::mpsc;
use tokio::sync::mpsc::error::TrySendError;
use tokio::time::{Instant, sleep};
use tokio_util::sync::CancellationToken;
use tracing::{debug, trace};

use super::Scheduler;

/// Random delay in `[0, jitter)` with millisecond resolution.
///
/// Zero when `jitter` is below one millisecond.
pub fn jitter_delay(jitter: Duration) -> Duration {
    let range_ms = u64::try_from(jitter.as_millis()).unwrap_or(u64::MAX);
    if range_ms == 0 {
        return Duration::ZERO;
    }
    Duration::from_millis(rand::random::<u64>() % range_ms)
}

/// Delay policy of a timer task.
trait TickDelay: Send + Sync + 'static {
    /// Delay before the first tick.
    fn first(&self) -> Duration;
    /// Delay between two consecutive ticks.
    fn next(&self) -> Duration;
}

#[derive(Debug, Clone, Copy)]
struct FixedDelay {
    interval: Duration,
}

impl TickDelay for FixedDelay {
    fn first(&self) -> Duration {
        self.interval
    }

    fn next(&self) -> Duration {
        self.interval
    }
}

#[derive(Debug, Clone, Copy)]
struct JitterDelay {
    interval: Duration,
    jitter: Duration,
}

impl TickDelay for JitterDelay {
    // Only the jitter, so freshly started agents spread out instead of all
    // checking in one interval after boot.
    fn first(&self) -> Duration {
        jitter_delay(self.jitter)
    }

    fn next(&self) -> Duration {
        self.interval + jitter_delay(self.jitter)
    }
}

/// Single-slot tick channel fed by a lazily spawned timer task.
struct Ticker<D: TickDelay + Copy> {
    delay: D,
    /// Handed to the timer task when it is spawned.
    tx: Mutex<Option<mpsc::Sender<Instant>>>,
    rx: tokio::sync::Mutex<mpsc::Receiver<Instant>>,
    cancellation_token: CancellationToken,
}

impl<D: TickDelay + Copy> Ticker<D> {
    fn new(delay: D) -> Self {
        let (tx, rx) = mpsc::channel(1);
        Self {
            delay,
            tx: Mutex::new(Some(tx)),
            rx: tokio::sync::Mutex::new(rx),
            cancellation_token: CancellationToken::new(),
        }
    }

    fn ensure_started(&self) {
        let Some(tx) = self.tx.lock().take() else {
            return;
        };
        let delay = self.delay;
        let token = self.cancellation_token.clone();
        tokio::spawn(run_timer(delay, tx, token));
    }

    async fn wait_tick(&self) -> Option<Instant> {
        if self.cancellation_token.is_cancelled() {
            return None;
        }
        self.ensure_started();

        let mut rx = self.rx.lock().await;
        tokio::select! {
            biased;
            _ = self.cancellation_token.cancelled() => None,
            tick = rx.recv() => tick,
        }
    }

    fn stop(&self) {
        self.cancellation_token.cancel();
        // Never started: drop the sender so the channel closes.
        self.tx.lock().take();
    }
}

async fn run_timer<D: TickDelay>(
    delay: D,
    tx: mpsc::Sender<Instant>,
    cancellation_token: CancellationToken,
) {
    let mut next = delay.first();
    loop {
        tokio::select! {
            biased;
            _ = cancellation_token.cancelled() => break,
            _ = sleep(next) => {}
        }

        match tx.try_send(Instant::now()) {
            Ok(()) => {}
            Err(TrySendError::Full(_)) => {
                trace!("Previous tick not consumed yet, dropping tick");
            }
            Err(TrySendError::Closed(_)) => break,
        }

        next = delay.next();
    }
    debug!("Scheduler timer stopped");
}

/// Ticks every `interval` plus a random delay in `[0, jitter)`.
///
/// The first tick fires after the random delay alone. Every following spacing
/// lies in `[interval, interval + jitter)` and is drawn independently.
pub struct PeriodicJitter {
    ticker: Ticker<JitterDelay>,
}

impl PeriodicJitter {
    pub fn new(interval: Duration, jitter: Duration) -> Self {
        Self {
            ticker: Ticker::new(JitterDelay { interval, jitter }),
        }
    }
}

#[async_trait]
impl Scheduler for PeriodicJitter {
    async fn wait_tick(&self) -> Option<Instant> {
        self.ticker.wait_tick().await
    }

    fn stop(&self) {
        self.ticker.stop();
    }
}

/// Ticks every `interval`, first tick one interval after the first wait.
pub struct Periodic {
    ticker: Ticker<FixedDelay>,
}

impl Periodic {
    pub fn new(interval: Duration) -> Self {
        Self {
            ticker: Ticker::new(FixedDelay { interval }),
        }
    }
}

#[async_trait]
impl Scheduler for Periodic {
    async fn wait_tick(&self) -> Option<Instant> {
        self.ticker.wait_tick().await
    }

    fn stop(&self) {
        self.ticker.stop();
    }
}

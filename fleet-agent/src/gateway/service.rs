//! The fleet gateway service.

use std::sync::Arc;

use fleet_api::{AgentInfo, CheckinRequest, CheckinResponse};
use parking_lot::Mutex;
use tokio::sync::Mutex as AsyncMutex;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use super::stats::GatewayMetrics;
use super::{CheckinClient, GatewayState, GatewayStats};
use crate::config::GatewaySettings;
use crate::dispatcher::Dispatcher;
use crate::reporter::Reporter;
use crate::scheduler::{PeriodicJitter, Scheduler};
use crate::{Error, Result};

/// Failed check-ins in a row after which failures are logged as warnings.
const FAILURE_WARN_THRESHOLD: u64 = 5;

const CHECKING_IN: &str = "checking in";

/// Collaborators shared between the gateway handle and its worker.
struct GatewayInner {
    agent_info: Arc<dyn AgentInfo>,
    client: Arc<dyn CheckinClient>,
    dispatcher: Arc<dyn Dispatcher>,
    reporter: Arc<dyn Reporter>,
    metrics: GatewayMetrics,
    /// Held for the whole of a check-in, so at most one is ever in flight.
    checkin_slot: AsyncMutex<()>,
}

impl GatewayInner {
    /// Callers must hold `checkin_slot`.
    async fn execute(&self) -> Result<CheckinResponse> {
        let (events, ack) = self.reporter.events().await.into_parts();
        let event_count = events.len();
        let request = CheckinRequest::new(events);

        debug!("Checking in with {} events", event_count);
        let response = match self
            .client
            .checkin(self.agent_info.as_ref(), &request)
            .await
        {
            Ok(response) => response,
            Err(e) => {
                // The ack is dropped here, so the events stay pending.
                let failures = self.metrics.record_checkin_failure();
                if failures >= FAILURE_WARN_THRESHOLD {
                    warn!("Check-in has failed {} times in a row", failures);
                }
                return Err(e.into());
            }
        };

        let acknowledged = ack.ack();
        self.metrics.record_checkin_success(acknowledged);
        debug!(
            "Check-in succeeded, received {} actions",
            response.actions.len()
        );
        Ok(response)
    }

    /// One tick worth of work. Errors are logged, never returned.
    async fn run_cycle(&self) {
        let _slot = self.checkin_slot.lock().await;
        let response = match self.execute().await {
            Ok(response) => response,
            Err(e) => {
                error!("Could not communicate with the fleet: {}", e);
                return;
            }
        };

        if let Err(e) = self.dispatcher.dispatch(response.actions).await {
            self.metrics.record_dispatch_failure();
            error!("Failed to dispatch actions: {}", e);
        }
    }
}

async fn run_worker(
    inner: Arc<GatewayInner>,
    scheduler: Arc<dyn Scheduler>,
    cancellation_token: CancellationToken,
) {
    info!(
        "Fleet gateway started for agent {}",
        inner.agent_info.agent_id()
    );

    loop {
        let tick = tokio::select! {
            biased;
            _ = cancellation_token.cancelled() => break,
            tick = scheduler.wait_tick() => tick,
        };

        if tick.is_none() {
            debug!("Scheduler stopped");
            break;
        }

        inner.run_cycle().await;
    }

    info!("Fleet gateway stopped");
}

struct Lifecycle {
    state: GatewayState,
    worker: Option<JoinHandle<()>>,
}

/// Periodically checks in with the fleet control plane.
///
/// Each tick of the scheduler runs one check-in followed by one dispatch of the
/// returned actions. Ticks arriving while a cycle is in flight are dropped by the
/// scheduler, so at most one check-in is ever outstanding.
pub struct FleetGateway {
    inner: Arc<GatewayInner>,
    scheduler: Arc<dyn Scheduler>,
    cancellation_token: CancellationToken,
    lifecycle: Mutex<Lifecycle>,
}

impl FleetGateway {
    /// Create a gateway ticking at `settings.interval` plus up to `settings.jitter`.
    pub fn new(
        settings: &GatewaySettings,
        agent_info: Arc<dyn AgentInfo>,
        client: Arc<dyn CheckinClient>,
        dispatcher: Arc<dyn Dispatcher>,
        reporter: Arc<dyn Reporter>,
    ) -> Result<Self> {
        settings.validate()?;
        let scheduler = Arc::new(PeriodicJitter::new(settings.interval, settings.jitter));
        Ok(Self::with_scheduler(
            agent_info, client, dispatcher, scheduler, reporter,
        ))
    }

    /// Create a gateway driven by a custom scheduler.
    pub fn with_scheduler(
        agent_info: Arc<dyn AgentInfo>,
        client: Arc<dyn CheckinClient>,
        dispatcher: Arc<dyn Dispatcher>,
        scheduler: Arc<dyn Scheduler>,
        reporter: Arc<dyn Reporter>,
    ) -> Self {
        Self {
            inner: Arc::new(GatewayInner {
                agent_info,
                client,
                dispatcher,
                reporter,
                metrics: GatewayMetrics::default(),
                checkin_slot: AsyncMutex::new(()),
            }),
            scheduler,
            cancellation_token: CancellationToken::new(),
            lifecycle: Mutex::new(Lifecycle {
                state: GatewayState::NotStarted,
                worker: None,
            }),
        }
    }

    /// Run a single check-in outside the loop.
    ///
    /// Pending events are acknowledged on success. The returned actions are not
    /// dispatched. Fails with [`Error::InvalidState`] while the loop is running
    /// or another check-in is in flight.
    pub async fn execute(&self) -> Result<CheckinResponse> {
        let _slot = {
            let lifecycle = self.lifecycle.lock();
            if lifecycle.state == GatewayState::Running {
                return Err(Error::invalid_state(
                    "execute a check-in on",
                    lifecycle.state.to_string(),
                ));
            }
            self.inner
                .checkin_slot
                .try_lock()
                .map_err(|_| Error::invalid_state("execute a check-in on", CHECKING_IN))?
        };
        self.inner.execute().await
    }

    /// Spawn the check-in loop. A gateway can only be started once.
    pub fn start(&self) -> Result<()> {
        let mut lifecycle = self.lifecycle.lock();
        if lifecycle.state != GatewayState::NotStarted {
            return Err(Error::invalid_state("start", lifecycle.state.to_string()));
        }
        // A one-off check-in holds the slot while it runs.
        if self.inner.checkin_slot.try_lock().is_err() {
            return Err(Error::invalid_state("start", CHECKING_IN));
        }

        let worker = tokio::spawn(run_worker(
            self.inner.clone(),
            self.scheduler.clone(),
            self.cancellation_token.clone(),
        ));
        lifecycle.worker = Some(worker);
        lifecycle.state = GatewayState::Running;
        Ok(())
    }

    /// Stop the loop and the scheduler. Returns immediately.
    ///
    /// A check-in already in flight is allowed to finish; use
    /// [`wait_stopped`](Self::wait_stopped) to wait for it.
    pub fn stop(&self) {
        {
            let mut lifecycle = self.lifecycle.lock();
            if lifecycle.state == GatewayState::Stopped {
                return;
            }
            lifecycle.state = GatewayState::Stopped;
        }

        info!("Stopping fleet gateway");
        self.cancellation_token.cancel();
        self.scheduler.stop();
    }

    /// Wait for the worker to exit after [`stop`](Self::stop).
    pub async fn wait_stopped(&self) {
        let worker = self.lifecycle.lock().worker.take();
        if let Some(worker) = worker
            && let Err(e) = worker.await
        {
            error!("Fleet gateway worker failed: {}", e);
        }
    }

    pub fn state(&self) -> GatewayState {
        self.lifecycle.lock().state
    }

    pub fn stats(&self) -> GatewayStats {
        self.inner.metrics.snapshot()
    }
}

impl Drop for FleetGateway {
    fn drop(&mut self) {
        self.cancellation_token.cancel();
        self.scheduler.stop();
    }
}

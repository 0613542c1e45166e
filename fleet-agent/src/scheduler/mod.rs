//! Tick sources driving the gateway's check-in loop.
//!
//! A [`Scheduler`] hands out ticks one at a time. Timed schedulers run their own
//! timer task and never wait for the consumer: a tick that is not consumed before
//! the next one fires is dropped, so a slow check-in never builds a backlog.
//!
//! - [`PeriodicJitter`] adds a random delay to every spacing so a fleet of agents
//!   does not hit the control plane in lockstep.
//! - [`Periodic`] ticks at a fixed cadence.
//! - [`Stepper`] ticks only when told to.

mod stepper;
mod ticker;

use async_trait::async_trait;
use tokio::time::Instant;

pub use stepper::Stepper;
pub use ticker::{Periodic, PeriodicJitter, jitter_delay};

/// Source of check-in ticks.
#[async_trait]
pub trait Scheduler: Send + Sync + 'static {
    /// Wait for the next tick.
    ///
    /// Returns `None` once the scheduler has been stopped.
    async fn wait_tick(&self) -> Option<Instant>;

    /// Stop delivering ticks. Idempotent.
    fn stop(&self);
}

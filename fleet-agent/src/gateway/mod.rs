//! Gateway between the agent and the fleet control plane.
//!
//! The gateway owns the periodic check-in loop:
//! - waits for the next scheduler tick
//! - snapshots the pending events from the reporter
//! - exchanges them for actions in one check-in round-trip
//! - acknowledges the events once the round-trip succeeded
//! - hands the actions to the dispatcher
//!
//! Check-ins are strictly sequential. A failed check-in leaves the events pending
//! for the next tick; nothing is retried in between.

mod service;
mod stats;

use std::fmt;

use async_trait::async_trait;
use fleet_api::{AgentInfo, CheckinCmd, CheckinRequest, CheckinResponse, FleetApiError};

pub use service::FleetGateway;
pub use stats::GatewayStats;

/// Performs one check-in round-trip.
#[async_trait]
pub trait CheckinClient: Send + Sync + 'static {
    async fn checkin(
        &self,
        agent_info: &dyn AgentInfo,
        request: &CheckinRequest,
    ) -> Result<CheckinResponse, FleetApiError>;
}

#[async_trait]
impl CheckinClient for CheckinCmd {
    async fn checkin(
        &self,
        agent_info: &dyn AgentInfo,
        request: &CheckinRequest,
    ) -> Result<CheckinResponse, FleetApiError> {
        self.execute(agent_info, request).await
    }
}

/// Lifecycle of a [`FleetGateway`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GatewayState {
    NotStarted,
    Running,
    Stopped,
}

impl fmt::Display for GatewayState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            GatewayState::NotStarted => write!(f, "not started"),
            GatewayState::Running => write!(f, "running"),
            GatewayState::Stopped => write!(f, "stopped"),
        }
    }
}

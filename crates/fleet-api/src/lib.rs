//! Client side of the fleet control plane API.
//!
//! The agent talks to the control plane through a single periodic exchange,
//! the check-in: it posts the events it buffered since the previous check-in and
//! receives the actions the control plane wants it to run.

pub mod action;
pub mod checkin;
pub mod client;
pub mod error;
pub mod event;

pub use action::{ACTION_TYPE_CONFIG_CHANGE, ACTION_TYPE_POLICY_CHANGE, Action, ActionKind};
pub use checkin::{
    AgentInfo, CheckinCmd, CheckinRequest, CheckinResponse, StaticAgentInfo, checkin_path,
    is_valid_agent_id,
};
pub use client::{ClientSettings, HttpClient, RawResponse, Sender, USER_AGENT};
pub use error::FleetApiError;
pub use event::{Event, EventSubType, EventType};

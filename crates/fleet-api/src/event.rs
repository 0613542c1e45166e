//! Events reported to the control plane on check-in.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Top-level classification of an event.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum EventType {
    State,
    Error,
    ActionResult,
    Action,
}

/// Finer classification of an event, displayed by the fleet UI.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum EventSubType {
    Running,
    Starting,
    InProgress,
    Config,
    Failed,
    Stopping,
    Stopped,
    DataDump,
    Acknowledged,
    Unknown,
}

/// Something the agent observed since the last check-in.
///
/// Only `type`, `subtype`, `timestamp` and `message` are always serialized;
/// the remaining fields are omitted when absent.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Event {
    #[serde(rename = "type")]
    pub event_type: EventType,
    pub subtype: EventSubType,
    pub timestamp: DateTime<Utc>,
    pub message: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub payload: Option<serde_json::Map<String, serde_json::Value>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub action_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub policy_id: Option<String>,
}

impl Event {
    /// Create an event stamped with the current time.
    pub fn new(event_type: EventType, subtype: EventSubType, message: impl Into<String>) -> Self {
        Self {
            event_type,
            subtype,
            timestamp: Utc::now(),
            message: message.into(),
            payload: None,
            data: None,
            action_id: None,
            policy_id: None,
        }
    }

    /// Agent state change.
    pub fn state(subtype: EventSubType, message: impl Into<String>) -> Self {
        Self::new(EventType::State, subtype, message)
    }

    /// Outcome of an action received from the control plane.
    pub fn action_result(
        action_id: impl Into<String>,
        subtype: EventSubType,
        message: impl Into<String>,
    ) -> Self {
        Self::new(EventType::ActionResult, subtype, message).with_action_id(action_id)
    }

    pub fn with_payload(mut self, payload: serde_json::Map<String, serde_json::Value>) -> Self {
        self.payload = Some(payload);
        self
    }

    pub fn with_data(mut self, data: impl Into<String>) -> Self {
        self.data = Some(data.into());
        self
    }

    pub fn with_action_id(mut self, action_id: impl Into<String>) -> Self {
        self.action_id = Some(action_id.into());
        self
    }

    pub fn with_policy_id(mut self, policy_id: impl Into<String>) -> Self {
        self.policy_id = Some(policy_id.into());
        self
    }
}

//! Actions issued by the control plane in a check-in response.
//!
//! On the wire every action is `{"id": .., "type": .., "data": {..}}`. Types the
//! agent understands are decoded into a dedicated variant, anything else is kept
//! as [`Action::Unknown`] so the dispatcher can still report it.

use std::fmt;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// Wire type of a policy change action.
pub const ACTION_TYPE_POLICY_CHANGE: &str = "POLICY_CHANGE";

/// Older control planes send policy changes under this name.
pub const ACTION_TYPE_CONFIG_CHANGE: &str = "CONFIG_CHANGE";

/// Instruction received from the control plane.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "RawAction", into = "RawAction")]
pub enum Action {
    /// The agent policy changed and must be applied.
    PolicyChange {
        id: String,
        policy: Map<String, Value>,
    },
    /// An action type this agent does not know about.
    Unknown { id: String, original_type: String },
}

/// Discriminant of an [`Action`], used to route actions to handlers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ActionKind {
    PolicyChange,
    Unknown,
}

impl fmt::Display for ActionKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ActionKind::PolicyChange => write!(f, "{}", ACTION_TYPE_POLICY_CHANGE),
            ActionKind::Unknown => write!(f, "UNKNOWN"),
        }
    }
}

impl Action {
    pub fn id(&self) -> &str {
        match self {
            Action::PolicyChange { id, .. } | Action::Unknown { id, .. } => id,
        }
    }

    pub fn kind(&self) -> ActionKind {
        match self {
            Action::PolicyChange { .. } => ActionKind::PolicyChange,
            Action::Unknown { .. } => ActionKind::Unknown,
        }
    }

    /// The type string as it appears on the wire.
    pub fn action_type(&self) -> &str {
        match self {
            Action::PolicyChange { .. } => ACTION_TYPE_POLICY_CHANGE,
            Action::Unknown { original_type, .. } => original_type,
        }
    }
}

#[derive(Debug, Serialize, Deserialize)]
struct RawAction {
    id: String,
    #[serde(rename = "type")]
    action_type: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    data: Option<Value>,
}

impl TryFrom<RawAction> for Action {
    type Error = String;

    fn try_from(raw: RawAction) -> Result<Self, Self::Error> {
        match raw.action_type.as_str() {
            ACTION_TYPE_POLICY_CHANGE | ACTION_TYPE_CONFIG_CHANGE => {
                let policy = raw
                    .data
                    .and_then(|data| match data {
                        Value::Object(mut data) => data.remove("policy"),
                        _ => None,
                    })
                    .and_then(|policy| match policy {
                        Value::Object(policy) => Some(policy),
                        _ => None,
                    })
                    .ok_or_else(|| {
                        format!("action {} has no policy object in its data", raw.id)
                    })?;

                Ok(Action::PolicyChange { id: raw.id, policy })
            }
            _ => Ok(Action::Unknown {
                id: raw.id,
                original_type: raw.action_type,
            }),
        }
    }
}

impl From<Action> for RawAction {
    fn from(action: Action) -> Self {
        match action {
            Action::PolicyChange { id, policy } => {
                let mut data = Map::new();
                data.insert("policy".to_string(), Value::Object(policy));
                RawAction {
                    id,
                    action_type: ACTION_TYPE_POLICY_CHANGE.to_string(),
                    data: Some(Value::Object(data)),
                }
            }
            Action::Unknown { id, original_type } => RawAction {
                id,
                action_type: original_type,
                data: None,
            },
        }
    }
}

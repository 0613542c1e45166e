//! Application-wide error types.

use fleet_api::FleetApiError;
use thiserror::Error;

/// Application-wide result type.
pub type Result<T> = std::result::Result<T, Error>;

/// Application-wide error type.
#[derive(Error, Debug)]
pub enum Error {
    #[error("Configuration error: {0}")]
    Configuration(String),

    #[error("Check-in failed: {0}")]
    FleetApi(#[from] FleetApiError),

    #[error("Action {action_id} failed: {message}")]
    Dispatch { action_id: String, message: String },

    #[error("Invalid state: cannot {operation} a gateway that is {state}")]
    InvalidState { operation: String, state: String },

    #[error("{0}")]
    Other(String),
}

impl Error {
    pub fn config(msg: impl Into<String>) -> Self {
        Self::Configuration(msg.into())
    }

    pub fn dispatch(action_id: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Dispatch {
            action_id: action_id.into(),
            message: message.into(),
        }
    }

    pub fn invalid_state(operation: impl Into<String>, state: impl Into<String>) -> Self {
        Self::InvalidState {
            operation: operation.into(),
            state: state.into(),
        }
    }
}

use thiserror::Error;

#[derive(Debug, Error)]
pub enum FleetApiError {
    #[error("http error: {0}")]
    Http(#[from] reqwest::Error),
    #[error("json error: {0}")]
    Json(#[from] serde_json::Error),
    #[error("invalid url: {0}")]
    InvalidUrl(String),
    #[error("invalid agent id {0:?}: not usable as a url path segment")]
    InvalidAgentId(String),
    #[error("status code: {status}, fleet returned an error: {error}, message: {message}")]
    Status {
        status: u16,
        error: String,
        message: String,
    },
    #[error("invalid response: {0}")]
    InvalidResponse(String),
}

impl FleetApiError {
    /// Whether the error came from the control plane answering with a non-success status.
    pub fn is_status(&self) -> bool {
        matches!(self, FleetApiError::Status { .. })
    }
}

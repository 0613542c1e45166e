//! The check-in command: send buffered events, receive pending actions.

use std::sync::Arc;

use reqwest::Method;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::action::Action;
use crate::client::{RawResponse, Sender};
use crate::error::FleetApiError;
use crate::event::Event;

/// Identity of the agent performing the check-in.
pub trait AgentInfo: Send + Sync + 'static {
    fn agent_id(&self) -> String;
}

/// [`AgentInfo`] with a fixed identifier.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StaticAgentInfo {
    agent_id: String,
}

impl StaticAgentInfo {
    pub fn new(agent_id: impl Into<String>) -> Self {
        Self {
            agent_id: agent_id.into(),
        }
    }
}

impl AgentInfo for StaticAgentInfo {
    fn agent_id(&self) -> String {
        self.agent_id.clone()
    }
}

/// Events reported to the control plane.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct CheckinRequest {
    pub events: Vec<Event>,
}

impl CheckinRequest {
    pub fn new(events: Vec<Event>) -> Self {
        Self { events }
    }
}

/// Actions the control plane wants executed, in the order they must run.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct CheckinResponse {
    #[serde(default)]
    pub actions: Vec<Action>,
    #[serde(default)]
    pub success: bool,
}

/// Error document returned by the control plane with a non-200 status.
#[derive(Debug, Deserialize)]
struct ErrorBody {
    #[serde(default)]
    error: String,
    #[serde(default)]
    message: String,
}

/// Whether `agent_id` fits in a URL path segment without escaping.
pub fn is_valid_agent_id(agent_id: &str) -> bool {
    !agent_id.is_empty()
        && agent_id != "."
        && agent_id != ".."
        && agent_id
            .bytes()
            .all(|b| b.is_ascii_alphanumeric() || matches!(b, b'-' | b'_' | b'.' | b'~'))
}

/// Path of the check-in endpoint for an agent.
pub fn checkin_path(agent_id: &str) -> Result<String, FleetApiError> {
    if !is_valid_agent_id(agent_id) {
        return Err(FleetApiError::InvalidAgentId(agent_id.to_string()));
    }
    Ok(format!("/api/fleet/agents/{}/checkin", agent_id))
}

/// Performs the check-in round-trip over a [`Sender`].
#[derive(Clone)]
pub struct CheckinCmd {
    sender: Arc<dyn Sender>,
}

impl CheckinCmd {
    pub fn new(sender: Arc<dyn Sender>) -> Self {
        Self { sender }
    }

    /// Execute one check-in for `info`.
    pub async fn execute(
        &self,
        info: &dyn AgentInfo,
        request: &CheckinRequest,
    ) -> Result<CheckinResponse, FleetApiError> {
        let body = serde_json::to_vec(request)?;
        let path = checkin_path(&info.agent_id())?;

        debug!(
            "Checking in to {} with {} events",
            self.sender.uri(),
            request.events.len()
        );

        let response = self.sender.send(Method::POST, &path, Some(body)).await?;
        if !response.is_success() {
            return Err(extract_error(&response));
        }

        if response.body.is_empty() {
            return Err(FleetApiError::InvalidResponse(
                "empty check-in response body".to_string(),
            ));
        }

        let checkin: CheckinResponse = serde_json::from_slice(&response.body)?;
        debug!("Check-in returned {} actions", checkin.actions.len());
        Ok(checkin)
    }
}

impl std::fmt::Debug for CheckinCmd {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CheckinCmd")
            .field("uri", &self.sender.uri())
            .finish()
    }
}

fn extract_error(response: &RawResponse) -> FleetApiError {
    match serde_json::from_slice::<ErrorBody>(&response.body) {
        Ok(body) => FleetApiError::Status {
            status: response.status,
            error: body.error,
            message: body.message,
        },
        Err(_) => FleetApiError::Status {
            status: response.status,
            error: String::new(),
            message: String::from_utf8_lossy(&response.body).into_owned(),
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::event::EventSubType;
    use async_trait::async_trait;
    use parking_lot::Mutex;
    use serde_json::json;

    #[derive(Debug, Clone)]
    struct Recorded {
        method: Method,
        path: String,
        body: Option<Vec<u8>>,
    }

    struct FakeSender {
        response: RawResponse,
        requests: Mutex<Vec<Recorded>>,
    }

    impl FakeSender {
        fn new(status: u16, body: &str) -> Arc<Self> {
            Arc::new(Self {
                response: RawResponse::new(status, body.to_string()),
                requests: Mutex::new(Vec::new()),
            })
        }
    }

    #[async_trait]
    impl Sender for FakeSender {
        async fn send(
            &self,
            method: Method,
            path: &str,
            body: Option<Vec<u8>>,
        ) -> Result<RawResponse, FleetApiError> {
            self.requests.lock().push(Recorded {
                method,
                path: path.to_string(),
                body,
            });
            Ok(self.response.clone())
        }

        fn uri(&self) -> String {
            "http://fake".to_string()
        }
    }

    #[tokio::test]
    async fn test_execute_posts_events_and_decodes_actions() {
        let sender = FakeSender::new(
            200,
            r#"{"action":"checkin","success":true,"actions":[
                {"id":"a1","type":"POLICY_CHANGE","data":{"policy":{"id":"p1"}}},
                {"id":"a2","type":"UPGRADE"}
            ]}"#,
        );
        let cmd = CheckinCmd::new(sender.clone());
        let info = StaticAgentInfo::new("agent-42");
        let request =
            CheckinRequest::new(vec![Event::state(EventSubType::Running, "running")]);

        let response = cmd.execute(&info, &request).await.unwrap();

        assert!(response.success);
        let ids: Vec<&str> = response.actions.iter().map(|a| a.id()).collect();
        assert_eq!(ids, vec!["a1", "a2"]);

        let requests = sender.requests.lock();
        assert_eq!(requests.len(), 1);
        assert_eq!(requests[0].method, Method::POST);
        assert_eq!(requests[0].path, "/api/fleet/agents/agent-42/checkin");
        let body: serde_json::Value =
            serde_json::from_slice(requests[0].body.as_ref().unwrap()).unwrap();
        assert_eq!(body["events"][0]["message"], "running");
    }

    #[tokio::test]
    async fn test_missing_actions_default_to_empty() {
        let sender = FakeSender::new(200, r#"{"success":true}"#);
        let cmd = CheckinCmd::new(sender);

        let response = cmd
            .execute(&StaticAgentInfo::new("a"), &CheckinRequest::default())
            .await
            .unwrap();
        assert!(response.actions.is_empty());
    }

    #[tokio::test]
    async fn test_non_200_maps_error_document() {
        let body = json!({
            "statusCode": 401,
            "error": "Unauthorized",
            "message": "Agent not found"
        })
        .to_string();
        let cmd = CheckinCmd::new(FakeSender::new(401, &body));

        let err = cmd
            .execute(&StaticAgentInfo::new("a"), &CheckinRequest::default())
            .await
            .unwrap_err();

        match err {
            FleetApiError::Status {
                status,
                error,
                message,
            } => {
                assert_eq!(status, 401);
                assert_eq!(error, "Unauthorized");
                assert_eq!(message, "Agent not found");
            }
            other => panic!("unexpected error: {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_non_200_with_plain_body_keeps_text() {
        let cmd = CheckinCmd::new(FakeSender::new(502, "Bad Gateway"));

        let err = cmd
            .execute(&StaticAgentInfo::new("a"), &CheckinRequest::default())
            .await
            .unwrap_err();

        assert!(err.is_status());
        assert!(err.to_string().contains("502"));
        assert!(err.to_string().contains("Bad Gateway"));
    }

    #[tokio::test]
    async fn test_empty_or_malformed_body_is_an_error() {
        let cmd = CheckinCmd::new(FakeSender::new(200, ""));
        let err = cmd
            .execute(&StaticAgentInfo::new("a"), &CheckinRequest::default())
            .await
            .unwrap_err();
        assert!(matches!(err, FleetApiError::InvalidResponse(_)));

        let cmd = CheckinCmd::new(FakeSender::new(200, "{not json"));
        let err = cmd
            .execute(&StaticAgentInfo::new("a"), &CheckinRequest::default())
            .await
            .unwrap_err();
        assert!(matches!(err, FleetApiError::Json(_)));
    }

    #[test]
    fn test_agent_id_must_be_a_plain_segment() {
        assert!(is_valid_agent_id("3f2b8c1e-9a4d-4f5e-8b7a-1c2d3e4f5a6b"));
        assert!(is_valid_agent_id("edge_agent.01~a"));
        for bad in ["", ".", "..", "a/b", "a?b", "a#b", "a%2Fb", "a b"] {
            assert!(!is_valid_agent_id(bad), "{:?} should be rejected", bad);
        }
    }

    #[tokio::test]
    async fn test_unsafe_agent_id_is_not_sent() {
        let sender = FakeSender::new(200, r#"{"actions":[]}"#);
        let cmd = CheckinCmd::new(sender.clone());

        let err = cmd
            .execute(&StaticAgentInfo::new("../admin?x="), &CheckinRequest::default())
            .await
            .unwrap_err();

        assert!(matches!(err, FleetApiError::InvalidAgentId(ref id) if id == "../admin?x="));
        assert!(sender.requests.lock().is_empty());
    }
}

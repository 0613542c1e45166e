//! End-to-end tests of the HTTP transport against an in-process server.

use std::sync::Arc;
use std::time::Duration;

use axum::extract::Path;
use axum::http::{HeaderMap, StatusCode};
use axum::routing::post;
use axum::{Json, Router};
use fleet_api::{
    Action, CheckinCmd, CheckinRequest, ClientSettings, Event, EventSubType, FleetApiError,
    HttpClient, StaticAgentInfo,
};
use serde_json::{Value, json};
use tokio::net::TcpListener;

async fn spawn_server(router: Router) -> String {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, router).await.unwrap();
    });
    format!("http://{}", addr)
}

async fn checkin_handler(
    Path(agent_id): Path<String>,
    headers: HeaderMap,
    Json(body): Json<Value>,
) -> (StatusCode, Json<Value>) {
    let authorized = headers
        .get("authorization")
        .and_then(|v| v.to_str().ok())
        .is_some_and(|v| v == "ApiKey secret");
    if !authorized || headers.get("kbn-xsrf").is_none() {
        return (
            StatusCode::UNAUTHORIZED,
            Json(json!({
                "statusCode": 401,
                "error": "Unauthorized",
                "message": "invalid api key"
            })),
        );
    }

    let seen = body["events"].as_array().map(|e| e.len()).unwrap_or(0);
    (
        StatusCode::OK,
        Json(json!({
            "action": "checkin",
            "success": true,
            "actions": [
                {
                    "id": format!("{}-policy", agent_id),
                    "type": "POLICY_CHANGE",
                    "data": { "policy": { "events_seen": seen } }
                },
                { "id": "later", "type": "UNENROLL" }
            ]
        })),
    )
}

fn router() -> Router {
    Router::new().route("/api/fleet/agents/{id}/checkin", post(checkin_handler))
}

fn cmd(url: String, api_key: &str) -> CheckinCmd {
    let client = HttpClient::new(ClientSettings {
        url,
        api_key: api_key.to_string(),
        timeout: Duration::from_secs(5),
    })
    .unwrap();
    CheckinCmd::new(Arc::new(client))
}

#[tokio::test]
async fn test_checkin_round_trip_over_http() {
    let url = spawn_server(router()).await;
    let cmd = cmd(url, "secret");
    let request = CheckinRequest::new(vec![
        Event::state(EventSubType::Starting, "starting"),
        Event::state(EventSubType::Running, "running"),
    ]);

    let response = cmd
        .execute(&StaticAgentInfo::new("agent-1"), &request)
        .await
        .unwrap();

    assert!(response.success);
    assert_eq!(response.actions.len(), 2);
    match &response.actions[0] {
        Action::PolicyChange { id, policy } => {
            assert_eq!(id, "agent-1-policy");
            assert_eq!(policy["events_seen"], 2);
        }
        other => panic!("unexpected action: {:?}", other),
    }
    assert_eq!(response.actions[1].action_type(), "UNENROLL");
}

#[tokio::test]
async fn test_checkin_rejected_by_server() {
    let url = spawn_server(router()).await;
    let cmd = cmd(url, "wrong");

    let err = cmd
        .execute(&StaticAgentInfo::new("agent-1"), &CheckinRequest::default())
        .await
        .unwrap_err();

    match err {
        FleetApiError::Status {
            status, message, ..
        } => {
            assert_eq!(status, 401);
            assert_eq!(message, "invalid api key");
        }
        other => panic!("unexpected error: {:?}", other),
    }
}

#[tokio::test]
async fn test_unknown_route_is_a_status_error() {
    let url = spawn_server(Router::new()).await;
    let cmd = cmd(url, "secret");

    let err = cmd
        .execute(&StaticAgentInfo::new("agent-1"), &CheckinRequest::default())
        .await
        .unwrap_err();

    assert!(err.is_status());
}

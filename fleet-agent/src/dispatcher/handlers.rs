use std::sync::Arc;

use async_trait::async_trait;
use fleet_api::Action;
use serde_json::{Map, Value};
use tokio::sync::mpsc;
use tracing::{info, warn};

use super::ActionHandler;
use crate::{Error, Result};

/// Agent policy as sent by the control plane.
pub type Policy = Map<String, Value>;

/// A policy received in a policy change action.
#[derive(Debug, Clone, PartialEq)]
pub struct PolicyUpdate {
    pub action_id: String,
    pub policy: Policy,
}

/// Applies new policies to the rest of the agent.
#[async_trait]
pub trait PolicyEmitter: Send + Sync + 'static {
    async fn emit(&self, update: PolicyUpdate) -> Result<()>;
}

/// Forwards policies over a channel to whoever reconfigures the agent.
#[derive(Debug, Clone)]
pub struct ChannelPolicyEmitter {
    tx: mpsc::Sender<PolicyUpdate>,
}

impl ChannelPolicyEmitter {
    pub fn new(tx: mpsc::Sender<PolicyUpdate>) -> Self {
        Self { tx }
    }

    /// Emitter plus the receiving end of its channel.
    pub fn channel(capacity: usize) -> (Self, mpsc::Receiver<PolicyUpdate>) {
        let (tx, rx) = mpsc::channel(capacity);
        (Self::new(tx), rx)
    }
}

#[async_trait]
impl PolicyEmitter for ChannelPolicyEmitter {
    async fn emit(&self, update: PolicyUpdate) -> Result<()> {
        self.tx
            .send(update)
            .await
            .map_err(|_| Error::Other("policy receiver is closed".to_string()))
    }
}

/// Handles [`Action::PolicyChange`].
pub struct PolicyChangeHandler {
    emitter: Arc<dyn PolicyEmitter>,
}

impl PolicyChangeHandler {
    pub fn new(emitter: Arc<dyn PolicyEmitter>) -> Self {
        Self { emitter }
    }
}

#[async_trait]
impl ActionHandler for PolicyChangeHandler {
    async fn handle(&self, action: &Action) -> Result<()> {
        match action {
            Action::PolicyChange { id, policy } => {
                info!("Applying policy change from action {}", id);
                self.emitter
                    .emit(PolicyUpdate {
                        action_id: id.clone(),
                        policy: policy.clone(),
                    })
                    .await
                    .map_err(|e| Error::dispatch(id, e.to_string()))
            }
            other => Err(Error::dispatch(
                other.id(),
                format!("cannot apply a {} action as a policy change", other.action_type()),
            )),
        }
    }
}

/// Fallback for actions this agent does not implement. Logs and moves on.
#[derive(Debug, Default, Clone, Copy)]
pub struct UnknownActionHandler;

#[async_trait]
impl ActionHandler for UnknownActionHandler {
    async fn handle(&self, action: &Action) -> Result<()> {
        warn!(
            "Received action {} of unsupported type {}, ignoring",
            action.id(),
            action.action_type()
        );
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn policy() -> Policy {
        let mut policy = Map::new();
        policy.insert("revision".to_string(), json!(2));
        policy
    }

    #[tokio::test]
    async fn test_policy_change_is_emitted() {
        let (emitter, mut rx) = ChannelPolicyEmitter::channel(1);
        let handler = PolicyChangeHandler::new(Arc::new(emitter));

        handler
            .handle(&Action::PolicyChange {
                id: "a1".to_string(),
                policy: policy(),
            })
            .await
            .unwrap();

        let update = rx.recv().await.unwrap();
        assert_eq!(update.action_id, "a1");
        assert_eq!(update.policy["revision"], 2);
    }

    #[tokio::test]
    async fn test_closed_receiver_fails_the_action() {
        let (emitter, rx) = ChannelPolicyEmitter::channel(1);
        drop(rx);
        let handler = PolicyChangeHandler::new(Arc::new(emitter));

        let err = handler
            .handle(&Action::PolicyChange {
                id: "a1".to_string(),
                policy: policy(),
            })
            .await
            .unwrap_err();
        assert!(matches!(err, Error::Dispatch { ref action_id, .. } if action_id == "a1"));
    }

    #[tokio::test]
    async fn test_policy_handler_rejects_other_kinds() {
        let (emitter, _rx) = ChannelPolicyEmitter::channel(1);
        let handler = PolicyChangeHandler::new(Arc::new(emitter));

        let result = handler
            .handle(&Action::Unknown {
                id: "a2".to_string(),
                original_type: "UPGRADE".to_string(),
            })
            .await;
        assert!(result.is_err());
    }

    #[tokio::test]
    async fn test_unknown_handler_succeeds() {
        let result = UnknownActionHandler
            .handle(&Action::Unknown {
                id: "a3".to_string(),
                original_type: "UNENROLL".to_string(),
            })
            .await;
        assert!(result.is_ok());
    }
}

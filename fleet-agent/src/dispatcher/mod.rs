//! Hand-off of control plane actions to the code that executes them.
//!
//! The gateway only forwards the batch returned by a check-in. What an action
//! does is decided by the [`ActionHandler`] registered for its kind.

mod handlers;

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use fleet_api::{Action, ActionKind};
use tracing::debug;

use crate::{Error, Result};

pub use handlers::{
    ChannelPolicyEmitter, Policy, PolicyChangeHandler, PolicyEmitter, PolicyUpdate,
    UnknownActionHandler,
};

/// Accepts the actions of one check-in.
#[async_trait]
pub trait Dispatcher: Send + Sync + 'static {
    /// Execute `actions` in order. Called once per successful check-in, possibly
    /// with an empty batch.
    async fn dispatch(&self, actions: Vec<Action>) -> Result<()>;
}

/// Executes one kind of action.
#[async_trait]
pub trait ActionHandler: Send + Sync + 'static {
    async fn handle(&self, action: &Action) -> Result<()>;
}

/// Routes each action to the handler registered for its kind.
pub struct ActionDispatcher {
    handlers: HashMap<ActionKind, Arc<dyn ActionHandler>>,
    default_handler: Arc<dyn ActionHandler>,
}

impl ActionDispatcher {
    /// Create a dispatcher sending unregistered kinds to `default_handler`.
    pub fn new(default_handler: Arc<dyn ActionHandler>) -> Self {
        Self {
            handlers: HashMap::new(),
            default_handler,
        }
    }

    /// Register the handler for `kind`. Each kind takes a single handler.
    pub fn register(&mut self, kind: ActionKind, handler: Arc<dyn ActionHandler>) -> Result<()> {
        if self.handlers.contains_key(&kind) {
            return Err(Error::config(format!(
                "a handler is already registered for {} actions",
                kind
            )));
        }
        self.handlers.insert(kind, handler);
        Ok(())
    }

    fn handler_for(&self, kind: ActionKind) -> &Arc<dyn ActionHandler> {
        self.handlers.get(&kind).unwrap_or(&self.default_handler)
    }
}

#[async_trait]
impl Dispatcher for ActionDispatcher {
    async fn dispatch(&self, actions: Vec<Action>) -> Result<()> {
        if actions.is_empty() {
            debug!("No actions to dispatch");
            return Ok(());
        }

        debug!("Dispatching {} actions", actions.len());
        for action in &actions {
            debug!(
                "Dispatching action {} of type {}",
                action.id(),
                action.action_type()
            );
            self.handler_for(action.kind())
                .handle(action)
                .await
                .map_err(|e| match e {
                    Error::Dispatch { .. } => e,
                    other => Error::dispatch(action.id(), other.to_string()),
                })?;
        }

        Ok(())
    }
}

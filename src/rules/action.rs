//! Rule action interface.
//!
//! A string-keyed table of trait objects rather than a closed enum, since
//! the set of rule actions is meant to be open and user-extensible rather
//! than a fixed format list.

use std::collections::{BTreeMap, HashMap};

use async_trait::async_trait;
use serde_json::Value;
use thiserror::Error;
use tracing::{error, info};

use crate::message::Message;
use crate::transport::{SharedTransport, TransportError};

pub type Projection = BTreeMap<String, Value>;

#[derive(Debug, Error)]
pub enum ActionError {
    #[error("transport error while executing action")]
    Transport(#[from] TransportError),
    #[error("unknown action '{0}'")]
    UnknownAction(String),
    #[error("{0}")]
    Other(String),
}

pub struct ActionContext<'a> {
    pub message: &'a Message,
    pub rule_name: &'a str,
    pub transport: SharedTransport,
}

#[async_trait]
pub trait RuleAction: Send + Sync {
    fn name(&self) -> &str;

    async fn execute(
        &self,
        projection: &Projection,
        ctx: &ActionContext<'_>,
    ) -> Result<(), ActionError>;
}

/// Re-publishes the projected `payload` field (or, absent that, the
/// message's raw body) to a fixed target topic.
pub struct RepublishAction {
    target_topic: String,
    qos: crate::transport::QoS,
}

impl RepublishAction {
    pub fn new(target_topic: impl Into<String>, qos: crate::transport::QoS) -> Self {
        Self {
            target_topic: target_topic.into(),
            qos,
        }
    }
}

#[async_trait]
impl RuleAction for RepublishAction {
    fn name(&self) -> &str {
        "republish"
    }

    async fn execute(
        &self,
        projection: &Projection,
        ctx: &ActionContext<'_>,
    ) -> Result<(), ActionError> {
        let body = projection
            .get("payload")
            .cloned()
            .or_else(|| ctx.message.body().cloned())
            .unwrap_or(Value::Null);
        let bytes = serde_json::to_vec(&body).unwrap_or_default();

        ctx.transport
            .lock()
            .await
            .publish(&self.target_topic, &bytes, self.qos, false)
            .await
            .map_err(ActionError::Transport)
    }
}

/// Logs the rule match at info level — a stand-in for whatever
/// annotation/audit sink a deployment wires in.
pub struct TagAction;

#[async_trait]
impl RuleAction for TagAction {
    fn name(&self) -> &str {
        "tag"
    }

    async fn execute(
        &self,
        projection: &Projection,
        ctx: &ActionContext<'_>,
    ) -> Result<(), ActionError> {
        info!(rule = ctx.rule_name, ?projection, "rule matched");
        Ok(())
    }
}

/// Table from action name to behavior.
#[derive(Default)]
pub struct ActionRegistry {
    actions: HashMap<String, Box<dyn RuleAction>>,
}

impl ActionRegistry {
    pub fn with_builtins() -> Self {
        let mut registry = Self::default();
        registry.register(Box::new(TagAction));
        registry
    }

    pub fn register(&mut self, action: Box<dyn RuleAction>) {
        self.actions.insert(action.name().to_string(), action);
    }

    pub async fn execute(
        &self,
        action_name: &str,
        projection: &Projection,
        ctx: &ActionContext<'_>,
    ) -> Result<(), ActionError> {
        match self.actions.get(action_name) {
            Some(action) => action.execute(projection, ctx).await,
            None => Err(ActionError::UnknownAction(action_name.to_string())),
        }
    }

    /// Runs every action of `rule`, logging (and swallowing) individual
    /// failures so later actions and later rules still execute.
    pub async fn execute_all(&self, action_names: &[String], projection: &Projection, ctx: &ActionContext<'_>) {
        for action_name in action_names {
            if let Err(e) = self.execute(action_name, projection, ctx).await {
                error!(rule = ctx.rule_name, action = %action_name, error = %e, "rule action failed");
            }
        }
    }
}

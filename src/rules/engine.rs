//! Rule storage and the match/project/tag/fire pipeline.
//!
//! Rules are stored as a plain `Vec` walked linearly per incoming message,
//! with an added name index since rules are addressed by name from the
//! command line.

use std::collections::{BTreeMap, HashMap};

use tracing::debug;

use crate::message::Message;
use crate::topic;
use crate::transport::SharedTransport;

use super::action::{ActionContext, ActionRegistry, Projection, RuleAction};
use super::ast::{Rule, SelectField};
use super::parser::{self, RuleParseError};

#[derive(Debug, thiserror::Error)]
pub enum RuleEngineError {
    #[error("a rule named '{0}' already exists")]
    DuplicateName(String),
    #[error("no rule named '{0}'")]
    NotFound(String),
    #[error(transparent)]
    Parse(#[from] RuleParseError),
}

/// Projects a single SELECT field out of a message. Rule fields keep the
/// `payload.` prefix the grammar requires (unlike filter predicates, which
/// strip it during parsing — `crate::filter::parser`), so it is stripped
/// here, once, right before descending into the message body.
fn project_field(msg: &Message, field: &str) -> serde_json::Value {
    match field {
        "topic" => msg.topic().map(serde_json::Value::from).unwrap_or(serde_json::Value::Null),
        "qos" => msg.qos().map(serde_json::Value::from).unwrap_or(serde_json::Value::Null),
        "retain" => serde_json::Value::Bool(msg.retain()),
        "timestamp" => serde_json::Value::String(msg.timestamp().to_rfc3339()),
        "payload" => msg.body().cloned().unwrap_or(serde_json::Value::Null),
        other => {
            let dotted = other.strip_prefix("payload.").unwrap_or(other);
            msg.path(dotted).cloned().unwrap_or(serde_json::Value::Null)
        }
    }
}

fn project(msg: &Message, rule: &Rule) -> Projection {
    let mut projection = Projection::new();
    for field in rule.select_field_names() {
        projection.insert(field.to_string(), project_field(msg, field));
    }
    projection
}

/// Insertion-ordered, name-indexed collection of rules, plus the action
/// table they dispatch into. Owned by the shell; mutated only from the
/// `rule` command handler.
pub struct RuleEngine {
    rules: Vec<Rule>,
    by_name: HashMap<String, usize>,
    actions: ActionRegistry,
}

/// Default destination for the built-in `republish` action. The action
/// table is keyed by a bare name with no per-rule parameters (§9's
/// "lookup table of behaviors keyed by a string"), so a fixed topic is the
/// only construction-time choice available; a deployment wanting a
/// different destination registers its own `RepublishAction` under a
/// different name via [`RuleEngine::register_action`].
const DEFAULT_REPUBLISH_TOPIC: &str = "mqsh/republished";

impl Default for RuleEngine {
    fn default() -> Self {
        let mut actions = ActionRegistry::with_builtins();
        actions.register(Box::new(super::action::RepublishAction::new(
            DEFAULT_REPUBLISH_TOPIC,
            crate::transport::QoS::AtMostOnce,
        )));
        Self {
            rules: Vec::new(),
            by_name: HashMap::new(),
            actions,
        }
    }
}

impl RuleEngine {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register_action(&mut self, action: Box<dyn RuleAction>) {
        self.actions.register(action);
    }

    /// Parses and inserts a new rule. Rejects duplicate names without
    /// touching the existing rule set.
    pub fn add(&mut self, name: impl Into<String>, sql: &str) -> Result<(), RuleEngineError> {
        let name = name.into();
        if self.by_name.contains_key(&name) {
            return Err(RuleEngineError::DuplicateName(name));
        }
        let rule = parser::parse(name.clone(), sql)?;
        self.by_name.insert(name, self.rules.len());
        self.rules.push(rule);
        Ok(())
    }

    pub fn set_actions(&mut self, name: &str, actions: Vec<String>) -> Result<(), RuleEngineError> {
        let rule = self.rule_mut(name)?;
        rule.actions = actions;
        Ok(())
    }

    pub fn remove(&mut self, name: &str) -> Result<(), RuleEngineError> {
        let idx = *self
            .by_name
            .get(name)
            .ok_or_else(|| RuleEngineError::NotFound(name.to_string()))?;
        self.rules.remove(idx);
        self.reindex();
        Ok(())
    }

    pub fn enable(&mut self, name: &str) -> Result<(), RuleEngineError> {
        self.rule_mut(name)?.enabled = true;
        Ok(())
    }

    pub fn disable(&mut self, name: &str) -> Result<(), RuleEngineError> {
        self.rule_mut(name)?.enabled = false;
        Ok(())
    }

    pub fn list(&self) -> &[Rule] {
        &self.rules
    }

    pub fn get(&self, name: &str) -> Option<&Rule> {
        self.by_name.get(name).map(|&idx| &self.rules[idx])
    }

    fn rule_mut(&mut self, name: &str) -> Result<&mut Rule, RuleEngineError> {
        let idx = *self
            .by_name
            .get(name)
            .ok_or_else(|| RuleEngineError::NotFound(name.to_string()))?;
        Ok(&mut self.rules[idx])
    }

    fn reindex(&mut self) {
        self.by_name = self
            .rules
            .iter()
            .enumerate()
            .map(|(idx, rule)| (rule.name.clone(), idx))
            .collect();
    }

    /// Runs every enabled rule against `msg` in insertion order: topic
    /// match, then (optional) WHERE predicate, then project the SELECT
    /// list, tag the message with the first matching rule's name, and fire
    /// its actions. Rules after the first match still evaluate and project
    /// — only the message tag is first-match-wins.
    pub async fn process(
        &self,
        msg: &mut Message,
        transport: SharedTransport,
    ) -> BTreeMap<String, Projection> {
        let mut projections = BTreeMap::new();
        let mut tagged = false;

        for rule in self.rules.iter().filter(|r| r.enabled) {
            let Some(rule_topic) = msg.topic() else {
                continue;
            };
            if !topic::matches(&rule.from_topic, rule_topic) {
                continue;
            }
            if let Some(where_clause) = &rule.where_clause {
                if !crate::filter::eval::eval(where_clause, msg) {
                    continue;
                }
            }

            debug!(rule = %rule.name, "rule matched");
            let projection = project(msg, rule);

            if !tagged {
                msg.tag_matched_rule(&rule.name);
                tagged = true;
            }

            let ctx = ActionContext {
                message: msg,
                rule_name: &rule.name,
                transport: transport.clone(),
            };
            self.actions.execute_all(&rule.actions, &projection, &ctx).await;

            projections.insert(rule.name.clone(), projection);
        }

        projections
    }
}

impl Rule {
    fn select_field_names(&self) -> Vec<&str> {
        if self.select.iter().any(|f| matches!(f, SelectField::Star)) {
            self.canonical_select()
        } else {
            self.select
                .iter()
                .filter_map(|f| match f {
                    SelectField::Field(s) => Some(s.as_str()),
                    SelectField::Star => None,
                })
                .collect()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::message::MessageType;
    use crate::transport::demo::DemoTransport;
    use serde_json::json;
    use tokio::sync::Mutex;

    fn msg(payload: serde_json::Value) -> Message {
        Message::new(MessageType::Data, payload, "broker")
    }

    fn shared_demo_transport() -> SharedTransport {
        let (transport, _injector) = DemoTransport::new();
        std::sync::Arc::new(Mutex::new(transport))
    }

    #[tokio::test]
    async fn matching_rule_tags_message_and_projects_fields() {
        let mut engine = RuleEngine::new();
        engine
            .add("temp_alert", "SELECT payload.temp FROM 'sensors/#' WHERE payload.temp > 20")
            .unwrap();

        let mut message = msg(json!({"topic": "sensors/a", "payload": {"temp": 42}}));
        let projections = engine.process(&mut message, shared_demo_transport()).await;

        assert_eq!(message.matched_rule(), Some("temp_alert"));
        assert_eq!(
            projections.get("temp_alert").unwrap().get("payload.temp"),
            Some(&json!(42))
        );
    }

    #[tokio::test]
    async fn non_matching_topic_produces_no_projection() {
        let mut engine = RuleEngine::new();
        engine.add("r", "SELECT * FROM 'other/#'").unwrap();

        let mut message = msg(json!({"topic": "sensors/a", "payload": {"temp": 42}}));
        let projections = engine.process(&mut message, shared_demo_transport()).await;

        assert!(projections.is_empty());
        assert_eq!(message.matched_rule(), None);
    }

    #[tokio::test]
    async fn disabled_rule_never_matches() {
        let mut engine = RuleEngine::new();
        engine.add("r", "SELECT * FROM 'sensors/#'").unwrap();
        engine.disable("r").unwrap();

        let mut message = msg(json!({"topic": "sensors/a", "payload": {}}));
        let projections = engine.process(&mut message, shared_demo_transport()).await;

        assert!(projections.is_empty());
    }

    #[test]
    fn duplicate_rule_name_is_rejected() {
        let mut engine = RuleEngine::new();
        engine.add("r", "SELECT * FROM 'a'").unwrap();
        assert!(matches!(
            engine.add("r", "SELECT * FROM 'b'"),
            Err(RuleEngineError::DuplicateName(_))
        ));
    }

    #[test]
    fn removing_a_rule_updates_the_name_index() {
        let mut engine = RuleEngine::new();
        engine.add("a", "SELECT * FROM 'x'").unwrap();
        engine.add("b", "SELECT * FROM 'y'").unwrap();
        engine.remove("a").unwrap();

        assert!(engine.get("a").is_none());
        assert!(engine.get("b").is_some());
    }
}

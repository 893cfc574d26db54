//! Canonical in-core representation of an inbound/outbound MQTT message.

use std::collections::BTreeMap;
use std::fmt::{Display, Formatter};

use chrono::{DateTime, Utc};
use derive_getters::Getters;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use strum_macros::IntoStaticStr;

use crate::transport::IncomingPublish;

/// Kind of event a [`Message`] carries through the pipeline.
#[derive(Clone, Copy, Debug, Eq, PartialEq, IntoStaticStr, Serialize, Deserialize)]
pub enum MessageType {
    /// Incoming publish from the broker.
    Data,
    Publish,
    Subscribe,
    Unsubscribe,
    Disconnect,
    System,
}

impl Display for MessageType {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        let name: &'static str = (*self).into();
        write!(f, "{name}")
    }
}

/// A recursive sum type standing in for "reflection" over a payload's shape
///. Internally backed by [`serde_json::Value`] so dotted-path
/// descent and numeric coercion can reuse `serde_json`'s comparison types
/// instead of hand-rolling a second value model.
pub type PayloadValue = Value;

/// A single MQTT message as it flows through the shell's pipeline.
///
/// Immutable once constructed: every pipeline stage that needs to change a
/// message (filtering, formatting, rule tagging) produces a new value rather
/// than mutating this one in place.
#[derive(Clone, Debug, Getters)]
pub struct Message {
    message_type: MessageType,
    payload: PayloadValue,
    source: String,
    timestamp: DateTime<Utc>,
    metadata: BTreeMap<String, PayloadValue>,
    /// Monotonic ingestion counter, assigned by `MessageHistory::append`.
    /// `0` until the message has actually been appended.
    id: u64,
}

#[derive(Debug, thiserror::Error)]
pub enum MessageError {
    #[error("message payload has no \"topic\" field")]
    MissingTopic,
}

impl Message {
    pub fn new(message_type: MessageType, payload: PayloadValue, source: impl Into<String>) -> Self {
        Self {
            message_type,
            payload,
            source: source.into(),
            timestamp: Utc::now(),
            metadata: BTreeMap::new(),
            id: 0,
        }
    }

    pub fn with_timestamp(mut self, timestamp: DateTime<Utc>) -> Self {
        self.timestamp = timestamp;
        self
    }

    pub(crate) fn assign_id(&mut self, id: u64) {
        self.id = id;
    }

    /// Topic carried in the payload, for `Data` messages this must be present.
    pub fn topic(&self) -> Option<&str> {
        self.payload.get("topic").and_then(Value::as_str)
    }

    pub fn require_topic(&self) -> Result<&str, MessageError> {
        self.topic().ok_or(MessageError::MissingTopic)
    }

    pub fn qos(&self) -> Option<u8> {
        self.payload
            .get("qos")
            .and_then(Value::as_u64)
            .map(|v| v as u8)
    }

    pub fn retain(&self) -> bool {
        self.payload
            .get("retain")
            .and_then(Value::as_bool)
            .unwrap_or(false)
    }

    /// The raw payload body, tried under both `payload` and `message` keys
    /// per the wire contract in the shell.
    pub fn body(&self) -> Option<&Value> {
        self.payload
            .get("payload")
            .or_else(|| self.payload.get("message"))
    }

    /// Descends a dotted path (`a.b.c`) into the message body (the value
    /// under `payload`/`message` in the wire mapping) — this is the `a.b.c`
    /// in a `payload.a.b.c` field test, with the leading `payload.`
    /// already stripped by the caller. Returns `None` if any segment is
    /// absent — callers treat an absent path as "the predicate is false",
    /// never as an error.
    pub fn path(&self, dotted: &str) -> Option<&Value> {
        let mut current = self.body()?;
        for segment in dotted.split('.') {
            current = current.get(segment)?;
        }
        Some(current)
    }

    /// Records that `rule_name` matched this message, so the formatter and
    /// visualizer can tag it.
    pub fn tag_matched_rule(&mut self, rule_name: &str) {
        self.metadata.insert(
            "matched_rule".to_string(),
            Value::String(rule_name.to_string()),
        );
    }

    pub fn matched_rule(&self) -> Option<&str> {
        self.metadata.get("matched_rule").and_then(Value::as_str)
    }

    pub fn set_latency(&mut self, latency: chrono::Duration) {
        self.metadata.insert(
            "latency_ms".to_string(),
            Value::from(latency.num_milliseconds()),
        );
    }

    /// Builds the `Data` message the reader task hands to the pipeline for
    /// every publish the transport yields (§6, "Message model on the
    /// wire"). The raw payload bytes are decoded, in order: valid UTF-8 that
    /// itself parses as JSON is kept structured; plain valid UTF-8 is kept
    /// as a string; anything else is base64-encoded so no inbound bytes are
    /// ever lost or panic the shell.
    pub fn from_incoming(incoming: IncomingPublish, source: impl Into<String>) -> Self {
        let body = decode_body(&incoming.payload);
        let payload = serde_json::json!({
            "topic": incoming.topic,
            "qos": incoming.qos as u8,
            "retain": incoming.retain,
            "payload": body,
        });
        Self::new(MessageType::Data, payload, source)
    }

    /// Renders a canonical single-string view of the message, used by the
    /// `grep` text predicate and by export-to-text.
    pub fn canonical_string(&self) -> String {
        format!(
            "{} {} {} {}",
            self.timestamp.to_rfc3339(),
            self.message_type,
            self.source,
            self.payload
        )
    }
}

/// Best-effort decode of a raw publish payload into a [`PayloadValue`]:
/// structured JSON if it parses as such, otherwise the UTF-8 string,
/// otherwise a base64-encoded string (tagged so a formatter could one day
/// tell the two string cases apart, though today both simply display).
fn decode_body(bytes: &[u8]) -> Value {
    if let Ok(text) = std::str::from_utf8(bytes) {
        if let Ok(json) = serde_json::from_str::<Value>(text) {
            return json;
        }
        return Value::String(text.to_string());
    }
    Value::String(base64::Engine::encode(&base64::engine::general_purpose::STANDARD, bytes))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::transport::QoS;
    use serde_json::json;

    fn msg(payload: Value) -> Message {
        Message::new(MessageType::Data, payload, "broker")
    }

    #[test]
    fn topic_is_read_from_payload() {
        let m = msg(json!({"topic": "sensors/a", "qos": 1}));
        assert_eq!(m.topic(), Some("sensors/a"));
        assert_eq!(m.qos(), Some(1));
    }

    #[test]
    fn missing_topic_is_an_error_not_a_panic() {
        let m = msg(json!({"qos": 0}));
        assert!(matches!(m.require_topic(), Err(MessageError::MissingTopic)));
    }

    #[test]
    fn dotted_path_descends_nested_objects() {
        let m = msg(json!({"topic": "a", "payload": {"sensor": {"reading": 42}}}));
        assert_eq!(m.path("sensor.reading"), Some(&json!(42)));
        assert_eq!(m.path("sensor.missing"), None);
    }

    #[test]
    fn tagging_a_matched_rule_is_visible_in_metadata() {
        let mut m = msg(json!({"topic": "a"}));
        assert_eq!(m.matched_rule(), None);
        m.tag_matched_rule("rule1");
        assert_eq!(m.matched_rule(), Some("rule1"));
    }

    fn incoming(payload: &[u8]) -> IncomingPublish {
        IncomingPublish {
            topic: "sensors/a".to_string(),
            payload: payload.to_vec(),
            qos: QoS::AtLeastOnce,
            retain: true,
        }
    }

    #[test]
    fn from_incoming_parses_a_json_body_as_structured() {
        let m = Message::from_incoming(incoming(br#"{"temp":42}"#), "broker");
        assert_eq!(m.topic(), Some("sensors/a"));
        assert_eq!(m.qos(), Some(1));
        assert!(m.retain());
        assert_eq!(m.path("temp"), Some(&json!(42)));
    }

    #[test]
    fn from_incoming_keeps_plain_utf8_as_a_string() {
        let m = Message::from_incoming(incoming(b"hello world"), "broker");
        assert_eq!(m.body(), Some(&json!("hello world")));
    }

    #[test]
    fn from_incoming_base64_encodes_non_utf8_bytes() {
        let m = Message::from_incoming(incoming(&[0xff, 0xfe, 0x00, 0xff]), "broker");
        assert_eq!(m.body(), Some(&json!("//4A/w==")));
    }
}

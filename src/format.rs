//! Renders a [`Message`] as a single line or a vertical block (§4.6).
//!
//! Formatting is a pure function of `(message, format-state)` — it never
//! blocks and never touches the transport or the filesystem; [`crate::logger`]
//! is the one place a formatted line is written to disk.

use colored::Colorize;
use serde_json::Value;

use crate::message::{Message, MessageType};

const DEFAULT_MAX_PAYLOAD_LEN: usize = 2048;
const TRUNCATION_MARKER: &str = "... <truncated>";

#[derive(Clone, Debug)]
pub struct MessageFormatter {
    vertical: bool,
    hex: bool,
    color: bool,
    max_payload_len: usize,
    /// Dotted payload paths to project on display (`fields`/`jsonpath`
    /// handler). `None` means "render the whole body".
    project_fields: Option<Vec<String>>,
}

impl Default for MessageFormatter {
    fn default() -> Self {
        Self {
            vertical: false,
            hex: false,
            color: true,
            max_payload_len: DEFAULT_MAX_PAYLOAD_LEN,
            project_fields: None,
        }
    }
}

impl MessageFormatter {
    pub fn set_vertical(&mut self, vertical: bool) {
        self.vertical = vertical;
    }

    pub fn vertical(&self) -> bool {
        self.vertical
    }

    pub fn set_hex(&mut self, hex: bool) {
        self.hex = hex;
    }

    pub fn hex(&self) -> bool {
        self.hex
    }

    pub fn set_color(&mut self, color: bool) {
        self.color = color;
    }

    /// Restricts display to the given dotted payload paths (the `fields`/
    /// `jsonpath` handler). Passing an empty list clears the projection.
    pub fn set_project_fields(&mut self, fields: Vec<String>) {
        self.project_fields = if fields.is_empty() { None } else { Some(fields) };
    }

    pub fn project_fields(&self) -> Option<&[String]> {
        self.project_fields.as_deref()
    }

    /// Renders `msg` in whichever mode is currently configured.
    pub fn format(&self, msg: &Message) -> String {
        if self.vertical {
            self.format_vertical(msg)
        } else {
            self.format_line(msg)
        }
    }

    /// Single-line rendering: timestamp, type, topic, tag, body.
    pub fn format_line(&self, msg: &Message) -> String {
        let timestamp = msg.timestamp().format("%Y-%m-%d %H:%M:%S%.3f");
        let topic = msg.topic().unwrap_or("-");
        let body = self.render_body(msg);
        let tag = msg
            .matched_rule()
            .map(|r| format!(" [{r}]"))
            .unwrap_or_default();

        if self.color {
            format!(
                "{} {} {}{} {}",
                timestamp.to_string().dimmed(),
                msg.message_type().to_string().blue(),
                topic.green().bold(),
                tag.yellow(),
                body
            )
        } else {
            format!("{timestamp} {} {topic}{tag} {body}", msg.message_type())
        }
    }

    /// One key per line — useful for long or deeply nested payloads.
    pub fn format_vertical(&self, msg: &Message) -> String {
        let timestamp = msg.timestamp().format("%Y-%m-%d %H:%M:%S%.3f");
        let mut out = String::new();
        out.push_str(&format!("timestamp: {timestamp}\n"));
        out.push_str(&format!("type:      {}\n", msg.message_type()));
        out.push_str(&format!("topic:     {}\n", msg.topic().unwrap_or("-")));
        if let Some(qos) = msg.qos() {
            out.push_str(&format!("qos:       {qos}\n"));
        }
        if let Some(rule) = msg.matched_rule() {
            out.push_str(&format!("rule:      {rule}\n"));
        }
        out.push_str(&format!("payload:   {}", self.render_body(msg)));
        out
    }

    fn render_body(&self, msg: &Message) -> String {
        if let Some(fields) = &self.project_fields {
            let projected: serde_json::Map<String, Value> = fields
                .iter()
                .map(|path| (path.clone(), msg.path(path).cloned().unwrap_or(Value::Null)))
                .collect();
            return truncate(&Value::Object(projected).to_string(), self.max_payload_len);
        }

        let Some(body) = msg.body() else {
            return "-".to_string();
        };

        let rendered = if self.hex {
            hex_dump(body)
        } else {
            match body {
                Value::String(s) => s.clone(),
                other => other.to_string(),
            }
        };

        truncate(&rendered, self.max_payload_len)
    }
}

fn hex_dump(value: &Value) -> String {
    let bytes: Vec<u8> = match value {
        Value::String(s) => s.as_bytes().to_vec(),
        other => serde_json::to_vec(other).unwrap_or_default(),
    };
    hex::encode(bytes)
}

fn truncate(s: &str, max_len: usize) -> String {
    if s.chars().count() <= max_len {
        return s.to_string();
    }
    let cut: String = s.chars().take(max_len).collect();
    format!("{cut}{TRUNCATION_MARKER}")
}

/// Strips ANSI escape sequences (CSI `ESC '[' ... final-byte`) from `s`.
/// Applied before any write to a log file or a non-tty destination.
pub fn strip_ansi(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    let mut chars = s.chars().peekable();

    while let Some(c) = chars.next() {
        if c == '\u{1b}' && chars.peek() == Some(&'[') {
            chars.next();
            for next in chars.by_ref() {
                if next.is_ascii_alphabetic() {
                    break;
                }
            }
            continue;
        }
        out.push(c);
    }

    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn msg(body: Value) -> Message {
        Message::new(
            MessageType::Data,
            json!({"topic": "sensors/a", "qos": 1, "payload": body}),
            "broker",
        )
    }

    #[test]
    fn single_line_contains_topic_and_body() {
        let formatter = MessageFormatter::default();
        let line = formatter.format_line(&msg(json!("hello")));
        assert!(line.contains("sensors/a"));
        assert!(line.contains("hello"));
    }

    #[test]
    fn vertical_mode_renders_one_key_per_line() {
        let mut formatter = MessageFormatter::default();
        formatter.set_vertical(true);
        let block = formatter.format(&msg(json!({"temp": 30})));
        assert!(block.lines().count() >= 4);
        assert!(block.contains("topic:"));
    }

    #[test]
    fn long_payloads_are_truncated_with_a_marker() {
        let mut formatter = MessageFormatter::default();
        formatter.max_payload_len = 4;
        let line = formatter.format_line(&msg(json!("abcdefgh")));
        assert!(line.contains(TRUNCATION_MARKER));
    }

    #[test]
    fn hex_mode_renders_the_raw_bytes() {
        let mut formatter = MessageFormatter::default();
        formatter.set_hex(true);
        let line = formatter.format_line(&msg(json!("ab")));
        // `"ab"` as JSON text is rendered (not just the two content bytes),
        // so just assert it's valid lowercase hex, not a literal payload string.
        assert!(line.chars().any(|c| c.is_ascii_hexdigit()));
        assert!(!line.contains('"'));
    }

    #[test]
    fn field_projection_restricts_displayed_body_to_named_paths() {
        let mut formatter = MessageFormatter::default();
        formatter.set_project_fields(vec!["temp".to_string()]);
        let line = formatter.format_line(&msg(json!({"temp": 30, "humidity": 50})));
        assert!(line.contains("temp"));
        assert!(!line.contains("humidity"));
    }

    #[test]
    fn strip_ansi_removes_escape_sequences() {
        let colored = format!("{}plain{}", "\u{1b}[32m", "\u{1b}[0m");
        assert_eq!(strip_ansi(&colored), "plain");
    }
}

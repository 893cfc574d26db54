//! A current boolean predicate over [`crate::message::Message`].

pub mod ast;
pub mod eval;
pub mod parser;

pub use ast::Expr;
pub use parser::FilterParseError;

use crate::message::Message;

/// Owned, mutable predicate. Lifecycle: owned by the shell,
/// mutated only from the command-dispatch side; evaluated on every
/// ingested message.
#[derive(Clone, Debug)]
pub struct FilterExpression {
    expr: Expr,
    source: String,
}

impl Default for FilterExpression {
    fn default() -> Self {
        Self {
            expr: Expr::True,
            source: String::new(),
        }
    }
}

impl FilterExpression {
    /// Replaces the current predicate. On parse failure the existing filter
    /// is left unchanged.
    pub fn set(&mut self, src: &str) -> Result<(), FilterParseError> {
        let expr = parser::parse(src)?;
        self.expr = expr;
        self.source = src.to_string();
        Ok(())
    }

    pub fn matches(&self, msg: &Message) -> bool {
        eval::eval(&self.expr, msg)
    }

    /// Reverts to the always-true filter.
    pub fn clear(&mut self) {
        self.expr = Expr::True;
        self.source.clear();
    }

    pub fn is_empty(&self) -> bool {
        matches!(self.expr, Expr::True)
    }

    pub fn source(&self) -> &str {
        &self.source
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::message::{Message, MessageType};
    use serde_json::json;

    #[test]
    fn default_filter_matches_everything() {
        let f = FilterExpression::default();
        let m = Message::new(MessageType::Data, json!({"topic": "any"}), "broker");
        assert!(f.matches(&m));
    }

    #[test]
    fn failed_parse_leaves_previous_filter_intact() {
        let mut f = FilterExpression::default();
        f.set("topic = 'a'").unwrap();
        assert!(f.set("topic =").is_err());
        assert_eq!(f.source(), "topic = 'a'");
    }

    #[test]
    fn clear_reverts_to_always_true() {
        let mut f = FilterExpression::default();
        f.set("topic = 'a'").unwrap();
        f.clear();
        assert!(f.is_empty());
    }
}

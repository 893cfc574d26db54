//! Evaluation semantics for the filter/rule predicate tree.

use serde_json::Value;

use crate::message::Message;
use crate::topic;

use super::ast::{CompareOp, Expr, Literal};

/// Evaluates `expr` against `msg`. Total: never panics, never errors.
/// A missing path or an incomparable type makes the enclosing predicate
/// `false`, per the shell's EvaluationError policy ("not raised as an
/// error... the message is silently excluded").
pub fn eval(expr: &Expr, msg: &Message) -> bool {
    match expr {
        Expr::True => true,
        Expr::Topic { pattern, negate } => {
            let matched = match msg.topic() {
                Some(t) => topic::matches(pattern, t),
                None => false,
            };
            matched != *negate
        }
        Expr::Field { path, op, value } => {
            let Some(actual) = msg.path(path) else {
                return false;
            };
            compare(actual, *op, value)
        }
        Expr::Grep(needle) => msg.canonical_string().contains(needle.as_str()),
        Expr::And(a, b) => eval(a, msg) && eval(b, msg),
        Expr::Or(a, b) => eval(a, msg) || eval(b, msg),
        Expr::Not(a) => !eval(a, msg),
    }
}

fn compare(actual: &Value, op: CompareOp, expected: &Literal) -> bool {
    if let Some(ordering) = numeric_ordering(actual, expected) {
        return match op {
            CompareOp::Eq => ordering == std::cmp::Ordering::Equal,
            CompareOp::Ne => ordering != std::cmp::Ordering::Equal,
            CompareOp::Gt => ordering == std::cmp::Ordering::Greater,
            CompareOp::Lt => ordering == std::cmp::Ordering::Less,
            CompareOp::Ge => ordering != std::cmp::Ordering::Less,
            CompareOp::Le => ordering != std::cmp::Ordering::Greater,
        };
    }

    match (actual, expected, op) {
        (Value::String(s), Literal::Str(lit), CompareOp::Eq) => s == lit,
        (Value::String(s), Literal::Str(lit), CompareOp::Ne) => s != lit,
        (Value::Bool(b), Literal::Str(lit), CompareOp::Eq) => &b.to_string() == lit,
        (Value::Bool(b), Literal::Str(lit), CompareOp::Ne) => &b.to_string() != lit,
        // Ordering comparisons against non-numeric values are not
        // comparable: false, not an error.
        _ => false,
    }
}

/// Coerces both sides to numbers when both are "numeric-looking" — a JSON
/// number, or a string that parses cleanly as one — per the shell's
/// "Numeric comparison coerces string-numerics to numbers when both sides
/// are numeric literals."
fn numeric_ordering(actual: &Value, expected: &Literal) -> Option<std::cmp::Ordering> {
    let actual_num = as_f64(actual)?;
    let expected_num = match expected {
        Literal::Int(i) => *i as f64,
        Literal::Float(f) => *f,
        Literal::Str(s) => s.parse::<f64>().ok()?,
    };
    actual_num.partial_cmp(&expected_num)
}

fn as_f64(value: &Value) -> Option<f64> {
    match value {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => s.parse::<f64>().ok(),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::message::MessageType;
    use serde_json::json;

    fn msg(payload: Value) -> Message {
        Message::new(MessageType::Data, payload, "broker")
    }

    #[test]
    fn s3_filter_predicate_scenario() {
        // S3: topic = 'sensors/+' AND payload.temp > 25
        let expr = super::super::parser::parse("topic = 'sensors/+' AND payload.temp > 25").unwrap();

        let m1 = msg(json!({"topic": "sensors/a", "payload": {"temp": 30}}));
        assert!(eval(&expr, &m1));

        let m2 = msg(json!({"topic": "sensors/a/b", "payload": {"temp": 30}}));
        assert!(!eval(&expr, &m2));

        let m3 = msg(json!({"topic": "sensors/a", "payload": {"temp": 20}}));
        assert!(!eval(&expr, &m3));

        let m4 = msg(json!({"topic": "sensors/a", "payload": {"humidity": 50}}));
        assert!(!eval(&expr, &m4));
    }

    #[test]
    fn missing_path_is_false_not_an_error() {
        let expr = super::super::parser::parse("payload.missing = 1").unwrap();
        let m = msg(json!({"topic": "a", "payload": {}}));
        assert!(!eval(&expr, &m));
    }

    #[test]
    fn string_numeric_coercion() {
        let expr = super::super::parser::parse("payload.temp > 25").unwrap();
        let m = msg(json!({"topic": "a", "payload": {"temp": "30"}}));
        assert!(eval(&expr, &m));
    }

    #[test]
    fn grep_matches_against_canonical_rendering() {
        let expr = super::super::parser::parse("grep 'sensors/a'").unwrap();
        let m = msg(json!({"topic": "sensors/a"}));
        assert!(eval(&expr, &m));
    }
}

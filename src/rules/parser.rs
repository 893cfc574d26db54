//! Parser for `SELECT fields FROM topic [WHERE where]` rule text.
//!
//! Deliberately hand-rolled at the same grain as [`crate::filter::parser`]:
//! this is a closed, tiny SQL dialect (no joins, no subqueries), not a
//! target for a full SQL-parser dependency.

use thiserror::Error;

use crate::filter::parser::FilterParseError;

use super::ast::{Rule, SelectField};

#[derive(Debug, Error, PartialEq)]
pub enum RuleParseError {
    #[error("rule must start with SELECT")]
    MissingSelect,
    #[error("rule must contain FROM '<topic>'")]
    MissingFrom,
    #[error("expected a quoted topic pattern after FROM")]
    ExpectedQuotedTopic,
    #[error("empty field list in SELECT clause")]
    EmptySelectList,
    #[error("invalid field name '{0}' in SELECT clause")]
    InvalidField(String),
    #[error("unexpected trailing text '{0}' after the topic")]
    UnexpectedTrailingText(String),
    #[error("error in WHERE clause: {0}")]
    Where(#[from] FilterParseError),
}

fn word_at(chars: &[char], idx: usize, word: &str) -> bool {
    let word_chars: Vec<char> = word.chars().collect();
    if idx + word_chars.len() > chars.len() {
        return false;
    }
    for (offset, wc) in word_chars.iter().enumerate() {
        if !chars[idx + offset].eq_ignore_ascii_case(wc) {
            return false;
        }
    }
    let before_ok = idx == 0 || chars[idx - 1].is_whitespace();
    let after_idx = idx + word_chars.len();
    let after_ok = after_idx == chars.len() || chars[after_idx].is_whitespace();
    before_ok && after_ok
}

fn find_word(chars: &[char], word: &str, from: usize) -> Option<usize> {
    (from..chars.len()).find(|&i| word_at(chars, i, word))
}

fn skip_ws(chars: &[char], mut i: usize) -> usize {
    while i < chars.len() && chars[i].is_whitespace() {
        i += 1;
    }
    i
}

fn parse_fields(text: &str) -> Result<Vec<SelectField>, RuleParseError> {
    let text = text.trim();
    if text.is_empty() {
        return Err(RuleParseError::EmptySelectList);
    }
    if text == "*" {
        return Ok(vec![SelectField::Star]);
    }

    let mut fields = Vec::new();
    for part in text.split(',') {
        let part = part.trim();
        if part.is_empty()
            || !part
                .chars()
                .all(|c| c.is_alphanumeric() || c == '_' || c == '.')
        {
            return Err(RuleParseError::InvalidField(part.to_string()));
        }
        fields.push(SelectField::Field(part.to_string()));
    }
    Ok(fields)
}

/// Parses `sql` into a [`Rule`] named `name`. Never mutates any rule set —
/// callers are responsible for only inserting the rule once parsing
/// succeeds.
pub fn parse(name: impl Into<String>, sql: &str) -> Result<Rule, RuleParseError> {
    let chars: Vec<char> = sql.chars().collect();
    let mut pos = 0;

    if !word_at(&chars, pos, "select") {
        return Err(RuleParseError::MissingSelect);
    }
    pos = skip_ws(&chars, pos + "select".len());

    let Some(from_idx) = find_word(&chars, "from", pos) else {
        return Err(RuleParseError::MissingFrom);
    };
    let fields_text: String = chars[pos..from_idx].iter().collect();
    let select = parse_fields(&fields_text)?;

    pos = skip_ws(&chars, from_idx + "from".len());

    let Some(&quote) = chars.get(pos).filter(|c| **c == '\'' || **c == '"') else {
        return Err(RuleParseError::ExpectedQuotedTopic);
    };
    let topic_start = pos + 1;
    let Some(topic_end) = (topic_start..chars.len()).find(|&i| chars[i] == quote) else {
        return Err(RuleParseError::ExpectedQuotedTopic);
    };
    let from_topic: String = chars[topic_start..topic_end].iter().collect();
    pos = skip_ws(&chars, topic_end + 1);

    let where_clause = if pos >= chars.len() {
        None
    } else if word_at(&chars, pos, "where") {
        let rest: String = chars[pos + "where".len()..].iter().collect();
        Some(crate::filter::parser::parse(&rest)?)
    } else {
        let trailing: String = chars[pos..].iter().collect();
        return Err(RuleParseError::UnexpectedTrailingText(trailing));
    };

    Ok(Rule {
        name: name.into(),
        sql: sql.to_string(),
        select,
        from_topic,
        where_clause,
        actions: Vec::new(),
        enabled: true,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::filter::Expr;

    #[test]
    fn s4_rule_projection_scenario() {
        let rule = parse(
            "temp_alert",
            "SELECT payload.temp FROM 'sensors/#' WHERE payload.temp > 20",
        )
        .unwrap();
        assert_eq!(rule.from_topic, "sensors/#");
        assert_eq!(rule.select, vec![SelectField::Field("payload.temp".into())]);
        assert!(matches!(rule.where_clause, Some(Expr::Field { .. })));
    }

    #[test]
    fn star_select_with_no_where() {
        let rule = parse("all", "SELECT * FROM 'a/b'").unwrap();
        assert_eq!(rule.select, vec![SelectField::Star]);
        assert_eq!(rule.canonical_select(), vec!["topic", "payload", "timestamp", "qos"]);
        assert!(rule.where_clause.is_none());
    }

    #[test]
    fn multiple_fields_and_double_quoted_topic() {
        let rule = parse("r", "select topic, qos from \"a/b\"").unwrap();
        assert_eq!(
            rule.select,
            vec![
                SelectField::Field("topic".into()),
                SelectField::Field("qos".into())
            ]
        );
        assert_eq!(rule.from_topic, "a/b");
    }

    #[test]
    fn missing_select_is_rejected() {
        assert_eq!(
            parse("r", "FROM 'a'").unwrap_err(),
            RuleParseError::MissingSelect
        );
    }

    #[test]
    fn missing_from_is_rejected() {
        assert_eq!(
            parse("r", "SELECT *").unwrap_err(),
            RuleParseError::MissingFrom
        );
    }

    #[test]
    fn unquoted_topic_is_rejected() {
        assert_eq!(
            parse("r", "SELECT * FROM a/b").unwrap_err(),
            RuleParseError::ExpectedQuotedTopic
        );
    }

    #[test]
    fn malformed_where_clause_is_rejected() {
        assert!(parse("r", "SELECT * FROM 'a' WHERE payload.x >").is_err());
    }
}

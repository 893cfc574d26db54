//! Rule AST: `SELECT <fields> FROM '<topic>' [WHERE <expr>]`.

use crate::filter::Expr;

#[derive(Clone, Debug, PartialEq)]
pub enum SelectField {
    /// `*` — the whole message (canonical set: topic, payload, timestamp, qos).
    Star,
    /// A literal column (`topic`, `qos`, `timestamp`, `payload`) or a dotted
    /// path into the payload (`payload.sensor.reading`).
    Field(String),
}

#[derive(Clone, Debug, PartialEq)]
pub struct Rule {
    pub name: String,
    pub sql: String,
    pub select: Vec<SelectField>,
    pub from_topic: String,
    pub where_clause: Option<Expr>,
    pub actions: Vec<String>,
    pub enabled: bool,
}

impl Rule {
    pub fn canonical_select(&self) -> Vec<&str> {
        const CANONICAL: &[&str] = &["topic", "payload", "timestamp", "qos"];
        if self.select.iter().any(|f| matches!(f, SelectField::Star)) {
            CANONICAL.to_vec()
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

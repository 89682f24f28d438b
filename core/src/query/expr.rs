//! Parsed form of the query mini-language, evaluated against EVE events.
//!
//! Terms are implicitly ANDed. Supported forms:
//! - `field:value` and `field:"quoted phrase"` (case-insensitive equality)
//! - `field:(a OR b OR c)` (any of)
//! - bare words or phrases (case-insensitive substring of any leaf value)
//! - a leading `-` negates a term
//!
//! `ip` and `port` are aliases that match either side of a connection.

use serde_json::Value;

use crate::filter::tokenizer::{parse_fragment, tokenize, unquote};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Term {
    Field {
        field: String,
        values: Vec<String>,
        negated: bool,
    },
    Text {
        value: String,
        negated: bool,
    },
}

impl Term {
    fn matches(&self, event: &Value) -> bool {
        match self {
            Self::Field {
                field,
                values,
                negated,
            } => {
                let hit = field_paths(field).iter().any(|path| {
                    lookup(event, path)
                        .and_then(leaf_string)
                        .is_some_and(|actual| values.iter().any(|v| actual.eq_ignore_ascii_case(v)))
                });
                hit != *negated
            }
            Self::Text { value, negated } => {
                let needle = value.to_lowercase();
                contains_text(event, &needle) != *negated
            }
        }
    }
}

/// A parsed query: every term must match.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct QueryExpr {
    terms: Vec<Term>,
}

impl QueryExpr {
    pub fn parse(query: &str) -> Self {
        let terms = tokenize(query)
            .iter()
            .filter_map(|token| parse_term(token))
            .collect();
        Self { terms }
    }

    pub fn terms(&self) -> &[Term] {
        &self.terms
    }

    pub fn matches(&self, event: &Value) -> bool {
        self.terms.iter().all(|t| t.matches(event))
    }
}

fn parse_term(token: &str) -> Option<Term> {
    let (negated, body) = match token.strip_prefix('-') {
        Some(rest) if !rest.is_empty() => (true, rest),
        _ => (false, token),
    };
    let fragment = parse_fragment(body);
    match fragment.field {
        Some(field) => {
            let raw = &body[field.len() + 1..];
            let values = match raw.strip_prefix('(').and_then(|r| r.strip_suffix(')')) {
                Some(group) => tokenize(group)
                    .into_iter()
                    .filter(|t| t != "OR")
                    .map(|t| unquote(&t))
                    .collect(),
                None => vec![fragment.value],
            };
            Some(Term::Field {
                field,
                values,
                negated,
            })
        }
        None if fragment.value.is_empty() => None,
        None => Some(Term::Text {
            value: fragment.value,
            negated,
        }),
    }
}

fn field_paths(field: &str) -> Vec<&str> {
    match field {
        "ip" => vec!["src_ip", "dest_ip"],
        "port" => vec!["src_port", "dest_port"],
        other => vec![other],
    }
}

/// Resolve a dotted path (`alert.signature`) inside an event.
pub fn lookup<'a>(event: &'a Value, path: &str) -> Option<&'a Value> {
    path.split('.').try_fold(event, |node, key| node.get(key))
}

/// String rendering of a scalar leaf; `None` for objects, arrays and null.
pub fn leaf_string(value: &Value) -> Option<String> {
    match value {
        Value::String(s) => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        Value::Bool(b) => Some(b.to_string()),
        _ => None,
    }
}

fn contains_text(value: &Value, needle: &str) -> bool {
    match value {
        Value::Object(map) => map.values().any(|v| contains_text(v, needle)),
        Value::Array(items) => items.iter().any(|v| contains_text(v, needle)),
        other => leaf_string(other).is_some_and(|s| s.to_lowercase().contains(needle)),
    }
}

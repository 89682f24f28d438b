//! The dashboard's single source of truth for what is being filtered.
//!
//! Every mutation returns whether anything changed. The owner (the
//! dashboard controller) starts a new refresh cycle for every `true`; there
//! is no debouncing here.

use std::collections::BTreeSet;

use sensordash_types::{Severity, TimeRange};

use super::tokenizer::tokenize;
use super::url::UrlState;
use crate::query::structured_terms;

/// Structured filter fields edited through the filter form.
///
/// They take part in query composition directly until `apply_structured`
/// folds them into the free-text tokens.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct StructuredFilters {
    pub severity: BTreeSet<Severity>,
    pub ip: Option<String>,
    pub signature: Option<String>,
    pub proto: Option<String>,
    pub port: Option<String>,
}

impl StructuredFilters {
    pub fn is_empty(&self) -> bool {
        self.severity.is_empty()
            && self.ip.is_none()
            && self.signature.is_none()
            && self.proto.is_none()
            && self.port.is_none()
    }
}

/// Sensor, time range, free-text tokens and structured filters.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FilterState {
    time_range: TimeRange,
    default_time_range: TimeRange,
    sensor: Option<String>,
    tokens: Vec<String>,
    structured: StructuredFilters,
    url: UrlState,
    revision: u64,
}

impl Default for FilterState {
    fn default() -> Self {
        Self::new(TimeRange::default())
    }
}

impl FilterState {
    pub fn new(default_time_range: TimeRange) -> Self {
        Self {
            time_range: default_time_range,
            default_time_range,
            sensor: None,
            tokens: Vec::new(),
            structured: StructuredFilters::default(),
            url: UrlState::default(),
            revision: 0,
        }
    }

    /// Restore from a shared URL.
    pub fn from_url(url: &UrlState, default_time_range: TimeRange) -> Self {
        let mut state = Self::new(default_time_range);
        state.sensor = normalize(url.sensor.as_deref());
        state.tokens = dedup(tokenize(&url.q));
        state.sync_url();
        state
    }

    // ─────────────────────────────────────────────────────────────────────────
    // Accessors
    // ─────────────────────────────────────────────────────────────────────────

    pub fn time_range(&self) -> TimeRange {
        self.time_range
    }

    pub fn sensor(&self) -> Option<&str> {
        self.sensor.as_deref()
    }

    /// Free-text tokens in display order.
    pub fn tokens(&self) -> &[String] {
        &self.tokens
    }

    pub fn structured(&self) -> &StructuredFilters {
        &self.structured
    }

    /// Tokens joined back into the `q` string.
    pub fn query_text(&self) -> String {
        self.tokens.join(" ")
    }

    /// Shareable URL representation, rewritten after every mutation.
    pub fn url(&self) -> &UrlState {
        &self.url
    }

    /// Counts effective mutations.
    pub fn revision(&self) -> u64 {
        self.revision
    }

    // ─────────────────────────────────────────────────────────────────────────
    // Token mutations
    // ─────────────────────────────────────────────────────────────────────────

    /// Append the tokens of `fragment` that are not already present.
    pub fn add_token(&mut self, fragment: &str) -> bool {
        let mut tokens = dedup(tokenize(&self.query_text()));
        let mut changed = false;
        for token in tokenize(fragment) {
            if !tokens.contains(&token) {
                tokens.push(token);
                changed = true;
            }
        }
        if changed {
            self.tokens = tokens;
            self.touch();
        }
        changed
    }

    /// Remove the tokens of `fragment`.
    pub fn remove_token(&mut self, fragment: &str) -> bool {
        let remove = tokenize(fragment);
        let before = self.tokens.len();
        self.tokens.retain(|t| !remove.contains(t));
        let changed = self.tokens.len() != before;
        if changed {
            self.touch();
        }
        changed
    }

    /// Replace every token with the tokens of `q`.
    pub fn set_query(&mut self, q: &str) -> bool {
        let tokens = dedup(tokenize(q));
        if tokens == self.tokens {
            return false;
        }
        self.tokens = tokens;
        self.touch();
        true
    }

    /// Clear every filter and restore the default time range.
    pub fn reset(&mut self) -> bool {
        let cleared = Self {
            revision: self.revision,
            ..Self::new(self.default_time_range)
        };
        if *self == cleared {
            return false;
        }
        *self = cleared;
        self.touch();
        true
    }

    // ─────────────────────────────────────────────────────────────────────────
    // Scalar mutations
    // ─────────────────────────────────────────────────────────────────────────

    pub fn set_sensor(&mut self, sensor: Option<&str>) -> bool {
        let sensor = normalize(sensor);
        if sensor == self.sensor {
            return false;
        }
        self.sensor = sensor;
        self.touch();
        true
    }

    pub fn set_time_range(&mut self, time_range: TimeRange) -> bool {
        if time_range == self.time_range {
            return false;
        }
        self.time_range = time_range;
        self.touch();
        true
    }

    pub fn set_severity(&mut self, severity: BTreeSet<Severity>) -> bool {
        if severity == self.structured.severity {
            return false;
        }
        self.structured.severity = severity;
        self.touch();
        true
    }

    pub fn set_ip(&mut self, ip: Option<&str>) -> bool {
        let value = normalize(ip);
        self.set_structured(|s| &mut s.ip, value)
    }

    pub fn set_signature(&mut self, signature: Option<&str>) -> bool {
        let value = normalize(signature);
        self.set_structured(|s| &mut s.signature, value)
    }

    pub fn set_proto(&mut self, proto: Option<&str>) -> bool {
        let value = normalize(proto);
        self.set_structured(|s| &mut s.proto, value)
    }

    pub fn set_port(&mut self, port: Option<&str>) -> bool {
        let value = normalize(port);
        self.set_structured(|s| &mut s.port, value)
    }

    /// Fold the structured fields into `q` tokens and clear them.
    pub fn apply_structured(&mut self) -> bool {
        if self.structured.is_empty() {
            return false;
        }
        let terms = structured_terms(&self.structured);
        self.structured = StructuredFilters::default();
        for term in terms {
            if !self.tokens.contains(&term) {
                self.tokens.push(term);
            }
        }
        self.touch();
        true
    }

    fn set_structured(
        &mut self,
        field: impl FnOnce(&mut StructuredFilters) -> &mut Option<String>,
        value: Option<String>,
    ) -> bool {
        let slot = field(&mut self.structured);
        if *slot == value {
            return false;
        }
        *slot = value;
        self.touch();
        true
    }

    fn touch(&mut self) {
        self.revision += 1;
        self.sync_url();
    }

    fn sync_url(&mut self) {
        self.url = UrlState {
            sensor: self.sensor.clone(),
            q: self.query_text(),
        };
    }
}

fn normalize(value: Option<&str>) -> Option<String> {
    value
        .map(str::trim)
        .filter(|v| !v.is_empty())
        .map(str::to_string)
}

fn dedup(tokens: Vec<String>) -> Vec<String> {
    let mut out: Vec<String> = Vec::with_capacity(tokens.len());
    for token in tokens {
        if !out.contains(&token) {
            out.push(token);
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_add_token_is_idempotent() {
        let mut state = FilterState::default();
        assert!(state.add_token(r#"alert.signature:"ET SCAN""#));
        let after_first = state.tokens().to_vec();
        assert!(!state.add_token(r#"alert.signature:"ET SCAN""#));
        assert_eq!(state.tokens(), after_first.as_slice());
        assert_eq!(state.revision(), 1);
    }

    #[test]
    fn test_add_token_preserves_order_and_writes_url() {
        let mut state = FilterState::default();
        state.add_token("proto:TCP");
        state.add_token(r#"alert.signature:"ET SCAN""#);
        state.add_token("proto:TCP dest_port:443");
        assert_eq!(
            state.tokens(),
            &["proto:TCP", r#"alert.signature:"ET SCAN""#, "dest_port:443"]
        );
        assert_eq!(state.url().q, state.query_text());
    }

    #[test]
    fn test_whitespace_fragment_is_ignored() {
        let mut state = FilterState::default();
        assert!(!state.add_token("   "));
        assert!(state.tokens().is_empty());
    }

    #[test]
    fn test_remove_token() {
        let mut state = FilterState::default();
        state.set_query(r#"a "b c" d"#);
        assert!(state.remove_token(r#""b c""#));
        assert_eq!(state.tokens(), &["a", "d"]);
        assert!(!state.remove_token("missing"));
    }

    #[test]
    fn test_reset_restores_default_range() {
        let mut state = FilterState::new(TimeRange::Hours6);
        state.set_time_range(TimeRange::Hour1);
        state.set_sensor(Some("edge"));
        state.add_token("x");
        state.set_proto(Some("UDP"));
        assert!(state.reset());
        assert_eq!(state.time_range(), TimeRange::Hours6);
        assert_eq!(state.sensor(), None);
        assert!(state.tokens().is_empty());
        assert!(state.structured().is_empty());
        assert!(!state.reset());
    }

    #[test]
    fn test_apply_structured_folds_into_query() {
        let mut state = FilterState::default();
        state.set_severity([Severity::Medium, Severity::High].into_iter().collect());
        state.set_signature(Some("ET SCAN"));
        state.set_port(Some("443"));
        assert!(state.apply_structured());
        assert_eq!(
            state.url().q,
            r#"alert.severity:(1 OR 2) alert.signature:"ET SCAN" port:443"#
        );
        assert!(state.structured().is_empty());
        assert!(!state.apply_structured());
    }

    #[test]
    fn test_from_url_dedups_tokens() {
        let url = UrlState {
            sensor: Some("  ".into()),
            q: "a b a".into(),
        };
        let state = FilterState::from_url(&url, TimeRange::Hour1);
        assert_eq!(state.tokens(), &["a", "b"]);
        assert_eq!(state.sensor(), None);
        assert_eq!(state.url().q, "a b");
    }

    #[test]
    fn test_blank_structured_value_clears_field() {
        let mut state = FilterState::default();
        assert!(state.set_ip(Some("10.0.0.1")));
        assert!(!state.set_ip(Some("10.0.0.1")));
        assert!(state.set_ip(Some(" ")));
        assert_eq!(state.structured().ip, None);
    }
}

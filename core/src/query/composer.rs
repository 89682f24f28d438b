//! Filter state → backend query string.
//!
//! Composition is a pure function of the filter state and the chart's fixed
//! restriction. Segment order is fixed (sensor, structured filters, free
//! text, extra terms, restriction) so the same state always yields the same
//! bytes.

use sensordash_types::QueryDescriptor;

use crate::filter::tokenizer::{quote_phrase, quote_value};
use crate::filter::{FilterState, StructuredFilters};

/// Event-type restriction a chart always applies on top of the user's filters.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum EventRestriction {
    #[default]
    Any,
    Alerts,
    Flows,
    Dns,
    Tls,
    Quic,
}

impl EventRestriction {
    /// The query term, `None` for unrestricted charts.
    pub fn term(self) -> Option<&'static str> {
        match self {
            Self::Any => None,
            Self::Alerts => Some("event_type:alert"),
            Self::Flows => Some("event_type:flow"),
            Self::Dns => Some("event_type:dns"),
            Self::Tls => Some("event_type:tls"),
            Self::Quic => Some("event_type:quic"),
        }
    }

    /// Bare event type, as passed to `histogram_time`.
    pub fn event_type(self) -> Option<&'static str> {
        self.term().and_then(|t| t.split_once(':')).map(|(_, v)| v)
    }
}

/// Query terms for the structured filter fields, in fixed field order.
pub fn structured_terms(filters: &StructuredFilters) -> Vec<String> {
    let mut terms = Vec::new();
    if !filters.severity.is_empty() {
        let levels: Vec<String> = filters
            .severity
            .iter()
            .map(|s| s.level().to_string())
            .collect();
        terms.push(format!("alert.severity:({})", levels.join(" OR ")));
    }
    if let Some(ip) = &filters.ip {
        terms.push(format!("ip:{}", quote_value(ip)));
    }
    if let Some(signature) = &filters.signature {
        terms.push(format!("alert.signature:{}", quote_phrase(signature)));
    }
    if let Some(proto) = &filters.proto {
        terms.push(format!("proto:{}", quote_value(proto)));
    }
    if let Some(port) = &filters.port {
        terms.push(format!("port:{}", quote_value(port)));
    }
    terms
}

/// Compose the query string for one chart.
pub fn compose(state: &FilterState, restriction: EventRestriction) -> String {
    compose_with(state, restriction, &[])
}

/// Compose with chart-specific extra terms (e.g. a sparkline's signature).
pub fn compose_with(state: &FilterState, restriction: EventRestriction, extra: &[String]) -> String {
    let mut segments: Vec<String> = Vec::new();
    if let Some(sensor) = state.sensor() {
        segments.push(format!("host:{}", quote_value(sensor)));
    }
    segments.extend(structured_terms(state.structured()));
    segments.extend(state.tokens().iter().cloned());
    segments.extend(extra.iter().cloned());
    if let Some(term) = restriction.term() {
        segments.push(term.to_string());
    }
    segments.retain(|s| !s.trim().is_empty());
    segments.join(" ")
}

/// Top-N aggregation descriptor for `field`.
pub fn describe_top(
    state: &FilterState,
    restriction: EventRestriction,
    field: &str,
    size: usize,
) -> QueryDescriptor {
    QueryDescriptor::top(field, state.time_range(), compose(state, restriction)).with_size(size)
}

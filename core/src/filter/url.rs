//! Shareable URL representation of the filter state.
//!
//! Only `sensor` and `q` travel in the URL. Structured filters are folded
//! into `q` when applied, so they never need parameters of their own.

use serde::{Deserialize, Serialize};

/// The `sensor` / `q` pair carried in the page URL.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct UrlState {
    pub sensor: Option<String>,
    pub q: String,
}

impl UrlState {
    /// Encode as `sensor=..&q=..`, omitting empty parameters.
    pub fn to_query_string(&self) -> String {
        let mut params = Vec::with_capacity(2);
        if let Some(sensor) = self.sensor.as_deref().filter(|s| !s.is_empty()) {
            params.push(format!("sensor={}", urlencoding::encode(sensor)));
        }
        if !self.q.is_empty() {
            params.push(format!("q={}", urlencoding::encode(&self.q)));
        }
        params.join("&")
    }

    /// Decode a query string (with or without the leading `?`).
    ///
    /// Unknown parameters are ignored and undecodable values are dropped.
    pub fn from_query_string(query: &str) -> Self {
        let mut state = Self::default();
        for pair in query.trim_start_matches('?').split('&') {
            let Some((name, raw)) = pair.split_once('=') else {
                continue;
            };
            let spaced = raw.replace('+', " ");
            let value = match urlencoding::decode(&spaced) {
                Ok(v) => v.into_owned(),
                Err(e) => {
                    tracing::warn!(param = name, error = %e, "Dropping undecodable URL parameter");
                    continue;
                }
            };
            match name {
                "sensor" if !value.is_empty() => state.sensor = Some(value),
                "q" => state.q = value,
                _ => {}
            }
        }
        state
    }
}

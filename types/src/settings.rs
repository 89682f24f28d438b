//! Client-side settings read by the refresh engine.

use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::{DEFAULT_TOP_N, TimeRange};

/// How bucket timestamps are labelled. Display only; never affects queries.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TimestampMode {
    #[default]
    Local,
    Utc,
}

/// Dashboard settings persisted per user.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct DashboardSettings {
    /// Per-request budget in seconds. 0 disables the timeout.
    pub query_timeout_secs: u64,
    pub timestamp_mode: TimestampMode,
    /// Range restored by `reset()`.
    pub default_time_range: TimeRange,
    /// Row cap for top-N charts.
    pub top_n: usize,
    /// Sparkline bucket width in seconds; derived from the time range when unset.
    pub sparkline_interval_secs: Option<u64>,
}

impl Default for DashboardSettings {
    fn default() -> Self {
        Self {
            query_timeout_secs: 0,
            timestamp_mode: TimestampMode::Local,
            default_time_range: TimeRange::Hours24,
            top_n: DEFAULT_TOP_N,
            sparkline_interval_secs: None,
        }
    }
}

impl DashboardSettings {
    /// Request timeout, `None` when disabled.
    pub fn query_timeout(&self) -> Option<Duration> {
        (self.query_timeout_secs > 0).then(|| Duration::from_secs(self.query_timeout_secs))
    }
}

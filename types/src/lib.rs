//! Shared types for sensordash.
//!
//! The data model exchanged between the filter state, the query composer,
//! the backend and the chart builders. Kept free of runtime dependencies so
//! any frontend or backend can depend on it.

pub mod formatting;
mod settings;
mod time_range;

use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

pub use settings::{DashboardSettings, TimestampMode};
pub use time_range::{ParseTimeRangeError, TimeRange};

// ─────────────────────────────────────────────────────────────────────────────
// Severity
// ─────────────────────────────────────────────────────────────────────────────

/// Alert severity buckets.
///
/// Ordered highest first so sets iterate in the same order the backend's
/// numeric levels do (1 = high).
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    High,
    Medium,
    Low,
}

impl Severity {
    pub const ALL: [Severity; 3] = [Severity::High, Severity::Medium, Severity::Low];

    /// Numeric level stored on alert events.
    pub fn level(self) -> u8 {
        match self {
            Self::High => 1,
            Self::Medium => 2,
            Self::Low => 3,
        }
    }

    /// Map a numeric alert level back to a bucket. Levels above 3 count as low.
    pub fn from_level(level: u64) -> Option<Self> {
        match level {
            0 => None,
            1 => Some(Self::High),
            2 => Some(Self::Medium),
            _ => Some(Self::Low),
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::High => "high",
            Self::Medium => "medium",
            Self::Low => "low",
        }
    }
}

impl fmt::Display for Severity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Severity {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "high" | "1" => Ok(Self::High),
            "medium" | "2" => Ok(Self::Medium),
            "low" | "3" => Ok(Self::Low),
            other => Err(format!("unknown severity {other:?}")),
        }
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Backend results
// ─────────────────────────────────────────────────────────────────────────────

/// One `{key, count}` row of a top-N aggregation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AggregationRow {
    pub key: String,
    pub count: u64,
}

impl AggregationRow {
    pub fn new(key: impl Into<String>, count: u64) -> Self {
        Self {
            key: key.into(),
            count,
        }
    }
}

/// Result of a top-N aggregation, rows in backend order (count descending).
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct AggregationResult {
    pub rows: Vec<AggregationRow>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub earliest_timestamp: Option<DateTime<Utc>>,
}

impl AggregationResult {
    pub fn new(rows: Vec<AggregationRow>) -> Self {
        Self {
            rows,
            earliest_timestamp: None,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    pub fn keys(&self) -> impl Iterator<Item = &str> {
        self.rows.iter().map(|r| r.key.as_str())
    }
}

/// A single fixed-width time bucket.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TimeBucket {
    pub time: DateTime<Utc>,
    pub count: u64,
}

/// Result of `histogram_time`: buckets in ascending time order.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct TimeHistogram {
    pub data: Vec<TimeBucket>,
}

impl TimeHistogram {
    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }
}

/// One time bucket of the severity histogram, counts keyed by severity.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SeverityBucket {
    pub time: DateTime<Utc>,
    pub counts: BTreeMap<Severity, u64>,
}

/// Result of `histogram_severity`: time buckets, each split by severity.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct SeverityHistogram {
    pub buckets: Vec<SeverityBucket>,
}

impl SeverityHistogram {
    pub fn is_empty(&self) -> bool {
        self.buckets.is_empty()
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Query descriptor
// ─────────────────────────────────────────────────────────────────────────────

/// Sort order of an aggregation's rows.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SortOrder {
    #[default]
    Desc,
    Asc,
}

/// Default top-N cap for aggregations.
pub const DEFAULT_TOP_N: usize = 10;

/// Everything the backend needs to run one chart's query.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct QueryDescriptor {
    /// Aggregation dimension; `None` for time histograms.
    pub field: Option<String>,
    pub size: usize,
    pub order: SortOrder,
    pub time_range: TimeRange,
    pub query_string: String,
    /// Incremental (streamed) delivery instead of a single response.
    pub streaming: bool,
}

impl QueryDescriptor {
    /// One-shot top-N aggregation over `field`.
    pub fn top(field: impl Into<String>, time_range: TimeRange, query_string: String) -> Self {
        Self {
            field: Some(field.into()),
            size: DEFAULT_TOP_N,
            order: SortOrder::Desc,
            time_range,
            query_string,
            streaming: false,
        }
    }

    /// Descriptor for a time histogram (no aggregation field).
    pub fn histogram(time_range: TimeRange, query_string: String) -> Self {
        Self {
            field: None,
            size: DEFAULT_TOP_N,
            order: SortOrder::Desc,
            time_range,
            query_string,
            streaming: false,
        }
    }

    pub fn with_size(mut self, size: usize) -> Self {
        self.size = size;
        self
    }

    pub fn streaming(mut self) -> Self {
        self.streaming = true;
        self
    }
}

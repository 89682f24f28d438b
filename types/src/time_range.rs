//! Time range selection shared by the filter state and every backend request.

use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};

/// The time window a dashboard cycle queries over.
///
/// Relative presets are resolved against "now" at request time; `Custom`
/// pins both ends. Serialized as the same short string the URL and the
/// settings file use (`"1h"`, `"24h"`, or `"<start>..<end>"` in RFC 3339).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub enum TimeRange {
    Minutes15,
    Hour1,
    Hours6,
    #[default]
    Hours24,
    Days3,
    Days7,
    Days30,
    Custom {
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    },
}

impl TimeRange {
    /// All relative presets, shortest first.
    pub const PRESETS: [TimeRange; 7] = [
        TimeRange::Minutes15,
        TimeRange::Hour1,
        TimeRange::Hours6,
        TimeRange::Hours24,
        TimeRange::Days3,
        TimeRange::Days7,
        TimeRange::Days30,
    ];

    /// Length of the window.
    pub fn duration(&self) -> Duration {
        match self {
            Self::Minutes15 => Duration::minutes(15),
            Self::Hour1 => Duration::hours(1),
            Self::Hours6 => Duration::hours(6),
            Self::Hours24 => Duration::hours(24),
            Self::Days3 => Duration::days(3),
            Self::Days7 => Duration::days(7),
            Self::Days30 => Duration::days(30),
            Self::Custom { start, end } => *end - *start,
        }
    }

    /// Resolve to absolute `(start, end)` bounds relative to `now`.
    pub fn bounds(&self, now: DateTime<Utc>) -> (DateTime<Utc>, DateTime<Utc>) {
        match self {
            Self::Custom { start, end } => (*start, *end),
            preset => (now - preset.duration(), now),
        }
    }

    /// Histogram bucket width that gives a readable number of points.
    pub fn default_interval(&self) -> Duration {
        match self {
            Self::Minutes15 => Duration::seconds(30),
            Self::Hour1 => Duration::minutes(1),
            Self::Hours6 => Duration::minutes(5),
            Self::Hours24 => Duration::minutes(15),
            Self::Days3 => Duration::hours(1),
            Self::Days7 => Duration::hours(3),
            Self::Days30 => Duration::hours(12),
            Self::Custom { .. } => {
                let secs = (self.duration().num_seconds() / 60).max(60);
                Duration::seconds(secs)
            }
        }
    }

    /// Short preset label, or `None` for custom ranges.
    pub fn preset_label(&self) -> Option<&'static str> {
        match self {
            Self::Minutes15 => Some("15m"),
            Self::Hour1 => Some("1h"),
            Self::Hours6 => Some("6h"),
            Self::Hours24 => Some("24h"),
            Self::Days3 => Some("3d"),
            Self::Days7 => Some("7d"),
            Self::Days30 => Some("30d"),
            Self::Custom { .. } => None,
        }
    }
}

impl fmt::Display for TimeRange {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Custom { start, end } => {
                write!(f, "{}..{}", start.to_rfc3339(), end.to_rfc3339())
            }
            preset => f.write_str(preset.preset_label().unwrap_or_default()),
        }
    }
}

/// Error returned when a time range string is not a known preset or a valid
/// `start..end` pair.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParseTimeRangeError(pub String);

impl fmt::Display for ParseTimeRangeError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "invalid time range {:?}", self.0)
    }
}

impl std::error::Error for ParseTimeRangeError {}

impl FromStr for TimeRange {
    type Err = ParseTimeRangeError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let trimmed = s.trim();
        if let Some(preset) = Self::PRESETS
            .iter()
            .find(|p| p.preset_label() == Some(trimmed))
        {
            return Ok(*preset);
        }

        let (start, end) = trimmed
            .split_once("..")
            .ok_or_else(|| ParseTimeRangeError(s.to_string()))?;
        let parse = |v: &str| {
            DateTime::parse_from_rfc3339(v.trim())
                .map(|dt| dt.with_timezone(&Utc))
                .map_err(|_| ParseTimeRangeError(s.to_string()))
        };
        let (start, end) = (parse(start)?, parse(end)?);
        if end <= start {
            return Err(ParseTimeRangeError(s.to_string()));
        }
        Ok(Self::Custom { start, end })
    }
}

impl TryFrom<String> for TimeRange {
    type Error = ParseTimeRangeError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<TimeRange> for String {
    fn from(value: TimeRange) -> Self {
        value.to_string()
    }
}

//! Centralized display formatting for chart labels and tooltips.
//!
//! Everything here is presentation only. Chart builders call into this
//! module so the same count renders the same way in every visual.

use chrono::{DateTime, Duration, Local, Utc};

use crate::TimestampMode;

/// Format an event count with K/M suffix for axis ticks.
///
/// - Values >= 1,000,000 are formatted as `X.XXM`
/// - Values >= 1,000 are formatted as `X.XXK`
/// - Values below 1,000 are formatted as-is
///
/// # Examples
/// ```
/// use sensordash_types::formatting::format_count;
/// assert_eq!(format_count(42), "42");
/// assert_eq!(format_count(1_500), "1.50K");
/// assert_eq!(format_count(2_250_000), "2.25M");
/// ```
pub fn format_count(n: u64) -> String {
    if n >= 1_000_000 {
        format!("{:.2}M", n as f64 / 1_000_000.0)
    } else if n >= 1_000 {
        format!("{:.2}K", n as f64 / 1_000.0)
    } else {
        n.to_string()
    }
}

/// Format a count with thousands separators for tooltips.
///
/// # Examples
/// ```
/// use sensordash_types::formatting::format_thousands;
/// assert_eq!(format_thousands(0), "0");
/// assert_eq!(format_thousands(1_500), "1,500");
/// assert_eq!(format_thousands(1_500_000), "1,500,000");
/// ```
pub fn format_thousands(n: u64) -> String {
    let digits = n.to_string();
    let mut result = String::with_capacity(digits.len() + digits.len() / 3);
    for (i, c) in digits.chars().enumerate() {
        if i > 0 && (digits.len() - i) % 3 == 0 {
            result.push(',');
        }
        result.push(c);
    }
    result
}

/// Format a byte count using binary units.
///
/// # Examples
/// ```
/// use sensordash_types::formatting::format_bytes;
/// assert_eq!(format_bytes(512), "512 B");
/// assert_eq!(format_bytes(2048), "2.0 KiB");
/// assert_eq!(format_bytes(5 * 1024 * 1024), "5.0 MiB");
/// ```
pub fn format_bytes(n: u64) -> String {
    const UNITS: [&str; 4] = ["KiB", "MiB", "GiB", "TiB"];
    if n < 1024 {
        return format!("{n} B");
    }
    let mut value = n as f64 / 1024.0;
    let mut unit = 0;
    while value >= 1024.0 && unit < UNITS.len() - 1 {
        value /= 1024.0;
        unit += 1;
    }
    format!("{:.1} {}", value, UNITS[unit])
}

/// Share of `count` in `total` with one decimal place.
///
/// Returns `"0%"` if total is zero.
///
/// # Examples
/// ```
/// use sensordash_types::formatting::format_share;
/// assert_eq!(format_share(3, 10), "30.0%");
/// assert_eq!(format_share(0, 0), "0%");
/// ```
pub fn format_share(count: u64, total: u64) -> String {
    if total == 0 {
        return "0%".to_string();
    }
    format!("{:.1}%", count as f64 / total as f64 * 100.0)
}

/// Label for a histogram bucket, granularity chosen from the bucket width.
///
/// - width >= 1 day: `YYYY-MM-DD`
/// - width >= 1 hour: `MM-DD HH:MM`
/// - width >= 1 minute: `HH:MM`
/// - otherwise: `HH:MM:SS`
///
/// # Examples
/// ```
/// use chrono::{Duration, TimeZone, Utc};
/// use sensordash_types::{TimestampMode, formatting::format_bucket_label};
/// let t = Utc.with_ymd_and_hms(2026, 5, 4, 13, 45, 10).unwrap();
/// assert_eq!(format_bucket_label(t, Duration::minutes(5), TimestampMode::Utc), "13:45");
/// assert_eq!(format_bucket_label(t, Duration::hours(3), TimestampMode::Utc), "05-04 13:45");
/// assert_eq!(format_bucket_label(t, Duration::days(1), TimestampMode::Utc), "2026-05-04");
/// ```
pub fn format_bucket_label(time: DateTime<Utc>, width: Duration, mode: TimestampMode) -> String {
    let pattern = if width >= Duration::days(1) {
        "%Y-%m-%d"
    } else if width >= Duration::hours(1) {
        "%m-%d %H:%M"
    } else if width >= Duration::minutes(1) {
        "%H:%M"
    } else {
        "%H:%M:%S"
    };
    match mode {
        TimestampMode::Utc => time.format(pattern).to_string(),
        TimestampMode::Local => time.with_timezone(&Local).format(pattern).to_string(),
    }
}

/// Shorten a label for axis display, keeping the head and an ellipsis.
///
/// Only the rendered label is shortened; the element map keeps full values.
///
/// # Examples
/// ```
/// use sensordash_types::formatting::truncate_label;
/// assert_eq!(truncate_label("ET SCAN", 20), "ET SCAN");
/// assert_eq!(truncate_label("ET POLICY Outbound", 9), "ET POLIC…");
/// ```
pub fn truncate_label(label: &str, max_chars: usize) -> String {
    if label.chars().count() <= max_chars {
        return label.to_string();
    }
    let mut out: String = label.chars().take(max_chars.saturating_sub(1)).collect();
    out.push('…');
    out
}

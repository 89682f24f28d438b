//! Typed visual configurations and their builders.
//!
//! One variant per chart kind, each carrying only what that kind needs.
//! Builders validate shapes and return the element map alongside the config
//! so clicks can be resolved without looking inside the visual.

use chrono::Duration;
use serde::Serialize;
use serde_json::Value;

use sensordash_types::formatting::{format_bucket_label, format_share, truncate_label};
use sensordash_types::{AggregationResult, Severity, SeverityHistogram, TimeHistogram, TimestampMode};

use crate::error::ShapeError;
use crate::filter::tokenizer::fragment;

/// Longest axis label before truncation.
const MAX_LABEL_CHARS: usize = 48;

// ─────────────────────────────────────────────────────────────────────────────
// Element mapping
// ─────────────────────────────────────────────────────────────────────────────

/// The `{field, value}` a visual element was drawn from.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FilterTarget {
    pub field: String,
    pub value: String,
}

impl FilterTarget {
    pub fn new(field: impl Into<String>, value: impl Into<String>) -> Self {
        Self {
            field: field.into(),
            value: value.into(),
        }
    }

    /// Filter fragment that selects this element.
    pub fn fragment(&self) -> String {
        fragment(&self.field, &self.value)
    }
}

/// Element index → originating filter target, for points and legend entries.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct ElementMap {
    pub points: Vec<Option<FilterTarget>>,
    pub legend: Vec<Option<FilterTarget>>,
}

impl ElementMap {
    /// One target per point, all on the same field.
    pub fn for_points<'a>(field: &str, values: impl IntoIterator<Item = &'a str>) -> Self {
        Self {
            points: values
                .into_iter()
                .map(|v| Some(FilterTarget::new(field, v)))
                .collect(),
            legend: Vec::new(),
        }
    }

    pub fn point(&self, index: usize) -> Option<&FilterTarget> {
        self.points.get(index).and_then(Option::as_ref)
    }

    pub fn legend(&self, index: usize) -> Option<&FilterTarget> {
        self.legend.get(index).and_then(Option::as_ref)
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Configs
// ─────────────────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct BarConfig {
    pub title: String,
    /// Display labels, possibly truncated.
    pub labels: Vec<String>,
    pub values: Vec<u64>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Series {
    pub name: String,
    pub values: Vec<u64>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct LineConfig {
    pub title: String,
    pub labels: Vec<String>,
    pub series: Vec<Series>,
    pub stacked: bool,
    /// Sparkline rendering: no axes, no legend.
    pub compact: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Slice {
    pub label: String,
    pub value: u64,
    pub share: String,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DonutConfig {
    pub title: String,
    pub slices: Vec<Slice>,
    pub total: u64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct BubblePoint {
    pub hour: u32,
    /// 0 = Monday.
    pub day: u32,
    pub count: u64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct BubbleConfig {
    pub title: String,
    pub points: Vec<BubblePoint>,
    pub max_count: u64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ScatterPoint {
    pub label: String,
    pub x: u64,
    pub y: u64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ScatterConfig {
    pub title: String,
    pub x_label: String,
    pub y_label: String,
    pub points: Vec<ScatterPoint>,
}

/// Placeholder shown instead of data.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "state", content = "message", rename_all = "snake_case")]
pub enum Notice {
    Empty,
    Failed(String),
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct NoticeConfig {
    pub title: String,
    pub notice: Notice,
}

/// A complete visual configuration.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ChartConfig {
    Bar(BarConfig),
    Line(LineConfig),
    Donut(DonutConfig),
    Bubble(BubbleConfig),
    Scatter(ScatterConfig),
    Notice(NoticeConfig),
}

impl ChartConfig {
    pub fn title(&self) -> &str {
        match self {
            Self::Bar(c) => &c.title,
            Self::Line(c) => &c.title,
            Self::Donut(c) => &c.title,
            Self::Bubble(c) => &c.title,
            Self::Scatter(c) => &c.title,
            Self::Notice(c) => &c.title,
        }
    }

    pub fn kind(&self) -> &'static str {
        match self {
            Self::Bar(_) => "bar",
            Self::Line(_) => "line",
            Self::Donut(_) => "donut",
            Self::Bubble(_) => "bubble",
            Self::Scatter(_) => "scatter",
            Self::Notice(_) => "notice",
        }
    }

    /// Explicit no-data state.
    pub fn empty(title: impl Into<String>) -> Self {
        Self::Notice(NoticeConfig {
            title: title.into(),
            notice: Notice::Empty,
        })
    }

    /// Explicit failed-to-load state.
    pub fn failed(title: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Notice(NoticeConfig {
            title: title.into(),
            notice: Notice::Failed(message.into()),
        })
    }
}

/// A config plus the element map the registry keeps next to the visual.
#[derive(Debug, Clone, PartialEq)]
pub struct BuiltChart {
    pub config: ChartConfig,
    pub elements: ElementMap,
}

impl BuiltChart {
    pub fn without_elements(config: ChartConfig) -> Self {
        Self {
            config,
            elements: ElementMap::default(),
        }
    }
}

/// In-place update for a live donut: replaces labels and data.
#[derive(Debug, Clone, PartialEq)]
pub struct SeriesPatch {
    pub config: DonutConfig,
    pub elements: ElementMap,
}

// ─────────────────────────────────────────────────────────────────────────────
// Builders
// ─────────────────────────────────────────────────────────────────────────────

/// Horizontal bar chart; element `i` filters on `field:labels[i]`.
pub fn bar_chart(
    title: &str,
    field: &str,
    labels: &[String],
    values: &[u64],
) -> Result<BuiltChart, ShapeError> {
    check_lengths(labels.len(), values.len())?;
    Ok(BuiltChart {
        config: ChartConfig::Bar(BarConfig {
            title: title.to_string(),
            labels: labels
                .iter()
                .map(|l| truncate_label(l, MAX_LABEL_CHARS))
                .collect(),
            values: values.to_vec(),
        }),
        elements: ElementMap::for_points(field, labels.iter().map(String::as_str)),
    })
}

pub fn bar_from_rows(
    title: &str,
    field: &str,
    result: &AggregationResult,
) -> Result<BuiltChart, ShapeError> {
    let labels: Vec<String> = result.rows.iter().map(|r| r.key.clone()).collect();
    let values: Vec<u64> = result.rows.iter().map(|r| r.count).collect();
    bar_chart(title, field, &labels, &values)
}

/// Donut; slices and legend entries both filter on `field:key`.
pub fn donut_from_rows(
    title: &str,
    field: &str,
    result: &AggregationResult,
) -> Result<SeriesPatch, ShapeError> {
    let total = result
        .rows
        .iter()
        .fold(0u64, |total, r| total.saturating_add(r.count));
    let slices = result
        .rows
        .iter()
        .map(|r| Slice {
            label: truncate_label(&r.key, MAX_LABEL_CHARS),
            value: r.count,
            share: format_share(r.count, total),
        })
        .collect();
    let mut elements = ElementMap::for_points(field, result.keys());
    elements.legend = elements.points.clone();
    Ok(SeriesPatch {
        config: DonutConfig {
            title: title.to_string(),
            slices,
            total,
        },
        elements,
    })
}

/// Single-series line over a time histogram.
pub fn line_from_time(
    title: &str,
    histogram: &TimeHistogram,
    interval: Duration,
    mode: TimestampMode,
    compact: bool,
) -> Result<BuiltChart, ShapeError> {
    let labels: Vec<String> = histogram
        .data
        .iter()
        .map(|b| format_bucket_label(b.time, interval, mode))
        .collect();
    let values: Vec<u64> = histogram.data.iter().map(|b| b.count).collect();
    line_chart(
        title,
        labels,
        vec![Series {
            name: title.to_string(),
            values,
        }],
        false,
        compact,
    )
}

/// Stacked lines, one series per severity; legend entries filter on severity.
pub fn stacked_severity(
    title: &str,
    histogram: &SeverityHistogram,
    interval: Duration,
    mode: TimestampMode,
) -> Result<BuiltChart, ShapeError> {
    let labels: Vec<String> = histogram
        .buckets
        .iter()
        .map(|b| format_bucket_label(b.time, interval, mode))
        .collect();
    let series: Vec<Series> = Severity::ALL
        .iter()
        .map(|severity| Series {
            name: severity.to_string(),
            values: histogram
                .buckets
                .iter()
                .map(|b| b.counts.get(severity).copied().unwrap_or(0))
                .collect(),
        })
        .collect();
    let mut built = line_chart(title, labels, series, true, false)?;
    built.elements.legend = Severity::ALL
        .iter()
        .map(|s| Some(FilterTarget::new("alert.severity", s.level().to_string())))
        .collect();
    Ok(built)
}

pub fn line_chart(
    title: &str,
    labels: Vec<String>,
    series: Vec<Series>,
    stacked: bool,
    compact: bool,
) -> Result<BuiltChart, ShapeError> {
    for s in &series {
        check_lengths(labels.len(), s.values.len())?;
    }
    Ok(BuiltChart::without_elements(ChartConfig::Line(LineConfig {
        title: title.to_string(),
        labels,
        series,
        stacked,
        compact,
    })))
}

/// Weekday × hour bubbles from `{"data": [{day, hour, count}]}`.
pub fn bubble_from_value(title: &str, value: &Value) -> Result<BuiltChart, ShapeError> {
    let mut points = Vec::new();
    for item in data_array(value)? {
        let day = u32_field(item, "day")?;
        let hour = u32_field(item, "hour")?;
        let count = u64_field(item, "count")?;
        if day > 6 || hour > 23 {
            return Err(ShapeError::Payload(format!(
                "cell out of range: day {day}, hour {hour}"
            )));
        }
        points.push(BubblePoint { hour, day, count });
    }
    let max_count = points.iter().map(|p| p.count).max().unwrap_or(0);
    Ok(BuiltChart::without_elements(ChartConfig::Bubble(
        BubbleConfig {
            title: title.to_string(),
            points,
            max_count,
        },
    )))
}

/// Flow bytes scatter from `{"data": [{key, src_ip, to_server, to_client}]}`.
/// Points filter on the flow's source address.
pub fn scatter_from_value(title: &str, value: &Value) -> Result<BuiltChart, ShapeError> {
    let mut points = Vec::new();
    let mut elements = ElementMap::default();
    for item in data_array(value)? {
        let label = str_field(item, "key")?;
        points.push(ScatterPoint {
            label: label.to_string(),
            x: u64_field(item, "to_server")?,
            y: u64_field(item, "to_client")?,
        });
        elements.points.push(
            item.get("src_ip")
                .and_then(Value::as_str)
                .filter(|ip| !ip.is_empty())
                .map(|ip| FilterTarget::new("src_ip", ip)),
        );
    }
    Ok(BuiltChart {
        config: ChartConfig::Scatter(ScatterConfig {
            title: title.to_string(),
            x_label: "bytes to server".to_string(),
            y_label: "bytes to client".to_string(),
            points,
        }),
        elements,
    })
}

fn check_lengths(labels: usize, values: usize) -> Result<(), ShapeError> {
    if labels == values {
        Ok(())
    } else {
        Err(ShapeError::LengthMismatch { labels, values })
    }
}

fn data_array(value: &Value) -> Result<&Vec<Value>, ShapeError> {
    value
        .get("data")
        .and_then(Value::as_array)
        .ok_or_else(|| ShapeError::Payload("missing data array".to_string()))
}

fn u64_field(item: &Value, name: &str) -> Result<u64, ShapeError> {
    item.get(name)
        .and_then(Value::as_u64)
        .ok_or_else(|| ShapeError::Payload(format!("missing integer {name:?}")))
}

fn u32_field(item: &Value, name: &str) -> Result<u32, ShapeError> {
    u64_field(item, name)?
        .try_into()
        .map_err(|_| ShapeError::Payload(format!("{name:?} out of range")))
}

fn str_field<'a>(item: &'a Value, name: &str) -> Result<&'a str, ShapeError> {
    item.get(name)
        .and_then(Value::as_str)
        .ok_or_else(|| ShapeError::Payload(format!("missing string {name:?}")))
}

//! Plain-text chart sink.
//!
//! Every visual is kept as its latest config and drawn as a few lines of
//! text on demand. Creation, patching and teardown are traced so a replay
//! log shows the full visual lifecycle.

use std::fmt::Write as _;

use sensordash_core::charts::config::{
    BarConfig, BubbleConfig, DonutConfig, LineConfig, NoticeConfig, ScatterConfig,
};
use sensordash_core::charts::{ChartConfig, ChartKey, ChartSink, ChartSinkFactory, Notice, SeriesPatch};
use sensordash_core::error::SinkError;
use sensordash_types::formatting::{format_bytes, format_count, format_thousands};

/// Width of the longest bar, in characters.
const BAR_WIDTH: u64 = 30;

pub struct TextSink {
    key: ChartKey,
    config: ChartConfig,
    redraws: u32,
}

impl TextSink {
    pub fn render(&self) -> String {
        render_chart(&self.key, &self.config)
    }

    pub fn redraws(&self) -> u32 {
        self.redraws
    }
}

impl ChartSink for TextSink {
    fn patch(&mut self, patch: &SeriesPatch) -> Result<(), SinkError> {
        tracing::trace!(chart = %self.key, slices = patch.config.slices.len(), "Patching text visual");
        self.config = ChartConfig::Donut(patch.config.clone());
        Ok(())
    }

    fn redraw(&mut self) {
        self.redraws += 1;
    }

    fn destroy(self) {
        tracing::trace!(chart = %self.key, redraws = self.redraws, "Destroying text visual");
    }
}

#[derive(Debug, Default)]
pub struct TextFactory {
    created: u64,
}

impl TextFactory {
    pub fn created(&self) -> u64 {
        self.created
    }
}

impl ChartSinkFactory for TextFactory {
    type Sink = TextSink;

    fn create(&mut self, key: &ChartKey, config: &ChartConfig) -> Result<TextSink, SinkError> {
        self.created += 1;
        tracing::trace!(chart = %key, kind = config.kind(), "Creating text visual");
        Ok(TextSink {
            key: key.clone(),
            config: config.clone(),
            redraws: 0,
        })
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Drawing
// ─────────────────────────────────────────────────────────────────────────────

/// Draw one chart as text: a `== title [id] ==` header followed by its body.
pub fn render_chart(key: &ChartKey, config: &ChartConfig) -> String {
    let mut out = format!("== {} [{}] ==\n", config.title(), key);
    match config {
        ChartConfig::Bar(bar) => draw_bar(&mut out, bar),
        ChartConfig::Line(line) => draw_line(&mut out, line),
        ChartConfig::Donut(donut) => draw_donut(&mut out, donut),
        ChartConfig::Bubble(bubble) => draw_bubble(&mut out, bubble),
        ChartConfig::Scatter(scatter) => draw_scatter(&mut out, scatter),
        ChartConfig::Notice(notice) => draw_notice(&mut out, notice),
    }
    out
}

fn draw_bar(out: &mut String, bar: &BarConfig) {
    let max = bar.values.iter().copied().max().unwrap_or(0).max(1);
    let width = bar.labels.iter().map(|l| l.chars().count()).max().unwrap_or(0);
    for (i, (label, value)) in bar.labels.iter().zip(&bar.values).enumerate() {
        let scaled = u128::from(*value) * u128::from(BAR_WIDTH);
        let filled = scaled.div_ceil(u128::from(max)) as usize;
        let _ = writeln!(
            out,
            "{i:>2} {label:<width$} {} {}",
            "#".repeat(filled),
            format_count(*value)
        );
    }
}

fn draw_line(out: &mut String, line: &LineConfig) {
    if line.compact {
        for series in &line.series {
            let _ = writeln!(
                out,
                "{} (total {})",
                spark(&series.values),
                format_thousands(total(&series.values))
            );
        }
        return;
    }
    let (Some(first), Some(last)) = (line.labels.first(), line.labels.last()) else {
        let _ = writeln!(out, "(no buckets)");
        return;
    };
    let _ = writeln!(out, "{} buckets, {first} .. {last}", line.labels.len());
    for (i, series) in line.series.iter().enumerate() {
        let _ = writeln!(
            out,
            "legend:{i} {:<8} {} {}",
            series.name,
            spark(&series.values),
            format_count(total(&series.values))
        );
    }
}

fn draw_donut(out: &mut String, donut: &DonutConfig) {
    for (i, slice) in donut.slices.iter().enumerate() {
        let _ = writeln!(
            out,
            "slice:{i} {} {} ({})",
            slice.label,
            format_count(slice.value),
            slice.share
        );
    }
    let _ = writeln!(out, "total {}", format_thousands(donut.total));
}

fn draw_bubble(out: &mut String, bubble: &BubbleConfig) {
    const DAYS: [&str; 7] = ["Mon", "Tue", "Wed", "Thu", "Fri", "Sat", "Sun"];
    let mut points: Vec<_> = bubble.points.iter().collect();
    points.sort_by_key(|p| (p.day, p.hour));
    for point in points {
        let day = DAYS.get(point.day as usize).copied().unwrap_or("?");
        let _ = writeln!(out, "{day} {:02}:00 {}", point.hour, format_count(point.count));
    }
    let _ = writeln!(out, "peak {}", format_count(bubble.max_count));
}

fn draw_scatter(out: &mut String, scatter: &ScatterConfig) {
    let _ = writeln!(out, "x: {}, y: {}", scatter.x_label, scatter.y_label);
    for (i, point) in scatter.points.iter().enumerate() {
        let _ = writeln!(
            out,
            "point:{i} {} {} / {}",
            point.label,
            format_bytes(point.x),
            format_bytes(point.y)
        );
    }
}

fn draw_notice(out: &mut String, notice: &NoticeConfig) {
    match &notice.notice {
        Notice::Empty => out.push_str("(no data)\n"),
        Notice::Failed(message) => {
            let _ = writeln!(out, "(failed: {message})");
        }
    }
}

fn total(values: &[u64]) -> u64 {
    values.iter().fold(0, |total, v| total.saturating_add(*v))
}

/// Eight-level block sparkline.
fn spark(values: &[u64]) -> String {
    const BLOCKS: [char; 8] = ['▁', '▂', '▃', '▄', '▅', '▆', '▇', '█'];
    let max = values.iter().copied().max().unwrap_or(0);
    values
        .iter()
        .map(|v| {
            if max == 0 {
                BLOCKS[0]
            } else {
                BLOCKS[(u128::from(*v) * 7 / u128::from(max)) as usize]
            }
        })
        .collect()
}

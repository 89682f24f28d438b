//! In-process backend over a set of EVE JSON events.
//!
//! Used by the replay tool and by tests that want real aggregation
//! semantics without a search cluster. "Now" is pinned to the newest event
//! unless set explicitly, so relative ranges stay meaningful on old captures.

use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Datelike, Duration, TimeZone, Timelike, Utc};
use serde_json::{Value, json};

use sensordash_types::{
    AggregationResult, AggregationRow, QueryDescriptor, Severity, SeverityBucket,
    SeverityHistogram, SortOrder, TimeBucket, TimeHistogram, TimeRange,
};

use super::{AggregateStream, Backend, HistogramRequest, QueryParams};
use crate::coordinator::Generation;
use crate::error::QueryError;
use crate::query::expr::{QueryExpr, leaf_string, lookup};

const DEFAULT_STREAM_BATCH: usize = 500;
const STREAM_BUFFER: usize = 8;

#[derive(Debug, Clone)]
struct StoredEvent {
    time: DateTime<Utc>,
    event: Value,
}

#[derive(Debug, Clone)]
pub struct MemoryBackend {
    events: Arc<Vec<StoredEvent>>,
    now: DateTime<Utc>,
    latency: Option<std::time::Duration>,
    stream_batch: usize,
}

impl MemoryBackend {
    /// Build from parsed events. Events without a readable `timestamp` are skipped.
    pub fn from_events(events: Vec<Value>) -> Self {
        let mut stored = Vec::with_capacity(events.len());
        let mut skipped = 0usize;
        for event in events {
            match event.get("timestamp").and_then(Value::as_str).and_then(parse_timestamp) {
                Some(time) => stored.push(StoredEvent { time, event }),
                None => skipped += 1,
            }
        }
        if skipped > 0 {
            tracing::warn!(skipped, "Skipped events without a valid timestamp");
        }
        stored.sort_by_key(|e| e.time);
        let now = stored.last().map(|e| e.time).unwrap_or_else(Utc::now);
        tracing::debug!(events = stored.len(), %now, "Memory backend loaded");
        Self {
            events: Arc::new(stored),
            now,
            latency: None,
            stream_batch: DEFAULT_STREAM_BATCH,
        }
    }

    /// Build from newline-delimited JSON (one EVE record per line).
    pub fn from_ndjson(text: &str) -> Result<Self, serde_json::Error> {
        let events = text
            .lines()
            .filter(|line| !line.trim().is_empty())
            .map(serde_json::from_str)
            .collect::<Result<Vec<Value>, _>>()?;
        Ok(Self::from_events(events))
    }

    pub fn with_now(mut self, now: DateTime<Utc>) -> Self {
        self.now = now;
        self
    }

    /// Delay every answer (and every streamed batch) by `latency`.
    pub fn with_latency(mut self, latency: std::time::Duration) -> Self {
        self.latency = Some(latency);
        self
    }

    /// Events folded into each streamed snapshot.
    pub fn with_stream_batch(mut self, events: usize) -> Self {
        self.stream_batch = events.max(1);
        self
    }

    pub fn now(&self) -> DateTime<Utc> {
        self.now
    }

    pub fn len(&self) -> usize {
        self.events.len()
    }

    pub fn is_empty(&self) -> bool {
        self.events.is_empty()
    }

    fn matching<'a>(
        &'a self,
        time_range: &TimeRange,
        query: &str,
    ) -> impl Iterator<Item = &'a StoredEvent> + 'a {
        select(&self.events, self.now, time_range, query)
    }

    async fn simulate_latency(&self) {
        if let Some(latency) = self.latency {
            tokio::time::sleep(latency).await;
        }
    }
}

fn select<'a>(
    events: &'a [StoredEvent],
    now: DateTime<Utc>,
    time_range: &TimeRange,
    query: &str,
) -> impl Iterator<Item = &'a StoredEvent> + 'a {
    let (start, end) = time_range.bounds(now);
    let expr = QueryExpr::parse(query);
    events
        .iter()
        .filter(move |e| e.time >= start && e.time <= end && expr.matches(&e.event))
}

#[async_trait]
impl Backend for MemoryBackend {
    async fn aggregate(&self, desc: &QueryDescriptor) -> Result<AggregationResult, QueryError> {
        self.simulate_latency().await;
        let field = aggregation_field(desc)?;
        let mut counts = Counts::default();
        for event in self.matching(&desc.time_range, &desc.query_string) {
            counts.add(event, field);
        }
        Ok(counts.finish(desc.size, desc.order))
    }

    async fn stream_aggregate(
        &self,
        desc: &QueryDescriptor,
        generation: Generation,
    ) -> Result<AggregateStream, QueryError> {
        let field = aggregation_field(desc)?.to_string();
        let (tx, stream) = AggregateStream::channel(generation, STREAM_BUFFER);
        let events = Arc::clone(&self.events);
        let now = self.now;
        let latency = self.latency;
        let batch = self.stream_batch;
        let desc = desc.clone();

        tokio::spawn(async move {
            let matched: Vec<&StoredEvent> =
                select(&events, now, &desc.time_range, &desc.query_string).collect();
            let mut counts = Counts::default();
            if matched.is_empty() {
                let _ = tx.send(counts.finish(desc.size, desc.order)).await;
                return;
            }
            for chunk in matched.chunks(batch) {
                if let Some(latency) = latency {
                    tokio::select! {
                        _ = tokio::time::sleep(latency) => {}
                        _ = tx.cancelled() => break,
                    }
                }
                for event in chunk {
                    counts.add(event, &field);
                }
                if !tx.send(counts.finish(desc.size, desc.order)).await {
                    tracing::trace!(%generation, field = %field, "Stream consumer gone");
                    break;
                }
            }
        });

        Ok(stream)
    }

    async fn histogram_time(&self, req: &HistogramRequest) -> Result<TimeHistogram, QueryError> {
        self.simulate_latency().await;
        let width = interval_secs(req.interval)?;
        let mut buckets: BTreeMap<i64, u64> = BTreeMap::new();
        for event in self.matching(&req.time_range, &req.query_string) {
            let event_type = event.event.get("event_type").and_then(Value::as_str);
            if req.event_type.as_deref().is_some_and(|wanted| event_type != Some(wanted)) {
                continue;
            }
            *buckets.entry(bucket_start(event.time, width)).or_default() += 1;
        }
        let data = zero_filled(&buckets, width)
            .map(|(secs, count)| TimeBucket {
                time: from_secs(secs),
                count,
            })
            .collect();
        Ok(TimeHistogram { data })
    }

    async fn histogram_severity(
        &self,
        req: &HistogramRequest,
    ) -> Result<SeverityHistogram, QueryError> {
        self.simulate_latency().await;
        let width = interval_secs(req.interval)?;
        let mut buckets: BTreeMap<i64, BTreeMap<Severity, u64>> = BTreeMap::new();
        for event in self.matching(&req.time_range, &req.query_string) {
            if event.event.get("event_type").and_then(Value::as_str) != Some("alert") {
                continue;
            }
            let Some(severity) = lookup(&event.event, "alert.severity")
                .and_then(Value::as_u64)
                .and_then(Severity::from_level)
            else {
                continue;
            };
            *buckets
                .entry(bucket_start(event.time, width))
                .or_default()
                .entry(severity)
                .or_default() += 1;
        }

        let (Some(&first), Some(&last)) = (buckets.keys().next(), buckets.keys().next_back())
        else {
            return Ok(SeverityHistogram::default());
        };
        let mut out = Vec::new();
        let mut secs = first;
        while secs <= last {
            let mut counts: BTreeMap<Severity, u64> =
                Severity::ALL.iter().map(|s| (*s, 0)).collect();
            if let Some(found) = buckets.get(&secs) {
                for (severity, count) in found {
                    counts.insert(*severity, *count);
                }
            }
            out.push(SeverityBucket {
                time: from_secs(secs),
                counts,
            });
            secs += width;
        }
        Ok(SeverityHistogram { buckets: out })
    }

    async fn query(&self, agg: &str, params: &QueryParams) -> Result<Value, QueryError> {
        self.simulate_latency().await;
        match agg {
            "heatmap" => Ok(self.heatmap(params)),
            "bytes_scatter" => Ok(self.bytes_scatter(params)),
            other => Err(QueryError::Unsupported(other.to_string())),
        }
    }
}

impl MemoryBackend {
    /// Event counts by weekday (0 = Monday) and hour of day.
    fn heatmap(&self, params: &QueryParams) -> Value {
        let mut cells: BTreeMap<(u32, u32), u64> = BTreeMap::new();
        for event in self.matching(&params.time_range, &params.query_string) {
            let key = (event.time.weekday().num_days_from_monday(), event.time.hour());
            *cells.entry(key).or_default() += 1;
        }
        let data: Vec<Value> = cells
            .into_iter()
            .map(|((day, hour), count)| json!({ "day": day, "hour": hour, "count": count }))
            .collect();
        json!({ "data": data })
    }

    /// Largest flows by total bytes, split into each direction.
    fn bytes_scatter(&self, params: &QueryParams) -> Value {
        let mut flows: Vec<(String, String, String, u64, u64)> = self
            .matching(&params.time_range, &params.query_string)
            .filter(|e| e.event.get("event_type").and_then(Value::as_str) == Some("flow"))
            .map(|e| {
                let text = |path: &str| {
                    lookup(&e.event, path)
                        .and_then(leaf_string)
                        .unwrap_or_default()
                };
                let bytes = |path: &str| lookup(&e.event, path).and_then(Value::as_u64).unwrap_or(0);
                let key = match lookup(&e.event, "flow_id").and_then(leaf_string) {
                    Some(id) => id,
                    None => format!("{}-{}", text("src_ip"), text("dest_ip")),
                };
                (
                    key,
                    text("src_ip"),
                    text("dest_ip"),
                    bytes("flow.bytes_toserver"),
                    bytes("flow.bytes_toclient"),
                )
            })
            .collect();
        flows.sort_by(|a, b| {
            b.3.saturating_add(b.4)
                .cmp(&a.3.saturating_add(a.4))
                .then_with(|| a.0.cmp(&b.0))
        });
        flows.truncate(params.size);
        let data: Vec<Value> = flows
            .into_iter()
            .map(|(key, src_ip, dest_ip, to_server, to_client)| {
                json!({
                    "key": key,
                    "src_ip": src_ip,
                    "dest_ip": dest_ip,
                    "to_server": to_server,
                    "to_client": to_client,
                })
            })
            .collect();
        json!({ "data": data })
    }
}

/// Running per-key counts for one aggregation.
#[derive(Debug, Default)]
struct Counts {
    by_key: HashMap<String, u64>,
    earliest: Option<DateTime<Utc>>,
}

impl Counts {
    fn add(&mut self, event: &StoredEvent, field: &str) {
        let Some(key) = lookup(&event.event, field).and_then(leaf_string) else {
            return;
        };
        *self.by_key.entry(key).or_default() += 1;
        self.earliest = Some(match self.earliest {
            Some(t) if t <= event.time => t,
            _ => event.time,
        });
    }

    fn finish(&self, size: usize, order: SortOrder) -> AggregationResult {
        let mut rows: Vec<AggregationRow> = self
            .by_key
            .iter()
            .map(|(k, c)| AggregationRow::new(k.clone(), *c))
            .collect();
        rows.sort_by(|a, b| {
            let by_count = match order {
                SortOrder::Desc => b.count.cmp(&a.count),
                SortOrder::Asc => a.count.cmp(&b.count),
            };
            by_count.then_with(|| a.key.cmp(&b.key))
        });
        rows.truncate(size);
        AggregationResult {
            rows,
            earliest_timestamp: self.earliest,
        }
    }
}

fn aggregation_field(desc: &QueryDescriptor) -> Result<&str, QueryError> {
    desc.field
        .as_deref()
        .ok_or_else(|| QueryError::Shape("aggregation requires a field".to_string()))
}

fn interval_secs(interval: Duration) -> Result<i64, QueryError> {
    match interval.num_seconds() {
        secs if secs > 0 => Ok(secs),
        _ => Err(QueryError::Shape(format!(
            "histogram interval must be positive, got {interval}"
        ))),
    }
}

fn bucket_start(time: DateTime<Utc>, width: i64) -> i64 {
    time.timestamp().div_euclid(width) * width
}

fn from_secs(secs: i64) -> DateTime<Utc> {
    Utc.timestamp_opt(secs, 0).single().unwrap_or_default()
}

/// Every bucket between the first and last populated one, missing ones as zero.
fn zero_filled(buckets: &BTreeMap<i64, u64>, width: i64) -> impl Iterator<Item = (i64, u64)> + '_ {
    let range = buckets
        .keys()
        .next()
        .zip(buckets.keys().next_back())
        .map(|(first, last)| (*first, *last));
    let mut next = range.map(|(first, _)| first);
    std::iter::from_fn(move || {
        let (_, last) = range?;
        let secs = next?;
        if secs > last {
            return None;
        }
        next = Some(secs + width);
        Some((secs, buckets.get(&secs).copied().unwrap_or(0)))
    })
}

/// EVE timestamps look like `2024-03-01T12:00:00.123456+0000`.
fn parse_timestamp(raw: &str) -> Option<DateTime<Utc>> {
    DateTime::parse_from_str(raw, "%Y-%m-%dT%H:%M:%S%.f%z")
        .or_else(|_| DateTime::parse_from_rfc3339(raw))
        .map(|t| t.with_timezone(&Utc))
        .ok()
}

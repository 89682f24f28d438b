//! Concurrent, generation-tagged chart requests.
//!
//! The coordinator issues every chart's request on its own task and funnels
//! the results back through one channel. Only the owner applies results:
//! `accept` drops anything whose generation is no longer current, so a slow
//! response from an old cycle can never overwrite a newer one.

mod generation;
mod lifecycle;

use std::any::Any;
use std::collections::HashMap;
use std::fmt;
use std::hash::Hash;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::time::Duration;

use futures::{FutureExt, StreamExt};
use serde_json::Value;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

use sensordash_types::{AggregationResult, QueryDescriptor, SeverityHistogram, TimeHistogram};

use crate::backend::{Backend, HistogramRequest, QueryParams};
use crate::error::QueryError;

pub use generation::{Generation, GenerationCounter};
pub use lifecycle::ChartPhase;
use lifecycle::ChartSlot;

// ─────────────────────────────────────────────────────────────────────────────
// Requests and results
// ─────────────────────────────────────────────────────────────────────────────

/// One backend call on behalf of one chart.
#[derive(Debug, Clone, PartialEq)]
pub enum ChartRequest {
    /// Top-N aggregation; streamed when `desc.streaming` is set.
    Aggregate(QueryDescriptor),
    TimeHistogram(HistogramRequest),
    SeverityHistogram(HistogramRequest),
    /// Named aggregation answered as raw JSON.
    Custom { agg: String, params: QueryParams },
}

impl ChartRequest {
    fn is_streaming(&self) -> bool {
        matches!(self, Self::Aggregate(desc) if desc.streaming)
    }
}

/// Data for one chart, as the backend answered it.
#[derive(Debug, Clone, PartialEq)]
pub enum ChartPayload {
    Rows(AggregationResult),
    Time(TimeHistogram),
    Severity(SeverityHistogram),
    Custom(Value),
}

impl ChartPayload {
    /// No rows, no buckets, or an empty `data` array.
    pub fn is_empty(&self) -> bool {
        match self {
            Self::Rows(r) => r.is_empty(),
            Self::Time(h) => h.is_empty(),
            Self::Severity(h) => h.is_empty(),
            Self::Custom(v) => match v.get("data") {
                Some(Value::Array(items)) => items.is_empty(),
                Some(Value::Null) | None => true,
                Some(_) => false,
            },
        }
    }
}

/// What a request task reports.
#[derive(Debug, Clone, PartialEq)]
pub enum CompletionEvent {
    /// A streamed snapshot. Streams may emit any number of these.
    Batch(ChartPayload),
    /// The request is over. Streams finish with `Ok(None)`.
    Finished(Result<Option<ChartPayload>, QueryError>),
}

/// A tagged message from a request task.
#[derive(Debug, Clone, PartialEq)]
pub struct Completion<K> {
    pub generation: Generation,
    pub key: K,
    pub event: CompletionEvent,
}

/// A completion that survived the staleness check.
#[derive(Debug, Clone, PartialEq)]
pub enum Delivery<K> {
    /// Streamed snapshot for a chart that is still loading.
    Partial { key: K, payload: ChartPayload },
    /// Final state for a chart in the current cycle.
    Resolved {
        key: K,
        phase: ChartPhase,
        outcome: Result<Option<ChartPayload>, QueryError>,
    },
}

/// Counters for logging and tests.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CoordinatorStats {
    pub issued: u64,
    pub refused: u64,
    pub accepted: u64,
    pub stale: u64,
}

// ─────────────────────────────────────────────────────────────────────────────
// Coordinator
// ─────────────────────────────────────────────────────────────────────────────

pub struct RequestCoordinator<K> {
    backend: Arc<dyn Backend>,
    generations: GenerationCounter,
    timeout: Option<Duration>,
    slots: HashMap<K, ChartSlot>,
    streams: HashMap<K, CancellationToken>,
    tx: mpsc::UnboundedSender<Completion<K>>,
    rx: mpsc::UnboundedReceiver<Completion<K>>,
    stats: CoordinatorStats,
}

impl<K> fmt::Debug for RequestCoordinator<K>
where
    K: fmt::Debug,
{
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RequestCoordinator")
            .field("generation", &self.generations.current())
            .field("timeout", &self.timeout)
            .field("slots", &self.slots.len())
            .field("streams", &self.streams.len())
            .field("stats", &self.stats)
            .finish()
    }
}

impl<K> RequestCoordinator<K>
where
    K: Clone + Eq + Hash + fmt::Debug + Send + Sync + 'static,
{
    pub fn new(backend: Arc<dyn Backend>) -> Self {
        let (tx, rx) = mpsc::unbounded_channel();
        Self {
            backend,
            generations: GenerationCounter::new(),
            timeout: None,
            slots: HashMap::new(),
            streams: HashMap::new(),
            tx,
            rx,
            stats: CoordinatorStats::default(),
        }
    }

    /// Per-request budget; `None` waits forever.
    pub fn with_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn generation(&self) -> Generation {
        self.generations.current()
    }

    pub fn stats(&self) -> CoordinatorStats {
        self.stats
    }

    pub fn phase(&self, key: &K) -> ChartPhase {
        self.slots.get(key).map(|s| s.phase).unwrap_or_default()
    }

    pub fn is_loading(&self, key: &K) -> bool {
        self.phase(key).is_loading()
    }

    pub fn any_loading(&self) -> bool {
        self.slots.values().any(|s| s.phase.is_loading())
    }

    /// Number of charts with lifecycle state.
    pub fn tracked(&self) -> usize {
        self.slots.len()
    }

    /// Keys still waiting for a result in the current cycle.
    pub fn loading_keys(&self) -> Vec<K> {
        self.slots
            .iter()
            .filter(|(_, s)| s.phase.is_loading())
            .map(|(k, _)| k.clone())
            .collect()
    }

    /// Start a new refresh cycle. Every request still in flight is superseded.
    pub fn begin_cycle(&mut self) -> Generation {
        let mut superseded = 0usize;
        for slot in self.slots.values_mut() {
            if slot.phase.is_loading() {
                slot.phase = ChartPhase::Superseded;
                superseded += 1;
            }
        }
        let generation = self.generations.advance();
        tracing::debug!(%generation, superseded, "Refresh cycle started");
        generation
    }

    /// Issue `request` for `key` in the current generation.
    ///
    /// Returns `false` when `key` already has a request in flight for this
    /// generation; the duplicate is not sent.
    pub fn issue(&mut self, key: K, request: ChartRequest) -> bool {
        let generation = self.generations.current();
        if self.is_loading(&key) {
            self.stats.refused += 1;
            tracing::debug!(%generation, key = ?key, "Request already in flight");
            return false;
        }

        let cancel = CancellationToken::new();
        if request.is_streaming() {
            if let Some(previous) = self.streams.insert(key.clone(), cancel.clone()) {
                previous.cancel();
            }
        }
        self.slots.insert(key.clone(), ChartSlot::requesting());
        self.stats.issued += 1;
        tracing::debug!(%generation, key = ?key, streaming = request.is_streaming(), "Request issued");

        let reporter = Reporter {
            generation,
            key,
            tx: self.tx.clone(),
        };
        let backend = Arc::clone(&self.backend);
        let timeout = self.timeout;
        tokio::spawn(async move {
            let work = AssertUnwindSafe(execute(backend.as_ref(), request, &reporter, &cancel))
                .catch_unwind()
                .map(|result| result.unwrap_or_else(|panic| Err(aborted(panic))));
            let outcome = match timeout {
                Some(limit) => match tokio::time::timeout(limit, work).await {
                    Ok(outcome) => outcome,
                    Err(_) => {
                        cancel.cancel();
                        Err(QueryError::Timeout {
                            secs: limit.as_secs(),
                        })
                    }
                },
                None => work.await,
            };
            reporter.send(CompletionEvent::Finished(outcome));
        });
        true
    }

    /// Cancel every open stream. Their tasks finish with `Cancelled`.
    pub fn cancel_all_streams(&mut self) {
        if self.streams.is_empty() {
            return;
        }
        tracing::debug!(count = self.streams.len(), "Cancelling streams");
        for (_, token) in self.streams.drain() {
            token.cancel();
        }
    }

    /// Wait for the next message from any request task.
    pub async fn next_completion(&mut self) -> Option<Completion<K>> {
        self.rx.recv().await
    }

    /// Apply the staleness check and lifecycle transition for one message.
    ///
    /// Returns `None` when the message must not touch the chart.
    pub fn accept(&mut self, completion: Completion<K>) -> Option<Delivery<K>> {
        let Completion {
            generation,
            key,
            event,
        } = completion;
        if !self.generations.is_current(generation) {
            self.stats.stale += 1;
            tracing::debug!(
                %generation,
                current = %self.generations.current(),
                key = ?key,
                "Discarding stale result"
            );
            return None;
        }
        let slot = self.slots.get_mut(&key)?;
        if !slot.phase.is_loading() {
            tracing::debug!(%generation, key = ?key, phase = ?slot.phase, "Result for settled chart");
            return None;
        }

        let delivery = match event {
            CompletionEvent::Batch(payload) => {
                slot.batches += 1;
                slot.last_batch_empty = payload.is_empty();
                Delivery::Partial { key, payload }
            }
            CompletionEvent::Finished(outcome) => {
                self.streams.remove(&key);
                let phase = match &outcome {
                    Ok(Some(payload)) if payload.is_empty() => ChartPhase::Empty,
                    Ok(Some(_)) => ChartPhase::Complete,
                    Ok(None) if slot.batches == 0 || slot.last_batch_empty => ChartPhase::Empty,
                    Ok(None) => ChartPhase::Complete,
                    Err(QueryError::Cancelled) => ChartPhase::Superseded,
                    Err(_) => ChartPhase::Error,
                };
                slot.phase = phase;
                tracing::debug!(%generation, key = ?key, ?phase, "Request resolved");
                if phase == ChartPhase::Superseded {
                    return None;
                }
                Delivery::Resolved {
                    key,
                    phase,
                    outcome,
                }
            }
        };
        self.stats.accepted += 1;
        Some(delivery)
    }

    /// Drop the state of every chart not matching `keep`, cancelling its
    /// stream. Late results for a dropped chart are ignored. Returns how many
    /// charts were dropped.
    pub fn retain(&mut self, mut keep: impl FnMut(&K) -> bool) -> usize {
        let before = self.slots.len();
        self.slots.retain(|key, _| keep(key));
        self.streams.retain(|key, token| {
            let kept = keep(key);
            if !kept {
                token.cancel();
            }
            kept
        });
        before - self.slots.len()
    }

    /// Forget every chart's state (teardown).
    pub fn clear(&mut self) {
        self.cancel_all_streams();
        self.slots.clear();
        self.generations.advance();
    }
}

/// Sends tagged completions back to the coordinator.
struct Reporter<K> {
    generation: Generation,
    key: K,
    tx: mpsc::UnboundedSender<Completion<K>>,
}

impl<K: Clone> Reporter<K> {
    fn send(&self, event: CompletionEvent) {
        let completion = Completion {
            generation: self.generation,
            key: self.key.clone(),
            event,
        };
        if self.tx.send(completion).is_err() {
            tracing::trace!(generation = %self.generation, "Coordinator gone; dropping completion");
        }
    }
}

fn aborted(panic: Box<dyn Any + Send>) -> QueryError {
    let message = panic
        .downcast_ref::<&str>()
        .map(|s| (*s).to_string())
        .or_else(|| panic.downcast_ref::<String>().cloned())
        .unwrap_or_else(|| "request task panicked".to_string());
    tracing::error!(panic = %message, "Request task panicked");
    QueryError::Aborted(message)
}

async fn execute<K: Clone>(
    backend: &dyn Backend,
    request: ChartRequest,
    reporter: &Reporter<K>,
    cancel: &CancellationToken,
) -> Result<Option<ChartPayload>, QueryError> {
    match request {
        ChartRequest::Aggregate(desc) if desc.streaming => {
            let mut stream = backend.stream_aggregate(&desc, reporter.generation).await?;
            loop {
                tokio::select! {
                    _ = cancel.cancelled() => {
                        stream.cancel();
                        return Err(QueryError::Cancelled);
                    }
                    item = stream.next() => match item {
                        Some(Ok(batch)) => reporter.send(CompletionEvent::Batch(ChartPayload::Rows(batch))),
                        Some(Err(e)) => return Err(e),
                        None => return Ok(None),
                    },
                }
            }
        }
        ChartRequest::Aggregate(desc) => backend
            .aggregate(&desc)
            .await
            .map(|r| Some(ChartPayload::Rows(r))),
        ChartRequest::TimeHistogram(req) => backend
            .histogram_time(&req)
            .await
            .map(|h| Some(ChartPayload::Time(h))),
        ChartRequest::SeverityHistogram(req) => backend
            .histogram_severity(&req)
            .await
            .map(|h| Some(ChartPayload::Severity(h))),
        ChartRequest::Custom { agg, params } => backend
            .query(&agg, &params)
            .await
            .map(|v| Some(ChartPayload::Custom(v))),
    }
}

//! Shared fixtures for the dashboard integration tests.
//!
//! `ScriptedBackend` parks every call behind a gate the test releases by
//! hand, so completions can be forced into any order. `RecordingFactory`
//! records every visual created, patched and destroyed.

#![allow(dead_code)]

use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use serde_json::Value;
use tokio::sync::{mpsc, oneshot};

use sensordash_core::backend::{AggregateStream, Backend, HistogramRequest, QueryParams, StreamSender};
use sensordash_core::charts::{ChartConfig, ChartKey, ChartSink, ChartSinkFactory, SeriesPatch};
use sensordash_core::coordinator::Generation;
use sensordash_core::dashboard::{ChartQuery, ChartSpec, Presentation};
use sensordash_core::error::{QueryError, SinkError};
use sensordash_core::query::EventRestriction;
use sensordash_core::types::{
    AggregationResult, AggregationRow, QueryDescriptor, SeverityHistogram, TimeHistogram,
};

// ─────────────────────────────────────────────────────────────────────────────
// Scripted backend
// ─────────────────────────────────────────────────────────────────────────────

/// A backend call as the test sees it.
#[derive(Debug, Clone, PartialEq)]
pub enum Call {
    Aggregate(QueryDescriptor),
    Stream(QueryDescriptor, Generation),
    Time(HistogramRequest),
    Severity(HistogramRequest),
    Query(String, QueryParams),
}

impl Call {
    pub fn field(&self) -> Option<&str> {
        match self {
            Self::Aggregate(desc) | Self::Stream(desc, _) => desc.field.as_deref(),
            _ => None,
        }
    }

    pub fn query_string(&self) -> &str {
        match self {
            Self::Aggregate(desc) | Self::Stream(desc, _) => &desc.query_string,
            Self::Time(req) | Self::Severity(req) => &req.query_string,
            Self::Query(_, params) => &params.query_string,
        }
    }
}

/// The test's answer to a parked one-shot call.
#[derive(Debug)]
pub enum Answer {
    Rows(Result<AggregationResult, QueryError>),
    Time(Result<TimeHistogram, QueryError>),
    Severity(Result<SeverityHistogram, QueryError>),
    Custom(Result<Value, QueryError>),
}

enum Responder {
    Once(oneshot::Sender<Answer>),
    Stream(StreamSender),
}

/// One parked call.
pub struct Gate {
    pub call: Call,
    responder: Responder,
}

impl Gate {
    /// Release a one-shot call.
    pub fn reply(self, answer: Answer) {
        match self.responder {
            Responder::Once(tx) => {
                let _ = tx.send(answer);
            }
            Responder::Stream(_) => panic!("reply() on a streaming call: {:?}", self.call),
        }
    }

    /// Producer side of a streaming call.
    pub fn stream(&self) -> &StreamSender {
        match &self.responder {
            Responder::Stream(tx) => tx,
            Responder::Once(_) => panic!("stream() on a one-shot call: {:?}", self.call),
        }
    }

    /// End a streaming call after its batches.
    pub fn finish(self) {
        drop(self);
    }
}

pub struct ScriptedBackend {
    gates: mpsc::UnboundedSender<Gate>,
}

/// Test side of a `ScriptedBackend`: every call arrives here.
pub struct Gates {
    rx: mpsc::UnboundedReceiver<Gate>,
    held: Vec<Gate>,
}

impl ScriptedBackend {
    pub fn new() -> (Arc<dyn Backend>, Gates) {
        let (tx, rx) = mpsc::unbounded_channel();
        (
            Arc::new(Self { gates: tx }),
            Gates {
                rx,
                held: Vec::new(),
            },
        )
    }

    async fn park(&self, call: Call) -> Result<Answer, QueryError> {
        let (tx, rx) = oneshot::channel();
        self.gates
            .send(Gate {
                call,
                responder: Responder::Once(tx),
            })
            .map_err(|_| QueryError::Transport("test finished".into()))?;
        rx.await
            .map_err(|_| QueryError::Transport("gate dropped".into()))
    }
}

fn wrong(answer: Answer) -> QueryError {
    QueryError::Shape(format!("scripted answer of the wrong kind: {answer:?}"))
}

#[async_trait]
impl Backend for ScriptedBackend {
    async fn aggregate(&self, desc: &QueryDescriptor) -> Result<AggregationResult, QueryError> {
        match self.park(Call::Aggregate(desc.clone())).await? {
            Answer::Rows(result) => result,
            other => Err(wrong(other)),
        }
    }

    async fn stream_aggregate(
        &self,
        desc: &QueryDescriptor,
        generation: Generation,
    ) -> Result<AggregateStream, QueryError> {
        let (tx, stream) = AggregateStream::channel(generation, 16);
        self.gates
            .send(Gate {
                call: Call::Stream(desc.clone(), generation),
                responder: Responder::Stream(tx),
            })
            .map_err(|_| QueryError::Transport("test finished".into()))?;
        Ok(stream)
    }

    async fn histogram_time(&self, req: &HistogramRequest) -> Result<TimeHistogram, QueryError> {
        match self.park(Call::Time(req.clone())).await? {
            Answer::Time(result) => result,
            other => Err(wrong(other)),
        }
    }

    async fn histogram_severity(
        &self,
        req: &HistogramRequest,
    ) -> Result<SeverityHistogram, QueryError> {
        match self.park(Call::Severity(req.clone())).await? {
            Answer::Severity(result) => result,
            other => Err(wrong(other)),
        }
    }

    async fn query(&self, agg: &str, params: &QueryParams) -> Result<Value, QueryError> {
        match self.park(Call::Query(agg.to_string(), params.clone())).await? {
            Answer::Custom(result) => result,
            other => Err(wrong(other)),
        }
    }
}

impl Gates {
    /// Wait for the first call matching `pred`. Panics after five seconds.
    pub async fn take(&mut self, pred: impl Fn(&Call) -> bool) -> Gate {
        if let Some(i) = self.held.iter().position(|g| pred(&g.call)) {
            return self.held.remove(i);
        }
        let wait = async {
            loop {
                let gate = self.rx.recv().await.expect("backend dropped");
                if pred(&gate.call) {
                    return gate;
                }
                self.held.push(gate);
            }
        };
        tokio::time::timeout(Duration::from_secs(5), wait)
            .await
            .expect("no matching backend call")
    }

    /// The next aggregation (one-shot or streamed) on `field`.
    pub async fn take_field(&mut self, field: &str) -> Gate {
        self.take(|c| c.field() == Some(field)).await
    }

    /// Collect every call that has already arrived.
    pub fn drain_ready(&mut self) -> usize {
        while let Ok(gate) = self.rx.try_recv() {
            self.held.push(gate);
        }
        self.held.len()
    }

    /// Wait until `n` calls are held, then answer them all with empty results.
    pub async fn answer_empty(&mut self, n: usize) {
        let wait = async {
            while self.drain_ready() < n {
                let gate = self.rx.recv().await.expect("backend dropped");
                self.held.push(gate);
            }
        };
        tokio::time::timeout(Duration::from_secs(5), wait)
            .await
            .expect("too few backend calls");
        self.answer_all_empty();
    }

    /// Answer every held call with an empty result.
    pub fn answer_all_empty(&mut self) {
        self.drain_ready();
        for gate in self.held.drain(..) {
            let answer = match &gate.call {
                Call::Aggregate(_) => Answer::Rows(Ok(AggregationResult::default())),
                Call::Time(_) => Answer::Time(Ok(TimeHistogram::default())),
                Call::Severity(_) => Answer::Severity(Ok(SeverityHistogram::default())),
                Call::Query(..) => Answer::Custom(Ok(serde_json::json!({ "data": [] }))),
                Call::Stream(..) => {
                    gate.finish();
                    continue;
                }
            };
            gate.reply(answer);
        }
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Recording sinks
// ─────────────────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq)]
pub enum SinkEvent {
    Created { id: u64, key: ChartKey },
    Patched { id: u64, key: ChartKey },
    Destroyed { id: u64, key: ChartKey },
}

#[derive(Debug, Default)]
pub struct SinkLog {
    next_id: u64,
    pub events: Vec<SinkEvent>,
    live: HashMap<ChartKey, Vec<u64>>,
}

impl SinkLog {
    /// Live instance count for `key`. Must never exceed one.
    pub fn live_count(&self, key: &ChartKey) -> usize {
        self.live.get(key).map_or(0, Vec::len)
    }

    pub fn live_keys(&self) -> Vec<ChartKey> {
        let mut keys: Vec<ChartKey> = self
            .live
            .iter()
            .filter(|(_, ids)| !ids.is_empty())
            .map(|(k, _)| k.clone())
            .collect();
        keys.sort();
        keys
    }

    pub fn created_for(&self, key: &ChartKey) -> usize {
        self.events
            .iter()
            .filter(|e| matches!(e, SinkEvent::Created { key: k, .. } if k == key))
            .count()
    }

    pub fn patched_for(&self, key: &ChartKey) -> usize {
        self.events
            .iter()
            .filter(|e| matches!(e, SinkEvent::Patched { key: k, .. } if k == key))
            .count()
    }

    pub fn total_live(&self) -> usize {
        self.live.values().map(Vec::len).sum()
    }
}

pub struct RecordingSink {
    id: u64,
    key: ChartKey,
    log: Arc<Mutex<SinkLog>>,
}

impl ChartSink for RecordingSink {
    fn patch(&mut self, _patch: &SeriesPatch) -> Result<(), SinkError> {
        self.log.lock().unwrap().events.push(SinkEvent::Patched {
            id: self.id,
            key: self.key.clone(),
        });
        Ok(())
    }

    fn redraw(&mut self) {}

    fn destroy(self) {
        let mut log = self.log.lock().unwrap();
        let ids = log.live.entry(self.key.clone()).or_default();
        let before = ids.len();
        ids.retain(|id| *id != self.id);
        assert_eq!(ids.len() + 1, before, "sink {} destroyed twice", self.id);
        log.events.push(SinkEvent::Destroyed {
            id: self.id,
            key: self.key,
        });
    }
}

#[derive(Clone, Default)]
pub struct RecordingFactory {
    pub log: Arc<Mutex<SinkLog>>,
}

impl ChartSinkFactory for RecordingFactory {
    type Sink = RecordingSink;

    fn create(&mut self, key: &ChartKey, _config: &ChartConfig) -> Result<RecordingSink, SinkError> {
        let mut log = self.log.lock().unwrap();
        log.next_id += 1;
        let id = log.next_id;
        let ids = log.live.entry(key.clone()).or_default();
        ids.push(id);
        assert!(ids.len() <= 1, "two live instances for {key}");
        log.events.push(SinkEvent::Created {
            id,
            key: key.clone(),
        });
        Ok(RecordingSink {
            id,
            key: key.clone(),
            log: Arc::clone(&self.log),
        })
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Helpers
// ─────────────────────────────────────────────────────────────────────────────

pub fn rows(pairs: &[(&str, u64)]) -> AggregationResult {
    AggregationResult::new(
        pairs
            .iter()
            .map(|(k, c)| AggregationRow::new(*k, *c))
            .collect(),
    )
}

pub fn bar_spec(key: ChartKey, field: &'static str, restriction: EventRestriction) -> ChartSpec {
    ChartSpec {
        key,
        query: ChartQuery::Top {
            field,
            restriction,
            streaming: false,
        },
        presentation: Presentation::Bar,
    }
}

pub fn donut_spec(key: ChartKey, field: &'static str) -> ChartSpec {
    ChartSpec {
        key,
        query: ChartQuery::Top {
            field,
            restriction: EventRestriction::Any,
            streaming: true,
        },
        presentation: Presentation::Donut,
    }
}

pub fn line_spec(key: ChartKey) -> ChartSpec {
    ChartSpec {
        key,
        query: ChartQuery::TimeHistogram {
            restriction: EventRestriction::Any,
        },
        presentation: Presentation::Line,
    }
}

/// Labels and values of a bar config.
pub fn bar_data(config: Option<&ChartConfig>) -> (Vec<String>, Vec<u64>) {
    match config {
        Some(ChartConfig::Bar(bar)) => (bar.labels.clone(), bar.values.clone()),
        other => panic!("expected a bar chart, got {other:?}"),
    }
}

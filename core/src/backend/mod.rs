//! Backend query contract.
//!
//! The refresh engine only needs five operations from whatever stores the
//! events: one-shot and streamed top-N aggregations, two histograms, and a
//! generic named aggregation. `MemoryBackend` implements them in process.

mod memory;
mod stream;

use async_trait::async_trait;
use chrono::Duration;
use serde_json::Value;

use sensordash_types::{
    AggregationResult, QueryDescriptor, SeverityHistogram, TimeHistogram, TimeRange,
};

use crate::coordinator::Generation;
use crate::error::QueryError;

pub use memory::MemoryBackend;
pub use stream::{AggregateStream, StreamSender};

/// Parameters of a fixed-interval histogram.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HistogramRequest {
    pub time_range: TimeRange,
    pub interval: Duration,
    /// Restrict to one event type (`alert`, `flow`, ...). Ignored by the
    /// severity histogram, which only counts alerts.
    pub event_type: Option<String>,
    pub query_string: String,
}

/// Parameters of a generic named aggregation.
#[derive(Debug, Clone, PartialEq)]
pub struct QueryParams {
    pub time_range: TimeRange,
    pub query_string: String,
    pub size: usize,
    /// Aggregation-specific options.
    pub options: Value,
}

/// The query surface the dashboard consumes.
#[async_trait]
pub trait Backend: Send + Sync {
    /// One-shot top-N aggregation.
    async fn aggregate(&self, desc: &QueryDescriptor) -> Result<AggregationResult, QueryError>;

    /// Open an incremental aggregation. Each item is the best snapshot so
    /// far; the stream ends when the backend is done.
    async fn stream_aggregate(
        &self,
        desc: &QueryDescriptor,
        generation: Generation,
    ) -> Result<AggregateStream, QueryError>;

    async fn histogram_time(&self, req: &HistogramRequest) -> Result<TimeHistogram, QueryError>;

    async fn histogram_severity(
        &self,
        req: &HistogramRequest,
    ) -> Result<SeverityHistogram, QueryError>;

    /// Specialised aggregation by name; returns `{"data": ...}`.
    async fn query(&self, agg: &str, params: &QueryParams) -> Result<Value, QueryError>;
}

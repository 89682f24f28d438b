//! Dashboard analytics refresh engine.
//!
//! Turns one filter state into a fan-out of concurrent, independently
//! failing, partially streaming backend queries, keeps only the newest
//! generation's results on screen, and feeds chart clicks back into the
//! filter state to start the next cycle.

pub mod backend;
pub mod charts;
pub mod context;
pub mod coordinator;
pub mod dashboard;
pub mod error;
pub mod feedback;
pub mod filter;
pub mod notify;
pub mod query;

// Re-exports for convenience
pub use backend::{Backend, MemoryBackend};
pub use charts::{ChartConfig, ChartKey, ChartSink, ChartSinkFactory, ChartSinkRegistry};
pub use coordinator::{ChartPhase, Generation, RequestCoordinator};
pub use dashboard::{Dashboard, DashboardHandle, DashboardService, DashboardSnapshot};
pub use error::{ConfigError, QueryError, ServiceError, ShapeError, SinkError};
pub use feedback::{ElementHit, Interaction};
pub use filter::{FilterState, UrlState};
pub use sensordash_types as types;

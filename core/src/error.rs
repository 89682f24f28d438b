//! Error types for the refresh engine.

use std::path::PathBuf;

use thiserror::Error;

/// Failure of a single backend request. Always scoped to one chart.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum QueryError {
    /// Network or backend failure.
    #[error("request failed: {0}")]
    Transport(String),
    /// The per-request budget expired before the backend answered.
    #[error("request timed out after {secs}s")]
    Timeout { secs: u64 },
    /// The backend answered with data the chart cannot use.
    #[error("unexpected response shape: {0}")]
    Shape(String),
    /// The stream was cancelled before it finished.
    #[error("request cancelled")]
    Cancelled,
    /// The backend does not implement the requested aggregation.
    #[error("unsupported aggregation {0:?}")]
    Unsupported(String),
    /// The request task panicked.
    #[error("request aborted: {0}")]
    Aborted(String),
}

impl QueryError {
    /// Category used to de-duplicate user notifications.
    pub fn category(&self) -> &'static str {
        match self {
            Self::Transport(_) => "transport",
            Self::Timeout { .. } => "timeout",
            Self::Shape(_) => "shape",
            Self::Cancelled => "cancelled",
            Self::Unsupported(_) => "unsupported",
            Self::Aborted(_) => "aborted",
        }
    }
}

/// A chart's data could not be turned into a visual config.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ShapeError {
    #[error("{labels} labels but {values} values")]
    LengthMismatch { labels: usize, values: usize },
    #[error("malformed payload: {0}")]
    Payload(String),
}

/// Failure reported by the rendering side.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SinkError {
    #[error("failed to create visual: {0}")]
    Create(String),
    #[error("failed to patch visual: {0}")]
    Patch(String),
    #[error("no live visual for this chart")]
    Missing,
}

/// Settings could not be read or written.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("IO error reading {path:?}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("parse error in {path:?}: {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: toml::de::Error,
    },
    #[error("settings store error: {0}")]
    Store(#[from] confy::ConfyError),
}

/// The dashboard service task is gone.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ServiceError {
    #[error("dashboard service has stopped")]
    Closed,
}

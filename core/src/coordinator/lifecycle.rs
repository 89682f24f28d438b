//! Per-chart request lifecycle within one refresh cycle.
//!
//! `Idle → Requesting → {Complete | Empty | Error | Superseded}`

/// Where one chart's request stands in the current cycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ChartPhase {
    #[default]
    Idle,
    Requesting,
    Complete,
    /// Resolved with zero rows; the chart shows an explicit no-data state.
    Empty,
    Error,
    /// A later cycle started first. Terminal, never updates the visual.
    Superseded,
}

impl ChartPhase {
    pub fn is_loading(self) -> bool {
        self == Self::Requesting
    }

    pub fn is_terminal(self) -> bool {
        matches!(
            self,
            Self::Complete | Self::Empty | Self::Error | Self::Superseded
        )
    }
}

/// Bookkeeping for one chart in the current cycle.
#[derive(Debug, Clone, Default)]
pub(crate) struct ChartSlot {
    pub phase: ChartPhase,
    /// Streamed batches accepted so far.
    pub batches: usize,
    /// Whether the most recent batch had no rows.
    pub last_batch_empty: bool,
}

impl ChartSlot {
    pub fn requesting() -> Self {
        Self {
            phase: ChartPhase::Requesting,
            ..Self::default()
        }
    }
}

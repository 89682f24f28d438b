//! The charts on the overview dashboard and how each one is queried.

use crate::charts::ChartKey;
use crate::query::EventRestriction;

/// How a chart gets its data.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ChartQuery {
    /// Top-N aggregation over `field`.
    Top {
        field: &'static str,
        restriction: EventRestriction,
        streaming: bool,
    },
    /// Event counts per interval.
    TimeHistogram { restriction: EventRestriction },
    /// Alert counts per interval, split by severity.
    SeverityHistogram,
    /// A named backend aggregation.
    Custom {
        agg: &'static str,
        restriction: EventRestriction,
    },
}

/// How a chart's data is drawn.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Presentation {
    Bar,
    Line,
    StackedLine,
    /// Patched in place while its stream delivers batches.
    Donut,
    Bubble,
    Scatter,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChartSpec {
    pub key: ChartKey,
    pub query: ChartQuery,
    pub presentation: Presentation,
}

impl ChartSpec {
    fn top(key: ChartKey, field: &'static str, restriction: EventRestriction) -> Self {
        Self {
            key,
            query: ChartQuery::Top {
                field,
                restriction,
                streaming: false,
            },
            presentation: Presentation::Bar,
        }
    }

    fn mix(key: ChartKey, field: &'static str) -> Self {
        Self {
            key,
            query: ChartQuery::Top {
                field,
                restriction: EventRestriction::Any,
                streaming: true,
            },
            presentation: Presentation::Donut,
        }
    }

    /// Aggregation field, for charts that have one.
    pub fn field(&self) -> Option<&'static str> {
        match self.query {
            ChartQuery::Top { field, .. } => Some(field),
            _ => None,
        }
    }
}

/// Field the top-signatures chart aggregates on; sparklines filter on it too.
pub const SIGNATURE_FIELD: &str = "alert.signature";

/// The overview dashboard, in display order.
pub fn overview() -> Vec<ChartSpec> {
    use EventRestriction::{Alerts, Any, Dns, Flows, Quic, Tls};
    vec![
        ChartSpec {
            key: ChartKey::EventsOverTime,
            query: ChartQuery::TimeHistogram { restriction: Any },
            presentation: Presentation::Line,
        },
        ChartSpec {
            key: ChartKey::AlertsBySeverity,
            query: ChartQuery::SeverityHistogram,
            presentation: Presentation::StackedLine,
        },
        ChartSpec::top(ChartKey::TopSignatures, SIGNATURE_FIELD, Alerts),
        ChartSpec::top(ChartKey::TopSourceIps, "src_ip", Any),
        ChartSpec::top(ChartKey::TopDestIps, "dest_ip", Any),
        ChartSpec::top(ChartKey::TopDestPorts, "dest_port", Any),
        ChartSpec::top(ChartKey::TopDnsQueries, "dns.rrname", Dns),
        ChartSpec::top(ChartKey::TopTlsSni, "tls.sni", Tls),
        ChartSpec::top(ChartKey::TopQuicSni, "quic.sni", Quic),
        ChartSpec::mix(ChartKey::ProtocolMix, "proto"),
        ChartSpec::mix(ChartKey::AppProtocolMix, "app_proto"),
        ChartSpec {
            key: ChartKey::TrafficHeatmap,
            query: ChartQuery::Custom {
                agg: "heatmap",
                restriction: Any,
            },
            presentation: Presentation::Bubble,
        },
        ChartSpec {
            key: ChartKey::FlowBytes,
            query: ChartQuery::Custom {
                agg: "bytes_scatter",
                restriction: Flows,
            },
            presentation: Presentation::Scatter,
        },
    ]
}

//! Logical chart identifiers.

use std::fmt;

/// Identifies one visual on the dashboard. Unique within a registry.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum ChartKey {
    EventsOverTime,
    AlertsBySeverity,
    TopSignatures,
    TopSourceIps,
    TopDestIps,
    TopDestPorts,
    TopDnsQueries,
    TopTlsSni,
    TopQuicSni,
    ProtocolMix,
    AppProtocolMix,
    TrafficHeatmap,
    FlowBytes,
    /// Trend line for one alert signature.
    Sparkline(String),
}

impl ChartKey {
    /// Stable id, usable as a DOM id or file name.
    pub fn id(&self) -> String {
        let fixed = match self {
            Self::EventsOverTime => "events-over-time",
            Self::AlertsBySeverity => "alerts-by-severity",
            Self::TopSignatures => "top-signatures",
            Self::TopSourceIps => "top-src-ips",
            Self::TopDestIps => "top-dest-ips",
            Self::TopDestPorts => "top-dest-ports",
            Self::TopDnsQueries => "top-dns-queries",
            Self::TopTlsSni => "top-tls-sni",
            Self::TopQuicSni => "top-quic-sni",
            Self::ProtocolMix => "protocol-mix",
            Self::AppProtocolMix => "app-protocol-mix",
            Self::TrafficHeatmap => "traffic-heatmap",
            Self::FlowBytes => "flow-bytes",
            Self::Sparkline(signature) => return format!("sparkline:{signature}"),
        };
        fixed.to_string()
    }

    pub fn title(&self) -> String {
        let fixed = match self {
            Self::EventsOverTime => "Events over time",
            Self::AlertsBySeverity => "Alerts by severity",
            Self::TopSignatures => "Top alert signatures",
            Self::TopSourceIps => "Top source IPs",
            Self::TopDestIps => "Top destination IPs",
            Self::TopDestPorts => "Top destination ports",
            Self::TopDnsQueries => "Top DNS queries",
            Self::TopTlsSni => "Top TLS SNI",
            Self::TopQuicSni => "Top QUIC SNI",
            Self::ProtocolMix => "Protocols",
            Self::AppProtocolMix => "Application protocols",
            Self::TrafficHeatmap => "Traffic by weekday and hour",
            Self::FlowBytes => "Flow bytes (to server / to client)",
            Self::Sparkline(signature) => return signature.clone(),
        };
        fixed.to_string()
    }

    pub fn is_sparkline(&self) -> bool {
        matches!(self, Self::Sparkline(_))
    }

    /// Parse an id produced by [`ChartKey::id`].
    pub fn from_id(id: &str) -> Option<Self> {
        if let Some(signature) = id.strip_prefix("sparkline:") {
            return Some(Self::Sparkline(signature.to_string()));
        }
        Self::FIXED.iter().find(|k| k.id() == id).cloned()
    }

    /// Every chart that is not per-signature.
    pub const FIXED: [ChartKey; 13] = [
        Self::EventsOverTime,
        Self::AlertsBySeverity,
        Self::TopSignatures,
        Self::TopSourceIps,
        Self::TopDestIps,
        Self::TopDestPorts,
        Self::TopDnsQueries,
        Self::TopTlsSni,
        Self::TopQuicSni,
        Self::ProtocolMix,
        Self::AppProtocolMix,
        Self::TrafficHeatmap,
        Self::FlowBytes,
    ];
}

impl fmt::Display for ChartKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.id())
    }
}

//! Clicks on rendered charts → new filter tokens.
//!
//! Resolution goes through the element map the registry keeps next to each
//! visual, never through the visual itself.

use crate::charts::{ChartKey, ChartSinkFactory, ChartSinkRegistry, FilterTarget};

/// Which element of a visual was hit.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ElementHit {
    Bar(usize),
    Point(usize),
    Slice(usize),
    Legend(usize),
}

impl ElementHit {
    /// Parse `bar:3`, `point:0`, `slice:1` or `legend:2`. A bare index is a bar.
    pub fn parse(raw: &str) -> Option<Self> {
        let (kind, index) = match raw.split_once(':') {
            Some((kind, index)) => (kind, index),
            None => ("bar", raw),
        };
        let index = index.trim().parse().ok()?;
        match kind.trim() {
            "bar" => Some(Self::Bar(index)),
            "point" => Some(Self::Point(index)),
            "slice" => Some(Self::Slice(index)),
            "legend" => Some(Self::Legend(index)),
            _ => None,
        }
    }
}

/// A user interaction on one chart.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Interaction {
    pub chart: ChartKey,
    pub hit: ElementHit,
}

impl Interaction {
    pub fn new(chart: ChartKey, hit: ElementHit) -> Self {
        Self { chart, hit }
    }
}

/// The filter target behind an interaction, if the element maps to one.
pub fn target<'a, F: ChartSinkFactory>(
    registry: &'a ChartSinkRegistry<F>,
    interaction: &Interaction,
) -> Option<&'a FilterTarget> {
    let elements = registry.elements(&interaction.chart)?;
    match interaction.hit {
        ElementHit::Bar(i) | ElementHit::Point(i) | ElementHit::Slice(i) => elements.point(i),
        ElementHit::Legend(i) => elements.legend(i),
    }
}

/// The `field:value` fragment to add for an interaction.
pub fn resolve<F: ChartSinkFactory>(
    registry: &ChartSinkRegistry<F>,
    interaction: &Interaction,
) -> Option<String> {
    let fragment = target(registry, interaction).map(FilterTarget::fragment);
    if fragment.is_none() {
        tracing::debug!(chart = %interaction.chart, hit = ?interaction.hit, "Interaction maps to no filter");
    }
    fragment
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::charts::config::bar_chart;
    use crate::charts::{ChartConfig, ChartSink, SeriesPatch};
    use crate::error::SinkError;
    use crate::filter::tokenizer::{parse_fragment, tokenize};

    struct NullSink;

    impl ChartSink for NullSink {
        fn patch(&mut self, _patch: &SeriesPatch) -> Result<(), SinkError> {
            Ok(())
        }
        fn redraw(&mut self) {}
        fn destroy(self) {}
    }

    struct NullFactory;

    impl ChartSinkFactory for NullFactory {
        type Sink = NullSink;
        fn create(&mut self, _: &ChartKey, _: &ChartConfig) -> Result<NullSink, SinkError> {
            Ok(NullSink)
        }
    }

    #[test]
    fn test_parse_hit() {
        assert_eq!(ElementHit::parse("3"), Some(ElementHit::Bar(3)));
        assert_eq!(ElementHit::parse("legend:1"), Some(ElementHit::Legend(1)));
        assert_eq!(ElementHit::parse("wedge:1"), None);
        assert_eq!(ElementHit::parse("bar:x"), None);
    }

    #[test]
    fn test_resolved_fragment_round_trips() {
        let mut registry = ChartSinkRegistry::new(NullFactory);
        let labels = vec![
            "ET SCAN Nmap".to_string(),
            "plain".to_string(),
            r#"say "hi""#.to_string(),
        ];
        registry
            .upsert(
                ChartKey::TopSignatures,
                bar_chart("t", "alert.signature", &labels, &[3, 2, 1]).unwrap(),
            )
            .unwrap();

        for (i, label) in labels.iter().enumerate() {
            let fragment = resolve(
                &registry,
                &Interaction::new(ChartKey::TopSignatures, ElementHit::Bar(i)),
            )
            .unwrap();
            let tokens = tokenize(&fragment);
            assert_eq!(tokens.len(), 1, "{fragment}");
            let parsed = parse_fragment(&tokens[0]);
            assert_eq!(parsed.field.as_deref(), Some("alert.signature"));
            assert_eq!(&parsed.value, label);
        }
    }

    #[test]
    fn test_out_of_range_or_unknown_chart() {
        let registry = ChartSinkRegistry::new(NullFactory);
        assert!(
            resolve(
                &registry,
                &Interaction::new(ChartKey::TopDestPorts, ElementHit::Bar(0))
            )
            .is_none()
        );
    }
}

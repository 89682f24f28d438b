//! Per-signature trend lines.

use std::collections::BTreeSet;

use super::key::ChartKey;
use super::registry::{ChartSinkFactory, ChartSinkRegistry};

/// The signatures whose sparklines should exist right now.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SparklineSet {
    signatures: BTreeSet<String>,
}

impl SparklineSet {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn signatures(&self) -> impl Iterator<Item = &str> {
        self.signatures.iter().map(String::as_str)
    }

    pub fn contains(&self, signature: &str) -> bool {
        self.signatures.contains(signature)
    }

    pub fn len(&self) -> usize {
        self.signatures.len()
    }

    pub fn is_empty(&self) -> bool {
        self.signatures.is_empty()
    }

    /// Adopt the current top signatures and destroy every sparkline outside them.
    ///
    /// Returns the signatures that still need data this cycle, in input order.
    pub fn sync<F: ChartSinkFactory>(
        &mut self,
        registry: &mut ChartSinkRegistry<F>,
        top: impl IntoIterator<Item = String>,
    ) -> Vec<String> {
        let mut ordered = Vec::new();
        let mut wanted = BTreeSet::new();
        for signature in top {
            if wanted.insert(signature.clone()) {
                ordered.push(signature);
            }
        }
        let removed = registry.retain(|key| match key {
            ChartKey::Sparkline(signature) => wanted.contains(signature),
            _ => true,
        });
        if removed > 0 {
            tracing::debug!(removed, kept = wanted.len(), "Sparklines pruned");
        }
        self.signatures = wanted;
        ordered
    }

    /// Forget every signature and destroy their sparklines.
    pub fn clear<F: ChartSinkFactory>(&mut self, registry: &mut ChartSinkRegistry<F>) {
        self.sync(registry, std::iter::empty());
    }
}

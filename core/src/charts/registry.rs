//! Owner of every live visual.
//!
//! The registry is the only place visuals are created or destroyed. It
//! holds at most one instance per key: `upsert` destroys the old instance
//! before creating its replacement, and dropping the registry destroys
//! whatever is still alive.

use std::collections::HashMap;
use std::fmt;

use super::config::{BuiltChart, ChartConfig, ElementMap, SeriesPatch};
use super::key::ChartKey;
use crate::error::SinkError;

/// One rendered visual, owned by the registry.
pub trait ChartSink {
    /// Replace labels and data in place.
    fn patch(&mut self, patch: &SeriesPatch) -> Result<(), SinkError>;

    /// Ask the renderer to repaint after a patch.
    fn redraw(&mut self);

    /// Release the visual. Called exactly once per created sink.
    fn destroy(self);
}

/// Creates visuals for the registry.
pub trait ChartSinkFactory {
    type Sink: ChartSink;

    fn create(&mut self, key: &ChartKey, config: &ChartConfig) -> Result<Self::Sink, SinkError>;
}

struct LiveChart<S> {
    sink: S,
    config: ChartConfig,
    elements: ElementMap,
}

pub struct ChartSinkRegistry<F: ChartSinkFactory> {
    factory: F,
    live: HashMap<ChartKey, LiveChart<F::Sink>>,
    created: u64,
    destroyed: u64,
}

impl<F: ChartSinkFactory> fmt::Debug for ChartSinkRegistry<F> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut keys: Vec<&ChartKey> = self.live.keys().collect();
        keys.sort();
        f.debug_struct("ChartSinkRegistry")
            .field("live", &keys)
            .field("created", &self.created)
            .field("destroyed", &self.destroyed)
            .finish()
    }
}

impl<F: ChartSinkFactory> ChartSinkRegistry<F> {
    pub fn new(factory: F) -> Self {
        Self {
            factory,
            live: HashMap::new(),
            created: 0,
            destroyed: 0,
        }
    }

    /// Destroy any live instance for `key`, then create one from `built`.
    ///
    /// If creation fails the key is left without an instance.
    pub fn upsert(&mut self, key: ChartKey, built: BuiltChart) -> Result<(), SinkError> {
        self.destroy(&key);
        let sink = self.factory.create(&key, &built.config)?;
        self.created += 1;
        tracing::trace!(chart = %key, kind = built.config.kind(), "Visual created");
        self.live.insert(
            key,
            LiveChart {
                sink,
                config: built.config,
                elements: built.elements,
            },
        );
        Ok(())
    }

    /// Update a live donut in place and redraw it.
    pub fn patch(&mut self, key: &ChartKey, patch: SeriesPatch) -> Result<(), SinkError> {
        let live = self.live.get_mut(key).ok_or(SinkError::Missing)?;
        live.sink.patch(&patch)?;
        live.sink.redraw();
        live.config = ChartConfig::Donut(patch.config);
        live.elements = patch.elements;
        tracing::trace!(chart = %key, "Visual patched");
        Ok(())
    }

    /// Patch when a donut is already live for `key`, otherwise create it.
    pub fn upsert_or_patch(&mut self, key: ChartKey, patch: SeriesPatch) -> Result<(), SinkError> {
        let is_donut = matches!(
            self.live.get(&key).map(|l| &l.config),
            Some(ChartConfig::Donut(_))
        );
        if is_donut {
            self.patch(&key, patch)
        } else {
            self.upsert(
                key,
                BuiltChart {
                    config: ChartConfig::Donut(patch.config),
                    elements: patch.elements,
                },
            )
        }
    }

    /// Destroy the instance for `key`. Returns whether one existed.
    pub fn destroy(&mut self, key: &ChartKey) -> bool {
        match self.live.remove(key) {
            Some(old) => {
                old.sink.destroy();
                self.destroyed += 1;
                tracing::trace!(chart = %key, "Visual destroyed");
                true
            }
            None => false,
        }
    }

    /// Destroy every live instance exactly once. Returns how many there were.
    pub fn destroy_all(&mut self) -> usize {
        let count = self.live.len();
        for (key, old) in self.live.drain() {
            old.sink.destroy();
            tracing::trace!(chart = %key, "Visual destroyed");
        }
        self.destroyed += count as u64;
        count
    }

    /// Destroy every instance whose key fails `keep`.
    pub fn retain(&mut self, mut keep: impl FnMut(&ChartKey) -> bool) -> usize {
        let doomed: Vec<ChartKey> = self.live.keys().filter(|k| !keep(k)).cloned().collect();
        for key in &doomed {
            self.destroy(key);
        }
        doomed.len()
    }

    pub fn contains(&self, key: &ChartKey) -> bool {
        self.live.contains_key(key)
    }

    pub fn config(&self, key: &ChartKey) -> Option<&ChartConfig> {
        self.live.get(key).map(|l| &l.config)
    }

    pub fn elements(&self, key: &ChartKey) -> Option<&ElementMap> {
        self.live.get(key).map(|l| &l.elements)
    }

    /// Live keys in sorted order.
    pub fn keys(&self) -> Vec<ChartKey> {
        let mut keys: Vec<ChartKey> = self.live.keys().cloned().collect();
        keys.sort();
        keys
    }

    pub fn len(&self) -> usize {
        self.live.len()
    }

    pub fn is_empty(&self) -> bool {
        self.live.is_empty()
    }

    /// Instances created over the registry's lifetime.
    pub fn created(&self) -> u64 {
        self.created
    }

    /// Instances destroyed over the registry's lifetime.
    pub fn destroyed(&self) -> u64 {
        self.destroyed
    }

    pub fn factory(&self) -> &F {
        &self.factory
    }
}

impl<F: ChartSinkFactory> Drop for ChartSinkRegistry<F> {
    fn drop(&mut self) {
        self.destroy_all();
    }
}

//! A replay run: initial filters, then a sequence of chart clicks.
//!
//! Each step goes through the dashboard service exactly as an interactive
//! front end would, and waits for the cycle it started to settle before the
//! next one.

use std::str::FromStr;
use std::sync::Arc;

use thiserror::Error;

use sensordash_core::{
    Backend, ChartKey, Dashboard, DashboardService, DashboardSnapshot, ElementHit, Interaction,
    ServiceError,
};
use sensordash_types::{DashboardSettings, TimeRange};

use crate::render::TextFactory;

#[derive(Debug, Error)]
pub enum ReplayError {
    #[error("invalid click {0:?}: expected <chart-id>=<hit>, e.g. top-signatures=bar:0")]
    BadClick(String),
    #[error("click {0} hit no filterable element")]
    DeadClick(String),
    #[error(transparent)]
    Service(#[from] ServiceError),
}

/// A click given as `<chart-id>=<hit>`, e.g. `top-signatures=bar:0`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Click(pub Interaction);

impl FromStr for Click {
    type Err = ReplayError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let bad = || ReplayError::BadClick(s.to_string());
        let (chart, hit) = s.rsplit_once('=').ok_or_else(bad)?;
        let chart = ChartKey::from_id(chart.trim()).ok_or_else(bad)?;
        let hit = ElementHit::parse(hit).ok_or_else(bad)?;
        Ok(Self(Interaction::new(chart, hit)))
    }
}

impl std::fmt::Display for Click {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let (kind, index) = match self.0.hit {
            ElementHit::Bar(i) => ("bar", i),
            ElementHit::Point(i) => ("point", i),
            ElementHit::Slice(i) => ("slice", i),
            ElementHit::Legend(i) => ("legend", i),
        };
        write!(f, "{}={kind}:{index}", self.0.chart)
    }
}

/// What to apply before the first cycle, and the clicks that follow it.
#[derive(Debug, Clone, Default)]
pub struct Script {
    pub time_range: Option<TimeRange>,
    pub sensor: Option<String>,
    pub query: Option<String>,
    pub add: Vec<String>,
    pub clicks: Vec<Click>,
}

/// The settled dashboard after one step.
#[derive(Debug, Clone)]
pub struct Frame {
    pub step: String,
    pub snapshot: DashboardSnapshot,
}

/// Drive the script to completion and return one frame per step.
///
/// A click that maps to no filter (or to a token already present) fails
/// the run unless `lenient` is set, in which case it is logged and skipped.
pub async fn run(
    script: &Script,
    backend: Arc<dyn Backend>,
    settings: DashboardSettings,
    lenient: bool,
) -> Result<Vec<Frame>, ReplayError> {
    let dashboard = Dashboard::new(backend, TextFactory::default(), settings);
    let (service, handle) = DashboardService::new(dashboard);
    let task = tokio::spawn(service.run());

    // Each effective edit starts a cycle; refresh only if none did.
    let mut started = false;
    if let Some(range) = script.time_range {
        started |= handle.set_time_range(range).await?.is_some();
    }
    if script.sensor.is_some() {
        started |= handle.set_sensor(script.sensor.clone()).await?.is_some();
    }
    if let Some(q) = &script.query {
        started |= handle.set_query(q.as_str()).await?.is_some();
    }
    for fragment in &script.add {
        started |= handle.add_token(fragment.as_str()).await?.is_some();
    }
    if !started {
        handle.refresh().await?;
    }

    let mut frames = vec![Frame {
        step: "initial".to_string(),
        snapshot: handle.settle().await?,
    }];

    for click in &script.clicks {
        match handle.interact(click.0.clone()).await? {
            Some(generation) => {
                tracing::info!(%generation, click = %click, "Applied click");
            }
            None if lenient => {
                tracing::warn!(click = %click, "Click changed nothing; skipping");
                continue;
            }
            None => {
                handle.shutdown().await?;
                let _ = task.await;
                return Err(ReplayError::DeadClick(click.to_string()));
            }
        }
        frames.push(Frame {
            step: format!("click {click}"),
            snapshot: handle.settle().await?,
        });
    }

    handle.shutdown().await?;
    if let Ok(dashboard) = task.await {
        tracing::debug!(
            created = dashboard.registry().created(),
            destroyed = dashboard.registry().destroyed(),
            "Replay finished"
        );
    }
    Ok(frames)
}

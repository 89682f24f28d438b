//! The page-level controller.
//!
//! Owns the filter state, the coordinator and the visual registry, and is
//! the only writer to any of them. Every effective filter mutation starts a
//! new refresh cycle; every completion passes the coordinator's staleness
//! check before it may touch a visual.

use std::sync::Arc;

use chrono::Duration;
use serde_json::Value;
use tokio::sync::watch;

use sensordash_types::{DashboardSettings, Severity, TimeRange};

use super::catalog::{ChartQuery, ChartSpec, Presentation, SIGNATURE_FIELD, overview};
use crate::backend::{Backend, HistogramRequest, QueryParams};
use crate::charts::config::{
    BuiltChart, bar_from_rows, bubble_from_value, donut_from_rows, line_from_time,
    scatter_from_value, stacked_severity,
};
use crate::charts::{ChartConfig, ChartKey, ChartSinkFactory, ChartSinkRegistry, SparklineSet};
use crate::coordinator::{
    ChartPayload, ChartPhase, ChartRequest, Completion, CoordinatorStats, Delivery, Generation,
    RequestCoordinator,
};
use crate::error::{QueryError, ShapeError};
use crate::feedback::{self, Interaction};
use crate::filter::tokenizer::quote_phrase;
use crate::filter::{FilterState, UrlState};
use crate::notify::{Notification, Notifications};
use crate::query::{EventRestriction, compose, compose_with, describe_top};

/// Point-in-time view of the dashboard, for callers outside the owner task.
#[derive(Debug, Clone, PartialEq)]
pub struct DashboardSnapshot {
    pub generation: Generation,
    pub url: UrlState,
    pub time_range: TimeRange,
    pub tokens: Vec<String>,
    pub loading: Vec<ChartKey>,
    pub charts: Vec<(ChartKey, ChartConfig)>,
    pub notifications: Vec<Notification>,
}

impl DashboardSnapshot {
    pub fn chart(&self, key: &ChartKey) -> Option<&ChartConfig> {
        self.charts.iter().find(|(k, _)| k == key).map(|(_, c)| c)
    }
}

pub struct Dashboard<F: ChartSinkFactory> {
    filters: FilterState,
    settings: DashboardSettings,
    coordinator: RequestCoordinator<ChartKey>,
    registry: ChartSinkRegistry<F>,
    specs: Vec<ChartSpec>,
    sparklines: SparklineSet,
    notifications: Notifications,
    url_tx: watch::Sender<UrlState>,
}

impl<F: ChartSinkFactory> Dashboard<F> {
    /// Overview dashboard with empty filters on the configured default range.
    pub fn new(backend: Arc<dyn Backend>, factory: F, settings: DashboardSettings) -> Self {
        let filters = FilterState::new(settings.default_time_range);
        Self::with_filters(backend, factory, settings, filters)
    }

    /// Restore from a shared URL.
    pub fn from_url(
        backend: Arc<dyn Backend>,
        factory: F,
        settings: DashboardSettings,
        url: &UrlState,
    ) -> Self {
        let filters = FilterState::from_url(url, settings.default_time_range);
        Self::with_filters(backend, factory, settings, filters)
    }

    pub fn with_filters(
        backend: Arc<dyn Backend>,
        factory: F,
        settings: DashboardSettings,
        filters: FilterState,
    ) -> Self {
        let coordinator = RequestCoordinator::new(backend).with_timeout(settings.query_timeout());
        let (url_tx, _) = watch::channel(filters.url().clone());
        Self {
            filters,
            settings,
            coordinator,
            registry: ChartSinkRegistry::new(factory),
            specs: overview(),
            sparklines: SparklineSet::new(),
            notifications: Notifications::new(),
            url_tx,
        }
    }

    /// Replace the chart catalogue. Takes effect on the next refresh.
    pub fn with_specs(mut self, specs: Vec<ChartSpec>) -> Self {
        self.specs = specs;
        self
    }

    // ─────────────────────────────────────────────────────────────────────────
    // Accessors
    // ─────────────────────────────────────────────────────────────────────────

    pub fn filters(&self) -> &FilterState {
        &self.filters
    }

    pub fn settings(&self) -> &DashboardSettings {
        &self.settings
    }

    pub fn registry(&self) -> &ChartSinkRegistry<F> {
        &self.registry
    }

    pub fn sparklines(&self) -> &SparklineSet {
        &self.sparklines
    }

    pub fn notifications(&self) -> &Notifications {
        &self.notifications
    }

    /// Charts the coordinator keeps request state for.
    pub fn tracked_charts(&self) -> usize {
        self.coordinator.tracked()
    }

    pub fn generation(&self) -> Generation {
        self.coordinator.generation()
    }

    pub fn phase(&self, key: &ChartKey) -> ChartPhase {
        self.coordinator.phase(key)
    }

    pub fn is_loading(&self, key: &ChartKey) -> bool {
        self.coordinator.is_loading(key)
    }

    pub fn any_loading(&self) -> bool {
        self.coordinator.any_loading()
    }

    pub fn stats(&self) -> CoordinatorStats {
        self.coordinator.stats()
    }

    /// Watch the shareable URL; updated after every effective mutation.
    pub fn subscribe_url(&self) -> watch::Receiver<UrlState> {
        self.url_tx.subscribe()
    }

    pub fn snapshot(&self) -> DashboardSnapshot {
        let mut loading = self.coordinator.loading_keys();
        loading.sort();
        DashboardSnapshot {
            generation: self.generation(),
            url: self.filters.url().clone(),
            time_range: self.filters.time_range(),
            tokens: self.filters.tokens().to_vec(),
            loading,
            charts: self
                .registry
                .keys()
                .into_iter()
                .filter_map(|k| self.registry.config(&k).cloned().map(|c| (k, c)))
                .collect(),
            notifications: self.notifications.list(),
        }
    }

    // ─────────────────────────────────────────────────────────────────────────
    // Filter mutations (each effective one refreshes)
    // ─────────────────────────────────────────────────────────────────────────

    pub fn add_token(&mut self, fragment: &str) -> Option<Generation> {
        self.mutate(|f| f.add_token(fragment))
    }

    pub fn remove_token(&mut self, fragment: &str) -> Option<Generation> {
        self.mutate(|f| f.remove_token(fragment))
    }

    pub fn set_query(&mut self, q: &str) -> Option<Generation> {
        self.mutate(|f| f.set_query(q))
    }

    pub fn reset(&mut self) -> Option<Generation> {
        self.mutate(FilterState::reset)
    }

    pub fn set_sensor(&mut self, sensor: Option<&str>) -> Option<Generation> {
        self.mutate(|f| f.set_sensor(sensor))
    }

    pub fn set_time_range(&mut self, time_range: TimeRange) -> Option<Generation> {
        self.mutate(|f| f.set_time_range(time_range))
    }

    pub fn set_severity(
        &mut self,
        severity: impl IntoIterator<Item = Severity>,
    ) -> Option<Generation> {
        let severity = severity.into_iter().collect();
        self.mutate(|f| f.set_severity(severity))
    }

    pub fn set_ip(&mut self, ip: Option<&str>) -> Option<Generation> {
        self.mutate(|f| f.set_ip(ip))
    }

    pub fn set_signature(&mut self, signature: Option<&str>) -> Option<Generation> {
        self.mutate(|f| f.set_signature(signature))
    }

    pub fn set_proto(&mut self, proto: Option<&str>) -> Option<Generation> {
        self.mutate(|f| f.set_proto(proto))
    }

    pub fn set_port(&mut self, port: Option<&str>) -> Option<Generation> {
        self.mutate(|f| f.set_port(port))
    }

    pub fn apply_structured(&mut self) -> Option<Generation> {
        self.mutate(FilterState::apply_structured)
    }

    /// Turn a click into a filter token. `None` when the element maps to no
    /// filter or the token is already present.
    pub fn interact(&mut self, interaction: &Interaction) -> Option<Generation> {
        let fragment = feedback::resolve(&self.registry, interaction)?;
        tracing::debug!(chart = %interaction.chart, fragment = %fragment, "Cross-filter");
        self.add_token(&fragment)
    }

    fn mutate(&mut self, change: impl FnOnce(&mut FilterState) -> bool) -> Option<Generation> {
        if !change(&mut self.filters) {
            return None;
        }
        self.url_tx.send_replace(self.filters.url().clone());
        Some(self.refresh())
    }

    // ─────────────────────────────────────────────────────────────────────────
    // Refresh cycle
    // ─────────────────────────────────────────────────────────────────────────

    /// Start a new cycle and issue every chart's request.
    pub fn refresh(&mut self) -> Generation {
        let generation = self.coordinator.begin_cycle();
        self.coordinator.cancel_all_streams();
        let requests: Vec<(ChartKey, ChartRequest)> = self
            .specs
            .iter()
            .map(|spec| (spec.key.clone(), self.request_for(spec)))
            .collect();
        tracing::info!(
            %generation,
            charts = requests.len(),
            query = %self.filters.query_text(),
            range = %self.filters.time_range(),
            "Refreshing dashboard"
        );
        for (key, request) in requests {
            self.coordinator.issue(key, request);
        }
        generation
    }

    fn request_for(&self, spec: &ChartSpec) -> ChartRequest {
        let state = &self.filters;
        let time_range = state.time_range();
        match &spec.query {
            ChartQuery::Top {
                field,
                restriction,
                streaming,
            } => {
                let desc = describe_top(state, *restriction, field, self.settings.top_n);
                ChartRequest::Aggregate(if *streaming { desc.streaming() } else { desc })
            }
            ChartQuery::TimeHistogram { restriction } => {
                ChartRequest::TimeHistogram(HistogramRequest {
                    time_range,
                    interval: time_range.default_interval(),
                    event_type: restriction.event_type().map(str::to_string),
                    query_string: compose(state, EventRestriction::Any),
                })
            }
            ChartQuery::SeverityHistogram => ChartRequest::SeverityHistogram(HistogramRequest {
                time_range,
                interval: time_range.default_interval(),
                event_type: EventRestriction::Alerts.event_type().map(str::to_string),
                query_string: compose(state, EventRestriction::Any),
            }),
            ChartQuery::Custom { agg, restriction } => ChartRequest::Custom {
                agg: (*agg).to_string(),
                params: QueryParams {
                    time_range,
                    query_string: compose(state, *restriction),
                    size: self.settings.top_n,
                    options: Value::Null,
                },
            },
        }
    }

    fn sparkline_interval(&self) -> Duration {
        self.settings
            .sparkline_interval_secs
            .and_then(|secs| i64::try_from(secs).ok())
            .filter(|secs| *secs > 0)
            .map(Duration::seconds)
            .unwrap_or_else(|| self.filters.time_range().default_interval())
    }

    fn sparkline_request(&self, signature: &str) -> ChartRequest {
        let term = format!("{SIGNATURE_FIELD}:{}", quote_phrase(signature));
        ChartRequest::TimeHistogram(HistogramRequest {
            time_range: self.filters.time_range(),
            interval: self.sparkline_interval(),
            event_type: EventRestriction::Alerts.event_type().map(str::to_string),
            query_string: compose_with(&self.filters, EventRestriction::Any, &[term]),
        })
    }

    // ─────────────────────────────────────────────────────────────────────────
    // Completions
    // ─────────────────────────────────────────────────────────────────────────

    /// Wait for the next completion and apply it. Returns `false` if the
    /// completion channel is closed.
    pub async fn process_next(&mut self) -> bool {
        match self.coordinator.next_completion().await {
            Some(completion) => {
                self.handle_completion(completion);
                true
            }
            None => false,
        }
    }

    /// Receive the next raw completion without applying it.
    pub async fn next_completion(&mut self) -> Option<Completion<ChartKey>> {
        self.coordinator.next_completion().await
    }

    /// Run until no request of the current generation is outstanding.
    pub async fn settle(&mut self) {
        while self.coordinator.any_loading() {
            if !self.process_next().await {
                break;
            }
        }
    }

    /// Apply one completion. Stale ones are dropped by the coordinator.
    pub fn handle_completion(&mut self, completion: Completion<ChartKey>) {
        let Some(delivery) = self.coordinator.accept(completion) else {
            return;
        };
        match delivery {
            Delivery::Partial { key, payload } => self.render(&key, &payload),
            Delivery::Resolved {
                key,
                phase,
                outcome,
            } => match (phase, outcome) {
                (ChartPhase::Complete, Ok(Some(payload))) => {
                    self.render(&key, &payload);
                    if key == ChartKey::TopSignatures {
                        self.load_sparklines(&payload);
                    }
                }
                // A stream that delivered data; its last batch is already shown.
                (ChartPhase::Complete, Ok(None)) => {}
                (ChartPhase::Empty, _) => {
                    self.show(&key, ChartConfig::empty(key.title()));
                    if key == ChartKey::TopSignatures {
                        self.clear_sparklines();
                    }
                }
                (_, Err(error)) => self.fail(&key, &error),
                (phase, Ok(_)) => {
                    tracing::debug!(chart = %key, ?phase, "Nothing to render");
                }
            },
        }
    }

    fn fail(&mut self, key: &ChartKey, error: &QueryError) {
        let generation = self.generation();
        tracing::warn!(%generation, chart = %key, error = %error, "Chart request failed");
        self.show(key, ChartConfig::failed(key.title(), error.to_string()));
        self.notifications.report(generation, error, &key.title());
        if *key == ChartKey::TopSignatures {
            self.clear_sparklines();
        }
    }

    fn show(&mut self, key: &ChartKey, config: ChartConfig) {
        if let Err(e) = self
            .registry
            .upsert(key.clone(), BuiltChart::without_elements(config))
        {
            tracing::warn!(chart = %key, error = %e, "Failed to show placeholder");
        }
    }

    fn render(&mut self, key: &ChartKey, payload: &ChartPayload) {
        let presentation = match key {
            ChartKey::Sparkline(_) => Presentation::Line,
            _ => match self.specs.iter().find(|s| s.key == *key) {
                Some(spec) => spec.presentation,
                None => {
                    tracing::debug!(chart = %key, "No spec for chart");
                    return;
                }
            },
        };

        if presentation == Presentation::Donut {
            let field = self.field_of(key);
            let patch = match payload {
                ChartPayload::Rows(rows) => donut_from_rows(&key.title(), field, rows),
                _ => Err(mismatch(presentation, payload)),
            };
            match patch {
                Ok(patch) => {
                    if let Err(e) = self.registry.upsert_or_patch(key.clone(), patch) {
                        tracing::warn!(chart = %key, error = %e, "Failed to update visual");
                    }
                }
                Err(e) => skip(key, &e),
            }
            return;
        }

        match self.build(key, presentation, payload) {
            Ok(built) => {
                if let Err(e) = self.registry.upsert(key.clone(), built) {
                    tracing::warn!(chart = %key, error = %e, "Failed to create visual");
                }
            }
            Err(e) => skip(key, &e),
        }
    }

    fn build(
        &self,
        key: &ChartKey,
        presentation: Presentation,
        payload: &ChartPayload,
    ) -> Result<BuiltChart, ShapeError> {
        let title = key.title();
        let mode = self.settings.timestamp_mode;
        let interval = self.filters.time_range().default_interval();
        match (presentation, payload) {
            (Presentation::Bar, ChartPayload::Rows(rows)) => {
                bar_from_rows(&title, self.field_of(key), rows)
            }
            (Presentation::Line, ChartPayload::Time(hist)) if key.is_sparkline() => {
                line_from_time(&title, hist, self.sparkline_interval(), mode, true)
            }
            (Presentation::Line, ChartPayload::Time(hist)) => {
                line_from_time(&title, hist, interval, mode, false)
            }
            (Presentation::StackedLine, ChartPayload::Severity(hist)) => {
                stacked_severity(&title, hist, interval, mode)
            }
            (Presentation::Bubble, ChartPayload::Custom(value)) => bubble_from_value(&title, value),
            (Presentation::Scatter, ChartPayload::Custom(value)) => {
                scatter_from_value(&title, value)
            }
            _ => Err(mismatch(presentation, payload)),
        }
    }

    fn field_of(&self, key: &ChartKey) -> &'static str {
        self.specs
            .iter()
            .find(|s| s.key == *key)
            .and_then(ChartSpec::field)
            .unwrap_or_default()
    }

    /// Keep exactly one sparkline per current top signature and fetch their data.
    fn load_sparklines(&mut self, payload: &ChartPayload) {
        let ChartPayload::Rows(rows) = payload else {
            return;
        };
        let signatures = self
            .sparklines
            .sync(&mut self.registry, rows.keys().map(str::to_string));
        self.prune_sparkline_slots();
        for signature in signatures {
            let request = self.sparkline_request(&signature);
            self.coordinator
                .issue(ChartKey::Sparkline(signature), request);
        }
    }

    fn clear_sparklines(&mut self) {
        self.sparklines.clear(&mut self.registry);
        self.prune_sparkline_slots();
    }

    /// Drop request state for sparklines that are no longer shown.
    fn prune_sparkline_slots(&mut self) {
        let sparklines = &self.sparklines;
        let forgotten = self.coordinator.retain(|key| match key {
            ChartKey::Sparkline(signature) => sparklines.contains(signature),
            _ => true,
        });
        if forgotten > 0 {
            tracing::trace!(forgotten, "Sparkline request state dropped");
        }
    }

    /// Cancel everything in flight and destroy every visual.
    pub fn teardown(&mut self) {
        self.coordinator.clear();
        self.sparklines.clear(&mut self.registry);
        let destroyed = self.registry.destroy_all();
        tracing::debug!(destroyed, "Dashboard torn down");
    }
}

fn mismatch(presentation: Presentation, payload: &ChartPayload) -> ShapeError {
    let got = match payload {
        ChartPayload::Rows(_) => "rows",
        ChartPayload::Time(_) => "time histogram",
        ChartPayload::Severity(_) => "severity histogram",
        ChartPayload::Custom(_) => "custom",
    };
    ShapeError::Payload(format!("{presentation:?} chart cannot draw {got}"))
}

fn skip(key: &ChartKey, error: &ShapeError) {
    tracing::warn!(chart = %key, error = %error, "Skipping chart update: bad data shape");
}

//! Refresh cycles: stale-generation discard, streaming, empty and failed charts.

mod common;

use std::time::Duration;

use pretty_assertions::assert_eq;

use common::{
    Answer, Call, RecordingFactory, ScriptedBackend, bar_data, bar_spec, donut_spec, line_spec,
    rows,
};
use sensordash_core::charts::{ChartConfig, ChartKey, Notice};
use sensordash_core::coordinator::ChartPhase;
use sensordash_core::dashboard::{ChartQuery, ChartSpec, Presentation};
use sensordash_core::error::QueryError;
use sensordash_core::query::EventRestriction;
use sensordash_core::types::{DashboardSettings, TimeHistogram};
use sensordash_core::Dashboard;

fn dashboard(specs: Vec<ChartSpec>) -> (Dashboard<RecordingFactory>, common::Gates, RecordingFactory) {
    dashboard_with(specs, DashboardSettings::default())
}

fn dashboard_with(
    specs: Vec<ChartSpec>,
    settings: DashboardSettings,
) -> (Dashboard<RecordingFactory>, common::Gates, RecordingFactory) {
    let (backend, gates) = ScriptedBackend::new();
    let factory = RecordingFactory::default();
    let dash = Dashboard::new(backend, factory.clone(), settings).with_specs(specs);
    (dash, gates, factory)
}

#[tokio::test]
async fn test_only_latest_generation_reaches_charts() {
    let (mut dash, mut gates, factory) = dashboard(vec![bar_spec(
        ChartKey::TopSourceIps,
        "src_ip",
        EventRestriction::Any,
    )]);

    let g1 = dash.refresh();
    let g2 = dash.add_token("proto:TCP").unwrap();
    let g3 = dash.add_token("dest_port:443").unwrap();
    assert!(g1 < g2 && g2 < g3);
    assert_eq!(dash.generation(), g3);

    let first = gates.take(|c| c.query_string().is_empty()).await;
    let second = gates.take(|c| c.query_string() == "proto:TCP").await;
    let third = gates
        .take(|c| c.query_string() == "proto:TCP dest_port:443")
        .await;

    // Newest answers first, the older two straggle in afterwards.
    third.reply(Answer::Rows(Ok(rows(&[("10.0.0.3", 3)]))));
    dash.process_next().await;
    first.reply(Answer::Rows(Ok(rows(&[("10.0.0.1", 1)]))));
    second.reply(Answer::Rows(Ok(rows(&[("10.0.0.2", 2)]))));
    dash.process_next().await;
    dash.process_next().await;

    let (labels, values) = bar_data(dash.registry().config(&ChartKey::TopSourceIps));
    assert_eq!(labels, vec!["10.0.0.3"]);
    assert_eq!(values, vec![3]);
    assert_eq!(dash.stats().stale, 2);
    assert_eq!(factory.log.lock().unwrap().created_for(&ChartKey::TopSourceIps), 1);
}

#[tokio::test]
async fn test_late_stream_batch_is_not_merged() {
    let (mut dash, mut gates, factory) = dashboard(vec![donut_spec(ChartKey::ProtocolMix, "proto")]);

    dash.refresh();
    let old = gates.take_field("proto").await;
    assert!(old.stream().send(rows(&[("tcp", 10)])).await);
    dash.process_next().await;
    assert!(dash.is_loading(&ChartKey::ProtocolMix));
    match dash.registry().config(&ChartKey::ProtocolMix) {
        Some(ChartConfig::Donut(donut)) => assert_eq!(donut.total, 10),
        other => panic!("expected donut, got {other:?}"),
    }

    // A filter change bumps the generation and closes the old stream before
    // the new one opens.
    let g2 = dash.add_token("proto:UDP").unwrap();
    tokio::time::timeout(Duration::from_secs(5), old.stream().cancelled())
        .await
        .expect("old stream was not cancelled");
    assert!(!old.stream().send(rows(&[("tcp", 25)])).await);
    let fresh = gates
        .take(|c| matches!(c, Call::Stream(_, g) if *g == g2))
        .await;
    assert!(fresh.stream().send(rows(&[("udp", 4)])).await);
    fresh.finish();
    old.finish();
    dash.settle().await;

    match dash.registry().config(&ChartKey::ProtocolMix) {
        Some(ChartConfig::Donut(donut)) => {
            assert_eq!(donut.total, 4);
            assert_eq!(donut.slices.len(), 1);
            assert_eq!(donut.slices[0].label, "udp");
        }
        other => panic!("expected donut, got {other:?}"),
    }
    assert_eq!(dash.phase(&ChartKey::ProtocolMix), ChartPhase::Complete);
    // Patched in place across both cycles: one visual, never recreated.
    let log = factory.log.lock().unwrap();
    assert_eq!(log.created_for(&ChartKey::ProtocolMix), 1);
    assert_eq!(log.patched_for(&ChartKey::ProtocolMix), 1);
}

#[tokio::test]
async fn test_stream_batches_are_last_write_wins() {
    let (mut dash, mut gates, _factory) = dashboard(vec![donut_spec(ChartKey::AppProtocolMix, "app_proto")]);

    dash.refresh();
    let gate = gates.take_field("app_proto").await;
    assert!(gate.stream().send(rows(&[("dns", 5)])).await);
    assert!(gate.stream().send(rows(&[("dns", 9), ("tls", 2)])).await);
    gate.finish();
    dash.settle().await;

    match dash.registry().config(&ChartKey::AppProtocolMix) {
        Some(ChartConfig::Donut(donut)) => assert_eq!(donut.total, 11),
        other => panic!("expected donut, got {other:?}"),
    }
}

#[tokio::test]
async fn test_empty_histogram_shows_no_data_and_clears_loading() {
    let (mut dash, mut gates, _factory) = dashboard(vec![line_spec(ChartKey::EventsOverTime)]);

    dash.refresh();
    assert!(dash.any_loading());
    let gate = gates.take(|c| matches!(c, Call::Time(_))).await;
    gate.reply(Answer::Time(Ok(TimeHistogram::default())));
    dash.settle().await;

    assert!(!dash.is_loading(&ChartKey::EventsOverTime));
    assert!(!dash.any_loading());
    assert_eq!(dash.phase(&ChartKey::EventsOverTime), ChartPhase::Empty);
    match dash.registry().config(&ChartKey::EventsOverTime) {
        Some(ChartConfig::Notice(notice)) => assert_eq!(notice.notice, Notice::Empty),
        other => panic!("expected no-data notice, got {other:?}"),
    }
}

#[tokio::test]
async fn test_empty_result_replaces_stale_content() {
    let (mut dash, mut gates, _factory) = dashboard(vec![bar_spec(
        ChartKey::TopDestIps,
        "dest_ip",
        EventRestriction::Any,
    )]);

    dash.refresh();
    gates
        .take_field("dest_ip")
        .await
        .reply(Answer::Rows(Ok(rows(&[("8.8.8.8", 7)]))));
    dash.settle().await;
    assert!(matches!(
        dash.registry().config(&ChartKey::TopDestIps),
        Some(ChartConfig::Bar(_))
    ));

    dash.add_token("dest_ip:1.1.1.1");
    gates
        .take_field("dest_ip")
        .await
        .reply(Answer::Rows(Ok(rows(&[]))));
    dash.settle().await;
    assert!(matches!(
        dash.registry().config(&ChartKey::TopDestIps),
        Some(ChartConfig::Notice(_))
    ));
}

#[tokio::test]
async fn test_failure_is_isolated_to_its_chart() {
    let (mut dash, mut gates, _factory) = dashboard(vec![
        bar_spec(ChartKey::TopSourceIps, "src_ip", EventRestriction::Any),
        bar_spec(ChartKey::TopDestIps, "dest_ip", EventRestriction::Any),
        bar_spec(ChartKey::TopDestPorts, "dest_port", EventRestriction::Any),
    ]);

    dash.refresh();
    let src = gates.take_field("src_ip").await;
    let dest = gates.take_field("dest_ip").await;
    let port = gates.take_field("dest_port").await;
    src.reply(Answer::Rows(Err(QueryError::Transport("connection reset".into()))));
    port.reply(Answer::Rows(Err(QueryError::Transport("connection reset".into()))));
    dest.reply(Answer::Rows(Ok(rows(&[("8.8.8.8", 7)]))));
    dash.settle().await;

    assert_eq!(dash.phase(&ChartKey::TopSourceIps), ChartPhase::Error);
    assert_eq!(dash.phase(&ChartKey::TopDestIps), ChartPhase::Complete);
    match dash.registry().config(&ChartKey::TopSourceIps) {
        Some(ChartConfig::Notice(notice)) => {
            assert!(matches!(notice.notice, Notice::Failed(_)));
        }
        other => panic!("expected failed notice, got {other:?}"),
    }
    let (labels, _) = bar_data(dash.registry().config(&ChartKey::TopDestIps));
    assert_eq!(labels, vec!["8.8.8.8"]);
    // Two transport failures in one cycle raise one banner.
    assert_eq!(dash.notifications().len(), 1);

    // The engine stays usable after failures.
    assert!(dash.add_token("proto:TCP").is_some());
    gates.answer_empty(3).await;
    dash.settle().await;
    assert!(!dash.any_loading());
}

#[tokio::test(start_paused = true)]
async fn test_timeout_fails_only_the_slow_chart() {
    let settings = DashboardSettings {
        query_timeout_secs: 2,
        ..DashboardSettings::default()
    };
    let (mut dash, mut gates, _factory) = dashboard_with(
        vec![
            bar_spec(ChartKey::TopSourceIps, "src_ip", EventRestriction::Any),
            bar_spec(ChartKey::TopDestIps, "dest_ip", EventRestriction::Any),
        ],
        settings,
    );

    let generation = dash.refresh();
    let _slow = gates.take_field("src_ip").await;
    gates
        .take_field("dest_ip")
        .await
        .reply(Answer::Rows(Ok(rows(&[("8.8.8.8", 1)]))));
    dash.settle().await;

    assert_eq!(dash.generation(), generation);
    assert_eq!(dash.phase(&ChartKey::TopSourceIps), ChartPhase::Error);
    assert_eq!(dash.phase(&ChartKey::TopDestIps), ChartPhase::Complete);
    let notes = dash.notifications().list();
    assert_eq!(notes.len(), 1);
    assert_eq!(notes[0].category, "timeout");
}

#[tokio::test]
async fn test_shape_mismatch_skips_update() {
    let (mut dash, mut gates, factory) = dashboard(vec![ChartSpec {
        key: ChartKey::EventsOverTime,
        query: ChartQuery::TimeHistogram {
            restriction: EventRestriction::Any,
        },
        presentation: Presentation::Bar,
    }]);

    dash.refresh();
    let gate = gates.take(|c| matches!(c, Call::Time(_))).await;
    gate.reply(Answer::Time(Ok(TimeHistogram {
        data: vec![sensordash_core::types::TimeBucket {
            time: chrono::Utc::now(),
            count: 3,
        }],
    })));
    dash.settle().await;

    assert!(!dash.any_loading());
    assert!(dash.registry().config(&ChartKey::EventsOverTime).is_none());
    assert_eq!(factory.log.lock().unwrap().total_live(), 0);
    assert!(dash.notifications().is_empty());
}

#[tokio::test]
async fn test_unchanged_mutation_does_not_refresh() {
    let (mut dash, mut gates, _factory) = dashboard(vec![line_spec(ChartKey::EventsOverTime)]);

    let g1 = dash.add_token("alert.signature:\"ET SCAN\"").unwrap();
    assert_eq!(dash.add_token("alert.signature:\"ET SCAN\""), None);
    assert_eq!(dash.remove_token("not-there"), None);
    assert_eq!(dash.set_sensor(None), None);
    assert_eq!(dash.generation(), g1);
    assert_eq!(dash.filters().tokens().len(), 1);

    gates.answer_empty(1).await;
    dash.settle().await;
}

#[tokio::test]
async fn test_teardown_destroys_every_visual_once() {
    let (mut dash, mut gates, factory) = dashboard(vec![
        bar_spec(ChartKey::TopSourceIps, "src_ip", EventRestriction::Any),
        line_spec(ChartKey::EventsOverTime),
    ]);

    dash.refresh();
    let src = gates.take_field("src_ip").await;
    src.reply(Answer::Rows(Ok(rows(&[("10.0.0.1", 1)]))));
    gates.answer_empty(1).await;
    dash.settle().await;
    assert_eq!(factory.log.lock().unwrap().total_live(), 2);

    dash.teardown();
    assert!(dash.registry().is_empty());
    assert_eq!(factory.log.lock().unwrap().total_live(), 0);
    drop(dash);
    // Dropping after teardown must not destroy anything a second time.
    let log = factory.log.lock().unwrap();
    let destroyed = log
        .events
        .iter()
        .filter(|e| matches!(e, common::SinkEvent::Destroyed { .. }))
        .count();
    assert_eq!(destroyed, 2);
}

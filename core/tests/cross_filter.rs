//! Cross-filtering: clicks on rendered charts become filter tokens and start
//! the next cycle; sparklines follow the current top signatures.

mod common;

use std::collections::BTreeMap;

use chrono::{TimeZone, Utc};
use pretty_assertions::assert_eq;

use common::{Answer, Call, RecordingFactory, ScriptedBackend, bar_data, bar_spec, rows};
use sensordash_core::charts::{ChartConfig, ChartKey};
use sensordash_core::dashboard::{ChartQuery, ChartSpec, Presentation};
use sensordash_core::filter::{UrlState, parse_fragment, tokenize};
use sensordash_core::query::EventRestriction;
use sensordash_core::types::{
    DashboardSettings, Severity, SeverityBucket, SeverityHistogram, TimeBucket, TimeHistogram,
    TimeRange,
};
use sensordash_core::{Dashboard, ElementHit, Interaction};

fn signatures_dashboard() -> (Dashboard<RecordingFactory>, common::Gates, RecordingFactory) {
    let (backend, gates) = ScriptedBackend::new();
    let factory = RecordingFactory::default();
    let dash = Dashboard::new(backend, factory.clone(), DashboardSettings::default()).with_specs(
        vec![bar_spec(
            ChartKey::TopSignatures,
            "alert.signature",
            EventRestriction::Alerts,
        )],
    );
    (dash, gates, factory)
}

fn one_bucket(count: u64) -> TimeHistogram {
    TimeHistogram {
        data: vec![TimeBucket {
            time: Utc.with_ymd_and_hms(2026, 3, 1, 12, 0, 0).unwrap(),
            count,
        }],
    }
}

/// Answer every pending sparkline request with a one-bucket histogram.
async fn answer_sparklines(gates: &mut common::Gates, signatures: &[&str]) {
    for signature in signatures {
        let phrase = format!("alert.signature:\"{signature}\"");
        let gate = gates
            .take(|c| matches!(c, Call::Time(_)) && c.query_string().contains(&phrase))
            .await;
        gate.reply(Answer::Time(Ok(one_bucket(1))));
    }
}

#[tokio::test]
async fn test_top_signatures_on_last_hour() {
    let (mut dash, mut gates, _factory) = signatures_dashboard();

    let generation = dash.set_time_range(TimeRange::Hour1).unwrap();
    let gate = gates.take_field("alert.signature").await;
    match &gate.call {
        Call::Aggregate(desc) => {
            assert_eq!(desc.time_range, TimeRange::Hour1);
            assert_eq!(desc.query_string, "event_type:alert");
        }
        other => panic!("expected an aggregation, got {other:?}"),
    }
    gate.reply(Answer::Rows(Ok(rows(&[("ET SCAN", 42)]))));
    dash.process_next().await;

    // The sparkline for the only signature is scoped to alerts and to it.
    let spark = gates.take(|c| matches!(c, Call::Time(_))).await;
    match &spark.call {
        Call::Time(req) => {
            assert_eq!(req.event_type.as_deref(), Some("alert"));
            assert_eq!(req.query_string, r#"alert.signature:"ET SCAN""#);
            assert_eq!(req.time_range, TimeRange::Hour1);
        }
        other => panic!("expected a time histogram, got {other:?}"),
    }
    spark.reply(Answer::Time(Ok(one_bucket(42))));
    dash.settle().await;

    assert_eq!(dash.generation(), generation);
    let (labels, values) = bar_data(dash.registry().config(&ChartKey::TopSignatures));
    assert_eq!(labels, vec!["ET SCAN"]);
    assert_eq!(values, vec![42]);
    assert!(matches!(
        dash.registry()
            .config(&ChartKey::Sparkline("ET SCAN".into())),
        Some(ChartConfig::Line(_))
    ));
}

#[tokio::test]
async fn test_bar_click_adds_token_and_refreshes() {
    let (mut dash, mut gates, _factory) = signatures_dashboard();
    let mut url = dash.subscribe_url();

    let g1 = dash.refresh();
    gates
        .take_field("alert.signature")
        .await
        .reply(Answer::Rows(Ok(rows(&[("ET SCAN", 42)]))));
    dash.process_next().await;
    answer_sparklines(&mut gates, &["ET SCAN"]).await;
    dash.settle().await;

    let click = Interaction::new(ChartKey::TopSignatures, ElementHit::Bar(0));
    let g2 = dash.interact(&click).unwrap();
    assert_eq!(g2.value(), g1.value() + 1);
    assert_eq!(dash.filters().tokens(), [r#"alert.signature:"ET SCAN""#]);
    assert!(url.has_changed().unwrap());
    assert_eq!(url.borrow_and_update().q, r#"alert.signature:"ET SCAN""#);

    let gate = gates.take_field("alert.signature").await;
    assert_eq!(
        gate.call.query_string(),
        r#"alert.signature:"ET SCAN" event_type:alert"#
    );

    // Clicking the same bar again changes nothing.
    assert_eq!(dash.interact(&click), None);
    assert_eq!(dash.generation(), g2);

    gate.reply(Answer::Rows(Ok(rows(&[("ET SCAN", 42)]))));
    dash.process_next().await;
    answer_sparklines(&mut gates, &["ET SCAN"]).await;
    dash.settle().await;
    assert!(!dash.any_loading());
}

#[tokio::test]
async fn test_click_outside_any_element_is_ignored() {
    let (mut dash, mut gates, _factory) = signatures_dashboard();

    dash.refresh();
    gates
        .take_field("alert.signature")
        .await
        .reply(Answer::Rows(Ok(rows(&[("ET SCAN", 42)]))));
    dash.process_next().await;
    answer_sparklines(&mut gates, &["ET SCAN"]).await;
    dash.settle().await;

    let generation = dash.generation();
    let far = Interaction::new(ChartKey::TopSignatures, ElementHit::Bar(7));
    assert_eq!(dash.interact(&far), None);
    let unknown = Interaction::new(ChartKey::TopDestIps, ElementHit::Bar(0));
    assert_eq!(dash.interact(&unknown), None);
    // Sparkline points carry no filter target.
    let spark = Interaction::new(ChartKey::Sparkline("ET SCAN".into()), ElementHit::Point(0));
    assert_eq!(dash.interact(&spark), None);
    assert_eq!(dash.generation(), generation);
    assert!(dash.filters().tokens().is_empty());
}

#[tokio::test]
async fn test_one_sparkline_per_top_signature() {
    let (mut dash, mut gates, factory) = signatures_dashboard();

    dash.refresh();
    gates
        .take_field("alert.signature")
        .await
        .reply(Answer::Rows(Ok(rows(&[("A", 5), ("B", 3)]))));
    dash.process_next().await;
    answer_sparklines(&mut gates, &["A", "B"]).await;
    dash.settle().await;
    {
        let log = factory.log.lock().unwrap();
        assert_eq!(
            log.live_keys(),
            vec![
                ChartKey::TopSignatures,
                ChartKey::Sparkline("A".into()),
                ChartKey::Sparkline("B".into()),
            ]
        );
    }

    dash.add_token("src_ip:10.0.0.1");
    gates
        .take_field("alert.signature")
        .await
        .reply(Answer::Rows(Ok(rows(&[("B", 4), ("C", 1)]))));
    dash.process_next().await;
    answer_sparklines(&mut gates, &["B", "C"]).await;
    dash.settle().await;

    let log = factory.log.lock().unwrap();
    assert_eq!(
        log.live_keys(),
        vec![
            ChartKey::TopSignatures,
            ChartKey::Sparkline("B".into()),
            ChartKey::Sparkline("C".into()),
        ]
    );
    for key in log.live_keys() {
        assert_eq!(log.live_count(&key), 1, "{key}");
    }
    let mut kept: Vec<&str> = dash.sparklines().signatures().collect();
    kept.sort();
    assert_eq!(kept, vec!["B", "C"]);
}

#[tokio::test]
async fn test_failed_signatures_drop_sparklines() {
    let (mut dash, mut gates, factory) = signatures_dashboard();

    dash.refresh();
    gates
        .take_field("alert.signature")
        .await
        .reply(Answer::Rows(Ok(rows(&[("A", 5)]))));
    dash.process_next().await;
    answer_sparklines(&mut gates, &["A"]).await;
    dash.settle().await;
    assert!(dash.sparklines().contains("A"));

    dash.add_token("proto:UDP");
    gates
        .take_field("alert.signature")
        .await
        .reply(Answer::Rows(Err(
            sensordash_core::QueryError::Transport("down".into()),
        )));
    dash.settle().await;

    assert!(dash.sparklines().is_empty());
    assert_eq!(dash.tracked_charts(), 1);
    let log = factory.log.lock().unwrap();
    assert_eq!(log.live_keys(), vec![ChartKey::TopSignatures]);
}

#[tokio::test]
async fn test_rotating_signatures_do_not_accumulate_state() {
    let (mut dash, mut gates, _factory) = signatures_dashboard();

    for cycle in 0..20 {
        let signature = format!("ET RULE {cycle}");
        dash.refresh();
        gates
            .take_field("alert.signature")
            .await
            .reply(Answer::Rows(Ok(rows(&[(signature.as_str(), 1)]))));
        dash.process_next().await;
        answer_sparklines(&mut gates, &[signature.as_str()]).await;
        dash.settle().await;

        assert_eq!(dash.tracked_charts(), 2, "cycle {cycle}");
        assert_eq!(dash.registry().len(), 2, "cycle {cycle}");
    }
}

#[tokio::test]
async fn test_severity_legend_click_filters_by_level() {
    let (backend, mut gates) = ScriptedBackend::new();
    let mut dash = Dashboard::new(backend, RecordingFactory::default(), DashboardSettings::default())
        .with_specs(vec![ChartSpec {
            key: ChartKey::AlertsBySeverity,
            query: ChartQuery::SeverityHistogram,
            presentation: Presentation::StackedLine,
        }]);

    dash.refresh();
    let gate = gates.take(|c| matches!(c, Call::Severity(_))).await;
    match &gate.call {
        Call::Severity(req) => assert_eq!(req.event_type.as_deref(), Some("alert")),
        other => panic!("expected a severity histogram, got {other:?}"),
    }
    let counts: BTreeMap<Severity, u64> = Severity::ALL.iter().map(|s| (*s, 2)).collect();
    gate.reply(Answer::Severity(Ok(SeverityHistogram {
        buckets: vec![SeverityBucket {
            time: Utc.with_ymd_and_hms(2026, 3, 1, 12, 0, 0).unwrap(),
            counts,
        }],
    })));
    dash.settle().await;

    let medium = Interaction::new(ChartKey::AlertsBySeverity, ElementHit::Legend(1));
    assert!(dash.interact(&medium).is_some());
    assert_eq!(dash.filters().tokens(), ["alert.severity:2"]);
    let next = gates.take(|c| matches!(c, Call::Severity(_))).await;
    assert_eq!(next.call.query_string(), "alert.severity:2");
}

#[tokio::test]
async fn test_awkward_values_round_trip_through_clicks() {
    let (backend, mut gates) = ScriptedBackend::new();
    let mut dash = Dashboard::new(backend, RecordingFactory::default(), DashboardSettings::default())
        .with_specs(vec![bar_spec(
            ChartKey::TopDnsQueries,
            "dns.rrname",
            EventRestriction::Dns,
        )]);
    let awkward = r#"say "hi" \ (now) or:later"#;

    dash.refresh();
    gates
        .take_field("dns.rrname")
        .await
        .reply(Answer::Rows(Ok(rows(&[(awkward, 1), ("plain.example", 1)]))));
    dash.settle().await;

    dash.interact(&Interaction::new(ChartKey::TopDnsQueries, ElementHit::Bar(0)))
        .unwrap();
    let tokens = dash.filters().tokens().to_vec();
    assert_eq!(tokens.len(), 1);
    let parsed = parse_fragment(&tokens[0]);
    assert_eq!(parsed.field.as_deref(), Some("dns.rrname"));
    assert_eq!(parsed.value, awkward);

    // The token survives the URL and re-tokenizes to itself.
    let url = UrlState::from_query_string(&dash.filters().url().to_query_string());
    assert_eq!(tokenize(&url.q), tokens);
}

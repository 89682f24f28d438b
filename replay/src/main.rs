use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;
use std::time::Duration;

use clap::Parser;
use serde_json::json;
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::filter::EnvFilter;

use sensordash_core::MemoryBackend;
use sensordash_core::context::{load_settings, load_settings_file};
use sensordash_replay::{Click, Frame, Script, render_chart, run};
use sensordash_types::{DashboardSettings, TimeRange};

#[derive(Parser)]
#[command(version, about = "Replay EVE JSON through the dashboard and print every chart")]
struct Cli {
    /// Newline-delimited EVE JSON file.
    #[arg(short, long)]
    events: PathBuf,
    /// Time range preset (15m, 1h, 6h, 24h, 3d, 7d, 30d) or `start..end`.
    #[arg(short, long)]
    range: Option<TimeRange>,
    #[arg(long)]
    sensor: Option<String>,
    /// Replace the free-text query.
    #[arg(short, long)]
    query: Option<String>,
    /// Add a filter fragment, e.g. `proto:TCP`. Repeatable.
    #[arg(short, long)]
    add: Vec<String>,
    /// Click a chart element, e.g. `top-signatures=bar:0`. Repeatable, applied in order.
    #[arg(short, long)]
    click: Vec<Click>,
    /// Settings TOML; the per-user settings store applies when omitted.
    #[arg(long)]
    settings: Option<PathBuf>,
    /// Simulated backend latency per request.
    #[arg(long, default_value_t = 0)]
    latency_ms: u64,
    /// Events per streamed aggregation batch.
    #[arg(long)]
    stream_batch: Option<usize>,
    /// Skip clicks that change nothing instead of failing.
    #[arg(long)]
    lenient: bool,
    /// Print frames as JSON instead of text charts.
    #[arg(long)]
    json: bool,
    /// Write logs to a daily-rolling file in this directory instead of stderr.
    #[arg(long)]
    log_dir: Option<PathBuf>,
}

/// Initialize logging, writing to `log_dir` if given, otherwise stderr.
fn init_logging(log_dir: Option<&PathBuf>) -> Option<WorkerGuard> {
    let filter = EnvFilter::builder()
        .with_default_directive(tracing::Level::INFO.into())
        .from_env_lossy();

    if let Some(dir) = log_dir {
        let appender = tracing_appender::rolling::daily(dir, "sensordash-replay.log");
        let (writer, guard) = tracing_appender::non_blocking(appender);
        tracing_subscriber::fmt()
            .with_env_filter(filter)
            .with_target(true)
            .with_ansi(false)
            .with_writer(writer)
            .init();
        return Some(guard);
    }

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(true)
        .with_writer(std::io::stderr)
        .init();
    None
}

#[tokio::main(flavor = "current_thread")]
async fn main() -> ExitCode {
    let cli = Cli::parse();
    let _guard = init_logging(cli.log_dir.as_ref());

    let settings = match &cli.settings {
        Some(path) => match load_settings_file(path) {
            Ok(settings) => settings,
            Err(e) => {
                tracing::error!(error = %e, "Failed to load settings");
                return ExitCode::FAILURE;
            }
        },
        None => load_settings().unwrap_or_else(|e| {
            tracing::warn!(error = %e, "Settings store unavailable; using defaults");
            DashboardSettings::default()
        }),
    };

    let text = match std::fs::read_to_string(&cli.events) {
        Ok(text) => text,
        Err(e) => {
            tracing::error!(path = %cli.events.display(), error = %e, "Failed to read events");
            return ExitCode::FAILURE;
        }
    };
    let mut backend = match MemoryBackend::from_ndjson(&text) {
        Ok(backend) => backend,
        Err(e) => {
            tracing::error!(path = %cli.events.display(), error = %e, "Malformed EVE JSON");
            return ExitCode::FAILURE;
        }
    };
    if cli.latency_ms > 0 {
        backend = backend.with_latency(Duration::from_millis(cli.latency_ms));
    }
    if let Some(batch) = cli.stream_batch {
        backend = backend.with_stream_batch(batch);
    }
    tracing::info!(events = backend.len(), now = %backend.now(), "Loaded events");

    let script = Script {
        time_range: cli.range,
        sensor: cli.sensor,
        query: cli.query,
        add: cli.add,
        clicks: cli.click,
    };
    let frames = match run(&script, Arc::new(backend), settings, cli.lenient).await {
        Ok(frames) => frames,
        Err(e) => {
            tracing::error!(error = %e, "Replay failed");
            return ExitCode::FAILURE;
        }
    };

    for frame in &frames {
        if cli.json {
            println!("{}", frame_json(frame));
        } else {
            print_frame(frame);
        }
    }
    ExitCode::SUCCESS
}

fn print_frame(frame: &Frame) {
    let snapshot = &frame.snapshot;
    println!(
        "### {} ({}, range {}, q={:?})",
        frame.step, snapshot.generation, snapshot.time_range, snapshot.url.q
    );
    for (key, config) in &snapshot.charts {
        println!("{}", render_chart(key, config));
    }
    for notification in &snapshot.notifications {
        println!("! {}", notification.message);
    }
}

fn frame_json(frame: &Frame) -> serde_json::Value {
    let snapshot = &frame.snapshot;
    json!({
        "step": frame.step,
        "generation": snapshot.generation.value(),
        "time_range": snapshot.time_range,
        "url": snapshot.url,
        "charts": snapshot
            .charts
            .iter()
            .map(|(key, config)| json!({ "id": key.id(), "config": config }))
            .collect::<Vec<_>>(),
        "notifications": snapshot
            .notifications
            .iter()
            .map(|n| n.message.as_str())
            .collect::<Vec<_>>(),
    })
}

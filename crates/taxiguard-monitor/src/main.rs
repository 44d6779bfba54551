//! taxiguard-monitor: airport surface conflict and clearance compliance
//! monitor.
//!
//! Consumes typed position reports and clearance records as NDJSON, either
//! replayed from files or streamed on stdin, and emits sequenced alert
//! records on stdout for an external renderer or logger.

use std::io::BufRead;
use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::Parser;
use tokio::sync::{broadcast, mpsc};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use taxiguard_core::SurfaceMap;
use taxiguard_monitor::config::Config;
use taxiguard_monitor::engine::TickEngine;
use taxiguard_monitor::feed::{self, CallsignMap, InputRecord};
use taxiguard_monitor::live::run_live;
use taxiguard_monitor::replay::run_replay;
use taxiguard_monitor::state::AppState;

#[derive(Debug, Parser)]
#[command(
    name = "taxiguard-monitor",
    about = "Airport surface conflict and clearance compliance monitor"
)]
struct Args {
    /// Surface feature map: JSON array of runway/taxiway/hold-line features
    #[arg(long)]
    surface: PathBuf,

    /// Replay a recorded NDJSON stream instead of reading stdin
    #[arg(long)]
    replay: Option<PathBuf>,

    /// Additional clearance NDJSON file merged into the replay
    #[arg(long)]
    clearances: Option<PathBuf>,

    /// Spoken-callsign to tail-number mapping (JSON object)
    #[arg(long)]
    callsigns: Option<PathBuf>,

    /// Tick step in seconds (overrides TAXIGUARD_TICK_S)
    #[arg(long)]
    tick_s: Option<f64>,
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::registry()
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .with(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive("taxiguard_monitor=info".parse()?),
        )
        .init();

    let args = Args::parse();
    let mut config = Config::from_env();
    if let Some(tick_s) = args.tick_s {
        config.tick_step_s = tick_s;
    }

    let features = feed::load_surface(&args.surface)
        .with_context(|| format!("loading surface map {}", args.surface.display()))?;
    tracing::info!("loaded {} surface feature(s)", features.len());
    let surface = Arc::new(SurfaceMap::new(features));

    let callsigns = match &args.callsigns {
        Some(path) => CallsignMap::load(path)
            .with_context(|| format!("loading callsign map {}", path.display()))?,
        None => CallsignMap::default(),
    };

    let engine = TickEngine::new(config.rules.clone(), surface);

    match &args.replay {
        Some(path) => replay_mode(engine, &config, &callsigns, path, args.clearances.as_deref()),
        None => live_mode(engine, &config, callsigns).await,
    }
}

fn replay_mode(
    mut engine: TickEngine,
    config: &Config,
    callsigns: &CallsignMap,
    records: &std::path::Path,
    extra_clearances: Option<&std::path::Path>,
) -> Result<()> {
    let (reports, mut clearances) = feed::load_records(records)
        .with_context(|| format!("loading replay records {}", records.display()))?;
    if let Some(path) = extra_clearances {
        let (_, extra) = feed::load_records(path)
            .with_context(|| format!("loading clearances {}", path.display()))?;
        clearances.extend(extra);
    }
    let clearances = clearances
        .into_iter()
        .map(|c| callsigns.normalize(c))
        .collect();

    tracing::info!("replaying {} report(s)", reports.len());
    let alerts = run_replay(&mut engine, reports, clearances, config.tick_step_s);
    for alert in &alerts {
        println!("{}", serde_json::to_string(alert)?);
    }
    Ok(())
}

async fn live_mode(engine: TickEngine, config: &Config, callsigns: CallsignMap) -> Result<()> {
    let state = Arc::new(AppState::new());
    let (input_tx, input_rx) = mpsc::channel::<InputRecord>(1024);
    let (shutdown_tx, shutdown_rx) = broadcast::channel::<()>(1);

    // Blocking stdin reader; each line is one typed record.
    tokio::task::spawn_blocking(move || {
        let stdin = std::io::stdin();
        for line in stdin.lock().lines() {
            let Ok(line) = line else { break };
            let line = line.trim();
            if line.is_empty() {
                continue;
            }
            match feed::parse_line(line) {
                Ok(InputRecord::Clearance(clearance)) => {
                    let record = InputRecord::Clearance(callsigns.normalize(clearance));
                    if input_tx.blocking_send(record).is_err() {
                        break;
                    }
                }
                Ok(record) => {
                    if input_tx.blocking_send(record).is_err() {
                        break;
                    }
                }
                Err(err) => {
                    tracing::error!("rejecting malformed input line: {err}");
                }
            }
        }
    });

    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            let _ = shutdown_tx.send(());
        }
    });

    tracing::info!("live monitoring started");
    run_live(
        engine,
        state,
        input_rx,
        config.tick_step_s,
        shutdown_rx,
        |alert| match serde_json::to_string(alert) {
            Ok(line) => println!("{line}"),
            Err(err) => tracing::error!("alert serialization failed: {err}"),
        },
    )
    .await;

    Ok(())
}

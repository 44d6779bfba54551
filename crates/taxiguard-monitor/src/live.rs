//! Live driver: asynchronous ingestion feeding the single logical clock.
//!
//! Records arrive on an mpsc channel, the ticker fires the shared tick
//! logic, and shutdown always completes the in-flight tick's barrier before
//! stopping, never truncating mid-evaluation.

use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use tokio::sync::{broadcast, mpsc};
use tokio::time::interval;

use taxiguard_core::AlertRecord;

use crate::engine::{TickEngine, TickOutcome};
use crate::feed::InputRecord;
use crate::state::AppState;

fn now_s() -> f64 {
    Utc::now().timestamp_millis() as f64 / 1000.0
}

fn enqueue(engine: &mut TickEngine, record: InputRecord) {
    match record {
        InputRecord::Report(report) => engine.queue_report(report),
        InputRecord::Clearance(clearance) => engine.queue_clearance(clearance),
    }
}

fn publish(state: &AppState, outcome: &TickOutcome, on_alert: &mut impl FnMut(&AlertRecord)) {
    state.publish_states(&outcome.states, &outcome.evicted);
    state.publish_alerts(&outcome.alerts);
    state.set_last_tick_s(outcome.time_s);
    for alert in &outcome.alerts {
        on_alert(alert);
    }
}

/// Run the live loop until shutdown or end of input.
pub async fn run_live(
    mut engine: TickEngine,
    state: Arc<AppState>,
    mut inputs: mpsc::Receiver<InputRecord>,
    tick_step_s: f64,
    mut shutdown: broadcast::Receiver<()>,
    mut on_alert: impl FnMut(&AlertRecord),
) {
    let mut ticker = interval(Duration::from_secs_f64(tick_step_s.max(0.05)));

    loop {
        tokio::select! {
            _ = shutdown.recv() => {
                let outcome = engine.tick(now_s());
                publish(&state, &outcome, &mut on_alert);
                tracing::info!("live loop shutting down");
                break;
            }
            received = inputs.recv() => {
                match received {
                    Some(record) => enqueue(&mut engine, record),
                    None => {
                        // Input closed: finish the current tick, then stop.
                        let outcome = engine.tick(now_s());
                        publish(&state, &outcome, &mut on_alert);
                        tracing::info!("input stream ended");
                        break;
                    }
                }
            }
            _ = ticker.tick() => {
                let outcome = engine.tick(now_s());
                publish(&state, &outcome, &mut on_alert);
            }
        }
    }
}

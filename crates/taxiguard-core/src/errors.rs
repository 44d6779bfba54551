//! Error types surfaced by the evaluation pipeline.

use thiserror::Error;

/// Errors raised by the trajectory estimator.
#[derive(Debug, Error)]
pub enum TrackError {
    /// Report is older than the last accepted fix for the aircraft.
    /// The existing track state is left untouched.
    #[error("stale report for {aircraft_id}: t={report_s:.3} precedes last fix at t={last_s:.3}")]
    StaleReport {
        aircraft_id: String,
        report_s: f64,
        last_s: f64,
    },

    /// Prediction request beyond the configured horizon.
    #[error("prediction horizon {requested_s}s exceeds configured maximum {max_s}s")]
    HorizonExceeded { requested_s: f64, max_s: f64 },

    #[error("no tracked state for aircraft '{0}'")]
    UnknownAircraft(String),
}

/// Errors raised by surface map lookups.
#[derive(Debug, Error)]
pub enum SurfaceError {
    /// A clearance or query named a feature id absent from the loaded map.
    #[error("unknown surface feature reference '{0}'")]
    UnknownFeatureReference(String),
}

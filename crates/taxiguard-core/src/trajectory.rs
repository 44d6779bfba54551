//! Per-aircraft track estimation and constant-turn extrapolation.
//!
//! The estimator is the single owner of mutable track state. Everything
//! downstream works from `AircraftState` snapshots, so there is exactly one
//! live track per aircraft identifier at any time.

use std::collections::{BTreeMap, HashMap, VecDeque};

use serde::{Deserialize, Serialize};

use crate::errors::TrackError;
use crate::models::{AircraftState, Fix, PositionReport};
use crate::rules::SafetyRules;
use crate::spatial;

/// Fixes retained per track for extrapolation context.
const HISTORY_LEN: usize = 8;

/// One predicted sample along an extrapolated path.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct TrajectoryPoint {
    pub time_offset_s: f64,
    pub lat: f64,
    pub lon: f64,
    pub altitude_m: f64,
}

/// A bounded, lazily evaluated extrapolation of one aircraft state.
///
/// Holds the origin snapshot and sampling parameters only; points are
/// produced on demand by [`PredictedTrajectory::points`], which can be
/// called any number of times and always yields the same sequence.
#[derive(Debug, Clone)]
pub struct PredictedTrajectory {
    origin: AircraftState,
    horizon_s: f64,
    step_s: f64,
}

impl PredictedTrajectory {
    /// Extrapolate directly from a state snapshot. Constant ground speed,
    /// constant turn rate, constant vertical rate.
    pub fn from_state(state: &AircraftState, horizon_s: f64, step_s: f64) -> Self {
        Self {
            origin: state.clone(),
            horizon_s,
            step_s: step_s.max(1e-3),
        }
    }

    pub fn horizon_s(&self) -> f64 {
        self.horizon_s
    }

    /// Restartable iterator over samples at t = 0, step, 2·step, …, horizon.
    pub fn points(&self) -> TrajectoryIter<'_> {
        TrajectoryIter {
            trajectory: self,
            elapsed_s: 0.0,
            lat: self.origin.lat,
            lon: self.origin.lon,
            altitude_m: self.origin.altitude_m,
            heading_deg: self.origin.track_deg,
            done: false,
        }
    }
}

pub struct TrajectoryIter<'a> {
    trajectory: &'a PredictedTrajectory,
    elapsed_s: f64,
    lat: f64,
    lon: f64,
    altitude_m: f64,
    heading_deg: f64,
    done: bool,
}

impl Iterator for TrajectoryIter<'_> {
    type Item = TrajectoryPoint;

    fn next(&mut self) -> Option<TrajectoryPoint> {
        if self.done {
            return None;
        }

        let point = TrajectoryPoint {
            time_offset_s: self.elapsed_s,
            lat: self.lat,
            lon: self.lon,
            altitude_m: self.altitude_m,
        };

        let origin = &self.trajectory.origin;
        let step = self.trajectory.step_s;
        let next_t = self.elapsed_s + step;
        if next_t > self.trajectory.horizon_s + 1e-9 {
            self.done = true;
        } else {
            // Heading advances at the constant turn rate; the position step
            // uses the heading at the middle of the interval to keep the arc
            // symmetric.
            let mid_heading = self.heading_deg + origin.turn_rate_deg_s * step / 2.0;
            let (lat, lon) = spatial::offset_by_bearing(
                self.lat,
                self.lon,
                origin.ground_speed_mps * step,
                mid_heading.to_radians(),
            );
            self.lat = lat;
            self.lon = lon;
            self.altitude_m += origin.climb_rate_mps * step;
            self.heading_deg += origin.turn_rate_deg_s * step;
            self.elapsed_s = next_t;
        }

        Some(point)
    }
}

/// Mutable per-aircraft track, private to the estimator.
#[derive(Debug, Clone)]
struct Track {
    aircraft_id: String,
    latest: Fix,
    last_update: chrono::DateTime<chrono::Utc>,
    ground_speed_mps: f64,
    track_deg: f64,
    climb_rate_mps: f64,
    turn_rate_deg_s: f64,
    history: VecDeque<Fix>,
}

impl Track {
    fn from_report(report: &PositionReport) -> Self {
        let latest = Fix {
            time_s: report.timestamp_s(),
            lat: report.lat,
            lon: report.lon,
            altitude_m: report.altitude_m,
        };
        let mut history = VecDeque::with_capacity(HISTORY_LEN);
        history.push_back(latest);
        Self {
            aircraft_id: report.aircraft_id.clone(),
            latest,
            last_update: report.timestamp,
            ground_speed_mps: report.ground_speed_mps,
            track_deg: report.track_deg,
            climb_rate_mps: 0.0,
            turn_rate_deg_s: 0.0,
            history,
        }
    }

    fn snapshot(&self, rules: &SafetyRules) -> AircraftState {
        let prev_fix = if self.history.len() >= 2 {
            self.history.get(self.history.len() - 2).copied()
        } else {
            None
        };
        AircraftState {
            aircraft_id: self.aircraft_id.clone(),
            lat: self.latest.lat,
            lon: self.latest.lon,
            altitude_m: self.latest.altitude_m,
            ground_speed_mps: self.ground_speed_mps,
            track_deg: self.track_deg,
            climb_rate_mps: self.climb_rate_mps,
            turn_rate_deg_s: self.turn_rate_deg_s,
            on_ground: self.latest.altitude_m <= rules.ground_ceiling_m,
            prev_fix,
            last_update: self.last_update,
        }
    }
}

/// Owns all tracked aircraft state and produces bounded predictions.
pub struct TrajectoryEstimator {
    rules: SafetyRules,
    tracks: HashMap<String, Track>,
}

impl TrajectoryEstimator {
    pub fn new(rules: SafetyRules) -> Self {
        Self {
            rules,
            tracks: HashMap::new(),
        }
    }

    pub fn tracked_count(&self) -> usize {
        self.tracks.len()
    }

    /// Fold a new report into the aircraft's track and return the updated
    /// snapshot. Out-of-order reports are rejected with
    /// [`TrackError::StaleReport`] and leave the track untouched.
    pub fn update(&mut self, report: &PositionReport) -> Result<AircraftState, TrackError> {
        let t = report.timestamp_s();

        let Some(track) = self.tracks.get_mut(&report.aircraft_id) else {
            let track = Track::from_report(report);
            let snapshot = track.snapshot(&self.rules);
            self.tracks.insert(report.aircraft_id.clone(), track);
            return Ok(snapshot);
        };

        let dt = t - track.latest.time_s;
        if dt < 0.0 {
            return Err(TrackError::StaleReport {
                aircraft_id: report.aircraft_id.clone(),
                report_s: t,
                last_s: track.latest.time_s,
            });
        }

        let fix = Fix {
            time_s: t,
            lat: report.lat,
            lon: report.lon,
            altitude_m: report.altitude_m,
        };

        if dt <= f64::EPSILON {
            // Duplicate timestamp: refresh the fix, keep the derived rates.
            track.latest = fix;
            if let Some(last) = track.history.back_mut() {
                *last = fix;
            }
            track.last_update = report.timestamp;
            return Ok(track.snapshot(&self.rules));
        }

        // Finite differences over the two most recent fixes, exponentially
        // smoothed so irregular report intervals don't whip the estimate.
        let alpha = self.rules.smoothing_alpha.clamp(0.0, 1.0);
        let travelled_m =
            spatial::haversine_distance(track.latest.lat, track.latest.lon, fix.lat, fix.lon);
        let speed_meas = travelled_m / dt;
        let climb_meas = (fix.altitude_m - track.latest.altitude_m) / dt;
        let heading_meas = if report.ground_speed_mps > 0.0 || report.track_deg != 0.0 {
            report.track_deg
        } else if travelled_m > 1.0 {
            spatial::bearing(track.latest.lat, track.latest.lon, fix.lat, fix.lon)
                .to_degrees()
                .rem_euclid(360.0)
        } else {
            track.track_deg
        };
        let turn_meas = spatial::wrap_deg(heading_meas - track.track_deg) / dt;

        track.ground_speed_mps = alpha * speed_meas + (1.0 - alpha) * track.ground_speed_mps;
        track.climb_rate_mps = alpha * climb_meas + (1.0 - alpha) * track.climb_rate_mps;
        track.turn_rate_deg_s = alpha * turn_meas + (1.0 - alpha) * track.turn_rate_deg_s;
        track.track_deg = heading_meas;

        track.latest = fix;
        track.last_update = report.timestamp;
        if track.history.len() == HISTORY_LEN {
            track.history.pop_front();
        }
        track.history.push_back(fix);

        Ok(track.snapshot(&self.rules))
    }

    /// Extrapolate one aircraft over the requested horizon.
    pub fn predict(
        &self,
        aircraft_id: &str,
        horizon_s: f64,
    ) -> Result<PredictedTrajectory, TrackError> {
        if horizon_s > self.rules.horizon_s + 1e-9 {
            return Err(TrackError::HorizonExceeded {
                requested_s: horizon_s,
                max_s: self.rules.horizon_s,
            });
        }
        let track = self
            .tracks
            .get(aircraft_id)
            .ok_or_else(|| TrackError::UnknownAircraft(aircraft_id.to_string()))?;
        Ok(PredictedTrajectory::from_state(
            &track.snapshot(&self.rules),
            horizon_s,
            self.rules.sample_step_s,
        ))
    }

    /// Snapshot of one tracked aircraft.
    pub fn state(&self, aircraft_id: &str) -> Option<AircraftState> {
        self.tracks
            .get(aircraft_id)
            .map(|track| track.snapshot(&self.rules))
    }

    /// Consistent snapshot of every tracked aircraft, keyed and ordered by
    /// identifier.
    pub fn snapshot(&self) -> BTreeMap<String, AircraftState> {
        self.tracks
            .iter()
            .map(|(id, track)| (id.clone(), track.snapshot(&self.rules)))
            .collect()
    }

    /// Drop tracks silent for longer than the configured timeout. A later
    /// report for an evicted aircraft starts a fresh track.
    pub fn evict_silent(&mut self, now_s: f64) -> Vec<String> {
        let timeout = self.rules.silence_timeout_s;
        let mut evicted: Vec<String> = self
            .tracks
            .iter()
            .filter(|(_, track)| now_s - track.latest.time_s > timeout)
            .map(|(id, _)| id.clone())
            .collect();
        evicted.sort_unstable();
        for id in &evicted {
            self.tracks.remove(id);
        }
        evicted
    }
}

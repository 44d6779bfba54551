//! Core data models for the surface monitor.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// A single position fix for one aircraft, as handed over by the
/// telemetry ingestion collaborator (ADS-B derived).
///
/// Reports for a given aircraft arrive in non-decreasing timestamp order;
/// reports for different aircraft may interleave.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PositionReport {
    #[serde(alias = "plane")]
    pub aircraft_id: String,
    pub timestamp: DateTime<Utc>,
    pub lat: f64,
    pub lon: f64,
    /// Height above field elevation in meters; the ingestion collaborator
    /// subtracts the airfield datum.
    #[serde(default)]
    pub altitude_m: f64,
    #[serde(default)]
    pub ground_speed_mps: f64,
    /// Track angle in degrees, 0 = north, clockwise.
    #[serde(default)]
    pub track_deg: f64,
}

impl PositionReport {
    /// Report time as fractional seconds since the Unix epoch.
    pub fn timestamp_s(&self) -> f64 {
        self.timestamp.timestamp_millis() as f64 / 1000.0
    }
}

/// A time-stamped position sample.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Fix {
    pub time_s: f64,
    pub lat: f64,
    pub lon: f64,
    pub altitude_m: f64,
}

/// Immutable snapshot of one tracked aircraft.
///
/// Produced by the trajectory estimator, which exclusively owns the
/// underlying track; downstream components only ever see copies.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AircraftState {
    pub aircraft_id: String,
    pub lat: f64,
    pub lon: f64,
    pub altitude_m: f64,
    /// Smoothed ground speed in m/s.
    pub ground_speed_mps: f64,
    /// Smoothed track angle in degrees, 0 = north, clockwise.
    pub track_deg: f64,
    /// Smoothed vertical rate in m/s, positive climbing.
    pub climb_rate_mps: f64,
    /// Smoothed heading rate in deg/s, positive clockwise.
    pub turn_rate_deg_s: f64,
    pub on_ground: bool,
    /// The fix accepted before the latest one, for segment crossing tests.
    pub prev_fix: Option<Fix>,
    pub last_update: DateTime<Utc>,
}

impl AircraftState {
    /// Last update time as fractional seconds since the Unix epoch.
    pub fn last_update_s(&self) -> f64 {
        self.last_update.timestamp_millis() as f64 / 1000.0
    }

    /// The latest accepted fix.
    pub fn latest_fix(&self) -> Fix {
        Fix {
            time_s: self.last_update_s(),
            lat: self.lat,
            lon: self.lon,
            altitude_m: self.altitude_m,
        }
    }
}

/// A tower instruction constraining an aircraft's permitted action relative
/// to a surface feature.
///
/// Field names match the schema produced by the external instruction
/// extraction collaborator:
/// `{"plane": <id>, "command": <enum>, "reference": <id>, "time": <float>}`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Clearance {
    #[serde(rename = "plane")]
    pub aircraft_id: String,
    pub command: ClearanceKind,
    /// Referenced surface feature id, e.g. "31C". May be empty for
    /// position holds with no feature attached.
    #[serde(default)]
    pub reference: String,
    /// Validity time, seconds since the Unix epoch.
    pub time: f64,
}

/// Closed set of tower commands this core evaluates. Free-form command
/// strings are mapped to this enum at the ingestion boundary; anything
/// unrecognized is a schema failure there, not here.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ClearanceKind {
    HoldShort,
    HoldPosition,
    ClearToCross,
    #[serde(alias = "LAND")]
    ClearedToLand,
    #[serde(alias = "TAKEOFF")]
    ClearedForTakeoff,
    LineUpAndWait,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn clearance_parses_external_schema() {
        let raw = r#"{"plane": "LXJ560", "command": "HOLD_SHORT", "reference": "31C", "time": 1740494867.06}"#;
        let clearance: Clearance = serde_json::from_str(raw).unwrap();
        assert_eq!(clearance.aircraft_id, "LXJ560");
        assert_eq!(clearance.command, ClearanceKind::HoldShort);
        assert_eq!(clearance.reference, "31C");
        assert!((clearance.time - 1740494867.06).abs() < 1e-6);
    }

    #[test]
    fn clearance_accepts_short_command_aliases() {
        let raw = r#"{"plane": "SWA2504", "command": "LAND", "reference": "31C", "time": 1740494856.48}"#;
        let clearance: Clearance = serde_json::from_str(raw).unwrap();
        assert_eq!(clearance.command, ClearanceKind::ClearedToLand);
    }

    #[test]
    fn report_timestamp_to_seconds() {
        let report = PositionReport {
            aircraft_id: "SWA2504".to_string(),
            timestamp: DateTime::from_timestamp_millis(1_740_494_856_480).unwrap(),
            lat: 41.7868,
            lon: -87.7522,
            altitude_m: 0.0,
            ground_speed_mps: 0.0,
            track_deg: 0.0,
        };
        assert!((report.timestamp_s() - 1_740_494_856.48).abs() < 1e-6);
    }
}

//! Typed-record ingestion: NDJSON decoding and callsign normalization.
//!
//! The monitor consumes validated, typed records only. Parsing raw
//! telemetry file formats and turning tower audio into clearance records
//! are the ingestion collaborators' jobs; anything malformed here is their
//! schema error and fails fast.

use std::collections::BTreeMap;
use std::fs;
use std::path::Path;

use serde::Deserialize;
use thiserror::Error;

use taxiguard_core::{Clearance, PositionReport, SurfaceFeature};

#[derive(Debug, Error)]
pub enum FeedError {
    #[error("io error {0}")]
    Io(#[from] std::io::Error),

    #[error("malformed input record: {0}")]
    Malformed(#[from] serde_json::Error),
}

/// One line of the input stream: either a position report or a clearance.
#[derive(Debug, Clone, Deserialize)]
#[serde(untagged)]
pub enum InputRecord {
    Clearance(Clearance),
    Report(PositionReport),
}

pub fn parse_line(line: &str) -> Result<InputRecord, FeedError> {
    Ok(serde_json::from_str(line)?)
}

/// Read an NDJSON file of mixed reports and clearances.
pub fn load_records(path: &Path) -> Result<(Vec<PositionReport>, Vec<Clearance>), FeedError> {
    let mut reports = Vec::new();
    let mut clearances = Vec::new();
    for line in fs::read_to_string(path)?.lines() {
        let line = line.trim();
        if line.is_empty() {
            continue;
        }
        match parse_line(line)? {
            InputRecord::Report(report) => reports.push(report),
            InputRecord::Clearance(clearance) => clearances.push(clearance),
        }
    }
    Ok((reports, clearances))
}

/// Load the static surface map: a JSON array of surface features.
pub fn load_surface(path: &Path) -> Result<Vec<SurfaceFeature>, FeedError> {
    Ok(serde_json::from_str(&fs::read_to_string(path)?)?)
}

/// Spoken-callsign to tail-number mapping for the clearance feed.
///
/// Tower transcripts carry flight names ("Southwest 2504") while telemetry
/// carries tail identifiers ("SWA2504"); clearances are rewritten to the
/// telemetry identifier before they reach the engine.
#[derive(Debug, Clone, Default)]
pub struct CallsignMap {
    entries: BTreeMap<String, String>,
}

impl CallsignMap {
    pub fn load(path: &Path) -> Result<Self, FeedError> {
        let entries: BTreeMap<String, String> = serde_json::from_str(&fs::read_to_string(path)?)?;
        Ok(Self { entries })
    }

    pub fn from_entries(entries: BTreeMap<String, String>) -> Self {
        Self { entries }
    }

    /// Map a flight name to its tail identifier. Substring match, so
    /// "Southwest 2504 heavy" still resolves; unknown names pass through
    /// unchanged.
    pub fn resolve(&self, flight_name: &str) -> String {
        for (key, ident) in &self.entries {
            if flight_name.contains(key.as_str()) {
                return ident.clone();
            }
        }
        flight_name.to_string()
    }

    pub fn normalize(&self, mut clearance: Clearance) -> Clearance {
        clearance.aircraft_id = self.resolve(&clearance.aircraft_id);
        clearance
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_both_record_shapes() {
        let clearance_line =
            r#"{"plane": "FlexJet 560", "command": "HOLD_SHORT", "reference": "H", "time": 1740494919.82}"#;
        assert!(matches!(
            parse_line(clearance_line).unwrap(),
            InputRecord::Clearance(_)
        ));

        let report_line = r#"{"aircraft_id": "SWA2504", "timestamp": "2025-02-25T14:47:36.480Z", "lat": 41.7868, "lon": -87.7522, "altitude_m": 0.0, "ground_speed_mps": 38.0, "track_deg": 310.0}"#;
        assert!(matches!(
            parse_line(report_line).unwrap(),
            InputRecord::Report(_)
        ));
    }

    #[test]
    fn rejects_malformed_lines() {
        assert!(parse_line(r#"{"plane": "X"}"#).is_err());
        assert!(parse_line("not json").is_err());
    }

    #[test]
    fn callsign_resolution_is_substring_based() {
        let map = CallsignMap::from_entries(BTreeMap::from([
            ("Southwest 2504".to_string(), "SWA2504".to_string()),
            ("FlexJet 560".to_string(), "LXJ560".to_string()),
        ]));
        assert_eq!(map.resolve("Southwest 2504"), "SWA2504");
        assert_eq!(map.resolve("FlexJet 560 heavy"), "LXJ560");
        assert_eq!(map.resolve("N12345"), "N12345");
    }
}

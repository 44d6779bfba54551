//! Merged, sequence-numbered alert stream.
//!
//! Conflict and compliance events fold into one time-ordered sequence with a
//! monotonically increasing sequence number, so a consumer that has seen
//! sequence N can reconnect and skip everything at or below N. An ongoing
//! conflict episode is sequenced once, however many ticks it persists.

use serde::{Deserialize, Serialize};
use std::collections::HashSet;

use crate::compliance::ComplianceEvent;
use crate::conflict::ConflictEvent;

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Alert {
    Conflict(ConflictEvent),
    Compliance(ComplianceEvent),
}

impl Alert {
    pub fn time_s(&self) -> f64 {
        match self {
            Alert::Conflict(event) => event.time_s,
            Alert::Compliance(event) => event.time_s,
        }
    }

    fn sort_key(&self) -> (f64, u8, String) {
        match self {
            Alert::Conflict(event) => (
                event.time_s,
                0,
                format!("{}~{}", event.first_id, event.second_id),
            ),
            Alert::Compliance(event) => (
                event.time_s,
                1,
                format!("{}~{}", event.aircraft_id, event.reference),
            ),
        }
    }
}

/// One entry of the outbound alert stream.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AlertRecord {
    pub seq: u64,
    #[serde(flatten)]
    pub alert: Alert,
}

impl AlertRecord {
    pub fn time_s(&self) -> f64 {
        self.alert.time_s()
    }
}

/// Stateful merger of the two event streams.
pub struct AlertEmitter {
    next_seq: u64,
    sequenced_episodes: HashSet<String>,
}

impl Default for AlertEmitter {
    fn default() -> Self {
        Self::new()
    }
}

impl AlertEmitter {
    pub fn new() -> Self {
        Self {
            next_seq: 0,
            sequenced_episodes: HashSet::new(),
        }
    }

    /// Highest sequence number assigned so far.
    pub fn last_seq(&self) -> u64 {
        self.next_seq
    }

    /// Merge one tick's events into the ordered stream.
    ///
    /// Conflict events repeating an already-sequenced episode are dropped;
    /// compliance events arrive pre-deduplicated by the monitor.
    pub fn ingest(
        &mut self,
        conflicts: Vec<ConflictEvent>,
        compliance: Vec<ComplianceEvent>,
    ) -> Vec<AlertRecord> {
        let mut alerts: Vec<Alert> = Vec::with_capacity(conflicts.len() + compliance.len());

        for event in conflicts {
            if self.sequenced_episodes.insert(event.episode_id.clone()) {
                alerts.push(Alert::Conflict(event));
            }
        }
        alerts.extend(compliance.into_iter().map(Alert::Compliance));

        alerts.sort_by(|a, b| {
            let (ta, ra, ka) = a.sort_key();
            let (tb, rb, kb) = b.sort_key();
            ta.total_cmp(&tb).then(ra.cmp(&rb)).then(ka.cmp(&kb))
        });

        alerts
            .into_iter()
            .map(|alert| {
                self.next_seq += 1;
                AlertRecord {
                    seq: self.next_seq,
                    alert,
                }
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::compliance::ViolationKind;
    use crate::rules::Severity;

    fn conflict(episode: &str, time_s: f64) -> ConflictEvent {
        ConflictEvent {
            episode_id: episode.to_string(),
            first_id: "A1".to_string(),
            second_id: "B2".to_string(),
            severity: Severity::Warning,
            time_to_closest_s: 12.0,
            min_horizontal_m: 80.0,
            min_vertical_m: 0.0,
            cpa_lat: 41.78,
            cpa_lon: -87.75,
            cpa_altitude_m: 0.0,
            time_s,
            on_surface: true,
        }
    }

    fn violation(aircraft: &str, time_s: f64) -> ComplianceEvent {
        ComplianceEvent {
            aircraft_id: aircraft.to_string(),
            violation: ViolationKind::HoldShortViolation,
            violated_command: None,
            reference: "31C-hold".to_string(),
            lat: 41.78,
            lon: -87.75,
            time_s,
            ground_speed_mps: 8.0,
            track_deg: 0.0,
            forecast_s: 30.0,
            advisory: "STOP NOW".to_string(),
            predicted_outcome: String::new(),
        }
    }

    #[test]
    fn sequences_are_monotonic_and_time_ordered() {
        let mut emitter = AlertEmitter::new();
        let records = emitter.ingest(
            vec![conflict("A1~B2#1", 10.0)],
            vec![violation("LXJ560", 9.0)],
        );
        assert_eq!(records.len(), 2);
        assert_eq!(records[0].seq, 1);
        assert_eq!(records[1].seq, 2);
        assert!(records[0].time_s() <= records[1].time_s());
        assert!(matches!(records[0].alert, Alert::Compliance(_)));
    }

    #[test]
    fn ongoing_episode_sequenced_once() {
        let mut emitter = AlertEmitter::new();
        let first = emitter.ingest(vec![conflict("A1~B2#1", 10.0)], Vec::new());
        assert_eq!(first.len(), 1);

        // Same episode on the next tick: nothing new downstream.
        let second = emitter.ingest(vec![conflict("A1~B2#1", 11.0)], Vec::new());
        assert!(second.is_empty());

        // A fresh episode for the same pair is a fresh alert.
        let third = emitter.ingest(vec![conflict("A1~B2#2", 30.0)], Vec::new());
        assert_eq!(third.len(), 1);
        assert_eq!(third[0].seq, 2);
    }

    #[test]
    fn serialized_record_is_tagged() {
        let mut emitter = AlertEmitter::new();
        let records = emitter.ingest(vec![conflict("A1~B2#1", 10.0)], Vec::new());
        let json = serde_json::to_value(&records[0]).unwrap();
        assert_eq!(json["kind"], "conflict");
        assert_eq!(json["seq"], 1);
    }
}

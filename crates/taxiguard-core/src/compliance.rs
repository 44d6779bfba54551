//! Clearance compliance monitoring.
//!
//! Tracks a state machine per (aircraft, surface feature) pair driven by the
//! external clearance feed, and checks every tick whether observed movement
//! is consistent with the instruction in force. The monitor only flags
//! deviation from instructions that were actually issued; aircraft with no
//! clearance history never produce events.

use std::collections::{BTreeMap, HashMap, HashSet};

use serde::{Deserialize, Serialize};

use crate::errors::SurfaceError;
use crate::models::{AircraftState, Clearance, ClearanceKind};
use crate::rules::SafetyRules;
use crate::spatial;
use crate::surface::{FeatureKind, SurfaceMap};

/// An aircraft slower than this is treated as holding, not maneuvering, and
/// is exempt from hold-short crossing projection.
const HOLD_CREEP_MPS: f64 = 1.0;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ViolationKind {
    HoldShortViolation,
    RunwayIncursion,
}

/// A detected deviation from an issued clearance. Immutable once emitted.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ComplianceEvent {
    pub aircraft_id: String,
    pub violation: ViolationKind,
    /// The instruction in force, when one governs the violated feature.
    pub violated_command: Option<ClearanceKind>,
    /// Referenced surface feature designator.
    pub reference: String,
    pub lat: f64,
    pub lon: f64,
    /// Evaluation tick time, seconds since the Unix epoch.
    pub time_s: f64,
    pub ground_speed_mps: f64,
    pub track_deg: f64,
    /// Path forecast interval used for the early-warning projection.
    pub forecast_s: f64,
    /// Concise recommended pilot action.
    pub advisory: String,
    /// Expected outcome should the advisory be ignored.
    pub predicted_outcome: String,
}

/// Per-(aircraft, feature) clearance state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ClearanceState {
    HoldingShort,
    ClearedToCross { entered: bool },
    ClearedForTakeoff,
    ClearedToLand { touched_down: bool },
    LineUpAndWait,
}

#[derive(Debug, Clone)]
struct Assignment {
    state: ClearanceState,
    command: ClearanceKind,
    issued_s: f64,
}

/// Evaluates observed movement against issued clearances.
pub struct ComplianceMonitor {
    rules: SafetyRules,
    assignments: HashMap<(String, String), Assignment>,
    /// Aircraft that have received at least one instruction.
    instructed: HashSet<String>,
    /// Violations already reported for the current episode.
    flagged: HashSet<(String, String, ViolationKind)>,
}

impl ComplianceMonitor {
    pub fn new(rules: SafetyRules) -> Self {
        Self {
            rules,
            assignments: HashMap::new(),
            instructed: HashSet::new(),
            flagged: HashSet::new(),
        }
    }

    /// Whether an instruction currently governs the (aircraft, feature)
    /// pair.
    pub fn is_assigned(&self, aircraft_id: &str, reference: &str) -> bool {
        self.assignments
            .contains_key(&(aircraft_id.to_string(), reference.trim().to_string()))
    }

    /// Fold a new clearance into the state machine. The tower always wins: a
    /// new instruction for the pair overrides whatever state inference had
    /// reached, and resets the violation episode for that pair.
    ///
    /// A clearance naming a feature absent from the map is surfaced as
    /// [`SurfaceError::UnknownFeatureReference`]; the caller logs and skips
    /// it rather than crashing evaluation.
    pub fn apply_clearance(
        &mut self,
        clearance: &Clearance,
        surface: &SurfaceMap,
    ) -> Result<(), SurfaceError> {
        self.instructed.insert(clearance.aircraft_id.clone());

        let reference = clearance.reference.trim();
        if reference.is_empty() {
            // Position holds without a feature carry no geometry to check.
            return Ok(());
        }
        surface.feature(reference)?;

        let key = (clearance.aircraft_id.clone(), reference.to_string());
        if let Some(existing) = self.assignments.get(&key) {
            // The feed is append-only but validity times rule: never let an
            // older instruction displace a newer one.
            if existing.issued_s > clearance.time {
                return Ok(());
            }
        }

        let state = match clearance.command {
            ClearanceKind::HoldShort | ClearanceKind::HoldPosition => ClearanceState::HoldingShort,
            ClearanceKind::ClearToCross => ClearanceState::ClearedToCross { entered: false },
            ClearanceKind::ClearedForTakeoff => ClearanceState::ClearedForTakeoff,
            ClearanceKind::ClearedToLand => ClearanceState::ClearedToLand {
                touched_down: false,
            },
            ClearanceKind::LineUpAndWait => ClearanceState::LineUpAndWait,
        };

        self.flagged
            .retain(|(aircraft, flagged_ref, _)| {
                !(aircraft == &key.0 && flagged_ref == &key.1)
            });
        self.assignments.insert(
            key,
            Assignment {
                state,
                command: clearance.command,
                issued_s: clearance.time,
            },
        );
        Ok(())
    }

    /// Check every tracked aircraft against its assignments for this tick.
    pub fn evaluate(
        &mut self,
        states: &BTreeMap<String, AircraftState>,
        surface: &SurfaceMap,
        now_s: f64,
    ) -> Vec<ComplianceEvent> {
        let mut events = Vec::new();

        let mut keys: Vec<(String, String)> = self.assignments.keys().cloned().collect();
        keys.sort();

        for key in keys {
            let Some(state) = states.get(&key.0) else {
                // Not currently tracked; the instruction stays in force.
                continue;
            };
            let Some(assignment) = self.assignments.get(&key).cloned() else {
                continue;
            };

            match assignment.state {
                ClearanceState::HoldingShort => {
                    if self.hold_short_breached(state, &key.1, surface)
                        && self.flagged.insert((
                            key.0.clone(),
                            key.1.clone(),
                            ViolationKind::HoldShortViolation,
                        ))
                    {
                        events.push(self.event(
                            state,
                            ViolationKind::HoldShortViolation,
                            Some(assignment.command),
                            &key.1,
                            now_s,
                        ));
                    }
                }
                ClearanceState::ClearedToCross { entered } => {
                    let Ok(inside) = surface.contains(state.lat, state.lon, &key.1) else {
                        continue;
                    };
                    if inside {
                        if !entered {
                            self.set_state(&key, ClearanceState::ClearedToCross { entered: true });
                        }
                    } else if entered {
                        // Past the far edge: crossing complete.
                        self.clear_assignment(&key);
                    }
                }
                ClearanceState::ClearedForTakeoff => {
                    let Ok(inside) = surface.contains(state.lat, state.lon, &key.1) else {
                        continue;
                    };
                    if !inside && !state.on_ground {
                        self.clear_assignment(&key);
                    }
                }
                ClearanceState::ClearedToLand { touched_down } => {
                    let Ok(inside) = surface.contains(state.lat, state.lon, &key.1) else {
                        continue;
                    };
                    if state.on_ground && inside {
                        if !touched_down {
                            self.set_state(
                                &key,
                                ClearanceState::ClearedToLand { touched_down: true },
                            );
                        }
                    } else if touched_down && state.on_ground && !inside {
                        // Rollout complete, runway vacated.
                        self.clear_assignment(&key);
                    }
                }
                ClearanceState::LineUpAndWait => {
                    // Exits only by superseding clearance.
                }
            }
        }

        // Runway incursion sweep, independent of the per-feature machines.
        for (aircraft_id, state) in states {
            if !self.instructed.contains(aircraft_id) || !state.on_ground {
                continue;
            }

            let mut occupied: Vec<String> = Vec::new();
            for feature in surface.features_containing(state.lat, state.lon) {
                if feature.kind != FeatureKind::Runway {
                    continue;
                }
                occupied.push(feature.id.clone());
                if self.runway_entry_authorized(aircraft_id, &feature.id) {
                    continue;
                }
                if self.flagged.insert((
                    aircraft_id.clone(),
                    feature.id.clone(),
                    ViolationKind::RunwayIncursion,
                )) {
                    events.push(self.event(
                        state,
                        ViolationKind::RunwayIncursion,
                        self.assignments
                            .get(&(aircraft_id.clone(), feature.id.clone()))
                            .map(|assignment| assignment.command),
                        &feature.id,
                        now_s,
                    ));
                }
            }

            // Vacating a runway ends the incursion episode; re-entry flags
            // anew.
            self.flagged.retain(|(aircraft, reference, kind)| {
                *kind != ViolationKind::RunwayIncursion
                    || aircraft != aircraft_id
                    || occupied.contains(reference)
            });
        }

        events
    }

    fn hold_short_breached(
        &self,
        state: &AircraftState,
        reference: &str,
        surface: &SurfaceMap,
    ) -> bool {
        if state.ground_speed_mps < HOLD_CREEP_MPS {
            return false;
        }
        let buffer = self.rules.hold_short_buffer_m;
        let cur = (state.lat, state.lon);

        if let Some(prev) = state.prev_fix {
            if surface
                .crossing((prev.lat, prev.lon), cur, reference, buffer)
                .unwrap_or(false)
            {
                return true;
            }
        }

        // Early warning: project the path ahead and flag the predicted
        // crossing before the aircraft reaches the line.
        let ahead_m = state.ground_speed_mps * self.rules.hold_projection_s;
        let projected =
            spatial::offset_by_bearing(state.lat, state.lon, ahead_m, state.track_deg.to_radians());
        surface
            .crossing(cur, projected, reference, buffer)
            .unwrap_or(false)
    }

    fn runway_entry_authorized(&self, aircraft_id: &str, runway_id: &str) -> bool {
        match self
            .assignments
            .get(&(aircraft_id.to_string(), runway_id.to_string()))
        {
            Some(assignment) => matches!(
                assignment.state,
                ClearanceState::ClearedToCross { .. }
                    | ClearanceState::ClearedForTakeoff
                    | ClearanceState::ClearedToLand { .. }
                    | ClearanceState::LineUpAndWait
            ),
            None => false,
        }
    }

    fn set_state(&mut self, key: &(String, String), state: ClearanceState) {
        if let Some(assignment) = self.assignments.get_mut(key) {
            assignment.state = state;
        }
    }

    fn clear_assignment(&mut self, key: &(String, String)) {
        self.assignments.remove(key);
        self.flagged
            .retain(|(aircraft, reference, _)| !(aircraft == &key.0 && reference == &key.1));
    }

    fn event(
        &self,
        state: &AircraftState,
        violation: ViolationKind,
        violated_command: Option<ClearanceKind>,
        reference: &str,
        now_s: f64,
    ) -> ComplianceEvent {
        let (advisory, predicted_outcome) = recommend_action(violation);
        ComplianceEvent {
            aircraft_id: state.aircraft_id.clone(),
            violation,
            violated_command,
            reference: reference.to_string(),
            lat: state.lat,
            lon: state.lon,
            time_s: now_s,
            ground_speed_mps: state.ground_speed_mps,
            track_deg: state.track_deg,
            forecast_s: self.rules.hold_projection_s,
            advisory: advisory.to_string(),
            predicted_outcome: predicted_outcome.to_string(),
        }
    }
}

/// Terse pilot advisory plus the expected outcome in the system's absence.
fn recommend_action(kind: ViolationKind) -> (&'static str, &'static str) {
    match kind {
        ViolationKind::HoldShortViolation => (
            "STOP NOW",
            "Likely collision or incursion on restricted path.",
        ),
        ViolationKind::RunwayIncursion => (
            "EXIT RUNWAY",
            "Severe risk of collision with landing aircraft.",
        ),
    }
}

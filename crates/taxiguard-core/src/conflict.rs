//! Pairwise conflict detection over predicted trajectories.
//!
//! Every tick the detector walks the tracked fleet, prunes distant pairs
//! with a spatial grid, and samples each surviving pair's predicted paths
//! for loss of separation inside the shared horizon. Surface pairs are
//! measured along runway/taxiway centerlines so parallel taxi routes don't
//! ring the alarm.

use std::collections::{BTreeMap, HashMap, HashSet};

use serde::{Deserialize, Serialize};

use crate::models::AircraftState;
use crate::rules::{SafetyRules, Severity};
use crate::spatial;
use crate::surface::SurfaceMap;
use crate::trajectory::{PredictedTrajectory, TrajectoryPoint};

/// Predicted loss of separation between two aircraft.
///
/// Immutable once emitted. The `episode_id` is reused on every tick for as
/// long as the same pair remains in conflict, so consumers can collapse the
/// stream to one alert per episode.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConflictEvent {
    pub episode_id: String,
    /// Lexically smaller aircraft id of the pair.
    pub first_id: String,
    pub second_id: String,
    pub severity: Severity,
    /// Seconds from the evaluation tick to the closest point of approach.
    pub time_to_closest_s: f64,
    /// Horizontal separation at the closest point of approach, meters.
    pub min_horizontal_m: f64,
    /// Vertical separation at the closest point of approach, meters.
    pub min_vertical_m: f64,
    pub cpa_lat: f64,
    pub cpa_lon: f64,
    pub cpa_altitude_m: f64,
    /// Evaluation tick time, seconds since the Unix epoch.
    pub time_s: f64,
    /// True when both aircraft were on the surface.
    pub on_surface: bool,
}

struct PairApproach {
    tca_s: f64,
    horizontal_m: f64,
    vertical_m: f64,
    cpa_lat: f64,
    cpa_lon: f64,
    cpa_altitude_m: f64,
    breached: bool,
}

/// Stateful detector; holds only episode identities between ticks.
pub struct ConflictDetector {
    rules: SafetyRules,
    active: HashMap<(String, String), String>,
    episode_seq: u64,
}

impl ConflictDetector {
    pub fn new(rules: SafetyRules) -> Self {
        Self {
            rules,
            active: HashMap::new(),
            episode_seq: 0,
        }
    }

    /// Number of pairs currently in conflict.
    pub fn active_episodes(&self) -> usize {
        self.active.len()
    }

    /// Evaluate every tracked pair against the shared snapshot.
    ///
    /// Deterministic: identical snapshots and surface map produce an
    /// identical result, sorted by ascending time to closest approach.
    pub fn evaluate(
        &mut self,
        states: &BTreeMap<String, AircraftState>,
        surface: &SurfaceMap,
        now_s: f64,
    ) -> Vec<ConflictEvent> {
        let fleet: Vec<&AircraftState> = states.values().collect();
        if fleet.len() < 2 {
            self.active.clear();
            return Vec::new();
        }

        let pairs = self.candidate_pairs(&fleet);
        if pairs.is_empty() {
            self.active.clear();
            return Vec::new();
        }

        // Sample each involved trajectory once.
        let mut sampled: HashMap<usize, Vec<TrajectoryPoint>> = HashMap::new();
        for &(i, j) in &pairs {
            for idx in [i, j] {
                sampled.entry(idx).or_insert_with(|| {
                    PredictedTrajectory::from_state(
                        fleet[idx],
                        self.rules.horizon_s,
                        self.rules.sample_step_s,
                    )
                    .points()
                    .collect()
                });
            }
        }

        let mut conflicts = Vec::new();
        let mut next_active: HashMap<(String, String), String> = HashMap::new();

        for (i, j) in pairs {
            let a = fleet[i];
            let b = fleet[j];
            let on_surface = a.on_ground && b.on_ground;

            let Some(approach) =
                self.closest_approach(&sampled[&i], &sampled[&j], on_surface, surface)
            else {
                continue;
            };
            if !approach.breached {
                continue;
            }

            let tiers = if on_surface {
                self.rules.ground_tiers
            } else {
                self.rules.airborne_tiers
            };

            let key = (a.aircraft_id.clone(), b.aircraft_id.clone());
            let episode_id = match self.active.get(&key) {
                Some(id) => id.clone(),
                None => {
                    self.episode_seq += 1;
                    format!("{}~{}#{}", key.0, key.1, self.episode_seq)
                }
            };
            next_active.insert(key, episode_id.clone());

            conflicts.push(ConflictEvent {
                episode_id,
                first_id: a.aircraft_id.clone(),
                second_id: b.aircraft_id.clone(),
                severity: tiers.classify(approach.tca_s),
                time_to_closest_s: approach.tca_s,
                min_horizontal_m: approach.horizontal_m,
                min_vertical_m: approach.vertical_m,
                cpa_lat: approach.cpa_lat,
                cpa_lon: approach.cpa_lon,
                cpa_altitude_m: approach.cpa_altitude_m,
                time_s: now_s,
                on_surface,
            });
        }

        // Episodes for pairs no longer in conflict end here.
        self.active = next_active;

        conflicts.sort_by(|x, y| {
            x.time_to_closest_s
                .total_cmp(&y.time_to_closest_s)
                .then_with(|| x.first_id.cmp(&y.first_id))
                .then_with(|| x.second_id.cmp(&y.second_id))
        });
        conflicts
    }

    /// Grid prefilter: sorted, deduplicated index pairs close enough that a
    /// conflict inside the horizon is geometrically possible.
    fn candidate_pairs(&self, fleet: &[&AircraftState]) -> Vec<(usize, usize)> {
        let max_speed = fleet
            .iter()
            .map(|state| state.ground_speed_mps)
            .fold(0.0, f64::max);
        let threshold = self.rules.min_horizontal_separation_m;
        let cell_size_m = (threshold + max_speed * self.rules.horizon_s).max(1.0);

        let count = fleet.len() as f64;
        let ref_lat = fleet.iter().map(|s| s.lat).sum::<f64>() / count;
        let ref_lon = fleet.iter().map(|s| s.lon).sum::<f64>() / count;

        let mut grid: HashMap<(i32, i32), Vec<usize>> = HashMap::new();
        let mut projected: Vec<(f64, f64)> = Vec::with_capacity(fleet.len());
        for (idx, state) in fleet.iter().enumerate() {
            let x = spatial::lon_to_meters(state.lon - ref_lon, ref_lat);
            let y = spatial::lat_to_meters(state.lat - ref_lat, ref_lat);
            projected.push((x, y));
            let cell = (
                (x / cell_size_m).floor() as i32,
                (y / cell_size_m).floor() as i32,
            );
            grid.entry(cell).or_default().push(idx);
        }

        let mut pairs: Vec<(usize, usize)> = Vec::new();
        let mut seen: HashSet<(usize, usize)> = HashSet::new();
        for (i, state) in fleet.iter().enumerate() {
            let (x, y) = projected[i];
            let cell_x = (x / cell_size_m).floor() as i32;
            let cell_y = (y / cell_size_m).floor() as i32;
            let search_radius_m =
                threshold + (state.ground_speed_mps + max_speed) * self.rules.horizon_s;
            let search_cells = (search_radius_m / cell_size_m).ceil() as i32;

            for dx in -search_cells..=search_cells {
                for dy in -search_cells..=search_cells {
                    let Some(indices) = grid.get(&(cell_x + dx, cell_y + dy)) else {
                        continue;
                    };
                    for &j in indices {
                        if j <= i || !seen.insert((i, j)) {
                            continue;
                        }
                        let other = fleet[j];
                        let current_m = spatial::haversine_distance(
                            state.lat, state.lon, other.lat, other.lon,
                        );
                        let reachable_m = threshold
                            + (state.ground_speed_mps + other.ground_speed_mps)
                                * self.rules.horizon_s;
                        if current_m <= reachable_m {
                            pairs.push((i, j));
                        }
                    }
                }
            }
        }

        pairs.sort_unstable();
        pairs
    }

    /// Walk the two sampled paths in lockstep and find the closest point of
    /// approach, noting whether separation thresholds were breached at any
    /// sample inside the horizon.
    fn closest_approach(
        &self,
        path1: &[TrajectoryPoint],
        path2: &[TrajectoryPoint],
        on_surface: bool,
        surface: &SurfaceMap,
    ) -> Option<PairApproach> {
        let mut best: Option<PairApproach> = None;
        let mut best_metric = f64::INFINITY;
        let mut breached = false;

        for (p1, p2) in path1.iter().zip(path2.iter()) {
            let (horizontal_m, vertical_m) = if on_surface {
                let Some(h) = surface.surface_separation_m(
                    p1.lat,
                    p1.lon,
                    p2.lat,
                    p2.lon,
                    self.rules.centerline_capture_m,
                ) else {
                    // Confined to disjoint centerlines at this sample.
                    continue;
                };
                (h, 0.0)
            } else {
                (
                    spatial::haversine_distance(p1.lat, p1.lon, p2.lat, p2.lon),
                    (p1.altitude_m - p2.altitude_m).abs(),
                )
            };

            let sample_breach = horizontal_m < self.rules.min_horizontal_separation_m
                && (on_surface || vertical_m < self.rules.min_vertical_separation_m);
            breached |= sample_breach;

            let metric = (horizontal_m.powi(2) + vertical_m.powi(2)).sqrt();
            if metric < best_metric {
                best_metric = metric;
                best = Some(PairApproach {
                    tca_s: p1.time_offset_s,
                    horizontal_m,
                    vertical_m,
                    cpa_lat: (p1.lat + p2.lat) / 2.0,
                    cpa_lon: (p1.lon + p2.lon) / 2.0,
                    cpa_altitude_m: (p1.altitude_m + p2.altitude_m) / 2.0,
                    breached: false,
                });
            }
        }

        best.map(|mut approach| {
            approach.breached = breached;
            approach
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::Fix;
    use crate::surface::tests::{test_map, FIELD_LAT, FIELD_LON};
    use crate::spatial::{meters_to_lat, meters_to_lon, offset_by_bearing};
    use chrono::DateTime;

    const KT_TO_MPS: f64 = 0.514444;
    const NM_TO_M: f64 = 1852.0;

    fn state(
        id: &str,
        lat: f64,
        lon: f64,
        altitude_m: f64,
        speed_mps: f64,
        track_deg: f64,
    ) -> AircraftState {
        AircraftState {
            aircraft_id: id.to_string(),
            lat,
            lon,
            altitude_m,
            ground_speed_mps: speed_mps,
            track_deg,
            climb_rate_mps: 0.0,
            turn_rate_deg_s: 0.0,
            on_ground: altitude_m <= 30.0,
            prev_fix: Some(Fix {
                time_s: 0.0,
                lat,
                lon,
                altitude_m,
            }),
            last_update: DateTime::from_timestamp_millis(0).unwrap(),
        }
    }

    fn fleet(states: Vec<AircraftState>) -> BTreeMap<String, AircraftState> {
        states
            .into_iter()
            .map(|s| (s.aircraft_id.clone(), s))
            .collect()
    }

    fn empty_map() -> SurfaceMap {
        SurfaceMap::new(Vec::new())
    }

    #[test]
    fn head_on_closure_at_two_miles() {
        // Two aircraft nose to nose on the same centerline, 2 nm apart,
        // 300 kt closing speed, no altitude separation: closest approach
        // near 24 seconds at effectively zero separation.
        let mut detector = ConflictDetector::new(SafetyRules::default());
        let speed = 150.0 * KT_TO_MPS;
        let (north_lat, north_lon) =
            offset_by_bearing(FIELD_LAT, FIELD_LON, 2.0 * NM_TO_M, 0.0);

        let states = fleet(vec![
            state("LXJ560", FIELD_LAT, FIELD_LON, 0.0, speed, 0.0),
            state("SWA2504", north_lat, north_lon, 0.0, speed, 180.0),
        ]);

        let conflicts = detector.evaluate(&states, &empty_map(), 1000.0);
        assert_eq!(conflicts.len(), 1);
        let conflict = &conflicts[0];
        assert!((conflict.time_to_closest_s - 24.0).abs() <= 1.0);
        assert!(conflict.min_horizontal_m < 10.0);
        assert_eq!(conflict.first_id, "LXJ560");
        assert_eq!(conflict.second_id, "SWA2504");
        assert!(conflict.on_surface);
    }

    #[test]
    fn distant_traffic_is_quiet() {
        let mut detector = ConflictDetector::new(SafetyRules::default());
        let states = fleet(vec![
            state("A1", FIELD_LAT, FIELD_LON, 500.0, 60.0, 0.0),
            state("B2", FIELD_LAT + 1.0, FIELD_LON + 1.0, 500.0, 60.0, 180.0),
        ]);
        assert!(detector.evaluate(&states, &empty_map(), 0.0).is_empty());
        assert_eq!(detector.active_episodes(), 0);
    }

    #[test]
    fn vertical_separation_suppresses_airborne_conflict() {
        let mut detector = ConflictDetector::new(SafetyRules::default());
        let offset = meters_to_lat(50.0, FIELD_LAT);
        let states = fleet(vec![
            state("A1", FIELD_LAT, FIELD_LON, 500.0, 0.0, 0.0),
            state("B2", FIELD_LAT + offset, FIELD_LON, 900.0, 0.0, 0.0),
        ]);
        assert!(detector.evaluate(&states, &empty_map(), 0.0).is_empty());

        // Same geometry with co-altitude traffic is a conflict.
        let states = fleet(vec![
            state("A1", FIELD_LAT, FIELD_LON, 500.0, 0.0, 0.0),
            state("B2", FIELD_LAT + offset, FIELD_LON, 520.0, 0.0, 0.0),
        ]);
        let conflicts = detector.evaluate(&states, &empty_map(), 0.0);
        assert_eq!(conflicts.len(), 1);
        assert_eq!(conflicts[0].severity, Severity::Critical);
    }

    #[test]
    fn episode_identity_is_stable_across_ticks() {
        let mut detector = ConflictDetector::new(SafetyRules::default());
        let offset = meters_to_lat(50.0, FIELD_LAT);
        let states = fleet(vec![
            state("A1", FIELD_LAT, FIELD_LON, 500.0, 0.0, 0.0),
            state("B2", FIELD_LAT + offset, FIELD_LON, 510.0, 0.0, 0.0),
        ]);

        let first = detector.evaluate(&states, &empty_map(), 0.0);
        let second = detector.evaluate(&states, &empty_map(), 1.0);
        assert_eq!(first[0].episode_id, second[0].episode_id);

        // Once the pair separates the episode ends; a fresh conflict gets a
        // fresh identity.
        let apart = fleet(vec![
            state("A1", FIELD_LAT, FIELD_LON, 500.0, 0.0, 0.0),
            state("B2", FIELD_LAT + 1.0, FIELD_LON, 510.0, 0.0, 0.0),
        ]);
        assert!(detector.evaluate(&apart, &empty_map(), 2.0).is_empty());
        let third = detector.evaluate(&states, &empty_map(), 3.0);
        assert_ne!(first[0].episode_id, third[0].episode_id);
    }

    #[test]
    fn parallel_taxiways_do_not_conflict() {
        let rules = SafetyRules {
            min_horizontal_separation_m: 250.0,
            ..SafetyRules::default()
        };
        let map = test_map();
        let lon_a = FIELD_LON + meters_to_lon(200.0, FIELD_LAT);
        let lon_b = FIELD_LON + meters_to_lon(400.0, FIELD_LAT);

        // Two aircraft taxiing north on parallel taxiways 200 m apart.
        let mut detector = ConflictDetector::new(rules.clone());
        let states = fleet(vec![
            state("A1", FIELD_LAT, lon_a, 0.0, 8.0, 0.0),
            state("B2", FIELD_LAT, lon_b, 0.0, 8.0, 0.0),
        ]);
        assert!(detector.evaluate(&states, &map, 0.0).is_empty());

        // The same spacing on one taxiway is a real closure.
        let mut detector = ConflictDetector::new(rules);
        let lat_ahead = FIELD_LAT + meters_to_lat(200.0, FIELD_LAT);
        let states = fleet(vec![
            state("A1", FIELD_LAT, lon_a, 0.0, 8.0, 0.0),
            state("B2", lat_ahead, lon_a, 0.0, 0.0, 0.0),
        ]);
        let conflicts = detector.evaluate(&states, &map, 0.0);
        assert_eq!(conflicts.len(), 1);
        assert!(conflicts[0].on_surface);
    }

    #[test]
    fn results_sorted_by_time_to_closest() {
        let mut detector = ConflictDetector::new(SafetyRules::default());
        let offset = meters_to_lat(50.0, FIELD_LAT);
        let far_lat = FIELD_LAT + 0.05;
        let states = fleet(vec![
            // Pair already on top of each other: TCA 0.
            state("C3", far_lat, FIELD_LON, 500.0, 0.0, 0.0),
            state("D4", far_lat + offset, FIELD_LON, 510.0, 0.0, 0.0),
            // Head-on pair with a later closest approach.
            state("A1", FIELD_LAT, FIELD_LON, 0.0, 77.0, 0.0),
            state(
                "B2",
                FIELD_LAT + meters_to_lat(3704.0, FIELD_LAT),
                FIELD_LON,
                0.0,
                77.0,
                180.0,
            ),
        ]);

        let conflicts = detector.evaluate(&states, &empty_map(), 0.0);
        assert_eq!(conflicts.len(), 2);
        assert!(conflicts[0].time_to_closest_s <= conflicts[1].time_to_closest_s);
        assert_eq!(conflicts[0].first_id, "C3");
    }

    #[test]
    fn identical_snapshots_yield_identical_results() {
        let offset = meters_to_lat(50.0, FIELD_LAT);
        let states = fleet(vec![
            state("A1", FIELD_LAT, FIELD_LON, 500.0, 10.0, 90.0),
            state("B2", FIELD_LAT + offset, FIELD_LON, 510.0, 10.0, 90.0),
        ]);

        let mut d1 = ConflictDetector::new(SafetyRules::default());
        let mut d2 = ConflictDetector::new(SafetyRules::default());
        let r1 = d1.evaluate(&states, &empty_map(), 5.0);
        let r2 = d2.evaluate(&states, &empty_map(), 5.0);
        assert_eq!(serde_json::to_string(&r1).unwrap(), serde_json::to_string(&r2).unwrap());
    }
}

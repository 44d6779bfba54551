//! Batch replay: drive the tick engine over recorded records in timestamp
//! order, for backtesting against recorded incidents.

use taxiguard_core::{AlertRecord, Clearance, PositionReport};

use crate::engine::TickEngine;

/// Replay every record through the engine at a fixed tick step and collect
/// the full alert stream. Deterministic for a given input set.
pub fn run_replay(
    engine: &mut TickEngine,
    reports: Vec<PositionReport>,
    clearances: Vec<Clearance>,
    step_s: f64,
) -> Vec<AlertRecord> {
    let mut bounds: Option<(f64, f64)> = None;
    let mut widen = |t: f64| {
        bounds = Some(match bounds {
            Some((lo, hi)) => (lo.min(t), hi.max(t)),
            None => (t, t),
        });
    };

    for report in &reports {
        widen(report.timestamp_s());
    }
    for clearance in &clearances {
        widen(clearance.time);
    }
    let Some((start, end)) = bounds else {
        return Vec::new();
    };

    for report in reports {
        engine.queue_report(report);
    }
    for clearance in clearances {
        engine.queue_clearance(clearance);
    }

    let step = step_s.max(1e-3);
    let mut alerts = Vec::new();
    let mut now = start;
    // One tick past the end so the last records clear the barrier.
    while now <= end + step {
        let outcome = engine.tick(now);
        alerts.extend(outcome.alerts);
        now += step;
    }

    tracing::info!(
        "replay finished: {:.1}s of traffic, {} alert(s)",
        end - start,
        alerts.len()
    );
    alerts
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::DateTime;
    use std::sync::Arc;
    use taxiguard_core::{
        Alert, ClearanceKind, FeatureGeometry, FeatureKind, SafetyRules, SurfaceFeature,
        SurfaceMap, ViolationKind,
    };

    const FIELD_LAT: f64 = 41.7868;
    const FIELD_LON: f64 = -87.7522;

    /// Runway 31C with its hold-short line, all near the field reference.
    fn surface() -> Arc<SurfaceMap> {
        let dlat = 1000.0 / 111_000.0;
        let dlon = 30.0 / 83_000.0;
        let runway = SurfaceFeature {
            id: "31C".to_string(),
            kind: FeatureKind::Runway,
            geometry: FeatureGeometry::Polygon {
                ring: vec![
                    [FIELD_LAT - dlat, FIELD_LON - dlon],
                    [FIELD_LAT - dlat, FIELD_LON + dlon],
                    [FIELD_LAT + dlat, FIELD_LON + dlon],
                    [FIELD_LAT + dlat, FIELD_LON - dlon],
                    [FIELD_LAT - dlat, FIELD_LON - dlon],
                ],
            },
        };
        let hold_lat = FIELD_LAT;
        let hold = SurfaceFeature {
            id: "31C-hold".to_string(),
            kind: FeatureKind::HoldShortLine,
            geometry: FeatureGeometry::Polyline {
                points: vec![
                    [hold_lat, FIELD_LON + 40.0 / 83_000.0],
                    [hold_lat, FIELD_LON + 80.0 / 83_000.0],
                ],
                width_m: 2.0,
            },
        };
        Arc::new(SurfaceMap::new(vec![runway, hold]))
    }

    /// Observed-crossing-only rules: no projection, no approach buffer.
    fn strict_rules() -> SafetyRules {
        SafetyRules {
            hold_projection_s: 0.0,
            hold_short_buffer_m: 0.0,
            smoothing_alpha: 1.0,
            ..SafetyRules::default()
        }
    }

    fn report(id: &str, t_s: f64, north_m: f64, east_m: f64) -> PositionReport {
        PositionReport {
            aircraft_id: id.to_string(),
            timestamp: DateTime::from_timestamp_millis((t_s * 1000.0) as i64).unwrap(),
            lat: FIELD_LAT + north_m / 111_000.0,
            lon: FIELD_LON + east_m / 83_000.0,
            altitude_m: 0.0,
            ground_speed_mps: 8.0,
            track_deg: 0.0,
        }
    }

    /// Northbound taxi from 96 m south of the hold line, 8 m/s, fixes every
    /// two seconds: the line is crossed between t=10 and t=12.
    fn taxi_run() -> Vec<PositionReport> {
        (0..=8)
            .map(|i| {
                let t = (i * 2) as f64;
                report("LXJ560", t, -96.0 + 8.0 * t, 60.0)
            })
            .collect()
    }

    fn clearance(command: ClearanceKind, reference: &str, time: f64) -> Clearance {
        Clearance {
            aircraft_id: "LXJ560".to_string(),
            command,
            reference: reference.to_string(),
            time,
        }
    }

    #[test]
    fn hold_short_crossing_replays_to_one_violation() {
        let mut engine = TickEngine::new(strict_rules(), surface());
        let alerts = run_replay(
            &mut engine,
            taxi_run(),
            vec![clearance(ClearanceKind::HoldShort, "31C-hold", 0.0)],
            1.0,
        );

        let violations: Vec<_> = alerts
            .iter()
            .filter_map(|record| match &record.alert {
                Alert::Compliance(event) => Some(event),
                _ => None,
            })
            .filter(|event| event.violation == ViolationKind::HoldShortViolation)
            .collect();
        assert_eq!(violations.len(), 1);
        assert_eq!(violations[0].aircraft_id, "LXJ560");
        assert_eq!(violations[0].reference, "31C-hold");
        assert!((violations[0].time_s - 12.0).abs() < 1e-9);
    }

    #[test]
    fn cleared_crossing_replays_clean() {
        let mut engine = TickEngine::new(strict_rules(), surface());
        let alerts = run_replay(
            &mut engine,
            taxi_run(),
            vec![
                clearance(ClearanceKind::HoldShort, "31C-hold", 0.0),
                clearance(ClearanceKind::ClearToCross, "31C-hold", 5.0),
            ],
            1.0,
        );

        let compliance_alerts = alerts
            .iter()
            .filter(|record| matches!(record.alert, Alert::Compliance(_)))
            .count();
        assert_eq!(compliance_alerts, 0);
    }

    #[test]
    fn converging_taxi_traffic_alerts_once_per_episode() {
        let mut engine = TickEngine::new(strict_rules(), surface());

        // Nose to nose along the taxi lane east of the runway.
        let mut reports = Vec::new();
        for i in 0..=10 {
            let t = (i * 2) as f64;
            reports.push(report("LXJ560", t, -400.0 + 8.0 * t, 200.0));
            reports.push(report("SWA2504", t, 400.0 - 8.0 * t, 200.0));
        }
        // Southbound traffic needs its own heading.
        let mut reports: Vec<PositionReport> = reports
            .into_iter()
            .map(|mut r| {
                if r.aircraft_id == "SWA2504" {
                    r.track_deg = 180.0;
                }
                r
            })
            .collect();
        reports.sort_by(|a, b| a.timestamp.cmp(&b.timestamp));

        let alerts = run_replay(&mut engine, reports, Vec::new(), 1.0);
        let conflict_alerts = alerts
            .iter()
            .filter(|record| matches!(record.alert, Alert::Conflict(_)))
            .count();
        // The pair stays in conflict for many ticks; one episode, one alert.
        assert_eq!(conflict_alerts, 1);
    }

    #[test]
    fn empty_input_is_a_no_op() {
        let mut engine = TickEngine::new(strict_rules(), surface());
        assert!(run_replay(&mut engine, Vec::new(), Vec::new(), 1.0).is_empty());
    }
}

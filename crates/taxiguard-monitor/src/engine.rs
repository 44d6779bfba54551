//! The per-tick evaluation pipeline shared by batch replay and live mode.
//!
//! Incoming reports and clearances buffer here and are released to the
//! estimator in non-decreasing timestamp order across all aircraft. A tick
//! is a barrier: every report at or before the tick time lands before the
//! conflict detector and compliance monitor run, so both always see one
//! globally consistent snapshot.

use std::cmp::{Ordering, Reverse};
use std::collections::{BTreeMap, BinaryHeap};
use std::sync::Arc;

use taxiguard_core::{
    AircraftState, AlertEmitter, AlertRecord, Clearance, ComplianceMonitor, ConflictDetector,
    PositionReport, SafetyRules, SurfaceMap, TrajectoryEstimator,
};

/// Heap entry ordered by release time, with an insertion sequence so equal
/// timestamps keep their arrival order.
struct Queued<T> {
    time_s: f64,
    seq: u64,
    record: T,
}

impl<T> PartialEq for Queued<T> {
    fn eq(&self, other: &Self) -> bool {
        self.time_s == other.time_s && self.seq == other.seq
    }
}

impl<T> Eq for Queued<T> {}

impl<T> PartialOrd for Queued<T> {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl<T> Ord for Queued<T> {
    fn cmp(&self, other: &Self) -> Ordering {
        self.time_s
            .total_cmp(&other.time_s)
            .then(self.seq.cmp(&other.seq))
    }
}

/// Everything one tick produced.
pub struct TickOutcome {
    pub time_s: f64,
    pub alerts: Vec<AlertRecord>,
    pub evicted: Vec<String>,
    pub states: BTreeMap<String, AircraftState>,
}

pub struct TickEngine {
    surface: Arc<SurfaceMap>,
    estimator: TrajectoryEstimator,
    detector: ConflictDetector,
    monitor: ComplianceMonitor,
    emitter: AlertEmitter,
    reports: BinaryHeap<Reverse<Queued<PositionReport>>>,
    clearances: BinaryHeap<Reverse<Queued<Clearance>>>,
    queue_seq: u64,
}

impl TickEngine {
    pub fn new(rules: SafetyRules, surface: Arc<SurfaceMap>) -> Self {
        Self {
            surface,
            estimator: TrajectoryEstimator::new(rules.clone()),
            detector: ConflictDetector::new(rules.clone()),
            monitor: ComplianceMonitor::new(rules),
            emitter: AlertEmitter::new(),
            reports: BinaryHeap::new(),
            clearances: BinaryHeap::new(),
            queue_seq: 0,
        }
    }

    pub fn queue_report(&mut self, report: PositionReport) {
        self.queue_seq += 1;
        self.reports.push(Reverse(Queued {
            time_s: report.timestamp_s(),
            seq: self.queue_seq,
            record: report,
        }));
    }

    pub fn queue_clearance(&mut self, clearance: Clearance) {
        self.queue_seq += 1;
        self.clearances.push(Reverse(Queued {
            time_s: clearance.time,
            seq: self.queue_seq,
            record: clearance,
        }));
    }

    pub fn pending(&self) -> usize {
        self.reports.len() + self.clearances.len()
    }

    /// Run one evaluation tick at the given logical time.
    pub fn tick(&mut self, now_s: f64) -> TickOutcome {
        // Instructions valid at this tick take effect before any movement
        // is judged against them.
        while let Some(Reverse(queued)) = self.clearances.peek() {
            if queued.time_s > now_s {
                break;
            }
            let Some(Reverse(queued)) = self.clearances.pop() else {
                break;
            };
            if let Err(err) = self.monitor.apply_clearance(&queued.record, &self.surface) {
                tracing::warn!(
                    aircraft = %queued.record.aircraft_id,
                    "skipping clearance: {err}"
                );
            }
        }

        // Barrier: drain every report at or before the tick time, in global
        // timestamp order.
        while let Some(Reverse(queued)) = self.reports.peek() {
            if queued.time_s > now_s {
                break;
            }
            let Some(Reverse(queued)) = self.reports.pop() else {
                break;
            };
            if let Err(err) = self.estimator.update(&queued.record) {
                tracing::warn!(
                    aircraft = %queued.record.aircraft_id,
                    "dropping report: {err}"
                );
            }
        }

        let evicted = self.estimator.evict_silent(now_s);
        if !evicted.is_empty() {
            tracing::info!("evicted {} silent track(s): {:?}", evicted.len(), evicted);
        }

        let states = self.estimator.snapshot();
        let conflicts = self.detector.evaluate(&states, &self.surface, now_s);
        let violations = self.monitor.evaluate(&states, &self.surface, now_s);
        let alerts = self.emitter.ingest(conflicts, violations);

        TickOutcome {
            time_s: now_s,
            alerts,
            evicted,
            states,
        }
    }
}

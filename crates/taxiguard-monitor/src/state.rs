//! Shared read-mostly store published to external consumers.
//!
//! The tick engine owns all mutable evaluation state; this store only holds
//! the latest immutable snapshots and the alert log for a renderer or
//! logger to poll.

use dashmap::DashMap;
use std::collections::BTreeMap;
use std::sync::atomic::{AtomicU64, Ordering};

use taxiguard_core::{AircraftState, AlertRecord};

pub struct AppState {
    aircraft: DashMap<String, AircraftState>,
    alerts: DashMap<u64, AlertRecord>,
    last_tick_ms: AtomicU64,
}

impl Default for AppState {
    fn default() -> Self {
        Self::new()
    }
}

impl AppState {
    pub fn new() -> Self {
        Self {
            aircraft: DashMap::new(),
            alerts: DashMap::new(),
            last_tick_ms: AtomicU64::new(0),
        }
    }

    /// Replace the published fleet snapshot with this tick's view.
    pub fn publish_states(&self, states: &BTreeMap<String, AircraftState>, evicted: &[String]) {
        for id in evicted {
            self.aircraft.remove(id);
        }
        for (id, state) in states {
            self.aircraft.insert(id.clone(), state.clone());
        }
    }

    /// Append this tick's sequenced alerts.
    pub fn publish_alerts(&self, alerts: &[AlertRecord]) {
        for alert in alerts {
            self.alerts.insert(alert.seq, alert.clone());
        }
    }

    pub fn set_last_tick_s(&self, time_s: f64) {
        self.last_tick_ms
            .store((time_s * 1000.0) as u64, Ordering::Relaxed);
    }

    pub fn last_tick_s(&self) -> f64 {
        self.last_tick_ms.load(Ordering::Relaxed) as f64 / 1000.0
    }

    pub fn aircraft(&self) -> Vec<AircraftState> {
        let mut out: Vec<AircraftState> = self.aircraft.iter().map(|r| r.value().clone()).collect();
        out.sort_by(|a, b| a.aircraft_id.cmp(&b.aircraft_id));
        out
    }

    /// Alerts with sequence numbers above `seq`, in order. A consumer that
    /// reconnects after seeing N calls this with N and misses nothing.
    pub fn alerts_since(&self, seq: u64) -> Vec<AlertRecord> {
        let mut out: Vec<AlertRecord> = self
            .alerts
            .iter()
            .filter(|r| *r.key() > seq)
            .map(|r| r.value().clone())
            .collect();
        out.sort_by_key(|record| record.seq);
        out
    }
}

//! Safety thresholds and severity tier boundaries.

use serde::{Deserialize, Serialize};

/// Severity of a detected conflict.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    /// Converging but time to react remains
    Info,
    /// Loss of separation predicted inside the warning band
    Warning,
    /// Imminent or current separation violation
    Critical,
}

/// Time-to-closest-approach boundaries for severity assignment.
/// Shorter time to closest approach means higher severity; the exact
/// boundaries differ between surface and airborne operation.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct SeverityTiers {
    /// TCA at or below this many seconds is Critical.
    pub critical_within_s: f64,
    /// TCA at or below this many seconds (and above critical) is Warning.
    pub warning_within_s: f64,
}

impl SeverityTiers {
    pub fn classify(&self, tca_s: f64) -> Severity {
        if tca_s <= self.critical_within_s {
            Severity::Critical
        } else if tca_s <= self.warning_within_s {
            Severity::Warning
        } else {
            Severity::Info
        }
    }
}

/// Configuration for the evaluation pipeline. All thresholds are externally
/// supplied; these defaults suit a mid-size towered field.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SafetyRules {
    /// Minimum horizontal separation in meters.
    pub min_horizontal_separation_m: f64,
    /// Minimum vertical separation in meters, applied to airborne pairs.
    pub min_vertical_separation_m: f64,
    /// Prediction horizon in seconds.
    pub horizon_s: f64,
    /// Trajectory sampling step in seconds.
    pub sample_step_s: f64,
    /// Seconds without a report before a track is evicted.
    pub silence_timeout_s: f64,
    /// Exponential smoothing factor for velocity estimates, in (0, 1].
    /// 1.0 disables smoothing.
    pub smoothing_alpha: f64,
    /// Altitude at or below which an aircraft is treated as on the surface.
    pub ground_ceiling_m: f64,
    /// Buffer applied around hold-short geometry before crossing tests.
    pub hold_short_buffer_m: f64,
    /// How far ahead the hold-short early warning projects, in seconds.
    pub hold_projection_s: f64,
    /// Capture radius when snapping surface traffic to centerlines.
    pub centerline_capture_m: f64,
    /// Severity bands for airborne pairs.
    pub airborne_tiers: SeverityTiers,
    /// Severity bands for surface pairs.
    pub ground_tiers: SeverityTiers,
}

impl Default for SafetyRules {
    fn default() -> Self {
        Self {
            min_horizontal_separation_m: 150.0,
            min_vertical_separation_m: 100.0,
            horizon_s: 60.0,
            sample_step_s: 1.0,
            silence_timeout_s: 30.0,
            smoothing_alpha: 0.5,
            ground_ceiling_m: 30.0,
            hold_short_buffer_m: 40.0,
            hold_projection_s: 30.0,
            centerline_capture_m: 60.0,
            airborne_tiers: SeverityTiers {
                critical_within_s: 12.0,
                warning_within_s: 30.0,
            },
            ground_tiers: SeverityTiers {
                critical_within_s: 8.0,
                warning_within_s: 20.0,
            },
        }
    }
}

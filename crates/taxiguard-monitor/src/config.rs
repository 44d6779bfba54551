//! Monitor configuration from environment.

use std::env;

use taxiguard_core::SafetyRules;

#[derive(Debug, Clone)]
pub struct Config {
    /// Evaluation tick step in seconds.
    pub tick_step_s: f64,
    pub rules: SafetyRules,
}

impl Config {
    pub fn from_env() -> Self {
        // A rules file carries every threshold including the severity tier
        // boundaries; individual env vars override on top.
        let mut rules: SafetyRules = env::var("TAXIGUARD_RULES")
            .ok()
            .and_then(|path| std::fs::read_to_string(path).ok())
            .and_then(|raw| serde_json::from_str(&raw).ok())
            .unwrap_or_default();
        apply_env_overrides(&mut rules);

        Self {
            tick_step_s: env_f64("TAXIGUARD_TICK_S").unwrap_or(1.0),
            rules,
        }
    }
}

fn apply_env_overrides(rules: &mut SafetyRules) {
    if let Some(v) = env_f64("TAXIGUARD_HORIZON_S") {
        rules.horizon_s = v;
    }
    if let Some(v) = env_f64("TAXIGUARD_SAMPLE_STEP_S") {
        rules.sample_step_s = v;
    }
    if let Some(v) = env_f64("TAXIGUARD_MIN_HORIZONTAL_M") {
        rules.min_horizontal_separation_m = v;
    }
    if let Some(v) = env_f64("TAXIGUARD_MIN_VERTICAL_M") {
        rules.min_vertical_separation_m = v;
    }
    if let Some(v) = env_f64("TAXIGUARD_SILENCE_TIMEOUT_S") {
        rules.silence_timeout_s = v;
    }
    if let Some(v) = env_f64("TAXIGUARD_HOLD_BUFFER_M") {
        rules.hold_short_buffer_m = v;
    }
}

fn env_f64(key: &str) -> Option<f64> {
    env::var(key).ok().and_then(|s| s.parse().ok())
}

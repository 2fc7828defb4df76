//! Flat registry of tunable coefficients.
//!
//! Every probability, scale and threshold in the engine is pulled from here
//! through [`TuningConfig::get`], so a run can be re-shaped from a single
//! JSON file without touching code. Construction merges three layers:
//! built-in defaults <- JSON overrides file <- programmatic overrides.
//! Keys that are not part of the default table are dropped at load, and
//! values that fail numeric conversion are ignored.

use std::collections::HashMap;
use std::path::Path;

use once_cell::sync::Lazy;
use serde_json::Value;

/// Built-in defaults for the user-adjustable knobs.
pub static DEFAULT_TUNING: Lazy<HashMap<&'static str, f64>> = Lazy::new(|| {
    HashMap::from([
        // Global run environment
        ("offense_scale", 1.0),
        ("pitching_dom_scale", 1.0),
        // Plate discipline / swing behaviour
        ("zone_swing_scale", 1.0),
        ("chase_scale", 1.0),
        ("two_strike_aggression_scale", 1.0),
        ("eye_scale", 1.0),
        // Outcomes
        ("hr_scale", 1.0),
        ("babip_scale", 1.0),
        ("walk_scale", 1.0),
        ("k_scale", 1.0),
        ("contact_quality_scale", 1.0),
        // Pitch/command
        ("velocity_scale", 1.0),
        ("movement_scale", 1.0),
        ("command_variance_scale", 1.0),
        ("fatigue_decay_scale", 1.0),
        // Park/environment
        ("park_size_scale", 1.0),
        ("foul_territory_scale", 1.0),
        ("wind_speed", 0.0),
        ("wind_angle_deg", 0.0),
        ("altitude_scale", 1.0),
        // Fielding / baserunning
        ("range_scale", 1.0),
        ("arm_strength_scale", 1.0),
        ("error_rate_scale", 1.0),
        ("speed_scale", 1.0),
        ("steal_freq_scale", 1.0),
        ("advancement_aggression_scale", 1.0),
        // Batted-ball shape
        ("gb_fb_tilt", 1.0),
    ])
});

/// Container for all user-adjustable tuning knobs.
#[derive(Debug, Clone)]
pub struct TuningConfig {
    values: HashMap<String, f64>,
}

impl Default for TuningConfig {
    fn default() -> Self {
        Self {
            values: DEFAULT_TUNING.iter().map(|(k, v)| (k.to_string(), *v)).collect(),
        }
    }
}

fn as_f64(value: &Value) -> Option<f64> {
    match value {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => s.trim().parse().ok(),
        _ => None,
    }
}

impl TuningConfig {
    /// Merge defaults with an optional JSON overrides file and optional
    /// in-memory overrides (the latter win). Conversion failures and
    /// unknown keys never abort loading.
    pub fn from_overrides(
        overrides: Option<&HashMap<String, Value>>,
        overrides_path: Option<&Path>,
    ) -> Self {
        let mut merged = Self::default();
        let mut data: HashMap<String, Value> = HashMap::new();
        if let Some(path) = overrides_path {
            if let Some(loaded) = crate::store::read_json::<HashMap<String, Value>>(path) {
                data.extend(loaded);
            }
        }
        if let Some(extra) = overrides {
            data.extend(extra.iter().map(|(k, v)| (k.clone(), v.clone())));
        }
        for (key, value) in data {
            if !merged.values.contains_key(key.as_str()) {
                continue;
            }
            if let Some(parsed) = as_f64(&value) {
                merged.values.insert(key, parsed);
            }
        }
        merged
    }

    /// Look up `key`, falling back to `default` when absent.
    pub fn get(&self, key: &str, default: f64) -> f64 {
        self.values.get(key).copied().unwrap_or(default)
    }

    /// Programmatic override; primarily for tests and calibration harnesses.
    pub fn set(&mut self, key: &str, value: f64) {
        self.values.insert(key.to_string(), value);
    }
}

/// Load a [`TuningConfig`] merging optional overrides.
pub fn load_tuning(
    overrides: Option<&HashMap<String, Value>>,
    overrides_path: Option<&Path>,
) -> TuningConfig {
    TuningConfig::from_overrides(overrides, overrides_path)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn defaults_are_neutral() {
        let tuning = TuningConfig::default();
        assert_eq!(tuning.get("offense_scale", 0.0), 1.0);
        assert_eq!(tuning.get("wind_speed", 9.0), 0.0);
    }

    #[test]
    fn unknown_keys_are_dropped() {
        let mut overrides = HashMap::new();
        overrides.insert("not_a_knob".to_string(), json!(3.5));
        overrides.insert("hr_scale".to_string(), json!(1.2));
        let tuning = TuningConfig::from_overrides(Some(&overrides), None);
        assert_eq!(tuning.get("not_a_knob", 0.0), 0.0);
        assert_eq!(tuning.get("hr_scale", 1.0), 1.2);
    }

    #[test]
    fn non_numeric_values_are_ignored() {
        let mut overrides = HashMap::new();
        overrides.insert("hr_scale".to_string(), json!({"nested": true}));
        overrides.insert("k_scale".to_string(), json!("1.4"));
        let tuning = TuningConfig::from_overrides(Some(&overrides), None);
        assert_eq!(tuning.get("hr_scale", 1.0), 1.0);
        assert_eq!(tuning.get("k_scale", 1.0), 1.4);
    }

    #[test]
    fn file_overrides_merge_under_programmatic_ones() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("tuning.json");
        std::fs::write(&path, r#"{"hr_scale": 1.5, "babip_scale": 0.9}"#).unwrap();
        let mut overrides = HashMap::new();
        overrides.insert("hr_scale".to_string(), json!(2.0));
        let tuning = TuningConfig::from_overrides(Some(&overrides), Some(&path));
        assert_eq!(tuning.get("hr_scale", 1.0), 2.0);
        assert_eq!(tuning.get("babip_scale", 1.0), 0.9);
    }

    #[test]
    fn missing_keys_fall_back_to_supplied_default() {
        let tuning = TuningConfig::default();
        assert_eq!(tuning.get("hook_threshold", 1.6), 1.6);
    }
}

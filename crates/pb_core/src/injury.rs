//! Injury resolution from gameplay triggers.
//!
//! Consumes `data/injury_catalog.json` and exposes a small API the game
//! engine calls whenever an injury-eligible trigger fires (collisions,
//! HBPs, pitcher overuse). The trigger context becomes a probability, a
//! severity tier and an injury template, returned as a structured outcome.

use std::collections::HashMap;
use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::engine::rng::GameRng;

pub const DEFAULT_SEVERITY_WEIGHTS: [(&str, f64); 3] =
    [("minor", 0.7), ("moderate", 0.25), ("major", 0.05)];

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct TriggerDef {
    #[serde(default)]
    pub base_probability: f64,
    #[serde(default)]
    pub modifiers: HashMap<String, f64>,
    #[serde(default)]
    pub severities: Vec<String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SeverityProfile {
    #[serde(default = "one")]
    pub min_days: u32,
    #[serde(default = "one")]
    pub max_days: u32,
    #[serde(default)]
    pub dl_tier: Option<String>,
    #[serde(default)]
    pub attributes_penalty: HashMap<String, i32>,
    #[serde(default)]
    pub description: Option<String>,
}

fn one() -> u32 {
    1
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct InjuryTemplate {
    #[serde(default)]
    pub id: Option<String>,
    pub name: String,
    #[serde(default)]
    pub body_part: String,
    #[serde(default)]
    pub eligible_triggers: Vec<String>,
    #[serde(default)]
    pub pitcher_only: bool,
    #[serde(default)]
    pub hitter_only: bool,
    #[serde(default)]
    pub severity_profiles: HashMap<String, SeverityProfile>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct InjuryCatalog {
    #[serde(default)]
    pub triggers: HashMap<String, TriggerDef>,
    #[serde(default)]
    pub injuries: Vec<InjuryTemplate>,
}

impl InjuryCatalog {
    /// Load the catalog, bootstrapping a minimal default when the file is
    /// missing or corrupt.
    pub fn load(path: &Path) -> Self {
        crate::store::read_json(path).unwrap_or_else(Self::bootstrap)
    }

    /// Small built-in catalog so injuries keep working without data files.
    pub fn bootstrap() -> Self {
        let profile = |min_days: u32, max_days: u32, dl_tier: &str, description: &str| {
            SeverityProfile {
                min_days,
                max_days,
                dl_tier: Some(dl_tier.to_string()),
                attributes_penalty: HashMap::new(),
                description: Some(description.to_string()),
            }
        };
        let tiered = |minor: SeverityProfile, moderate: SeverityProfile, major: SeverityProfile| {
            HashMap::from([
                ("minor".to_string(), minor),
                ("moderate".to_string(), moderate),
                ("major".to_string(), major),
            ])
        };
        Self {
            triggers: HashMap::from([
                (
                    "hit_by_pitch".to_string(),
                    TriggerDef {
                        base_probability: 0.08,
                        modifiers: HashMap::from([
                            ("pitch_velocity_factor".to_string(), 0.5),
                            ("durability_factor".to_string(), -0.4),
                        ]),
                        severities: vec![
                            "minor".to_string(),
                            "moderate".to_string(),
                            "major".to_string(),
                        ],
                    },
                ),
                (
                    "collision".to_string(),
                    TriggerDef {
                        base_probability: 0.05,
                        modifiers: HashMap::from([
                            ("speed_factor".to_string(), 0.4),
                            ("durability_factor".to_string(), -0.4),
                        ]),
                        severities: vec!["minor".to_string(), "moderate".to_string()],
                    },
                ),
                (
                    "pitcher_overuse".to_string(),
                    TriggerDef {
                        base_probability: 0.06,
                        modifiers: HashMap::from([
                            ("fatigue_factor".to_string(), 0.8),
                            ("durability_factor".to_string(), -0.5),
                        ]),
                        severities: vec![
                            "minor".to_string(),
                            "moderate".to_string(),
                            "major".to_string(),
                        ],
                    },
                ),
            ]),
            injuries: vec![
                InjuryTemplate {
                    id: Some("bruised_forearm".to_string()),
                    name: "Bruised Forearm".to_string(),
                    body_part: "forearm".to_string(),
                    eligible_triggers: vec!["hit_by_pitch".to_string()],
                    pitcher_only: false,
                    hitter_only: false,
                    severity_profiles: tiered(
                        profile(1, 3, "none", "Day-to-day with a bruised forearm"),
                        profile(4, 10, "dl10", "Deep forearm bruise"),
                        profile(11, 25, "dl15", "Forearm fracture scare"),
                    ),
                },
                InjuryTemplate {
                    id: Some("ankle_sprain".to_string()),
                    name: "Ankle Sprain".to_string(),
                    body_part: "ankle".to_string(),
                    eligible_triggers: vec!["collision".to_string()],
                    pitcher_only: false,
                    hitter_only: true,
                    severity_profiles: tiered(
                        profile(2, 5, "none", "Rolled ankle on the bag"),
                        profile(6, 14, "dl10", "Moderate ankle sprain"),
                        profile(15, 40, "dl15", "High ankle sprain"),
                    ),
                },
                InjuryTemplate {
                    id: Some("elbow_inflammation".to_string()),
                    name: "Elbow Inflammation".to_string(),
                    body_part: "elbow".to_string(),
                    eligible_triggers: vec!["pitcher_overuse".to_string()],
                    pitcher_only: true,
                    hitter_only: false,
                    severity_profiles: tiered(
                        profile(3, 8, "dl10", "Elbow soreness after a heavy workload"),
                        profile(9, 20, "dl15", "Elbow inflammation"),
                        profile(21, 60, "dl45", "Flexor strain"),
                    ),
                },
            ],
        }
    }
}

/// Structured result describing a freshly-created injury.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InjuryOutcome {
    pub injury_id: String,
    pub name: String,
    pub severity: String,
    pub days: u32,
    pub dl_tier: String,
    pub body_part: String,
    pub attributes_penalty: HashMap<String, i32>,
    pub description: String,
}

/// Probability engine that selects injuries based on catalog metadata.
#[derive(Debug, Clone)]
pub struct InjurySimulator {
    catalog: InjuryCatalog,
    severity_weights: HashMap<String, f64>,
}

impl Default for InjurySimulator {
    fn default() -> Self {
        Self::new(InjuryCatalog::bootstrap())
    }
}

impl InjurySimulator {
    pub fn new(catalog: InjuryCatalog) -> Self {
        Self {
            catalog,
            severity_weights: DEFAULT_SEVERITY_WEIGHTS
                .iter()
                .map(|(k, v)| (k.to_string(), *v))
                .collect(),
        }
    }

    pub fn available_triggers(&self) -> Vec<&str> {
        self.catalog.triggers.keys().map(|k| k.as_str()).collect()
    }

    /// Attempt to generate an injury for a player based on `trigger`.
    ///
    /// `context` maps modifier metrics (e.g. `fatigue`, `pitch_velocity`)
    /// to values; `durability` defaults in normalized to `[0, 1]`. When
    /// `force` is set the probability roll is skipped.
    pub fn maybe_create_injury(
        &self,
        trigger: &str,
        is_pitcher: bool,
        durability: f64,
        context: &HashMap<String, f64>,
        force: bool,
        severity_override: Option<&str>,
        rng: &mut GameRng,
    ) -> Option<InjuryOutcome> {
        let trigger_def = self.catalog.triggers.get(trigger)?;

        let mut ctx = context.clone();
        ctx.entry("durability".to_string())
            .or_insert((durability / 100.0).clamp(0.0, 1.0));
        let probability = Self::compute_probability(trigger_def, &ctx);
        if !force && !rng.chance(probability) {
            return None;
        }

        let severity = match severity_override {
            Some(tier) => tier.to_string(),
            None => self.choose_severity(trigger_def, rng)?,
        };

        let (injury, profile) = self.choose_template(trigger, &severity, is_pitcher, rng)?;
        let min_days = profile.min_days.max(1);
        let max_days = profile.max_days.max(min_days);
        let days = rng.int_in(min_days, max_days);
        Some(InjuryOutcome {
            injury_id: injury
                .id
                .clone()
                .unwrap_or_else(|| injury.name.to_lowercase())
                .to_lowercase(),
            name: injury.name.clone(),
            severity,
            days,
            dl_tier: profile.dl_tier.clone().unwrap_or_else(|| "dl15".to_string()),
            body_part: injury.body_part.clone(),
            attributes_penalty: profile.attributes_penalty.clone(),
            description: profile.description.clone().unwrap_or_else(|| injury.name.clone()),
        })
    }

    fn compute_probability(trigger_def: &TriggerDef, context: &HashMap<String, f64>) -> f64 {
        let mut probability = trigger_def.base_probability;
        for (modifier_key, factor) in &trigger_def.modifiers {
            let metric_key = modifier_key.strip_suffix("_factor").unwrap_or(modifier_key);
            let metric = context.get(metric_key).copied().unwrap_or(0.0);
            probability *= (1.0 + factor * metric).max(0.0);
        }
        probability.clamp(0.0, 1.0)
    }

    fn choose_severity(&self, trigger_def: &TriggerDef, rng: &mut GameRng) -> Option<String> {
        let severities: Vec<String> = if trigger_def.severities.is_empty() {
            DEFAULT_SEVERITY_WEIGHTS.iter().map(|(k, _)| k.to_string()).collect()
        } else {
            trigger_def.severities.clone()
        };
        let weights: Vec<f64> = severities
            .iter()
            .map(|s| self.severity_weights.get(s).copied().unwrap_or(0.0))
            .collect();
        let total: f64 = weights.iter().sum();
        if total <= 0.0 {
            return rng.index(severities.len()).map(|i| severities[i].clone());
        }
        let roll = rng.uniform() * total;
        let mut upto = 0.0;
        for (severity, weight) in severities.iter().zip(&weights) {
            upto += weight;
            if roll <= upto {
                return Some(severity.clone());
            }
        }
        severities.last().cloned()
    }

    fn choose_template(
        &self,
        trigger: &str,
        severity: &str,
        is_pitcher: bool,
        rng: &mut GameRng,
    ) -> Option<(&InjuryTemplate, &SeverityProfile)> {
        let candidates: Vec<(&InjuryTemplate, &SeverityProfile)> = self
            .catalog
            .injuries
            .iter()
            .filter(|injury| injury.eligible_triggers.iter().any(|t| t == trigger))
            .filter(|injury| !(injury.pitcher_only && !is_pitcher))
            .filter(|injury| !(injury.hitter_only && is_pitcher))
            .filter_map(|injury| {
                injury.severity_profiles.get(severity).map(|profile| (injury, profile))
            })
            .collect();
        rng.index(candidates.len()).map(|i| candidates[i])
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn forced_injury_returns_a_structured_outcome() {
        let sim = InjurySimulator::default();
        let mut rng = GameRng::seed_from(1);
        let outcome = sim
            .maybe_create_injury(
                "hit_by_pitch",
                false,
                50.0,
                &HashMap::new(),
                true,
                None,
                &mut rng,
            )
            .expect("forced injury");
        assert!(!outcome.name.is_empty());
        assert!(outcome.days >= 1);
        assert!(["minor", "moderate", "major"].contains(&outcome.severity.as_str()));
    }

    #[test]
    fn pitcher_only_templates_skip_hitters() {
        let sim = InjurySimulator::default();
        let mut rng = GameRng::seed_from(2);
        let outcome = sim.maybe_create_injury(
            "pitcher_overuse",
            false,
            50.0,
            &HashMap::new(),
            true,
            None,
            &mut rng,
        );
        assert!(outcome.is_none());
    }

    #[test]
    fn unknown_trigger_yields_nothing() {
        let sim = InjurySimulator::default();
        let mut rng = GameRng::seed_from(3);
        assert!(sim
            .maybe_create_injury("alien_abduction", true, 50.0, &HashMap::new(), true, None, &mut rng)
            .is_none());
    }

    #[test]
    fn severity_override_picks_the_requested_profile() {
        let sim = InjurySimulator::default();
        let mut rng = GameRng::seed_from(4);
        let outcome = sim
            .maybe_create_injury(
                "pitcher_overuse",
                true,
                50.0,
                &HashMap::new(),
                true,
                Some("major"),
                &mut rng,
            )
            .unwrap();
        assert_eq!(outcome.severity, "major");
        assert!(outcome.days >= 21);
    }

    #[test]
    fn probability_multiplies_modifiers_and_clamps() {
        let trigger = TriggerDef {
            base_probability: 0.5,
            modifiers: HashMap::from([("fatigue_factor".to_string(), 2.0)]),
            severities: vec![],
        };
        let ctx = HashMap::from([("fatigue".to_string(), 1.0)]);
        assert_eq!(InjurySimulator::compute_probability(&trigger, &ctx), 1.0);
        let calm = HashMap::from([("fatigue".to_string(), -1.0)]);
        assert_eq!(InjurySimulator::compute_probability(&trigger, &calm), 0.0);
    }

    #[test]
    fn corrupt_catalog_bootstraps() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("injury_catalog.json");
        std::fs::write(&path, "{broken").unwrap();
        let catalog = InjuryCatalog::load(&path);
        assert!(!catalog.triggers.is_empty());
        assert!(!catalog.injuries.is_empty());
    }
}

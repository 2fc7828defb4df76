//! Multi-game workload tracking.
//!
//! A sidecar consulted by the game engine at pitcher-selection points and
//! updated once per outing and once per day advance. Fatigue debt decays
//! daily with durability-scaled recovery and is converted into pre-game
//! penalties and availability by the staff builder.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};

use crate::models::player::{BatterRatings, PitcherRatings};
use crate::tuning::TuningConfig;

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct PitcherWorkload {
    pub fatigue_debt: f64,
    pub last_used_day: Option<u32>,
    pub consecutive_days_used: u32,
    pub last_update_day: Option<u32>,
    pub appearances: u32,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct BatterWorkload {
    pub fatigue_debt: f64,
    pub last_counted_day: Option<u32>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct UsageState {
    pub current_day: Option<u32>,
    pub workloads: HashMap<String, PitcherWorkload>,
    pub batter_workloads: HashMap<String, BatterWorkload>,
}

impl UsageState {
    pub fn workload_for(&mut self, pitcher_id: &str) -> &mut PitcherWorkload {
        self.workloads.entry(pitcher_id.to_string()).or_default()
    }

    pub fn batter_workload_for(&mut self, player_id: &str) -> &mut BatterWorkload {
        self.batter_workloads.entry(player_id.to_string()).or_default()
    }

    pub fn peek_workload(&self, pitcher_id: &str) -> Option<&PitcherWorkload> {
        self.workloads.get(pitcher_id)
    }

    /// Daily recovery pass. Must run before the first game of a day for
    /// every player who will appear.
    pub fn advance_day(
        &mut self,
        day: u32,
        pitchers: &[PitcherRatings],
        batters: &[BatterRatings],
        tuning: &TuningConfig,
    ) {
        let current = *self.current_day.get_or_insert(day);
        if day < current {
            return;
        }
        let days_passed = day - current;
        if days_passed == 0 {
            for pitcher in pitchers {
                let workload = self.workload_for(&pitcher.player_id);
                workload.last_update_day.get_or_insert(day);
            }
            return;
        }

        let base = tuning.get("daily_recovery_base", 20.0);
        let scale = tuning.get("daily_recovery_durability_scale", 0.4);
        for pitcher in pitchers {
            let recovery = f64::from(days_passed) * (base + pitcher.durability * scale);
            let workload = self.workload_for(&pitcher.player_id);
            workload.fatigue_debt = (workload.fatigue_debt - recovery).max(0.0);
            workload.last_update_day = Some(day);
            if let Some(last_used) = workload.last_used_day {
                if day - last_used > 1 {
                    workload.consecutive_days_used = 0;
                }
            }
        }

        let batter_base = tuning.get("batter_daily_recovery_base", 4.0);
        let batter_scale = tuning.get("batter_daily_recovery_durability_scale", 0.04);
        for batter in batters {
            let recovery =
                f64::from(days_passed) * (batter_base + batter.durability * batter_scale);
            let workload = self.batter_workload_for(&batter.player_id);
            workload.fatigue_debt = (workload.fatigue_debt - recovery).max(0.0);
        }

        self.current_day = Some(day);
    }

    /// Charge one pitching appearance, with a consecutive-day surcharge.
    pub fn record_outing(
        &mut self,
        pitcher_id: &str,
        pitches: u32,
        day: u32,
        multiplier: f64,
        tuning: &TuningConfig,
    ) {
        let debt_scale = tuning.get("fatigue_debt_scale", 1.0);
        let penalty = tuning.get("consecutive_usage_penalty", 8.0);
        let workload = self.workload_for(pitcher_id);
        workload.fatigue_debt += f64::from(pitches) * debt_scale * multiplier;
        if workload.last_used_day.map(|last| day.saturating_sub(last)) == Some(1) {
            workload.consecutive_days_used += 1;
        } else {
            workload.consecutive_days_used = 1;
        }
        workload.last_used_day = Some(day);
        workload.appearances += 1;
        if workload.consecutive_days_used > 1 {
            workload.fatigue_debt += penalty * f64::from(workload.consecutive_days_used - 1);
        }
    }

    /// Charge one game played to a position player, once per day.
    pub fn record_batter_game(
        &mut self,
        player_id: &str,
        day: u32,
        durability: f64,
        tuning: &TuningConfig,
    ) {
        let base = tuning.get("batter_game_fatigue_base", 6.5);
        let relief = tuning.get("batter_game_durability_relief", 0.02);
        let workload = self.batter_workload_for(player_id);
        if workload.last_counted_day == Some(day) {
            return;
        }
        workload.fatigue_debt += (base - durability * relief).max(0.0);
        workload.last_counted_day = Some(day);
    }

    pub fn batter_fatigue_debt(&self, player_id: &str) -> f64 {
        self.batter_workloads.get(player_id).map(|w| w.fatigue_debt).unwrap_or(0.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn pitcher(id: &str, durability: f64) -> PitcherRatings {
        let mut p = PitcherRatings::neutral(id);
        p.durability = durability;
        p
    }

    #[test]
    fn outing_debt_scales_with_pitches_and_multiplier() {
        let tuning = TuningConfig::default();
        let mut usage = UsageState::default();
        usage.record_outing("p1", 100, 3, 1.15, &tuning);
        let w = usage.peek_workload("p1").unwrap();
        assert!((w.fatigue_debt - 115.0).abs() < 1e-9);
        assert_eq!(w.consecutive_days_used, 1);
        assert_eq!(w.appearances, 1);
    }

    #[test]
    fn back_to_back_days_add_a_surcharge() {
        let tuning = TuningConfig::default();
        let mut usage = UsageState::default();
        usage.record_outing("p1", 20, 3, 1.0, &tuning);
        usage.record_outing("p1", 20, 4, 1.0, &tuning);
        let w = usage.peek_workload("p1").unwrap();
        assert_eq!(w.consecutive_days_used, 2);
        // 20 + 20 + one consecutive-day penalty of 8.
        assert!((w.fatigue_debt - 48.0).abs() < 1e-9);
    }

    #[test]
    fn recovery_floors_at_zero_and_resets_streaks() {
        let tuning = TuningConfig::default();
        let mut usage = UsageState::default();
        let staff = vec![pitcher("p1", 50.0)];
        usage.advance_day(1, &staff, &[], &tuning);
        usage.record_outing("p1", 30, 1, 1.0, &tuning);
        // Two idle days: debt 30 - 2*(20 + 50*0.4) floors at 0, streak resets.
        usage.advance_day(3, &staff, &[], &tuning);
        let w = usage.peek_workload("p1").unwrap();
        assert_eq!(w.fatigue_debt, 0.0);
        assert_eq!(w.consecutive_days_used, 0);
        assert_eq!(usage.current_day, Some(3));
    }

    #[test]
    fn days_never_run_backwards() {
        let tuning = TuningConfig::default();
        let mut usage = UsageState::default();
        usage.advance_day(5, &[], &[], &tuning);
        usage.advance_day(2, &[], &[], &tuning);
        assert_eq!(usage.current_day, Some(5));
    }

    #[test]
    fn batter_games_count_once_per_day() {
        let tuning = TuningConfig::default();
        let mut usage = UsageState::default();
        usage.record_batter_game("b1", 4, 50.0, &tuning);
        usage.record_batter_game("b1", 4, 50.0, &tuning);
        let debt = usage.batter_fatigue_debt("b1");
        assert!(debt > 0.0);
        usage.record_batter_game("b1", 5, 50.0, &tuning);
        assert!((usage.batter_fatigue_debt("b1") - debt * 2.0).abs() < 1e-9);
    }
}

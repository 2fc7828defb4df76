//! Single-pitch resolution.
//!
//! Given the effective batter and pitcher contexts plus the count, this
//! module selects a pitch, samples its velocity and location, runs the
//! swing decision, and classifies the outcome. Batted-ball contact exits
//! with sampled exit velocity, launch angle and spray; carry and hit type
//! are resolved downstream in [`crate::engine::batted_ball`].

use crate::models::player::{Hand, PitchType};
use crate::models::result::PitchOutcome;
use crate::tuning::TuningConfig;

use super::rng::GameRng;

/// Effective batter attributes after platoon and fatigue adjustments.
#[derive(Debug, Clone)]
pub struct BatterContext {
    pub contact: f64,
    pub power: f64,
    pub gb_tendency: f64,
    pub pull_tendency: f64,
    pub eye: f64,
    pub side: Hand,
    pub platoon_chase: f64,
    pub height: f64,
    pub zone_bottom: f64,
    pub zone_top: f64,
}

/// Effective pitcher attributes for one delivery.
#[derive(Debug, Clone)]
pub struct PitcherContext {
    pub pitch: PitchType,
    pub pitch_quality: f64,
    /// Base velocity after the arm-strength mapping.
    pub velocity: f64,
    /// Control after the fatigue command factor.
    pub control: f64,
    /// Movement after the fatigue movement factor.
    pub movement: f64,
    /// Velocity multiplier from fatigue.
    pub fatigue_factor: f64,
    pub hand: Hand,
    pub vs_left: f64,
}

/// Result of one resolved pitch.
#[derive(Debug, Clone)]
pub struct PitchResult {
    pub pitch_type: PitchType,
    pub pitch_quality: f64,
    pub velocity: f64,
    pub location: (f64, f64),
    pub in_zone: bool,
    pub swing: bool,
    pub contact: bool,
    pub foul: bool,
    pub in_play: bool,
    pub outcome: PitchOutcome,
    pub exit_velo: Option<f64>,
    pub launch_angle: Option<f64>,
    pub spray_angle: Option<f64>,
}

/// Vertical strike-zone bounds in normalized location units.
///
/// Explicit per-batter bounds win; otherwise the default half-zone is
/// stretched slightly with batter height around the 72-inch baseline.
pub fn strike_zone_bounds(
    height_in: f64,
    zone_bottom: Option<f64>,
    zone_top: Option<f64>,
    tuning: &TuningConfig,
) -> (f64, f64) {
    if let (Some(bottom), Some(top)) = (zone_bottom, zone_top) {
        if bottom < top {
            return (bottom, top);
        }
    }
    let stretch = (height_in - 72.0) / 300.0 * tuning.get("zone_height_scale", 1.0);
    (-0.5 - stretch, 0.5 + stretch)
}

/// How far a location missed the zone, in normalized units; zero when the
/// pitch is within bounds. Drives wild-pitch and dropped-third-strike rates.
pub fn miss_distance(
    location: (f64, f64),
    zone_bottom: f64,
    zone_top: f64,
    _tuning: &TuningConfig,
) -> f64 {
    let (x, y) = location;
    let horizontal = (x.abs() - 0.5).max(0.0);
    let vertical = (zone_bottom - y).max(0.0).max(y - zone_top);
    horizontal + vertical
}

/// Sample pitch location as a 2-D Gaussian whose spread grows as command
/// falls off.
pub fn sample_pitch_location(command: f64, rng: &mut GameRng) -> (f64, f64) {
    let spread = ((100.0 - command) / 300.0).max(0.1);
    (rng.gauss(0.0, spread), rng.gauss(0.0, spread))
}

pub fn sample_pitch_velocity(base_velo: f64, fatigue_factor: f64, tuning: &TuningConfig) -> f64 {
    base_velo * tuning.get("velocity_scale", 1.0) * fatigue_factor
}

/// Resolve one pitch.
pub fn simulate_pitch(
    batter: &BatterContext,
    pitcher: &PitcherContext,
    tuning: &TuningConfig,
    count: (u32, u32),
    rng: &mut GameRng,
) -> PitchResult {
    let velocity = sample_pitch_velocity(pitcher.velocity, pitcher.fatigue_factor, tuning);
    let location = sample_pitch_location(pitcher.control, rng);
    let in_zone = location.0.abs() < 0.5 && location.1.abs() < 0.5;

    let (_balls, strikes) = count;
    let zone_base = 0.48 + (batter.eye - 50.0) / 250.0;
    let chase_base = 0.22 - (batter.eye - 50.0) / 320.0 + batter.platoon_chase;
    let mut swing_prob = if in_zone {
        zone_base * tuning.get("zone_swing_scale", 1.0)
    } else {
        chase_base * tuning.get("chase_scale", 1.0)
    };
    if strikes >= 2 {
        swing_prob += 0.10 * tuning.get("two_strike_aggression_scale", 1.0);
    }
    let walk_scale = tuning.get("walk_scale", 1.0);
    if walk_scale > 0.0 {
        swing_prob /= walk_scale;
    }
    let swing = rng.chance(swing_prob);

    let mut result = PitchResult {
        pitch_type: pitcher.pitch,
        pitch_quality: pitcher.pitch_quality,
        velocity,
        location,
        in_zone,
        swing,
        contact: false,
        foul: false,
        in_play: false,
        outcome: if in_zone { PitchOutcome::Strike } else { PitchOutcome::Ball },
        exit_velo: None,
        launch_angle: None,
        spray_angle: None,
    };
    if !swing {
        return result;
    }

    // Effective pitch quality: weighted mix of control, movement and the
    // selected pitch's grade.
    let pitch_quality = (pitcher.control * 0.4 + pitcher.movement * 0.4 + pitcher.pitch_quality * 0.2)
        * tuning.get("pitching_dom_scale", 1.0);
    result.pitch_quality = pitch_quality;

    let contact_base = batter.contact - (pitch_quality - 50.0) * 0.4;
    let mut contact_prob = ((contact_base / 100.0) * tuning.get("contact_quality_scale", 1.0))
        .clamp(0.05, 0.95);
    contact_prob /= tuning.get("k_scale", 1.0).max(0.1);
    let contact = rng.chance(contact_prob);
    if !contact {
        result.outcome = PitchOutcome::SwingingStrike;
        return result;
    }
    result.contact = true;

    let exit_velo = (velocity * 0.42 + batter.power * 0.45).max(50.0)
        * tuning.get("offense_scale", 1.0);
    let gb_bias = (batter.gb_tendency - 50.0) / 10.0;
    let launch_angle = rng.gauss(12.0 - gb_bias, 16.0) * tuning.get("gb_fb_tilt", 1.0);
    let pull_bias = (batter.pull_tendency - 50.0) / 2.0;
    let spray_angle = rng.gauss(pull_bias, 18.0);
    result.exit_velo = Some(exit_velo);
    result.launch_angle = Some(launch_angle);
    result.spray_angle = Some(spray_angle);

    let foul = rng.chance(0.18);
    result.foul = foul;
    result.in_play = !foul;
    result.outcome = if foul { PitchOutcome::Foul } else { PitchOutcome::InPlay };
    result
}

#[cfg(test)]
mod tests {
    use super::*;

    fn neutral_batter() -> BatterContext {
        BatterContext {
            contact: 50.0,
            power: 50.0,
            gb_tendency: 50.0,
            pull_tendency: 50.0,
            eye: 50.0,
            side: Hand::R,
            platoon_chase: 0.0,
            height: 72.0,
            zone_bottom: -0.5,
            zone_top: 0.5,
        }
    }

    fn neutral_pitcher() -> PitcherContext {
        PitcherContext {
            pitch: PitchType::Fb,
            pitch_quality: 55.0,
            velocity: 92.0,
            control: 50.0,
            movement: 50.0,
            fatigue_factor: 1.0,
            hand: Hand::R,
            vs_left: 50.0,
        }
    }

    #[test]
    fn no_swing_outcomes_follow_the_zone() {
        let tuning = TuningConfig::default();
        let mut rng = GameRng::seed_from(11);
        let mut saw_called_strike = false;
        let mut saw_ball = false;
        for _ in 0..200 {
            let res =
                simulate_pitch(&neutral_batter(), &neutral_pitcher(), &tuning, (0, 0), &mut rng);
            if !res.swing {
                if res.in_zone {
                    assert_eq!(res.outcome, PitchOutcome::Strike);
                    saw_called_strike = true;
                } else {
                    assert_eq!(res.outcome, PitchOutcome::Ball);
                    saw_ball = true;
                }
            }
        }
        assert!(saw_called_strike && saw_ball);
    }

    #[test]
    fn contact_always_carries_batted_ball_samples() {
        let tuning = TuningConfig::default();
        let mut rng = GameRng::seed_from(23);
        for _ in 0..400 {
            let res =
                simulate_pitch(&neutral_batter(), &neutral_pitcher(), &tuning, (1, 1), &mut rng);
            if res.contact {
                assert!(res.exit_velo.unwrap() >= 50.0);
                assert!(res.launch_angle.is_some());
                assert!(res.spray_angle.is_some());
                assert!(res.foul || res.in_play);
            }
        }
    }

    #[test]
    fn miss_distance_zero_inside_zone() {
        let tuning = TuningConfig::default();
        assert_eq!(miss_distance((0.2, -0.3), -0.5, 0.5, &tuning), 0.0);
        assert!(miss_distance((0.9, 0.0), -0.5, 0.5, &tuning) > 0.0);
        assert!(miss_distance((0.0, -1.2), -0.5, 0.5, &tuning) > 0.0);
    }

    #[test]
    fn explicit_zone_bounds_win() {
        let tuning = TuningConfig::default();
        assert_eq!(
            strike_zone_bounds(72.0, Some(-0.4), Some(0.45), &tuning),
            (-0.4, 0.45)
        );
        let (bottom, top) = strike_zone_bounds(78.0, None, None, &tuning);
        assert!(bottom < -0.5 && top > 0.5);
    }
}

//! Batted-ball classification and carry.
//!
//! The carry model is an analytic vacuum-range approximation scaled by the
//! tunable environment: `(ev_ft_s^2 / g) * sin(2*theta) * carry_scale`.
//! Park geometry then decides home run vs. in-park hit type.

use crate::models::park::Park;
use crate::models::result::{BallType, HitType};
use crate::tuning::TuningConfig;

const GRAVITY_FT_S2: f64 = 32.17;
const MPH_TO_FT_S: f64 = 1.467;

pub fn classify_ball_type(launch_angle: f64) -> BallType {
    if launch_angle < 10.0 {
        BallType::Gb
    } else if launch_angle < 25.0 {
        BallType::Ld
    } else {
        BallType::Fb
    }
}

/// Convert spray (degrees, pull-positive) to a stadium angle in radians,
/// 0 = right field line, pi/2 = left field line.
pub fn spray_to_field_angle(spray_deg: f64) -> f64 {
    (45.0 - spray_deg).to_radians().clamp(0.0, std::f64::consts::FRAC_PI_2)
}

pub fn estimate_carry_distance(
    exit_velo: f64,
    launch_angle: f64,
    tuning: &TuningConfig,
    park: &Park,
) -> f64 {
    let ev_ft_s = exit_velo * MPH_TO_FT_S;
    let theta = launch_angle.clamp(1.0, 60.0).to_radians();
    let carry_scale = 0.75
        * tuning.get("hr_scale", 1.0)
        * tuning.get("offense_scale", 1.0)
        * tuning.get("altitude_scale", 1.0)
        * park.park_factor;
    (ev_ft_s * ev_ft_s / GRAVITY_FT_S2) * (2.0 * theta).sin() * carry_scale
}

/// Resolved flight of a ball in play, before the defense gets a say.
#[derive(Debug, Clone, Copy)]
pub struct BattedBall {
    pub distance: f64,
    pub is_hr: bool,
    pub ball_type: BallType,
    pub hit_type: HitType,
}

pub fn resolve_batted_ball(
    exit_velo: f64,
    launch_angle: f64,
    spray_angle: f64,
    park: &Park,
    tuning: &TuningConfig,
) -> BattedBall {
    let ball_type = classify_ball_type(launch_angle);
    let distance = estimate_carry_distance(exit_velo, launch_angle, tuning, park);
    let angle = spray_to_field_angle(spray_angle);
    let wall = park.stadium.wall_distance(angle) * tuning.get("park_size_scale", 1.0);
    if distance > wall {
        return BattedBall { distance, is_hr: true, ball_type, hit_type: HitType::Hr };
    }
    let hit_type = if distance >= park.stadium.triple_distance(angle) {
        HitType::Triple
    } else if distance >= park.stadium.double_distance(angle) {
        HitType::Double
    } else {
        HitType::Single
    };
    BattedBall { distance, is_hr: false, ball_type, hit_type }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ball_type_thresholds() {
        assert_eq!(classify_ball_type(4.0), BallType::Gb);
        assert_eq!(classify_ball_type(10.0), BallType::Ld);
        assert_eq!(classify_ball_type(24.9), BallType::Ld);
        assert_eq!(classify_ball_type(25.0), BallType::Fb);
    }

    #[test]
    fn dead_center_shot_at_105_clears_a_400_wall() {
        // (105 * 1.467)^2 / 32.17 * sin(56 deg) * 0.75 ~= 459 ft
        let park = Park::default();
        let tuning = TuningConfig::default();
        let ball = resolve_batted_ball(105.0, 28.0, 0.0, &park, &tuning);
        assert!(ball.is_hr);
        assert_eq!(ball.hit_type, HitType::Hr);
        assert_eq!(ball.ball_type, BallType::Fb);
        assert!(ball.distance > 400.0);
    }

    #[test]
    fn soft_grounder_stays_a_single() {
        let park = Park::default();
        let tuning = TuningConfig::default();
        let ball = resolve_batted_ball(92.0, 8.0, 0.0, &park, &tuning);
        assert!(!ball.is_hr);
        assert_eq!(ball.ball_type, BallType::Gb);
        assert_eq!(ball.hit_type, HitType::Single);
    }

    #[test]
    fn spray_conversion_is_bounded() {
        assert_eq!(spray_to_field_angle(0.0), 45f64.to_radians());
        assert_eq!(spray_to_field_angle(90.0), 0.0);
        assert_eq!(spray_to_field_angle(-90.0), std::f64::consts::FRAC_PI_2);
    }

    #[test]
    fn park_factor_scales_carry() {
        let tuning = TuningConfig::default();
        let neutral = Park::default();
        let mut coors = Park::default();
        coors.park_factor = 1.12;
        let short = estimate_carry_distance(100.0, 27.0, &tuning, &neutral);
        let long = estimate_carry_distance(100.0, 27.0, &tuning, &coors);
        assert!(long > short);
    }
}

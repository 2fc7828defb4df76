//! Defense: positional assignment, range/arm aggregates, out probability,
//! double plays, and errors.

use std::collections::HashMap;

use crate::models::park::Park;
use crate::models::player::{BatterRatings, Hand, Position};
use crate::models::result::{BallType, ErrorType, OutType};
use crate::tuning::TuningConfig;

use super::rng::GameRng;

/// Aggregate defensive ratings for the nine on the field.
#[derive(Debug, Clone, Copy)]
pub struct DefenseRatings {
    pub infield: f64,
    pub outfield: f64,
    pub arm: f64,
    pub infield_left: f64,
    pub infield_right: f64,
    pub outfield_left: f64,
    pub outfield_center: f64,
    pub outfield_right: f64,
}

pub type DefenseMap = HashMap<Position, BatterRatings>;

/// Fielding rating adjusted for playing in, secondary to, or out of
/// position.
pub fn adjusted_fielding_rating(
    player: &BatterRatings,
    position: Position,
    tuning: &TuningConfig,
) -> f64 {
    let rating = player.fielding;
    if player.primary_position == Some(position) {
        rating * tuning.get("defense_primary_pos_scale", 1.0)
    } else if player.other_positions.contains(&position) {
        rating * tuning.get("defense_secondary_pos_scale", 0.9)
    } else {
        rating * tuning.get("defense_out_of_pos_scale", 0.75)
    }
}

pub fn adjusted_arm_rating(player: &BatterRatings, tuning: &TuningConfig) -> f64 {
    player.arm * tuning.get("arm_strength_scale", 1.0)
}

/// Assign fielders by primary/secondary position, best fielding rating
/// first, with a highest-rating fallback for unfilled spots.
pub fn build_default_defense(batters: &[BatterRatings]) -> DefenseMap {
    let mut remaining: Vec<BatterRatings> = batters.to_vec();
    let mut defense = DefenseMap::new();
    for pos in Position::FIELDING {
        let candidate = remaining
            .iter()
            .enumerate()
            .filter(|(_, b)| b.can_play(pos))
            .max_by(|a, b| a.1.fielding.total_cmp(&b.1.fielding))
            .map(|(idx, _)| idx)
            .or_else(|| {
                remaining
                    .iter()
                    .enumerate()
                    .max_by(|a, b| a.1.fielding.total_cmp(&b.1.fielding))
                    .map(|(idx, _)| idx)
            });
        if let Some(idx) = candidate {
            defense.insert(pos, remaining.remove(idx));
        }
    }
    defense
}

/// Assign fielders from lineup positions, filling any holes by best
/// remaining fielding rating.
pub fn build_defense_from_lineup(
    batters: &[BatterRatings],
    positions: &HashMap<String, Position>,
) -> DefenseMap {
    let mut defense = DefenseMap::new();
    let mut used: Vec<&str> = Vec::new();
    for batter in batters {
        let Some(&pos) = positions.get(&batter.player_id) else { continue };
        if pos == Position::Dh || defense.contains_key(&pos) {
            continue;
        }
        defense.insert(pos, batter.clone());
        used.push(batter.player_id.as_str());
    }
    let mut remaining: Vec<BatterRatings> = batters
        .iter()
        .filter(|b| !used.contains(&b.player_id.as_str()))
        .cloned()
        .collect();
    for pos in Position::FIELDING {
        if defense.contains_key(&pos) {
            continue;
        }
        if remaining.is_empty() {
            break;
        }
        let idx = remaining
            .iter()
            .enumerate()
            .max_by(|a, b| a.1.fielding.total_cmp(&b.1.fielding))
            .map(|(i, _)| i)
            .unwrap_or(0);
        defense.insert(pos, remaining.remove(idx));
    }
    defense
}

pub fn compute_defense_ratings(defense: &DefenseMap, tuning: &TuningConfig) -> DefenseRatings {
    let mut infield = Vec::new();
    let mut outfield = Vec::new();
    let mut arms = Vec::new();
    let mut by_pos: HashMap<Position, f64> = HashMap::new();
    for (&pos, player) in defense {
        let rating = adjusted_fielding_rating(player, pos, tuning);
        by_pos.insert(pos, rating);
        arms.push(player.arm);
        if pos.is_outfield() {
            outfield.push(rating);
        } else {
            infield.push(rating);
        }
    }
    let avg = |values: &[f64]| -> f64 {
        if values.is_empty() {
            50.0
        } else {
            values.iter().sum::<f64>() / values.len() as f64
        }
    };
    let infield_avg = avg(&infield);
    let outfield_avg = avg(&outfield);
    let arm_avg = avg(&arms);

    let pair_avg = |a: Position, b: Position, fallback: f64| -> f64 {
        let values: Vec<f64> = [a, b].iter().filter_map(|p| by_pos.get(p).copied()).collect();
        if values.is_empty() {
            fallback
        } else {
            values.iter().sum::<f64>() / values.len() as f64
        }
    };

    let range_scale = tuning.get("range_scale", 1.0);
    DefenseRatings {
        infield: infield_avg * range_scale,
        outfield: outfield_avg * range_scale,
        arm: arm_avg * tuning.get("arm_strength_scale", 1.0),
        infield_left: pair_avg(Position::Third, Position::Short, infield_avg) * range_scale,
        infield_right: pair_avg(Position::First, Position::Second, infield_avg) * range_scale,
        outfield_left: by_pos.get(&Position::Left).copied().unwrap_or(outfield_avg) * range_scale,
        outfield_center: by_pos.get(&Position::Center).copied().unwrap_or(outfield_avg)
            * range_scale,
        outfield_right: by_pos.get(&Position::Right).copied().unwrap_or(outfield_avg)
            * range_scale,
    }
}

// ============================================================================
// Spray geometry
// ============================================================================

/// Orient spray so positive always points to the batter's pull side.
pub fn spray_dir(angle: f64, batter_side: Hand) -> f64 {
    if batter_side == Hand::R {
        -angle
    } else {
        angle
    }
}

pub fn infield_pos_for_spray(spray_dir: f64) -> Position {
    if spray_dir >= 25.0 {
        Position::Third
    } else if spray_dir <= -25.0 {
        Position::First
    } else if spray_dir >= 6.0 {
        Position::Short
    } else if spray_dir <= -6.0 {
        Position::Second
    } else if spray_dir >= 0.0 {
        Position::Short
    } else {
        Position::Second
    }
}

pub fn outfield_pos_for_spray(spray_dir: f64, tuning: &TuningConfig) -> Position {
    let center_band = tuning.get("spray_center_band_deg", 8.0);
    if spray_dir.abs() <= center_band {
        Position::Center
    } else if spray_dir > 0.0 {
        Position::Left
    } else {
        Position::Right
    }
}

pub fn fielder_position_for_ball(
    ball_type: BallType,
    spray_angle: Option<f64>,
    batter_side: Hand,
    tuning: &TuningConfig,
    infield_play: bool,
) -> Position {
    let dir = spray_dir(spray_angle.unwrap_or(0.0), batter_side);
    if ball_type == BallType::Gb || infield_play {
        infield_pos_for_spray(dir)
    } else {
        outfield_pos_for_spray(dir, tuning)
    }
}

/// Find the first occupied position among primary + fallbacks.
pub fn find_fielder<'a>(
    defense: &'a DefenseMap,
    primary: Position,
    fallbacks: &[Position],
) -> Option<(Position, &'a BatterRatings)> {
    std::iter::once(primary)
        .chain(fallbacks.iter().copied())
        .find_map(|pos| defense.get(&pos).map(|player| (pos, player)))
}

pub const INFIELD_FALLBACK: [Position; 4] =
    [Position::Short, Position::Second, Position::Third, Position::First];
pub const OUTFIELD_FALLBACK: [Position; 3] =
    [Position::Center, Position::Left, Position::Right];

// ============================================================================
// Out / error probabilities
// ============================================================================

/// Out probability for a ball in play: per-type base, spray-aware range
/// adjustment, exit-velocity penalty, and a shift boost for heavy pull
/// hitters sprayed into the shift.
pub fn out_probability(
    ball_type: BallType,
    exit_velo: f64,
    spray_angle: Option<f64>,
    batter_side: Hand,
    pull_tendency: Option<f64>,
    defense: &DefenseRatings,
    tuning: &TuningConfig,
) -> f64 {
    let infield_rating = |dir: f64| -> f64 {
        // Pull side for a right-handed batter is the left side of the infield.
        if dir >= 0.0 {
            if batter_side == Hand::R { defense.infield_left } else { defense.infield_right }
        } else if batter_side == Hand::R {
            defense.infield_right
        } else {
            defense.infield_left
        }
    };
    let outfield_rating = |dir: f64| -> f64 {
        let center_band = tuning.get("spray_center_band_deg", 8.0);
        if dir.abs() <= center_band {
            defense.outfield_center
        } else if dir >= 0.0 {
            if batter_side == Hand::R { defense.outfield_left } else { defense.outfield_right }
        } else if batter_side == Hand::R {
            defense.outfield_right
        } else {
            defense.outfield_left
        }
    };

    let dir = spray_angle.map(|angle| spray_dir(angle, batter_side));
    let (base, def_adj) = match ball_type {
        BallType::Gb => {
            let range = dir.map(infield_rating).unwrap_or(defense.infield);
            (0.78, (range - 50.0) / 250.0)
        }
        BallType::Ld => {
            let range = dir.map(outfield_rating).unwrap_or(defense.outfield);
            (0.38, (range - 50.0) / 300.0)
        }
        BallType::Fb => {
            let range = dir.map(outfield_rating).unwrap_or(defense.outfield);
            (0.73, (range - 50.0) / 230.0)
        }
    };
    let quality_adj = (exit_velo - 90.0) / 300.0;
    let mut out_prob = base + def_adj - quality_adj;

    if ball_type != BallType::Fb {
        if let (Some(dir), Some(pull)) = (dir, pull_tendency) {
            let pull_bias = (pull - 50.0) / 50.0;
            let threshold = (tuning.get("shift_pull_threshold", 60.0) - 50.0) / 50.0;
            if pull_bias.abs() > threshold {
                let intensity = (pull_bias.abs() - threshold) / (1.0 - threshold).max(0.01);
                let spray_scale = tuning.get("shift_spray_scale", 25.0).max(1.0);
                let spray_norm = (dir / spray_scale).clamp(-1.0, 1.0);
                let align = if pull_bias >= 0.0 { spray_norm } else { -spray_norm };
                let boost = if ball_type == BallType::Gb {
                    tuning.get("shift_gb_boost", 0.04)
                } else {
                    tuning.get("shift_ld_boost", 0.015)
                };
                out_prob += boost * intensity * align;
            }
        }
    }
    out_prob.clamp(0.02, 0.98)
}

pub fn double_play_probability(
    runner_speed: f64,
    infield_range: f64,
    turn_arm: f64,
    tuning: &TuningConfig,
) -> f64 {
    let base = tuning.get("double_play_base", 0.14);
    let range_adj =
        (infield_range - 50.0) / 230.0 * tuning.get("double_play_range_scale", 1.0);
    let arm_adj = (turn_arm - 50.0) / 260.0 * tuning.get("double_play_arm_scale", 1.0);
    let speed_adj = (runner_speed - 50.0) / 220.0 * tuning.get("double_play_speed_scale", 1.0);
    (base + range_adj + arm_adj - speed_adj).clamp(0.03, 0.45)
}

/// Out type for a converted ball in play; line drives at lower angles may
/// be infield plays.
pub fn select_out_type(ball_type: BallType, launch_angle: f64, rng: &mut GameRng) -> (OutType, bool) {
    match ball_type {
        BallType::Gb => (OutType::Groundout, true),
        BallType::Fb => (OutType::Flyout, false),
        BallType::Ld => {
            if launch_angle >= 18.0 {
                (OutType::Flyout, false)
            } else {
                (OutType::Lineout, rng.chance(0.45))
            }
        }
    }
}

pub fn error_probability(
    out_type: OutType,
    fielding: f64,
    arm: f64,
    tuning: &TuningConfig,
) -> f64 {
    let base = match out_type {
        OutType::Groundout => tuning.get("error_rate_gb", 0.018),
        OutType::Flyout => tuning.get("error_rate_fb", 0.008),
        OutType::Lineout => tuning.get("error_rate_ld", 0.012),
    };
    let adj = (50.0 - fielding) / 500.0 + (50.0 - arm) / 900.0;
    ((base + adj) * tuning.get("error_rate_scale", 1.0)).clamp(0.001, 0.12)
}

pub fn select_error_type(
    out_type: OutType,
    fielding: f64,
    arm: f64,
    tuning: &TuningConfig,
    rng: &mut GameRng,
) -> ErrorType {
    let mut throw_share = match out_type {
        OutType::Groundout => tuning.get("throwing_error_share_gb", 0.6),
        OutType::Flyout => tuning.get("throwing_error_share_fb", 0.2),
        OutType::Lineout => tuning.get("throwing_error_share_ld", 0.35),
    };
    throw_share += (50.0 - arm) / 600.0;
    throw_share += (fielding - 50.0) / 700.0;
    throw_share = throw_share.clamp(0.05, 0.9);
    if rng.chance(throw_share) {
        ErrorType::Throwing
    } else {
        ErrorType::Fielding
    }
}

/// Range/arm for a concrete fielder, with team-aggregate fallbacks.
pub fn fielder_ratings(
    fielder: Option<(Position, &BatterRatings)>,
    fallback_fielding: f64,
    fallback_arm: f64,
    tuning: &TuningConfig,
) -> (f64, f64) {
    match fielder {
        Some((pos, player)) => {
            let fielding =
                adjusted_fielding_rating(player, pos, tuning) * tuning.get("range_scale", 1.0);
            (fielding, adjusted_arm_rating(player, tuning))
        }
        None => (fallback_fielding, fallback_arm),
    }
}

/// Catcher range/arm used by steal, passed-ball and dropped-third logic.
pub fn catcher_context(
    defense: &DefenseMap,
    ratings: &DefenseRatings,
    tuning: &TuningConfig,
) -> (f64, f64) {
    match defense.get(&Position::C) {
        Some(catcher) => {
            let fielding = adjusted_fielding_rating(catcher, Position::C, tuning)
                * tuning.get("range_scale", 1.0);
            (fielding, adjusted_arm_rating(catcher, tuning))
        }
        None => (50.0, ratings.arm),
    }
}

/// Stadium environment does not alter fielder assignment, but foul ground
/// is part of the park descriptor consumed alongside the defense.
pub fn foul_territory_scale(park: &Park, tuning: &TuningConfig) -> f64 {
    park.foul_territory_scale * tuning.get("foul_territory_scale", 1.0)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn bench(n: usize) -> Vec<BatterRatings> {
        (0..n)
            .map(|i| {
                let mut b = BatterRatings::neutral(&format!("b{i}"));
                b.fielding = 40.0 + i as f64;
                b
            })
            .collect()
    }

    #[test]
    fn default_defense_fills_all_eight_positions() {
        let defense = build_default_defense(&bench(9));
        assert_eq!(defense.len(), 8);
        for pos in Position::FIELDING {
            assert!(defense.contains_key(&pos), "missing {pos}");
        }
    }

    #[test]
    fn lineup_positions_are_respected() {
        let batters = bench(9);
        let mut positions = HashMap::new();
        positions.insert("b0".to_string(), Position::C);
        positions.insert("b1".to_string(), Position::Short);
        positions.insert("b2".to_string(), Position::Dh);
        let defense = build_defense_from_lineup(&batters, &positions);
        assert_eq!(defense[&Position::C].player_id, "b0");
        assert_eq!(defense[&Position::Short].player_id, "b1");
        assert_eq!(defense.len(), 8);
    }

    #[test]
    fn double_play_probability_matches_reference_case() {
        let tuning = TuningConfig::default();
        // infield 70 / arm 70 / runner 40: 0.14 + 0.087 + 0.077 - (-0.045)
        let prob = double_play_probability(40.0, 70.0, 70.0, &tuning);
        assert!((prob - 0.2588).abs() < 0.005, "got {prob}");
    }

    #[test]
    fn out_probability_clamps_and_orders() {
        let tuning = TuningConfig::default();
        let avg = DefenseRatings {
            infield: 50.0,
            outfield: 50.0,
            arm: 50.0,
            infield_left: 50.0,
            infield_right: 50.0,
            outfield_left: 50.0,
            outfield_center: 50.0,
            outfield_right: 50.0,
        };
        let gb = out_probability(BallType::Gb, 90.0, None, Hand::R, None, &avg, &tuning);
        let ld = out_probability(BallType::Ld, 90.0, None, Hand::R, None, &avg, &tuning);
        let fb = out_probability(BallType::Fb, 90.0, None, Hand::R, None, &avg, &tuning);
        assert!((gb - 0.78).abs() < 1e-9);
        assert!((ld - 0.38).abs() < 1e-9);
        assert!((fb - 0.73).abs() < 1e-9);
        let scorcher = out_probability(BallType::Ld, 115.0, None, Hand::R, None, &avg, &tuning);
        assert!(scorcher < ld);
    }

    #[test]
    fn spray_assignment_tracks_pull_side() {
        let tuning = TuningConfig::default();
        // Righty pulling the ball (negative raw spray) -> left side infield.
        assert_eq!(
            fielder_position_for_ball(BallType::Gb, Some(-30.0), Hand::R, &tuning, true),
            Position::Third
        );
        assert_eq!(
            fielder_position_for_ball(BallType::Fb, Some(0.0), Hand::R, &tuning, false),
            Position::Center
        );
        assert_eq!(
            fielder_position_for_ball(BallType::Fb, Some(-30.0), Hand::L, &tuning, false),
            Position::Right
        );
    }
}

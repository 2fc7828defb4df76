//! Player rating descriptors.
//!
//! Ratings are flat numeric attributes in `[1, 100]` loaded once per game.
//! The engine never mutates them in place; fatigue and platoon effects are
//! applied to copies at the at-bat boundary.

use std::collections::HashMap;
use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

/// Batting or throwing hand.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Hand {
    L,
    R,
    /// Switch hitter; resolved to an effective side against each pitcher.
    S,
}

impl Default for Hand {
    fn default() -> Self {
        Hand::R
    }
}

impl Hand {
    pub fn parse(value: &str) -> Hand {
        match value.trim().to_ascii_uppercase().as_str() {
            "L" => Hand::L,
            "S" => Hand::S,
            _ => Hand::R,
        }
    }

    /// Effective batting side against `pitcher_hand`; switch hitters take
    /// the platoon side.
    pub fn effective_side(self, pitcher_hand: Hand) -> Hand {
        match self {
            Hand::S => {
                if pitcher_hand == Hand::R {
                    Hand::L
                } else {
                    Hand::R
                }
            }
            side => side,
        }
    }
}

/// Defensive position codes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Position {
    P,
    C,
    #[serde(rename = "1B")]
    First,
    #[serde(rename = "2B")]
    Second,
    #[serde(rename = "3B")]
    Third,
    #[serde(rename = "SS")]
    Short,
    #[serde(rename = "LF")]
    Left,
    #[serde(rename = "CF")]
    Center,
    #[serde(rename = "RF")]
    Right,
    #[serde(rename = "DH")]
    Dh,
}

impl Position {
    pub const FIELDING: [Position; 8] = [
        Position::C,
        Position::First,
        Position::Second,
        Position::Third,
        Position::Short,
        Position::Left,
        Position::Center,
        Position::Right,
    ];

    pub fn is_outfield(self) -> bool {
        matches!(self, Position::Left | Position::Center | Position::Right)
    }

    pub fn code(self) -> &'static str {
        match self {
            Position::P => "P",
            Position::C => "C",
            Position::First => "1B",
            Position::Second => "2B",
            Position::Third => "3B",
            Position::Short => "SS",
            Position::Left => "LF",
            Position::Center => "CF",
            Position::Right => "RF",
            Position::Dh => "DH",
        }
    }
}

impl FromStr for Position {
    type Err = ();

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_ascii_uppercase().as_str() {
            "P" => Ok(Position::P),
            "C" => Ok(Position::C),
            "1B" => Ok(Position::First),
            "2B" => Ok(Position::Second),
            "3B" => Ok(Position::Third),
            "SS" => Ok(Position::Short),
            "LF" => Ok(Position::Left),
            "CF" => Ok(Position::Center),
            "RF" => Ok(Position::Right),
            "DH" => Ok(Position::Dh),
            _ => Err(()),
        }
    }
}

impl fmt::Display for Position {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.code())
    }
}

/// Pitch repertoire symbols.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PitchType {
    Fb,
    Sl,
    Si,
    Cb,
    Cu,
    Scb,
    Kn,
}

impl PitchType {
    pub const ALL: [PitchType; 7] = [
        PitchType::Fb,
        PitchType::Sl,
        PitchType::Si,
        PitchType::Cb,
        PitchType::Cu,
        PitchType::Scb,
        PitchType::Kn,
    ];
}

/// Pitching staff role assignment.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum StaffRole {
    /// Rotation slot, 1-indexed (SP1 < SP2 < ...).
    Sp(u8),
    Lr,
    Mr,
    Su,
    Cl,
    Unassigned,
}

impl Default for StaffRole {
    fn default() -> Self {
        StaffRole::Unassigned
    }
}

impl StaffRole {
    pub fn parse(value: &str) -> StaffRole {
        let role = value.trim().to_ascii_uppercase();
        if let Some(rest) = role.strip_prefix("SP") {
            if let Ok(n) = rest.parse::<u8>() {
                return StaffRole::Sp(n);
            }
            return StaffRole::Sp(1);
        }
        match role.as_str() {
            "LR" => StaffRole::Lr,
            "MR" => StaffRole::Mr,
            "SU" => StaffRole::Su,
            "CL" => StaffRole::Cl,
            _ => StaffRole::Unassigned,
        }
    }

    pub fn is_starter(self) -> bool {
        matches!(self, StaffRole::Sp(_))
    }

    /// Ordering key for the rotation: SP1 before SP2 before unnumbered.
    pub fn rotation_key(self) -> u8 {
        match self {
            StaffRole::Sp(n) => n,
            _ => 99,
        }
    }
}

impl fmt::Display for StaffRole {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            StaffRole::Sp(n) => write!(f, "SP{n}"),
            StaffRole::Lr => f.write_str("LR"),
            StaffRole::Mr => f.write_str("MR"),
            StaffRole::Su => f.write_str("SU"),
            StaffRole::Cl => f.write_str("CL"),
            StaffRole::Unassigned => f.write_str(""),
        }
    }
}

// ============================================================================
// Rating blocks
// ============================================================================

/// Position-player ratings. All attribute scales run 1-100 with 50 average.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BatterRatings {
    pub player_id: String,
    pub bats: Hand,
    pub primary_position: Option<Position>,
    pub other_positions: Vec<Position>,
    pub contact: f64,
    pub power: f64,
    pub gb_tendency: f64,
    pub pull_tendency: f64,
    pub vs_left: f64,
    pub fielding: f64,
    pub arm: f64,
    pub speed: f64,
    pub eye: f64,
    pub height: f64,
    pub durability: f64,
    pub zone_bottom: Option<f64>,
    pub zone_top: Option<f64>,
}

impl BatterRatings {
    /// Average-everything batter, useful for tests and fallback fills.
    pub fn neutral(player_id: &str) -> Self {
        Self {
            player_id: player_id.to_string(),
            bats: Hand::R,
            primary_position: None,
            other_positions: Vec::new(),
            contact: 50.0,
            power: 50.0,
            gb_tendency: 50.0,
            pull_tendency: 50.0,
            vs_left: 50.0,
            fielding: 50.0,
            arm: 50.0,
            speed: 50.0,
            eye: 50.0,
            height: 72.0,
            durability: 50.0,
            zone_bottom: None,
            zone_top: None,
        }
    }

    pub fn can_play(&self, position: Position) -> bool {
        self.primary_position == Some(position) || self.other_positions.contains(&position)
    }
}

/// Pitcher ratings plus repertoire. Only repertoire entries with quality
/// above zero are considered available pitches.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PitcherRatings {
    pub player_id: String,
    pub throws: Hand,
    pub role: String,
    pub preferred_role: String,
    /// Base velocity driver, derived from the arm rating.
    pub velocity: f64,
    pub control: f64,
    pub movement: f64,
    pub gb_tendency: f64,
    pub vs_left: f64,
    pub hold_runner: f64,
    pub endurance: f64,
    pub durability: f64,
    pub fielding: f64,
    pub arm: f64,
    pub repertoire: HashMap<PitchType, f64>,
}

impl PitcherRatings {
    pub fn neutral(player_id: &str) -> Self {
        Self {
            player_id: player_id.to_string(),
            throws: Hand::R,
            role: String::new(),
            preferred_role: String::new(),
            velocity: 50.0,
            control: 50.0,
            movement: 50.0,
            gb_tendency: 50.0,
            vs_left: 50.0,
            hold_runner: 50.0,
            endurance: 50.0,
            durability: 50.0,
            fielding: 50.0,
            arm: 50.0,
            repertoire: HashMap::from([(PitchType::Fb, 50.0)]),
        }
    }

    /// Highest-quality available pitch; falls back to a 50-grade fastball
    /// when the repertoire is empty.
    pub fn best_pitch(&self) -> (PitchType, f64) {
        self.repertoire
            .iter()
            .filter(|(_, quality)| **quality > 0.0)
            .max_by(|a, b| a.1.total_cmp(b.1).then_with(|| {
                // Stable tie-break so identical repertoires pick the same pitch.
                let ka = PitchType::ALL.iter().position(|p| p == a.0);
                let kb = PitchType::ALL.iter().position(|p| p == b.0);
                kb.cmp(&ka)
            }))
            .map(|(pitch, quality)| (*pitch, *quality))
            .unwrap_or((PitchType::Fb, 50.0))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn switch_hitter_takes_platoon_side() {
        assert_eq!(Hand::S.effective_side(Hand::R), Hand::L);
        assert_eq!(Hand::S.effective_side(Hand::L), Hand::R);
        assert_eq!(Hand::L.effective_side(Hand::L), Hand::L);
    }

    #[test]
    fn staff_roles_parse_and_sort() {
        assert_eq!(StaffRole::parse("sp3"), StaffRole::Sp(3));
        assert_eq!(StaffRole::parse("CL"), StaffRole::Cl);
        assert!(StaffRole::parse("SP1").rotation_key() < StaffRole::parse("SP2").rotation_key());
        assert_eq!(StaffRole::parse("MR").rotation_key(), 99);
    }

    #[test]
    fn best_pitch_ignores_zero_quality_entries() {
        let mut pitcher = PitcherRatings::neutral("p1");
        pitcher.repertoire = HashMap::from([(PitchType::Fb, 0.0), (PitchType::Sl, 62.0)]);
        assert_eq!(pitcher.best_pitch(), (PitchType::Sl, 62.0));
    }
}

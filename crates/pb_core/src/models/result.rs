//! Game output: totals, the per-pitch log, and box-score metadata.
//!
//! These structures are the sink of the simulation pipeline. Outcome kinds
//! are closed enums internally; they serialize to snake_case strings only
//! at this boundary.

use serde::{Deserialize, Serialize};

use super::player::PitchType;
use super::stats::{BatterLine, FieldingLine, PitcherLine, PitcherUsageSummary};

/// Terminal classification of a single pitch (or of a dead-ball event the
/// plate appearance engine issued in place of one).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PitchOutcome {
    Ball,
    /// Called strike.
    Strike,
    SwingingStrike,
    Foul,
    InPlay,
    Hbp,
    Interference,
    Ibb,
    Bunt,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BallType {
    Gb,
    Ld,
    Fb,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum HitType {
    Single,
    Double,
    Triple,
    Hr,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OutType {
    Groundout,
    Flyout,
    Lineout,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorType {
    Throwing,
    Fielding,
}

/// One pitch (or PA-level dead-ball event) in the reproducible game log.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PitchLogEntry {
    pub outcome: PitchOutcome,
    pub pitcher_id: String,
    pub batter_id: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub pitch_type: Option<PitchType>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub pitch_quality: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub velocity: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub location: Option<(f64, f64)>,
    #[serde(default)]
    pub in_zone: bool,
    #[serde(default)]
    pub swing: bool,
    #[serde(default)]
    pub contact: bool,
    #[serde(default)]
    pub foul: bool,
    #[serde(default)]
    pub in_play: bool,
    /// Count before the pitch, e.g. "1-2".
    #[serde(skip_serializing_if = "Option::is_none")]
    pub count: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub pitch_count: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub fatigue_penalty: Option<f64>,
    // Batted-ball detail, present only for balls in play.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub exit_velo: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub launch_angle: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub spray_angle: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub distance: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub ball_type: Option<BallType>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub hit_type: Option<HitType>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub out_type: Option<OutType>,
    #[serde(default)]
    pub reached_on_error: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error_type: Option<ErrorType>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error_on: Option<String>,
    #[serde(skip_serializing_if = "Vec::is_empty", default)]
    pub error_runners: Vec<String>,
    #[serde(default)]
    pub called_strike: bool,
    #[serde(default)]
    pub swinging_strike: bool,
    #[serde(default)]
    pub strikeout: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub strikeout_type: Option<String>,
    /// Joined runner event codes for the pitch, e.g. "sb2" or "oobH+e_th".
    #[serde(skip_serializing_if = "Option::is_none")]
    pub runner_event: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub injury: Option<InjuryEvent>,
}

impl PitchLogEntry {
    pub fn event(outcome: PitchOutcome, pitcher_id: &str, batter_id: &str) -> Self {
        Self {
            outcome,
            pitcher_id: pitcher_id.to_string(),
            batter_id: batter_id.to_string(),
            pitch_type: None,
            pitch_quality: None,
            velocity: None,
            location: None,
            in_zone: false,
            swing: false,
            contact: false,
            foul: false,
            in_play: false,
            count: None,
            pitch_count: None,
            fatigue_penalty: None,
            exit_velo: None,
            launch_angle: None,
            spray_angle: None,
            distance: None,
            ball_type: None,
            hit_type: None,
            out_type: None,
            reached_on_error: false,
            error_type: None,
            error_on: None,
            error_runners: Vec::new(),
            called_strike: false,
            swinging_strike: false,
            strikeout: false,
            strikeout_type: None,
            runner_event: None,
            injury: None,
        }
    }

    /// Append a runner event code, joining repeats with '+'.
    pub fn push_runner_event(&mut self, code: &str) {
        match &mut self.runner_event {
            Some(existing) => {
                existing.push('+');
                existing.push_str(code);
            }
            None => self.runner_event = Some(code.to_string()),
        }
    }
}

/// Structured record of an in-game injury.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InjuryEvent {
    pub team: String,
    pub player_id: String,
    pub trigger: String,
    pub inning: u32,
    pub outs: u32,
    pub severity: String,
    pub days: u32,
    pub dl_tier: String,
    pub description: String,
    pub pitcher_id: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub replacement_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub pitch_count: Option<u32>,
}

/// Lineup change record.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SubstitutionEvent {
    pub team: String,
    pub inning: u32,
    /// PH, PR, DEF, or INJ.
    pub role: String,
    #[serde(rename = "out")]
    pub out_id: String,
    #[serde(rename = "in")]
    pub in_id: String,
    pub position: String,
    pub pitcher_id: String,
}

/// Home/away pair used throughout game metadata.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SidePair<T> {
    pub home: T,
    pub away: T,
}

impl<T> SidePair<T> {
    pub fn new(home: T, away: T) -> Self {
        Self { home, away }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct GameScore {
    pub home: u32,
    pub away: u32,
}

/// Whole-game event counters across both teams.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct GameTotals {
    pub pa: u32,
    pub ab: u32,
    pub h: u32,
    pub b1: u32,
    pub b2: u32,
    pub b3: u32,
    pub hr: u32,
    pub bb: u32,
    pub ibb: u32,
    pub k: u32,
    pub so_looking: u32,
    pub so_swinging: u32,
    pub hbp: u32,
    pub roe: u32,
    pub e: u32,
    pub e_field: u32,
    pub e_throw: u32,
    pub fc: u32,
    pub gidp: u32,
    pub tp: u32,
    pub sf: u32,
    pub sh: u32,
    pub sb: u32,
    pub cs: u32,
    pub po: u32,
    pub oob: u32,
    pub balk: u32,
    pub ci: u32,
    pub wp: u32,
    pub pb: u32,
    pub called_strikes: u32,
    pub swinging_strikes: u32,
    pub called_third_strikes: u32,
    pub swinging_third_strikes: u32,
    pub r: u32,
    pub r_away: u32,
    pub r_home: u32,
    pub lob: u32,
    pub lob_away: u32,
    pub lob_home: u32,
    pub pitches: u32,
}

/// Box-score level metadata for a completed game.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GameMeta {
    pub park: String,
    pub seed: Option<u64>,
    pub pitcher_usage: SidePair<Vec<PitcherUsageSummary>>,
    pub pitcher_lines: SidePair<Vec<PitcherLine>>,
    pub batting_lines: SidePair<Vec<BatterLine>>,
    pub fielding_lines: SidePair<Vec<FieldingLine>>,
    pub score: GameScore,
    pub inning_runs: SidePair<Vec<u32>>,
    pub ended_in_tie: bool,
    pub innings: u32,
    pub substitutions: SidePair<Vec<SubstitutionEvent>>,
    pub bench_remaining: SidePair<usize>,
    pub injury_events: Vec<InjuryEvent>,
}

/// A completed game.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GameResult {
    pub totals: GameTotals,
    pub pitch_log: Vec<PitchLogEntry>,
    pub metadata: GameMeta,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn outcome_enums_serialize_snake_case() {
        assert_eq!(
            serde_json::to_string(&PitchOutcome::SwingingStrike).unwrap(),
            "\"swinging_strike\""
        );
        assert_eq!(serde_json::to_string(&BallType::Gb).unwrap(), "\"gb\"");
        assert_eq!(serde_json::to_string(&HitType::Hr).unwrap(), "\"hr\"");
        assert_eq!(serde_json::to_string(&ErrorType::Throwing).unwrap(), "\"throwing\"");
    }

    #[test]
    fn runner_events_join_with_plus() {
        let mut entry = PitchLogEntry::event(PitchOutcome::InPlay, "p1", "b1");
        entry.push_runner_event("oobH");
        entry.push_runner_event("e_th");
        assert_eq!(entry.runner_event.as_deref(), Some("oobH+e_th"));
    }
}

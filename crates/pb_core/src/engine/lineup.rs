//! Offensive lineup state: batting order, bench, substitutions and the
//! per-player stat lines for one side of a game.

use std::collections::{HashMap, HashSet};

use crate::models::player::{BatterRatings, Hand, PitcherRatings, Position};
use crate::models::result::SubstitutionEvent;
use crate::models::stats::{BatterLine, FieldingLine};
use crate::tuning::TuningConfig;

use super::fielding::adjusted_fielding_rating;

#[derive(Debug, Clone, Default)]
pub struct LineupState {
    pub lineup: Vec<BatterRatings>,
    pub positions: HashMap<String, Position>,
    pub bench: Vec<BatterRatings>,
    pub bench_used: HashSet<String>,
    pub substitutions: Vec<SubstitutionEvent>,
    pub batting_lines: HashMap<String, BatterLine>,
    pub fielding_lines: HashMap<String, FieldingLine>,
}

impl LineupState {
    pub fn new(
        lineup: Vec<BatterRatings>,
        positions: HashMap<String, Position>,
        bench: Vec<BatterRatings>,
    ) -> Self {
        let lineup_ids: HashSet<&str> = lineup.iter().map(|b| b.player_id.as_str()).collect();
        let bench =
            bench.into_iter().filter(|b| !lineup_ids.contains(b.player_id.as_str())).collect();
        Self { lineup, positions, bench, ..Self::default() }
    }

    pub fn batter_line(&mut self, player_id: &str) -> &mut BatterLine {
        self.batting_lines
            .entry(player_id.to_string())
            .or_insert_with(|| BatterLine::new(player_id))
    }

    pub fn fielding_line(&mut self, player_id: &str, starting: bool) -> &mut FieldingLine {
        let line = self
            .fielding_lines
            .entry(player_id.to_string())
            .or_insert_with(|| FieldingLine::new(player_id));
        line.g = line.g.max(1);
        if starting {
            line.gs = line.gs.max(1);
        }
        line
    }

    pub fn lineup_index(&self, player_id: &str) -> Option<usize> {
        self.lineup.iter().position(|b| b.player_id == player_id)
    }

    pub fn batter_at(&self, batter_index: usize) -> &BatterRatings {
        &self.lineup[batter_index % self.lineup.len()]
    }

    pub fn available_bench(&self) -> Vec<&BatterRatings> {
        self.bench.iter().filter(|b| !self.bench_used.contains(&b.player_id)).collect()
    }

    pub fn upcoming_batters(&self, batter_index: usize, count: usize) -> Vec<BatterRatings> {
        if self.lineup.is_empty() {
            return Vec::new();
        }
        (0..count).map(|i| self.lineup[(batter_index + i) % self.lineup.len()].clone()).collect()
    }

    /// Swap `old_id` out of the order for `new_player`, inheriting the
    /// defensive position. Returns false when `old_id` is not in the order.
    pub fn apply_substitution(
        &mut self,
        old_id: &str,
        new_player: BatterRatings,
        role: &str,
        inning: u32,
        batting_team: &str,
        pitcher_id: &str,
    ) -> bool {
        let Some(slot) = self.lineup_index(old_id) else { return false };
        let new_id = new_player.player_id.clone();
        self.lineup[slot] = new_player;
        let position = self.positions.remove(old_id);
        if let Some(pos) = position {
            self.positions.insert(new_id.clone(), pos);
            if pos != Position::Dh {
                self.fielding_line(&new_id, false);
            }
        }
        let line = self.batter_line(&new_id);
        line.g = line.g.max(1);
        self.bench_used.insert(new_id.clone());
        self.bench.retain(|b| b.player_id != new_id);
        self.substitutions.push(SubstitutionEvent {
            team: batting_team.to_string(),
            inning,
            role: role.to_string(),
            out_id: old_id.to_string(),
            in_id: new_id,
            position: position.map(|p| p.code().to_string()).unwrap_or_default(),
            pitcher_id: pitcher_id.to_string(),
        });
        true
    }

    /// Batting lines in lineup order, then any remaining participants.
    pub fn batting_summaries(&self) -> Vec<BatterLine> {
        let mut ordered = Vec::new();
        let mut seen = HashSet::new();
        for batter in &self.lineup {
            if let Some(line) = self.batting_lines.get(&batter.player_id) {
                ordered.push(line.clone());
                seen.insert(batter.player_id.clone());
            }
        }
        let mut rest: Vec<&BatterLine> =
            self.batting_lines.values().filter(|l| !seen.contains(&l.player_id)).collect();
        rest.sort_by(|a, b| a.player_id.cmp(&b.player_id));
        ordered.extend(rest.into_iter().cloned());
        ordered
    }

    pub fn fielding_summaries(&self) -> Vec<FieldingLine> {
        let mut ordered = Vec::new();
        let mut seen = HashSet::new();
        for batter in &self.lineup {
            if let Some(line) = self.fielding_lines.get(&batter.player_id) {
                ordered.push(line.clone());
                seen.insert(batter.player_id.clone());
            }
        }
        let mut rest: Vec<&FieldingLine> =
            self.fielding_lines.values().filter(|l| !seen.contains(&l.player_id)).collect();
        rest.sort_by(|a, b| a.player_id.cmp(&b.player_id));
        ordered.extend(rest.into_iter().cloned());
        ordered
    }
}

// ============================================================================
// Bench selection rules
// ============================================================================

pub fn platoon_bonus(batter: &BatterRatings, pitcher: &PitcherRatings) -> f64 {
    if pitcher.throws == Hand::L {
        (batter.vs_left - 50.0) / 6.0
    } else {
        0.0
    }
}

pub fn batter_offense_score(batter: &BatterRatings, pitcher: &PitcherRatings) -> f64 {
    batter.contact * 0.55 + batter.power * 0.45 + platoon_bonus(batter, pitcher)
}

/// Late-inning pinch hitter: needs a bench bat with a clear offense edge
/// over the current hitter in a close-or-trailing spot.
pub fn select_pinch_hitter(
    state: &LineupState,
    batter: &BatterRatings,
    pitcher: &PitcherRatings,
    inning: u32,
    outs: u32,
    score_diff: i32,
    bases_empty: bool,
    tuning: &TuningConfig,
) -> Option<BatterRatings> {
    if inning < tuning.get("pinch_hit_inning", 7.0) as u32 {
        return None;
    }
    if f64::from(score_diff) > tuning.get("pinch_hit_close_run_diff", 2.0) {
        return None;
    }
    if outs >= 2 && bases_empty {
        return None;
    }
    let candidates = state.available_bench();
    if candidates.is_empty() {
        return None;
    }
    let current_score = batter_offense_score(batter, pitcher);
    let best = candidates
        .into_iter()
        .max_by(|a, b| batter_offense_score(a, pitcher).total_cmp(&batter_offense_score(b, pitcher)))?;
    if batter_offense_score(best, pitcher) - current_score
        < tuning.get("pinch_hit_advantage_min", 6.0)
    {
        return None;
    }
    Some(best.clone())
}

/// Pinch runner for a slow runner in a late close game.
pub fn select_pinch_runner(
    state: &LineupState,
    runner: &BatterRatings,
    inning: u32,
    score_diff: i32,
    tuning: &TuningConfig,
) -> Option<BatterRatings> {
    if inning < tuning.get("pinch_run_inning", 7.0) as u32 {
        return None;
    }
    if f64::from(score_diff) > tuning.get("pinch_run_close_run_diff", 2.0) {
        return None;
    }
    if runner.speed >= tuning.get("pinch_run_speed_min", 55.0) {
        return None;
    }
    let min_diff = tuning.get("pinch_run_speed_diff", 8.0);
    state
        .available_bench()
        .into_iter()
        .filter(|b| b.speed >= runner.speed + min_diff)
        .max_by(|a, b| a.speed.total_cmp(&b.speed))
        .cloned()
}

/// Best defensive upgrade available from the bench, if it clears the
/// minimum fielding gain.
pub fn select_defensive_replacement(
    state: &LineupState,
    tuning: &TuningConfig,
) -> Option<(Position, BatterRatings, BatterRatings)> {
    if state.positions.is_empty() {
        return None;
    }
    let candidates = state.available_bench();
    if candidates.is_empty() {
        return None;
    }
    let by_id: HashMap<&str, &BatterRatings> =
        state.lineup.iter().map(|b| (b.player_id.as_str(), b)).collect();
    let mut best: Option<(Position, BatterRatings, BatterRatings)> = None;
    let mut best_gain = tuning.get("defensive_sub_fielding_diff", 8.0);
    for pos in Position::FIELDING {
        let current_id = state
            .positions
            .iter()
            .find(|(_, p)| **p == pos)
            .map(|(id, _)| id.as_str());
        let Some(current) = current_id.and_then(|id| by_id.get(id)) else { continue };
        let current_rating = adjusted_fielding_rating(current, pos, tuning);
        for candidate in &candidates {
            if !candidate.can_play(pos) {
                continue;
            }
            let gain = adjusted_fielding_rating(candidate, pos, tuning) - current_rating;
            if gain >= best_gain {
                best_gain = gain;
                best = Some((pos, (*current).clone(), (*candidate).clone()));
            }
        }
    }
    best
}

/// Pre-inning defensive substitution: late, close, team ahead or tied.
pub fn maybe_defensive_sub(
    state: &mut LineupState,
    inning: u32,
    score_diff: i32,
    defense_team: &str,
    pitcher_id: &str,
    tuning: &TuningConfig,
) {
    if inning < tuning.get("defensive_sub_inning", 7.0) as u32 {
        return;
    }
    if f64::from(score_diff.abs()) > tuning.get("defensive_sub_close_run_diff", 2.0) {
        return;
    }
    if score_diff < 0 {
        return;
    }
    if let Some((_pos, old_player, new_player)) = select_defensive_replacement(state, tuning) {
        state.apply_substitution(
            &old_player.player_id,
            new_player,
            "DEF",
            inning,
            defense_team,
            pitcher_id,
        );
    }
}

/// Replacement for an injured player: position-eligible bench first,
/// best overall fielder otherwise.
pub fn select_injury_replacement(
    state: &LineupState,
    injured: &BatterRatings,
    tuning: &TuningConfig,
) -> Option<BatterRatings> {
    let candidates = state.available_bench();
    if candidates.is_empty() {
        return None;
    }
    if let Some(&pos) = state.positions.get(&injured.player_id) {
        let eligible: Vec<&BatterRatings> =
            candidates.iter().copied().filter(|b| b.can_play(pos)).collect();
        if let Some(best) = eligible.into_iter().max_by(|a, b| {
            adjusted_fielding_rating(a, pos, tuning)
                .total_cmp(&adjusted_fielding_rating(b, pos, tuning))
        }) {
            return Some(best.clone());
        }
    }
    candidates.into_iter().max_by(|a, b| a.fielding.total_cmp(&b.fielding)).cloned()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn batter(id: &str) -> BatterRatings {
        BatterRatings::neutral(id)
    }

    fn nine() -> Vec<BatterRatings> {
        (0..9).map(|i| batter(&format!("b{i}"))).collect()
    }

    #[test]
    fn substitution_moves_position_and_burns_the_bench() {
        let mut positions = HashMap::new();
        positions.insert("b0".to_string(), Position::Short);
        let mut state = LineupState::new(nine(), positions, vec![batter("sub")]);
        assert!(state.apply_substitution(
            "b0",
            batter("sub"),
            "PH",
            7,
            "home",
            "p1"
        ));
        assert_eq!(state.lineup[0].player_id, "sub");
        assert_eq!(state.positions.get("sub"), Some(&Position::Short));
        assert!(state.positions.get("b0").is_none());
        assert!(state.bench_used.contains("sub"));
        assert!(state.available_bench().is_empty());
        assert_eq!(state.substitutions.len(), 1);
        assert_eq!(state.substitutions[0].role, "PH");
    }

    #[test]
    fn pinch_hitter_requires_a_clear_edge_late() {
        let tuning = TuningConfig::default();
        let pitcher = PitcherRatings::neutral("p1");
        let mut masher = batter("masher");
        masher.contact = 70.0;
        masher.power = 70.0;
        let state = LineupState::new(nine(), HashMap::new(), vec![masher]);
        // Too early.
        assert!(select_pinch_hitter(&state, &state.lineup[0], &pitcher, 5, 1, 0, false, &tuning)
            .is_none());
        // Late and close: the bench bat clears the threshold.
        let pick = select_pinch_hitter(&state, &state.lineup[0], &pitcher, 8, 1, 0, false, &tuning);
        assert_eq!(pick.unwrap().player_id, "masher");
        // No edge over an equal hitter.
        let state_even = LineupState::new(nine(), HashMap::new(), vec![batter("even")]);
        assert!(select_pinch_hitter(
            &state_even,
            &state_even.lineup[0],
            &pitcher,
            8,
            1,
            0,
            false,
            &tuning
        )
        .is_none());
    }

    #[test]
    fn pinch_runner_wants_a_real_speed_gap() {
        let tuning = TuningConfig::default();
        let mut slow = batter("slow");
        slow.speed = 40.0;
        let mut jet = batter("jet");
        jet.speed = 80.0;
        let state = LineupState::new(nine(), HashMap::new(), vec![jet]);
        let pick = select_pinch_runner(&state, &slow, 8, 0, &tuning);
        assert_eq!(pick.unwrap().player_id, "jet");
        let mut fast_enough = batter("ok");
        fast_enough.speed = 60.0;
        assert!(select_pinch_runner(&state, &fast_enough, 8, 0, &tuning).is_none());
    }

    #[test]
    fn defensive_sub_picks_the_biggest_upgrade() {
        let tuning = TuningConfig::default();
        let mut lineup = nine();
        lineup[3].fielding = 35.0;
        lineup[3].primary_position = Some(Position::Short);
        let mut positions = HashMap::new();
        positions.insert(lineup[3].player_id.clone(), Position::Short);
        let mut glove = batter("glove");
        glove.fielding = 75.0;
        glove.primary_position = Some(Position::Short);
        let state = LineupState::new(lineup, positions, vec![glove]);
        let (pos, old, new) = select_defensive_replacement(&state, &tuning).unwrap();
        assert_eq!(pos, Position::Short);
        assert_eq!(old.player_id, "b3");
        assert_eq!(new.player_id, "glove");
    }
}

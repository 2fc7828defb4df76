//! Pitching staff management: fatigue limits, the hook, relief selection,
//! rotation ordering and save/hold bookkeeping.
//!
//! Pitcher states and their stat lines live in vectors owned by
//! [`TeamPitchingState`]; everything else refers to them by index, which
//! keeps the runner-to-responsible-pitcher bookkeeping free of ownership
//! cycles.

use std::collections::HashMap;

use crate::models::player::{BatterRatings, Hand, PitcherRatings, StaffRole};
use crate::models::stats::{PitcherLine, PitcherUsageSummary};
use crate::tuning::TuningConfig;
use crate::usage::UsageState;

/// In-game state for one pitcher.
#[derive(Debug, Clone)]
pub struct PitcherState {
    pub pitcher: PitcherRatings,
    pub pitches: u32,
    pub fatigue_start: f64,
    pub fatigue_limit: f64,
    pub last_penalty: f64,
    pub pregame_penalty: f64,
    pub usage_multiplier: f64,
    pub debt: f64,
    pub used: bool,
    pub available: bool,
    pub staff_role: StaffRole,
    pub rest_role: StaffRole,
    pub in_save_situation: bool,
    pub entered_save_opp: bool,
}

impl PitcherState {
    fn new(pitcher: PitcherRatings, staff_role: StaffRole, rest_role: StaffRole) -> Self {
        Self {
            pitcher,
            pitches: 0,
            fatigue_start: 0.0,
            fatigue_limit: 0.0,
            last_penalty: 0.0,
            pregame_penalty: 0.0,
            usage_multiplier: 1.0,
            debt: 0.0,
            used: false,
            available: true,
            staff_role,
            rest_role,
            in_save_situation: false,
            entered_save_opp: false,
        }
    }

    pub fn usage_summary(&self) -> PitcherUsageSummary {
        PitcherUsageSummary {
            player_id: self.pitcher.player_id.clone(),
            staff_role: self.staff_role.to_string(),
            pitches: self.pitches,
            fatigue_start: self.fatigue_start,
            fatigue_limit: self.fatigue_limit,
            fatigue_penalty: self.last_penalty,
            pregame_penalty: self.pregame_penalty,
            usage_multiplier: self.usage_multiplier,
            fatigue_debt: self.debt,
            available: self.available,
        }
    }
}

/// Game leverage bucket used for relief selection.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Leverage {
    High,
    Mid,
    Long,
}

// ============================================================================
// Fatigue model
// ============================================================================

/// Pitch-count band where fatigue begins and where the pitcher is done,
/// derived from endurance and compressed for relievers by role.
pub fn pitcher_usage_limits(
    pitcher: &PitcherRatings,
    role: StaffRole,
    tuning: &TuningConfig,
) -> (f64, f64) {
    let endurance = if pitcher.endurance > 0.0 { pitcher.endurance } else { 50.0 };
    let start_base = tuning.get("fatigue_start_base", 50.0);
    let start_scale = tuning.get("fatigue_start_endurance_scale", 0.5);
    let limit_base = tuning.get("fatigue_limit_base", 15.0);
    let limit_scale = tuning.get("fatigue_limit_endurance_scale", 0.0);
    let mut fatigue_start = start_base + endurance * start_scale;
    let mut fatigue_limit = fatigue_start + limit_base + endurance * limit_scale;
    match role {
        StaffRole::Cl | StaffRole::Su | StaffRole::Mr => {
            fatigue_start *= tuning.get("reliever_fatigue_start_scale", 0.5);
            let span = (fatigue_limit - fatigue_start).max(5.0);
            fatigue_limit = fatigue_start + span * tuning.get("reliever_fatigue_limit_scale", 0.5);
        }
        StaffRole::Lr => {
            fatigue_start *= tuning.get("long_reliever_fatigue_start_scale", 0.75);
            let span = (fatigue_limit - fatigue_start).max(5.0);
            fatigue_limit =
                fatigue_start + span * tuning.get("long_reliever_fatigue_limit_scale", 0.75);
        }
        _ => {}
    }
    fatigue_limit = fatigue_limit.max(fatigue_start + 5.0);
    (fatigue_start, fatigue_limit)
}

pub fn rest_days_for_role(role: StaffRole, tuning: &TuningConfig) -> u32 {
    match role {
        StaffRole::Sp(_) => tuning.get("starter_rest_days", 4.0) as u32,
        StaffRole::Cl => tuning.get("closer_rest_days", 1.0) as u32,
        _ => tuning.get("reliever_rest_days", 0.0) as u32,
    }
}

/// In-game fatigue penalty once the pitch count passes `fatigue_start`.
pub fn fatigue_penalty(state: &PitcherState, tuning: &TuningConfig) -> f64 {
    if f64::from(state.pitches) <= state.fatigue_start {
        return 0.0;
    }
    let span = (state.fatigue_limit - state.fatigue_start).max(1.0);
    let mut raw = (f64::from(state.pitches) - state.fatigue_start) / span;
    raw *= tuning.get("fatigue_decay_scale", 1.0);
    let durability = if state.pitcher.durability > 0.0 { state.pitcher.durability } else { 50.0 };
    raw *= 1.0 + (50.0 - durability) / 200.0;
    raw.clamp(0.0, 1.5)
}

/// Velocity, command and movement multipliers for a given penalty.
pub fn fatigue_factors(penalty: f64) -> (f64, f64, f64) {
    let velocity = (1.0 - 0.15 * penalty).max(0.85);
    let command = (1.0 - 0.30 * penalty).max(0.60);
    let movement = (1.0 - 0.25 * penalty).max(0.65);
    (velocity, command, movement)
}

// ============================================================================
// Rotation and rest
// ============================================================================

fn days_since_use(usage: &UsageState, game_day: u32, pitcher_id: &str) -> Option<u32> {
    usage
        .peek_workload(pitcher_id)
        .and_then(|w| w.last_used_day)
        .map(|last| game_day.saturating_sub(last))
}

fn is_rested(
    usage: &UsageState,
    game_day: u32,
    pitcher_id: &str,
    role: StaffRole,
    tuning: &TuningConfig,
) -> bool {
    match days_since_use(usage, game_day, pitcher_id) {
        Some(days) => days >= rest_days_for_role(role, tuning),
        None => true,
    }
}

/// Order a staff for a game day: the rotation slot for the day leads,
/// skipping ahead to the next rested starter (or the most rested of all)
/// when usage says the scheduled one needs more rest.
pub fn order_pitchers_for_game(
    pitchers: &[PitcherRatings],
    roles_by_id: &HashMap<String, StaffRole>,
    usage: Option<&UsageState>,
    game_day: Option<u32>,
    tuning: &TuningConfig,
) -> Vec<PitcherRatings> {
    if pitchers.is_empty() {
        return Vec::new();
    }
    let role_of = |pitcher: &PitcherRatings| -> StaffRole {
        roles_by_id.get(&pitcher.player_id).copied().unwrap_or_else(|| {
            let preferred = StaffRole::parse(&pitcher.preferred_role);
            if preferred != StaffRole::Unassigned {
                preferred
            } else {
                StaffRole::parse(&pitcher.role)
            }
        })
    };
    let mut starters: Vec<(StaffRole, PitcherRatings)> = Vec::new();
    let mut bullpen: Vec<PitcherRatings> = Vec::new();
    for pitcher in pitchers {
        let role = role_of(pitcher);
        if role.is_starter() {
            starters.push((role, pitcher.clone()));
        } else {
            bullpen.push(pitcher.clone());
        }
    }
    if starters.is_empty() {
        return pitchers.to_vec();
    }
    starters.sort_by(|a, b| {
        a.0.rotation_key().cmp(&b.0.rotation_key()).then_with(|| {
            a.1.player_id.cmp(&b.1.player_id)
        })
    });

    let rotation_len = starters.len();
    let start_index = game_day.map(|day| day as usize % rotation_len).unwrap_or(0);
    let mut chosen_index = start_index;

    if let (Some(usage), Some(day)) = (usage, game_day) {
        let rested: Vec<usize> = starters
            .iter()
            .enumerate()
            .filter(|(_, (role, pitcher))| is_rested(usage, day, &pitcher.player_id, *role, tuning))
            .map(|(idx, _)| idx)
            .collect();
        if !rested.is_empty() {
            for offset in 0..rotation_len {
                let idx = (start_index + offset) % rotation_len;
                if rested.contains(&idx) {
                    chosen_index = idx;
                    break;
                }
            }
        } else {
            chosen_index = (0..rotation_len)
                .max_by_key(|idx| {
                    days_since_use(usage, day, &starters[*idx].1.player_id)
                        .map(i64::from)
                        .unwrap_or(-1)
                })
                .unwrap_or(start_index);
        }
    }

    let mut ordered: Vec<PitcherRatings> = Vec::with_capacity(pitchers.len());
    for offset in 0..rotation_len {
        ordered.push(starters[(chosen_index + offset) % rotation_len].1.clone());
    }
    ordered.extend(bullpen);
    ordered
}

// ============================================================================
// Usage application
// ============================================================================

/// Fold accumulated fatigue debt into a pitcher's pre-game condition:
/// pregame penalty, compressed fatigue band, and availability (with
/// stricter closer guards).
pub fn apply_usage_state(
    state: &mut PitcherState,
    usage: Option<&mut UsageState>,
    game_day: Option<u32>,
    tuning: &TuningConfig,
) {
    let (Some(usage), Some(game_day)) = (usage, game_day) else { return };
    let workload = usage.workload_for(&state.pitcher.player_id).clone();
    state.debt = workload.fatigue_debt;
    if state.fatigue_limit <= 0.0 {
        return;
    }
    let ratio = (state.debt / state.fatigue_limit.max(1.0)).max(0.0);
    state.pregame_penalty = (ratio * tuning.get("fatigue_debt_penalty_scale", 0.6)).min(0.9);
    let start_reduction = tuning.get("fatigue_debt_start_reduction", 0.4);
    let limit_reduction = tuning.get("fatigue_debt_limit_reduction", 0.5);
    state.fatigue_start = (state.fatigue_start * (1.0 - ratio * start_reduction)).max(5.0);
    state.fatigue_limit = (state.fatigue_limit * (1.0 - ratio * limit_reduction))
        .max(state.fatigue_start + 5.0);

    let rest_role = if state.rest_role == StaffRole::Unassigned {
        state.staff_role
    } else {
        state.rest_role
    };
    let availability_ratio = if rest_role == StaffRole::Cl {
        tuning.get("closer_availability_ratio", 1.3)
    } else {
        1.0
    };
    state.available = ratio <= availability_ratio;

    let rest_days = rest_days_for_role(rest_role, tuning);
    if rest_days > 0 {
        if let Some(last_used) = workload.last_used_day {
            let days_since = game_day.saturating_sub(last_used);
            if days_since < rest_days {
                state.available = false;
                let rest_penalty = tuning.get("short_rest_penalty", 0.35);
                let deficit = f64::from(rest_days - days_since);
                let scaled = rest_penalty * (deficit / f64::from(rest_days).max(1.0));
                state.pregame_penalty = state.pregame_penalty.max(scaled);
            }
        }
    }
    if rest_role == StaffRole::Cl {
        let max_consecutive = tuning.get("closer_max_consecutive_days", 2.0) as u32;
        if max_consecutive > 0 {
            if let Some(last_used) = workload.last_used_day {
                if game_day.saturating_sub(last_used) == 1
                    && workload.consecutive_days_used >= max_consecutive
                {
                    state.available = false;
                }
            }
        }
        let max_ratio = tuning.get("closer_max_appearances_ratio", 0.0);
        if max_ratio > 0.0 {
            let max_apps = ((f64::from(game_day) + 1.0) * max_ratio).floor().max(1.0) as u32;
            if workload.appearances >= max_apps {
                state.available = false;
            }
        }
    }
}

// ============================================================================
// Team pitching state
// ============================================================================

#[derive(Debug, Clone)]
pub struct TeamPitchingState {
    /// Index 0 is the starter; the rest are the bullpen in staff order.
    pub pitchers: Vec<PitcherState>,
    pub current: usize,
    pub lines: HashMap<String, PitcherLine>,
}

impl TeamPitchingState {
    /// Build from an ordered staff (starter first). Returns `None` when the
    /// staff is empty.
    pub fn build(
        pitchers: &[PitcherRatings],
        roles_by_id: &HashMap<String, StaffRole>,
        tuning: &TuningConfig,
        mut usage: Option<&mut UsageState>,
        game_day: Option<u32>,
        postseason: bool,
    ) -> Option<Self> {
        let starter_ratings = pitchers.first()?;
        let role_of = |pitcher: &PitcherRatings| -> StaffRole {
            roles_by_id.get(&pitcher.player_id).copied().unwrap_or_else(|| {
                let preferred = StaffRole::parse(&pitcher.preferred_role);
                if preferred != StaffRole::Unassigned {
                    preferred
                } else {
                    StaffRole::parse(&pitcher.role)
                }
            })
        };

        let starter_role = role_of(starter_ratings);
        let (start, limit) = pitcher_usage_limits(starter_ratings, starter_role, tuning);
        let mut starter = PitcherState::new(starter_ratings.clone(), starter_role, starter_role);
        starter.fatigue_start = start;
        starter.fatigue_limit = limit;
        apply_usage_state(&mut starter, usage.as_deref_mut(), game_day, tuning);

        let mut states = vec![starter];
        for pitcher in &pitchers[1..] {
            let staff_role = role_of(pitcher);
            if staff_role.is_starter() {
                continue;
            }
            let (start, limit) = pitcher_usage_limits(pitcher, staff_role, tuning);
            let mut reliever = PitcherState::new(pitcher.clone(), staff_role, staff_role);
            reliever.fatigue_start = start;
            reliever.fatigue_limit = limit;
            apply_usage_state(&mut reliever, usage.as_deref_mut(), game_day, tuning);
            states.push(reliever);
        }
        if states.len() == 1 {
            // No labeled relievers: press the remaining arms into long relief.
            for pitcher in &pitchers[1..] {
                let rest_role = role_of(pitcher);
                let (start, limit) = pitcher_usage_limits(pitcher, StaffRole::Lr, tuning);
                let mut reliever = PitcherState::new(pitcher.clone(), StaffRole::Lr, rest_role);
                reliever.fatigue_start = start;
                reliever.fatigue_limit = limit;
                apply_usage_state(&mut reliever, usage.as_deref_mut(), game_day, tuning);
                states.push(reliever);
            }
        }

        let mut team = Self { pitchers: states, current: 0, lines: HashMap::new() };
        team.pitchers[0].used = true;
        team.pitchers[0].usage_multiplier = usage_multiplier(1, 0, postseason, tuning);
        Some(team)
    }

    pub fn starter(&self) -> &PitcherState {
        &self.pitchers[0]
    }

    pub fn current(&self) -> &PitcherState {
        &self.pitchers[self.current]
    }

    pub fn current_mut(&mut self) -> &mut PitcherState {
        let idx = self.current;
        &mut self.pitchers[idx]
    }

    pub fn current_id(&self) -> &str {
        &self.pitchers[self.current].pitcher.player_id
    }

    /// Fetch-or-create the stat line for a pitcher, rolling its inning-local
    /// tallies when the inning changed.
    pub fn line_for(&mut self, idx: usize, inning: u32) -> &mut PitcherLine {
        let pid = self.pitchers[idx].pitcher.player_id.clone();
        let is_starter = idx == 0;
        let line =
            self.lines.entry(pid.clone()).or_insert_with(|| PitcherLine::new(&pid, inning));
        if line.g == 0 {
            line.g = 1;
        }
        if is_starter && line.gs == 0 {
            line.gs = 1;
        }
        line.enter_inning(inning);
        line
    }

    pub fn line_for_current(&mut self, inning: u32) -> &mut PitcherLine {
        self.line_for(self.current, inning)
    }

    pub fn line_of(&mut self, pitcher_id: &str, inning: u32) -> &mut PitcherLine {
        self.lines
            .entry(pitcher_id.to_string())
            .or_insert_with(|| PitcherLine::new(pitcher_id, inning))
    }

    pub fn usage_summaries(&self) -> Vec<PitcherUsageSummary> {
        self.pitchers.iter().map(|p| p.usage_summary()).collect()
    }

    /// Lines in appearance order: starter first, then bullpen order.
    pub fn line_summaries(&self) -> Vec<PitcherLine> {
        let mut ordered = Vec::new();
        for state in &self.pitchers {
            if let Some(line) = self.lines.get(&state.pitcher.player_id) {
                ordered.push(line.clone());
            }
        }
        for (pid, line) in &self.lines {
            if !self.pitchers.iter().any(|p| &p.pitcher.player_id == pid) {
                ordered.push(line.clone());
            }
        }
        ordered
    }

    /// Hand the ball to `idx`.
    pub fn enter_pitcher(
        &mut self,
        idx: usize,
        inning: u32,
        score_diff: i32,
        postseason: bool,
        tuning: &TuningConfig,
    ) {
        let mult = usage_multiplier(inning, score_diff, postseason, tuning);
        let state = &mut self.pitchers[idx];
        state.used = true;
        state.usage_multiplier = mult;
        self.current = idx;
    }

    /// Exit bookkeeping for the outgoing pitcher: hold or blown save.
    pub fn pitcher_exit_stats(
        &mut self,
        idx: usize,
        inning: u32,
        defense_score: u32,
        offense_score: u32,
        game_finished: bool,
    ) {
        let entered_save_opp = self.pitchers[idx].entered_save_opp;
        let in_save_situation = self.pitchers[idx].in_save_situation;
        let pid = self.pitchers[idx].pitcher.player_id.clone();
        let line = self.line_of(&pid, inning);
        if entered_save_opp && in_save_situation {
            if defense_score > offense_score {
                if !game_finished && line.outs > 0 {
                    line.hld += 1;
                }
            } else {
                line.bs += 1;
            }
        }
        self.pitchers[idx].in_save_situation = false;
    }

    /// Entry bookkeeping for the incoming pitcher: inherited runners and
    /// save-opportunity tracking. Returns the number of inherited runners.
    pub fn pitcher_enter_stats(
        &mut self,
        idx: usize,
        inning: u32,
        score_diff: i32,
        defense_score: u32,
        offense_score: u32,
        runners_on: u32,
        postseason: bool,
        tuning: &TuningConfig,
    ) -> u32 {
        self.enter_pitcher(idx, inning, score_diff, postseason, tuning);
        let line = self.line_for(idx, inning);
        if runners_on > 0 {
            line.ir += runners_on;
            line.inning_baserunners += runners_on;
        }
        let lead = defense_score as i32 - offense_score as i32;
        let save_opp = save_opportunity(lead, inning, runners_on, tuning);
        if save_opp {
            self.line_for(idx, inning).svo += 1;
        }
        let state = &mut self.pitchers[idx];
        state.entered_save_opp = save_opp;
        state.in_save_situation = save_opp;
        runners_on
    }
}

// ============================================================================
// Leverage and save situations
// ============================================================================

pub fn leverage_type(inning: u32, score_diff: i32, tuning: &TuningConfig) -> Leverage {
    let save_diff = tuning.get("save_opportunity_run_diff", 3.0) as i32;
    if inning >= 8 && score_diff > 0 && score_diff <= save_diff {
        return Leverage::High;
    }
    let close_game = f64::from(score_diff.abs()) <= tuning.get("close_game_run_diff", 2.0);
    if close_game && inning >= 8 {
        return Leverage::High;
    }
    if inning <= 5 {
        return Leverage::Long;
    }
    Leverage::Mid
}

pub fn usage_multiplier(
    inning: u32,
    score_diff: i32,
    postseason: bool,
    tuning: &TuningConfig,
) -> f64 {
    let mut mult = 1.0;
    if f64::from(score_diff.abs()) <= tuning.get("close_game_run_diff", 2.0) && inning >= 7 {
        mult += 0.15;
    }
    if postseason {
        mult += 0.1;
    }
    mult
}

/// Save opportunity: small lead late, or a bigger lead with the tying run
/// in the on-deck circle's reach.
pub fn save_opportunity(lead: i32, inning: u32, runners_on: u32, tuning: &TuningConfig) -> bool {
    let save_diff = tuning.get("save_opportunity_run_diff", 3.0) as i32;
    let min_inning = tuning.get("save_opportunity_inning", 1.0) as u32;
    if lead <= 0 || inning < min_inning {
        return false;
    }
    if lead <= save_diff {
        return true;
    }
    if lead == save_diff + 1 && runners_on >= 2 {
        return true;
    }
    if lead == save_diff + 2 && runners_on >= 3 {
        return true;
    }
    false
}

// ============================================================================
// Hook
// ============================================================================

pub fn times_through_order(batters_faced: u32, lineup_size: usize) -> u32 {
    if lineup_size == 0 {
        return 1;
    }
    batters_faced.saturating_sub(1) / lineup_size as u32 + 1
}

fn hook_aggression(score_diff: i32, postseason: bool, tuning: &TuningConfig) -> f64 {
    let mut aggression = tuning.get("hook_aggression_scale", 1.0);
    if f64::from(score_diff.abs()) <= tuning.get("close_game_run_diff", 2.0) {
        aggression *= tuning.get("close_game_hook_scale", 1.1);
    }
    if postseason {
        aggression *= tuning.get("postseason_hook_scale", 1.2);
    }
    aggression
}

/// The hook decision. No-hitters and perfect games past the achievement
/// inning get a protected leash, subject to hard pitch caps; role-bound
/// out caps can force a hook regardless of the score.
pub fn should_hook_pitcher(
    state: &PitcherState,
    line: &PitcherLine,
    lineup_size: usize,
    score_diff: i32,
    postseason: bool,
    tuning: &TuningConfig,
) -> bool {
    let innings_pitched = line.innings_pitched();
    let achievement_inning = tuning.get("achievement_inning_threshold", 7.0);
    let perfect = line.is_perfect();
    let no_hit = line.is_no_hit();

    if innings_pitched >= achievement_inning {
        if perfect && f64::from(state.pitches) <= tuning.get("perfect_pitch_limit", 170.0) {
            return false;
        }
        if no_hit && f64::from(state.pitches) <= tuning.get("nohit_pitch_limit", 160.0) {
            return false;
        }
    }

    let max_outs = match state.staff_role {
        StaffRole::Cl => tuning.get("closer_max_outs", 3.0) as u32,
        StaffRole::Su => tuning.get("setup_max_outs", 3.0) as u32,
        StaffRole::Mr => tuning.get("middle_reliever_max_outs", 6.0) as u32,
        StaffRole::Lr => tuning.get("long_reliever_max_outs", 9.0) as u32,
        _ => 0,
    };
    if max_outs > 0 && line.outs >= max_outs {
        return true;
    }

    let mut pitch_cap = state.fatigue_limit;
    if innings_pitched >= achievement_inning {
        if line.runs == 0 {
            pitch_cap += tuning.get("shutout_pitch_bonus", 10.0);
        }
        if line.is_one_hit() {
            pitch_cap += tuning.get("one_hit_pitch_bonus", 8.0);
        }
    }
    if f64::from(state.pitches) >= pitch_cap {
        return true;
    }

    let mut hook_score = 0.0;
    let runs_allowed = tuning.get("hook_runs_allowed", 5.5);
    if f64::from(line.runs) >= runs_allowed {
        hook_score += 1.0 + 0.2 * (f64::from(line.runs) - runs_allowed);
    }
    let hits_allowed = tuning.get("hook_hits_allowed", 8.0);
    if f64::from(line.hits) >= hits_allowed {
        hook_score += 0.8 + 0.15 * (f64::from(line.hits) - hits_allowed);
    }
    let walks_allowed = tuning.get("hook_walks_allowed", 4.0);
    if f64::from(line.walks) >= walks_allowed {
        hook_score += 0.8 + 0.2 * (f64::from(line.walks) - walks_allowed);
    }
    let consecutive_hits = tuning.get("hook_consecutive_hits", 3.0);
    if f64::from(line.consecutive_hits) >= consecutive_hits {
        hook_score += 0.3 * (f64::from(line.consecutive_hits) - consecutive_hits + 1.0);
    }
    let inning_runs = tuning.get("hook_runs_in_inning", 3.0);
    if f64::from(line.inning_runs) >= inning_runs {
        hook_score += 0.6 * (f64::from(line.inning_runs) - inning_runs + 1.0);
    }
    let inning_walks = tuning.get("hook_walks_in_inning", 2.0);
    if f64::from(line.inning_walks) >= inning_walks {
        hook_score += 0.4 * (f64::from(line.inning_walks) - inning_walks + 1.0);
    }
    let inning_baserunners = tuning.get("hook_baserunners_in_inning", 4.0);
    if f64::from(line.inning_baserunners) >= inning_baserunners {
        hook_score += 0.4 * (f64::from(line.inning_baserunners) - inning_baserunners + 1.0);
    }

    if state.last_penalty >= tuning.get("hook_fatigue_penalty", 0.6) {
        hook_score += 0.8;
    }
    let tto = times_through_order(line.batters_faced, lineup_size);
    if tto >= 3 && state.last_penalty >= tuning.get("hook_fatigue_soft_penalty", 0.3) {
        hook_score += tuning.get("hook_tto_penalty", 0.4);
    }

    hook_score *= hook_aggression(score_diff, postseason, tuning);

    let mut leash_bonus = 0.0;
    if innings_pitched >= achievement_inning {
        if line.runs == 0 {
            leash_bonus += tuning.get("leash_shutout_bonus", 0.4);
        }
        if line.is_one_hit() {
            leash_bonus += tuning.get("leash_one_hit_bonus", 0.3);
        }
        if no_hit {
            leash_bonus += tuning.get("leash_nohit_bonus", 0.6);
        }
        if perfect {
            leash_bonus += tuning.get("leash_perfect_bonus", 0.8);
        }
    }

    hook_score - leash_bonus >= tuning.get("hook_threshold", 1.6)
}

// ============================================================================
// Relief selection
// ============================================================================

fn reliever_score(state: &PitcherState, leverage: Leverage, score_diff: i32) -> f64 {
    let pitcher = &state.pitcher;
    let stuff = (pitcher.control + pitcher.movement + pitcher.arm) / 3.0;
    let endurance = pitcher.endurance;
    let freshness = 1.0 - state.pregame_penalty.min(0.7);
    let role = state.staff_role;
    let mut score = match leverage {
        Leverage::High => {
            let mut score = stuff * 1.1 + endurance * 0.1;
            if score_diff > 0 {
                match role {
                    StaffRole::Cl | StaffRole::Su => score += 8.0,
                    StaffRole::Mr => score += 3.0,
                    StaffRole::Lr | StaffRole::Sp(_) => score -= 4.0,
                    _ => {}
                }
            } else if matches!(role, StaffRole::Cl | StaffRole::Su) {
                score -= 6.0;
            }
            score
        }
        Leverage::Long => {
            let mut score = endurance * 0.7 + stuff * 0.3;
            match role {
                StaffRole::Lr | StaffRole::Sp(_) => score += 6.0,
                StaffRole::Cl | StaffRole::Su => score -= 6.0,
                _ => {}
            }
            score
        }
        Leverage::Mid => {
            let mut score = stuff * 0.6 + endurance * 0.4;
            match role {
                StaffRole::Mr | StaffRole::Su => score += 2.0,
                StaffRole::Cl => score -= 4.0,
                _ => {}
            }
            score
        }
    };
    score *= freshness;
    score
}

/// Platoon alignment of a reliever against the upcoming batters.
fn matchup_score(
    state: &PitcherState,
    upcoming: &[BatterRatings],
    _tuning: &TuningConfig,
) -> f64 {
    if upcoming.is_empty() {
        return 0.0;
    }
    let pitcher_hand = state.pitcher.throws;
    let mut score = 0.0;
    for batter in upcoming {
        let effective_side = if batter.bats == Hand::S {
            score -= 0.5;
            if pitcher_hand == Hand::R {
                Hand::L
            } else {
                Hand::R
            }
        } else {
            score += if batter.bats == pitcher_hand { 1.0 } else { -1.0 };
            batter.bats
        };
        if effective_side == Hand::L {
            score += (state.pitcher.vs_left - 50.0) / 25.0;
        }
    }
    score
}

/// Pick the next reliever for the situation; returns the current index
/// when the bullpen has nobody fresh.
pub fn select_reliever(
    team: &TeamPitchingState,
    leverage: Leverage,
    inning: u32,
    score_diff: i32,
    upcoming: &[BatterRatings],
    tuning: &TuningConfig,
) -> usize {
    let mut candidates: Vec<usize> = (1..team.pitchers.len())
        .filter(|&i| team.pitchers[i].available && !team.pitchers[i].used)
        .collect();
    if candidates.is_empty() {
        return team.current;
    }
    let protecting_lead = leverage == Leverage::High && score_diff > 0;
    if !protecting_lead {
        let non_cl: Vec<usize> = candidates
            .iter()
            .copied()
            .filter(|&i| team.pitchers[i].staff_role != StaffRole::Cl)
            .collect();
        if !non_cl.is_empty() {
            candidates = non_cl;
        }
    }
    if protecting_lead {
        let closer_inning = tuning.get("closer_inning_min", 9.0) as u32;
        let mut closers: Vec<usize> = Vec::new();
        if inning >= closer_inning {
            closers = candidates
                .iter()
                .copied()
                .filter(|&i| team.pitchers[i].staff_role == StaffRole::Cl)
                .collect();
            if !closers.is_empty() {
                candidates = closers.clone();
            }
        }
        if closers.is_empty() {
            let setup: Vec<usize> = candidates
                .iter()
                .copied()
                .filter(|&i| team.pitchers[i].staff_role == StaffRole::Su)
                .collect();
            if !setup.is_empty() {
                candidates = setup;
            }
        }
    }
    let platoon_weight = tuning.get("bullpen_platoon_weight", 2.0);
    candidates
        .into_iter()
        .max_by(|&a, &b| {
            let score = |i: usize| {
                reliever_score(&team.pitchers[i], leverage, score_diff)
                    + matchup_score(&team.pitchers[i], upcoming, tuning) * platoon_weight
            };
            score(a).total_cmp(&score(b))
        })
        .unwrap_or(team.current)
}

/// Closer call-up for a save situation in the ninth or later: prefer an
/// available closer, then any unused closer, then the normal chain.
pub fn select_closer_or_best(
    team: &TeamPitchingState,
    leverage: Leverage,
    inning: u32,
    lead: i32,
    upcoming: &[BatterRatings],
    tuning: &TuningConfig,
) -> usize {
    let closer_candidates: Vec<usize> = (1..team.pitchers.len())
        .filter(|&i| team.pitchers[i].staff_role == StaffRole::Cl && !team.pitchers[i].used)
        .collect();
    let available: Vec<usize> =
        closer_candidates.iter().copied().filter(|&i| team.pitchers[i].available).collect();
    let pool = if !available.is_empty() {
        available
    } else if !closer_candidates.is_empty() {
        closer_candidates
    } else {
        return select_reliever(team, leverage, inning, lead, upcoming, tuning);
    };
    pool.into_iter()
        .max_by(|&a, &b| {
            reliever_score(&team.pitchers[a], leverage, lead)
                .total_cmp(&reliever_score(&team.pitchers[b], leverage, lead))
        })
        .unwrap_or(team.current)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn staff_with_roles(roles: &[&str]) -> (Vec<PitcherRatings>, HashMap<String, StaffRole>) {
        let mut pitchers = Vec::new();
        let mut map = HashMap::new();
        for (i, role) in roles.iter().enumerate() {
            let mut p = PitcherRatings::neutral(&format!("p{i}"));
            p.role = role.to_string();
            map.insert(p.player_id.clone(), StaffRole::parse(role));
            pitchers.push(p);
        }
        (pitchers, map)
    }

    #[test]
    fn fatigue_band_is_well_formed() {
        let tuning = TuningConfig::default();
        let pitcher = PitcherRatings::neutral("p1");
        for role in ["SP1", "LR", "MR", "SU", "CL"] {
            let (start, limit) = pitcher_usage_limits(&pitcher, StaffRole::parse(role), &tuning);
            assert!(limit >= start + 5.0, "{role}: {start} {limit}");
        }
        // Relievers run on a much shorter leash than starters.
        let (sp_start, _) = pitcher_usage_limits(&pitcher, StaffRole::Sp(1), &tuning);
        let (cl_start, _) = pitcher_usage_limits(&pitcher, StaffRole::Cl, &tuning);
        assert!(cl_start < sp_start);
    }

    #[test]
    fn fatigue_factors_floor() {
        let (v, c, m) = fatigue_factors(1.5);
        assert_eq!(v, 0.85);
        assert_eq!(c, 0.60);
        assert!((m - 0.65).abs() < 1e-12);
        assert_eq!(fatigue_factors(0.0), (1.0, 1.0, 1.0));
    }

    #[test]
    fn rotation_follows_game_day_modulo() {
        let tuning = TuningConfig::default();
        let (pitchers, roles) = staff_with_roles(&["SP1", "SP2", "SP3", "MR", "CL"]);
        let day0 = order_pitchers_for_game(&pitchers, &roles, None, Some(0), &tuning);
        let day1 = order_pitchers_for_game(&pitchers, &roles, None, Some(1), &tuning);
        assert_eq!(day0[0].player_id, "p0");
        assert_eq!(day1[0].player_id, "p1");
        // Bullpen trails the rotation.
        assert_eq!(day0.last().unwrap().player_id, "p4");
    }

    #[test]
    fn unrested_starter_is_skipped() {
        let tuning = TuningConfig::default();
        let (pitchers, roles) = staff_with_roles(&["SP1", "SP2", "SP3"]);
        let mut usage = UsageState::default();
        // p0 threw yesterday relative to day 3 (rotation slot 3 % 3 = 0).
        usage.record_outing("p0", 95, 2, 1.0, &tuning);
        let ordered =
            order_pitchers_for_game(&pitchers, &roles, Some(&usage), Some(3), &tuning);
        assert_eq!(ordered[0].player_id, "p1");
    }

    #[test]
    fn heavy_debt_compresses_the_band_and_sidelines_the_arm() {
        let tuning = TuningConfig::default();
        let mut usage = UsageState::default();
        usage.workload_for("p1").fatigue_debt = 500.0;
        let pitcher = PitcherRatings::neutral("p1");
        let (start, limit) = pitcher_usage_limits(&pitcher, StaffRole::Mr, &tuning);
        let mut state = PitcherState::new(pitcher, StaffRole::Mr, StaffRole::Mr);
        state.fatigue_start = start;
        state.fatigue_limit = limit;
        apply_usage_state(&mut state, Some(&mut usage), Some(10), &tuning);
        assert!(!state.available);
        assert!(state.pregame_penalty > 0.0);
        assert!(state.fatigue_limit >= state.fatigue_start + 5.0);
    }

    #[test]
    fn hook_triggers_on_role_out_caps() {
        let tuning = TuningConfig::default();
        let pitcher = PitcherRatings::neutral("cl1");
        let (start, limit) = pitcher_usage_limits(&pitcher, StaffRole::Cl, &tuning);
        let mut state = PitcherState::new(pitcher, StaffRole::Cl, StaffRole::Cl);
        state.fatigue_start = start;
        state.fatigue_limit = limit;
        let mut line = PitcherLine::new("cl1", 9);
        line.outs = 3;
        assert!(should_hook_pitcher(&state, &line, 9, 1, false, &tuning));
        line.outs = 2;
        assert!(!should_hook_pitcher(&state, &line, 9, 1, false, &tuning));
    }

    #[test]
    fn no_hitter_is_protected_past_the_achievement_inning() {
        let tuning = TuningConfig::default();
        let pitcher = PitcherRatings::neutral("sp1");
        let (start, limit) = pitcher_usage_limits(&pitcher, StaffRole::Sp(1), &tuning);
        let mut state = PitcherState::new(pitcher, StaffRole::Sp(1), StaffRole::Sp(1));
        state.fatigue_start = start;
        state.fatigue_limit = limit;
        state.pitches = 120;
        let mut line = PitcherLine::new("sp1", 8);
        line.outs = 22;
        line.walks = 2;
        // 120 pitches over the limit would normally hook, but the no-hitter
        // stands under the pitch ceiling.
        assert!(line.is_no_hit());
        assert!(!should_hook_pitcher(&state, &line, 9, 2, false, &tuning));
        state.pitches = 165;
        assert!(should_hook_pitcher(&state, &line, 9, 2, false, &tuning));
    }

    #[test]
    fn high_leverage_lead_prefers_late_inning_arms() {
        let tuning = TuningConfig::default();
        let (pitchers, roles) = staff_with_roles(&["SP1", "LR", "MR", "SU", "CL"]);
        let team =
            TeamPitchingState::build(&pitchers, &roles, &tuning, None, None, false).unwrap();
        let pick = select_reliever(&team, Leverage::High, 9, 2, &[], &tuning);
        assert_eq!(team.pitchers[pick].staff_role, StaffRole::Cl);
        // Mid leverage avoids burning the closer.
        let pick = select_reliever(&team, Leverage::Mid, 6, 0, &[], &tuning);
        assert_ne!(team.pitchers[pick].staff_role, StaffRole::Cl);
    }

    #[test]
    fn save_opportunity_covers_tying_run_cases() {
        let tuning = TuningConfig::default();
        assert!(save_opportunity(3, 9, 0, &tuning));
        assert!(!save_opportunity(4, 9, 1, &tuning));
        assert!(save_opportunity(4, 9, 2, &tuning));
        assert!(save_opportunity(5, 9, 3, &tuning));
        assert!(!save_opportunity(0, 9, 3, &tuning));
    }

    #[test]
    fn times_through_order_counts_full_turns() {
        assert_eq!(times_through_order(1, 9), 1);
        assert_eq!(times_through_order(9, 9), 1);
        assert_eq!(times_through_order(10, 9), 2);
        assert_eq!(times_through_order(19, 9), 3);
    }
}

//! Season schedule generation and the schedule CSV store.
//!
//! The round-robin base pairs every team once per round with a bye slot on
//! odd counts. The MLB-style builder stacks home/away series cycles, then
//! shrinks or grows series lengths until every club lands exactly on the
//! requested game count, and expands the plan day-by-day with travel
//! buffers and a mid-season All-Star break.

use std::collections::{HashMap, VecDeque};
use std::path::Path;

use chrono::{Duration, NaiveDate};
use serde::{Deserialize, Serialize};

use crate::error::{SimError, StoreError};
use crate::store::atomic_write;

/// One scheduled (and possibly completed) game.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScheduledGame {
    pub date: NaiveDate,
    pub home: String,
    pub away: String,
    /// Filled as "<home>-<away>" once played.
    #[serde(default)]
    pub result: Option<String>,
    #[serde(default)]
    pub played: bool,
    #[serde(default)]
    pub boxscore: Option<String>,
}

impl ScheduledGame {
    fn new(date: NaiveDate, home: &str, away: &str) -> Self {
        Self {
            date,
            home: home.to_string(),
            away: away.to_string(),
            result: None,
            played: false,
            boxscore: None,
        }
    }
}

/// A multi-game series between two clubs.
#[derive(Debug, Clone)]
struct Series {
    home: String,
    away: String,
    length: u32,
}

/// Pairings for a single round-robin tournament: one list of `(home, away)`
/// pairs per round, with home sides alternating to spread home games.
fn round_robin_pairs(teams: &[String]) -> Vec<Vec<(String, String)>> {
    if teams.is_empty() {
        return Vec::new();
    }
    let mut slots: Vec<Option<String>> = teams.iter().cloned().map(Some).collect();
    if slots.len() % 2 == 1 {
        slots.push(None);
    }
    let n = slots.len();
    let mut rounds = Vec::new();
    for i in 0..n - 1 {
        let mut round = Vec::new();
        for j in 0..n / 2 {
            let t1 = &slots[j];
            let t2 = &slots[n - 1 - j];
            let (Some(t1), Some(t2)) = (t1, t2) else { continue };
            if j % 2 == i % 2 {
                round.push((t1.clone(), t2.clone()));
            } else {
                round.push((t2.clone(), t1.clone()));
            }
        }
        rounds.push(round);
        // Rotate with the first slot fixed.
        let last = slots.pop().expect("non-empty");
        slots.insert(1, last);
    }
    rounds
}

/// Double round-robin schedule: every pairing once each way, one game per
/// team per day, with a six-day mid-season pause.
pub fn generate_schedule(teams: &[String], start_date: NaiveDate) -> Vec<ScheduledGame> {
    let rounds = round_robin_pairs(teams);
    let mut schedule = Vec::new();
    let mut current = start_date;
    for round in &rounds {
        for (home, away) in round {
            schedule.push(ScheduledGame::new(current, home, away));
        }
        current += Duration::days(1);
    }
    // All-Star pause before the return legs.
    current += Duration::days(6);
    for round in &rounds {
        for (home, away) in round {
            schedule.push(ScheduledGame::new(current, away, home));
        }
        current += Duration::days(1);
    }
    schedule
}

/// Deterministic ordering of series pairings: every pairing home, then
/// every pairing flipped.
fn series_order(teams: &[String]) -> Vec<(String, String)> {
    let rounds = round_robin_pairs(teams);
    let mut order = Vec::new();
    for round in &rounds {
        order.extend(round.iter().cloned());
    }
    for round in &rounds {
        order.extend(round.iter().map(|(home, away)| (away.clone(), home.clone())));
    }
    order
}

/// Minimum number of home/away cycles able to reach the target with series
/// of two to four games.
fn required_cycles(team_count: usize, games_per_team: u32) -> Result<u32, SimError> {
    if team_count < 2 {
        return Ok(0);
    }
    let base_min = 4 * (team_count as u32 - 1);
    if games_per_team < base_min {
        return Err(SimError::Schedule(format!(
            "games_per_team={games_per_team} is smaller than the minimum achievable \
             total of {base_min} for {team_count} teams"
        )));
    }
    let mut cycles = 1u32;
    loop {
        let min_possible = cycles * base_min;
        let max_possible = cycles * 8 * (team_count as u32 - 1);
        if (min_possible..=max_possible).contains(&games_per_team) {
            return Ok(cycles);
        }
        if games_per_team < min_possible {
            return Err(SimError::Schedule(format!(
                "games_per_team={games_per_team} is too small for any configuration \
                 with {team_count} teams"
            )));
        }
        cycles += 1;
    }
}

fn plan_totals(plan: &[Series]) -> HashMap<String, u32> {
    let mut totals: HashMap<String, u32> = HashMap::new();
    for series in plan {
        *totals.entry(series.home.clone()).or_default() += series.length;
        *totals.entry(series.away.clone()).or_default() += series.length;
    }
    totals
}

/// Build the series plan satisfying `games_per_team` exactly, shrinking
/// three-game series to two or growing them to four as needed.
fn build_series_plan(teams: &[String], games_per_team: u32) -> Result<Vec<Series>, SimError> {
    if teams.len() < 2 {
        return Ok(Vec::new());
    }
    let cycles = required_cycles(teams.len(), games_per_team)?;
    let order = series_order(teams);
    let mut plan: Vec<Series> = Vec::new();
    for _ in 0..cycles {
        for (home, away) in &order {
            plan.push(Series { home: home.clone(), away: away.clone(), length: 3 });
        }
    }

    let totals = plan_totals(&plan);
    let expected = *totals.values().next().expect("non-empty plan");
    if totals.values().any(|&total| total != expected) {
        return Err(SimError::Schedule(
            "internal series generation imbalance detected".to_string(),
        ));
    }

    if expected > games_per_team {
        let delta = expected - games_per_team;
        let mut reductions: HashMap<&str, u32> =
            teams.iter().map(|t| (t.as_str(), delta)).collect();
        for series in plan.iter_mut() {
            while series.length > 2
                && reductions[series.home.as_str()] > 0
                && reductions[series.away.as_str()] > 0
            {
                series.length -= 1;
                *reductions.get_mut(series.home.as_str()).unwrap() -= 1;
                *reductions.get_mut(series.away.as_str()).unwrap() -= 1;
            }
        }
        if reductions.values().any(|&v| v > 0) {
            return Err(SimError::Schedule(
                "unable to reach the requested games_per_team by shortening series lengths"
                    .to_string(),
            ));
        }
    } else if expected < games_per_team {
        let delta = games_per_team - expected;
        let mut additions: HashMap<&str, u32> =
            teams.iter().map(|t| (t.as_str(), delta)).collect();
        for series in plan.iter_mut() {
            while series.length < 4
                && additions[series.home.as_str()] > 0
                && additions[series.away.as_str()] > 0
            {
                series.length += 1;
                *additions.get_mut(series.home.as_str()).unwrap() -= 1;
                *additions.get_mut(series.away.as_str()).unwrap() -= 1;
            }
        }
        if additions.values().any(|&v| v > 0) {
            return Err(SimError::Schedule(
                "unable to reach the requested games_per_team by extending series lengths"
                    .to_string(),
            ));
        }
    }

    validate_plan(&plan, teams, games_per_team)?;
    Ok(plan)
}

fn validate_plan(plan: &[Series], teams: &[String], games_per_team: u32) -> Result<(), SimError> {
    let totals = plan_totals(plan);
    for team in teams {
        let total = totals.get(team).copied().unwrap_or(0);
        if total != games_per_team {
            return Err(SimError::Schedule(format!(
                "series plan imbalance detected for {team}: {total} games vs expected \
                 {games_per_team}"
            )));
        }
    }
    Ok(())
}

/// Expand a series plan into a day-by-day schedule along alternating round
/// patterns, inserting the All-Star pause and one-day travel buffers.
fn build_series_schedule(
    teams: &[String],
    plan: Vec<Series>,
    start_date: NaiveDate,
) -> Vec<ScheduledGame> {
    if plan.is_empty() {
        return Vec::new();
    }
    let rounds = round_robin_pairs(teams);
    if rounds.is_empty() {
        return Vec::new();
    }
    let reverse_rounds: Vec<Vec<(String, String)>> = rounds
        .iter()
        .map(|round| round.iter().map(|(h, a)| (a.clone(), h.clone())).collect())
        .collect();
    let patterns: Vec<Vec<(String, String)>> = if rounds.len() <= 1 {
        rounds.iter().chain(reverse_rounds.iter()).cloned().collect()
    } else {
        let mut patterns = Vec::new();
        for idx in 0..rounds.len() {
            patterns.push(rounds[idx].clone());
            patterns.push(reverse_rounds[(idx + 1) % rounds.len()].clone());
        }
        patterns
    };

    let total_games: u32 = plan.iter().map(|s| s.length).sum();
    let mut queues: HashMap<(String, String), VecDeque<Series>> = HashMap::new();
    for series in plan {
        queues
            .entry((series.home.clone(), series.away.clone()))
            .or_default()
            .push_back(series);
    }
    let series_remaining =
        |queues: &HashMap<(String, String), VecDeque<Series>>| queues.values().any(|q| !q.is_empty());

    let mut schedule = Vec::new();
    let mut current = start_date;
    let mut games_scheduled: u32 = 0;
    let mut pattern_index = 0usize;
    let mut all_star_inserted = false;

    while series_remaining(&queues) {
        let round = &patterns[pattern_index % patterns.len()];
        pattern_index += 1;

        let mut assignments: Vec<Series> = Vec::new();
        for (home, away) in round {
            if let Some(queue) = queues.get_mut(&(home.clone(), away.clone())) {
                if let Some(series) = queue.pop_front() {
                    assignments.push(series);
                }
            }
        }
        if assignments.is_empty() {
            continue;
        }

        for series in &assignments {
            for offset in 0..series.length {
                schedule.push(ScheduledGame::new(
                    current + Duration::days(i64::from(offset)),
                    &series.home,
                    &series.away,
                ));
                games_scheduled += 1;
            }
        }
        let round_length = assignments.iter().map(|s| s.length).max().unwrap_or(0);
        current += Duration::days(i64::from(round_length));

        if !all_star_inserted
            && games_scheduled * 2 >= total_games
            && series_remaining(&queues)
        {
            current += Duration::days(6);
            all_star_inserted = true;
        }
        if series_remaining(&queues) {
            current += Duration::days(1);
        }
    }

    schedule.sort_by(|a, b| {
        a.date.cmp(&b.date).then_with(|| a.home.cmp(&b.home)).then_with(|| a.away.cmp(&b.away))
    });
    schedule
}

/// Full MLB-style schedule: exactly `games_per_team` contests per club.
pub fn generate_mlb_schedule(
    teams: &[String],
    start_date: NaiveDate,
    games_per_team: u32,
) -> Result<Vec<ScheduledGame>, SimError> {
    let teams: Vec<String> = teams.iter().filter(|t| !t.is_empty()).cloned().collect();
    if teams.is_empty() {
        return Ok(Vec::new());
    }
    let plan = build_series_plan(&teams, games_per_team)?;
    Ok(build_series_schedule(&teams, plan, start_date))
}

/// Games-per-team audit; the hard invariant the builder must satisfy.
pub fn validate_schedule(
    schedule: &[ScheduledGame],
    teams: &[String],
    games_per_team: u32,
) -> Result<(), SimError> {
    let mut totals: HashMap<&str, u32> = HashMap::new();
    for game in schedule {
        *totals.entry(game.home.as_str()).or_default() += 1;
        *totals.entry(game.away.as_str()).or_default() += 1;
    }
    for team in teams {
        let total = totals.get(team.as_str()).copied().unwrap_or(0);
        if total != games_per_team {
            return Err(SimError::Schedule(format!(
                "{team} has {total} games, expected {games_per_team}"
            )));
        }
    }
    Ok(())
}

/// Soft audits: series streaks and rest gaps, reported rather than fatal.
pub fn schedule_warnings(schedule: &[ScheduledGame]) -> Vec<String> {
    let mut warnings = Vec::new();
    // Consecutive home/away series per team.
    let mut by_team: HashMap<&str, Vec<(NaiveDate, bool)>> = HashMap::new();
    for game in schedule {
        by_team.entry(game.home.as_str()).or_default().push((game.date, true));
        by_team.entry(game.away.as_str()).or_default().push((game.date, false));
    }
    for (team, mut games) in by_team {
        games.sort();
        let mut streak = 0u32;
        let mut last_home: Option<bool> = None;
        let mut last_date: Option<NaiveDate> = None;
        for (date, home) in games {
            // A new series starts on a venue flip or a day gap.
            let new_series = last_home != Some(home)
                || last_date.map(|d| (date - d).num_days() > 1).unwrap_or(true);
            if new_series {
                if last_home == Some(home) {
                    streak += 1;
                } else {
                    streak = 1;
                }
                if streak > 3 {
                    warnings.push(format!(
                        "{team} has more than 3 consecutive {} series",
                        if home { "home" } else { "away" }
                    ));
                    streak = 1;
                }
            }
            last_home = Some(home);
            last_date = Some(date);
        }
    }
    warnings
}

// ============================================================================
// CSV store
// ============================================================================

const SCHEDULE_HEADER: [&str; 6] = ["date", "home", "away", "result", "played", "boxscore"];

/// Write the schedule CSV atomically, including result back-fill columns.
pub fn save_schedule(schedule: &[ScheduledGame], path: &Path) -> Result<(), StoreError> {
    let mut writer = csv::Writer::from_writer(Vec::new());
    writer
        .write_record(SCHEDULE_HEADER)
        .map_err(|e| StoreError::Csv { path: path.to_path_buf(), source: e })?;
    for game in schedule {
        writer
            .write_record([
                game.date.to_string().as_str(),
                game.home.as_str(),
                game.away.as_str(),
                game.result.as_deref().unwrap_or(""),
                if game.played { "1" } else { "" },
                game.boxscore.as_deref().unwrap_or(""),
            ])
            .map_err(|e| StoreError::Csv { path: path.to_path_buf(), source: e })?;
    }
    let bytes = writer
        .into_inner()
        .map_err(|e| StoreError::Io { path: path.to_path_buf(), source: e.into_error() })?;
    let contents = String::from_utf8(bytes).expect("csv output is utf-8");
    atomic_write(path, &contents)
}

/// Read a schedule CSV; invalid rows are skipped.
pub fn load_schedule(path: &Path) -> Result<Vec<ScheduledGame>, StoreError> {
    let mut reader = csv::Reader::from_path(path)
        .map_err(|e| StoreError::Csv { path: path.to_path_buf(), source: e })?;
    let mut schedule = Vec::new();
    for record in reader.records() {
        let record = match record {
            Ok(record) => record,
            Err(err) => {
                tracing::warn!(?path, %err, "skipping unreadable schedule row");
                continue;
            }
        };
        let Some(date) = record.get(0).and_then(|d| d.parse::<NaiveDate>().ok()) else {
            continue;
        };
        let (Some(home), Some(away)) = (record.get(1), record.get(2)) else { continue };
        if home.is_empty() || away.is_empty() {
            continue;
        }
        let result = record.get(3).filter(|s| !s.is_empty()).map(str::to_string);
        let played = record.get(4).map(|s| s == "1").unwrap_or(false);
        let boxscore = record.get(5).filter(|s| !s.is_empty()).map(str::to_string);
        schedule.push(ScheduledGame {
            date,
            home: home.to_string(),
            away: away.to_string(),
            result,
            played,
            boxscore,
        });
    }
    Ok(schedule)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn teams(n: usize) -> Vec<String> {
        (0..n).map(|i| format!("T{i:02}")).collect()
    }

    fn start() -> NaiveDate {
        NaiveDate::from_ymd_opt(2025, 4, 1).unwrap()
    }

    #[test]
    fn round_robin_covers_every_pairing_once() {
        let teams = teams(6);
        let rounds = round_robin_pairs(&teams);
        assert_eq!(rounds.len(), 5);
        let mut seen = std::collections::HashSet::new();
        for round in &rounds {
            assert_eq!(round.len(), 3);
            for (home, away) in round {
                let key = if home < away {
                    (home.clone(), away.clone())
                } else {
                    (away.clone(), home.clone())
                };
                assert!(seen.insert(key), "pairing repeated");
            }
        }
        assert_eq!(seen.len(), 15);
    }

    #[test]
    fn odd_team_counts_get_a_bye() {
        let teams = teams(5);
        let rounds = round_robin_pairs(&teams);
        assert_eq!(rounds.len(), 5);
        for round in &rounds {
            assert_eq!(round.len(), 2);
        }
    }

    #[test]
    fn double_round_robin_has_the_break() {
        let teams = teams(4);
        let schedule = generate_schedule(&teams, start());
        // 4 teams, double round robin: n*(n-1) games.
        assert_eq!(schedule.len(), 12);
        let mut dates: Vec<NaiveDate> = schedule.iter().map(|g| g.date).collect();
        dates.sort();
        dates.dedup();
        let max_gap = dates.windows(2).map(|w| (w[1] - w[0]).num_days()).max().unwrap();
        assert!(max_gap >= 6);
    }

    #[test]
    fn mlb_schedule_hits_the_target_exactly() {
        let teams = teams(6);
        let schedule = generate_mlb_schedule(&teams, start(), 72).unwrap();
        validate_schedule(&schedule, &teams, 72).unwrap();
    }

    #[test]
    fn full_size_league_is_balanced_with_one_break() {
        let teams = teams(14);
        let games = 162;
        let schedule = generate_mlb_schedule(&teams, start(), games).unwrap();
        validate_schedule(&schedule, &teams, games).unwrap();
        let mut dates: Vec<NaiveDate> = schedule.iter().map(|g| g.date).collect();
        dates.sort();
        dates.dedup();
        let long_gaps: Vec<i64> = dates
            .windows(2)
            .map(|w| (w[1] - w[0]).num_days())
            .filter(|gap| *gap >= 6)
            .collect();
        assert_eq!(long_gaps.len(), 1, "exactly one All-Star pause expected");
    }

    #[test]
    fn thirty_team_league_reaches_162() {
        let teams = teams(30);
        let schedule = generate_mlb_schedule(&teams, start(), 162).unwrap();
        validate_schedule(&schedule, &teams, 162).unwrap();
        assert_eq!(schedule.len(), 30 * 162 / 2);
    }

    #[test]
    fn generation_is_deterministic() {
        let teams = teams(8);
        let a = generate_mlb_schedule(&teams, start(), 96).unwrap();
        let b = generate_mlb_schedule(&teams, start(), 96).unwrap();
        assert_eq!(a, b);
    }

    #[test]
    fn unreachable_targets_fail() {
        let teams = teams(6);
        assert!(generate_mlb_schedule(&teams, start(), 7).is_err());
    }

    #[test]
    fn csv_round_trip_preserves_backfill() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("schedule.csv");
        let teams = teams(4);
        let mut schedule = generate_schedule(&teams, start());
        schedule[0].result = Some("5-3".to_string());
        schedule[0].played = true;
        schedule[0].boxscore = Some("box/g1.html".to_string());
        save_schedule(&schedule, &path).unwrap();
        let loaded = load_schedule(&path).unwrap();
        assert_eq!(loaded, schedule);
    }
}

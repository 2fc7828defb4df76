//! Postseason: configuration, seeding, bracket planning, series
//! simulation and persistence.
//!
//! Rounds are materialized lazily: a pending matchup lives in a round's
//! `plan` as participant references (seed or prior-round winner) until all
//! of its references resolve.

use std::collections::HashMap;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::engine::rng::series_seed;
use crate::error::StoreError;
use crate::store::{atomic_write, atomic_write_json, read_json};

use super::standings::TeamRecord;

pub const SCHEMA_VERSION: u32 = 1;

// ============================================================================
// Configuration
// ============================================================================

fn default_slots_by_league_size() -> HashMap<u32, u32> {
    HashMap::from([
        (4, 2),
        (5, 4),
        (6, 4),
        (7, 6),
        (8, 6),
        (9, 6),
        (10, 6),
        (11, 6),
        (12, 6),
        (13, 6),
        (14, 6),
    ])
}

/// Postseason shape knobs with MLB-style defaults: BO3 wildcard, BO5
/// division series, BO7 championship and World Series; 2-3-2 style
/// home-field patterns.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PlayoffsConfig {
    pub num_playoff_teams_per_league: u32,
    pub series_lengths: HashMap<String, u32>,
    pub home_away_patterns: HashMap<u32, Vec<u32>>,
    pub division_winners_priority: bool,
    pub playoff_slots_by_league_size: HashMap<u32, u32>,
    pub division_to_league: HashMap<String, String>,
}

impl Default for PlayoffsConfig {
    fn default() -> Self {
        Self {
            num_playoff_teams_per_league: 6,
            series_lengths: HashMap::from([
                ("wildcard".to_string(), 3),
                ("ds".to_string(), 5),
                ("cs".to_string(), 7),
                ("ws".to_string(), 7),
            ]),
            home_away_patterns: HashMap::from([
                (3, vec![1, 1, 1]),
                (5, vec![2, 2, 1]),
                (7, vec![2, 3, 2]),
            ]),
            division_winners_priority: true,
            playoff_slots_by_league_size: HashMap::new(),
            division_to_league: HashMap::new(),
        }
    }
}

impl PlayoffsConfig {
    /// Load from `playoffs_config.json`; missing or malformed files fall
    /// back to defaults.
    pub fn load(path: &Path) -> Self {
        read_json(path).unwrap_or_default()
    }

    pub fn save(&self, path: &Path) -> Result<(), StoreError> {
        atomic_write_json(path, self)
    }

    /// Number of playoff slots for a league of `num_teams` clubs.
    pub fn slots_for_league(&self, num_teams: usize) -> u32 {
        if num_teams == 0 {
            return 0;
        }
        let source = if self.playoff_slots_by_league_size.is_empty() {
            default_slots_by_league_size()
        } else {
            self.playoff_slots_by_league_size.clone()
        };
        let slots = source
            .iter()
            .filter(|(size, _)| **size <= num_teams as u32)
            .max_by_key(|(size, _)| **size)
            .map(|(_, slots)| *slots)
            .unwrap_or(num_teams as u32);
        let mut slots = if slots == 0 { num_teams as u32 } else { slots };
        slots = slots.min(self.num_playoff_teams_per_league).min(num_teams as u32);
        if slots < 2 && num_teams >= 2 {
            slots = 2;
        }
        slots
    }

    fn series_config(&self, key: &str) -> SeriesConfig {
        let fallback = match key {
            "wildcard" => 3,
            "ds" => 5,
            _ => 7,
        };
        let length = self.series_lengths.get(key).copied().unwrap_or(fallback);
        let pattern = self.home_away_patterns.get(&length).cloned().unwrap_or_default();
        SeriesConfig { length, pattern }
    }
}

// ============================================================================
// Bracket model
// ============================================================================

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PlayoffTeam {
    pub team_id: String,
    pub seed: u32,
    pub league: String,
    pub wins: u32,
    #[serde(default)]
    pub run_diff: i64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SeriesGame {
    pub home: String,
    pub away: String,
    #[serde(default)]
    pub date: Option<String>,
    /// e.g. "4-2", home side first.
    #[serde(default)]
    pub result: Option<String>,
    #[serde(default)]
    pub boxscore: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SeriesConfig {
    pub length: u32,
    /// Home stretches for the higher seed; BO7 2-3-2 is `[2, 3, 2]`.
    pub pattern: Vec<u32>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Matchup {
    pub high: PlayoffTeam,
    pub low: PlayoffTeam,
    pub config: SeriesConfig,
    #[serde(default)]
    pub games: Vec<SeriesGame>,
    #[serde(default)]
    pub winner: Option<String>,
}

/// Reference to a future matchup participant.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ParticipantRef {
    Seed { league: String, seed: u32 },
    Winner { source_round: String, slot: usize },
}

/// Plan for creating a matchup once its participants are known.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RoundPlanEntry {
    pub series_key: String,
    pub sources: Vec<ParticipantRef>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Round {
    pub name: String,
    #[serde(default)]
    pub matchups: Vec<Matchup>,
    #[serde(default)]
    pub plan: Vec<RoundPlanEntry>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct PlayoffBracket {
    pub schema_version: u32,
    pub year: i32,
    pub champion: Option<String>,
    pub runner_up: Option<String>,
    pub seeds_by_league: HashMap<String, Vec<PlayoffTeam>>,
    pub rounds: Vec<Round>,
}

// ============================================================================
// Persistence
// ============================================================================

pub fn bracket_path(data_dir: &Path, year: i32) -> PathBuf {
    data_dir.join(format!("playoffs_{year}.json"))
}

/// Atomically persist a bracket, rolling a `.bak` of any prior file.
pub fn save_bracket(bracket: &PlayoffBracket, path: &Path) -> Result<(), StoreError> {
    if path.exists() {
        if let Ok(previous) = std::fs::read_to_string(path) {
            let bak = path.with_extension("json.bak");
            let _ = atomic_write(&bak, &previous);
        }
    }
    atomic_write_json(path, bracket)
}

/// Load the requested year's bracket, or the newest `playoffs_*.json` in
/// `data_dir` when no year is given. Schema mismatches are skipped.
pub fn load_bracket(data_dir: &Path, year: Option<i32>) -> Option<PlayoffBracket> {
    let mut candidates: Vec<PathBuf> = Vec::new();
    if let Some(year) = year {
        candidates.push(bracket_path(data_dir, year));
    } else if let Ok(entries) = std::fs::read_dir(data_dir) {
        let mut matches: Vec<(i32, PathBuf)> = entries
            .flatten()
            .filter_map(|entry| {
                let path = entry.path();
                let stem = path.file_stem()?.to_str()?.to_string();
                let year: i32 = stem.strip_prefix("playoffs_")?.parse().ok()?;
                (path.extension()?.to_str()? == "json").then_some((year, path))
            })
            .collect();
        matches.sort_by(|a, b| b.0.cmp(&a.0));
        candidates.extend(matches.into_iter().map(|(_, path)| path));
    }
    for candidate in candidates {
        let Some(bracket) = read_json::<PlayoffBracket>(&candidate) else { continue };
        if bracket.schema_version != SCHEMA_VERSION {
            tracing::warn!(?candidate, version = bracket.schema_version, "skipping bracket with unknown schema");
            continue;
        }
        return Some(bracket);
    }
    None
}

// ============================================================================
// Seeding
// ============================================================================

/// Minimal team descriptor the seeding engine needs.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LeagueTeam {
    pub team_id: String,
    pub division: String,
}

fn infer_league(division: &str, mapping: &HashMap<String, String>) -> String {
    if let Some(league) = mapping.get(division) {
        return league.clone();
    }
    division.trim().split(' ').next().unwrap_or("").to_string()
}

fn wins_and_diff(standings: &HashMap<String, TeamRecord>, team_id: &str) -> (u32, i64) {
    standings.get(team_id).map(|r| (r.wins, r.run_diff())).unwrap_or((0, 0))
}

/// Seed one league: division winners first (when prioritized), wildcards
/// after, both ranked by wins then run differential.
fn seed_league(
    league: &str,
    league_teams: &[LeagueTeam],
    standings: &HashMap<String, TeamRecord>,
    cfg: &PlayoffsConfig,
) -> Vec<PlayoffTeam> {
    let mut by_division: HashMap<&str, Vec<&LeagueTeam>> = HashMap::new();
    for team in league_teams {
        by_division.entry(team.division.as_str()).or_default().push(team);
    }

    let rank_key = |team: &LeagueTeam| {
        let (wins, diff) = wins_and_diff(standings, &team.team_id);
        (wins, diff, std::cmp::Reverse(team.team_id.clone()))
    };

    let mut winners: Vec<&LeagueTeam> = by_division
        .values()
        .filter_map(|members| members.iter().copied().max_by_key(|t| rank_key(t)))
        .collect();
    let winner_ids: Vec<&str> = winners.iter().map(|t| t.team_id.as_str()).collect();
    let mut wildcards: Vec<&LeagueTeam> = league_teams
        .iter()
        .filter(|t| !winner_ids.contains(&t.team_id.as_str()))
        .collect();

    winners.sort_by_key(|t| std::cmp::Reverse(rank_key(t)));
    wildcards.sort_by_key(|t| std::cmp::Reverse(rank_key(t)));

    let pool: Vec<&LeagueTeam> = if cfg.division_winners_priority {
        winners.into_iter().chain(wildcards).collect()
    } else {
        let mut pool: Vec<&LeagueTeam> = league_teams.iter().collect();
        pool.sort_by_key(|t| std::cmp::Reverse(rank_key(t)));
        pool
    };

    let slots = cfg.num_playoff_teams_per_league as usize;
    pool.into_iter()
        .take(slots)
        .enumerate()
        .map(|(idx, team)| {
            let (wins, run_diff) = wins_and_diff(standings, &team.team_id);
            PlayoffTeam {
                team_id: team.team_id.clone(),
                seed: idx as u32 + 1,
                league: league.to_string(),
                wins,
                run_diff,
            }
        })
        .collect()
}

/// Instantiate a league's rounds from its seed count. Returns the rounds
/// and the name of the league final.
fn build_league_rounds(
    league: &str,
    seeds: &[PlayoffTeam],
    cfg: &PlayoffsConfig,
) -> (Vec<Round>, Option<String>) {
    let mut rounds: Vec<Round> = Vec::new();
    if seeds.len() < 2 {
        return (rounds, None);
    }
    let team_for = |seed: u32| seeds.iter().find(|t| t.seed == seed).cloned();
    let direct = |high: u32, low: u32, key: &str| -> Option<Matchup> {
        Some(Matchup {
            high: team_for(high)?,
            low: team_for(low)?,
            config: cfg.series_config(key),
            games: Vec::new(),
            winner: None,
        })
    };
    let seed_ref = |seed: u32| ParticipantRef::Seed { league: league.to_string(), seed };
    let winner_ref = |round: &str, slot: usize| ParticipantRef::Winner {
        source_round: round.to_string(),
        slot,
    };

    let wc_name = format!("{league} WC");
    let ds_name = format!("{league} DS");
    let cs_name = format!("{league} CS");

    match seeds.len() {
        2 => {
            let mut cs = Round { name: cs_name.clone(), ..Round::default() };
            cs.matchups.extend(direct(1, 2, "cs"));
            rounds.push(cs);
        }
        3 => {
            let mut wc = Round { name: wc_name.clone(), ..Round::default() };
            wc.matchups.extend(direct(2, 3, "wildcard"));
            rounds.push(wc);
            let mut cs = Round { name: cs_name.clone(), ..Round::default() };
            cs.plan.push(RoundPlanEntry {
                series_key: "cs".to_string(),
                sources: vec![seed_ref(1), winner_ref(&wc_name, 0)],
            });
            rounds.push(cs);
        }
        4 => {
            let mut ds = Round { name: ds_name.clone(), ..Round::default() };
            ds.matchups.extend(direct(1, 4, "ds"));
            ds.matchups.extend(direct(2, 3, "ds"));
            rounds.push(ds);
            let mut cs = Round { name: cs_name.clone(), ..Round::default() };
            cs.plan.push(RoundPlanEntry {
                series_key: "cs".to_string(),
                sources: vec![winner_ref(&ds_name, 0), winner_ref(&ds_name, 1)],
            });
            rounds.push(cs);
        }
        5 => {
            let mut wc = Round { name: wc_name.clone(), ..Round::default() };
            wc.matchups.extend(direct(4, 5, "wildcard"));
            rounds.push(wc);
            let mut ds = Round { name: ds_name.clone(), ..Round::default() };
            ds.matchups.extend(direct(2, 3, "ds"));
            ds.plan.push(RoundPlanEntry {
                series_key: "ds".to_string(),
                sources: vec![seed_ref(1), winner_ref(&wc_name, 0)],
            });
            rounds.push(ds);
            let mut cs = Round { name: cs_name.clone(), ..Round::default() };
            cs.plan.push(RoundPlanEntry {
                series_key: "cs".to_string(),
                sources: vec![winner_ref(&ds_name, 0), winner_ref(&ds_name, 1)],
            });
            rounds.push(cs);
        }
        _ => {
            // Six or more: two wildcard series feeding the division round.
            let mut wc = Round { name: wc_name.clone(), ..Round::default() };
            wc.matchups.extend(direct(3, 6, "wildcard"));
            wc.matchups.extend(direct(4, 5, "wildcard"));
            rounds.push(wc);
            let mut ds = Round { name: ds_name.clone(), ..Round::default() };
            ds.plan.push(RoundPlanEntry {
                series_key: "ds".to_string(),
                sources: vec![seed_ref(1), winner_ref(&wc_name, 0)],
            });
            ds.plan.push(RoundPlanEntry {
                series_key: "ds".to_string(),
                sources: vec![seed_ref(2), winner_ref(&wc_name, 1)],
            });
            rounds.push(ds);
            let mut cs = Round { name: cs_name.clone(), ..Round::default() };
            cs.plan.push(RoundPlanEntry {
                series_key: "cs".to_string(),
                sources: vec![winner_ref(&ds_name, 0), winner_ref(&ds_name, 1)],
            });
            rounds.push(cs);
        }
    }
    let final_name = rounds.last().map(|r| r.name.clone());
    (rounds, final_name)
}

/// Build the initial bracket from final standings and configuration.
pub fn generate_bracket(
    standings: &HashMap<String, TeamRecord>,
    teams: &[LeagueTeam],
    cfg: &PlayoffsConfig,
    year: i32,
) -> PlayoffBracket {
    let mut by_league: HashMap<String, Vec<LeagueTeam>> = HashMap::new();
    for team in teams {
        let league = infer_league(&team.division, &cfg.division_to_league);
        let league = if league.is_empty() { "LEAGUE".to_string() } else { league };
        by_league.entry(league).or_default().push(team.clone());
    }
    let mut leagues: Vec<String> = by_league.keys().cloned().collect();
    leagues.sort();

    let mut seeds_by_league = HashMap::new();
    let mut rounds = Vec::new();
    let mut league_finals: HashMap<String, String> = HashMap::new();
    for league in &leagues {
        let league_teams = &by_league[league];
        let seeded = seed_league(league, league_teams, standings, cfg);
        let slots = cfg.slots_for_league(league_teams.len()).min(seeded.len() as u32);
        if slots < 2 {
            continue;
        }
        let seeds: Vec<PlayoffTeam> = seeded.into_iter().take(slots as usize).collect();
        let (league_rounds, final_name) = build_league_rounds(league, &seeds, cfg);
        seeds_by_league.insert(league.clone(), seeds);
        rounds.extend(league_rounds);
        if let Some(final_name) = final_name {
            league_finals.insert(league.clone(), final_name);
        }
    }

    if league_finals.len() >= 2 {
        let mut contenders: Vec<&String> = league_finals.keys().collect();
        contenders.sort();
        let ws = Round {
            name: "WS".to_string(),
            matchups: Vec::new(),
            plan: vec![RoundPlanEntry {
                series_key: "ws".to_string(),
                sources: vec![
                    ParticipantRef::Winner {
                        source_round: league_finals[contenders[0]].clone(),
                        slot: 0,
                    },
                    ParticipantRef::Winner {
                        source_round: league_finals[contenders[1]].clone(),
                        slot: 0,
                    },
                ],
            }],
        };
        rounds.push(ws);
    } else if league_finals.len() == 1 {
        // Single-league setup: rename the league final so champion
        // resolution works.
        let final_name = league_finals.values().next().cloned().expect("one final");
        if let Some(round) = rounds.iter_mut().find(|r| r.name == final_name) {
            round.name = "Final".to_string();
        }
    }

    PlayoffBracket {
        schema_version: SCHEMA_VERSION,
        year,
        champion: None,
        runner_up: None,
        seeds_by_league,
        rounds,
    }
}

// ============================================================================
// Series simulation
// ============================================================================

/// Score of one playoff game as returned by the game callback.
#[derive(Debug, Clone)]
pub struct SeriesGameScore {
    pub home_runs: u32,
    pub away_runs: u32,
    pub boxscore: Option<String>,
}

pub type SeriesGameFn<'a> = dyn FnMut(&str, &str, u64) -> SeriesGameScore + 'a;

fn wins_needed(length: u32) -> u32 {
    length / 2 + 1
}

/// Simulate a single series to completion. Game seeds are pure functions
/// of (year, round, series, game, home, away).
pub fn simulate_series(
    matchup: &mut Matchup,
    year: i32,
    round_name: &str,
    series_index: usize,
    simulate_game: &mut SeriesGameFn<'_>,
) {
    if matchup.winner.is_some() {
        return;
    }
    let needed = wins_needed(matchup.config.length);
    let high_id = matchup.high.team_id.clone();
    let low_id = matchup.low.team_id.clone();

    let mut homes: Vec<String> = Vec::new();
    let mut flip = false;
    for block in &matchup.config.pattern {
        for _ in 0..*block {
            homes.push(if flip { low_id.clone() } else { high_id.clone() });
        }
        flip = !flip;
    }
    if homes.is_empty() {
        homes = (0..matchup.config.length)
            .map(|i| if i % 2 == 0 { high_id.clone() } else { low_id.clone() })
            .collect();
    }

    let mut high_wins = 0u32;
    let mut low_wins = 0u32;
    for (game_no, home) in homes.iter().enumerate() {
        if high_wins >= needed || low_wins >= needed {
            break;
        }
        let away = if home == &high_id { low_id.clone() } else { high_id.clone() };
        let seed = series_seed(year, round_name, series_index, game_no, home, &away);
        let score = simulate_game(home, &away, seed);
        if score.home_runs > score.away_runs {
            if home == &high_id {
                high_wins += 1;
            } else {
                low_wins += 1;
            }
        } else if home == &high_id {
            low_wins += 1;
        } else {
            high_wins += 1;
        }
        matchup.games.push(SeriesGame {
            home: home.clone(),
            away,
            date: None,
            result: Some(format!("{}-{}", score.home_runs, score.away_runs)),
            boxscore: score.boxscore,
        });
    }
    matchup.winner = Some(if high_wins > low_wins { high_id } else { low_id });
}

// ============================================================================
// Progression
// ============================================================================

fn resolve_ref(bracket: &PlayoffBracket, participant: &ParticipantRef) -> Option<PlayoffTeam> {
    match participant {
        ParticipantRef::Seed { league, seed } => bracket
            .seeds_by_league
            .get(league)?
            .iter()
            .find(|team| team.seed == *seed)
            .cloned(),
        ParticipantRef::Winner { source_round, slot } => {
            let round = bracket.rounds.iter().find(|r| &r.name == source_round)?;
            let matchup = round.matchups.get(*slot)?;
            let winner_id = matchup.winner.as_ref()?;
            if &matchup.high.team_id == winner_id {
                Some(matchup.high.clone())
            } else if &matchup.low.team_id == winner_id {
                Some(matchup.low.clone())
            } else {
                None
            }
        }
    }
}

/// Materialize every plan entry whose participant references resolve.
pub fn populate_next_round(bracket: &mut PlayoffBracket, cfg: &PlayoffsConfig) {
    let round_count = bracket.rounds.len();
    for round_idx in 0..round_count {
        if bracket.rounds[round_idx].plan.is_empty() {
            continue;
        }
        let plan = bracket.rounds[round_idx].plan.clone();
        let existing: Vec<(String, String)> = bracket.rounds[round_idx]
            .matchups
            .iter()
            .map(|m| pair_key(&m.high.team_id, &m.low.team_id))
            .collect();
        let mut new_matchups = Vec::new();
        for entry in &plan {
            let participants: Option<Vec<PlayoffTeam>> =
                entry.sources.iter().map(|r| resolve_ref(bracket, r)).collect();
            let Some(mut participants) = participants else { continue };
            if participants.len() != 2 {
                continue;
            }
            let key = pair_key(&participants[0].team_id, &participants[1].team_id);
            if existing.contains(&key)
                || new_matchups
                    .iter()
                    .any(|m: &Matchup| pair_key(&m.high.team_id, &m.low.team_id) == key)
            {
                continue;
            }
            participants.sort_by(|a, b| {
                a.seed
                    .cmp(&b.seed)
                    .then(b.wins.cmp(&a.wins))
                    .then(b.run_diff.cmp(&a.run_diff))
                    .then(a.team_id.cmp(&b.team_id))
            });
            let low = participants.pop().expect("two participants");
            let high = participants.pop().expect("two participants");
            new_matchups.push(Matchup {
                high,
                low,
                config: cfg.series_config(&entry.series_key),
                games: Vec::new(),
                winner: None,
            });
        }
        bracket.rounds[round_idx].matchups.extend(new_matchups);
    }
}

fn pair_key(a: &str, b: &str) -> (String, String) {
    if a < b {
        (a.to_string(), b.to_string())
    } else {
        (b.to_string(), a.to_string())
    }
}

fn resolve_champion(bracket: &mut PlayoffBracket) -> bool {
    let Some(final_round) = bracket
        .rounds
        .iter()
        .find(|r| r.name == "WS" || r.name == "Final")
    else {
        return false;
    };
    let Some(matchup) = final_round.matchups.first() else { return false };
    let Some(winner) = matchup.winner.clone() else { return false };
    let runner_up = if matchup.high.team_id == winner {
        matchup.low.team_id.clone()
    } else {
        matchup.high.team_id.clone()
    };
    bracket.champion = Some(winner);
    bracket.runner_up = Some(runner_up);
    true
}

fn run_pending_rounds(
    bracket: &mut PlayoffBracket,
    cfg: &PlayoffsConfig,
    simulate_game: &mut SeriesGameFn<'_>,
    persist: &mut dyn FnMut(&PlayoffBracket),
    single_round: bool,
) {
    loop {
        let mut made_progress = false;
        let round_count = bracket.rounds.len();
        for round_idx in 0..round_count {
            let pending: Vec<usize> = bracket.rounds[round_idx]
                .matchups
                .iter()
                .enumerate()
                .filter(|(_, m)| {
                    m.winner.is_none()
                        && !m.high.team_id.is_empty()
                        && !m.low.team_id.is_empty()
                })
                .map(|(i, _)| i)
                .collect();
            if pending.is_empty() {
                continue;
            }
            let round_name = bracket.rounds[round_idx].name.clone();
            let year = bracket.year;
            for i in pending {
                simulate_series(
                    &mut bracket.rounds[round_idx].matchups[i],
                    year,
                    &round_name,
                    i,
                    simulate_game,
                );
                made_progress = true;
                persist(bracket);
            }
            let complete =
                bracket.rounds[round_idx].matchups.iter().all(|m| m.winner.is_some());
            if complete {
                if (round_name == "WS" || round_name == "Final") && resolve_champion(bracket) {
                    persist(bracket);
                    return;
                }
                populate_next_round(bracket, cfg);
                persist(bracket);
            }
            break; // one round at a time
        }
        if single_round || !made_progress {
            return;
        }
    }
}

/// Simulate the playoffs from their current state to the champion.
pub fn simulate_playoffs(
    bracket: &mut PlayoffBracket,
    cfg: &PlayoffsConfig,
    simulate_game: &mut SeriesGameFn<'_>,
    mut persist: Option<&mut dyn FnMut(&PlayoffBracket)>,
) {
    let mut sink = |bracket: &PlayoffBracket| {
        if let Some(persist) = persist.as_deref_mut() {
            persist(bracket);
        }
    };
    run_pending_rounds(bracket, cfg, simulate_game, &mut sink, false);
}

/// Simulate only the next round that has pending matchups.
pub fn simulate_next_round(
    bracket: &mut PlayoffBracket,
    cfg: &PlayoffsConfig,
    simulate_game: &mut SeriesGameFn<'_>,
    mut persist: Option<&mut dyn FnMut(&PlayoffBracket)>,
) {
    let mut sink = |bracket: &PlayoffBracket| {
        if let Some(persist) = persist.as_deref_mut() {
            persist(bracket);
        }
    };
    run_pending_rounds(bracket, cfg, simulate_game, &mut sink, true);
}

#[cfg(test)]
mod tests {
    use super::*;

    fn record(wins: u32, diff: i64) -> TeamRecord {
        TeamRecord {
            wins,
            losses: 100,
            runs_for: (600 + diff.max(0)) as u32,
            runs_against: (600 - diff.min(0)) as u32,
            ..TeamRecord::default()
        }
    }

    fn league(teams: &[(&str, &str, u32, i64)]) -> (Vec<LeagueTeam>, HashMap<String, TeamRecord>) {
        let mut list = Vec::new();
        let mut standings = HashMap::new();
        for (id, division, wins, diff) in teams {
            list.push(LeagueTeam { team_id: id.to_string(), division: division.to_string() });
            standings.insert(id.to_string(), record(*wins, *diff));
        }
        (list, standings)
    }

    fn two_league_setup() -> (Vec<LeagueTeam>, HashMap<String, TeamRecord>) {
        // Seven clubs per league so each league fills six playoff slots
        // and opens with a wildcard round.
        league(&[
            ("ALE1", "AL East", 98, 120),
            ("ALE2", "AL East", 90, 60),
            ("ALE3", "AL East", 82, 10),
            ("ALE4", "AL East", 77, -15),
            ("ALW1", "AL West", 95, 90),
            ("ALW2", "AL West", 88, 40),
            ("ALW3", "AL West", 70, -60),
            ("NLE1", "NL East", 97, 110),
            ("NLE2", "NL East", 91, 55),
            ("NLE3", "NL East", 76, -20),
            ("NLE4", "NL East", 74, -30),
            ("NLW1", "NL West", 93, 80),
            ("NLW2", "NL West", 89, 30),
            ("NLW3", "NL West", 71, -70),
        ])
    }

    fn home_team_wins() -> impl FnMut(&str, &str, u64) -> SeriesGameScore {
        |_home, _away, _seed| SeriesGameScore { home_runs: 5, away_runs: 3, boxscore: None }
    }

    #[test]
    fn division_winners_seed_ahead_of_wildcards() {
        let (teams, standings) = league(&[
            ("EAST1", "AL East", 88, 40),
            ("EAST2", "AL East", 95, 80),
            ("WEST1", "AL West", 84, 10),
            ("WEST2", "AL West", 79, -5),
        ]);
        let cfg = PlayoffsConfig::default();
        let bracket = generate_bracket(&standings, &teams, &cfg, 2025);
        let seeds = &bracket.seeds_by_league["AL"];
        // Winners (EAST2 95, WEST1 84) come first even though EAST1 (88)
        // outranks WEST1.
        assert_eq!(seeds[0].team_id, "EAST2");
        assert_eq!(seeds[1].team_id, "WEST1");
        assert_eq!(seeds[2].team_id, "EAST1");
        assert_eq!(seeds[0].seed, 1);
    }

    #[test]
    fn single_league_final_is_renamed() {
        let (teams, standings) = league(&[
            ("A", "AL East", 90, 50),
            ("B", "AL East", 85, 20),
            ("C", "AL West", 88, 30),
            ("D", "AL West", 80, 0),
        ]);
        let cfg = PlayoffsConfig::default();
        let bracket = generate_bracket(&standings, &teams, &cfg, 2025);
        // Four teams in one league (slots_for_league(4) == 2) -> single CS.
        let names: Vec<&str> = bracket.rounds.iter().map(|r| r.name.as_str()).collect();
        assert!(names.contains(&"Final"), "single-league final renamed: {names:?}");
    }

    #[test]
    fn two_league_bracket_plans_ws_from_both_cs() {
        let (teams, standings) = two_league_setup();
        let cfg = PlayoffsConfig::default();
        let bracket = generate_bracket(&standings, &teams, &cfg, 2025);
        let names: Vec<&str> = bracket.rounds.iter().map(|r| r.name.as_str()).collect();
        assert!(names.contains(&"AL WC"));
        assert!(names.contains(&"AL DS"));
        assert!(names.contains(&"AL CS"));
        assert!(names.contains(&"NL CS"));
        assert!(names.contains(&"WS"));
        let ws = bracket.rounds.iter().find(|r| r.name == "WS").unwrap();
        assert!(ws.matchups.is_empty());
        assert_eq!(ws.plan.len(), 1);
        assert_eq!(ws.plan[0].sources.len(), 2);
    }

    #[test]
    fn bo5_with_home_wins_goes_the_distance_to_the_higher_seed() {
        let cfg = PlayoffsConfig::default();
        let mut matchup = Matchup {
            high: PlayoffTeam {
                team_id: "HI".to_string(),
                seed: 1,
                league: "AL".to_string(),
                wins: 95,
                run_diff: 50,
            },
            low: PlayoffTeam {
                team_id: "LO".to_string(),
                seed: 2,
                league: "AL".to_string(),
                wins: 88,
                run_diff: 10,
            },
            config: cfg.series_config("ds"),
            games: Vec::new(),
            winner: None,
        };
        let mut sim = home_team_wins();
        simulate_series(&mut matchup, 2025, "AL DS", 0, &mut sim);
        // 2-2-1: higher seed hosts games 1, 2, 5; home team always wins.
        assert_eq!(matchup.games.len(), 5);
        assert_eq!(matchup.winner.as_deref(), Some("HI"));
        assert_eq!(matchup.games[0].home, "HI");
        assert_eq!(matchup.games[2].home, "LO");
        assert_eq!(matchup.games[4].home, "HI");
    }

    #[test]
    fn series_seeds_are_deterministic_per_game() {
        let seeds_seen = std::cell::RefCell::new(Vec::new());
        let mut sim = |home: &str, away: &str, seed: u64| {
            seeds_seen.borrow_mut().push((home.to_string(), away.to_string(), seed));
            SeriesGameScore { home_runs: 1, away_runs: 0, boxscore: None }
        };
        let cfg = PlayoffsConfig::default();
        let mk = || Matchup {
            high: PlayoffTeam {
                team_id: "HI".to_string(),
                seed: 1,
                league: "AL".to_string(),
                wins: 95,
                run_diff: 50,
            },
            low: PlayoffTeam {
                team_id: "LO".to_string(),
                seed: 4,
                league: "AL".to_string(),
                wins: 82,
                run_diff: -10,
            },
            config: cfg.series_config("wildcard"),
            games: Vec::new(),
            winner: None,
        };
        let mut a = mk();
        simulate_series(&mut a, 2025, "AL WC", 0, &mut sim);
        let first = seeds_seen.borrow().clone();
        seeds_seen.borrow_mut().clear();
        let mut b = mk();
        simulate_series(&mut b, 2025, "AL WC", 0, &mut sim);
        assert_eq!(first, *seeds_seen.borrow());
    }

    #[test]
    fn full_playoffs_resolve_a_champion() {
        let (teams, standings) = two_league_setup();
        let cfg = PlayoffsConfig::default();
        let mut bracket = generate_bracket(&standings, &teams, &cfg, 2025);
        let mut sim = home_team_wins();
        let mut persist_count = 0usize;
        {
            let mut persist = |_: &PlayoffBracket| persist_count += 1;
            simulate_playoffs(&mut bracket, &cfg, &mut sim, Some(&mut persist));
        }
        assert!(bracket.champion.is_some());
        assert!(bracket.runner_up.is_some());
        assert_ne!(bracket.champion, bracket.runner_up);
        assert!(persist_count > 0);
        // Every played series has a winner and enough games.
        for round in &bracket.rounds {
            for matchup in &round.matchups {
                let needed = wins_needed(matchup.config.length);
                assert!(matchup.winner.is_some());
                assert!(matchup.games.len() as u32 >= needed);
            }
        }
    }

    #[test]
    fn next_round_steps_one_round_at_a_time() {
        let (teams, standings) = two_league_setup();
        let cfg = PlayoffsConfig::default();
        let mut bracket = generate_bracket(&standings, &teams, &cfg, 2025);
        let mut sim = home_team_wins();
        simulate_next_round(&mut bracket, &cfg, &mut sim, None);
        // First pending round (AL WC) done; NL WC untouched.
        let al_wc = bracket.rounds.iter().find(|r| r.name == "AL WC").unwrap();
        assert!(al_wc.matchups.iter().all(|m| m.winner.is_some()));
        let nl_wc = bracket.rounds.iter().find(|r| r.name == "NL WC").unwrap();
        assert!(nl_wc.matchups.iter().all(|m| m.winner.is_none()));
        assert!(bracket.champion.is_none());
    }

    #[test]
    fn bracket_round_trips_through_disk() {
        let dir = tempfile::tempdir().unwrap();
        let (teams, standings) = two_league_setup();
        let cfg = PlayoffsConfig::default();
        let mut bracket = generate_bracket(&standings, &teams, &cfg, 2025);
        let mut sim = home_team_wins();
        simulate_next_round(&mut bracket, &cfg, &mut sim, None);
        let path = bracket_path(dir.path(), 2025);
        save_bracket(&bracket, &path).unwrap();
        let loaded = load_bracket(dir.path(), Some(2025)).unwrap();
        assert_eq!(loaded, bracket);
        // Newest-year fallback.
        let newest = load_bracket(dir.path(), None).unwrap();
        assert_eq!(newest.year, 2025);
    }

    #[test]
    fn saving_twice_rolls_a_backup() {
        let dir = tempfile::tempdir().unwrap();
        let (teams, standings) = two_league_setup();
        let cfg = PlayoffsConfig::default();
        let bracket = generate_bracket(&standings, &teams, &cfg, 2025);
        let path = bracket_path(dir.path(), 2025);
        save_bracket(&bracket, &path).unwrap();
        save_bracket(&bracket, &path).unwrap();
        assert!(path.with_extension("json.bak").exists());
    }

    #[test]
    fn slots_map_scales_with_league_size() {
        let cfg = PlayoffsConfig::default();
        assert_eq!(cfg.slots_for_league(4), 2);
        assert_eq!(cfg.slots_for_league(6), 4);
        assert_eq!(cfg.slots_for_league(14), 6);
        // Below the smallest configured size the whole league qualifies.
        assert_eq!(cfg.slots_for_league(3), 3);
    }
}

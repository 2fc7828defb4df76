//! Season standings: per-team records with splits, cached atomic storage.

use std::collections::HashMap;
use std::path::PathBuf;

use serde::{Deserialize, Serialize};

use crate::error::StoreError;
use crate::models::player::Hand;
use crate::store::{atomic_write_json, read_json};

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Streak {
    #[serde(default)]
    pub result: Option<String>,
    #[serde(default)]
    pub length: u32,
}

/// One team's season record. Unknown or missing fields normalize to zero
/// on load so older files keep working.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct TeamRecord {
    pub wins: u32,
    pub losses: u32,
    pub runs_for: u32,
    pub runs_against: u32,
    pub one_run_wins: u32,
    pub one_run_losses: u32,
    pub extra_innings_wins: u32,
    pub extra_innings_losses: u32,
    pub home_wins: u32,
    pub home_losses: u32,
    pub road_wins: u32,
    pub road_losses: u32,
    pub vs_rhp_wins: u32,
    pub vs_rhp_losses: u32,
    pub vs_lhp_wins: u32,
    pub vs_lhp_losses: u32,
    pub division_wins: u32,
    pub division_losses: u32,
    pub non_division_wins: u32,
    pub non_division_losses: u32,
    pub last10: Vec<String>,
    pub streak: Streak,
}

impl TeamRecord {
    pub fn games(&self) -> u32 {
        self.wins + self.losses
    }

    pub fn run_diff(&self) -> i64 {
        i64::from(self.runs_for) - i64::from(self.runs_against)
    }
}

/// Inputs for a single standings update.
#[derive(Debug, Clone, Copy)]
pub struct GameOutcome {
    pub won: bool,
    pub runs_for: u32,
    pub runs_against: u32,
    pub home: bool,
    pub opponent_starter_hand: Hand,
    pub division_game: bool,
    pub one_run: bool,
    pub extra_innings: bool,
}

/// Advance every counter in `record` for one completed game.
pub fn update_record(record: &mut TeamRecord, outcome: &GameOutcome) {
    let won = outcome.won;
    if won {
        record.wins += 1;
    } else {
        record.losses += 1;
    }
    record.runs_for += outcome.runs_for;
    record.runs_against += outcome.runs_against;

    if outcome.one_run {
        if won {
            record.one_run_wins += 1;
        } else {
            record.one_run_losses += 1;
        }
    }
    if outcome.extra_innings {
        if won {
            record.extra_innings_wins += 1;
        } else {
            record.extra_innings_losses += 1;
        }
    }
    if outcome.home {
        if won {
            record.home_wins += 1;
        } else {
            record.home_losses += 1;
        }
    } else if won {
        record.road_wins += 1;
    } else {
        record.road_losses += 1;
    }
    if outcome.opponent_starter_hand == Hand::L {
        if won {
            record.vs_lhp_wins += 1;
        } else {
            record.vs_lhp_losses += 1;
        }
    } else if won {
        record.vs_rhp_wins += 1;
    } else {
        record.vs_rhp_losses += 1;
    }
    if outcome.division_game {
        if won {
            record.division_wins += 1;
        } else {
            record.division_losses += 1;
        }
    } else if won {
        record.non_division_wins += 1;
    } else {
        record.non_division_losses += 1;
    }

    let tag = if won { "W" } else { "L" };
    record.last10.push(tag.to_string());
    let len = record.last10.len();
    if len > 10 {
        record.last10.drain(..len - 10);
    }
    if record.streak.result.as_deref() == Some(tag) {
        record.streak.length += 1;
    } else {
        record.streak.result = Some(tag.to_string());
        record.streak.length = 1;
    }
}

/// Standings persistence with last-read caching; mutation invalidates.
#[derive(Debug)]
pub struct StandingsStore {
    path: PathBuf,
    cache: Option<HashMap<String, TeamRecord>>,
}

impl StandingsStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into(), cache: None }
    }

    /// Cached load; a missing or corrupt file reads as empty standings.
    pub fn load(&mut self) -> &HashMap<String, TeamRecord> {
        if self.cache.is_none() {
            let loaded: HashMap<String, TeamRecord> =
                read_json(&self.path).unwrap_or_default();
            self.cache = Some(loaded);
        }
        self.cache.as_ref().expect("cache populated")
    }

    pub fn invalidate(&mut self) {
        self.cache = None;
    }

    pub fn record_mut(&mut self, team_id: &str) -> &mut TeamRecord {
        self.load();
        self.cache
            .as_mut()
            .expect("cache populated")
            .entry(team_id.to_string())
            .or_default()
    }

    /// Apply one game result to both sides' records. Ties (an exhausted
    /// inning cap) change no counters.
    pub fn apply_game(
        &mut self,
        home_id: &str,
        away_id: &str,
        home_runs: u32,
        away_runs: u32,
        home_starter_hand: Hand,
        away_starter_hand: Hand,
        division_game: bool,
        extra_innings: bool,
    ) {
        if home_runs == away_runs {
            tracing::debug!(home_id, away_id, "tie recorded; standings unchanged");
            return;
        }
        let one_run = home_runs.abs_diff(away_runs) == 1;
        let home_outcome = GameOutcome {
            won: home_runs > away_runs,
            runs_for: home_runs,
            runs_against: away_runs,
            home: true,
            opponent_starter_hand: away_starter_hand,
            division_game,
            one_run,
            extra_innings,
        };
        update_record(self.record_mut(home_id), &home_outcome);
        let away_outcome = GameOutcome {
            won: away_runs > home_runs,
            runs_for: away_runs,
            runs_against: home_runs,
            home: false,
            opponent_starter_hand: home_starter_hand,
            division_game,
            one_run,
            extra_innings,
        };
        update_record(self.record_mut(away_id), &away_outcome);
    }

    /// Atomic save of the cached (or provided) standings.
    pub fn save(&mut self) -> Result<(), StoreError> {
        self.load();
        let snapshot = self.cache.as_ref().expect("cache populated").clone();
        atomic_write_json(&self.path, &snapshot)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn win(home: bool, hand: Hand) -> GameOutcome {
        GameOutcome {
            won: true,
            runs_for: 5,
            runs_against: 4,
            home,
            opponent_starter_hand: hand,
            division_game: true,
            one_run: true,
            extra_innings: false,
        }
    }

    #[test]
    fn splits_always_sum_to_the_record() {
        let mut record = TeamRecord::default();
        update_record(&mut record, &win(true, Hand::R));
        update_record(&mut record, &win(false, Hand::L));
        let mut loss = win(true, Hand::R);
        loss.won = false;
        loss.one_run = false;
        update_record(&mut record, &loss);
        assert_eq!(record.games(), 3);
        assert_eq!(record.home_wins + record.road_wins, record.wins);
        assert_eq!(record.home_losses + record.road_losses, record.losses);
        assert_eq!(record.vs_rhp_wins + record.vs_lhp_wins, record.wins);
        assert_eq!(
            record.division_wins + record.non_division_wins,
            record.wins
        );
        assert_eq!(record.one_run_wins, 2);
    }

    #[test]
    fn last10_is_bounded_and_streak_tracks_runs() {
        let mut record = TeamRecord::default();
        for _ in 0..12 {
            update_record(&mut record, &win(true, Hand::R));
        }
        assert_eq!(record.last10.len(), 10);
        assert_eq!(record.streak.result.as_deref(), Some("W"));
        assert_eq!(record.streak.length, 12);
        let mut loss = win(true, Hand::R);
        loss.won = false;
        update_record(&mut record, &loss);
        assert_eq!(record.streak.result.as_deref(), Some("L"));
        assert_eq!(record.streak.length, 1);
        assert_eq!(record.last10.last().map(String::as_str), Some("L"));
    }

    #[test]
    fn save_then_load_round_trips() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("standings.json");
        let mut store = StandingsStore::new(&path);
        store.apply_game("HOM", "AWY", 3, 2, Hand::R, Hand::L, true, false);
        store.save().unwrap();

        let mut fresh = StandingsStore::new(&path);
        let standings = fresh.load();
        assert_eq!(standings["HOM"].wins, 1);
        assert_eq!(standings["HOM"].one_run_wins, 1);
        assert_eq!(standings["AWY"].losses, 1);
        assert_eq!(standings["AWY"].vs_lhp_losses, 1);
        assert_eq!(standings["HOM"].vs_rhp_wins, 1);
    }

    #[test]
    fn invalidate_forces_a_reread() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("standings.json");
        let mut store = StandingsStore::new(&path);
        store.apply_game("A", "B", 1, 0, Hand::R, Hand::R, false, false);
        store.save().unwrap();
        // Another writer replaces the file with a second win.
        let mut other = StandingsStore::new(&path);
        other.apply_game("A", "B", 3, 1, Hand::R, Hand::R, false, false);
        other.save().unwrap();
        // Stale cache until invalidated.
        assert_eq!(store.load()["A"].wins, 1);
        store.invalidate();
        assert_eq!(store.load()["A"].wins, 2);
    }
}

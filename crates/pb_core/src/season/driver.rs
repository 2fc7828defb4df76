//! Day-by-day season driver.
//!
//! Walks the schedule's distinct dates, fires the All-Star break callback
//! once at the midpoint, pauses on Draft Day (a roster error blocks the
//! day so a later call retries it), and runs each day's games in schedule
//! order with seeds drawn from the day-level RNG stream.

use chrono::NaiveDate;
use tracing::{debug, info};

use crate::engine::rng::GameRng;
use crate::error::SimError;

use super::schedule::ScheduledGame;

/// Score line returned by the per-game callback.
#[derive(Debug, Clone)]
pub struct DayGameScore {
    pub home_runs: u32,
    pub away_runs: u32,
    pub boxscore: Option<String>,
}

pub type SimulateGameFn<'a> =
    dyn FnMut(&str, &str, u64, NaiveDate) -> Result<DayGameScore, SimError> + 'a;
pub type AfterGameFn<'a> = dyn FnMut(&ScheduledGame) + 'a;
pub type BreakFn<'a> = dyn FnMut() + 'a;
pub type DraftDayFn<'a> = dyn FnMut(NaiveDate) -> Result<(), SimError> + 'a;

/// Simulate a season schedule with an All-Star break and a Draft-Day pause.
pub struct SeasonSimulator<'a> {
    pub schedule: Vec<ScheduledGame>,
    dates: Vec<NaiveDate>,
    index: usize,
    mid: usize,
    all_star_played: bool,
    draft_date: Option<NaiveDate>,
    draft_triggered: bool,
    rng: GameRng,
    simulate_game: Box<SimulateGameFn<'a>>,
    on_all_star_break: Option<Box<BreakFn<'a>>>,
    after_game: Option<Box<AfterGameFn<'a>>>,
    on_draft_day: Option<Box<DraftDayFn<'a>>>,
}

impl<'a> SeasonSimulator<'a> {
    pub fn new(
        schedule: Vec<ScheduledGame>,
        seed: u64,
        simulate_game: Box<SimulateGameFn<'a>>,
    ) -> Self {
        let mut dates: Vec<NaiveDate> = schedule.iter().map(|g| g.date).collect();
        dates.sort();
        dates.dedup();
        let mid = dates.len() / 2;
        Self {
            schedule,
            dates,
            index: 0,
            mid,
            all_star_played: false,
            draft_date: None,
            draft_triggered: false,
            rng: GameRng::seed_from(seed),
            simulate_game,
            on_all_star_break: None,
            after_game: None,
            on_draft_day: None,
        }
    }

    pub fn with_all_star_break(mut self, hook: Box<BreakFn<'a>>) -> Self {
        self.on_all_star_break = Some(hook);
        self
    }

    pub fn with_after_game(mut self, hook: Box<AfterGameFn<'a>>) -> Self {
        self.after_game = Some(hook);
        self
    }

    /// Register the Draft-Day hook. The date is inserted into the date
    /// sequence even when no games fall on it, so the pause cannot be
    /// skipped over an off day.
    pub fn with_draft_day(mut self, date: NaiveDate, hook: Box<DraftDayFn<'a>>) -> Self {
        self.draft_date = Some(date);
        self.on_draft_day = Some(hook);
        if !self.dates.contains(&date) {
            self.dates.push(date);
            self.dates.sort();
        }
        self.mid = self.dates.len() / 2;
        self
    }

    /// Days left until the All-Star break.
    pub fn remaining_days(&self) -> usize {
        self.mid.saturating_sub(self.index)
    }

    /// Scheduled days left in the regular season.
    pub fn remaining_schedule_days(&self) -> usize {
        self.dates.len().saturating_sub(self.index)
    }

    pub fn current_date(&self) -> Option<NaiveDate> {
        self.dates.get(self.index).copied()
    }

    pub fn is_finished(&self) -> bool {
        self.index >= self.dates.len()
    }

    pub fn games_played(&self) -> usize {
        self.schedule.iter().filter(|g| g.played).count()
    }

    /// Simulate all games on the next scheduled day.
    ///
    /// A draft-roster error propagates without advancing the index, so a
    /// later call retries the same day; any other draft error marks the
    /// draft triggered before propagating.
    pub fn simulate_next_day(&mut self) -> Result<(), SimError> {
        if self.index == self.mid && !self.all_star_played {
            if let Some(hook) = self.on_all_star_break.as_deref_mut() {
                info!("All-Star break");
                hook();
            }
            self.all_star_played = true;
        }
        if self.index >= self.dates.len() {
            return Ok(());
        }
        let current_date = self.dates[self.index];

        if let Some(draft_date) = self.draft_date {
            if !self.draft_triggered && current_date == draft_date {
                if let Some(hook) = self.on_draft_day.as_deref_mut() {
                    match hook(current_date) {
                        Ok(()) => self.draft_triggered = true,
                        Err(err) if err.blocks_day_advance() => {
                            debug!(%current_date, "draft day blocked; holding the index");
                            return Err(err);
                        }
                        Err(err) => {
                            self.draft_triggered = true;
                            return Err(err);
                        }
                    }
                } else {
                    self.draft_triggered = true;
                }
            }
        }

        let game_indices: Vec<usize> = self
            .schedule
            .iter()
            .enumerate()
            .filter(|(_, g)| g.date == current_date)
            .map(|(i, _)| i)
            .collect();
        if game_indices.is_empty() {
            self.index += 1;
            return Ok(());
        }

        // Per-game seeds come from the day-level stream in schedule order.
        let seeds: Vec<u64> =
            game_indices.iter().map(|_| u64::from(self.rng.int_in(0, (1 << 30) - 1))).collect();
        for (game_idx, seed) in game_indices.into_iter().zip(seeds) {
            let (home, away) = {
                let game = &self.schedule[game_idx];
                if game.played {
                    // Resume: completed games keep their recorded result;
                    // the seed was still drawn so the stream stays aligned.
                    continue;
                }
                (game.home.clone(), game.away.clone())
            };
            let score = (self.simulate_game)(&home, &away, seed, current_date)?;
            {
                let game = &mut self.schedule[game_idx];
                game.result = Some(format!("{}-{}", score.home_runs, score.away_runs));
                game.played = true;
                game.boxscore = score.boxscore;
            }
            if let Some(hook) = self.after_game.as_deref_mut() {
                hook(&self.schedule[game_idx]);
            }
        }
        self.index += 1;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::DraftRosterError;
    use crate::season::schedule::generate_schedule;
    use std::cell::RefCell;

    fn date(day: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(2025, 4, day).unwrap()
    }

    fn teams() -> Vec<String> {
        (0..4).map(|i| format!("T{i}")).collect()
    }

    fn fixed_score() -> Box<SimulateGameFn<'static>> {
        Box::new(|_, _, _, _| {
            Ok(DayGameScore { home_runs: 4, away_runs: 2, boxscore: None })
        })
    }

    #[test]
    fn a_day_runs_all_its_games_and_backfills_results() {
        let schedule = generate_schedule(&teams(), date(1));
        let mut sim = SeasonSimulator::new(schedule, 7, fixed_score());
        sim.simulate_next_day().unwrap();
        let first_day: Vec<&ScheduledGame> =
            sim.schedule.iter().filter(|g| g.date == date(1)).collect();
        assert!(!first_day.is_empty());
        for game in first_day {
            assert!(game.played);
            assert_eq!(game.result.as_deref(), Some("4-2"));
        }
        assert!(sim.schedule.iter().filter(|g| g.date != date(1)).all(|g| !g.played));
    }

    #[test]
    fn all_star_break_fires_once_at_the_midpoint() {
        let schedule = generate_schedule(&teams(), date(1));
        let fired = RefCell::new(0u32);
        {
            let mut sim = SeasonSimulator::new(schedule, 7, fixed_score())
                .with_all_star_break(Box::new(|| *fired.borrow_mut() += 1));
            let total_days = sim.remaining_schedule_days();
            for _ in 0..total_days {
                sim.simulate_next_day().unwrap();
            }
            assert!(sim.is_finished());
        }
        assert_eq!(*fired.borrow(), 1);
    }

    #[test]
    fn draft_roster_error_blocks_the_day_until_fixed() {
        let schedule = generate_schedule(&teams(), date(1));
        let draft_day = schedule[0].date;
        let attempts = RefCell::new(0u32);
        let mut sim = SeasonSimulator::new(schedule, 7, fixed_score()).with_draft_day(
            draft_day,
            Box::new(|_| {
                *attempts.borrow_mut() += 1;
                if *attempts.borrow() < 3 {
                    Err(DraftRosterError::new(vec!["roster full".to_string()]).into())
                } else {
                    Ok(())
                }
            }),
        );
        assert!(sim.simulate_next_day().is_err());
        assert_eq!(sim.current_date(), Some(draft_day));
        assert!(sim.simulate_next_day().is_err());
        assert_eq!(sim.current_date(), Some(draft_day));
        // Third try succeeds and the day advances.
        sim.simulate_next_day().unwrap();
        assert_ne!(sim.current_date(), Some(draft_day));
        assert_eq!(*attempts.borrow(), 3);
    }

    #[test]
    fn draft_day_without_games_still_pauses() {
        let schedule = generate_schedule(&teams(), date(1));
        // Pick an off day inside the All-Star gap.
        let mut dates: Vec<NaiveDate> = schedule.iter().map(|g| g.date).collect();
        dates.sort();
        dates.dedup();
        let gap_start = dates
            .windows(2)
            .find(|w| (w[1] - w[0]).num_days() > 1)
            .map(|w| w[0])
            .unwrap();
        let off_day = gap_start + chrono::Duration::days(1);
        let fired = RefCell::new(false);
        let mut sim = SeasonSimulator::new(schedule, 7, fixed_score()).with_draft_day(
            off_day,
            Box::new(|d| {
                assert_eq!(d, off_day);
                *fired.borrow_mut() = true;
                Ok(())
            }),
        );
        while !sim.is_finished() {
            sim.simulate_next_day().unwrap();
        }
        assert!(*fired.borrow());
    }

    fn record(log: &RefCell<Vec<u64>>) -> Box<SimulateGameFn<'_>> {
        Box::new(move |_, _, seed, _| {
            log.borrow_mut().push(seed);
            Ok(DayGameScore { home_runs: 1, away_runs: 0, boxscore: None })
        })
    }

    #[test]
    fn per_game_seeds_are_reproducible() {
        let schedule = generate_schedule(&teams(), date(1));
        let log_a = RefCell::new(Vec::new());
        let log_b = RefCell::new(Vec::new());
        {
            let mut sim = SeasonSimulator::new(schedule.clone(), 99, record(&log_a));
            sim.simulate_next_day().unwrap();
            sim.simulate_next_day().unwrap();
        }
        {
            let mut sim = SeasonSimulator::new(schedule, 99, record(&log_b));
            sim.simulate_next_day().unwrap();
            sim.simulate_next_day().unwrap();
        }
        assert_eq!(*log_a.borrow(), *log_b.borrow());
        assert!(!log_a.borrow().is_empty());
    }

    #[test]
    fn remaining_day_counters_track_the_midpoint() {
        let schedule = generate_schedule(&teams(), date(1));
        let mut sim = SeasonSimulator::new(schedule, 7, fixed_score());
        let total = sim.remaining_schedule_days();
        let mid = sim.remaining_days();
        assert_eq!(mid, total / 2);
        sim.simulate_next_day().unwrap();
        assert_eq!(sim.remaining_schedule_days(), total - 1);
        assert_eq!(sim.remaining_days(), mid - 1);
    }
}

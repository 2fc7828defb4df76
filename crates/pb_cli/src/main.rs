//! `run_long_term_sim`: drive multi-season simulations end to end.
//!
//! Each season: schedule generation, day-by-day simulation with standings
//! and usage tracking, a draft-day pause, playoffs, and season archive
//! rollover. Everything is deterministic from `--seed`.

mod league;

use std::cell::RefCell;
use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{bail, Context};
use chrono::{Datelike, NaiveDate, Utc};
use clap::Parser;
use tracing::{info, warn};

use pb_core::engine::game::{simulate_game, GameSetup};
use pb_core::error::{SimError, SimInputError};
use pb_core::models::park::Park;
use pb_core::models::player::Hand;
use pb_core::season::context::SeasonContext;
use pb_core::season::driver::{DayGameScore, SeasonSimulator};
use pb_core::season::playoffs::{
    bracket_path, generate_bracket, save_bracket, simulate_playoffs, LeagueTeam, PlayoffsConfig,
    SeriesGameScore,
};
use pb_core::season::progress::{
    load_progress, mark_draft_completed, mark_playoffs_completed, save_progress,
};
use pb_core::season::schedule::{
    generate_mlb_schedule, load_schedule, save_schedule, validate_schedule, ScheduledGame,
};
use pb_core::season::standings::StandingsStore;
use pb_core::store::atomic_write_json;
use pb_core::tuning::load_tuning;
use pb_core::usage::UsageState;

use league::{synthesize_league, LeagueClub};

#[derive(Parser, Debug)]
#[command(
    name = "run_long_term_sim",
    about = "Run a deterministic multi-season baseball simulation"
)]
struct Args {
    /// Number of consecutive seasons to simulate.
    #[arg(long, default_value_t = 1)]
    seasons: u32,

    /// League size.
    #[arg(long, default_value_t = 14)]
    teams: usize,

    /// Regular-season games per team.
    #[arg(long, default_value_t = 162)]
    games: u32,

    /// First league year; defaults to the current year.
    #[arg(long)]
    start_year: Option<i32>,

    #[arg(long, default_value = "Playball Long Run")]
    league_name: String,

    /// Data directory for all generated artifacts.
    #[arg(long, default_value = "data")]
    output_dir: PathBuf,

    /// Top-level seed; fixes every downstream draw.
    #[arg(long)]
    seed: Option<u64>,

    /// Overwrite existing season artifacts in the output directory.
    #[arg(long)]
    force: bool,

    /// Resume an interrupted season from the saved schedule.
    #[arg(long)]
    resume: bool,

    /// Persist per-game box score JSON files.
    #[arg(long)]
    save_boxscores: bool,

    /// Track pitcher usage through the postseason as well.
    #[arg(long)]
    include_playoff_stats: bool,

    /// Recorded in season metadata for the draft collaborator.
    #[arg(long)]
    draft_rounds: Option<u32>,

    /// Recorded in season metadata for the draft collaborator.
    #[arg(long)]
    draft_pool_size: Option<u32>,

    /// Log a heartbeat every N simulated days.
    #[arg(long, default_value_t = 1)]
    heartbeat_every: u32,
}

fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();
    run(Args::parse())
}

fn env_date(name: &str) -> Option<NaiveDate> {
    std::env::var(name).ok()?.parse().ok()
}

fn env_year(name: &str) -> Option<i32> {
    std::env::var(name).ok()?.parse().ok()
}

fn env_flag(name: &str) -> bool {
    std::env::var(name).map(|v| !v.is_empty() && v != "0").unwrap_or(false)
}

fn run(args: Args) -> anyhow::Result<()> {
    if args.teams < 2 {
        bail!("at least two teams are required");
    }
    if let Ok(engine) = std::env::var("PB_GAME_ENGINE") {
        info!(%engine, "PB_GAME_ENGINE requested (external engine selection)");
    }
    if let Ok(profile) = std::env::var("PB_RATING_PROFILE") {
        info!(%profile, "PB_RATING_PROFILE requested (external rating profiles)");
    }

    let data_dir = args.output_dir.clone();
    fs::create_dir_all(&data_dir)
        .with_context(|| format!("creating output dir {}", data_dir.display()))?;

    let schedule_path = data_dir.join("schedule.csv");
    if schedule_path.exists() && !args.force && !args.resume {
        bail!(
            "{} already contains a season; pass --resume to continue it or --force to start over",
            data_dir.display()
        );
    }
    if args.force {
        reset_data_dir(&data_dir)?;
    }

    let base_seed = args.seed.unwrap_or(20250401);
    let clubs_list = synthesize_league(args.teams, base_seed);
    for club in &clubs_list {
        if club.lineup.len() < 9 || club.pitchers.is_empty() {
            bail!("synthesized club {} is incomplete", club.team_id);
        }
    }
    let clubs: HashMap<String, LeagueClub> =
        clubs_list.into_iter().map(|c| (c.team_id.clone(), c)).collect();
    let team_ids: Vec<String> = {
        let mut ids: Vec<String> = clubs.keys().cloned().collect();
        ids.sort();
        ids
    };

    let start_year = env_year("PB_SIM_YEAR")
        .or(args.start_year)
        .unwrap_or_else(|| Utc::now().year());

    let mut context = SeasonContext::load(&data_dir.join("career_index.json"));
    context
        .ensure_league(Some(&args.league_name), None)
        .map_err(SimError::from)
        .context("initializing league ledger")?;

    let mut total_days: u64 = 0;
    for season_index in 0..args.seasons {
        let year = start_year + season_index as i32;
        info!(year, season = season_index + 1, "season start");
        let days = run_season(&args, &data_dir, &clubs, &team_ids, &mut context, year, base_seed)?;
        total_days += days;

        let progress_path = data_dir.join("season_progress.json");
        let mut progress = load_progress(&progress_path);
        progress.preseason_done = true;
        progress.sim_index = total_days;
        save_progress(&progress_path, &progress).map_err(SimError::from)?;
    }
    info!(seasons = args.seasons, days = total_days, "simulation complete");
    Ok(())
}

/// Clear season artifacts the driver itself owns.
fn reset_data_dir(data_dir: &Path) -> anyhow::Result<()> {
    for name in ["schedule.csv", "standings.json", "season_progress.json", "career_index.json"] {
        let path = data_dir.join(name);
        if path.exists() {
            fs::remove_file(&path).with_context(|| format!("removing {}", path.display()))?;
        }
    }
    if let Ok(entries) = fs::read_dir(data_dir) {
        for entry in entries.flatten() {
            let name = entry.file_name().to_string_lossy().to_string();
            if name.starts_with("playoffs_") && name.ends_with(".json") {
                let _ = fs::remove_file(entry.path());
            }
        }
    }
    let history = data_dir.join("season_history");
    if history.exists() {
        let _ = fs::remove_dir_all(&history);
    }
    Ok(())
}

fn starter_hand(clubs: &HashMap<String, LeagueClub>, team: &str, starter_id: &str) -> Hand {
    clubs
        .get(team)
        .and_then(|club| club.pitchers.iter().find(|p| p.player_id == starter_id))
        .map(|p| p.throws)
        .unwrap_or(Hand::R)
}

fn build_setup(
    clubs: &HashMap<String, LeagueClub>,
    home: &str,
    away: &str,
    seed: u64,
    game_day: Option<u32>,
    tuning_path: &Path,
    postseason: bool,
) -> Result<GameSetup, SimError> {
    let home_club = clubs.get(home).ok_or_else(|| {
        SimError::Input(SimInputError::UnknownTeam { team: home.to_string(), row: 0 })
    })?;
    let away_club = clubs.get(away).ok_or_else(|| {
        SimError::Input(SimInputError::UnknownTeam { team: away.to_string(), row: 0 })
    })?;
    let mut setup = GameSetup::new(away, home);
    setup.away_lineup = away_club.lineup.clone();
    setup.home_lineup = home_club.lineup.clone();
    setup.away_positions = away_club.positions.clone();
    setup.home_positions = home_club.positions.clone();
    setup.away_bench = away_club.bench.clone();
    setup.home_bench = home_club.bench.clone();
    setup.away_pitchers = away_club.pitchers.clone();
    setup.home_pitchers = home_club.pitchers.clone();
    setup.away_roles = away_club.roles.clone();
    setup.home_roles = home_club.roles.clone();
    setup.park = Park::named(&format!("{home} Park"));
    setup.tuning = load_tuning(None, Some(tuning_path));
    setup.seed = Some(seed);
    setup.game_day = game_day;
    setup.postseason = postseason;
    Ok(setup)
}

fn run_season(
    args: &Args,
    data_dir: &Path,
    clubs: &HashMap<String, LeagueClub>,
    team_ids: &[String],
    context: &mut SeasonContext,
    year: i32,
    base_seed: u64,
) -> anyhow::Result<u64> {
    let mut metadata = HashMap::new();
    if let Some(rounds) = args.draft_rounds {
        metadata.insert("draft_rounds".to_string(), serde_json::json!(rounds));
    }
    if let Some(size) = args.draft_pool_size {
        metadata.insert("draft_pool_size".to_string(), serde_json::json!(size));
    }
    context
        .ensure_current_season(Some(year), None, Some(&metadata))
        .map_err(SimError::from)?;

    let start_date = env_date("PB_SIM_DATE")
        .filter(|d| d.year() == year)
        .unwrap_or_else(|| NaiveDate::from_ymd_opt(year, 4, 1).expect("valid date"));

    let schedule_path = data_dir.join("schedule.csv");
    // Resume keeps the saved schedule for this year (played games are
    // skipped by the driver, so standings never double-count).
    let schedule = if args.resume && schedule_path.exists() {
        let existing = load_schedule(&schedule_path).map_err(SimError::from)?;
        if existing.first().map(|g| g.date.year()) == Some(year) {
            info!(year, "resuming saved schedule");
            existing
        } else {
            fresh_schedule(team_ids, start_date, args.games, &schedule_path)?
        }
    } else {
        fresh_schedule(team_ids, start_date, args.games, &schedule_path)?
    };
    context.mark_season_started(&start_date.to_string()).map_err(SimError::from)?;

    // Season-scoped state shared with the driver callbacks.
    let tuning_path = data_dir.join("tuning.json");
    let standings = RefCell::new(StandingsStore::new(data_dir.join("standings.json")));
    if !args.resume {
        // New season starts from a clean slate.
        let _ = fs::remove_file(data_dir.join("standings.json"));
        standings.borrow_mut().invalidate();
    }
    let usage = RefCell::new(UsageState::default());
    let skip_boxscores = env_flag("PB_SKIP_BOXSCORE_HTML");
    let persist_stats = !std::env::var("PB_PERSIST_STATS").map(|v| v == "0").unwrap_or(false);
    let boxscore_dir = data_dir.join("boxscores");
    let progress_path = data_dir.join("season_progress.json");

    let simulate = {
        let clubs = &clubs;
        let standings = &standings;
        let usage = &usage;
        let tuning_path = tuning_path.clone();
        let boxscore_dir = boxscore_dir.clone();
        let save_boxscores = args.save_boxscores && !skip_boxscores;
        move |home: &str, away: &str, seed: u64, date: NaiveDate| -> Result<DayGameScore, SimError> {
            let game_day = (date - start_date).num_days().max(0) as u32;
            let setup =
                build_setup(clubs, home, away, seed, Some(game_day), &tuning_path, false)?;
            let mut usage = usage.borrow_mut();
            let result = simulate_game(setup, Some(&mut usage))?;

            let home_starter = result
                .metadata
                .pitcher_usage
                .home
                .first()
                .map(|p| p.player_id.clone())
                .unwrap_or_default();
            let away_starter = result
                .metadata
                .pitcher_usage
                .away
                .first()
                .map(|p| p.player_id.clone())
                .unwrap_or_default();
            let division_game = clubs.get(home).map(|c| c.division.as_str())
                == clubs.get(away).map(|c| c.division.as_str());
            standings.borrow_mut().apply_game(
                home,
                away,
                result.metadata.score.home,
                result.metadata.score.away,
                starter_hand(clubs, home, &home_starter),
                starter_hand(clubs, away, &away_starter),
                division_game,
                result.metadata.innings > 9,
            );

            let boxscore = if save_boxscores {
                let path = boxscore_dir.join(format!("{date}_{away}_at_{home}.json"));
                match atomic_write_json(&path, &result) {
                    Ok(()) => Some(
                        path.strip_prefix(data_dir)
                            .unwrap_or(&path)
                            .to_string_lossy()
                            .to_string(),
                    ),
                    Err(err) => {
                        warn!(%err, "failed to write box score");
                        None
                    }
                }
            } else {
                None
            };
            Ok(DayGameScore {
                home_runs: result.metadata.score.home,
                away_runs: result.metadata.score.away,
                boxscore,
            })
        }
    };

    let draft_hook = {
        let progress_path = progress_path.clone();
        move |date: NaiveDate| -> Result<(), SimError> {
            info!(%date, year, "draft day: pausing for roster assignment");
            mark_draft_completed(&progress_path, year).map_err(SimError::from)
        }
    };

    let mut dates: Vec<NaiveDate> = schedule.iter().map(|g| g.date).collect();
    dates.sort();
    dates.dedup();
    let draft_date = dates[dates.len() / 2];
    let season_seed = base_seed
        .wrapping_mul(0x9E37_79B9_7F4A_7C15)
        .wrapping_add(year as u64);

    let mut sim = SeasonSimulator::new(schedule, season_seed, Box::new(simulate))
        .with_all_star_break(Box::new(|| info!(year, "All-Star break reached")))
        .with_draft_day(draft_date, Box::new(draft_hook));

    let mut day_index: u64 = 0;
    while !sim.is_finished() {
        let current_date = sim.current_date();
        sim.simulate_next_day().map_err(|err| {
            anyhow::anyhow!("season {year} halted on {current_date:?}: {err}")
        })?;
        day_index += 1;
        if args.heartbeat_every > 0 && day_index % u64::from(args.heartbeat_every) == 0 {
            info!(
                year,
                day = day_index,
                games_played = sim.games_played(),
                remaining_days = sim.remaining_schedule_days(),
                "heartbeat"
            );
        }
        save_schedule(&sim.schedule, &schedule_path).map_err(SimError::from)?;
        if persist_stats {
            if let Some(date) = current_date {
                write_history_shard(data_dir, year, day_index, date, &sim.schedule)?;
            }
        }
    }
    standings.borrow_mut().save().map_err(SimError::from)?;
    info!(year, games = sim.games_played(), "regular season complete");

    run_playoffs(args, data_dir, clubs, &standings, &usage, &tuning_path, year)?;

    let artifacts = HashMap::from([
        ("standings".to_string(), "standings.json".to_string()),
        ("schedule".to_string(), "schedule.csv".to_string()),
        ("playoffs".to_string(), format!("playoffs_{year}.json")),
    ]);
    context
        .archive_current_season(Some(artifacts), Some(&dates[dates.len() - 1].to_string()), Some(year + 1))
        .map_err(SimError::from)?;
    Ok(day_index)
}

fn fresh_schedule(
    team_ids: &[String],
    start_date: NaiveDate,
    games: u32,
    schedule_path: &Path,
) -> anyhow::Result<Vec<ScheduledGame>> {
    let schedule = generate_mlb_schedule(team_ids, start_date, games)?;
    validate_schedule(&schedule, team_ids, games)?;
    save_schedule(&schedule, schedule_path).map_err(SimError::from)?;
    Ok(schedule)
}

fn write_history_shard(
    data_dir: &Path,
    year: i32,
    day_index: u64,
    date: NaiveDate,
    schedule: &[ScheduledGame],
) -> anyhow::Result<()> {
    let games: Vec<&ScheduledGame> =
        schedule.iter().filter(|g| g.date == date && g.played).collect();
    if games.is_empty() {
        return Ok(());
    }
    let shard = serde_json::json!({
        "year": year,
        "day": day_index,
        "date": date.to_string(),
        "games": games,
    });
    let path = data_dir.join("season_history").join(format!("{year}_day_{day_index:03}.json"));
    atomic_write_json(&path, &shard).map_err(SimError::from)?;
    Ok(())
}

fn run_playoffs(
    args: &Args,
    data_dir: &Path,
    clubs: &HashMap<String, LeagueClub>,
    standings: &RefCell<StandingsStore>,
    usage: &RefCell<UsageState>,
    tuning_path: &Path,
    year: i32,
) -> anyhow::Result<()> {
    let cfg = PlayoffsConfig::load(&data_dir.join("playoffs_config.json"));
    let snapshot = standings.borrow_mut().load().clone();
    let league_teams: Vec<LeagueTeam> = {
        let mut teams: Vec<LeagueTeam> = clubs
            .values()
            .map(|c| LeagueTeam { team_id: c.team_id.clone(), division: c.division.clone() })
            .collect();
        teams.sort_by(|a, b| a.team_id.cmp(&b.team_id));
        teams
    };
    let mut bracket = generate_bracket(&snapshot, &league_teams, &cfg, year);
    let path = bracket_path(data_dir, year);

    let mut simulate = |home: &str, away: &str, seed: u64| -> SeriesGameScore {
        let setup = match build_setup(clubs, home, away, seed, None, tuning_path, true) {
            Ok(setup) => setup,
            Err(err) => {
                warn!(%err, home, away, "playoff matchup could not be prepared");
                return SeriesGameScore { home_runs: 0, away_runs: 1, boxscore: None };
            }
        };
        let result = if args.include_playoff_stats {
            let mut usage = usage.borrow_mut();
            simulate_game(setup, Some(&mut usage))
        } else {
            simulate_game(setup, None)
        };
        match result {
            Ok(result) => SeriesGameScore {
                home_runs: result.metadata.score.home,
                away_runs: result.metadata.score.away,
                boxscore: None,
            },
            Err(err) => {
                warn!(%err, home, away, "playoff game failed");
                SeriesGameScore { home_runs: 0, away_runs: 1, boxscore: None }
            }
        }
    };
    let mut persist = |bracket: &pb_core::season::playoffs::PlayoffBracket| {
        if let Err(err) = save_bracket(bracket, &path) {
            warn!(%err, "failed to persist bracket");
        }
    };
    simulate_playoffs(&mut bracket, &cfg, &mut simulate, Some(&mut persist));
    save_bracket(&bracket, &path).map_err(SimError::from)?;

    match (&bracket.champion, &bracket.runner_up) {
        (Some(champion), Some(runner_up)) => {
            info!(year, %champion, %runner_up, "playoffs complete");
        }
        _ => warn!(year, "playoffs ended without a champion"),
    }
    mark_playoffs_completed(&data_dir.join("season_progress.json")).map_err(SimError::from)?;
    Ok(())
}

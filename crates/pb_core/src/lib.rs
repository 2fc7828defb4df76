//! # pb_core - Deterministic Baseball Season Simulation Engine
//!
//! This library resolves baseball games pitch-by-pitch from player ratings,
//! park geometry and a flat table of tunable coefficients, and drives whole
//! seasons on top of that: rotation and bullpen management, workload and
//! fatigue tracking, standings, and playoff brackets.
//!
//! ## Features
//! - 100% deterministic simulation (same seed = same result)
//! - Pitch-level log with batted-ball physics for every ball in play
//! - Season driver with All-Star break and draft-day pause semantics
//! - Atomic JSON persistence for standings, brackets, and progress flags

// Game engine APIs often require many parameters for count, bases, score, etc.
#![allow(clippy::too_many_arguments)]

pub mod engine;
pub mod error;
pub mod injury;
pub mod models;
pub mod season;
pub mod store;
pub mod tuning;
pub mod usage;

// Re-export the main simulation entry points
pub use engine::game::{simulate_game, GameSetup};
pub use engine::rng::{series_seed, GameRng};
pub use error::{SimError, SimInputError};
pub use models::park::{Park, Stadium};
pub use models::player::{BatterRatings, Hand, PitcherRatings};
pub use models::result::GameResult;
pub use tuning::{load_tuning, TuningConfig};
pub use usage::UsageState;

// Re-export the season layer
pub use season::driver::SeasonSimulator;
pub use season::playoffs::{
    generate_bracket, load_bracket, save_bracket, simulate_playoffs, PlayoffBracket,
};
pub use season::schedule::{generate_mlb_schedule, generate_schedule, ScheduledGame};
pub use season::standings::StandingsStore;

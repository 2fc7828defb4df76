use std::path::PathBuf;

use thiserror::Error;

/// Errors surfaced while preparing or running a single game.
#[derive(Error, Debug)]
pub enum SimInputError {
    #[error("team {team}: lineup requires 9 hitters, found {found}")]
    ShortLineup { team: String, found: usize },

    #[error("team {team}: at least one pitcher is required")]
    NoPitchers { team: String },

    #[error("unknown team id {team} in schedule row {row}")]
    UnknownTeam { team: String, row: usize },
}

/// Errors surfaced by the persistence layer.
#[derive(Error, Debug)]
pub enum StoreError {
    #[error("IO error on {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("CSV error on {path}: {source}")]
    Csv {
        path: PathBuf,
        #[source]
        source: csv::Error,
    },

    #[error("could not update {path} after {attempts} attempts")]
    RetriesExhausted { path: PathBuf, attempts: u32 },

    #[error("lock on {path} is held by another process")]
    Locked { path: PathBuf },
}

/// Raised on draft day when drafted players could not be placed on the
/// required rosters. The season driver treats this as a blocking pause:
/// the day index is not advanced and a later call retries the same day.
#[derive(Error, Debug)]
#[error("draft assignments failed; resolve roster issues before resuming the season ({})", .failures.join("; "))]
pub struct DraftRosterError {
    pub failures: Vec<String>,
}

impl DraftRosterError {
    pub fn new(failures: Vec<String>) -> Self {
        Self { failures }
    }
}

/// Top-level error for season-driver operations.
#[derive(Error, Debug)]
pub enum SimError {
    #[error(transparent)]
    Input(#[from] SimInputError),

    #[error(transparent)]
    Store(#[from] StoreError),

    #[error(transparent)]
    DraftRoster(#[from] DraftRosterError),

    #[error("schedule error: {0}")]
    Schedule(String),
}

impl SimError {
    /// Draft-roster errors block day advancement; everything else aborts
    /// only the current scope.
    pub fn blocks_day_advance(&self) -> bool {
        matches!(self, SimError::DraftRoster(_))
    }
}

//! Season progress flags in `season_progress.json`.
//!
//! A tiny JSON document updated with read-modify-write plus retry so that
//! concurrent writers (the simulator and a UI process) never tear it.

use std::collections::BTreeSet;
use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::StoreError;
use crate::store::{atomic_write_json_retry, read_json};

pub const DEFAULT_RETRIES: u32 = 6;
pub const DEFAULT_RETRY_DELAY: Duration = Duration::from_millis(50);

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SeasonProgress {
    pub preseason_done: bool,
    pub sim_index: u64,
    pub playoffs_done: bool,
    pub draft_completed_years: Vec<i32>,
    pub auto_activate_dl: bool,
}

pub fn load_progress(path: &Path) -> SeasonProgress {
    read_json(path).unwrap_or_default()
}

pub fn save_progress(path: &Path, progress: &SeasonProgress) -> Result<(), StoreError> {
    atomic_write_json_retry(path, progress, DEFAULT_RETRIES, DEFAULT_RETRY_DELAY)
}

/// Ensure `year` is a member of `draft_completed_years`. Idempotent: the
/// set stays stable under repeated calls.
pub fn mark_draft_completed(path: &Path, year: i32) -> Result<(), StoreError> {
    let mut progress = load_progress(path);
    let mut years: BTreeSet<i32> = progress.draft_completed_years.iter().copied().collect();
    years.insert(year);
    progress.draft_completed_years = years.into_iter().collect();
    save_progress(path, &progress)
}

/// Ensure `playoffs_done` is set.
pub fn mark_playoffs_completed(path: &Path) -> Result<(), StoreError> {
    let mut progress = load_progress(path);
    progress.playoffs_done = true;
    save_progress(path, &progress)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn draft_years_are_a_stable_sorted_set() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("season_progress.json");
        mark_draft_completed(&path, 2027).unwrap();
        mark_draft_completed(&path, 2025).unwrap();
        mark_draft_completed(&path, 2027).unwrap();
        let progress = load_progress(&path);
        assert_eq!(progress.draft_completed_years, vec![2025, 2027]);
    }

    #[test]
    fn playoffs_flag_survives_other_updates() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("season_progress.json");
        mark_playoffs_completed(&path).unwrap();
        mark_draft_completed(&path, 2026).unwrap();
        let progress = load_progress(&path);
        assert!(progress.playoffs_done);
        assert_eq!(progress.draft_completed_years, vec![2026]);
    }

    #[test]
    fn missing_file_reads_as_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let progress = load_progress(&dir.path().join("nope.json"));
        assert_eq!(progress, SeasonProgress::default());
    }

    #[test]
    fn unknown_fields_are_preserved_as_defaults_on_rewrite() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("season_progress.json");
        std::fs::write(&path, r#"{"sim_index": 42, "preseason_done": true}"#).unwrap();
        mark_playoffs_completed(&path).unwrap();
        let progress = load_progress(&path);
        assert!(progress.preseason_done);
        assert_eq!(progress.sim_index, 42);
        assert!(progress.playoffs_done);
    }
}

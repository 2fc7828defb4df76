//! League/season ledger persisted to `career_index.json`.
//!
//! The `current` block describes the in-flight season; `seasons` is the
//! historical archive. Season identifiers are `<league-slug>-<year>`.

use std::collections::HashMap;
use std::path::{Path, PathBuf};

use chrono::{Datelike, SecondsFormat, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::StoreError;
use crate::store::{atomic_write_json, read_json};

const SCHEMA_VERSION: u32 = 1;

fn utcnow() -> String {
    Utc::now().to_rfc3339_opts(SecondsFormat::Secs, true)
}

/// Filesystem-friendly slug for a league identifier.
pub fn slugify_league_id(value: &str) -> String {
    let mut slug = String::new();
    let mut last_dash = true;
    for ch in value.trim().to_lowercase().chars() {
        if ch.is_ascii_alphanumeric() {
            slug.push(ch);
            last_dash = false;
        } else if !last_dash {
            slug.push('-');
            last_dash = true;
        }
    }
    let slug = slug.trim_matches('-').to_string();
    if slug.is_empty() {
        "league".to_string()
    } else {
        slug
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct LeagueInfo {
    pub id: String,
    pub name: String,
    pub created_at: String,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SeasonDescriptor {
    pub season_id: String,
    pub league_year: i32,
    pub sequence: u32,
    pub started_on: Option<String>,
    pub metadata: HashMap<String, Value>,
    pub rollover_complete: bool,
    pub created_at: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub archived_on: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub ended_on: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub artifacts: Option<HashMap<String, String>>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SeasonLedger {
    pub version: u32,
    pub league: Option<LeagueInfo>,
    pub current: Option<SeasonDescriptor>,
    pub seasons: Vec<SeasonDescriptor>,
}

/// Reader/updater for the season ledger file.
#[derive(Debug, Clone)]
pub struct SeasonContext {
    pub data: SeasonLedger,
    path: PathBuf,
}

impl SeasonContext {
    pub fn load(path: &Path) -> Self {
        let data = read_json(path).unwrap_or(SeasonLedger {
            version: SCHEMA_VERSION,
            ..SeasonLedger::default()
        });
        Self { data, path: path.to_path_buf() }
    }

    pub fn save(&self) -> Result<(), StoreError> {
        atomic_write_json(&self.path, &self.data)
    }

    pub fn league_id(&self) -> Option<&str> {
        self.data.league.as_ref().map(|l| l.id.as_str())
    }

    pub fn current_season_id(&self) -> Option<&str> {
        self.data.current.as_ref().map(|c| c.season_id.as_str())
    }

    /// Ensure the league block is populated; returns the league id.
    pub fn ensure_league(
        &mut self,
        name: Option<&str>,
        league_id: Option<&str>,
    ) -> Result<String, StoreError> {
        if self.data.league.is_none() {
            let id = slugify_league_id(league_id.or(name).unwrap_or("league"));
            self.data.league = Some(LeagueInfo {
                name: name.map(str::to_string).unwrap_or_else(|| id.to_uppercase()),
                id: id.clone(),
                created_at: utcnow(),
            });
            self.save()?;
            return Ok(id);
        }
        let league = self.data.league.as_mut().expect("league present");
        let mut updated = false;
        if league.id.is_empty() {
            if let Some(league_id) = league_id {
                league.id = slugify_league_id(league_id);
                updated = true;
            }
        }
        if league.name.is_empty() {
            if let Some(name) = name {
                league.name = name.to_string();
                updated = true;
            }
        }
        let id = if league.id.is_empty() { "league".to_string() } else { league.id.clone() };
        if updated {
            self.save()?;
        }
        Ok(id)
    }

    /// Populate the current-season descriptor if absent, or align its year
    /// and merge metadata.
    pub fn ensure_current_season(
        &mut self,
        league_year: Option<i32>,
        started_on: Option<&str>,
        metadata: Option<&HashMap<String, Value>>,
    ) -> Result<SeasonDescriptor, StoreError> {
        let league = self.ensure_league(None, None)?;
        let mut updated = false;
        if self.data.current.is_none() {
            let year = league_year.unwrap_or_else(|| Utc::now().year());
            self.data.current = Some(SeasonDescriptor {
                season_id: format!("{league}-{year}"),
                league_year: year,
                sequence: self.data.seasons.len() as u32 + 1,
                started_on: started_on.map(str::to_string),
                metadata: metadata.cloned().unwrap_or_default(),
                rollover_complete: false,
                created_at: utcnow(),
                archived_on: None,
                ended_on: None,
                artifacts: None,
            });
            updated = true;
        } else {
            let current = self.data.current.as_mut().expect("current present");
            if let Some(year) = league_year {
                if current.league_year != year {
                    current.league_year = year;
                    current.season_id = format!("{league}-{year}");
                    updated = true;
                }
            }
            if let Some(started) = started_on {
                if current.started_on.is_none() {
                    current.started_on = Some(started.to_string());
                    updated = true;
                }
            }
            if let Some(metadata) = metadata {
                for (key, value) in metadata {
                    if current.metadata.get(key) != Some(value) {
                        current.metadata.insert(key.clone(), value.clone());
                        updated = true;
                    }
                }
            }
            if current.sequence == 0 {
                current.sequence = self.data.seasons.len() as u32 + 1;
                updated = true;
            }
            if current.created_at.is_empty() {
                current.created_at = utcnow();
                updated = true;
            }
        }
        if updated {
            self.save()?;
        }
        Ok(self.data.current.clone().expect("current present"))
    }

    /// Record the first regular-season date if not already set.
    pub fn mark_season_started(&mut self, start_date: &str) -> Result<(), StoreError> {
        if start_date.is_empty() {
            return Ok(());
        }
        self.ensure_current_season(None, None, None)?;
        let current = self.data.current.as_mut().expect("current present");
        if current.started_on.is_none() {
            current.started_on = Some(start_date.to_string());
            self.save()?;
        }
        Ok(())
    }

    /// Append the current descriptor to the archive and open the next
    /// season. Returns the fresh current descriptor.
    pub fn archive_current_season(
        &mut self,
        artifacts: Option<HashMap<String, String>>,
        ended_on: Option<&str>,
        next_league_year: Option<i32>,
    ) -> Result<SeasonDescriptor, StoreError> {
        let league = self.ensure_league(None, None)?;
        let Some(mut archived) = self.data.current.take() else {
            return Err(StoreError::Io {
                path: self.path.clone(),
                source: std::io::Error::new(
                    std::io::ErrorKind::InvalidData,
                    "cannot archive season; current season is undefined",
                ),
            });
        };
        archived.archived_on = Some(utcnow());
        archived.rollover_complete = true;
        archived.ended_on = ended_on.map(str::to_string);
        archived.artifacts = artifacts;
        let prev_year = archived.league_year;
        let prev_sequence = archived.sequence;
        self.data.seasons.push(archived);

        let next_year = next_league_year.unwrap_or(prev_year + 1);
        let descriptor = SeasonDescriptor {
            season_id: format!("{league}-{next_year}"),
            league_year: next_year,
            sequence: prev_sequence + 1,
            started_on: None,
            metadata: HashMap::new(),
            rollover_complete: false,
            created_at: utcnow(),
            archived_on: None,
            ended_on: None,
            artifacts: None,
        };
        self.data.current = Some(descriptor.clone());
        self.save()?;
        Ok(descriptor)
    }

    pub fn has_archived_season(&self, season_id: &str) -> bool {
        self.data.seasons.iter().any(|s| s.season_id == season_id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn slugs_are_filesystem_friendly() {
        assert_eq!(slugify_league_id("NexGen BBPro!"), "nexgen-bbpro");
        assert_eq!(slugify_league_id("  --  "), "league");
        assert_eq!(slugify_league_id("AL/NL 2025"), "al-nl-2025");
    }

    #[test]
    fn ensure_flow_builds_league_and_season() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("career_index.json");
        let mut ctx = SeasonContext::load(&path);
        let id = ctx.ensure_league(Some("Frontier League"), None).unwrap();
        assert_eq!(id, "frontier-league");
        let season = ctx.ensure_current_season(Some(2025), None, None).unwrap();
        assert_eq!(season.season_id, "frontier-league-2025");
        assert_eq!(season.sequence, 1);

        // Reload from disk and confirm persistence.
        let ctx2 = SeasonContext::load(&path);
        assert_eq!(ctx2.current_season_id(), Some("frontier-league-2025"));
    }

    #[test]
    fn archive_rolls_into_the_next_year() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("career_index.json");
        let mut ctx = SeasonContext::load(&path);
        ctx.ensure_league(Some("Test"), None).unwrap();
        ctx.ensure_current_season(Some(2025), Some("2025-04-01"), None).unwrap();
        let artifacts = HashMap::from([(
            "standings".to_string(),
            "careers/test-2025/standings.json".to_string(),
        )]);
        let next = ctx.archive_current_season(Some(artifacts), Some("2025-10-01"), None).unwrap();
        assert_eq!(next.league_year, 2026);
        assert_eq!(next.sequence, 2);
        assert!(ctx.has_archived_season("test-2025"));
        let archived = &ctx.data.seasons[0];
        assert!(archived.rollover_complete);
        assert_eq!(archived.ended_on.as_deref(), Some("2025-10-01"));
        assert!(archived.artifacts.is_some());
    }

    #[test]
    fn mark_season_started_is_first_write_wins() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("career_index.json");
        let mut ctx = SeasonContext::load(&path);
        ctx.ensure_current_season(Some(2025), None, None).unwrap();
        ctx.mark_season_started("2025-04-01").unwrap();
        ctx.mark_season_started("2025-05-01").unwrap();
        assert_eq!(
            ctx.data.current.as_ref().unwrap().started_on.as_deref(),
            Some("2025-04-01")
        );
    }
}

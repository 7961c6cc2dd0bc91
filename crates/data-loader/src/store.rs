//! In-memory history store.
//!
//! Holds every user's rated movies keyed by `MovieId`, so the
//! `(user, movie_id)` uniqueness the engine relies on is structural.
//! Each user carries a revision counter bumped on every mutation; callers
//! use it to tell whether a cached ranking is still current.

use crate::error::{DataLoadError, Result};
use crate::types::*;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap, HashSet};
use std::fs;
use std::path::Path;
use tracing::{debug, info};

/// What `upsert` did with an entry
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UpsertOutcome {
    Inserted,
    /// An entry for the same movie existed and was merged
    Updated,
}

#[derive(Debug, Default, Clone, Serialize, Deserialize)]
struct UserHistory {
    revision: u64,
    entries: BTreeMap<MovieId, HistoryEntry>,
}

/// Per-user viewing history
#[derive(Debug, Default, Serialize, Deserialize)]
pub struct HistoryStore {
    users: HashMap<UserId, UserHistory>,
}

impl HistoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Load a store persisted with `save_to_file`.
    ///
    /// A missing file yields an empty store; a file with out-of-range
    /// ratings is rejected.
    pub fn load_from_file(path: &Path) -> Result<Self> {
        if !path.exists() {
            debug!("No history file at {:?}, starting empty", path);
            return Ok(Self::new());
        }
        let content = fs::read_to_string(path)?;
        let store: HistoryStore = serde_json::from_str(&content)?;
        store.validate()?;

        let (users, entries) = store.counts();
        info!("Loaded {} history entries for {} users from {:?}", entries, users, path);
        Ok(store)
    }

    pub fn save_to_file(&self, path: &Path) -> Result<()> {
        let json = serde_json::to_string_pretty(self)?;
        fs::write(path, json)?;
        Ok(())
    }

    /// Insert an entry, or merge it into the existing entry for the same movie.
    ///
    /// Merging overwrites rating and watched date only when the incoming
    /// entry has them, and fills metadata the existing entry is missing.
    pub fn upsert(&mut self, user_id: UserId, entry: HistoryEntry) -> Result<UpsertOutcome> {
        if let Some(rating) = entry.rating
            && !is_valid_rating(rating)
        {
            return Err(DataLoadError::RatingOutOfRange {
                movie_id: entry.movie_id,
                rating,
            });
        }

        let history = self.users.entry(user_id).or_default();
        history.revision += 1;

        let outcome = match history.entries.get_mut(&entry.movie_id) {
            Some(existing) => {
                if entry.rating.is_some() {
                    existing.rating = entry.rating;
                }
                if entry.watched_date.is_some() {
                    existing.watched_date = entry.watched_date;
                }
                if existing.release_year.is_none() {
                    existing.release_year = entry.release_year;
                }
                if existing.genres.is_empty() {
                    existing.genres = entry.genres;
                }
                UpsertOutcome::Updated
            }
            None => {
                history.entries.insert(entry.movie_id, entry);
                UpsertOutcome::Inserted
            }
        };
        Ok(outcome)
    }

    /// Remove a movie from a user's history
    pub fn remove(&mut self, user_id: UserId, movie_id: MovieId) -> Option<HistoryEntry> {
        let history = self.users.get_mut(&user_id)?;
        let removed = history.entries.remove(&movie_id);
        if removed.is_some() {
            history.revision += 1;
        }
        removed
    }

    pub fn get(&self, user_id: UserId, movie_id: MovieId) -> Option<&HistoryEntry> {
        self.users.get(&user_id)?.entries.get(&movie_id)
    }

    /// Owned copy of a user's history, ordered by movie id.
    ///
    /// Empty for unknown users.
    pub fn snapshot(&self, user_id: UserId) -> Vec<HistoryEntry> {
        self.users
            .get(&user_id)
            .map(|h| h.entries.values().cloned().collect())
            .unwrap_or_default()
    }

    pub fn movie_ids(&self, user_id: UserId) -> HashSet<MovieId> {
        self.users
            .get(&user_id)
            .map(|h| h.entries.keys().copied().collect())
            .unwrap_or_default()
    }

    /// Mutation counter for a user; 0 for users never written to
    pub fn revision(&self, user_id: UserId) -> u64 {
        self.users.get(&user_id).map(|h| h.revision).unwrap_or(0)
    }

    pub fn len(&self, user_id: UserId) -> usize {
        self.users.get(&user_id).map(|h| h.entries.len()).unwrap_or(0)
    }

    /// (users, total entries)
    pub fn counts(&self) -> (usize, usize) {
        let entries = self.users.values().map(|h| h.entries.len()).sum();
        (self.users.len(), entries)
    }

    fn validate(&self) -> Result<()> {
        for history in self.users.values() {
            for entry in history.entries.values() {
                if let Some(rating) = entry.rating
                    && !is_valid_rating(rating)
                {
                    return Err(DataLoadError::RatingOutOfRange {
                        movie_id: entry.movie_id,
                        rating,
                    });
                }
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;

    fn create_test_store() -> HistoryStore {
        let mut store = HistoryStore::new();
        store
            .upsert(1, HistoryEntry::new(10, "Heat").with_rating(9.0))
            .unwrap();
        store
            .upsert(
                1,
                HistoryEntry::new(20, "Alien")
                    .with_rating(7.0)
                    .with_genres(["Horror"]),
            )
            .unwrap();
        store
            .upsert(2, HistoryEntry::new(10, "Heat").with_rating(4.0))
            .unwrap();
        store
    }

    #[test]
    fn test_upsert_and_snapshot() {
        let store = create_test_store();

        let snapshot = store.snapshot(1);
        assert_eq!(snapshot.len(), 2);
        assert_eq!(snapshot[0].movie_id, 10);
        assert_eq!(store.counts(), (2, 3));
        assert!(store.snapshot(99).is_empty());
    }

    #[test]
    fn test_upsert_merges_duplicate_movie() {
        let mut store = create_test_store();
        let date = NaiveDate::from_ymd_opt(2023, 5, 1).unwrap();

        // No rating in the update: the old rating survives
        let outcome = store
            .upsert(1, HistoryEntry::new(10, "Heat").with_watched_date(date))
            .unwrap();

        assert_eq!(outcome, UpsertOutcome::Updated);
        let entry = store.get(1, 10).unwrap();
        assert_eq!(entry.rating, Some(9.0));
        assert_eq!(entry.watched_date, Some(date));
        assert_eq!(store.len(1), 2);
    }

    #[test]
    fn test_upsert_rejects_out_of_range_rating() {
        let mut store = HistoryStore::new();
        let result = store.upsert(1, HistoryEntry::new(1, "Bad").with_rating(12.0));
        assert!(matches!(
            result,
            Err(DataLoadError::RatingOutOfRange { movie_id: 1, .. })
        ));
        assert_eq!(store.revision(1), 0);
    }

    #[test]
    fn test_revision_tracks_mutations() {
        let mut store = create_test_store();
        let before = store.revision(1);

        assert!(store.remove(1, 999).is_none());
        assert_eq!(store.revision(1), before);

        assert!(store.remove(1, 20).is_some());
        assert_eq!(store.revision(1), before + 1);
        assert_eq!(store.revision(2), 1);
    }

    #[test]
    fn test_save_and_load_round_trip() {
        let store = create_test_store();
        let path = std::env::temp_dir().join(format!("reel-recs-store-{}.json", std::process::id()));

        store.save_to_file(&path).unwrap();
        let loaded = HistoryStore::load_from_file(&path).unwrap();
        fs::remove_file(&path).ok();

        assert_eq!(loaded.counts(), store.counts());
        assert_eq!(loaded.get(1, 20).unwrap().genres[0].as_str(), "Horror");
    }

    #[test]
    fn test_load_missing_file_is_empty() {
        let path = Path::new("/nonexistent/reel-recs/history.json");
        let store = HistoryStore::load_from_file(path).unwrap();
        assert_eq!(store.counts(), (0, 0));
    }
}

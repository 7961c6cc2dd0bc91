//! Preference profiler
//!
//! Turns a history snapshot into a `UserProfile`: which genres the user
//! likes, how they rate, which decades they rate well and how often they
//! watch. The profile is rebuilt on every request and never mutated.
//!
//! ## Algorithm
//!
//! 1. Validate every entry (rating scale, unique ids), then require a
//!    minimum number of rated entries
//! 2. Partition rated entries into liked (rating >= threshold) and the rest
//! 3. Genre weights: count liked entries per genre, then amplify every
//!    genre whose count is above the mean count
//! 4. Rating mean and sample standard deviation
//! 5. Preferred decades: over dated entries with a release year, decades
//!    whose liked ratio beats the overall ratio
//! 6. Viewing frequency: dated entries per month of watching

use data_loader::{Genre, HistoryEntry, MovieId, decade_of, is_valid_rating};
use std::collections::{BTreeSet, HashMap, HashSet};
use thiserror::Error;
use tracing::{debug, instrument};

/// Default number of rated entries required before recommending
pub const DEFAULT_MIN_RATED_ENTRIES: usize = 5;

/// Default "liked" threshold on the 0-10 scale
pub const DEFAULT_LIKED_THRESHOLD: f32 = 8.0;

/// Default multiplier for genres above the mean weight
pub const DEFAULT_GENRE_AMPLIFICATION: f32 = 1.5;

const DAYS_PER_MONTH: f32 = 30.4375;

#[derive(Error, Debug, Clone, PartialEq)]
pub enum ProfileError {
    #[error("Insufficient history: {rated} rated movies, at least {required} required")]
    InsufficientHistory { rated: usize, required: usize },

    #[error("Rating {rating} for movie {movie_id} is outside the 0-10 scale")]
    InvalidRating { movie_id: MovieId, rating: f32 },

    #[error("Movie {movie_id} appears more than once in the history")]
    DuplicateEntry { movie_id: MovieId },
}

/// Derived taste profile for one user
#[derive(Debug, Clone, PartialEq)]
pub struct UserProfile {
    /// Relative weight per genre; genres absent from the map weigh 0
    pub genre_weights: HashMap<Genre, f32>,
    pub avg_rating: f32,
    pub rating_stddev: f32,
    /// Decade buckets (1990 = the 1990s) the user rates disproportionately well
    pub preferred_decades: BTreeSet<u16>,
    /// Dated entries per month
    pub viewing_frequency: f32,
    pub rated_count: usize,
    pub liked_count: usize,
}

impl UserProfile {
    pub fn genre_weight(&self, genre: &Genre) -> f32 {
        self.genre_weights.get(genre).copied().unwrap_or(0.0)
    }

    /// Strongest genres first; equal weights ordered by label
    pub fn top_genres(&self, n: usize) -> Vec<(Genre, f32)> {
        let mut ranked: Vec<(Genre, f32)> = self
            .genre_weights
            .iter()
            .filter(|(_, w)| **w > 0.0)
            .map(|(g, w)| (g.clone(), *w))
            .collect();
        ranked.sort_by(|a, b| b.1.total_cmp(&a.1).then_with(|| a.0.cmp(&b.0)));
        ranked.truncate(n);
        ranked
    }

    /// Sum of the `k` largest genre weights
    pub fn top_weight_sum(&self, k: usize) -> f32 {
        let mut weights: Vec<f32> = self.genre_weights.values().copied().collect();
        weights.sort_by(|a, b| b.total_cmp(a));
        weights.iter().take(k).sum()
    }

    pub fn prefers_decade(&self, decade: u16) -> bool {
        self.preferred_decades.contains(&decade)
    }
}

/// Builds `UserProfile`s from history snapshots
///
/// ## Design Note
/// The thresholds are policy, not constants, so they are configurable
/// with builder-style setters.
#[derive(Debug, Clone)]
pub struct PreferenceProfiler {
    min_rated_entries: usize,
    liked_threshold: f32,
    genre_amplification: f32,
}

impl Default for PreferenceProfiler {
    fn default() -> Self {
        Self::new()
    }
}

impl PreferenceProfiler {
    pub fn new() -> Self {
        Self {
            min_rated_entries: DEFAULT_MIN_RATED_ENTRIES,
            liked_threshold: DEFAULT_LIKED_THRESHOLD,
            genre_amplification: DEFAULT_GENRE_AMPLIFICATION,
        }
    }

    /// Configure the minimum number of rated entries (default: 5)
    pub fn with_min_rated_entries(mut self, min: usize) -> Self {
        self.min_rated_entries = min;
        self
    }

    /// Configure the liked threshold on the 0-10 scale (default: 8.0)
    pub fn with_liked_threshold(mut self, threshold: f32) -> Self {
        self.liked_threshold = threshold;
        self
    }

    /// Configure the multiplier for above-mean genres (default: 1.5)
    pub fn with_genre_amplification(mut self, factor: f32) -> Self {
        self.genre_amplification = factor;
        self
    }

    pub fn min_rated_entries(&self) -> usize {
        self.min_rated_entries
    }

    /// Build a profile from a history snapshot
    #[instrument(skip(self, history), fields(entries = history.len()))]
    pub fn build(&self, history: &[HistoryEntry]) -> Result<UserProfile, ProfileError> {
        self.validate(history)?;

        let rated: Vec<(&HistoryEntry, f32)> = history
            .iter()
            .filter_map(|entry| entry.rating.map(|r| (entry, r)))
            .collect();

        if rated.len() < self.min_rated_entries {
            return Err(ProfileError::InsufficientHistory {
                rated: rated.len(),
                required: self.min_rated_entries,
            });
        }

        let liked: Vec<&HistoryEntry> = rated
            .iter()
            .filter(|(_, r)| *r >= self.liked_threshold)
            .map(|(entry, _)| *entry)
            .collect();

        let ratings: Vec<f32> = rated.iter().map(|(_, r)| *r).collect();
        let (avg_rating, rating_stddev) = mean_and_stddev(&ratings);

        let profile = UserProfile {
            genre_weights: self.compute_genre_weights(&liked),
            avg_rating,
            rating_stddev,
            preferred_decades: self.compute_preferred_decades(&rated),
            viewing_frequency: compute_viewing_frequency(history),
            rated_count: rated.len(),
            liked_count: liked.len(),
        };

        debug!(
            "Built profile: {} rated, {} liked, {} genres, {} preferred decades",
            profile.rated_count,
            profile.liked_count,
            profile.genre_weights.len(),
            profile.preferred_decades.len()
        );

        Ok(profile)
    }

    /// Invalid ratings are reported before duplicates
    fn validate(&self, history: &[HistoryEntry]) -> Result<(), ProfileError> {
        for entry in history {
            if let Some(rating) = entry.rating
                && !is_valid_rating(rating)
            {
                return Err(ProfileError::InvalidRating {
                    movie_id: entry.movie_id,
                    rating,
                });
            }
        }

        let mut seen = HashSet::with_capacity(history.len());
        for entry in history {
            if !seen.insert(entry.movie_id) {
                return Err(ProfileError::DuplicateEntry {
                    movie_id: entry.movie_id,
                });
            }
        }
        Ok(())
    }

    fn compute_genre_weights(&self, liked: &[&HistoryEntry]) -> HashMap<Genre, f32> {
        let mut counts: HashMap<Genre, f32> = HashMap::new();
        for entry in liked {
            for genre in &entry.genres {
                *counts.entry(genre.clone()).or_insert(0.0) += 1.0;
            }
        }

        if counts.is_empty() {
            return counts;
        }

        // Counts are whole numbers, so the sum is exact in any order
        let mean = counts.values().sum::<f32>() / counts.len() as f32;
        for weight in counts.values_mut() {
            if *weight > mean {
                *weight *= self.genre_amplification;
            }
        }
        counts
    }

    fn compute_preferred_decades(&self, rated: &[(&HistoryEntry, f32)]) -> BTreeSet<u16> {
        // decade -> (liked, total)
        let mut stats: HashMap<u16, (u32, u32)> = HashMap::new();
        for (entry, rating) in rated {
            // Undated entries take no part in recency weighting
            if entry.watched_date.is_none() {
                continue;
            }
            if let Some(year) = entry.release_year {
                let slot = stats.entry(decade_of(year)).or_insert((0, 0));
                if *rating >= self.liked_threshold {
                    slot.0 += 1;
                }
                slot.1 += 1;
            }
        }

        let (liked_total, total) = stats
            .values()
            .fold((0u32, 0u32), |acc, (l, t)| (acc.0 + l, acc.1 + t));
        if total == 0 {
            return BTreeSet::new();
        }
        let overall_ratio = liked_total as f32 / total as f32;

        stats
            .into_iter()
            .filter(|(_, (liked, count))| *liked as f32 / *count as f32 > overall_ratio)
            .map(|(decade, _)| decade)
            .collect()
    }
}

/// Build a profile with the default policy
pub fn build_profile(history: &[HistoryEntry]) -> Result<UserProfile, ProfileError> {
    PreferenceProfiler::new().build(history)
}

fn mean_and_stddev(values: &[f32]) -> (f32, f32) {
    if values.is_empty() {
        return (0.0, 0.0);
    }
    let n = values.len() as f32;
    let mean = values.iter().sum::<f32>() / n;
    if values.len() < 2 {
        return (mean, 0.0);
    }
    let variance = values.iter().map(|v| (v - mean).powi(2)).sum::<f32>() / (n - 1.0);
    (mean, variance.sqrt())
}

fn compute_viewing_frequency(history: &[HistoryEntry]) -> f32 {
    let dates: Vec<_> = history.iter().filter_map(|e| e.watched_date).collect();
    if dates.len() < 2 {
        return 0.0;
    }

    let (Some(first), Some(last)) = (dates.iter().min(), dates.iter().max()) else {
        return 0.0;
    };
    let months = ((*last - *first).num_days() as f32 / DAYS_PER_MONTH).max(1.0);
    dates.len() as f32 / months
}

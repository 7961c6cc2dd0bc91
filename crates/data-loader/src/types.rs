//! Core domain types shared by every crate in the workspace.
//!
//! - `HistoryEntry`: one watched (and usually rated) movie
//! - `CandidateMovie`: provider metadata for a movie that could be recommended
//! - `ImportedMovie`: a CSV row before it has been resolved to a `MovieId`
//! - `Genre`: a validated genre label

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use std::fmt;

// =============================================================================
// Type Aliases
// =============================================================================

/// Unique identifier for a user of the service
pub type UserId = u32;

/// Stable external identifier of a movie (the metadata provider's key)
pub type MovieId = u32;

// =============================================================================
// Rating scale
// =============================================================================

/// Lower bound of the canonical rating scale
pub const MIN_RATING: f32 = 0.0;

/// Upper bound of the canonical rating scale
pub const MAX_RATING: f32 = 10.0;

/// Whether a rating lies on the canonical 0-10 scale.
///
/// NaN and infinities are never valid.
pub fn is_valid_rating(rating: f32) -> bool {
    rating.is_finite() && (MIN_RATING..=MAX_RATING).contains(&rating)
}

/// Decade bucket for a release year (1994 -> 1990)
pub fn decade_of(year: u16) -> u16 {
    year / 10 * 10
}

// =============================================================================
// Genre
// =============================================================================

/// A genre label as used by the metadata provider.
///
/// Labels are trimmed and a handful of spellings used by third-party
/// exports are folded onto the provider's spelling, so "Sci-Fi" from an
/// IMDb export and "Science Fiction" from the catalog compare equal.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct Genre(String);

const GENRE_ALIASES: &[(&str, &str)] = &[
    ("Sci-Fi", "Science Fiction"),
    ("SciFi", "Science Fiction"),
    ("Musical", "Music"),
    ("Children's", "Family"),
    ("Children", "Family"),
    ("Film-Noir", "Film Noir"),
];

impl Genre {
    /// Build a genre from a raw label. Returns `None` for blank labels.
    pub fn new(label: &str) -> Option<Self> {
        let trimmed = label.trim();
        if trimmed.is_empty() {
            return None;
        }
        let canonical = GENRE_ALIASES
            .iter()
            .find(|(alias, _)| alias.eq_ignore_ascii_case(trimmed))
            .map(|(_, canonical)| *canonical)
            .unwrap_or(trimmed);
        Some(Genre(canonical.to_string()))
    }

    /// Split a delimited list of labels ("Action|Comedy", "Drama, Crime").
    ///
    /// Blank labels are skipped and duplicates are dropped, keeping the
    /// first occurrence so the list stays ordered.
    pub fn parse_list(s: &str, separator: char) -> Vec<Genre> {
        let mut genres: Vec<Genre> = Vec::new();
        for genre in s.split(separator).filter_map(Genre::new) {
            if !genres.contains(&genre) {
                genres.push(genre);
            }
        }
        genres
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for Genre {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl TryFrom<String> for Genre {
    type Error = String;

    fn try_from(value: String) -> std::result::Result<Self, Self::Error> {
        Genre::new(&value).ok_or_else(|| "genre label must not be blank".to_string())
    }
}

impl From<Genre> for String {
    fn from(genre: Genre) -> Self {
        genre.0
    }
}

// =============================================================================
// History
// =============================================================================

/// One watched-and-rated movie in a user's history.
///
/// `rating` is on the canonical 0-10 scale. Ingestion converts other
/// scales before an entry is built, the engine never rescales.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HistoryEntry {
    pub movie_id: MovieId,
    /// Display title; not used for scoring
    pub title: String,
    /// `None` for movies marked watched without a rating
    pub rating: Option<f32>,
    pub watched_date: Option<NaiveDate>,
    pub release_year: Option<u16>,
    /// Empty when the metadata lookup failed. Such entries still count
    /// towards rating statistics.
    #[serde(default)]
    pub genres: Vec<Genre>,
}

impl HistoryEntry {
    pub fn new(movie_id: MovieId, title: impl Into<String>) -> Self {
        Self {
            movie_id,
            title: title.into(),
            rating: None,
            watched_date: None,
            release_year: None,
            genres: Vec::new(),
        }
    }

    pub fn with_rating(mut self, rating: f32) -> Self {
        self.rating = Some(rating);
        self
    }

    pub fn with_watched_date(mut self, date: NaiveDate) -> Self {
        self.watched_date = Some(date);
        self
    }

    pub fn with_release_year(mut self, year: u16) -> Self {
        self.release_year = Some(year);
        self
    }

    pub fn with_genres<I, S>(mut self, genres: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        self.genres = genres
            .into_iter()
            .filter_map(|g| Genre::new(g.as_ref()))
            .collect();
        self
    }
}

// =============================================================================
// Candidates
// =============================================================================

/// Metadata record for a movie supplied by the metadata provider.
///
/// Only movies absent from the user's history become candidates, but the
/// same record is returned when a single id is resolved.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CandidateMovie {
    pub movie_id: MovieId,
    pub title: String,
    /// Missing genres deserialize as an empty list
    #[serde(default)]
    pub genres: Vec<Genre>,
    /// Provider popularity, non-negative. Only meaningful relative to
    /// other candidates in the same pool.
    pub popularity: f32,
    pub release_year: Option<u16>,
    /// Provider quality signal on the 0-10 scale
    pub vote_average: Option<f32>,
    pub overview: Option<String>,
}

impl CandidateMovie {
    pub fn new(movie_id: MovieId, title: impl Into<String>, popularity: f32) -> Self {
        Self {
            movie_id,
            title: title.into(),
            genres: Vec::new(),
            popularity,
            release_year: None,
            vote_average: None,
            overview: None,
        }
    }

    pub fn with_genres<I, S>(mut self, genres: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        self.genres = genres
            .into_iter()
            .filter_map(|g| Genre::new(g.as_ref()))
            .collect();
        self
    }

    pub fn with_release_year(mut self, year: u16) -> Self {
        self.release_year = Some(year);
        self
    }

    pub fn with_vote_average(mut self, vote_average: f32) -> Self {
        self.vote_average = Some(vote_average);
        self
    }

    pub fn decade(&self) -> Option<u16> {
        self.release_year.map(decade_of)
    }
}

// =============================================================================
// Import rows
// =============================================================================

/// A row read from a CSV export, already on the canonical rating scale.
///
/// Letterboxd and IMDb exports carry no provider id, so `movie_id` stays
/// `None` until enrichment resolves the title.
#[derive(Debug, Clone, PartialEq)]
pub struct ImportedMovie {
    /// 1-based line number in the source file
    pub line: usize,
    pub movie_id: Option<MovieId>,
    pub title: String,
    pub release_year: Option<u16>,
    pub rating: Option<f32>,
    pub watched_date: Option<NaiveDate>,
    pub genres: Vec<Genre>,
}

impl ImportedMovie {
    /// A hand-entered movie, identified by title only
    pub fn manual(title: impl Into<String>) -> Self {
        Self {
            line: 0,
            movie_id: None,
            title: title.into(),
            release_year: None,
            rating: None,
            watched_date: None,
            genres: Vec::new(),
        }
    }

    /// Turn the row into a history entry once its id is known.
    pub fn into_entry(self, movie_id: MovieId) -> HistoryEntry {
        HistoryEntry {
            movie_id,
            title: self.title,
            rating: self.rating,
            watched_date: self.watched_date,
            release_year: self.release_year,
            genres: self.genres,
        }
    }
}

//! Content-based scoring of candidates against a user profile.
//!
//! Every candidate gets four signals in [0, 1]:
//!
//! - **genre_match**: profile weight of the candidate's genres, relative to
//!   the best weight the user could give that many genres
//! - **rating_similarity**: how close the candidate's quality signal is to
//!   the user's average rating
//! - **popularity_score**: popularity relative to the most popular
//!   candidate in the same pool
//! - **recency_bonus**: 1.0 when the release decade is one the user prefers
//!
//! The weighted sum is clipped to [0, 1] and scaled to 0-100.
//!
//! ## Performance Note
//! Scoring is pure, so `score_all` fans out over the pool with Rayon.

use data_loader::{CandidateMovie, Genre, MovieId};
use rayon::prelude::*;
use serde::{Serialize, Serializer};
use sources::UserProfile;
use std::collections::BTreeSet;
use thiserror::Error;

/// Tolerance when checking that weights sum to 1
const WEIGHT_TOLERANCE: f64 = 0.001;

/// Number of matching genres named in a genre reasoning
const REASONING_GENRES: usize = 3;

#[derive(Error, Debug, Clone, PartialEq)]
pub enum ScoringError {
    #[error("Scoring weights must be non-negative and sum to 1.0 (sum is {sum:.3})")]
    InvalidWeights { sum: f64 },
}

/// Relative importance of the four scoring signals
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct ScoringWeights {
    pub genre: f64,
    pub rating: f64,
    pub popularity: f64,
    pub recency: f64,
}

impl Default for ScoringWeights {
    fn default() -> Self {
        Self {
            genre: 0.4,
            rating: 0.3,
            popularity: 0.2,
            recency: 0.1,
        }
    }
}

impl ScoringWeights {
    pub fn new(genre: f64, rating: f64, popularity: f64, recency: f64) -> Result<Self, ScoringError> {
        let weights = Self {
            genre,
            rating,
            popularity,
            recency,
        };
        if weights.is_valid() {
            Ok(weights)
        } else {
            Err(ScoringError::InvalidWeights { sum: weights.sum() })
        }
    }

    pub fn sum(&self) -> f64 {
        self.genre + self.rating + self.popularity + self.recency
    }

    /// Validate that every weight is non-negative and they sum to 1.0
    pub fn is_valid(&self) -> bool {
        let all = [self.genre, self.rating, self.popularity, self.recency];
        all.iter().all(|w| w.is_finite() && *w >= 0.0) && (self.sum() - 1.0).abs() < WEIGHT_TOLERANCE
    }
}

/// The signal a recommendation is explained by
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScoreTerm {
    Genre,
    Rating,
    Popularity,
    Recency,
}

/// Individual signals behind a score, each in [0, 1]
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize)]
pub struct ScoreBreakdown {
    pub genre_match: f64,
    pub rating_similarity: f64,
    pub popularity_score: f64,
    pub recency_bonus: f64,
}

impl ScoreBreakdown {
    /// Weighted contribution of each signal, in tie-break order
    pub fn contributions(&self, weights: &ScoringWeights) -> [(ScoreTerm, f64); 4] {
        [
            (ScoreTerm::Genre, self.genre_match * weights.genre),
            (ScoreTerm::Rating, self.rating_similarity * weights.rating),
            (ScoreTerm::Popularity, self.popularity_score * weights.popularity),
            (ScoreTerm::Recency, self.recency_bonus * weights.recency),
        ]
    }

    /// The largest contribution; earlier terms win ties
    pub fn dominant(&self, weights: &ScoringWeights) -> Option<ScoreTerm> {
        let mut best: Option<(ScoreTerm, f64)> = None;
        for (term, value) in self.contributions(weights) {
            if value > best.map_or(0.0, |(_, v)| v) {
                best = Some((term, value));
            }
        }
        best.map(|(term, _)| term)
    }
}

/// A scored candidate.
///
/// Serializes to the presentation shape
/// `{movie_id, title, year, genres, score, reasoning}` with the score
/// rounded to one decimal.
#[derive(Debug, Clone, PartialEq)]
pub struct Recommendation {
    pub movie: CandidateMovie,
    /// 0-100
    pub score: f64,
    pub reasoning: String,
    pub breakdown: ScoreBreakdown,
}

impl Recommendation {
    pub fn display_score(&self) -> f64 {
        (self.score * 10.0).round() / 10.0
    }
}

#[derive(Serialize)]
struct RecommendationView<'a> {
    movie_id: MovieId,
    title: &'a str,
    year: Option<u16>,
    genres: &'a [Genre],
    score: f64,
    reasoning: &'a str,
}

impl Serialize for Recommendation {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        RecommendationView {
            movie_id: self.movie.movie_id,
            title: &self.movie.title,
            year: self.movie.release_year,
            genres: &self.movie.genres,
            score: self.display_score(),
            reasoning: &self.reasoning,
        }
        .serialize(serializer)
    }
}

/// Scores candidates from one pool.
///
/// ## Design Note
/// Popularity is only meaningful relative to the pool, so the pool's
/// maximum is captured up front. After that `score` depends on nothing but
/// its two arguments.
#[derive(Debug, Clone)]
pub struct Scorer {
    weights: ScoringWeights,
    max_popularity: f64,
}

impl Scorer {
    pub fn new(weights: ScoringWeights, max_popularity: f64) -> Self {
        Self {
            weights,
            max_popularity,
        }
    }

    /// Build a scorer normalizing popularity against `pool`
    pub fn for_pool(weights: ScoringWeights, pool: &[CandidateMovie]) -> Self {
        let max_popularity = pool
            .iter()
            .map(|m| m.popularity as f64)
            .filter(|p| p.is_finite())
            .fold(0.0, f64::max);
        Self::new(weights, max_popularity)
    }

    pub fn weights(&self) -> &ScoringWeights {
        &self.weights
    }

    pub fn max_popularity(&self) -> f64 {
        self.max_popularity
    }

    /// Score every candidate in parallel, keeping pool order
    pub fn score_all(&self, profile: &UserProfile, pool: &[CandidateMovie]) -> Vec<Recommendation> {
        pool.par_iter()
            .map(|candidate| self.score(profile, candidate))
            .collect()
    }

    pub fn score(&self, profile: &UserProfile, candidate: &CandidateMovie) -> Recommendation {
        let breakdown = self.breakdown(profile, candidate);

        let total: f64 = breakdown
            .contributions(&self.weights)
            .iter()
            .map(|(_, value)| value)
            .sum();
        let total = if total.is_finite() { total.clamp(0.0, 1.0) } else { 0.0 };

        Recommendation {
            movie: candidate.clone(),
            score: total * 100.0,
            reasoning: self.reasoning(&breakdown, profile, candidate),
            breakdown,
        }
    }

    pub fn breakdown(&self, profile: &UserProfile, candidate: &CandidateMovie) -> ScoreBreakdown {
        let popularity_score = self.popularity_score(candidate);
        ScoreBreakdown {
            genre_match: genre_match(profile, candidate),
            rating_similarity: rating_similarity(profile, candidate, popularity_score),
            popularity_score,
            recency_bonus: match candidate.decade() {
                Some(decade) if profile.prefers_decade(decade) => 1.0,
                _ => 0.0,
            },
        }
    }

    fn popularity_score(&self, candidate: &CandidateMovie) -> f64 {
        let popularity = candidate.popularity as f64;
        if self.max_popularity <= 0.0 || !popularity.is_finite() {
            return 0.0;
        }
        (popularity / self.max_popularity).clamp(0.0, 1.0)
    }

    fn reasoning(&self, breakdown: &ScoreBreakdown, profile: &UserProfile, candidate: &CandidateMovie) -> String {
        match breakdown.dominant(&self.weights) {
            Some(ScoreTerm::Genre) => {
                let mut matching: Vec<(&Genre, f32)> = distinct_genres(candidate)
                    .into_iter()
                    .map(|g| (g, profile.genre_weight(g)))
                    .filter(|(_, w)| *w > 0.0)
                    .collect();
                matching.sort_by(|a, b| b.1.total_cmp(&a.1).then_with(|| a.0.cmp(b.0)));
                let names: Vec<&str> = matching
                    .iter()
                    .take(REASONING_GENRES)
                    .map(|(g, _)| g.as_str())
                    .collect();
                format!("Strong genre match with your favorite genres ({})", names.join(", "))
            }
            Some(ScoreTerm::Rating) => format!(
                "Critically rated close to your average rating of {:.1}/10",
                profile.avg_rating
            ),
            Some(ScoreTerm::Popularity) => "Popular pick among current releases".to_string(),
            Some(ScoreTerm::Recency) => match candidate.decade() {
                Some(decade) => format!("From the {}s, a decade you rate highly", decade),
                None => "From a decade you rate highly".to_string(),
            },
            None => "Worth a look based on your viewing history".to_string(),
        }
    }
}

fn distinct_genres(candidate: &CandidateMovie) -> BTreeSet<&Genre> {
    candidate.genres.iter().collect()
}

/// Matched weight over the best weight sum the user could give as many
/// genres as the candidate has
fn genre_match(profile: &UserProfile, candidate: &CandidateMovie) -> f64 {
    let genres = distinct_genres(candidate);
    if genres.is_empty() {
        return 0.0;
    }

    let matched: f32 = genres.iter().map(|g| profile.genre_weight(g)).sum();
    let best = profile.top_weight_sum(genres.len());
    if best <= 0.0 {
        return 0.0;
    }
    (matched as f64 / best as f64).clamp(0.0, 1.0)
}

/// The candidate has no personal rating, so its vote average stands in,
/// or its relative popularity on the 0-10 scale when there is none
fn rating_similarity(profile: &UserProfile, candidate: &CandidateMovie, popularity_score: f64) -> f64 {
    let proxy = candidate
        .vote_average
        .map(|v| v as f64)
        .unwrap_or(popularity_score * 10.0);
    (1.0 - (proxy - profile.avg_rating as f64).abs() / 10.0).clamp(0.0, 1.0)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn create_test_profile() -> UserProfile {
        let mut genre_weights = HashMap::new();
        genre_weights.insert(Genre::new("Comedy").unwrap(), 6.0);
        genre_weights.insert(Genre::new("Drama").unwrap(), 2.0);
        genre_weights.insert(Genre::new("Romance").unwrap(), 2.0);

        UserProfile {
            genre_weights,
            avg_rating: 8.0,
            rating_stddev: 1.0,
            preferred_decades: [1990].into_iter().collect(),
            viewing_frequency: 2.0,
            rated_count: 10,
            liked_count: 6,
        }
    }

    #[test]
    fn test_default_weights_are_valid() {
        assert!(ScoringWeights::default().is_valid());
        assert!(ScoringWeights::new(0.5, 0.5, 0.0, 0.0).is_ok());
        assert_eq!(
            ScoringWeights::new(0.5, 0.5, 0.5, 0.0),
            Err(ScoringError::InvalidWeights { sum: 1.5 })
        );
        assert!(ScoringWeights::new(1.2, -0.2, 0.0, 0.0).is_err());
    }

    #[test]
    fn test_genre_match_is_relative_to_best_genres() {
        let profile = create_test_profile();

        let comedy = CandidateMovie::new(1, "A", 1.0).with_genres(["Comedy"]);
        let drama = CandidateMovie::new(2, "B", 1.0).with_genres(["Drama"]);
        let both = CandidateMovie::new(3, "C", 1.0).with_genres(["Comedy", "Drama"]);
        let none = CandidateMovie::new(4, "D", 1.0).with_genres(["Horror"]);
        let untagged = CandidateMovie::new(5, "E", 1.0);

        assert_eq!(genre_match(&profile, &comedy), 1.0);
        assert!((genre_match(&profile, &drama) - 2.0 / 6.0).abs() < 1e-9);
        assert_eq!(genre_match(&profile, &both), 1.0);
        assert_eq!(genre_match(&profile, &none), 0.0);
        assert_eq!(genre_match(&profile, &untagged), 0.0);
    }

    #[test]
    fn test_rating_similarity_uses_vote_average() {
        let profile = create_test_profile();
        let voted = CandidateMovie::new(1, "A", 1.0).with_vote_average(6.0);

        assert!((rating_similarity(&profile, &voted, 1.0) - 0.8).abs() < 1e-9);

        // No vote average: relative popularity on the 0-10 scale
        let unvoted = CandidateMovie::new(2, "B", 1.0);
        assert!((rating_similarity(&profile, &unvoted, 0.5) - 0.7).abs() < 1e-9);
    }

    #[test]
    fn test_score_bounds_and_breakdown() {
        let profile = create_test_profile();
        let pool = vec![
            CandidateMovie::new(1, "Perfect", 50.0)
                .with_genres(["Comedy"])
                .with_vote_average(8.0)
                .with_release_year(1994),
            CandidateMovie::new(2, "Nothing", 0.0)
                .with_genres(["Horror"])
                .with_vote_average(0.0),
        ];
        let scorer = Scorer::for_pool(ScoringWeights::default(), &pool);
        assert_eq!(scorer.max_popularity(), 50.0);

        let best = scorer.score(&profile, &pool[0]);
        assert!((best.score - 100.0).abs() < 1e-9);

        let worst = scorer.score(&profile, &pool[1]);
        assert_eq!(worst.breakdown.genre_match, 0.0);
        assert_eq!(worst.breakdown.popularity_score, 0.0);
        assert!((worst.breakdown.rating_similarity - 0.2).abs() < 1e-9);
        assert!(worst.score >= 0.0 && worst.score <= 100.0);
    }

    #[test]
    fn test_zero_popularity_pool() {
        let profile = create_test_profile();
        let pool = vec![CandidateMovie::new(1, "Obscure", 0.0).with_genres(["Drama"])];
        let scorer = Scorer::for_pool(ScoringWeights::default(), &pool);

        let rec = scorer.score(&profile, &pool[0]);
        assert_eq!(rec.breakdown.popularity_score, 0.0);
        assert!(rec.score.is_finite());
    }

    #[test]
    fn test_reasoning_names_dominant_term() {
        let profile = create_test_profile();
        let pool = vec![
            CandidateMovie::new(1, "Funny", 10.0).with_genres(["Romance", "Comedy"]),
            CandidateMovie::new(2, "Big", 100.0).with_vote_average(2.0),
            CandidateMovie::new(3, "Solid", 1.0).with_vote_average(8.0),
        ];
        let scorer = Scorer::for_pool(ScoringWeights::default(), &pool);

        let funny = scorer.score(&profile, &pool[0]);
        assert_eq!(
            funny.reasoning,
            "Strong genre match with your favorite genres (Comedy, Romance)"
        );

        let big = scorer.score(&profile, &pool[1]);
        assert_eq!(big.reasoning, "Popular pick among current releases");

        let solid = scorer.score(&profile, &pool[2]);
        assert_eq!(
            solid.reasoning,
            "Critically rated close to your average rating of 8.0/10"
        );
    }

    #[test]
    fn test_recency_reasoning() {
        let profile = create_test_profile();
        let weights = ScoringWeights::new(0.0, 0.0, 0.0, 1.0).unwrap();
        let movie = CandidateMovie::new(1, "Nineties", 1.0).with_release_year(1997);

        let rec = Scorer::new(weights, 1.0).score(&profile, &movie);
        assert_eq!(rec.reasoning, "From the 1990s, a decade you rate highly");
        assert_eq!(rec.score, 100.0);
    }

    #[test]
    fn test_score_is_deterministic() {
        let profile = create_test_profile();
        let movie = CandidateMovie::new(1, "Repeat", 3.0).with_genres(["Drama", "Comedy"]);
        let scorer = Scorer::new(ScoringWeights::default(), 10.0);

        assert_eq!(scorer.score(&profile, &movie), scorer.score(&profile, &movie));
    }

    #[test]
    fn test_serializes_presentation_shape() {
        let profile = create_test_profile();
        let movie = CandidateMovie::new(42, "Heat", 3.0)
            .with_genres(["Crime"])
            .with_release_year(1995);
        let rec = Scorer::new(ScoringWeights::default(), 9.0).score(&profile, &movie);

        let json = serde_json::to_value(&rec).unwrap();
        assert_eq!(json["movie_id"], 42);
        assert_eq!(json["title"], "Heat");
        assert_eq!(json["year"], 1995);
        assert_eq!(json["genres"][0], "Crime");
        assert_eq!(json["score"].as_f64().unwrap(), rec.display_score());
        assert!(json.get("breakdown").is_none());
    }
}

//! # Recommendation Engine
//!
//! This module coordinates one recommendation request:
//! 1. Build the user's profile from the history snapshot
//! 2. Build the candidate pool, excluding everything already watched
//! 3. Score every candidate (parallel, on the blocking pool)
//! 4. Rank: score, then popularity, then movie id
//! 5. Return the top N, or the full ranking for paging
//!
//! The engine keeps no state between calls. Everything it needs arrives
//! with the request or comes from the metadata provider.

use std::collections::HashSet;
use std::sync::Arc;
use std::time::Instant;

use thiserror::Error;
use tracing::{debug, info, instrument};

use crate::config::{ConfigError, EngineConfig};
use data_loader::{HistoryEntry, MovieId};
use pipeline::{
    CandidatePoolBuilder, PoolError, RankedRecommendations, Recommendation, Scorer, ScoringWeights,
};
use sources::{MetadataProvider, PreferenceProfiler, ProfileError, UserProfile};

/// Errors surfaced by a recommendation request
#[derive(Error, Debug)]
pub enum RecommendError {
    #[error("Insufficient history: {rated} rated movies, at least {required} required")]
    InsufficientHistory { rated: usize, required: usize },

    #[error("Rating {rating} for movie {movie_id} is outside the 0-10 scale")]
    InvalidRating { movie_id: MovieId, rating: f32 },

    #[error("Movie {movie_id} appears more than once in the history")]
    DuplicateEntry { movie_id: MovieId },

    #[error("Metadata provider '{provider}' unavailable: {reason}")]
    ProviderUnavailable { provider: String, reason: String },

    #[error("Candidate filtering failed: {0}")]
    Filter(anyhow::Error),

    #[error("Recommendation worker failed: {0}")]
    Worker(String),
}

impl From<ProfileError> for RecommendError {
    fn from(error: ProfileError) -> Self {
        match error {
            ProfileError::InsufficientHistory { rated, required } => {
                RecommendError::InsufficientHistory { rated, required }
            }
            ProfileError::InvalidRating { movie_id, rating } => {
                RecommendError::InvalidRating { movie_id, rating }
            }
            ProfileError::DuplicateEntry { movie_id } => RecommendError::DuplicateEntry { movie_id },
        }
    }
}

impl From<PoolError> for RecommendError {
    fn from(error: PoolError) -> Self {
        match error {
            PoolError::ProviderUnavailable { provider, reason } => {
                RecommendError::ProviderUnavailable { provider, reason }
            }
            PoolError::Filter(e) => RecommendError::Filter(e),
            PoolError::Worker(e) => RecommendError::Worker(e.to_string()),
        }
    }
}

impl From<tokio::task::JoinError> for RecommendError {
    fn from(error: tokio::task::JoinError) -> Self {
        RecommendError::Worker(error.to_string())
    }
}

/// Content-based recommendation engine over a metadata provider
pub struct RecommendationEngine<P> {
    profiler: PreferenceProfiler,
    pool_builder: CandidatePoolBuilder<P>,
    weights: ScoringWeights,
    pool_limit: usize,
    default_count: usize,
}

impl<P: MetadataProvider + 'static> RecommendationEngine<P> {
    /// Create an engine with the default policy
    pub fn new(provider: P) -> Self {
        Self {
            profiler: PreferenceProfiler::new(),
            pool_builder: CandidatePoolBuilder::new(provider),
            weights: ScoringWeights::default(),
            pool_limit: pipeline::pool::DEFAULT_POOL_LIMIT,
            default_count: 10,
        }
    }

    /// Create an engine from a validated configuration
    pub fn from_config(provider: P, config: &EngineConfig) -> Result<Self, ConfigError> {
        config.validate()?;

        let profiler = PreferenceProfiler::new()
            .with_min_rated_entries(config.min_rated_entries)
            .with_liked_threshold(config.liked_threshold)
            .with_genre_amplification(config.genre_amplification);
        let pool_builder = CandidatePoolBuilder::new(provider)
            .with_page_concurrency(config.page_concurrency)
            .with_max_pages(config.max_pages);

        Ok(Self {
            profiler,
            pool_builder,
            weights: config.weights()?,
            pool_limit: config.pool_limit,
            default_count: config.default_count,
        })
    }

    /// Configure the profiler policy
    pub fn with_profiler(mut self, profiler: PreferenceProfiler) -> Self {
        self.profiler = profiler;
        self
    }

    /// Configure the scoring weights
    pub fn with_weights(mut self, weights: ScoringWeights) -> Self {
        self.weights = weights;
        self
    }

    /// Configure the pool size cap (default: 1000)
    pub fn with_pool_limit(mut self, limit: usize) -> Self {
        self.pool_limit = limit;
        self
    }

    pub fn default_count(&self) -> usize {
        self.default_count
    }

    pub fn provider(&self) -> &P {
        self.pool_builder.provider()
    }

    pub fn shared_provider(&self) -> Arc<P> {
        self.pool_builder.shared_provider()
    }

    /// Build the profile for a history snapshot
    pub fn profile(&self, history: &[HistoryEntry]) -> Result<UserProfile, ProfileError> {
        self.profiler.build(history)
    }

    /// Top `count` recommendations for a history snapshot.
    ///
    /// Movies in `exclude_ids` or in the history are never returned. Fewer
    /// than `count` results means the pool ran out.
    pub async fn recommend(
        &self,
        history: &[HistoryEntry],
        exclude_ids: &HashSet<MovieId>,
        count: usize,
    ) -> Result<Vec<Recommendation>, RecommendError> {
        let ranking = self.recommend_ranked(history, exclude_ids).await?;
        Ok(ranking.top(count).to_vec())
    }

    /// The complete ranking for a history snapshot
    #[instrument(skip_all, fields(history = history.len(), excluded = exclude_ids.len()))]
    pub async fn recommend_ranked(
        &self,
        history: &[HistoryEntry],
        exclude_ids: &HashSet<MovieId>,
    ) -> Result<RankedRecommendations, RecommendError> {
        // Start timing
        let start_time = Instant::now();

        let profile = self.profiler.build(history)?;
        debug!(
            "Built profile: {} rated, {} liked, {} genres",
            profile.rated_count,
            profile.liked_count,
            profile.genre_weights.len()
        );

        let mut exclude = exclude_ids.clone();
        exclude.extend(history.iter().map(|entry| entry.movie_id));

        let pool = self.pool_builder.build_pool(&exclude, self.pool_limit).await?;
        info!("Built candidate pool of {} movies", pool.len());

        let ranking = tokio::task::spawn_blocking({
            let weights = self.weights;
            move || {
                let scorer = Scorer::for_pool(weights, &pool);
                RankedRecommendations::new(scorer.score_all(&profile, &pool))
            }
        })
        .await?;

        info!(
            "Ranked {} recommendations in {:.2?}",
            ranking.len(),
            start_time.elapsed()
        );
        Ok(ranking)
    }
}

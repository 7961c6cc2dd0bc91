//! Engine configuration from `REELRECS_*` environment variables and `.env`.

use pipeline::{ScoringWeights, pool};
use serde::Deserialize;
use sources::profile;
use std::time::Duration;
use thiserror::Error;

const ENV_PREFIX: &str = "REELRECS_";

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Failed to load config: {0}")]
    Env(#[from] envy::Error),

    #[error("Invalid config: {0}")]
    Invalid(String),
}

/// Engine configuration loaded from `REELRECS_*` environment variables
#[derive(Debug, Deserialize, Clone, PartialEq)]
pub struct EngineConfig {
    /// Rated entries required before recommending
    #[serde(default = "default_min_rated_entries")]
    pub min_rated_entries: usize,

    /// Rating (0-10) at which an entry counts as liked
    #[serde(default = "default_liked_threshold")]
    pub liked_threshold: f32,

    /// Multiplier for genres above the mean weight
    #[serde(default = "default_genre_amplification")]
    pub genre_amplification: f32,

    /// Candidates scored per request
    #[serde(default = "default_pool_limit")]
    pub pool_limit: usize,

    /// Recommendations returned when the caller does not ask for a count
    #[serde(default = "default_count")]
    pub default_count: usize,

    /// Provider pages requested in parallel
    #[serde(default = "default_page_concurrency")]
    pub page_concurrency: usize,

    #[serde(default = "default_max_pages")]
    pub max_pages: usize,

    #[serde(default = "default_weight_genre")]
    pub weight_genre: f64,

    #[serde(default = "default_weight_rating")]
    pub weight_rating: f64,

    #[serde(default = "default_weight_popularity")]
    pub weight_popularity: f64,

    #[serde(default = "default_weight_recency")]
    pub weight_recency: f64,

    /// Delays before each provider retry, comma separated
    #[serde(default = "default_retry_delays_ms")]
    pub retry_delays_ms: Vec<u64>,
}

fn default_min_rated_entries() -> usize {
    profile::DEFAULT_MIN_RATED_ENTRIES
}

fn default_liked_threshold() -> f32 {
    profile::DEFAULT_LIKED_THRESHOLD
}

fn default_genre_amplification() -> f32 {
    profile::DEFAULT_GENRE_AMPLIFICATION
}

fn default_pool_limit() -> usize {
    pool::DEFAULT_POOL_LIMIT
}

fn default_count() -> usize {
    10
}

fn default_page_concurrency() -> usize {
    pool::DEFAULT_PAGE_CONCURRENCY
}

fn default_max_pages() -> usize {
    pool::DEFAULT_MAX_PAGES
}

fn default_weight_genre() -> f64 {
    ScoringWeights::default().genre
}

fn default_weight_rating() -> f64 {
    ScoringWeights::default().rating
}

fn default_weight_popularity() -> f64 {
    ScoringWeights::default().popularity
}

fn default_weight_recency() -> f64 {
    ScoringWeights::default().recency
}

fn default_retry_delays_ms() -> Vec<u64> {
    vec![1000, 2000, 4000]
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            min_rated_entries: default_min_rated_entries(),
            liked_threshold: default_liked_threshold(),
            genre_amplification: default_genre_amplification(),
            pool_limit: default_pool_limit(),
            default_count: default_count(),
            page_concurrency: default_page_concurrency(),
            max_pages: default_max_pages(),
            weight_genre: default_weight_genre(),
            weight_rating: default_weight_rating(),
            weight_popularity: default_weight_popularity(),
            weight_recency: default_weight_recency(),
            retry_delays_ms: default_retry_delays_ms(),
        }
    }
}

impl EngineConfig {
    /// Load configuration from `.env` and the environment
    pub fn from_env() -> Result<Self, ConfigError> {
        dotenvy::dotenv().ok();
        let config: EngineConfig = envy::prefixed(ENV_PREFIX).from_env()?;
        config.validate()?;
        Ok(config)
    }

    /// Load configuration from explicit `(name, value)` pairs
    pub fn from_vars<I>(vars: I) -> Result<Self, ConfigError>
    where
        I: IntoIterator<Item = (String, String)>,
    {
        let config: EngineConfig = envy::prefixed(ENV_PREFIX).from_iter(vars)?;
        config.validate()?;
        Ok(config)
    }

    pub fn weights(&self) -> Result<ScoringWeights, ConfigError> {
        ScoringWeights::new(
            self.weight_genre,
            self.weight_rating,
            self.weight_popularity,
            self.weight_recency,
        )
        .map_err(|e| ConfigError::Invalid(e.to_string()))
    }

    pub fn retry_delays(&self) -> Vec<Duration> {
        self.retry_delays_ms
            .iter()
            .map(|ms| Duration::from_millis(*ms))
            .collect()
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        self.weights()?;

        if self.min_rated_entries == 0 {
            return Err(ConfigError::Invalid("min_rated_entries must be at least 1".into()));
        }
        if !(0.0..=10.0).contains(&self.liked_threshold) {
            return Err(ConfigError::Invalid(format!(
                "liked_threshold {} is outside 0-10",
                self.liked_threshold
            )));
        }
        if !self.genre_amplification.is_finite() || self.genre_amplification < 1.0 {
            return Err(ConfigError::Invalid(format!(
                "genre_amplification {} must be at least 1.0",
                self.genre_amplification
            )));
        }
        if self.pool_limit == 0 || self.default_count == 0 {
            return Err(ConfigError::Invalid("pool_limit and default_count must be positive".into()));
        }
        if self.page_concurrency == 0 || self.max_pages == 0 {
            return Err(ConfigError::Invalid("page_concurrency and max_pages must be positive".into()));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn vars(pairs: &[(&str, &str)]) -> Vec<(String, String)> {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect()
    }

    #[test]
    fn test_defaults() {
        let config = EngineConfig::from_vars(Vec::new()).unwrap();
        assert_eq!(config, EngineConfig::default());
        assert_eq!(config.min_rated_entries, 5);
        assert_eq!(config.pool_limit, 1000);
        assert_eq!(config.liked_threshold, 8.0);
        assert_eq!(config.retry_delays().len(), 3);
    }

    #[test]
    fn test_overrides() {
        let config = EngineConfig::from_vars(vars(&[
            ("REELRECS_POOL_LIMIT", "250"),
            ("REELRECS_WEIGHT_GENRE", "0.5"),
            ("REELRECS_WEIGHT_RATING", "0.2"),
            ("REELRECS_RETRY_DELAYS_MS", "10,20"),
            ("UNRELATED", "x"),
        ]))
        .unwrap();

        assert_eq!(config.pool_limit, 250);
        assert_eq!(config.weights().unwrap().genre, 0.5);
        assert_eq!(config.retry_delays(), vec![Duration::from_millis(10), Duration::from_millis(20)]);
    }

    #[test]
    fn test_rejects_bad_weights() {
        let result = EngineConfig::from_vars(vars(&[("REELRECS_WEIGHT_GENRE", "0.9")]));
        assert!(matches!(result, Err(ConfigError::Invalid(_))));
    }

    #[test]
    fn test_rejects_zero_limits() {
        let result = EngineConfig::from_vars(vars(&[("REELRECS_POOL_LIMIT", "0")]));
        assert!(matches!(result, Err(ConfigError::Invalid(_))));
    }

    #[test]
    fn test_rejects_unparseable_values() {
        let result = EngineConfig::from_vars(vars(&[("REELRECS_MAX_PAGES", "many")]));
        assert!(matches!(result, Err(ConfigError::Env(_))));
    }
}

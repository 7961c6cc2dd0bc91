//! Candidate pool building, scoring and ranking.
//!
//! This crate provides:
//! - Filter trait and implementations for candidate filtering
//! - FilterPipeline for composing filters
//! - CandidatePoolBuilder for sourcing unseen movies from a provider
//! - Scorer for content-based scoring against a user profile
//! - Ranking and the immutable RankedRecommendations view
//!
//! ## Architecture
//! The pipeline processes candidates in stages:
//! 1. The pool builder pages through the provider's popularity listing
//! 2. Filters remove watched movies and duplicates
//! 3. The scorer rates every remaining candidate in parallel
//! 4. Ranking orders the results; callers slice pages from the ranking
//!
//! ## Example Usage
//! ```ignore
//! use pipeline::{CandidatePoolBuilder, RankedRecommendations, Scorer, ScoringWeights};
//!
//! let pool = CandidatePoolBuilder::new(provider).build_pool(&watched, 1000).await?;
//! let scorer = Scorer::for_pool(ScoringWeights::default(), &pool);
//! let ranking = RankedRecommendations::new(scorer.score_all(&profile, &pool));
//!
//! for rec in ranking.top(10) {
//!     println!("{} {:.1} {}", rec.movie.title, rec.score, rec.reasoning);
//! }
//! ```

pub mod traits;
pub mod filters;
pub mod filter_pipeline;
pub mod pool;
pub mod scorer;
pub mod ranking;

// Re-export main types
pub use traits::{Filter, FilterContext};
pub use filter_pipeline::FilterPipeline;
pub use pool::{CandidatePoolBuilder, PoolError};
pub use scorer::{Recommendation, ScoreBreakdown, ScoreTerm, Scorer, ScoringError, ScoringWeights};
pub use ranking::RankedRecommendations;

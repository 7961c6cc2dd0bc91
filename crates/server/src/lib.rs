//! Server crate for the ReelRecs recommendation engine.
//!
//! This crate contains the engine that coordinates profiling, pool
//! building, scoring and ranking, plus the session-scoped service the
//! presentation layer talks to.
//!
//! - **orchestrator**: `RecommendationEngine`, stateless per request
//! - **service**: `RecommendationService`, history store plus cached rankings
//! - **session**: explicit caller identity
//! - **config**: `EngineConfig` from `REELRECS_*` environment variables
//! - **chat**: context summaries and suggestion extraction for chat models

pub mod chat;
pub mod config;
pub mod orchestrator;
pub mod service;
pub mod session;

pub use chat::{
    ChatContext, ChatMessage, ChatSession, LanguageModel, Role, Suggestion, extract_suggestions, resolve_suggestions,
};
pub use config::{ConfigError, EngineConfig};
pub use orchestrator::{RecommendError, RecommendationEngine};
pub use service::{ImportSummary, RecommendationService, ServiceError};
pub use session::Session;

// Types callers need alongside the engine
pub use pipeline::{RankedRecommendations, Recommendation};
pub use sources::{CatalogProvider, MetadataProvider, RetryingProvider, UserProfile};

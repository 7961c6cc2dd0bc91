//! The metadata provider capability.
//!
//! Anything that can list popular movies page by page and resolve a single
//! movie implements `MetadataProvider`. The engine never talks to a movie
//! database directly; it only sees this trait.

use data_loader::{CandidateMovie, MovieId};
use std::sync::Arc;
use thiserror::Error;

/// Failures a metadata provider can report
#[derive(Error, Debug, Clone, PartialEq)]
pub enum ProviderError {
    /// The provider cannot serve requests at all (auth, outage, retries exhausted)
    #[error("Metadata provider unavailable: {0}")]
    Unavailable(String),

    /// A failure worth retrying (timeout, rate limit)
    #[error("Transient provider failure: {0}")]
    Transient(String),

    #[error("Movie {0} not found")]
    NotFound(MovieId),

    /// The provider answered with a record that failed validation
    #[error("Malformed provider record: {0}")]
    Malformed(String),
}

impl ProviderError {
    pub fn is_transient(&self) -> bool {
        matches!(self, ProviderError::Transient(_))
    }
}

/// Source of movie metadata.
///
/// ## Design Note
/// - `Send + Sync` so page requests can be issued from several worker
///   threads at once
/// - Calls may block; callers keep them off async executors
pub trait MetadataProvider: Send + Sync {
    /// Name used in logs
    fn name(&self) -> &str;

    /// Number of movies in a full page from `popular_page`
    fn page_size(&self) -> usize;

    /// One page of the popularity-ranked listing, 0-based.
    ///
    /// A page shorter than `page_size` means the listing is exhausted.
    fn popular_page(&self, page: usize) -> Result<Vec<CandidateMovie>, ProviderError>;

    /// Full metadata for a single movie
    fn resolve(&self, movie_id: MovieId) -> Result<CandidateMovie, ProviderError>;

    /// Title lookup, best match first. `year` narrows the search when known.
    fn search(&self, title: &str, year: Option<u16>) -> Result<Vec<CandidateMovie>, ProviderError>;
}

impl<P: MetadataProvider + ?Sized> MetadataProvider for Arc<P> {
    fn name(&self) -> &str {
        (**self).name()
    }

    fn page_size(&self) -> usize {
        (**self).page_size()
    }

    fn popular_page(&self, page: usize) -> Result<Vec<CandidateMovie>, ProviderError> {
        (**self).popular_page(page)
    }

    fn resolve(&self, movie_id: MovieId) -> Result<CandidateMovie, ProviderError> {
        (**self).resolve(movie_id)
    }

    fn search(&self, title: &str, year: Option<u16>) -> Result<Vec<CandidateMovie>, ProviderError> {
        (**self).search(title, year)
    }
}

//! Candidate pool builder
//!
//! Pulls the popularity-ranked listing from a metadata provider and turns
//! it into the bounded set of unseen movies a request will score.
//!
//! ## Algorithm
//! 1. Request pages in batches of `page_concurrency`, each page on its own
//!    blocking task so slow providers never hold the rayon pool that
//!    scoring runs on
//! 2. Walk each batch in page order, stopping at the first short page
//!    (listing exhausted) or failed page
//! 3. Run the accepted pages through the filter pipeline (exclusion set,
//!    duplicates) and append to the pool until `limit` is reached
//! 4. Fail only when the provider produced nothing at all; a failure after
//!    some pages succeeded yields a partial pool
//!
//! The `limit` is a cost bound on scoring, not a correctness requirement.

use crate::filter_pipeline::FilterPipeline;
use crate::filters::{DuplicateFilter, ExcludedFilter};
use crate::traits::FilterContext;
use data_loader::{CandidateMovie, MovieId};
use sources::{MetadataProvider, ProviderError};
use std::collections::HashSet;
use std::sync::Arc;
use thiserror::Error;
use tokio::task::{JoinError, JoinHandle};
use tracing::{debug, instrument, warn};

/// Default cap on the pool size
pub const DEFAULT_POOL_LIMIT: usize = 1000;

/// Default number of pages requested at once
pub const DEFAULT_PAGE_CONCURRENCY: usize = 4;

/// Default upper bound on pages requested per pool
pub const DEFAULT_MAX_PAGES: usize = 100;

#[derive(Error, Debug)]
pub enum PoolError {
    #[error("Metadata provider '{provider}' could not supply any candidates: {reason}")]
    ProviderUnavailable { provider: String, reason: String },

    #[error(transparent)]
    Filter(#[from] anyhow::Error),

    #[error("Page fetch task failed: {0}")]
    Worker(#[from] JoinError),
}

/// Builds candidate pools from a metadata provider
pub struct CandidatePoolBuilder<P> {
    provider: Arc<P>,
    pipeline: FilterPipeline,
    page_concurrency: usize,
    max_pages: usize,
}

impl<P: MetadataProvider + 'static> CandidatePoolBuilder<P> {
    pub fn new(provider: P) -> Self {
        Self {
            provider: Arc::new(provider),
            pipeline: FilterPipeline::new()
                .add_filter(ExcludedFilter)
                .add_filter(DuplicateFilter),
            page_concurrency: DEFAULT_PAGE_CONCURRENCY,
            max_pages: DEFAULT_MAX_PAGES,
        }
    }

    /// Configure how many pages are requested in parallel (default: 4)
    pub fn with_page_concurrency(mut self, concurrency: usize) -> Self {
        self.page_concurrency = concurrency.max(1);
        self
    }

    /// Configure the maximum number of pages per pool (default: 100)
    pub fn with_max_pages(mut self, max_pages: usize) -> Self {
        self.max_pages = max_pages;
        self
    }

    pub fn provider(&self) -> &P {
        &self.provider
    }

    /// Owned handle on the provider, for lookups on blocking tasks
    pub fn shared_provider(&self) -> Arc<P> {
        self.provider.clone()
    }

    /// Build a pool of at most `limit` candidates, none of them in `exclude`.
    ///
    /// Candidates keep the provider's rank order.
    #[instrument(skip(self, exclude), fields(provider = self.provider.name(), excluded = exclude.len()))]
    pub async fn build_pool(
        &self,
        exclude: &HashSet<MovieId>,
        limit: usize,
    ) -> Result<Vec<CandidateMovie>, PoolError> {
        let mut pool: Vec<CandidateMovie> = Vec::new();
        if limit == 0 {
            return Ok(pool);
        }

        // Excluded ids plus everything already accepted, so later pages
        // cannot re-add a movie
        let mut blocked = exclude.clone();
        let page_size = self.provider.page_size();
        let mut raw_count = 0usize;
        let mut next_page = 0usize;

        while next_page < self.max_pages && pool.len() < limit {
            let batch_end = (next_page + self.page_concurrency).min(self.max_pages);
            // Provider calls block (and may sleep between retries)
            let handles: Vec<JoinHandle<Result<Vec<CandidateMovie>, ProviderError>>> = (next_page..batch_end)
                .map(|page| {
                    let provider = self.provider.clone();
                    tokio::task::spawn_blocking(move || provider.popular_page(page))
                })
                .collect();
            let mut results = Vec::with_capacity(handles.len());
            for handle in handles {
                results.push(handle.await?);
            }

            let mut fetched = Vec::new();
            let mut exhausted = false;
            let mut failure = None;
            for (offset, result) in results.into_iter().enumerate() {
                match result {
                    Ok(movies) => {
                        raw_count += movies.len();
                        exhausted = movies.len() < page_size;
                        fetched.extend(movies);
                        if exhausted {
                            break;
                        }
                    }
                    Err(e) => {
                        failure = Some((next_page + offset, e));
                        break;
                    }
                }
            }

            let accepted = self.pipeline.apply(fetched, &FilterContext::new(&blocked))?;
            for movie in accepted {
                if pool.len() >= limit {
                    break;
                }
                blocked.insert(movie.movie_id);
                pool.push(movie);
            }

            if let Some((page, error)) = failure {
                if raw_count == 0 {
                    return Err(PoolError::ProviderUnavailable {
                        provider: self.provider.name().to_string(),
                        reason: error.to_string(),
                    });
                }
                warn!(
                    "Page {} from {} failed ({}), continuing with a partial pool of {}",
                    page,
                    self.provider.name(),
                    error,
                    pool.len()
                );
                break;
            }
            if exhausted {
                break;
            }
            next_page = batch_end;
        }

        if raw_count == 0 {
            return Err(PoolError::ProviderUnavailable {
                provider: self.provider.name().to_string(),
                reason: "no candidates returned".to_string(),
            });
        }

        debug!(
            "Built pool of {} candidates from {} provider records",
            pool.len(),
            raw_count
        );
        Ok(pool)
    }
}

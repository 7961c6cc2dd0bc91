//! Retry decorator for metadata providers.
//!
//! Retrying belongs to the provider, not to the engine: wrapping a
//! provider in `RetryingProvider` makes transient failures (timeouts, rate
//! limits) invisible to callers until the retry budget runs out, at which
//! point they surface as `Unavailable`.

use crate::provider::{MetadataProvider, ProviderError};
use data_loader::{CandidateMovie, MovieId};
use std::thread;
use std::time::Duration;
use tracing::warn;

/// Wraps a provider and retries `Transient` failures
#[derive(Debug, Clone)]
pub struct RetryingProvider<P> {
    inner: P,
    delays: Vec<Duration>,
}

impl<P: MetadataProvider> RetryingProvider<P> {
    /// Retry with delays of 1s, 2s and 4s
    pub fn new(inner: P) -> Self {
        Self {
            inner,
            delays: vec![
                Duration::from_secs(1),
                Duration::from_secs(2),
                Duration::from_secs(4),
            ],
        }
    }

    /// Configure the delay before each retry; one retry per entry
    pub fn with_delays(mut self, delays: Vec<Duration>) -> Self {
        self.delays = delays;
        self
    }

    pub fn inner(&self) -> &P {
        &self.inner
    }

    fn with_retry<T>(
        &self,
        operation: &str,
        call: impl Fn() -> Result<T, ProviderError>,
    ) -> Result<T, ProviderError> {
        let mut attempt = 0;
        loop {
            match call() {
                Err(ProviderError::Transient(reason)) => {
                    let Some(delay) = self.delays.get(attempt) else {
                        return Err(ProviderError::Unavailable(format!(
                            "{} failed after {} attempts: {}",
                            operation,
                            attempt + 1,
                            reason
                        )));
                    };
                    warn!(
                        "{} on {} failed ({}), retrying in {:?}",
                        operation,
                        self.inner.name(),
                        reason,
                        delay
                    );
                    thread::sleep(*delay);
                    attempt += 1;
                }
                other => return other,
            }
        }
    }
}

impl<P: MetadataProvider> MetadataProvider for RetryingProvider<P> {
    fn name(&self) -> &str {
        self.inner.name()
    }

    fn page_size(&self) -> usize {
        self.inner.page_size()
    }

    fn popular_page(&self, page: usize) -> Result<Vec<CandidateMovie>, ProviderError> {
        self.with_retry("popular_page", || self.inner.popular_page(page))
    }

    fn resolve(&self, movie_id: MovieId) -> Result<CandidateMovie, ProviderError> {
        self.with_retry("resolve", || self.inner.resolve(movie_id))
    }

    fn search(&self, title: &str, year: Option<u16>) -> Result<Vec<CandidateMovie>, ProviderError> {
        self.with_retry("search", || self.inner.search(title, year))
    }
}

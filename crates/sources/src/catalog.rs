//! Catalog provider - an in-memory metadata provider.
//!
//! Serves a fixed list of movies, ranked by popularity, through the
//! `MetadataProvider` trait. Used by the CLI (loaded from a JSON catalog
//! file) and throughout the tests.
//!
//! Records are validated when the catalog is built, so a bad popularity or
//! rating is reported at the boundary instead of surfacing as a strange
//! score later.

use crate::provider::{MetadataProvider, ProviderError};
use data_loader::{CandidateMovie, MovieId, is_valid_rating};
use std::collections::HashMap;
use std::fs;
use std::path::Path;
use tracing::{debug, info};

const DEFAULT_PAGE_SIZE: usize = 20;
const MAX_SEARCH_RESULTS: usize = 5;

/// Metadata provider backed by an in-memory movie list
#[derive(Debug, Clone)]
pub struct CatalogProvider {
    /// Sorted by popularity DESC, then movie id ASC
    movies: Vec<CandidateMovie>,
    /// movie id -> position in `movies`
    by_id: HashMap<MovieId, usize>,
    page_size: usize,
}

impl CatalogProvider {
    /// Build a catalog from raw records.
    ///
    /// Fails with `Malformed` on a blank title, a negative or non-finite
    /// popularity, a vote average off the 0-10 scale, or a repeated id.
    pub fn new(mut movies: Vec<CandidateMovie>) -> Result<Self, ProviderError> {
        for movie in &movies {
            validate_record(movie)?;
        }

        movies.sort_by(|a, b| {
            b.popularity
                .total_cmp(&a.popularity)
                .then_with(|| a.movie_id.cmp(&b.movie_id))
        });

        let mut by_id = HashMap::with_capacity(movies.len());
        for (pos, movie) in movies.iter().enumerate() {
            if by_id.insert(movie.movie_id, pos).is_some() {
                return Err(ProviderError::Malformed(format!(
                    "movie id {} appears more than once",
                    movie.movie_id
                )));
            }
        }

        Ok(Self {
            movies,
            by_id,
            page_size: DEFAULT_PAGE_SIZE,
        })
    }

    /// Load a catalog from a JSON array of movie records
    pub fn load_from_file(path: &Path) -> Result<Self, ProviderError> {
        let content = fs::read_to_string(path).map_err(|e| {
            ProviderError::Unavailable(format!("cannot read catalog {:?}: {}", path, e))
        })?;
        let movies: Vec<CandidateMovie> = serde_json::from_str(&content)
            .map_err(|e| ProviderError::Malformed(format!("catalog {:?}: {}", path, e)))?;

        let catalog = Self::new(movies)?;
        info!("Loaded catalog of {} movies from {:?}", catalog.len(), path);
        Ok(catalog)
    }

    /// Configure the page size (default: 20)
    pub fn with_page_size(mut self, page_size: usize) -> Self {
        self.page_size = page_size.max(1);
        self
    }

    pub fn len(&self) -> usize {
        self.movies.len()
    }

    pub fn is_empty(&self) -> bool {
        self.movies.is_empty()
    }
}

fn validate_record(movie: &CandidateMovie) -> Result<(), ProviderError> {
    if movie.title.trim().is_empty() {
        return Err(ProviderError::Malformed(format!(
            "movie {} has a blank title",
            movie.movie_id
        )));
    }
    if !movie.popularity.is_finite() || movie.popularity < 0.0 {
        return Err(ProviderError::Malformed(format!(
            "movie {} has invalid popularity {}",
            movie.movie_id, movie.popularity
        )));
    }
    if let Some(vote) = movie.vote_average
        && !is_valid_rating(vote)
    {
        return Err(ProviderError::Malformed(format!(
            "movie {} has vote average {} outside 0-10",
            movie.movie_id, vote
        )));
    }
    Ok(())
}

impl MetadataProvider for CatalogProvider {
    fn name(&self) -> &str {
        "catalog"
    }

    fn page_size(&self) -> usize {
        self.page_size
    }

    fn popular_page(&self, page: usize) -> Result<Vec<CandidateMovie>, ProviderError> {
        let start = page.saturating_mul(self.page_size).min(self.movies.len());
        let end = start.saturating_add(self.page_size).min(self.movies.len());
        debug!("Serving catalog page {} ({}..{})", page, start, end);
        Ok(self.movies[start..end].to_vec())
    }

    fn resolve(&self, movie_id: MovieId) -> Result<CandidateMovie, ProviderError> {
        self.by_id
            .get(&movie_id)
            .map(|&pos| self.movies[pos].clone())
            .ok_or(ProviderError::NotFound(movie_id))
    }

    /// Exact (case-insensitive) title matches first, then substring
    /// matches; popularity order within each group.
    fn search(&self, title: &str, year: Option<u16>) -> Result<Vec<CandidateMovie>, ProviderError> {
        let needle = title.trim().to_lowercase();
        if needle.is_empty() {
            return Ok(Vec::new());
        }

        let year_matches = |movie: &CandidateMovie| year.is_none() || movie.release_year == year;

        let mut exact = Vec::new();
        let mut partial = Vec::new();
        for movie in self.movies.iter().filter(|m| year_matches(m)) {
            let candidate_title = movie.title.to_lowercase();
            if candidate_title == needle {
                exact.push(movie.clone());
            } else if candidate_title.contains(&needle) {
                partial.push(movie.clone());
            }
        }

        exact.extend(partial);
        exact.truncate(MAX_SEARCH_RESULTS);
        Ok(exact)
    }
}

//! Core traits for the candidate filtering pipeline.
//!
//! This module defines the Filter trait that allows composable,
//! extensible filters to be applied to provider pages before they join
//! the candidate pool.

use anyhow::Result;
use data_loader::{CandidateMovie, MovieId};
use std::collections::HashSet;

/// What filters may consult while deciding on candidates
#[derive(Debug, Clone, Copy)]
pub struct FilterContext<'a> {
    /// Movie ids that must never enter the pool
    pub exclude: &'a HashSet<MovieId>,
}

impl<'a> FilterContext<'a> {
    pub fn new(exclude: &'a HashSet<MovieId>) -> Self {
        Self { exclude }
    }
}

/// Core trait for filtering candidates.
///
/// All filters must implement this trait to be used in the FilterPipeline.
///
/// ## Design Note
/// - `Send + Sync` allows filters to be shared by concurrent requests
/// - Filters take ownership of the Vec and return a filtered Vec, keeping
///   the provider's rank order
pub trait Filter: Send + Sync {
    /// Returns the name of this filter (for logging/debugging)
    fn name(&self) -> &str;

    /// Apply this filter to a set of candidates.
    ///
    /// # Arguments
    /// * `candidates` - The candidates to filter (takes ownership)
    /// * `context` - Exclusion set for this request
    fn apply(
        &self,
        candidates: Vec<CandidateMovie>,
        context: &FilterContext<'_>,
    ) -> Result<Vec<CandidateMovie>>;
}

//! Filter to remove movies the user has already watched.
//!
//! This is the first filter in the pool pipeline: nothing in the
//! exclusion set may ever be recommended.

use crate::traits::{Filter, FilterContext};
use anyhow::Result;
use data_loader::CandidateMovie;

/// Removes candidates whose id is in the exclusion set.
///
/// ## Algorithm
/// Uses the HashSet in FilterContext.exclude for O(1) lookups.
pub struct ExcludedFilter;

impl Filter for ExcludedFilter {
    fn name(&self) -> &str {
        "ExcludedFilter"
    }

    fn apply(
        &self,
        candidates: Vec<CandidateMovie>,
        context: &FilterContext<'_>,
    ) -> Result<Vec<CandidateMovie>> {
        let filtered: Vec<CandidateMovie> = candidates
            .into_iter()
            .filter(|candidate| !context.exclude.contains(&candidate.movie_id))
            .collect();
        Ok(filtered)
    }
}

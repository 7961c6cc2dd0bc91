//! Filter to drop repeated movie ids.
//!
//! Providers occasionally list the same movie on two pages when the
//! popularity ranking shifts between requests.

use crate::traits::{Filter, FilterContext};
use anyhow::Result;
use data_loader::CandidateMovie;
use std::collections::HashSet;

/// Keeps the first occurrence of each movie id, which is the one the
/// provider ranked highest.
pub struct DuplicateFilter;

impl Filter for DuplicateFilter {
    fn name(&self) -> &str {
        "DuplicateFilter"
    }

    fn apply(
        &self,
        candidates: Vec<CandidateMovie>,
        _context: &FilterContext<'_>,
    ) -> Result<Vec<CandidateMovie>> {
        let mut seen = HashSet::with_capacity(candidates.len());
        Ok(candidates
            .into_iter()
            .filter(|candidate| seen.insert(candidate.movie_id))
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_duplicate_filter_keeps_first() {
        let exclude = HashSet::new();
        let candidates = vec![
            CandidateMovie::new(1, "First", 5.0),
            CandidateMovie::new(2, "Other", 4.0),
            CandidateMovie::new(1, "Second", 3.0),
        ];

        let filtered = DuplicateFilter
            .apply(candidates, &FilterContext::new(&exclude))
            .unwrap();

        assert_eq!(filtered.len(), 2);
        assert_eq!(filtered[0].title, "First");
        assert_eq!(filtered[1].movie_id, 2);
    }
}

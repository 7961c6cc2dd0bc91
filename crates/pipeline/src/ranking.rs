//! Final ordering of scored candidates and the immutable ranked view.
//!
//! Order: score DESC, then popularity DESC, then movie id ASC. The last
//! key is unique, so the order is total and repeatable.
//!
//! A `RankedRecommendations` is computed once per request and shared;
//! paging is slicing, never re-scoring.

use crate::scorer::Recommendation;
use std::cmp::Ordering;
use std::sync::Arc;

/// Ranking comparator
pub fn compare(a: &Recommendation, b: &Recommendation) -> Ordering {
    b.score
        .total_cmp(&a.score)
        .then_with(|| b.movie.popularity.total_cmp(&a.movie.popularity))
        .then_with(|| a.movie.movie_id.cmp(&b.movie.movie_id))
}

/// Sort recommendations into ranking order
pub fn rank(mut recommendations: Vec<Recommendation>) -> Vec<Recommendation> {
    recommendations.sort_by(compare);
    recommendations
}

/// A complete, ordered ranking. Cheap to clone.
#[derive(Debug, Clone, Default)]
pub struct RankedRecommendations {
    items: Arc<[Recommendation]>,
}

impl RankedRecommendations {
    /// Rank `recommendations` and freeze the result
    pub fn new(recommendations: Vec<Recommendation>) -> Self {
        Self {
            items: rank(recommendations).into(),
        }
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    pub fn as_slice(&self) -> &[Recommendation] {
        &self.items
    }

    /// The best `n` (fewer when the ranking is shorter)
    pub fn top(&self, n: usize) -> &[Recommendation] {
        self.page(0, n)
    }

    /// `len` items starting at `offset`; empty past the end
    pub fn page(&self, offset: usize, len: usize) -> &[Recommendation] {
        let start = offset.min(self.items.len());
        let end = start.saturating_add(len).min(self.items.len());
        &self.items[start..end]
    }

    pub fn iter(&self) -> impl Iterator<Item = &Recommendation> {
        self.items.iter()
    }
}

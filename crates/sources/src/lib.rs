//! # Sources Crate
//!
//! Everything the engine learns from the outside world, plus what it
//! learns about the user.
//!
//! ## Components
//!
//! ### Metadata providers
//! - **provider**: the `MetadataProvider` trait and `ProviderError`
//! - **catalog**: `CatalogProvider`, an in-memory provider loaded from JSON
//! - **retry**: `RetryingProvider`, retries transient failures with backoff
//! - **enrich**: resolve imported CSV rows to provider ids and metadata
//!
//! ### Preference profiler
//! - **profile**: `PreferenceProfiler` turns a history snapshot into a
//!   `UserProfile` (genre weights, rating statistics, preferred decades,
//!   viewing frequency)
//!
//! ## Example Usage
//!
//! ```ignore
//! use sources::{CatalogProvider, PreferenceProfiler, RetryingProvider};
//! use std::path::Path;
//!
//! let provider = RetryingProvider::new(CatalogProvider::load_from_file(Path::new("catalog.json"))?);
//! let profile = PreferenceProfiler::new().build(&history)?;
//!
//! for (genre, weight) in profile.top_genres(3) {
//!     println!("{genre}: {weight:.1}");
//! }
//! ```

// Public modules
pub mod provider;
pub mod catalog;
pub mod retry;
pub mod enrich;
pub mod profile;

// Re-export commonly used types
pub use catalog::CatalogProvider;
pub use enrich::{FailureKind, ImportFailure, ImportReport, lookup_title, resolve_imports};
pub use profile::{PreferenceProfiler, ProfileError, UserProfile, build_profile};
pub use provider::{MetadataProvider, ProviderError};
pub use retry::RetryingProvider;

#[cfg(test)]
mod tests {
    use super::*;
    use data_loader::{CandidateMovie, HistoryEntry, HistoryStore, ImportedMovie};
    use std::sync::Arc;

    #[test]
    fn test_arc_provider_delegates() {
        let catalog = CatalogProvider::new(vec![CandidateMovie::new(1, "Heat", 3.0)]).unwrap();
        let provider: Arc<dyn MetadataProvider> = Arc::new(catalog);

        assert_eq!(provider.name(), "catalog");
        assert_eq!(provider.resolve(1).unwrap().title, "Heat");
        assert_eq!(provider.popular_page(0).unwrap().len(), 1);
    }

    #[test]
    fn test_profiler_creation() {
        let history: Vec<HistoryEntry> = (1..=5)
            .map(|id| HistoryEntry::new(id, format!("Movie {id}")).with_rating(7.0))
            .collect();

        let profile = build_profile(&history).unwrap();
        assert_eq!(profile.rated_count, 5);
        assert_eq!(profile.liked_count, 0);
        assert!(profile.genre_weights.is_empty());
    }

    #[test]
    fn test_rewatches_merge_before_profiling() {
        let catalog = CatalogProvider::new(
            (1..=5)
                .map(|id| CandidateMovie::new(id, format!("Movie {id}"), 1.0).with_genres(["Drama"]))
                .collect(),
        )
        .unwrap();

        // A diary export lists a rewatch of Movie 1 as its own row
        let rows: Vec<ImportedMovie> = [
            ("Movie 1", 6.0),
            ("Movie 2", 7.0),
            ("Movie 3", 8.0),
            ("Movie 1", 9.0),
            ("Movie 4", 8.0),
            ("Movie 5", 7.5),
        ]
        .into_iter()
        .enumerate()
        .map(|(i, (title, rating))| {
            let mut row = ImportedMovie::manual(title);
            row.line = i + 2;
            row.rating = Some(rating);
            row
        })
        .collect();

        let report = resolve_imports(&catalog, rows);
        assert_eq!(report.entries.len(), 6);
        assert!(matches!(
            build_profile(&report.entries),
            Err(ProfileError::DuplicateEntry { movie_id: 1 })
        ));

        let mut store = HistoryStore::new();
        for entry in report.entries {
            store.upsert(1, entry).unwrap();
        }
        let history = store.snapshot(1);
        let profile = build_profile(&history).unwrap();

        assert_eq!(profile.rated_count, 5);
        assert_eq!(history[0].rating, Some(9.0));
    }
}

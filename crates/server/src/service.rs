//! Session-scoped recommendation service.
//!
//! Owns the shared history store and the engine. Every operation takes the
//! caller's `Session`, so which user a call acts for is always explicit.
//!
//! ## Ranking cache
//! A full ranking is computed once per user and kept together with the
//! store revision it was computed from. Paging slices the cached ranking;
//! any change to the user's history bumps the revision and the next
//! request recomputes.

use std::collections::HashMap;
use std::collections::HashSet;
use std::sync::Arc;

use thiserror::Error;
use tokio::sync::{Mutex, RwLock};
use tokio::task::JoinError;
use tracing::{debug, info, instrument, warn};

use crate::chat::{Suggestion, resolve_suggestions};
use crate::orchestrator::{RecommendError, RecommendationEngine};
use crate::session::Session;
use data_loader::{
    CandidateMovie, DataLoadError, HistoryEntry, HistoryStore, ImportedMovie, MovieId, UpsertOutcome, UserId,
};
use pipeline::{RankedRecommendations, Recommendation};
use sources::{ImportFailure, MetadataProvider, ProfileError, ProviderError, UserProfile, resolve_imports};

/// Errors from history edits and movie lookups
#[derive(Error, Debug)]
pub enum ServiceError {
    #[error(transparent)]
    Provider(#[from] ProviderError),

    #[error(transparent)]
    History(#[from] DataLoadError),

    #[error("Could not add \"{title}\": {reason}")]
    NoMatch { title: String, reason: String },

    #[error("Lookup worker failed: {0}")]
    Worker(#[from] JoinError),
}

/// What an import did to the caller's history
#[derive(Debug, Default)]
pub struct ImportSummary {
    pub inserted: usize,
    pub updated: usize,
    /// Entries the store refused, with the reason
    pub rejected: Vec<(MovieId, String)>,
    /// Rows that could not be resolved, or were kept without metadata
    pub failures: Vec<ImportFailure>,
}

struct CachedRanking {
    revision: u64,
    ranking: RankedRecommendations,
}

pub struct RecommendationService<P> {
    engine: Arc<RecommendationEngine<P>>,
    store: Arc<RwLock<HistoryStore>>,
    rankings: Mutex<HashMap<UserId, CachedRanking>>,
}

impl<P: MetadataProvider + 'static> RecommendationService<P> {
    pub fn new(engine: RecommendationEngine<P>, store: HistoryStore) -> Self {
        Self::with_shared_store(Arc::new(engine), Arc::new(RwLock::new(store)))
    }

    pub fn with_shared_store(engine: Arc<RecommendationEngine<P>>, store: Arc<RwLock<HistoryStore>>) -> Self {
        Self {
            engine,
            store,
            rankings: Mutex::new(HashMap::new()),
        }
    }

    pub fn engine(&self) -> &RecommendationEngine<P> {
        &self.engine
    }

    pub fn store(&self) -> Arc<RwLock<HistoryStore>> {
        self.store.clone()
    }

    /// Add a movie to the caller's history, merging with an existing entry
    pub async fn add_entry(&self, session: &Session, entry: HistoryEntry) -> data_loader::Result<UpsertOutcome> {
        let mut store = self.store.write().await;
        let outcome = store.upsert(session.user_id, entry)?;
        debug!("History of {} now has {} entries", session, store.len(session.user_id));
        Ok(outcome)
    }

    /// Resolve imported rows against the provider and merge them into the
    /// caller's history
    #[instrument(skip(self, session, rows), fields(user = session.user_id, rows = rows.len()))]
    pub async fn import(&self, session: &Session, rows: Vec<ImportedMovie>) -> Result<ImportSummary, ServiceError> {
        let provider = self.engine.shared_provider();
        let report = tokio::task::spawn_blocking(move || resolve_imports(&*provider, rows)).await?;

        let mut summary = ImportSummary {
            failures: report.failures,
            ..ImportSummary::default()
        };
        for entry in report.entries {
            let movie_id = entry.movie_id;
            match self.add_entry(session, entry).await {
                Ok(UpsertOutcome::Inserted) => summary.inserted += 1,
                Ok(UpsertOutcome::Updated) => summary.updated += 1,
                Err(e) => {
                    warn!("Rejected movie {} for {}: {}", movie_id, session, e);
                    summary.rejected.push((movie_id, e.to_string()));
                }
            }
        }
        Ok(summary)
    }

    /// Add one movie by title, matched with the provider's search
    pub async fn add_manual(
        &self,
        session: &Session,
        row: ImportedMovie,
    ) -> Result<(HistoryEntry, UpsertOutcome), ServiceError> {
        let title = row.title.clone();
        let provider = self.engine.shared_provider();
        let mut report = tokio::task::spawn_blocking(move || resolve_imports(&*provider, vec![row])).await?;

        let Some(entry) = report.entries.pop() else {
            let reason = report
                .failures
                .pop()
                .map(|f| f.reason)
                .unwrap_or_else(|| "no match".to_string());
            return Err(ServiceError::NoMatch { title, reason });
        };
        let outcome = self.add_entry(session, entry.clone()).await?;
        Ok((entry, outcome))
    }

    /// Full provider metadata for one movie
    pub async fn movie(&self, movie_id: MovieId) -> Result<CandidateMovie, ServiceError> {
        let provider = self.engine.shared_provider();
        Ok(tokio::task::spawn_blocking(move || provider.resolve(movie_id)).await??)
    }

    /// Provider matches for the movies a chat reply suggested
    pub async fn resolve_suggestions(&self, suggestions: Vec<Suggestion>) -> Result<Vec<CandidateMovie>, ServiceError> {
        let provider = self.engine.shared_provider();
        Ok(tokio::task::spawn_blocking(move || resolve_suggestions(&*provider, &suggestions)).await?)
    }

    /// Remove a movie from the caller's history
    pub async fn remove_entry(&self, session: &Session, movie_id: MovieId) -> Option<HistoryEntry> {
        self.store.write().await.remove(session.user_id, movie_id)
    }

    /// Snapshot of the caller's history
    pub async fn history(&self, session: &Session) -> Vec<HistoryEntry> {
        self.store.read().await.snapshot(session.user_id)
    }

    pub async fn profile(&self, session: &Session) -> Result<UserProfile, ProfileError> {
        let history = self.history(session).await;
        self.engine.profile(&history)
    }

    /// Top `count` recommendations for the caller
    pub async fn recommend(&self, session: &Session, count: usize) -> Result<Vec<Recommendation>, RecommendError> {
        self.page(session, 0, count).await
    }

    /// `count` recommendations starting at `offset` ("load more")
    #[instrument(skip(self, session), fields(user = session.user_id))]
    pub async fn page(
        &self,
        session: &Session,
        offset: usize,
        count: usize,
    ) -> Result<Vec<Recommendation>, RecommendError> {
        let ranking = self.ranking(session).await?;
        Ok(ranking.page(offset, count).to_vec())
    }

    /// The caller's full ranking, from cache when the history is unchanged
    pub async fn ranking(&self, session: &Session) -> Result<RankedRecommendations, RecommendError> {
        let (revision, history) = {
            let store = self.store.read().await;
            (store.revision(session.user_id), store.snapshot(session.user_id))
        };

        if let Some(cached) = self.rankings.lock().await.get(&session.user_id)
            && cached.revision == revision
        {
            debug!("Serving cached ranking for {} at revision {}", session, revision);
            return Ok(cached.ranking.clone());
        }

        let ranking = self.engine.recommend_ranked(&history, &HashSet::new()).await?;
        info!(
            "Computed ranking of {} for {} at revision {}",
            ranking.len(),
            session,
            revision
        );

        self.rankings.lock().await.insert(
            session.user_id,
            CachedRanking {
                revision,
                ranking: ranking.clone(),
            },
        );
        Ok(ranking)
    }

    /// Drop the caller's cached ranking
    pub async fn invalidate(&self, session: &Session) {
        self.rankings.lock().await.remove(&session.user_id);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use data_loader::CandidateMovie;
    use sources::{CatalogProvider, ProviderError};
    use std::sync::atomic::{AtomicUsize, Ordering};

    /// Catalog that counts page requests
    struct CountingProvider {
        catalog: CatalogProvider,
        pages: AtomicUsize,
    }

    impl MetadataProvider for CountingProvider {
        fn name(&self) -> &str {
            "counting"
        }

        fn page_size(&self) -> usize {
            self.catalog.page_size()
        }

        fn popular_page(&self, page: usize) -> Result<Vec<CandidateMovie>, ProviderError> {
            self.pages.fetch_add(1, Ordering::SeqCst);
            self.catalog.popular_page(page)
        }

        fn resolve(&self, movie_id: MovieId) -> Result<CandidateMovie, ProviderError> {
            self.catalog.resolve(movie_id)
        }

        fn search(&self, title: &str, year: Option<u16>) -> Result<Vec<CandidateMovie>, ProviderError> {
            self.catalog.search(title, year)
        }
    }

    fn create_test_service() -> RecommendationService<CountingProvider> {
        let movies = (100..125)
            .map(|id| CandidateMovie::new(id, format!("Movie {id}"), id as f32).with_genres(["Comedy"]))
            .collect();
        let provider = CountingProvider {
            catalog: CatalogProvider::new(movies).unwrap().with_page_size(50),
            pages: AtomicUsize::new(0),
        };
        RecommendationService::new(RecommendationEngine::new(provider), HistoryStore::new())
    }

    async fn seed_history(service: &RecommendationService<CountingProvider>, session: &Session, n: u32) {
        for id in 1..=n {
            let entry = HistoryEntry::new(id, format!("Seen {id}"))
                .with_rating(8.0)
                .with_genres(["Comedy"]);
            service.add_entry(session, entry).await.unwrap();
        }
    }

    fn page_requests(service: &RecommendationService<CountingProvider>) -> usize {
        service.engine().provider().pages.load(Ordering::SeqCst)
    }

    #[tokio::test]
    async fn test_paging_reuses_cached_ranking() {
        let service = create_test_service();
        let session = Session::new(1, "ana");
        seed_history(&service, &session, 5).await;

        let first = service.recommend(&session, 10).await.unwrap();
        let requests = page_requests(&service);
        let second = service.page(&session, 10, 10).await.unwrap();
        let rest = service.page(&session, 20, 10).await.unwrap();

        assert_eq!(first.len(), 10);
        assert_eq!(second.len(), 10);
        assert_eq!(rest.len(), 5);
        assert_eq!(page_requests(&service), requests);

        let all: HashSet<MovieId> = first
            .iter()
            .chain(&second)
            .chain(&rest)
            .map(|r| r.movie.movie_id)
            .collect();
        assert_eq!(all.len(), 25);
    }

    #[tokio::test]
    async fn test_history_change_invalidates_cache() {
        let service = create_test_service();
        let session = Session::new(1, "ana");
        seed_history(&service, &session, 5).await;

        let before = service.recommend(&session, 50).await.unwrap();
        assert_eq!(before.len(), 25);
        let top = before[0].movie.movie_id;

        // Watching the top pick removes it from the next ranking
        service
            .add_entry(&session, HistoryEntry::new(top, "Top pick").with_rating(9.0))
            .await
            .unwrap();
        let after = service.recommend(&session, 50).await.unwrap();

        assert_eq!(after.len(), 24);
        assert!(after.iter().all(|r| r.movie.movie_id != top));
    }

    #[tokio::test]
    async fn test_sessions_are_isolated() {
        let service = create_test_service();
        let ana = Session::new(1, "ana");
        let ben = Session::new(2, "ben");
        seed_history(&service, &ana, 5).await;
        seed_history(&service, &ben, 4).await;

        assert!(service.recommend(&ana, 5).await.is_ok());
        assert!(matches!(
            service.recommend(&ben, 5).await,
            Err(RecommendError::InsufficientHistory { rated: 4, required: 5 })
        ));

        assert!(service.remove_entry(&ana, 3).await.is_some());
        assert_eq!(service.history(&ana).await.len(), 4);
        assert_eq!(service.history(&ben).await.len(), 4);
    }

    fn manual(title: &str, rating: f32) -> ImportedMovie {
        let mut row = ImportedMovie::manual(title);
        row.rating = Some(rating);
        row
    }

    #[tokio::test]
    async fn test_add_manual_uses_provider_match() {
        let service = create_test_service();
        let session = Session::new(3, "dee");

        let (entry, outcome) = service.add_manual(&session, manual("movie 105", 8.5)).await.unwrap();
        assert_eq!(outcome, UpsertOutcome::Inserted);
        assert_eq!(entry.movie_id, 105);
        assert_eq!(entry.title, "Movie 105");
        assert_eq!(entry.genres[0].as_str(), "Comedy");

        // Same movie again merges into the existing entry
        let (_, outcome) = service.add_manual(&session, manual("Movie 105", 9.0)).await.unwrap();
        assert_eq!(outcome, UpsertOutcome::Updated);
        let history = service.history(&session).await;
        assert_eq!(history.len(), 1);
        assert_eq!(history[0].rating, Some(9.0));
    }

    #[tokio::test]
    async fn test_add_manual_errors() {
        let service = create_test_service();
        let session = Session::new(3, "dee");

        assert!(matches!(
            service.add_manual(&session, manual("Nothing Like It", 7.0)).await,
            Err(ServiceError::NoMatch { .. })
        ));
        assert!(matches!(
            service.add_manual(&session, manual("Movie 101", 11.0)).await,
            Err(ServiceError::History(_))
        ));
        assert!(service.history(&session).await.is_empty());
    }

    #[tokio::test]
    async fn test_import_reports_counts() {
        let service = create_test_service();
        let session = Session::new(4, "eve");

        let mut by_id = manual("Whatever the CSV says", 6.0);
        by_id.movie_id = Some(101);
        let rows = vec![by_id, manual("Movie 110", 8.0), manual("Unknown Film", 5.0)];

        let summary = service.import(&session, rows).await.unwrap();
        assert_eq!(summary.inserted, 2);
        assert_eq!(summary.updated, 0);
        assert!(summary.rejected.is_empty());
        assert_eq!(summary.failures.len(), 1);
        assert_eq!(summary.failures[0].title, "Unknown Film");

        let ids: Vec<MovieId> = service.history(&session).await.iter().map(|e| e.movie_id).collect();
        assert_eq!(ids, vec![101, 110]);
    }

    #[tokio::test]
    async fn test_movie_lookup() {
        let service = create_test_service();

        assert_eq!(service.movie(112).await.unwrap().title, "Movie 112");
        assert!(matches!(
            service.movie(999).await,
            Err(ServiceError::Provider(ProviderError::NotFound(999)))
        ));
    }

    #[tokio::test]
    async fn test_profile_for_session() {
        let service = create_test_service();
        let session = Session::new(7, "cam");
        seed_history(&service, &session, 6).await;

        let profile = service.profile(&session).await.unwrap();
        assert_eq!(profile.rated_count, 6);
        assert_eq!(profile.top_genres(1)[0].0.as_str(), "Comedy");
    }
}

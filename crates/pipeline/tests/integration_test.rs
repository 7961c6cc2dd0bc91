//! Integration tests for the pipeline.
//!
//! These tests run profiling, pool building, scoring and ranking together
//! against an in-memory catalog.

use chrono::NaiveDate;
use data_loader::{CandidateMovie, Genre, HistoryEntry, MovieId};
use pipeline::{CandidatePoolBuilder, RankedRecommendations, Scorer, ScoringWeights};
use sources::{CatalogProvider, build_profile};
use std::collections::HashSet;

fn create_test_history() -> Vec<HistoryEntry> {
    let titles = ["Heat", "Ronin", "Speed", "Face/Off", "Alien", "Clue", "Big"];
    let genres: [&[&str]; 7] = [
        &["Action", "Crime"],
        &["Action", "Thriller"],
        &["Action"],
        &["Action", "Science Fiction"],
        &["Horror", "Science Fiction"],
        &["Comedy", "Mystery"],
        &["Comedy"],
    ];
    let ratings = [9.0, 8.5, 8.0, 9.5, 6.0, 7.0, 4.0];
    let years = [1995, 1998, 1994, 1997, 1979, 1985, 1988];

    (0..titles.len())
        .map(|i| {
            HistoryEntry::new(i as MovieId + 1, titles[i])
                .with_rating(ratings[i])
                .with_release_year(years[i])
                .with_genres(genres[i].iter().copied())
                .with_watched_date(NaiveDate::from_ymd_opt(2024, 1 + i as u32, 10).unwrap())
        })
        .collect()
}

fn create_test_catalog() -> CatalogProvider {
    let mut movies = vec![
        // Already in the history
        CandidateMovie::new(1, "Heat", 80.0).with_genres(["Action", "Crime"]),
        CandidateMovie::new(5, "Alien", 70.0).with_genres(["Horror"]),
        // Unseen
        CandidateMovie::new(101, "Point Break", 40.0)
            .with_genres(["Action", "Crime"])
            .with_release_year(1991)
            .with_vote_average(7.3),
        CandidateMovie::new(102, "Paddington", 95.0)
            .with_genres(["Family", "Comedy"])
            .with_release_year(2014)
            .with_vote_average(7.2),
        CandidateMovie::new(103, "Hereditary", 60.0)
            .with_genres(["Horror"])
            .with_release_year(2018)
            .with_vote_average(7.3),
    ];
    for id in 200..260 {
        movies.push(
            CandidateMovie::new(id, format!("Filler {id}"), 1.0 + (id % 7) as f32)
                .with_genres(["Documentary"])
                .with_release_year(2000 + (id % 20) as u16),
        );
    }
    CatalogProvider::new(movies).unwrap().with_page_size(8)
}

async fn recommend(history: &[HistoryEntry], catalog: CatalogProvider) -> RankedRecommendations {
    let profile = build_profile(history).unwrap();
    let exclude: HashSet<MovieId> = history.iter().map(|e| e.movie_id).collect();

    let pool = CandidatePoolBuilder::new(catalog)
        .with_page_concurrency(3)
        .build_pool(&exclude, 1000)
        .await
        .unwrap();
    let scorer = Scorer::for_pool(ScoringWeights::default(), &pool);
    RankedRecommendations::new(scorer.score_all(&profile, &pool))
}

#[tokio::test]
async fn test_full_pipeline_excludes_history() {
    let history = create_test_history();
    let ranking = recommend(&history, create_test_catalog()).await;

    let watched: HashSet<MovieId> = history.iter().map(|e| e.movie_id).collect();
    assert_eq!(ranking.len(), 63);
    for rec in ranking.iter() {
        assert!(!watched.contains(&rec.movie.movie_id));
    }
}

#[tokio::test]
async fn test_favorite_genre_ranks_first() {
    let ranking = recommend(&create_test_history(), create_test_catalog()).await;

    let first = &ranking.top(1)[0];
    assert_eq!(first.movie.movie_id, 101);
    assert!(first.reasoning.starts_with("Strong genre match"));
    assert!(first.reasoning.contains("Action"));
}

#[tokio::test]
async fn test_scores_bounded_and_ordered() {
    let ranking = recommend(&create_test_history(), create_test_catalog()).await;

    let recs = ranking.as_slice();
    for rec in recs {
        assert!((0.0..=100.0).contains(&rec.score), "score out of range: {}", rec.score);
    }
    for pair in recs.windows(2) {
        let (a, b) = (&pair[0], &pair[1]);
        assert!(a.score >= b.score);
        if a.score == b.score {
            assert!(a.movie.popularity >= b.movie.popularity);
            if a.movie.popularity == b.movie.popularity {
                assert!(a.movie.movie_id < b.movie.movie_id);
            }
        }
    }
}

#[tokio::test]
async fn test_pipeline_is_deterministic() {
    let history = create_test_history();
    let first = recommend(&history, create_test_catalog()).await;
    let second = recommend(&history, create_test_catalog()).await;

    assert_eq!(first.as_slice(), second.as_slice());
    assert_eq!(
        serde_json::to_string(first.as_slice()).unwrap(),
        serde_json::to_string(second.as_slice()).unwrap()
    );
}

#[test]
fn test_profile_drives_genre_weights() {
    let profile = build_profile(&create_test_history()).unwrap();

    // Liked: Heat, Ronin, Speed, Face/Off. Action 4, others 1 each.
    let action = Genre::new("Action").unwrap();
    assert_eq!(profile.genre_weight(&action), 6.0);
    assert_eq!(profile.genre_weight(&Genre::new("Comedy").unwrap()), 0.0);
    assert!(profile.prefers_decade(1990));
}

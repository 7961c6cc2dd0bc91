use anyhow::{Context, Result, anyhow};
use clap::{Parser, Subcommand};
use chrono::NaiveDate;
use colored::Colorize;
use data_loader::{CandidateMovie, HistoryEntry, HistoryStore, ImportedMovie, MovieId, UpsertOutcome, UserId, parser};
use server::{
    CatalogProvider, ChatContext, EngineConfig, Recommendation, RecommendationEngine,
    RecommendationService, RetryingProvider, Session, extract_suggestions,
};
use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::Semaphore;
use tracing::debug;

type Provider = Arc<RetryingProvider<CatalogProvider>>;
type Service = RecommendationService<Provider>;

/// ReelRecs - Movie Recommendation Engine
#[derive(Parser)]
#[command(name = "reel-recs")]
#[command(about = "Content-based movie recommendations from your viewing history", long_about = None)]
struct Cli {
    /// Path to the movie catalog (JSON array of movies)
    #[arg(short, long, default_value = "data/catalog.json")]
    catalog: PathBuf,

    /// Path to the history store (created on first write)
    #[arg(short, long, default_value = "data/history.json")]
    store: PathBuf,

    /// User to act for
    #[arg(short, long, default_value = "1")]
    user: UserId,

    /// Display name for the user
    #[arg(long, default_value = "me")]
    username: String,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Import a Letterboxd, IMDb or native CSV export into the history
    Import {
        /// CSV file to import
        file: PathBuf,
    },

    /// Add one movie by title, matched against the catalog
    Add {
        #[arg(long)]
        title: String,

        /// Release year, to tell remakes apart
        #[arg(long)]
        year: Option<u16>,

        /// Rating on the 0-10 scale
        #[arg(long)]
        rating: Option<f32>,

        /// Date watched (YYYY-MM-DD)
        #[arg(long)]
        watched_date: Option<NaiveDate>,
    },

    /// Show catalog details for one movie
    Show {
        #[arg(long)]
        movie_id: MovieId,
    },

    /// Show the user's watch history
    History,

    /// Remove a movie from the user's history
    Remove {
        #[arg(long)]
        movie_id: MovieId,
    },

    /// Show the preference profile derived from the history
    Profile,

    /// Get movie recommendations
    Recommend {
        /// Number of recommendations to return (defaults to the configured count)
        #[arg(long)]
        count: Option<usize>,

        /// Skip this many recommendations ("load more")
        #[arg(long, default_value = "0")]
        offset: usize,

        /// Show the score breakdown for each recommendation
        #[arg(long)]
        explain: bool,

        /// Print recommendations as JSON
        #[arg(long)]
        json: bool,
    },

    /// Print the context summary handed to a chat assistant
    ChatContext,

    /// Look up the movies an assistant reply suggests
    ChatSuggest {
        /// File holding the assistant's reply
        reply: PathBuf,
    },

    /// Run benchmark to test performance
    Benchmark {
        /// Number of requests to make
        #[arg(long, default_value = "100")]
        requests: usize,

        /// Number of concurrent requests
        #[arg(long, default_value = "10")]
        concurrent: usize,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize tracing
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    let cli = Cli::parse();
    let config = EngineConfig::from_env().context("Invalid REELRECS_* configuration")?;

    println!("Loading catalog from {}...", cli.catalog.display());
    let start = Instant::now();
    let catalog = CatalogProvider::load_from_file(&cli.catalog)
        .with_context(|| format!("Failed to load catalog {}", cli.catalog.display()))?;
    println!(
        "{} Loaded {} movies in {:?}",
        "✓".green(),
        catalog.len(),
        start.elapsed()
    );

    let provider: Provider = Arc::new(RetryingProvider::new(catalog).with_delays(config.retry_delays()));
    let engine = RecommendationEngine::from_config(provider, &config).context("Invalid engine configuration")?;
    let store = HistoryStore::load_from_file(&cli.store)
        .with_context(|| format!("Failed to load history store {}", cli.store.display()))?;
    let service = Arc::new(RecommendationService::new(engine, store));
    let session = Session::new(cli.user, cli.username);

    // Dispatch to appropriate command handler
    match cli.command {
        Commands::Import { file } => handle_import(&service, &session, &file, &cli.store).await?,
        Commands::Add {
            title,
            year,
            rating,
            watched_date,
        } => {
            let mut row = ImportedMovie::manual(title);
            row.release_year = year;
            row.rating = rating;
            row.watched_date = watched_date;
            handle_add(&service, &session, row, &cli.store).await?
        }
        Commands::Show { movie_id } => handle_show(&service, &session, movie_id).await?,
        Commands::History => handle_history(&service, &session).await?,
        Commands::Remove { movie_id } => handle_remove(&service, &session, movie_id, &cli.store).await?,
        Commands::Profile => handle_profile(&service, &session).await?,
        Commands::Recommend {
            count,
            offset,
            explain,
            json,
        } => {
            let count = count.unwrap_or_else(|| service.engine().default_count());
            handle_recommend(&service, &session, offset, count, explain, json).await?
        }
        Commands::ChatContext => handle_chat_context(&service, &session).await?,
        Commands::ChatSuggest { reply } => handle_chat_suggest(&service, &session, &reply).await?,
        Commands::Benchmark {
            requests,
            concurrent,
        } => handle_benchmark(service, &session, requests, concurrent).await?,
    }

    Ok(())
}

async fn save_store(service: &Service, path: &Path) -> Result<()> {
    if let Some(dir) = path.parent()
        && !dir.as_os_str().is_empty()
    {
        std::fs::create_dir_all(dir).with_context(|| format!("Failed to create {}", dir.display()))?;
    }
    service
        .store()
        .read()
        .await
        .save_to_file(path)
        .with_context(|| format!("Failed to save history store {}", path.display()))?;
    debug!("Saved history store to {:?}", path);
    Ok(())
}

/// Handle the 'import' command
async fn handle_import(service: &Service, session: &Session, file: &Path, store_path: &Path) -> Result<()> {
    let batch = parser::read_history_csv(file).with_context(|| format!("Failed to read {}", file.display()))?;
    println!(
        "{} Parsed {} rows from a {} export",
        "✓".green(),
        batch.rows.len(),
        batch.format.name()
    );
    for error in &batch.errors {
        println!("  {} {}", "!".yellow(), error);
    }

    let summary = service.import(session, batch.rows).await?;
    save_store(service, store_path).await?;

    println!(
        "{} Imported for {}: {} new, {} updated, {} rejected",
        "✓".green(),
        session,
        summary.inserted,
        summary.updated,
        summary.rejected.len()
    );
    for (movie_id, reason) in &summary.rejected {
        println!("  {} movie {}: {}", "!".yellow(), movie_id, reason);
    }
    if !summary.failures.is_empty() {
        println!("{}", format!("{} rows need attention:", summary.failures.len()).yellow());
        for failure in &summary.failures {
            println!("  {} {}", "•".yellow(), failure);
        }
    }
    Ok(())
}

/// Handle the 'add' command
async fn handle_add(service: &Service, session: &Session, row: ImportedMovie, store_path: &Path) -> Result<()> {
    let (entry, outcome) = service.add_manual(session, row).await?;
    save_store(service, store_path).await?;

    let action = match outcome {
        UpsertOutcome::Inserted => "Added",
        UpsertOutcome::Updated => "Updated",
    };
    println!("{} {} for {}:", "✓".green(), action, session);
    print_entry(&entry);
    Ok(())
}

/// Handle the 'show' command
async fn handle_show(service: &Service, session: &Session, movie_id: MovieId) -> Result<()> {
    let movie = service.movie(movie_id).await?;
    print_movie(&movie);
    let history = service.history(session).await;
    if let Some(rating) = history
        .iter()
        .find(|e| e.movie_id == movie_id)
        .and_then(|e| e.rating)
    {
        println!("{}Your rating: {:.1}/10", "• ".cyan(), rating);
    }
    Ok(())
}

/// Handle the 'history' command
async fn handle_history(service: &Service, session: &Session) -> Result<()> {
    let history = service.history(session).await;
    println!("{}", format!("Watch history of {} ({} movies):", session, history.len()).bold().blue());
    for entry in &history {
        print_entry(entry);
    }
    Ok(())
}

/// Handle the 'remove' command
async fn handle_remove(service: &Service, session: &Session, movie_id: MovieId, store_path: &Path) -> Result<()> {
    let removed = service
        .remove_entry(session, movie_id)
        .await
        .ok_or_else(|| anyhow!("Movie {} is not in the history of {}", movie_id, session))?;
    save_store(service, store_path).await?;
    println!("{} Removed {} from the history of {}", "✓".green(), removed.title, session);
    Ok(())
}

/// Handle the 'profile' command
async fn handle_profile(service: &Service, session: &Session) -> Result<()> {
    let profile = service.profile(session).await?;

    println!("{}", format!("Profile of {}", session).bold().blue());
    println!("{}Rated movies: {} ({} liked)", "• ".cyan(), profile.rated_count, profile.liked_count);
    println!(
        "{}Average rating: {:.2}/10 (±{:.2})",
        "• ".cyan(),
        profile.avg_rating,
        profile.rating_stddev
    );
    println!("{}Watches {:.1} movies per month", "• ".cyan(), profile.viewing_frequency);
    if !profile.preferred_decades.is_empty() {
        let decades: Vec<String> = profile.preferred_decades.iter().map(|d| format!("{}s", d)).collect();
        println!("{}Preferred decades: {}", "• ".cyan(), decades.join(", "));
    }

    println!("Genre preferences:");
    for (genre, weight) in profile.top_genres(10) {
        println!("  - {}: {:.1}", genre.as_str(), weight);
    }
    Ok(())
}

/// Handle the 'recommend' command
async fn handle_recommend(
    service: &Service,
    session: &Session,
    offset: usize,
    count: usize,
    explain: bool,
    json: bool,
) -> Result<()> {
    let recommendations = service.page(session, offset, count).await?;

    if json {
        println!("{}", serde_json::to_string_pretty(&recommendations)?);
        return Ok(());
    }
    print_recommendations(&recommendations, offset, explain);
    if recommendations.len() < count {
        println!("{}", "No more recommendations in the catalog.".dimmed());
    }
    Ok(())
}

/// Handle the 'chat-context' command
async fn handle_chat_context(service: &Service, session: &Session) -> Result<()> {
    let history = service.history(session).await;
    // A short history still gets a context, just without profile figures
    let profile = service.profile(session).await.ok();
    let context = ChatContext::build(&history, profile.as_ref());
    print!("{}", context.render());
    Ok(())
}

/// Handle the 'chat-suggest' command
async fn handle_chat_suggest(service: &Service, session: &Session, reply: &Path) -> Result<()> {
    let text = std::fs::read_to_string(reply).with_context(|| format!("Failed to read {}", reply.display()))?;
    let suggestions = extract_suggestions(&text);
    if suggestions.is_empty() {
        println!("No `Title (Year)` suggestions found in the reply.");
        return Ok(());
    }

    let found = suggestions.len();
    let movies = service.resolve_suggestions(suggestions).await?;
    let watched: HashSet<MovieId> = service.history(session).await.iter().map(|e| e.movie_id).collect();

    println!("{}", format!("{} of {} suggestions found in the catalog:", movies.len(), found).bold().blue());
    for movie in &movies {
        print_movie(movie);
        if watched.contains(&movie.movie_id) {
            println!("   {}", "already in your history".dimmed());
        }
    }
    Ok(())
}

/// Handle the 'benchmark' command
async fn handle_benchmark(service: Arc<Service>, session: &Session, requests: usize, concurrent: usize) -> Result<()> {
    let history = Arc::new(service.history(session).await);
    let count = service.engine().default_count();

    // Fail early rather than timing a hundred errors
    service.profile(session).await?;

    let limiter = Arc::new(Semaphore::new(concurrent.max(1)));
    let wall = Instant::now();

    // Use tokio::spawn to make concurrent requests; the engine is called
    // directly so the ranking cache does not hide the work
    let mut handles = Vec::with_capacity(requests);
    for _ in 0..requests {
        let service = service.clone();
        let history = history.clone();
        let limiter = limiter.clone();
        handles.push(tokio::spawn(async move {
            let _permit = limiter.acquire_owned().await?;
            let start = Instant::now();
            service.engine().recommend(&history, &HashSet::new(), count).await?;
            Ok::<_, anyhow::Error>(start.elapsed())
        }));
    }

    let mut timings: Vec<Duration> = Vec::with_capacity(requests);
    for handle in handles {
        timings.push(handle.await??);
    }
    let total_time = wall.elapsed();

    if timings.is_empty() {
        println!("No requests made.");
        return Ok(());
    }
    timings.sort();
    let avg_latency = timings.iter().sum::<Duration>() / timings.len() as u32;
    let throughput = timings.len() as f64 / total_time.as_secs_f64();

    println!("{}", "Benchmark results:".bold().blue());
    println!("Requests: {} ({} concurrent)", timings.len(), concurrent);
    println!("Total time: {:?}", total_time);
    println!("Average latency: {:?}", avg_latency);
    println!("P50 latency: {:?}", percentile(&timings, 0.50));
    println!("P95 latency: {:?}", percentile(&timings, 0.95));
    println!("P99 latency: {:?}", percentile(&timings, 0.99));
    println!("Throughput: {:.2} requests/second", throughput);

    Ok(())
}

/// Nearest-rank percentile over sorted timings
fn percentile(sorted: &[Duration], p: f64) -> Duration {
    let rank = ((sorted.len() as f64 * p).ceil() as usize).clamp(1, sorted.len());
    sorted[rank - 1]
}

fn print_entry(entry: &HistoryEntry) {
    let rating = entry
        .rating
        .map(|r| format!("{:.1}/10", r))
        .unwrap_or_else(|| "unrated".to_string());
    let year = entry.release_year.map(|y| format!(" ({})", y)).unwrap_or_default();
    let watched = entry
        .watched_date
        .map(|d| format!(", watched {}", d))
        .unwrap_or_default();
    println!(
        "{}. {}{} [{}] - {}{}",
        entry.movie_id.to_string().green(),
        entry.title,
        year,
        join_genres(entry.genres.iter().map(|g| g.as_str())),
        rating,
        watched
    );
}

fn print_movie(movie: &CandidateMovie) {
    let year = movie.release_year.map(|y| format!(" ({})", y)).unwrap_or_default();
    println!(
        "{}. {}{} [{}]",
        movie.movie_id.to_string().green(),
        movie.title.bold(),
        year,
        join_genres(movie.genres.iter().map(|g| g.as_str()))
    );
    if let Some(vote) = movie.vote_average {
        println!("   Rated {:.1}/10, popularity {:.1}", vote, movie.popularity);
    }
    if let Some(overview) = &movie.overview {
        println!("   {}", overview);
    }
}

fn join_genres<'a>(genres: impl Iterator<Item = &'a str>) -> String {
    genres.collect::<Vec<_>>().join(", ")
}

/// Helper function to format and print recommendations
fn print_recommendations(recommendations: &[Recommendation], offset: usize, explain: bool) {
    println!("{}", "Movie Recommendations:".bold().blue());
    for (i, rec) in recommendations.iter().enumerate() {
        let rank = offset + i + 1;
        let movie = &rec.movie;
        let year = movie.release_year.map(|y| format!(" ({})", y)).unwrap_or_default();
        println!(
            "{}. {}{} [{}] - Score: {:.1}",
            rank.to_string().green(),
            movie.title,
            year,
            join_genres(movie.genres.iter().map(|g| g.as_str())),
            rec.display_score()
        );
        println!("   {}", rec.reasoning.italic());
        if explain {
            let b = &rec.breakdown;
            println!(
                "   genre {:.2} | rating {:.2} | popularity {:.2} | recency {:.2}",
                b.genre_match, b.rating_similarity, b.popularity_score, b.recency_bonus
            );
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_add_command() {
        let cli = Cli::try_parse_from([
            "reel-recs",
            "--user",
            "7",
            "add",
            "--title",
            "Heat",
            "--year",
            "1995",
            "--rating",
            "8.5",
            "--watched-date",
            "2024-01-02",
        ])
        .unwrap();

        assert_eq!(cli.user, 7);
        match cli.command {
            Commands::Add {
                title,
                year,
                rating,
                watched_date,
            } => {
                assert_eq!(title, "Heat");
                assert_eq!(year, Some(1995));
                assert_eq!(rating, Some(8.5));
                assert_eq!(watched_date, NaiveDate::from_ymd_opt(2024, 1, 2));
            }
            _ => panic!("expected the add command"),
        }
    }

    #[test]
    fn test_parse_show_and_chat_suggest() {
        let cli = Cli::try_parse_from(["reel-recs", "show", "--movie-id", "42"]).unwrap();
        assert!(matches!(cli.command, Commands::Show { movie_id: 42 }));

        let cli = Cli::try_parse_from(["reel-recs", "chat-suggest", "reply.txt"]).unwrap();
        assert!(matches!(cli.command, Commands::ChatSuggest { reply } if reply == PathBuf::from("reply.txt")));
    }

    #[test]
    fn test_add_rejects_bad_date() {
        assert!(Cli::try_parse_from(["reel-recs", "add", "--title", "Heat", "--watched-date", "yesterday"]).is_err());
    }

    #[test]
    fn test_percentile() {
        let timings: Vec<Duration> = (1..=100).map(Duration::from_millis).collect();
        assert_eq!(percentile(&timings, 0.50), Duration::from_millis(50));
        assert_eq!(percentile(&timings, 0.99), Duration::from_millis(99));
        assert_eq!(percentile(&timings[..1], 0.95), Duration::from_millis(1));
    }
}

//! Example: Build a preference profile from a CSV export
//!
//! Run with: cargo run --package sources --example build_profile -- <catalog.json> <export.csv>
//!
//! This example shows how to:
//! 1. Load a catalog as the metadata provider
//! 2. Parse a Letterboxd / IMDb / native CSV export
//! 3. Resolve the imported rows against the catalog
//! 4. Build and display the user's profile

use anyhow::{Context, Result, bail};
use data_loader::{HistoryStore, UserId, parser};
use sources::{CatalogProvider, PreferenceProfiler, resolve_imports};
use std::path::Path;
use std::time::Instant;

const LOCAL_USER: UserId = 1;

fn main() -> Result<()> {
    // Initialize logging
    tracing_subscriber::fmt().with_env_filter("info").init();

    let args: Vec<String> = std::env::args().collect();
    if args.len() != 3 {
        bail!("usage: build_profile <catalog.json> <export.csv>");
    }

    println!("=== ReelRecs Profile Example ===\n");

    let catalog = CatalogProvider::load_from_file(Path::new(&args[1]))
        .context("Failed to load catalog")?;
    println!("Catalog: {} movies", catalog.len());

    let batch = parser::read_history_csv(Path::new(&args[2])).context("Failed to read export")?;
    println!(
        "Parsed {} rows from a {} export ({} bad rows)",
        batch.rows.len(),
        batch.format.name(),
        batch.errors.len()
    );

    let start = Instant::now();
    let report = resolve_imports(&catalog, batch.rows);
    println!(
        "Resolved {} entries in {:?} ({} failures)\n",
        report.entries.len(),
        start.elapsed(),
        report.failures.len()
    );

    // Diary exports list rewatches as separate rows; merge them first
    let mut store = HistoryStore::new();
    for entry in report.entries {
        store.upsert(LOCAL_USER, entry)?;
    }
    let history = store.snapshot(LOCAL_USER);
    println!("{} distinct movies after merging rewatches", history.len());

    let profile = PreferenceProfiler::new().build(&history)?;

    println!("Rated: {}  Liked: {}", profile.rated_count, profile.liked_count);
    println!("Average rating: {:.2} (stddev {:.2})", profile.avg_rating, profile.rating_stddev);
    println!("Viewing frequency: {:.1} per month", profile.viewing_frequency);

    println!("\nTop genres:");
    for (genre, weight) in profile.top_genres(5) {
        println!("  {:<20} {:.1}", genre, weight);
    }

    let decades: Vec<String> = profile
        .preferred_decades
        .iter()
        .map(|d| format!("{}s", d))
        .collect();
    println!("\nPreferred decades: {}", decades.join(", "));

    Ok(())
}

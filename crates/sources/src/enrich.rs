//! Import enrichment
//!
//! CSV exports from Letterboxd and IMDb identify movies by title and year
//! only, and rarely carry genres. `resolve_imports` maps every imported
//! row onto a provider id and fills in missing metadata before the rows
//! become history entries.
//!
//! ## Rules
//! - Rows without an id are matched with `search(title, year)`; the best
//!   match wins. No match means the row is reported and dropped.
//! - Rows with an id but without genres or year are completed with
//!   `resolve(id)`. If that lookup fails the row is kept with what it has
//!   and the failure is reported.
//!
//! Lookups run in parallel on the rayon pool; output keeps input order.

use crate::provider::{MetadataProvider, ProviderError};
use data_loader::{CandidateMovie, HistoryEntry, ImportedMovie};
use rayon::prelude::*;
use std::fmt;
use tracing::{info, instrument, warn};

/// What went wrong for one imported row
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FailureKind {
    /// No provider id could be found; the row was dropped
    Unresolved,
    /// The row was kept, but genres or year could not be filled in
    MetadataMissing,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ImportFailure {
    pub line: usize,
    pub title: String,
    pub kind: FailureKind,
    pub reason: String,
}

impl fmt::Display for ImportFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let action = match self.kind {
            FailureKind::Unresolved => "skipped",
            FailureKind::MetadataMissing => "kept without metadata",
        };
        write!(f, "line {}: \"{}\" {} ({})", self.line, self.title, action, self.reason)
    }
}

/// Result of enriching a batch of imported rows
#[derive(Debug, Default)]
pub struct ImportReport {
    pub entries: Vec<HistoryEntry>,
    pub failures: Vec<ImportFailure>,
}

impl ImportReport {
    pub fn skipped(&self) -> usize {
        self.failures
            .iter()
            .filter(|f| f.kind == FailureKind::Unresolved)
            .count()
    }
}

/// Resolve imported rows into history entries
#[instrument(skip(provider, rows), fields(rows = rows.len(), provider = provider.name()))]
pub fn resolve_imports<P>(provider: &P, rows: Vec<ImportedMovie>) -> ImportReport
where
    P: MetadataProvider + ?Sized,
{
    let outcomes: Vec<(Option<HistoryEntry>, Option<ImportFailure>)> = rows
        .into_par_iter()
        .map(|row| resolve_row(provider, row))
        .collect();

    let mut report = ImportReport::default();
    for (entry, failure) in outcomes {
        if let Some(entry) = entry {
            report.entries.push(entry);
        }
        if let Some(failure) = failure {
            warn!("Import {}", failure);
            report.failures.push(failure);
        }
    }

    info!(
        "Resolved {} imported rows ({} failures, {} skipped)",
        report.entries.len(),
        report.failures.len(),
        report.skipped()
    );
    report
}

fn resolve_row<P>(provider: &P, row: ImportedMovie) -> (Option<HistoryEntry>, Option<ImportFailure>)
where
    P: MetadataProvider + ?Sized,
{
    match row.movie_id {
        Some(movie_id) => {
            if !row.genres.is_empty() && row.release_year.is_some() {
                return (Some(row.into_entry(movie_id)), None);
            }
            match provider.resolve(movie_id) {
                Ok(metadata) => (Some(complete(row, metadata)), None),
                Err(e) => {
                    let failure = row_failure(&row, FailureKind::MetadataMissing, e.to_string());
                    (Some(row.into_entry(movie_id)), Some(failure))
                }
            }
        }
        None => match lookup_title(provider, &row.title, row.release_year) {
            Ok(found) => match found {
                Some(best) => (Some(complete(row, best)), None),
                None => {
                    let failure = row_failure(&row, FailureKind::Unresolved, "no match".to_string());
                    (None, Some(failure))
                }
            },
            Err(e) => {
                let failure = row_failure(&row, FailureKind::Unresolved, e.to_string());
                (None, Some(failure))
            }
        },
    }
}

/// Best provider match for a title, if any
pub fn lookup_title<P>(provider: &P, title: &str, year: Option<u16>) -> Result<Option<CandidateMovie>, ProviderError>
where
    P: MetadataProvider + ?Sized,
{
    Ok(provider.search(title, year)?.into_iter().next())
}

/// Fill whatever the row lacks from provider metadata. The provider's
/// title replaces the row's spelling.
fn complete(row: ImportedMovie, metadata: CandidateMovie) -> HistoryEntry {
    let mut entry = row.into_entry(metadata.movie_id);
    entry.title = metadata.title;
    if entry.genres.is_empty() {
        entry.genres = metadata.genres;
    }
    if entry.release_year.is_none() {
        entry.release_year = metadata.release_year;
    }
    entry
}

fn row_failure(row: &ImportedMovie, kind: FailureKind, reason: String) -> ImportFailure {
    ImportFailure {
        line: row.line,
        title: row.title.clone(),
        kind,
        reason,
    }
}

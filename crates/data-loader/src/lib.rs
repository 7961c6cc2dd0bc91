//! # Data Loader Crate
//!
//! Domain types and viewing-history ingestion for the ReelRecs engine.
//!
//! ## Main Components
//!
//! - **types**: Core domain types (HistoryEntry, CandidateMovie, Genre)
//! - **parser**: Parse Letterboxd / IMDb / native CSV exports
//! - **store**: Per-user history store with JSON persistence
//! - **error**: Error types for data loading
//!
//! ## Example Usage
//!
//! ```ignore
//! use data_loader::{parser, HistoryStore};
//! use std::path::Path;
//!
//! let batch = parser::read_history_csv(Path::new("ratings.csv"))?;
//! println!("{} rows from a {} export", batch.rows.len(), batch.format.name());
//!
//! let mut store = HistoryStore::load_from_file(Path::new("history.json"))?;
//! let snapshot = store.snapshot(1);
//! ```

// Public modules
pub mod error;
pub mod types;
pub mod parser;
pub mod store;

// Re-export commonly used types for convenience
pub use error::{DataLoadError, Result};
pub use parser::{ImportBatch, ImportFormat};
pub use store::{HistoryStore, UpsertOutcome};
pub use types::{
    // Type aliases
    UserId,
    MovieId,
    // Core types
    CandidateMovie,
    Genre,
    HistoryEntry,
    ImportedMovie,
    // Rating scale
    MAX_RATING,
    MIN_RATING,
    decade_of,
    is_valid_rating,
};

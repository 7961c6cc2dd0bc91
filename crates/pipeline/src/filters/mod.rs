//! Filter implementations for the candidate pipeline.
//!
//! This module contains the concrete filters that can be composed into a
//! FilterPipeline.

pub mod duplicate;
pub mod excluded;

// Re-export for convenience
pub use duplicate::DuplicateFilter;
pub use excluded::ExcludedFilter;

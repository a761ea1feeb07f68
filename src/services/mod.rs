//! Business logic services.
//!
//! - [`deduplication`]: pairwise scoring of contacts
//! - [`MergeResolver`]: unions two contacts and deletes the secondary
//! - [`DuplicateManager`]: the service applications hold on to

pub mod deduplication;
mod manager;
mod merge;

pub use deduplication::{DuplicateScanner, PairScore, ScoringConfig};
pub use manager::{DuplicateCommand, DuplicateManager, DuplicateOutcome, ScanReport};
pub use merge::{MergePreview, MergeResolver};

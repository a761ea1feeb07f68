//! # Contact Dedup
//!
//! Duplicate contact detection, review and merge for a local contact book.
//!
//! The crate scans a contact set for likely duplicates, keeps the resulting
//! suggestions in a persistent store, and resolves them either by merging
//! the pair into one contact or by dismissing the suggestion.
//!
//! ## Components
//!
//! - [`DuplicateScanner`]: pure, deterministic pairwise scoring
//! - [`SuggestionStore`]: persisted suggestion lifecycle (pending, dismissed, merged)
//! - [`MergeResolver`]: all-or-nothing union of two contacts
//! - [`DuplicateManager`]: the injectable service tying the three together
//!
//! ## Example
//!
//! ```rust,ignore
//! use contact_dedup::{AppConfig, DuplicateManager};
//!
//! let manager = DuplicateManager::open(&AppConfig::load_default())?;
//! manager.scan_for_duplicates()?;
//! for suggestion in manager.load_pending_suggestions()? {
//!     println!("{} <-> {} ({})", suggestion.contact1_id, suggestion.contact2_id, suggestion.score);
//! }
//! ```

#![deny(clippy::all)]
#![warn(clippy::pedantic)]
#![warn(clippy::nursery)]
#![warn(missing_docs)]
#![forbid(unsafe_code)]
#![allow(clippy::multiple_crate_versions)]

use thiserror::Error as ThisError;

pub mod config;
pub mod models;
pub mod observability;
pub mod services;
pub mod storage;

pub use config::{AppConfig, DismissalPolicy, LoggingSettings};
pub use models::{
    Contact, ContactEvent, ContactGroup, ContactId, ContactPair, DuplicateMatchReason,
    DuplicateSuggestion, LabeledValue, SeverityBand, SuggestionId, SuggestionStatus,
};
pub use services::{
    DuplicateCommand, DuplicateManager, DuplicateOutcome, DuplicateScanner, MergePreview,
    MergeResolver, ScanReport, ScoringConfig,
};
pub use storage::{
    ContactRepository, SqliteContactRepository, SqliteSuggestionStore, StorageFactory,
    SuggestionStore,
};

/// Error type for duplicate detection and merge operations.
///
/// # Error Variant Triggers
///
/// | Variant | Raised When |
/// |---------|-------------|
/// | `InvalidInput` | Self-merge, malformed contact import, out-of-range config values |
/// | `NotFound` | A contact or suggestion vanished before a merge or dismiss |
/// | `Conflict` | A merge touches a contact already claimed by another in-flight merge |
/// | `OperationFailed` | `SQLite`, filesystem or serialization failures |
#[derive(Debug, ThisError)]
pub enum Error {
    /// Invalid input was provided.
    ///
    /// Raised when:
    /// - A contact is merged with itself
    /// - A merge names a primary contact that is not part of the suggestion
    /// - An imported contact has a malformed email address
    /// - A configuration value is out of range
    #[error("invalid input: {0}")]
    InvalidInput(String),

    /// A referenced entity does not exist.
    #[error("{kind} '{id}' not found")]
    NotFound {
        /// Kind of entity ("contact", "suggestion").
        kind: &'static str,
        /// Identifier that was looked up.
        id: String,
    },

    /// The operation collides with another in-flight operation.
    #[error("conflict: {0}")]
    Conflict(String),

    /// An operation failed.
    ///
    /// Raised when:
    /// - `SQLite` database operations fail
    /// - Filesystem I/O errors occur
    /// - Stored JSON cannot be decoded
    #[error("operation '{operation}' failed: {cause}")]
    OperationFailed {
        /// The operation that failed.
        operation: String,
        /// The underlying cause.
        cause: String,
    },
}

impl Error {
    /// Creates a `NotFound` error for a contact.
    #[must_use]
    pub fn contact_not_found(id: impl ToString) -> Self {
        Self::NotFound {
            kind: "contact",
            id: id.to_string(),
        }
    }

    /// Creates a `NotFound` error for a suggestion.
    #[must_use]
    pub fn suggestion_not_found(id: impl ToString) -> Self {
        Self::NotFound {
            kind: "suggestion",
            id: id.to_string(),
        }
    }

    /// Returns `true` if the error means the referenced data is gone.
    #[must_use]
    pub const fn is_not_found(&self) -> bool {
        matches!(self, Self::NotFound { .. })
    }
}

/// Result type alias for contact-dedup operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Returns the current Unix timestamp in seconds.
///
/// Falls back to 0 if the system clock is before the Unix epoch.
///
/// # Examples
///
/// ```rust
/// use contact_dedup::current_timestamp;
///
/// assert!(current_timestamp() > 0);
/// ```
#[must_use]
pub fn current_timestamp() -> u64 {
    use std::time::{SystemTime, UNIX_EPOCH};
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs())
        .unwrap_or(0)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = Error::InvalidInput("test error".to_string());
        assert_eq!(err.to_string(), "invalid input: test error");

        let err = Error::OperationFailed {
            operation: "test".to_string(),
            cause: "failed".to_string(),
        };
        assert_eq!(err.to_string(), "operation 'test' failed: failed");

        let err = Error::contact_not_found("c-1");
        assert_eq!(err.to_string(), "contact 'c-1' not found");
        assert!(err.is_not_found());

        let err = Error::Conflict("busy".to_string());
        assert_eq!(err.to_string(), "conflict: busy");
        assert!(!err.is_not_found());
    }
}

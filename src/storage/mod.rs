//! Storage layer.
//!
//! Two traits back the duplicate subsystem:
//! - [`ContactRepository`]: the contact book the scanner reads and the merge writes
//! - [`SuggestionStore`]: suggestion lifecycle state (pending, dismissed, merged)
//!
//! Only `SQLite` is implemented.

// Dropping the connection guard a few statements early buys nothing here.
#![allow(clippy::significant_drop_tightening)]

pub mod sqlite;
pub mod traits;

pub use sqlite::{SqliteContactRepository, SqliteSuggestionStore};
pub use traits::{ContactRepository, RecordSummary, SuggestionStore};

use crate::config::AppConfig;
use crate::Result;
use std::path::Path;
use std::sync::Arc;

/// Contact repository and suggestion store opened together.
#[derive(Clone)]
pub struct StorageHandles {
    /// Contact repository.
    pub contacts: Arc<dyn ContactRepository>,
    /// Suggestion store.
    pub suggestions: Arc<dyn SuggestionStore>,
}

/// Factory for creating storage backends.
pub struct StorageFactory;

impl StorageFactory {
    /// Opens both backends on the database configured in `config`.
    ///
    /// # Errors
    ///
    /// Returns an error if the database cannot be opened or initialized.
    pub fn create(config: &AppConfig) -> Result<StorageHandles> {
        Self::create_with_path(&config.database_path(), config)
    }

    /// Opens both backends on an explicit database path.
    ///
    /// # Errors
    ///
    /// Returns an error if the database cannot be opened or initialized.
    pub fn create_with_path(path: &Path, config: &AppConfig) -> Result<StorageHandles> {
        tracing::debug!(path = %path.display(), "Opening contact database");
        let contacts = SqliteContactRepository::new(path)?;
        let suggestions = SqliteSuggestionStore::new(path)?.with_policy(config.dismissal);
        Ok(StorageHandles {
            contacts: Arc::new(contacts),
            suggestions: Arc::new(suggestions),
        })
    }

    /// Creates in-memory backends (useful for testing).
    ///
    /// # Errors
    ///
    /// Returns an error if the database cannot be initialized.
    pub fn create_in_memory(config: &AppConfig) -> Result<StorageHandles> {
        Ok(StorageHandles {
            contacts: Arc::new(SqliteContactRepository::in_memory()?),
            suggestions: Arc::new(
                SqliteSuggestionStore::in_memory()?.with_policy(config.dismissal),
            ),
        })
    }
}

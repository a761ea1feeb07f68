//! Storage trait definitions.
//!
//! Defines the contact repository consumed by the duplicate subsystem and the
//! store that persists suggestion lifecycle state.

use crate::Result;
use crate::models::{Contact, ContactId, ContactPair, DuplicateSuggestion, SuggestionId};
use std::collections::HashSet;

/// Trait for contact persistence.
///
/// Implementations must be thread-safe (`Send + Sync`).
pub trait ContactRepository: Send + Sync {
    /// Inserts a new contact.
    ///
    /// # Errors
    ///
    /// Returns [`crate::Error::InvalidInput`] if the ID already exists, or an
    /// error if storage cannot be accessed.
    fn insert(&self, contact: &Contact) -> Result<()>;

    /// Gets a contact by ID.
    ///
    /// # Errors
    ///
    /// Returns an error if storage cannot be accessed.
    fn get(&self, id: &ContactId) -> Result<Option<Contact>>;

    /// Lists all contacts ordered by family then given name.
    ///
    /// # Errors
    ///
    /// Returns an error if storage cannot be accessed.
    fn list(&self) -> Result<Vec<Contact>>;

    /// Replaces a stored contact, including its phones and emails.
    ///
    /// # Returns
    ///
    /// True if the contact existed and was updated.
    ///
    /// # Errors
    ///
    /// Returns an error if storage cannot be accessed.
    fn update(&self, contact: &Contact) -> Result<bool>;

    /// Deletes a contact.
    ///
    /// # Returns
    ///
    /// True if the contact was deleted, false if it didn't exist.
    ///
    /// # Errors
    ///
    /// Returns an error if storage cannot be accessed.
    fn delete(&self, id: &ContactId) -> Result<bool>;

    /// Number of stored contacts.
    ///
    /// # Errors
    ///
    /// Returns an error if storage cannot be accessed.
    fn count(&self) -> Result<usize>;

    /// Writes the merged primary and deletes the secondary as one unit.
    ///
    /// Either both changes are applied or neither is.
    ///
    /// # Errors
    ///
    /// Returns [`crate::Error::NotFound`] if either contact is missing at
    /// commit time, or an error if storage cannot be accessed.
    fn apply_merge(&self, primary: &Contact, secondary_id: &ContactId) -> Result<()>;
}

/// Outcome counts of a [`SuggestionStore::record`] call.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RecordSummary {
    /// New pairs stored as pending.
    pub inserted: usize,
    /// Already-pending pairs whose score or reasons were refreshed.
    pub updated: usize,
    /// Dismissed pairs reopened because their data changed.
    pub resurfaced: usize,
    /// Pairs skipped because they were dismissed or merged.
    pub suppressed: usize,
}

/// Trait for suggestion persistence.
///
/// Writes are serialized by the implementation, so a scan recording results
/// cannot lose an update made by a concurrent dismiss.
pub trait SuggestionStore: Send + Sync {
    /// Returns pending suggestions whose contacts both still exist.
    ///
    /// # Errors
    ///
    /// Returns an error if storage cannot be accessed.
    fn load_pending(&self, existing: &HashSet<ContactId>) -> Result<Vec<DuplicateSuggestion>>;

    /// Persists scan results without duplicating pairs.
    ///
    /// At most one row exists per unordered pair. Pending pairs are refreshed,
    /// dismissed pairs stay dismissed unless their fingerprint changed and the
    /// store allows resurfacing, merged pairs are never reopened.
    ///
    /// # Errors
    ///
    /// Returns an error if storage cannot be accessed. No partial batch is kept.
    fn record(&self, suggestions: &[DuplicateSuggestion]) -> Result<RecordSummary>;

    /// Marks a suggestion as not-a-duplicate.
    ///
    /// # Returns
    ///
    /// True if the status changed; false if it was already dismissed or merged.
    ///
    /// # Errors
    ///
    /// Returns [`crate::Error::NotFound`] for an unknown ID.
    fn dismiss(&self, id: &SuggestionId) -> Result<bool>;

    /// Marks a suggestion as resolved by merge.
    ///
    /// # Returns
    ///
    /// True if the status changed; false if it was already merged.
    ///
    /// # Errors
    ///
    /// Returns [`crate::Error::NotFound`] for an unknown ID.
    fn mark_merged(&self, id: &SuggestionId) -> Result<bool>;

    /// Gets a suggestion by ID regardless of status.
    ///
    /// # Errors
    ///
    /// Returns an error if storage cannot be accessed.
    fn get(&self, id: &SuggestionId) -> Result<Option<DuplicateSuggestion>>;

    /// Number of pending suggestions (badge count).
    ///
    /// # Errors
    ///
    /// Returns an error if storage cannot be accessed.
    fn pending_count(&self) -> Result<usize>;

    /// Deletes pending suggestions for pairs not in `detected`.
    ///
    /// # Returns
    ///
    /// Number of suggestions deleted.
    ///
    /// # Errors
    ///
    /// Returns an error if storage cannot be accessed.
    fn expire_stale(&self, detected: &[ContactPair]) -> Result<usize>;

    /// Deletes pending and dismissed suggestions that reference a contact not in `existing`.
    ///
    /// Merged suggestions are kept as history.
    ///
    /// # Returns
    ///
    /// Number of suggestions deleted.
    ///
    /// # Errors
    ///
    /// Returns an error if storage cannot be accessed.
    fn prune_orphans(&self, existing: &HashSet<ContactId>) -> Result<usize>;
}

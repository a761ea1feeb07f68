//! Duplicate manager.
//!
//! The injectable service the rest of an application talks to. It owns the
//! scanner, the merge resolver and both stores, and exposes:
//!
//! - [`DuplicateManager::scan_for_duplicates`]: scan + record + cleanup
//! - [`DuplicateManager::load_pending_suggestions`]: badge/list data
//! - [`DuplicateManager::merge_contacts`]: merge + mark suggestion merged
//! - [`DuplicateManager::dismiss_suggestion`]: mark not-a-duplicate
//!
//! The same operations are reachable through [`DuplicateCommand`] and
//! [`DuplicateManager::handle`]. Rescans on contact-set changes are driven
//! by [`DuplicateManager::spawn_watcher`].

use super::deduplication::DuplicateScanner;
use super::merge::MergeResolver;
use crate::config::AppConfig;
use crate::models::{
    Contact, ContactEvent, ContactId, ContactPair, DuplicateSuggestion, EventMeta, SuggestionId,
    SuggestionStatus,
};
use crate::observability::EventBus;
use crate::services::deduplication::is_valid_email;
use crate::storage::{
    ContactRepository, RecordSummary, StorageFactory, StorageHandles, SuggestionStore,
};
use crate::{Error, Result};
use std::collections::HashSet;
use std::sync::Arc;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::instrument;

const EVENT_SOURCE: &str = "duplicates";

/// Commands accepted by [`DuplicateManager::handle`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DuplicateCommand {
    /// Rescan the contact set and record the results.
    Scan,
    /// Return pending suggestions.
    LoadPending,
    /// Merge the pair named by a suggestion.
    Merge {
        /// Suggestion to resolve.
        suggestion_id: SuggestionId,
        /// Contact to keep; defaults to the suggestion's first contact.
        primary_id: Option<ContactId>,
    },
    /// Mark a suggestion as not-a-duplicate.
    Dismiss {
        /// Suggestion to dismiss.
        suggestion_id: SuggestionId,
    },
}

/// Outcome of a [`DuplicateCommand`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DuplicateOutcome {
    /// A scan finished.
    Scanned(ScanReport),
    /// Pending suggestions, highest score first.
    Pending(Vec<DuplicateSuggestion>),
    /// Two contacts were merged.
    Merged {
        /// The surviving contact after the merge.
        contact: Contact,
        /// The resolved suggestion.
        suggestion_id: SuggestionId,
    },
    /// A suggestion was dismissed.
    Dismissed {
        /// The dismissed suggestion.
        suggestion_id: SuggestionId,
        /// False if it was already dismissed or merged.
        changed: bool,
    },
}

/// Summary of one scan.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ScanReport {
    /// Contacts scanned.
    pub contacts: usize,
    /// Pairs at or above the minimum score.
    pub detected: usize,
    /// How the detected pairs were recorded.
    pub recorded: RecordSummary,
    /// Pending suggestions no longer detected and removed.
    pub expired: usize,
    /// Suggestions removed because a contact is gone.
    pub pruned: usize,
    /// Pending suggestions after the scan.
    pub pending: usize,
}

/// Service coordinating duplicate detection, review and resolution.
pub struct DuplicateManager {
    contacts: Arc<dyn ContactRepository>,
    suggestions: Arc<dyn SuggestionStore>,
    scanner: DuplicateScanner,
    resolver: MergeResolver,
    events: EventBus,
}

impl DuplicateManager {
    /// Creates a manager from explicit collaborators.
    #[must_use]
    pub fn new(
        contacts: Arc<dyn ContactRepository>,
        suggestions: Arc<dyn SuggestionStore>,
        scanner: DuplicateScanner,
        events: EventBus,
    ) -> Self {
        Self {
            resolver: MergeResolver::new(Arc::clone(&contacts)),
            contacts,
            suggestions,
            scanner,
            events,
        }
    }

    /// Creates a manager over opened storage handles.
    #[must_use]
    pub fn from_handles(handles: StorageHandles, config: &AppConfig, events: EventBus) -> Self {
        Self::new(
            handles.contacts,
            handles.suggestions,
            DuplicateScanner::new(config.scoring.clone()),
            events,
        )
    }

    /// Opens the configured database and creates a manager with a fresh event bus.
    ///
    /// # Errors
    ///
    /// Returns an error if the configuration is invalid or the database
    /// cannot be opened.
    pub fn open(config: &AppConfig) -> Result<Self> {
        config.validate()?;
        let handles = StorageFactory::create(config)?;
        Ok(Self::from_handles(handles, config, EventBus::default()))
    }

    /// Returns the contact repository.
    #[must_use]
    pub fn contacts(&self) -> &Arc<dyn ContactRepository> {
        &self.contacts
    }

    /// Returns the suggestion store.
    #[must_use]
    pub fn suggestions(&self) -> &Arc<dyn SuggestionStore> {
        &self.suggestions
    }

    /// Returns the event bus.
    #[must_use]
    pub const fn events(&self) -> &EventBus {
        &self.events
    }

    /// Returns the scanner.
    #[must_use]
    pub const fn scanner(&self) -> &DuplicateScanner {
        &self.scanner
    }

    /// Dispatches a command.
    ///
    /// # Errors
    ///
    /// Returns the error of the underlying operation.
    pub fn handle(&self, command: DuplicateCommand) -> Result<DuplicateOutcome> {
        match command {
            DuplicateCommand::Scan => self.scan_for_duplicates().map(DuplicateOutcome::Scanned),
            DuplicateCommand::LoadPending => self
                .load_pending_suggestions()
                .map(DuplicateOutcome::Pending),
            DuplicateCommand::Merge {
                suggestion_id,
                primary_id,
            } => {
                let contact = self.merge_suggestion(&suggestion_id, primary_id.as_ref())?;
                Ok(DuplicateOutcome::Merged {
                    contact,
                    suggestion_id,
                })
            },
            DuplicateCommand::Dismiss { suggestion_id } => {
                let changed = self.dismiss_suggestion(&suggestion_id)?;
                Ok(DuplicateOutcome::Dismissed {
                    suggestion_id,
                    changed,
                })
            },
        }
    }

    /// Scans all contacts and records the results.
    ///
    /// Pending suggestions for pairs no longer detected are expired, and
    /// suggestions naming deleted contacts are pruned.
    ///
    /// # Errors
    ///
    /// Returns an error if contacts cannot be read or suggestions cannot be
    /// written. A failed write leaves the previously stored state intact.
    #[instrument(skip(self))]
    pub fn scan_for_duplicates(&self) -> Result<ScanReport> {
        let contacts = self.contacts.list()?;
        let existing: HashSet<ContactId> = contacts.iter().map(|c| c.id.clone()).collect();

        let detected = self.scanner.scan(&contacts);
        let pairs: Vec<ContactPair> =
            detected.iter().filter_map(DuplicateSuggestion::pair).collect();

        let recorded = self.suggestions.record(&detected).inspect_err(|e| {
            tracing::warn!(error = %e, "Failed to record scan results");
        })?;
        let expired = self.suggestions.expire_stale(&pairs)?;
        let pruned = self.suggestions.prune_orphans(&existing)?;
        let pending = self.pending_count()?;

        let report = ScanReport {
            contacts: contacts.len(),
            detected: detected.len(),
            recorded,
            expired,
            pruned,
            pending,
        };
        tracing::info!(
            contacts = report.contacts,
            detected = report.detected,
            inserted = recorded.inserted,
            resurfaced = recorded.resurfaced,
            expired,
            pruned,
            pending,
            "Scan recorded"
        );
        self.events.publish(ContactEvent::SuggestionsUpdated {
            meta: EventMeta::new(EVENT_SOURCE),
            pending,
        });
        Ok(report)
    }

    /// Runs [`Self::scan_for_duplicates`] on the blocking thread pool.
    ///
    /// # Errors
    ///
    /// Returns the scan error, or [`Error::OperationFailed`] if the blocking
    /// task panicked.
    pub async fn scan_for_duplicates_async(self: Arc<Self>) -> Result<ScanReport> {
        tokio::task::spawn_blocking(move || self.scan_for_duplicates())
            .await
            .map_err(|e| Error::OperationFailed {
                operation: "scan_join".to_string(),
                cause: e.to_string(),
            })?
    }

    /// Returns pending suggestions whose contacts still exist, highest score first.
    ///
    /// # Errors
    ///
    /// Returns an error if storage cannot be read.
    pub fn load_pending_suggestions(&self) -> Result<Vec<DuplicateSuggestion>> {
        let existing: HashSet<ContactId> =
            self.contacts.list()?.into_iter().map(|c| c.id).collect();
        self.suggestions.load_pending(&existing)
    }

    /// Number of pending suggestions whose contacts still exist.
    ///
    /// Always equals the length of [`Self::load_pending_suggestions`].
    ///
    /// # Errors
    ///
    /// Returns an error if storage cannot be read.
    pub fn pending_count(&self) -> Result<usize> {
        Ok(self.load_pending_suggestions()?.len())
    }

    /// Merges `secondary_id` into `primary_id` and resolves `suggestion_id`.
    ///
    /// # Errors
    ///
    /// - [`Error::NotFound`] if the suggestion or either contact is gone
    /// - [`Error::InvalidInput`] for a self-merge or a pair that does not
    ///   match the suggestion
    /// - [`Error::Conflict`] if another merge holds either contact
    /// - [`Error::OperationFailed`] if the contact write fails
    ///
    /// Once the contacts are merged, failing to update suggestion state is
    /// logged and does not fail the call.
    #[instrument(skip(self), fields(
        primary_id = %primary_id,
        secondary_id = %secondary_id,
        suggestion_id = %suggestion_id
    ))]
    pub fn merge_contacts(
        &self,
        primary_id: &ContactId,
        secondary_id: &ContactId,
        suggestion_id: &SuggestionId,
    ) -> Result<Contact> {
        let result = self.try_merge(primary_id, secondary_id, suggestion_id);
        let outcome = match &result {
            Ok(_) => "success",
            Err(Error::NotFound { .. }) => "not_found",
            Err(Error::Conflict(_)) => "conflict",
            Err(Error::InvalidInput(_)) => "invalid",
            Err(Error::OperationFailed { .. }) => "failed",
        };
        metrics::counter!("dedup_merges_total", "outcome" => outcome).increment(1);
        if let Err(e) = &result {
            tracing::warn!(error = %e, "Merge rejected");
        }
        result
    }

    fn try_merge(
        &self,
        primary_id: &ContactId,
        secondary_id: &ContactId,
        suggestion_id: &SuggestionId,
    ) -> Result<Contact> {
        if primary_id == secondary_id {
            return Err(Error::InvalidInput(format!(
                "cannot merge contact '{primary_id}' with itself"
            )));
        }
        let suggestion = self
            .suggestions
            .get(suggestion_id)?
            .ok_or_else(|| Error::suggestion_not_found(suggestion_id))?;
        if !suggestion.involves(primary_id) || !suggestion.involves(secondary_id) {
            return Err(Error::InvalidInput(format!(
                "suggestion '{suggestion_id}' does not pair '{primary_id}' with '{secondary_id}'"
            )));
        }
        if suggestion.status == SuggestionStatus::Merged {
            return Err(Error::Conflict(format!(
                "suggestion '{suggestion_id}' is already merged"
            )));
        }

        let merged = self.resolver.merge(primary_id, secondary_id)?;

        if let Err(e) = self.suggestions.mark_merged(suggestion_id) {
            tracing::warn!(error = %e, "Contacts merged but suggestion state not updated");
        }
        match self.contacts.list() {
            Ok(remaining) => {
                let existing: HashSet<ContactId> = remaining.iter().map(|c| c.id.clone()).collect();
                if let Err(e) = self.suggestions.prune_orphans(&existing) {
                    tracing::warn!(error = %e, "Failed to prune suggestions of merged contact");
                }
                self.events
                    .publish(ContactEvent::contact_set_changed(remaining.len()));
            },
            Err(e) => tracing::warn!(error = %e, "Failed to reload contacts after merge"),
        }

        self.events.publish(ContactEvent::ContactsMerged {
            meta: EventMeta::new(EVENT_SOURCE),
            primary_id: primary_id.clone(),
            secondary_id: secondary_id.clone(),
            suggestion_id: suggestion_id.clone(),
        });
        Ok(merged)
    }

    /// Merges the pair of a suggestion.
    ///
    /// `primary_id` picks the surviving contact; without it the suggestion's
    /// first contact is kept.
    ///
    /// # Errors
    ///
    /// Same as [`Self::merge_contacts`]; additionally [`Error::InvalidInput`]
    /// if `primary_id` is not part of the suggestion.
    pub fn merge_suggestion(
        &self,
        suggestion_id: &SuggestionId,
        primary_id: Option<&ContactId>,
    ) -> Result<Contact> {
        let suggestion = self
            .suggestions
            .get(suggestion_id)?
            .ok_or_else(|| Error::suggestion_not_found(suggestion_id))?;
        let pair = suggestion.pair().ok_or_else(|| {
            Error::InvalidInput(format!("suggestion '{suggestion_id}' pairs a contact with itself"))
        })?;

        let primary = primary_id.unwrap_or_else(|| pair.first());
        let secondary = pair.other(primary).ok_or_else(|| {
            Error::InvalidInput(format!(
                "contact '{primary}' is not part of suggestion '{suggestion_id}'"
            ))
        })?;
        self.merge_contacts(primary, secondary, suggestion_id)
    }

    /// Marks a suggestion as not-a-duplicate.
    ///
    /// # Returns
    ///
    /// True if the suggestion changed; false if it was already dismissed or merged.
    ///
    /// # Errors
    ///
    /// Returns [`Error::NotFound`] for an unknown suggestion, or an error if
    /// storage cannot be written.
    #[instrument(skip(self), fields(suggestion_id = %suggestion_id))]
    pub fn dismiss_suggestion(&self, suggestion_id: &SuggestionId) -> Result<bool> {
        let changed = self.suggestions.dismiss(suggestion_id).inspect_err(|e| {
            tracing::warn!(error = %e, "Dismiss failed");
        })?;
        if changed {
            metrics::counter!("dedup_dismissals_total").increment(1);
            tracing::info!("Suggestion dismissed");
            self.events.publish(ContactEvent::SuggestionDismissed {
                meta: EventMeta::new(EVENT_SOURCE),
                suggestion_id: suggestion_id.clone(),
            });
        }
        Ok(changed)
    }

    /// Inserts contacts and announces the new contact count.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidInput`] if a contact has a malformed email or a
    /// duplicate ID. Contacts before the failing one stay inserted.
    #[instrument(skip_all, fields(count = contacts.len()))]
    pub fn import_contacts(&self, contacts: &[Contact]) -> Result<usize> {
        for contact in contacts {
            if let Some(bad) = contact.emails.iter().find(|e| !is_valid_email(&e.value)) {
                return Err(Error::InvalidInput(format!(
                    "contact '{}' has malformed email '{}'",
                    contact.id, bad.value
                )));
            }
        }

        let mut inserted = 0;
        for contact in contacts {
            self.contacts.insert(contact)?;
            inserted += 1;
        }
        self.announce_count()?;
        Ok(inserted)
    }

    /// Deletes a contact, drops suggestions naming it and announces the new
    /// contact count.
    ///
    /// # Errors
    ///
    /// Returns [`Error::NotFound`] if the contact does not exist.
    pub fn remove_contact(&self, id: &ContactId) -> Result<()> {
        if !self.contacts.delete(id)? {
            return Err(Error::contact_not_found(id));
        }
        match self.contacts.list() {
            Ok(remaining) => {
                let existing: HashSet<ContactId> = remaining.into_iter().map(|c| c.id).collect();
                if let Err(e) = self.suggestions.prune_orphans(&existing) {
                    tracing::warn!(error = %e, "Failed to prune suggestions of removed contact");
                }
            },
            Err(e) => tracing::warn!(error = %e, "Failed to reload contacts after removal"),
        }
        self.announce_count()
    }

    fn announce_count(&self) -> Result<()> {
        let count = self.contacts.count()?;
        self.events.publish(ContactEvent::contact_set_changed(count));
        Ok(())
    }

    /// Rescans whenever the contact count changes.
    ///
    /// Subscribes before returning, so changes announced after this call are
    /// never missed. Edits that keep the count unchanged do not trigger a
    /// scan. Each rescan publishes the fresh pending list on the returned
    /// watch channel. The task ends at the first rescan after the receiver is
    /// dropped, or when the event bus closes.
    #[must_use]
    pub fn spawn_watcher(
        self: &Arc<Self>,
    ) -> (watch::Receiver<Vec<DuplicateSuggestion>>, JoinHandle<()>) {
        let mut changes = self.events.subscribe_event_type("contacts.changed");
        let initial = self.load_pending_suggestions().unwrap_or_else(|e| {
            tracing::warn!(error = %e, "Could not load pending suggestions for watcher");
            Vec::new()
        });
        let (tx, rx) = watch::channel(initial);
        let manager = Arc::clone(self);

        let handle = tokio::spawn(async move {
            let mut last_count: Option<usize> = None;
            loop {
                let count = match changes.recv().await {
                    Ok(ContactEvent::ContactSetChanged { count, .. }) => count,
                    Ok(_) => continue,
                    Err(_) => break,
                };
                if last_count == Some(count) {
                    tracing::debug!(count, "Contact count unchanged, skipping scan");
                    continue;
                }
                last_count = Some(count);

                if let Err(e) = Arc::clone(&manager).scan_for_duplicates_async().await {
                    tracing::warn!(error = %e, "Background scan failed");
                    continue;
                }
                match manager.load_pending_suggestions() {
                    Ok(pending) => {
                        if tx.send(pending).is_err() {
                            break;
                        }
                    },
                    Err(e) => tracing::warn!(error = %e, "Failed to load pending suggestions"),
                }
            }
            tracing::debug!("Duplicate watcher stopped");
        });

        (rx, handle)
    }
}

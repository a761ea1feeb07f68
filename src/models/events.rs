//! Contact and suggestion events for cross-component notifications.

use super::{ContactId, SuggestionId};
use crate::current_timestamp;
use uuid::Uuid;

/// Shared event metadata.
#[derive(Debug, Clone)]
pub struct EventMeta {
    /// Unique identifier for this event.
    pub event_id: String,
    /// Event source component.
    pub source: &'static str,
    /// Timestamp (Unix epoch seconds).
    pub timestamp: u64,
}

impl EventMeta {
    /// Creates new event metadata using the current timestamp.
    #[must_use]
    pub fn new(source: &'static str) -> Self {
        Self::with_timestamp(source, current_timestamp())
    }

    /// Creates new event metadata with a specified timestamp.
    #[must_use]
    pub fn with_timestamp(source: &'static str, timestamp: u64) -> Self {
        Self {
            event_id: Uuid::new_v4().to_string(),
            source,
            timestamp,
        }
    }
}

/// Events emitted by the contact book and the duplicate subsystem.
#[derive(Debug, Clone)]
pub enum ContactEvent {
    /// The contact collection changed size.
    ContactSetChanged {
        /// Event metadata.
        meta: EventMeta,
        /// Number of contacts after the change.
        count: usize,
    },
    /// A scan finished and the pending set was refreshed.
    SuggestionsUpdated {
        /// Event metadata.
        meta: EventMeta,
        /// Number of pending suggestions.
        pending: usize,
    },
    /// A suggestion was dismissed.
    SuggestionDismissed {
        /// Event metadata.
        meta: EventMeta,
        /// The dismissed suggestion.
        suggestion_id: SuggestionId,
    },
    /// Two contacts were merged.
    ContactsMerged {
        /// Event metadata.
        meta: EventMeta,
        /// Contact that absorbed the other.
        primary_id: ContactId,
        /// Contact that was deleted.
        secondary_id: ContactId,
        /// Suggestion resolved by the merge.
        suggestion_id: SuggestionId,
    },
}

impl ContactEvent {
    /// Convenience constructor for a contact-set change.
    #[must_use]
    pub fn contact_set_changed(count: usize) -> Self {
        Self::ContactSetChanged {
            meta: EventMeta::new("contacts"),
            count,
        }
    }

    /// Returns the event type name.
    #[must_use]
    pub const fn event_type(&self) -> &'static str {
        match self {
            Self::ContactSetChanged { .. } => "contacts.changed",
            Self::SuggestionsUpdated { .. } => "suggestions.updated",
            Self::SuggestionDismissed { .. } => "suggestion.dismissed",
            Self::ContactsMerged { .. } => "contacts.merged",
        }
    }

    /// Returns the event metadata.
    #[must_use]
    pub const fn meta(&self) -> &EventMeta {
        match self {
            Self::ContactSetChanged { meta, .. }
            | Self::SuggestionsUpdated { meta, .. }
            | Self::SuggestionDismissed { meta, .. }
            | Self::ContactsMerged { meta, .. } => meta,
        }
    }
}

//! Data models for contact deduplication.

mod contact;
mod events;
mod suggestion;

pub use contact::{Contact, ContactGroup, ContactId, LabeledValue};
pub use events::{ContactEvent, EventMeta};
pub use suggestion::{
    ContactPair, DuplicateMatchReason, DuplicateSuggestion, SeverityBand, SuggestionId,
    SuggestionStatus,
};

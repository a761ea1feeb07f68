//! Duplicate suggestion types.
//!
//! A [`DuplicateSuggestion`] names an unordered pair of contacts, an integer
//! confidence score and the signals that produced it.

use super::ContactId;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::fmt;

/// Unordered pair of distinct contacts, stored as (lower, higher).
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct ContactPair {
    low: ContactId,
    high: ContactId,
}

impl ContactPair {
    /// Creates a pair, ordering the IDs.
    ///
    /// Returns `None` for a self-pair.
    #[must_use]
    pub fn new(a: ContactId, b: ContactId) -> Option<Self> {
        match a.cmp(&b) {
            std::cmp::Ordering::Less => Some(Self { low: a, high: b }),
            std::cmp::Ordering::Greater => Some(Self { low: b, high: a }),
            std::cmp::Ordering::Equal => None,
        }
    }

    /// Lower ID of the pair.
    #[must_use]
    pub const fn first(&self) -> &ContactId {
        &self.low
    }

    /// Higher ID of the pair.
    #[must_use]
    pub const fn second(&self) -> &ContactId {
        &self.high
    }

    /// Returns `true` if either side is `id`.
    #[must_use]
    pub fn contains(&self, id: &ContactId) -> bool {
        &self.low == id || &self.high == id
    }

    /// Returns the side that is not `id`, if `id` is part of the pair.
    #[must_use]
    pub fn other(&self, id: &ContactId) -> Option<&ContactId> {
        if &self.low == id {
            Some(&self.high)
        } else if &self.high == id {
            Some(&self.low)
        } else {
            None
        }
    }
}

impl fmt::Display for ContactPair {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}+{}", self.low, self.high)
    }
}

/// Stable identifier of a suggestion.
///
/// Derived from the pair so that rescanning the same pair yields the same ID.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SuggestionId(String);

impl SuggestionId {
    /// Creates a suggestion ID from a raw string.
    #[must_use]
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// Derives the ID for a pair: first 16 hex chars of SHA-256 over both IDs.
    #[must_use]
    pub fn for_pair(pair: &ContactPair) -> Self {
        let mut hasher = Sha256::new();
        hasher.update(pair.first().as_str().as_bytes());
        hasher.update([0x1f]);
        hasher.update(pair.second().as_str().as_bytes());
        let digest = hex::encode(hasher.finalize());
        Self(digest[..16].to_string())
    }

    /// Returns the ID as a string slice.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for SuggestionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<&str> for SuggestionId {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

impl From<String> for SuggestionId {
    fn from(s: String) -> Self {
        Self(s)
    }
}

/// Lifecycle status of a suggestion.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SuggestionStatus {
    /// Awaiting review.
    #[default]
    Pending,
    /// Resolved as not a duplicate.
    Dismissed,
    /// Resolved by merging the pair.
    Merged,
}

impl SuggestionStatus {
    /// Returns the status as a string slice.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Dismissed => "dismissed",
            Self::Merged => "merged",
        }
    }

    /// Parses a status string.
    #[must_use]
    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "pending" => Some(Self::Pending),
            "dismissed" => Some(Self::Dismissed),
            "merged" => Some(Self::Merged),
            _ => None,
        }
    }
}

impl fmt::Display for SuggestionStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// A signal contributing to a suggestion's score.
///
/// Serialized as its raw code so that clients can map each reason to an icon.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum DuplicateMatchReason {
    /// Normalized display names are equal.
    #[serde(rename = "name")]
    SameName,
    /// Display names are close but not equal.
    #[serde(rename = "similarName")]
    SimilarName,
    /// A phone number is shared.
    #[serde(rename = "phone")]
    Phone,
    /// An email address is shared.
    #[serde(rename = "email")]
    Email,
    /// The organization is the same.
    #[serde(rename = "organization")]
    Organization,
    /// The birthday is the same.
    #[serde(rename = "birthday")]
    Birthday,
}

impl DuplicateMatchReason {
    /// All reasons in display order.
    pub const ALL: [Self; 6] = [
        Self::SameName,
        Self::SimilarName,
        Self::Phone,
        Self::Email,
        Self::Organization,
        Self::Birthday,
    ];

    /// Returns the raw code.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::SameName => "name",
            Self::SimilarName => "similarName",
            Self::Phone => "phone",
            Self::Email => "email",
            Self::Organization => "organization",
            Self::Birthday => "birthday",
        }
    }

    /// Parses a raw code; unknown codes yield `None`.
    #[must_use]
    pub fn from_raw_value(raw: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|reason| reason.as_str() == raw)
    }

    /// Symbol name used to render the reason.
    #[must_use]
    pub const fn icon(&self) -> &'static str {
        match self {
            Self::SameName => "person.2.fill",
            Self::SimilarName => "person.fill.questionmark",
            Self::Phone => "phone.fill",
            Self::Email => "envelope.fill",
            Self::Organization => "building.2.fill",
            Self::Birthday => "gift.fill",
        }
    }

    /// Human-readable label.
    #[must_use]
    pub const fn label(&self) -> &'static str {
        match self {
            Self::SameName => "Same name",
            Self::SimilarName => "Similar name",
            Self::Phone => "Same phone number",
            Self::Email => "Same email",
            Self::Organization => "Same organization",
            Self::Birthday => "Same birthday",
        }
    }
}

impl fmt::Display for DuplicateMatchReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Display severity derived from a score.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SeverityBand {
    /// Below 60.
    Low,
    /// 60 to 79.
    Medium,
    /// 80 and above.
    High,
}

impl SeverityBand {
    /// Maps a score onto its band.
    #[must_use]
    pub const fn from_score(score: u8) -> Self {
        if score >= 80 {
            Self::High
        } else if score >= 60 {
            Self::Medium
        } else {
            Self::Low
        }
    }

    /// Returns the band as a string slice.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Low => "low",
            Self::Medium => "medium",
            Self::High => "high",
        }
    }
}

/// A scored candidate pair of contacts believed to be the same person.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DuplicateSuggestion {
    /// Stable identifier.
    pub id: SuggestionId,
    /// Lower contact ID of the pair.
    pub contact1_id: ContactId,
    /// Higher contact ID of the pair.
    pub contact2_id: ContactId,
    /// Confidence in `0..=100`.
    pub score: u8,
    /// Signals behind the score, sorted and unique.
    pub match_reasons: Vec<DuplicateMatchReason>,
    /// Lifecycle status.
    pub status: SuggestionStatus,
    /// Digest of the match-relevant data of both contacts at scan time.
    pub fingerprint: String,
    /// Creation timestamp (Unix epoch seconds).
    pub created_at: u64,
    /// Last update timestamp (Unix epoch seconds).
    pub updated_at: u64,
}

impl DuplicateSuggestion {
    /// Creates a pending suggestion for a pair.
    ///
    /// Reasons are sorted and deduplicated; the score is clamped to 100.
    #[must_use]
    pub fn pending(
        pair: &ContactPair,
        score: u8,
        mut match_reasons: Vec<DuplicateMatchReason>,
        fingerprint: impl Into<String>,
    ) -> Self {
        match_reasons.sort_unstable();
        match_reasons.dedup();
        let now = crate::current_timestamp();
        Self {
            id: SuggestionId::for_pair(pair),
            contact1_id: pair.first().clone(),
            contact2_id: pair.second().clone(),
            score: score.min(100),
            match_reasons,
            status: SuggestionStatus::Pending,
            fingerprint: fingerprint.into(),
            created_at: now,
            updated_at: now,
        }
    }

    /// Returns the pair this suggestion refers to.
    ///
    /// `None` only for a malformed self-pair read from storage.
    #[must_use]
    pub fn pair(&self) -> Option<ContactPair> {
        ContactPair::new(self.contact1_id.clone(), self.contact2_id.clone())
    }

    /// Returns the display severity.
    #[must_use]
    pub const fn severity(&self) -> SeverityBand {
        SeverityBand::from_score(self.score)
    }

    /// Returns `true` while the suggestion awaits review.
    #[must_use]
    pub fn is_pending(&self) -> bool {
        self.status == SuggestionStatus::Pending
    }

    /// Returns `true` if the suggestion names `id`.
    #[must_use]
    pub fn involves(&self, id: &ContactId) -> bool {
        &self.contact1_id == id || &self.contact2_id == id
    }
}

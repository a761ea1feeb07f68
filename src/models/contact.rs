//! Contact types and identifiers.
//!
//! A [`Contact`] carries the fields the duplicate subsystem reads (names,
//! organization, phones, emails, birthday) and the fields a merge may fill in
//! (birthday, photo).

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Unique identifier for a contact.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ContactId(String);

impl ContactId {
    /// Creates a new contact ID.
    #[must_use]
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// Generates a new random contact ID using UUID v4.
    #[must_use]
    pub fn generate() -> Self {
        Self(uuid::Uuid::new_v4().to_string())
    }

    /// Returns the ID as a string slice.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ContactId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<String> for ContactId {
    fn from(s: String) -> Self {
        Self(s)
    }
}

impl From<&str> for ContactId {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

/// A labeled value such as a phone number ("mobile") or email ("work").
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LabeledValue {
    /// Free-form label.
    #[serde(default)]
    pub label: String,
    /// The raw value as entered.
    pub value: String,
}

impl LabeledValue {
    /// Creates a labeled value.
    #[must_use]
    pub fn new(label: impl Into<String>, value: impl Into<String>) -> Self {
        Self {
            label: label.into(),
            value: value.into(),
        }
    }
}

/// Group classification of a contact.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ContactGroup {
    /// Family members.
    Family,
    /// Friends.
    Friends,
    /// Work contacts.
    Work,
    /// Everything else.
    #[default]
    Other,
}

impl ContactGroup {
    /// Returns the group as a string slice.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Family => "family",
            Self::Friends => "friends",
            Self::Work => "work",
            Self::Other => "other",
        }
    }

    /// Parses a group name, case-insensitively.
    #[must_use]
    pub fn parse(s: &str) -> Option<Self> {
        match s.trim().to_lowercase().as_str() {
            "family" => Some(Self::Family),
            "friends" => Some(Self::Friends),
            "work" => Some(Self::Work),
            "other" => Some(Self::Other),
            _ => None,
        }
    }
}

impl fmt::Display for ContactGroup {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// A contact in the contact book.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Contact {
    /// Unique identifier.
    #[serde(default = "ContactId::generate")]
    pub id: ContactId,
    /// Given (first) name.
    #[serde(default)]
    pub given_name: String,
    /// Family (last) name.
    #[serde(default)]
    pub family_name: String,
    /// Organization name.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub organization: Option<String>,
    /// Phone numbers in display order.
    #[serde(default)]
    pub phones: Vec<LabeledValue>,
    /// Email addresses in display order.
    #[serde(default)]
    pub emails: Vec<LabeledValue>,
    /// Birthday; recurrence only uses month and day.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub birthday: Option<NaiveDate>,
    /// Photo payload.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub image: Option<Vec<u8>>,
    /// Decorative symbol name.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub symbol: Option<String>,
    /// Group classification.
    #[serde(default)]
    pub group: ContactGroup,
    /// Creation timestamp (Unix epoch seconds).
    #[serde(default)]
    pub created_at: u64,
    /// Last update timestamp (Unix epoch seconds).
    #[serde(default)]
    pub updated_at: u64,
}

impl Contact {
    /// Creates a contact with a generated ID and the given names.
    #[must_use]
    pub fn new(given_name: impl Into<String>, family_name: impl Into<String>) -> Self {
        let now = crate::current_timestamp();
        Self {
            id: ContactId::generate(),
            given_name: given_name.into(),
            family_name: family_name.into(),
            organization: None,
            phones: Vec::new(),
            emails: Vec::new(),
            birthday: None,
            image: None,
            symbol: None,
            group: ContactGroup::Other,
            created_at: now,
            updated_at: now,
        }
    }

    /// Sets the ID.
    #[must_use]
    pub fn with_id(mut self, id: impl Into<ContactId>) -> Self {
        self.id = id.into();
        self
    }

    /// Sets the organization.
    #[must_use]
    pub fn with_organization(mut self, organization: impl Into<String>) -> Self {
        self.organization = Some(organization.into());
        self
    }

    /// Appends a phone number.
    #[must_use]
    pub fn with_phone(mut self, label: impl Into<String>, value: impl Into<String>) -> Self {
        self.phones.push(LabeledValue::new(label, value));
        self
    }

    /// Appends an email address.
    #[must_use]
    pub fn with_email(mut self, label: impl Into<String>, value: impl Into<String>) -> Self {
        self.emails.push(LabeledValue::new(label, value));
        self
    }

    /// Sets the birthday.
    #[must_use]
    pub const fn with_birthday(mut self, birthday: NaiveDate) -> Self {
        self.birthday = Some(birthday);
        self
    }

    /// Sets the photo payload.
    #[must_use]
    pub fn with_image(mut self, image: Vec<u8>) -> Self {
        self.image = Some(image);
        self
    }

    /// Sets the group.
    #[must_use]
    pub const fn with_group(mut self, group: ContactGroup) -> Self {
        self.group = group;
        self
    }

    /// Returns the name shown in lists.
    ///
    /// Falls back to the organization when both name parts are blank.
    #[must_use]
    pub fn display_name(&self) -> String {
        let full = format!("{} {}", self.given_name.trim(), self.family_name.trim());
        let full = full.trim();
        if full.is_empty() {
            self.organization
                .as_deref()
                .map(str::trim)
                .unwrap_or_default()
                .to_string()
        } else {
            full.to_string()
        }
    }

    /// Returns `true` if the contact carries a non-empty photo.
    #[must_use]
    pub fn has_photo(&self) -> bool {
        self.image.as_ref().is_some_and(|bytes| !bytes.is_empty())
    }
}

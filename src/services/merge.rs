//! Contact merge resolution.
//!
//! Unions a secondary contact into a primary and deletes the secondary in a
//! single repository transaction.
//!
//! | Field | Rule |
//! |-------|------|
//! | Phones | Union, deduplicated by exact value, primary's order first |
//! | Emails | Union, deduplicated case-insensitively |
//! | Birthday | Primary's if present, else secondary's |
//! | Photo | Primary's if present, else secondary's |
//! | Name, organization, group, symbol | Primary's |

use crate::models::{Contact, ContactId};
use crate::storage::ContactRepository;
use crate::storage::sqlite::acquire_lock;
use crate::{Error, Result};
use std::collections::HashSet;
use std::sync::{Arc, Mutex};
use tracing::instrument;

/// Result of unioning two contacts, before anything is written.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MergePreview {
    /// The primary contact with the secondary's data folded in.
    pub merged: Contact,
    /// Phones the primary gains.
    pub phones_added: usize,
    /// Emails the primary gains.
    pub emails_added: usize,
    /// Whether the birthday comes from the secondary.
    pub birthday_inherited: bool,
    /// Whether the photo comes from the secondary.
    pub photo_inherited: bool,
}

/// Merges contacts and guards against concurrent merges of the same contact.
pub struct MergeResolver {
    contacts: Arc<dyn ContactRepository>,
    in_flight: Arc<Mutex<HashSet<ContactId>>>,
}

/// Releases claimed contact IDs on drop.
struct MergeClaim {
    in_flight: Arc<Mutex<HashSet<ContactId>>>,
    ids: [ContactId; 2],
}

impl Drop for MergeClaim {
    fn drop(&mut self) {
        let mut claimed = acquire_lock(&self.in_flight);
        for id in &self.ids {
            claimed.remove(id);
        }
    }
}

impl MergeResolver {
    /// Creates a resolver over a contact repository.
    #[must_use]
    pub fn new(contacts: Arc<dyn ContactRepository>) -> Self {
        Self {
            contacts,
            in_flight: Arc::new(Mutex::new(HashSet::new())),
        }
    }

    /// Computes the merged contact without touching storage.
    ///
    /// # Example
    ///
    /// ```rust
    /// use contact_dedup::MergeResolver;
    /// use contact_dedup::models::Contact;
    ///
    /// let primary = Contact::new("Anna", "Larsson").with_id("a").with_phone("m", "A");
    /// let secondary = Contact::new("Anna", "Larsson").with_id("b").with_phone("m", "B");
    /// let preview = MergeResolver::preview(&primary, &secondary);
    /// assert_eq!(preview.phones_added, 1);
    /// assert_eq!(preview.merged.id, primary.id);
    /// ```
    #[must_use]
    pub fn preview(primary: &Contact, secondary: &Contact) -> MergePreview {
        let mut merged = primary.clone();

        let mut seen_phones: HashSet<String> =
            merged.phones.iter().map(|p| p.value.clone()).collect();
        let before_phones = merged.phones.len();
        for phone in &secondary.phones {
            if seen_phones.insert(phone.value.clone()) {
                merged.phones.push(phone.clone());
            }
        }

        let mut seen_emails: HashSet<String> = merged
            .emails
            .iter()
            .map(|e| e.value.trim().to_lowercase())
            .collect();
        let before_emails = merged.emails.len();
        for email in &secondary.emails {
            if seen_emails.insert(email.value.trim().to_lowercase()) {
                merged.emails.push(email.clone());
            }
        }

        let birthday_inherited = merged.birthday.is_none() && secondary.birthday.is_some();
        if birthday_inherited {
            merged.birthday = secondary.birthday;
        }

        let photo_inherited = !merged.has_photo() && secondary.has_photo();
        if photo_inherited {
            merged.image.clone_from(&secondary.image);
        }

        MergePreview {
            phones_added: merged.phones.len() - before_phones,
            emails_added: merged.emails.len() - before_emails,
            birthday_inherited,
            photo_inherited,
            merged,
        }
    }

    /// Merges `secondary_id` into `primary_id` and deletes the secondary.
    ///
    /// Both contacts are re-read from the repository, so stale copies held by
    /// the caller cannot overwrite newer data.
    ///
    /// # Errors
    ///
    /// - [`Error::InvalidInput`] if both IDs are the same
    /// - [`Error::Conflict`] if either contact is part of another in-flight merge
    /// - [`Error::NotFound`] if either contact no longer exists
    /// - [`Error::OperationFailed`] if the repository write fails
    ///
    /// On any error the repository is unchanged.
    #[instrument(skip(self), fields(primary_id = %primary_id, secondary_id = %secondary_id))]
    pub fn merge(&self, primary_id: &ContactId, secondary_id: &ContactId) -> Result<Contact> {
        if primary_id == secondary_id {
            return Err(Error::InvalidInput(format!(
                "cannot merge contact '{primary_id}' with itself"
            )));
        }

        let _claim = self.claim(primary_id, secondary_id)?;

        let primary = self
            .contacts
            .get(primary_id)?
            .ok_or_else(|| Error::contact_not_found(primary_id))?;
        let secondary = self
            .contacts
            .get(secondary_id)?
            .ok_or_else(|| Error::contact_not_found(secondary_id))?;

        let preview = Self::preview(&primary, &secondary);
        self.contacts.apply_merge(&preview.merged, secondary_id)?;

        tracing::info!(
            phones_added = preview.phones_added,
            emails_added = preview.emails_added,
            birthday_inherited = preview.birthday_inherited,
            photo_inherited = preview.photo_inherited,
            "Contacts merged"
        );
        Ok(preview.merged)
    }

    /// Returns `true` if a merge currently holds `id`.
    #[must_use]
    pub fn is_in_flight(&self, id: &ContactId) -> bool {
        acquire_lock(&self.in_flight).contains(id)
    }

    fn claim(&self, primary_id: &ContactId, secondary_id: &ContactId) -> Result<MergeClaim> {
        let mut claimed = acquire_lock(&self.in_flight);
        if let Some(busy) = [primary_id, secondary_id]
            .into_iter()
            .find(|id| claimed.contains(*id))
        {
            return Err(Error::Conflict(format!(
                "contact '{busy}' is already being merged"
            )));
        }
        claimed.insert(primary_id.clone());
        claimed.insert(secondary_id.clone());
        drop(claimed);

        Ok(MergeClaim {
            in_flight: Arc::clone(&self.in_flight),
            ids: [primary_id.clone(), secondary_id.clone()],
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::SqliteContactRepository;
    use chrono::NaiveDate;

    fn date(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    fn resolver_with(contacts: &[Contact]) -> (MergeResolver, Arc<SqliteContactRepository>) {
        let repo = Arc::new(SqliteContactRepository::in_memory().unwrap());
        for contact in contacts {
            repo.insert(contact).unwrap();
        }
        let resolver = MergeResolver::new(Arc::clone(&repo) as Arc<dyn ContactRepository>);
        (resolver, repo)
    }

    #[test]
    fn test_preview_unions_phones_by_value() {
        let primary = Contact::new("Anna", "Larsson")
            .with_id("a")
            .with_phone("m", "A")
            .with_phone("h", "B");
        let secondary = Contact::new("Anna", "Larsson")
            .with_id("b")
            .with_phone("w", "B")
            .with_phone("w", "C");

        let preview = MergeResolver::preview(&primary, &secondary);
        let values: Vec<&str> = preview
            .merged
            .phones
            .iter()
            .map(|p| p.value.as_str())
            .collect();
        assert_eq!(values, vec!["A", "B", "C"]);
        assert_eq!(preview.phones_added, 1);
    }

    #[test]
    fn test_preview_phone_dedup_is_exact() {
        let primary = Contact::new("A", "").with_id("a").with_phone("m", "070-1234567");
        let secondary = Contact::new("A", "").with_id("b").with_phone("m", "0701234567");
        assert_eq!(MergeResolver::preview(&primary, &secondary).phones_added, 1);
    }

    #[test]
    fn test_preview_emails_case_insensitive() {
        let primary = Contact::new("A", "").with_id("a").with_email("h", "Anna@X.com");
        let secondary = Contact::new("A", "")
            .with_id("b")
            .with_email("w", "anna@x.com")
            .with_email("w", "anna@acme.se");

        let preview = MergeResolver::preview(&primary, &secondary);
        assert_eq!(preview.emails_added, 1);
        assert_eq!(preview.merged.emails[0].value, "Anna@X.com");
    }

    #[test]
    fn test_preview_birthday_and_photo() {
        let d1 = date(1990, 4, 12);
        let d2 = date(1991, 5, 13);

        let primary = Contact::new("A", "").with_id("a");
        let secondary = Contact::new("A", "")
            .with_id("b")
            .with_birthday(d2)
            .with_image(vec![1]);
        let preview = MergeResolver::preview(&primary, &secondary);
        assert_eq!(preview.merged.birthday, Some(d2));
        assert_eq!(preview.merged.image, Some(vec![1]));
        assert!(preview.birthday_inherited && preview.photo_inherited);

        let primary = primary.with_birthday(d1).with_image(vec![9]);
        let preview = MergeResolver::preview(&primary, &secondary);
        assert_eq!(preview.merged.birthday, Some(d1));
        assert_eq!(preview.merged.image, Some(vec![9]));
        assert!(!preview.birthday_inherited && !preview.photo_inherited);
    }

    #[test]
    fn test_preview_keeps_primary_identity() {
        let primary = Contact::new("Anna", "Larsson").with_id("a").with_organization("Acme");
        let secondary = Contact::new("Anna K", "Larsson")
            .with_id("b")
            .with_organization("Other");
        let merged = MergeResolver::preview(&primary, &secondary).merged;
        assert_eq!(merged.id, primary.id);
        assert_eq!(merged.given_name, "Anna");
        assert_eq!(merged.organization.as_deref(), Some("Acme"));
    }

    #[test]
    fn test_merge_writes_and_deletes() {
        let a = Contact::new("Anna", "Larsson").with_id("a").with_phone("m", "A");
        let b = Contact::new("Anna", "Larsson").with_id("b").with_phone("m", "C");
        let (resolver, repo) = resolver_with(&[a.clone(), b.clone()]);

        let merged = resolver.merge(&a.id, &b.id).unwrap();
        assert_eq!(merged.phones.len(), 2);
        assert!(repo.get(&b.id).unwrap().is_none());
        assert_eq!(repo.get(&a.id).unwrap().unwrap().phones.len(), 2);
        assert!(!resolver.is_in_flight(&a.id));
    }

    #[test]
    fn test_merge_self_rejected() {
        let a = Contact::new("Anna", "Larsson").with_id("a");
        let (resolver, repo) = resolver_with(&[a.clone()]);
        let err = resolver.merge(&a.id, &a.id).unwrap_err();
        assert!(matches!(err, Error::InvalidInput(_)));
        assert_eq!(repo.count().unwrap(), 1);
    }

    #[test]
    fn test_merge_missing_contact_is_not_found() {
        let a = Contact::new("Anna", "Larsson").with_id("a");
        let (resolver, repo) = resolver_with(&[a.clone()]);
        let err = resolver.merge(&a.id, &ContactId::new("gone")).unwrap_err();
        assert!(err.is_not_found());
        assert_eq!(repo.count().unwrap(), 1);
        assert!(!resolver.is_in_flight(&a.id));
    }

    #[test]
    fn test_claim_conflict_and_release() {
        let a = Contact::new("Anna", "Larsson").with_id("a");
        let b = Contact::new("Anna", "Larsson").with_id("b");
        let c = Contact::new("Anna", "Larsson").with_id("c");
        let (resolver, _repo) = resolver_with(&[a.clone(), b.clone(), c.clone()]);

        let claim = resolver.claim(&a.id, &b.id).unwrap();
        let err = resolver.merge(&c.id, &b.id).unwrap_err();
        assert!(matches!(err, Error::Conflict(_)));

        drop(claim);
        assert!(resolver.merge(&c.id, &b.id).is_ok());
    }
}

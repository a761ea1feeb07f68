//! Pair fingerprinting.
//!
//! A fingerprint is a SHA-256 over the normalized match-relevant fields of
//! both contacts of a pair. It changes only when a field the scanner looks at
//! changes, which is what decides whether a dismissed pair may resurface.

use super::normalize::{normalize_email, normalize_name, normalize_organization, normalize_phone};
use crate::models::Contact;
use sha2::{Digest, Sha256};

/// Computes fingerprints for contact pairs.
pub struct PairFingerprint;

impl PairFingerprint {
    /// Computes the fingerprint of a pair.
    ///
    /// The contacts are ordered by ID first, so the argument order does not matter.
    /// Phone and email lists are sorted after normalization, so reordering or
    /// reformatting them does not change the result.
    ///
    /// # Example
    ///
    /// ```rust
    /// use contact_dedup::models::Contact;
    /// use contact_dedup::services::deduplication::PairFingerprint;
    ///
    /// let a = Contact::new("Anna", "Larsson").with_id("a");
    /// let b = Contact::new("Anna", "Larsson").with_id("b");
    /// let fp = PairFingerprint::compute(&a, &b);
    /// assert_eq!(fp.len(), 64);
    /// assert_eq!(fp, PairFingerprint::compute(&b, &a));
    /// ```
    #[must_use]
    pub fn compute(a: &Contact, b: &Contact) -> String {
        let (first, second) = if a.id <= b.id { (a, b) } else { (b, a) };
        let mut hasher = Sha256::new();
        hasher.update(Self::canonical(first).as_bytes());
        hasher.update([0x1e]);
        hasher.update(Self::canonical(second).as_bytes());
        hex::encode(hasher.finalize())
    }

    /// Canonical text of a contact's match-relevant fields.
    fn canonical(contact: &Contact) -> String {
        let mut phones: Vec<String> = contact
            .phones
            .iter()
            .map(|p| normalize_phone(&p.value))
            .filter(|p| !p.is_empty())
            .collect();
        phones.sort_unstable();
        phones.dedup();

        let mut emails: Vec<String> = contact
            .emails
            .iter()
            .map(|e| normalize_email(&e.value))
            .filter(|e| !e.is_empty())
            .collect();
        emails.sort_unstable();
        emails.dedup();

        let birthday = contact
            .birthday
            .map(|d| d.format("%Y-%m-%d").to_string())
            .unwrap_or_default();

        [
            contact.id.as_str().to_string(),
            normalize_name(&contact.display_name()),
            normalize_organization(contact.organization.as_deref()).unwrap_or_default(),
            phones.join(","),
            emails.join(","),
            birthday,
        ]
        .join("\u{1f}")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn pair() -> (Contact, Contact) {
        (
            Contact::new("Anna", "Larsson")
                .with_id("a")
                .with_phone("mobile", "070-1234567"),
            Contact::new("Anna", "Larsson")
                .with_id("b")
                .with_email("home", "anna@x.com"),
        )
    }

    #[test]
    fn test_fingerprint_ignores_formatting() {
        let (a, b) = pair();
        let before = PairFingerprint::compute(&a, &b);

        let mut reformatted = a.clone();
        reformatted.phones[0].value = "070 123 45 67".to_string();
        reformatted.given_name = "ANNA".to_string();
        assert_eq!(before, PairFingerprint::compute(&reformatted, &b));
    }

    #[test]
    fn test_fingerprint_ignores_non_matching_fields() {
        let (a, b) = pair();
        let before = PairFingerprint::compute(&a, &b);
        let with_photo = a.with_image(vec![1, 2, 3]);
        assert_eq!(before, PairFingerprint::compute(&with_photo, &b));
    }

    #[test]
    fn test_fingerprint_changes_on_material_edit() {
        let (a, b) = pair();
        let before = PairFingerprint::compute(&a, &b);
        let edited = b.with_phone("work", "08-555 123 45");
        assert_ne!(before, PairFingerprint::compute(&a, &edited));
    }
}

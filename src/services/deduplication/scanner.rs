//! Pairwise duplicate scanner.
//!
//! Compares every unordered pair of contacts and turns pairs whose score
//! reaches the configured minimum into pending suggestions. Pure function of
//! its input: no storage access, no clock dependence beyond timestamps.

use super::config::ScoringConfig;
use super::hasher::PairFingerprint;
use super::normalize::{
    name_tokens, normalize_email, normalize_organization, normalize_phone, phones_match,
};
use super::similarity::name_similarity;
use crate::models::{Contact, ContactPair, DuplicateMatchReason, DuplicateSuggestion};
use chrono::NaiveDate;
use std::collections::BTreeSet;
use std::time::Instant;
use tracing::instrument;

/// Score and reasons for one pair.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PairScore {
    /// Total score, capped at 100.
    pub score: u8,
    /// Signals that contributed, sorted.
    pub reasons: Vec<DuplicateMatchReason>,
}

/// Precomputed normalized view of a contact.
struct ContactFeatures<'a> {
    contact: &'a Contact,
    name_tokens: Vec<String>,
    name_key: String,
    phones: Vec<String>,
    emails: BTreeSet<String>,
    organization: Option<String>,
    birthday: Option<NaiveDate>,
}

impl<'a> ContactFeatures<'a> {
    fn new(contact: &'a Contact) -> Self {
        let name_tokens = name_tokens(&contact.display_name());
        let mut sorted = name_tokens.clone();
        sorted.sort_unstable();
        let phones = contact
            .phones
            .iter()
            .map(|p| normalize_phone(&p.value))
            .filter(|p| !p.is_empty())
            .collect();
        let emails = contact
            .emails
            .iter()
            .map(|e| normalize_email(&e.value))
            .filter(|e| !e.is_empty())
            .collect();

        Self {
            contact,
            name_key: sorted.join(" "),
            name_tokens,
            phones,
            emails,
            organization: normalize_organization(contact.organization.as_deref()),
            birthday: contact.birthday,
        }
    }
}

/// Scans contact sets for likely duplicates.
///
/// # Example
///
/// ```rust
/// use contact_dedup::models::Contact;
/// use contact_dedup::{DuplicateScanner, ScoringConfig};
///
/// let scanner = DuplicateScanner::new(ScoringConfig::default());
/// let contacts = vec![
///     Contact::new("Anna", "Larsson").with_id("a").with_phone("mobile", "070-1234567"),
///     Contact::new("Anna", "Larsson").with_id("b").with_phone("home", "0701234567"),
/// ];
/// let suggestions = scanner.scan(&contacts);
/// assert_eq!(suggestions.len(), 1);
/// assert!(suggestions[0].score >= 80);
/// ```
#[derive(Debug, Clone, Default)]
pub struct DuplicateScanner {
    config: ScoringConfig,
}

impl DuplicateScanner {
    /// Creates a scanner with the given scoring configuration.
    #[must_use]
    pub const fn new(config: ScoringConfig) -> Self {
        Self { config }
    }

    /// Returns the scoring configuration.
    #[must_use]
    pub const fn config(&self) -> &ScoringConfig {
        &self.config
    }

    /// Scans a contact set and returns suggestions for every pair at or above
    /// the minimum score.
    ///
    /// The result does not depend on input order: contacts are sorted by ID
    /// first, pairs are stored as (lower, higher), and suggestions are sorted
    /// by score descending then by pair. Of several entries sharing an ID,
    /// only the one with the smallest serialized form is scanned.
    #[instrument(skip_all, fields(contacts = contacts.len()))]
    #[allow(clippy::cast_possible_truncation, clippy::cast_precision_loss)]
    pub fn scan(&self, contacts: &[Contact]) -> Vec<DuplicateSuggestion> {
        let start = Instant::now();

        // Entries sharing an ID are ordered by their serialized content, so
        // the one kept does not depend on input order.
        let mut ordered: Vec<&Contact> = contacts.iter().collect();
        ordered.sort_by_cached_key(|c| {
            (c.id.clone(), serde_json::to_string(c).unwrap_or_default())
        });
        let before = ordered.len();
        ordered.dedup_by(|a, b| a.id == b.id);
        if ordered.len() != before {
            tracing::warn!(
                dropped = before - ordered.len(),
                "Contact set contains repeated IDs, keeping one entry per ID"
            );
        }

        let features: Vec<ContactFeatures<'_>> =
            ordered.into_iter().map(ContactFeatures::new).collect();

        let mut suggestions = Vec::new();
        for (i, a) in features.iter().enumerate() {
            for b in &features[i + 1..] {
                let Some(pair) = ContactPair::new(a.contact.id.clone(), b.contact.id.clone())
                else {
                    continue;
                };
                let scored = self.score_features(a, b);
                if scored.score < self.config.min_score {
                    continue;
                }
                tracing::debug!(
                    pair = %pair,
                    score = scored.score,
                    reasons = ?scored.reasons,
                    "Duplicate candidate"
                );
                suggestions.push(DuplicateSuggestion::pending(
                    &pair,
                    scored.score,
                    scored.reasons,
                    PairFingerprint::compute(a.contact, b.contact),
                ));
            }
        }

        suggestions.sort_by(|x, y| {
            y.score
                .cmp(&x.score)
                .then_with(|| x.contact1_id.cmp(&y.contact1_id))
                .then_with(|| x.contact2_id.cmp(&y.contact2_id))
        });

        let duration_ms = start.elapsed().as_millis() as u64;
        metrics::counter!("dedup_scans_total").increment(1);
        metrics::histogram!("dedup_scan_duration_ms").record(duration_ms as f64);
        metrics::gauge!("dedup_suggestions_found").set(suggestions.len() as f64);
        tracing::info!(
            found = suggestions.len(),
            duration_ms = duration_ms,
            "Duplicate scan complete"
        );

        suggestions
    }

    /// Scores a single pair without applying the threshold.
    #[must_use]
    pub fn score_pair(&self, a: &Contact, b: &Contact) -> PairScore {
        self.score_features(&ContactFeatures::new(a), &ContactFeatures::new(b))
    }

    fn score_features(&self, a: &ContactFeatures<'_>, b: &ContactFeatures<'_>) -> PairScore {
        let config = &self.config;
        let mut points: u32 = 0;
        let mut reasons = Vec::new();

        if !a.name_key.is_empty() && a.name_key == b.name_key {
            points += u32::from(config.name_exact_weight);
            reasons.push(DuplicateMatchReason::SameName);
        } else {
            let similarity = name_similarity(&a.name_tokens, &b.name_tokens);
            if similarity >= config.name_similarity_threshold {
                points += scaled_points(similarity, config.name_similar_weight);
                reasons.push(DuplicateMatchReason::SimilarName);
            }
        }

        let shares_phone = a.phones.iter().any(|pa| {
            b.phones
                .iter()
                .any(|pb| phones_match(pa, pb, config.min_phone_digits))
        });
        if shares_phone {
            points += u32::from(config.phone_weight);
            reasons.push(DuplicateMatchReason::Phone);
        }

        if !a.emails.is_disjoint(&b.emails) {
            points += u32::from(config.email_weight);
            reasons.push(DuplicateMatchReason::Email);
        }

        if a.organization.is_some() && a.organization == b.organization {
            points += u32::from(config.organization_weight);
            reasons.push(DuplicateMatchReason::Organization);
        }

        if a.birthday.is_some() && a.birthday == b.birthday {
            points += u32::from(config.birthday_weight);
            reasons.push(DuplicateMatchReason::Birthday);
        }

        reasons.sort_unstable();
        PairScore {
            score: u8::try_from(points.min(100)).unwrap_or(100),
            reasons,
        }
    }
}

/// Scales `weight` by a similarity in `0.0..=1.0`, rounding to the nearest point.
#[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
fn scaled_points(similarity: f64, weight: u8) -> u32 {
    (similarity.clamp(0.0, 1.0) * f64::from(weight)).round() as u32
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::ContactId;

    fn scanner() -> DuplicateScanner {
        DuplicateScanner::new(ScoringConfig::default())
    }

    #[test]
    fn test_empty_and_single() {
        assert!(scanner().scan(&[]).is_empty());
        assert!(scanner().scan(&[Contact::new("Anna", "Larsson")]).is_empty());
    }

    #[test]
    fn test_name_and_phone_is_high() {
        let a = Contact::new("Anna", "Larsson")
            .with_id("a")
            .with_phone("mobile", "070-1234567");
        let b = Contact::new("Anna", "Larsson")
            .with_id("b")
            .with_phone("mobile", "070-1234567")
            .with_email("home", "anna@x.com");

        let suggestions = scanner().scan(&[a, b]);
        assert_eq!(suggestions.len(), 1);
        let s = &suggestions[0];
        assert_eq!(s.score, 90);
        assert_eq!(
            s.match_reasons,
            vec![DuplicateMatchReason::SameName, DuplicateMatchReason::Phone]
        );
        assert_eq!(s.contact1_id, ContactId::new("a"));
    }

    #[test]
    fn test_score_is_capped() {
        let a = Contact::new("Anna", "Larsson")
            .with_id("a")
            .with_phone("m", "0701234567")
            .with_email("h", "anna@x.com")
            .with_organization("Acme");
        let b = a.clone().with_id("b");
        assert_eq!(scanner().score_pair(&a, &b).score, 100);
    }

    #[test]
    fn test_organization_alone_is_below_threshold() {
        let a = Contact::new("Anna", "Larsson")
            .with_id("a")
            .with_organization("Acme AB")
            .with_phone("m", "070-1111111");
        let b = Contact::new("Erik", "Holm")
            .with_id("b")
            .with_organization("acme ab")
            .with_phone("m", "070-2222222");

        let scored = scanner().score_pair(&a, &b);
        assert_eq!(scored.reasons, vec![DuplicateMatchReason::Organization]);
        assert!(scanner().scan(&[a, b]).is_empty());
    }

    #[test]
    fn test_similar_name_scaled() {
        let a = Contact::new("Jonathan", "Smith").with_id("a");
        let b = Contact::new("Jonathon", "Smith").with_id("b");
        let scored = scanner().score_pair(&a, &b);
        assert_eq!(scored.reasons, vec![DuplicateMatchReason::SimilarName]);
        assert!(scored.score >= 34 && scored.score < 40);
    }

    #[test]
    fn test_shared_email_alone_reaches_threshold() {
        let a = Contact::new("A", "").with_id("a").with_email("w", "X@Y.com");
        let b = Contact::new("Someone", "Else")
            .with_id("b")
            .with_email("h", "x@y.com ");
        let suggestions = scanner().scan(&[a, b]);
        assert_eq!(suggestions.len(), 1);
        assert_eq!(suggestions[0].score, 40);
        assert_eq!(
            suggestions[0].match_reasons,
            vec![DuplicateMatchReason::Email]
        );
    }

    #[test]
    fn test_blank_names_never_match_by_name() {
        let a = Contact::new("", "").with_id("a");
        let b = Contact::new("", "").with_id("b");
        assert_eq!(scanner().score_pair(&a, &b).score, 0);
    }

    #[test]
    fn test_repeated_ids_do_not_self_pair() {
        let a = Contact::new("Anna", "Larsson").with_id("a");
        let suggestions = scanner().scan(&[a.clone(), a]);
        assert!(suggestions.is_empty());
    }

    #[test]
    fn test_repeated_id_choice_ignores_input_order() {
        let anna_phone = Contact::new("Anna", "Larsson")
            .with_id("a")
            .with_phone("m", "0701234567");
        let anna_email = Contact::new("Anna", "Larsson")
            .with_id("a")
            .with_email("h", "anna@x.com");
        let other = Contact::new("Anna", "Larsson")
            .with_id("b")
            .with_phone("m", "070-1234567")
            .with_email("h", "anna@x.com");

        let summarize = |contacts: &[Contact]| -> Vec<(u8, Vec<DuplicateMatchReason>, String)> {
            scanner()
                .scan(contacts)
                .into_iter()
                .map(|s| (s.score, s.match_reasons, s.fingerprint))
                .collect()
        };
        let forward = summarize(&[anna_phone.clone(), anna_email.clone(), other.clone()]);
        let backward = summarize(&[other, anna_email, anna_phone]);
        assert_eq!(forward.len(), 1);
        assert_eq!(forward, backward);
    }

    #[test]
    fn test_sorted_by_score_then_pair() {
        let contacts = vec![
            Contact::new("Erik", "Holm").with_id("e1"),
            Contact::new("Erik", "Holm").with_id("e2"),
            Contact::new("Anna", "Larsson")
                .with_id("a2")
                .with_phone("m", "0701234567"),
            Contact::new("Anna", "Larsson")
                .with_id("a1")
                .with_phone("m", "0701234567"),
        ];
        let suggestions = scanner().scan(&contacts);
        assert_eq!(suggestions.len(), 2);
        assert_eq!(suggestions[0].contact1_id.as_str(), "a1");
        assert_eq!(suggestions[0].contact2_id.as_str(), "a2");
        assert_eq!(suggestions[1].contact1_id.as_str(), "e1");
    }
}

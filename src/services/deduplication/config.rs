//! Scoring configuration.
//!
//! Weights for each match signal and the minimum score a pair needs to
//! become a suggestion.

use crate::{Error, Result};

/// Configuration for duplicate scoring.
///
/// # Environment Variables
///
/// | Variable | Type | Default | Description |
/// |----------|------|---------|-------------|
/// | `CONTACT_DEDUP_SCORE_MIN` | u8 | `40` | Minimum score for a suggestion |
/// | `CONTACT_DEDUP_SCORE_NAME_EXACT` | u8 | `50` | Points for equal names |
/// | `CONTACT_DEDUP_SCORE_NAME_SIMILAR` | u8 | `40` | Maximum points for similar names |
/// | `CONTACT_DEDUP_SCORE_NAME_THRESHOLD` | f64 | `0.85` | Similarity cut-off for similar names |
/// | `CONTACT_DEDUP_SCORE_PHONE` | u8 | `40` | Points for a shared phone |
/// | `CONTACT_DEDUP_SCORE_EMAIL` | u8 | `40` | Points for a shared email |
/// | `CONTACT_DEDUP_SCORE_ORGANIZATION` | u8 | `10` | Points for the same organization |
/// | `CONTACT_DEDUP_SCORE_BIRTHDAY` | u8 | `10` | Points for the same birthday |
/// | `CONTACT_DEDUP_SCORE_MIN_PHONE_DIGITS` | usize | `7` | Shortest number allowed to suffix-match |
///
/// # Example
///
/// ```rust
/// use contact_dedup::ScoringConfig;
///
/// let config = ScoringConfig::default();
/// assert_eq!(config.min_score, 40);
/// assert!(config.organization_weight < config.min_score);
/// ```
#[derive(Debug, Clone, PartialEq)]
pub struct ScoringConfig {
    /// Minimum score for a pair to be suggested (1..=100).
    pub min_score: u8,
    /// Points when normalized names are equal.
    pub name_exact_weight: u8,
    /// Points for a similarity of 1.0; scaled down linearly.
    pub name_similar_weight: u8,
    /// Similarity at or above which names count as similar (0.0..=1.0).
    pub name_similarity_threshold: f64,
    /// Points when any phone number is shared.
    pub phone_weight: u8,
    /// Points when any email address is shared.
    pub email_weight: u8,
    /// Points when the organization is the same.
    pub organization_weight: u8,
    /// Points when both birthdays are set and equal.
    pub birthday_weight: u8,
    /// Minimum significant digits for a suffix phone match.
    pub min_phone_digits: usize,
}

impl Default for ScoringConfig {
    fn default() -> Self {
        Self {
            min_score: 40,
            name_exact_weight: 50,
            name_similar_weight: 40,
            name_similarity_threshold: 0.85,
            phone_weight: 40,
            email_weight: 40,
            organization_weight: 10,
            birthday_weight: 10,
            min_phone_digits: 7,
        }
    }
}

impl ScoringConfig {
    /// Overrides fields from `CONTACT_DEDUP_SCORE_*` environment variables.
    ///
    /// Unset or unparsable variables keep the current value.
    #[must_use]
    pub fn with_env_overrides(self) -> Self {
        fn env<T: std::str::FromStr>(name: &str) -> Option<T> {
            std::env::var(name).ok().and_then(|v| v.trim().parse().ok())
        }

        Self {
            min_score: env("CONTACT_DEDUP_SCORE_MIN").unwrap_or(self.min_score),
            name_exact_weight: env("CONTACT_DEDUP_SCORE_NAME_EXACT")
                .unwrap_or(self.name_exact_weight),
            name_similar_weight: env("CONTACT_DEDUP_SCORE_NAME_SIMILAR")
                .unwrap_or(self.name_similar_weight),
            name_similarity_threshold: env("CONTACT_DEDUP_SCORE_NAME_THRESHOLD")
                .unwrap_or(self.name_similarity_threshold),
            phone_weight: env("CONTACT_DEDUP_SCORE_PHONE").unwrap_or(self.phone_weight),
            email_weight: env("CONTACT_DEDUP_SCORE_EMAIL").unwrap_or(self.email_weight),
            organization_weight: env("CONTACT_DEDUP_SCORE_ORGANIZATION")
                .unwrap_or(self.organization_weight),
            birthday_weight: env("CONTACT_DEDUP_SCORE_BIRTHDAY").unwrap_or(self.birthday_weight),
            min_phone_digits: env("CONTACT_DEDUP_SCORE_MIN_PHONE_DIGITS")
                .unwrap_or(self.min_phone_digits),
        }
    }

    /// Checks value ranges.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidInput`] if `min_score` is outside `1..=100`,
    /// the similarity threshold is outside `(0, 1]`, or `min_phone_digits` is zero.
    pub fn validate(&self) -> Result<()> {
        if !(1..=100).contains(&self.min_score) {
            return Err(Error::InvalidInput(format!(
                "scoring.min_score must be within 1..=100, got {}",
                self.min_score
            )));
        }
        if !(self.name_similarity_threshold > 0.0 && self.name_similarity_threshold <= 1.0) {
            return Err(Error::InvalidInput(format!(
                "scoring.name_similarity_threshold must be within (0, 1], got {}",
                self.name_similarity_threshold
            )));
        }
        if self.min_phone_digits == 0 {
            return Err(Error::InvalidInput(
                "scoring.min_phone_digits must be positive".to_string(),
            ));
        }
        Ok(())
    }

    /// Builder method to set the minimum score.
    #[must_use]
    pub const fn with_min_score(mut self, min_score: u8) -> Self {
        self.min_score = min_score;
        self
    }

    /// Builder method to set the name similarity threshold.
    #[must_use]
    pub const fn with_name_similarity_threshold(mut self, threshold: f64) -> Self {
        self.name_similarity_threshold = threshold;
        self
    }

    /// Builder method to set the phone weight.
    #[must_use]
    pub const fn with_phone_weight(mut self, weight: u8) -> Self {
        self.phone_weight = weight;
        self
    }

    /// Builder method to set the email weight.
    #[must_use]
    pub const fn with_email_weight(mut self, weight: u8) -> Self {
        self.email_weight = weight;
        self
    }

    /// Builder method to set the organization weight.
    #[must_use]
    pub const fn with_organization_weight(mut self, weight: u8) -> Self {
        self.organization_weight = weight;
        self
    }
}

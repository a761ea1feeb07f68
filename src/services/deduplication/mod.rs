//! Duplicate detection.
//!
//! Scores every unordered pair of contacts on five signals and emits a
//! suggestion for pairs at or above the configured minimum:
//!
//! | Signal | Reason | Default points |
//! |--------|--------|----------------|
//! | Equal normalized names (any word order) | `name` | 50 |
//! | Similar names (similarity ≥ 0.85) | `similarName` | up to 40 |
//! | Shared phone number | `phone` | 40 |
//! | Shared email address | `email` | 40 |
//! | Same organization | `organization` | 10 |
//! | Same birthday | `birthday` | 10 |
//!
//! The score is capped at 100 and the default minimum is 40, so organization
//! or birthday alone never produce a suggestion.
//!
//! # Architecture
//!
//! ```text
//! ┌──────────────────────────────────────────────────────────┐
//! │                    DuplicateScanner                      │
//! │  ┌──────────────┐  ┌──────────────┐  ┌────────────────┐  │
//! │  │ normalize    │  │ similarity   │  │ PairFingerprint│  │
//! │  │ names/phones │  │ edit dist.   │  │ SHA-256 over   │  │
//! │  │ emails/orgs  │  │ token sets   │  │ match fields   │  │
//! │  └──────────────┘  └──────────────┘  └────────────────┘  │
//! └──────────────────────────────────────────────────────────┘
//! ```

mod config;
mod hasher;
mod normalize;
mod scanner;
mod similarity;

pub use config::ScoringConfig;
pub use hasher::PairFingerprint;
pub use normalize::{
    is_valid_email, name_tokens, normalize_email, normalize_name, normalize_organization,
    normalize_phone, phones_match,
};
pub use scanner::{DuplicateScanner, PairScore};
pub use similarity::{levenshtein, name_similarity, normalized_levenshtein, token_jaccard};

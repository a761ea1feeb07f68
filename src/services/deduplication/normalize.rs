//! Normalization of names, phone numbers and email addresses.
//!
//! All comparisons in the scanner run on these normalized forms so that
//! formatting differences ("070-123 45 67" vs "0701234567") do not hide a match.

use regex::Regex;
use std::sync::LazyLock;

/// Loose email shape: one `@`, no spaces, a dot in the domain.
/// `None` only if the pattern fails to compile, in which case nothing is
/// treated as a valid email.
static EMAIL_PATTERN: LazyLock<Option<Regex>> =
    LazyLock::new(|| Regex::new(r"^[^@\s]+@[^@\s]+\.[^@\s]+$").ok());

/// Splits a name into lowercase alphanumeric tokens.
///
/// # Example
///
/// ```rust
/// use contact_dedup::services::deduplication::name_tokens;
///
/// assert_eq!(name_tokens("  Anna-Karin  LARSSON "), vec!["anna", "karin", "larsson"]);
/// ```
#[must_use]
pub fn name_tokens(name: &str) -> Vec<String> {
    name.to_lowercase()
        .split(|c: char| !c.is_alphanumeric())
        .filter(|token| !token.is_empty())
        .map(ToString::to_string)
        .collect()
}

/// Joins name tokens into a canonical string with single spaces.
#[must_use]
pub fn normalize_name(name: &str) -> String {
    name_tokens(name).join(" ")
}

/// Longest country code accepted when a domestic number is matched
/// against an international one.
const MAX_COUNTRY_CODE_DIGITS: usize = 3;

/// Reduces a phone number to a comparable digit string.
///
/// Drops every non-digit. Numbers written with `+` or the `00` prefix are
/// international and come back as `+` followed by the country code and
/// number; everything else keeps its digits as written, including a
/// domestic trunk `0`. A value without digits yields an empty string.
///
/// # Example
///
/// ```rust
/// use contact_dedup::services::deduplication::normalize_phone;
///
/// assert_eq!(normalize_phone("070-123 45 67"), "0701234567");
/// assert_eq!(normalize_phone("+46 70 123 45 67"), "+46701234567");
/// assert_eq!(normalize_phone("0046701234567"), "+46701234567");
/// assert_eq!(normalize_phone("n/a"), "");
/// ```
#[must_use]
pub fn normalize_phone(phone: &str) -> String {
    let digits: String = phone.chars().filter(char::is_ascii_digit).collect();
    let international = if phone.trim_start().starts_with('+') {
        Some(digits.as_str())
    } else {
        digits.strip_prefix("00")
    };
    match international {
        Some("") => String::new(),
        Some(number) => format!("+{number}"),
        None => digits,
    }
}

/// Returns `true` if two normalized phone numbers denote the same line.
///
/// Equal numbers match. Otherwise one side must be international and the
/// other a domestic number with a trunk `0`: with the trunk dropped, the
/// domestic number needs at least `min_digits` digits and must equal the
/// international number minus a country code of one to three digits.
///
/// # Example
///
/// ```rust
/// use contact_dedup::services::deduplication::{normalize_phone, phones_match};
///
/// let domestic = normalize_phone("070-123 45 67");
/// assert!(phones_match(&domestic, &normalize_phone("+46 70 123 45 67"), 7));
/// assert!(!phones_match(&normalize_phone("08-123 45 67"), &normalize_phone("018-123 45 67"), 7));
/// ```
#[must_use]
pub fn phones_match(a: &str, b: &str, min_digits: usize) -> bool {
    if a.is_empty() || b.is_empty() {
        return false;
    }
    if a == b {
        return true;
    }
    let (international, domestic) = match (a.strip_prefix('+'), b.strip_prefix('+')) {
        (Some(international), None) => (international, b),
        (None, Some(international)) => (international, a),
        _ => return false,
    };
    let Some(national) = domestic.strip_prefix('0') else {
        return false;
    };
    let country_code = international.len().saturating_sub(national.len());
    national.len() >= min_digits
        && (1..=MAX_COUNTRY_CODE_DIGITS).contains(&country_code)
        && international.ends_with(national)
}

/// Normalizes an email address for case-insensitive comparison.
#[must_use]
pub fn normalize_email(email: &str) -> String {
    email.trim().to_lowercase()
}

/// Returns `true` if the value has the shape of an email address.
#[must_use]
pub fn is_valid_email(email: &str) -> bool {
    EMAIL_PATTERN
        .as_ref()
        .is_some_and(|pattern| pattern.is_match(email.trim()))
}

/// Normalizes an organization name; blank names yield `None`.
#[must_use]
pub fn normalize_organization(organization: Option<&str>) -> Option<String> {
    organization
        .map(normalize_name)
        .filter(|name| !name.is_empty())
}

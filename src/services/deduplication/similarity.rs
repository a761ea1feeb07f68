//! String similarity measures for name comparison.

use std::collections::BTreeSet;

/// Levenshtein edit distance over Unicode scalar values.
///
/// # Example
///
/// ```rust
/// use contact_dedup::services::deduplication::levenshtein;
///
/// assert_eq!(levenshtein("kitten", "sitting"), 3);
/// assert_eq!(levenshtein("", "abc"), 3);
/// ```
#[must_use]
pub fn levenshtein(a: &str, b: &str) -> usize {
    let a: Vec<char> = a.chars().collect();
    let b: Vec<char> = b.chars().collect();
    if a.is_empty() {
        return b.len();
    }
    if b.is_empty() {
        return a.len();
    }

    let mut previous: Vec<usize> = (0..=b.len()).collect();
    let mut current = vec![0; b.len() + 1];

    for (i, ca) in a.iter().enumerate() {
        current[0] = i + 1;
        for (j, cb) in b.iter().enumerate() {
            let substitution = previous[j] + usize::from(ca != cb);
            let insertion = current[j] + 1;
            let deletion = previous[j + 1] + 1;
            current[j + 1] = substitution.min(insertion).min(deletion);
        }
        std::mem::swap(&mut previous, &mut current);
    }

    previous[b.len()]
}

/// Edit distance scaled to `0.0..=1.0`, where 1.0 means identical.
#[must_use]
#[allow(clippy::cast_precision_loss)]
pub fn normalized_levenshtein(a: &str, b: &str) -> f64 {
    let longest = a.chars().count().max(b.chars().count());
    if longest == 0 {
        return 1.0;
    }
    1.0 - levenshtein(a, b) as f64 / longest as f64
}

/// Jaccard index of two token sets.
#[must_use]
#[allow(clippy::cast_precision_loss)]
pub fn token_jaccard(a: &[String], b: &[String]) -> f64 {
    let a: BTreeSet<&str> = a.iter().map(String::as_str).collect();
    let b: BTreeSet<&str> = b.iter().map(String::as_str).collect();
    let union = a.union(&b).count();
    if union == 0 {
        return 0.0;
    }
    a.intersection(&b).count() as f64 / union as f64
}

/// Similarity of two tokenized names.
///
/// Takes the larger of the token-set Jaccard index and the normalized edit
/// similarity of the sorted tokens, so word order never matters and small
/// typos still score high. Empty names never match.
#[must_use]
pub fn name_similarity(a: &[String], b: &[String]) -> f64 {
    if a.is_empty() || b.is_empty() {
        return 0.0;
    }
    let sorted = |tokens: &[String]| {
        let mut tokens = tokens.to_vec();
        tokens.sort_unstable();
        tokens.join(" ")
    };
    normalized_levenshtein(&sorted(a), &sorted(b)).max(token_jaccard(a, b))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::services::deduplication::name_tokens;

    fn approx_eq(a: f64, b: f64) -> bool {
        (a - b).abs() < 1e-9
    }

    #[test]
    fn test_levenshtein() {
        assert_eq!(levenshtein("", ""), 0);
        assert_eq!(levenshtein("anna", "anna"), 0);
        assert_eq!(levenshtein("anna", "ana"), 1);
        assert_eq!(levenshtein("åsa", "asa"), 1);
        assert_eq!(levenshtein("flaw", "lawn"), 2);
    }

    #[test]
    fn test_normalized_levenshtein() {
        assert!(approx_eq(normalized_levenshtein("", ""), 1.0));
        assert!(approx_eq(normalized_levenshtein("abcd", "abcd"), 1.0));
        assert!(approx_eq(normalized_levenshtein("abcd", "abce"), 0.75));
        assert!(approx_eq(normalized_levenshtein("abc", "xyz"), 0.0));
    }

    #[test]
    fn test_token_jaccard() {
        let a = name_tokens("anna maria larsson");
        let b = name_tokens("anna larsson");
        assert!(approx_eq(token_jaccard(&a, &b), 2.0 / 3.0));
        assert!(approx_eq(token_jaccard(&[], &[]), 0.0));
    }

    #[test]
    fn test_name_similarity_is_order_insensitive() {
        let a = name_tokens("Anna Larsson");
        let b = name_tokens("Larsson, Anna");
        assert!(approx_eq(name_similarity(&a, &b), 1.0));
    }

    #[test]
    fn test_name_similarity_typo() {
        let a = name_tokens("Jonathan Smith");
        let b = name_tokens("Jonathon Smith");
        let similarity = name_similarity(&a, &b);
        assert!(similarity > 0.9 && similarity < 1.0);
    }

    #[test]
    fn test_name_similarity_different_people() {
        let a = name_tokens("Anna Larsson");
        let b = name_tokens("Erik Holm");
        assert!(name_similarity(&a, &b) < 0.5);
        assert!(approx_eq(name_similarity(&a, &[]), 0.0));
    }
}

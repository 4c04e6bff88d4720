//! Text similarity used to fold new topics into popular keywords.
//!
//! The shipped provider compares spelling, not meaning: `--merge-similar`
//! folds "Politic" into "Politics" but never "Soccer" into "Football".
//! A meaning-aware provider can be plugged in through [`TextSimilarity`].

use similar::TextDiff;

/// Score at or above which a new topic reuses a common keyword.
pub const DEFAULT_SIMILARITY_THRESHOLD: f64 = 0.70;

/// Anything that can score how alike two short labels are.
///
/// Scores are in `[0, 1]`. `None` means the provider cannot tell, which
/// callers treat the same as "not similar". The default provider,
/// [`LexicalSimilarity`], is lexical; nothing in this crate scores semantic
/// similarity.
pub trait TextSimilarity {
    fn similarity(&self, a: &str, b: &str) -> Option<f64>;
}

/// Case-insensitive character-level similarity. Synonyms with different
/// spelling score low.
///
/// Uses the diff ratio (`2 * matches / total chars`), so "Politic" and
/// "Politics" score high while "Abuse" and "Animal Abuse" stay below the
/// default threshold.
#[derive(Debug, Default, Clone, Copy)]
pub struct LexicalSimilarity;

impl TextSimilarity for LexicalSimilarity {
    fn similarity(&self, a: &str, b: &str) -> Option<f64> {
        let a = a.trim().to_lowercase();
        let b = b.trim().to_lowercase();
        if a.is_empty() || b.is_empty() {
            return None;
        }
        Some(TextDiff::from_chars(a.as_str(), b.as_str()).ratio() as f64)
    }
}

//! Text similarity used by deduplication and topic suppression.

use rapidfuzz::distance::levenshtein;
use std::collections::BTreeSet;

/// Pairwise similarity above this score counts as near-duplication.
pub const DEFAULT_DUPLICATE_THRESHOLD: f64 = 0.82;

/// Fuzzy score above which a token matches a suppressed topic word.
const TOPIC_MATCH_THRESHOLD: f64 = 0.8;

/// Scores how alike two candidate texts read, in `[0.0, 1.0]`.
pub trait Similarity: Send + Sync {
    fn score(&self, a: &str, b: &str) -> f64;
}

/// Default scorer: the higher of normalized edit similarity over the
/// full lowercased texts and Jaccard overlap over word tokens. Edit
/// distance catches reworded near-copies; token overlap catches the
/// same sentences in shuffled order.
#[derive(Debug, Default, Clone, Copy)]
pub struct EditTokenSimilarity;

impl Similarity for EditTokenSimilarity {
    fn score(&self, a: &str, b: &str) -> f64 {
        let a_lower = a.to_lowercase();
        let b_lower = b.to_lowercase();
        if a_lower == b_lower {
            return 1.0;
        }

        let edit = levenshtein::normalized_similarity(a_lower.chars(), b_lower.chars());

        let a_tokens: BTreeSet<String> = tokenize(&a_lower).collect();
        let b_tokens: BTreeSet<String> = tokenize(&b_lower).collect();
        let jaccard = if a_tokens.is_empty() || b_tokens.is_empty() {
            0.0
        } else {
            let shared = a_tokens.intersection(&b_tokens).count() as f64;
            let union = a_tokens.union(&b_tokens).count() as f64;
            shared / union
        };

        edit.max(jaccard)
    }
}

/// Split lowercased text into alphanumeric word tokens.
pub fn tokenize(text: &str) -> impl Iterator<Item = String> + '_ {
    text.split(|c: char| !c.is_alphanumeric())
        .filter(|t| !t.is_empty())
        .map(|t| t.to_lowercase())
}

/// Fold trivial plural forms so "exes" matches "ex" and "dogs" matches
/// "dog". Deliberately crude; anything subtler belongs in the fuzzy
/// comparison.
pub(crate) fn stem(token: &str) -> &str {
    if token.len() > 3 {
        if let Some(base) = token.strip_suffix("es") {
            return base;
        }
    }
    if token.len() > 2 {
        if let Some(base) = token.strip_suffix('s') {
            return base;
        }
    }
    token
}

/// Whether `text` touches the suppressed `topic`.
///
/// Every content word of the topic must appear in the text, where
/// "appear" means stem-equal or fuzzy-close. Single-word topics like
/// "exes" therefore catch "your ex", while a multi-word topic like
/// "salary negotiation" does not fire on "salary" alone.
pub fn topic_matches(text: &str, topic: &str) -> bool {
    let text_tokens: Vec<String> = tokenize(text).collect();
    if text_tokens.is_empty() {
        return false;
    }

    let mut topic_words = 0usize;
    for topic_token in tokenize(topic) {
        topic_words += 1;
        let topic_stem = stem(&topic_token);
        let hit = text_tokens.iter().any(|t| {
            let t_stem = stem(t);
            if t_stem == topic_stem {
                return true;
            }
            levenshtein::normalized_similarity(t_stem.chars(), topic_stem.chars())
                >= TOPIC_MATCH_THRESHOLD
        });
        if !hit {
            return false;
        }
    }

    topic_words > 0
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn identical_texts_score_one() {
        let sim = EditTokenSimilarity;
        assert_eq!(sim.score("Love that hiking photo!", "Love that hiking photo!"), 1.0);
    }

    #[test]
    fn case_is_ignored() {
        let sim = EditTokenSimilarity;
        assert_eq!(sim.score("Hey There", "hey there"), 1.0);
    }

    #[test]
    fn unrelated_texts_score_low() {
        let sim = EditTokenSimilarity;
        let score = sim.score(
            "That ceviche spot in Lima sounds incredible.",
            "Do you always bring your dog on first dates?",
        );
        assert!(score < DEFAULT_DUPLICATE_THRESHOLD, "score was {score}");
    }

    #[test]
    fn shuffled_sentences_score_high() {
        let sim = EditTokenSimilarity;
        let a = "Peru sounds amazing. What was the best part of the trip?";
        let b = "What was the best part of the trip? Peru sounds amazing.";
        assert!(sim.score(a, b) >= DEFAULT_DUPLICATE_THRESHOLD);
    }

    #[test]
    fn near_copy_scores_high() {
        let sim = EditTokenSimilarity;
        let a = "Peru sounds amazing, what was the highlight?";
        let b = "Peru sounds amazing, what was the highlight of it?";
        assert!(sim.score(a, b) >= DEFAULT_DUPLICATE_THRESHOLD);
    }

    #[test]
    fn topic_matches_plural_folding() {
        assert!(topic_matches("So tell me about your ex.", "exes"));
        assert!(topic_matches("Any exes I should know about?", "ex"));
    }

    #[test]
    fn topic_matches_requires_all_words() {
        assert!(topic_matches("How did the salary negotiation go?", "salary negotiation"));
        assert!(!topic_matches("Is the salary good there?", "salary negotiation"));
    }

    #[test]
    fn topic_does_not_match_absent_subject() {
        assert!(!topic_matches("Loved your hiking photos!", "exes"));
        assert!(!topic_matches("", "exes"));
    }

    #[test]
    fn topic_matches_fuzzy_variants() {
        assert!(topic_matches("Still thinking about your divorce?", "divorced"));
    }
}

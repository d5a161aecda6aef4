//! Question detection and question-coverage repair.
//!
//! An accepted variant set should keep the conversation moving: unless
//! the other party has signalled closure, at least one variant must end
//! in an open-ended question. When none does, the engine repairs the
//! lowest-priority variant by appending a question from a small
//! template bank instead of burning a retry.

use crate::validate::similarity::tokenize;
use std::collections::BTreeSet;

/// Auxiliary verbs that open yes/no questions. A question led by one of
/// these invites a one-word answer, so it does not count as open-ended.
const YES_NO_OPENERS: &[&str] = &[
    "are", "is", "was", "were", "do", "does", "did", "have", "has", "had", "can", "could", "will",
    "would", "should", "shall", "may", "might", "am",
];

/// Interrogative words that open a question worth answering at length.
const OPEN_OPENERS: &[&str] = &["what", "how", "why", "where", "when", "which", "who", "whose"];

/// Words too common to identify a question's subject.
const STOPWORDS: &[&str] = &[
    "a", "an", "the", "and", "or", "but", "of", "to", "in", "on", "at", "for", "with", "about",
    "your", "my", "you", "i", "me", "we", "us", "it", "its", "is", "are", "was", "were", "do",
    "does", "did", "what", "how", "why", "where", "when", "which", "who", "that", "this", "so",
    "be", "been", "have", "has", "had", "there", "their", "they", "s", "t", "re", "ve",
    "sounds", "like", "great", "good", "nice", "amazing", "really", "fun", "love",
];

/// Topic-keyed question templates for coverage repair, plus a general
/// fallback. Keyed by a keyword expected in the conversation topic.
const TEMPLATE_BANK: &[(&str, &str)] = &[
    ("travel", "What's the next trip on your list?"),
    ("trip", "What was the highlight of the trip?"),
    ("food", "What's the best thing you've eaten lately?"),
    ("restaurant", "Any restaurant I absolutely have to try?"),
    ("music", "What have you had on repeat lately?"),
    ("movie", "Seen anything lately worth recommending?"),
    ("book", "What are you reading right now?"),
    ("hiking", "What's your favorite trail around here?"),
    ("dog", "What's your dog's best trick?"),
    ("work", "What's the most surprising part of your job?"),
    ("weekend", "What does your ideal weekend look like?"),
];

/// General fallback when no template keyword matches the topic.
const GENERAL_TEMPLATE: &str = "What's been the best part of your week?";

/// Whether the text contains a question at all.
pub fn is_question(text: &str) -> bool {
    text.contains('?')
}

/// Whether the text ends in an open-ended question.
///
/// The final sentence must be a question and must not open with a
/// yes/no auxiliary. Interrogative openers qualify outright; anything
/// else qualifies only if it is a question that is not auxiliary-led,
/// which covers forms like "Tell me more about Peru?".
pub fn is_open_ended(text: &str) -> bool {
    let trimmed = text.trim();
    if !trimmed.ends_with('?') {
        return false;
    }

    // Last sentence: everything after the previous terminator.
    let last = trimmed
        .trim_end_matches('?')
        .rsplit(['.', '!', '?'])
        .next()
        .unwrap_or("")
        .trim();

    let first_word = match tokenize(last).next() {
        Some(w) => w,
        None => return false,
    };

    if OPEN_OPENERS.contains(&first_word.as_str()) {
        return true;
    }
    !YES_NO_OPENERS.contains(&first_word.as_str())
}

/// Content words of the questions in `text`, for the reuse check that
/// keeps a repaired set from asking the same thing twice.
pub fn question_subjects(text: &str) -> BTreeSet<String> {
    let mut subjects = BTreeSet::new();
    for sentence in text.split_inclusive(['.', '!', '?']) {
        if !sentence.trim_end().ends_with('?') {
            continue;
        }
        for token in tokenize(sentence) {
            if !STOPWORDS.contains(&token.as_str()) {
                subjects.insert(token);
            }
        }
    }
    subjects
}

/// Pick a repair question for the given topic, avoiding any question
/// subject already used elsewhere in the set. Deterministic: the first
/// matching template wins.
pub fn repair_question(topic: Option<&str>, used_subjects: &BTreeSet<String>) -> &'static str {
    if let Some(topic) = topic {
        let topic_tokens: BTreeSet<String> = tokenize(topic).collect();
        for (keyword, template) in TEMPLATE_BANK {
            if topic_tokens.contains(*keyword)
                && !question_overlaps(template, used_subjects)
            {
                return template;
            }
        }
    }
    if !question_overlaps(GENERAL_TEMPLATE, used_subjects) {
        return GENERAL_TEMPLATE;
    }
    // Every template collides; fall back to the bank's first entry
    // rather than produce no question at all.
    TEMPLATE_BANK[0].1
}

fn question_overlaps(template: &str, used_subjects: &BTreeSet<String>) -> bool {
    question_subjects(template)
        .iter()
        .any(|s| used_subjects.contains(s))
}

/// Append a repair question to a candidate text, preserving terminal
/// punctuation on what came before.
pub fn append_question(text: &str, question: &str) -> String {
    let trimmed = text.trim_end();
    if trimmed.is_empty() {
        return question.to_string();
    }
    if trimmed.ends_with(['.', '!', '?']) {
        format!("{trimmed} {question}")
    } else {
        format!("{trimmed}. {question}")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn detects_open_ended_questions() {
        assert!(is_open_ended("Peru sounds amazing! What was the highlight?"));
        assert!(is_open_ended("how did you get into climbing?"));
        assert!(is_open_ended("Tell me more about that trip?"));
    }

    #[test]
    fn yes_no_questions_are_not_open_ended() {
        assert!(!is_open_ended("Do you like hiking?"));
        assert!(!is_open_ended("Was it fun?"));
        assert!(!is_open_ended("Great trip. Did you see Machu Picchu?"));
    }

    #[test]
    fn statements_are_not_open_ended() {
        assert!(!is_open_ended("That sounds amazing."));
        assert!(!is_open_ended("What a great photo!"));
        assert!(!is_question("That sounds amazing."));
    }

    #[test]
    fn subjects_come_only_from_questions() {
        let subjects = question_subjects("Peru sounds amazing. What was the highlight of hiking?");
        assert!(subjects.contains("hiking"));
        assert!(subjects.contains("highlight"));
        assert!(!subjects.contains("peru"));
    }

    #[test]
    fn repair_prefers_topic_template() {
        let used = BTreeSet::new();
        assert_eq!(
            repair_question(Some("travel plans"), &used),
            "What's the next trip on your list?"
        );
        assert_eq!(repair_question(None, &used), GENERAL_TEMPLATE);
    }

    #[test]
    fn repair_avoids_used_subjects() {
        let used: BTreeSet<String> = ["trip".to_string(), "list".to_string()].into();
        let picked = repair_question(Some("travel"), &used);
        assert_ne!(picked, "What's the next trip on your list?");
    }

    #[test]
    fn append_preserves_punctuation() {
        assert_eq!(
            append_question("Love that photo!", "What's the story behind it?"),
            "Love that photo! What's the story behind it?"
        );
        assert_eq!(
            append_question("Love that photo", "What's the story behind it?"),
            "Love that photo. What's the story behind it?"
        );
    }
}

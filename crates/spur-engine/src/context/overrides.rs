//! Standing topic-suppression rules derived from Party B's refusals.
//!
//! When Party B says "I'd rather not talk about exes", an [`OverrideRule`]
//! for the topic "exes" is created. Rules are permanent for the lifetime
//! of the conversation: exactly one per distinct topic, never deleted,
//! and every future generation must exclude the topic. Persistence is the
//! conversation-state store's job; this module only detects and holds.

use crate::context::model::{ConversationTurn, Speaker};
use chrono::{DateTime, Utc};
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::sync::OnceLock;
use tracing::debug;

/// A permanent instruction to suppress one topic.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OverrideRule {
    /// Normalized topic (lowercase, trimmed of articles and possessives).
    pub topic: String,
    pub created_at: DateTime<Utc>,
    /// The Party B text the rule was derived from, for diagnostics.
    pub source_text: String,
}

impl OverrideRule {
    pub fn new(topic: impl Into<String>, source_text: impl Into<String>) -> Self {
        Self {
            topic: normalize_topic(&topic.into()),
            created_at: Utc::now(),
            source_text: source_text.into(),
        }
    }
}

/// The active override rules for one conversation: at most one per topic.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct OverrideSet {
    rules: BTreeMap<String, OverrideRule>,
}

impl OverrideSet {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert a rule. If the topic already has one, the earliest-created
    /// rule is kept; rules are never replaced or deleted.
    pub fn insert(&mut self, rule: OverrideRule) {
        match self.rules.get(&rule.topic) {
            Some(existing) if existing.created_at <= rule.created_at => {}
            _ => {
                debug!("override rule created for topic \"{}\"", rule.topic);
                self.rules.insert(rule.topic.clone(), rule);
            }
        }
    }

    pub fn contains(&self, topic: &str) -> bool {
        self.rules.contains_key(&normalize_topic(topic))
    }

    pub fn is_empty(&self) -> bool {
        self.rules.is_empty()
    }

    pub fn len(&self) -> usize {
        self.rules.len()
    }

    /// Suppressed topics in deterministic (sorted) order.
    pub fn topics(&self) -> impl Iterator<Item = &str> {
        self.rules.keys().map(|k| k.as_str())
    }

    pub fn rules(&self) -> impl Iterator<Item = &OverrideRule> {
        self.rules.values()
    }
}

/// Strip leading possessives/articles and trailing punctuation from a
/// captured topic phrase, then lowercase it.
fn normalize_topic(raw: &str) -> String {
    let mut topic = raw
        .trim()
        .trim_end_matches(['.', '!', '?', ','])
        .trim()
        .to_lowercase();
    for prefix in ["my ", "your ", "our ", "the ", "a ", "an "] {
        if let Some(rest) = topic.strip_prefix(prefix) {
            topic = rest.to_string();
            break;
        }
    }
    topic
}

fn refusal_patterns() -> &'static [Regex] {
    static PATTERNS: OnceLock<Vec<Regex>> = OnceLock::new();
    PATTERNS.get_or_init(|| {
        [
            r"(?i)\bi(?:'d| would)? rather not (?:talk|get) (?:about|into)\s+(?P<topic>[^.!?,]+)",
            r"(?i)\bi don'?t (?:want|wanna|like) to talk about\s+(?P<topic>[^.!?,]+)",
            r"(?i)\blet'?s not (?:talk about|get into)\s+(?P<topic>[^.!?,]+)",
            r"(?i)\b(?:please )?(?:stop|quit) (?:asking (?:me )?about|bringing up)\s+(?P<topic>[^.!?,]+)",
            r"(?i)\b(?:please )?don'?t (?:ask (?:me )?about|mention|bring up)\s+(?P<topic>[^.!?,]+)",
            r"(?i)\bnot comfortable (?:talking about|discussing)\s+(?P<topic>[^.!?,]+)",
        ]
        .iter()
        .map(|p| Regex::new(p).expect("refusal pattern must compile"))
        .collect()
    })
}

/// Scan a conversation for Party B refusals and produce override rules.
///
/// Only Party B turns create rules; Party A declining a topic is not a
/// suppression signal.
pub fn detect_refusals(history: &[ConversationTurn]) -> Vec<OverrideRule> {
    let mut rules = Vec::new();
    for turn in history.iter().filter(|t| t.speaker == Speaker::PartyB) {
        for pattern in refusal_patterns() {
            for caps in pattern.captures_iter(&turn.text) {
                if let Some(topic) = caps.name("topic") {
                    let normalized = normalize_topic(topic.as_str());
                    if !normalized.is_empty() {
                        rules.push(OverrideRule {
                            topic: normalized,
                            created_at: turn.timestamp,
                            source_text: turn.text.clone(),
                        });
                    }
                }
            }
        }
    }
    rules
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    fn turn_b(text: &str) -> ConversationTurn {
        ConversationTurn::new(Speaker::PartyB, text)
    }

    #[test]
    fn rather_not_talk_about_creates_rule() {
        let rules = detect_refusals(&[turn_b("I'd rather not talk about exes")]);
        assert_eq!(rules.len(), 1);
        assert_eq!(rules[0].topic, "exes");
    }

    #[test]
    fn possessives_and_punctuation_are_stripped() {
        let rules = detect_refusals(&[turn_b("please don't ask about my job.")]);
        assert_eq!(rules[0].topic, "job");

        let rules = detect_refusals(&[turn_b("let's not get into politics, ok?")]);
        assert_eq!(rules[0].topic, "politics");
    }

    #[test]
    fn party_a_refusals_are_ignored() {
        let rules = detect_refusals(&[ConversationTurn::new(
            Speaker::PartyA,
            "I'd rather not talk about work",
        )]);
        assert!(rules.is_empty());
    }

    #[test]
    fn non_refusal_text_creates_nothing() {
        let rules = detect_refusals(&[turn_b("I love talking about food honestly")]);
        assert!(rules.is_empty());
    }

    #[test]
    fn one_rule_per_topic_earliest_wins() {
        let mut set = OverrideSet::new();
        let mut early = OverrideRule::new("exes", "first refusal");
        early.created_at = Utc::now() - Duration::hours(1);
        let late = OverrideRule::new("exes", "second refusal");

        set.insert(late);
        set.insert(early);

        assert_eq!(set.len(), 1);
        let rule = set.rules().next().unwrap();
        assert_eq!(rule.source_text, "first refusal");
    }

    #[test]
    fn topics_iterate_sorted() {
        let mut set = OverrideSet::new();
        set.insert(OverrideRule::new("work", "x"));
        set.insert(OverrideRule::new("exes", "y"));
        let topics: Vec<_> = set.topics().collect();
        assert_eq!(topics, vec!["exes", "work"]);
    }
}

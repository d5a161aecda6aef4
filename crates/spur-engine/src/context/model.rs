//! The normalized conversational context a generation request is built from.
//!
//! A [`Context`] is rebuilt fresh for every request from the caller's
//! conversation state plus newly observed refusals. It is never cached,
//! because the conversation may have moved on between requests.
//! Construction is pure: [`ContextBuilder::build`] has no side effects.

use crate::context::overrides::{OverrideSet, detect_refusals};
use crate::context::traits::TraitLedger;
use crate::error::EngineError;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Which side of the conversation a turn belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Speaker {
    /// The assisted user.
    PartyA,
    /// Their match.
    PartyB,
}

/// One message in the conversation. Ordering carries meaning: the last
/// turns define recency and topic drift.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConversationTurn {
    pub speaker: Speaker,
    pub text: String,
    #[serde(default = "Utc::now")]
    pub timestamp: DateTime<Utc>,
}

impl ConversationTurn {
    pub fn new(speaker: Speaker, text: impl Into<String>) -> Self {
        Self {
            speaker,
            text: text.into(),
            timestamp: Utc::now(),
        }
    }
}

/// Inclusive age range.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct AgeBand {
    pub min: u8,
    pub max: u8,
}

/// Identity-agnostic attributes of one party. Immutable per request.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct PartyProfile {
    #[serde(default)]
    pub age_band: Option<AgeBand>,
    #[serde(default)]
    pub locale: Option<String>,
    #[serde(default)]
    pub education: Option<String>,
    #[serde(default)]
    pub interests: Vec<String>,
    /// Free-text bio fragments, e.g. OCR'd profile excerpts.
    #[serde(default)]
    pub bio: Vec<String>,
}

impl PartyProfile {
    /// True when the profile carries no information at all.
    pub fn is_empty(&self) -> bool {
        self.age_band.is_none()
            && self.locale.is_none()
            && self.education.is_none()
            && self.interests.is_empty()
            && self.bio.is_empty()
    }

    /// The cold-open fallback: age 18–30, US, high-school-plus education.
    pub fn default_demographic() -> Self {
        Self {
            age_band: Some(AgeBand { min: 18, max: 30 }),
            locale: Some("US".into()),
            education: Some("high-school-plus".into()),
            interests: Vec::new(),
            bio: Vec::new(),
        }
    }
}

/// Where the conversation stands. Mirrors the situation taxonomy the
/// classifier side of the system produces.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Situation {
    ColdOpen,
    Recovery,
    FollowUpNoResponse,
    CtaSetup,
    CtaResponse,
    MessageRefinement,
    TopicPivot,
    ReEngagement,
}

impl std::fmt::Display for Situation {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Situation::ColdOpen => "cold_open",
            Situation::Recovery => "recovery",
            Situation::FollowUpNoResponse => "follow_up_no_response",
            Situation::CtaSetup => "cta_setup",
            Situation::CtaResponse => "cta_response",
            Situation::MessageRefinement => "message_refinement",
            Situation::TopicPivot => "topic_pivot",
            Situation::ReEngagement => "re_engagement",
        };
        f.write_str(s)
    }
}

/// Phrases that mark the conversation as winding down. When the last
/// Party B turn is a closing turn, the question-coverage rule is waived.
const CLOSING_PHRASES: [&str; 8] = [
    "goodnight",
    "good night",
    "gtg",
    "gotta go",
    "talk later",
    "talk tomorrow",
    "heading to bed",
    "have a good night",
];

/// The normalized context for one generation request.
#[derive(Debug, Clone)]
pub struct Context {
    pub history: Vec<ConversationTurn>,
    pub profile_a: PartyProfile,
    pub profile_b: PartyProfile,
    pub traits: TraitLedger,
    pub situation: Option<Situation>,
    pub topic: Option<String>,
    pub overrides: OverrideSet,
    /// Set when construction fell back to the default demographic
    /// assumption (cold open with no context at all).
    pub assumed_default_demographics: bool,
}

impl Context {
    /// Whether the conversation is at a terminal/closing turn.
    pub fn is_closing(&self) -> bool {
        let Some(last_b) = self
            .history
            .iter()
            .rev()
            .find(|t| t.speaker == Speaker::PartyB)
        else {
            return false;
        };
        let lower = last_b.text.to_lowercase();
        CLOSING_PHRASES.iter().any(|p| lower.contains(p))
    }
}

/// Pure builder for [`Context`]. Collects the caller's inputs, detects new
/// refusals in the history, and decides between failing closed and the
/// cold-open demographic fallback.
#[derive(Debug, Default)]
pub struct ContextBuilder {
    history: Vec<ConversationTurn>,
    profile_a: PartyProfile,
    profile_b: PartyProfile,
    traits: TraitLedger,
    situation: Option<Situation>,
    topic: Option<String>,
    overrides: OverrideSet,
}

impl ContextBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn history(mut self, history: Vec<ConversationTurn>) -> Self {
        self.history = history;
        self
    }

    pub fn profile_a(mut self, profile: PartyProfile) -> Self {
        self.profile_a = profile;
        self
    }

    pub fn profile_b(mut self, profile: PartyProfile) -> Self {
        self.profile_b = profile;
        self
    }

    pub fn traits(mut self, traits: TraitLedger) -> Self {
        self.traits = traits;
        self
    }

    pub fn situation(mut self, situation: Option<Situation>) -> Self {
        self.situation = situation;
        self
    }

    pub fn topic(mut self, topic: Option<String>) -> Self {
        self.topic = topic.filter(|t| !t.trim().is_empty());
        self
    }

    /// Seed standing override rules read from the conversation-state store.
    pub fn overrides(mut self, overrides: OverrideSet) -> Self {
        self.overrides = overrides;
        self
    }

    /// Build the context.
    ///
    /// The one permitted empty case (no profiles, no history, no
    /// situation, no topic) falls back to the default demographic
    /// assumption for Party B and a `cold_open` situation. Every other
    /// malformed input fails closed with [`EngineError::IncompleteContext`].
    pub fn build(mut self) -> Result<Context, EngineError> {
        if self.history.iter().any(|t| t.text.trim().is_empty()) {
            return Err(EngineError::IncompleteContext(
                "conversation history contains an empty turn".into(),
            ));
        }

        let profiles_absent = self.profile_a.is_empty() && self.profile_b.is_empty();
        let no_signals =
            self.history.is_empty() && self.situation.is_none() && self.topic.is_none();

        let mut assumed_default = false;
        if profiles_absent && no_signals {
            // Cold open with nothing to go on: assume the default
            // demographic rather than failing.
            self.profile_b = PartyProfile::default_demographic();
            self.situation = Some(Situation::ColdOpen);
            assumed_default = true;
        } else if profiles_absent && self.history.is_empty() && self.topic.is_none() {
            // A bare situation hint is not enough to write anybody a
            // message; fail closed.
            return Err(EngineError::IncompleteContext(
                "a situation alone is not enough context; provide a profile, history, or topic"
                    .into(),
            ));
        }

        // Newly observed refusals become permanent override rules. Existing
        // rules for the same topic win (earliest creation is kept).
        for rule in detect_refusals(&self.history) {
            self.overrides.insert(rule);
        }

        Ok(Context {
            history: self.history,
            profile_a: self.profile_a,
            profile_b: self.profile_b,
            traits: self.traits,
            situation: self.situation,
            topic: self.topic,
            overrides: self.overrides,
            assumed_default_demographics: assumed_default,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn cold_open_falls_back_to_default_demographics() {
        let ctx = ContextBuilder::new().build().expect("cold open must build");
        assert!(ctx.assumed_default_demographics);
        assert_eq!(ctx.situation, Some(Situation::ColdOpen));
        let band = ctx.profile_b.age_band.expect("default age band");
        assert_eq!((band.min, band.max), (18, 30));
        assert_eq!(ctx.profile_b.locale.as_deref(), Some("US"));
    }

    #[test]
    fn bare_situation_fails_closed() {
        let err = ContextBuilder::new()
            .situation(Some(Situation::Recovery))
            .build()
            .unwrap_err();
        assert!(matches!(err, EngineError::IncompleteContext(_)));
    }

    #[test]
    fn topic_alone_is_enough() {
        let ctx = ContextBuilder::new()
            .topic(Some("hiking".into()))
            .build()
            .expect("topic-only context must build");
        assert!(!ctx.assumed_default_demographics);
        assert_eq!(ctx.topic.as_deref(), Some("hiking"));
    }

    #[test]
    fn empty_turn_text_fails_closed() {
        let err = ContextBuilder::new()
            .history(vec![ConversationTurn::new(Speaker::PartyB, "   ")])
            .build()
            .unwrap_err();
        assert!(matches!(err, EngineError::IncompleteContext(_)));
    }

    #[test]
    fn blank_topic_is_treated_as_absent() {
        let ctx = ContextBuilder::new().topic(Some("  ".into())).build().unwrap();
        assert!(ctx.topic.is_none());
        assert!(ctx.assumed_default_demographics);
    }

    #[test]
    fn refusals_in_history_become_overrides() {
        let ctx = ContextBuilder::new()
            .history(vec![
                ConversationTurn::new(Speaker::PartyA, "how did your last relationship end?"),
                ConversationTurn::new(Speaker::PartyB, "I'd rather not talk about exes"),
            ])
            .build()
            .unwrap();
        assert!(ctx.overrides.contains("exes"));
    }

    #[test]
    fn closing_turn_detected_from_last_party_b_message() {
        let ctx = ContextBuilder::new()
            .history(vec![
                ConversationTurn::new(Speaker::PartyA, "this was fun"),
                ConversationTurn::new(Speaker::PartyB, "same! heading to bed, goodnight"),
            ])
            .build()
            .unwrap();
        assert!(ctx.is_closing());

        let open = ContextBuilder::new()
            .history(vec![ConversationTurn::new(
                Speaker::PartyB,
                "so what do you do for fun?",
            )])
            .build()
            .unwrap();
        assert!(!open.is_closing());
    }
}

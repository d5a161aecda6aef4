//! Typed failure taxonomy for the engine.
//!
//! Everything that can go wrong is a value. Request-level failures are
//! [`EngineError`], per-candidate rule failures are [`RuleViolation`], and
//! non-fatal degradations are [`EngineWarning`]. Nothing in this crate
//! panics on a bad generation; the worst outcome of a request is an
//! `Err` carried back to the caller.

use crate::compose::SpurVariant;
use crate::guardrail::Category;
use thiserror::Error;

/// Request-level failure. Propagated to the caller; never logged-and-dropped.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum EngineError {
    /// Context construction failed closed (malformed or insufficient input).
    #[error("incomplete context: {0}")]
    IncompleteContext(String),

    /// The context was well-formed but could not be composed into a
    /// generation request (e.g. a trait confidence outside [0, 1]).
    #[error("prompt composition failed: {0}")]
    Composition(String),

    /// Transport failure, timeout, or a policy refusal from the generation
    /// collaborator. Retried internally; surfaced only when total.
    #[error("generation collaborator unavailable: {0}")]
    GenerationUnavailable(String),

    /// The collaborator answered, but the response could not be parsed
    /// into the expected labeled-variant structure.
    #[error("malformed generation response: {0}")]
    GenerationMalformed(String),
}

/// A single rule failure attached to one candidate.
///
/// Violations are collected, not short-circuited: a candidate's
/// [`ValidationResult`](crate::validate::ValidationResult) carries every
/// violation found, in pipeline order, even though the most severe one
/// alone decides its fate.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum RuleViolation {
    /// A guardrail rule with `Reject` action matched.
    #[error("guardrail violation: {category}")]
    Guardrail { category: Category },

    /// Sentence count outside [1, 5] or text over the character cap.
    #[error("length out of bounds ({sentences} sentences, {chars} chars)")]
    Length { sentences: usize, chars: usize },

    /// The candidate references a topic Party B has refused to discuss.
    #[error("references suppressed topic \"{topic}\"")]
    SuppressedTopic { topic: String },

    /// The candidate asks a question unrelated to anything said before it.
    #[error("question is a non-sequitur")]
    Incohesion,

    /// Near-duplicate of a higher-priority sibling variant.
    #[error("near-duplicate of the {kept} variant")]
    Duplicate { kept: SpurVariant },

    /// Built on generic filler phrasing ("just checking in", ...).
    /// Retryable, but an exhausted slot may still surface the candidate.
    #[error("generic filler phrasing: \"{phrase}\"")]
    WeakPhrasing { phrase: String },
}

impl RuleViolation {
    /// Short constraint hint appended to the prompt when regenerating the
    /// slot this violation rejected.
    pub fn avoidance_hint(&self) -> String {
        match self {
            RuleViolation::Guardrail { category } => {
                format!("avoid any {category} content")
            }
            RuleViolation::Length { .. } => {
                "keep it to between one and five short sentences".to_string()
            }
            RuleViolation::SuppressedTopic { topic } => {
                format!("never mention or allude to \"{topic}\"")
            }
            RuleViolation::Incohesion => {
                "only ask questions that follow from the conversation".to_string()
            }
            RuleViolation::Duplicate { kept } => {
                format!("say something clearly different from the {kept} message")
            }
            RuleViolation::WeakPhrasing { phrase } => {
                format!("avoid stock filler like \"{phrase}\"")
            }
        }
    }
}

/// Non-fatal degradation reported alongside a successful response.
///
/// A response with fewer than four variants is still a success, but it is
/// never presented as complete; the caller always sees why.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EngineWarning {
    /// One or more variant slots exhausted their retries and were dropped.
    DegradedOutput { missing: Vec<SpurVariant> },
    /// The request-level deadline expired before every slot settled.
    DeadlineExceeded,
}

impl std::fmt::Display for EngineWarning {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            EngineWarning::DegradedOutput { missing } => {
                let labels: Vec<&str> = missing.iter().map(|v| v.label()).collect();
                write!(f, "degraded output: missing {}", labels.join(", "))
            }
            EngineWarning::DeadlineExceeded => write!(f, "request deadline exceeded"),
        }
    }
}

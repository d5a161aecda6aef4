//! Candidate validation: the per-candidate rule pipeline and the
//! set-level checks that run once all slots have settled.
//!
//! A candidate moves through guardrails, structural bounds, topic
//! suppression, question cohesion, and weak-phrasing checks. Violations
//! are collected rather than short-circuited so a retry prompt can name
//! every constraint the rejected attempt broke. Set-level checks add
//! near-duplicate rejection across variants and question-coverage
//! repair.

pub mod questions;
pub mod similarity;

pub use similarity::{DEFAULT_DUPLICATE_THRESHOLD, EditTokenSimilarity, Similarity};

use crate::compose::{SpurVariant, VariantCatalog};
use crate::context::Context;
use crate::error::RuleViolation;
use crate::guardrail::{GuardrailCatalog, RuleAction};
use similarity::{tokenize, topic_matches};
use std::collections::BTreeSet;
use tracing::debug;

/// Generic filler phrasing a candidate must not be built on. Matched
/// case-insensitively as substrings.
pub const WEAK_PHRASES: [&str; 10] = [
    "just checking in",
    "hope you're doing well",
    "hope you are doing well",
    "hope all is well",
    "how's it going",
    "how is it going",
    "what's up",
    "long time no talk",
    "thinking of you",
    "just wanted to say hi",
];

/// One parsed candidate with its derived metrics.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SpurCandidate {
    pub variant: SpurVariant,
    pub text: String,
    pub has_question: bool,
    pub word_count: usize,
    pub sentence_count: usize,
}

impl SpurCandidate {
    pub fn new(variant: SpurVariant, text: impl Into<String>) -> Self {
        let text = text.into().trim().to_string();
        let has_question = questions::is_question(&text);
        let word_count = tokenize(&text).count();
        let sentence_count = count_sentences(&text);
        Self {
            variant,
            text,
            has_question,
            word_count,
            sentence_count,
        }
    }
}

/// Sentences are terminator-delimited; a trailing fragment without a
/// terminator still counts as one.
fn count_sentences(text: &str) -> usize {
    text.split_inclusive(['.', '!', '?'])
        .filter(|s| s.chars().any(|c| c.is_alphanumeric()))
        .count()
}

/// Outcome class for one candidate.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ValidationStatus {
    /// Passed every rule untouched.
    Accepted,
    /// Viable after an engine-side rewrite (silent filter or appended
    /// question).
    Repaired,
    /// Non-viable; the slot needs a retry or gets dropped.
    Rejected,
}

/// A candidate plus everything validation decided about it.
#[derive(Debug, Clone, PartialEq)]
pub struct ValidationResult {
    pub candidate: SpurCandidate,
    pub status: ValidationStatus,
    pub violations: Vec<RuleViolation>,
}

impl ValidationResult {
    pub fn is_rejected(&self) -> bool {
        self.status == ValidationStatus::Rejected
    }

    /// Constraint hints for the retry prompt, one per violation.
    pub fn avoidance_hints(&self) -> Vec<String> {
        self.violations.iter().map(|v| v.avoidance_hint()).collect()
    }
}

/// Structural and threshold knobs for the validator.
#[derive(Debug, Clone)]
pub struct ValidatorConfig {
    pub min_sentences: usize,
    pub max_sentences: usize,
    pub max_chars: usize,
    pub duplicate_threshold: f64,
}

impl Default for ValidatorConfig {
    fn default() -> Self {
        Self {
            min_sentences: 1,
            max_sentences: 5,
            max_chars: 300,
            duplicate_threshold: DEFAULT_DUPLICATE_THRESHOLD,
        }
    }
}

/// The rule pipeline. Owns the guardrail catalog, the variant catalog
/// whose tone bounds drive the structural check, and the similarity
/// scorer; stateless across requests.
pub struct Validator {
    config: ValidatorConfig,
    catalog: VariantCatalog,
    guardrails: GuardrailCatalog,
    similarity: Box<dyn Similarity>,
}

impl Default for Validator {
    fn default() -> Self {
        Self::new(
            ValidatorConfig::default(),
            GuardrailCatalog::builtin(),
            Box::new(EditTokenSimilarity),
        )
    }
}

impl Validator {
    pub fn new(
        config: ValidatorConfig,
        guardrails: GuardrailCatalog,
        similarity: Box<dyn Similarity>,
    ) -> Self {
        Self {
            config,
            catalog: VariantCatalog::default(),
            guardrails,
            similarity,
        }
    }

    /// Replace the variant catalog whose per-tone bounds the structural
    /// check enforces.
    pub fn with_catalog(mut self, catalog: VariantCatalog) -> Self {
        self.set_catalog(catalog);
        self
    }

    pub fn set_catalog(&mut self, catalog: VariantCatalog) {
        self.catalog = catalog;
    }

    pub fn guardrail_version(&self) -> &str {
        &self.guardrails.version
    }

    /// Effective maximum sentences and characters for a variant: the
    /// tone spec's bounds, capped by the global config.
    fn bounds_for(&self, variant: SpurVariant) -> (usize, usize) {
        let spec = self.catalog.spec(variant);
        (
            spec.max_sentences.min(self.config.max_sentences),
            spec.max_chars.min(self.config.max_chars),
        )
    }

    /// Run the per-candidate pipeline on one raw candidate text.
    ///
    /// Guardrail silent filters rewrite the text before the structural
    /// checks, so a candidate pushed under a bound by a stripped phrase
    /// is judged on what would actually be shown.
    pub fn check_candidate(
        &self,
        variant: SpurVariant,
        raw: &str,
        ctx: &Context,
    ) -> ValidationResult {
        let mut violations: Vec<RuleViolation> = Vec::new();

        let hits = self.guardrails.evaluate(raw);
        for hit in hits.iter().filter(|h| h.action == RuleAction::Reject) {
            let v = RuleViolation::Guardrail {
                category: hit.category,
            };
            if !violations.contains(&v) {
                violations.push(v);
            }
        }
        let (text, applied) = self.guardrails.apply_silent_filters(raw, &hits);
        let silently_repaired = !applied.is_empty();

        let candidate = SpurCandidate::new(variant, text);

        let (max_sentences, max_chars) = self.bounds_for(variant);
        if candidate.sentence_count < self.config.min_sentences
            || candidate.sentence_count > max_sentences
            || candidate.text.chars().count() > max_chars
        {
            violations.push(RuleViolation::Length {
                sentences: candidate.sentence_count,
                chars: candidate.text.chars().count(),
            });
        }

        for topic in ctx.overrides.topics() {
            if topic_matches(&candidate.text, topic) {
                violations.push(RuleViolation::SuppressedTopic {
                    topic: topic.to_string(),
                });
            }
        }

        if candidate.has_question
            && !ctx.history.is_empty()
            && !self.question_coheres(&candidate.text, ctx)
        {
            violations.push(RuleViolation::Incohesion);
        }

        let lower = candidate.text.to_lowercase();
        if let Some(phrase) = WEAK_PHRASES.iter().find(|p| lower.contains(*p)) {
            violations.push(RuleViolation::WeakPhrasing {
                phrase: (*phrase).to_string(),
            });
        }

        let status = if !violations.is_empty() {
            ValidationStatus::Rejected
        } else if silently_repaired {
            ValidationStatus::Repaired
        } else {
            ValidationStatus::Accepted
        };

        if status == ValidationStatus::Rejected {
            debug!(
                "{} candidate rejected: {}",
                variant,
                violations
                    .iter()
                    .map(|v| v.to_string())
                    .collect::<Vec<_>>()
                    .join("; ")
            );
        }

        ValidationResult {
            candidate,
            status,
            violations,
        }
    }

    /// A question coheres when at least one of its content words was
    /// said before it, in the history, the topic, Party B's profile, an
    /// observed trait, or the candidate's own sentences leading up to
    /// the question. Questions with fewer than two content words read
    /// as generic follow-ups ("what was the highlight?") and are
    /// waived; the non-sequitur rule only fires on questions that
    /// introduce a whole new subject.
    fn question_coheres(&self, text: &str, ctx: &Context) -> bool {
        let subjects = questions::question_subjects(text);
        if subjects.len() < 2 {
            return true;
        }
        let mut grounding: BTreeSet<String> = context_tokens(ctx)
            .iter()
            .map(|t| similarity::stem(t).to_string())
            .collect();
        for sentence in text.split_inclusive(['.', '!', '?']) {
            if sentence.trim_end().ends_with('?') {
                break;
            }
            grounding.extend(tokenize(sentence).map(|t| similarity::stem(&t).to_string()));
        }
        subjects
            .iter()
            .any(|s| grounding.contains(similarity::stem(s)))
    }

    /// Full set-level pass: near-duplicate rejection, then
    /// question-coverage repair.
    pub fn check_set(
        &self,
        results: Vec<ValidationResult>,
        ctx: &Context,
    ) -> Vec<ValidationResult> {
        let results = self.dedup(results);
        self.repair_coverage(results, ctx)
    }

    /// Reject near-duplicates across the viable candidates.
    ///
    /// When two viable candidates score at or above the duplicate
    /// threshold, the lower-priority one is rejected and records which
    /// variant it duplicated. Runs between retry rounds so a rejected
    /// duplicate can be regenerated with a differentiation hint.
    pub fn dedup(&self, mut results: Vec<ValidationResult>) -> Vec<ValidationResult> {
        results.sort_by_key(|r| r.candidate.variant);

        for i in 0..results.len() {
            if results[i].is_rejected() {
                continue;
            }
            for j in (i + 1)..results.len() {
                if results[j].is_rejected() {
                    continue;
                }
                let score = self
                    .similarity
                    .score(&results[i].candidate.text, &results[j].candidate.text);
                if score >= self.config.duplicate_threshold {
                    let kept = results[i].candidate.variant;
                    debug!(
                        "{} rejected as near-duplicate of {} (score {score:.2})",
                        results[j].candidate.variant, kept
                    );
                    results[j].status = ValidationStatus::Rejected;
                    results[j].violations.push(RuleViolation::Duplicate { kept });
                }
            }
        }

        results
    }

    /// Ensure at least one viable candidate ends in an open-ended
    /// question, unless the conversation is closing. When none does,
    /// the lowest-priority viable candidate with room for one more
    /// sentence gets a template question appended and is marked
    /// repaired. If no candidate has room, the set is left without a
    /// question rather than pushed past its bounds.
    pub fn repair_coverage(
        &self,
        mut results: Vec<ValidationResult>,
        ctx: &Context,
    ) -> Vec<ValidationResult> {
        results.sort_by_key(|r| r.candidate.variant);

        if !ctx.is_closing() {
            let covered = results
                .iter()
                .filter(|r| !r.is_rejected())
                .any(|r| questions::is_open_ended(&r.candidate.text));
            if !covered {
                let used: BTreeSet<String> = results
                    .iter()
                    .filter(|r| !r.is_rejected())
                    .flat_map(|r| questions::question_subjects(&r.candidate.text))
                    .collect();
                let question = questions::repair_question(ctx.topic.as_deref(), &used);
                let target = results
                    .iter_mut()
                    .rev()
                    .find(|r| !r.is_rejected() && self.has_room_for(&r.candidate, question));
                match target {
                    Some(target) => {
                        debug!(
                            "appending coverage question to {} variant",
                            target.candidate.variant
                        );
                        let repaired =
                            questions::append_question(&target.candidate.text, question);
                        target.candidate = SpurCandidate::new(target.candidate.variant, repaired);
                        target.status = ValidationStatus::Repaired;
                    }
                    None => {
                        debug!("no viable candidate has room for a coverage question");
                    }
                }
            }
        }

        results
    }

    /// Whether appending `question` keeps the candidate inside its
    /// sentence and character bounds.
    fn has_room_for(&self, candidate: &SpurCandidate, question: &str) -> bool {
        let (max_sentences, max_chars) = self.bounds_for(candidate.variant);
        if candidate.sentence_count + 1 > max_sentences {
            return false;
        }
        let appended = questions::append_question(&candidate.text, question);
        appended.chars().count() <= max_chars
    }
}

/// Every content-word stem the context has put on the table.
fn context_tokens(ctx: &Context) -> BTreeSet<String> {
    let mut tokens = BTreeSet::new();
    for turn in &ctx.history {
        tokens.extend(tokenize(&turn.text));
    }
    if let Some(topic) = &ctx.topic {
        tokens.extend(tokenize(topic));
    }
    for profile in [&ctx.profile_a, &ctx.profile_b] {
        for interest in &profile.interests {
            tokens.extend(tokenize(interest));
        }
        for fragment in &profile.bio {
            tokens.extend(tokenize(fragment));
        }
    }
    for t in ctx.traits.observations() {
        tokens.extend(tokenize(&t.name));
    }
    tokens
}

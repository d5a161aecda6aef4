//! The orchestrating engine: one [`SpurEngine::run`] call covers context
//! normalization, prompt composition, generation, validation, per-slot
//! retries, and degraded-output handling.
//!
//! All four variants travel in one initial call so the collaborator can
//! keep them distinct itself; only rejected slots are regenerated, each
//! in its own call carrying the violations of the attempt it replaces as
//! avoid-clauses. Retries for different slots run concurrently up to the
//! policy's bound, and the whole run is cut off at the request deadline.

use crate::compose::{SpurVariant, VariantCatalog, compose};
use crate::context::{
    Context, ContextBuilder, ConversationTurn, OverrideSet, PartyProfile, Situation, TraitLedger,
};
use crate::error::{EngineError, EngineWarning, RuleViolation};
use crate::generate::{SpurGenerator, parse_variants};
use crate::policy::SelectionPolicy;
use crate::validate::{ValidationResult, ValidationStatus, Validator};
use futures::StreamExt;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::Instant;
use tracing::{debug, info, warn};

/// Caller-facing request. Everything is optional; a fully empty request
/// is a cold open and falls back to default demographic assumptions.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SpurRequest {
    #[serde(default)]
    pub history: Vec<ConversationTurn>,
    #[serde(default)]
    pub profile_a: PartyProfile,
    #[serde(default)]
    pub profile_b: PartyProfile,
    #[serde(default)]
    pub traits: TraitLedger,
    #[serde(default)]
    pub situation: Option<Situation>,
    #[serde(default)]
    pub topic: Option<String>,
    #[serde(default)]
    pub overrides: OverrideSet,
}

/// How one variant slot ended up.
#[derive(Debug, Clone)]
pub struct SlotReport {
    pub variant: SpurVariant,
    /// Collaborator calls that produced a candidate for this slot,
    /// counting the shared initial call.
    pub attempts: u32,
    pub status: ValidationStatus,
    /// Violations from the slot's last judged candidate.
    pub violations: Vec<RuleViolation>,
}

/// A successful engine run. `variants` may hold fewer than four entries;
/// when it does, `warnings` always says so.
#[derive(Debug, Clone)]
pub struct SpurResponse {
    pub variants: BTreeMap<SpurVariant, String>,
    pub warnings: Vec<EngineWarning>,
    pub reports: Vec<SlotReport>,
    pub guardrail_version: String,
}

/// The orchestration engine. Cheap to share; holds no per-request state.
pub struct SpurEngine {
    generator: Arc<dyn SpurGenerator>,
    catalog: VariantCatalog,
    validator: Validator,
    policy: SelectionPolicy,
}

impl SpurEngine {
    pub fn new(generator: Arc<dyn SpurGenerator>) -> Self {
        Self {
            generator,
            catalog: VariantCatalog::default(),
            validator: Validator::default(),
            policy: SelectionPolicy::default(),
        }
    }

    /// Replace the variant catalog. Its tone bounds also reach the
    /// validator, so apply any custom validator first.
    pub fn with_catalog(mut self, catalog: VariantCatalog) -> Self {
        self.validator.set_catalog(catalog.clone());
        self.catalog = catalog;
        self
    }

    pub fn with_validator(mut self, validator: Validator) -> Self {
        self.validator = validator;
        self
    }

    pub fn with_policy(mut self, policy: SelectionPolicy) -> Self {
        self.policy = policy;
        self
    }

    /// Run one request end to end.
    ///
    /// Returns `Err` only for request-level failures: a context that
    /// fails closed, or a collaborator that never produces a parseable
    /// response. Per-slot failures degrade the output instead and are
    /// reported through `warnings`.
    pub async fn run(&self, request: SpurRequest) -> Result<SpurResponse, EngineError> {
        let started = Instant::now();

        let ctx = ContextBuilder::new()
            .history(request.history)
            .profile_a(request.profile_a)
            .profile_b(request.profile_b)
            .traits(request.traits)
            .situation(request.situation)
            .topic(request.topic)
            .overrides(request.overrides)
            .build()?;

        let slots: Vec<SpurVariant> = SpurVariant::ALL.to_vec();
        let mut warnings: Vec<EngineWarning> = Vec::new();

        let parsed = self.initial_generation(&ctx, &slots, started).await?;

        let mut results: BTreeMap<SpurVariant, ValidationResult> = parsed
            .iter()
            .map(|(v, text)| (*v, self.validator.check_candidate(*v, text, &ctx)))
            .collect();
        let mut attempts: BTreeMap<SpurVariant, u32> =
            slots.iter().map(|v| (*v, 1)).collect();
        let mut weak_fallbacks: BTreeMap<SpurVariant, ValidationResult> = BTreeMap::new();
        for r in results.values() {
            record_weak_fallback(&mut weak_fallbacks, r);
        }

        let max_attempts = 1 + self.policy.max_slot_retries;
        let ctx = &ctx;

        loop {
            // Duplicate rejection between rounds, so a duplicated slot can
            // be retried with a differentiation hint.
            let deduped = self.validator.dedup(results.into_values().collect());
            results = deduped
                .into_iter()
                .map(|r| (r.candidate.variant, r))
                .collect();

            let retryable: Vec<(SpurVariant, Vec<String>, u32)> = results
                .values()
                .filter(|r| r.is_rejected())
                .filter(|r| attempts.get(&r.candidate.variant).copied().unwrap_or(0) < max_attempts)
                .map(|r| {
                    let attempt = attempts.get(&r.candidate.variant).copied().unwrap_or(0);
                    (r.candidate.variant, r.avoidance_hints(), attempt)
                })
                .collect();
            if retryable.is_empty() {
                break;
            }

            let Some(remaining) = self.remaining(started) else {
                warn!("request deadline expired with slots still rejected");
                warnings.push(EngineWarning::DeadlineExceeded);
                break;
            };
            let budget = remaining.min(self.policy.call_timeout);

            let regenerated: Vec<(SpurVariant, Result<String, EngineError>)> =
                futures::stream::iter(retryable.into_iter().map(|(variant, hints, attempt)| {
                    async move {
                        let outcome = self.regenerate_slot(ctx, variant, &hints, attempt, budget).await;
                        (variant, outcome)
                    }
                }))
                .buffer_unordered(self.policy.slot_concurrency)
                .collect()
                .await;

            for (variant, outcome) in regenerated {
                if let Some(count) = attempts.get_mut(&variant) {
                    *count += 1;
                }
                match outcome {
                    Ok(text) => {
                        let result = self.validator.check_candidate(variant, &text, ctx);
                        record_weak_fallback(&mut weak_fallbacks, &result);
                        results.insert(variant, result);
                    }
                    Err(err) => {
                        // A failed or timed-out call counts as a slot
                        // rejection; the previous verdict stands.
                        debug!("{variant} regeneration failed: {err}");
                    }
                }
            }
        }

        // A generic-but-harmless candidate beats an empty slot once the
        // retries are spent.
        for (variant, result) in results.iter_mut() {
            if result.is_rejected() {
                if let Some(mut fallback) = weak_fallbacks.remove(variant) {
                    debug!("{variant} slot falling back to weak-phrased candidate");
                    fallback.status = ValidationStatus::Repaired;
                    *result = fallback;
                }
            }
        }

        let final_results = self
            .validator
            .repair_coverage(results.into_values().collect(), ctx);

        let mut variants = BTreeMap::new();
        let mut reports = Vec::new();
        let mut missing = Vec::new();
        for r in final_results {
            let variant = r.candidate.variant;
            if r.is_rejected() {
                missing.push(variant);
            } else {
                variants.insert(variant, r.candidate.text.clone());
            }
            reports.push(SlotReport {
                variant,
                attempts: attempts.get(&variant).copied().unwrap_or(0),
                status: r.status,
                violations: r.violations,
            });
        }
        if !missing.is_empty() {
            warnings.push(EngineWarning::DegradedOutput { missing });
        }

        info!(
            "run complete: {}/{} variants in {:.1}s, {} warning(s)",
            variants.len(),
            slots.len(),
            started.elapsed().as_secs_f64(),
            warnings.len(),
        );

        Ok(SpurResponse {
            variants,
            warnings,
            reports,
            guardrail_version: self.validator.guardrail_version().to_string(),
        })
    }

    /// The shared first call: all slots in one request, retried whole on
    /// transport failure or an unparseable response.
    async fn initial_generation(
        &self,
        ctx: &Context,
        slots: &[SpurVariant],
        started: Instant,
    ) -> Result<BTreeMap<SpurVariant, String>, EngineError> {
        let request = compose(ctx, &self.catalog, slots, &[])?;
        let mut last_err =
            EngineError::GenerationUnavailable("no generation attempt was made".into());

        for attempt in 0..=self.policy.max_slot_retries {
            let Some(remaining) = self.remaining(started) else {
                return Err(last_err);
            };
            let budget = remaining.min(self.policy.call_timeout);

            match tokio::time::timeout(budget, self.generator.generate(&request, attempt)).await {
                Err(_) => {
                    last_err = EngineError::GenerationUnavailable(format!(
                        "initial generation timed out after {}s",
                        budget.as_secs()
                    ));
                }
                Ok(Err(err)) => last_err = err,
                Ok(Ok(raw)) => match parse_variants(&raw, slots) {
                    Ok(parsed) => return Ok(parsed),
                    Err(err) => {
                        debug!("initial response rejected: {err}");
                        last_err = err;
                    }
                },
            }
        }
        Err(last_err)
    }

    /// One regeneration call for one slot, carrying avoid-clauses from
    /// the rejected attempt.
    async fn regenerate_slot(
        &self,
        ctx: &Context,
        variant: SpurVariant,
        hints: &[String],
        attempt: u32,
        budget: Duration,
    ) -> Result<String, EngineError> {
        let request = compose(ctx, &self.catalog, &[variant], hints)?;
        let raw = tokio::time::timeout(budget, self.generator.generate(&request, attempt))
            .await
            .map_err(|_| {
                EngineError::GenerationUnavailable(format!(
                    "{variant} regeneration timed out after {}s",
                    budget.as_secs()
                ))
            })??;
        let mut parsed = parse_variants(&raw, &[variant])?;
        parsed.remove(&variant).ok_or_else(|| {
            EngineError::GenerationMalformed(format!("response carried no {variant} entry"))
        })
    }

    fn remaining(&self, started: Instant) -> Option<Duration> {
        self.policy
            .request_deadline
            .checked_sub(started.elapsed())
            .filter(|d| !d.is_zero())
    }
}

/// Remember a candidate whose only fault is weak phrasing, as the slot's
/// fallback for when retries run out.
fn record_weak_fallback(
    fallbacks: &mut BTreeMap<SpurVariant, ValidationResult>,
    result: &ValidationResult,
) {
    if result.is_rejected()
        && !result.violations.is_empty()
        && result
            .violations
            .iter()
            .all(|v| matches!(v, RuleViolation::WeakPhrasing { .. }))
    {
        fallbacks.insert(result.candidate.variant, result.clone());
    }
}

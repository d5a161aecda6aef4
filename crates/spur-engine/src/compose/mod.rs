//! Deterministic prompt composition.
//!
//! [`compose`] turns a [`Context`] plus the variant catalog into the
//! system/user message pair sent to the generation collaborator. Given
//! identical inputs the output is byte-identical, so regressions in prompt
//! assembly show up as plain string diffs in tests, and retries only
//! differ by their appended constraint hints.
//!
//! Source priority is encoded in section order and an explicit
//! instruction: conversation history overrides situation, situation
//! overrides topic, topic overrides default assumptions.

pub mod catalog;

pub use catalog::{SpurVariant, ToneSpec, VariantCatalog};

use crate::context::{Context, DEFAULT_CONFIDENCE_THRESHOLD, Speaker};
use crate::error::EngineError;

/// The system/user prompt pair for one collaborator call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GenerationRequest {
    pub system: String,
    pub user: String,
    /// The variant slots this request asks for, in priority order.
    pub slots: Vec<SpurVariant>,
}

/// Persona rules sent as the system message on every call.
const SYSTEM_PROMPT: &str = "\
You help a dating-app user (Party A) write short outbound messages to a \
match (Party B). You write in Party A's voice, grounded only in the \
context provided. Never invent facts about either party, never pressure, \
never use crude or demeaning language. Each message must read like a \
real person typed it: one to five short sentences, no sign-offs, no \
emoji walls, no assistant-speak.";

/// Compose a generation request for the given slots.
///
/// `hints` carries avoid-clauses from a rejected attempt; the initial
/// call passes none. Fails with [`EngineError::Composition`] when the
/// context is malformed (a trait confidence outside [0, 1], or an empty
/// slot list).
pub fn compose(
    context: &Context,
    catalog: &VariantCatalog,
    slots: &[SpurVariant],
    hints: &[String],
) -> Result<GenerationRequest, EngineError> {
    if slots.is_empty() {
        return Err(EngineError::Composition(
            "no variant slots requested".into(),
        ));
    }
    for obs in context.traits.observations() {
        if !(0.0..=1.0).contains(&obs.confidence) {
            return Err(EngineError::Composition(format!(
                "trait \"{}\" has confidence {} outside [0, 1]",
                obs.name, obs.confidence
            )));
        }
    }

    let mut slots: Vec<SpurVariant> = slots.to_vec();
    slots.sort();
    slots.dedup();

    let mut user = String::new();

    // ── Instructions ───────────────────────────────────────────────
    user.push_str("### Instructions\n");
    user.push_str(&format!(
        "Write one message Party A could send to Party B for each of the \
         following {} tones:\n\n",
        slots.len()
    ));
    for (idx, variant) in slots.iter().enumerate() {
        let spec = catalog.spec(*variant);
        user.push_str(&format!("{}. {}: {}\n", idx + 1, variant, spec.descriptor));
    }
    user.push_str(
        "\nEach message must be distinct in tone and wording, must not \
         repeat the conversation's own messages, and must sound like it \
         naturally came from Party A.\n",
    );
    user.push_str(
        "When sources conflict, the conversation history wins over the \
         situation, the situation wins over the topic, and the topic wins \
         over default assumptions.\n",
    );
    user.push_str("\nRespond in JSON with exactly this shape:\n{\n");
    for (idx, variant) in slots.iter().enumerate() {
        let comma = if idx + 1 < slots.len() { "," } else { "" };
        user.push_str(&format!("  \"{variant}\": \"...\"{comma}\n"));
    }
    user.push_str("}\n");

    // ── Hard exclusions ────────────────────────────────────────────
    if !context.overrides.is_empty() {
        user.push_str("\n### Hard exclusions\n");
        user.push_str(
            "Party B has refused these topics. Never mention, reference, \
             or allude to any of them:\n",
        );
        for topic in context.overrides.topics() {
            user.push_str(&format!("- {topic}\n"));
        }
    }

    // ── Retry constraints ──────────────────────────────────────────
    if !hints.is_empty() {
        user.push_str("\n### Constraints from a rejected attempt\n");
        for hint in hints {
            user.push_str(&format!("- {hint}\n"));
        }
    }

    // ── Context, highest priority first ────────────────────────────
    user.push_str("\n### Context\n");

    if !context.history.is_empty() {
        user.push_str("\n*** Conversation (oldest first) ***\n");
        for turn in &context.history {
            let who = match turn.speaker {
                Speaker::PartyA => "Party A",
                Speaker::PartyB => "Party B",
            };
            user.push_str(&format!("{who}: {}\n", turn.text));
        }
    }

    if let Some(situation) = context.situation {
        user.push_str(&format!("\n*** Situation ***\n{situation}\n"));
    }

    if let Some(ref topic) = context.topic {
        user.push_str(&format!("\n*** Topic ***\n{topic}\n"));
    }

    push_profile(&mut user, "Party A profile", &context.profile_a);
    push_profile(&mut user, "Party B profile", &context.profile_b);

    let usable = context.traits.usable(DEFAULT_CONFIDENCE_THRESHOLD);
    if !usable.is_empty() {
        user.push_str("\n*** Party B traits ***\n");
        for t in &usable {
            let tag = if t.corroborated { "corroborated" } else { "high-confidence" };
            user.push_str(&format!("- {} ({:.2}, {tag})\n", t.name, t.confidence));
        }
    }

    if context.assumed_default_demographics {
        user.push_str(
            "\n*** Default assumptions ***\nNo profile or history is \
             available; assume an adult 18-30 in the US and keep the \
             opener universally safe.\n",
        );
    }

    Ok(GenerationRequest {
        system: SYSTEM_PROMPT.to_string(),
        user,
        slots,
    })
}

fn push_profile(out: &mut String, heading: &str, profile: &crate::context::PartyProfile) {
    if profile.is_empty() {
        return;
    }
    out.push_str(&format!("\n*** {heading} ***\n"));
    if let Some(band) = profile.age_band {
        out.push_str(&format!("age: {}-{}\n", band.min, band.max));
    }
    if let Some(ref locale) = profile.locale {
        out.push_str(&format!("locale: {locale}\n"));
    }
    if let Some(ref education) = profile.education {
        out.push_str(&format!("education: {education}\n"));
    }
    if !profile.interests.is_empty() {
        out.push_str(&format!("interests: {}\n", profile.interests.join(", ")));
    }
    for fragment in &profile.bio {
        out.push_str(&format!("bio: {fragment}\n"));
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::context::{
        ContextBuilder, ConversationTurn, PartyProfile, SignalSource, Situation, Speaker,
        TraitLedger, TraitObservation,
    };

    fn simple_context() -> Context {
        ContextBuilder::new()
            .history(vec![
                ConversationTurn::new(Speaker::PartyB, "I just got back from Peru!"),
                ConversationTurn::new(Speaker::PartyA, "No way, how was it?"),
            ])
            .topic(Some("travel".into()))
            .build()
            .unwrap()
    }

    #[test]
    fn compose_is_deterministic() {
        let ctx = simple_context();
        let catalog = VariantCatalog::default();
        let a = compose(&ctx, &catalog, &SpurVariant::ALL, &[]).unwrap();
        let b = compose(&ctx, &catalog, &SpurVariant::ALL, &[]).unwrap();
        assert_eq!(a.system, b.system);
        assert_eq!(a.user, b.user);
    }

    #[test]
    fn all_four_descriptors_present() {
        let ctx = simple_context();
        let req = compose(&ctx, &VariantCatalog::default(), &SpurVariant::ALL, &[]).unwrap();
        for v in SpurVariant::ALL {
            assert!(req.user.contains(v.label()), "missing {v}");
        }
        assert!(req.user.contains("Friendly"));
        assert!(req.user.contains("good-natured teasing"));
    }

    #[test]
    fn override_topics_become_hard_exclusions() {
        let ctx = ContextBuilder::new()
            .history(vec![
                ConversationTurn::new(Speaker::PartyB, "I'd rather not talk about exes"),
            ])
            .build()
            .unwrap();
        let req = compose(&ctx, &VariantCatalog::default(), &SpurVariant::ALL, &[]).unwrap();
        assert!(req.user.contains("### Hard exclusions"));
        assert!(req.user.contains("- exes"));
    }

    #[test]
    fn conversation_section_precedes_situation_and_topic() {
        let ctx = ContextBuilder::new()
            .history(vec![ConversationTurn::new(Speaker::PartyB, "hey!")])
            .situation(Some(Situation::Recovery))
            .topic(Some("music".into()))
            .build()
            .unwrap();
        let req = compose(&ctx, &VariantCatalog::default(), &SpurVariant::ALL, &[]).unwrap();
        let conv = req.user.find("*** Conversation").unwrap();
        let situation = req.user.find("*** Situation").unwrap();
        let topic = req.user.find("*** Topic").unwrap();
        assert!(conv < situation && situation < topic);
    }

    #[test]
    fn uncorroborated_low_confidence_traits_are_omitted() {
        let mut ledger = TraitLedger::new();
        ledger.record(TraitObservation::new("mysterious", 0.2, SignalSource::PhotoAnalysis));
        ledger.record(TraitObservation::new("outdoorsy", 0.9, SignalSource::ProfileText));
        let ctx = ContextBuilder::new()
            .profile_b(PartyProfile {
                interests: vec!["climbing".into()],
                ..PartyProfile::default()
            })
            .traits(ledger)
            .build()
            .unwrap();
        let req = compose(&ctx, &VariantCatalog::default(), &SpurVariant::ALL, &[]).unwrap();
        assert!(req.user.contains("outdoorsy"));
        assert!(!req.user.contains("mysterious"));
    }

    #[test]
    fn out_of_range_confidence_is_a_composition_error() {
        let mut ledger = TraitLedger::new();
        ledger.record(TraitObservation::new("keen", 1.3, SignalSource::ProfileText));
        let ctx = ContextBuilder::new().traits(ledger).build().unwrap();
        let err = compose(&ctx, &VariantCatalog::default(), &SpurVariant::ALL, &[]).unwrap_err();
        assert!(matches!(err, EngineError::Composition(_)));
    }

    #[test]
    fn hints_are_appended_on_retry() {
        let ctx = simple_context();
        let hints = vec!["never mention or allude to \"exes\"".to_string()];
        let req = compose(
            &ctx,
            &VariantCatalog::default(),
            &[SpurVariant::Banter],
            &hints,
        )
        .unwrap();
        assert!(req.user.contains("Constraints from a rejected attempt"));
        assert!(req.user.contains("allude to \"exes\""));
        assert_eq!(req.slots, vec![SpurVariant::Banter]);
    }

    #[test]
    fn cold_open_carries_default_assumption_note() {
        let ctx = ContextBuilder::new().build().unwrap();
        let req = compose(&ctx, &VariantCatalog::default(), &SpurVariant::ALL, &[]).unwrap();
        assert!(req.user.contains("Default assumptions"));
    }

    #[test]
    fn empty_slot_list_is_rejected() {
        let ctx = simple_context();
        let err = compose(&ctx, &VariantCatalog::default(), &[], &[]).unwrap_err();
        assert!(matches!(err, EngineError::Composition(_)));
    }
}

//! Parsing of raw collaborator output into labeled variants.
//!
//! The collaborator is asked for a JSON object, but the contract allows
//! two shapes: one JSON object with a key per variant, or one text block
//! with labeled sections. Both are handled here; the JSON path is
//! schema-validated before anything is trusted.

use crate::compose::SpurVariant;
use crate::error::EngineError;
use crate::json_schema_for;
use schemars::JsonSchema;
use serde::Deserialize;
use std::collections::BTreeMap;
use std::sync::OnceLock;
use tracing::debug;

/// The JSON shape the collaborator is asked to produce. All keys are
/// optional at the schema level because retries request a subset of
/// slots; coverage of the *expected* slots is checked separately.
#[derive(Debug, Deserialize, JsonSchema)]
#[serde(deny_unknown_fields)]
struct VariantPayload {
    #[serde(default)]
    main: Option<String>,
    #[serde(default)]
    warm: Option<String>,
    #[serde(default)]
    cool: Option<String>,
    #[serde(default)]
    banter: Option<String>,
    // Legacy key forms some prompt versions elicit.
    #[serde(default)]
    main_spur: Option<String>,
    #[serde(default)]
    warm_spur: Option<String>,
    #[serde(default)]
    cool_spur: Option<String>,
    #[serde(default)]
    banter_spur: Option<String>,
}

impl VariantPayload {
    fn take(&mut self, variant: SpurVariant) -> Option<String> {
        match variant {
            SpurVariant::Main => self.main.take().or_else(|| self.main_spur.take()),
            SpurVariant::Warm => self.warm.take().or_else(|| self.warm_spur.take()),
            SpurVariant::Cool => self.cool.take().or_else(|| self.cool_spur.take()),
            SpurVariant::Banter => self.banter.take().or_else(|| self.banter_spur.take()),
        }
    }
}

fn payload_validator() -> &'static jsonschema::Validator {
    static VALIDATOR: OnceLock<jsonschema::Validator> = OnceLock::new();
    VALIDATOR.get_or_init(|| {
        let schema = json_schema_for::<VariantPayload>();
        jsonschema::validator_for(&schema).expect("variant payload schema must be valid")
    })
}

/// Strip markdown code fences and stray backticks the collaborator tends
/// to wrap JSON in.
fn strip_fences(raw: &str) -> String {
    raw.trim()
        .trim_start_matches("```json")
        .trim_start_matches("```")
        .trim_end_matches("```")
        .trim_matches('`')
        .trim()
        .to_string()
}

/// Parse raw collaborator output into a variant → text map.
///
/// Tries the JSON shape first (schema-validated), then the labeled-
/// section shape. Fails with [`EngineError::GenerationMalformed`] when
/// neither shape yields every expected variant.
pub fn parse_variants(
    raw: &str,
    expected: &[SpurVariant],
) -> Result<BTreeMap<SpurVariant, String>, EngineError> {
    let cleaned = strip_fences(raw);
    if cleaned.is_empty() {
        return Err(EngineError::GenerationMalformed(
            "empty response body".into(),
        ));
    }

    let mut out = if cleaned.starts_with('{') {
        parse_json_shape(&cleaned)?
    } else {
        parse_sectioned_shape(&cleaned)
    };

    out.retain(|_, text| !text.trim().is_empty());

    let missing: Vec<&str> = expected
        .iter()
        .filter(|v| !out.contains_key(v))
        .map(|v| v.label())
        .collect();
    if !missing.is_empty() {
        return Err(EngineError::GenerationMalformed(format!(
            "response is missing expected variants: {}",
            missing.join(", ")
        )));
    }

    // Drop anything the request didn't ask for.
    out.retain(|v, _| expected.contains(v));
    Ok(out)
}

fn parse_json_shape(cleaned: &str) -> Result<BTreeMap<SpurVariant, String>, EngineError> {
    let value: serde_json::Value = serde_json::from_str(cleaned)
        .map_err(|e| EngineError::GenerationMalformed(format!("invalid JSON: {e}")))?;

    let errors: Vec<String> = payload_validator()
        .iter_errors(&value)
        .map(|e| format!("{}: {e}", e.instance_path()))
        .collect();
    if !errors.is_empty() {
        return Err(EngineError::GenerationMalformed(format!(
            "payload failed schema validation: {}",
            errors.join("; ")
        )));
    }

    let mut payload: VariantPayload = serde_json::from_value(value)
        .map_err(|e| EngineError::GenerationMalformed(format!("unexpected payload: {e}")))?;

    let mut out = BTreeMap::new();
    for variant in SpurVariant::ALL {
        if let Some(text) = payload.take(variant) {
            out.insert(variant, text.trim().to_string());
        }
    }
    debug!("parsed JSON payload with {} variants", out.len());
    Ok(out)
}

/// Fallback: one text block with labeled sections, e.g.
///
/// ```text
/// main: Glad your trip went well!
/// warm: That sounds like such a good week.
/// ```
///
/// Labels may be wrapped in `**`, `[]`, or `#` headers, and a section
/// runs until the next label.
fn parse_sectioned_shape(cleaned: &str) -> BTreeMap<SpurVariant, String> {
    let mut out: BTreeMap<SpurVariant, String> = BTreeMap::new();
    let mut current: Option<SpurVariant> = None;

    for line in cleaned.lines() {
        if let Some((variant, rest)) = split_label(line) {
            current = Some(variant);
            let entry = out.entry(variant).or_default();
            if !rest.is_empty() {
                entry.push_str(rest);
            }
        } else if let Some(variant) = current {
            let entry = out.entry(variant).or_default();
            if !entry.is_empty() {
                entry.push(' ');
            }
            entry.push_str(line.trim());
        }
    }

    for text in out.values_mut() {
        *text = text.trim().to_string();
    }
    debug!("parsed sectioned payload with {} variants", out.len());
    out
}

/// If the line starts with a variant label, return the variant and the
/// remainder of the line.
fn split_label(line: &str) -> Option<(SpurVariant, &str)> {
    let trimmed = line.trim().trim_start_matches(['#', '*', '[', '-', ' ']);
    let (label, rest) = trimmed.split_once(':')?;
    let label = label.trim().trim_end_matches([']', '*']);
    let variant = SpurVariant::from_label(label)?;
    Some((variant, rest.trim().trim_start_matches('*').trim()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn json_shape_parses_all_four() {
        let raw = r#"{
            "main": "Peru sounds incredible, what was the best part?",
            "warm": "Welcome back! I bet you have stories.",
            "cool": "Peru, huh. Guess I need a better passport.",
            "banter": "Did the llamas approve of you?"
        }"#;
        let map = parse_variants(raw, &SpurVariant::ALL).unwrap();
        assert_eq!(map.len(), 4);
        assert!(map[&SpurVariant::Banter].contains("llamas"));
    }

    #[test]
    fn code_fences_are_stripped() {
        let raw = "```json\n{\"main\": \"Hi there!\"}\n```";
        let map = parse_variants(raw, &[SpurVariant::Main]).unwrap();
        assert_eq!(map[&SpurVariant::Main], "Hi there!");
    }

    #[test]
    fn legacy_spur_keys_are_accepted() {
        let raw = r#"{"main_spur": "Hello!", "warm_spur": "Hey you!"}"#;
        let map = parse_variants(raw, &[SpurVariant::Main, SpurVariant::Warm]).unwrap();
        assert_eq!(map.len(), 2);
    }

    #[test]
    fn sectioned_shape_parses() {
        let raw = "\
main: Peru sounds amazing, what was the highlight?\n\
warm: So glad you made it back safe!\n\
cool: Not bad. Most people just go to the beach.\n\
banter: Be honest, how many alpaca selfies?";
        let map = parse_variants(raw, &SpurVariant::ALL).unwrap();
        assert_eq!(map.len(), 4);
        assert!(map[&SpurVariant::Cool].contains("beach"));
    }

    #[test]
    fn sectioned_shape_joins_continuation_lines() {
        let raw = "**Main:** First sentence.\nSecond sentence.\n[warm]: Warm text.";
        let map = parse_variants(raw, &[SpurVariant::Main, SpurVariant::Warm]).unwrap();
        assert_eq!(map[&SpurVariant::Main], "First sentence. Second sentence.");
        assert_eq!(map[&SpurVariant::Warm], "Warm text.");
    }

    #[test]
    fn missing_expected_variant_is_malformed() {
        let raw = r#"{"main": "Hello!", "warm": "Hey!"}"#;
        let err = parse_variants(raw, &SpurVariant::ALL).unwrap_err();
        match err {
            EngineError::GenerationMalformed(msg) => {
                assert!(msg.contains("cool"));
                assert!(msg.contains("banter"));
            }
            other => panic!("expected GenerationMalformed, got {other:?}"),
        }
    }

    #[test]
    fn unknown_keys_fail_schema_validation() {
        let raw = r#"{"main": "Hello!", "spicy": "nope"}"#;
        let err = parse_variants(raw, &[SpurVariant::Main]).unwrap_err();
        assert!(matches!(err, EngineError::GenerationMalformed(_)));
    }

    #[test]
    fn empty_variant_text_counts_as_missing() {
        let raw = r#"{"main": "   "}"#;
        let err = parse_variants(raw, &[SpurVariant::Main]).unwrap_err();
        assert!(matches!(err, EngineError::GenerationMalformed(_)));
    }

    #[test]
    fn unrequested_variants_are_dropped() {
        let raw = r#"{"main": "Hello!", "banter": "Extra."}"#;
        let map = parse_variants(raw, &[SpurVariant::Main]).unwrap();
        assert_eq!(map.len(), 1);
        assert!(!map.contains_key(&SpurVariant::Banter));
    }

    #[test]
    fn garbage_is_malformed() {
        let err = parse_variants("{not json at all", &SpurVariant::ALL).unwrap_err();
        assert!(matches!(err, EngineError::GenerationMalformed(_)));
        let err = parse_variants("", &SpurVariant::ALL).unwrap_err();
        assert!(matches!(err, EngineError::GenerationMalformed(_)));
    }
}

//! Declarative content guardrails applied to every candidate.
//!
//! The catalog is a fixed, versioned rule set, read-only after process
//! start. Evaluation is pure and never short-circuits: every rule runs
//! and every hit is collected, so the validator can log full diagnostics
//! even when it ultimately acts on only the most severe one.
//!
//! Rules come in two kinds. `Reject` rules invalidate the whole
//! candidate. `SilentFilter` rules strip the offending span and let the
//! candidate continue as repaired; the end user never sees an error for
//! these, only cleaner text.

use regex::Regex;
use serde::{Deserialize, Serialize};
use std::ops::Range;
use std::path::Path;
use thiserror::Error;
use tracing::debug;

/// Content category a rule polices.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Category {
    Insult,
    SexualContent,
    ViolenceGlorification,
    CriminalGlorification,
    TargetedBias,
    ClichePhrase,
    FormattingTrap,
}

impl std::fmt::Display for Category {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Category::Insult => "insult/contempt",
            Category::SexualContent => "explicit sexual content",
            Category::ViolenceGlorification => "violence glorification",
            Category::CriminalGlorification => "criminal glorification",
            Category::TargetedBias => "targeted bias",
            Category::ClichePhrase => "cliché phrase",
            Category::FormattingTrap => "formatting trap",
        };
        f.write_str(s)
    }
}

/// What a matching rule does to the candidate.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RuleAction {
    /// Strip the offending span; the candidate continues as repaired.
    SilentFilter,
    /// The whole candidate is non-viable.
    Reject,
}

/// Rule matcher, serializable so catalogs can be loaded from JSON.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Matcher {
    /// Case-insensitive whole-phrase match for any listed phrase.
    Phrases { phrases: Vec<String> },
    /// Arbitrary regex (for formatting traps).
    Pattern { pattern: String },
}

/// Catalog load/parse failure. Separate from [`EngineError`](crate::error::EngineError)
/// because catalog loading happens at startup, not per request.
#[derive(Debug, Error)]
pub enum CatalogError {
    #[error("failed to read catalog file: {0}")]
    Io(#[from] std::io::Error),
    #[error("failed to parse catalog: {0}")]
    Parse(#[from] serde_json::Error),
    #[error("rule \"{rule}\" has an invalid matcher: {source}")]
    BadMatcher {
        rule: String,
        source: regex::Error,
    },
}

/// One guardrail rule with its compiled matcher.
#[derive(Debug, Clone)]
pub struct GuardrailRule {
    pub name: String,
    pub category: Category,
    pub action: RuleAction,
    regex: Regex,
}

/// Serialized form of a rule (matcher uncompiled).
#[derive(Debug, Clone, Serialize, Deserialize)]
struct RuleSpec {
    name: String,
    category: Category,
    action: RuleAction,
    matcher: Matcher,
}

impl GuardrailRule {
    fn compile(spec: RuleSpec) -> Result<Self, CatalogError> {
        let pattern = match &spec.matcher {
            Matcher::Phrases { phrases } => {
                let escaped: Vec<String> =
                    phrases.iter().map(|p| regex::escape(p)).collect();
                format!(r"(?i)\b(?:{})\b", escaped.join("|"))
            }
            Matcher::Pattern { pattern } => pattern.clone(),
        };
        let regex = Regex::new(&pattern).map_err(|source| CatalogError::BadMatcher {
            rule: spec.name.clone(),
            source,
        })?;
        Ok(Self {
            name: spec.name,
            category: spec.category,
            action: spec.action,
            regex,
        })
    }
}

/// One rule match against one candidate's text.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GuardrailHit {
    pub rule: String,
    pub category: Category,
    pub action: RuleAction,
    /// Byte range of the match in the evaluated text.
    pub span: Range<usize>,
    pub matched: String,
}

/// Serialized catalog shape.
#[derive(Debug, Serialize, Deserialize)]
struct CatalogSpec {
    version: String,
    rules: Vec<RuleSpec>,
}

/// The versioned guardrail catalog.
#[derive(Debug, Clone)]
pub struct GuardrailCatalog {
    pub version: String,
    rules: Vec<GuardrailRule>,
}

impl Default for GuardrailCatalog {
    fn default() -> Self {
        Self::builtin()
    }
}

impl GuardrailCatalog {
    /// The built-in rule set.
    pub fn builtin() -> Self {
        let spec = CatalogSpec {
            version: "builtin-2".into(),
            rules: builtin_rules(),
        };
        Self::from_spec(spec).expect("builtin catalog must compile")
    }

    /// Load a catalog from a JSON string.
    pub fn from_json_str(json: &str) -> Result<Self, CatalogError> {
        let spec: CatalogSpec = serde_json::from_str(json)?;
        Self::from_spec(spec)
    }

    /// Load a catalog from a JSON file.
    pub fn from_path(path: impl AsRef<Path>) -> Result<Self, CatalogError> {
        let json = std::fs::read_to_string(path)?;
        Self::from_json_str(&json)
    }

    fn from_spec(spec: CatalogSpec) -> Result<Self, CatalogError> {
        let rules = spec
            .rules
            .into_iter()
            .map(GuardrailRule::compile)
            .collect::<Result<Vec<_>, _>>()?;
        debug!(
            "guardrail catalog {} loaded ({} rules)",
            spec.version,
            rules.len()
        );
        Ok(Self {
            version: spec.version,
            rules,
        })
    }

    pub fn rule_count(&self) -> usize {
        self.rules.len()
    }

    /// Evaluate every rule against `text`, collecting all hits.
    pub fn evaluate(&self, text: &str) -> Vec<GuardrailHit> {
        let mut hits = Vec::new();
        for rule in &self.rules {
            for m in rule.regex.find_iter(text) {
                hits.push(GuardrailHit {
                    rule: rule.name.clone(),
                    category: rule.category,
                    action: rule.action,
                    span: m.range(),
                    matched: m.as_str().to_string(),
                });
            }
        }
        hits
    }

    /// Strip the spans of all silent-filter hits out of `text`.
    ///
    /// Rewrite strategy is omission: the span is removed and surrounding
    /// whitespace collapsed. Returns the rewritten text and the hits that
    /// were applied. Reject hits are left untouched for the caller.
    pub fn apply_silent_filters(
        &self,
        text: &str,
        hits: &[GuardrailHit],
    ) -> (String, Vec<GuardrailHit>) {
        let mut filtered: Vec<GuardrailHit> = hits
            .iter()
            .filter(|h| h.action == RuleAction::SilentFilter)
            .cloned()
            .collect();
        if filtered.is_empty() {
            return (text.to_string(), filtered);
        }
        // Walk spans left to right, clamping any span that overlaps an
        // already stripped region so its tail is removed too.
        filtered.sort_by_key(|h| h.span.start);
        let mut out = String::new();
        let mut cursor = 0usize;
        for hit in &filtered {
            if hit.span.end <= cursor {
                continue;
            }
            let start = hit.span.start.max(cursor);
            out.push_str(text.get(cursor..start).unwrap_or(""));
            cursor = hit.span.end;
        }
        out.push_str(text.get(cursor..).unwrap_or(""));

        let collapsed = collapse_whitespace(&out);
        (collapsed, filtered)
    }
}

/// Collapse runs of whitespace and trim, as the original output sanitizer
/// did.
fn collapse_whitespace(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    let mut last_space = false;
    for ch in text.chars() {
        if ch.is_whitespace() {
            if !last_space && !out.is_empty() {
                out.push(' ');
            }
            last_space = true;
        } else {
            out.push(ch);
            last_space = false;
        }
    }
    out.trim_end().to_string()
}

fn phrase_rule(
    name: &str,
    category: Category,
    action: RuleAction,
    phrases: &[&str],
) -> RuleSpec {
    RuleSpec {
        name: name.into(),
        category,
        action,
        matcher: Matcher::Phrases {
            phrases: phrases.iter().map(|p| (*p).to_string()).collect(),
        },
    }
}

fn builtin_rules() -> Vec<RuleSpec> {
    vec![
        phrase_rule(
            "insult-contempt",
            Category::Insult,
            RuleAction::Reject,
            &[
                "pathetic", "loser", "idiot", "moron", "disgusting", "worthless",
                "out of your league",
            ],
        ),
        phrase_rule(
            "explicit-sexual",
            Category::SexualContent,
            RuleAction::Reject,
            &["send nudes", "dtf", "netflix and chill", "one night stand"],
        ),
        phrase_rule(
            "violence-glorification",
            Category::ViolenceGlorification,
            RuleAction::Reject,
            &[
                "deserves a beating",
                "deserves to die",
                "beat them up",
                "knock them out",
            ],
        ),
        phrase_rule(
            "criminal-glorification",
            Category::CriminalGlorification,
            RuleAction::Reject,
            &["get away with it", "shoplifting is easy", "fake id"],
        ),
        phrase_rule(
            "targeted-bias",
            Category::TargetedBias,
            RuleAction::Reject,
            &["people like them", "those people", "their kind"],
        ),
        phrase_rule(
            "cliche-blacklist",
            Category::ClichePhrase,
            RuleAction::SilentFilter,
            &[
                "challenge accepted",
                "sorry not sorry",
                "roast me",
                "literally dying",
                "vibe check",
            ],
        ),
        RuleSpec {
            name: "emoji-spam".into(),
            category: Category::FormattingTrap,
            action: RuleAction::SilentFilter,
            matcher: Matcher::Pattern {
                pattern: r"[\x{1F600}-\x{1F64F}]{4,}".into(),
            },
        },
        RuleSpec {
            name: "ascii-art".into(),
            category: Category::FormattingTrap,
            action: RuleAction::SilentFilter,
            matcher: Matcher::Pattern {
                pattern: r"[|_\-/\\]{5,}".into(),
            },
        },
        RuleSpec {
            name: "caps-lock-run".into(),
            category: Category::FormattingTrap,
            action: RuleAction::SilentFilter,
            matcher: Matcher::Pattern {
                pattern: r"\b[A-Z]{2,}(?:\s+[A-Z]{2,}){2,}\b".into(),
            },
        },
    ]
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn clean_text_produces_no_hits() {
        let catalog = GuardrailCatalog::default();
        assert!(catalog.evaluate("Your dog looks like great hiking company!").is_empty());
    }

    #[test]
    fn reject_rule_flags_whole_candidate() {
        let catalog = GuardrailCatalog::default();
        let hits = catalog.evaluate("honestly your taste is pathetic");
        assert_eq!(hits.len(), 1);
        assert_eq!(hits[0].category, Category::Insult);
        assert_eq!(hits[0].action, RuleAction::Reject);
    }

    #[test]
    fn all_violations_collected_not_short_circuited() {
        let catalog = GuardrailCatalog::default();
        let hits = catalog.evaluate("You loser, netflix and chill? sorry not sorry");
        let categories: Vec<_> = hits.iter().map(|h| h.category).collect();
        assert!(categories.contains(&Category::Insult));
        assert!(categories.contains(&Category::SexualContent));
        assert!(categories.contains(&Category::ClichePhrase));
    }

    #[test]
    fn silent_filter_strips_span_by_omission() {
        let catalog = GuardrailCatalog::default();
        let text = "That movie was great, sorry not sorry, we should go sometime.";
        let hits = catalog.evaluate(text);
        let (rewritten, applied) = catalog.apply_silent_filters(text, &hits);
        assert_eq!(applied.len(), 1);
        assert!(!rewritten.contains("sorry not sorry"));
        assert!(rewritten.contains("That movie was great"));
        assert!(rewritten.contains("we should go sometime"));
    }

    #[test]
    fn caps_lock_run_is_silently_filtered() {
        let catalog = GuardrailCatalog::default();
        let hits = catalog.evaluate("hey THIS IS VERY LOUD INDEED right");
        assert_eq!(hits.len(), 1);
        assert_eq!(hits[0].category, Category::FormattingTrap);
        assert_eq!(hits[0].action, RuleAction::SilentFilter);
    }

    #[test]
    fn overlapping_silent_spans_are_fully_stripped() {
        let catalog = GuardrailCatalog::default();
        let text = "one two three four";
        let hit = |rule: &str, span: std::ops::Range<usize>, matched: &str| GuardrailHit {
            rule: rule.into(),
            category: Category::ClichePhrase,
            action: RuleAction::SilentFilter,
            span,
            matched: matched.into(),
        };
        let hits = vec![
            hit("a", 4..13, "two three"),
            hit("b", 8..18, "three four"),
        ];
        let (rewritten, applied) = catalog.apply_silent_filters(text, &hits);
        assert_eq!(applied.len(), 2);
        assert_eq!(rewritten, "one");
    }

    #[test]
    fn rewrite_leaves_reject_hits_alone() {
        let catalog = GuardrailCatalog::default();
        let text = "you absolute loser";
        let hits = catalog.evaluate(text);
        let (rewritten, applied) = catalog.apply_silent_filters(text, &hits);
        assert!(applied.is_empty());
        assert_eq!(rewritten, text);
    }

    #[test]
    fn catalog_loads_from_json_file() {
        let json = r#"{
            "version": "test-1",
            "rules": [
                {
                    "name": "no-pineapple",
                    "category": "cliche_phrase",
                    "action": "silent_filter",
                    "matcher": { "kind": "phrases", "phrases": ["pineapple on pizza"] }
                }
            ]
        }"#;
        let mut file = tempfile::NamedTempFile::new().unwrap();
        file.write_all(json.as_bytes()).unwrap();

        let catalog = GuardrailCatalog::from_path(file.path()).unwrap();
        assert_eq!(catalog.version, "test-1");
        assert_eq!(catalog.rule_count(), 1);
        assert_eq!(catalog.evaluate("hot take: pineapple on pizza rules").len(), 1);
    }

    #[test]
    fn bad_pattern_is_a_typed_error() {
        let json = r#"{
            "version": "test-2",
            "rules": [
                {
                    "name": "broken",
                    "category": "formatting_trap",
                    "action": "reject",
                    "matcher": { "kind": "pattern", "pattern": "([unclosed" }
                }
            ]
        }"#;
        let err = GuardrailCatalog::from_json_str(json).unwrap_err();
        assert!(matches!(err, CatalogError::BadMatcher { .. }));
    }
}

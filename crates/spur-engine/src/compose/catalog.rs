//! The closed variant catalog: four tones, each with a descriptor and
//! stylistic constraints.
//!
//! The enumeration is deliberately closed rather than a plugin list;
//! tone semantics (length, register) are load-bearing in validation, so
//! extending the set means updating the per-tone rules, not just adding
//! a label.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// One of the four tonal variants a request produces.
///
/// Ordering doubles as priority: `Main` is highest. When two candidates
/// collide as near-duplicates, the later-ordered (lower-priority) one is
/// rejected and regenerated.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SpurVariant {
    Main,
    Warm,
    Cool,
    Banter,
}

impl SpurVariant {
    /// All four variants in priority order.
    pub const ALL: [SpurVariant; 4] = [
        SpurVariant::Main,
        SpurVariant::Warm,
        SpurVariant::Cool,
        SpurVariant::Banter,
    ];

    /// The wire label for this variant (`main`, `warm`, `cool`, `banter`).
    pub fn label(self) -> &'static str {
        match self {
            SpurVariant::Main => "main",
            SpurVariant::Warm => "warm",
            SpurVariant::Cool => "cool",
            SpurVariant::Banter => "banter",
        }
    }

    /// Parse a label as it may appear in a collaborator response.
    ///
    /// Accepts the bare label, the legacy `*_spur` key form, and any
    /// casing (`"Banter"`, `"banter_spur"`, `"BANTER"`).
    pub fn from_label(s: &str) -> Option<Self> {
        let lower = s.trim().to_lowercase();
        let stem = lower.strip_suffix("_spur").unwrap_or(&lower);
        match stem {
            "main" => Some(SpurVariant::Main),
            "warm" => Some(SpurVariant::Warm),
            "cool" => Some(SpurVariant::Cool),
            "banter" => Some(SpurVariant::Banter),
            _ => None,
        }
    }
}

impl std::fmt::Display for SpurVariant {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.label())
    }
}

/// Stylistic constraints for one tone.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToneSpec {
    /// Human-readable tone descriptor passed verbatim to the collaborator.
    pub descriptor: String,
    /// Maximum sentences the validator accepts for this tone.
    pub max_sentences: usize,
    /// Maximum characters the validator accepts for this tone.
    pub max_chars: usize,
}

/// The variant catalog: a closed map of variant → tone spec.
///
/// Read-only after process start; shared freely across requests.
#[derive(Debug, Clone)]
pub struct VariantCatalog {
    specs: BTreeMap<SpurVariant, ToneSpec>,
}

impl Default for VariantCatalog {
    fn default() -> Self {
        let mut specs = BTreeMap::new();
        specs.insert(
            SpurVariant::Main,
            ToneSpec {
                descriptor: "Friendly (emotionally open, upbeat, optimistic, receptive, engaging)"
                    .into(),
                max_sentences: 5,
                max_chars: 300,
            },
        );
        specs.insert(
            SpurVariant::Warm,
            ToneSpec {
                descriptor: "Warm (lighthearted, kind, empathetic, sincere, thoughtful)".into(),
                max_sentences: 5,
                max_chars: 300,
            },
        );
        specs.insert(
            SpurVariant::Cool,
            ToneSpec {
                descriptor: "Cool (carefree, casual, cool and calm, dry, occasionally sarcastic)"
                    .into(),
                max_sentences: 5,
                max_chars: 300,
            },
        );
        specs.insert(
            SpurVariant::Banter,
            ToneSpec {
                descriptor: "Banter (humorous, joking, good-natured teasing, occasionally flirty)"
                    .into(),
                max_sentences: 5,
                max_chars: 300,
            },
        );
        Self { specs }
    }
}

impl VariantCatalog {
    /// The tone spec for a variant. Total: the catalog always carries
    /// all four entries.
    pub fn spec(&self, variant: SpurVariant) -> &ToneSpec {
        &self.specs[&variant]
    }

    /// Replace the spec for one variant (builder pattern).
    pub fn with_spec(mut self, variant: SpurVariant, spec: ToneSpec) -> Self {
        self.specs.insert(variant, spec);
        self
    }

    /// Iterate variant/spec pairs in priority order.
    pub fn iter(&self) -> impl Iterator<Item = (SpurVariant, &ToneSpec)> {
        SpurVariant::ALL.iter().map(|v| (*v, &self.specs[v]))
    }
}

//! Append-only trait ledger with multi-source corroboration.
//!
//! Traits are observations ("adventurous", 0.8) about Party B gathered
//! from profile text, conversation, photo analysis, or OCR. Confidence is
//! never edited in place; a newer observation supersedes an older one by
//! timestamp. Low-confidence traits only reach the prompt when at least
//! two independent signal sources agree.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};

/// Confidence below which a trait needs corroboration to be usable.
pub const DEFAULT_CONFIDENCE_THRESHOLD: f64 = 0.5;

/// Confidence bands used when classifying inferred hints (tone,
/// situation). Only `high` inferences are trusted without corroboration.
pub fn classify_confidence(score: f64) -> &'static str {
    if score >= 0.75 {
        "high"
    } else if score >= 0.5 {
        "medium"
    } else if score >= 0.3 {
        "low"
    } else {
        "very_low"
    }
}

/// Where a trait observation came from. Corroboration requires two
/// *distinct* sources; two photo inferences don't corroborate each other.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SignalSource {
    ProfileText,
    ConversationHistory,
    PhotoAnalysis,
    Ocr,
}

/// One observation of a trait, from one source, at one moment.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TraitObservation {
    pub name: String,
    /// Must lie in [0, 1]; the composer rejects anything outside.
    pub confidence: f64,
    pub source: SignalSource,
    #[serde(default = "Utc::now")]
    pub observed_at: DateTime<Utc>,
}

impl TraitObservation {
    pub fn new(name: impl Into<String>, confidence: f64, source: SignalSource) -> Self {
        Self {
            name: name.into(),
            confidence,
            source,
            observed_at: Utc::now(),
        }
    }
}

/// A trait that passed the corroboration gate, ready for the composer.
#[derive(Debug, Clone, PartialEq)]
pub struct UsableTrait {
    pub name: String,
    pub confidence: f64,
    /// True when usability came from multiple sources rather than raw
    /// confidence.
    pub corroborated: bool,
}

/// Append-only collection of trait observations for one conversation.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct TraitLedger {
    entries: Vec<TraitObservation>,
}

impl TraitLedger {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record an observation. Append-only: nothing is ever removed or
    /// edited; supersession happens at read time by timestamp.
    pub fn record(&mut self, observation: TraitObservation) {
        self.entries.push(observation);
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// All raw observations, in insertion order.
    pub fn observations(&self) -> &[TraitObservation] {
        &self.entries
    }

    /// The current confidence for a trait: the newest observation wins.
    pub fn latest(&self, name: &str) -> Option<&TraitObservation> {
        let key = name.to_lowercase();
        self.entries
            .iter()
            .filter(|o| o.name.to_lowercase() == key)
            .max_by_key(|o| o.observed_at)
    }

    /// The distinct signal sources that have reported a trait.
    pub fn sources_for(&self, name: &str) -> BTreeSet<SignalSource> {
        let key = name.to_lowercase();
        self.entries
            .iter()
            .filter(|o| o.name.to_lowercase() == key)
            .map(|o| o.source)
            .collect()
    }

    /// Traits usable for prompt composition, in deterministic name order.
    ///
    /// A trait is usable when its current confidence meets `threshold`, or
    /// when at least two independent sources have reported it.
    pub fn usable(&self, threshold: f64) -> Vec<UsableTrait> {
        let mut names: BTreeMap<String, &TraitObservation> = BTreeMap::new();
        for obs in &self.entries {
            let key = obs.name.to_lowercase();
            match names.get(&key) {
                Some(existing) if existing.observed_at >= obs.observed_at => {}
                _ => {
                    names.insert(key, obs);
                }
            }
        }

        names
            .into_iter()
            .filter_map(|(key, current)| {
                let corroborated = self.sources_for(&key).len() >= 2;
                if current.confidence >= threshold || corroborated {
                    Some(UsableTrait {
                        name: current.name.clone(),
                        confidence: current.confidence,
                        corroborated,
                    })
                } else {
                    None
                }
            })
            .collect()
    }
}

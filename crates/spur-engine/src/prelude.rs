//! Convenience re-exports for typical engine callers.

pub use crate::compose::{SpurVariant, ToneSpec, VariantCatalog};
pub use crate::context::{
    AgeBand, ConversationTurn, OverrideRule, OverrideSet, PartyProfile, SignalSource, Situation,
    Speaker, TraitLedger, TraitObservation,
};
pub use crate::engine::{SlotReport, SpurEngine, SpurRequest, SpurResponse};
pub use crate::error::{EngineError, EngineWarning, RuleViolation};
pub use crate::generate::{OpenRouterGenerator, SpurGenerator};
pub use crate::guardrail::GuardrailCatalog;
pub use crate::policy::SelectionPolicy;
pub use crate::validate::{ValidationStatus, Validator};
pub use crate::{DEFAULT_MODEL, OpenRouterClient};

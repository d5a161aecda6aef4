//! Context model: conversation history, party profiles, trait ledger, and
//! topic-suppression overrides, normalized into one [`Context`] per request.

pub mod model;
pub mod overrides;
pub mod traits;

pub use model::{
    AgeBand, Context, ContextBuilder, ConversationTurn, PartyProfile, Situation, Speaker,
};
pub use overrides::{OverrideRule, OverrideSet, detect_refusals};
pub use traits::{
    DEFAULT_CONFIDENCE_THRESHOLD, SignalSource, TraitLedger, TraitObservation, UsableTrait,
    classify_confidence,
};

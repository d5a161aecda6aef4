//! The variant generator adapter: the engine's one seam to the external
//! generation collaborator.
//!
//! The collaborator is opaque. The engine hands it a composed
//! [`GenerationRequest`](crate::compose::GenerationRequest) and gets raw
//! text back; everything trustworthy happens on this side of the seam.
//! All requested variants travel in a single call so the collaborator
//! can minimize repetition across them itself.

pub mod openrouter;
pub mod parse;

pub use openrouter::OpenRouterGenerator;
pub use parse::parse_variants;

use crate::compose::GenerationRequest;
use crate::error::EngineError;
use std::future::Future;
use std::pin::Pin;

/// Boxed future returned by [`SpurGenerator::generate`].
pub type GenerateFuture<'a> = Pin<Box<dyn Future<Output = Result<String, EngineError>> + Send + 'a>>;

/// An external generation collaborator.
///
/// `attempt` is 0 for the initial call and counts up for retries, so
/// implementations can trade temperature for reliability on later
/// attempts. Implementations return the raw response text; parsing and
/// validation stay in the engine.
pub trait SpurGenerator: Send + Sync {
    fn generate(&self, request: &GenerationRequest, attempt: u32) -> GenerateFuture<'_>;
}

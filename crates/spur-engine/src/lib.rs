//! Spur orchestration and validation engine.
//!
//! `spur-engine` assembles conversational context into a generation
//! request, asks an external generation collaborator for four tonal
//! variants of an outbound dating-app message ("spurs"), and enforces a
//! rule set over the candidates before any of them reach the user. The
//! core abstraction is the [`SpurEngine`](engine::SpurEngine): one call
//! to [`run()`](engine::SpurEngine::run) covers composition, generation,
//! validation, per-slot retries, and degraded-output handling.
//!
//! # Getting started
//!
//! ```ignore
//! use spur_engine::prelude::*;
//! use std::sync::Arc;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), EngineError> {
//!     let api_key = std::env::var("OPENROUTER_KEY").unwrap();
//!     let client = OpenRouterClient::new(api_key)?;
//!     let generator = Arc::new(OpenRouterGenerator::new(client, DEFAULT_MODEL));
//!
//!     let request = SpurRequest {
//!         history: vec![
//!             ConversationTurn::new(Speaker::PartyB, "I just got back from Peru!"),
//!         ],
//!         ..SpurRequest::default()
//!     };
//!
//!     let response = SpurEngine::new(generator).run(request).await?;
//!     for (variant, text) in &response.variants {
//!         println!("{variant}: {text}");
//!     }
//!     Ok(())
//! }
//! ```
//!
//! # Modules
//!
//! | Module | Description |
//! |--------|-------------|
//! | [`context`] | Conversation history, profiles, trait ledger, override rules |
//! | [`guardrail`] | Versioned content rules: silent filters and rejections |
//! | [`compose`] | Variant catalog and deterministic prompt composition |
//! | [`generate`] | [`SpurGenerator`](generate::SpurGenerator) trait, OpenRouter adapter, response parsing |
//! | [`validate`] | Per-candidate state machine and set-level checks |
//! | [`policy`] | Retry bounds, slot concurrency, deadlines |
//! | [`engine`] | The orchestrating [`SpurEngine`](engine::SpurEngine) |
//!
//! # Design principles
//!
//! 1. **All failures are values.** Request-level problems are
//!    [`EngineError`](error::EngineError); per-candidate problems are
//!    [`RuleViolation`](error::RuleViolation); partial results carry an
//!    [`EngineWarning`](error::EngineWarning). Nothing here panics on a
//!    bad generation.
//!
//! 2. **Silent at the content level, loud at the batch level.** A
//!    silent-filter rewrite never surfaces to the caller; a response
//!    with fewer than four variants always does.
//!
//! 3. **Determinism where it's cheap.** Composing the same context twice
//!    yields byte-identical prompts, so prompt regressions are string
//!    diffs, not vibes.
//!
//! 4. **The collaborator is opaque.** One trait method produces raw
//!    text; everything the engine trusts comes from its own validation.

pub mod compose;
pub mod context;
pub mod engine;
pub mod error;
pub mod generate;
pub mod guardrail;
pub mod policy;
pub mod prelude;
pub mod validate;

use error::EngineError;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use std::time::{Duration, Instant};
use tracing::{debug, trace};

// ── Constants ──────────────────────────────────────────────────────

pub const OPENROUTER_URL: &str = "https://openrouter.ai/api/v1/chat/completions";

/// Default model for generation calls.
pub const DEFAULT_MODEL: &str = "openai/gpt-4o";

/// Completion budget for one four-variant response.
pub const MAX_COMPLETION_TOKENS: u32 = 600;

/// Sampling temperature for the first attempt. Retries drop to
/// [`TEMPERATURE_RETRY`] to trade variety for reliability.
pub const TEMPERATURE_INITIAL: f32 = 0.9;
pub const TEMPERATURE_RETRY: f32 = 0.65;

// ── Schema generation ──────────────────────────────────────────────

/// Generate a JSON Schema `serde_json::Value` from a type implementing
/// `schemars::JsonSchema`. Bridges strong Rust types to the schema the
/// response parser validates collaborator output against.
pub fn json_schema_for<T: JsonSchema>() -> serde_json::Value {
    let schema = schemars::schema_for!(T);
    serde_json::to_value(schema)
        .unwrap_or_else(|_| serde_json::json!({"type": "object", "properties": {}}))
}

// ── Wire types ─────────────────────────────────────────────────────

/// Role of a message in the chat request.
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum MessageRole {
    System,
    User,
    Assistant,
}

/// A chat message.
#[derive(Serialize, Deserialize, Clone, Debug)]
pub struct Message {
    pub role: MessageRole,
    pub content: String,
}

impl Message {
    pub fn system(content: impl Into<String>) -> Self {
        Self {
            role: MessageRole::System,
            content: content.into(),
        }
    }

    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: MessageRole::User,
            content: content.into(),
        }
    }
}

/// JSON output mode request.
#[derive(Serialize, Debug)]
pub struct ResponseFormat {
    #[serde(rename = "type")]
    pub fmt_type: &'static str,
}

impl ResponseFormat {
    pub fn json_object() -> Self {
        Self {
            fmt_type: "json_object",
        }
    }
}

/// Chat completion request body. Only the fields this engine uses.
#[derive(Serialize, Debug)]
pub struct ChatRequest {
    pub model: String,
    pub messages: Vec<Message>,
    pub max_tokens: u32,
    pub temperature: f32,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub seed: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub response_format: Option<ResponseFormat>,
}

// Raw deserialization targets.
#[derive(Deserialize, Debug)]
struct RawChatResponse {
    choices: Option<Vec<RawChoice>>,
    error: Option<ApiErrorResponse>,
    #[serde(default)]
    usage: Option<UsageInfo>,
}

#[derive(Deserialize, Debug)]
struct RawChoice {
    message: RawResponseMessage,
    finish_reason: Option<String>,
}

#[derive(Deserialize, Debug)]
struct RawResponseMessage {
    content: Option<String>,
}

#[derive(Deserialize, Debug)]
struct ApiErrorResponse {
    message: String,
}

/// Clean return type from [`OpenRouterClient::chat`].
#[derive(Debug)]
pub struct ChatCompletion {
    pub content: Option<String>,
    pub usage: Option<UsageInfo>,
    pub finish_reason: Option<String>,
}

/// Token usage statistics.
#[derive(Deserialize, Debug, Clone)]
pub struct UsageInfo {
    pub prompt_tokens: Option<u32>,
    pub completion_tokens: Option<u32>,
    pub total_tokens: Option<u32>,
}

// ── Client ─────────────────────────────────────────────────────────

/// Async HTTP client for the generation collaborator's chat endpoint.
pub struct OpenRouterClient {
    client: reqwest::Client,
    api_key: String,
}

impl OpenRouterClient {
    /// Create a client with the given API key.
    pub fn new(api_key: impl Into<String>) -> Result<Self, EngineError> {
        let client = reqwest::Client::builder()
            .user_agent("spur-engine/0.2")
            .timeout(Duration::from_secs(120))
            .build()
            .map_err(|e| {
                EngineError::GenerationUnavailable(format!("failed to build HTTP client: {e}"))
            })?;
        Ok(Self {
            client,
            api_key: api_key.into(),
        })
    }

    /// Send a chat completion request.
    ///
    /// Transport failures, HTTP errors, and collaborator-side policy
    /// refusals map to [`EngineError::GenerationUnavailable`]; a 200
    /// response that cannot be parsed maps to
    /// [`EngineError::GenerationMalformed`].
    pub async fn chat(&self, body: &ChatRequest) -> Result<ChatCompletion, EngineError> {
        debug!(
            "generation request: model={}, messages={}, max_tokens={}, temp={}",
            body.model,
            body.messages.len(),
            body.max_tokens,
            body.temperature,
        );

        let start = Instant::now();

        let resp = self
            .client
            .post(OPENROUTER_URL)
            .header("Authorization", format!("Bearer {}", self.api_key))
            .json(body)
            .send()
            .await
            .map_err(|e| EngineError::GenerationUnavailable(format!("request failed: {e}")))?;

        let status = resp.status();
        let text = resp.text().await.map_err(|e| {
            EngineError::GenerationUnavailable(format!("failed to read response: {e}"))
        })?;

        debug!(
            "generation response: HTTP {} in {:.1}s ({} bytes)",
            status,
            start.elapsed().as_secs_f64(),
            text.len()
        );
        trace!("raw generation response: {text}");

        if !status.is_success() {
            return Err(EngineError::GenerationUnavailable(format!(
                "HTTP {status}: {text}"
            )));
        }

        let parsed: RawChatResponse = serde_json::from_str(&text)
            .map_err(|e| EngineError::GenerationMalformed(format!("unparseable body: {e}")))?;

        if let Some(err) = parsed.error {
            // The collaborator may refuse on its own policy grounds;
            // treated as unavailability, retried like any outage.
            return Err(EngineError::GenerationUnavailable(err.message));
        }

        if let Some(ref usage) = parsed.usage {
            debug!(
                "token usage: prompt={}, completion={}, total={}",
                usage.prompt_tokens.unwrap_or(0),
                usage.completion_tokens.unwrap_or(0),
                usage.total_tokens.unwrap_or(0),
            );
        }

        let choice = parsed.choices.and_then(|c| c.into_iter().next());
        match choice {
            Some(c) => Ok(ChatCompletion {
                content: c.message.content,
                usage: parsed.usage,
                finish_reason: c.finish_reason,
            }),
            None => Ok(ChatCompletion {
                content: None,
                usage: parsed.usage,
                finish_reason: None,
            }),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn message_constructors() {
        let sys = Message::system("rules");
        assert_eq!(sys.role, MessageRole::System);
        assert_eq!(sys.content, "rules");

        let user = Message::user("context");
        assert_eq!(user.role, MessageRole::User);
    }

    #[test]
    fn chat_request_skips_absent_optionals() {
        let req = ChatRequest {
            model: "test-model".into(),
            messages: vec![Message::user("hi")],
            max_tokens: 600,
            temperature: 0.9,
            seed: None,
            response_format: None,
        };
        let json = serde_json::to_value(&req).unwrap();
        assert!(json.get("seed").is_none());
        assert!(json.get("response_format").is_none());
    }

    #[test]
    fn response_format_serializes_type_tag() {
        let req = ChatRequest {
            model: "m".into(),
            messages: vec![],
            max_tokens: 1,
            temperature: 0.0,
            seed: Some(7),
            response_format: Some(ResponseFormat::json_object()),
        };
        let json = serde_json::to_value(&req).unwrap();
        assert_eq!(json["response_format"]["type"], "json_object");
        assert_eq!(json["seed"], 7);
    }
}

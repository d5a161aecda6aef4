//! [`SpurGenerator`] backed by the OpenRouter chat completions API.

use crate::compose::GenerationRequest;
use crate::error::EngineError;
use crate::generate::{GenerateFuture, SpurGenerator};
use crate::{
    ChatRequest, Message, OpenRouterClient, ResponseFormat, MAX_COMPLETION_TOKENS,
    TEMPERATURE_INITIAL, TEMPERATURE_RETRY,
};
use std::time::Duration;
use tracing::debug;

/// Default per-call timeout. The engine layers its own per-call and
/// per-request deadlines on top; this is the transport-level backstop.
pub const DEFAULT_CALL_TIMEOUT: Duration = Duration::from_secs(60);

/// Generation adapter that sends composed requests to OpenRouter.
///
/// The first attempt samples at [`TEMPERATURE_INITIAL`]; retries drop to
/// [`TEMPERATURE_RETRY`] so a regenerated slot converges instead of
/// producing another rejectable candidate.
pub struct OpenRouterGenerator {
    client: OpenRouterClient,
    model: String,
    timeout: Duration,
}

impl OpenRouterGenerator {
    pub fn new(client: OpenRouterClient, model: impl Into<String>) -> Self {
        Self {
            client,
            model: model.into(),
            timeout: DEFAULT_CALL_TIMEOUT,
        }
    }

    /// Override the transport-level timeout for a single chat call.
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    fn temperature_for(attempt: u32) -> f32 {
        if attempt == 0 {
            TEMPERATURE_INITIAL
        } else {
            TEMPERATURE_RETRY
        }
    }
}

impl SpurGenerator for OpenRouterGenerator {
    fn generate(&self, request: &GenerationRequest, attempt: u32) -> GenerateFuture<'_> {
        let body = ChatRequest {
            model: self.model.clone(),
            messages: vec![
                Message::system(request.system.clone()),
                Message::user(request.user.clone()),
            ],
            max_tokens: MAX_COMPLETION_TOKENS,
            temperature: Self::temperature_for(attempt),
            seed: None,
            response_format: Some(ResponseFormat::json_object()),
        };
        let timeout = self.timeout;

        Box::pin(async move {
            debug!(
                "generation attempt {attempt}: model={}, temp={}",
                body.model, body.temperature,
            );

            let completion = tokio::time::timeout(timeout, self.client.chat(&body))
                .await
                .map_err(|_| {
                    EngineError::GenerationUnavailable(format!(
                        "generation call exceeded {}s",
                        timeout.as_secs()
                    ))
                })??;

            if let Some(reason) = completion.finish_reason.as_deref() {
                if reason != "stop" {
                    debug!("generation finished with reason {reason:?}");
                }
            }

            match completion.content {
                Some(text) if !text.trim().is_empty() => Ok(text),
                _ => Err(EngineError::GenerationUnavailable(
                    "collaborator returned an empty completion".into(),
                )),
            }
        })
    }
}

//! Content Generation
//!
//! Wraps a language-model backend behind one interface. Prompt
//! construction is deterministic; the backend is picked once from
//! configuration, and every failure mode (provider error, empty
//! completion, exceeded time cap) collapses into `None` - a normal
//! "nothing to say this cycle" outcome, not an exception.

pub mod anthropic;
pub mod gemini;
pub mod openai;
pub mod prompt;

use std::sync::Arc;
use std::time::Duration;

use anyhow::Result;
use tracing::{debug, warn};

use crate::types::{
    BackendConfig, BackendProvider, GenerationBackend, GenerationContext, GenerationParams,
};

/// Build the backend adapter an agent's configuration names. Selection
/// happens here, once; callers never re-dispatch per call.
pub fn backend_from_config(
    config: &BackendConfig,
    timeout: Duration,
) -> Result<Arc<dyn GenerationBackend>> {
    let backend: Arc<dyn GenerationBackend> = match config.provider {
        BackendProvider::Openai => Arc::new(openai::OpenAiBackend::new(
            &config.api_url,
            &config.api_key,
            &config.model,
            timeout,
        )?),
        BackendProvider::Anthropic => Arc::new(anthropic::AnthropicBackend::new(
            &config.api_url,
            &config.api_key,
            &config.model,
            timeout,
        )?),
        BackendProvider::Gemini => Arc::new(gemini::GeminiBackend::new(
            &config.api_url,
            &config.api_key,
            &config.model,
            timeout,
        )?),
    };
    Ok(backend)
}

/// Per-agent content generator: persona plus backend plus sampling
/// parameters.
pub struct ContentGenerator {
    backend: Arc<dyn GenerationBackend>,
    persona: String,
    params: GenerationParams,
    timeout: Duration,
}

impl ContentGenerator {
    pub fn new(
        backend: Arc<dyn GenerationBackend>,
        persona: String,
        params: GenerationParams,
        timeout: Duration,
    ) -> Self {
        Self {
            backend,
            persona,
            params,
            timeout,
        }
    }

    /// The backend's model identifier.
    pub fn model(&self) -> &str {
        self.backend.model()
    }

    /// Produce text for `context`, or `None` when there is nothing usable.
    ///
    /// The time cap is enforced here, independently of the transport's own
    /// timeout: generation is the slowest step and must never hold a cycle
    /// open indefinitely.
    pub async fn generate(&self, context: &GenerationContext) -> Option<String> {
        let prompt = prompt::build(&self.persona, context);
        let call = self.backend.complete(&prompt, &self.params);

        match tokio::time::timeout(self.timeout, call).await {
            Err(_) => {
                warn!(
                    model = self.backend.model(),
                    mode = context.mode(),
                    "generation exceeded its time cap"
                );
                None
            }
            Ok(Err(err)) => {
                warn!(
                    model = self.backend.model(),
                    mode = context.mode(),
                    error = %err,
                    "generation failed"
                );
                None
            }
            Ok(Ok(None)) => {
                debug!(
                    model = self.backend.model(),
                    mode = context.mode(),
                    "backend returned no usable content"
                );
                None
            }
            Ok(Ok(Some(text))) => {
                let trimmed = text.trim();
                if trimmed.is_empty() {
                    None
                } else {
                    Some(trimmed.to_string())
                }
            }
        }
    }
}

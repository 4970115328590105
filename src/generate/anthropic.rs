//! Anthropic Backend
//!
//! Messages-API adapter. The persona travels in the top-level `system`
//! field and the completion lands in `content[0].text`.

use std::time::Duration;

use anyhow::Result;
use async_trait::async_trait;
use reqwest::Method;
use serde_json::json;

use crate::transport::Transport;
use crate::types::{GenerationBackend, GenerationParams, Prompt};

const ANTHROPIC_VERSION: &str = "2023-06-01";

pub struct AnthropicBackend {
    api_url: String,
    api_key: String,
    model: String,
    transport: Transport,
}

impl AnthropicBackend {
    pub fn new(api_url: &str, api_key: &str, model: &str, timeout: Duration) -> Result<Self> {
        Ok(Self {
            api_url: api_url.trim_end_matches('/').to_string(),
            api_key: api_key.to_string(),
            model: model.to_string(),
            transport: Transport::new(timeout)?,
        })
    }
}

#[async_trait]
impl GenerationBackend for AnthropicBackend {
    async fn complete(
        &self,
        prompt: &Prompt,
        params: &GenerationParams,
    ) -> Result<Option<String>> {
        let body = json!({
            "model": self.model,
            "max_tokens": params.max_tokens,
            "temperature": params.temperature,
            "system": prompt.system,
            "messages": [
                {"role": "user", "content": prompt.user}
            ],
        });

        let url = format!("{}/v1/messages", self.api_url);
        let resp = self
            .transport
            .send(
                Method::POST,
                &url,
                &[
                    ("x-api-key", self.api_key.as_str()),
                    ("anthropic-version", ANTHROPIC_VERSION),
                ],
                Some(&body),
            )
            .await?;

        if !(200..300).contains(&resp.status) {
            anyhow::bail!("generation error: {}: {}", resp.status, resp.body);
        }

        Ok(resp.body["content"][0]["text"]
            .as_str()
            .map(|s| s.to_string())
            .filter(|s| !s.trim().is_empty()))
    }

    fn model(&self) -> &str {
        &self.model
    }
}

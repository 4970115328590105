//! OpenAI-Compatible Backend
//!
//! Chat-completions adapter for the OpenAI-compatible family (OpenAI,
//! NVIDIA integrate, Moonshot, and friends). The completion lands in
//! `choices[0].message.content`.

use std::time::Duration;

use anyhow::Result;
use async_trait::async_trait;
use reqwest::Method;
use serde_json::json;

use crate::transport::Transport;
use crate::types::{GenerationBackend, GenerationParams, Prompt};

pub struct OpenAiBackend {
    api_url: String,
    api_key: String,
    model: String,
    transport: Transport,
}

impl OpenAiBackend {
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
impl GenerationBackend for OpenAiBackend {
    async fn complete(
        &self,
        prompt: &Prompt,
        params: &GenerationParams,
    ) -> Result<Option<String>> {
        // Newer models (o-series, gpt-5.x, gpt-4.1) use max_completion_tokens
        let uses_completion_tokens = regex::Regex::new(r"^(o[1-9]|gpt-5|gpt-4\.1)")
            .map(|re| re.is_match(&self.model))
            .unwrap_or(false);

        let mut body = json!({
            "model": self.model,
            "messages": [
                {"role": "system", "content": prompt.system},
                {"role": "user", "content": prompt.user},
            ],
            "temperature": params.temperature,
            "stream": false,
        });
        if uses_completion_tokens {
            body["max_completion_tokens"] = json!(params.max_tokens);
        } else {
            body["max_tokens"] = json!(params.max_tokens);
        }

        let url = format!("{}/v1/chat/completions", self.api_url);
        let auth = format!("Bearer {}", self.api_key);
        let resp = self
            .transport
            .send(Method::POST, &url, &[("Authorization", auth.as_str())], Some(&body))
            .await?;

        if !(200..300).contains(&resp.status) {
            anyhow::bail!("generation error: {}: {}", resp.status, resp.body);
        }

        Ok(resp.body["choices"][0]["message"]["content"]
            .as_str()
            .map(|s| s.to_string())
            .filter(|s| !s.trim().is_empty()))
    }

    fn model(&self) -> &str {
        &self.model
    }
}

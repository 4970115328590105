//! Gemini Backend
//!
//! generateContent adapter. The persona goes into `systemInstruction`,
//! the key rides the query string, and the completion lands in
//! `candidates[0].content.parts[0].text`.

use std::time::Duration;

use anyhow::Result;
use async_trait::async_trait;
use reqwest::Method;
use serde_json::json;

use crate::transport::Transport;
use crate::types::{GenerationBackend, GenerationParams, Prompt};

pub struct GeminiBackend {
    api_url: String,
    api_key: String,
    model: String,
    transport: Transport,
}

impl GeminiBackend {
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
impl GenerationBackend for GeminiBackend {
    async fn complete(
        &self,
        prompt: &Prompt,
        params: &GenerationParams,
    ) -> Result<Option<String>> {
        let body = json!({
            "systemInstruction": {
                "parts": [{"text": prompt.system}]
            },
            "contents": [
                {"parts": [{"text": prompt.user}]}
            ],
            "generationConfig": {
                "temperature": params.temperature,
                "maxOutputTokens": params.max_tokens,
            },
        });

        let url = format!(
            "{}/v1beta/models/{}:generateContent?key={}",
            self.api_url,
            self.model,
            urlencoding::encode(&self.api_key),
        );
        let resp = self
            .transport
            .send(Method::POST, &url, &[], Some(&body))
            .await?;

        if !(200..300).contains(&resp.status) {
            anyhow::bail!("generation error: {}: {}", resp.status, resp.body);
        }

        Ok(resp.body["candidates"][0]["content"]["parts"][0]["text"]
            .as_str()
            .map(|s| s.to_string())
            .filter(|s| !s.trim().is_empty()))
    }

    fn model(&self) -> &str {
        &self.model
    }
}

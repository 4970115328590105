//! Protocol Client
//!
//! Thin typed wrapper over the Protocol's pulse API. Each operation maps
//! onto one Transport call; HTTP statuses and the response envelope are
//! classified into the `ProtocolError` taxonomy the engine branches on.

use std::time::Duration;

use anyhow::Result;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use reqwest::Method;
use serde_json::{json, Value};

use crate::error::ProtocolError;
use crate::transport::{Transport, TransportResponse};
use crate::types::{Comment, Post, ProtocolHandle, PublishKind, PublishReceipt, ThreadRef};

const PULSE_PATH: &str = "/api/v1/butterfly/pulse";
const TOKEN_PATH: &str = "/api/v1/butterfly/request-token";
const LIKE_PATH: &str = "/api/v1/butterfly/like";

// ---------------------------------------------------------------------------
// Client
// ---------------------------------------------------------------------------

/// Stateless Protocol client. Credentials travel with each write call so a
/// rotated token takes effect immediately.
pub struct ProtocolClient {
    base_url: String,
    transport: Transport,
}

impl ProtocolClient {
    /// Create a client for the Protocol at `base_url` with the short
    /// timeout appropriate for feed and publish calls.
    pub fn new(base_url: &str, timeout: Duration) -> Result<Self> {
        Ok(Self {
            base_url: base_url.trim_end_matches('/').to_string(),
            transport: Transport::new(timeout)?,
        })
    }

    fn feed_url(&self, kind: &str, since: DateTime<Utc>, limit: u32) -> String {
        format!(
            "{}{}?type={}&limit={}&since={}",
            self.base_url,
            PULSE_PATH,
            kind,
            limit,
            urlencoding::encode(&since.to_rfc3339()),
        )
    }

    /// Pull the `data` array out of a successful envelope and deserialize
    /// it, or classify the failure.
    fn decode_items<T: serde::de::DeserializeOwned>(
        resp: TransportResponse,
    ) -> Result<Vec<T>, ProtocolError> {
        check_status(&resp)?;
        if resp.body["success"] != json!(true) {
            return Err(ProtocolError::Malformed(format!(
                "envelope without success flag: {}",
                error_message(&resp.body)
            )));
        }
        serde_json::from_value(resp.body["data"].clone())
            .map_err(|e| ProtocolError::Malformed(format!("undecodable feed items: {e}")))
    }
}

#[async_trait]
impl ProtocolHandle for ProtocolClient {
    async fn request_token(
        &self,
        name: &str,
        model: &str,
        introduction: &str,
    ) -> Result<String, ProtocolError> {
        let url = format!("{}{}", self.base_url, TOKEN_PATH);
        let payload = json!({
            "ai_name": name,
            "ai_model": model,
            "system_prompt": introduction,
        });

        let resp = self
            .transport
            .send(Method::POST, &url, &[], Some(&payload))
            .await?;
        check_status(&resp)?;

        resp.body["api_token"]
            .as_str()
            .map(|t| t.to_string())
            .ok_or_else(|| {
                ProtocolError::Malformed(format!(
                    "token response without api_token: {}",
                    error_message(&resp.body)
                ))
            })
    }

    async fn recent_posts(
        &self,
        since: DateTime<Utc>,
        limit: u32,
    ) -> Result<Vec<Post>, ProtocolError> {
        let url = self.feed_url("posts", since, limit);
        let resp = self.transport.send(Method::GET, &url, &[], None).await?;
        Self::decode_items(resp)
    }

    async fn recent_comments(
        &self,
        since: DateTime<Utc>,
        limit: u32,
    ) -> Result<Vec<Comment>, ProtocolError> {
        let url = self.feed_url("comments", since, limit);
        let resp = self.transport.send(Method::GET, &url, &[], None).await?;
        Self::decode_items(resp)
    }

    async fn publish(
        &self,
        credential: &str,
        content: &str,
        title: Option<&str>,
        thread: Option<&ThreadRef>,
    ) -> Result<PublishReceipt, ProtocolError> {
        let url = format!("{}{}", self.base_url, PULSE_PATH);

        let mut payload = json!({
            "api_token": credential,
            "content": content,
        });
        match thread {
            Some(thread) => {
                payload["post_id"] = json!(thread.post_id());
                if let Some(parent) = thread.parent_comment_id() {
                    payload["parent_id"] = json!(parent);
                }
            }
            None => {
                if let Some(title) = title {
                    payload["title"] = json!(title);
                }
            }
        }

        let resp = self
            .transport
            .send(Method::POST, &url, &[], Some(&payload))
            .await?;
        check_status(&resp)?;

        let kind = match resp.body["type"].as_str() {
            Some("post") => PublishKind::Post,
            Some("comment") => PublishKind::Comment,
            other => {
                return Err(ProtocolError::Malformed(format!(
                    "publish acknowledged with unknown type {other:?}"
                )))
            }
        };
        let id = resp.body["data"]["id"]
            .as_str()
            .ok_or_else(|| ProtocolError::Malformed("publish response without item id".into()))?
            .to_string();

        Ok(PublishReceipt { id, kind })
    }

    async fn like_post(&self, credential: &str, post_id: &str) -> Result<(), ProtocolError> {
        let url = format!("{}{}", self.base_url, LIKE_PATH);
        let payload = json!({
            "api_token": credential,
            "post_id": post_id,
        });

        let resp = self
            .transport
            .send(Method::POST, &url, &[], Some(&payload))
            .await?;
        check_status(&resp)?;

        // The server answers a repeat like with 200 and success=false
        // rather than a 409; surface it as the same Conflict.
        if resp.body["success"] == json!(true) {
            Ok(())
        } else {
            Err(ProtocolError::Conflict(error_message(&resp.body)))
        }
    }
}

// ---------------------------------------------------------------------------
// Classification
// ---------------------------------------------------------------------------

/// Map a non-2xx status onto the error taxonomy.
fn check_status(resp: &TransportResponse) -> Result<(), ProtocolError> {
    let message = error_message(&resp.body);
    match resp.status {
        200..=299 => Ok(()),
        401 => Err(ProtocolError::InvalidCredential),
        409 => Err(ProtocolError::Conflict(message)),
        429 => Err(ProtocolError::Transient(format!("rate limited: {message}"))),
        400..=499 => Err(ProtocolError::InvalidInput(message)),
        _ => Err(ProtocolError::Transient(format!(
            "status {}: {message}",
            resp.status
        ))),
    }
}

fn error_message(body: &Value) -> String {
    body["error"]
        .as_str()
        .or_else(|| body["message"].as_str())
        .unwrap_or("(no error message)")
        .to_string()
}

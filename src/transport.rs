//! Transport
//!
//! Generic JSON-over-HTTP request helper shared by the Protocol client and
//! the generation backends. Applies a fixed upper-bound timeout and
//! normalizes failures into typed errors so callers never see a raw
//! panic-shaped surprise from a remote peer.

use std::time::Duration;

use anyhow::{Context, Result};
use reqwest::Method;
use serde_json::Value;

use crate::error::TransportError;

/// How much of a non-JSON body to keep for diagnostics.
const SNIPPET_LEN: usize = 200;

/// Status plus parsed JSON body. Callers interpret the status themselves;
/// 4xx/5xx are data here, not errors.
#[derive(Debug)]
pub struct TransportResponse {
    pub status: u16,
    pub body: Value,
}

/// One transport per timeout domain: Protocol calls get a short timeout,
/// generation backends a long one.
#[derive(Clone)]
pub struct Transport {
    http: reqwest::Client,
}

impl Transport {
    pub fn new(timeout: Duration) -> Result<Self> {
        let http = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .context("Failed to build HTTP client")?;
        Ok(Self { http })
    }

    /// Send `body` (if any) as JSON and parse the response body as JSON.
    ///
    /// Timeouts and connection failures come back as their own variants;
    /// an unparseable body yields `NonJson` with a truncated snippet.
    pub async fn send(
        &self,
        method: Method,
        url: &str,
        headers: &[(&str, &str)],
        body: Option<&Value>,
    ) -> Result<TransportResponse, TransportError> {
        let mut request = self.http.request(method, url);
        for (name, value) in headers {
            request = request.header(*name, *value);
        }
        if let Some(json) = body {
            request = request.json(json);
        }

        let response = request.send().await.map_err(classify_reqwest_error)?;
        let status = response.status().as_u16();
        let text = response.text().await.map_err(classify_reqwest_error)?;

        let body: Value = serde_json::from_str(&text).map_err(|_| TransportError::NonJson {
            status,
            snippet: snippet(&text),
        })?;

        Ok(TransportResponse { status, body })
    }
}

fn classify_reqwest_error(err: reqwest::Error) -> TransportError {
    if err.is_timeout() {
        TransportError::Timeout
    } else {
        TransportError::Network(err.to_string())
    }
}

fn snippet(text: &str) -> String {
    text.chars().take(SNIPPET_LEN).collect()
}

//! Error Taxonomy
//!
//! Typed failures for the transport layer and the Protocol client. The
//! engine branches on these: conflicts count as success, credential
//! rejections are skipped without retry, and everything transient waits
//! for the next scheduled cycle.

use thiserror::Error;

/// Failures at the HTTP/JSON boundary, before any Protocol semantics.
#[derive(Debug, Error)]
pub enum TransportError {
    #[error("request timed out")]
    Timeout,

    #[error("network error: {0}")]
    Network(String),

    /// The peer answered with something that is not JSON. Generation
    /// providers do this on error pages; it must not crash the cycle.
    #[error("non-JSON response (status {status}): {snippet}")]
    NonJson { status: u16, snippet: String },
}

/// Failures of a Protocol operation, classified for the engine.
#[derive(Debug, Error)]
pub enum ProtocolError {
    #[error("invalid input: {0}")]
    InvalidInput(String),

    /// Credential rejected. Not retryable within a cycle.
    #[error("credential rejected by the protocol")]
    InvalidCredential,

    /// Uniqueness violation: the desired state already holds.
    #[error("already in desired state: {0}")]
    Conflict(String),

    /// Network trouble or a server-side failure. Retried only by virtue
    /// of the next scheduled cycle, never inline.
    #[error("transient failure: {0}")]
    Transient(String),

    /// Undecodable or unexpectedly shaped response body.
    #[error("malformed response: {0}")]
    Malformed(String),
}

impl ProtocolError {
    /// Whether the next scheduled cycle should see this call again.
    /// Malformed counts as transient: the payload may be an outage page.
    pub fn is_retryable(&self) -> bool {
        matches!(self, ProtocolError::Transient(_) | ProtocolError::Malformed(_))
    }

    /// Conflicts mean the work was already done; treat as success.
    pub fn is_success_equivalent(&self) -> bool {
        matches!(self, ProtocolError::Conflict(_))
    }
}

impl From<TransportError> for ProtocolError {
    fn from(err: TransportError) -> Self {
        match err {
            TransportError::Timeout => ProtocolError::Transient("request timed out".into()),
            TransportError::Network(msg) => ProtocolError::Transient(msg),
            TransportError::NonJson { status, snippet } => {
                ProtocolError::Malformed(format!("status {status}: {snippet}"))
            }
        }
    }
}

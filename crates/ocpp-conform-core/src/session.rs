//! Session trait - the connection the orchestrator drives test traffic through

use async_trait::async_trait;
use serde_json::Value;
use thiserror::Error;

use crate::case::Payload;

/// Errors surfaced by a session
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum SessionError {
    /// The session could not be established
    #[error("Connection failed: {0}")]
    Connect(String),

    /// The endpoint did not agree on the requested subprotocol
    #[error("Subprotocol not accepted: {0}")]
    Subprotocol(String),

    /// No response arrived within the per-call timeout
    #[error("Call timed out")]
    Timeout,

    /// Sending or receiving this call failed
    #[error("Transport error: {0}")]
    Transport(String),

    /// The endpoint answered with an RPC-level error instead of a result
    #[error("Call error {code}: {description}")]
    CallError { code: String, description: String },

    /// The underlying connection is gone; no further calls can succeed
    #[error("Connection lost: {0}")]
    ConnectionLost(String),
}

impl SessionError {
    /// Whether this error ends the whole batch rather than a single call
    pub fn is_fatal(&self) -> bool {
        matches!(self, SessionError::ConnectionLost(_))
    }
}

/// A duplex request/response channel to the endpoint under test
///
/// Implementations must support many outstanding `send` calls at once and
/// return each response to the call that issued it.
#[async_trait]
pub trait Session: Send + Sync {
    /// Issue one call and wait for its response payload
    async fn send(&self, action: &str, payload: Payload) -> Result<Value, SessionError>;

    /// Resolves with a reason once the underlying connection is lost
    ///
    /// Sessions that never lose their connection may keep the default,
    /// which never resolves.
    async fn closed(&self) -> String {
        std::future::pending::<String>().await
    }

    /// Close the connection. Calling this more than once has no further effect.
    async fn close(&self);
}

//! Error types for atlas-link.
//!
//! Every variant carries a `String` so the error is `Clone`: a single
//! handshake outcome can be fanned out to every caller that joined it.

use thiserror::Error;

/// Errors produced by the sync client.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum AtlasLinkError {
    /// Invalid or expired credential. Never retried automatically.
    #[error("Authentication failed: {0}")]
    AuthenticationError(String),

    /// Network-level failure (connect refused, socket reset, stream ended).
    #[error("Transport error: {0}")]
    TransportError(String),

    /// The server explicitly terminated the session.
    #[error("Disconnected by server: {0}")]
    ServerClose(String),

    /// A registered event handler failed. Only ever logged by the router.
    #[error("Handler error on '{topic}': {message}")]
    HandlerError { topic: String, message: String },

    /// The server rejected a subscribe/unsubscribe request for one region.
    #[error("Subscription error: {0}")]
    SubscriptionError(String),

    #[error("Configuration error: {0}")]
    ConfigurationError(String),

    #[error("Serialization error: {0}")]
    SerializationError(String),

    #[error("Timeout: {0}")]
    TimeoutError(String),

    /// The operation was superseded by `disconnect()` or a newer `connect()`.
    #[error("Cancelled: {0}")]
    Cancelled(String),

    #[error("Internal error: {0}")]
    InternalError(String),
}

impl AtlasLinkError {
    /// Whether an automatic reconnect attempt may succeed after this error.
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::TransportError(_) | Self::TimeoutError(_))
    }

    /// Whether this error came from credential validation.
    pub fn is_auth(&self) -> bool {
        matches!(self, Self::AuthenticationError(_))
    }
}

impl From<serde_json::Error> for AtlasLinkError {
    fn from(err: serde_json::Error) -> Self {
        Self::SerializationError(err.to_string())
    }
}

impl From<url::ParseError> for AtlasLinkError {
    fn from(err: url::ParseError) -> Self {
        Self::ConfigurationError(format!("Invalid URL: {}", err))
    }
}

/// Result type for atlas-link operations.
pub type Result<T> = std::result::Result<T, AtlasLinkError>;

//! Error types for the realtime speech transport.

use thiserror::Error;

/// Result type for transport operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Errors that can occur while talking to the remote speech endpoint.
#[derive(Error, Debug)]
pub enum Error {
    /// The channel could not be established.
    #[error("connection error: {0}")]
    Connection(String),

    /// WebSocket error.
    #[error("websocket error: {0}")]
    WebSocket(#[from] tokio_tungstenite::tungstenite::Error),

    /// JSON serialization/deserialization error.
    #[error("json error: {0}")]
    Json(#[from] serde_json::Error),

    /// Error reported by the remote endpoint.
    #[error("api error: {0}")]
    Api(ApiError),

    /// Close was requested before the endpoint acknowledged the session.
    #[error("session aborted before open")]
    SessionAborted,

    /// The channel is closed.
    #[error("session closed")]
    SessionClosed,

    /// The channel failed after it was open.
    #[error("transport error: {0}")]
    Transport(String),

    /// Invalid configuration.
    #[error("invalid configuration: {0}")]
    InvalidConfig(String),

    /// Timeout error.
    #[error("timeout: {0}")]
    Timeout(String),
}

impl Error {
    /// Returns true if the error is a clean abort rather than a failure.
    pub fn is_aborted(&self) -> bool {
        matches!(self, Error::SessionAborted)
    }
}

/// Error object sent by the remote endpoint.
#[derive(Debug, Clone, Default, PartialEq, Eq, serde::Deserialize)]
pub struct ApiError {
    /// Numeric status code, if any.
    #[serde(default)]
    pub code: Option<i64>,
    /// Status name (e.g., "INVALID_ARGUMENT").
    #[serde(default)]
    pub status: Option<String>,
    /// Human-readable error message.
    #[serde(default)]
    pub message: String,
}

impl std::fmt::Display for ApiError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match (&self.status, self.code) {
            (Some(status), _) => write!(f, "{}: {}", status, self.message),
            (None, Some(code)) => write!(f, "{}: {}", code, self.message),
            (None, None) => write!(f, "{}", self.message),
        }
    }
}

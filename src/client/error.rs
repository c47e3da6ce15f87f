use reqwest::StatusCode;
use thiserror::Error;

/// Failure taxonomy for the client. `Network` is potentially transient and
/// left to the caller's retry policy; everything else is terminal for the
/// call (and, for authentication failures, for the session).
///
/// The enum is `Clone` so a single refresh outcome can be fanned out to
/// every caller waiting on the single-flight refresh.
#[derive(Debug, Clone, Error)]
pub enum ClientError {
    #[error("network error: {message}")]
    Network { message: String, timed_out: bool },
    #[error("authentication failed ({status})")]
    Authentication { status: StatusCode, body: serde_json::Value },
    #[error("request failed ({status})")]
    Api { status: StatusCode, body: serde_json::Value },
    #[error("unexpected response shape: {0}")]
    Protocol(String),
    #[error("no refresh token available")]
    NoRefreshToken,
    #[error("credential storage error: {0}")]
    Storage(String),
}

impl From<reqwest::Error> for ClientError {
    fn from(e: reqwest::Error) -> Self {
        Self::Network { message: e.to_string(), timed_out: e.is_timeout() }
    }
}

impl ClientError {
    /// The HTTP status carried by the error, if it originated from a response.
    #[must_use]
    pub const fn status(&self) -> Option<StatusCode> {
        match self {
            Self::Authentication { status, .. } | Self::Api { status, .. } => Some(*status),
            _ => None,
        }
    }
}

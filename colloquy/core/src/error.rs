//! Error Types
//!
//! Errors surfaced by the session core. Transport errors are stored on failed
//! assistant messages and in the session's `last_error`, so every type here is
//! `Clone` and serializable.

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Coarse classification of a transport failure
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum TransportErrorKind {
    /// Connection, timeout or body read failure
    Network,
    /// Rate limit or quota exhausted
    Quota,
    /// The service rejected the request
    InvalidRequest,
    /// The service failed while handling the request
    Server,
    /// The response body could not be decoded
    Decode,
}

/// Errors raised by a [`GenerativeBackend`](crate::backend::GenerativeBackend)
#[derive(Clone, Debug, PartialEq, Eq, Error, Serialize, Deserialize)]
pub enum TransportError {
    /// Connection, timeout or body read failure
    #[error("network error: {0}")]
    Network(String),

    /// Rate limit or quota exhausted (HTTP 429)
    #[error("quota exceeded: {0}")]
    Quota(String),

    /// The service rejected the request (HTTP 4xx)
    #[error("invalid request: {0}")]
    InvalidRequest(String),

    /// The service failed while handling the request (HTTP 5xx)
    #[error("server error {status}: {message}")]
    Server {
        /// HTTP status code
        status: u16,
        /// Body or reason reported by the service
        message: String,
    },

    /// Malformed response body
    #[error("failed to decode response: {0}")]
    Decode(String),
}

impl TransportError {
    /// Classify this error
    #[must_use]
    pub fn kind(&self) -> TransportErrorKind {
        match self {
            Self::Network(_) => TransportErrorKind::Network,
            Self::Quota(_) => TransportErrorKind::Quota,
            Self::InvalidRequest(_) => TransportErrorKind::InvalidRequest,
            Self::Server { .. } => TransportErrorKind::Server,
            Self::Decode(_) => TransportErrorKind::Decode,
        }
    }

    /// Map an HTTP status code and body to an error
    ///
    /// Only meaningful for non-success statuses.
    #[must_use]
    pub fn from_status(status: u16, body: impl Into<String>) -> Self {
        let body = body.into();
        match status {
            429 => Self::Quota(body),
            500..=599 => Self::Server {
                status,
                message: body,
            },
            _ => Self::InvalidRequest(format!("HTTP {status}: {body}")),
        }
    }
}

impl From<reqwest::Error> for TransportError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_decode() {
            return Self::Decode(err.to_string());
        }
        if let Some(status) = err.status() {
            return Self::from_status(status.as_u16(), err.to_string());
        }
        Self::Network(err.to_string())
    }
}

impl From<serde_json::Error> for TransportError {
    fn from(err: serde_json::Error) -> Self {
        Self::Decode(err.to_string())
    }
}

/// Errors returned by the session controller
#[derive(Clone, Debug, PartialEq, Eq, Error, Serialize, Deserialize)]
pub enum SessionError {
    /// Input was rejected before anything was sent
    #[error("invalid input: {0}")]
    Validation(String),

    /// The transport failed
    #[error(transparent)]
    Transport(#[from] TransportError),
}

impl SessionError {
    /// The underlying transport error, if any
    #[must_use]
    pub fn transport(&self) -> Option<&TransportError> {
        match self {
            Self::Transport(e) => Some(e),
            Self::Validation(_) => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_mapping() {
        assert_eq!(
            TransportError::from_status(429, "slow down").kind(),
            TransportErrorKind::Quota
        );
        assert_eq!(
            TransportError::from_status(400, "bad").kind(),
            TransportErrorKind::InvalidRequest
        );
        assert_eq!(
            TransportError::from_status(404, "no such model").kind(),
            TransportErrorKind::InvalidRequest
        );
        assert_eq!(
            TransportError::from_status(503, "unavailable"),
            TransportError::Server {
                status: 503,
                message: "unavailable".to_string()
            }
        );
    }

    #[test]
    fn test_session_error_wraps_transport() {
        let err: SessionError = TransportError::Network("reset".to_string()).into();
        assert_eq!(
            err.transport().map(TransportError::kind),
            Some(TransportErrorKind::Network)
        );
        assert_eq!(err.to_string(), "network error: reset");

        let err = SessionError::Validation("empty".to_string());
        assert!(err.transport().is_none());
    }
}

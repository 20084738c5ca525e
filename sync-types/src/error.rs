//! Error types for chatmirror.

use thiserror::Error;

/// Coarse classification of a [`RemoteError`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    /// Unreachable host, reset connection, transport timeout.
    Network,
    /// Expired or invalid credentials.
    Auth,
    /// Stale local reference.
    NotFound,
    /// 5xx-equivalent failure on the remote side.
    Server,
    /// Malformed local input.
    Validation,
    /// Anything else.
    Unknown,
}

/// Errors returned by the remote chat service.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RemoteError {
    /// The remote could not be reached.
    #[error("network error: {0}")]
    Network(String),

    /// Credentials were rejected.
    #[error("authentication failed: {0}")]
    Auth(String),

    /// The referenced resource does not exist remotely.
    #[error("not found: {0}")]
    NotFound(String),

    /// The remote failed to process the request.
    #[error("server error ({status}): {message}")]
    Server {
        /// Status code reported by the remote.
        status: u16,
        /// Error message reported by the remote.
        message: String,
    },

    /// The request was rejected as malformed.
    #[error("validation error: {0}")]
    Validation(String),

    /// Unclassified failure.
    #[error("unknown error: {0}")]
    Unknown(String),
}

impl RemoteError {
    /// Classify an HTTP-style status code.
    pub fn from_status(status: u16, message: impl Into<String>) -> Self {
        let message = message.into();
        match status {
            401 | 403 => Self::Auth(message),
            404 | 410 => Self::NotFound(message),
            408 | 429 => Self::Network(message),
            400 | 422 => Self::Validation(message),
            500..=599 => Self::Server { status, message },
            _ => Self::Unknown(message),
        }
    }

    /// The taxonomy bucket of this error.
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::Network(_) => ErrorKind::Network,
            Self::Auth(_) => ErrorKind::Auth,
            Self::NotFound(_) => ErrorKind::NotFound,
            Self::Server { .. } => ErrorKind::Server,
            Self::Validation(_) => ErrorKind::Validation,
            Self::Unknown(_) => ErrorKind::Unknown,
        }
    }

    /// Whether a retry may succeed (network and server failures only).
    pub fn is_retryable(&self) -> bool {
        matches!(self.kind(), ErrorKind::Network | ErrorKind::Server)
    }
}

/// Errors decoding a push frame.
#[derive(Debug, Error)]
pub enum DecodeError {
    /// The frame is not a JSON event envelope.
    #[error("invalid frame: {0}")]
    InvalidFrame(#[source] serde_json::Error),

    /// The payload does not match the shape of its event.
    #[error("invalid payload for {event}: {source}")]
    InvalidPayload {
        /// Event name.
        event: String,
        /// Underlying JSON error.
        #[source]
        source: serde_json::Error,
    },

    /// A field required to route the event is missing.
    #[error("{event} payload is missing {field}")]
    MissingField {
        /// Event name.
        event: String,
        /// Missing field.
        field: &'static str,
    },
}

//! REST error types

use serde::Deserialize;
use serde_json::Value;
use thiserror::Error;

/// Errors surfaced by the REST dispatcher.
///
/// The dispatcher never retries on its own; callers decide based on
/// [`RestError::is_retryable`].
#[derive(Debug, Error)]
pub enum RestError {
    /// 400/404 carrying a remote error code
    #[error("Remote error {code} (HTTP {status}): {message}")]
    Structured {
        status: u16,
        code: u64,
        message: String,
        errors: Option<Value>,
    },

    /// 400 without a structured body
    #[error("Bad request: {0}")]
    BadRequest(String),

    /// 404 without a structured body
    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Invalid credentials")]
    Unauthorized,

    #[error("Forbidden: {0}")]
    Forbidden(String),

    /// 429, should not happen while bucket bookkeeping is correct
    #[error("Rate limited (bucket {bucket:?}, retry after {retry_after:?}s, global: {global})")]
    RateLimited {
        bucket: Option<String>,
        retry_after: Option<f64>,
        global: bool,
    },

    #[error("Upstream unavailable (HTTP 502)")]
    BadGateway,

    #[error("Upstream internal error (HTTP {status})")]
    Server { status: u16 },

    #[error("Unexpected response (HTTP {status}): {body}")]
    Unexpected { status: u16, body: String },

    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("Failed to decode response body: {0}")]
    Decode(#[from] serde_json::Error),

    #[error("Invalid value for header {name}: {reason}")]
    InvalidHeader { name: String, reason: String },

    #[error("Request queue closed")]
    QueueClosed,
}

impl RestError {
    /// HTTP status that produced this error, if any
    #[must_use]
    pub fn status(&self) -> Option<u16> {
        match self {
            Self::Structured { status, .. }
            | Self::Server { status }
            | Self::Unexpected { status, .. } => Some(*status),
            Self::BadRequest(_) => Some(400),
            Self::NotFound(_) => Some(404),
            Self::Unauthorized => Some(401),
            Self::Forbidden(_) => Some(403),
            Self::RateLimited { .. } => Some(429),
            Self::BadGateway => Some(502),
            Self::Http(e) => e.status().map(|s| s.as_u16()),
            Self::Decode(_) | Self::InvalidHeader { .. } | Self::QueueClosed => None,
        }
    }

    /// Remote error code from a structured error body
    #[must_use]
    pub fn code(&self) -> Option<u64> {
        match self {
            Self::Structured { code, .. } => Some(*code),
            _ => None,
        }
    }

    /// Short machine-readable kind, for logs
    #[must_use]
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Structured { .. } => "STRUCTURED",
            Self::BadRequest(_) => "BAD_REQUEST",
            Self::NotFound(_) => "NOT_FOUND",
            Self::Unauthorized => "UNAUTHORIZED",
            Self::Forbidden(_) => "FORBIDDEN",
            Self::RateLimited { .. } => "RATE_LIMITED",
            Self::BadGateway => "BAD_GATEWAY",
            Self::Server { .. } => "SERVER_ERROR",
            Self::Unexpected { .. } => "UNEXPECTED_RESPONSE",
            Self::Http(_) => "HTTP_ERROR",
            Self::Decode(_) => "DECODE_ERROR",
            Self::InvalidHeader { .. } => "INVALID_HEADER",
            Self::QueueClosed => "QUEUE_CLOSED",
        }
    }

    /// Check if this is a client error (4xx)
    #[must_use]
    pub fn is_client_error(&self) -> bool {
        self.status().is_some_and(|s| (400..500).contains(&s))
    }

    /// Check if this is a server error (5xx)
    #[must_use]
    pub fn is_server_error(&self) -> bool {
        self.status().is_some_and(|s| (500..600).contains(&s))
    }

    /// Whether repeating the same call later can reasonably succeed
    #[must_use]
    pub fn is_retryable(&self) -> bool {
        match self {
            Self::BadGateway | Self::RateLimited { .. } => true,
            Self::Http(e) => e.is_timeout() || e.is_connect(),
            _ => false,
        }
    }
}

/// Error body returned with 4xx responses
#[derive(Debug, Clone, Deserialize)]
pub(crate) struct RemoteErrorBody {
    pub code: u64,
    pub message: String,
    #[serde(default)]
    pub errors: Option<Value>,
}

/// Result type alias for REST operations
pub type RestResult<T> = Result<T, RestError>;

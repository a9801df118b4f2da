//! Gateway error types

use std::fmt;
use thiserror::Error;
use tokio_tungstenite::tungstenite;

/// Errors a shard reports to its owner.
///
/// Conditions the shard recovers from by itself (missed acks, server
/// requested reconnects, resumable closes) are never errors; they surface as
/// [`ReconnectReason`]s on the event stream instead.
#[derive(Debug, Error)]
pub enum GatewayError {
    /// Malformed or out-of-order payload from the server
    #[error("Protocol violation: {0}")]
    Protocol(String),

    /// The server closed the socket with a code the client cannot recover from
    #[error("Gateway closed with fatal code {code}: {description}")]
    FatalClose { code: u16, description: String },

    /// The socket could not be opened
    #[error("Failed to connect: {0}")]
    Connect(#[source] Box<tungstenite::Error>),

    /// Writing to an open socket failed
    #[error("Transport error: {0}")]
    Transport(#[source] Box<tungstenite::Error>),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Unknown shard {index} (shard count {count})")]
    UnknownShard { index: u32, count: u32 },

    /// The shard has stopped and no longer accepts commands
    #[error("Shard {0} is closed")]
    ShardClosed(u32),
}

impl GatewayError {
    pub(crate) fn connect(error: tungstenite::Error) -> Self {
        Self::Connect(Box::new(error))
    }

    /// Whether the error came from a close frame
    #[must_use]
    pub fn close_code(&self) -> Option<u16> {
        match self {
            Self::FatalClose { code, .. } => Some(*code),
            _ => None,
        }
    }
}

impl From<tungstenite::Error> for GatewayError {
    fn from(error: tungstenite::Error) -> Self {
        Self::Transport(Box::new(error))
    }
}

/// Why a shard is reconnecting
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReconnectReason {
    /// No heartbeat ack arrived before the next beat was due
    HeartbeatTimeout,
    /// The server sent op 7
    ServerRequested,
    /// The server sent op 9
    InvalidSession { resumable: bool },
    /// The server closed the socket with a recoverable code
    Closed { code: u16 },
    /// The socket ended without a close frame
    ConnectionLost,
}

impl fmt::Display for ReconnectReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::HeartbeatTimeout => write!(f, "heartbeat ack timeout"),
            Self::ServerRequested => write!(f, "server requested reconnect"),
            Self::InvalidSession { resumable } => {
                write!(f, "invalid session (resumable: {resumable})")
            }
            Self::Closed { code } => write!(f, "closed with code {code}"),
            Self::ConnectionLost => write!(f, "connection lost"),
        }
    }
}

/// Result type alias for gateway operations
pub type GatewayResult<T> = Result<T, GatewayError>;

//! Shard connection state

use serde::{Deserialize, Serialize};

/// Where a shard is in its connection lifecycle
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
pub enum ShardState {
    /// No socket; either not started, between attempts, or stopped
    #[default]
    Disconnected,
    /// Opening a socket
    Connecting,
    /// Socket open, nothing sent yet
    AwaitingHello,
    /// Identify sent, waiting for `READY`
    Identifying,
    /// Resume sent, waiting for `RESUMED`
    Resuming,
    /// Session established and heartbeating
    Connected,
}

impl ShardState {
    #[must_use]
    pub const fn is_connected(self) -> bool {
        matches!(self, Self::Connected)
    }

    /// Handshake started but not finished
    #[must_use]
    pub const fn is_handshaking(self) -> bool {
        matches!(self, Self::AwaitingHello | Self::Identifying | Self::Resuming)
    }
}

impl std::fmt::Display for ShardState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            Self::Disconnected => "disconnected",
            Self::Connecting => "connecting",
            Self::AwaitingHello => "awaiting_hello",
            Self::Identifying => "identifying",
            Self::Resuming => "resuming",
            Self::Connected => "connected",
        };
        f.write_str(name)
    }
}

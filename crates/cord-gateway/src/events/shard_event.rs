//! Events a shard emits to its owner

use super::GatewayEventType;
use crate::error::{GatewayError, ReconnectReason};
use serde::de::DeserializeOwned;
use serde_json::Value;

/// One decoded dispatch payload
#[derive(Debug, Clone, PartialEq)]
pub struct DispatchEvent {
    pub event_type: GatewayEventType,
    pub sequence: Option<u64>,
    pub data: Value,
}

impl DispatchEvent {
    /// Decode the payload into a typed struct
    pub fn parse<T: DeserializeOwned>(&self) -> Result<T, serde_json::Error> {
        T::deserialize(&self.data)
    }
}

/// Event tagged with the shard that produced it
#[derive(Debug)]
pub struct ShardEvent {
    pub shard_id: u32,
    pub kind: ShardEventKind,
}

#[derive(Debug)]
pub enum ShardEventKind {
    /// A dispatch payload, in the order the shard received it
    Dispatch(DispatchEvent),
    /// The shard dropped its socket and is opening a new one
    Reconnecting {
        resume: bool,
        reason: ReconnectReason,
    },
    /// The shard stopped cleanly (normal close or shutdown)
    Disconnected,
    /// The shard stopped on an error it cannot recover from
    Failed(GatewayError),
}

impl ShardEvent {
    pub(crate) fn new(shard_id: u32, kind: ShardEventKind) -> Self {
        Self { shard_id, kind }
    }

    /// Whether the shard that sent this will send nothing more
    #[must_use]
    pub fn is_final(&self) -> bool {
        matches!(
            self.kind,
            ShardEventKind::Disconnected | ShardEventKind::Failed(_)
        )
    }
}

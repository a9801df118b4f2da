//! Owner commands forwarded to a shard

use super::{
    GatewayMessage, OpCode, PresenceUpdatePayload, RequestGuildMembersPayload,
    VoiceStateUpdatePayload,
};
use cord_core::Snowflake;

/// A command an owner sends through a shard
#[derive(Debug, Clone, PartialEq)]
pub enum ShardCommand {
    PresenceUpdate(PresenceUpdatePayload),
    VoiceStateUpdate(VoiceStateUpdatePayload),
    RequestGuildMembers(RequestGuildMembersPayload),
}

impl ShardCommand {
    #[must_use]
    pub const fn op(&self) -> OpCode {
        match self {
            Self::PresenceUpdate(_) => OpCode::PresenceUpdate,
            Self::VoiceStateUpdate(_) => OpCode::VoiceStateUpdate,
            Self::RequestGuildMembers(_) => OpCode::RequestGuildMembers,
        }
    }

    /// Guild the command targets, used to route it to the owning shard
    #[must_use]
    pub const fn guild_id(&self) -> Option<Snowflake> {
        match self {
            Self::PresenceUpdate(_) => None,
            Self::VoiceStateUpdate(payload) => Some(payload.guild_id),
            Self::RequestGuildMembers(payload) => Some(payload.guild_id),
        }
    }

    pub fn to_message(&self) -> Result<GatewayMessage, serde_json::Error> {
        let d = match self {
            Self::PresenceUpdate(payload) => serde_json::to_value(payload)?,
            Self::VoiceStateUpdate(payload) => serde_json::to_value(payload)?,
            Self::RequestGuildMembers(payload) => serde_json::to_value(payload)?,
        };
        Ok(GatewayMessage::new(self.op(), d))
    }
}

impl From<PresenceUpdatePayload> for ShardCommand {
    fn from(payload: PresenceUpdatePayload) -> Self {
        Self::PresenceUpdate(payload)
    }
}

impl From<VoiceStateUpdatePayload> for ShardCommand {
    fn from(payload: VoiceStateUpdatePayload) -> Self {
        Self::VoiceStateUpdate(payload)
    }
}

impl From<RequestGuildMembersPayload> for ShardCommand {
    fn from(payload: RequestGuildMembersPayload) -> Self {
        Self::RequestGuildMembers(payload)
    }
}

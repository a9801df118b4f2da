//! Gateway protocol definitions
//!
//! Op codes, close codes, the payload envelope and the payload bodies the
//! client sends or expects.

mod close_codes;
mod commands;
mod messages;
mod opcodes;
mod payloads;

pub use close_codes::{CloseCode, CloseReaction, NORMAL_CLOSURE, POLICY_VIOLATION, RESTART};
pub use commands::ShardCommand;
pub use messages::GatewayMessage;
pub use opcodes::OpCode;
pub use payloads::{
    HelloPayload, IdentifyPayload, IdentifyProperties, PresenceUpdatePayload,
    RequestGuildMembersPayload, ResumePayload, VoiceStateUpdatePayload,
};

//! WebSocket close codes
//!
//! Gateway-specific close codes and the client's reaction to each.

use serde::{Deserialize, Serialize};

/// Normal closure. The shard stops without reconnecting.
pub const NORMAL_CLOSURE: u16 = 1000;

/// Sent by the client when it gives up on an unresponsive connection
pub const POLICY_VIOLATION: u16 = 1008;

/// Sent by the client when it drops a connection it intends to resume.
/// Anything other than 1000/1001 keeps the session alive server-side.
pub const RESTART: u16 = 1012;

/// Gateway close codes
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[repr(u16)]
pub enum CloseCode {
    UnknownError = 4000,
    UnknownOpcode = 4001,
    DecodeError = 4002,
    NotAuthenticated = 4003,
    AuthenticationFailed = 4004,
    AlreadyAuthenticated = 4005,
    InvalidSeq = 4007,
    RateLimited = 4008,
    SessionTimedOut = 4009,
    InvalidShard = 4010,
    ShardingRequired = 4011,
    InvalidApiVersion = 4012,
    InvalidIntents = 4013,
    DisallowedIntents = 4014,
}

/// What a shard does after its socket is closed with a given code
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CloseReaction {
    /// Stop for good
    Terminal,
    /// Reconnect and resume the session
    Resume,
    /// Reconnect with a fresh session
    Reidentify,
    /// Report a fatal error to the owner
    Fatal,
}

impl CloseCode {
    #[must_use]
    pub fn from_u16(value: u16) -> Option<Self> {
        match value {
            4000 => Some(Self::UnknownError),
            4001 => Some(Self::UnknownOpcode),
            4002 => Some(Self::DecodeError),
            4003 => Some(Self::NotAuthenticated),
            4004 => Some(Self::AuthenticationFailed),
            4005 => Some(Self::AlreadyAuthenticated),
            4007 => Some(Self::InvalidSeq),
            4008 => Some(Self::RateLimited),
            4009 => Some(Self::SessionTimedOut),
            4010 => Some(Self::InvalidShard),
            4011 => Some(Self::ShardingRequired),
            4012 => Some(Self::InvalidApiVersion),
            4013 => Some(Self::InvalidIntents),
            4014 => Some(Self::DisallowedIntents),
            _ => None,
        }
    }

    #[must_use]
    pub const fn as_u16(self) -> u16 {
        self as u16
    }

    /// Reaction to a raw close code.
    ///
    /// Only 4000 is resumed and only 4009 starts a fresh session. Every other
    /// code, known or not, is fatal so a shard never spins on a close it
    /// cannot fix by itself.
    #[must_use]
    pub fn reaction(code: u16) -> CloseReaction {
        match code {
            NORMAL_CLOSURE => CloseReaction::Terminal,
            4000 => CloseReaction::Resume,
            4009 => CloseReaction::Reidentify,
            _ => CloseReaction::Fatal,
        }
    }

    /// Human readable description of a raw close code
    #[must_use]
    pub fn describe(code: u16) -> String {
        match Self::from_u16(code) {
            Some(known) => known.description().to_string(),
            None if code == NORMAL_CLOSURE => "Normal closure".to_string(),
            None => format!("Unexpected close code {code}"),
        }
    }

    #[must_use]
    pub const fn description(self) -> &'static str {
        match self {
            Self::UnknownError => "Unknown error",
            Self::UnknownOpcode => "Unknown opcode sent",
            Self::DecodeError => "Invalid payload sent",
            Self::NotAuthenticated => "Payload sent before identifying",
            Self::AuthenticationFailed => "Invalid token",
            Self::AlreadyAuthenticated => "Identified more than once",
            Self::InvalidSeq => "Invalid sequence number on resume",
            Self::RateLimited => "Gateway rate limit exceeded",
            Self::SessionTimedOut => "Session timed out",
            Self::InvalidShard => "Invalid shard",
            Self::ShardingRequired => "Sharding required",
            Self::InvalidApiVersion => "Invalid API version",
            Self::InvalidIntents => "Invalid intents",
            Self::DisallowedIntents => "Disallowed intents",
        }
    }

    #[must_use]
    pub const fn name(self) -> &'static str {
        match self {
            Self::UnknownError => "UnknownError",
            Self::UnknownOpcode => "UnknownOpcode",
            Self::DecodeError => "DecodeError",
            Self::NotAuthenticated => "NotAuthenticated",
            Self::AuthenticationFailed => "AuthenticationFailed",
            Self::AlreadyAuthenticated => "AlreadyAuthenticated",
            Self::InvalidSeq => "InvalidSeq",
            Self::RateLimited => "RateLimited",
            Self::SessionTimedOut => "SessionTimedOut",
            Self::InvalidShard => "InvalidShard",
            Self::ShardingRequired => "ShardingRequired",
            Self::InvalidApiVersion => "InvalidApiVersion",
            Self::InvalidIntents => "InvalidIntents",
            Self::DisallowedIntents => "DisallowedIntents",
        }
    }
}

impl std::fmt::Display for CloseCode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{} ({}): {}", self.name(), self.as_u16(), self.description())
    }
}

impl From<CloseCode> for u16 {
    fn from(code: CloseCode) -> Self {
        code.as_u16()
    }
}

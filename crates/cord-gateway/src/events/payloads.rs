//! Session lifecycle event payloads
//!
//! Only the fields the shard itself needs are typed. Everything else in a
//! dispatch stays raw JSON for downstream consumers.

use cord_core::Snowflake;
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// `READY` dispatch
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReadyEvent {
    /// Gateway version
    #[serde(default)]
    pub v: u8,
    /// The connected user, left raw
    #[serde(default)]
    pub user: Value,
    #[serde(default)]
    pub guilds: Vec<UnavailableGuild>,
    pub session_id: String,
    /// Host to use for resuming this session
    #[serde(default)]
    pub resume_gateway_url: Option<String>,
    /// `[shard_index, shard_count]`
    #[serde(default)]
    pub shard: Option<[u32; 2]>,
}

/// Guild listed in `READY` before its `GUILD_CREATE` arrives
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UnavailableGuild {
    pub id: Snowflake,
    #[serde(default)]
    pub unavailable: bool,
}

//! # cord-gateway
//!
//! Sharded client for the real-time gateway.
//!
//! Each [`Shard`] runs one connection's handshake, heartbeat and
//! resume/reconnect policy on its own task. A [`ShardPool`] owns all shards of
//! a bot, merges their events and routes commands to the right shard.

pub mod config;
pub mod error;
pub mod events;
pub mod pool;
pub mod protocol;
pub mod shard;

pub use config::GatewayConfig;
pub use error::{GatewayError, GatewayResult, ReconnectReason};
pub use events::{
    DispatchEvent, EventHandler, GatewayEventType, ReadyEvent, ShardEvent, ShardEventKind,
};
pub use pool::ShardPool;
pub use protocol::{CloseCode, GatewayMessage, OpCode, ShardCommand};
pub use shard::{SessionState, Shard, ShardHandle, ShardState};

//! Gateway events
//!
//! Dispatch event names, the few payloads the shard reads itself, and the
//! event stream a shard emits to its owner.

mod event_types;
mod handler;
mod payloads;
mod shard_event;

pub use event_types::GatewayEventType;
pub use handler::{route_event, EventHandler};
pub use payloads::{ReadyEvent, UnavailableGuild};
pub use shard_event::{DispatchEvent, ShardEvent, ShardEventKind};

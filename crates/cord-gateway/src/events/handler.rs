//! Typed event dispatch table

use super::{DispatchEvent, GatewayEventType, ReadyEvent, ShardEvent, ShardEventKind};
use crate::error::{GatewayError, ReconnectReason};
use async_trait::async_trait;

/// Receives shard events by kind.
///
/// Every method has an empty default so implementors only override what they
/// need. `READY` and `RESUMED` go to [`ready`](Self::ready) and
/// [`resumed`](Self::resumed); every other dispatch goes to
/// [`dispatch`](Self::dispatch).
#[async_trait]
pub trait EventHandler: Send + Sync {
    async fn ready(&self, _shard_id: u32, _ready: ReadyEvent) {}

    async fn resumed(&self, _shard_id: u32) {}

    async fn dispatch(&self, _shard_id: u32, _event: DispatchEvent) {}

    async fn reconnecting(&self, _shard_id: u32, _resume: bool, _reason: ReconnectReason) {}

    async fn disconnected(&self, _shard_id: u32) {}

    async fn failed(&self, _shard_id: u32, _error: GatewayError) {}
}

/// Hand one event to the matching handler method
pub async fn route_event<H: EventHandler + ?Sized>(handler: &H, event: ShardEvent) {
    let shard_id = event.shard_id;

    match event.kind {
        ShardEventKind::Dispatch(dispatch) => match dispatch.event_type {
            GatewayEventType::Ready => match dispatch.parse::<ReadyEvent>() {
                Ok(ready) => handler.ready(shard_id, ready).await,
                // The shard already rejected unparsable READY payloads
                Err(_) => handler.dispatch(shard_id, dispatch).await,
            },
            GatewayEventType::Resumed => handler.resumed(shard_id).await,
            _ => handler.dispatch(shard_id, dispatch).await,
        },
        ShardEventKind::Reconnecting { resume, reason } => {
            handler.reconnecting(shard_id, resume, reason).await;
        }
        ShardEventKind::Disconnected => handler.disconnected(shard_id).await,
        ShardEventKind::Failed(error) => handler.failed(shard_id, error).await,
    }
}

//! Owner-side handle to a running shard

use super::ShardState;
use crate::error::{GatewayError, GatewayResult};
use crate::protocol::ShardCommand;
use std::sync::Arc;
use tokio::sync::{mpsc, watch};

/// Cheap, cloneable handle to one shard.
///
/// Dropping every handle stops the shard.
#[derive(Debug, Clone)]
pub struct ShardHandle {
    id: u32,
    commands: mpsc::UnboundedSender<ShardCommand>,
    state: watch::Receiver<ShardState>,
    shutdown: Arc<watch::Sender<bool>>,
}

impl ShardHandle {
    pub(super) fn new(
        id: u32,
        commands: mpsc::UnboundedSender<ShardCommand>,
        state: watch::Receiver<ShardState>,
        shutdown: watch::Sender<bool>,
    ) -> Self {
        Self {
            id,
            commands,
            state,
            shutdown: Arc::new(shutdown),
        }
    }

    pub fn id(&self) -> u32 {
        self.id
    }

    /// Queue a command. It is sent once the shard has a session and the
    /// outbound budget allows it.
    ///
    /// # Errors
    /// Returns [`GatewayError::ShardClosed`] if the shard has stopped.
    pub fn send(&self, command: ShardCommand) -> GatewayResult<()> {
        self.commands
            .send(command)
            .map_err(|_| GatewayError::ShardClosed(self.id))
    }

    /// Current connection state
    pub fn state(&self) -> ShardState {
        *self.state.borrow()
    }

    /// Subscribe to state changes
    pub fn watch_state(&self) -> watch::Receiver<ShardState> {
        self.state.clone()
    }

    /// Wait until the shard reaches `target`
    ///
    /// # Errors
    /// Returns [`GatewayError::ShardClosed`] if the shard stops first.
    pub async fn wait_for_state(&self, target: ShardState) -> GatewayResult<()> {
        let mut state = self.state.clone();
        state
            .wait_for(|current| *current == target)
            .await
            .map(|_| ())
            .map_err(|_| GatewayError::ShardClosed(self.id))
    }

    /// Ask the shard to close its socket with a normal closure and stop.
    /// Other shards are unaffected.
    pub fn close(&self) {
        self.shutdown.send_replace(true);
    }

    pub fn is_closed(&self) -> bool {
        self.commands.is_closed()
    }
}

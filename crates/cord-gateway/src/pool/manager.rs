//! Shard pool
//!
//! Owns every shard of one bot, fans their events into one stream and routes
//! owner commands to the shard that owns the target partition.

use crate::config::GatewayConfig;
use crate::error::{GatewayError, GatewayResult};
use crate::events::{route_event, EventHandler, ShardEvent};
use crate::protocol::ShardCommand;
use crate::shard::{SessionState, Shard, ShardHandle, ShardState};
use cord_core::Snowflake;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::Instrument;

/// A fixed set of shards sharing one configuration and one event stream
pub struct ShardPool {
    config: Arc<GatewayConfig>,
    shards: Vec<ShardHandle>,
    tasks: Vec<JoinHandle<SessionState>>,
    saved_sessions: HashMap<u32, SessionState>,
    events_tx: mpsc::UnboundedSender<ShardEvent>,
    events_rx: Option<mpsc::UnboundedReceiver<ShardEvent>>,
}

impl ShardPool {
    #[must_use]
    pub fn new(config: GatewayConfig) -> Self {
        let (events_tx, events_rx) = mpsc::unbounded_channel();
        Self {
            config: Arc::new(config),
            shards: Vec::new(),
            tasks: Vec::new(),
            saved_sessions: HashMap::new(),
            events_tx,
            events_rx: Some(events_rx),
        }
    }

    /// Resume shard `index` from a saved session on its first connect
    #[must_use]
    pub fn with_session(mut self, index: u32, session: SessionState) -> Self {
        self.saved_sessions.insert(index, session);
        self
    }

    pub fn config(&self) -> &GatewayConfig {
        &self.config
    }

    pub fn shard_count(&self) -> u32 {
        self.config.shard_count
    }

    /// Start every shard. Each connects on its own task, independently of
    /// the others; connection failures arrive as
    /// [`ShardEventKind::Failed`](crate::events::ShardEventKind::Failed) events.
    ///
    /// Calling this on a pool that is already running does nothing.
    pub fn connect_all(&mut self, token: &str) {
        if !self.shards.is_empty() {
            tracing::warn!("Shard pool already started");
            return;
        }

        let token: Arc<str> = Arc::from(token);
        tracing::info!(shard_count = self.config.shard_count, "Starting shards");

        for index in 0..self.config.shard_count {
            let (mut shard, handle) = Shard::new(
                index,
                Arc::clone(&self.config),
                Arc::clone(&token),
                self.events_tx.clone(),
            );
            if let Some(session) = self.saved_sessions.remove(&index) {
                shard = shard.with_session(session);
            }

            let span = tracing::info_span!("shard", shard_id = index);
            self.tasks.push(tokio::spawn(shard.run().instrument(span)));
            self.shards.push(handle);
        }
    }

    /// Forward a command to shard `index` only
    ///
    /// # Errors
    /// Returns [`GatewayError::UnknownShard`] for an index outside the pool and
    /// [`GatewayError::ShardClosed`] if that shard is not running.
    pub fn dispatch(&self, index: u32, command: ShardCommand) -> GatewayResult<()> {
        self.shard(index)?.send(command)
    }

    /// Forward a command to the shard that owns `guild_id`
    ///
    /// # Errors
    /// See [`ShardPool::dispatch`].
    pub fn dispatch_for_guild(&self, guild_id: Snowflake, command: ShardCommand) -> GatewayResult<()> {
        let index = guild_id.shard_index(self.config.shard_count);
        tracing::trace!(guild_id = %guild_id, shard_id = index, op = %command.op(), "Routing command");
        self.dispatch(index, command)
    }

    /// Handle to shard `index`
    ///
    /// # Errors
    /// See [`ShardPool::dispatch`].
    pub fn shard(&self, index: u32) -> GatewayResult<&ShardHandle> {
        if index >= self.config.shard_count {
            return Err(GatewayError::UnknownShard {
                index,
                count: self.config.shard_count,
            });
        }
        self.shards
            .get(index as usize)
            .ok_or(GatewayError::ShardClosed(index))
    }

    pub fn shard_state(&self, index: u32) -> Option<ShardState> {
        self.shard(index).ok().map(ShardHandle::state)
    }

    pub fn shards(&self) -> &[ShardHandle] {
        &self.shards
    }

    /// Take the merged event stream. Events are ordered per shard, not
    /// across shards. Returns `None` if it was already taken.
    pub fn take_events(&mut self) -> Option<mpsc::UnboundedReceiver<ShardEvent>> {
        self.events_rx.take()
    }

    /// Route every event to `handler` until all shards have stopped
    ///
    /// # Errors
    /// Returns an error if the event stream was already taken.
    pub async fn run_with<H: EventHandler + ?Sized>(&mut self, handler: &H) -> GatewayResult<()> {
        let Some(mut events) = self.take_events() else {
            return Err(GatewayError::Protocol(
                "event stream already taken".to_string(),
            ));
        };

        let mut running = self.shards.len();
        while running > 0 {
            let Some(event) = events.recv().await else {
                break;
            };
            if event.is_final() {
                running -= 1;
            }
            route_event(handler, event).await;
        }

        tracing::info!("All shards stopped");
        Ok(())
    }

    /// Close every shard with a normal closure and wait for them to stop.
    /// Returns each shard's last session, indexed by shard id.
    pub async fn shutdown(&mut self) -> Vec<SessionState> {
        tracing::info!(shard_count = self.shards.len(), "Shutting down shards");

        for shard in &self.shards {
            shard.close();
        }

        let mut sessions = Vec::with_capacity(self.tasks.len());
        for (index, task) in self.tasks.drain(..).enumerate() {
            match task.await {
                Ok(session) => sessions.push(session),
                Err(error) => {
                    tracing::warn!(shard_id = index, error = %error, "Shard task ended abnormally");
                    sessions.push(SessionState::default());
                }
            }
        }

        self.shards.clear();
        sessions
    }
}

impl std::fmt::Debug for ShardPool {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ShardPool")
            .field("shard_count", &self.config.shard_count)
            .field("running", &self.shards.len())
            .finish_non_exhaustive()
    }
}

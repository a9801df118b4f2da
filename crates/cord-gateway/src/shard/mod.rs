//! Gateway shard
//!
//! A [`Shard`] owns one gateway connection at a time and runs as a single
//! task: socket reads, heartbeat ticks, owner commands and shutdown are all
//! handled by one `select!` loop, so per-connection state is never shared.
//! Only [`SessionState`] outlives a socket.
//!
//! ```text
//! Disconnected -> Connecting -> AwaitingHello -> Identifying | Resuming -> Connected
//!       ^                                                                     |
//!       +------------------------- reconnect / stop --------------------------+
//! ```

mod connection;
mod handle;
mod session;
mod state;

pub use handle::ShardHandle;
pub use session::SessionState;
pub use state::ShardState;

use crate::config::GatewayConfig;
use crate::error::{GatewayResult, ReconnectReason};
use crate::events::{ShardEvent, ShardEventKind};
use crate::protocol::ShardCommand;
use std::sync::Arc;
use tokio::sync::{mpsc, watch};

/// What ended a connection
#[derive(Debug)]
enum Outcome {
    Reconnect {
        resume: bool,
        reason: ReconnectReason,
    },
    Stop,
}

/// One gateway shard. Build with [`Shard::new`] and drive with [`Shard::run`].
pub struct Shard {
    id: u32,
    config: Arc<GatewayConfig>,
    token: Arc<str>,
    session: SessionState,
    state: watch::Sender<ShardState>,
    events: mpsc::UnboundedSender<ShardEvent>,
    commands: mpsc::UnboundedReceiver<ShardCommand>,
    commands_open: bool,
    /// Command taken from the mailbox, waiting for outbound budget
    pending_command: Option<ShardCommand>,
    shutdown: watch::Receiver<bool>,
}

impl Shard {
    /// Create shard `id` of `config.shard_count` and its owner handle.
    /// Events are sent to `events`.
    pub fn new(
        id: u32,
        config: Arc<GatewayConfig>,
        token: impl Into<Arc<str>>,
        events: mpsc::UnboundedSender<ShardEvent>,
    ) -> (Self, ShardHandle) {
        let (command_tx, command_rx) = mpsc::unbounded_channel();
        let (state_tx, state_rx) = watch::channel(ShardState::Disconnected);
        let (shutdown_tx, shutdown_rx) = watch::channel(false);

        let shard = Self {
            id,
            config,
            token: token.into(),
            session: SessionState::new(),
            state: state_tx,
            events,
            commands: command_rx,
            commands_open: true,
            pending_command: None,
            shutdown: shutdown_rx,
        };
        let handle = ShardHandle::new(id, command_tx, state_rx, shutdown_tx);

        (shard, handle)
    }

    /// Start from a previously saved session so the first connection resumes
    #[must_use]
    pub fn with_session(mut self, session: SessionState) -> Self {
        self.session = session;
        self
    }

    pub fn id(&self) -> u32 {
        self.id
    }

    pub fn session(&self) -> &SessionState {
        &self.session
    }

    /// Connect and keep the shard alive until it stops.
    ///
    /// Reconnects for every recoverable condition, resuming when allowed.
    /// Ends on a normal close, on shutdown, or on a fatal error; the last
    /// event sent is [`ShardEventKind::Disconnected`] or
    /// [`ShardEventKind::Failed`]. Returns the session so the owner can
    /// persist it.
    pub async fn run(mut self) -> SessionState {
        let mut resume = self.session.can_resume();

        let result: GatewayResult<()> = loop {
            match self.connect_once(resume).await {
                Ok(Outcome::Reconnect {
                    resume: next,
                    reason,
                }) => {
                    tracing::info!(
                        shard_id = self.id,
                        resume = next,
                        reason = %reason,
                        "Reconnecting"
                    );
                    self.emit(ShardEventKind::Reconnecting {
                        resume: next,
                        reason,
                    });
                    resume = next;
                }
                Ok(Outcome::Stop) => break Ok(()),
                Err(error) => break Err(error),
            }
        };

        self.set_state(ShardState::Disconnected);

        match result {
            Ok(()) => {
                tracing::info!(shard_id = self.id, "Shard stopped");
                self.emit(ShardEventKind::Disconnected);
            }
            Err(error) => {
                tracing::error!(shard_id = self.id, error = %error, "Shard failed");
                self.emit(ShardEventKind::Failed(error));
            }
        }

        self.session
    }

    fn emit(&self, kind: ShardEventKind) {
        if self.events.send(ShardEvent::new(self.id, kind)).is_err() {
            tracing::trace!(shard_id = self.id, "Event receiver dropped");
        }
    }

    fn set_state(&self, state: ShardState) {
        let previous = self.state.send_replace(state);
        if previous != state {
            tracing::debug!(shard_id = self.id, from = %previous, to = %state, "Shard state changed");
        }
    }

    /// Host to connect to: the session's resume host when resuming
    fn connect_url(&self, resume: bool) -> String {
        let host = match &self.session.resume_url {
            Some(url) if resume && self.session.can_resume() => url.as_str(),
            _ => self.config.url.as_str(),
        };
        self.config.connect_url(host)
    }
}

impl std::fmt::Debug for Shard {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Shard")
            .field("id", &self.id)
            .field("shard_count", &self.config.shard_count)
            .field("state", &*self.state.borrow())
            .field("session", &self.session)
            .finish_non_exhaustive()
    }
}

/// Resolves once shutdown is requested or every handle is gone
async fn shutdown_signal(shutdown: &mut watch::Receiver<bool>) {
    let _ = shutdown.wait_for(|stop| *stop).await;
}

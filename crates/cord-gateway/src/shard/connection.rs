//! One socket's lifetime: handshake, heartbeating and inbound handling

use super::{shutdown_signal, Outcome, Shard, ShardState};
use crate::error::{GatewayError, GatewayResult, ReconnectReason};
use crate::events::{DispatchEvent, GatewayEventType, ReadyEvent, ShardEventKind};
use crate::protocol::{
    CloseCode, CloseReaction, GatewayMessage, HelloPayload, IdentifyPayload, OpCode,
    ResumePayload, NORMAL_CLOSURE, POLICY_VIOLATION, RESTART,
};
use futures_util::{SinkExt, StreamExt};
use governor::{DefaultDirectRateLimiter, Quota, RateLimiter};
use serde::Deserialize;
use std::borrow::Cow;
use std::time::Duration;
use tokio::net::TcpStream;
use tokio::time::{Instant, Interval, MissedTickBehavior};
use tokio_tungstenite::tungstenite::protocol::frame::coding::CloseCode as WsCloseCode;
use tokio_tungstenite::tungstenite::protocol::CloseFrame;
use tokio_tungstenite::tungstenite::{self, Message};
use tokio_tungstenite::{MaybeTlsStream, WebSocketStream};

type Socket = WebSocketStream<MaybeTlsStream<TcpStream>>;

/// Upper bound on sending our close frame to a peer that may be gone
const CLOSE_TIMEOUT: Duration = Duration::from_secs(2);

/// State that lives exactly as long as one socket
struct Connection {
    socket: Socket,
    /// Whether this connection should resume rather than identify
    resume: bool,
    hello_received: bool,
    heartbeat: Option<Interval>,
    awaiting_ack: bool,
    last_beat: Option<Instant>,
    /// `READY` or `RESUMED` arrived, owner commands may flow
    session_ready: bool,
    commands: DefaultDirectRateLimiter,
}

impl Connection {
    async fn send(&mut self, message: &GatewayMessage) -> GatewayResult<()> {
        let json = message.to_json()?;
        tracing::trace!(op = %message.op, "Sending payload");
        self.socket.send(Message::Text(json)).await?;
        Ok(())
    }

    async fn close(&mut self, code: u16) {
        let frame = CloseFrame {
            code: WsCloseCode::from(code),
            reason: Cow::Borrowed(""),
        };
        // The peer may already be gone
        let _ = tokio::time::timeout(CLOSE_TIMEOUT, self.socket.close(Some(frame))).await;
    }
}

/// One step of the connection loop: keep going, or end with an outcome
type Step = GatewayResult<Option<Outcome>>;

impl Shard {
    /// Open one socket and run it until it ends
    pub(super) async fn connect_once(&mut self, resume: bool) -> GatewayResult<Outcome> {
        let url = self.connect_url(resume);
        self.set_state(ShardState::Connecting);
        tracing::debug!(shard_id = self.id, url = %url, resume, "Connecting to gateway");

        let socket = tokio::select! {
            biased;
            () = shutdown_signal(&mut self.shutdown) => return Ok(Outcome::Stop),
            result = tokio_tungstenite::connect_async(url.as_str()) => {
                result.map_err(GatewayError::connect)?.0
            }
        };

        self.set_state(ShardState::AwaitingHello);

        let mut conn = Connection {
            socket,
            resume,
            hello_received: false,
            heartbeat: None,
            awaiting_ack: false,
            last_beat: None,
            session_ready: false,
            commands: RateLimiter::direct(Quota::per_minute(self.config.commands_per_minute)),
        };

        let outcome = self.drive(&mut conn).await;

        let close_code = match &outcome {
            Ok(Outcome::Reconnect {
                reason: ReconnectReason::HeartbeatTimeout,
                ..
            }) => POLICY_VIOLATION,
            // Anything but 1000 keeps the session resumable
            Ok(Outcome::Reconnect { .. }) => RESTART,
            Ok(Outcome::Stop) | Err(_) => NORMAL_CLOSURE,
        };
        conn.close(close_code).await;

        outcome
    }

    async fn drive(&mut self, conn: &mut Connection) -> GatewayResult<Outcome> {
        loop {
            let take_command =
                conn.session_ready && self.commands_open && self.pending_command.is_none();
            let send_command = conn.session_ready && self.pending_command.is_some();

            let step: Step = tokio::select! {
                biased;
                () = shutdown_signal(&mut self.shutdown) => {
                    tracing::info!(shard_id = self.id, "Shutdown requested");
                    Ok(Some(Outcome::Stop))
                }
                frame = conn.socket.next() => self.on_frame(conn, frame).await,
                () = next_tick(&mut conn.heartbeat) => self.on_tick(conn).await,
                command = self.commands.recv(), if take_command => {
                    match command {
                        Some(command) => self.pending_command = Some(command),
                        None => self.commands_open = false,
                    }
                    Ok(None)
                }
                () = conn.commands.until_ready(), if send_command => {
                    self.send_pending_command(conn).await
                }
            };

            match step {
                Ok(None) => {}
                Ok(Some(outcome)) => return Ok(outcome),
                // A failed write means the socket is gone, same as a failed read
                Err(GatewayError::Transport(error)) => {
                    tracing::warn!(shard_id = self.id, error = %error, "Write to gateway failed");
                    return Ok(Outcome::Reconnect {
                        resume: true,
                        reason: ReconnectReason::ConnectionLost,
                    });
                }
                Err(error) => return Err(error),
            }
        }
    }

    async fn on_frame(
        &mut self,
        conn: &mut Connection,
        frame: Option<Result<Message, tungstenite::Error>>,
    ) -> Step {
        let lost = Ok(Some(Outcome::Reconnect {
            resume: true,
            reason: ReconnectReason::ConnectionLost,
        }));

        match frame {
            None => {
                tracing::warn!(shard_id = self.id, "Gateway stream ended without a close frame");
                lost
            }
            Some(Err(error)) => {
                tracing::warn!(shard_id = self.id, error = %error, "Gateway read failed");
                lost
            }
            Some(Ok(Message::Text(text))) => {
                let message = GatewayMessage::from_json(&text)
                    .map_err(|e| GatewayError::Protocol(format!("undecodable payload: {e}")))?;
                self.on_message(conn, message).await
            }
            Some(Ok(Message::Close(frame))) => self.on_close(frame).map(Some),
            Some(Ok(Message::Binary(_))) => Err(GatewayError::Protocol(
                "unexpected binary frame".to_string(),
            )),
            Some(Ok(_)) => Ok(None),
        }
    }

    fn on_close(&mut self, frame: Option<CloseFrame<'_>>) -> GatewayResult<Outcome> {
        let Some(frame) = frame else {
            tracing::warn!(shard_id = self.id, "Gateway closed without a status code");
            return Ok(Outcome::Reconnect {
                resume: true,
                reason: ReconnectReason::ConnectionLost,
            });
        };

        let code = u16::from(frame.code);
        tracing::info!(
            shard_id = self.id,
            close_code = code,
            reason = %frame.reason,
            "Gateway closed connection"
        );

        match CloseCode::reaction(code) {
            CloseReaction::Terminal => Ok(Outcome::Stop),
            CloseReaction::Resume => Ok(Outcome::Reconnect {
                resume: true,
                reason: ReconnectReason::Closed { code },
            }),
            CloseReaction::Reidentify => {
                self.session.clear();
                Ok(Outcome::Reconnect {
                    resume: false,
                    reason: ReconnectReason::Closed { code },
                })
            }
            CloseReaction::Fatal => Err(GatewayError::FatalClose {
                code,
                description: CloseCode::describe(code),
            }),
        }
    }

    async fn on_message(&mut self, conn: &mut Connection, message: GatewayMessage) -> Step {
        tracing::trace!(shard_id = self.id, message = %message, "Received payload");

        if !conn.hello_received {
            if message.op != OpCode::Hello {
                return Err(GatewayError::Protocol(format!(
                    "expected Hello as first payload, got {}",
                    message.op
                )));
            }
            self.on_hello(conn, &message).await?;
            return Ok(None);
        }

        match message.op {
            OpCode::Dispatch => self.on_dispatch(conn, message),
            OpCode::Heartbeat => {
                tracing::debug!(shard_id = self.id, "Heartbeat requested by gateway");
                self.send_heartbeat(conn).await?;
                Ok(None)
            }
            OpCode::HeartbeatAck => {
                conn.awaiting_ack = false;
                if let Some(sent) = conn.last_beat {
                    tracing::trace!(
                        shard_id = self.id,
                        latency_ms = sent.elapsed().as_millis() as u64,
                        "Heartbeat acknowledged"
                    );
                }
                Ok(None)
            }
            OpCode::Reconnect => {
                tracing::info!(shard_id = self.id, "Gateway requested reconnect");
                Ok(Some(Outcome::Reconnect {
                    resume: true,
                    reason: ReconnectReason::ServerRequested,
                }))
            }
            OpCode::InvalidSession => {
                let resumable = message.is_resumable();
                tracing::warn!(shard_id = self.id, resumable, "Session invalidated");
                if !resumable {
                    self.session.clear();
                }
                Ok(Some(Outcome::Reconnect {
                    resume: resumable,
                    reason: ReconnectReason::InvalidSession { resumable },
                }))
            }
            op => Err(GatewayError::Protocol(format!("unexpected op code {op}"))),
        }
    }

    async fn on_hello(&mut self, conn: &mut Connection, message: &GatewayMessage) -> GatewayResult<()> {
        let hello = HelloPayload::deserialize(&message.d)
            .map_err(|e| GatewayError::Protocol(format!("invalid Hello payload: {e}")))?;
        if hello.heartbeat_interval == 0 {
            return Err(GatewayError::Protocol(
                "Hello with zero heartbeat interval".to_string(),
            ));
        }

        conn.hello_received = true;
        let period = Duration::from_millis(hello.heartbeat_interval);
        tracing::debug!(
            shard_id = self.id,
            heartbeat_interval_ms = hello.heartbeat_interval,
            "Received Hello"
        );

        // First beat right away, then one per period
        self.send_heartbeat(conn).await?;
        let mut interval = tokio::time::interval_at(Instant::now() + period, period);
        interval.set_missed_tick_behavior(MissedTickBehavior::Delay);
        conn.heartbeat = Some(interval);

        let resume = match self.session.resume_info() {
            Some((session_id, seq)) if conn.resume => Some(ResumePayload {
                token: self.token.to_string(),
                session_id: session_id.to_string(),
                seq,
            }),
            _ => None,
        };

        if let Some(payload) = resume {
            tracing::info!(
                shard_id = self.id,
                session_id = %payload.session_id,
                seq = payload.seq,
                "Resuming session"
            );
            conn.send(&GatewayMessage::resume(&payload)?).await?;
            self.set_state(ShardState::Resuming);
        } else {
            tracing::info!(
                shard_id = self.id,
                shard_count = self.config.shard_count,
                "Identifying"
            );
            let payload = IdentifyPayload {
                token: self.token.to_string(),
                intents: self.config.intents,
                shard: [self.id, self.config.shard_count],
                properties: self.config.properties.clone(),
                large_threshold: self.config.large_threshold,
                presence: self.config.presence.clone(),
            };
            conn.send(&GatewayMessage::identify(&payload)?).await?;
            self.set_state(ShardState::Identifying);
        }

        Ok(())
    }

    fn on_dispatch(&mut self, conn: &mut Connection, message: GatewayMessage) -> Step {
        if let Some(sequence) = message.s {
            self.session.record_sequence(sequence);
        }

        let Some(name) = message.t else {
            return Err(GatewayError::Protocol(
                "dispatch without an event name".to_string(),
            ));
        };
        let event_type = GatewayEventType::parse(&name);

        match event_type {
            GatewayEventType::Ready => {
                let ready = ReadyEvent::deserialize(&message.d)
                    .map_err(|e| GatewayError::Protocol(format!("invalid READY payload: {e}")))?;
                tracing::info!(
                    shard_id = self.id,
                    session_id = %ready.session_id,
                    guilds = ready.guilds.len(),
                    "Session ready"
                );
                self.session
                    .set_session(ready.session_id, ready.resume_gateway_url);
                conn.session_ready = true;
                self.set_state(ShardState::Connected);
            }
            GatewayEventType::Resumed => {
                tracing::info!(shard_id = self.id, seq = ?self.session.last_sequence, "Session resumed");
                conn.session_ready = true;
                self.set_state(ShardState::Connected);
            }
            _ => {}
        }

        self.emit(ShardEventKind::Dispatch(DispatchEvent {
            event_type,
            sequence: message.s,
            data: message.d,
        }));

        Ok(None)
    }

    async fn on_tick(&mut self, conn: &mut Connection) -> Step {
        if conn.awaiting_ack {
            tracing::warn!(
                shard_id = self.id,
                "No heartbeat ack since the last beat, connection is zombied"
            );
            return Ok(Some(Outcome::Reconnect {
                resume: true,
                reason: ReconnectReason::HeartbeatTimeout,
            }));
        }

        self.send_heartbeat(conn).await?;
        Ok(None)
    }

    async fn send_heartbeat(&self, conn: &mut Connection) -> GatewayResult<()> {
        conn.send(&GatewayMessage::heartbeat(self.session.last_sequence))
            .await?;
        conn.awaiting_ack = true;
        conn.last_beat = Some(Instant::now());
        Ok(())
    }

    async fn send_pending_command(&mut self, conn: &mut Connection) -> Step {
        if let Some(command) = &self.pending_command {
            conn.send(&command.to_message()?).await?;
            tracing::debug!(shard_id = self.id, op = %command.op(), "Sent command");
            // Kept until written so a failed write retries on the next connection
            self.pending_command = None;
        }
        Ok(None)
    }
}

/// Next heartbeat tick, or never before Hello
async fn next_tick(interval: &mut Option<Interval>) {
    match interval {
        Some(interval) => {
            interval.tick().await;
        }
        None => std::future::pending().await,
    }
}

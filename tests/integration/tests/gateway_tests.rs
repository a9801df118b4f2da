//! Gateway shard integration tests
//!
//! Each test scripts the server side of the protocol with [`MockGateway`]
//! and checks what the shard sends and which events it emits.

use std::time::Duration;

use anyhow::Result;
use cord_core::Snowflake;
use cord_gateway::protocol::{PresenceUpdatePayload, VoiceStateUpdatePayload};
use cord_gateway::{
    GatewayError, GatewayEventType, GatewayMessage, OpCode, ReconnectReason, ShardEventKind,
    ShardPool, ShardState,
};
use integration_tests::*;
use serde_json::{json, Value};

/// Complete a fresh handshake: Hello, first beat, Identify, READY with seq 1
async fn identify_and_ready(conn: &mut MockConnection, session_id: &str) -> Result<()> {
    conn.hello(45_000).await?;

    let beat = conn.recv().await?;
    assert_eq!(beat.op, OpCode::Heartbeat);

    let identify = conn.recv().await?;
    assert_eq!(identify.op, OpCode::Identify);

    conn.send(&GatewayMessage::dispatch(
        "READY",
        1,
        ready_payload(session_id),
    ))
    .await
}

/// Wait for the dispatch event of `event_type`
async fn expect_dispatch(shard: &mut TestShard, event_type: GatewayEventType) -> Result<Option<u64>> {
    let event = shard.next_event().await?;
    match event.kind {
        ShardEventKind::Dispatch(dispatch) => {
            assert_eq!(dispatch.event_type, event_type);
            Ok(dispatch.sequence)
        }
        other => panic!("expected {event_type} dispatch, got {other:?}"),
    }
}

async fn expect_reconnecting(shard: &mut TestShard) -> Result<(bool, ReconnectReason)> {
    let event = shard.next_event().await?;
    match event.kind {
        ShardEventKind::Reconnecting { resume, reason } => Ok((resume, reason)),
        other => panic!("expected reconnect, got {other:?}"),
    }
}

// ============================================================================
// Handshake
// ============================================================================

#[tokio::test]
async fn test_identify_follows_first_heartbeat() -> Result<()> {
    let mut gateway = MockGateway::start().await?;
    let mut shard = spawn_shard(gateway_config(&gateway.url()), None);

    let mut conn = gateway.accept().await?;
    conn.hello(45_000).await?;

    let beat = conn.recv().await?;
    assert_eq!(beat.op, OpCode::Heartbeat);
    assert_eq!(beat.d, Value::Null);

    let identify = conn.recv().await?;
    assert_eq!(identify.op, OpCode::Identify);
    assert_eq!(identify.d["token"], TEST_TOKEN);
    assert_eq!(identify.d["shard"], json!([0, 1]));
    assert!(identify.d["properties"]["os"].is_string());

    conn.send(&GatewayMessage::dispatch("READY", 1, ready_payload("abc")))
        .await?;
    assert_eq!(expect_dispatch(&mut shard, GatewayEventType::Ready).await?, Some(1));
    assert_eq!(shard.handle.state(), ShardState::Connected);

    shard.handle.close();
    assert_eq!(conn.recv_close().await?, Some(1000));
    assert!(matches!(shard.final_event().await?, ShardEventKind::Disconnected));

    let session = shard.task.await?;
    assert_eq!(session.session_id.as_deref(), Some("abc"));
    assert_eq!(session.last_sequence, Some(1));
    Ok(())
}

#[tokio::test]
async fn test_first_payload_must_be_hello() -> Result<()> {
    let mut gateway = MockGateway::start().await?;
    let mut shard = spawn_shard(gateway_config(&gateway.url()), None);

    let mut conn = gateway.accept().await?;
    conn.send(&GatewayMessage::heartbeat_ack()).await?;

    assert!(matches!(
        shard.final_event().await?,
        ShardEventKind::Failed(GatewayError::Protocol(_))
    ));
    gateway.expect_no_connection(Duration::from_millis(200)).await?;
    Ok(())
}

#[tokio::test]
async fn test_dispatch_without_event_name_is_protocol_error() -> Result<()> {
    let mut gateway = MockGateway::start().await?;
    let mut shard = spawn_shard(gateway_config(&gateway.url()), None);

    let mut conn = gateway.accept().await?;
    conn.hello(45_000).await?;
    conn.recv().await?;
    conn.recv().await?;
    conn.send_json(&json!({ "op": 0, "d": {}, "s": 1 })).await?;

    assert!(matches!(
        shard.final_event().await?,
        ShardEventKind::Failed(GatewayError::Protocol(_))
    ));
    Ok(())
}

#[tokio::test]
async fn test_dispatches_keep_order_and_sequence() -> Result<()> {
    let mut gateway = MockGateway::start().await?;
    let mut shard = spawn_shard(gateway_config(&gateway.url()), None);

    let mut conn = gateway.accept().await?;
    identify_and_ready(&mut conn, "abc").await?;
    for seq in 2..=6 {
        conn.send(&GatewayMessage::dispatch(
            "MESSAGE_CREATE",
            seq,
            json!({ "id": seq.to_string(), "content": "hi" }),
        ))
        .await?;
    }

    assert_eq!(expect_dispatch(&mut shard, GatewayEventType::Ready).await?, Some(1));
    for seq in 2..=6 {
        let event = shard.next_event().await?;
        let ShardEventKind::Dispatch(dispatch) = event.kind else {
            panic!("expected dispatch");
        };
        assert_eq!(dispatch.event_type, GatewayEventType::MessageCreate);
        assert_eq!(dispatch.sequence, Some(seq));
        assert_eq!(dispatch.data["id"], seq.to_string());
    }

    shard.handle.close();
    let session = shard.task.await?;
    assert_eq!(session.last_sequence, Some(6));
    Ok(())
}

// ============================================================================
// Heartbeat
// ============================================================================

#[tokio::test]
async fn test_server_heartbeat_request_is_answered_immediately() -> Result<()> {
    let mut gateway = MockGateway::start().await?;
    let mut shard = spawn_shard(gateway_config(&gateway.url()), None);

    let mut conn = gateway.accept().await?;
    identify_and_ready(&mut conn, "abc").await?;
    conn.send(&GatewayMessage::dispatch("TYPING_START", 5, json!({})))
        .await?;
    expect_dispatch(&mut shard, GatewayEventType::Ready).await?;
    expect_dispatch(&mut shard, GatewayEventType::TypingStart).await?;

    conn.send(&GatewayMessage::new(OpCode::Heartbeat, Value::Null))
        .await?;
    let beat = conn.recv().await?;
    assert_eq!(beat.op, OpCode::Heartbeat);
    assert_eq!(beat.d, json!(5));

    shard.handle.close();
    Ok(())
}

#[tokio::test]
async fn test_missing_ack_reconnects_once_and_resumes() -> Result<()> {
    let mut gateway = MockGateway::start().await?;
    let mut shard = spawn_shard(gateway_config(&gateway.url()), None);

    // Beats every 200ms, none acknowledged
    let mut conn = gateway.accept().await?;
    conn.hello(200).await?;
    conn.recv().await?;
    conn.recv().await?;
    conn.send(&GatewayMessage::dispatch("READY", 1, ready_payload("abc")))
        .await?;

    assert_eq!(conn.recv_close().await?, Some(1008));
    expect_dispatch(&mut shard, GatewayEventType::Ready).await?;
    assert_eq!(
        expect_reconnecting(&mut shard).await?,
        (true, ReconnectReason::HeartbeatTimeout)
    );

    let mut conn = gateway.accept().await?;
    conn.hello(45_000).await?;
    let beat = conn.recv().await?;
    assert_eq!(beat.d, json!(1));

    let resume = conn.recv().await?;
    assert_eq!(resume.op, OpCode::Resume);
    assert_eq!(resume.d["session_id"], "abc");
    assert_eq!(resume.d["seq"], 1);

    conn.send(&GatewayMessage::heartbeat_ack()).await?;
    gateway
        .expect_no_connection(Duration::from_millis(300))
        .await?;

    shard.handle.close();
    Ok(())
}

#[tokio::test]
async fn test_acknowledged_heartbeats_keep_connection() -> Result<()> {
    let mut gateway = MockGateway::start().await?;
    let shard = spawn_shard(gateway_config(&gateway.url()), None);

    // A missed ack would close with 1008 before the loop finishes
    let mut conn = gateway.accept().await?;
    conn.hello(50).await?;
    conn.recv().await?;
    conn.recv().await?;

    for _ in 0..4 {
        conn.send(&GatewayMessage::heartbeat_ack()).await?;
        let beat = conn.recv().await?;
        assert_eq!(beat.op, OpCode::Heartbeat);
    }

    shard.handle.close();
    assert_eq!(conn.recv_close().await?, Some(1000));
    Ok(())
}

// ============================================================================
// Close codes and server requests
// ============================================================================

#[tokio::test]
async fn test_resume_after_resumable_close() -> Result<()> {
    let mut gateway = MockGateway::start().await?;
    let mut shard = spawn_shard(gateway_config(&gateway.url()), None);

    let mut conn = gateway.accept().await?;
    identify_and_ready(&mut conn, "abc").await?;
    conn.send(&GatewayMessage::dispatch("MESSAGE_CREATE", 42, json!({})))
        .await?;
    expect_dispatch(&mut shard, GatewayEventType::Ready).await?;
    expect_dispatch(&mut shard, GatewayEventType::MessageCreate).await?;

    conn.close(4000).await?;
    assert_eq!(
        expect_reconnecting(&mut shard).await?,
        (true, ReconnectReason::Closed { code: 4000 })
    );

    let mut conn = gateway.accept().await?;
    conn.hello(45_000).await?;
    let beat = conn.recv().await?;
    assert_eq!(beat.d, json!(42));

    let resume = conn.recv().await?;
    assert_eq!(resume.op, OpCode::Resume);
    assert_eq!(resume.d["token"], TEST_TOKEN);
    assert_eq!(resume.d["session_id"], "abc");
    assert_eq!(resume.d["seq"], 42);

    conn.send(&GatewayMessage::dispatch("RESUMED", 43, json!({})))
        .await?;
    assert_eq!(expect_dispatch(&mut shard, GatewayEventType::Resumed).await?, Some(43));
    shard.handle.wait_for_state(ShardState::Connected).await?;

    shard.handle.close();
    Ok(())
}

#[tokio::test]
async fn test_resume_goes_to_session_resume_host() -> Result<()> {
    let mut gateway = MockGateway::start().await?;
    let mut resume_gateway = MockGateway::start().await?;
    let mut shard = spawn_shard(gateway_config(&gateway.url()), None);

    let mut ready = ready_payload("abc");
    ready["resume_gateway_url"] = json!(resume_gateway.url());

    let mut conn = gateway.accept().await?;
    conn.hello(45_000).await?;
    conn.recv().await?;
    conn.recv().await?;
    conn.send(&GatewayMessage::dispatch("READY", 1, ready)).await?;
    expect_dispatch(&mut shard, GatewayEventType::Ready).await?;

    conn.send(&GatewayMessage::reconnect()).await?;
    assert_eq!(
        expect_reconnecting(&mut shard).await?,
        (true, ReconnectReason::ServerRequested)
    );

    let mut conn = resume_gateway.accept().await?;
    conn.hello(45_000).await?;
    conn.recv().await?;
    assert_eq!(conn.recv().await?.op, OpCode::Resume);
    gateway
        .expect_no_connection(Duration::from_millis(100))
        .await?;

    shard.handle.close();
    Ok(())
}

#[tokio::test]
async fn test_session_invalidating_close_reidentifies() -> Result<()> {
    let mut gateway = MockGateway::start().await?;
    let mut shard = spawn_shard(gateway_config(&gateway.url()), None);

    let mut conn = gateway.accept().await?;
    identify_and_ready(&mut conn, "abc").await?;
    expect_dispatch(&mut shard, GatewayEventType::Ready).await?;

    conn.close(4009).await?;
    assert_eq!(
        expect_reconnecting(&mut shard).await?,
        (false, ReconnectReason::Closed { code: 4009 })
    );

    let mut conn = gateway.accept().await?;
    conn.hello(45_000).await?;
    let beat = conn.recv().await?;
    assert_eq!(beat.d, Value::Null);
    assert_eq!(conn.recv().await?.op, OpCode::Identify);

    shard.handle.close();
    Ok(())
}

#[tokio::test]
async fn test_fatal_close_stops_shard() -> Result<()> {
    let mut gateway = MockGateway::start().await?;
    let mut shard = spawn_shard(gateway_config(&gateway.url()), None);

    let mut conn = gateway.accept().await?;
    conn.hello(45_000).await?;
    conn.recv().await?;
    conn.recv().await?;
    conn.close(4004).await?;

    match shard.final_event().await? {
        ShardEventKind::Failed(error) => {
            assert_eq!(error.close_code(), Some(4004));
        }
        other => panic!("expected failure, got {other:?}"),
    }
    gateway
        .expect_no_connection(Duration::from_millis(200))
        .await?;
    assert_eq!(shard.handle.state(), ShardState::Disconnected);
    Ok(())
}

#[tokio::test]
async fn test_normal_close_stops_shard() -> Result<()> {
    let mut gateway = MockGateway::start().await?;
    let mut shard = spawn_shard(gateway_config(&gateway.url()), None);

    let mut conn = gateway.accept().await?;
    identify_and_ready(&mut conn, "abc").await?;
    conn.close(1000).await?;

    assert!(matches!(shard.final_event().await?, ShardEventKind::Disconnected));
    gateway
        .expect_no_connection(Duration::from_millis(200))
        .await?;

    let session = shard.task.await?;
    assert_eq!(session.session_id.as_deref(), Some("abc"));
    Ok(())
}

#[tokio::test]
async fn test_invalid_session_not_resumable_reidentifies() -> Result<()> {
    let mut gateway = MockGateway::start().await?;
    let mut shard = spawn_shard(gateway_config(&gateway.url()), None);

    let mut conn = gateway.accept().await?;
    identify_and_ready(&mut conn, "abc").await?;
    expect_dispatch(&mut shard, GatewayEventType::Ready).await?;

    conn.send(&GatewayMessage::invalid_session(false)).await?;
    assert_eq!(
        expect_reconnecting(&mut shard).await?,
        (false, ReconnectReason::InvalidSession { resumable: false })
    );

    let mut conn = gateway.accept().await?;
    conn.hello(45_000).await?;
    assert_eq!(conn.recv().await?.d, Value::Null);
    assert_eq!(conn.recv().await?.op, OpCode::Identify);

    shard.handle.close();
    Ok(())
}

#[tokio::test]
async fn test_invalid_session_resumable_resumes() -> Result<()> {
    let mut gateway = MockGateway::start().await?;
    let mut shard = spawn_shard(gateway_config(&gateway.url()), None);

    let mut conn = gateway.accept().await?;
    identify_and_ready(&mut conn, "abc").await?;
    expect_dispatch(&mut shard, GatewayEventType::Ready).await?;

    conn.send(&GatewayMessage::invalid_session(true)).await?;
    assert_eq!(
        expect_reconnecting(&mut shard).await?,
        (true, ReconnectReason::InvalidSession { resumable: true })
    );

    let mut conn = gateway.accept().await?;
    conn.hello(45_000).await?;
    conn.recv().await?;
    let resume = conn.recv().await?;
    assert_eq!(resume.op, OpCode::Resume);
    assert_eq!(resume.d["seq"], 1);

    shard.handle.close();
    Ok(())
}

#[tokio::test]
async fn test_reconnect_request_resumes() -> Result<()> {
    let mut gateway = MockGateway::start().await?;
    let mut shard = spawn_shard(gateway_config(&gateway.url()), None);

    let mut conn = gateway.accept().await?;
    identify_and_ready(&mut conn, "abc").await?;
    expect_dispatch(&mut shard, GatewayEventType::Ready).await?;

    conn.send(&GatewayMessage::reconnect()).await?;
    assert_eq!(conn.recv_close().await?, Some(1012));
    assert_eq!(
        expect_reconnecting(&mut shard).await?,
        (true, ReconnectReason::ServerRequested)
    );

    let mut conn = gateway.accept().await?;
    conn.hello(45_000).await?;
    conn.recv().await?;
    assert_eq!(conn.recv().await?.op, OpCode::Resume);

    shard.handle.close();
    Ok(())
}

#[tokio::test]
async fn test_saved_session_resumes_on_first_connect() -> Result<()> {
    let mut gateway = MockGateway::start().await?;
    let shard = spawn_shard(
        gateway_config(&gateway.url()),
        Some(resumable_session("saved", 7)),
    );

    let mut conn = gateway.accept().await?;
    conn.hello(45_000).await?;
    assert_eq!(conn.recv().await?.d, json!(7));

    let resume = conn.recv().await?;
    assert_eq!(resume.op, OpCode::Resume);
    assert_eq!(resume.d["session_id"], "saved");
    assert_eq!(resume.d["seq"], 7);

    shard.handle.close();
    Ok(())
}

// ============================================================================
// Commands
// ============================================================================

#[tokio::test]
async fn test_commands_wait_for_session() -> Result<()> {
    let mut gateway = MockGateway::start().await?;
    let shard = spawn_shard(gateway_config(&gateway.url()), None);

    let mut conn = gateway.accept().await?;
    shard
        .handle
        .send(PresenceUpdatePayload::new("idle").into())?;

    conn.hello(45_000).await?;
    assert_eq!(conn.recv().await?.op, OpCode::Heartbeat);
    assert_eq!(conn.recv().await?.op, OpCode::Identify);
    conn.expect_silence(Duration::from_millis(200)).await?;

    conn.send(&GatewayMessage::dispatch("READY", 1, ready_payload("abc")))
        .await?;
    let presence = conn.recv().await?;
    assert_eq!(presence.op, OpCode::PresenceUpdate);
    assert_eq!(presence.d["status"], "idle");

    shard.handle.close();
    Ok(())
}

#[tokio::test]
async fn test_send_after_stop_fails() -> Result<()> {
    let mut gateway = MockGateway::start().await?;
    let mut shard = spawn_shard(gateway_config(&gateway.url()), None);

    let mut conn = gateway.accept().await?;
    conn.hello(45_000).await?;
    conn.close(1000).await?;
    shard.final_event().await?;
    shard.task.await?;

    assert!(matches!(
        shard.handle.send(PresenceUpdatePayload::new("online").into()),
        Err(GatewayError::ShardClosed(0))
    ));
    Ok(())
}

// ============================================================================
// Shard pool
// ============================================================================

#[tokio::test]
async fn test_pool_routes_guild_commands_to_owning_shard() -> Result<()> {
    let mut gateway = MockGateway::start().await?;
    let mut pool = ShardPool::new(gateway_config(&gateway.url()).with_shard_count(2));
    let mut events = pool.take_events().expect("event stream");
    pool.connect_all(TEST_TOKEN);

    // Connections may arrive in either order; sort them by identified shard
    let mut by_shard: [Option<MockConnection>; 2] = [None, None];
    for _ in 0..2 {
        let mut conn = gateway.accept().await?;
        conn.hello(45_000).await?;
        conn.recv().await?;
        let identify = conn.recv().await?;
        assert_eq!(identify.d["shard"][1], 2);
        let index = identify.d["shard"][0].as_u64().expect("shard index") as usize;
        conn.send(&GatewayMessage::dispatch("READY", 1, ready_payload("abc")))
            .await?;
        by_shard[index] = Some(conn);
    }

    let mut ready = 0;
    while ready < 2 {
        if let ShardEventKind::Dispatch(_) = next_event(&mut events).await?.kind {
            ready += 1;
        }
    }

    // (1 << 22) >> 22 == 1, and 1 % 2 == 1
    let guild_id = Snowflake::new(1 << 22);
    pool.dispatch_for_guild(
        guild_id,
        VoiceStateUpdatePayload {
            guild_id,
            channel_id: None,
            self_mute: false,
            self_deaf: true,
        }
        .into(),
    )?;

    let [Some(mut shard0), Some(mut shard1)] = by_shard else {
        panic!("both shards should have identified");
    };

    let voice = shard1.recv().await?;
    assert_eq!(voice.op, OpCode::VoiceStateUpdate);
    assert_eq!(voice.d["guild_id"], guild_id.to_string());
    shard0.expect_silence(Duration::from_millis(100)).await?;

    let sessions = pool.shutdown().await;
    assert_eq!(sessions.len(), 2);
    assert_eq!(shard0.recv_close().await?, Some(1000));
    assert_eq!(shard1.recv_close().await?, Some(1000));
    Ok(())
}

#[tokio::test]
async fn test_pool_saved_session_and_handler_routing() -> Result<()> {
    use cord_gateway::{EventHandler, ReadyEvent};
    use parking_lot::Mutex;

    #[derive(Default)]
    struct Recorder(Mutex<Vec<String>>);

    #[async_trait::async_trait]
    impl EventHandler for Recorder {
        async fn ready(&self, _shard_id: u32, ready: ReadyEvent) {
            self.0.lock().push(format!("ready:{}", ready.session_id));
        }
        async fn resumed(&self, _shard_id: u32) {
            self.0.lock().push("resumed".to_string());
        }
        async fn disconnected(&self, _shard_id: u32) {
            self.0.lock().push("disconnected".to_string());
        }
    }

    let mut gateway = MockGateway::start().await?;
    let mut pool = ShardPool::new(gateway_config(&gateway.url()))
        .with_session(0, resumable_session("saved", 3));
    pool.connect_all(TEST_TOKEN);

    let server = async {
        let mut conn = gateway.accept().await?;
        conn.hello(45_000).await?;
        conn.recv().await?;
        assert_eq!(conn.recv().await?.op, OpCode::Resume);
        conn.send(&GatewayMessage::dispatch("RESUMED", 4, json!({})))
            .await?;
        conn.close(1000).await?;
        anyhow::Ok(conn)
    };

    let recorder = Recorder::default();
    let (served, ran) = tokio::join!(server, pool.run_with(&recorder));
    served?;
    ran?;

    assert_eq!(*recorder.0.lock(), vec!["resumed", "disconnected"]);

    let sessions = pool.shutdown().await;
    assert_eq!(sessions[0].session_id.as_deref(), Some("saved"));
    assert_eq!(sessions[0].last_sequence, Some(4));
    Ok(())
}

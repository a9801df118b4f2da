//! Gateway client entry point
//!
//! Run with:
//! ```bash
//! DISCORD_TOKEN=... cargo run -p cord-gateway
//! ```
//!
//! Connects every configured shard and logs the events they receive until
//! interrupted. Configuration is loaded from environment variables.

use async_trait::async_trait;
use cord_common::{try_init_tracing_with_config, ClientConfig, TracingConfig};
use cord_gateway::{
    DispatchEvent, EventHandler, GatewayConfig, GatewayError, ReadyEvent, ReconnectReason,
    ShardPool,
};
use tracing::{error, info, warn};

/// Logs every event
struct LogHandler;

#[async_trait]
impl EventHandler for LogHandler {
    async fn ready(&self, shard_id: u32, ready: ReadyEvent) {
        info!(
            shard_id,
            session_id = %ready.session_id,
            guilds = ready.guilds.len(),
            "Ready"
        );
    }

    async fn resumed(&self, shard_id: u32) {
        info!(shard_id, "Resumed");
    }

    async fn dispatch(&self, shard_id: u32, event: DispatchEvent) {
        info!(shard_id, event = %event.event_type, seq = ?event.sequence, "Event");
    }

    async fn reconnecting(&self, shard_id: u32, resume: bool, reason: ReconnectReason) {
        warn!(shard_id, resume, reason = %reason, "Reconnecting");
    }

    async fn disconnected(&self, shard_id: u32) {
        info!(shard_id, "Disconnected");
    }

    async fn failed(&self, shard_id: u32, error: GatewayError) {
        error!(shard_id, error = %error, "Shard failed");
    }
}

#[tokio::main]
async fn main() {
    if let Err(e) = run().await {
        error!(error = %e, "Gateway client failed");
        std::process::exit(1);
    }
}

async fn run() -> anyhow::Result<()> {
    let config = ClientConfig::from_env()?;

    if let Err(e) = try_init_tracing_with_config(&TracingConfig::for_environment(config.env)) {
        eprintln!("Warning: Failed to initialize tracing: {e}");
    }

    info!(
        env = ?config.env,
        shard_count = config.gateway.shard_count,
        intents = %config.gateway.intents,
        "Configuration loaded"
    );

    let mut pool = ShardPool::new(GatewayConfig::from(&config));
    pool.connect_all(&config.token);

    let shards = pool.shards().to_vec();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            info!("Interrupted, closing shards");
            for shard in &shards {
                shard.close();
            }
        }
    });

    pool.run_with(&LogHandler).await?;
    pool.shutdown().await;

    Ok(())
}

//! Gateway client configuration

use crate::protocol::{IdentifyProperties, PresenceUpdatePayload};
use cord_common::{ClientConfig, GatewaySettings};
use cord_core::Intents;
use std::num::NonZeroU32;

/// Outbound command budget per connection. The server allows 120 per
/// minute in total and heartbeats share that budget.
pub const DEFAULT_COMMANDS_PER_MINUTE: u32 = 110;

/// Settings shared by every shard of a pool
#[derive(Debug, Clone)]
pub struct GatewayConfig {
    /// Gateway host, e.g. `wss://gateway.discord.gg`
    pub url: String,
    pub version: u8,
    pub shard_count: u32,
    pub intents: Intents,
    /// Member count above which a guild's offline members are not sent
    pub large_threshold: u8,
    pub properties: IdentifyProperties,
    /// Presence sent with Identify
    pub presence: Option<PresenceUpdatePayload>,
    pub commands_per_minute: NonZeroU32,
}

impl GatewayConfig {
    /// Config for `url` with one shard and default intents
    pub fn new(url: impl Into<String>) -> Self {
        let defaults = GatewaySettings::default();
        Self {
            url: url.into(),
            version: defaults.version,
            shard_count: defaults.shard_count,
            intents: defaults.intents,
            large_threshold: defaults.large_threshold,
            properties: IdentifyProperties::default(),
            presence: None,
            commands_per_minute: default_commands_per_minute(),
        }
    }

    pub fn from_settings(settings: &GatewaySettings) -> Self {
        Self {
            version: settings.version,
            shard_count: settings.shard_count.max(1),
            intents: settings.intents,
            large_threshold: settings.large_threshold,
            ..Self::new(settings.url.clone())
        }
    }

    #[must_use]
    pub fn with_shard_count(mut self, shard_count: u32) -> Self {
        self.shard_count = shard_count.max(1);
        self
    }

    #[must_use]
    pub fn with_intents(mut self, intents: Intents) -> Self {
        self.intents = intents;
        self
    }

    #[must_use]
    pub fn with_presence(mut self, presence: PresenceUpdatePayload) -> Self {
        self.presence = Some(presence);
        self
    }

    #[must_use]
    pub fn with_commands_per_minute(mut self, commands_per_minute: NonZeroU32) -> Self {
        self.commands_per_minute = commands_per_minute;
        self
    }

    /// Full socket URL for a gateway host
    #[must_use]
    pub fn connect_url(&self, host: &str) -> String {
        format!(
            "{}/?v={}&encoding=json",
            host.trim_end_matches('/'),
            self.version
        )
    }
}

impl From<&ClientConfig> for GatewayConfig {
    fn from(config: &ClientConfig) -> Self {
        Self::from_settings(&config.gateway)
    }
}

fn default_commands_per_minute() -> NonZeroU32 {
    NonZeroU32::new(DEFAULT_COMMANDS_PER_MINUTE).unwrap_or(NonZeroU32::MIN)
}

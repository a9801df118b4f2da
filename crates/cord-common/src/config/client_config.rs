//! Client configuration structs
//!
//! Loads configuration from environment variables (and a `.env` file if present).

use cord_core::Intents;
use serde::Deserialize;
use std::env;

/// Main client configuration
#[derive(Debug, Clone, Deserialize)]
pub struct ClientConfig {
    #[serde(default)]
    pub env: Environment,
    /// Bot token, sent as `Bot <token>` on REST and in Identify/Resume
    pub token: String,
    pub rest: RestSettings,
    pub gateway: GatewaySettings,
}

/// Environment type
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum Environment {
    #[default]
    Development,
    Staging,
    Production,
}

impl Environment {
    #[must_use]
    pub fn is_production(&self) -> bool {
        matches!(self, Self::Production)
    }

    #[must_use]
    pub fn is_development(&self) -> bool {
        matches!(self, Self::Development)
    }

    fn parse(s: &str) -> Option<Self> {
        match s.to_lowercase().as_str() {
            "production" => Some(Self::Production),
            "staging" => Some(Self::Staging),
            "development" => Some(Self::Development),
            _ => None,
        }
    }
}

/// REST API settings
#[derive(Debug, Clone, Deserialize)]
pub struct RestSettings {
    #[serde(default = "default_api_base")]
    pub api_base: String,
    #[serde(default = "default_api_version")]
    pub api_version: u8,
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
    #[serde(default = "default_user_agent")]
    pub user_agent: String,
}

impl RestSettings {
    /// Versioned base URL, e.g. `https://discord.com/api/v10`
    #[must_use]
    pub fn base_url(&self) -> String {
        format!("{}/v{}", self.api_base.trim_end_matches('/'), self.api_version)
    }
}

impl Default for RestSettings {
    fn default() -> Self {
        Self {
            api_base: default_api_base(),
            api_version: default_api_version(),
            timeout_secs: default_timeout_secs(),
            user_agent: default_user_agent(),
        }
    }
}

/// Gateway settings
#[derive(Debug, Clone, Deserialize)]
pub struct GatewaySettings {
    #[serde(default = "default_gateway_url")]
    pub url: String,
    #[serde(default = "default_api_version")]
    pub version: u8,
    #[serde(default = "default_shard_count")]
    pub shard_count: u32,
    #[serde(default)]
    pub intents: Intents,
    #[serde(default = "default_large_threshold")]
    pub large_threshold: u8,
}

impl Default for GatewaySettings {
    fn default() -> Self {
        Self {
            url: default_gateway_url(),
            version: default_api_version(),
            shard_count: default_shard_count(),
            intents: Intents::DEFAULT,
            large_threshold: default_large_threshold(),
        }
    }
}

// Default value functions
fn default_api_base() -> String {
    "https://discord.com/api".to_string()
}

fn default_api_version() -> u8 {
    10
}

fn default_timeout_secs() -> u64 {
    15
}

fn default_user_agent() -> String {
    format!(
        "DiscordBot (https://github.com/cord-rs/cord, {})",
        env!("CARGO_PKG_VERSION")
    )
}

fn default_gateway_url() -> String {
    "wss://gateway.discord.gg".to_string()
}

fn default_shard_count() -> u32 {
    1
}

fn default_large_threshold() -> u8 {
    50
}

impl ClientConfig {
    /// Load configuration from environment variables
    ///
    /// # Errors
    /// Returns an error if required environment variables are missing or malformed
    pub fn from_env() -> Result<Self, ConfigError> {
        // Load .env file if present (ignore errors if not found)
        let _ = dotenvy::dotenv();

        Self::from_lookup(|key| env::var(key).ok())
    }

    /// Load configuration through an arbitrary variable lookup
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let api_version = parse_or(&lookup, "DISCORD_API_VERSION", default_api_version)?;

        let shard_count = parse_or(&lookup, "SHARD_COUNT", default_shard_count)?;
        if shard_count == 0 {
            return Err(ConfigError::InvalidValue(
                "SHARD_COUNT",
                "must be at least 1".to_string(),
            ));
        }

        let intents = match lookup("GATEWAY_INTENTS") {
            Some(raw) => Intents::parse(&raw)
                .map_err(|e| ConfigError::InvalidValue("GATEWAY_INTENTS", e.to_string()))?,
            None => Intents::DEFAULT,
        };

        Ok(Self {
            env: lookup("APP_ENV")
                .and_then(|s| Environment::parse(&s))
                .unwrap_or_default(),
            token: lookup("DISCORD_TOKEN")
                .filter(|t| !t.trim().is_empty())
                .ok_or(ConfigError::MissingVar("DISCORD_TOKEN"))?,
            rest: RestSettings {
                api_base: lookup("DISCORD_API_BASE").unwrap_or_else(default_api_base),
                api_version,
                timeout_secs: parse_or(&lookup, "HTTP_TIMEOUT_SECS", default_timeout_secs)?,
                user_agent: lookup("DISCORD_USER_AGENT").unwrap_or_else(default_user_agent),
            },
            gateway: GatewaySettings {
                url: lookup("DISCORD_GATEWAY_URL").unwrap_or_else(default_gateway_url),
                version: api_version,
                shard_count,
                intents,
                large_threshold: parse_or(&lookup, "LARGE_THRESHOLD", default_large_threshold)?,
            },
        })
    }
}

fn parse_or<F, T>(lookup: &F, key: &'static str, default: fn() -> T) -> Result<T, ConfigError>
where
    F: Fn(&str) -> Option<String>,
    T: std::str::FromStr,
    T::Err: std::fmt::Display,
{
    match lookup(key) {
        Some(raw) => raw
            .trim()
            .parse()
            .map_err(|e: T::Err| ConfigError::InvalidValue(key, e.to_string())),
        None => Ok(default()),
    }
}

/// Configuration errors
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Missing required environment variable: {0}")]
    MissingVar(&'static str),

    #[error("Invalid value for {0}: {1}")]
    InvalidValue(&'static str, String),
}

//! Configuration management.

use serde::Deserialize;

/// Main application configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    /// Server configuration
    #[serde(default)]
    pub server: ServerConfig,

    /// Database configuration
    pub database: DatabaseConfig,

    /// Redis configuration
    #[serde(default)]
    pub redis: RedisConfig,

    /// Inbound event queue names
    #[serde(default)]
    pub queues: QueueConfig,

    /// Broadcast configuration
    #[serde(default)]
    pub broadcast: BroadcastConfig,

    /// Observability configuration
    #[serde(default)]
    pub observability: ObservabilityConfig,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ServerConfig {
    /// HTTP server host
    #[serde(default = "default_host")]
    pub host: String,

    /// HTTP server port
    #[serde(default = "default_port")]
    pub port: u16,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct DatabaseConfig {
    /// PostgreSQL connection URL
    pub url: String,

    /// Maximum number of connections
    #[serde(default = "default_max_connections")]
    pub max_connections: u32,

    /// Minimum number of connections
    #[serde(default = "default_min_connections")]
    pub min_connections: u32,
}

#[derive(Debug, Clone, Deserialize)]
pub struct RedisConfig {
    /// Redis connection URL
    #[serde(default = "default_redis_url")]
    pub url: String,
}

impl Default for RedisConfig {
    fn default() -> Self {
        Self {
            url: default_redis_url(),
        }
    }
}

/// Names of the Redis lists each upstream event kind is consumed from.
#[derive(Debug, Clone, Deserialize)]
pub struct QueueConfig {
    #[serde(default = "default_programme_membership_queue")]
    pub programme_membership_synced: String,

    #[serde(default = "default_placement_queue")]
    pub placement_synced: String,

    #[serde(default = "default_coj_queue")]
    pub coj_received: String,

    #[serde(default = "default_account_queue")]
    pub account_confirmed: String,

    #[serde(default = "default_form_queue")]
    pub form_updated: String,

    /// Rejected payloads are pushed here for inspection and redelivery.
    #[serde(default = "default_dead_letter_queue")]
    pub dead_letter: String,

    /// Seconds a blocking pop waits before re-polling.
    #[serde(default = "default_poll_timeout")]
    pub poll_timeout_secs: u64,
}

impl Default for QueueConfig {
    fn default() -> Self {
        Self {
            programme_membership_synced: default_programme_membership_queue(),
            placement_synced: default_placement_queue(),
            coj_received: default_coj_queue(),
            account_confirmed: default_account_queue(),
            form_updated: default_form_queue(),
            dead_letter: default_dead_letter_queue(),
            poll_timeout_secs: default_poll_timeout(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct BroadcastConfig {
    /// Channel action snapshots and tombstones are published to.
    #[serde(default = "default_broadcast_channel")]
    pub channel: String,
}

impl Default for BroadcastConfig {
    fn default() -> Self {
        Self {
            channel: default_broadcast_channel(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct ObservabilityConfig {
    /// Log level
    #[serde(default = "default_log_level")]
    pub log_level: String,

    /// Enable JSON logging
    #[serde(default)]
    pub json_logging: bool,
}

impl Default for ObservabilityConfig {
    fn default() -> Self {
        Self {
            log_level: default_log_level(),
            json_logging: false,
        }
    }
}

impl Config {
    /// Load configuration from environment and config files.
    pub fn load() -> anyhow::Result<Self> {
        let config = config::Config::builder()
            .add_source(config::File::with_name("config/default").required(false))
            .add_source(config::Environment::with_prefix("ACTIONS").separator("__"))
            .build()?;

        let cfg: Config = config.try_deserialize()?;
        Ok(cfg)
    }

    /// Load from a specific file path.
    pub fn from_file(path: &str) -> anyhow::Result<Self> {
        let config = config::Config::builder()
            .add_source(config::File::with_name(path))
            .add_source(config::Environment::with_prefix("ACTIONS").separator("__"))
            .build()?;

        let cfg: Config = config.try_deserialize()?;
        Ok(cfg)
    }
}

fn default_host() -> String {
    "0.0.0.0".to_string()
}

fn default_port() -> u16 {
    8080
}

fn default_max_connections() -> u32 {
    20
}

fn default_min_connections() -> u32 {
    5
}

fn default_redis_url() -> String {
    "redis://localhost:6379".to_string()
}

fn default_programme_membership_queue() -> String {
    "actions:queue:programme-membership-synced".to_string()
}

fn default_placement_queue() -> String {
    "actions:queue:placement-synced".to_string()
}

fn default_coj_queue() -> String {
    "actions:queue:coj-received".to_string()
}

fn default_account_queue() -> String {
    "actions:queue:account-confirmed".to_string()
}

fn default_form_queue() -> String {
    "actions:queue:form-updated".to_string()
}

fn default_dead_letter_queue() -> String {
    "actions:queue:dead-letter".to_string()
}

fn default_poll_timeout() -> u64 {
    5
}

fn default_broadcast_channel() -> String {
    "actions:broadcast".to_string()
}

fn default_log_level() -> String {
    "info".to_string()
}

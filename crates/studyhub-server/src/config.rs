//! Server configuration.
//!
//! Configuration is layered, later sources win:
//! - Built-in defaults
//! - TOML file (`$STUDYHUB_CONFIG`, `studyhub.toml`, `/etc/studyhub/studyhub.toml`,
//!   `~/.config/studyhub/studyhub.toml`; the first one found)
//! - Environment variables (`STUDYHUB_PORT`, `STUDYHUB_AUTH__JWT_SECRET`, ...)

use anyhow::{bail, Context, Result};
use serde::{Deserialize, Serialize};
use std::net::SocketAddr;
use std::path::{Path, PathBuf};

/// JWT secrets that ship in defaults and docs. Anyone can sign tokens with them.
const PLACEHOLDER_SECRETS: &[&str] = &["dev-secret-change-me", "change-me-to-a-random-string"];

const CONFIG_PATHS: [&str; 3] = [
    "studyhub.toml",
    "/etc/studyhub/studyhub.toml",
    "~/.config/studyhub/studyhub.toml",
];

/// Server configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// Host to bind to.
    #[serde(default = "default_host")]
    pub host: String,

    /// Port to listen on.
    #[serde(default = "default_port")]
    pub port: u16,

    #[serde(default)]
    pub transport: TransportConfig,

    #[serde(default)]
    pub limits: LimitsConfig,

    #[serde(default)]
    pub heartbeat: HeartbeatConfig,

    #[serde(default)]
    pub metrics: MetricsConfig,

    #[serde(default)]
    pub auth: AuthConfig,

    #[serde(default)]
    pub database: DatabaseConfig,
}

/// Transport configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TransportConfig {
    /// Path of the hub WebSocket endpoint.
    #[serde(default = "default_hub_path")]
    pub hub_path: String,
}

/// Resource limits configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LimitsConfig {
    /// Maximum number of open hub connections.
    #[serde(default = "default_max_connections")]
    pub max_connections: usize,

    /// Maximum number of live rooms.
    #[serde(default = "default_max_rooms")]
    pub max_rooms: usize,

    /// Maximum study group rooms held by one connection, unlimited when
    /// unset. The user room is not counted.
    #[serde(default)]
    pub max_subscriptions_per_connection: Option<usize>,

    /// Maximum size of one WebSocket message / frame in bytes.
    #[serde(default = "default_max_message_size")]
    pub max_message_size: usize,

    /// Maximum length of a chat message body, in characters.
    #[serde(default = "default_max_message_length")]
    pub max_message_length: usize,

    /// Broadcast buffer of each room.
    #[serde(default = "default_room_capacity")]
    pub room_capacity: usize,
}

/// Heartbeat configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HeartbeatConfig {
    /// Interval clients should ping at, in milliseconds.
    #[serde(default = "default_heartbeat_interval")]
    pub interval_ms: u64,
}

/// Metrics configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MetricsConfig {
    #[serde(default = "default_true")]
    pub enabled: bool,

    #[serde(default = "default_metrics_port")]
    pub port: u16,
}

/// Authentication configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuthConfig {
    /// HMAC secret the identity provider signs access tokens with.
    #[serde(default = "default_jwt_secret")]
    pub jwt_secret: String,
}

/// Which store backs memberships and direct messages.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StoreBackend {
    Memory,
    Sqlite,
}

/// Database configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DatabaseConfig {
    #[serde(default = "default_backend")]
    pub backend: StoreBackend,

    /// SQLite file, used by the `sqlite` backend.
    #[serde(default = "default_database_path")]
    pub path: String,
}

fn default_host() -> String {
    "127.0.0.1".to_string()
}

fn default_port() -> u16 {
    8080
}

fn default_true() -> bool {
    true
}

fn default_hub_path() -> String {
    "/hub".to_string()
}

fn default_max_connections() -> usize {
    100_000
}

fn default_max_rooms() -> usize {
    100_000
}

fn default_max_message_size() -> usize {
    64 * 1024 // 64 KB
}

fn default_max_message_length() -> usize {
    studyhub_core::MAX_MESSAGE_LENGTH
}

fn default_room_capacity() -> usize {
    1024
}

fn default_heartbeat_interval() -> u64 {
    30_000 // 30 seconds
}

fn default_metrics_port() -> u16 {
    9090
}

fn default_jwt_secret() -> String {
    "dev-secret-change-me".to_string()
}

fn default_backend() -> StoreBackend {
    StoreBackend::Sqlite
}

fn default_database_path() -> String {
    "studyhub.db".to_string()
}

impl Default for Config {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
            transport: TransportConfig::default(),
            limits: LimitsConfig::default(),
            heartbeat: HeartbeatConfig::default(),
            metrics: MetricsConfig::default(),
            auth: AuthConfig::default(),
            database: DatabaseConfig::default(),
        }
    }
}

impl Default for TransportConfig {
    fn default() -> Self {
        Self {
            hub_path: default_hub_path(),
        }
    }
}

impl Default for LimitsConfig {
    fn default() -> Self {
        Self {
            max_connections: default_max_connections(),
            max_rooms: default_max_rooms(),
            max_subscriptions_per_connection: None,
            max_message_size: default_max_message_size(),
            max_message_length: default_max_message_length(),
            room_capacity: default_room_capacity(),
        }
    }
}

impl Default for HeartbeatConfig {
    fn default() -> Self {
        Self {
            interval_ms: default_heartbeat_interval(),
        }
    }
}

impl Default for MetricsConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            port: default_metrics_port(),
        }
    }
}

impl Default for AuthConfig {
    fn default() -> Self {
        Self {
            jwt_secret: default_jwt_secret(),
        }
    }
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            backend: default_backend(),
            path: default_database_path(),
        }
    }
}

impl Config {
    /// Load configuration from the first config file found, then apply
    /// `STUDYHUB_*` environment overrides.
    ///
    /// # Errors
    ///
    /// Returns an error if a config file exists but cannot be parsed, or an
    /// environment override has the wrong type.
    pub fn load() -> Result<Self> {
        let file = Self::find_config_file();
        let mut builder = ::config::Config::builder();

        if let Some(path) = &file {
            tracing::info!("Loading config from {}", path.display());
            builder = builder.add_source(
                ::config::File::from(path.as_path()).format(::config::FileFormat::Toml),
            );
        }

        let settings = builder
            .add_source(
                ::config::Environment::with_prefix("STUDYHUB")
                    .prefix_separator("_")
                    .separator("__")
                    .try_parsing(true),
            )
            .build()
            .context("Failed to assemble configuration")?;

        let config: Config = settings
            .try_deserialize()
            .context("Invalid configuration")?;
        config.validate()?;
        Ok(config)
    }

    /// Reject settings the server must not start with.
    ///
    /// # Errors
    ///
    /// Returns an error when the JWT secret is empty or still a placeholder.
    pub fn validate(&self) -> Result<()> {
        let secret = self.auth.jwt_secret.trim();
        if secret.is_empty() || PLACEHOLDER_SECRETS.contains(&secret) {
            bail!("auth.jwt_secret is unset or still a placeholder; set STUDYHUB_AUTH__JWT_SECRET");
        }
        Ok(())
    }

    fn find_config_file() -> Option<PathBuf> {
        if let Ok(explicit) = std::env::var("STUDYHUB_CONFIG") {
            return Some(PathBuf::from(shellexpand::tilde(&explicit).as_ref()));
        }

        CONFIG_PATHS
            .iter()
            .map(|path| PathBuf::from(shellexpand::tilde(path).as_ref()))
            .find(|path| path.exists())
    }

    /// Load configuration from a specific TOML file, without env overrides.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be read or parsed.
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let contents = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {}", path.display()))?;

        let config: Config = toml::from_str(&contents)
            .with_context(|| format!("Failed to parse config file: {}", path.display()))?;

        Ok(config)
    }

    /// Get the socket address to bind to.
    ///
    /// # Errors
    ///
    /// Returns an error if host and port do not form a socket address.
    pub fn bind_addr(&self) -> Result<SocketAddr> {
        format!("{}:{}", self.host, self.port)
            .parse()
            .with_context(|| format!("Invalid bind address {}:{}", self.host, self.port))
    }
}

//! Configuration management for the bingo server.
//!
//! This module handles loading, validation, and conversion of server configuration
//! from TOML files and command-line arguments.

use bingo_server::{
    config::{DEFAULT_NOTIFICATION_CHANNEL, DEFAULT_OUTBOUND_QUEUE_CAPACITY},
    services::{
        DiscardNotificationSink, InMemoryUserDirectory, JwtCredentialVerifier, LogNotificationSink,
        NotificationSink, ServerServices, UserRecord,
    },
    DuplicateSessionPolicy, GameConfig, ServerConfig,
};
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::sync::Arc;
use tracing::{info, warn};

/// Placeholder secret written into freshly created configuration files.
pub const PLACEHOLDER_JWT_SECRET: &str = "change-me";

fn default_max_connections() -> usize {
    1000
}

fn default_max_message_size() -> usize {
    64 * 1024
}

fn default_outbound_queue_capacity() -> usize {
    DEFAULT_OUTBOUND_QUEUE_CAPACITY
}

fn default_true() -> bool {
    true
}

fn default_channel() -> String {
    DEFAULT_NOTIFICATION_CHANNEL.to_string()
}

/// Application configuration loaded from TOML file.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AppConfig {
    /// Network and session settings
    pub server: ServerSettings,
    /// Card seed and cell texts
    #[serde(default)]
    pub game: GameConfig,
    /// Credential secret and known users
    pub auth: AuthSettings,
    /// Announcement settings
    #[serde(default)]
    pub notifications: NotificationSettings,
    /// Logging configuration settings
    pub logging: LoggingSettings,
}

/// Server-specific configuration settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerSettings {
    /// Network address to bind the server to (e.g., "127.0.0.1:8080")
    pub bind_address: String,
    /// Maximum number of concurrent client connections
    #[serde(default = "default_max_connections")]
    pub max_connections: usize,
    /// Largest accepted inbound text frame, in bytes
    #[serde(default = "default_max_message_size")]
    pub max_message_size: usize,
    /// Frames queued per connection before further ones are dropped
    #[serde(default = "default_outbound_queue_capacity")]
    pub outbound_queue_capacity: usize,
    /// Offer the unverified `fakeAuth` login
    #[serde(default)]
    pub allow_fake_auth: bool,
    /// What to do with a second live session of the same user
    #[serde(default)]
    pub duplicate_sessions: DuplicateSessionPolicy,
    /// Broadcast the unchanged card after an out-of-range update
    #[serde(default = "default_true")]
    pub broadcast_invalid_updates: bool,
}

/// Credential verification settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuthSettings {
    /// HS256 secret shared with the credential issuer
    pub jwt_secret: String,
    /// Token-to-user mapping served by the in-memory directory
    #[serde(default)]
    pub users: Vec<UserRecord>,
}

/// Announcement settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NotificationSettings {
    #[serde(default = "default_true")]
    pub enabled: bool,
    /// Channel named in every announcement
    #[serde(default = "default_channel")]
    pub channel: String,
}

/// Logging configuration settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingSettings {
    /// Log level (trace, debug, info, warn, error)
    pub level: String,
    /// Whether to output logs in JSON format
    #[serde(default)]
    pub json_format: bool,
}

impl Default for ServerSettings {
    fn default() -> Self {
        Self {
            bind_address: "127.0.0.1:8080".to_string(),
            max_connections: default_max_connections(),
            max_message_size: default_max_message_size(),
            outbound_queue_capacity: default_outbound_queue_capacity(),
            allow_fake_auth: false,
            duplicate_sessions: DuplicateSessionPolicy::default(),
            broadcast_invalid_updates: true,
        }
    }
}

impl Default for AuthSettings {
    fn default() -> Self {
        Self {
            jwt_secret: PLACEHOLDER_JWT_SECRET.to_string(),
            users: Vec::new(),
        }
    }
}

impl Default for NotificationSettings {
    fn default() -> Self {
        Self {
            enabled: true,
            channel: default_channel(),
        }
    }
}

impl Default for LoggingSettings {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            json_format: false,
        }
    }
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            server: ServerSettings::default(),
            game: GameConfig::default(),
            auth: AuthSettings::default(),
            notifications: NotificationSettings::default(),
            logging: LoggingSettings::default(),
        }
    }
}

impl AppConfig {
    /// Loads configuration from `path`, writing a default file there first
    /// if it does not exist.
    pub async fn load_from_file(path: &Path) -> Result<Self, Box<dyn std::error::Error>> {
        if path.exists() {
            let content = tokio::fs::read_to_string(path).await?;
            let config: AppConfig = toml::from_str(&content)?;
            Ok(config)
        } else {
            let default_config = AppConfig::default();
            let toml_content = toml::to_string_pretty(&default_config)?;
            tokio::fs::write(path, toml_content).await?;
            info!("Created default configuration file: {}", path.display());
            Ok(default_config)
        }
    }

    /// Converts into the library's server configuration.
    pub fn to_server_config(&self) -> Result<ServerConfig, Box<dyn std::error::Error>> {
        Ok(ServerConfig {
            bind_address: self.server.bind_address.parse()?,
            max_connections: self.server.max_connections,
            max_message_size: self.server.max_message_size,
            outbound_queue_capacity: self.server.outbound_queue_capacity,
            allow_fake_auth: self.server.allow_fake_auth,
            duplicate_sessions: self.server.duplicate_sessions,
            broadcast_invalid_updates: self.server.broadcast_invalid_updates,
            notification_channel: self.notifications.channel.clone(),
            game: self.game.clone(),
        })
    }

    /// Builds the collaborators described by the `auth` and
    /// `notifications` sections.
    pub fn to_services(&self) -> ServerServices {
        let notifier: Arc<dyn NotificationSink> = if self.notifications.enabled {
            Arc::new(LogNotificationSink)
        } else {
            Arc::new(DiscardNotificationSink)
        };

        ServerServices::new(
            Arc::new(JwtCredentialVerifier::new(self.auth.jwt_secret.as_bytes())),
            Arc::new(InMemoryUserDirectory::from_records(self.auth.users.iter().cloned())),
            notifier,
        )
    }

    /// Validates the configuration settings.
    pub fn validate(&self) -> Result<(), String> {
        if self.server.bind_address.parse::<std::net::SocketAddr>().is_err() {
            return Err(format!(
                "Invalid bind address: {}",
                &self.server.bind_address
            ));
        }

        if self.server.max_connections == 0 {
            return Err("server.max_connections must be greater than 0".to_string());
        }

        if self.server.outbound_queue_capacity == 0 {
            return Err("server.outbound_queue_capacity must be greater than 0".to_string());
        }

        if self.game.seed.prefix.is_empty() {
            return Err("game.seed.prefix cannot be empty".to_string());
        }

        if self.auth.jwt_secret.is_empty() {
            return Err("auth.jwt_secret cannot be empty".to_string());
        }
        if self.auth.jwt_secret == PLACEHOLDER_JWT_SECRET {
            warn!("⚠️ auth.jwt_secret is still the placeholder value");
        }

        let valid_levels = ["trace", "debug", "info", "warn", "error"];
        if !valid_levels.contains(&self.logging.level.as_str()) {
            return Err(format!(
                "Invalid log level: {}. Must be one of: {valid_levels:?}",
                &self.logging.level
            ));
        }

        Ok(())
    }
}

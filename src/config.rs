//! Configuration module for relaychat.

use std::path::Path;
use std::time::Duration;

use serde::Deserialize;

use crate::{RelayChatError, Result};

/// Broadcast server configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct ServerConfig {
    /// Host address to bind.
    #[serde(default = "default_host")]
    pub host: String,
    /// Port number to listen on.
    #[serde(default = "default_server_port")]
    pub port: u16,
    /// Number of messages retained per room.
    #[serde(default = "default_history_size")]
    pub history_size: usize,
}

fn default_host() -> String {
    "0.0.0.0".to_string()
}

fn default_server_port() -> u16 {
    8084
}

fn default_history_size() -> usize {
    500
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_server_port(),
            history_size: default_history_size(),
        }
    }
}

/// Chat-side configuration for the relay (the connection back to the
/// broadcast server).
#[derive(Debug, Clone, Deserialize)]
pub struct ChatConfig {
    /// Broadcast server host.
    #[serde(default = "default_chat_host")]
    pub host: String,
    /// Broadcast server port.
    #[serde(default = "default_server_port")]
    pub port: u16,
    /// Display name the relay registers under.
    #[serde(default = "default_chat_nick")]
    pub nick: String,
    /// Room the relay joins and forwards into.
    #[serde(default = "default_chat_room")]
    pub room: String,
    /// Public link to the room, announced on the IRC side.
    #[serde(default)]
    pub room_link: Option<String>,
    /// Seconds between reconnect attempts.
    #[serde(default = "default_reconnect_interval")]
    pub reconnect_interval_secs: u64,
}

fn default_chat_host() -> String {
    "127.0.0.1".to_string()
}

fn default_chat_nick() -> String {
    "ircrelay".to_string()
}

fn default_chat_room() -> String {
    "#relay".to_string()
}

fn default_reconnect_interval() -> u64 {
    10
}

impl ChatConfig {
    /// WebSocket URL of the broadcast server.
    pub fn url(&self) -> String {
        format!("ws://{}:{}", self.host, self.port)
    }

    /// Reconnect interval as a [`Duration`].
    pub fn reconnect_interval(&self) -> Duration {
        Duration::from_secs(self.reconnect_interval_secs)
    }
}

impl Default for ChatConfig {
    fn default() -> Self {
        Self {
            host: default_chat_host(),
            port: default_server_port(),
            nick: default_chat_nick(),
            room: default_chat_room(),
            room_link: None,
            reconnect_interval_secs: default_reconnect_interval(),
        }
    }
}

/// IRC-side configuration for the relay.
#[derive(Debug, Clone, Deserialize)]
pub struct IrcConfig {
    /// IRC server host.
    #[serde(default)]
    pub host: String,
    /// IRC server port.
    #[serde(default = "default_irc_port")]
    pub port: u16,
    /// Connect over TLS.
    #[serde(default = "default_irc_tls")]
    pub tls: bool,
    /// Skip TLS certificate verification (self-signed server certs).
    #[serde(default = "default_irc_tls")]
    pub accept_invalid_certs: bool,
    /// Nickname.
    #[serde(default = "default_irc_nick")]
    pub nick: String,
    /// Username (ident).
    #[serde(default = "default_irc_user")]
    pub user: String,
    /// Real name.
    #[serde(default = "default_irc_real")]
    pub real: String,
    /// Channels to join after registration.
    #[serde(default = "default_irc_channels")]
    pub channels: Vec<String>,
    /// Seconds between reconnect attempts.
    #[serde(default = "default_reconnect_interval")]
    pub reconnect_interval_secs: u64,
    /// Seconds between idle keepalive pings.
    #[serde(default = "default_keepalive_interval")]
    pub keepalive_interval_secs: u64,
}

fn default_irc_port() -> u16 {
    6697
}

fn default_irc_tls() -> bool {
    true
}

fn default_irc_nick() -> String {
    "comicrelay".to_string()
}

fn default_irc_user() -> String {
    "comic".to_string()
}

fn default_irc_real() -> String {
    "relay".to_string()
}

fn default_irc_channels() -> Vec<String> {
    vec!["#".to_string()]
}

fn default_keepalive_interval() -> u64 {
    60
}

impl IrcConfig {
    /// Server address as `host:port`.
    pub fn addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }

    /// Reconnect interval as a [`Duration`].
    pub fn reconnect_interval(&self) -> Duration {
        Duration::from_secs(self.reconnect_interval_secs)
    }

    /// Keepalive interval as a [`Duration`].
    pub fn keepalive_interval(&self) -> Duration {
        Duration::from_secs(self.keepalive_interval_secs)
    }
}

impl Default for IrcConfig {
    fn default() -> Self {
        Self {
            host: String::new(),
            port: default_irc_port(),
            tls: default_irc_tls(),
            accept_invalid_certs: default_irc_tls(),
            nick: default_irc_nick(),
            user: default_irc_user(),
            real: default_irc_real(),
            channels: default_irc_channels(),
            reconnect_interval_secs: default_reconnect_interval(),
            keepalive_interval_secs: default_keepalive_interval(),
        }
    }
}

/// Logging configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct LoggingConfig {
    /// Log level (trace, debug, info, warn, error).
    #[serde(default = "default_log_level")]
    pub level: String,
    /// Optional path to a log file. Console output is always on.
    #[serde(default)]
    pub file: Option<String>,
}

fn default_log_level() -> String {
    "info".to_string()
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            file: None,
        }
    }
}

/// Main configuration structure.
#[derive(Debug, Clone, Deserialize, Default)]
pub struct Config {
    /// Broadcast server configuration.
    #[serde(default)]
    pub server: ServerConfig,
    /// Relay chat-side configuration.
    #[serde(default)]
    pub chat: ChatConfig,
    /// Relay IRC-side configuration.
    #[serde(default)]
    pub irc: IrcConfig,
    /// Logging configuration.
    #[serde(default)]
    pub logging: LoggingConfig,
}

impl Config {
    /// Load configuration from a TOML file.
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let content = std::fs::read_to_string(path.as_ref()).map_err(RelayChatError::Io)?;
        Self::parse(&content)
    }

    /// Parse configuration from a TOML string.
    pub fn parse(s: &str) -> Result<Self> {
        toml::from_str(s).map_err(|e| RelayChatError::Config(format!("config parse error: {e}")))
    }
}

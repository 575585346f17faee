//! Application Configuration Module
//!
//! File-plus-default settings for the IRC/XDCC connection, the HTTP facade,
//! and download behavior.

use serde::{Deserialize, Serialize};
use std::path::Path;

/// Complete application configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AppConfig {
    /// IRC server hostname to dial.
    #[serde(default = "default_irc_host")]
    pub irc_host: String,
    /// IRC server port.
    #[serde(default = "default_irc_port")]
    pub irc_port: u16,
    /// Wrap the IRC connection in TLS.
    #[serde(default)]
    pub use_tls: bool,
    /// TCP connect timeout in seconds.
    #[serde(default = "default_connect_timeout_secs")]
    pub connect_timeout_secs: u64,
    /// Per-attempt registration reply timeout, in milliseconds (§4.2.1).
    #[serde(default = "default_register_try_timeout_ms")]
    pub register_try_timeout_ms: u64,

    /// Accept DCC SEND offers for files that were never requested.
    #[serde(default)]
    pub unsafe_mode: bool,
    /// Directory DCC transfers are written under.
    #[serde(default = "default_download_dir")]
    pub download_dir: String,

    /// Bounded capacity of the IRC engine's outbound packet channel.
    #[serde(default = "default_packet_channel_capacity")]
    pub packet_channel_capacity: usize,

    /// Bind address for the HTTP facade.
    #[serde(default = "default_http_bind")]
    pub http_bind: String,
}

fn default_irc_host() -> String {
    "irc.rizon.net".to_string()
}
fn default_irc_port() -> u16 {
    6667
}
fn default_connect_timeout_secs() -> u64 {
    15
}
fn default_register_try_timeout_ms() -> u64 {
    5000
}
fn default_download_dir() -> String {
    "./downloads".to_string()
}
fn default_packet_channel_capacity() -> usize {
    256
}
fn default_http_bind() -> String {
    "0.0.0.0:3001".to_string()
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            irc_host: default_irc_host(),
            irc_port: default_irc_port(),
            use_tls: false,
            connect_timeout_secs: default_connect_timeout_secs(),
            register_try_timeout_ms: default_register_try_timeout_ms(),
            unsafe_mode: false,
            download_dir: default_download_dir(),
            packet_channel_capacity: default_packet_channel_capacity(),
            http_bind: default_http_bind(),
        }
    }
}

impl AppConfig {
    /// Load config from file, or create default if not exists.
    pub fn load(path: &str) -> Self {
        match std::fs::read_to_string(path) {
            Ok(content) => match serde_json::from_str(&content) {
                Ok(config) => {
                    tracing::info!("Loaded config from {}", path);
                    config
                }
                Err(e) => {
                    tracing::warn!("Failed to parse config {}: {}, using defaults", path, e);
                    Self::default()
                }
            },
            Err(_) => {
                tracing::info!("No config file found at {}, using defaults", path);
                Self::default()
            }
        }
    }

    /// Save config to file.
    pub fn save(&self, path: &str) -> Result<(), std::io::Error> {
        let content = serde_json::to_string_pretty(self)
            .map_err(|e| std::io::Error::new(std::io::ErrorKind::InvalidData, e))?;

        if let Some(parent) = Path::new(path).parent() {
            std::fs::create_dir_all(parent)?;
        }

        std::fs::write(path, content)?;
        tracing::info!("Saved config to {}", path);
        Ok(())
    }
}

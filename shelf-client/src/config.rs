//! Client configuration.

use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use shelf_core::ChannelSettings;

/// Top-level configuration for the client.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct ClientConfig {
    pub network: NetworkConfig,
    pub logging: LoggingConfig,
}

/// Network settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct NetworkConfig {
    /// Server host name or IP.
    pub address: String,
    /// Normal endpoint port.
    pub port: u16,
    /// Control endpoint port.
    pub control_port: u16,
    /// Bound on the connect and on each send or receive, in seconds.
    pub timeout_secs: u64,
}

/// Logging.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Log level.
    pub level: String,
}

// ── Defaults ─────────────────────────────────────────────────────

impl Default for NetworkConfig {
    fn default() -> Self {
        Self {
            address: "127.0.0.1".into(),
            port: shelf_core::server::DEFAULT_PORT,
            control_port: shelf_core::server::DEFAULT_CONTROL_PORT,
            timeout_secs: 20,
        }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "warn".into(),
        }
    }
}

// ── Loading ──────────────────────────────────────────────────────

impl ClientConfig {
    /// Load from a TOML file, falling back to defaults.
    pub fn load(path: &Path) -> Self {
        match std::fs::read_to_string(path) {
            Ok(contents) => toml::from_str(&contents).unwrap_or_else(|e| {
                tracing::warn!("invalid config {}: {e}; using defaults", path.display());
                Self::default()
            }),
            Err(_) => {
                tracing::debug!("no config at {}; using defaults", path.display());
                Self::default()
            }
        }
    }

    /// `host:port` of the endpoint to dial.
    pub fn endpoint(&self, control: bool) -> String {
        let port = if control {
            self.network.control_port
        } else {
            self.network.port
        };
        format!("{}:{port}", self.network.address)
    }

    pub fn channel_settings(&self) -> ChannelSettings {
        ChannelSettings {
            message_timeout: Duration::from_secs(self.network.timeout_secs.max(1)),
            ..ChannelSettings::default()
        }
    }
}

// ── Tests ────────────────────────────────────────────────────────

//! Configuration for the shelf server.

use std::net::{AddrParseError, IpAddr, SocketAddr};
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};
use shelf_core::ServerSettings;
use shelf_core::codec::DEFAULT_MAX_LINE_LENGTH;
use shelf_core::network::{ChannelSettings, DEFAULT_HISTORY_CAPACITY};
use shelf_core::state::DrainSettings;

/// Top-level configuration loaded from a TOML file.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    pub network: NetworkConfig,
    pub storage: StorageConfig,
    pub protocol: ProtocolConfig,
    pub shutdown: ShutdownConfig,
    pub logging: LoggingConfig,
}

/// Network configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct NetworkConfig {
    /// Interface both listeners bind to.
    pub bind_address: String,
    /// TCP port of the normal (data) endpoint.
    pub port: u16,
    /// TCP port of the control endpoint.
    pub control_port: u16,
}

/// Where the served files live.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct StorageConfig {
    /// Directory that command paths are resolved against.
    pub base_dir: PathBuf,
    /// Root directory name; every session starts there.
    pub root: String,
}

/// Wire protocol limits.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ProtocolConfig {
    /// Bound on each individual send or receive.
    pub message_timeout_secs: u64,
    /// Longest accepted incoming line, in bytes.
    pub max_line_length: usize,
    /// Entries kept in the diagnostic message history.
    pub history_capacity: usize,
}

/// Drain and shutdown timing.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ShutdownConfig {
    /// Delay between two drain polls.
    pub poll_interval_ms: u64,
    /// How long to wait for sessions once the listeners have stopped.
    pub grace_ms: u64,
    /// Upper bound on the drain; 0 waits forever.
    pub drain_timeout_secs: u64,
}

/// Logging settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Log level: "trace", "debug", "info", "warn", "error".
    pub level: String,
}

// ── Defaults ─────────────────────────────────────────────────────

impl Default for NetworkConfig {
    fn default() -> Self {
        Self {
            bind_address: "0.0.0.0".into(),
            port: shelf_core::server::DEFAULT_PORT,
            control_port: shelf_core::server::DEFAULT_CONTROL_PORT,
        }
    }
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            base_dir: PathBuf::from("."),
            root: shelf_core::server::DEFAULT_ROOT.into(),
        }
    }
}

impl Default for ProtocolConfig {
    fn default() -> Self {
        Self {
            message_timeout_secs: 20,
            max_line_length: DEFAULT_MAX_LINE_LENGTH,
            history_capacity: DEFAULT_HISTORY_CAPACITY,
        }
    }
}

impl Default for ShutdownConfig {
    fn default() -> Self {
        Self {
            poll_interval_ms: 1000,
            grace_ms: 500,
            drain_timeout_secs: 0,
        }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".into(),
        }
    }
}

// ── Loading ──────────────────────────────────────────────────────

impl ServerConfig {
    /// Load configuration from a TOML file, falling back to defaults.
    pub fn load(path: &Path) -> Self {
        match std::fs::read_to_string(path) {
            Ok(contents) => toml::from_str(&contents).unwrap_or_else(|e| {
                tracing::warn!("invalid config {}: {e}; using defaults", path.display());
                Self::default()
            }),
            Err(_) => {
                tracing::info!("no config at {}; using defaults", path.display());
                Self::default()
            }
        }
    }

    /// Write the default configuration to a file (for bootstrapping).
    pub fn write_default(path: &Path) -> std::io::Result<()> {
        let text = toml::to_string_pretty(&Self::default()).map_err(std::io::Error::other)?;
        std::fs::write(path, text)
    }

    /// Convert into the settings the core server runs with.
    pub fn to_settings(&self) -> Result<ServerSettings, AddrParseError> {
        let ip: IpAddr = self.network.bind_address.parse()?;
        let drain_timeout = match self.shutdown.drain_timeout_secs {
            0 => None,
            secs => Some(Duration::from_secs(secs)),
        };

        Ok(ServerSettings {
            normal_addr: SocketAddr::new(ip, self.network.port),
            control_addr: SocketAddr::new(ip, self.network.control_port),
            root: self.storage.root.clone(),
            channel: ChannelSettings {
                message_timeout: Duration::from_secs(self.protocol.message_timeout_secs.max(1)),
                max_line_length: self.protocol.max_line_length.max(1),
            },
            drain: DrainSettings {
                poll_interval: Duration::from_millis(self.shutdown.poll_interval_ms.max(1)),
                timeout: drain_timeout,
            },
            grace: Duration::from_millis(self.shutdown.grace_ms),
            history_capacity: self.protocol.history_capacity,
        })
    }
}

// ── Tests ────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config_serializes() {
        let text = toml::to_string_pretty(&ServerConfig::default()).unwrap();
        assert!(text.contains("control_port"));
        assert!(text.contains("message_timeout_secs"));
        assert!(text.contains("drain_timeout_secs"));
    }

    #[test]
    fn partial_file_keeps_other_defaults() {
        let cfg: ServerConfig = toml::from_str(
            r#"
            [network]
            port = 4000

            [shutdown]
            drain_timeout_secs = 30
            "#,
        )
        .unwrap();
        assert_eq!(cfg.network.port, 4000);
        assert_eq!(cfg.network.control_port, 3334);
        assert_eq!(cfg.storage.root, "Docs");

        let settings = cfg.to_settings().unwrap();
        assert_eq!(settings.normal_addr.port(), 4000);
        assert_eq!(settings.drain.timeout, Some(Duration::from_secs(30)));
    }

    #[test]
    fn zero_drain_timeout_means_unbounded() {
        let settings = ServerConfig::default().to_settings().unwrap();
        assert_eq!(settings.drain.timeout, None);
        assert_eq!(settings.drain.poll_interval, Duration::from_secs(1));
        assert_eq!(settings.channel.message_timeout, Duration::from_secs(20));
    }

    #[test]
    fn bad_bind_address_is_rejected() {
        let mut cfg = ServerConfig::default();
        cfg.network.bind_address = "not-an-ip".into();
        assert!(cfg.to_settings().is_err());
    }

    #[test]
    fn missing_or_invalid_file_falls_back() {
        let dir = tempfile::tempdir().unwrap();
        let missing = dir.path().join("absent.toml");
        assert_eq!(ServerConfig::load(&missing).network.port, 3333);

        let broken = dir.path().join("broken.toml");
        std::fs::write(&broken, "[network\nport = ").unwrap();
        assert_eq!(ServerConfig::load(&broken).network.port, 3333);

        let written = dir.path().join("shelf.toml");
        ServerConfig::write_default(&written).unwrap();
        assert_eq!(ServerConfig::load(&written).protocol.history_capacity, 256);
    }
}

//! Configuration file management.

use std::path::PathBuf;

use anyhow::Context;
use serde::{Deserialize, Serialize};
use sharefair_types::{AccountId, Amount};

/// Complete daemon configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct DaemonConfig {
    /// Ledger settings.
    #[serde(default)]
    pub ledger: LedgerConfig,
    /// Storage settings.
    #[serde(default)]
    pub storage: StorageConfig,
    /// JSON-RPC settings.
    #[serde(default)]
    pub rpc: RpcConfig,
    /// Advanced settings.
    #[serde(default)]
    pub advanced: AdvancedConfig,
}

/// Ledger configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LedgerConfig {
    /// Length of one time-index in seconds.
    #[serde(default = "default_time_slot_secs")]
    pub time_slot_secs: u64,
    /// Hex account receiving the genesis issuance. Empty = no issuance.
    #[serde(default)]
    pub issuer: String,
    /// Genesis share supply as a decimal string.
    #[serde(default = "default_initial_supply")]
    pub initial_supply: String,
}

/// Storage configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct StorageConfig {
    /// Data directory. Empty = platform default.
    #[serde(default)]
    pub data_dir: String,
}

/// JSON-RPC configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RpcConfig {
    /// Socket file name inside the data directory.
    #[serde(default = "default_socket_name")]
    pub socket_name: String,
}

/// Advanced configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AdvancedConfig {
    /// Log level: "trace" | "debug" | "info" | "warn" | "error".
    #[serde(default = "default_log_level")]
    pub log_level: String,
    /// Event bus buffer per subscriber.
    #[serde(default = "default_event_buffer")]
    pub event_buffer: usize,
}

// Default value functions

fn default_time_slot_secs() -> u64 {
    1
}

fn default_initial_supply() -> String {
    "0".to_string()
}

fn default_socket_name() -> String {
    "sharefair.sock".to_string()
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_event_buffer() -> usize {
    1000
}

impl Default for LedgerConfig {
    fn default() -> Self {
        Self {
            time_slot_secs: default_time_slot_secs(),
            issuer: String::new(),
            initial_supply: default_initial_supply(),
        }
    }
}

impl Default for RpcConfig {
    fn default() -> Self {
        Self {
            socket_name: default_socket_name(),
        }
    }
}

impl Default for AdvancedConfig {
    fn default() -> Self {
        Self {
            log_level: default_log_level(),
            event_buffer: default_event_buffer(),
        }
    }
}

impl LedgerConfig {
    /// The genesis issuer, if one is configured.
    pub fn issuer(&self) -> anyhow::Result<Option<AccountId>> {
        if self.issuer.is_empty() {
            return Ok(None);
        }
        let account = self
            .issuer
            .parse()
            .with_context(|| format!("invalid ledger.issuer {:?}", self.issuer))?;
        Ok(Some(account))
    }

    /// The genesis share supply.
    pub fn initial_supply(&self) -> anyhow::Result<Amount> {
        self.initial_supply
            .parse()
            .with_context(|| format!("invalid ledger.initial_supply {:?}", self.initial_supply))
    }
}

impl DaemonConfig {
    /// Load configuration from the default config file location.
    ///
    /// Falls back to defaults if file does not exist.
    pub fn load() -> anyhow::Result<Self> {
        let config_path = Self::config_path();
        if config_path.exists() {
            let content = std::fs::read_to_string(&config_path)?;
            let config: DaemonConfig = toml::from_str(&content)
                .with_context(|| format!("parsing {}", config_path.display()))?;
            Ok(config)
        } else {
            Ok(Self::default())
        }
    }

    /// Get the data directory path.
    pub fn data_dir(&self) -> PathBuf {
        if self.storage.data_dir.is_empty() {
            Self::default_data_dir()
        } else {
            PathBuf::from(&self.storage.data_dir)
        }
    }

    /// Get the socket path.
    pub fn socket_path(&self) -> PathBuf {
        self.data_dir().join(&self.rpc.socket_name)
    }

    /// Get the config file path.
    fn config_path() -> PathBuf {
        Self::default_data_dir().join("config.toml")
    }

    /// Default data directory, overridable through `SHAREFAIR_DATA_DIR`.
    fn default_data_dir() -> PathBuf {
        if let Ok(dir) = std::env::var("SHAREFAIR_DATA_DIR") {
            return PathBuf::from(dir);
        }
        std::env::var("HOME")
            .map(|h| PathBuf::from(h).join(".sharefair"))
            .unwrap_or_else(|_| PathBuf::from("/tmp/sharefair"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = DaemonConfig::default();
        assert_eq!(config.ledger.time_slot_secs, 1);
        assert_eq!(config.ledger.initial_supply().expect("supply"), 0);
        assert!(config.ledger.issuer().expect("issuer").is_none());
        assert_eq!(config.rpc.socket_name, "sharefair.sock");
        assert_eq!(config.advanced.event_buffer, 1000);
    }

    #[test]
    fn test_config_serialization() {
        let config = DaemonConfig::default();
        let toml_str = toml::to_string(&config).expect("serialize");
        let _parsed: DaemonConfig = toml::from_str(&toml_str).expect("parse");
    }

    #[test]
    fn test_partial_config() {
        let config: DaemonConfig = toml::from_str(
            r#"
            [ledger]
            time_slot_secs = 60
            issuer = "0x0101010101010101010101010101010101010101010101010101010101010101"
            initial_supply = "1000000000000000000000000"

            [rpc]
            socket_name = "ledger.sock"
            "#,
        )
        .expect("parse");

        assert_eq!(config.ledger.time_slot_secs, 60);
        assert_eq!(
            config.ledger.issuer().expect("issuer"),
            Some(AccountId::new([1; 32]))
        );
        assert_eq!(
            config.ledger.initial_supply().expect("supply"),
            1_000_000 * 1_000_000_000_000_000_000
        );
        assert_eq!(config.rpc.socket_name, "ledger.sock");
        assert_eq!(config.advanced.log_level, "info");
    }

    #[test]
    fn test_bad_values_rejected() {
        let config = LedgerConfig {
            time_slot_secs: 1,
            issuer: "zz".to_string(),
            initial_supply: "-5".to_string(),
        };
        assert!(config.issuer().is_err());
        assert!(config.initial_supply().is_err());
    }
}

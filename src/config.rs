//! Service configuration
//!
//! TOML file (path from `SOLVENCY_CONFIG_PATH`, default `solvency.toml`),
//! then `SOLVENCY_*` environment overrides, then CLI flags in the binary.

use crate::address::Principal;
use crate::alert::AlertThresholds;
use crate::history::HistoryConfig;
use crate::ledger::LedgerConfig;
use anyhow::{anyhow, Context, Result};
use serde::{Deserialize, Serialize};
use std::net::SocketAddr;
use std::path::{Path, PathBuf};

pub const CONFIG_PATH_ENV: &str = "SOLVENCY_CONFIG_PATH";
pub const DEFAULT_CONFIG_PATH: &str = "solvency.toml";

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AppConfig {
    #[serde(default)]
    pub ledger: LedgerSection,

    #[serde(default)]
    pub history: HistoryConfig,

    /// Risk band floors in basis points
    #[serde(default)]
    pub alerts: AlertThresholds,

    #[serde(default)]
    pub server: ServerConfig,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct LedgerSection {
    /// Principal holding the owner capability. Required.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub owner: Option<Principal>,

    /// Valuation sources granted at startup, besides the owner.
    #[serde(default)]
    pub oracles: Vec<Principal>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    #[serde(default = "default_bind_addr")]
    pub bind_addr: String,

    /// Ledger export written on shutdown and restored at startup
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub export_path: Option<PathBuf>,
}

fn default_bind_addr() -> String {
    "0.0.0.0:8080".to_string()
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind_addr: default_bind_addr(),
            export_path: None,
        }
    }
}

impl ServerConfig {
    pub fn socket_addr(&self) -> Result<SocketAddr> {
        self.bind_addr
            .parse()
            .with_context(|| format!("Invalid bind address: {}", self.bind_addr))
    }
}

impl AppConfig {
    /// Load from TOML file
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let contents = std::fs::read_to_string(path)?;
        let config: Self = toml::from_str(&contents)?;
        Ok(config)
    }

    /// Load from `SOLVENCY_CONFIG_PATH` (or the default path), then apply
    /// environment overrides.
    pub fn from_env() -> Result<Self> {
        let path =
            std::env::var(CONFIG_PATH_ENV).unwrap_or_else(|_| DEFAULT_CONFIG_PATH.to_string());
        Self::load_layered(&path)
    }

    /// Load `path` if it exists, defaults otherwise, then apply environment
    /// overrides.
    pub fn load_layered(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let mut config = if path.exists() {
            Self::load(path).with_context(|| format!("Failed to load config {}", path.display()))?
        } else {
            tracing::debug!("Config file {} not found, using defaults", path.display());
            Self::default()
        };
        config.apply_overrides(|key| std::env::var(key).ok())?;
        Ok(config)
    }

    /// Apply `SOLVENCY_*` overrides from `lookup`.
    pub fn apply_overrides(&mut self, lookup: impl Fn(&str) -> Option<String>) -> Result<()> {
        if let Some(owner) = lookup("SOLVENCY_OWNER") {
            self.ledger.owner = Some(
                owner
                    .parse()
                    .with_context(|| format!("Invalid SOLVENCY_OWNER: {}", owner))?,
            );
        }
        if let Some(addr) = lookup("SOLVENCY_BIND_ADDR") {
            self.server.bind_addr = addr;
        }
        if let Some(path) = lookup("SOLVENCY_EXPORT_PATH") {
            self.server.export_path = Some(PathBuf::from(path));
        }
        if let Some(max) = lookup("SOLVENCY_HISTORY_MAX_ENTRIES") {
            self.history.max_entries = max
                .parse()
                .context("Invalid SOLVENCY_HISTORY_MAX_ENTRIES")?;
        }
        if let Some(secs) = lookup("SOLVENCY_HISTORY_MIN_INTERVAL_SECS") {
            self.history.min_interval_secs = secs
                .parse()
                .context("Invalid SOLVENCY_HISTORY_MIN_INTERVAL_SECS")?;
        }
        Ok(())
    }

    pub fn validate(&self) -> Result<()> {
        self.history
            .validate()
            .map_err(|e| anyhow!("[history] {}", e))?;
        self.alerts.validate().map_err(|e| anyhow!("[alerts] {}", e))?;
        self.server.socket_addr()?;
        Ok(())
    }

    pub fn ledger_config(&self) -> Result<LedgerConfig> {
        let owner = self
            .ledger
            .owner
            .ok_or_else(|| anyhow!("No ledger owner configured (set [ledger].owner or SOLVENCY_OWNER)"))?;
        Ok(LedgerConfig {
            owner,
            history: self.history,
            alerts: self.alerts,
        })
    }

    /// Save to TOML file
    pub fn save(&self, path: impl AsRef<Path>) -> Result<()> {
        let contents = toml::to_string_pretty(self)?;
        std::fs::write(path, contents)?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::address::Address;
    use std::collections::HashMap;

    #[test]
    fn test_defaults() {
        let config: AppConfig = toml::from_str("").unwrap();
        assert_eq!(config.history.max_entries, 1_000);
        assert_eq!(config.history.min_interval_secs, 3_600);
        assert_eq!(config.alerts, AlertThresholds::default());
        assert_eq!(config.server.bind_addr, "0.0.0.0:8080");
        assert!(config.ledger.owner.is_none());
        assert!(config.ledger_config().is_err());
    }

    #[test]
    fn test_parse_sections() {
        let toml = r#"
            [ledger]
            owner = "0x00000000000000000000000000000000000000aa"
            oracles = ["0x00000000000000000000000000000000000000bb"]

            [history]
            max_entries = 10

            [alerts]
            healthy_bps = 14000

            [server]
            bind_addr = "127.0.0.1:9000"
            export_path = "ledger.json"
        "#;
        let config: AppConfig = toml::from_str(toml).unwrap();
        config.validate().unwrap();

        let ledger = config.ledger_config().unwrap();
        assert_eq!(ledger.owner, Address::from_low_u64(0xaa));
        assert_eq!(ledger.history.max_entries, 10);
        assert_eq!(ledger.history.min_interval_secs, 3_600);
        assert_eq!(ledger.alerts.healthy_bps, 14_000);
        assert_eq!(ledger.alerts.warning_bps, 12_000);
        assert_eq!(config.ledger.oracles, vec![Address::from_low_u64(0xbb)]);
        assert_eq!(config.server.export_path, Some(PathBuf::from("ledger.json")));
    }

    #[test]
    fn test_env_overrides() {
        let vars: HashMap<&str, &str> = [
            ("SOLVENCY_OWNER", "0x0000000000000000000000000000000000000001"),
            ("SOLVENCY_HISTORY_MAX_ENTRIES", "5"),
            ("SOLVENCY_BIND_ADDR", "127.0.0.1:7000"),
        ]
        .into_iter()
        .collect();

        let mut config = AppConfig::default();
        config
            .apply_overrides(|k| vars.get(k).map(|v| v.to_string()))
            .unwrap();
        assert_eq!(config.ledger.owner, Some(Address::from_low_u64(1)));
        assert_eq!(config.history.max_entries, 5);
        assert_eq!(config.server.socket_addr().unwrap().port(), 7000);

        let mut bad = AppConfig::default();
        assert!(bad
            .apply_overrides(|k| (k == "SOLVENCY_HISTORY_MAX_ENTRIES").then(|| "lots".to_string()))
            .is_err());
    }

    #[test]
    fn test_validate_rejects_bad_values() {
        let mut config = AppConfig::default();
        config.history.max_entries = 0;
        assert!(config.validate().is_err());

        let mut config = AppConfig::default();
        config.alerts.warning_bps = config.alerts.healthy_bps;
        assert!(config.validate().is_err());

        let mut config = AppConfig::default();
        config.server.bind_addr = "nowhere".to_string();
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_save_and_load() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("solvency.toml");
        let mut config = AppConfig::default();
        config.ledger.owner = Some(Address::from_low_u64(9));
        config.save(&path).unwrap();

        let loaded = AppConfig::load(&path).unwrap();
        assert_eq!(loaded.ledger.owner, config.ledger.owner);
        assert_eq!(loaded.history, config.history);
    }
}

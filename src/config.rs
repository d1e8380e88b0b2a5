use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct Config {
    #[serde(default)]
    pub server: ServerConfig,
    #[serde(default)]
    pub relay: RelaySettings,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    #[serde(default = "default_bind_address")]
    pub bind_address: String,
}

/// Timing and capacity knobs of the relay core.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RelaySettings {
    /// How long an undrained message queue may sit before it is expired.
    #[serde(default = "default_expire_timeout_ms")]
    pub expire_timeout_ms: u64,
    /// Heartbeat silence after which a client is considered dead.
    #[serde(default = "default_alive_timeout_ms")]
    pub alive_timeout_ms: u64,
    /// Maximum simultaneously registered clients.
    #[serde(default = "default_concurrent_limit")]
    pub concurrent_limit: usize,
    /// Expiry sweeper tick interval.
    #[serde(default = "default_cleanup_out_msgs_ms")]
    pub cleanup_out_msgs_ms: u64,
    /// Liveness sweeper tick interval.
    #[serde(default = "default_check_interval_ms")]
    pub check_interval_ms: u64,
}

fn default_bind_address() -> String {
    "127.0.0.1:9000".to_string()
}

fn default_expire_timeout_ms() -> u64 {
    5000
}

fn default_alive_timeout_ms() -> u64 {
    90_000
}

fn default_concurrent_limit() -> usize {
    5000
}

fn default_cleanup_out_msgs_ms() -> u64 {
    1000
}

fn default_check_interval_ms() -> u64 {
    300
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self { bind_address: default_bind_address() }
    }
}

impl Default for RelaySettings {
    fn default() -> Self {
        Self {
            expire_timeout_ms: default_expire_timeout_ms(),
            alive_timeout_ms: default_alive_timeout_ms(),
            concurrent_limit: default_concurrent_limit(),
            cleanup_out_msgs_ms: default_cleanup_out_msgs_ms(),
            check_interval_ms: default_check_interval_ms(),
        }
    }
}

impl RelaySettings {
    pub fn expire_timeout(&self) -> Duration {
        Duration::from_millis(self.expire_timeout_ms)
    }

    pub fn alive_timeout(&self) -> Duration {
        Duration::from_millis(self.alive_timeout_ms)
    }

    pub fn cleanup_interval(&self) -> Duration {
        Duration::from_millis(self.cleanup_out_msgs_ms)
    }

    pub fn check_interval(&self) -> Duration {
        Duration::from_millis(self.check_interval_ms)
    }
}

impl Config {
    /// Load config from the default path, or create it with defaults.
    pub fn load() -> Result<Self> {
        let config_path = get_config_path();

        if config_path.exists() {
            Self::load_from(&config_path)
        } else {
            let config = Config::default();
            config.save()?;
            Ok(config)
        }
    }

    pub fn load_from(path: &Path) -> Result<Self> {
        let content = fs::read_to_string(path).context("Failed to read config file")?;
        toml::from_str(&content).context("Failed to parse config file")
    }

    /// Save config to the default path.
    pub fn save(&self) -> Result<()> {
        self.save_to(&get_config_path())
    }

    pub fn save_to(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }

        let content = toml::to_string_pretty(self)?;
        fs::write(path, content)?;

        Ok(())
    }
}

/// Get the parley directory (~/.parley)
pub fn get_parley_dir() -> PathBuf {
    dirs::home_dir().unwrap_or_else(|| PathBuf::from(".")).join(".parley")
}

/// Get the config file path (~/.parley/config.toml)
pub fn get_config_path() -> PathBuf {
    get_parley_dir().join("config.toml")
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_config_default() {
        let config = Config::default();
        assert_eq!(config.server.bind_address, "127.0.0.1:9000");
        assert_eq!(config.relay.expire_timeout_ms, 5000);
        assert_eq!(config.relay.alive_timeout_ms, 90_000);
        assert_eq!(config.relay.concurrent_limit, 5000);
        assert_eq!(config.relay.cleanup_out_msgs_ms, 1000);
        assert_eq!(config.relay.check_interval_ms, 300);
    }

    #[test]
    fn test_partial_file_falls_back_to_defaults() {
        let parsed: Config = toml::from_str(
            r#"
            [relay]
            concurrent_limit = 12
            "#,
        )
        .unwrap();
        assert_eq!(parsed.relay.concurrent_limit, 12);
        assert_eq!(parsed.relay.expire_timeout_ms, 5000);
        assert_eq!(parsed.server.bind_address, "127.0.0.1:9000");
    }

    #[test]
    fn test_save_and_reload() -> Result<()> {
        let temp_dir = TempDir::new()?;
        let path = temp_dir.path().join("config.toml");

        let mut config = Config::default();
        config.relay.alive_timeout_ms = 1234;
        config.save_to(&path)?;

        let reloaded = Config::load_from(&path)?;
        assert_eq!(reloaded.relay.alive_timeout_ms, 1234);
        Ok(())
    }

    #[test]
    fn test_duration_helpers() {
        let settings = RelaySettings::default();
        assert_eq!(settings.expire_timeout(), Duration::from_secs(5));
        assert_eq!(settings.check_interval(), Duration::from_millis(300));
    }
}

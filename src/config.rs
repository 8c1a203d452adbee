//! Configuration loading and management.

use serde::Deserialize;
use std::path::Path;
use std::time::Duration;
use thiserror::Error;

/// Configuration errors.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config file: {0}")]
    Io(#[from] std::io::Error),
    #[error("failed to parse config: {0}")]
    Parse(#[from] toml::de::Error),
}

/// Daemon configuration.
#[derive(Debug, Clone, Deserialize, Default)]
pub struct Config {
    /// Server identity and observability.
    #[serde(default)]
    pub server: ServerConfig,
    /// Coordination store backend.
    #[serde(default)]
    pub store: StoreConfig,
    /// Matchmaking engine tuning.
    #[serde(default)]
    pub matchmaker: MatchmakerConfig,
    /// Session behavior.
    #[serde(default)]
    pub session: SessionConfig,
}

impl Config {
    /// Load configuration from a TOML file.
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path)?;
        let config: Config = toml::from_str(&content)?;
        Ok(config)
    }
}

/// Server identity configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct ServerConfig {
    /// Instance name, used in logs only.
    #[serde(default = "default_server_name")]
    pub name: String,
    /// Prometheus metrics port. Convention: 0 disables the HTTP endpoint
    /// (used by tests).
    pub metrics_port: Option<u16>,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            name: default_server_name(),
            metrics_port: None,
        }
    }
}

fn default_server_name() -> String {
    "stranger.local".to_string()
}

/// Coordination store configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct StoreConfig {
    /// Backend: "memory" (single process) or "redis" (shared across
    /// processes). Anything else is a startup error.
    #[serde(default = "default_store_backend")]
    pub backend: String,
    /// Connection URL for the redis backend.
    #[serde(default = "default_store_url")]
    pub url: String,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            backend: default_store_backend(),
            url: default_store_url(),
        }
    }
}

fn default_store_backend() -> String {
    "memory".to_string()
}

fn default_store_url() -> String {
    "redis://127.0.0.1:6379".to_string()
}

/// Matchmaking engine configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct MatchmakerConfig {
    /// Engine instances to run in this process. One is enough; more only
    /// exercise lock contention.
    #[serde(default = "default_engines")]
    pub engines: usize,
    /// Match lock lease duration in milliseconds.
    #[serde(default = "default_lock_ttl_ms")]
    pub lock_ttl_ms: u64,
    /// Interval between lock acquisition attempts in milliseconds.
    #[serde(default = "default_lock_retry_ms")]
    pub lock_retry_ms: u64,
}

impl MatchmakerConfig {
    /// Lock lease duration.
    pub fn lock_ttl(&self) -> Duration {
        Duration::from_millis(self.lock_ttl_ms)
    }

    /// Lock acquisition polling interval.
    pub fn lock_retry(&self) -> Duration {
        Duration::from_millis(self.lock_retry_ms)
    }
}

impl Default for MatchmakerConfig {
    fn default() -> Self {
        Self {
            engines: default_engines(),
            lock_ttl_ms: default_lock_ttl_ms(),
            lock_retry_ms: default_lock_retry_ms(),
        }
    }
}

fn default_engines() -> usize {
    1
}

fn default_lock_ttl_ms() -> u64 {
    5000
}

fn default_lock_retry_ms() -> u64 {
    100
}

/// Session behavior configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct SessionConfig {
    /// Re-enqueue a user automatically when their peer leaves.
    #[serde(default = "default_auto_requeue")]
    pub auto_requeue: bool,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            auto_requeue: default_auto_requeue(),
        }
    }
}

fn default_auto_requeue() -> bool {
    true
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_empty_config_uses_defaults() {
        let config: Config = toml::from_str("").expect("empty config parses");
        assert_eq!(config.server.name, "stranger.local");
        assert_eq!(config.store.backend, "memory");
        assert_eq!(config.matchmaker.engines, 1);
        assert_eq!(config.matchmaker.lock_ttl(), Duration::from_millis(5000));
        assert_eq!(config.matchmaker.lock_retry(), Duration::from_millis(100));
        assert!(config.session.auto_requeue);
    }

    #[test]
    fn test_full_config_parses() {
        let config: Config = toml::from_str(
            r#"
[server]
name = "stranger-eu-1"
metrics_port = 9090

[store]
backend = "redis"
url = "redis://redis.internal:6379"

[matchmaker]
engines = 2
lock_ttl_ms = 2000
lock_retry_ms = 50

[session]
auto_requeue = false
"#,
        )
        .expect("full config parses");
        assert_eq!(config.server.metrics_port, Some(9090));
        assert_eq!(config.store.backend, "redis");
        assert_eq!(config.matchmaker.engines, 2);
        assert!(!config.session.auto_requeue);
    }
}

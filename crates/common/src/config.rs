use std::fs;

use anyhow::{Context, Result};
use serde::Deserialize;

/// Top-level application configuration, loaded from YAML with
/// `EVENTIDE_*` environment variable overrides.
#[derive(Debug, Deserialize, Default)]
pub struct AppConfig {
    #[serde(default)]
    pub server: ServerSettings,
    #[serde(default)]
    pub cache: CacheSettings,
    #[serde(default)]
    pub pool: PoolSettings,
    #[serde(default)]
    pub storage: StorageSettings,
    /// True when running inside an interactive notebook-style host.
    /// Injected here rather than probed from the environment at runtime.
    #[serde(default)]
    pub interactive_host: bool,
}

#[derive(Debug, Deserialize)]
pub struct ServerSettings {
    #[serde(default = "default_listen_addr")]
    pub listen_addr: String,
    #[serde(default = "default_server_name")]
    pub name: String,
}

impl Default for ServerSettings {
    fn default() -> Self {
        Self {
            listen_addr: default_listen_addr(),
            name: default_server_name(),
        }
    }
}

fn default_listen_addr() -> String {
    "0.0.0.0:5555".to_string()
}

fn default_server_name() -> String {
    "Eventide Server".to_string()
}

/// Materialization cache settings.
#[derive(Debug, Deserialize, Clone)]
pub struct CacheSettings {
    /// Schema that holds materialized tables. Empty string means
    /// unqualified names (engines without schema support).
    #[serde(default = "default_cache_schema")]
    pub schema: String,
}

impl Default for CacheSettings {
    fn default() -> Self {
        Self {
            schema: default_cache_schema(),
        }
    }
}

fn default_cache_schema() -> String {
    "cache".to_string()
}

#[derive(Debug, Deserialize, Clone, Copy)]
pub struct PoolSettings {
    #[serde(default = "default_workers")]
    pub workers: usize,
}

impl Default for PoolSettings {
    fn default() -> Self {
        Self {
            workers: default_workers(),
        }
    }
}

fn default_workers() -> usize {
    4
}

#[derive(Debug, Deserialize, Clone)]
pub struct StorageSettings {
    #[serde(default = "default_storage_url")]
    pub url: String,
    #[serde(default = "default_events_table")]
    pub events_table: String,
}

impl Default for StorageSettings {
    fn default() -> Self {
        Self {
            url: default_storage_url(),
            events_table: default_events_table(),
        }
    }
}

fn default_storage_url() -> String {
    "eventide.db".to_string()
}

fn default_events_table() -> String {
    "events".to_string()
}

impl AppConfig {
    pub fn from_file(path: &str) -> Result<Self> {
        let content =
            fs::read_to_string(path).context(format!("Failed to read config file at {}", path))?;
        let mut config: AppConfig = serde_yaml::from_str(&content)
            .context(format!("Failed to parse app config file at {}", path))?;

        // Environment variable overrides
        if let Ok(addr) = std::env::var("EVENTIDE_SERVER__LISTEN_ADDR") {
            config.server.listen_addr = addr;
        }
        if let Ok(url) = std::env::var("EVENTIDE_STORAGE__URL") {
            config.storage.url = url;
        }
        if let Ok(schema) = std::env::var("EVENTIDE_CACHE__SCHEMA") {
            config.cache.schema = schema;
        }

        Ok(config)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_app_config_parsing() {
        let yaml = r#"
server:
  listen_addr: "0.0.0.0:5556"
  name: "Eventide Test"
cache:
  schema: "cache"
pool:
  workers: 8
storage:
  url: "test.db"
"#;
        let config: AppConfig = serde_yaml::from_str(yaml).unwrap();
        assert_eq!(config.server.listen_addr, "0.0.0.0:5556");
        assert_eq!(config.pool.workers, 8);
        assert_eq!(config.cache.schema, "cache");
        assert!(!config.interactive_host);
    }

    #[test]
    fn test_defaults() {
        let config: AppConfig = serde_yaml::from_str("{}").unwrap();
        assert_eq!(config.cache.schema, "cache");
        assert_eq!(config.pool.workers, 4);
        assert_eq!(config.storage.events_table, "events");
    }
}

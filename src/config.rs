//! # Station Configuration
//!
//! Loads the control station settings from a TOML file. When the file does not
//! exist a default one is written so the operator has something to edit.
//!
//! The default location is `<config dir>/controlstation/station.toml`
//! (`~/.config/controlstation/station.toml` on Linux). A different file can be
//! passed as the first command line argument.
//!
//! ```toml
//! [broker]
//! host = "127.0.0.1"
//! port = 1883
//!
//! [topics]
//! commands = "epicure/commands"
//! status = "epicure/status"
//! logs = "epicure/logs"
//! ```

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use thiserror::Error;
use tracing::{debug, info, warn};

use crate::station::device::StatusMatch;

const CONFIG_DIR: &str = "controlstation";
const CONFIG_FILE: &str = "station.toml";

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to access config file {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to parse config file: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("Failed to serialize config: {0}")]
    Serialize(#[from] toml::ser::Error),

    #[error("Invalid configuration: {0}")]
    Invalid(String),
}

/// Broker connection parameters
#[derive(Deserialize, Serialize, Clone, Debug, PartialEq)]
#[serde(default)]
pub struct BrokerConfig {
    pub host: String,
    pub port: u16,
    /// Prefix of the client id; the start time is appended so reconnects of a
    /// restarted station never collide with a stale broker session.
    pub client_id_prefix: String,
    pub keep_alive_secs: u64,
    pub username: Option<String>,
    pub password: Option<String>,
    /// Capacity of the request queue between the client and the event loop
    pub channel_capacity: usize,
}

impl Default for BrokerConfig {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".to_string(),
            port: 1883,
            client_id_prefix: "epicure_host_gui".to_string(),
            keep_alive_secs: 5,
            username: None,
            password: None,
            channel_capacity: 64,
        }
    }
}

/// Topic names on the bus
#[derive(Deserialize, Serialize, Clone, Debug, PartialEq)]
#[serde(default)]
pub struct TopicConfig {
    pub commands: String,
    pub status: String,
    pub logs: String,
}

impl Default for TopicConfig {
    fn default() -> Self {
        Self {
            commands: "epicure/commands".to_string(),
            status: "epicure/status".to_string(),
            logs: "epicure/logs".to_string(),
        }
    }
}

impl TopicConfig {
    /// Topics the station listens on once the broker link is up
    pub fn inbound(&self) -> Vec<String> {
        vec![self.status.clone(), self.logs.clone()]
    }
}

#[derive(Deserialize, Serialize, Clone, Debug, PartialEq)]
#[serde(default)]
pub struct ReconnectConfig {
    pub initial_backoff_ms: u64,
    pub max_backoff_ms: u64,
}

impl Default for ReconnectConfig {
    fn default() -> Self {
        Self {
            initial_backoff_ms: 500,
            max_backoff_ms: 30_000,
        }
    }
}

#[derive(Deserialize, Serialize, Clone, Debug, PartialEq)]
#[serde(default)]
pub struct ConsoleConfig {
    /// Name shown on the device status badge
    pub device_label: String,
    pub status_match: StatusMatch,
    /// Interval between two drains of the event channel
    pub tick_interval_ms: u64,
    /// Upper bound for how long shutdown waits for the network task
    pub shutdown_grace_ms: u64,
    pub log_level: String,
}

impl Default for ConsoleConfig {
    fn default() -> Self {
        Self {
            device_label: "STM32".to_string(),
            status_match: StatusMatch::default(),
            tick_interval_ms: 33,
            shutdown_grace_ms: 500,
            log_level: "info".to_string(),
        }
    }
}

#[derive(Deserialize, Serialize, Clone, Debug, Default, PartialEq)]
#[serde(default)]
pub struct StationConfig {
    pub broker: BrokerConfig,
    pub topics: TopicConfig,
    pub reconnect: ReconnectConfig,
    pub station: ConsoleConfig,
}

impl StationConfig {
    /// Default location inside the user's config directory
    pub fn default_path() -> PathBuf {
        let mut path = dirs::config_dir().unwrap_or_else(|| {
            warn!("Could not determine config directory, using current directory");
            PathBuf::from(".")
        });
        path.push(CONFIG_DIR);
        path.push(CONFIG_FILE);
        path
    }

    /// Reads the config at `path`, writing the defaults there first if the
    /// file is missing.
    pub async fn load_or_create(path: &Path) -> Result<Self, ConfigError> {
        let exists = tokio::fs::try_exists(path)
            .await
            .map_err(|source| ConfigError::Io {
                path: path.to_path_buf(),
                source,
            })?;

        if !exists {
            info!("No config found at {}, creating default", path.display());
            let config = Self::default();
            config.save(path).await?;
            return Ok(config);
        }

        let content = tokio::fs::read_to_string(path)
            .await
            .map_err(|source| ConfigError::Io {
                path: path.to_path_buf(),
                source,
            })?;
        let config = Self::parse(&content)?;
        debug!("Loaded config from {}: {:?}", path.display(), config);
        Ok(config)
    }

    pub fn parse(content: &str) -> Result<Self, ConfigError> {
        let config: Self = toml::from_str(content)?;
        config.validate()?;
        Ok(config)
    }

    pub async fn save(&self, path: &Path) -> Result<(), ConfigError> {
        if let Some(parent) = path.parent() {
            tokio::fs::create_dir_all(parent)
                .await
                .map_err(|source| ConfigError::Io {
                    path: parent.to_path_buf(),
                    source,
                })?;
        }
        let content = toml::to_string_pretty(self)?;
        tokio::fs::write(path, content)
            .await
            .map_err(|source| ConfigError::Io {
                path: path.to_path_buf(),
                source,
            })
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        let topics = [
            ("commands", &self.topics.commands),
            ("status", &self.topics.status),
            ("logs", &self.topics.logs),
        ];
        for (name, topic) in topics {
            if topic.trim().is_empty() {
                return Err(ConfigError::Invalid(format!("topic '{}' is empty", name)));
            }
            if topic.contains(['+', '#']) {
                return Err(ConfigError::Invalid(format!(
                    "topic '{}' must not contain wildcards: {}",
                    name, topic
                )));
            }
        }
        // rumqttc rejects keep alive intervals between zero and five seconds
        if self.broker.keep_alive_secs != 0 && self.broker.keep_alive_secs < 5 {
            return Err(ConfigError::Invalid(
                "broker.keep_alive_secs must be 0 or at least 5".to_string(),
            ));
        }
        if self.broker.channel_capacity == 0 {
            return Err(ConfigError::Invalid(
                "broker.channel_capacity must be positive".to_string(),
            ));
        }
        if self.reconnect.initial_backoff_ms == 0
            || self.reconnect.max_backoff_ms < self.reconnect.initial_backoff_ms
        {
            return Err(ConfigError::Invalid(
                "reconnect backoff must satisfy 0 < initial_backoff_ms <= max_backoff_ms"
                    .to_string(),
            ));
        }
        if self.station.tick_interval_ms == 0 {
            return Err(ConfigError::Invalid(
                "station.tick_interval_ms must be positive".to_string(),
            ));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn partial_file_falls_back_to_defaults() {
        let config = StationConfig::parse(
            r#"
            [broker]
            host = "10.0.0.7"

            [station]
            status_match = "exact"
            "#,
        )
        .unwrap();

        assert_eq!(config.broker.host, "10.0.0.7");
        assert_eq!(config.broker.port, 1883);
        assert_eq!(config.topics, TopicConfig::default());
        assert_eq!(config.station.status_match, StatusMatch::Exact);
        assert_eq!(config.station.device_label, "STM32");
    }

    #[test]
    fn wildcard_topics_are_rejected() {
        let err = StationConfig::parse(
            r#"
            [topics]
            status = "epicure/#"
            "#,
        )
        .unwrap_err();
        assert!(matches!(err, ConfigError::Invalid(_)));
    }

    #[test]
    fn short_keep_alive_is_rejected() {
        let err = StationConfig::parse("[broker]\nkeep_alive_secs = 2\n").unwrap_err();
        assert!(matches!(err, ConfigError::Invalid(_)));
    }

    #[test]
    fn inbound_topics_are_status_and_logs() {
        let topics = TopicConfig::default();
        assert_eq!(topics.inbound(), vec!["epicure/status", "epicure/logs"]);
    }

    #[tokio::test]
    async fn missing_file_is_created_with_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("station.toml");

        let config = StationConfig::load_or_create(&path).await.unwrap();
        assert_eq!(config, StationConfig::default());
        assert!(path.exists());

        let reloaded = StationConfig::load_or_create(&path).await.unwrap();
        assert_eq!(reloaded, config);
    }
}

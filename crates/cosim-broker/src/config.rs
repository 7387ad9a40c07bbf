// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Broker server configuration.

use cosim::config::DEFAULT_BROKER_PORT;
use cosim::LogLevel;
use serde::{Deserialize, Serialize};
use std::net::IpAddr;
use std::path::Path;
use std::time::Duration;

/// Broker server configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BrokerServerConfig {
    /// Broker name, as federates refer to it (default: cosim_broker)
    #[serde(default = "default_name")]
    pub name: String,

    /// Address to listen on (default: 127.0.0.1)
    #[serde(default = "default_interface")]
    pub interface: IpAddr,

    /// TCP port to listen on (default: 24160, 0 = ephemeral)
    #[serde(default = "default_port")]
    pub port: u16,

    /// Federates expected before execution starts
    #[serde(default = "default_federates")]
    pub federates: usize,

    /// Sub-brokers expected before execution starts
    #[serde(default)]
    pub min_brokers: usize,

    /// Broker log level, by name or number
    #[serde(default = "default_log_level")]
    pub log_level: String,

    /// Seconds between time-status reports (0 = off)
    #[serde(default = "default_status_interval")]
    pub status_interval_secs: u64,
}

fn default_name() -> String {
    "cosim_broker".to_string()
}

fn default_interface() -> IpAddr {
    IpAddr::from([127, 0, 0, 1])
}

fn default_port() -> u16 {
    DEFAULT_BROKER_PORT
}

fn default_federates() -> usize {
    1
}

fn default_log_level() -> String {
    "summary".to_string()
}

fn default_status_interval() -> u64 {
    10
}

impl Default for BrokerServerConfig {
    fn default() -> Self {
        Self {
            name: default_name(),
            interface: default_interface(),
            port: default_port(),
            federates: default_federates(),
            min_brokers: 0,
            log_level: default_log_level(),
            status_interval_secs: default_status_interval(),
        }
    }
}

impl BrokerServerConfig {
    /// Load configuration from a JSON file.
    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        let content =
            std::fs::read_to_string(path).map_err(|e| ConfigError::IoError(e.to_string()))?;

        serde_json::from_str(&content).map_err(|e| ConfigError::ParseError(e.to_string()))
    }

    /// Save configuration to a JSON file.
    pub fn to_file(&self, path: &Path) -> Result<(), ConfigError> {
        let content = serde_json::to_string_pretty(self)
            .map_err(|e| ConfigError::SerializeError(e.to_string()))?;

        std::fs::write(path, content).map_err(|e| ConfigError::IoError(e.to_string()))
    }

    /// Parsed broker log level.
    pub fn level(&self) -> Result<LogLevel, ConfigError> {
        self.log_level
            .parse()
            .map_err(|e: cosim::ConfigError| ConfigError::InvalidValue(e.to_string()))
    }

    /// Status report period, `None` when reporting is off.
    pub fn status_interval(&self) -> Option<Duration> {
        (self.status_interval_secs > 0).then(|| Duration::from_secs(self.status_interval_secs))
    }

    /// Init string handed to the broker.
    pub fn init_string(&self) -> String {
        format!(
            "--name={} --federates={} --minbrokers={} --interface={} --port={} --loglevel={}",
            self.name,
            self.federates,
            self.min_brokers,
            self.interface,
            self.port,
            self.log_level
        )
    }

    /// Validate configuration.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.name.is_empty() || self.name.chars().any(char::is_whitespace) {
            return Err(ConfigError::InvalidValue(format!(
                "broker name '{}' must be non-empty without whitespace",
                self.name
            )));
        }
        if self.federates == 0 && self.min_brokers == 0 {
            return Err(ConfigError::InvalidValue(
                "federates and min_brokers cannot both be 0".into(),
            ));
        }
        self.level()?;
        Ok(())
    }
}

/// Configuration error types.
#[derive(Debug, Clone)]
pub enum ConfigError {
    IoError(String),
    ParseError(String),
    SerializeError(String),
    InvalidValue(String),
}

impl std::fmt::Display for ConfigError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::IoError(s) => write!(f, "I/O error: {}", s),
            Self::ParseError(s) => write!(f, "Parse error: {}", s),
            Self::SerializeError(s) => write!(f, "Serialize error: {}", s),
            Self::InvalidValue(s) => write!(f, "Invalid value: {}", s),
        }
    }
}

impl std::error::Error for ConfigError {}

#[cfg(test)]
mod tests {
    use super::*;
    use cosim::BrokerArgs;
    use std::io::Write;
    use tempfile::NamedTempFile;

    #[test]
    fn test_default_config() {
        let config = BrokerServerConfig::default();
        assert_eq!(config.port, DEFAULT_BROKER_PORT);
        assert_eq!(config.federates, 1);
        assert_eq!(config.status_interval(), Some(Duration::from_secs(10)));
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_partial_file_uses_defaults() {
        let mut file = NamedTempFile::new().unwrap();
        write!(file, r#"{{"name": "grid", "federates": 3, "status_interval_secs": 0}}"#).unwrap();

        let config = BrokerServerConfig::from_file(file.path()).unwrap();
        assert_eq!(config.name, "grid");
        assert_eq!(config.federates, 3);
        assert_eq!(config.port, DEFAULT_BROKER_PORT);
        assert_eq!(config.status_interval(), None);
    }

    #[test]
    fn test_save_and_reload() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("broker.json");
        let config = BrokerServerConfig {
            port: 0,
            min_brokers: 2,
            ..Default::default()
        };
        config.to_file(&path).unwrap();
        assert_eq!(BrokerServerConfig::from_file(&path).unwrap(), config);
    }

    #[test]
    fn test_malformed_file() {
        let mut file = NamedTempFile::new().unwrap();
        write!(file, "{{ not json").unwrap();
        assert!(matches!(
            BrokerServerConfig::from_file(file.path()),
            Err(ConfigError::ParseError(_))
        ));
        assert!(matches!(
            BrokerServerConfig::from_file(Path::new("/nonexistent/broker.json")),
            Err(ConfigError::IoError(_))
        ));
    }

    #[test]
    fn test_validate_rejects_bad_values() {
        let no_members = BrokerServerConfig {
            federates: 0,
            ..Default::default()
        };
        assert!(no_members.validate().is_err());

        let spaced = BrokerServerConfig {
            name: "my broker".into(),
            ..Default::default()
        };
        assert!(spaced.validate().is_err());

        let noisy = BrokerServerConfig {
            log_level: "loud".into(),
            ..Default::default()
        };
        assert!(noisy.validate().is_err());
    }

    #[test]
    fn test_init_string_round_trips_through_broker_args() {
        let config = BrokerServerConfig {
            name: "grid".into(),
            federates: 4,
            min_brokers: 1,
            port: 0,
            log_level: "timing".into(),
            ..Default::default()
        };
        let args = BrokerArgs::parse_init(&config.init_string()).unwrap();
        assert_eq!(args.resolved_name("x"), "grid");
        assert_eq!(args.federates, 4);
        assert_eq!(args.min_brokers, 1);
        assert_eq!(args.port, 0);
        assert_eq!(args.interface, "127.0.0.1");
        assert_eq!(args.log_level, LogLevel::Timing);
    }
}

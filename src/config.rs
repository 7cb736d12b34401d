use std::fs;
use std::time::Duration;

use serde::Deserialize;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config file {path}: {source}")]
    Read {
        path: String,
        source: std::io::Error,
    },

    #[error("failed to parse config file {path}: {source}")]
    Parse {
        path: String,
        source: toml::de::Error,
    },
}

/// Upload engine tunables. Every field falls back to its default when absent.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct Config {
    pub quorum_cap: usize,
    pub quorum_poll_interval_ms: u64,
    pub upload_init_timeout_ms: u64,
    pub ack_timeout_ms: u64,
    pub probe_timeout_ms: u64,
    pub connect_timeout_ms: u64,
    pub payment_pause_ms: u64,
    pub host_search_deadline_secs: u64,
    pub host_max_retry: usize,
    pub min_host_pool: usize,
    pub negotiation_timeout_secs: u64,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            quorum_cap: 20,
            quorum_poll_interval_ms: 5_000,
            upload_init_timeout_ms: 30_000,
            ack_timeout_ms: 30_000,
            probe_timeout_ms: 5_000,
            connect_timeout_ms: 5_000,
            payment_pause_ms: 1_000,
            host_search_deadline_secs: 600,
            host_max_retry: 60,
            min_host_pool: 30,
            negotiation_timeout_secs: 600,
        }
    }
}

impl Config {
    pub fn from_file(file_path: &str) -> Result<Self, ConfigError> {
        let config_str = fs::read_to_string(file_path).map_err(|source| ConfigError::Read {
            path: file_path.to_string(),
            source,
        })?;
        Self::from_toml(&config_str).map_err(|source| ConfigError::Parse {
            path: file_path.to_string(),
            source,
        })
    }

    pub fn from_toml(config_str: &str) -> Result<Self, toml::de::Error> {
        toml::from_str(config_str)
    }

    /// Shards that must reach a milestone before the session moves on.
    pub fn quorum_threshold(&self, total_shards: usize) -> usize {
        total_shards.min(self.quorum_cap)
    }

    pub fn quorum_poll_interval(&self) -> Duration {
        Duration::from_millis(self.quorum_poll_interval_ms)
    }

    pub fn upload_init_timeout(&self) -> Duration {
        Duration::from_millis(self.upload_init_timeout_ms)
    }

    pub fn ack_timeout(&self) -> Duration {
        Duration::from_millis(self.ack_timeout_ms)
    }

    pub fn probe_timeout(&self) -> Duration {
        Duration::from_millis(self.probe_timeout_ms)
    }

    pub fn connect_timeout(&self) -> Duration {
        Duration::from_millis(self.connect_timeout_ms)
    }

    pub fn payment_pause(&self) -> Duration {
        Duration::from_millis(self.payment_pause_ms)
    }

    pub fn host_search_deadline(&self) -> Duration {
        Duration::from_secs(self.host_search_deadline_secs)
    }

    pub fn negotiation_timeout(&self) -> Duration {
        Duration::from_secs(self.negotiation_timeout_secs)
    }
}

use std::net::SocketAddr;
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::Deserialize;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read {path}: {source}")]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },
    #[error("failed to parse config: {0}")]
    Parse(#[from] toml::de::Error),
    #[error("invalid config: {0}")]
    Invalid(&'static str),
}

#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub session: SessionConfig,
    #[serde(default)]
    pub transport: TransportConfig,
    #[serde(default)]
    pub outlet: OutletConfig,
    #[serde(default)]
    pub server: ServerConfig,
}

/// What to do when only one of the two notification channels subscribes.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PartialSubscriptionPolicy {
    /// Tear the session down.
    #[default]
    Abort,
    /// Keep streaming the channel that did subscribe.
    Degraded,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default)]
pub struct SessionConfig {
    pub on_partial_subscription: PartialSubscriptionPolicy,
    /// Upper bound for each unsubscribe/disconnect step during teardown
    pub teardown_timeout_ms: u64,
}

impl SessionConfig {
    pub fn teardown_timeout(&self) -> Duration {
        Duration::from_millis(self.teardown_timeout_ms)
    }
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            on_partial_subscription: PartialSubscriptionPolicy::Abort,
            teardown_timeout_ms: 2000,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum TransportConfig {
    Mock {
        /// Interval between synthetic ECG frames
        #[serde(default = "default_ecg_frame_ms")]
        ecg_frame_ms: u64,
        /// Interval between synthetic accelerometer frames
        #[serde(default = "default_acc_frame_ms")]
        acc_frame_ms: u64,
        /// Interval between synthetic heart-rate records
        #[serde(default = "default_hr_interval_ms")]
        hr_interval_ms: u64,
    },
    Ble {
        /// Substring matched against the advertised local name
        #[serde(default = "default_name_pattern")]
        name_pattern: String,
        /// Exact device address, takes precedence over the name pattern
        #[serde(default)]
        address: Option<String>,
        #[serde(default = "default_scan_secs")]
        scan_secs: u64,
    },
}

fn default_ecg_frame_ms() -> u64 {
    500
}

fn default_acc_frame_ms() -> u64 {
    250
}

fn default_hr_interval_ms() -> u64 {
    1000
}

fn default_name_pattern() -> String {
    "Polar H10".to_owned()
}

fn default_scan_secs() -> u64 {
    5
}

impl Default for TransportConfig {
    fn default() -> Self {
        TransportConfig::Mock {
            ecg_frame_ms: default_ecg_frame_ms(),
            acc_frame_ms: default_acc_frame_ms(),
            hr_interval_ms: default_hr_interval_ms(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default)]
pub struct OutletConfig {
    /// Address consumers connect to
    pub addr: SocketAddr,
    /// Ticks buffered between the assembler and the outlet
    pub queue_capacity: usize,
    /// Samples buffered per consumer before the oldest are dropped
    pub consumer_buffer: usize,
}

impl Default for OutletConfig {
    fn default() -> Self {
        Self {
            addr: SocketAddr::from(([127, 0, 0, 1], 16571)),
            queue_capacity: 1024,
            consumer_buffer: 360,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    /// Address for the HTTP status server to listen on
    pub http_addr: SocketAddr,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            http_addr: SocketAddr::from(([127, 0, 0, 1], 8082)),
        }
    }
}

impl Config {
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_owned(),
            source,
        })?;
        let config: Config = toml::from_str(&content)?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.outlet.queue_capacity == 0 {
            return Err(ConfigError::Invalid("outlet.queue_capacity must be positive"));
        }
        if self.outlet.consumer_buffer == 0 {
            return Err(ConfigError::Invalid("outlet.consumer_buffer must be positive"));
        }
        match &self.transport {
            TransportConfig::Mock {
                ecg_frame_ms,
                acc_frame_ms,
                hr_interval_ms,
            } => {
                if *ecg_frame_ms == 0 || *acc_frame_ms == 0 || *hr_interval_ms == 0 {
                    return Err(ConfigError::Invalid("mock intervals must be positive"));
                }
            }
            TransportConfig::Ble {
                name_pattern,
                address,
                ..
            } => {
                if name_pattern.is_empty() && address.is_none() {
                    return Err(ConfigError::Invalid(
                        "ble transport needs a name_pattern or an address",
                    ));
                }
            }
        }
        Ok(())
    }
}

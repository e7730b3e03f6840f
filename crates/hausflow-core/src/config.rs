/*!
 * Configuration management for Hausflow.
 *
 * This module loads the gateway configuration from defaults, an optional
 * TOML file and `HAUSFLOW__*` environment variables, including the static
 * device list.
 */
use std::collections::HashMap;
use std::net::SocketAddr;
use std::path::Path;
use std::time::Duration;

use config::{Config as ConfigLib, Environment, File};
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::error::{Error, Result};
use crate::types::{DeviceDescriptor, MacAddress};

/// Default HomeGraph state reporting endpoint
pub const DEFAULT_REPORTING_ENDPOINT: &str =
    "https://homegraph.googleapis.com/v1/devices:reportStateAndNotification";

/// Gateway configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    /// General configuration
    #[serde(default)]
    pub general: GeneralConfig,

    /// Logging configuration
    #[serde(default)]
    pub logging: LoggingConfig,

    /// Beacon transport configuration
    #[serde(default)]
    pub beacon: BeaconConfig,

    /// Smart-home bridge configuration
    #[serde(default)]
    pub bridge: BridgeConfig,

    /// State reporting configuration
    #[serde(default)]
    pub reporting: ReportingConfig,

    /// Networked AC configuration
    #[serde(default)]
    pub daikin: DaikinConfig,

    /// Static device list
    #[serde(default)]
    pub devices: Vec<DeviceDescriptor>,
}

/// General configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GeneralConfig {
    /// Application name
    #[serde(default = "default_app_name")]
    pub app_name: String,
}

/// Logging configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// Log filter (trace, debug, info, warn, error, or a full directive)
    #[serde(default = "default_log_level")]
    pub level: String,

    /// Whether to use JSON format for logs
    #[serde(default)]
    pub json_format: bool,
}

/// Beacon transport configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BeaconConfig {
    /// TCP listen address for beacon relays
    #[serde(default = "default_beacon_addr")]
    pub bind_addr: SocketAddr,
}

/// Smart-home bridge configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BridgeConfig {
    /// HTTP listen address for the action endpoint
    #[serde(default = "default_action_addr")]
    pub action_addr: SocketAddr,

    /// Listen address for the WebSocket push channel
    #[serde(default = "default_push_addr")]
    pub push_addr: SocketAddr,

    /// Agent user id reported in SYNC responses and state reports
    #[serde(default = "default_agent_user_id")]
    pub agent_user_id: String,
}

/// State reporting configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReportingConfig {
    /// Whether to upload state changes at all
    #[serde(default = "default_true")]
    pub enabled: bool,

    /// Reporting endpoint URL
    #[serde(default = "default_reporting_endpoint")]
    pub endpoint: String,

    /// Bearer token for the endpoint, obtained out of band
    #[serde(default)]
    pub token: Option<String>,

    /// Aggregation window in milliseconds
    #[serde(default = "default_aggregate_ms")]
    pub aggregate_ms: u64,
}

/// Networked AC configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DaikinConfig {
    /// Whether to run the UDP discovery loop
    #[serde(default = "default_true")]
    pub discovery_enabled: bool,

    /// Broadcast target for discovery probes
    #[serde(default = "default_discovery_target")]
    pub discovery_target: SocketAddr,

    /// Lower bound of the discovery interval in seconds
    #[serde(default = "default_discovery_min_secs")]
    pub discovery_min_secs: u64,

    /// Upper bound of the discovery interval in seconds
    #[serde(default = "default_discovery_max_secs")]
    pub discovery_max_secs: u64,

    /// Timeout for control HTTP requests in milliseconds
    #[serde(default = "default_http_timeout_ms")]
    pub http_timeout_ms: u64,
}

impl Default for GeneralConfig {
    fn default() -> Self {
        Self {
            app_name: default_app_name(),
        }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            json_format: false,
        }
    }
}

impl Default for BeaconConfig {
    fn default() -> Self {
        Self {
            bind_addr: default_beacon_addr(),
        }
    }
}

impl Default for BridgeConfig {
    fn default() -> Self {
        Self {
            action_addr: default_action_addr(),
            push_addr: default_push_addr(),
            agent_user_id: default_agent_user_id(),
        }
    }
}

impl Default for ReportingConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            endpoint: default_reporting_endpoint(),
            token: None,
            aggregate_ms: default_aggregate_ms(),
        }
    }
}

impl Default for DaikinConfig {
    fn default() -> Self {
        Self {
            discovery_enabled: true,
            discovery_target: default_discovery_target(),
            discovery_min_secs: default_discovery_min_secs(),
            discovery_max_secs: default_discovery_max_secs(),
            http_timeout_ms: default_http_timeout_ms(),
        }
    }
}

impl ReportingConfig {
    /// Aggregation window as a duration
    pub fn aggregate_window(&self) -> Duration {
        Duration::from_millis(self.aggregate_ms)
    }
}

impl DaikinConfig {
    /// Discovery interval bounds as durations
    pub fn discovery_interval(&self) -> (Duration, Duration) {
        let min = self.discovery_min_secs.min(self.discovery_max_secs);
        (
            Duration::from_secs(min),
            Duration::from_secs(self.discovery_max_secs),
        )
    }

    /// Control request timeout as a duration
    pub fn http_timeout(&self) -> Duration {
        Duration::from_millis(self.http_timeout_ms)
    }
}

impl Config {
    /// Device descriptors with duplicate addresses collapsed, last one wins
    pub fn device_descriptors(&self) -> Vec<DeviceDescriptor> {
        let mut index: HashMap<MacAddress, usize> = HashMap::new();
        let mut out: Vec<DeviceDescriptor> = Vec::with_capacity(self.devices.len());

        for descriptor in &self.devices {
            match index.get(&descriptor.mac) {
                Some(&i) => {
                    warn!("Device {} configured twice, using the later entry", descriptor.mac);
                    out[i] = descriptor.clone();
                }
                None => {
                    index.insert(descriptor.mac, out.len());
                    out.push(descriptor.clone());
                }
            }
        }

        out
    }
}

fn default_app_name() -> String {
    "hausflow".to_string()
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_beacon_addr() -> SocketAddr {
    SocketAddr::from(([0, 0, 0, 0], 9999))
}

fn default_action_addr() -> SocketAddr {
    SocketAddr::from(([0, 0, 0, 0], 8888))
}

fn default_push_addr() -> SocketAddr {
    SocketAddr::from(([0, 0, 0, 0], 9998))
}

fn default_agent_user_id() -> String {
    "hausflow".to_string()
}

fn default_true() -> bool {
    true
}

fn default_reporting_endpoint() -> String {
    DEFAULT_REPORTING_ENDPOINT.to_string()
}

fn default_aggregate_ms() -> u64 {
    250
}

fn default_discovery_target() -> SocketAddr {
    SocketAddr::from(([255, 255, 255, 255], 30050))
}

fn default_discovery_min_secs() -> u64 {
    120
}

fn default_discovery_max_secs() -> u64 {
    180
}

fn default_http_timeout_ms() -> u64 {
    5_000
}

/// A builder for creating a configuration
#[derive(Debug, Default)]
pub struct ConfigBuilder {
    config_file: Option<String>,
    environment_prefix: Option<String>,
}

impl ConfigBuilder {
    /// Create a new ConfigBuilder
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the config file path
    pub fn with_config_file<P: AsRef<Path>>(mut self, path: P) -> Self {
        self.config_file = Some(path.as_ref().to_string_lossy().to_string());
        self
    }

    /// Set the environment variable prefix for configuration
    pub fn with_environment_prefix<S: AsRef<str>>(mut self, prefix: S) -> Self {
        self.environment_prefix = Some(prefix.as_ref().to_string());
        self
    }

    /// Build the configuration
    pub fn build(self) -> Result<Config> {
        let mut config_builder = ConfigLib::builder();

        if let Some(config_file) = self.config_file {
            let path = Path::new(&config_file);
            if path.exists() {
                debug!("Loading configuration from {}", config_file);
                config_builder = config_builder.add_source(File::from(path));
            } else {
                return Err(Error::config(format!(
                    "Configuration file {} does not exist",
                    config_file
                )));
            }
        }

        if let Some(prefix) = self.environment_prefix {
            debug!("Loading configuration from environment variables with prefix {}", prefix);
            config_builder = config_builder.add_source(
                Environment::with_prefix(&prefix)
                    .prefix_separator("__")
                    .separator("__")
                    .try_parsing(true),
            );
        }

        let config_lib = config_builder
            .build()
            .map_err(|e| Error::config(format!("Failed to build configuration: {}", e)))?;

        // Missing sections fall back to their serde defaults.
        let config: Config = config_lib
            .try_deserialize()
            .map_err(|e| Error::config(format!("Failed to deserialize configuration: {}", e)))?;

        info!(
            "Configuration loaded with {} configured devices",
            config.devices.len()
        );
        Ok(config)
    }
}

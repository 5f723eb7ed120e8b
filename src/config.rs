use std::collections::HashMap;

use config::{Config, File};
pub use config::ConfigError;
use serde::Deserialize;
use serde_json::Value;

use crate::grid::InstrumentSpec;

/// Main configuration struct
#[derive(Debug, Deserialize)]
pub struct Settings {
    /// Instrument being traded
    pub instrument: InstrumentSpec,
    /// Policy preset and its parameters
    pub policy: PolicySettings,
    /// Tick source
    pub feed: FeedConfig,
    /// Paper execution
    #[serde(default)]
    pub gateway: GatewayConfig,
    /// Logging configuration
    #[serde(default)]
    pub log: LogConfig,
    /// Main loop behaviour
    #[serde(default)]
    pub runner: RunnerConfig,
}

#[derive(Debug, Deserialize)]
pub struct PolicySettings {
    /// Registered preset name (e.g. "trend", "hedging")
    pub preset: String,
    /// Preset-specific parameters
    #[serde(default)]
    pub params: HashMap<String, Value>,
}

#[derive(Debug, Deserialize)]
pub struct FeedConfig {
    /// JSON-lines tick file to replay
    pub path: String,
    /// Channel capacity between the feed and the controller
    #[serde(default = "default_buffer")]
    pub buffer: usize,
    /// Subscribe attempts before giving up
    #[serde(default = "default_subscribe_retries")]
    pub subscribe_retries: u32,
    /// First retry delay; doubles on each attempt
    #[serde(default = "default_retry_base_delay_ms")]
    pub retry_base_delay_ms: u64,
}

fn default_buffer() -> usize {
    1024
}

fn default_subscribe_retries() -> u32 {
    5
}

fn default_retry_base_delay_ms() -> u64 {
    500
}

#[derive(Debug, Deserialize)]
pub struct GatewayConfig {
    /// Contract units per lot, used for paper P&L
    #[serde(default = "default_units_per_lot")]
    pub units_per_lot: f64,
    /// Bounded wait for an order to reach its target state
    #[serde(default = "default_timeout_ms")]
    pub timeout_ms: u64,
    #[serde(default = "default_poll_ms")]
    pub poll_ms: u64,
}

impl Default for GatewayConfig {
    fn default() -> Self {
        Self {
            units_per_lot: default_units_per_lot(),
            timeout_ms: default_timeout_ms(),
            poll_ms: default_poll_ms(),
        }
    }
}

fn default_units_per_lot() -> f64 {
    100_000.0
}

fn default_timeout_ms() -> u64 {
    2_000
}

fn default_poll_ms() -> u64 {
    50
}

#[derive(Debug, Deserialize)]
pub struct LogConfig {
    /// Log level: "error", "warn", "info", "debug", "trace"
    #[serde(default = "default_log_level")]
    pub level: String,
}

impl Default for LogConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
        }
    }
}

fn default_log_level() -> String {
    "info".to_string()
}

#[derive(Debug, Clone, Deserialize)]
pub struct RunnerConfig {
    /// Seconds between summary log lines; 0 disables them
    #[serde(default = "default_summary_interval_secs")]
    pub summary_interval_secs: u64,
    /// Close every open order when the loop ends
    #[serde(default = "default_close_on_exit")]
    pub close_on_exit: bool,
}

impl Default for RunnerConfig {
    fn default() -> Self {
        Self {
            summary_interval_secs: default_summary_interval_secs(),
            close_on_exit: default_close_on_exit(),
        }
    }
}

fn default_summary_interval_secs() -> u64 {
    60
}

fn default_close_on_exit() -> bool {
    true
}

impl Settings {
    /// Load settings from a configuration file
    pub fn new(config_path: &str) -> Result<Self, ConfigError> {
        let s = Config::builder()
            .add_source(File::with_name(config_path))
            // Environment overrides the file, e.g. APP__POLICY__PRESET=hedging
            .add_source(config::Environment::with_prefix("APP").separator("__"))
            .build()?;

        s.try_deserialize()
    }
}

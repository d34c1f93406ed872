//! Configuration management for loadrec
//!
//! Layered like the rest of the workspace expects:
//! - YAML/TOML configuration files
//! - Environment variable overrides
//! - Reasonable defaults
//! - Configuration validation

use std::path::{Path, PathBuf};
use std::time::Duration;

use config::{Config, ConfigError, Environment, File};
use serde::{Deserialize, Serialize};

/// Default number of slots in the event channel.
pub const DEFAULT_CHANNEL_CAPACITY: usize = 1024;

/// Default park time of the parking wait strategy.
pub const DEFAULT_PARK_MICROS: u64 = 100;

const VALID_LOG_LEVELS: [&str; 5] = ["trace", "debug", "info", "warn", "error"];
const VALID_LOG_FORMATS: [&str; 2] = ["pretty", "json"];

/// Root configuration structure
#[derive(Debug, Clone, Deserialize, Serialize, Default)]
pub struct LoadrecConfig {
    #[serde(default)]
    pub recorder: RecorderConfig,

    #[serde(default)]
    pub logging: LoggingConfig,
}

impl LoadrecConfig {
    /// Load configuration from multiple sources with precedence:
    /// 1. Environment variables (highest priority)
    /// 2. Config file specified by LOADREC_CONFIG env var
    /// 3. ./config/loadrec.{yaml,toml}
    /// 4. Hardcoded defaults (lowest priority)
    pub fn load() -> Result<Self, ConfigError> {
        let mut builder = Config::builder();

        builder = Self::set_defaults(builder)?;

        if let Ok(config_path) = std::env::var("LOADREC_CONFIG") {
            builder = builder.add_source(File::with_name(&config_path).required(false));
        }

        builder = builder.add_source(File::with_name("./config/loadrec").required(false));

        // Example: LOADREC_RECORDER__CHANNEL__CAPACITY=4096
        builder = builder.add_source(
            Environment::with_prefix("LOADREC")
                .separator("__")
                .try_parsing(true),
        );

        let config: LoadrecConfig = builder.build()?.try_deserialize()?;
        config.validate()?;

        Ok(config)
    }

    fn set_defaults(
        builder: config::ConfigBuilder<config::builder::DefaultState>,
    ) -> Result<config::ConfigBuilder<config::builder::DefaultState>, ConfigError> {
        builder
            .set_default("recorder.channel.capacity", DEFAULT_CHANNEL_CAPACITY as u64)?
            .set_default("recorder.channel.wait_strategy", "parking")?
            .set_default("recorder.channel.park_micros", DEFAULT_PARK_MICROS)?
            .set_default("logging.level", "info")?
            .set_default("logging.format", "pretty")
    }

    /// Validate configuration values
    pub fn validate(&self) -> Result<(), ConfigError> {
        self.recorder
            .channel
            .validate()
            .map_err(ConfigError::Message)?;

        if !VALID_LOG_LEVELS.contains(&self.logging.level.as_str()) {
            return Err(ConfigError::Message(format!(
                "logging.level must be one of {VALID_LOG_LEVELS:?}, got `{}`",
                self.logging.level
            )));
        }

        if !VALID_LOG_FORMATS.contains(&self.logging.format.as_str()) {
            return Err(ConfigError::Message(format!(
                "logging.format must be one of {VALID_LOG_FORMATS:?}, got `{}`",
                self.logging.format
            )));
        }

        Ok(())
    }

    /// Load configuration from a specific file path
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let config: LoadrecConfig = Self::set_defaults(Config::builder())?
            .add_source(File::from(path.as_ref()))
            .build()?
            .try_deserialize()?;
        config.validate()?;

        Ok(config)
    }
}

/// Values file recorder configuration
#[derive(Debug, Clone, Deserialize, Serialize, Default)]
pub struct RecorderConfig {
    /// Output values file; callers usually supply it per run
    #[serde(default)]
    pub file_path: Option<PathBuf>,

    #[serde(default)]
    pub channel: ChannelConfig,
}

/// How the channel consumer waits for work and the producer waits for room
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum WaitStrategyKind {
    /// Spin on the cursor; lowest latency, burns a core
    BusySpin,
    /// Spin briefly, then yield the time slice
    Yielding,
    /// Spin, yield, then park for `park_micros`
    Parking,
}

/// Bounded event channel configuration
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
pub struct ChannelConfig {
    /// Number of slots; must be a power of two
    #[serde(default = "default_capacity")]
    pub capacity: usize,

    #[serde(default = "default_wait_strategy")]
    pub wait_strategy: WaitStrategyKind,

    /// Park time of the parking strategy, in microseconds
    #[serde(default = "default_park_micros")]
    pub park_micros: u64,
}

fn default_capacity() -> usize {
    DEFAULT_CHANNEL_CAPACITY
}

fn default_wait_strategy() -> WaitStrategyKind {
    WaitStrategyKind::Parking
}

fn default_park_micros() -> u64 {
    DEFAULT_PARK_MICROS
}

impl Default for ChannelConfig {
    fn default() -> Self {
        Self {
            capacity: default_capacity(),
            wait_strategy: default_wait_strategy(),
            park_micros: default_park_micros(),
        }
    }
}

impl ChannelConfig {
    /// Park duration of the parking strategy
    pub fn park_timeout(&self) -> Duration {
        Duration::from_micros(self.park_micros)
    }

    /// Checks the capacity and wait parameters.
    pub fn validate(&self) -> Result<(), String> {
        if self.capacity == 0 || !self.capacity.is_power_of_two() {
            return Err(format!(
                "recorder.channel.capacity must be a non-zero power of two, got {}",
                self.capacity
            ));
        }

        if self.wait_strategy == WaitStrategyKind::Parking && self.park_micros == 0 {
            return Err(
                "recorder.channel.park_micros must be > 0 with the parking strategy".to_string(),
            );
        }

        Ok(())
    }
}

/// Logging configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// Log level: trace, debug, info, warn, error (default: "info")
    #[serde(default = "default_log_level")]
    pub level: String,

    /// Log format: json or pretty (default: "pretty")
    #[serde(default = "default_log_format")]
    pub format: String,
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_log_format() -> String {
    "pretty".to_string()
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            format: default_log_format(),
        }
    }
}

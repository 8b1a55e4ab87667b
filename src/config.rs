// src/config.rs - Single configuration file
//! # Host Configuration
//!
//! Every field has a default, so an empty file (or no file at all) gives the
//! stock setup: 115200 baud, 100 ms read timeout, 200 ms ticks, 100 visible
//! points, 25.0 °C starting setpoint.
//!
//! ## Example: TOML Configuration
//!
//! ```toml
//! [link]
//! baud = 115200
//! read_timeout_ms = 100
//! max_consecutive_misses = 50
//!
//! [control]
//! initial_target = 22.5
//! tick_interval_ms = 200
//! max_points = 300
//!
//! [simulation]
//! gain = 0.05
//! jitter = 0.05
//! seed = 42
//! ```
//!
//! ## Example: Rust Usage
//!
//! ```rust
//! use thermo_rs::config::Config;
//! let config: Config = toml::from_str("[control]\ninitial_target = 22.5\n").unwrap();
//! assert_eq!(config.control.initial_target, 22.5);
//! assert_eq!(config.link.baud, 115200);
//! assert!(config.validate().is_ok());
//! ```

use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;
use thiserror::Error;

/// Upper bound on a single serial read so one tick cannot stall the scheduler.
pub const MAX_READ_TIMEOUT_MS: u64 = 100;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("TOML parse error: {0}")]
    Toml(#[from] toml::de::Error),
    #[error("Invalid configuration: {0}")]
    Invalid(String),
}

#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct Config {
    #[serde(default)]
    pub link: LinkConfig,
    #[serde(default)]
    pub control: ControlConfig,
    #[serde(default)]
    pub simulation: SimulationConfig,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct LinkConfig {
    #[serde(default = "default_baud")]
    pub baud: u32,
    #[serde(default = "default_read_timeout_ms")]
    pub read_timeout_ms: u64,
    /// Consecutive unusable reads after which a physical link counts as lost.
    /// Unset means stale readings are carried forward indefinitely.
    #[serde(default)]
    pub max_consecutive_misses: Option<u32>,
}

impl Default for LinkConfig {
    fn default() -> Self {
        Self {
            baud: default_baud(),
            read_timeout_ms: default_read_timeout_ms(),
            max_consecutive_misses: None,
        }
    }
}

impl LinkConfig {
    pub fn read_timeout(&self) -> Duration {
        Duration::from_millis(self.read_timeout_ms)
    }
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ControlConfig {
    #[serde(default = "default_initial_target")]
    pub initial_target: f64,
    #[serde(default = "default_tick_interval_ms")]
    pub tick_interval_ms: u64,
    #[serde(default = "default_max_points")]
    pub max_points: usize,
    #[serde(default = "default_stable_band")]
    pub stable_band: f64,
    #[serde(default = "default_reconcile_tolerance")]
    pub reconcile_tolerance: f64,
    #[serde(default = "default_axis_padding")]
    pub axis_padding: f64,
}

impl Default for ControlConfig {
    fn default() -> Self {
        Self {
            initial_target: default_initial_target(),
            tick_interval_ms: default_tick_interval_ms(),
            max_points: default_max_points(),
            stable_band: default_stable_band(),
            reconcile_tolerance: default_reconcile_tolerance(),
            axis_padding: default_axis_padding(),
        }
    }
}

impl ControlConfig {
    pub fn tick_interval(&self) -> Duration {
        Duration::from_millis(self.tick_interval_ms)
    }

    pub fn tick_seconds(&self) -> f64 {
        self.tick_interval_ms as f64 / 1000.0
    }
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct SimulationConfig {
    /// Fraction of the gap to target closed per tick.
    #[serde(default = "default_gain")]
    pub gain: f64,
    /// Half-width of the uniform noise added per tick, °C.
    #[serde(default = "default_jitter")]
    pub jitter: f64,
    #[serde(default = "default_initial_measured")]
    pub initial_measured: f64,
    #[serde(default)]
    pub seed: Option<u64>,
}

impl Default for SimulationConfig {
    fn default() -> Self {
        Self {
            gain: default_gain(),
            jitter: default_jitter(),
            initial_measured: default_initial_measured(),
            seed: None,
        }
    }
}

impl Config {
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.link.baud == 0 {
            return Err(ConfigError::Invalid("link.baud must be non-zero".to_string()));
        }
        if self.link.read_timeout_ms == 0 || self.link.read_timeout_ms > MAX_READ_TIMEOUT_MS {
            return Err(ConfigError::Invalid(format!(
                "link.read_timeout_ms must be within 1..={}",
                MAX_READ_TIMEOUT_MS
            )));
        }
        if self.link.max_consecutive_misses == Some(0) {
            return Err(ConfigError::Invalid(
                "link.max_consecutive_misses must be at least 1 when set".to_string(),
            ));
        }
        if self.control.tick_interval_ms == 0 {
            return Err(ConfigError::Invalid("control.tick_interval_ms must be non-zero".to_string()));
        }
        if self.control.max_points == 0 {
            return Err(ConfigError::Invalid("control.max_points must be non-zero".to_string()));
        }
        check_finite("control.initial_target", self.control.initial_target)?;
        check_finite("simulation.initial_measured", self.simulation.initial_measured)?;
        check_non_negative("control.stable_band", self.control.stable_band)?;
        check_non_negative("control.reconcile_tolerance", self.control.reconcile_tolerance)?;
        check_non_negative("control.axis_padding", self.control.axis_padding)?;
        check_non_negative("simulation.jitter", self.simulation.jitter)?;
        check_non_negative("simulation.gain", self.simulation.gain)?;
        if self.simulation.gain > 1.0 {
            return Err(ConfigError::Invalid("simulation.gain must not exceed 1.0".to_string()));
        }
        Ok(())
    }
}

fn check_finite(name: &str, value: f64) -> Result<(), ConfigError> {
    if value.is_finite() {
        Ok(())
    } else {
        Err(ConfigError::Invalid(format!("{} must be finite", name)))
    }
}

fn check_non_negative(name: &str, value: f64) -> Result<(), ConfigError> {
    check_finite(name, value)?;
    if value < 0.0 {
        return Err(ConfigError::Invalid(format!("{} must not be negative", name)));
    }
    Ok(())
}

// Default value functions
fn default_baud() -> u32 { 115200 }
fn default_read_timeout_ms() -> u64 { 100 }
fn default_initial_target() -> f64 { 25.0 }
fn default_tick_interval_ms() -> u64 { 200 }
fn default_max_points() -> usize { 100 }
fn default_stable_band() -> f64 { thermo_shared::STABLE_BAND }
fn default_reconcile_tolerance() -> f64 { 0.01 }
fn default_axis_padding() -> f64 { 2.0 }
fn default_gain() -> f64 { 0.05 }
fn default_jitter() -> f64 { 0.05 }
fn default_initial_measured() -> f64 { 20.0 }

/// Load and validate configuration from a TOML file.
pub fn load_config<P: AsRef<Path>>(path: P) -> Result<Config, ConfigError> {
    let content = std::fs::read_to_string(path)?;
    let config: Config = toml::from_str(&content)?;
    config.validate()?;
    Ok(config)
}

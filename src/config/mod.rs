//! Configuration for the acquisition pipeline
//!
//! Supports loading configuration from TOML files. All settings have
//! defaults, so an empty file (or no file at all) yields a working
//! configuration for the simulated device.
//!
//! # Example
//! ```ignore
//! let config = Config::load("config.toml")?;
//! let mode = config.acquisition.mode();
//! ```

use serde::Deserialize;
use std::path::Path;
use thiserror::Error;

use crate::common::AcquisitionMode;
use crate::driver::sim::SimTdcConfig;

/// Configuration errors
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Failed to read config file: {0}")]
    IoError(#[from] std::io::Error),

    #[error("Failed to parse TOML: {0}")]
    TomlError(#[from] toml::de::Error),
}

/// Top-level configuration
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct Config {
    pub acquisition: AcquisitionConfig,
    /// Simulated device settings (used when no hardware is attached)
    pub sim: SimTdcConfig,
}

impl Config {
    /// Load configuration from a TOML file
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path)?;
        Self::from_toml(&content)
    }

    /// Load configuration from a TOML string (useful for testing)
    pub fn from_toml(content: &str) -> Result<Self, ConfigError> {
        let config: Config = toml::from_str(content)?;
        Ok(config)
    }
}

/// Acquisition settings passed by value into the measurement loop
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct AcquisitionConfig {
    /// Request raw TDC fields instead of reconstructed DLD events
    pub raw_mode: bool,

    /// Duration of one measurement cycle in milliseconds
    pub duration_ms: u32,

    /// Event queue bound; absent = unbounded (no backpressure, original
    /// driver behavior). When set, a full queue blocks the driver callback.
    pub queue_capacity: Option<usize>,

    /// How long the loop waits on the queue before declaring the driver
    /// wedged and failing the run
    pub drain_timeout_ms: u64,

    /// Stop after this many completed cycles; absent = run until an
    /// external stop is requested
    pub max_cycles: Option<u64>,
}

impl Default for AcquisitionConfig {
    fn default() -> Self {
        Self {
            raw_mode: false,
            duration_ms: 100,
            queue_capacity: None,
            drain_timeout_ms: 5000,
            max_cycles: None,
        }
    }
}

impl AcquisitionConfig {
    /// The acquisition mode implied by `raw_mode`
    pub fn mode(&self) -> AcquisitionMode {
        AcquisitionMode::from_raw_flag(self.raw_mode)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_empty_toml_gives_defaults() {
        let config = Config::from_toml("").unwrap();
        assert!(!config.acquisition.raw_mode);
        assert_eq!(config.acquisition.duration_ms, 100);
        assert_eq!(config.acquisition.queue_capacity, None);
        assert_eq!(config.acquisition.drain_timeout_ms, 5000);
        assert_eq!(config.acquisition.max_cycles, None);
    }

    #[test]
    fn test_full_acquisition_section() {
        let config = Config::from_toml(
            r#"
            [acquisition]
            raw_mode = true
            duration_ms = 50
            queue_capacity = 256
            drain_timeout_ms = 1000
            max_cycles = 10
            "#,
        )
        .unwrap();

        assert!(config.acquisition.raw_mode);
        assert_eq!(config.acquisition.duration_ms, 50);
        assert_eq!(config.acquisition.queue_capacity, Some(256));
        assert_eq!(config.acquisition.drain_timeout_ms, 1000);
        assert_eq!(config.acquisition.max_cycles, Some(10));
        assert_eq!(config.acquisition.mode(), AcquisitionMode::Raw);
    }

    #[test]
    fn test_sim_section() {
        let config = Config::from_toml(
            r#"
            [sim]
            events_per_batch = 32
            batches_per_measurement = 4
            seed = 12345
            "#,
        )
        .unwrap();

        assert_eq!(config.sim.events_per_batch, 32);
        assert_eq!(config.sim.batches_per_measurement, 4);
        assert_eq!(config.sim.seed, Some(12345));
    }

    #[test]
    fn test_mode_mapping() {
        let config = Config::from_toml("[acquisition]\nraw_mode = false\n").unwrap();
        assert_eq!(config.acquisition.mode(), AcquisitionMode::Dld);
    }

    #[test]
    fn test_invalid_toml_is_rejected() {
        let result = Config::from_toml("[acquisition\nraw_mode = oops");
        assert!(matches!(result, Err(ConfigError::TomlError(_))));
    }
}

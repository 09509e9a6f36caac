//! Process configuration.
//!
//! Stored as a JSON document on disk; every section is optional and falls
//! back to its defaults:
//! ```json
//! {
//!   "tariff": { "flag_amount": 1.30, "min_fare": 3.47, "day_start_hour": 5, "day_end_hour": 23 },
//!   "batch": { "batch_size": 100, "flush_interval_secs": 5 },
//!   "pipeline": { "workers": 8, "queue_capacity": 1024 }
//! }
//! ```
//! The loaded value is passed by reference into the components that need it.

use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config file '{path}': {source}")]
    Read {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to parse config file '{path}': {source}")]
    Parse {
        path: String,
        #[source]
        source: serde_json::Error,
    },

    #[error("invalid config: {0}")]
    Invalid(String),
}

/// Fare rates and the day/night window. Hours are UTC, in `[0, 24)`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TariffConfig {
    pub flag_amount: f64,
    pub min_fare: f64,
    pub idle_fare_per_hour: f64,
    pub moving_day_fare_per_km: f64,
    pub moving_night_fare_per_km: f64,
    /// First daytime hour, inclusive.
    pub day_start_hour: u32,
    /// First night hour, exclusive end of the day window.
    pub day_end_hour: u32,
}

impl Default for TariffConfig {
    fn default() -> Self {
        Self {
            flag_amount: 1.30,
            min_fare: 3.47,
            idle_fare_per_hour: 11.90,
            moving_day_fare_per_km: 0.74,
            moving_night_fare_per_km: 1.30,
            day_start_hour: 5,
            day_end_hour: 23,
        }
    }
}

/// Size and time triggers for persisting fares, plus the retry budget per flush.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct BatchConfig {
    pub batch_size: usize,
    pub flush_interval_secs: u64,
    /// Total write attempts per batch, including the first one.
    pub max_attempts: u32,
    pub retry_backoff_ms: u64,
}

impl Default for BatchConfig {
    fn default() -> Self {
        Self {
            batch_size: 100,
            flush_interval_secs: 5,
            max_attempts: 3,
            retry_backoff_ms: 200,
        }
    }
}

impl BatchConfig {
    pub fn flush_interval(&self) -> Duration {
        Duration::from_secs(self.flush_interval_secs)
    }

    pub fn retry_backoff(&self) -> Duration {
        Duration::from_millis(self.retry_backoff_ms)
    }
}

/// Concurrency limits for the pipeline stages.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PipelineConfig {
    /// Maximum number of fares calculated at the same time.
    pub workers: usize,
    /// Capacity of every inter-stage queue.
    pub queue_capacity: usize,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            workers: 8,
            queue_capacity: 1024,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    pub input_path: Option<String>,
    pub output_path: Option<String>,
    pub tariff: TariffConfig,
    pub batch: BatchConfig,
    pub pipeline: PipelineConfig,
}

impl AppConfig {
    /// Loads and validates the config from a JSON file at `path`.
    pub fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.display().to_string(),
            source,
        })?;
        let config: AppConfig =
            serde_json::from_str(&content).map_err(|source| ConfigError::Parse {
                path: path.display().to_string(),
                source,
            })?;
        config.validate()?;
        Ok(config)
    }

    /// Loads from `path` when given, otherwise returns validated defaults.
    pub fn load_or_default(path: Option<&str>) -> Result<Self, ConfigError> {
        match path {
            Some(path) => Self::load(path),
            None => {
                let config = Self::default();
                config.validate()?;
                Ok(config)
            }
        }
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        let t = &self.tariff;
        if t.day_start_hour >= 24 || t.day_end_hour >= 24 {
            return Err(ConfigError::Invalid(format!(
                "day hours must be in [0, 24), got start={} end={}",
                t.day_start_hour, t.day_end_hour
            )));
        }

        let rates = [
            ("flag_amount", t.flag_amount),
            ("min_fare", t.min_fare),
            ("idle_fare_per_hour", t.idle_fare_per_hour),
            ("moving_day_fare_per_km", t.moving_day_fare_per_km),
            ("moving_night_fare_per_km", t.moving_night_fare_per_km),
        ];
        for (name, value) in rates {
            if !value.is_finite() || value < 0.0 {
                return Err(ConfigError::Invalid(format!(
                    "{name} must be a non-negative number, got {value}"
                )));
            }
        }

        if self.batch.batch_size == 0 {
            return Err(ConfigError::Invalid("batch.batch_size must be > 0".into()));
        }
        if self.batch.flush_interval_secs == 0 {
            return Err(ConfigError::Invalid(
                "batch.flush_interval_secs must be > 0".into(),
            ));
        }
        if self.batch.max_attempts == 0 {
            return Err(ConfigError::Invalid("batch.max_attempts must be > 0".into()));
        }
        if self.pipeline.workers == 0 {
            return Err(ConfigError::Invalid("pipeline.workers must be > 0".into()));
        }
        if self.pipeline.queue_capacity == 0 {
            return Err(ConfigError::Invalid(
                "pipeline.queue_capacity must be > 0".into(),
            ));
        }

        Ok(())
    }
}

//! Estimator configuration
//!
//! [`EstimatorConfig`] collects every tunable of the estimator, its pose history and the update
//! loop. It round-trips through JSON, YAML and TOML; the file format is chosen from the file
//! extension. Every field has a default, so a configuration file only needs to name the values
//! it changes.

use std::fs::File;
use std::io::{self, Read, Write};
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::error::{EstimatorError, Result};
use crate::history::DEFAULT_CAPACITY;
use crate::interpolate::InterpolationStrategy;

fn default_initial_covariance() -> f64 {
    1.0
}
fn default_process_noise() -> [f64; 6] {
    [1.0; 6]
}
fn default_measurement_noise() -> [f64; 6] {
    [0.01; 6]
}
fn default_min_measurement_std() -> f64 {
    0.05
}
fn default_history_capacity() -> usize {
    DEFAULT_CAPACITY
}
fn default_select_timeout_ms() -> u64 {
    100
}
fn default_channel_capacity() -> usize {
    256
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct EstimatorConfig {
    /// Diagonal of the covariance after construction or reset
    #[serde(default = "default_initial_covariance")]
    pub initial_covariance: f64,
    /// Diagonal of the process noise Q, `[pos n, e, d, vel n, e, d]`
    #[serde(default = "default_process_noise")]
    pub process_noise: [f64; 6],
    /// Diagonal of the fixed measurement noise R, same ordering as `process_noise`
    #[serde(default = "default_measurement_noise")]
    pub measurement_noise: [f64; 6],
    /// Build R from each fix's reported standard deviations instead of `measurement_noise`
    #[serde(default)]
    pub noise_from_fix: bool,
    /// Floor applied to per-fix standard deviations, meters or m/s
    #[serde(default = "default_min_measurement_std")]
    pub min_measurement_std: f64,
    #[serde(default = "default_history_capacity")]
    pub history_capacity: usize,
    #[serde(default)]
    pub interpolation: InterpolationStrategy,
    /// How long the update loop waits for an event before checking for shutdown
    #[serde(default = "default_select_timeout_ms")]
    pub select_timeout_ms: u64,
    /// Bound of the sensor event channel
    #[serde(default = "default_channel_capacity")]
    pub channel_capacity: usize,
    /// Append one CSV row per predictor cycle to this file
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub diagnostic_log: Option<PathBuf>,
    /// Log the covariance trace on every cycle
    #[serde(default)]
    pub verbose: bool,
}

impl Default for EstimatorConfig {
    fn default() -> Self {
        EstimatorConfig {
            initial_covariance: default_initial_covariance(),
            process_noise: default_process_noise(),
            measurement_noise: default_measurement_noise(),
            noise_from_fix: false,
            min_measurement_std: default_min_measurement_std(),
            history_capacity: default_history_capacity(),
            interpolation: InterpolationStrategy::default(),
            select_timeout_ms: default_select_timeout_ms(),
            channel_capacity: default_channel_capacity(),
            diagnostic_log: None,
            verbose: false,
        }
    }
}

impl EstimatorConfig {
    /// Reject values the estimator cannot run with.
    pub fn validate(&self) -> Result<()> {
        let positive = |name: &str, value: f64| {
            if value.is_finite() && value > 0.0 {
                Ok(())
            } else {
                Err(EstimatorError::Config(format!(
                    "{name} must be positive and finite, got {value}"
                )))
            }
        };
        positive("initial_covariance", self.initial_covariance)?;
        for (i, q) in self.process_noise.iter().enumerate() {
            if !(q.is_finite() && *q >= 0.0) {
                return Err(EstimatorError::Config(format!(
                    "process_noise[{i}] must be non-negative and finite, got {q}"
                )));
            }
        }
        for (i, r) in self.measurement_noise.iter().enumerate() {
            positive(&format!("measurement_noise[{i}]"), *r)?;
        }
        positive("min_measurement_std", self.min_measurement_std)?;
        if self.history_capacity < 2 {
            return Err(EstimatorError::Config(format!(
                "history_capacity must be at least 2, got {}",
                self.history_capacity
            )));
        }
        if self.select_timeout_ms == 0 {
            return Err(EstimatorError::Config(
                "select_timeout_ms must be non-zero".to_string(),
            ));
        }
        if self.channel_capacity == 0 {
            return Err(EstimatorError::Config(
                "channel_capacity must be non-zero".to_string(),
            ));
        }
        Ok(())
    }

    /// Write the configuration to a JSON file (pretty-printed).
    pub fn to_json<P: AsRef<Path>>(&self, path: P) -> io::Result<()> {
        let file = File::create(path)?;
        serde_json::to_writer_pretty(file, self).map_err(io::Error::other)
    }
    /// Read the configuration from a JSON file.
    pub fn from_json<P: AsRef<Path>>(path: P) -> io::Result<Self> {
        let file = File::open(path)?;
        serde_json::from_reader(file).map_err(io::Error::other)
    }
    /// Write the configuration as YAML.
    pub fn to_yaml<P: AsRef<Path>>(&self, path: P) -> io::Result<()> {
        let mut file = File::create(path)?;
        let s = serde_yaml::to_string(self).map_err(io::Error::other)?;
        file.write_all(s.as_bytes())
    }
    /// Read the configuration from YAML.
    pub fn from_yaml<P: AsRef<Path>>(path: P) -> io::Result<Self> {
        let file = File::open(path)?;
        serde_yaml::from_reader(file).map_err(io::Error::other)
    }
    /// Write the configuration as TOML.
    pub fn to_toml<P: AsRef<Path>>(&self, path: P) -> io::Result<()> {
        let mut file = File::create(path)?;
        let s = toml::to_string(self).map_err(io::Error::other)?;
        file.write_all(s.as_bytes())
    }
    /// Read the configuration from TOML.
    pub fn from_toml<P: AsRef<Path>>(path: P) -> io::Result<Self> {
        let mut s = String::new();
        File::open(path)?.read_to_string(&mut s)?;
        toml::from_str(&s).map_err(io::Error::other)
    }
    /// Generic write: choose format by file extension (.json/.yaml/.yml/.toml)
    pub fn to_file<P: AsRef<Path>>(&self, path: P) -> io::Result<()> {
        let p = path.as_ref();
        match extension(p).as_deref() {
            Some("json") => self.to_json(p),
            Some("yaml") | Some("yml") => self.to_yaml(p),
            Some("toml") => self.to_toml(p),
            _ => Err(unsupported(p)),
        }
    }
    /// Generic read: choose format by file extension (.json/.yaml/.yml/.toml)
    pub fn from_file<P: AsRef<Path>>(path: P) -> io::Result<Self> {
        let p = path.as_ref();
        match extension(p).as_deref() {
            Some("json") => Self::from_json(p),
            Some("yaml") | Some("yml") => Self::from_yaml(p),
            Some("toml") => Self::from_toml(p),
            _ => Err(unsupported(p)),
        }
    }
}

fn extension(path: &Path) -> Option<String> {
    path.extension()
        .and_then(|s| s.to_str())
        .map(|s| s.to_lowercase())
}

fn unsupported(path: &Path) -> io::Error {
    io::Error::new(
        io::ErrorKind::InvalidInput,
        format!("unsupported config file extension: {}", path.display()),
    )
}

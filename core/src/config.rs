//! Filter configuration and configuration file I/O.
//!
//! [MclConfig] gathers every tunable of the [crate::filter::MonteCarloLocalizer]. Any type implementing
//! [ConfigFile] can be written to and read from JSON, YAML, or TOML, with the format picked from the file
//! extension.
//!
//! ```no_run
//! use mcl::config::{ConfigFile, MclConfig};
//!
//! let config = MclConfig { n_particles: 500, ..Default::default() };
//! config.to_file("mcl.toml").unwrap();
//! let loaded = MclConfig::from_file("mcl.toml").unwrap();
//! assert_eq!(loaded.n_particles, 500);
//! ```
use crate::error::{MclError, Result};
use crate::particle::{DEFAULT_MAX_ATTEMPTS, ParticleAveragingStrategy, PerturbationStrategy};
use crate::scan::SensorConfig;

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::fs::File;
use std::io::{self, Read, Write};
use std::path::Path;

/// JSON/YAML/TOML persistence for serialisable configuration types.
pub trait ConfigFile: Serialize + DeserializeOwned {
    /// Write the configuration to a JSON file (pretty-printed).
    fn to_json<P: AsRef<Path>>(&self, path: P) -> io::Result<()> {
        let file = File::create(path)?;
        serde_json::to_writer_pretty(file, self).map_err(io::Error::other)
    }
    /// Read the configuration from a JSON file.
    fn from_json<P: AsRef<Path>>(path: P) -> io::Result<Self> {
        let file = File::open(path)?;
        serde_json::from_reader(file).map_err(io::Error::other)
    }
    /// Write the configuration as YAML.
    fn to_yaml<P: AsRef<Path>>(&self, path: P) -> io::Result<()> {
        let mut file = File::create(path)?;
        let s = serde_yaml::to_string(self).map_err(io::Error::other)?;
        file.write_all(s.as_bytes())
    }
    /// Read the configuration from YAML.
    fn from_yaml<P: AsRef<Path>>(path: P) -> io::Result<Self> {
        let file = File::open(path)?;
        serde_yaml::from_reader(file).map_err(io::Error::other)
    }
    /// Write the configuration as TOML.
    fn to_toml<P: AsRef<Path>>(&self, path: P) -> io::Result<()> {
        let mut file = File::create(path)?;
        let s = toml::to_string(self).map_err(io::Error::other)?;
        file.write_all(s.as_bytes())
    }
    /// Read the configuration from TOML.
    fn from_toml<P: AsRef<Path>>(path: P) -> io::Result<Self> {
        let mut s = String::new();
        let mut file = File::open(path)?;
        file.read_to_string(&mut s)?;
        toml::from_str(&s).map_err(io::Error::other)
    }
    /// Generic write: choose format by file extension (.json/.yaml/.yml/.toml)
    fn to_file<P: AsRef<Path>>(&self, path: P) -> io::Result<()> {
        let p = path.as_ref();
        match extension(p).as_deref() {
            Some("json") => self.to_json(p),
            Some("yaml") | Some("yml") => self.to_yaml(p),
            Some("toml") => self.to_toml(p),
            _ => Err(io::Error::new(
                io::ErrorKind::InvalidInput,
                "unsupported file extension",
            )),
        }
    }
    /// Generic read: choose format by file extension (.json/.yaml/.yml/.toml)
    fn from_file<P: AsRef<Path>>(path: P) -> io::Result<Self> {
        let p = path.as_ref();
        match extension(p).as_deref() {
            Some("json") => Self::from_json(p),
            Some("yaml") | Some("yml") => Self::from_yaml(p),
            Some("toml") => Self::from_toml(p),
            _ => Err(io::Error::new(
                io::ErrorKind::InvalidInput,
                "unsupported file extension",
            )),
        }
    }
}

fn extension(path: &Path) -> Option<String> {
    path.extension()
        .and_then(|s| s.to_str())
        .map(|s| s.to_lowercase())
}

fn default_n_particles() -> usize {
    1000
}
fn default_max_sampling_attempts() -> usize {
    DEFAULT_MAX_ATTEMPTS
}
/// Default seed value for reproducible runs
fn default_seed() -> u64 {
    42
}

/// Configuration of a [crate::filter::MonteCarloLocalizer].
///
/// Every field has a default, so a configuration file only needs to name what it changes.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct MclConfig {
    /// Size of the particle set, fixed across every resampling cycle
    #[serde(default = "default_n_particles")]
    pub n_particles: usize,
    /// Rejection-sampling attempts per pose before reporting exhaustion
    #[serde(default = "default_max_sampling_attempts")]
    pub max_sampling_attempts: usize,
    /// Treat UNKNOWN cells as invalid positions for sampling
    #[serde(default)]
    pub reject_unknown: bool,
    /// Log a population summary at `info` level after every update
    #[serde(default)]
    pub diagnostics: bool,
    /// Seed of the filter's master random number generator.
    ///
    /// Use the same seed to repeat a run exactly.
    #[serde(default = "default_seed")]
    pub seed: u64,
    #[serde(default)]
    pub averaging: ParticleAveragingStrategy,
    #[serde(default)]
    pub perturbation: PerturbationStrategy,
    #[serde(default)]
    pub sensor: SensorConfig,
}

impl Default for MclConfig {
    fn default() -> Self {
        MclConfig {
            n_particles: default_n_particles(),
            max_sampling_attempts: default_max_sampling_attempts(),
            reject_unknown: false,
            diagnostics: false,
            seed: default_seed(),
            averaging: ParticleAveragingStrategy::default(),
            perturbation: PerturbationStrategy::default(),
            sensor: SensorConfig::default(),
        }
    }
}

impl ConfigFile for MclConfig {}

impl MclConfig {
    /// Check the configuration for values the filter cannot run with.
    pub fn validate(&self) -> Result<()> {
        if self.n_particles == 0 {
            return Err(MclError::InvalidPopulation(
                "n_particles must be positive".to_string(),
            ));
        }
        if self.max_sampling_attempts == 0 {
            return Err(MclError::InvalidParameter(
                "max_sampling_attempts must be positive".to_string(),
            ));
        }
        if let PerturbationStrategy::Fixed {
            spatial_std,
            angular_spread,
        } = self.perturbation
        {
            if !(spatial_std.is_finite() && spatial_std >= 0.0)
                || !(angular_spread.is_finite() && angular_spread >= 0.0)
            {
                return Err(MclError::InvalidParameter(format!(
                    "fixed perturbation must be non-negative, got ({}, {})",
                    spatial_std, angular_spread
                )));
            }
        }
        self.sensor.validate()
    }
}

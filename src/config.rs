// Copyright 2026 QubitOS Contributors
// SPDX-License-Identifier: Apache-2.0

//! Configuration management for the sequencer.
//!
//! Configuration is loaded from multiple sources with the following priority
//! (later sources override earlier ones):
//!
//! 1. Built-in defaults
//! 2. config.yaml file
//! 3. Environment variables (QUBITOS_*)
//! 4. CLI arguments

use serde::{Deserialize, Serialize};
use std::env;
use std::path::Path;

use crate::error::{Error, Result};
use crate::schedule::eom::{RydbergBeam, RydbergEom};

/// Main configuration structure.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Config {
    /// Logging settings
    #[serde(default)]
    pub logging: LoggingConfig,

    /// Sample grid
    #[serde(default)]
    pub sampling: SamplingConfig,

    /// Scheduler defaults
    #[serde(default)]
    pub scheduler: SchedulerConfig,

    /// Permitted EOM off-detunings
    #[serde(default)]
    pub eom: EomConfig,

    /// Validation settings
    #[serde(default)]
    pub validation: ValidationConfig,
}

impl Config {
    /// Load configuration from file and environment.
    pub fn load(config_path: Option<&Path>) -> Result<Self> {
        let mut config = Config::default();

        if let Some(path) = config_path {
            if path.exists() {
                let content = std::fs::read_to_string(path)?;
                config = serde_yaml::from_str(&content)?;
            }
        } else {
            for path in &[
                "qubitos-seq.yaml",
                "config.yaml",
                "config.yml",
                "/etc/qubitos/sequencer.yaml",
            ] {
                let path = Path::new(path);
                if path.exists() {
                    let content = std::fs::read_to_string(path)?;
                    config = serde_yaml::from_str(&content)?;
                    break;
                }
            }
        }

        config.apply_env_overrides();

        Ok(config)
    }

    /// Apply environment variable overrides.
    fn apply_env_overrides(&mut self) {
        if let Ok(val) = env::var("QUBITOS_LOG_LEVEL") {
            self.logging.level = val;
        }
        if let Ok(val) = env::var("QUBITOS_LOG_FORMAT") {
            self.logging.format = val;
        }
        if let Ok(val) = env::var("QUBITOS_SAMPLES_PER_NS") {
            if let Ok(rate) = val.parse() {
                self.sampling.samples_per_ns = rate;
            }
        }
        if let Ok(val) = env::var("QUBITOS_MAX_LOCAL_TARGETS") {
            if let Ok(n) = val.parse() {
                self.scheduler.default_max_targets = n;
            }
        }
        if let Ok(val) = env::var("QUBITOS_STRICT_VALIDATION") {
            self.validation.strict = val.to_lowercase() == "true" || val == "1";
        }
    }

    /// Validate configuration.
    pub fn validate(&self) -> Result<()> {
        if !matches!(self.logging.format.as_str(), "json" | "pretty") {
            return Err(Error::Config(format!(
                "log format must be 'json' or 'pretty', got '{}'",
                self.logging.format
            )));
        }
        if self.sampling.samples_per_ns == 0 {
            return Err(Error::Config("samples_per_ns cannot be 0".into()));
        }
        if self.scheduler.default_max_targets == 0 {
            return Err(Error::Config("default_max_targets cannot be 0".into()));
        }
        self.eom.validate()?;
        let limits = &self.validation.limits;
        if limits.max_operations == 0
            || limits.max_register_size == 0
            || limits.max_samples_per_waveform == 0
            || limits.max_total_duration_ns == 0
            || limits.max_batch_size == 0
        {
            return Err(Error::Config("resource limits must be positive".into()));
        }
        if !self.validation.strict {
            tracing::warn!(
                "Strict validation is disabled: timeline conflicts are logged, not rejected."
            );
        }
        Ok(())
    }
}

/// Logging configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// Log level (trace, debug, info, warn, error)
    #[serde(default = "default_log_level")]
    pub level: String,

    /// Log format (json, pretty)
    #[serde(default = "default_log_format")]
    pub format: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            format: default_log_format(),
        }
    }
}

fn default_log_level() -> String {
    "info".into()
}

fn default_log_format() -> String {
    "pretty".into()
}

/// Sample grid configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SamplingConfig {
    /// Samples per nanosecond
    #[serde(default = "default_samples_per_ns")]
    pub samples_per_ns: u32,
}

impl Default for SamplingConfig {
    fn default() -> Self {
        Self {
            samples_per_ns: default_samples_per_ns(),
        }
    }
}

fn default_samples_per_ns() -> u32 {
    1
}

/// Scheduler defaults.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SchedulerConfig {
    /// `max_targets` of local channels that do not declare one
    #[serde(default = "default_max_targets")]
    pub default_max_targets: usize,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            default_max_targets: default_max_targets(),
        }
    }
}

fn default_max_targets() -> usize {
    1
}

/// Source of permitted EOM off-detunings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "model", rename_all = "snake_case")]
pub enum EomConfig {
    /// A fixed list, whatever the on-state
    Fixed {
        #[serde(default = "default_detunings_off")]
        detunings_off: Vec<f64>,
    },
    /// Two-beam Rydberg light-shift model
    Rydberg(RydbergEom),
}

impl Default for EomConfig {
    fn default() -> Self {
        EomConfig::Fixed {
            detunings_off: default_detunings_off(),
        }
    }
}

fn default_detunings_off() -> Vec<f64> {
    vec![0.0]
}

impl EomConfig {
    fn validate(&self) -> Result<()> {
        match self {
            EomConfig::Fixed { detunings_off } => {
                if detunings_off.iter().any(|d| !d.is_finite()) {
                    return Err(Error::Config("EOM detunings_off must be finite".into()));
                }
            }
            EomConfig::Rydberg(model) => {
                if !(model.max_limiting_amp > 0.0 && model.intermediate_detuning > 0.0) {
                    return Err(Error::Config(
                        "EOM max_limiting_amp and intermediate_detuning must be positive".into(),
                    ));
                }
                let beams = &model.controlled_beams;
                let distinct = beams.len() < 2 || beams[0] != beams[1];
                if beams.is_empty() || beams.len() > 2 || !distinct {
                    return Err(Error::Config(
                        "EOM controlled_beams must name one or both of 'red' and 'blue'".into(),
                    ));
                }
            }
        }
        Ok(())
    }
}

/// Default Rydberg EOM parameters, in rad/µs.
pub fn default_rydberg_eom() -> RydbergEom {
    RydbergEom {
        max_limiting_amp: 40.0 * std::f64::consts::TAU,
        intermediate_detuning: 700.0 * std::f64::consts::TAU,
        limiting_beam: RydbergBeam::Red,
        controlled_beams: vec![RydbergBeam::Blue],
    }
}

/// Validation configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ValidationConfig {
    /// Reject programs whose timeline check reports conflicts
    #[serde(default = "default_true")]
    pub strict: bool,

    /// Resource limits
    #[serde(default)]
    pub limits: ResourceLimits,
}

impl Default for ValidationConfig {
    fn default() -> Self {
        Self {
            strict: true,
            limits: ResourceLimits::default(),
        }
    }
}

fn default_true() -> bool {
    true
}

/// Resource limits.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ResourceLimits {
    /// Maximum operations per sequence
    #[serde(default = "default_max_operations")]
    pub max_operations: u32,

    /// Maximum atoms in the register
    #[serde(default = "default_max_register_size")]
    pub max_register_size: u32,

    /// Maximum samples in one segment
    #[serde(default = "default_max_samples_per_waveform")]
    pub max_samples_per_waveform: u32,

    /// Maximum program duration in nanoseconds
    #[serde(default = "default_max_total_duration")]
    pub max_total_duration_ns: u64,

    /// Maximum binding sets per sweep
    #[serde(default = "default_max_batch_size")]
    pub max_batch_size: u32,
}

impl Default for ResourceLimits {
    fn default() -> Self {
        Self {
            max_operations: default_max_operations(),
            max_register_size: default_max_register_size(),
            max_samples_per_waveform: default_max_samples_per_waveform(),
            max_total_duration_ns: default_max_total_duration(),
            max_batch_size: default_max_batch_size(),
        }
    }
}

fn default_max_operations() -> u32 {
    10_000
}

fn default_max_register_size() -> u32 {
    256
}

fn default_max_samples_per_waveform() -> u32 {
    1_000_000
}

fn default_max_total_duration() -> u64 {
    100_000_000
}

fn default_max_batch_size() -> u32 {
    10_000
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write as _;

    #[test]
    fn test_default_config() {
        let config = Config::default();
        assert_eq!(config.sampling.samples_per_ns, 1);
        assert_eq!(config.scheduler.default_max_targets, 1);
        assert_eq!(config.logging.format, "pretty");
        assert_eq!(
            config.eom,
            EomConfig::Fixed {
                detunings_off: vec![0.0]
            }
        );
        assert!(config.validation.strict);
    }

    #[test]
    fn test_config_validation() {
        let config = Config::default();
        assert!(config.validate().is_ok());

        let mut bad_config = Config::default();
        bad_config.sampling.samples_per_ns = 0;
        assert!(bad_config.validate().is_err());
    }

    #[test]
    fn test_validate_log_format() {
        let mut config = Config::default();
        config.logging.format = "xml".into();
        let msg = format!("{}", config.validate().unwrap_err());
        assert!(msg.contains("log format"));
    }

    #[test]
    fn test_validate_rydberg_eom() {
        let mut config = Config {
            eom: EomConfig::Rydberg(default_rydberg_eom()),
            ..Config::default()
        };
        assert!(config.validate().is_ok());

        if let EomConfig::Rydberg(model) = &mut config.eom {
            model.controlled_beams = vec![RydbergBeam::Red, RydbergBeam::Red];
        }
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_config_load_from_file() {
        let mut f = tempfile::NamedTempFile::new().unwrap();
        writeln!(
            f,
            r#"
sampling:
  samples_per_ns: 4
eom:
  model: rydberg
  max_limiting_amp: 250.0
  intermediate_detuning: 4400.0
  limiting_beam: red
  controlled_beams: [blue]
validation:
  strict: false
  limits:
    max_operations: 50
"#
        )
        .unwrap();

        // Env-overridable fields are checked on the raw parse.
        let content = std::fs::read_to_string(f.path()).unwrap();
        let parsed: Config = serde_yaml::from_str(&content).unwrap();
        assert_eq!(parsed.sampling.samples_per_ns, 4);
        assert!(!parsed.validation.strict);

        let config = Config::load(Some(f.path())).unwrap();
        assert!(matches!(config.eom, EomConfig::Rydberg(_)));
        assert_eq!(config.validation.limits.max_operations, 50);
        assert_eq!(config.validation.limits.max_register_size, 256);
    }

    #[test]
    fn test_config_load_fixed_eom() {
        let mut f = tempfile::NamedTempFile::new().unwrap();
        writeln!(f, "eom:\n  model: fixed\n  detunings_off: [0.0, -5.5]").unwrap();
        let config = Config::load(Some(f.path())).unwrap();
        assert_eq!(
            config.eom,
            EomConfig::Fixed {
                detunings_off: vec![0.0, -5.5]
            }
        );
    }

    #[test]
    fn test_config_load_nonexistent_file() {
        // When a path is provided but doesn't exist, load returns defaults
        let path = std::path::Path::new("/tmp/does_not_exist_qubitos_seq_test.yaml");
        let config = Config::load(Some(path)).unwrap();
        assert_eq!(config.eom, EomConfig::default());
        assert_eq!(config.validation.limits, ResourceLimits::default());
    }

    #[test]
    fn test_config_load_invalid_yaml() {
        let mut f = tempfile::NamedTempFile::new().unwrap();
        writeln!(f, "{{{{not: valid: yaml::::").unwrap();

        let result = Config::load(Some(f.path()));
        assert!(result.is_err());
    }

    #[test]
    fn test_env_override_samples_per_ns() {
        let mut config = Config::default();
        std::env::set_var("QUBITOS_SAMPLES_PER_NS", "8");
        config.apply_env_overrides();
        assert_eq!(config.sampling.samples_per_ns, 8);
        std::env::remove_var("QUBITOS_SAMPLES_PER_NS");
    }

    #[test]
    fn test_env_override_max_targets_ignores_garbage() {
        let mut config = Config::default();
        std::env::set_var("QUBITOS_MAX_LOCAL_TARGETS", "many");
        config.apply_env_overrides();
        assert_eq!(config.scheduler.default_max_targets, 1);
        std::env::remove_var("QUBITOS_MAX_LOCAL_TARGETS");
    }

    #[test]
    fn test_env_override_strict_validation() {
        let mut config = Config::default();
        std::env::set_var("QUBITOS_STRICT_VALIDATION", "false");
        config.apply_env_overrides();
        assert!(!config.validation.strict);
        std::env::remove_var("QUBITOS_STRICT_VALIDATION");

        std::env::set_var("QUBITOS_STRICT_VALIDATION", "1");
        config.apply_env_overrides();
        assert!(config.validation.strict);
        std::env::remove_var("QUBITOS_STRICT_VALIDATION");
    }

    #[test]
    fn test_resource_limits_defaults() {
        let limits = ResourceLimits::default();
        assert_eq!(limits.max_operations, 10_000);
        assert_eq!(limits.max_register_size, 256);
        assert_eq!(limits.max_samples_per_waveform, 1_000_000);
        assert_eq!(limits.max_total_duration_ns, 100_000_000);
        assert_eq!(limits.max_batch_size, 10_000);
    }
}

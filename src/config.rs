//! Configuration System
//!
//! Provides hierarchical configuration loading from:
//! - rulevault.toml (default configuration)
//! - rulevault.local.toml (git-ignored local overrides)
//! - Environment variables (RULEVAULT_* prefix)
//!
//! ## Example
//!
//! ```toml
//! # rulevault.toml
//! [evaluation]
//! max_parallel = 8
//! collect_diagnostics = true
//!
//! [logging]
//! level = "info"
//! format = "text"
//! ```
//!
//! Environment variable overrides:
//! ```bash
//! RULEVAULT_EVALUATION__MAX_PARALLEL=4
//! RULEVAULT_LOGGING__LEVEL=debug
//! ```

use figment::{Figment, providers::{Env, Format, Toml}};
use serde::{Deserialize, Serialize};

/// Main configuration struct.
///
/// Nothing in the core evaluation algorithms depends on this being loaded;
/// it exists as a convenience default for embedding applications that want
/// to source evaluation defaults and logging setup from a file/environment
/// rather than wiring `EvalOptions` up by hand.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub evaluation: EvaluationConfig,
    #[serde(default)]
    pub logging: LoggingConfig,
}

/// Default evaluation tuning, mirrored onto `EvalOptions` by callers that
/// want config-driven defaults.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EvaluationConfig {
    /// Default `maxParallel`. 0 means sequential-only.
    #[serde(default = "default_max_parallel")]
    pub max_parallel: usize,

    /// Default batch size per parallel round.
    #[serde(default = "default_parallel_batch_size")]
    pub parallel_batch_size: usize,

    /// Whether `Evaluator::eval` collects `Diagnostics` by default.
    #[serde(default)]
    pub collect_diagnostics: bool,

    /// Default per-evaluation deadline in milliseconds (0 = no deadline).
    #[serde(default)]
    pub default_deadline_ms: u64,
}

/// Logging configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// Log level (trace, debug, info, warn, error)
    #[serde(default = "default_log_level")]
    pub level: String,

    /// Log format (text, json)
    #[serde(default = "default_log_format")]
    pub format: String,
}

fn default_max_parallel() -> usize {
    num_cpus::get()
}
fn default_parallel_batch_size() -> usize {
    1
}
fn default_log_level() -> String {
    "info".to_string()
}
fn default_log_format() -> String {
    "text".to_string()
}

impl Config {
    /// Load configuration from default locations.
    ///
    /// Merges in order:
    /// 1. rulevault.toml (base configuration)
    /// 2. rulevault.local.toml (local overrides, git-ignored)
    /// 3. Environment variables (RULEVAULT_* prefix)
    pub fn load() -> Result<Self, figment::Error> {
        Figment::new()
            .merge(Toml::file("rulevault.toml"))
            .merge(Toml::file("rulevault.local.toml"))
            .merge(Env::prefixed("RULEVAULT_").split("__"))
            .extract()
    }

    /// Load configuration from a specific file path.
    pub fn from_file(path: &str) -> Result<Self, figment::Error> {
        Figment::new()
            .merge(Toml::file(path))
            .merge(Env::prefixed("RULEVAULT_").split("__"))
            .extract()
    }
}

impl Default for Config {
    fn default() -> Self {
        Config {
            evaluation: EvaluationConfig::default(),
            logging: LoggingConfig::default(),
        }
    }
}

impl Default for EvaluationConfig {
    fn default() -> Self {
        EvaluationConfig {
            max_parallel: default_max_parallel(),
            parallel_batch_size: default_parallel_batch_size(),
            collect_diagnostics: false,
            default_deadline_ms: 0,
        }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        LoggingConfig {
            level: default_log_level(),
            format: default_log_format(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = Config::default();
        assert!(config.evaluation.max_parallel >= 1);
        assert_eq!(config.evaluation.parallel_batch_size, 1);
        assert!(!config.evaluation.collect_diagnostics);
        assert_eq!(config.logging.level, "info");
    }

    #[test]
    fn test_config_serialization() {
        let config = Config::default();
        let toml_str = toml::to_string(&config).unwrap();

        assert!(toml_str.contains("[evaluation]"));
        assert!(toml_str.contains("[logging]"));
    }

    #[test]
    fn test_from_file_missing_falls_back_to_env() {
        // A missing file is simply not merged; defaults still apply.
        let config = Config::from_file("does-not-exist.toml").unwrap();
        assert_eq!(config.logging.format, "text");
    }
}

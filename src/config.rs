//! Configuration management for Routegate.

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use std::path::Path;
use tracing::info;

use crate::error::{Result, RoutegateError};

/// Main configuration for the Routegate service.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RoutegateConfig {
    /// Admission control configuration
    #[serde(default)]
    pub limiter: LimiterConfig,

    /// Logging configuration
    #[serde(default)]
    pub logging: LoggingConfig,
}

/// Admission control configuration.
///
/// Read once at startup and immutable afterwards. Key order in
/// `special_mapping` is significant: glob patterns are tried in the order
/// they were declared.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LimiterConfig {
    /// Master switch
    #[serde(default = "default_enabled")]
    pub enabled: bool,

    /// Global permits per second; a value <= 0 disables the global budget
    #[serde(default = "default_global_qps")]
    pub global_qps: f64,

    /// Route pattern -> permits per second; a null rate is skipped
    #[serde(default)]
    pub special_mapping: IndexMap<String, Option<f64>>,

    /// Route patterns exempt from limiting
    #[serde(default)]
    pub ignore_urls: Vec<String>,

    /// Client identifier substrings exempt from limiting (case-insensitive)
    #[serde(default)]
    pub ignore_uas: Vec<String>,

    /// Whether an exemption wins over a special limit when both apply
    #[serde(default = "default_ignore_priority")]
    pub ignore_priority: bool,
}

impl Default for LimiterConfig {
    fn default() -> Self {
        Self {
            enabled: default_enabled(),
            global_qps: default_global_qps(),
            special_mapping: IndexMap::new(),
            ignore_urls: Vec::new(),
            ignore_uas: Vec::new(),
            ignore_priority: default_ignore_priority(),
        }
    }
}

fn default_enabled() -> bool {
    true
}

fn default_global_qps() -> f64 {
    50.0
}

fn default_ignore_priority() -> bool {
    true
}

impl LimiterConfig {
    /// A configuration with limiting switched off.
    pub fn disabled() -> Self {
        Self {
            enabled: false,
            ..Self::default()
        }
    }

    /// Set the global permits per second.
    pub fn with_global_qps(mut self, qps: f64) -> Self {
        self.global_qps = qps;
        self
    }

    /// Append a route-specific budget. Declaration order is preserved.
    pub fn with_special_limit(mut self, pattern: impl Into<String>, qps: f64) -> Self {
        self.special_mapping.insert(pattern.into(), Some(qps));
        self
    }

    /// Exempt a route pattern.
    pub fn with_ignored_url(mut self, pattern: impl Into<String>) -> Self {
        self.ignore_urls.push(pattern.into());
        self
    }

    /// Exempt clients whose identifier contains `needle`.
    pub fn with_ignored_ua(mut self, needle: impl Into<String>) -> Self {
        self.ignore_uas.push(needle.into());
        self
    }

    /// Set whether exemptions win over special limits.
    pub fn with_ignore_priority(mut self, ignore_priority: bool) -> Self {
        self.ignore_priority = ignore_priority;
        self
    }
}

/// Logging configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// Default level filter, overridden by `RUST_LOG`
    #[serde(default = "default_log_level")]
    pub level: String,

    /// Output format
    #[serde(default)]
    pub format: LogFormat,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            format: LogFormat::default(),
        }
    }
}

fn default_log_level() -> String {
    "info".to_string()
}

/// Log output format.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize, clap::ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    /// Human-readable lines
    #[default]
    Text,
    /// One JSON object per event
    Json,
}

impl RoutegateConfig {
    /// Load configuration from a file path.
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        info!(path = %path.display(), "Loading configuration");

        let contents = std::fs::read_to_string(path)?;
        Self::from_yaml(&contents)
    }

    /// Load configuration from a YAML string.
    ///
    /// Accepts either a full document with `limiter:` / `logging:` sections or
    /// a bare limiter document.
    pub fn from_yaml(yaml: &str) -> Result<Self> {
        let value: serde_yaml::Value = serde_yaml::from_str(yaml)?;

        match &value {
            serde_yaml::Value::Null => return Ok(Self::default()),
            serde_yaml::Value::Mapping(_) => {}
            other => {
                return Err(RoutegateError::Config(format!(
                    "expected a mapping at the document root, found {}",
                    yaml_kind(other)
                )))
            }
        }

        let sectioned = value.get("limiter").is_some() || value.get("logging").is_some();
        if sectioned {
            Ok(serde_yaml::from_value(value)?)
        } else {
            let limiter: LimiterConfig = serde_yaml::from_value(value)?;
            Ok(Self {
                limiter,
                logging: LoggingConfig::default(),
            })
        }
    }
}

fn yaml_kind(value: &serde_yaml::Value) -> &'static str {
    match value {
        serde_yaml::Value::Null => "null",
        serde_yaml::Value::Bool(_) => "a boolean",
        serde_yaml::Value::Number(_) => "a number",
        serde_yaml::Value::String(_) => "a string",
        serde_yaml::Value::Sequence(_) => "a sequence",
        serde_yaml::Value::Mapping(_) => "a mapping",
        serde_yaml::Value::Tagged(_) => "a tagged value",
    }
}

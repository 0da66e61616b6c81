//! Tracker configuration
//!
//! Defaults work without any environment. Deployments can override them
//! through these variables:
//!
//! - `OP_TASK_TRACKER_SERVICE_NAME`: service name attached to log events
//! - `OP_TASK_TRACKER_METRICS`: `true`/`false`, enables the prometheus collectors
//! - `OP_TASK_TRACKER_DISPOSED_QUERY`: `not-inside` or `fail`
//!
//! ```rust
//! use op_task_tracker::config::TrackerConfig;
//!
//! let config = TrackerConfig::from_env().unwrap_or_default();
//! assert!(!config.service_name.is_empty());
//! ```

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use tracing::debug;

use crate::error::{Result, TrackerError};

pub const ENV_SERVICE_NAME: &str = "OP_TASK_TRACKER_SERVICE_NAME";
pub const ENV_METRICS: &str = "OP_TASK_TRACKER_METRICS";
pub const ENV_DISPOSED_QUERY: &str = "OP_TASK_TRACKER_DISPOSED_QUERY";

pub const DEFAULT_SERVICE_NAME: &str = "op-task-tracker";

/// What a query answers once the tracker has been closed
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum DisposedQueryPolicy {
    /// Answer "not inside a task"
    #[default]
    NotInside,

    /// Report `TrackerError::Disposed`
    Fail,
}

impl FromStr for DisposedQueryPolicy {
    type Err = TrackerError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_lowercase().as_str() {
            "not-inside" | "not_inside" | "false" => Ok(DisposedQueryPolicy::NotInside),
            "fail" | "error" => Ok(DisposedQueryPolicy::Fail),
            other => Err(TrackerError::invalid_config(format!(
                "{} must be `not-inside` or `fail`, got `{}`",
                ENV_DISPOSED_QUERY, other
            ))),
        }
    }
}

impl fmt::Display for DisposedQueryPolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DisposedQueryPolicy::NotInside => write!(f, "not-inside"),
            DisposedQueryPolicy::Fail => write!(f, "fail"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TrackerConfig {
    /// Service name attached to log events
    pub service_name: String,

    /// Whether prometheus collectors are created
    pub metrics_enabled: bool,

    pub disposed_query: DisposedQueryPolicy,
}

impl Default for TrackerConfig {
    fn default() -> Self {
        Self {
            service_name: DEFAULT_SERVICE_NAME.to_string(),
            metrics_enabled: true,
            disposed_query: DisposedQueryPolicy::default(),
        }
    }
}

impl TrackerConfig {
    /// Load configuration from the process environment
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(get_config_opt)
    }

    /// Load configuration from an arbitrary key lookup
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self> {
        let mut config = Self::default();

        if let Some(name) = lookup(ENV_SERVICE_NAME) {
            config.service_name = name;
        }
        if let Some(value) = lookup(ENV_METRICS) {
            config.metrics_enabled = parse_bool(&value).ok_or_else(|| {
                TrackerError::invalid_config(format!(
                    "{} must be a boolean, got `{}`",
                    ENV_METRICS, value
                ))
            })?;
        }
        if let Some(value) = lookup(ENV_DISPOSED_QUERY) {
            config.disposed_query = value.parse()?;
        }

        debug!(
            service_name = %config.service_name,
            metrics_enabled = config.metrics_enabled,
            disposed_query = %config.disposed_query,
            "Loaded task tracker configuration"
        );
        Ok(config)
    }

    pub fn with_service_name(mut self, service_name: impl Into<String>) -> Self {
        self.service_name = service_name.into();
        self
    }

    pub fn with_metrics(mut self, enabled: bool) -> Self {
        self.metrics_enabled = enabled;
        self
    }

    pub fn with_disposed_query(mut self, policy: DisposedQueryPolicy) -> Self {
        self.disposed_query = policy;
        self
    }
}

/// Get an optional configuration value.
pub fn get_config_opt(key: &str) -> Option<String> {
    std::env::var(key).ok().filter(|v| !v.is_empty())
}

fn parse_bool(value: &str) -> Option<bool> {
    match value.trim().to_lowercase().as_str() {
        "true" | "1" | "yes" | "on" => Some(true),
        "false" | "0" | "no" | "off" => Some(false),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn lookup(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key| map.get(key).cloned()
    }

    #[test]
    fn test_defaults_without_environment() {
        let config = TrackerConfig::from_lookup(lookup(&[])).unwrap();
        assert_eq!(config, TrackerConfig::default());
        assert_eq!(config.disposed_query, DisposedQueryPolicy::NotInside);
    }

    #[test]
    fn test_overrides() {
        let config = TrackerConfig::from_lookup(lookup(&[
            (ENV_SERVICE_NAME, "build-daemon"),
            (ENV_METRICS, "off"),
            (ENV_DISPOSED_QUERY, "FAIL"),
        ]))
        .unwrap();
        assert_eq!(config.service_name, "build-daemon");
        assert!(!config.metrics_enabled);
        assert_eq!(config.disposed_query, DisposedQueryPolicy::Fail);
    }

    #[test]
    fn test_invalid_values_are_rejected() {
        let err = TrackerConfig::from_lookup(lookup(&[(ENV_DISPOSED_QUERY, "maybe")])).unwrap_err();
        assert!(matches!(err, TrackerError::InvalidConfig(_)));

        let err = TrackerConfig::from_lookup(lookup(&[(ENV_METRICS, "sometimes")])).unwrap_err();
        assert!(matches!(err, TrackerError::InvalidConfig(_)));
    }

    #[test]
    fn test_deserialize_partial() {
        let config: TrackerConfig =
            serde_json::from_str(r#"{"disposed_query": "fail"}"#).unwrap();
        assert_eq!(config.disposed_query, DisposedQueryPolicy::Fail);
        assert_eq!(config.service_name, DEFAULT_SERVICE_NAME);
    }
}

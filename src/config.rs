//! Orchestrator configuration
//!
//! Loaded from a TOML file. Every section and field has a default, so an
//! empty file (or no file at all) yields a working configuration.

use crate::routing::pipeline::PipelineOrder;
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;
use thiserror::Error;

/// Top-level orchestrator configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct OrchestratorConfig {
    #[serde(default)]
    pub retry: RetrySection,
    #[serde(default)]
    pub errors: ErrorSection,
    #[serde(default)]
    pub execution: ExecutionSection,
    #[serde(default)]
    pub pipeline: PipelineSection,
}

/// Retry policy applied to every agent invocation
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct RetrySection {
    /// Total attempts including the first one (default: 3)
    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,
    /// Exponential base; attempt i waits base_delay * backoff^(i-1) (default: 2.0)
    #[serde(default = "default_backoff")]
    pub backoff: f64,
    /// Delay unit in milliseconds (default: 1000)
    #[serde(default = "default_base_delay_ms")]
    pub base_delay_ms: u64,
    /// Optional per-attempt timeout in milliseconds
    #[serde(default)]
    pub timeout_ms: Option<u64>,
}

impl Default for RetrySection {
    fn default() -> Self {
        Self {
            max_attempts: default_max_attempts(),
            backoff: default_backoff(),
            base_delay_ms: default_base_delay_ms(),
            timeout_ms: None,
        }
    }
}

impl RetrySection {
    pub fn base_delay(&self) -> Duration {
        Duration::from_millis(self.base_delay_ms)
    }

    pub fn timeout(&self) -> Option<Duration> {
        self.timeout_ms.map(Duration::from_millis)
    }
}

/// Error tracking limits and fix-hint threshold
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ErrorSection {
    /// Occurrences of one (agent, worker, error_type) before hints are offered
    #[serde(default = "default_hint_threshold")]
    pub hint_threshold: u64,
    /// Global error record history size
    #[serde(default = "default_max_records")]
    pub max_records: usize,
    /// Error records kept per (agent, worker)
    #[serde(default = "default_max_records_per_worker")]
    pub max_records_per_worker: usize,
}

impl Default for ErrorSection {
    fn default() -> Self {
        Self {
            hint_threshold: default_hint_threshold(),
            max_records: default_max_records(),
            max_records_per_worker: default_max_records_per_worker(),
        }
    }
}

/// Workflow execution settings
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ExecutionSection {
    /// Execution history ring buffer size (default: 100)
    #[serde(default = "default_history_capacity")]
    pub history_capacity: usize,
    /// Health points subtracted per recorded error (default: 2.0)
    #[serde(default = "default_error_penalty")]
    pub error_penalty: f64,
}

impl Default for ExecutionSection {
    fn default() -> Self {
        Self {
            history_capacity: default_history_capacity(),
            error_penalty: default_error_penalty(),
        }
    }
}

/// Canonical pipeline override
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct PipelineSection {
    /// Stage identifiers in canonical order; the built-in order when absent
    #[serde(default)]
    pub order: Option<Vec<String>>,
}

fn default_max_attempts() -> u32 {
    3
}

fn default_backoff() -> f64 {
    2.0
}

fn default_base_delay_ms() -> u64 {
    1000
}

fn default_hint_threshold() -> u64 {
    3
}

fn default_max_records() -> usize {
    1000
}

fn default_max_records_per_worker() -> usize {
    100
}

fn default_history_capacity() -> usize {
    100
}

fn default_error_penalty() -> f64 {
    2.0
}

/// Configuration loading errors
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to read config file: {0}")]
    FileRead(#[from] std::io::Error),
    #[error("Failed to parse TOML: {0}")]
    TomlParse(#[from] toml::de::Error),
    #[error("Invalid stage identifier: {0}")]
    InvalidStageId(String),
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),
}

impl OrchestratorConfig {
    /// Load configuration from a TOML file and validate it
    pub fn load_from_file(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path)?;
        Self::from_toml_str(&content)
    }

    /// Parse configuration from TOML text and validate it
    pub fn from_toml_str(content: &str) -> Result<Self, ConfigError> {
        let config: OrchestratorConfig = toml::from_str(content)?;
        config.validate()?;
        Ok(config)
    }

    /// Check value ranges and the pipeline override
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.retry.max_attempts == 0 {
            return Err(ConfigError::InvalidConfig(
                "retry.max_attempts must be at least 1".to_string(),
            ));
        }
        if !self.retry.backoff.is_finite() || self.retry.backoff < 1.0 {
            return Err(ConfigError::InvalidConfig(format!(
                "retry.backoff must be a finite number >= 1.0, got {}",
                self.retry.backoff
            )));
        }
        if self.retry.timeout_ms == Some(0) {
            return Err(ConfigError::InvalidConfig(
                "retry.timeout_ms must be positive when set".to_string(),
            ));
        }
        if self.errors.max_records == 0 || self.errors.max_records_per_worker == 0 {
            return Err(ConfigError::InvalidConfig(
                "errors.max_records and errors.max_records_per_worker must be at least 1"
                    .to_string(),
            ));
        }
        if self.execution.history_capacity == 0 {
            return Err(ConfigError::InvalidConfig(
                "execution.history_capacity must be at least 1".to_string(),
            ));
        }
        if !self.execution.error_penalty.is_finite() || self.execution.error_penalty < 0.0 {
            return Err(ConfigError::InvalidConfig(format!(
                "execution.error_penalty must be a finite non-negative number, got {}",
                self.execution.error_penalty
            )));
        }
        if let Some(order) = &self.pipeline.order {
            PipelineOrder::new(order.clone())?;
        }
        Ok(())
    }

    /// Build the effective pipeline order
    pub fn pipeline_order(&self) -> Result<PipelineOrder, ConfigError> {
        match &self.pipeline.order {
            Some(order) => PipelineOrder::new(order.clone()),
            None => Ok(PipelineOrder::default()),
        }
    }

    /// Create a test configuration with millisecond backoff for fast tests
    #[cfg(test)]
    pub fn test_config() -> Self {
        let toml_content = r#"
[retry]
max_attempts = 3
backoff = 2.0
base_delay_ms = 1

[errors]
hint_threshold = 2

[execution]
history_capacity = 10
"#;
        Self::from_toml_str(toml_content).expect("Test config should parse")
    }
}

/// Validate a stage identifier (`[a-zA-Z0-9._-]+`)
pub fn validate_stage_id(stage_id: &str) -> Result<(), ConfigError> {
    let valid_chars = stage_id
        .chars()
        .all(|c| c.is_ascii_alphanumeric() || c == '.' || c == '_' || c == '-');

    if stage_id.is_empty() || !valid_chars {
        return Err(ConfigError::InvalidStageId(format!(
            "Stage identifier '{stage_id}' must match pattern [a-zA-Z0-9._-]+"
        )));
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn test_empty_config_uses_defaults() {
        let config = OrchestratorConfig::from_toml_str("").unwrap();
        assert_eq!(config, OrchestratorConfig::default());
        assert_eq!(config.retry.max_attempts, 3);
        assert_eq!(config.retry.backoff, 2.0);
        assert_eq!(config.retry.base_delay(), Duration::from_secs(1));
        assert_eq!(config.retry.timeout(), None);
        assert_eq!(config.errors.hint_threshold, 3);
        assert_eq!(config.execution.history_capacity, 100);
        assert_eq!(config.execution.error_penalty, 2.0);
        assert!(config.pipeline.order.is_none());
    }

    #[test]
    fn test_full_config() {
        let toml_content = r#"
[retry]
max_attempts = 5
backoff = 3.0
base_delay_ms = 250
timeout_ms = 10000

[errors]
hint_threshold = 4
max_records = 50
max_records_per_worker = 10

[execution]
history_capacity = 20
error_penalty = 5.0

[pipeline]
order = ["load_data", "explore", "report"]
"#;

        let config = OrchestratorConfig::from_toml_str(toml_content).unwrap();
        assert_eq!(config.retry.max_attempts, 5);
        assert_eq!(config.retry.base_delay(), Duration::from_millis(250));
        assert_eq!(config.retry.timeout(), Some(Duration::from_secs(10)));
        assert_eq!(config.errors.max_records_per_worker, 10);
        assert_eq!(config.execution.error_penalty, 5.0);

        let order = config.pipeline_order().unwrap();
        assert_eq!(order.len(), 3);
        assert_eq!(order.position("report"), Some(2));
    }

    #[test]
    fn test_zero_attempts_rejected() {
        let result = OrchestratorConfig::from_toml_str("[retry]\nmax_attempts = 0\n");
        assert!(matches!(result, Err(ConfigError::InvalidConfig(_))));
    }

    #[test]
    fn test_backoff_below_one_rejected() {
        let result = OrchestratorConfig::from_toml_str("[retry]\nbackoff = 0.5\n");
        assert!(matches!(result, Err(ConfigError::InvalidConfig(_))));
    }

    #[test]
    fn test_negative_penalty_rejected() {
        let result = OrchestratorConfig::from_toml_str("[execution]\nerror_penalty = -1.0\n");
        assert!(matches!(result, Err(ConfigError::InvalidConfig(_))));
    }

    #[test]
    fn test_duplicate_pipeline_stage_rejected() {
        let result =
            OrchestratorConfig::from_toml_str("[pipeline]\norder = [\"explore\", \"explore\"]\n");
        assert!(matches!(result, Err(ConfigError::InvalidConfig(_))));
    }

    #[test]
    fn test_invalid_stage_id() {
        assert!(validate_stage_id("detect anomalies").is_err());
        assert!(validate_stage_id("").is_err());
        assert!(validate_stage_id("detect_anomalies.v2-beta").is_ok());
    }

    #[test]
    fn test_malformed_toml() {
        let result = OrchestratorConfig::from_toml_str("[retry\nmax_attempts = 3");
        assert!(matches!(result, Err(ConfigError::TomlParse(_))));
    }

    proptest! {
        #[test]
        fn valid_stage_ids_pass(id in "[a-zA-Z0-9._-]{1,64}") {
            prop_assert!(validate_stage_id(&id).is_ok(), "should pass: {}", id);
        }

        #[test]
        fn ids_with_foreign_chars_fail(id in "[^a-zA-Z0-9._-]{1}[a-zA-Z0-9._-]*") {
            prop_assert!(validate_stage_id(&id).is_err(), "should fail: {}", id);
        }
    }

    #[test]
    fn test_test_config_is_fast() {
        let config = OrchestratorConfig::test_config();
        assert_eq!(config.retry.base_delay(), Duration::from_millis(1));
        assert_eq!(config.errors.hint_threshold, 2);
    }
}

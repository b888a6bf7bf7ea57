//! Result shape returned by agents

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// Severity attached to an error an agent reports in its result
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum ErrorSeverity {
    Low,
    Medium,
    #[default]
    High,
    Critical,
}

/// One error reported inside a [`TaskResult`]
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TaskErrorDetail {
    #[serde(rename = "type")]
    pub error_type: String,
    pub message: String,
    #[serde(default)]
    pub severity: ErrorSeverity,
}

impl TaskErrorDetail {
    pub fn new<T: Into<String>, M: Into<String>>(
        error_type: T,
        message: M,
        severity: ErrorSeverity,
    ) -> Self {
        Self {
            error_type: error_type.into(),
            message: message.into(),
            severity,
        }
    }
}

/// Output of one agent execution
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TaskResult {
    pub success: bool,
    #[serde(default)]
    pub data: Map<String, Value>,
    #[serde(default)]
    pub errors: Vec<TaskErrorDetail>,
    /// Advisory output quality in [0, 1]; treated as 1.0 when absent
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub quality_score: Option<f64>,
    #[serde(default)]
    pub metadata: Map<String, Value>,
    #[serde(default)]
    pub execution_time_ms: u64,
}

impl TaskResult {
    /// Successful result carrying `data`
    pub fn success(data: Map<String, Value>) -> Self {
        Self {
            success: true,
            data,
            errors: Vec::new(),
            quality_score: None,
            metadata: Map::new(),
            execution_time_ms: 0,
        }
    }

    /// Failed result carrying one error
    pub fn failure(error: TaskErrorDetail) -> Self {
        Self {
            success: false,
            data: Map::new(),
            errors: vec![error],
            quality_score: None,
            metadata: Map::new(),
            execution_time_ms: 0,
        }
    }

    pub fn with_quality(mut self, quality_score: f64) -> Self {
        self.quality_score = Some(quality_score);
        self
    }

    pub fn with_metadata(mut self, key: impl Into<String>, value: Value) -> Self {
        self.metadata.insert(key.into(), value);
        self
    }

    /// Quality score usable for aggregation.
    ///
    /// Falls back to 1.0 when the agent reported nothing, or a value that is
    /// not a finite number in [0, 1].
    pub fn effective_quality(&self) -> f64 {
        match self.quality_score {
            Some(score) if score.is_finite() && (0.0..=1.0).contains(&score) => score,
            _ => 1.0,
        }
    }

    /// Error type of the first reported error, used when `success` is false
    pub fn primary_error_type(&self) -> &str {
        self.errors
            .first()
            .map(|e| e.error_type.as_str())
            .unwrap_or("agent_reported_failure")
    }

    /// Human-readable summary of reported errors
    pub fn error_summary(&self) -> String {
        if self.errors.is_empty() {
            return "agent reported failure without details".to_string();
        }
        self.errors
            .iter()
            .map(|e| format!("{}: {}", e.error_type, e.message))
            .collect::<Vec<_>>()
            .join("; ")
    }
}

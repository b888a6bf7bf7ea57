//! Typed per-stage task options
//!
//! Workflow submissions carry a free-form parameter map. At the routing
//! boundary that map is parsed into one of the structs below; unknown keys
//! are rejected, missing keys take their documented defaults. Stages outside
//! the built-in set pass their parameters through untouched.

use super::pipeline::Stage;
use crate::agent::Payload;
use crate::error::{OrchestratorError, OrchestratorResult};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// Payload key holding cached results of earlier stages
pub const UPSTREAM_KEY: &str = "upstream";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct LoadDataOptions {
    pub file_path: String,
    /// File format; inferred from the extension when absent
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub format: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sample_rows: Option<u64>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ExploreOptions {
    /// Columns to profile; every column when absent
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub columns: Option<Vec<String>>,
    #[serde(default = "default_true")]
    pub include_correlations: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct AggregateOptions {
    #[serde(default)]
    pub group_by: Vec<String>,
    #[serde(default = "default_metrics")]
    pub metrics: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct DetectAnomaliesOptions {
    #[serde(default = "default_anomaly_method")]
    pub method: String,
    #[serde(default = "default_anomaly_threshold")]
    pub threshold: f64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub columns: Option<Vec<String>>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct PredictOptions {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub target: Option<String>,
    #[serde(default = "default_horizon")]
    pub horizon: u32,
    #[serde(default = "default_model")]
    pub model: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct RecommendOptions {
    #[serde(default = "default_max_recommendations")]
    pub max_recommendations: u32,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct NarrateOptions {
    #[serde(default = "default_audience")]
    pub audience: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_words: Option<u32>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct VisualizeOptions {
    #[serde(default)]
    pub chart_types: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub output_dir: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ReportOptions {
    #[serde(default = "default_report_format")]
    pub format: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub output_path: Option<String>,
}

fn default_true() -> bool {
    true
}

fn default_metrics() -> Vec<String> {
    vec!["mean".to_string()]
}

fn default_anomaly_method() -> String {
    "iqr".to_string()
}

fn default_anomaly_threshold() -> f64 {
    1.5
}

fn default_horizon() -> u32 {
    10
}

fn default_model() -> String {
    "linear".to_string()
}

fn default_max_recommendations() -> u32 {
    5
}

fn default_audience() -> String {
    "executive".to_string()
}

fn default_report_format() -> String {
    "html".to_string()
}

/// Parsed options for one task
#[derive(Debug, Clone, PartialEq)]
pub enum TaskOptions {
    LoadData(LoadDataOptions),
    Explore(ExploreOptions),
    Aggregate(AggregateOptions),
    DetectAnomalies(DetectAnomaliesOptions),
    Predict(PredictOptions),
    Recommend(RecommendOptions),
    Narrate(NarrateOptions),
    Visualize(VisualizeOptions),
    Report(ReportOptions),
    /// Stage outside the built-in set: parameters passed through as given
    Custom(Map<String, Value>),
}

impl TaskOptions {
    /// Parse `parameters` for `task_type`
    pub fn parse(task_type: &str, parameters: &Map<String, Value>) -> OrchestratorResult<Self> {
        if parameters.contains_key(UPSTREAM_KEY) {
            return Err(OrchestratorError::validation(format!(
                "parameter '{UPSTREAM_KEY}' is reserved (task '{task_type}')"
            )));
        }

        let Some(stage) = Stage::from_id(task_type) else {
            return Ok(TaskOptions::Custom(parameters.clone()));
        };

        let options = match stage {
            Stage::LoadData => TaskOptions::LoadData(from_parameters(task_type, parameters)?),
            Stage::Explore => TaskOptions::Explore(from_parameters(task_type, parameters)?),
            Stage::Aggregate => TaskOptions::Aggregate(from_parameters(task_type, parameters)?),
            Stage::DetectAnomalies => {
                TaskOptions::DetectAnomalies(from_parameters(task_type, parameters)?)
            }
            Stage::Predict => TaskOptions::Predict(from_parameters(task_type, parameters)?),
            Stage::Recommend => TaskOptions::Recommend(from_parameters(task_type, parameters)?),
            Stage::Narrate => TaskOptions::Narrate(from_parameters(task_type, parameters)?),
            Stage::Visualize => TaskOptions::Visualize(from_parameters(task_type, parameters)?),
            Stage::Report => TaskOptions::Report(from_parameters(task_type, parameters)?),
        };

        options.check_ranges(task_type)?;
        Ok(options)
    }

    /// Built-in stage these options belong to, `None` for custom stages
    pub fn stage(&self) -> Option<Stage> {
        match self {
            TaskOptions::LoadData(_) => Some(Stage::LoadData),
            TaskOptions::Explore(_) => Some(Stage::Explore),
            TaskOptions::Aggregate(_) => Some(Stage::Aggregate),
            TaskOptions::DetectAnomalies(_) => Some(Stage::DetectAnomalies),
            TaskOptions::Predict(_) => Some(Stage::Predict),
            TaskOptions::Recommend(_) => Some(Stage::Recommend),
            TaskOptions::Narrate(_) => Some(Stage::Narrate),
            TaskOptions::Visualize(_) => Some(Stage::Visualize),
            TaskOptions::Report(_) => Some(Stage::Report),
            TaskOptions::Custom(_) => None,
        }
    }

    /// Options with defaults filled in, as the map an agent receives
    pub fn to_payload(&self) -> OrchestratorResult<Payload> {
        let value = match self {
            TaskOptions::LoadData(o) => serde_json::to_value(o),
            TaskOptions::Explore(o) => serde_json::to_value(o),
            TaskOptions::Aggregate(o) => serde_json::to_value(o),
            TaskOptions::DetectAnomalies(o) => serde_json::to_value(o),
            TaskOptions::Predict(o) => serde_json::to_value(o),
            TaskOptions::Recommend(o) => serde_json::to_value(o),
            TaskOptions::Narrate(o) => serde_json::to_value(o),
            TaskOptions::Visualize(o) => serde_json::to_value(o),
            TaskOptions::Report(o) => serde_json::to_value(o),
            TaskOptions::Custom(map) => return Ok(map.clone()),
        }
        .map_err(|e| OrchestratorError::internal(format!("failed to serialize options: {e}")))?;

        match value {
            Value::Object(map) => Ok(map),
            other => Err(OrchestratorError::internal(format!(
                "options serialized to a non-object value: {other}"
            ))),
        }
    }

    fn check_ranges(&self, task_type: &str) -> OrchestratorResult<()> {
        let problem = match self {
            TaskOptions::LoadData(o) if o.file_path.trim().is_empty() => {
                Some("file_path must not be empty".to_string())
            }
            TaskOptions::DetectAnomalies(o) if !(o.threshold.is_finite() && o.threshold > 0.0) => {
                Some(format!("threshold must be positive, got {}", o.threshold))
            }
            TaskOptions::Predict(o) if o.horizon == 0 => {
                Some("horizon must be at least 1".to_string())
            }
            TaskOptions::Recommend(o) if o.max_recommendations == 0 => {
                Some("max_recommendations must be at least 1".to_string())
            }
            _ => None,
        };

        match problem {
            Some(message) => Err(OrchestratorError::validation(format!(
                "invalid parameters for '{task_type}': {message}"
            ))),
            None => Ok(()),
        }
    }
}

fn from_parameters<T>(task_type: &str, parameters: &Map<String, Value>) -> OrchestratorResult<T>
where
    T: serde::de::DeserializeOwned,
{
    serde_json::from_value(Value::Object(parameters.clone())).map_err(|e| {
        OrchestratorError::validation(format!("invalid parameters for '{task_type}': {e}"))
    })
}

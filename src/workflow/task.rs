//! Task descriptors and execution outcomes

use super::state::{TaskState, WorkflowState};
use crate::agent::{TaskErrorDetail, TaskResult};
use crate::error::{OrchestratorError, OrchestratorResult};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use uuid::Uuid;

/// One submitted pipeline step: `{"type": ..., "parameters": {...}}`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TaskSpec {
    #[serde(rename = "type")]
    pub task_type: String,
    #[serde(default)]
    pub parameters: Map<String, Value>,
}

impl TaskSpec {
    pub fn new<S: Into<String>>(task_type: S) -> Self {
        Self {
            task_type: task_type.into(),
            parameters: Map::new(),
        }
    }

    pub fn with_parameter<K: Into<String>>(mut self, key: K, value: Value) -> Self {
        self.parameters.insert(key.into(), value);
        self
    }

    pub fn with_parameters(mut self, parameters: Map<String, Value>) -> Self {
        self.parameters = parameters;
        self
    }
}

/// Parse a workflow submission: a JSON array of task descriptors
pub fn parse_submission(json: &str) -> OrchestratorResult<Vec<TaskSpec>> {
    serde_json::from_str(json)
        .map_err(|e| OrchestratorError::validation(format!("malformed workflow submission: {e}")))
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum TaskStatus {
    Completed,
    Failed,
}

impl TaskStatus {
    pub fn is_success(self) -> bool {
        self == TaskStatus::Completed
    }
}

/// Final record of one executed task
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TaskOutcome {
    pub task_id: Uuid,
    pub task_type: String,
    pub status: TaskStatus,
    /// Agent result of the successful attempt
    pub result: Option<TaskResult>,
    /// Effective quality for completed tasks, 0.0 for failed ones
    pub quality_score: f64,
    pub duration_ms: u64,
    /// One entry per failed attempt, oldest first
    pub errors: Vec<TaskErrorDetail>,
    pub attempts: u32,
    /// States visited, starting with CREATED
    pub states: Vec<TaskState>,
    pub started_at: DateTime<Utc>,
}

impl TaskOutcome {
    pub fn is_success(&self) -> bool {
        self.status.is_success()
    }
}

/// Entry of the bounded execution history
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExecutionRecord {
    pub task_id: Uuid,
    pub task_type: String,
    pub status: TaskStatus,
    pub quality_score: f64,
    pub attempts: u32,
    pub duration_ms: u64,
    pub finished_at: DateTime<Utc>,
}

impl From<&TaskOutcome> for ExecutionRecord {
    fn from(outcome: &TaskOutcome) -> Self {
        Self {
            task_id: outcome.task_id,
            task_type: outcome.task_type.clone(),
            status: outcome.status,
            quality_score: outcome.quality_score,
            attempts: outcome.attempts,
            duration_ms: outcome.duration_ms,
            finished_at: Utc::now(),
        }
    }
}

/// Final error of a failed task, as listed on the workflow outcome
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WorkflowError {
    pub task_id: Uuid,
    pub task_type: String,
    #[serde(flatten)]
    pub error: TaskErrorDetail,
}

impl WorkflowError {
    /// `None` for completed tasks or failures without a recorded error
    pub fn from_outcome(outcome: &TaskOutcome) -> Option<Self> {
        if outcome.is_success() {
            return None;
        }
        outcome.errors.last().map(|error| Self {
            task_id: outcome.task_id,
            task_type: outcome.task_type.clone(),
            error: error.clone(),
        })
    }
}

/// Result of one `execute_workflow` call
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WorkflowOutcome {
    pub workflow_id: Uuid,
    pub status: WorkflowState,
    pub tasks: Vec<TaskOutcome>,
    pub completed: usize,
    pub failed: usize,
    /// One entry per failed task in execution order. Transient failures of
    /// tasks that later completed stay on their [`TaskOutcome`].
    pub errors: Vec<WorkflowError>,
    /// Mean task quality, failed tasks counting as 0
    pub quality_score: f64,
    pub duration_ms: u64,
    pub started_at: DateTime<Utc>,
}

impl WorkflowOutcome {
    pub fn task(&self, task_type: &str) -> Option<&TaskOutcome> {
        self.tasks.iter().find(|t| t.task_type == task_type)
    }
}

/// Mean of task quality scores; 0.0 for an empty slice
pub fn mean_quality(tasks: &[TaskOutcome]) -> f64 {
    if tasks.is_empty() {
        return 0.0;
    }
    tasks.iter().map(|t| t.quality_score).sum::<f64>() / tasks.len() as f64
}

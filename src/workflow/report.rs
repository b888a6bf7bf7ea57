//! System health report

use super::task::{ExecutionRecord, TaskStatus};
use crate::agent::AgentListing;
use crate::cache::CacheSummary;
use crate::intelligence::{AgentHealth, ErrorPattern, ErrorSummary};
use crate::quality::QualitySummary;
use chrono::{DateTime, Utc};
use serde::Serialize;

/// Score at or above which the system is reported healthy
pub const HEALTHY_SCORE: f64 = 80.0;
/// Score at or above which the system is degraded rather than critical
pub const DEGRADED_SCORE: f64 = 50.0;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ReportStatus {
    Healthy,
    Degraded,
    Critical,
}

impl ReportStatus {
    pub fn from_score(score: f64) -> Self {
        if score >= HEALTHY_SCORE {
            ReportStatus::Healthy
        } else if score >= DEGRADED_SCORE {
            ReportStatus::Degraded
        } else {
            ReportStatus::Critical
        }
    }
}

/// `clamp(quality * 100 - penalty * total_errors, 0, 100)`, quality 1.0 when unknown
pub fn compute_overall_health(quality: Option<f64>, total_errors: u64, penalty: f64) -> f64 {
    let quality = quality.unwrap_or(1.0);
    (quality * 100.0 - penalty * total_errors as f64).clamp(0.0, 100.0)
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AgentsReport {
    pub registered: AgentListing,
    pub health: Vec<AgentHealth>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ExecutionSummary {
    pub tasks: usize,
    pub completed: usize,
    pub failed: usize,
    pub success_rate: f64,
    pub average_duration_ms: f64,
    pub history_capacity: usize,
    pub recent: Vec<ExecutionRecord>,
}

impl ExecutionSummary {
    /// Summarise retained history; `recent_limit` newest records are kept, newest first
    pub fn from_history<'a, I>(history: I, history_capacity: usize, recent_limit: usize) -> Self
    where
        I: DoubleEndedIterator<Item = &'a ExecutionRecord> + Clone,
    {
        let mut tasks = 0;
        let mut completed = 0;
        let mut total_duration = 0u64;
        for record in history.clone() {
            tasks += 1;
            if record.status == TaskStatus::Completed {
                completed += 1;
            }
            total_duration += record.duration_ms;
        }

        let (success_rate, average_duration_ms) = if tasks == 0 {
            (1.0, 0.0)
        } else {
            (
                completed as f64 / tasks as f64,
                total_duration as f64 / tasks as f64,
            )
        };

        Self {
            tasks,
            completed,
            failed: tasks - completed,
            success_rate,
            average_duration_ms,
            history_capacity,
            recent: history.rev().take(recent_limit).cloned().collect(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ErrorReport {
    #[serde(flatten)]
    pub summary: ErrorSummary,
    pub patterns: Vec<ErrorPattern>,
}

/// Answer to `get_health_report`
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct HealthReport {
    /// 0 to 100
    pub overall_health: f64,
    pub status: ReportStatus,
    pub agents: AgentsReport,
    pub cache: CacheSummary,
    pub execution: ExecutionSummary,
    pub errors: ErrorReport,
    pub quality: QualitySummary,
    pub generated_at: DateTime<Utc>,
}

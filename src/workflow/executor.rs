//! Workflow execution
//!
//! The executor owns the per-run bookkeeping (result cache, quality tracker,
//! execution history) and shares the agent registry and error intelligence
//! with whoever built it.
//!
//! A task goes through:
//!
//! ```text
//! validate_task → collect upstream from cache → retry(route)
//!               → cache / quality / history / intelligence
//! ```
//!
//! Pre-flight problems (unknown type, unregistered agent, bad options, order
//! inversion) come back as `Err` before anything runs. A task whose retries
//! are exhausted is an ordinary `Ok` outcome with status FAILED, and a
//! workflow carries on past it.

use super::report::{
    compute_overall_health, AgentsReport, ErrorReport, ExecutionSummary, HealthReport,
    ReportStatus,
};
use super::state::{TaskLifecycle, TaskState, WorkflowLifecycle, WorkflowState};
use super::task::{
    mean_quality, ExecutionRecord, TaskOutcome, TaskSpec, TaskStatus, WorkflowError,
    WorkflowOutcome,
};
use crate::agent::{Agent, AgentRegistry, ErrorSeverity, TaskErrorDetail};
use crate::cache::ResultCache;
use crate::config::{ConfigError, OrchestratorConfig};
use crate::error::{sanitize_error_message, OrchestratorError, OrchestratorResult};
use crate::intelligence::ErrorIntelligence;
use crate::quality::QualityTracker;
use crate::recovery::{AttemptError, RecoveryOptions, RetryExecutor, RetryPolicy};
use crate::routing::{RoutedTask, TaskRouter};
use crate::{retry_span, task_span, workflow_span};
use chrono::Utc;
use serde_json::{json, Map, Value};
use std::collections::VecDeque;
use std::sync::{Arc, Mutex, MutexGuard};
use tokio::time::Instant;
use tracing::{debug, error, info, warn, Instrument};
use uuid::Uuid;

/// Worker name under which each agent attempt is tracked
pub const ATTEMPT_WORKER: &str = "execute";
/// Worker name under which each finished task is tracked
pub const TASK_WORKER: &str = "workflow";

/// Records and errors included in the health report
const RECENT_LIMIT: usize = 10;

fn lock_lifecycle(lifecycle: &Mutex<TaskLifecycle>) -> MutexGuard<'_, TaskLifecycle> {
    lifecycle.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

fn advance(lifecycle: &Mutex<TaskLifecycle>, next: TaskState) -> OrchestratorResult<()> {
    lock_lifecycle(lifecycle).transition(next)
}

fn failure_detail(failure: &AttemptError) -> TaskErrorDetail {
    let severity = match failure {
        AttemptError::TimedOut(_) => ErrorSeverity::Medium,
        AttemptError::Failed { .. } => ErrorSeverity::High,
    };
    TaskErrorDetail::new(
        failure.error_type(),
        sanitize_error_message(&failure.message()),
        severity,
    )
}

/// Drop the oldest records beyond `capacity`
fn cap_history(history: &mut VecDeque<ExecutionRecord>, capacity: usize) -> usize {
    let overflow = history.len().saturating_sub(capacity);
    history.drain(..overflow);
    overflow
}

/// Runs tasks and workflows against registered agents
pub struct WorkflowExecutor {
    config: OrchestratorConfig,
    router: TaskRouter,
    retry: RetryExecutor,
    cache: Arc<ResultCache>,
    intelligence: Arc<ErrorIntelligence>,
    quality: QualityTracker,
    history: Mutex<VecDeque<ExecutionRecord>>,
}

impl WorkflowExecutor {
    /// Build an executor around a shared error intelligence.
    ///
    /// The intelligence must have been built from `config.errors`, so the
    /// hint threshold and record limits in the file are the ones in force.
    pub fn new(
        config: OrchestratorConfig,
        registry: Arc<AgentRegistry>,
        intelligence: Arc<ErrorIntelligence>,
    ) -> OrchestratorResult<Self> {
        config.validate()?;
        if intelligence.settings() != &config.errors {
            return Err(ConfigError::InvalidConfig(format!(
                "error intelligence settings {:?} differ from [errors] {:?}",
                intelligence.settings(),
                config.errors
            ))
            .into());
        }
        let order = config.pipeline_order()?;

        info!(
            stages = order.len(),
            max_attempts = config.retry.max_attempts,
            backoff = config.retry.backoff,
            base_delay_ms = config.retry.base_delay_ms,
            history_capacity = config.execution.history_capacity,
            "Workflow executor created"
        );

        let policy = RetryPolicy::from(&config.retry);
        let retry = RetryExecutor::new(policy, Arc::clone(&intelligence));
        let history = VecDeque::with_capacity(config.execution.history_capacity.min(1024));

        Ok(Self {
            router: TaskRouter::new(registry, order),
            retry,
            cache: Arc::new(ResultCache::new()),
            intelligence,
            quality: QualityTracker::new(),
            history: Mutex::new(history),
            config,
        })
    }

    /// Executor with its own error intelligence built from `config.errors`
    pub fn from_config(
        config: OrchestratorConfig,
        registry: Arc<AgentRegistry>,
    ) -> OrchestratorResult<Self> {
        let intelligence = Arc::new(ErrorIntelligence::new(config.errors.clone()));
        Self::new(config, registry, intelligence)
    }

    pub fn config(&self) -> &OrchestratorConfig {
        &self.config
    }

    pub fn router(&self) -> &TaskRouter {
        &self.router
    }

    pub fn registry(&self) -> &Arc<AgentRegistry> {
        self.router.registry()
    }

    pub fn cache(&self) -> &Arc<ResultCache> {
        &self.cache
    }

    pub fn intelligence(&self) -> &Arc<ErrorIntelligence> {
        &self.intelligence
    }

    pub fn quality(&self) -> &QualityTracker {
        &self.quality
    }

    /// Register `handler` under `name` in the shared registry
    pub fn register_agent(&self, name: &str, handler: Arc<dyn Agent>) -> OrchestratorResult<()> {
        self.router.registry().register(name, handler)
    }

    fn lock_history(&self) -> MutexGuard<'_, VecDeque<ExecutionRecord>> {
        self.history.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Retained history, oldest first
    pub fn execution_history(&self) -> Vec<ExecutionRecord> {
        self.lock_history().iter().cloned().collect()
    }

    /// Validate and run one task outside of a workflow
    pub async fn execute_task(
        &self,
        task_type: &str,
        parameters: Map<String, Value>,
    ) -> OrchestratorResult<TaskOutcome> {
        let spec = TaskSpec::new(task_type).with_parameters(parameters);
        let mut lifecycle = TaskLifecycle::new();
        let routed = self.validate(&spec, &mut lifecycle)?;
        self.run(routed, lifecycle).await
    }

    /// Validate every task up front, then run them in order.
    ///
    /// Task failures do not stop the run; the final status is COMPLETED,
    /// FAILED, or PARTIALLY_COMPLETED when both kinds occurred.
    pub async fn execute_workflow(
        &self,
        tasks: &[TaskSpec],
    ) -> OrchestratorResult<WorkflowOutcome> {
        if tasks.is_empty() {
            return Err(OrchestratorError::validation(
                "workflow must contain at least one task",
            ));
        }

        let workflow_id = Uuid::new_v4();
        let span = workflow_span!(workflow_id = %workflow_id, tasks = tasks.len());

        async move {
            let mut workflow = WorkflowLifecycle::new();
            let prepared = self.preflight(tasks).map_err(|e| {
                warn!(error = %e, "Workflow rejected during pre-flight validation");
                e
            })?;

            workflow.transition(WorkflowState::Running)?;
            let started_at = Utc::now();
            let clock = Instant::now();
            info!(tasks = prepared.len(), "Workflow started");

            let mut outcomes = Vec::with_capacity(prepared.len());
            for (routed, lifecycle) in prepared {
                outcomes.push(self.run(routed, lifecycle).await?);
            }

            let completed = outcomes.iter().filter(|o| o.is_success()).count();
            let failed = outcomes.len() - completed;
            let status = WorkflowState::from_counts(completed, failed);
            workflow.transition(status)?;

            let errors: Vec<WorkflowError> =
                outcomes.iter().filter_map(WorkflowError::from_outcome).collect();
            let quality_score = mean_quality(&outcomes);
            let duration_ms = clock.elapsed().as_millis() as u64;

            info!(
                status = %status,
                completed,
                failed,
                quality_score,
                duration_ms,
                "Workflow finished"
            );

            Ok(WorkflowOutcome {
                workflow_id,
                status,
                tasks: outcomes,
                completed,
                failed,
                errors,
                quality_score,
                duration_ms,
                started_at,
            })
        }
        .instrument(span)
        .await
    }

    fn preflight(
        &self,
        tasks: &[TaskSpec],
    ) -> OrchestratorResult<Vec<(RoutedTask, TaskLifecycle)>> {
        self.router.validate_pipeline_order(tasks)?;

        tasks
            .iter()
            .map(|spec| {
                let mut lifecycle = TaskLifecycle::new();
                let routed = self.validate(spec, &mut lifecycle)?;
                Ok::<_, OrchestratorError>((routed, lifecycle))
            })
            .collect()
    }

    fn validate(
        &self,
        spec: &TaskSpec,
        lifecycle: &mut TaskLifecycle,
    ) -> OrchestratorResult<RoutedTask> {
        lifecycle.transition(TaskState::Validating)?;
        match self.router.validate_task(spec) {
            Ok(routed) => Ok(routed),
            Err(e) => {
                lifecycle.transition(TaskState::Failed)?;
                warn!(
                    task_type = %spec.task_type,
                    error_type = e.error_type(),
                    error = %e,
                    "Task rejected before execution"
                );
                Err(e)
            }
        }
    }

    async fn run(
        &self,
        routed: RoutedTask,
        lifecycle: TaskLifecycle,
    ) -> OrchestratorResult<TaskOutcome> {
        let task_id = Uuid::new_v4();
        let span = task_span!(task_id = %task_id, task_type = %routed.task_type);

        async move {
            let started_at = Utc::now();
            let clock = Instant::now();
            let lifecycle = Arc::new(Mutex::new(lifecycle));

            advance(&lifecycle, TaskState::Routing)?;
            let upstream = self.cache.collect(self.router.upstream_keys(&routed.task_type));
            let payload = match routed.payload(upstream) {
                Ok(payload) => payload,
                Err(e) => {
                    advance(&lifecycle, TaskState::Failed)?;
                    error!(error = %e, "Failed to build agent payload");
                    return Err(e);
                }
            };
            advance(&lifecycle, TaskState::Executing)?;

            let max_attempts = self.retry.policy().max_attempts.max(1);
            let callback_lifecycle = Arc::clone(&lifecycle);
            let options = RecoveryOptions::new().on_error(move |attempt, _failure| {
                if attempt < max_attempts {
                    if let Err(e) = advance(&callback_lifecycle, TaskState::Retrying) {
                        error!(error = %e, attempt, "Failed to mark task as retrying");
                    }
                }
            });

            let router = &self.router;
            let target = &routed;
            let attempt_lifecycle = Arc::clone(&lifecycle);
            let recovery = self
                .retry
                .execute(&routed.task_type, ATTEMPT_WORKER, options, move || {
                    let payload = payload.clone();
                    let lifecycle = Arc::clone(&attempt_lifecycle);
                    async move {
                        {
                            let mut guard = lock_lifecycle(&lifecycle);
                            if guard.state() == TaskState::Retrying {
                                guard.transition(TaskState::Executing).map_err(|e| {
                                    AttemptError::failed("internal_error", e.to_string())
                                })?;
                            }
                        }
                        let result = router.route(target, payload).await?;
                        if result.success {
                            Ok(result)
                        } else {
                            Err(AttemptError::from_result(&result))
                        }
                    }
                })
                .instrument(retry_span!(agent = %routed.task_type, method = ATTEMPT_WORKER))
                .await;

            let task_type = routed.task_type.as_str();
            let outcome = match recovery {
                Ok(recovered) => {
                    let result = recovered.value;
                    let quality_score =
                        self.quality.record(task_type, result.effective_quality(), true);
                    self.cache.set(task_type, Value::Object(result.data.clone()));
                    self.intelligence.track_success(task_type, TASK_WORKER);
                    advance(&lifecycle, TaskState::Completed)?;

                    info!(
                        attempts = recovered.attempts,
                        quality_score,
                        "Task completed"
                    );

                    TaskOutcome {
                        task_id,
                        task_type: task_type.to_string(),
                        status: TaskStatus::Completed,
                        result: Some(result),
                        quality_score,
                        duration_ms: clock.elapsed().as_millis() as u64,
                        errors: recovered.failures.iter().map(failure_detail).collect(),
                        attempts: recovered.attempts,
                        states: lock_lifecycle(&lifecycle).path(),
                        started_at,
                    }
                }
                Err(exhausted) => {
                    let quality_score = self.quality.record(task_type, 0.0, false);
                    let observation = self.intelligence.track_error(
                        task_type,
                        TASK_WORKER,
                        exhausted.source.error_type(),
                        &exhausted.source.message(),
                        json!({ "task_id": task_id, "attempts": exhausted.attempts }),
                    );
                    advance(&lifecycle, TaskState::Failed)?;

                    error!(
                        attempts = exhausted.attempts,
                        error_type = exhausted.source.error_type(),
                        error = %exhausted,
                        recommendation = observation.recommendation.as_deref().unwrap_or("none"),
                        "Task failed"
                    );

                    TaskOutcome {
                        task_id,
                        task_type: task_type.to_string(),
                        status: TaskStatus::Failed,
                        result: None,
                        quality_score,
                        duration_ms: clock.elapsed().as_millis() as u64,
                        errors: exhausted.failures.iter().map(failure_detail).collect(),
                        attempts: exhausted.attempts,
                        states: lock_lifecycle(&lifecycle).path(),
                        started_at,
                    }
                }
            };

            self.push_history(ExecutionRecord::from(&outcome));
            Ok(outcome)
        }
        .instrument(span)
        .await
    }

    fn push_history(&self, record: ExecutionRecord) {
        let capacity = self.config.execution.history_capacity;
        let mut history = self.lock_history();
        history.push_back(record);
        let dropped = cap_history(&mut history, capacity);
        if dropped > 0 {
            debug!(
                dropped,
                kept = capacity,
                "Execution history exceeded cap; dropped oldest records"
            );
        }
    }

    /// Snapshot of agents, cache, history, errors and quality
    pub fn get_health_report(&self) -> OrchestratorResult<HealthReport> {
        let quality = self.quality.summary();
        let errors = self.intelligence.error_summary(RECENT_LIMIT);
        let overall_health = compute_overall_health(
            self.quality.score(),
            errors.total_errors,
            self.config.execution.error_penalty,
        );

        let execution = {
            let history = self.lock_history();
            ExecutionSummary::from_history(
                history.iter(),
                self.config.execution.history_capacity,
                RECENT_LIMIT,
            )
        };

        let report = HealthReport {
            overall_health,
            status: ReportStatus::from_score(overall_health),
            agents: AgentsReport {
                registered: self.router.registry().list()?,
                health: self.intelligence.health().agents,
            },
            cache: self.cache.summary(),
            execution,
            errors: ErrorReport {
                summary: errors,
                patterns: self.intelligence.error_patterns(),
            },
            quality,
            generated_at: Utc::now(),
        };

        debug!(
            overall_health = report.overall_health,
            status = ?report.status,
            "Health report generated"
        );
        Ok(report)
    }

    /// Clear cache, history and quality; registrations and error counters stay
    pub fn reset(&self) {
        self.cache.clear();
        self.lock_history().clear();
        self.quality.clear();
        info!("Workflow executor reset");
    }
}

//! Task and workflow execution
//!
//! - [`task`]: submission format and outcomes
//! - [`state`]: the task and workflow state machines
//! - [`executor`]: [`WorkflowExecutor`]
//! - [`report`]: [`HealthReport`]

pub mod executor;
pub mod report;
pub mod state;
pub mod task;

pub use executor::{WorkflowExecutor, ATTEMPT_WORKER, TASK_WORKER};
pub use report::{compute_overall_health, ExecutionSummary, HealthReport, ReportStatus};
pub use state::{LifecycleState, TaskLifecycle, TaskState, WorkflowLifecycle, WorkflowState};
pub use task::{
    parse_submission, ExecutionRecord, TaskOutcome, TaskSpec, TaskStatus, WorkflowError,
    WorkflowOutcome,
};

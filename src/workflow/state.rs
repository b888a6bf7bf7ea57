//! Task and workflow state machines
//!
//! ```text
//! Task:     Created → Validating → Routing → Executing ⇄ Retrying → Completed | Failed
//!           (Validating and Routing may fail directly)
//! Workflow: Created → Running → Completed | PartiallyCompleted | Failed
//! ```
//!
//! Any other move is rejected with [`OrchestratorError::InvalidTransition`].

use crate::error::{OrchestratorError, OrchestratorResult};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt::{Debug, Display};
use tracing::trace;

/// A state with a fixed transition table
pub trait LifecycleState: Copy + Eq + Debug + Display {
    /// Entity name used in transition errors
    const ENTITY: &'static str;
    const INITIAL: Self;

    fn can_transition_to(self, next: Self) -> bool;

    fn is_terminal(self) -> bool;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum TaskState {
    Created,
    Validating,
    Routing,
    Executing,
    Retrying,
    Completed,
    Failed,
}

impl LifecycleState for TaskState {
    const ENTITY: &'static str = "task";
    const INITIAL: Self = TaskState::Created;

    fn can_transition_to(self, next: Self) -> bool {
        use TaskState::*;
        matches!(
            (self, next),
            (Created, Validating)
                | (Validating, Routing)
                | (Validating, Failed)
                | (Routing, Executing)
                | (Routing, Failed)
                | (Executing, Retrying)
                | (Executing, Completed)
                | (Executing, Failed)
                | (Retrying, Executing)
        )
    }

    fn is_terminal(self) -> bool {
        matches!(self, TaskState::Completed | TaskState::Failed)
    }
}

impl Display for TaskState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let label = match self {
            TaskState::Created => "CREATED",
            TaskState::Validating => "VALIDATING",
            TaskState::Routing => "ROUTING",
            TaskState::Executing => "EXECUTING",
            TaskState::Retrying => "RETRYING",
            TaskState::Completed => "COMPLETED",
            TaskState::Failed => "FAILED",
        };
        f.write_str(label)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum WorkflowState {
    Created,
    Running,
    Completed,
    PartiallyCompleted,
    Failed,
}

impl WorkflowState {
    /// Terminal state for a finished run with the given counts
    pub fn from_counts(completed: usize, failed: usize) -> Self {
        match (completed, failed) {
            (_, 0) => WorkflowState::Completed,
            (0, _) => WorkflowState::Failed,
            _ => WorkflowState::PartiallyCompleted,
        }
    }
}

impl LifecycleState for WorkflowState {
    const ENTITY: &'static str = "workflow";
    const INITIAL: Self = WorkflowState::Created;

    fn can_transition_to(self, next: Self) -> bool {
        use WorkflowState::*;
        matches!(
            (self, next),
            (Created, Running)
                | (Running, Completed)
                | (Running, PartiallyCompleted)
                | (Running, Failed)
        )
    }

    fn is_terminal(self) -> bool {
        matches!(
            self,
            WorkflowState::Completed | WorkflowState::PartiallyCompleted | WorkflowState::Failed
        )
    }
}

impl Display for WorkflowState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let label = match self {
            WorkflowState::Created => "CREATED",
            WorkflowState::Running => "RUNNING",
            WorkflowState::Completed => "COMPLETED",
            WorkflowState::PartiallyCompleted => "PARTIALLY_COMPLETED",
            WorkflowState::Failed => "FAILED",
        };
        f.write_str(label)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Transition<S> {
    pub from: S,
    pub to: S,
    pub at: DateTime<Utc>,
}

/// Current state plus every transition taken so far
#[derive(Debug, Clone)]
pub struct Lifecycle<S: LifecycleState> {
    state: S,
    transitions: Vec<Transition<S>>,
}

impl<S: LifecycleState> Default for Lifecycle<S> {
    fn default() -> Self {
        Self::new()
    }
}

impl<S: LifecycleState> Lifecycle<S> {
    pub fn new() -> Self {
        Self {
            state: S::INITIAL,
            transitions: Vec::new(),
        }
    }

    pub fn state(&self) -> S {
        self.state
    }

    pub fn transitions(&self) -> &[Transition<S>] {
        &self.transitions
    }

    pub fn is_terminal(&self) -> bool {
        self.state.is_terminal()
    }

    pub fn transition(&mut self, next: S) -> OrchestratorResult<()> {
        if !self.state.can_transition_to(next) {
            return Err(OrchestratorError::InvalidTransition {
                entity: S::ENTITY,
                from: self.state.to_string(),
                to: next.to_string(),
            });
        }

        trace!(entity = S::ENTITY, from = %self.state, to = %next, "State transition");
        self.transitions.push(Transition {
            from: self.state,
            to: next,
            at: Utc::now(),
        });
        self.state = next;
        Ok(())
    }

    /// Visited states in order, starting with the initial one
    pub fn path(&self) -> Vec<S> {
        std::iter::once(S::INITIAL)
            .chain(self.transitions.iter().map(|t| t.to))
            .collect()
    }
}

pub type TaskLifecycle = Lifecycle<TaskState>;
pub type WorkflowLifecycle = Lifecycle<WorkflowState>;

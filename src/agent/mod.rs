//! Pluggable pipeline stages
//!
//! An agent is any stage that implements [`Agent`]. The orchestrator never
//! looks inside an agent; it only hands over a payload and interprets the
//! returned [`TaskResult`].

pub mod registry;
pub mod result;

pub use registry::{AgentListing, AgentRegistry, RegisteredAgent};
pub use result::{ErrorSeverity, TaskErrorDetail, TaskResult};

use async_trait::async_trait;
use serde_json::{Map, Value};
use thiserror::Error;

/// Payload handed to an agent: typed options re-serialized plus `upstream`
pub type Payload = Map<String, Value>;

/// The single capability an external stage must provide
#[async_trait]
pub trait Agent: Send + Sync {
    /// Run the stage once with the adapted payload
    async fn execute(&self, payload: Payload) -> Result<TaskResult, AgentError>;
}

/// Failure raised by an agent while executing
#[derive(Debug, Clone, Error, PartialEq)]
pub enum AgentError {
    #[error("Invalid input: {0}")]
    InvalidInput(String),

    #[error("Missing upstream data: {0}")]
    MissingUpstream(String),

    #[error("Execution failed: {0}")]
    ExecutionFailed(String),

    #[error("{kind}: {message}")]
    Other { kind: String, message: String },
}

impl AgentError {
    /// Create an error with a caller-chosen type label
    pub fn other<K: Into<String>, M: Into<String>>(kind: K, message: M) -> Self {
        Self::Other {
            kind: kind.into(),
            message: message.into(),
        }
    }

    /// Type label recorded by error tracking
    pub fn kind(&self) -> &str {
        match self {
            AgentError::InvalidInput(_) => "invalid_input",
            AgentError::MissingUpstream(_) => "missing_upstream",
            AgentError::ExecutionFailed(_) => "execution_failed",
            AgentError::Other { kind, .. } => kind,
        }
    }

    /// Message without the type prefix
    pub fn message(&self) -> &str {
        match self {
            AgentError::InvalidInput(m)
            | AgentError::MissingUpstream(m)
            | AgentError::ExecutionFailed(m) => m,
            AgentError::Other { message, .. } => message,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_agent_error_kinds() {
        assert_eq!(AgentError::InvalidInput("x".into()).kind(), "invalid_input");
        assert_eq!(
            AgentError::MissingUpstream("load_data".into()).kind(),
            "missing_upstream"
        );
        assert_eq!(
            AgentError::ExecutionFailed("boom".into()).kind(),
            "execution_failed"
        );
        assert_eq!(AgentError::other("memory_error", "oom").kind(), "memory_error");
    }

    #[test]
    fn test_agent_error_display_and_message() {
        let error = AgentError::other("file_not_found", "sales.csv");
        assert_eq!(error.to_string(), "file_not_found: sales.csv");
        assert_eq!(error.message(), "sales.csv");

        let error = AgentError::ExecutionFailed("singular matrix".into());
        assert_eq!(error.to_string(), "Execution failed: singular matrix");
        assert_eq!(error.message(), "singular matrix");
    }
}

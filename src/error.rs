//! Error types for the pipeline orchestrator
//!
//! Separates pre-flight failures (configuration, validation, registration),
//! which are never retried, from execution failures, which only surface here
//! once the retry layer has given up.

use crate::config::ConfigError;
use crate::recovery::RecoveryError;
use once_cell::sync::Lazy;
use regex::Regex;
use thiserror::Error;

/// Maximum length of an error message kept in records and reports
pub const MAX_ERROR_MESSAGE_LEN: usize = 500;

static SECRET_PATTERN: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?i)(password|token|key|secret)[=:]\s*\S+").expect("secret pattern is valid")
});

static SENSITIVE_PATH_PATTERN: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"/[a-zA-Z0-9._/-]+/(secrets?|\.ssh|\.aws|\.config)/[a-zA-Z0-9._/-]+")
        .expect("path pattern is valid")
});

/// Main error type for orchestrator operations
#[derive(Debug, Error)]
pub enum OrchestratorError {
    #[error("Configuration error: {message}")]
    Configuration { message: String },

    #[error("Validation error: {message}")]
    Validation { message: String },

    #[error(
        "Pipeline order violation: '{current}' (position {current_position}) \
         cannot run after '{previous}' (position {previous_position})"
    )]
    PipelineOrder {
        previous: String,
        previous_position: usize,
        current: String,
        current_position: usize,
    },

    #[error("Agent already registered: {name}")]
    DuplicateRegistration { name: String },

    #[error("Invalid agent name '{name}': must match [a-zA-Z0-9._-]+")]
    InvalidAgentName { name: String },

    #[error("No agent registered under '{name}'")]
    AgentNotFound { name: String },

    #[error("Invalid {entity} state transition: {from} -> {to}")]
    InvalidTransition {
        entity: &'static str,
        from: String,
        to: String,
    },

    #[error(transparent)]
    Recovery(#[from] RecoveryError),

    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("Internal error: {message}")]
    Internal { message: String },
}

/// Coarse classification used by callers deciding how to react
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    /// Unknown task type, unregistered agent, bad configuration
    Configuration,
    /// Malformed parameters or pipeline order
    Validation,
    /// Agent registration rejected
    Registration,
    /// Retries exhausted
    Execution,
    Internal,
}

impl OrchestratorError {
    /// Create configuration error
    pub fn configuration<S: Into<String>>(message: S) -> Self {
        Self::Configuration {
            message: message.into(),
        }
    }

    /// Create validation error
    pub fn validation<S: Into<String>>(message: S) -> Self {
        Self::Validation {
            message: message.into(),
        }
    }

    /// Create agent-not-found error
    pub fn agent_not_found<S: Into<String>>(name: S) -> Self {
        Self::AgentNotFound { name: name.into() }
    }

    /// Create internal error
    pub fn internal<S: Into<String>>(message: S) -> Self {
        Self::Internal {
            message: message.into(),
        }
    }

    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::Configuration { .. } | Self::AgentNotFound { .. } | Self::Config(_) => {
                ErrorKind::Configuration
            }
            Self::Validation { .. } | Self::PipelineOrder { .. } => ErrorKind::Validation,
            Self::DuplicateRegistration { .. } | Self::InvalidAgentName { .. } => {
                ErrorKind::Registration
            }
            Self::Recovery(_) => ErrorKind::Execution,
            Self::InvalidTransition { .. } | Self::Internal { .. } => ErrorKind::Internal,
        }
    }

    /// Pre-flight errors abort a whole workflow before any task runs
    pub fn is_preflight(&self) -> bool {
        matches!(
            self.kind(),
            ErrorKind::Configuration | ErrorKind::Validation
        )
    }

    /// Short machine-readable label, used as `error_type` in records
    pub fn error_type(&self) -> &'static str {
        match self {
            Self::Configuration { .. } | Self::Config(_) => "configuration_error",
            Self::AgentNotFound { .. } => "agent_not_found",
            Self::Validation { .. } => "validation_error",
            Self::PipelineOrder { .. } => "pipeline_order_error",
            Self::DuplicateRegistration { .. } => "duplicate_registration",
            Self::InvalidAgentName { .. } => "invalid_agent_name",
            Self::InvalidTransition { .. } => "invalid_transition",
            Self::Recovery(_) => "recovery_error",
            Self::Internal { .. } => "internal_error",
        }
    }
}

/// Redact secrets and sensitive paths, then cap the length
pub fn sanitize_error_message(message: &str) -> String {
    let redacted = SECRET_PATTERN.replace_all(message, "${1}=***");
    let mut sanitized = SENSITIVE_PATH_PATTERN
        .replace_all(&redacted, "/***REDACTED***/")
        .into_owned();

    if sanitized.len() > MAX_ERROR_MESSAGE_LEN {
        let truncate_suffix = "...[truncated]";
        let mut cut = MAX_ERROR_MESSAGE_LEN - truncate_suffix.len();
        while !sanitized.is_char_boundary(cut) {
            cut -= 1;
        }
        sanitized.truncate(cut);
        sanitized.push_str(truncate_suffix);
    }

    sanitized
}

/// Result type for orchestrator operations
pub type OrchestratorResult<T> = Result<T, OrchestratorError>;

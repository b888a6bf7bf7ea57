//! Pipeline Orchestrator
//!
//! Coordination layer for a fixed pipeline of pluggable analysis stages
//! ("agents") sharing an in-memory result cache.
//!
//! # Overview
//!
//! - Agent registry and the [`Agent`] capability trait
//! - Canonical pipeline order with pre-flight validation
//! - Typed per-stage options
//! - Bounded retry with exponential backoff
//! - Error intelligence: per-agent health, recurring patterns, fix hints
//! - Workflow execution with quality aggregation and health reports
//!
//! # Quick Start
//!
//! ```rust
//! use pipeline_orchestrator::testing::EchoAgent;
//! use pipeline_orchestrator::{
//!     AgentRegistry, ErrorIntelligence, OrchestratorConfig, TaskSpec, WorkflowExecutor,
//!     WorkflowState,
//! };
//! use serde_json::json;
//! use std::sync::Arc;
//!
//! # tokio_test::block_on(async {
//! let registry = Arc::new(AgentRegistry::new());
//! registry.register("load_data", Arc::new(EchoAgent::new())).unwrap();
//! registry.register("explore", Arc::new(EchoAgent::new())).unwrap();
//!
//! let executor = WorkflowExecutor::new(
//!     OrchestratorConfig::default(),
//!     registry,
//!     Arc::new(ErrorIntelligence::default()),
//! )
//! .unwrap();
//!
//! let outcome = executor
//!     .execute_workflow(&[
//!         TaskSpec::new("load_data").with_parameter("file_path", json!("sales.csv")),
//!         TaskSpec::new("explore"),
//!     ])
//!     .await
//!     .unwrap();
//!
//! assert_eq!(outcome.status, WorkflowState::Completed);
//! assert!(executor.cache().get("explore").is_some());
//! # });
//! ```

pub mod agent;
pub mod cache;
pub mod config;
pub mod error;
pub mod intelligence;
pub mod observability;
pub mod quality;
pub mod recovery;
pub mod routing;
pub mod testing;
pub mod workflow;

pub use agent::{Agent, AgentError, AgentRegistry, Payload, TaskResult};
pub use cache::ResultCache;
pub use config::{ConfigError, OrchestratorConfig};
pub use error::{OrchestratorError, OrchestratorResult};
pub use intelligence::{ErrorIntelligence, HealthStatus};
pub use quality::QualityTracker;
pub use recovery::{AttemptError, RecoveryError, RecoveryOptions, RetryExecutor, RetryPolicy};
pub use routing::{PipelineOrder, TaskOptions, TaskRouter};
pub use workflow::{
    HealthReport, TaskOutcome, TaskSpec, TaskStatus, WorkflowExecutor, WorkflowOutcome,
    WorkflowState,
};

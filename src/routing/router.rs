//! Task routing
//!
//! The router owns the canonical pipeline order and is the boundary where a
//! generic task descriptor becomes a concrete agent invocation:
//!
//! ```text
//! TaskSpec → validate_task (order + registry + typed options) → RoutedTask
//!          → route → TaskResult
//! ```
//!
//! Caching, retries and telemetry belong to the workflow executor; the router
//! only resolves and invokes.

use super::options::{TaskOptions, UPSTREAM_KEY};
use super::pipeline::PipelineOrder;
use crate::agent::{Agent, AgentError, AgentRegistry, Payload, TaskResult};
use crate::error::OrchestratorResult;
use crate::workflow::task::TaskSpec;
use serde_json::{Map, Value};
use std::sync::Arc;
use tracing::debug;

/// A validated task bound to its agent
#[derive(Clone)]
pub struct RoutedTask {
    pub task_type: String,
    /// Position in the canonical pipeline order
    pub position: usize,
    pub options: TaskOptions,
    agent: Arc<dyn Agent>,
}

impl std::fmt::Debug for RoutedTask {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RoutedTask")
            .field("task_type", &self.task_type)
            .field("position", &self.position)
            .field("options", &self.options)
            .finish_non_exhaustive()
    }
}

impl RoutedTask {
    /// Payload for the agent: options plus the upstream snapshot
    pub fn payload(&self, upstream: Map<String, Value>) -> OrchestratorResult<Payload> {
        let mut payload = self.options.to_payload()?;
        payload.insert(UPSTREAM_KEY.to_string(), Value::Object(upstream));
        Ok(payload)
    }
}

/// Validates pipeline ordering and maps tasks onto registered agents
pub struct TaskRouter {
    registry: Arc<AgentRegistry>,
    order: PipelineOrder,
}

impl TaskRouter {
    pub fn new(registry: Arc<AgentRegistry>, order: PipelineOrder) -> Self {
        Self { registry, order }
    }

    pub fn order(&self) -> &PipelineOrder {
        &self.order
    }

    pub fn registry(&self) -> &Arc<AgentRegistry> {
        &self.registry
    }

    /// Pre-flight check over a whole submission: positions never decrease
    pub fn validate_pipeline_order(&self, tasks: &[TaskSpec]) -> OrchestratorResult<()> {
        self.order
            .validate_sequence(tasks.iter().map(|task| task.task_type.as_str()))?;
        debug!(tasks = tasks.len(), "Pipeline order validated");
        Ok(())
    }

    /// Check the task type is known and registered and parse its options
    pub fn validate_task(&self, task: &TaskSpec) -> OrchestratorResult<RoutedTask> {
        let position = self.order.require_position(&task.task_type)?;
        let agent = self.registry.get(&task.task_type)?;
        let options = TaskOptions::parse(&task.task_type, &task.parameters)?;

        debug!(
            task_type = %task.task_type,
            position,
            custom = options.stage().is_none(),
            "Task validated"
        );

        Ok(RoutedTask {
            task_type: task.task_type.clone(),
            position,
            options,
            agent,
        })
    }

    /// Stages whose cached results are visible to `task_type`.
    ///
    /// Only stages strictly earlier in the order are included. A repeated
    /// stage never sees its own previous result: the cache holds one entry
    /// per stage and a rerun overwrites it.
    pub fn upstream_keys(&self, task_type: &str) -> impl Iterator<Item = &str> {
        self.order.predecessors(task_type).iter().map(String::as_str)
    }

    /// Invoke the agent bound to `routed` once with a prepared payload
    pub async fn route(
        &self,
        routed: &RoutedTask,
        payload: Payload,
    ) -> Result<TaskResult, AgentError> {
        let upstream = payload
            .get(UPSTREAM_KEY)
            .and_then(serde_json::Value::as_object)
            .map_or(0, |m| m.len());
        debug!(task_type = %routed.task_type, upstream, "Routing task to agent");

        routed.agent.execute(payload).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::OrchestratorError;
    use crate::testing::mocks::EchoAgent;
    use serde_json::json;

    fn router_with(names: &[&str]) -> TaskRouter {
        let registry = Arc::new(AgentRegistry::new());
        for name in names {
            registry.register(name, Arc::new(EchoAgent::new())).unwrap();
        }
        TaskRouter::new(registry, PipelineOrder::default())
    }

    #[test]
    fn test_validate_pipeline_order() {
        let router = router_with(&[]);
        assert!(router
            .validate_pipeline_order(&[TaskSpec::new("predict"), TaskSpec::new("load_data")])
            .is_err());
        assert!(router
            .validate_pipeline_order(&[
                TaskSpec::new("load_data"),
                TaskSpec::new("explore"),
                TaskSpec::new("report"),
            ])
            .is_ok());
    }

    #[test]
    fn test_validate_task_requires_registration() {
        let router = router_with(&["explore"]);
        assert!(router.validate_task(&TaskSpec::new("explore")).is_ok());

        let result = router.validate_task(&TaskSpec::new("report"));
        assert!(matches!(result, Err(OrchestratorError::AgentNotFound { .. })));
    }

    #[test]
    fn test_validate_task_unknown_type() {
        let router = router_with(&[]);
        let result = router.validate_task(&TaskSpec::new("train_model"));
        assert!(matches!(
            result,
            Err(OrchestratorError::Configuration { .. })
        ));
    }

    #[test]
    fn test_validate_task_bad_parameters() {
        let router = router_with(&["predict"]);
        let task = TaskSpec::new("predict").with_parameter("horizon", json!(0));
        let result = router.validate_task(&task);
        assert!(matches!(result, Err(OrchestratorError::Validation { .. })));
    }

    #[test]
    fn test_upstream_keys() {
        let router = router_with(&[]);
        let keys: Vec<&str> = router.upstream_keys("aggregate").collect();
        assert_eq!(keys, vec!["load_data", "explore"]);

        let keys: Vec<&str> = router.upstream_keys("explore").collect();
        assert_eq!(keys, vec!["load_data"]);
        assert_eq!(router.upstream_keys("load_data").count(), 0);
    }

    #[tokio::test]
    async fn test_route_passes_options_and_upstream() {
        let router = router_with(&["explore"]);
        let routed = router.validate_task(&TaskSpec::new("explore")).unwrap();

        let mut upstream = Map::new();
        upstream.insert("load_data".to_string(), json!({"rows": 3}));

        let payload = routed.payload(upstream).unwrap();
        let result = router.route(&routed, payload).await.unwrap();
        assert!(result.success);
        let echoed = &result.data["payload"];
        assert_eq!(echoed["include_correlations"], json!(true));
        assert_eq!(echoed["upstream"]["load_data"]["rows"], json!(3));
    }
}

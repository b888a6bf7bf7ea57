//! Workflow executor integration tests
//!
//! Exercise whole workflows against mock agents and check the observable
//! results: statuses, cache contents, quality, error counters, reports.


use pipeline_orchestrator::agent::AgentError;
use pipeline_orchestrator::intelligence::HealthStatus;
use pipeline_orchestrator::testing::{EchoAgent, FailingAgent, ScriptedAgent};
use pipeline_orchestrator::workflow::{ReportStatus, TaskState, ATTEMPT_WORKER, TASK_WORKER};
use pipeline_orchestrator::{Agent, OrchestratorError, TaskSpec, TaskStatus, WorkflowState};
use serde_json::json;
use std::sync::Arc;
use test_helpers::{config_with_order, executor_with, fast_config, params};

fn load_data() -> TaskSpec {
    TaskSpec::new("load_data").with_parameter("file_path", json!("sales.csv"))
}

#[tokio::test]
async fn test_failed_middle_task_gives_partial_completion() {
    let explore = Arc::new(FailingAgent::new(AgentError::ExecutionFailed(
        "correlation matrix is singular".into(),
    )));
    let aggregate = Arc::new(EchoAgent::new());
    let (executor, _) = executor_with(
        fast_config(),
        vec![
            ("load_data", Arc::new(EchoAgent::new()) as Arc<dyn Agent>),
            ("explore", explore.clone() as Arc<dyn Agent>),
            ("aggregate", aggregate.clone() as Arc<dyn Agent>),
        ],
    );

    let outcome = executor
        .execute_workflow(&[load_data(), TaskSpec::new("explore"), TaskSpec::new("aggregate")])
        .await
        .unwrap();

    assert_eq!(outcome.status, WorkflowState::PartiallyCompleted);
    assert_eq!(outcome.completed, 2);
    assert_eq!(outcome.failed, 1);
    assert_eq!(outcome.tasks.len(), 3);

    let failed = outcome.task("explore").unwrap();
    assert_eq!(failed.status, TaskStatus::Failed);
    assert_eq!(failed.attempts, 3);
    assert_eq!(explore.calls(), 3);

    // task 3 still ran and was cached
    assert_eq!(aggregate.calls(), 1);
    let cached = executor.cache().get("aggregate").unwrap();
    let upstream = &cached["payload"]["upstream"];
    assert!(upstream.get("load_data").is_some());
    assert!(upstream.get("explore").is_none());
    assert!(executor.cache().get("explore").is_none());
}

#[tokio::test]
async fn test_workflow_lists_final_error_of_each_failed_task() {
    let flaky = Arc::new(
        ScriptedAgent::new().fail_times(1, AgentError::ExecutionFailed("busy".into())),
    );
    let (executor, _) = executor_with(
        fast_config(),
        vec![
            ("load_data", Arc::new(EchoAgent::new()) as Arc<dyn Agent>),
            ("explore", flaky as Arc<dyn Agent>),
            (
                "predict",
                Arc::new(FailingAgent::new(AgentError::other("convergence_error", "diverged")))
                    as Arc<dyn Agent>,
            ),
        ],
    );

    let outcome = executor
        .execute_workflow(&[load_data(), TaskSpec::new("explore"), TaskSpec::new("predict")])
        .await
        .unwrap();

    assert_eq!(outcome.status, WorkflowState::PartiallyCompleted);
    // explore recovered, so only predict is listed
    assert_eq!(outcome.errors.len(), 1);
    let error = &outcome.errors[0];
    assert_eq!(error.task_type, "predict");
    assert_eq!(error.task_id, outcome.task("predict").unwrap().task_id);
    assert_eq!(error.error.error_type, "convergence_error");
    assert_eq!(error.error.message, "diverged");
    assert_eq!(outcome.task("explore").unwrap().errors.len(), 1);

    let value = serde_json::to_value(&outcome).unwrap();
    assert_eq!(value["status"], json!("PARTIALLY_COMPLETED"));
    assert_eq!(value["errors"][0]["type"], json!("convergence_error"));
    assert_eq!(value["errors"][0]["severity"], json!("high"));
}

#[tokio::test]
async fn test_quality_counts_failed_task_as_zero() {
    let (executor, _) = executor_with(
        fast_config(),
        vec![
            ("load_data", Arc::new(EchoAgent::new().with_quality(1.0)) as Arc<dyn Agent>),
            ("explore", Arc::new(EchoAgent::new().with_quality(0.5)) as Arc<dyn Agent>),
            (
                "aggregate",
                Arc::new(FailingAgent::new(AgentError::other("memory_error", "oom")))
                    as Arc<dyn Agent>,
            ),
        ],
    );

    let outcome = executor
        .execute_workflow(&[load_data(), TaskSpec::new("explore"), TaskSpec::new("aggregate")])
        .await
        .unwrap();

    assert!((outcome.quality_score - 0.5).abs() < 1e-9);
    assert!((executor.quality().score().unwrap() - 0.5).abs() < 1e-9);
}

#[tokio::test]
async fn test_custom_stages_end_to_end() {
    let b = Arc::new(
        ScriptedAgent::new()
            .then_fail(AgentError::ExecutionFailed("warming up".into()))
            .with_quality(1.0),
    );
    let (executor, intelligence) = executor_with(
        config_with_order(&["A", "B"]),
        vec![
            ("A", Arc::new(EchoAgent::new().with_quality(0.9)) as Arc<dyn Agent>),
            ("B", b.clone() as Arc<dyn Agent>),
        ],
    );

    let outcome = executor
        .execute_workflow(&[
            TaskSpec::new("A").with_parameter("window", json!(7)),
            TaskSpec::new("B"),
        ])
        .await
        .unwrap();

    assert_eq!(outcome.status, WorkflowState::Completed);
    assert_eq!(outcome.completed, 2);
    assert!((outcome.quality_score - 0.95).abs() < 1e-9);

    // custom parameters pass through unchanged
    let a = executor.cache().get("A").unwrap();
    assert_eq!(a["payload"]["window"], json!(7));

    // B saw A's result as upstream on both attempts
    let payloads = b.payloads();
    assert_eq!(payloads.len(), 2);
    assert_eq!(payloads[1]["upstream"]["A"]["payload"]["window"], json!(7));

    let health = intelligence.agent_health("B");
    assert_eq!(health.failures, 1);
    assert_eq!(health.successes, 2);
    let attempts = intelligence.worker_health("B", ATTEMPT_WORKER);
    assert_eq!((attempts.successes, attempts.failures), (1, 1));
    let tasks = intelligence.worker_health("B", TASK_WORKER);
    assert_eq!((tasks.successes, tasks.failures), (1, 0));

    let b_outcome = outcome.task("B").unwrap();
    assert!(b_outcome.states.contains(&TaskState::Retrying));
}

#[tokio::test]
async fn test_order_inversion_aborts_before_any_task() {
    let load = Arc::new(EchoAgent::new());
    let predict = Arc::new(EchoAgent::new());
    let (executor, intelligence) = executor_with(
        fast_config(),
        vec![
            ("load_data", load.clone() as Arc<dyn Agent>),
            ("predict", predict.clone() as Arc<dyn Agent>),
        ],
    );

    let result = executor
        .execute_workflow(&[TaskSpec::new("predict"), load_data()])
        .await;

    match result {
        Err(OrchestratorError::PipelineOrder { previous, current, .. }) => {
            assert_eq!(previous, "predict");
            assert_eq!(current, "load_data");
        }
        other => panic!("expected pipeline order error, got {other:?}"),
    }
    assert_eq!(load.calls() + predict.calls(), 0);
    assert!(executor.execution_history().is_empty());
    assert_eq!(intelligence.total_errors(), 0);
}

#[tokio::test]
async fn test_invalid_options_abort_before_any_task() {
    let load = Arc::new(EchoAgent::new());
    let (executor, _) = executor_with(
        fast_config(),
        vec![
            ("load_data", load.clone() as Arc<dyn Agent>),
            ("predict", Arc::new(EchoAgent::new()) as Arc<dyn Agent>),
        ],
    );

    let result = executor
        .execute_workflow(&[
            load_data(),
            TaskSpec::new("predict").with_parameter("horizon", json!(0)),
        ])
        .await;

    assert!(matches!(result, Err(OrchestratorError::Validation { .. })));
    assert_eq!(load.calls(), 0);
}

#[tokio::test]
async fn test_unregistered_agent_aborts_before_any_task() {
    let load = Arc::new(EchoAgent::new());
    let (executor, _) =
        executor_with(fast_config(), vec![("load_data", load.clone() as Arc<dyn Agent>)]);

    let result = executor
        .execute_workflow(&[load_data(), TaskSpec::new("report")])
        .await;

    assert!(matches!(result, Err(OrchestratorError::AgentNotFound { .. })));
    assert_eq!(load.calls(), 0);
}

#[tokio::test]
async fn test_all_tasks_failing_gives_failed_workflow() {
    let (executor, _) = executor_with(
        fast_config(),
        vec![
            (
                "load_data",
                Arc::new(FailingAgent::new(AgentError::other("file_not_found", "sales.csv")))
                    as Arc<dyn Agent>,
            ),
            (
                "explore",
                Arc::new(FailingAgent::new(AgentError::MissingUpstream("load_data".into())))
                    as Arc<dyn Agent>,
            ),
        ],
    );

    let outcome = executor
        .execute_workflow(&[load_data(), TaskSpec::new("explore")])
        .await
        .unwrap();

    assert_eq!(outcome.status, WorkflowState::Failed);
    assert_eq!(outcome.failed, 2);
    assert_eq!(outcome.quality_score, 0.0);
    assert!(executor.cache().is_empty());
}

#[tokio::test]
async fn test_reported_failure_is_retried() {
    let agent = Arc::new(
        ScriptedAgent::new()
            .then_report_failure("empty_dataset", "no rows after filtering")
            .then_report_failure("empty_dataset", "no rows after filtering"),
    );
    let (executor, intelligence) =
        executor_with(fast_config(), vec![("explore", agent.clone() as Arc<dyn Agent>)]);

    let outcome = executor.execute_task("explore", params(json!({}))).await.unwrap();

    assert_eq!(outcome.status, TaskStatus::Completed);
    assert_eq!(outcome.attempts, 3);
    assert_eq!(outcome.errors.len(), 2);
    assert_eq!(outcome.errors[0].error_type, "empty_dataset");
    assert_eq!(
        intelligence.error_summary(10).by_type.get("empty_dataset"),
        Some(&2)
    );
}

#[tokio::test]
async fn test_repeated_stage_overwrites_cache() {
    let agent = Arc::new(
        ScriptedAgent::new()
            .then_succeed(params(json!({"run": "a"})), None)
            .then_succeed(params(json!({"run": "b"})), None),
    );
    let (executor, _) = executor_with(fast_config(), vec![("explore", agent as Arc<dyn Agent>)]);

    let outcome = executor
        .execute_workflow(&[TaskSpec::new("explore"), TaskSpec::new("explore")])
        .await
        .unwrap();

    assert_eq!(outcome.status, WorkflowState::Completed);
    assert_eq!(executor.cache().get("explore"), Some(json!({"run": "b"})));
}

#[tokio::test]
async fn test_health_report_reflects_errors_and_quality() {
    let (executor, _) = executor_with(
        fast_config(),
        vec![
            ("load_data", Arc::new(EchoAgent::new()) as Arc<dyn Agent>),
            (
                "explore",
                Arc::new(FailingAgent::new(AgentError::ExecutionFailed("boom".into())))
                    as Arc<dyn Agent>,
            ),
            ("aggregate", Arc::new(EchoAgent::new()) as Arc<dyn Agent>),
        ],
    );

    let cold = executor.get_health_report().unwrap();
    assert_eq!(cold.overall_health, 100.0);
    assert_eq!(cold.status, ReportStatus::Healthy);
    assert_eq!(cold.agents.registered.count, 3);

    executor
        .execute_workflow(&[load_data(), TaskSpec::new("explore"), TaskSpec::new("aggregate")])
        .await
        .unwrap();

    let report = executor.get_health_report().unwrap();
    // quality 2/3, four errors (three attempts plus the task) at 2 points each
    let expected = 200.0 / 3.0 - 8.0;
    assert!((report.overall_health - expected).abs() < 1e-9);
    assert_eq!(report.status, ReportStatus::Degraded);
    assert_eq!(report.errors.summary.total_errors, 4);
    assert_eq!(report.execution.tasks, 3);
    assert_eq!(report.execution.failed, 1);
    assert_eq!(report.cache.entries, 2);

    let explore = report
        .agents
        .health
        .iter()
        .find(|a| a.agent == "explore")
        .unwrap();
    assert_eq!(explore.status, HealthStatus::Broken);

    let value = serde_json::to_value(&report).unwrap();
    for key in ["overall_health", "status", "agents", "cache", "execution", "errors", "quality"] {
        assert!(value.get(key).is_some(), "missing {key}");
    }
    assert_eq!(value["status"], json!("degraded"));
    assert_eq!(value["errors"]["total_errors"], json!(4));
}

#[tokio::test]
async fn test_reset_keeps_registrations_and_error_counters() {
    let (executor, intelligence) = executor_with(
        fast_config(),
        vec![
            ("load_data", Arc::new(EchoAgent::new()) as Arc<dyn Agent>),
            (
                "explore",
                Arc::new(FailingAgent::new(AgentError::ExecutionFailed("boom".into())))
                    as Arc<dyn Agent>,
            ),
        ],
    );

    executor
        .execute_workflow(&[load_data(), TaskSpec::new("explore")])
        .await
        .unwrap();
    let errors_before = intelligence.total_errors();
    assert!(errors_before > 0);

    executor.reset();

    assert!(executor.cache().is_empty());
    assert!(executor.execution_history().is_empty());
    assert!(executor.quality().is_empty());
    assert_eq!(executor.registry().len(), 2);
    assert_eq!(intelligence.total_errors(), errors_before);

    // the executor is usable again after a reset
    let outcome = executor.execute_workflow(&[load_data()]).await.unwrap();
    assert_eq!(outcome.status, WorkflowState::Completed);
}

#[tokio::test]
async fn test_concurrent_tasks_share_one_executor() {
    let flaky = Arc::new(
        ScriptedAgent::new().fail_times(3, AgentError::ExecutionFailed("busy".into())),
    );
    let (executor, intelligence) = executor_with(
        fast_config(),
        vec![
            ("explore", Arc::new(EchoAgent::new()) as Arc<dyn Agent>),
            ("predict", flaky.clone() as Arc<dyn Agent>),
        ],
    );

    let runs = (0..8).map(|i| {
        let task_type = if i % 2 == 0 { "explore" } else { "predict" };
        executor.execute_task(task_type, params(json!({})))
    });
    let outcomes = futures::future::join_all(runs).await;

    assert_eq!(outcomes.len(), 8);
    assert!(outcomes.iter().all(|o| o.is_ok()));
    assert_eq!(executor.execution_history().len(), 8);
    assert_eq!(executor.quality().len(), 8);
    assert!(executor.cache().contains("explore"));
    assert!(executor.cache().contains("predict"));

    // Three scripted failures spread over the predict runs, none exhausting
    assert_eq!(flaky.calls(), 7);
    let attempts = intelligence.worker_health("predict", ATTEMPT_WORKER);
    assert_eq!((attempts.successes, attempts.failures), (4, 3));
    assert_eq!(intelligence.worker_health("explore", TASK_WORKER).successes, 4);
}

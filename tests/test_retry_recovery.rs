//! Retry and recovery behavior tests
//!
//! Backoff timing is checked on tokio's paused clock, so these tests finish
//! instantly while still observing the 1s / 2s schedule.


use pipeline_orchestrator::agent::AgentError;
use pipeline_orchestrator::error::ErrorKind;
use pipeline_orchestrator::recovery::Recovered;
use pipeline_orchestrator::testing::ScriptedAgent;
use pipeline_orchestrator::{
    Agent, AttemptError, ErrorIntelligence, OrchestratorConfig, OrchestratorError,
    RecoveryOptions, RetryExecutor, RetryPolicy, TaskStatus,
};
use serde_json::Map;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;
use std::time::Duration;
use test_helpers::{executor_with, fast_config};
use tokio::time::Instant;

fn retry_executor(policy: RetryPolicy) -> (RetryExecutor, Arc<ErrorIntelligence>) {
    let intelligence = Arc::new(ErrorIntelligence::default());
    (RetryExecutor::new(policy, Arc::clone(&intelligence)), intelligence)
}

#[tokio::test(start_paused = true)]
async fn test_fail_twice_then_succeed_backs_off_one_then_two_seconds() {
    let agent = Arc::new(
        ScriptedAgent::new().fail_times(2, AgentError::ExecutionFailed("busy".into())),
    );
    let (executor, _) = executor_with(
        OrchestratorConfig::default(),
        vec![("explore", agent.clone() as Arc<dyn Agent>)],
    );

    let started = Instant::now();
    let outcome = executor.execute_task("explore", Map::new()).await.unwrap();
    let elapsed = started.elapsed();

    assert_eq!(outcome.status, TaskStatus::Completed);
    assert_eq!(outcome.attempts, 3);
    assert!(elapsed >= Duration::from_secs(3), "elapsed {elapsed:?}");
    assert!(elapsed < Duration::from_secs(4), "elapsed {elapsed:?}");
}

#[tokio::test(start_paused = true)]
async fn test_attempt_times_are_spaced_by_backoff() {
    let (executor, _) = retry_executor(RetryPolicy::default());
    let started = Instant::now();
    let seen = std::sync::Mutex::new(Vec::new());

    let result: Result<Recovered<()>, _> = executor
        .execute("predict", "execute", RecoveryOptions::new(), || {
            seen.lock().unwrap().push(started.elapsed());
            async { Err(AttemptError::failed("convergence_error", "diverged")) }
        })
        .await;

    assert!(result.is_err());
    let seen = seen.into_inner().unwrap();
    assert_eq!(seen.len(), 3);
    assert_eq!(seen[0], Duration::ZERO);
    // Timer wheel granularity is 1ms
    assert!(seen[1] >= Duration::from_secs(1) && seen[1] < Duration::from_millis(1010));
    assert!(seen[2] >= Duration::from_secs(3) && seen[2] < Duration::from_millis(3020));
}

#[tokio::test]
async fn test_fallback_after_exhaustion_records_three_failures() {
    let (executor, intelligence) =
        retry_executor(RetryPolicy::default().with_base_delay(Duration::from_millis(1)));
    let calls = AtomicU32::new(0);

    let recovered = executor
        .execute(
            "narrate",
            "summarize",
            RecoveryOptions::new().with_fallback("X"),
            || {
                calls.fetch_add(1, Ordering::SeqCst);
                async { Err(AttemptError::failed("empty_input", "nothing to summarize")) }
            },
        )
        .await
        .unwrap();

    assert_eq!(recovered.value, "X");
    assert!(recovered.used_fallback);
    assert_eq!(calls.load(Ordering::SeqCst), 3);

    let errors = intelligence.errors_for("narrate", "summarize");
    assert_eq!(errors.len(), 3);
    assert!(errors.iter().all(|e| e.error_type == "empty_input"));
    assert_eq!(intelligence.worker_health("narrate", "summarize").successes, 0);
}

#[tokio::test]
async fn test_recovery_error_converts_to_execution_kind() {
    let (executor, _) =
        retry_executor(RetryPolicy::default().with_base_delay(Duration::from_millis(1)));

    let error = executor
        .execute::<(), _, _>("report", "render", RecoveryOptions::new(), || async {
            Err(AttemptError::failed("template_error", "missing section"))
        })
        .await
        .unwrap_err();

    let error: OrchestratorError = error.into();
    assert_eq!(error.kind(), ErrorKind::Execution);
    assert!(!error.is_preflight());
    assert!(error.to_string().contains("report.render"));
    assert!(error.to_string().contains("template_error"));
}

#[tokio::test(start_paused = true)]
async fn test_stalled_attempt_times_out_and_is_retried() {
    let mut config = OrchestratorConfig::default();
    config.retry.timeout_ms = Some(500);
    let agent = Arc::new(ScriptedAgent::new().then_stall(Duration::from_secs(60)));
    let (executor, intelligence) =
        executor_with(config, vec![("visualize", agent.clone() as Arc<dyn Agent>)]);

    let started = Instant::now();
    let outcome = executor.execute_task("visualize", Map::new()).await.unwrap();

    assert_eq!(outcome.status, TaskStatus::Completed);
    assert_eq!(outcome.attempts, 2);
    assert_eq!(outcome.errors[0].error_type, "timeout");
    assert_eq!(agent.calls(), 2);
    // 500ms timeout plus 1s backoff
    assert!(started.elapsed() < Duration::from_secs(2));
    assert_eq!(intelligence.error_summary(5).by_type.get("timeout"), Some(&1));
}

#[tokio::test]
async fn test_single_attempt_policy_does_not_retry() {
    let mut config = fast_config();
    config.retry.max_attempts = 1;
    let agent = Arc::new(
        ScriptedAgent::new().then_fail(AgentError::InvalidInput("bad column".into())),
    );
    let (executor, _) = executor_with(config, vec![("aggregate", agent.clone() as Arc<dyn Agent>)]);

    let outcome = executor.execute_task("aggregate", Map::new()).await.unwrap();

    assert_eq!(outcome.status, TaskStatus::Failed);
    assert_eq!(outcome.attempts, 1);
    assert_eq!(agent.calls(), 1);
    assert!(!outcome.states.contains(&pipeline_orchestrator::workflow::TaskState::Retrying));
}

//! Bounded retry with exponential backoff
//!
//! [`RetryExecutor`] wraps one invocation with a fixed attempt budget. It does
//! not try to tell transient failures from permanent ones; anything that must
//! fail fast has to be rejected before it reaches this layer.
//!
//! Attempt `i` that fails (and is not the last) waits
//! `base_delay * backoff^(i-1)` before the next try: with the defaults that is
//! 1 s, then 2 s. A per-attempt timeout is an ordinary failure and is retried
//! like any other.

use crate::agent::{AgentError, TaskResult};
use crate::config::RetrySection;
use crate::intelligence::ErrorIntelligence;
use serde_json::json;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tracing::{debug, error, info, warn};

/// Attempt budget and pacing
#[derive(Debug, Clone, PartialEq)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    pub backoff: f64,
    pub base_delay: Duration,
    pub timeout: Option<Duration>,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::from(&RetrySection::default())
    }
}

impl From<&RetrySection> for RetryPolicy {
    fn from(section: &RetrySection) -> Self {
        Self {
            max_attempts: section.max_attempts,
            backoff: section.backoff,
            base_delay: section.base_delay(),
            timeout: section.timeout(),
        }
    }
}

impl RetryPolicy {
    pub fn with_max_attempts(mut self, max_attempts: u32) -> Self {
        self.max_attempts = max_attempts;
        self
    }

    pub fn with_backoff(mut self, backoff: f64) -> Self {
        self.backoff = backoff;
        self
    }

    pub fn with_base_delay(mut self, base_delay: Duration) -> Self {
        self.base_delay = base_delay;
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    /// Wait after failed attempt number `attempt` (1-based)
    pub fn delay_after(&self, attempt: u32) -> Duration {
        let exponent = attempt.saturating_sub(1).min(i32::MAX as u32) as i32;
        let factor = self.backoff.powi(exponent);
        if factor.is_nan() || factor < 0.0 {
            return self.base_delay;
        }

        // Whole nanoseconds keep 10ms * 3^2 at exactly 90ms
        let nanos = (self.base_delay.as_nanos() as f64 * factor).round();
        if nanos >= u64::MAX as f64 {
            return Duration::MAX;
        }
        Duration::from_nanos(nanos as u64)
    }

    fn effective_attempts(&self) -> u32 {
        self.max_attempts.max(1)
    }
}

/// Why a single attempt failed
#[derive(Debug, Clone, Error, PartialEq)]
pub enum AttemptError {
    #[error("{error_type}: {message}")]
    Failed { error_type: String, message: String },

    #[error("attempt timed out after {0:?}")]
    TimedOut(Duration),
}

impl AttemptError {
    pub fn failed<T: Into<String>, M: Into<String>>(error_type: T, message: M) -> Self {
        Self::Failed {
            error_type: error_type.into(),
            message: message.into(),
        }
    }

    /// Failure reported by an agent through `success: false`
    pub fn from_result(result: &TaskResult) -> Self {
        Self::failed(result.primary_error_type(), result.error_summary())
    }

    pub fn error_type(&self) -> &str {
        match self {
            AttemptError::Failed { error_type, .. } => error_type,
            AttemptError::TimedOut(_) => "timeout",
        }
    }

    pub fn message(&self) -> String {
        match self {
            AttemptError::Failed { message, .. } => message.clone(),
            AttemptError::TimedOut(limit) => format!("attempt exceeded {}ms", limit.as_millis()),
        }
    }
}

impl From<AgentError> for AttemptError {
    fn from(error: AgentError) -> Self {
        AttemptError::Failed {
            error_type: error.kind().to_string(),
            message: error.message().to_string(),
        }
    }
}

/// Every attempt failed and no fallback was configured
#[derive(Debug, Clone, Error)]
#[error("{agent}.{method} failed after {attempts} attempt(s): {source}")]
pub struct RecoveryError {
    pub agent: String,
    pub method: String,
    pub attempts: u32,
    /// Failure of the final attempt
    pub source: AttemptError,
    /// Failures of every attempt, oldest first
    pub failures: Vec<AttemptError>,
}

/// Value produced by [`RetryExecutor::execute`]
#[derive(Debug, Clone, PartialEq)]
pub struct Recovered<T> {
    pub value: T,
    /// Attempts made, including the successful one
    pub attempts: u32,
    pub used_fallback: bool,
    /// Failures seen before the value was obtained
    pub failures: Vec<AttemptError>,
}

/// Called after every failed attempt with its 1-based number
pub type ErrorCallback = Box<dyn Fn(u32, &AttemptError) + Send + Sync>;

/// Per-call extras: fallback value and failure callback
pub struct RecoveryOptions<T> {
    pub fallback: Option<T>,
    pub on_error: Option<ErrorCallback>,
}

impl<T> Default for RecoveryOptions<T> {
    fn default() -> Self {
        Self {
            fallback: None,
            on_error: None,
        }
    }
}

impl<T> RecoveryOptions<T> {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_fallback(mut self, fallback: T) -> Self {
        self.fallback = Some(fallback);
        self
    }

    pub fn on_error<F>(mut self, callback: F) -> Self
    where
        F: Fn(u32, &AttemptError) + Send + Sync + 'static,
    {
        self.on_error = Some(Box::new(callback));
        self
    }
}

/// Runs invocations under a [`RetryPolicy`], reporting every outcome
pub struct RetryExecutor {
    policy: RetryPolicy,
    intelligence: Arc<ErrorIntelligence>,
}

impl RetryExecutor {
    pub fn new(policy: RetryPolicy, intelligence: Arc<ErrorIntelligence>) -> Self {
        Self {
            policy,
            intelligence,
        }
    }

    pub fn policy(&self) -> &RetryPolicy {
        &self.policy
    }

    /// Run `operation` until it succeeds or the attempt budget is spent.
    ///
    /// Each failed attempt is recorded as an error of (`agent`, `method`) and
    /// a successful one as a success. On exhaustion the fallback is returned
    /// when present, otherwise a [`RecoveryError`].
    pub async fn execute<T, F, Fut>(
        &self,
        agent: &str,
        method: &str,
        options: RecoveryOptions<T>,
        mut operation: F,
    ) -> Result<Recovered<T>, RecoveryError>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, AttemptError>>,
    {
        let max_attempts = self.policy.effective_attempts();
        let mut failures: Vec<AttemptError> = Vec::new();

        for attempt in 1..=max_attempts {
            let outcome = match self.policy.timeout {
                Some(limit) => match tokio::time::timeout(limit, operation()).await {
                    Ok(result) => result,
                    Err(_) => Err(AttemptError::TimedOut(limit)),
                },
                None => operation().await,
            };

            match outcome {
                Ok(value) => {
                    self.intelligence.track_success(agent, method);
                    if attempt > 1 {
                        info!(agent, method, attempt, "Recovered after retry");
                    }
                    return Ok(Recovered {
                        value,
                        attempts: attempt,
                        used_fallback: false,
                        failures,
                    });
                }
                Err(failure) => {
                    warn!(
                        agent,
                        method,
                        attempt,
                        max_attempts,
                        error_type = failure.error_type(),
                        error = %failure,
                        "Attempt failed"
                    );

                    let observation = self.intelligence.track_error(
                        agent,
                        method,
                        failure.error_type(),
                        &failure.message(),
                        json!({ "attempt": attempt, "max_attempts": max_attempts }),
                    );
                    if let Some(fix) = &observation.recommendation {
                        info!(
                            agent,
                            method,
                            error_type = failure.error_type(),
                            occurrences = observation.occurrences,
                            fix = %fix,
                            "Known remediation available"
                        );
                    }

                    if let Some(callback) = &options.on_error {
                        callback(attempt, &failure);
                    }
                    failures.push(failure);

                    if attempt < max_attempts {
                        let delay = self.policy.delay_after(attempt);
                        debug!(
                            agent,
                            method,
                            attempt,
                            delay_ms = delay.as_millis() as u64,
                            "Backing off before retry"
                        );
                        tokio::time::sleep(delay).await;
                    }
                }
            }
        }

        let last_failure = failures
            .last()
            .cloned()
            .unwrap_or_else(|| AttemptError::failed("no_attempts", "no attempt was made"));

        if let Some(fallback) = options.fallback {
            warn!(
                agent,
                method,
                attempts = max_attempts,
                error = %last_failure,
                "Retries exhausted, returning fallback"
            );
            return Ok(Recovered {
                value: fallback,
                attempts: max_attempts,
                used_fallback: true,
                failures,
            });
        }

        error!(
            agent,
            method,
            attempts = max_attempts,
            error = %last_failure,
            "Retries exhausted"
        );
        Err(RecoveryError {
            agent: agent.to_string(),
            method: method.to_string(),
            attempts: max_attempts,
            source: last_failure,
            failures,
        })
    }
}

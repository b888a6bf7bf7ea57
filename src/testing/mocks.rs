//! Mock agents for tests
//!
//! - [`EchoAgent`]: succeeds with `{"payload": <payload it received>}`
//! - [`ScriptedAgent`]: plays back a queue of outcomes, then succeeds
//! - [`FailingAgent`]: always returns the same error

use crate::agent::{Agent, AgentError, ErrorSeverity, Payload, TaskErrorDetail, TaskResult};
use async_trait::async_trait;
use serde_json::{Map, Value};
use std::collections::VecDeque;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Mutex;
use std::time::Duration;

fn lock<T>(mutex: &Mutex<T>) -> std::sync::MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

/// Succeeds every time, echoing its payload back as result data
#[derive(Debug, Default)]
pub struct EchoAgent {
    quality: Option<f64>,
    calls: AtomicU32,
}

impl EchoAgent {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_quality(mut self, quality: f64) -> Self {
        self.quality = Some(quality);
        self
    }

    pub fn calls(&self) -> u32 {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl Agent for EchoAgent {
    async fn execute(&self, payload: Payload) -> Result<TaskResult, AgentError> {
        self.calls.fetch_add(1, Ordering::SeqCst);

        let mut data = Map::new();
        data.insert("payload".to_string(), Value::Object(payload));

        let mut result = TaskResult::success(data);
        result.quality_score = self.quality;
        Ok(result)
    }
}

/// One scripted reaction of a [`ScriptedAgent`]
#[derive(Debug, Clone)]
pub enum ScriptStep {
    /// Return `Ok` with this data and optional quality
    Succeed {
        data: Map<String, Value>,
        quality: Option<f64>,
    },
    /// Return `Err`
    Fail(AgentError),
    /// Return `Ok` with `success: false`
    Report(TaskErrorDetail),
    /// Sleep, then succeed with empty data
    Stall(Duration),
}

/// Plays back queued steps in order; once the queue is empty every call
/// succeeds with the default quality.
#[derive(Debug, Default)]
pub struct ScriptedAgent {
    steps: Mutex<VecDeque<ScriptStep>>,
    default_quality: Option<f64>,
    payloads: Mutex<Vec<Payload>>,
    calls: AtomicU32,
}

impl ScriptedAgent {
    pub fn new() -> Self {
        Self::default()
    }

    fn push(self, step: ScriptStep) -> Self {
        lock(&self.steps).push_back(step);
        self
    }

    pub fn then_succeed(self, data: Map<String, Value>, quality: Option<f64>) -> Self {
        self.push(ScriptStep::Succeed { data, quality })
    }

    pub fn then_fail(self, error: AgentError) -> Self {
        self.push(ScriptStep::Fail(error))
    }

    pub fn then_report_failure(self, error_type: &str, message: &str) -> Self {
        self.push(ScriptStep::Report(TaskErrorDetail::new(
            error_type,
            message,
            ErrorSeverity::High,
        )))
    }

    pub fn then_stall(self, duration: Duration) -> Self {
        self.push(ScriptStep::Stall(duration))
    }

    /// Queue `times` failures of the same error
    pub fn fail_times(self, times: u32, error: AgentError) -> Self {
        (0..times).fold(self, |agent, _| agent.then_fail(error.clone()))
    }

    /// Quality reported once the script has run out
    pub fn with_quality(mut self, quality: f64) -> Self {
        self.default_quality = Some(quality);
        self
    }

    pub fn calls(&self) -> u32 {
        self.calls.load(Ordering::SeqCst)
    }

    /// Payloads received, oldest first
    pub fn payloads(&self) -> Vec<Payload> {
        lock(&self.payloads).clone()
    }

    pub fn remaining_steps(&self) -> usize {
        lock(&self.steps).len()
    }
}

#[async_trait]
impl Agent for ScriptedAgent {
    async fn execute(&self, payload: Payload) -> Result<TaskResult, AgentError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        lock(&self.payloads).push(payload);

        let step = lock(&self.steps).pop_front();
        match step {
            Some(ScriptStep::Succeed { data, quality }) => {
                let mut result = TaskResult::success(data);
                result.quality_score = quality;
                Ok(result)
            }
            Some(ScriptStep::Fail(error)) => Err(error),
            Some(ScriptStep::Report(detail)) => Ok(TaskResult::failure(detail)),
            Some(ScriptStep::Stall(duration)) => {
                tokio::time::sleep(duration).await;
                Ok(TaskResult::success(Map::new()))
            }
            None => {
                let mut result = TaskResult::success(Map::new());
                result.quality_score = self.default_quality;
                Ok(result)
            }
        }
    }
}

/// Fails every call with a clone of the configured error
#[derive(Debug)]
pub struct FailingAgent {
    error: AgentError,
    calls: AtomicU32,
}

impl FailingAgent {
    pub fn new(error: AgentError) -> Self {
        Self {
            error,
            calls: AtomicU32::new(0),
        }
    }

    pub fn calls(&self) -> u32 {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl Agent for FailingAgent {
    async fn execute(&self, _payload: Payload) -> Result<TaskResult, AgentError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        Err(self.error.clone())
    }
}

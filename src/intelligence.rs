//! Error intelligence and health derivation
//!
//! Counts successes and failures per (agent, worker), keeps bounded error
//! records and derives health on demand. Fix hints are advisory only: a
//! remediation is suggested once an (agent, worker, error_type) triple has
//! been seen more than `hint_threshold` times and some remediation has been
//! recorded as working for that error type.
//!
//! One instance is shared by the retry layer and the workflow executor through
//! an `Arc`. All state sits behind a single mutex; readers get copies.

use crate::config::ErrorSection;
use crate::error::sanitize_error_message;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::{BTreeMap, HashMap, VecDeque};
use std::sync::{Mutex, MutexGuard};
use tracing::{debug, info};
use uuid::Uuid;

/// Success rate at or above which an agent is healthy
pub const HEALTHY_THRESHOLD: f64 = 0.90;
/// Success rate at or above which an agent is degraded rather than broken
pub const DEGRADED_THRESHOLD: f64 = 0.70;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum HealthStatus {
    Healthy,
    Degraded,
    Broken,
}

impl HealthStatus {
    pub fn from_success_rate(rate: f64) -> Self {
        if rate >= HEALTHY_THRESHOLD {
            HealthStatus::Healthy
        } else if rate >= DEGRADED_THRESHOLD {
            HealthStatus::Degraded
        } else {
            HealthStatus::Broken
        }
    }
}

impl std::fmt::Display for HealthStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let label = match self {
            HealthStatus::Healthy => "HEALTHY",
            HealthStatus::Degraded => "DEGRADED",
            HealthStatus::Broken => "BROKEN",
        };
        f.write_str(label)
    }
}

/// One observed failure; never mutated after creation
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ErrorRecord {
    pub id: Uuid,
    pub agent: String,
    pub worker: String,
    pub error_type: String,
    pub message: String,
    pub context: Value,
    pub timestamp: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WorkerHealth {
    pub worker: String,
    pub successes: u64,
    pub failures: u64,
    pub success_rate: f64,
    pub status: HealthStatus,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AgentHealth {
    pub agent: String,
    pub successes: u64,
    pub failures: u64,
    pub success_rate: f64,
    pub status: HealthStatus,
    pub workers: Vec<WorkerHealth>,
}

/// Health of every agent seen so far, computed at call time
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HealthSnapshot {
    pub agents: Vec<AgentHealth>,
    pub total_successes: u64,
    pub total_failures: u64,
    pub generated_at: DateTime<Utc>,
}

impl HealthSnapshot {
    pub fn agent(&self, name: &str) -> Option<&AgentHealth> {
        self.agents.iter().find(|a| a.agent == name)
    }
}

/// What `track_error` learned about the failure it just recorded
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ErrorObservation {
    pub record_id: Uuid,
    /// Occurrences of this (agent, worker, error_type), including this one
    pub occurrences: u64,
    pub recommendation: Option<String>,
}

/// A recurring failure triple
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ErrorPattern {
    pub agent: String,
    pub worker: String,
    pub error_type: String,
    pub occurrences: u64,
    pub last_seen: DateTime<Utc>,
    pub recommendation: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ErrorSummary {
    pub total_errors: u64,
    pub total_successes: u64,
    pub by_type: BTreeMap<String, u64>,
    pub by_agent: BTreeMap<String, u64>,
    pub recent: Vec<ErrorRecord>,
}

#[derive(Debug, Default, Clone, Copy)]
struct Counters {
    successes: u64,
    failures: u64,
}

impl Counters {
    fn success_rate(&self) -> f64 {
        let total = self.successes + self.failures;
        if total == 0 {
            1.0
        } else {
            self.successes as f64 / total as f64
        }
    }
}

#[derive(Debug, Clone)]
struct PatternState {
    occurrences: u64,
    last_seen: DateTime<Utc>,
}

#[derive(Debug, Default, Clone, Copy)]
struct RemediationStats {
    successes: u64,
    failures: u64,
}

type WorkerKey = (String, String);
type PatternKey = (String, String, String);

#[derive(Debug, Default)]
struct State {
    workers: BTreeMap<WorkerKey, Counters>,
    records: VecDeque<ErrorRecord>,
    worker_records: HashMap<WorkerKey, VecDeque<ErrorRecord>>,
    patterns: BTreeMap<PatternKey, PatternState>,
    remediations: HashMap<String, BTreeMap<String, RemediationStats>>,
    by_type: BTreeMap<String, u64>,
    total_errors: u64,
    total_successes: u64,
}

impl State {
    fn best_fix(&self, error_type: &str) -> Option<String> {
        let fixes = self.remediations.get(error_type)?;
        let mut best: Option<(&String, u64)> = None;
        for (fix, stats) in fixes {
            if stats.successes == 0 {
                continue;
            }
            // BTreeMap iterates by name, so ties keep the first name
            if best.map_or(true, |(_, successes)| stats.successes > successes) {
                best = Some((fix, stats.successes));
            }
        }
        best.map(|(fix, _)| fix.clone())
    }

    fn recommendation(&self, key: &PatternKey, threshold: u64) -> Option<String> {
        let pattern = self.patterns.get(key)?;
        if pattern.occurrences > threshold {
            self.best_fix(&key.2)
        } else {
            None
        }
    }

    fn agent_counters(&self, agent: &str) -> (Counters, Vec<WorkerHealth>) {
        let mut total = Counters::default();
        let mut workers = Vec::new();
        for ((a, worker), counters) in &self.workers {
            if a != agent {
                continue;
            }
            total.successes += counters.successes;
            total.failures += counters.failures;
            workers.push(worker_health(worker, counters));
        }
        (total, workers)
    }
}

fn worker_health(worker: &str, counters: &Counters) -> WorkerHealth {
    let success_rate = counters.success_rate();
    WorkerHealth {
        worker: worker.to_string(),
        successes: counters.successes,
        failures: counters.failures,
        success_rate,
        status: HealthStatus::from_success_rate(success_rate),
    }
}

fn agent_health(agent: &str, total: Counters, workers: Vec<WorkerHealth>) -> AgentHealth {
    let success_rate = total.success_rate();
    AgentHealth {
        agent: agent.to_string(),
        successes: total.successes,
        failures: total.failures,
        success_rate,
        status: HealthStatus::from_success_rate(success_rate),
        workers,
    }
}

/// Shared success/failure bookkeeping for all agents
#[derive(Debug)]
pub struct ErrorIntelligence {
    settings: ErrorSection,
    state: Mutex<State>,
}

impl Default for ErrorIntelligence {
    fn default() -> Self {
        Self::new(ErrorSection::default())
    }
}

impl ErrorIntelligence {
    pub fn new(settings: ErrorSection) -> Self {
        Self {
            settings,
            state: Mutex::new(State::default()),
        }
    }

    pub fn settings(&self) -> &ErrorSection {
        &self.settings
    }

    fn lock(&self) -> MutexGuard<'_, State> {
        self.state.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    pub fn track_success(&self, agent: &str, worker: &str) {
        let mut state = self.lock();
        state
            .workers
            .entry((agent.to_string(), worker.to_string()))
            .or_default()
            .successes += 1;
        state.total_successes += 1;
        debug!(agent, worker, "Success tracked");
    }

    /// Record one failure and report how often the triple has now been seen
    pub fn track_error(
        &self,
        agent: &str,
        worker: &str,
        error_type: &str,
        message: &str,
        context: Value,
    ) -> ErrorObservation {
        let record = ErrorRecord {
            id: Uuid::new_v4(),
            agent: agent.to_string(),
            worker: worker.to_string(),
            error_type: error_type.to_string(),
            message: sanitize_error_message(message),
            context,
            timestamp: Utc::now(),
        };

        let worker_key = (agent.to_string(), worker.to_string());
        let pattern_key = (agent.to_string(), worker.to_string(), error_type.to_string());

        let mut state = self.lock();
        state.workers.entry(worker_key.clone()).or_default().failures += 1;
        state.total_errors += 1;
        *state.by_type.entry(error_type.to_string()).or_insert(0) += 1;

        let occurrences = {
            let pattern = state
                .patterns
                .entry(pattern_key.clone())
                .or_insert_with(|| PatternState {
                    occurrences: 0,
                    last_seen: record.timestamp,
                });
            pattern.occurrences += 1;
            pattern.last_seen = record.timestamp;
            pattern.occurrences
        };

        let per_worker_limit = self.settings.max_records_per_worker.max(1);
        let worker_records = state.worker_records.entry(worker_key).or_default();
        worker_records.push_back(record.clone());
        while worker_records.len() > per_worker_limit {
            worker_records.pop_front();
        }

        let record_id = record.id;
        state.records.push_back(record);
        let global_limit = self.settings.max_records.max(1);
        while state.records.len() > global_limit {
            state.records.pop_front();
        }

        let recommendation = state.recommendation(&pattern_key, self.settings.hint_threshold);
        drop(state);

        debug!(agent, worker, error_type, occurrences, "Error tracked");
        if occurrences == self.settings.hint_threshold.saturating_add(1) {
            info!(
                agent,
                worker,
                error_type,
                occurrences,
                "Recurring error pattern detected"
            );
        }

        ErrorObservation {
            record_id,
            occurrences,
            recommendation,
        }
    }

    /// Record whether applying `fix` to `error_type` worked
    pub fn record_remediation(&self, error_type: &str, fix: &str, succeeded: bool) {
        let mut state = self.lock();
        let stats = state
            .remediations
            .entry(error_type.to_string())
            .or_default()
            .entry(fix.to_string())
            .or_default();
        if succeeded {
            stats.successes += 1;
        } else {
            stats.failures += 1;
        }
        debug!(error_type, fix, succeeded, "Remediation outcome recorded");
    }

    /// Advisory fix for a triple; `None` until it recurs past the threshold
    pub fn recommend_fix(&self, agent: &str, worker: &str, error_type: &str) -> Option<String> {
        let key = (agent.to_string(), worker.to_string(), error_type.to_string());
        self.lock().recommendation(&key, self.settings.hint_threshold)
    }

    pub fn health(&self) -> HealthSnapshot {
        let state = self.lock();

        let mut agents: BTreeMap<&str, (Counters, Vec<WorkerHealth>)> = BTreeMap::new();
        for ((agent, worker), counters) in &state.workers {
            let entry = agents.entry(agent.as_str()).or_default();
            entry.0.successes += counters.successes;
            entry.0.failures += counters.failures;
            entry.1.push(worker_health(worker, counters));
        }

        HealthSnapshot {
            agents: agents
                .into_iter()
                .map(|(agent, (total, workers))| agent_health(agent, total, workers))
                .collect(),
            total_successes: state.total_successes,
            total_failures: state.total_errors,
            generated_at: Utc::now(),
        }
    }

    /// Health of one agent; an agent never observed is healthy
    pub fn agent_health(&self, agent: &str) -> AgentHealth {
        let (total, workers) = self.lock().agent_counters(agent);
        agent_health(agent, total, workers)
    }

    pub fn worker_health(&self, agent: &str, worker: &str) -> WorkerHealth {
        let key = (agent.to_string(), worker.to_string());
        let counters = self.lock().workers.get(&key).copied().unwrap_or_default();
        worker_health(worker, &counters)
    }

    /// Totals plus the `recent_limit` newest records, newest first
    pub fn error_summary(&self, recent_limit: usize) -> ErrorSummary {
        let state = self.lock();

        let mut by_agent: BTreeMap<String, u64> = BTreeMap::new();
        for ((agent, _), counters) in &state.workers {
            if counters.failures > 0 {
                *by_agent.entry(agent.clone()).or_insert(0) += counters.failures;
            }
        }

        ErrorSummary {
            total_errors: state.total_errors,
            total_successes: state.total_successes,
            by_type: state.by_type.clone(),
            by_agent,
            recent: state.records.iter().rev().take(recent_limit).cloned().collect(),
        }
    }

    /// Failures tracked since the last `clear`, unaffected by record bounds
    pub fn total_errors(&self) -> u64 {
        self.lock().total_errors
    }

    /// Newest first
    pub fn recent_errors(&self, limit: usize) -> Vec<ErrorRecord> {
        self.lock()
            .records
            .iter()
            .rev()
            .take(limit)
            .cloned()
            .collect()
    }

    /// Retained records for one (agent, worker), oldest first
    pub fn errors_for(&self, agent: &str, worker: &str) -> Vec<ErrorRecord> {
        let key = (agent.to_string(), worker.to_string());
        self.lock()
            .worker_records
            .get(&key)
            .map(|records| records.iter().cloned().collect())
            .unwrap_or_default()
    }

    /// Triples seen more than `hint_threshold` times, most frequent first
    pub fn error_patterns(&self) -> Vec<ErrorPattern> {
        let state = self.lock();
        let threshold = self.settings.hint_threshold;

        let mut patterns: Vec<ErrorPattern> = state
            .patterns
            .iter()
            .filter(|(_, pattern)| pattern.occurrences > threshold)
            .map(|(key, pattern)| ErrorPattern {
                agent: key.0.clone(),
                worker: key.1.clone(),
                error_type: key.2.clone(),
                occurrences: pattern.occurrences,
                last_seen: pattern.last_seen,
                recommendation: state.best_fix(&key.2),
            })
            .collect();
        patterns.sort_by(|a, b| b.occurrences.cmp(&a.occurrences));
        patterns
    }

    /// Forget everything, remediations included
    pub fn clear(&self) {
        *self.lock() = State::default();
        info!("Error intelligence cleared");
    }
}

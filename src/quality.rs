//! Workflow-level quality aggregation
//!
//! Keeps running sums rather than individual samples, so memory stays constant
//! no matter how many tasks are recorded.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::sync::{Mutex, MutexGuard};

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct TypeQuality {
    pub samples: u64,
    pub average: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QualitySummary {
    pub samples: u64,
    pub average: Option<f64>,
    pub min: Option<f64>,
    pub max: Option<f64>,
    pub by_task_type: BTreeMap<String, TypeQuality>,
}

#[derive(Debug, Default)]
struct Totals {
    samples: u64,
    sum: f64,
    min: Option<f64>,
    max: Option<f64>,
    by_type: BTreeMap<String, (u64, f64)>,
}

/// Clamp a reported score into [0, 1]; non-finite scores count as 0
pub fn normalize_score(score: f64) -> f64 {
    if score.is_finite() {
        score.clamp(0.0, 1.0)
    } else {
        0.0
    }
}

#[derive(Debug, Default)]
pub struct QualityTracker {
    totals: Mutex<Totals>,
}

impl QualityTracker {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, Totals> {
        self.totals.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Add one task's contribution; failed tasks always contribute 0
    pub fn record(&self, task_type: &str, score: f64, succeeded: bool) -> f64 {
        let contribution = if succeeded { normalize_score(score) } else { 0.0 };

        let mut totals = self.lock();
        totals.samples += 1;
        totals.sum += contribution;
        totals.min = Some(totals.min.map_or(contribution, |m| m.min(contribution)));
        totals.max = Some(totals.max.map_or(contribution, |m| m.max(contribution)));

        let entry = totals.by_type.entry(task_type.to_string()).or_insert((0, 0.0));
        entry.0 += 1;
        entry.1 += contribution;

        contribution
    }

    /// Mean contribution, `None` before the first record
    pub fn score(&self) -> Option<f64> {
        let totals = self.lock();
        (totals.samples > 0).then(|| totals.sum / totals.samples as f64)
    }

    pub fn summary(&self) -> QualitySummary {
        let totals = self.lock();
        QualitySummary {
            samples: totals.samples,
            average: (totals.samples > 0).then(|| totals.sum / totals.samples as f64),
            min: totals.min,
            max: totals.max,
            by_task_type: totals
                .by_type
                .iter()
                .map(|(task_type, (samples, sum))| {
                    (
                        task_type.clone(),
                        TypeQuality {
                            samples: *samples,
                            average: sum / *samples as f64,
                        },
                    )
                })
                .collect(),
        }
    }

    pub fn len(&self) -> u64 {
        self.lock().samples
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn clear(&self) {
        *self.lock() = Totals::default();
    }
}

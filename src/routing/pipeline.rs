//! Canonical pipeline order
//!
//! A total order over task-type identifiers. Workflows must visit stages in
//! non-decreasing position: stages may be skipped or repeated, never
//! reordered.

use crate::config::{validate_stage_id, ConfigError};
use crate::error::{OrchestratorError, OrchestratorResult};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// Built-in stage identifiers, in canonical order
pub const DEFAULT_PIPELINE: [&str; 9] = [
    "load_data",
    "explore",
    "aggregate",
    "detect_anomalies",
    "predict",
    "recommend",
    "narrate",
    "visualize",
    "report",
];

/// Built-in stages with a typed option schema
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Stage {
    LoadData,
    Explore,
    Aggregate,
    DetectAnomalies,
    Predict,
    Recommend,
    Narrate,
    Visualize,
    Report,
}

impl Stage {
    pub const ALL: [Stage; 9] = [
        Stage::LoadData,
        Stage::Explore,
        Stage::Aggregate,
        Stage::DetectAnomalies,
        Stage::Predict,
        Stage::Recommend,
        Stage::Narrate,
        Stage::Visualize,
        Stage::Report,
    ];

    pub fn id(self) -> &'static str {
        match self {
            Stage::LoadData => "load_data",
            Stage::Explore => "explore",
            Stage::Aggregate => "aggregate",
            Stage::DetectAnomalies => "detect_anomalies",
            Stage::Predict => "predict",
            Stage::Recommend => "recommend",
            Stage::Narrate => "narrate",
            Stage::Visualize => "visualize",
            Stage::Report => "report",
        }
    }

    pub fn from_id(id: &str) -> Option<Stage> {
        Stage::ALL.into_iter().find(|stage| stage.id() == id)
    }
}

impl std::fmt::Display for Stage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.id())
    }
}

/// Ordered list of stage identifiers with O(1) position lookup
#[derive(Debug, Clone, PartialEq)]
pub struct PipelineOrder {
    stages: Vec<String>,
    positions: HashMap<String, usize>,
}

impl Default for PipelineOrder {
    fn default() -> Self {
        let stages: Vec<String> = DEFAULT_PIPELINE.iter().map(|s| s.to_string()).collect();
        let positions = stages
            .iter()
            .enumerate()
            .map(|(i, s)| (s.clone(), i))
            .collect();
        Self { stages, positions }
    }
}

impl PipelineOrder {
    /// Build an order from identifiers; they must be valid and unique
    pub fn new(stages: Vec<String>) -> Result<Self, ConfigError> {
        if stages.is_empty() {
            return Err(ConfigError::InvalidConfig(
                "pipeline order must contain at least one stage".to_string(),
            ));
        }

        let mut positions = HashMap::with_capacity(stages.len());
        for (position, stage) in stages.iter().enumerate() {
            validate_stage_id(stage)?;
            if positions.insert(stage.clone(), position).is_some() {
                return Err(ConfigError::InvalidConfig(format!(
                    "stage '{stage}' appears more than once in the pipeline order"
                )));
            }
        }

        Ok(Self { stages, positions })
    }

    pub fn position(&self, stage: &str) -> Option<usize> {
        self.positions.get(stage).copied()
    }

    pub fn contains(&self, stage: &str) -> bool {
        self.positions.contains_key(stage)
    }

    pub fn stages(&self) -> &[String] {
        &self.stages
    }

    pub fn len(&self) -> usize {
        self.stages.len()
    }

    pub fn is_empty(&self) -> bool {
        self.stages.is_empty()
    }

    /// Stages strictly before `stage`; empty for unknown stages
    pub fn predecessors(&self, stage: &str) -> &[String] {
        match self.position(stage) {
            Some(position) => &self.stages[..position],
            None => &[],
        }
    }

    /// Position of `stage`, or a configuration error for unknown types
    pub fn require_position(&self, stage: &str) -> OrchestratorResult<usize> {
        self.position(stage).ok_or_else(|| {
            OrchestratorError::configuration(format!(
                "unknown task type '{stage}'; expected one of: {}",
                self.stages.join(", ")
            ))
        })
    }

    /// Check that `task_types` never move backwards in the order
    pub fn validate_sequence<'a, I>(&self, task_types: I) -> OrchestratorResult<()>
    where
        I: IntoIterator<Item = &'a str>,
    {
        let mut previous: Option<(&str, usize)> = None;

        for task_type in task_types {
            let position = self.require_position(task_type)?;
            if let Some((previous_type, previous_position)) = previous {
                if position < previous_position {
                    return Err(OrchestratorError::PipelineOrder {
                        previous: previous_type.to_string(),
                        previous_position,
                        current: task_type.to_string(),
                        current_position: position,
                    });
                }
            }
            previous = Some((task_type, position));
        }

        Ok(())
    }
}

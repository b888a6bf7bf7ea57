//! Agent registry
//!
//! Thread-safe name → handler map. Registration is the only write; names are
//! unique and validated up front, so lookups never see a half-registered
//! agent.

use super::Agent;
use crate::config::validate_stage_id;
use crate::error::{OrchestratorError, OrchestratorResult};
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::collections::HashMap;
use std::sync::{Arc, RwLock};
use tracing::{debug, info};

/// A registered handler together with its registration time
#[derive(Clone)]
pub struct RegisteredAgent {
    pub name: String,
    pub handler: Arc<dyn Agent>,
    pub registered_at: DateTime<Utc>,
}

impl std::fmt::Debug for RegisteredAgent {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RegisteredAgent")
            .field("name", &self.name)
            .field("registered_at", &self.registered_at)
            .finish_non_exhaustive()
    }
}

/// Snapshot returned by [`AgentRegistry::list`]
#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct AgentListing {
    pub count: usize,
    pub agents: Vec<AgentListingEntry>,
}

#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct AgentListingEntry {
    pub name: String,
    pub registered_at: DateTime<Utc>,
}

/// Registry of pipeline agents keyed by task type
#[derive(Default)]
pub struct AgentRegistry {
    agents: RwLock<HashMap<String, RegisteredAgent>>,
}

impl AgentRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a handler under a unique, non-empty name
    pub fn register(&self, name: &str, handler: Arc<dyn Agent>) -> OrchestratorResult<()> {
        if validate_stage_id(name).is_err() {
            return Err(OrchestratorError::InvalidAgentName {
                name: name.to_string(),
            });
        }

        let mut agents = self.write_agents()?;
        if agents.contains_key(name) {
            debug!(agent = %name, "Rejected duplicate agent registration");
            return Err(OrchestratorError::DuplicateRegistration {
                name: name.to_string(),
            });
        }

        agents.insert(
            name.to_string(),
            RegisteredAgent {
                name: name.to_string(),
                handler,
                registered_at: Utc::now(),
            },
        );
        info!(agent = %name, total = agents.len(), "Registered agent");
        Ok(())
    }

    /// Look up the handler registered under `name`
    pub fn get(&self, name: &str) -> OrchestratorResult<Arc<dyn Agent>> {
        self.read_agents()?
            .get(name)
            .map(|entry| Arc::clone(&entry.handler))
            .ok_or_else(|| OrchestratorError::agent_not_found(name))
    }

    pub fn contains(&self, name: &str) -> bool {
        self.read_agents()
            .map(|agents| agents.contains_key(name))
            .unwrap_or(false)
    }

    /// Snapshot of registrations sorted by name
    pub fn list(&self) -> OrchestratorResult<AgentListing> {
        let agents = self.read_agents()?;
        let mut entries: Vec<AgentListingEntry> = agents
            .values()
            .map(|a| AgentListingEntry {
                name: a.name.clone(),
                registered_at: a.registered_at,
            })
            .collect();
        entries.sort_by(|a, b| a.name.cmp(&b.name));

        Ok(AgentListing {
            count: entries.len(),
            agents: entries,
        })
    }

    /// Registered names, sorted
    pub fn names(&self) -> Vec<String> {
        let mut names: Vec<String> = self
            .read_agents()
            .map(|agents| agents.keys().cloned().collect())
            .unwrap_or_default();
        names.sort();
        names
    }

    pub fn len(&self) -> usize {
        self.read_agents().map(|a| a.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn read_agents(
        &self,
    ) -> OrchestratorResult<std::sync::RwLockReadGuard<'_, HashMap<String, RegisteredAgent>>> {
        self.agents
            .read()
            .map_err(|_| OrchestratorError::internal("agent registry lock poisoned"))
    }

    fn write_agents(
        &self,
    ) -> OrchestratorResult<std::sync::RwLockWriteGuard<'_, HashMap<String, RegisteredAgent>>>
    {
        self.agents
            .write()
            .map_err(|_| OrchestratorError::internal("agent registry lock poisoned"))
    }
}

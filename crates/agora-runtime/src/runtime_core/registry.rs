//! Agent table and launchable-agent registry

use super::handle::{AgentCell, AgentRef};
use crate::agent::Agent;
use crate::types::AgentId;
use dashmap::DashMap;
use std::sync::Arc;

/// Table of launched, not yet terminated agents
pub(crate) struct AgentRegistry {
    agents: DashMap<AgentId, Arc<AgentCell>>,
}

impl AgentRegistry {
    pub(crate) fn new() -> Self {
        Self {
            agents: DashMap::new(),
        }
    }

    pub(crate) fn insert(&self, cell: Arc<AgentCell>) {
        self.agents.insert(cell.id, cell);
    }

    pub(crate) fn remove(&self, id: AgentId) {
        self.agents.remove(&id);
    }

    pub(crate) fn get(&self, id: AgentId) -> Option<Arc<AgentCell>> {
        self.agents.get(&id).map(|cell| Arc::clone(&cell))
    }

    /// Handles of every agent currently in the table
    pub(crate) fn snapshot(&self) -> Vec<AgentRef> {
        self.agents
            .iter()
            .map(|entry| AgentRef::from_cell(Arc::clone(entry.value())))
            .collect()
    }

    pub(crate) fn count(&self) -> usize {
        self.agents.len()
    }
}

/// Builds a fresh agent instance
pub type AgentFactory = Arc<dyn Fn() -> Box<dyn Agent> + Send + Sync>;

/// Launchable agents addressable by name
///
/// # Example
///
/// ```
/// use agora_runtime::{Agent, AgentFactoryRegistry};
///
/// struct Idle;
/// impl Agent for Idle {}
///
/// let registry = AgentFactoryRegistry::new();
/// registry.register("idle", || Idle);
/// assert_eq!(registry.names(), vec!["idle".to_string()]);
/// ```
#[derive(Clone, Default)]
pub struct AgentFactoryRegistry {
    factories: Arc<DashMap<String, AgentFactory>>,
}

impl AgentFactoryRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a factory, replacing any previous one under the same name
    pub fn register<A, F>(&self, name: impl Into<String>, factory: F)
    where
        A: Agent,
        F: Fn() -> A + Send + Sync + 'static,
    {
        let factory: AgentFactory = Arc::new(move || Box::new(factory()) as Box<dyn Agent>);
        self.factories.insert(name.into(), factory);
    }

    pub fn contains(&self, name: &str) -> bool {
        self.factories.contains_key(name)
    }

    /// New instance of the named agent
    pub fn create(&self, name: &str) -> Option<Box<dyn Agent>> {
        let factory = self.factories.get(name).map(|f| Arc::clone(&f))?;
        Some(factory())
    }

    /// Sorted names of every registered agent
    pub fn names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.factories.iter().map(|e| e.key().clone()).collect();
        names.sort();
        names
    }
}

//! Agent lifecycle states

use serde::{Deserialize, Serialize};
use std::fmt;

/// Lifecycle state of an agent
///
/// States only move forward:
///
/// ```text
/// NotLaunched -> Initializing -> Activating -> Living -> Ending -> Terminated
///                                     |          |         ^
///                                     +----------+- fault -+
/// ```
///
/// A faulted agent still passes through `Ending`, but `on_end` is skipped.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AgentState {
    /// Created but never launched
    NotLaunched,
    /// Execution context is being allocated
    Initializing,
    /// `on_activate` is running
    Activating,
    /// Persistent loop or reactive idle
    Living,
    /// `on_end` is running
    Ending,
    /// Final state; all memberships released, mailbox closed
    Terminated,
}

impl AgentState {
    /// Initializing, Activating, Living and Ending are active states
    pub fn is_active(&self) -> bool {
        matches!(
            self,
            AgentState::Initializing | AgentState::Activating | AgentState::Living | AgentState::Ending
        )
    }

    pub fn is_terminated(&self) -> bool {
        matches!(self, AgentState::Terminated)
    }
}

impl fmt::Display for AgentState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            AgentState::NotLaunched => "NOT_LAUNCHED",
            AgentState::Initializing => "INITIALIZING",
            AgentState::Activating => "ACTIVATING",
            AgentState::Living => "LIVING",
            AgentState::Ending => "ENDING",
            AgentState::Terminated => "TERMINATED",
        };
        f.write_str(name)
    }
}

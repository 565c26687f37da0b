//! Agent addresses

use crate::types::{AgentId, KernelId};
use serde::Serialize;
use std::fmt;
use std::sync::Arc;

/// Serial carried by candidate pseudo-addresses
pub(crate) const CANDIDATE_GRANT: u64 = 0;

/// Capability naming one agent in one role of one group
///
/// An address is minted for a specific role grant. It stays valid while the
/// agent still holds that grant; leaving the role or terminating invalidates
/// it permanently, even if the agent later requests the same role again.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize)]
pub struct AgentAddress {
    #[serde(skip)]
    kernel: KernelId,
    agent: AgentId,
    community: Arc<str>,
    group: Arc<str>,
    role: Arc<str>,
    grant: u64,
}

impl AgentAddress {
    pub(crate) fn new(
        kernel: KernelId,
        agent: AgentId,
        community: Arc<str>,
        group: Arc<str>,
        role: Arc<str>,
        grant: u64,
    ) -> Self {
        Self {
            kernel,
            agent,
            community,
            group,
            role,
            grant,
        }
    }

    pub fn agent(&self) -> AgentId {
        self.agent
    }

    pub fn community(&self) -> &str {
        &self.community
    }

    pub fn group(&self) -> &str {
        &self.group
    }

    pub fn role(&self) -> &str {
        &self.role
    }

    /// True for the pseudo-address of an agent acting from outside the group
    pub fn is_candidate(&self) -> bool {
        self.grant == CANDIDATE_GRANT
    }

    pub(crate) fn kernel(&self) -> KernelId {
        self.kernel
    }

    pub(crate) fn grant(&self) -> u64 {
        self.grant
    }
}

impl fmt::Display for AgentAddress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}@{}/{}/{}",
            self.agent, self.community, self.group, self.role
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_display_and_accessors() {
        let agent = AgentId::next();
        let aa = AgentAddress::new(
            KernelId::generate(),
            agent,
            Arc::from("market"),
            Arc::from("auction"),
            Arc::from("buyer"),
            12,
        );
        assert_eq!(aa.community(), "market");
        assert_eq!(aa.role(), "buyer");
        assert!(!aa.is_candidate());
        assert_eq!(aa.to_string(), format!("{}@market/auction/buyer", agent));
    }
}

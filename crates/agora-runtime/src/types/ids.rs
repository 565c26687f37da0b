//! Identity types for the Agora runtime

use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use uuid::Uuid;

static NEXT_AGENT: AtomicU64 = AtomicU64::new(1);
static NEXT_MESSAGE: AtomicU64 = AtomicU64::new(1);

/// Unique identifier for an agent
///
/// Allocated monotonically and never reused within a process, so ids also
/// reflect creation order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct AgentId(u64);

impl AgentId {
    pub(crate) fn next() -> Self {
        Self(NEXT_AGENT.fetch_add(1, Ordering::Relaxed))
    }

    pub fn as_u64(&self) -> u64 {
        self.0
    }
}

impl fmt::Display for AgentId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "agent:{}", self.0)
    }
}

/// Unique identifier for a message
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct MessageId(u64);

impl MessageId {
    pub(crate) fn next() -> Self {
        Self(NEXT_MESSAGE.fetch_add(1, Ordering::Relaxed))
    }

    pub fn as_u64(&self) -> u64 {
        self.0
    }
}

impl fmt::Display for MessageId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "message:{}", self.0)
    }
}

/// Identifier of one kernel instance
///
/// Addresses carry the id of the kernel that minted them; an address
/// presented to another kernel never resolves.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct KernelId(Uuid);

impl KernelId {
    pub fn generate() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for KernelId {
    fn default() -> Self {
        Self::generate()
    }
}

impl fmt::Display for KernelId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "kernel:{}", self.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_agent_ids_are_monotonic() {
        let a = AgentId::next();
        let b = AgentId::next();
        assert!(b > a);
        assert_ne!(a, b);
    }

    #[test]
    fn test_display() {
        let id = AgentId(7);
        assert_eq!(id.to_string(), "agent:7");
        assert_eq!(MessageId(3).to_string(), "message:3");
        assert!(KernelId::generate().to_string().starts_with("kernel:"));
    }
}

//! Group and role tables

use crate::messaging::Mailbox;
use crate::types::AgentId;
use parking_lot::RwLock;
use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;

/// One group of a community
///
/// All role tables of the group sit behind a single lock so that
/// deregistration of a member is atomic for every resolver.
pub(crate) struct Group {
    pub(crate) community: Arc<str>,
    pub(crate) name: Arc<str>,
    pub(crate) state: RwLock<GroupState>,
}

impl Group {
    pub(crate) fn new(community: Arc<str>, name: Arc<str>) -> Self {
        Self {
            community,
            name,
            state: RwLock::new(GroupState::default()),
        }
    }
}

#[derive(Default)]
pub(crate) struct GroupState {
    pub(crate) roles: HashMap<Arc<str>, Role>,
    /// Set once the group has been pruned from the directory
    pub(crate) removed: bool,
}

impl GroupState {
    pub(crate) fn is_empty(&self) -> bool {
        self.roles.is_empty()
    }

    pub(crate) fn holds_any(&self, agent: AgentId) -> bool {
        self.roles.values().any(|role| role.grant_of(agent).is_some())
    }

    /// Role the agent obtained first in this group
    pub(crate) fn earliest_role(&self, agent: AgentId) -> Option<(&Arc<str>, u64)> {
        self.roles
            .iter()
            .filter_map(|(name, role)| role.grant_of(agent).map(|grant| (name, grant)))
            .min_by_key(|(_, grant)| *grant)
    }

    /// Roles held by the agent, in the order it obtained them
    pub(crate) fn roles_of(&self, agent: AgentId) -> Vec<Arc<str>> {
        let mut held: Vec<_> = self
            .roles
            .iter()
            .filter_map(|(name, role)| role.grant_of(agent).map(|grant| (grant, name.clone())))
            .collect();
        held.sort_by_key(|(grant, _)| *grant);
        held.into_iter().map(|(_, name)| name).collect()
    }

    /// Remove the agent from every role, dropping roles left empty
    pub(crate) fn remove_agent(&mut self, agent: AgentId) -> usize {
        let mut removed = 0;
        self.roles.retain(|_, role| {
            if role.remove(agent) {
                removed += 1;
            }
            !role.is_empty()
        });
        removed
    }
}

#[derive(Clone)]
pub(crate) struct Member {
    pub(crate) agent: AgentId,
    pub(crate) mailbox: Arc<Mailbox>,
}

/// Holders of one role, ordered by grant serial
#[derive(Default)]
pub(crate) struct Role {
    by_grant: BTreeMap<u64, Member>,
    by_agent: HashMap<AgentId, u64>,
}

impl Role {
    pub(crate) fn insert(&mut self, grant: u64, member: Member) {
        self.by_agent.insert(member.agent, grant);
        self.by_grant.insert(grant, member);
    }

    pub(crate) fn remove(&mut self, agent: AgentId) -> bool {
        match self.by_agent.remove(&agent) {
            Some(grant) => {
                self.by_grant.remove(&grant);
                true
            }
            None => false,
        }
    }

    pub(crate) fn grant_of(&self, agent: AgentId) -> Option<u64> {
        self.by_agent.get(&agent).copied()
    }

    pub(crate) fn member(&self, grant: u64) -> Option<&Member> {
        self.by_grant.get(&grant)
    }

    pub(crate) fn is_empty(&self) -> bool {
        self.by_grant.is_empty()
    }

    pub(crate) fn len(&self) -> usize {
        self.by_grant.len()
    }

    /// Members in registration order
    pub(crate) fn members(&self) -> impl Iterator<Item = (u64, &Member)> {
        self.by_grant.iter().map(|(grant, member)| (*grant, member))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn member(agent: AgentId) -> Member {
        Member {
            agent,
            mailbox: Arc::new(Mailbox::new()),
        }
    }

    #[test]
    fn test_role_keeps_registration_order() {
        let (a, b, c) = (AgentId::next(), AgentId::next(), AgentId::next());
        let mut role = Role::default();
        role.insert(5, member(b));
        role.insert(3, member(a));
        role.insert(9, member(c));

        let order: Vec<_> = role.members().map(|(_, m)| m.agent).collect();
        assert_eq!(order, vec![a, b, c]);
        assert!(role.remove(a));
        assert!(!role.remove(a));
        assert_eq!(role.len(), 2);
        assert_eq!(role.grant_of(c), Some(9));
    }

    #[test]
    fn test_earliest_role_and_removal() {
        let agent = AgentId::next();
        let mut state = GroupState::default();
        state.roles.entry(Arc::from("late")).or_default().insert(20, member(agent));
        state.roles.entry(Arc::from("early")).or_default().insert(10, member(agent));

        let (name, grant) = state.earliest_role(agent).unwrap();
        assert_eq!(&**name, "early");
        assert_eq!(grant, 10);
        assert_eq!(state.roles_of(agent).len(), 2);

        assert_eq!(state.remove_agent(agent), 2);
        assert!(state.is_empty());
        assert!(!state.holds_any(agent));
    }
}

//! Organization directory
//!
//! Communities contain groups, groups contain roles, roles contain agents.
//! The directory is the only owner of membership edges and the only place
//! where [`AgentAddress`] values are minted and resolved.
//!
//! Lock order is always: community table, then group, then the per-agent
//! membership index. Messages are delivered while the target group's read
//! lock is held, so a member being deregistered is either fully visible or
//! fully gone to every sender.

mod address;
mod group;

pub use address::AgentAddress;

use crate::messaging::{Mailbox, Message};
use crate::types::{AgentId, KernelId, ReturnCode};
use address::CANDIDATE_GRANT;
use dashmap::DashMap;
use group::{Group, GroupState, Member};
use parking_lot::RwLock;
use rand::Rng;
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

/// Role granted to the creator of a group
pub const MANAGER_ROLE: &str = "manager";

/// Pseudo-role of an agent addressing a group it does not belong to
pub const CANDIDATE_ROLE: &str = "candidate";

type Communities = HashMap<Arc<str>, HashMap<Arc<str>, Arc<Group>>>;

/// The community/group/role directory of one kernel
pub struct Organization {
    kernel: KernelId,
    communities: RwLock<Communities>,
    /// Groups in which each agent holds at least one role
    memberships: DashMap<AgentId, Vec<Arc<Group>>>,
    /// Mailboxes of every live agent, used to reach candidates
    postal: DashMap<AgentId, Arc<Mailbox>>,
    next_grant: AtomicU64,
}

impl Organization {
    pub fn new(kernel: KernelId) -> Self {
        Self {
            kernel,
            communities: RwLock::new(HashMap::new()),
            memberships: DashMap::new(),
            postal: DashMap::new(),
            next_grant: AtomicU64::new(CANDIDATE_GRANT + 1),
        }
    }

    // ═══════════════════════════════════════════════════════════════════
    // MEMBERSHIP MUTATIONS
    // ═══════════════════════════════════════════════════════════════════

    /// Create a group and make `agent` its manager
    pub(crate) fn create_group(
        &self,
        agent: AgentId,
        mailbox: &Arc<Mailbox>,
        community: &str,
        group: &str,
        if_absent: bool,
    ) -> ReturnCode {
        if community.is_empty() || group.is_empty() {
            return ReturnCode::InvalidArg;
        }

        let mut communities = self.communities.write();
        if let Some(groups) = communities.get(community) {
            if groups.contains_key(group) {
                return if if_absent {
                    ReturnCode::Success
                } else {
                    ReturnCode::AlreadyGroup
                };
            }
        }

        let community: Arc<str> = Arc::from(community);
        let created = Arc::new(Group::new(community.clone(), Arc::from(group)));
        {
            let mut state = created.state.write();
            if let Err(code) = self.grant(&created, &mut state, MANAGER_ROLE, agent, mailbox) {
                return code;
            }
        }

        tracing::debug!(agent = %agent, community = %community, group = %group, "Group created");
        communities
            .entry(community)
            .or_default()
            .insert(created.name.clone(), created);
        ReturnCode::Success
    }

    /// Grant `role` in an existing group to `agent`
    pub(crate) fn request_role(
        &self,
        agent: AgentId,
        mailbox: &Arc<Mailbox>,
        community: &str,
        group: &str,
        role: &str,
    ) -> ReturnCode {
        if role.is_empty() {
            return ReturnCode::InvalidArg;
        }
        let group = match self.lookup(community, group) {
            Ok(group) => group,
            Err(code) => return code,
        };
        if role == MANAGER_ROLE {
            return ReturnCode::AccessDenied;
        }

        let mut state = group.state.write();
        if state.removed {
            return ReturnCode::NotGroup;
        }
        if state
            .roles
            .get(role)
            .is_some_and(|held| held.grant_of(agent).is_some())
        {
            return ReturnCode::RoleAlreadyHandled;
        }

        match self.grant(&group, &mut state, role, agent, mailbox) {
            Ok(grant) => {
                tracing::debug!(agent = %agent, community = %group.community, group = %group.name, role, grant, "Role granted");
                ReturnCode::Success
            }
            Err(code) => code,
        }
    }

    /// Give up one role; empty roles, groups and communities are pruned
    pub(crate) fn leave_role(
        &self,
        agent: AgentId,
        community: &str,
        group: &str,
        role: &str,
    ) -> ReturnCode {
        let group = match self.lookup(community, group) {
            Ok(group) => group,
            Err(code) => return code,
        };

        let now_empty = {
            let mut state = group.state.write();
            if state.removed {
                return ReturnCode::NotGroup;
            }
            let Some(held) = state.roles.get_mut(role) else {
                return ReturnCode::RoleNotHandled;
            };
            if !held.remove(agent) {
                return ReturnCode::RoleNotHandled;
            }
            if held.is_empty() {
                state.roles.remove(role);
            }
            if !state.holds_any(agent) {
                self.forget_group(agent, &group);
            }
            state.is_empty()
        };

        if now_empty {
            self.prune(&group);
        }
        ReturnCode::Success
    }

    /// Give up every role held in a group
    pub(crate) fn leave_group(&self, agent: AgentId, community: &str, group: &str) -> ReturnCode {
        let group = match self.lookup(community, group) {
            Ok(group) => group,
            Err(code) => return code,
        };

        let now_empty = {
            let mut state = group.state.write();
            if state.removed || state.remove_agent(agent) == 0 {
                return ReturnCode::NotInGroup;
            }
            self.forget_group(agent, &group);
            state.is_empty()
        };

        if now_empty {
            self.prune(&group);
        }
        ReturnCode::Success
    }

    pub(crate) fn register_mailbox(&self, agent: AgentId, mailbox: Arc<Mailbox>) {
        self.postal.insert(agent, mailbox);
    }

    /// Remove a terminating agent from every role
    ///
    /// The agent's mailbox must already be closed, which stops any further
    /// grant from succeeding.
    pub(crate) fn deregister(&self, agent: AgentId) {
        self.postal.remove(&agent);
        let groups = self
            .memberships
            .remove(&agent)
            .map(|(_, groups)| groups)
            .unwrap_or_default();

        for group in groups {
            let now_empty = {
                let mut state = group.state.write();
                state.remove_agent(agent);
                state.is_empty()
            };
            if now_empty {
                self.prune(&group);
            }
        }
    }

    fn grant(
        &self,
        group: &Arc<Group>,
        state: &mut GroupState,
        role: &str,
        agent: AgentId,
        mailbox: &Arc<Mailbox>,
    ) -> Result<u64, ReturnCode> {
        let mut groups = self.memberships.entry(agent).or_default();
        // Checked while the index entry is held: deregistration takes the
        // entry only after closing the mailbox.
        if mailbox.is_closed() {
            let unused = groups.is_empty();
            drop(groups);
            if unused {
                self.memberships.remove_if(&agent, |_, groups| groups.is_empty());
            }
            return Err(ReturnCode::Ignored);
        }
        if !groups.iter().any(|g| Arc::ptr_eq(g, group)) {
            groups.push(Arc::clone(group));
        }
        drop(groups);

        let grant = self.next_grant.fetch_add(1, Ordering::Relaxed);
        state.roles.entry(Arc::from(role)).or_default().insert(
            grant,
            Member {
                agent,
                mailbox: Arc::clone(mailbox),
            },
        );
        Ok(grant)
    }

    fn forget_group(&self, agent: AgentId, group: &Arc<Group>) {
        let now_unused = match self.memberships.get_mut(&agent) {
            Some(mut groups) => {
                groups.retain(|g| !Arc::ptr_eq(g, group));
                groups.is_empty()
            }
            None => false,
        };
        if now_unused {
            self.memberships.remove_if(&agent, |_, groups| groups.is_empty());
        }
    }

    fn prune(&self, group: &Arc<Group>) {
        let mut communities = self.communities.write();
        let mut state = group.state.write();
        if state.removed || !state.is_empty() {
            return;
        }
        state.removed = true;

        if let Some(groups) = communities.get_mut(&group.community) {
            if groups.get(&group.name).is_some_and(|g| Arc::ptr_eq(g, group)) {
                groups.remove(&group.name);
                tracing::debug!(community = %group.community, group = %group.name, "Empty group removed");
            }
            if groups.is_empty() {
                communities.remove(&group.community);
            }
        }
    }

    fn lookup(&self, community: &str, group: &str) -> Result<Arc<Group>, ReturnCode> {
        let communities = self.communities.read();
        let groups = communities.get(community).ok_or(ReturnCode::NotCommunity)?;
        groups.get(group).cloned().ok_or(ReturnCode::NotGroup)
    }

    // ═══════════════════════════════════════════════════════════════════
    // RESOLUTION AND DELIVERY
    // ═══════════════════════════════════════════════════════════════════

    /// Deliver to the holder of a specific address
    pub(crate) fn send_to_address(
        &self,
        sender: AgentId,
        receiver: &AgentAddress,
        mut message: Message,
        sender_role: Option<&str>,
    ) -> ReturnCode {
        if receiver.kernel() != self.kernel {
            return ReturnCode::InvalidAa;
        }
        let Ok(group) = self.lookup(receiver.community(), receiver.group()) else {
            return ReturnCode::InvalidAa;
        };

        let state = group.state.read();
        if state.removed {
            return ReturnCode::InvalidAa;
        }

        let mailbox = if receiver.is_candidate() {
            match self.postal.get(&receiver.agent()) {
                Some(mailbox) => Arc::clone(&mailbox),
                None => return ReturnCode::InvalidAa,
            }
        } else {
            match state
                .roles
                .get(receiver.role())
                .and_then(|role| role.member(receiver.grant()))
            {
                Some(member) if member.agent == receiver.agent() => Arc::clone(&member.mailbox),
                _ => return ReturnCode::InvalidAa,
            }
        };

        let from = match self.sender_address(&group, &state, sender, sender_role) {
            Ok(from) => from,
            Err(code) => return code,
        };

        message.stamp(from, receiver.clone());
        match mailbox.deliver(message) {
            Ok(()) => ReturnCode::Success,
            Err(_) => ReturnCode::InvalidAa,
        }
    }

    /// Deliver to one randomly chosen other holder of a role
    pub(crate) fn send_to_role(
        &self,
        sender: AgentId,
        community: &str,
        group: &str,
        role: &str,
        mut message: Message,
        sender_role: Option<&str>,
    ) -> ReturnCode {
        let group = match self.lookup(community, group) {
            Ok(group) => group,
            Err(code) => return code,
        };
        let state = group.state.read();
        let recipients = match Self::recipients(&state, sender, role) {
            Ok(recipients) => recipients,
            Err(code) => return code,
        };
        let from = match self.sender_address(&group, &state, sender, sender_role) {
            Ok(from) => from,
            Err(code) => return code,
        };

        let (role_name, grant, member) = &recipients[rand::thread_rng().gen_range(0..recipients.len())];
        let to = self.address(&group, role_name, member.agent, *grant);
        message.stamp(from, to);
        match member.mailbox.deliver(message) {
            Ok(()) => ReturnCode::Success,
            Err(_) => ReturnCode::NoRecipientFound,
        }
    }

    /// Deliver a copy to every other holder of a role
    pub(crate) fn broadcast(
        &self,
        sender: AgentId,
        community: &str,
        group: &str,
        role: &str,
        message: Message,
        sender_role: Option<&str>,
    ) -> ReturnCode {
        let group = match self.lookup(community, group) {
            Ok(group) => group,
            Err(code) => return code,
        };
        let state = group.state.read();
        let recipients = match Self::recipients(&state, sender, role) {
            Ok(recipients) => recipients,
            Err(code) => return code,
        };
        let from = match self.sender_address(&group, &state, sender, sender_role) {
            Ok(from) => from,
            Err(code) => return code,
        };

        let mut delivered = 0;
        for (role_name, grant, member) in &recipients {
            let mut copy = message.duplicate();
            copy.stamp(from.clone(), self.address(&group, role_name, member.agent, *grant));
            if member.mailbox.deliver(copy).is_ok() {
                delivered += 1;
            }
        }

        if delivered == 0 {
            ReturnCode::NoRecipientFound
        } else {
            ReturnCode::Success
        }
    }

    /// Open-mailbox holders of `role` other than `sender`
    fn recipients(
        state: &GroupState,
        sender: AgentId,
        role: &str,
    ) -> Result<Vec<(Arc<str>, u64, Member)>, ReturnCode> {
        if state.removed {
            return Err(ReturnCode::NotGroup);
        }
        let (role_name, held) = state.roles.get_key_value(role).ok_or(ReturnCode::NotRole)?;
        let recipients: Vec<_> = held
            .members()
            .filter(|(_, member)| member.agent != sender && !member.mailbox.is_closed())
            .map(|(grant, member)| (role_name.clone(), grant, member.clone()))
            .collect();
        if recipients.is_empty() {
            return Err(ReturnCode::NoRecipientFound);
        }
        Ok(recipients)
    }

    /// Address the sender speaks with inside `group`
    fn sender_address(
        &self,
        group: &Group,
        state: &GroupState,
        sender: AgentId,
        sender_role: Option<&str>,
    ) -> Result<AgentAddress, ReturnCode> {
        match sender_role {
            Some(role) => {
                if let Some((name, held)) = state.roles.get_key_value(role) {
                    if let Some(grant) = held.grant_of(sender) {
                        return Ok(self.address(group, name, sender, grant));
                    }
                }
                if role == CANDIDATE_ROLE {
                    Ok(self.candidate_address(group, sender))
                } else if state.holds_any(sender) {
                    Err(ReturnCode::RoleNotHandled)
                } else {
                    Err(ReturnCode::NotInGroup)
                }
            }
            None => Ok(match state.earliest_role(sender) {
                Some((name, grant)) => self.address(group, name, sender, grant),
                None => self.candidate_address(group, sender),
            }),
        }
    }

    fn address(&self, group: &Group, role: &Arc<str>, agent: AgentId, grant: u64) -> AgentAddress {
        AgentAddress::new(
            self.kernel,
            agent,
            group.community.clone(),
            group.name.clone(),
            role.clone(),
            grant,
        )
    }

    fn candidate_address(&self, group: &Group, agent: AgentId) -> AgentAddress {
        AgentAddress::new(
            self.kernel,
            agent,
            group.community.clone(),
            group.name.clone(),
            Arc::from(CANDIDATE_ROLE),
            CANDIDATE_GRANT,
        )
    }

    // ═══════════════════════════════════════════════════════════════════
    // QUERIES
    // ═══════════════════════════════════════════════════════════════════

    /// One holder of the role other than `requester`, chosen at random
    pub fn get_agent_with_role(
        &self,
        requester: Option<AgentId>,
        community: &str,
        group: &str,
        role: &str,
    ) -> Option<AgentAddress> {
        let mut others = self.get_agents_with_role(requester, community, group, role);
        if others.is_empty() {
            return None;
        }
        let pick = rand::thread_rng().gen_range(0..others.len());
        Some(others.swap_remove(pick))
    }

    /// Every holder of the role other than `requester`, in registration order
    pub fn get_agents_with_role(
        &self,
        requester: Option<AgentId>,
        community: &str,
        group: &str,
        role: &str,
    ) -> Vec<AgentAddress> {
        let Ok(group) = self.lookup(community, group) else {
            return Vec::new();
        };
        let state = group.state.read();
        if state.removed {
            return Vec::new();
        }
        let Some((name, held)) = state.roles.get_key_value(role) else {
            return Vec::new();
        };
        held.members()
            .filter(|(_, member)| Some(member.agent) != requester)
            .map(|(grant, member)| self.address(&group, name, member.agent, grant))
            .collect()
    }

    /// Agents currently holding the role, in registration order
    pub fn role_members(&self, community: &str, group: &str, role: &str) -> Vec<AgentId> {
        let Ok(group) = self.lookup(community, group) else {
            return Vec::new();
        };
        let state = group.state.read();
        state
            .roles
            .get(role)
            .map(|held| held.members().map(|(_, member)| member.agent).collect())
            .unwrap_or_default()
    }

    pub fn is_community(&self, community: &str) -> bool {
        self.communities.read().contains_key(community)
    }

    pub fn is_group(&self, community: &str, group: &str) -> bool {
        self.lookup(community, group).is_ok()
    }

    pub fn is_role(&self, community: &str, group: &str, role: &str) -> bool {
        self.lookup(community, group)
            .map(|group| group.state.read().roles.contains_key(role))
            .unwrap_or(false)
    }

    pub fn has_role(&self, agent: AgentId, community: &str, group: &str, role: &str) -> bool {
        self.lookup(community, group)
            .map(|group| {
                group
                    .state
                    .read()
                    .roles
                    .get(role)
                    .is_some_and(|held| held.grant_of(agent).is_some())
            })
            .unwrap_or(false)
    }

    /// Manager of a group, if it still holds the manager role
    pub fn manager_of(&self, community: &str, group: &str) -> Option<AgentId> {
        let group = self.lookup(community, group).ok()?;
        let state = group.state.read();
        let held = state.roles.get(MANAGER_ROLE)?;
        let manager = held.members().next().map(|(_, member)| member.agent);
        manager
    }

    /// Sorted community names
    pub fn communities(&self) -> Vec<String> {
        let mut names: Vec<String> = self
            .communities
            .read()
            .keys()
            .map(|name| name.to_string())
            .collect();
        names.sort();
        names
    }

    /// Sorted group names of a community
    pub fn groups(&self, community: &str) -> Vec<String> {
        let mut names: Vec<String> = self
            .communities
            .read()
            .get(community)
            .map(|groups| groups.keys().map(|name| name.to_string()).collect())
            .unwrap_or_default();
        names.sort();
        names
    }

    /// Sorted role names of a group
    pub fn roles(&self, community: &str, group: &str) -> Vec<String> {
        let mut names: Vec<String> = self
            .lookup(community, group)
            .map(|group| {
                group
                    .state
                    .read()
                    .roles
                    .keys()
                    .map(|name| name.to_string())
                    .collect()
            })
            .unwrap_or_default();
        names.sort();
        names
    }

    /// Every (community, group, role) held by the agent
    pub fn memberships_of(&self, agent: AgentId) -> Vec<(String, String, String)> {
        let groups = match self.memberships.get(&agent) {
            Some(groups) => groups.clone(),
            None => return Vec::new(),
        };
        groups
            .iter()
            .flat_map(|group| {
                group
                    .state
                    .read()
                    .roles_of(agent)
                    .into_iter()
                    .map(|role| (group.community.to_string(), group.name.to_string(), role.to_string()))
                    .collect::<Vec<_>>()
            })
            .collect()
    }

    /// Number of agents holding at least one role
    pub fn member_count(&self) -> usize {
        self.memberships.len()
    }
}

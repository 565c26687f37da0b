//! The agent's view of the kernel

use super::handle::{AgentCell, AgentRef};
use super::kernel::Kernel;
use super::lifecycle;
use crate::agent::Agent;
use crate::messaging::Message;
use crate::organization::{AgentAddress, Organization};
use crate::telemetry::AGENT_TARGET;
use crate::types::{AgentId, AgentState, KernelResult, MessageId, ReturnCode};
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

/// Handle passed to every agent callback
///
/// All lifecycle, organization and messaging operations an agent performs
/// go through its context, which supplies the caller identity.
#[derive(Clone)]
pub struct AgentContext {
    kernel: Kernel,
    cell: Arc<AgentCell>,
}

impl AgentContext {
    pub(crate) fn new(kernel: Kernel, cell: Arc<AgentCell>) -> Self {
        Self { kernel, cell }
    }

    pub fn id(&self) -> AgentId {
        self.cell.id
    }

    pub fn name(&self) -> &str {
        &self.cell.name
    }

    pub fn state(&self) -> AgentState {
        self.cell.state()
    }

    /// Handle to the calling agent
    pub fn me(&self) -> AgentRef {
        AgentRef::from_cell(Arc::clone(&self.cell))
    }

    pub fn kernel(&self) -> &Kernel {
        &self.kernel
    }

    pub fn organization(&self) -> &Organization {
        self.kernel.organization()
    }

    // ═══════════════════════════════════════════════════════════════════
    // LIFECYCLE
    // ═══════════════════════════════════════════════════════════════════

    /// Launch another agent; `IGNORED` if the caller is killed while waiting
    pub async fn launch(&self, target: &AgentRef, timeout: Option<Duration>) -> ReturnCode {
        self.suspend(lifecycle::launch(&self.kernel, target, timeout))
            .await
            .unwrap_or(ReturnCode::Ignored)
    }

    /// Create and launch an agent in one call
    pub async fn launch_agent(&self, agent: impl Agent, timeout: Option<Duration>) -> (AgentRef, ReturnCode) {
        let target = self.kernel.create_agent(agent);
        let code = self.launch(&target, timeout).await;
        (target, code)
    }

    pub async fn launch_by_name(
        &self,
        name: &str,
        timeout: Option<Duration>,
    ) -> KernelResult<(AgentRef, ReturnCode)> {
        let target = self.kernel.create_by_name(name)?;
        let code = self.launch(&target, timeout).await;
        Ok((target, code))
    }

    /// Kill an agent; killing oneself never returns into the current phase
    pub async fn kill(&self, target: &AgentRef, timeout: Option<Duration>) -> ReturnCode {
        let kill = lifecycle::kill(&self.kernel, Some(self.cell.id), target, timeout);
        if target.id() == self.cell.id {
            return kill.await;
        }
        self.suspend(kill).await.unwrap_or(ReturnCode::Ignored)
    }

    pub async fn kill_self(&self) -> ReturnCode {
        let me = self.me();
        self.kill(&me, None).await
    }

    /// Sleep for `duration`
    ///
    /// A pending kill interrupts the pause; the call then only returns once
    /// the agent has terminated, so phase code never resumes after it.
    pub async fn pause(&self, duration: Duration) {
        let _ = self.suspend(tokio::time::sleep(duration)).await;
    }

    /// Await `work` at a suspension point
    ///
    /// A pending kill parks the running phase here, and the driver drops it.
    /// Callers outside the agent's own task get `None` once it terminated.
    async fn suspend<F: Future>(&self, work: F) -> Option<F::Output> {
        tokio::select! {
            biased;
            _ = self.cell.interrupted() => {
                self.cell.park();
                self.cell.terminated().await;
                None
            }
            output = work => Some(output),
        }
    }

    // ═══════════════════════════════════════════════════════════════════
    // ORGANIZATION
    // ═══════════════════════════════════════════════════════════════════

    pub fn create_group(&self, community: &str, group: &str) -> ReturnCode {
        self.organization()
            .create_group(self.cell.id, &self.cell.mailbox, community, group, false)
    }

    pub fn create_group_if_absent(&self, community: &str, group: &str) -> ReturnCode {
        self.organization()
            .create_group(self.cell.id, &self.cell.mailbox, community, group, true)
    }

    pub fn request_role(&self, community: &str, group: &str, role: &str) -> ReturnCode {
        self.organization()
            .request_role(self.cell.id, &self.cell.mailbox, community, group, role)
    }

    pub fn leave_role(&self, community: &str, group: &str, role: &str) -> ReturnCode {
        self.organization().leave_role(self.cell.id, community, group, role)
    }

    pub fn leave_group(&self, community: &str, group: &str) -> ReturnCode {
        self.organization().leave_group(self.cell.id, community, group)
    }

    /// Another holder of the role, chosen at random
    pub fn get_agent_with_role(&self, community: &str, group: &str, role: &str) -> Option<AgentAddress> {
        self.organization()
            .get_agent_with_role(Some(self.cell.id), community, group, role)
    }

    /// Every other holder of the role, in registration order
    pub fn get_agents_with_role(&self, community: &str, group: &str, role: &str) -> Vec<AgentAddress> {
        self.organization()
            .get_agents_with_role(Some(self.cell.id), community, group, role)
    }

    pub fn has_role(&self, community: &str, group: &str, role: &str) -> bool {
        self.organization().has_role(self.cell.id, community, group, role)
    }

    /// Roles held in a group, in the order they were obtained
    pub fn my_roles(&self, community: &str, group: &str) -> Vec<String> {
        self.organization()
            .memberships_of(self.cell.id)
            .into_iter()
            .filter(|(c, g, _)| c == community && g == group)
            .map(|(_, _, role)| role)
            .collect()
    }

    // ═══════════════════════════════════════════════════════════════════
    // MESSAGING
    // ═══════════════════════════════════════════════════════════════════

    pub fn send_message<'a>(
        &self,
        receiver: impl Into<Option<&'a AgentAddress>>,
        message: impl Into<Option<Message>>,
    ) -> ReturnCode {
        self.send_to_address(receiver.into(), message.into(), None)
    }

    /// Send speaking as `sender_role`
    pub fn send_message_with_role<'a>(
        &self,
        receiver: impl Into<Option<&'a AgentAddress>>,
        message: impl Into<Option<Message>>,
        sender_role: &str,
    ) -> ReturnCode {
        if sender_role.is_empty() {
            return ReturnCode::InvalidArg;
        }
        self.send_to_address(receiver.into(), message.into(), Some(sender_role))
    }

    /// Send to one randomly chosen other holder of a role
    pub fn send_message_to_role(
        &self,
        community: &str,
        group: &str,
        role: &str,
        message: impl Into<Option<Message>>,
    ) -> ReturnCode {
        self.send_to_role(community, group, role, message.into(), None)
    }

    pub fn send_message_to_role_with_role(
        &self,
        community: &str,
        group: &str,
        role: &str,
        message: impl Into<Option<Message>>,
        sender_role: &str,
    ) -> ReturnCode {
        if sender_role.is_empty() {
            return ReturnCode::InvalidArg;
        }
        self.send_to_role(community, group, role, message.into(), Some(sender_role))
    }

    /// Send a copy to every other holder of a role
    pub fn broadcast_message(
        &self,
        community: &str,
        group: &str,
        role: &str,
        message: impl Into<Option<Message>>,
    ) -> ReturnCode {
        self.broadcast(community, group, role, message.into(), None)
    }

    pub fn broadcast_message_with_role(
        &self,
        community: &str,
        group: &str,
        role: &str,
        message: impl Into<Option<Message>>,
        sender_role: &str,
    ) -> ReturnCode {
        if sender_role.is_empty() {
            return ReturnCode::InvalidArg;
        }
        self.broadcast(community, group, role, message.into(), Some(sender_role))
    }

    /// Answer the sender of `original`, speaking in the role it reached us in
    pub fn send_reply(&self, original: &Message, reply: impl Into<Option<Message>>) -> ReturnCode {
        let role = original.receiver().map(|aa| aa.role().to_string());
        self.reply(original, reply.into(), role.as_deref())
    }

    pub fn send_reply_with_role(
        &self,
        original: &Message,
        reply: impl Into<Option<Message>>,
        sender_role: &str,
    ) -> ReturnCode {
        if sender_role.is_empty() {
            return ReturnCode::InvalidArg;
        }
        self.reply(original, reply.into(), Some(sender_role))
    }

    /// Send and wait for the reply threaded to the sent message
    pub async fn send_message_and_wait_reply(
        &self,
        receiver: &AgentAddress,
        message: Message,
        timeout: Option<Duration>,
    ) -> Result<Message, ReturnCode> {
        let id = message.id();
        let code = self.send_message(receiver, message);
        if !code.is_success() {
            return Err(code);
        }
        self.wait_reply_to(id, timeout).await.ok_or(ReturnCode::TimeOut)
    }

    /// Oldest message, without waiting
    pub fn next_message(&self) -> Option<Message> {
        self.cell.mailbox.pop()
    }

    /// Oldest message satisfying `predicate`, without waiting
    pub fn next_matching<F>(&self, predicate: F) -> Option<Message>
    where
        F: Fn(&Message) -> bool,
    {
        self.cell.mailbox.pop_matching(predicate)
    }

    /// Wait for the next message; `None` on timeout
    pub async fn wait_next_message(&self, timeout: Option<Duration>) -> Option<Message> {
        self.wait_matching(timeout, |_| true).await
    }

    /// Wait for a reply to `original`; other messages stay queued in order
    pub async fn wait_answer(&self, original: &Message, timeout: Option<Duration>) -> Option<Message> {
        self.wait_reply_to(original.id(), timeout).await
    }

    /// Drop every queued message, returning how many were dropped
    pub fn purge_mailbox(&self) -> usize {
        self.cell.mailbox.purge()
    }

    pub fn mailbox_len(&self) -> usize {
        self.cell.mailbox.len()
    }

    async fn wait_reply_to(&self, id: MessageId, timeout: Option<Duration>) -> Option<Message> {
        self.wait_matching(timeout, move |m| m.in_reply_to() == Some(id)).await
    }

    async fn wait_matching<F>(&self, timeout: Option<Duration>, predicate: F) -> Option<Message>
    where
        F: Fn(&Message) -> bool + Send,
    {
        let receive = async move {
            self.suspend(self.cell.mailbox.recv_matching(predicate))
                .await
                .flatten()
        };
        match timeout {
            None => receive.await,
            Some(limit) => tokio::time::timeout(limit, receive).await.ok().flatten(),
        }
    }

    fn send_to_address(
        &self,
        receiver: Option<&AgentAddress>,
        message: Option<Message>,
        sender_role: Option<&str>,
    ) -> ReturnCode {
        let (Some(receiver), Some(message)) = (receiver, message) else {
            return self.record(ReturnCode::InvalidArg);
        };
        let code = self
            .organization()
            .send_to_address(self.cell.id, receiver, message, sender_role);
        self.record(code)
    }

    fn send_to_role(
        &self,
        community: &str,
        group: &str,
        role: &str,
        message: Option<Message>,
        sender_role: Option<&str>,
    ) -> ReturnCode {
        let Some(message) = message else {
            return self.record(ReturnCode::InvalidArg);
        };
        let code = self
            .organization()
            .send_to_role(self.cell.id, community, group, role, message, sender_role);
        self.record(code)
    }

    fn broadcast(
        &self,
        community: &str,
        group: &str,
        role: &str,
        message: Option<Message>,
        sender_role: Option<&str>,
    ) -> ReturnCode {
        let Some(message) = message else {
            return self.record(ReturnCode::InvalidArg);
        };
        let code = self
            .organization()
            .broadcast(self.cell.id, community, group, role, message, sender_role);
        self.record(code)
    }

    fn reply(&self, original: &Message, reply: Option<Message>, sender_role: Option<&str>) -> ReturnCode {
        let (Some(receiver), Some(mut reply)) = (original.sender(), reply) else {
            return self.record(ReturnCode::InvalidArg);
        };
        reply.reply_to(original);
        let code = self
            .organization()
            .send_to_address(self.cell.id, receiver, reply, sender_role);
        self.record(code)
    }

    fn record(&self, code: ReturnCode) -> ReturnCode {
        if code.is_success() {
            self.kernel.telemetry().message_delivered();
        } else {
            tracing::trace!(target: AGENT_TARGET, agent = %self.cell.id, %code, "Message not delivered");
            self.kernel.telemetry().message_rejected(code);
        }
        code
    }
}

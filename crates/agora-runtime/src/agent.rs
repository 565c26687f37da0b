//! The agent behavior contract

use crate::runtime_core::AgentContext;
use crate::types::AgentResult;
use async_trait::async_trait;

/// Outcome of one persistent-loop iteration
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LiveStep {
    /// Run `on_live` again
    Continue,
    /// Leave the loop and run teardown
    Done,
}

/// Behavior of an agent
///
/// An agent is driven through three phases by the kernel:
///
/// 1. `on_activate` runs once when the agent is launched.
/// 2. If [`has_live`](Agent::has_live) is true, `on_live` is called in a
///    loop until it returns [`LiveStep::Done`] or the agent is killed.
///    Otherwise the agent stays reactive: it idles and runs `on_step`
///    whenever an [`Activator`](crate::scheduler::Activator) targets it.
/// 3. `on_end` runs once during teardown.
///
/// A pending kill takes effect at suspension points only: [`pause`],
/// [`wait_next_message`], [`wait_answer`] and awaiting the launch or kill of
/// another agent. The phase future is then dropped and never resumed. The
/// kernel also checks for a pending kill between phases and before each
/// `on_live` iteration. Any other `.await` runs to completion. An `Err` or a
/// panic out of `on_activate`, `on_live` or `on_step` is a fault: the agent
/// goes through `Ending` to `Terminated` without running `on_end`.
///
/// [`pause`]: AgentContext::pause
/// [`wait_next_message`]: AgentContext::wait_next_message
/// [`wait_answer`]: AgentContext::wait_answer
///
/// # Example
///
/// ```no_run
/// use agora_runtime::{Agent, AgentContext, AgentResult, LiveStep};
/// use async_trait::async_trait;
/// use std::time::Duration;
///
/// struct Ticker {
///     remaining: u32,
/// }
///
/// #[async_trait]
/// impl Agent for Ticker {
///     fn has_live(&self) -> bool {
///         true
///     }
///
///     async fn on_live(&mut self, ctx: &AgentContext) -> AgentResult<LiveStep> {
///         if self.remaining == 0 {
///             return Ok(LiveStep::Done);
///         }
///         self.remaining -= 1;
///         ctx.pause(Duration::from_millis(10)).await;
///         Ok(LiveStep::Continue)
///     }
/// }
/// ```
#[async_trait]
pub trait Agent: Send + 'static {
    /// Display name; defaults to the agent id
    fn name(&self) -> Option<String> {
        None
    }

    /// Whether the agent runs a persistent loop after activation
    fn has_live(&self) -> bool {
        false
    }

    async fn on_activate(&mut self, _ctx: &AgentContext) -> AgentResult {
        Ok(())
    }

    async fn on_live(&mut self, _ctx: &AgentContext) -> AgentResult<LiveStep> {
        Ok(LiveStep::Done)
    }

    async fn on_end(&mut self, _ctx: &AgentContext) -> AgentResult {
        Ok(())
    }

    /// Run the named behavior on behalf of an activator
    async fn on_step(&mut self, _ctx: &AgentContext, behavior: &str) -> AgentResult {
        anyhow::bail!("no behavior named `{behavior}`")
    }
}

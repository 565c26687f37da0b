//! The Agora kernel

use super::handle::{AgentCell, AgentRef};
use super::lifecycle;
use super::registry::{AgentFactoryRegistry, AgentRegistry};
use crate::agent::Agent;
use crate::config::KernelConfig;
use crate::organization::Organization;
use crate::telemetry::{self, KernelTelemetry};
use crate::types::*;
use parking_lot::Mutex;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

/// The agent kernel: owns every agent's lifecycle, the organization
/// directory and the launchable-agent registry
///
/// Cloning a `Kernel` is cheap; clones share the same state.
#[derive(Clone)]
pub struct Kernel {
    inner: Arc<KernelInner>,
}

struct KernelInner {
    id: KernelId,
    config: KernelConfig,

    // ═══════════════════════════════════════════════════════════════════
    // AGENTS
    // ═══════════════════════════════════════════════════════════════════
    agents: AgentRegistry,
    factories: AgentFactoryRegistry,
    /// Agents created at bootstrap without being activated
    staged: Mutex<Vec<AgentRef>>,

    // ═══════════════════════════════════════════════════════════════════
    // ORGANIZATION
    // ═══════════════════════════════════════════════════════════════════
    organization: Organization,

    // ═══════════════════════════════════════════════════════════════════
    // OBSERVABILITY
    // ═══════════════════════════════════════════════════════════════════
    telemetry: Arc<KernelTelemetry>,

    // ═══════════════════════════════════════════════════════════════════
    // STATE
    // ═══════════════════════════════════════════════════════════════════
    shutdown: AtomicBool,
}

impl Kernel {
    /// Create a kernel with no launchable agents registered
    pub fn new(config: KernelConfig) -> Self {
        Self::with_factories(config, AgentFactoryRegistry::new())
    }

    /// Create a kernel with a registry of launchable agents
    pub fn with_factories(config: KernelConfig, factories: AgentFactoryRegistry) -> Self {
        let id = KernelId::generate();
        let inner = KernelInner {
            id,
            config,
            agents: AgentRegistry::new(),
            factories,
            staged: Mutex::new(Vec::new()),
            organization: Organization::new(id),
            telemetry: Arc::new(KernelTelemetry::new()),
            shutdown: AtomicBool::new(false),
        };
        Self {
            inner: Arc::new(inner),
        }
    }

    /// Bootstrap a kernel from configuration
    ///
    /// Installs the tracing subscriber described by `config.logging`, then
    /// creates every agent listed in `config.launch_agents` and launches
    /// those marked `auto_activate`.
    ///
    /// # Example
    ///
    /// ```no_run
    /// use agora_runtime::{AgentFactoryRegistry, Kernel, config::KernelConfig};
    ///
    /// #[tokio::main]
    /// async fn main() -> Result<(), Box<dyn std::error::Error>> {
    ///     let config = KernelConfig::load(Some("agora.toml"))?;
    ///     let kernel = Kernel::bootstrap(config, AgentFactoryRegistry::new()).await?;
    ///     kernel.shutdown().await?;
    ///     Ok(())
    /// }
    /// ```
    pub async fn bootstrap(config: KernelConfig, factories: AgentFactoryRegistry) -> KernelResult<Self> {
        telemetry::init_tracing(&config.logging)?;
        tracing::info!("Bootstrapping Agora kernel");

        // Phase 1: resolve launch requests before anything runs
        tracing::debug!("Phase 1: Resolving launchable agents");
        if let Some(missing) = config
            .launch_agents
            .iter()
            .find(|spec| !factories.contains(&spec.agent))
        {
            return Err(KernelError::UnknownAgent(missing.agent.clone()));
        }

        // Phase 2: directory, agent table and telemetry
        tracing::debug!("Phase 2: Initializing kernel services");
        let kernel = Self::with_factories(config, factories);

        // Phase 3: launch configured agents
        tracing::debug!("Phase 3: Launching configured agents");
        let timeout = kernel.default_launch_timeout();
        for spec in &kernel.inner.config.launch_agents {
            for _ in 0..spec.count {
                let agent = kernel.create_by_name(&spec.agent)?;
                if !spec.auto_activate {
                    kernel.inner.staged.lock().push(agent);
                    continue;
                }
                let code = kernel.launch(&agent, timeout).await;
                if !code.is_success() {
                    tracing::warn!(agent = %agent.id(), unit = %spec.agent, %code, "Configured agent did not activate");
                }
            }
        }

        tracing::info!(kernel = %kernel.id(), agents = kernel.live_agents(), "Agora kernel bootstrapped");
        Ok(kernel)
    }

    /// Kill every active agent, then flush telemetry
    ///
    /// Agents that do not terminate within the configured shutdown timeout
    /// keep terminating in the background and are reported in the error.
    pub async fn shutdown(&self) -> KernelResult<()> {
        tracing::info!(kernel = %self.inner.id, "Shutting down Agora kernel");

        if self.inner.shutdown.swap(true, Ordering::AcqRel) {
            tracing::warn!("Kernel already shut down");
            return Ok(());
        }

        // Step 1: kill every active agent concurrently
        let agents = self.inner.agents.snapshot();
        tracing::debug!(count = agents.len(), "Step 1: Killing active agents");
        let limit = Some(self.inner.config.lifecycle.shutdown_timeout());
        let outcomes =
            futures::future::join_all(agents.iter().map(|agent| lifecycle::kill(self, None, agent, limit))).await;
        let stragglers = outcomes.iter().filter(|code| **code == ReturnCode::TimeOut).count();

        // Step 2: final telemetry flush
        tracing::debug!("Step 2: Flushing telemetry");
        self.inner.telemetry.flush();

        if stragglers > 0 {
            tracing::warn!(stragglers, "Agents still terminating after shutdown timeout");
            return Err(KernelError::ShutdownTimeout(stragglers));
        }
        tracing::info!("Agora kernel shutdown complete");
        Ok(())
    }

    pub fn is_shutting_down(&self) -> bool {
        self.inner.shutdown.load(Ordering::Acquire)
    }

    // ═══════════════════════════════════════════════════════════════════
    // AGENT LIFECYCLE
    // ═══════════════════════════════════════════════════════════════════

    /// Wrap an agent in a handle; the agent is `NotLaunched` until launched
    pub fn create_agent(&self, agent: impl Agent) -> AgentRef {
        self.create_boxed(Box::new(agent))
    }

    pub fn create_boxed(&self, agent: Box<dyn Agent>) -> AgentRef {
        AgentRef::from_cell(AgentCell::new(agent))
    }

    /// Instantiate a registered launchable agent
    pub fn create_by_name(&self, name: &str) -> KernelResult<AgentRef> {
        let agent = self
            .inner
            .factories
            .create(name)
            .ok_or_else(|| KernelError::UnknownAgent(name.to_string()))?;
        Ok(self.create_boxed(agent))
    }

    /// Launch an agent as an external caller
    pub async fn launch(&self, target: &AgentRef, timeout: Option<Duration>) -> ReturnCode {
        lifecycle::launch(self, target, timeout).await
    }

    /// Create and launch an agent in one call
    pub async fn launch_agent(&self, agent: impl Agent, timeout: Option<Duration>) -> (AgentRef, ReturnCode) {
        let target = self.create_agent(agent);
        let code = self.launch(&target, timeout).await;
        (target, code)
    }

    /// Create and launch a registered launchable agent
    pub async fn launch_by_name(
        &self,
        name: &str,
        timeout: Option<Duration>,
    ) -> KernelResult<(AgentRef, ReturnCode)> {
        if self.is_shutting_down() {
            return Err(KernelError::ShuttingDown);
        }
        let target = self.create_by_name(name)?;
        let code = self.launch(&target, timeout).await;
        Ok((target, code))
    }

    /// Kill an agent as an external caller
    pub async fn kill(&self, target: &AgentRef, timeout: Option<Duration>) -> ReturnCode {
        lifecycle::kill(self, None, target, timeout).await
    }

    /// Sorted names of the launchable agents
    pub fn launchable_agents(&self) -> Vec<String> {
        self.inner.factories.names()
    }

    /// Agents created by bootstrap but not activated
    pub fn staged_agents(&self) -> Vec<AgentRef> {
        self.inner.staged.lock().clone()
    }

    pub fn agent(&self, id: AgentId) -> Option<AgentRef> {
        self.inner.agents.get(id).map(AgentRef::from_cell)
    }

    /// State of a launched agent; `None` once it terminated
    pub fn agent_state(&self, id: AgentId) -> Option<AgentState> {
        self.inner.agents.get(id).map(|cell| cell.state())
    }

    /// Number of agents in an active state
    pub fn live_agents(&self) -> usize {
        self.inner.agents.count()
    }

    pub fn default_launch_timeout(&self) -> Option<Duration> {
        self.inner.config.lifecycle.launch_timeout()
    }

    pub fn default_kill_timeout(&self) -> Option<Duration> {
        self.inner.config.lifecycle.kill_timeout()
    }

    // ═══════════════════════════════════════════════════════════════════
    // ACCESSORS
    // ═══════════════════════════════════════════════════════════════════

    pub fn id(&self) -> KernelId {
        self.inner.id
    }

    pub fn config(&self) -> &KernelConfig {
        &self.inner.config
    }

    pub fn organization(&self) -> &Organization {
        &self.inner.organization
    }

    pub fn telemetry(&self) -> &Arc<KernelTelemetry> {
        &self.inner.telemetry
    }

    pub(crate) fn agents(&self) -> &AgentRegistry {
        &self.inner.agents
    }
}

impl Default for Kernel {
    fn default() -> Self {
        Self::new(KernelConfig::default())
    }
}

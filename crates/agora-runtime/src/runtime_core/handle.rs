//! Agent handles and per-agent lifecycle state

use crate::agent::Agent;
use crate::messaging::Mailbox;
use crate::types::{AgentId, AgentState};
use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use std::fmt;
use std::hash::{Hash, Hasher};
use std::sync::atomic::AtomicBool;
use std::sync::Arc;
use tokio::sync::{mpsc, oneshot, watch};
use tokio_util::sync::CancellationToken;

/// How activation ended, as seen by a launcher
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Activation {
    Completed,
    Aborted,
}

/// Snapshot published on the agent's watch channel
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) struct Lifecycle {
    pub(crate) state: AgentState,
    pub(crate) activation: Option<Activation>,
}

/// Result of one activator step, as seen by the activator
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum StepOutcome {
    Completed,
    Faulted,
}

pub(crate) struct StepRequest {
    pub(crate) behavior: Arc<str>,
    pub(crate) done: oneshot::Sender<StepOutcome>,
}

/// Parts moved into the agent task by the winning launcher
pub(crate) struct LaunchParts {
    pub(crate) agent: Box<dyn Agent>,
    pub(crate) steps: mpsc::UnboundedReceiver<StepRequest>,
}

/// Shared state of one agent
pub(crate) struct AgentCell {
    pub(crate) id: AgentId,
    pub(crate) name: String,
    pub(crate) created_at: DateTime<Utc>,
    /// Agents without a persistent loop accept activator steps
    pub(crate) reactive: bool,
    pub(crate) lifecycle: watch::Sender<Lifecycle>,
    /// Set by the single accepted kill request
    pub(crate) kill_requested: AtomicBool,
    /// Marks a pending kill; observed by suspension points, reactive idle
    /// and the checks between phases and loop iterations
    pub(crate) kill: CancellationToken,
    /// Fired by a suspension point that observed the pending kill; the
    /// driver then drops the running phase
    pub(crate) parked: CancellationToken,
    /// Cancels teardown; only a self-kill during `on_end` fires it
    pub(crate) abort_end: CancellationToken,
    pub(crate) mailbox: Arc<Mailbox>,
    pub(crate) steps: mpsc::UnboundedSender<StepRequest>,
    pub(crate) launch_parts: Mutex<Option<LaunchParts>>,
}

impl AgentCell {
    pub(crate) fn new(agent: Box<dyn Agent>) -> Arc<Self> {
        let id = AgentId::next();
        let name = agent.name().unwrap_or_else(|| id.to_string());
        let reactive = !agent.has_live();
        let (lifecycle, _) = watch::channel(Lifecycle {
            state: AgentState::NotLaunched,
            activation: None,
        });
        let (steps, step_rx) = mpsc::unbounded_channel();

        Arc::new(Self {
            id,
            name,
            created_at: Utc::now(),
            reactive,
            lifecycle,
            kill_requested: AtomicBool::new(false),
            kill: CancellationToken::new(),
            parked: CancellationToken::new(),
            abort_end: CancellationToken::new(),
            mailbox: Arc::new(Mailbox::new()),
            steps,
            launch_parts: Mutex::new(Some(LaunchParts {
                agent,
                steps: step_rx,
            })),
        })
    }

    pub(crate) fn state(&self) -> AgentState {
        self.lifecycle.borrow().state
    }

    pub(crate) fn set_state(&self, state: AgentState) {
        self.lifecycle.send_modify(|lifecycle| lifecycle.state = state);
    }

    /// Resolves when the phase currently running must stop
    pub(crate) async fn interrupted(&self) {
        if self.state() == AgentState::Ending {
            self.abort_end.cancelled().await
        } else {
            self.kill.cancelled().await
        }
    }

    /// Stop the running phase at the caller's suspension point
    pub(crate) fn park(&self) {
        self.parked.cancel();
    }

    pub(crate) async fn terminated(&self) {
        let mut rx = self.lifecycle.subscribe();
        let _ = rx.wait_for(|lifecycle| lifecycle.state.is_terminated()).await;
    }
}

/// Cloneable handle to an agent
///
/// Handles stay usable after the agent terminated; they only report state.
#[derive(Clone)]
pub struct AgentRef {
    cell: Arc<AgentCell>,
}

impl AgentRef {
    pub(crate) fn from_cell(cell: Arc<AgentCell>) -> Self {
        Self { cell }
    }

    pub(crate) fn cell(&self) -> &Arc<AgentCell> {
        &self.cell
    }

    pub fn id(&self) -> AgentId {
        self.cell.id
    }

    pub fn name(&self) -> &str {
        &self.cell.name
    }

    pub fn created_at(&self) -> DateTime<Utc> {
        self.cell.created_at
    }

    pub fn state(&self) -> AgentState {
        self.cell.state()
    }

    /// True while the agent is in an active state
    pub fn is_alive(&self) -> bool {
        self.state().is_active()
    }

    /// Whether the agent accepts activator steps
    pub fn is_reactive(&self) -> bool {
        self.cell.reactive
    }

    /// Number of messages waiting in the agent's mailbox
    pub fn pending_messages(&self) -> usize {
        self.cell.mailbox.len()
    }

    /// Wait until the agent reaches `Terminated`
    pub async fn terminated(&self) {
        self.cell.terminated().await
    }
}

impl fmt::Debug for AgentRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AgentRef")
            .field("id", &self.cell.id)
            .field("name", &self.cell.name)
            .field("state", &self.state())
            .finish()
    }
}

impl PartialEq for AgentRef {
    fn eq(&self, other: &Self) -> bool {
        self.cell.id == other.cell.id
    }
}

impl Eq for AgentRef {}

impl Hash for AgentRef {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.cell.id.hash(state);
    }
}

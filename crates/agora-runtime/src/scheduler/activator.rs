//! Activators: run one behavior on every holder of a role

use crate::runtime_core::{Kernel, StepOutcome, StepRequest};
use crate::types::AgentId;
use std::sync::Arc;
use tokio::sync::oneshot;

/// What one activator pass did
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ActivationReport {
    /// Steps that completed
    pub stepped: usize,
    /// Holders that terminated meanwhile or run their own loop
    pub skipped: usize,
    /// Steps that faulted; the agent crashed
    pub faulted: usize,
}

impl ActivationReport {
    pub(crate) fn merge(&mut self, other: ActivationReport) {
        self.stepped += other.stepped;
        self.skipped += other.skipped;
        self.faulted += other.faulted;
    }
}

/// Targets one (community, group, role) with one behavior name
#[derive(Debug, Clone)]
pub struct Activator {
    community: String,
    group: String,
    role: String,
    behavior: Arc<str>,
}

impl Activator {
    pub fn new(
        community: impl Into<String>,
        group: impl Into<String>,
        role: impl Into<String>,
        behavior: impl AsRef<str>,
    ) -> Self {
        Self {
            community: community.into(),
            group: group.into(),
            role: role.into(),
            behavior: Arc::from(behavior.as_ref()),
        }
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

    pub fn behavior(&self) -> &str {
        &self.behavior
    }

    /// Current holders of the targeted role, in registration order
    pub fn members(&self, kernel: &Kernel) -> Vec<AgentId> {
        kernel
            .organization()
            .role_members(&self.community, &self.group, &self.role)
    }

    /// Step every current holder once, sequentially
    pub async fn execute(&self, kernel: &Kernel) -> ActivationReport {
        let mut report = ActivationReport::default();

        for id in self.members(kernel) {
            let Some(agent) = kernel.agent(id) else {
                report.skipped += 1;
                continue;
            };
            if !agent.is_reactive() {
                tracing::debug!(agent = %id, behavior = %self.behavior, "Agent runs its own loop; step skipped");
                report.skipped += 1;
                continue;
            }

            let (done, outcome) = oneshot::channel();
            let request = StepRequest {
                behavior: Arc::clone(&self.behavior),
                done,
            };
            if agent.cell().steps.send(request).is_err() {
                report.skipped += 1;
                continue;
            }

            match outcome.await {
                Ok(StepOutcome::Completed) => report.stepped += 1,
                Ok(StepOutcome::Faulted) => report.faulted += 1,
                // Killed before or during the step
                Err(_) => report.skipped += 1,
            }
        }

        tracing::trace!(
            community = %self.community,
            group = %self.group,
            role = %self.role,
            behavior = %self.behavior,
            stepped = report.stepped,
            "Activator executed"
        );
        report
    }
}

//! Scheduler - ordered activators driven by a simulation clock

mod activator;

pub use activator::{ActivationReport, Activator};

use crate::runtime_core::Kernel;
use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{watch, RwLock};

/// Run state of a scheduler
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SchedulerState {
    Running,
    Paused,
    Shutdown,
}

/// Runs its activators in order, once per tick
///
/// The run state can be changed from any task while [`run`](Scheduler::run)
/// is in progress; a paused scheduler waits before its next tick.
pub struct Scheduler {
    kernel: Kernel,
    activators: RwLock<Vec<Arc<Activator>>>,
    ticks: AtomicU64,
    state: watch::Sender<SchedulerState>,
}

impl Scheduler {
    pub fn new(kernel: Kernel) -> Self {
        let (state, _) = watch::channel(SchedulerState::Running);
        Self {
            kernel,
            activators: RwLock::new(Vec::new()),
            ticks: AtomicU64::new(0),
            state,
        }
    }

    /// Append an activator; activators run in insertion order
    pub async fn add_activator(&self, activator: Activator) -> Arc<Activator> {
        let activator = Arc::new(activator);
        self.activators.write().await.push(Arc::clone(&activator));
        tracing::debug!(
            community = activator.community(),
            group = activator.group(),
            role = activator.role(),
            behavior = activator.behavior(),
            "Activator added"
        );
        activator
    }

    pub async fn remove_activator(&self, activator: &Arc<Activator>) -> bool {
        let mut activators = self.activators.write().await;
        let before = activators.len();
        activators.retain(|a| !Arc::ptr_eq(a, activator));
        activators.len() != before
    }

    pub async fn activators(&self) -> Vec<Arc<Activator>> {
        self.activators.read().await.clone()
    }

    /// Run every activator once and advance the clock by one tick
    pub async fn step(&self) -> ActivationReport {
        let activators = self.activators().await;
        let mut report = ActivationReport::default();
        for activator in &activators {
            report.merge(activator.execute(&self.kernel).await);
        }
        let tick = self.ticks.fetch_add(1, Ordering::AcqRel) + 1;
        tracing::trace!(tick, stepped = report.stepped, "Scheduler tick");
        report
    }

    /// Repeat [`step`](Scheduler::step) `ticks` times, or until shut down
    /// when `ticks` is `None`, sleeping `delay` between ticks
    pub async fn run(&self, ticks: Option<u64>, delay: Duration) -> ActivationReport {
        let mut report = ActivationReport::default();
        let mut remaining = ticks;
        let mut state = self.state.subscribe();

        while remaining != Some(0) {
            let Ok(current) = state
                .wait_for(|s| *s != SchedulerState::Paused)
                .await
                .map(|s| *s)
            else {
                break;
            };
            if current == SchedulerState::Shutdown {
                break;
            }

            report.merge(self.step().await);
            remaining = remaining.map(|n| n - 1);
            if !delay.is_zero() && remaining != Some(0) {
                tokio::time::sleep(delay).await;
            }
        }
        report
    }

    pub fn pause(&self) {
        self.set_state(SchedulerState::Paused);
    }

    pub fn resume(&self) {
        self.set_state(SchedulerState::Running);
    }

    /// Stop `run` before its next tick; a shut down scheduler stays down
    pub fn shutdown(&self) {
        self.set_state(SchedulerState::Shutdown);
    }

    pub fn state(&self) -> SchedulerState {
        *self.state.borrow()
    }

    /// Number of ticks executed so far
    pub fn simulation_time(&self) -> u64 {
        self.ticks.load(Ordering::Acquire)
    }

    fn set_state(&self, next: SchedulerState) {
        self.state.send_if_modified(|state| {
            if *state == SchedulerState::Shutdown || *state == next {
                return false;
            }
            tracing::debug!(from = ?*state, to = ?next, "Scheduler state changed");
            *state = next;
            true
        });
    }
}

//! Launch, kill and the per-agent task driver

use super::context::AgentContext;
use super::handle::{Activation, AgentCell, AgentRef, LaunchParts, Lifecycle, StepOutcome, StepRequest};
use super::kernel::Kernel;
use crate::agent::{Agent, LiveStep};
use crate::telemetry::AGENT_TARGET;
use crate::types::{AgentId, AgentResult, AgentState, ReturnCode};
use futures::FutureExt;
use std::any::Any;
use std::future::Future;
use std::panic::AssertUnwindSafe;
use std::sync::atomic::Ordering;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, watch};
use tracing::Instrument;

/// Launch `target` and wait for its activation
pub(crate) async fn launch(kernel: &Kernel, target: &AgentRef, timeout: Option<Duration>) -> ReturnCode {
    let cell = target.cell();
    if kernel.is_shutting_down() {
        tracing::debug!(agent = %cell.id, "Launch ignored: kernel is shutting down");
        return ReturnCode::Ignored;
    }

    let won = cell.lifecycle.send_if_modified(|lifecycle| {
        if lifecycle.state == AgentState::NotLaunched {
            lifecycle.state = AgentState::Initializing;
            true
        } else {
            false
        }
    });
    if !won {
        return ReturnCode::AlreadyLaunched;
    }
    let Some(parts) = cell.launch_parts.lock().take() else {
        return ReturnCode::AlreadyLaunched;
    };

    kernel.agents().insert(Arc::clone(cell));
    kernel.organization().register_mailbox(cell.id, Arc::clone(&cell.mailbox));
    kernel.telemetry().agent_launched(cell.id);

    let mut activation = cell.lifecycle.subscribe();
    cell.set_state(AgentState::Activating);

    let span = tracing::info_span!(target: AGENT_TARGET, "agent", id = %cell.id, name = %cell.name);
    tokio::spawn(drive(kernel.clone(), Arc::clone(cell), parts).instrument(span));

    match wait_until(&mut activation, timeout, |l| l.activation.is_some()).await {
        Some(Lifecycle {
            activation: Some(Activation::Completed),
            ..
        }) => ReturnCode::Success,
        Some(_) => ReturnCode::AgentCrash,
        None => ReturnCode::TimeOut,
    }
}

/// Request termination of `target` on behalf of `caller`
pub(crate) async fn kill(
    kernel: &Kernel,
    caller: Option<AgentId>,
    target: &AgentRef,
    timeout: Option<Duration>,
) -> ReturnCode {
    let cell = target.cell();
    let own = caller == Some(cell.id);

    match cell.state() {
        AgentState::NotLaunched => return ReturnCode::NotYetLaunched,
        AgentState::Terminated => return ReturnCode::AlreadyKilled,
        AgentState::Ending => {
            if !own {
                return ReturnCode::AlreadyKilled;
            }
            tracing::debug!(agent = %cell.id, "Self-kill during teardown");
            cell.abort_end.cancel();
        }
        _ => {
            if !cell.kill_requested.swap(true, Ordering::AcqRel) {
                tracing::debug!(agent = %cell.id, killer = ?caller, "Kill accepted");
                kernel.telemetry().agent_killed(cell.id);
                cell.kill.cancel();
            } else if !own {
                return ReturnCode::AlreadyKilled;
            }
            if own {
                cell.park();
            }
        }
    }

    if own {
        // Inside a phase this future is dropped by the driver before it
        // completes.
        cell.terminated().await;
        return ReturnCode::Success;
    }

    let mut rx = cell.lifecycle.subscribe();
    match wait_until(&mut rx, timeout, |l| l.state.is_terminated()).await {
        Some(_) => ReturnCode::Success,
        None => ReturnCode::TimeOut,
    }
}

/// Wait for a lifecycle condition; `None` when the timeout elapsed first
async fn wait_until<F>(
    rx: &mut watch::Receiver<Lifecycle>,
    timeout: Option<Duration>,
    condition: F,
) -> Option<Lifecycle>
where
    F: FnMut(&Lifecycle) -> bool,
{
    let wait = async move { rx.wait_for(condition).await.ok().map(|lifecycle| *lifecycle) };
    match timeout {
        None => wait.await,
        Some(limit) => tokio::time::timeout(limit, wait).await.ok().flatten(),
    }
}

// ═══════════════════════════════════════════════════════════════════
// AGENT TASK
// ═══════════════════════════════════════════════════════════════════

enum Phase {
    Completed,
    Killed,
    Faulted(String),
}

async fn drive(kernel: Kernel, cell: Arc<AgentCell>, parts: LaunchParts) {
    let LaunchParts { mut agent, steps } = parts;
    let ctx = AgentContext::new(kernel.clone(), Arc::clone(&cell));

    tracing::debug!(target: AGENT_TARGET, "Activating");
    let activation = if cell.kill.is_cancelled() {
        Phase::Killed
    } else {
        tokio::select! {
            biased;
            _ = cell.parked.cancelled() => Phase::Killed,
            outcome = guarded(agent.on_activate(&ctx)) => match outcome {
                // A kill that arrived during non-suspending work lands here
                Ok(()) if cell.kill.is_cancelled() => Phase::Killed,
                Ok(()) => Phase::Completed,
                Err(reason) => Phase::Faulted(reason),
            },
        }
    };

    match activation {
        Phase::Completed => {
            cell.lifecycle.send_modify(|lifecycle| {
                lifecycle.state = AgentState::Living;
                lifecycle.activation = Some(Activation::Completed);
            });
            let outcome = if cell.reactive {
                idle(&cell, &ctx, agent.as_mut(), steps).await
            } else {
                live(&cell, &ctx, agent.as_mut()).await
            };
            if let Err(reason) = outcome {
                return crash(&kernel, &cell, "live", reason).await;
            }
        }
        Phase::Killed => {
            tracing::debug!(target: AGENT_TARGET, "Activation aborted by kill");
            cell.lifecycle
                .send_modify(|lifecycle| lifecycle.activation = Some(Activation::Aborted));
        }
        Phase::Faulted(reason) => return crash(&kernel, &cell, "activation", reason).await,
    }

    teardown(&cell, &ctx, agent.as_mut()).await;
    terminate(&kernel, &cell);
}

async fn live(cell: &AgentCell, ctx: &AgentContext, agent: &mut dyn Agent) -> Result<(), String> {
    loop {
        if cell.kill.is_cancelled() {
            return Ok(());
        }
        let step = tokio::select! {
            biased;
            _ = cell.parked.cancelled() => return Ok(()),
            step = guarded(agent.on_live(ctx)) => step?,
        };
        if step == LiveStep::Done {
            tracing::debug!(target: AGENT_TARGET, "Live loop finished");
            return Ok(());
        }
        tokio::task::yield_now().await;
    }
}

async fn idle(
    cell: &AgentCell,
    ctx: &AgentContext,
    agent: &mut dyn Agent,
    mut steps: mpsc::UnboundedReceiver<StepRequest>,
) -> Result<(), String> {
    loop {
        let request = tokio::select! {
            biased;
            _ = cell.kill.cancelled() => return Ok(()),
            request = steps.recv() => match request {
                Some(request) => request,
                None => {
                    cell.kill.cancelled().await;
                    return Ok(());
                }
            },
        };

        let outcome = tokio::select! {
            biased;
            _ = cell.parked.cancelled() => return Ok(()),
            outcome = guarded(agent.on_step(ctx, &request.behavior)) => outcome,
        };
        match outcome {
            Ok(()) => {
                let _ = request.done.send(StepOutcome::Completed);
            }
            Err(reason) => {
                let _ = request.done.send(StepOutcome::Faulted);
                return Err(reason);
            }
        }
    }
}

async fn teardown(cell: &AgentCell, ctx: &AgentContext, agent: &mut dyn Agent) {
    cell.set_state(AgentState::Ending);
    tracing::debug!(target: AGENT_TARGET, "Ending");

    tokio::select! {
        biased;
        _ = cell.abort_end.cancelled() => {
            tracing::debug!(target: AGENT_TARGET, "Teardown cut short");
        }
        outcome = guarded(agent.on_end(ctx)) => {
            if let Err(reason) = outcome {
                tracing::warn!(target: AGENT_TARGET, %reason, "Fault during teardown");
            }
        }
    }
}

/// Terminate a faulted agent through `Ending`, without running `on_end`
async fn crash(kernel: &Kernel, cell: &AgentCell, phase: &'static str, reason: String) {
    tracing::warn!(target: AGENT_TARGET, phase, %reason, "Agent crashed");
    kernel.telemetry().agent_crashed(cell.id);
    cell.set_state(AgentState::Ending);
    // Watchers get a chance to observe Ending
    tokio::task::yield_now().await;
    terminate(kernel, cell);
}

/// Release everything the agent holds and publish `Terminated`
fn terminate(kernel: &Kernel, cell: &AgentCell) {
    cell.kill_requested.store(true, Ordering::Release);
    cell.mailbox.close();
    kernel.organization().deregister(cell.id);
    kernel.agents().remove(cell.id);
    cell.lifecycle.send_modify(|lifecycle| {
        lifecycle.state = AgentState::Terminated;
        lifecycle.activation.get_or_insert(Activation::Aborted);
    });
    kernel.telemetry().agent_terminated(cell.id);
    tracing::debug!(target: AGENT_TARGET, "Terminated");
}

/// Run an agent callback, turning errors and panics into a fault reason
async fn guarded<T, F>(callback: F) -> Result<T, String>
where
    F: Future<Output = AgentResult<T>>,
{
    match AssertUnwindSafe(callback).catch_unwind().await {
        Ok(Ok(value)) => Ok(value),
        Ok(Err(error)) => Err(format!("{error:#}")),
        Err(panic) => Err(panic_message(panic.as_ref())),
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(message) = payload.downcast_ref::<&str>() {
        format!("panicked: {message}")
    } else if let Some(message) = payload.downcast_ref::<String>() {
        format!("panicked: {message}")
    } else {
        "panicked".to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;

    struct Refuser;

    #[async_trait]
    impl Agent for Refuser {
        async fn on_activate(&mut self, _ctx: &AgentContext) -> AgentResult {
            anyhow::bail!("refusing to activate")
        }
    }

    #[tokio::test]
    async fn test_crash_passes_through_ending() {
        let kernel = Kernel::default();
        let agent = kernel.create_agent(Refuser);
        let mut rx = agent.cell().lifecycle.subscribe();

        let watcher = tokio::spawn(async move {
            let mut seen = Vec::new();
            while rx.changed().await.is_ok() {
                let state = rx.borrow_and_update().state;
                seen.push(state);
                if state.is_terminated() {
                    break;
                }
            }
            seen
        });

        assert_eq!(launch(&kernel, &agent, None).await, ReturnCode::AgentCrash);
        let seen = tokio::time::timeout(Duration::from_secs(2), watcher)
            .await
            .unwrap()
            .unwrap();
        assert!(seen.contains(&AgentState::Ending), "saw {seen:?}");
        assert_eq!(seen.last(), Some(&AgentState::Terminated));
    }

    #[test]
    fn test_panic_message() {
        let payload: Box<dyn Any + Send> = Box::new("boom");
        assert_eq!(panic_message(payload.as_ref()), "panicked: boom");
        let payload: Box<dyn Any + Send> = Box::new(String::from("bang"));
        assert_eq!(panic_message(payload.as_ref()), "panicked: bang");
        let payload: Box<dyn Any + Send> = Box::new(7_u32);
        assert_eq!(panic_message(payload.as_ref()), "panicked");
    }

    #[tokio::test]
    async fn test_guarded_catches_errors_and_panics() {
        let ok = guarded(async { Ok::<_, anyhow::Error>(5) }).await;
        assert_eq!(ok, Ok(5));

        let err = guarded(async { Err::<(), _>(anyhow::anyhow!("bad input")) }).await;
        assert_eq!(err, Err("bad input".to_string()));

        let panicked = guarded(async {
            if true {
                panic!("exploded");
            }
            Ok::<(), anyhow::Error>(())
        })
        .await;
        assert_eq!(panicked, Err("panicked: exploded".to_string()));
    }
}

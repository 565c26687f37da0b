//! Activators and the ticking scheduler

use agora_runtime::{
    ActivationReport, Activator, Agent, AgentContext, AgentId, AgentResult, AgentState, Kernel, LiveStep,
    ReturnCode, Scheduler, SchedulerState,
};
use async_trait::async_trait;
use std::sync::{Arc, Mutex};
use std::time::Duration;

const COMMUNITY: &str = "sim";
const GROUP: &str = "world";

type StepLog = Arc<Mutex<Vec<(AgentId, String)>>>;

struct Stepper {
    role: &'static str,
    log: StepLog,
}

#[async_trait]
impl Agent for Stepper {
    async fn on_activate(&mut self, ctx: &AgentContext) -> AgentResult {
        let _ = ctx.create_group_if_absent(COMMUNITY, GROUP);
        match ctx.request_role(COMMUNITY, GROUP, self.role) {
            ReturnCode::Success => Ok(()),
            code => anyhow::bail!("request_role failed: {code}"),
        }
    }

    async fn on_step(&mut self, ctx: &AgentContext, behavior: &str) -> AgentResult {
        match behavior {
            "explode" => anyhow::bail!("exploded on request"),
            "tick" | "tock" => {
                self.log.lock().unwrap().push((ctx.id(), behavior.to_string()));
                Ok(())
            }
            other => anyhow::bail!("no behavior named {other}"),
        }
    }
}

/// Runs its own loop while holding a role
struct Looper;

#[async_trait]
impl Agent for Looper {
    fn has_live(&self) -> bool {
        true
    }

    async fn on_activate(&mut self, ctx: &AgentContext) -> AgentResult {
        let _ = ctx.create_group_if_absent(COMMUNITY, GROUP);
        let _ = ctx.request_role(COMMUNITY, GROUP, "worker");
        Ok(())
    }

    async fn on_live(&mut self, ctx: &AgentContext) -> AgentResult<LiveStep> {
        ctx.pause(Duration::from_millis(1)).await;
        Ok(LiveStep::Continue)
    }
}

async fn populate(kernel: &Kernel, role: &'static str, count: usize, log: &StepLog) -> Vec<AgentId> {
    let mut ids = Vec::with_capacity(count);
    for _ in 0..count {
        let (agent, code) = kernel
            .launch_agent(
                Stepper {
                    role,
                    log: log.clone(),
                },
                None,
            )
            .await;
        assert_eq!(code, ReturnCode::Success);
        ids.push(agent.id());
    }
    ids
}

fn logged(log: &StepLog) -> Vec<(AgentId, String)> {
    log.lock().unwrap().clone()
}

#[tokio::test]
async fn test_activator_steps_in_registration_order() {
    let kernel = Kernel::default();
    let log = StepLog::default();
    let ids = populate(&kernel, "worker", 5, &log).await;

    let activator = Activator::new(COMMUNITY, GROUP, "worker", "tick");
    assert_eq!(activator.members(&kernel), ids);

    let report = activator.execute(&kernel).await;
    assert_eq!(
        report,
        ActivationReport {
            stepped: 5,
            skipped: 0,
            faulted: 0
        }
    );
    let order: Vec<_> = logged(&log).into_iter().map(|(id, _)| id).collect();
    assert_eq!(order, ids);
}

#[tokio::test]
async fn test_activator_on_missing_role_is_empty() {
    let kernel = Kernel::default();
    let activator = Activator::new(COMMUNITY, GROUP, "ghost", "tick");
    assert!(activator.members(&kernel).is_empty());
    assert_eq!(activator.execute(&kernel).await, ActivationReport::default());
}

#[tokio::test]
async fn test_activator_skips_looping_agents() {
    let kernel = Kernel::default();
    let log = StepLog::default();
    populate(&kernel, "worker", 2, &log).await;
    let (looper, code) = kernel.launch_agent(Looper, None).await;
    assert_eq!(code, ReturnCode::Success);
    assert!(!looper.is_reactive());

    let report = Activator::new(COMMUNITY, GROUP, "worker", "tick").execute(&kernel).await;
    assert_eq!(report.stepped, 2);
    assert_eq!(report.skipped, 1);
    assert_eq!(looper.state(), AgentState::Living);
}

#[tokio::test]
async fn test_step_fault_crashes_only_that_agent() {
    let kernel = Kernel::default();
    let log = StepLog::default();
    let workers = populate(&kernel, "worker", 3, &log).await;
    let bombs = populate(&kernel, "bomb", 1, &log).await;

    let report = Activator::new(COMMUNITY, GROUP, "bomb", "explode").execute(&kernel).await;
    assert_eq!(report.faulted, 1);

    let bomb = kernel.agent(bombs[0]);
    if let Some(bomb) = bomb {
        tokio::time::timeout(Duration::from_secs(2), bomb.terminated()).await.unwrap();
    }
    assert!(kernel.agent(bombs[0]).is_none());
    assert!(!kernel.organization().is_role(COMMUNITY, GROUP, "bomb"));
    assert_eq!(kernel.telemetry().snapshot().crashed, 1);

    let report = Activator::new(COMMUNITY, GROUP, "worker", "tick").execute(&kernel).await;
    assert_eq!(report.stepped, 3);
    for id in workers {
        assert_eq!(kernel.agent_state(id), Some(AgentState::Living));
    }
}

#[tokio::test]
async fn test_unknown_behavior_faults() {
    let kernel = Kernel::default();
    let log = StepLog::default();
    populate(&kernel, "worker", 1, &log).await;

    let report = Activator::new(COMMUNITY, GROUP, "worker", "dance").execute(&kernel).await;
    assert_eq!(report.faulted, 1);
    assert!(logged(&log).is_empty());
}

#[tokio::test]
async fn test_scheduler_runs_activators_in_order() {
    let kernel = Kernel::default();
    let log = StepLog::default();
    let ids = populate(&kernel, "worker", 2, &log).await;

    let scheduler = Scheduler::new(kernel.clone());
    scheduler.add_activator(Activator::new(COMMUNITY, GROUP, "worker", "tick")).await;
    scheduler.add_activator(Activator::new(COMMUNITY, GROUP, "worker", "tock")).await;
    assert_eq!(scheduler.simulation_time(), 0);

    let report = scheduler.step().await;
    assert_eq!(report.stepped, 4);
    assert_eq!(scheduler.simulation_time(), 1);
    assert_eq!(
        logged(&log),
        vec![
            (ids[0], "tick".to_string()),
            (ids[1], "tick".to_string()),
            (ids[0], "tock".to_string()),
            (ids[1], "tock".to_string()),
        ]
    );

    let report = scheduler.run(Some(3), Duration::ZERO).await;
    assert_eq!(report.stepped, 12);
    assert_eq!(scheduler.simulation_time(), 4);
}

#[tokio::test]
async fn test_remove_activator() {
    let kernel = Kernel::default();
    let log = StepLog::default();
    populate(&kernel, "worker", 1, &log).await;

    let scheduler = Scheduler::new(kernel.clone());
    let tick = scheduler.add_activator(Activator::new(COMMUNITY, GROUP, "worker", "tick")).await;
    assert_eq!(scheduler.activators().await.len(), 1);
    assert!(scheduler.remove_activator(&tick).await);
    assert!(!scheduler.remove_activator(&tick).await);

    assert_eq!(scheduler.step().await, ActivationReport::default());
    assert_eq!(scheduler.simulation_time(), 1);
}

#[tokio::test]
async fn test_pause_resume_shutdown() {
    let kernel = Kernel::default();
    let log = StepLog::default();
    populate(&kernel, "worker", 1, &log).await;

    let scheduler = Arc::new(Scheduler::new(kernel.clone()));
    scheduler.add_activator(Activator::new(COMMUNITY, GROUP, "worker", "tick")).await;

    let runner = {
        let scheduler = Arc::clone(&scheduler);
        tokio::spawn(async move { scheduler.run(None, Duration::from_millis(2)).await })
    };

    tokio::time::sleep(Duration::from_millis(30)).await;
    scheduler.pause();
    assert_eq!(scheduler.state(), SchedulerState::Paused);
    tokio::time::sleep(Duration::from_millis(20)).await;
    let paused_at = scheduler.simulation_time();
    assert!(paused_at > 0);
    tokio::time::sleep(Duration::from_millis(50)).await;
    assert_eq!(scheduler.simulation_time(), paused_at);

    scheduler.resume();
    tokio::time::timeout(Duration::from_secs(2), async {
        while scheduler.simulation_time() <= paused_at {
            tokio::time::sleep(Duration::from_millis(1)).await;
        }
    })
    .await
    .unwrap();

    scheduler.shutdown();
    let report = tokio::time::timeout(Duration::from_secs(2), runner).await.unwrap().unwrap();
    assert_eq!(report.stepped as u64, scheduler.simulation_time());

    scheduler.resume();
    assert_eq!(scheduler.state(), SchedulerState::Shutdown);
    assert_eq!(scheduler.run(Some(5), Duration::ZERO).await, ActivationReport::default());
}

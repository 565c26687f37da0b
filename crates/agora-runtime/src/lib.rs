//! # Agora Agent Runtime
//!
//! A kernel for organizations of concurrent agents.
//!
//! ## Overview
//!
//! Every agent runs as its own tokio task and goes through a fixed
//! lifecycle: activation, an optional persistent loop, and teardown. Agents
//! find each other through an organization directory of communities,
//! groups and roles, and talk through mailboxes using role-scoped
//! addresses.
//!
//! ## Key Features
//!
//! - **Bounded lifecycle control**: `launch` and `kill` take a timeout and
//!   report the outcome as a [`ReturnCode`]; a kill takes effect at the
//!   target's next suspension point.
//! - **Fault isolation**: errors and panics in agent code terminate only
//!   that agent.
//! - **Role-scoped addressing**: an [`AgentAddress`] is valid exactly as
//!   long as the role grant it was minted for.
//! - **Activators**: run a named behavior on every holder of a role, in
//!   registration order, under a ticking [`Scheduler`].
//!
//! ## Architecture
//!
//! ```text
//!            Kernel ─────────────── Organization
//!      launch │ kill            community / group / role
//!             ▼                         │
//!   ┌──── agent task ────┐              │ AgentAddress
//!   │ on_activate        │              ▼
//!   │ on_live | on_step  │◄──────── Mailbox
//!   │ on_end             │
//!   └────────────────────┘
//! ```
//!
//! ## Quick Start
//!
//! ```no_run
//! use agora_runtime::{Agent, AgentContext, AgentResult, Kernel, Message};
//! use async_trait::async_trait;
//! use std::time::Duration;
//!
//! struct Greeter;
//!
//! #[async_trait]
//! impl Agent for Greeter {
//!     async fn on_activate(&mut self, ctx: &AgentContext) -> AgentResult {
//!         let _ = ctx.create_group_if_absent("town", "square");
//!         let _ = ctx.request_role("town", "square", "greeter");
//!         if let Some(other) = ctx.get_agent_with_role("town", "square", "greeter") {
//!             let _ = ctx.send_message(&other, Message::text("hello"));
//!         }
//!         Ok(())
//!     }
//! }
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let kernel = Kernel::default();
//!     let (greeter, code) = kernel.launch_agent(Greeter, Some(Duration::from_secs(1))).await;
//!     assert!(code.is_success());
//!
//!     let _ = kernel.kill(&greeter, None).await;
//!     kernel.shutdown().await?;
//!     Ok(())
//! }
//! ```

#![cfg_attr(feature = "strict-docs", warn(missing_docs))]

pub mod agent;
pub mod config;
pub mod messaging;
pub mod organization;
pub mod runtime_core;
pub mod scheduler;
pub mod telemetry;
pub mod types;

// Re-export main types
pub use agent::{Agent, LiveStep};
pub use crate::config::{KernelConfig, LaunchSpec, LifecycleConfig, LoggingConfig};
pub use messaging::{Mailbox, Message};
pub use organization::{AgentAddress, Organization, CANDIDATE_ROLE, MANAGER_ROLE};
pub use runtime_core::{AgentContext, AgentFactory, AgentFactoryRegistry, AgentRef, Kernel};
pub use scheduler::{ActivationReport, Activator, Scheduler, SchedulerState};
pub use telemetry::{KernelTelemetry, TelemetrySnapshot};
pub use types::*;

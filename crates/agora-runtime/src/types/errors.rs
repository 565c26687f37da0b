//! Error types for the Agora runtime

use crate::config::ConfigError;
use thiserror::Error;

/// Kernel-level failures
///
/// Only conditions that are genuinely errors live here. Ordinary operation
/// outcomes are reported through [`ReturnCode`](super::ReturnCode).
#[derive(Debug, Error)]
pub enum KernelError {
    #[error("No launchable agent registered under `{0}`")]
    UnknownAgent(String),

    #[error("Kernel is shutting down")]
    ShuttingDown,

    #[error("{0} agent(s) still terminating after the shutdown timeout")]
    ShutdownTimeout(usize),

    #[error("Invalid log filter: {0}")]
    LogFilter(String),

    #[error(transparent)]
    Config(#[from] ConfigError),
}

/// Result alias for kernel operations
pub type KernelResult<T> = Result<T, KernelError>;

/// Result type of agent callbacks
///
/// Agent code returns `anyhow` errors so authors can use `?` freely; an
/// `Err` is treated as a fault of the running phase.
pub type AgentResult<T = ()> = anyhow::Result<T>;

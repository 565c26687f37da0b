//! Telemetry and logging for the Agora kernel

use crate::config::LoggingConfig;
use crate::types::{AgentId, KernelError, ReturnCode};
use serde::Serialize;
use std::sync::atomic::{AtomicU64, Ordering};
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::EnvFilter;

/// Tracing target for diagnostics emitted on behalf of agents
pub const AGENT_TARGET: &str = "agora::agent";

/// Install the global tracing subscriber
///
/// `RUST_LOG` wins when set; otherwise the filter is built from the kernel
/// and agent log levels. Calling this again once a subscriber is installed
/// is a no-op.
pub fn init_tracing(config: &LoggingConfig) -> Result<(), KernelError> {
    let filter = match EnvFilter::try_from_default_env() {
        Ok(filter) => filter,
        Err(_) => EnvFilter::try_new(filter_directives(config))
            .map_err(|e| KernelError::LogFilter(e.to_string()))?,
    };

    let installed = if config.json {
        tracing_subscriber::registry()
            .with(filter)
            .with(tracing_subscriber::fmt::layer().json())
            .try_init()
    } else {
        tracing_subscriber::registry()
            .with(filter)
            .with(tracing_subscriber::fmt::layer())
            .try_init()
    };
    if installed.is_err() {
        tracing::debug!("Tracing subscriber already installed");
    }
    Ok(())
}

fn filter_directives(config: &LoggingConfig) -> String {
    format!(
        "{},{}={}",
        config.kernel_log_level, AGENT_TARGET, config.agent_log_level
    )
}

/// Kernel telemetry
///
/// Counters are kept locally for [`snapshot`](KernelTelemetry::snapshot)
/// and forwarded to the `metrics` facade for whatever recorder the host
/// process installs.
#[derive(Debug, Default)]
pub struct KernelTelemetry {
    launched: AtomicU64,
    killed: AtomicU64,
    crashed: AtomicU64,
    terminated: AtomicU64,
    delivered: AtomicU64,
    rejected: AtomicU64,
}

impl KernelTelemetry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record an agent launch
    pub fn agent_launched(&self, agent: AgentId) {
        tracing::debug!(agent = %agent, "Agent launched");
        self.launched.fetch_add(1, Ordering::Relaxed);
        metrics::counter!("agora_agents_launched_total").increment(1);
        metrics::gauge!("agora_agents_live").increment(1.0);
    }

    /// Record an accepted kill request
    pub fn agent_killed(&self, agent: AgentId) {
        tracing::debug!(agent = %agent, "Agent kill requested");
        self.killed.fetch_add(1, Ordering::Relaxed);
        metrics::counter!("agora_agents_killed_total").increment(1);
    }

    /// Record a fault that terminated an agent
    pub fn agent_crashed(&self, agent: AgentId) {
        tracing::debug!(agent = %agent, "Agent crash recorded");
        self.crashed.fetch_add(1, Ordering::Relaxed);
        metrics::counter!("agora_agents_crashed_total").increment(1);
    }

    pub fn agent_terminated(&self, agent: AgentId) {
        tracing::trace!(agent = %agent, "Agent terminated");
        self.terminated.fetch_add(1, Ordering::Relaxed);
        metrics::counter!("agora_agents_terminated_total").increment(1);
        metrics::gauge!("agora_agents_live").decrement(1.0);
    }

    pub fn message_delivered(&self) {
        self.delivered.fetch_add(1, Ordering::Relaxed);
        metrics::counter!("agora_messages_delivered_total").increment(1);
    }

    pub fn message_rejected(&self, code: ReturnCode) {
        self.rejected.fetch_add(1, Ordering::Relaxed);
        metrics::counter!("agora_messages_rejected_total", "code" => code.as_str()).increment(1);
    }

    /// Current counter values
    pub fn snapshot(&self) -> TelemetrySnapshot {
        TelemetrySnapshot {
            launched: self.launched.load(Ordering::Relaxed),
            killed: self.killed.load(Ordering::Relaxed),
            crashed: self.crashed.load(Ordering::Relaxed),
            terminated: self.terminated.load(Ordering::Relaxed),
            messages_delivered: self.delivered.load(Ordering::Relaxed),
            messages_rejected: self.rejected.load(Ordering::Relaxed),
        }
    }

    /// Log the final counters
    pub fn flush(&self) {
        let snapshot = self.snapshot();
        tracing::info!(
            launched = snapshot.launched,
            killed = snapshot.killed,
            crashed = snapshot.crashed,
            terminated = snapshot.terminated,
            delivered = snapshot.messages_delivered,
            rejected = snapshot.messages_rejected,
            "Kernel telemetry"
        );
    }
}

/// Point-in-time copy of the kernel counters
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct TelemetrySnapshot {
    pub launched: u64,
    pub killed: u64,
    pub crashed: u64,
    pub terminated: u64,
    pub messages_delivered: u64,
    pub messages_rejected: u64,
}

impl TelemetrySnapshot {
    /// Launched agents not yet terminated
    pub fn live(&self) -> u64 {
        self.launched.saturating_sub(self.terminated)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_counters() {
        let telemetry = KernelTelemetry::new();
        let agent = AgentId::next();
        telemetry.agent_launched(agent);
        telemetry.agent_killed(agent);
        telemetry.agent_terminated(agent);
        telemetry.message_delivered();
        telemetry.message_rejected(ReturnCode::InvalidAa);

        let snapshot = telemetry.snapshot();
        assert_eq!(snapshot.launched, 1);
        assert_eq!(snapshot.killed, 1);
        assert_eq!(snapshot.crashed, 0);
        assert_eq!(snapshot.live(), 0);
        assert_eq!(snapshot.messages_delivered, 1);
        assert_eq!(snapshot.messages_rejected, 1);
    }

    #[test]
    fn test_filter_directives() {
        let config = LoggingConfig {
            agent_log_level: "trace".to_string(),
            kernel_log_level: "warn".to_string(),
            json: false,
        };
        assert_eq!(filter_directives(&config), "warn,agora::agent=trace");
        assert!(EnvFilter::try_new(filter_directives(&config)).is_ok());
    }
}

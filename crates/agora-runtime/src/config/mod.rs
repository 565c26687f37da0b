//! Configuration for the Agora kernel
//!
//! Values are layered: built-in defaults, then an optional file, then
//! `AGORA__*` environment variables (`AGORA__LOGGING__AGENT_LOG_LEVEL=debug`).

use serde::{Deserialize, Serialize};
use std::time::Duration;
use thiserror::Error;

/// Configuration loading errors
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to load configuration: {0}")]
    Load(#[from] config::ConfigError),

    #[error("Invalid launch entry for `{agent}`: count must be at least 1")]
    InvalidLaunchCount { agent: String },
}

/// Complete kernel configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct KernelConfig {
    #[serde(default)]
    pub logging: LoggingConfig,

    #[serde(default)]
    pub lifecycle: LifecycleConfig,

    /// Agents created at bootstrap, in order
    #[serde(default)]
    pub launch_agents: Vec<LaunchSpec>,
}

impl KernelConfig {
    /// Load configuration from defaults, an optional file and the environment
    pub fn load(path: Option<&str>) -> Result<Self, ConfigError> {
        let mut builder = config::Config::builder();

        // Add default configuration
        builder = builder.add_source(config::Config::try_from(&KernelConfig::default())?);

        // Add file configuration if provided
        if let Some(path) = path {
            builder = builder.add_source(config::File::with_name(path).required(false));
        }

        // Add environment variables
        builder = builder.add_source(
            config::Environment::with_prefix("AGORA")
                .prefix_separator("__")
                .separator("__")
                .try_parsing(true),
        );

        let config: Self = builder.build()?.try_deserialize()?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if let Some(spec) = self.launch_agents.iter().find(|spec| spec.count == 0) {
            return Err(ConfigError::InvalidLaunchCount {
                agent: spec.agent.clone(),
            });
        }
        Ok(())
    }
}

/// Log levels and output format
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// Level for diagnostics emitted by agents (target `agora::agent`)
    #[serde(default = "default_level")]
    pub agent_log_level: String,

    /// Level for everything else
    #[serde(default = "default_level")]
    pub kernel_log_level: String,

    /// Emit JSON lines instead of human-readable output
    #[serde(default)]
    pub json: bool,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            agent_log_level: default_level(),
            kernel_log_level: default_level(),
            json: false,
        }
    }
}

fn default_level() -> String {
    "info".to_string()
}

/// Default timeouts; an absent timeout waits forever
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LifecycleConfig {
    #[serde(default)]
    pub default_launch_timeout_ms: Option<u64>,

    #[serde(default)]
    pub default_kill_timeout_ms: Option<u64>,

    /// Bound on the wait for each agent killed at shutdown
    #[serde(default = "default_shutdown_timeout_ms")]
    pub shutdown_timeout_ms: u64,
}

impl LifecycleConfig {
    pub fn launch_timeout(&self) -> Option<Duration> {
        self.default_launch_timeout_ms.map(Duration::from_millis)
    }

    pub fn kill_timeout(&self) -> Option<Duration> {
        self.default_kill_timeout_ms.map(Duration::from_millis)
    }

    pub fn shutdown_timeout(&self) -> Duration {
        Duration::from_millis(self.shutdown_timeout_ms)
    }
}

impl Default for LifecycleConfig {
    fn default() -> Self {
        Self {
            default_launch_timeout_ms: None,
            default_kill_timeout_ms: None,
            shutdown_timeout_ms: default_shutdown_timeout_ms(),
        }
    }
}

fn default_shutdown_timeout_ms() -> u64 {
    5_000
}

/// One entry of the bootstrap launch list
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LaunchSpec {
    /// Name the agent is registered under
    pub agent: String,

    /// Launch right away, or only create the agent
    #[serde(default = "default_true")]
    pub auto_activate: bool,

    /// Number of instances
    #[serde(default = "default_count")]
    pub count: usize,
}

fn default_true() -> bool {
    true
}

fn default_count() -> usize {
    1
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_defaults() {
        let config = KernelConfig::default();
        assert_eq!(config.logging.agent_log_level, "info");
        assert!(config.launch_agents.is_empty());
        assert_eq!(config.lifecycle.launch_timeout(), None);
        assert_eq!(config.lifecycle.shutdown_timeout(), Duration::from_secs(5));
    }

    #[test]
    fn test_launch_spec_defaults() {
        let spec: LaunchSpec = serde_json::from_str(r#"{ "agent": "pinger" }"#).unwrap();
        assert!(spec.auto_activate);
        assert_eq!(spec.count, 1);
    }

    #[test]
    fn test_load_from_file() {
        let mut file = tempfile::Builder::new().suffix(".toml").tempfile().unwrap();
        writeln!(
            file,
            r#"
[logging]
agent_log_level = "debug"

[lifecycle]
default_launch_timeout_ms = 250

[[launch_agents]]
agent = "pinger"
count = 4

[[launch_agents]]
agent = "ponger"
auto_activate = false
"#
        )
        .unwrap();

        let path = file.path().to_str().unwrap().to_string();
        let config = KernelConfig::load(Some(&path)).unwrap();

        assert_eq!(config.logging.agent_log_level, "debug");
        assert_eq!(config.logging.kernel_log_level, "info");
        assert_eq!(config.lifecycle.launch_timeout(), Some(Duration::from_millis(250)));
        assert_eq!(config.lifecycle.kill_timeout(), None);
        assert_eq!(config.launch_agents.len(), 2);
        assert_eq!(config.launch_agents[0].count, 4);
        assert!(!config.launch_agents[1].auto_activate);
    }

    #[test]
    fn test_load_without_file_uses_defaults() {
        let config = KernelConfig::load(None).unwrap();
        assert_eq!(config.lifecycle.shutdown_timeout_ms, 5_000);
    }

    #[test]
    fn test_zero_count_is_rejected() {
        let config = KernelConfig {
            launch_agents: vec![LaunchSpec {
                agent: "pinger".to_string(),
                auto_activate: true,
                count: 0,
            }],
            ..KernelConfig::default()
        };
        assert!(matches!(
            config.validate(),
            Err(ConfigError::InvalidLaunchCount { agent }) if agent == "pinger"
        ));
    }
}

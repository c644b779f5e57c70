use config::{Config, Environment, File};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::time::Duration;
use thiserror::Error;

/// Shorter intervals overlap with the gateway status timeout.
pub const MIN_HEALTH_CHECK_INTERVAL_MS: u64 = 5_000;

/// Placeholder substituted with the agent name in agent command templates.
pub const AGENT_PLACEHOLDER: &str = "{agent}";

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to load config: {0}")]
    Load(#[from] config::ConfigError),
    #[error("Invalid config: {0}")]
    Invalid(String),
}

// The `config` crate may lowercase keys depending on the source, so every
// camelCase key also accepts its lowercase spelling.
#[derive(Debug, Deserialize, Serialize, Clone)]
#[serde(default, rename_all = "camelCase")]
pub struct WatchdogConfig {
    /// Milliseconds between health check cycles.
    #[serde(alias = "healthcheckinterval")]
    pub health_check_interval: u64,
    /// Milliseconds an agent status or restart command may take.
    #[serde(alias = "responsetimeout")]
    pub response_timeout: u64,
    /// Consecutive failures before a restart is issued.
    #[serde(alias = "maxfailures")]
    pub max_failures: u32,
    /// Minimum milliseconds between two restarts of the same agent.
    #[serde(alias = "restartcooldown")]
    pub restart_cooldown: u64,
    /// Agents to supervise, checked in this order.
    pub agents: Vec<String>,
    #[serde(alias = "statefile")]
    pub state_file: PathBuf,
    #[serde(alias = "logdir")]
    pub log_dir: PathBuf,
    pub commands: CommandsConfig,
}

#[derive(Debug, Deserialize, Serialize, Clone)]
#[serde(default, rename_all = "camelCase")]
pub struct CommandsConfig {
    #[serde(alias = "gatewaystatus")]
    pub gateway_status: String,
    #[serde(alias = "gatewaystart")]
    pub gateway_start: String,
    #[serde(alias = "gatewayrestart")]
    pub gateway_restart: String,
    #[serde(alias = "agentstatus")]
    pub agent_status: String,
    #[serde(alias = "agentrestart")]
    pub agent_restart: String,
    #[serde(alias = "gatewaystatustimeout")]
    pub gateway_status_timeout: u64,
    #[serde(alias = "gatewaystarttimeout")]
    pub gateway_start_timeout: u64,
    #[serde(alias = "gatewayrestarttimeout")]
    pub gateway_restart_timeout: u64,
    #[serde(alias = "settledelay")]
    pub settle_delay: u64,
}

impl Default for WatchdogConfig {
    fn default() -> Self {
        let base = default_base_dir();
        Self {
            health_check_interval: 30_000,
            response_timeout: 60_000,
            max_failures: 3,
            restart_cooldown: 10_000,
            agents: vec!["main".to_string()],
            state_file: base.join("state.json"),
            log_dir: base.join("logs"),
            commands: CommandsConfig::default(),
        }
    }
}

impl Default for CommandsConfig {
    fn default() -> Self {
        Self {
            gateway_status: "openclaw gateway status".to_string(),
            gateway_start: "openclaw gateway start".to_string(),
            gateway_restart: "openclaw gateway restart".to_string(),
            agent_status: "openclaw agent --agent {agent} --message ping".to_string(),
            agent_restart: "openclaw agent restart --agent {agent}".to_string(),
            gateway_status_timeout: 10_000,
            gateway_start_timeout: 30_000,
            gateway_restart_timeout: 60_000,
            settle_delay: 5_000,
        }
    }
}

/// `~/.clawwatch`, falling back to the working directory without `HOME`.
pub fn default_base_dir() -> PathBuf {
    let home = std::env::var("HOME").unwrap_or_else(|_| ".".to_string());
    PathBuf::from(home).join(".clawwatch")
}

pub fn default_config_path() -> PathBuf {
    default_base_dir().join("config.json")
}

impl WatchdogConfig {
    /// Load from `custom_path` (must exist) or the default path (optional),
    /// then overlay `CLAWWATCH_*` environment variables.
    pub fn load(custom_path: Option<&Path>) -> Result<Self, ConfigError> {
        let file = match custom_path {
            Some(path) => File::from(path.to_path_buf()).required(true),
            None => File::from(default_config_path()).required(false),
        };

        let s = Config::builder()
            .add_source(file)
            .add_source(
                Environment::with_prefix("CLAWWATCH")
                    .prefix_separator("_")
                    .separator("__")
                    .try_parsing(true),
            )
            .build()?;

        let config: WatchdogConfig = s.try_deserialize()?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.health_check_interval < MIN_HEALTH_CHECK_INTERVAL_MS {
            return Err(ConfigError::Invalid(format!(
                "healthCheckInterval must be at least {}ms, got {}ms",
                MIN_HEALTH_CHECK_INTERVAL_MS, self.health_check_interval
            )));
        }
        if self.response_timeout == 0 {
            return Err(ConfigError::Invalid(
                "responseTimeout must be greater than zero".to_string(),
            ));
        }
        if self.max_failures == 0 {
            return Err(ConfigError::Invalid(
                "maxFailures must be at least 1".to_string(),
            ));
        }
        if self.agents.is_empty() {
            return Err(ConfigError::Invalid(
                "at least one agent must be configured".to_string(),
            ));
        }

        let mut seen = HashSet::new();
        for name in &self.agents {
            if name.trim().is_empty() {
                return Err(ConfigError::Invalid("agent names must not be empty".to_string()));
            }
            if !seen.insert(name.as_str()) {
                return Err(ConfigError::Invalid(format!("duplicate agent '{}'", name)));
            }
        }

        Ok(())
    }

    pub fn health_check_interval(&self) -> Duration {
        Duration::from_millis(self.health_check_interval)
    }

    pub fn response_timeout(&self) -> Duration {
        Duration::from_millis(self.response_timeout)
    }

    pub fn restart_cooldown(&self) -> Duration {
        Duration::from_millis(self.restart_cooldown)
    }
}

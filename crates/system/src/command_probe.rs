use async_trait::async_trait;
use clawwatch_core::config::{WatchdogConfig, AGENT_PLACEHOLDER};
use clawwatch_core::probe::HealthProbe;
use clawwatch_core::types::HealthResult;
use std::process::Stdio;
use thiserror::Error;
use tokio::process::Command;
use tokio::time::{sleep, timeout, Duration};
use tracing::{debug, info, warn};

/// Cap on stdout kept as an agent diagnostic.
const MAX_DIAGNOSTIC_BYTES: usize = 512;

#[derive(Debug, Error)]
pub enum ProbeError {
    #[error("Failed to spawn '{command}': {source}")]
    Spawn {
        command: String,
        #[source]
        source: std::io::Error,
    },
    #[error("'{command}' timed out after {}ms", .timeout.as_millis())]
    Timeout { command: String, timeout: Duration },
    #[error("'{command}' exited with status {code:?}: {stderr}")]
    Failed {
        command: String,
        code: Option<i32>,
        stderr: String,
    },
}

#[derive(Debug, Clone, Default)]
pub struct CommandOutput {
    pub stdout: String,
    pub stderr: String,
}

/// `HealthProbe` backed by shell commands. Exit status 0 means healthy/success.
#[derive(Debug, Clone)]
pub struct CommandProbe {
    gateway_status: String,
    gateway_start: String,
    gateway_restart: String,
    agent_status: String,
    agent_restart: String,
    gateway_status_timeout: Duration,
    gateway_start_timeout: Duration,
    gateway_restart_timeout: Duration,
    response_timeout: Duration,
    settle_delay: Duration,
}

impl CommandProbe {
    pub fn from_config(config: &WatchdogConfig) -> Self {
        let commands = &config.commands;
        Self {
            gateway_status: commands.gateway_status.clone(),
            gateway_start: commands.gateway_start.clone(),
            gateway_restart: commands.gateway_restart.clone(),
            agent_status: commands.agent_status.clone(),
            agent_restart: commands.agent_restart.clone(),
            gateway_status_timeout: Duration::from_millis(commands.gateway_status_timeout),
            gateway_start_timeout: Duration::from_millis(commands.gateway_start_timeout),
            gateway_restart_timeout: Duration::from_millis(commands.gateway_restart_timeout),
            response_timeout: config.response_timeout(),
            settle_delay: Duration::from_millis(commands.settle_delay),
        }
    }

    fn agent_command(template: &str, name: &str) -> String {
        template.replace(AGENT_PLACEHOLDER, name)
    }
}

/// Run `command` through `sh -c`, killing it if `deadline` passes.
pub async fn run_command(command: &str, deadline: Duration) -> Result<CommandOutput, ProbeError> {
    let child = Command::new("sh")
        .arg("-c")
        .arg(command)
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .kill_on_drop(true)
        .spawn()
        .map_err(|source| ProbeError::Spawn {
            command: command.to_string(),
            source,
        })?;

    // on timeout the child is dropped, and kill_on_drop reaps it
    let output = match timeout(deadline, child.wait_with_output()).await {
        Ok(Ok(output)) => output,
        Ok(Err(source)) => {
            return Err(ProbeError::Spawn {
                command: command.to_string(),
                source,
            })
        }
        Err(_) => {
            return Err(ProbeError::Timeout {
                command: command.to_string(),
                timeout: deadline,
            })
        }
    };

    let stdout = String::from_utf8_lossy(&output.stdout).trim().to_string();
    let stderr = String::from_utf8_lossy(&output.stderr).trim().to_string();

    if output.status.success() {
        Ok(CommandOutput { stdout, stderr })
    } else {
        Err(ProbeError::Failed {
            command: command.to_string(),
            code: output.status.code(),
            stderr: if stderr.is_empty() { stdout } else { stderr },
        })
    }
}

pub fn truncate_output(output: &str, max_bytes: usize) -> String {
    if output.len() <= max_bytes {
        return output.to_string();
    }
    let mut end = max_bytes;
    while !output.is_char_boundary(end) {
        end -= 1;
    }
    format!("{}... (truncated)", &output[..end])
}

#[async_trait]
impl HealthProbe for CommandProbe {
    async fn probe_gateway(&self) -> bool {
        match run_command(&self.gateway_status, self.gateway_status_timeout).await {
            Ok(_) => true,
            Err(e) => {
                debug!("Gateway status check failed: {}", e);
                false
            }
        }
    }

    async fn start_or_restart_gateway(&self) -> bool {
        let started = match run_command(&self.gateway_start, self.gateway_start_timeout).await {
            Ok(_) => {
                info!("Gateway start command succeeded");
                true
            }
            Err(e) => {
                warn!("Gateway start failed, trying restart: {}", e);
                match run_command(&self.gateway_restart, self.gateway_restart_timeout).await {
                    Ok(_) => {
                        info!("Gateway restart command succeeded");
                        true
                    }
                    Err(e) => {
                        warn!("Gateway restart failed: {}", e);
                        false
                    }
                }
            }
        };

        if started && !self.settle_delay.is_zero() {
            sleep(self.settle_delay).await;
        }
        started
    }

    async fn probe_agent(&self, name: &str) -> HealthResult {
        let command = Self::agent_command(&self.agent_status, name);
        match run_command(&command, self.response_timeout).await {
            Ok(output) if output.stdout.is_empty() => HealthResult::healthy(),
            Ok(output) => HealthResult::healthy()
                .with_diagnostic(truncate_output(&output.stdout, MAX_DIAGNOSTIC_BYTES)),
            Err(e) => HealthResult::unhealthy(truncate_output(&e.to_string(), MAX_DIAGNOSTIC_BYTES)),
        }
    }

    async fn restart_agent(&self, name: &str) -> bool {
        let command = Self::agent_command(&self.agent_restart, name);
        match run_command(&command, self.response_timeout).await {
            Ok(_) => true,
            Err(e) => {
                warn!(agent = name, "Agent restart command failed: {}", e);
                false
            }
        }
    }
}

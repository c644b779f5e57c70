use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Answer to "is this agent responsive?".
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct HealthResult {
    pub healthy: bool,
    pub diagnostic: Option<String>,
    pub error: Option<String>,
}

impl HealthResult {
    pub fn healthy() -> Self {
        Self {
            healthy: true,
            ..Default::default()
        }
    }

    pub fn unhealthy(error: impl Into<String>) -> Self {
        Self {
            healthy: false,
            diagnostic: None,
            error: Some(error.into()),
        }
    }

    pub fn with_diagnostic(mut self, diagnostic: impl Into<String>) -> Self {
        self.diagnostic = Some(diagnostic.into());
        self
    }
}

/// Outcome of feeding one health result into an agent's recovery state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Decision {
    NoAction,
    /// Threshold reached but the last restart is too recent.
    SkipCooldown { remaining: Duration },
    Restart,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GatewayOutcome {
    Healthy,
    /// Was down, came back after a start/restart attempt.
    Recovered,
    /// Still down after the start/restart attempt; agents were not checked.
    Unreachable,
}

impl GatewayOutcome {
    pub fn is_reachable(&self) -> bool {
        !matches!(self, GatewayOutcome::Unreachable)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AgentReport {
    pub name: String,
    pub healthy: bool,
    pub consecutive_failures: u32,
    pub decision: Decision,
    pub restarted: bool,
    /// Result of the restart command, when one was issued.
    pub restart_succeeded: Option<bool>,
    pub error: Option<String>,
}

/// Everything that happened during one cycle.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CycleReport {
    pub started_at: DateTime<Utc>,
    pub gateway: GatewayOutcome,
    pub agents: Vec<AgentReport>,
    pub total_checks: u64,
    pub total_restarts: u64,
}

impl CycleReport {
    pub fn healthy_agents(&self) -> usize {
        self.agents.iter().filter(|a| a.healthy).count()
    }

    pub fn restarts_issued(&self) -> usize {
        self.agents.iter().filter(|a| a.restarted).count()
    }
}

/// Point-in-time host metrics.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PerformanceSample {
    pub cpu_percent: f32,
    pub memory_used_bytes: u64,
    pub memory_total_bytes: u64,
    pub disk_used_bytes: u64,
    pub disk_total_bytes: u64,
    pub load1: f64,
    pub load5: f64,
    pub load15: f64,
    pub sampled_at: DateTime<Utc>,
}

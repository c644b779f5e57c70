use crate::config::WatchdogConfig;
use crate::types::{Decision, HealthResult};
use chrono::{DateTime, Utc};
use std::time::Duration;

/// Threshold and cooldown shared by every agent.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RecoveryPolicy {
    pub max_failures: u32,
    pub cooldown: Duration,
}

impl Default for RecoveryPolicy {
    fn default() -> Self {
        Self {
            max_failures: 3,
            cooldown: Duration::from_secs(10),
        }
    }
}

impl From<&WatchdogConfig> for RecoveryPolicy {
    fn from(config: &WatchdogConfig) -> Self {
        Self {
            max_failures: config.max_failures,
            cooldown: config.restart_cooldown(),
        }
    }
}

/// Failure tracking for a single supervised agent.
///
/// `consecutive_failures` counts unhealthy results since the most recent
/// healthy result or restart, so it never exceeds `total_failures`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AgentRecoveryState {
    pub name: String,
    pub consecutive_failures: u32,
    pub last_healthy_at: Option<DateTime<Utc>>,
    pub last_restart_at: Option<DateTime<Utc>>,
    pub last_check_at: Option<DateTime<Utc>>,
    pub last_error: Option<String>,
    pub total_checks: u64,
    pub total_failures: u64,
    pub total_restarts: u64,
}

impl AgentRecoveryState {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            consecutive_failures: 0,
            last_healthy_at: None,
            last_restart_at: None,
            last_check_at: None,
            last_error: None,
            total_checks: 0,
            total_failures: 0,
            total_restarts: 0,
        }
    }

    /// Fold one health result into the state and decide whether to restart.
    ///
    /// A `Restart` decision does not touch the counters; the caller reports
    /// the attempt back through [`AgentRecoveryState::on_restart_issued`].
    pub fn record_result(
        &mut self,
        result: &HealthResult,
        now: DateTime<Utc>,
        policy: &RecoveryPolicy,
    ) -> Decision {
        self.total_checks += 1;
        self.last_check_at = Some(now);

        if result.healthy {
            self.consecutive_failures = 0;
            self.last_healthy_at = Some(now);
            self.last_error = None;
            return Decision::NoAction;
        }

        self.consecutive_failures += 1;
        self.total_failures += 1;
        self.last_error = result.error.clone().or_else(|| result.diagnostic.clone());

        if self.consecutive_failures < policy.max_failures {
            return Decision::NoAction;
        }

        match self.cooldown_remaining(now, policy.cooldown) {
            Some(remaining) => Decision::SkipCooldown { remaining },
            None => Decision::Restart,
        }
    }

    /// Called once the restart call has returned, whatever its outcome.
    pub fn on_restart_issued(&mut self, now: DateTime<Utc>) {
        self.last_restart_at = Some(now);
        self.total_restarts += 1;
        self.consecutive_failures = 0;
    }

    /// Time left in the cooldown window, or `None` if a restart is allowed.
    /// The window is inclusive: exactly `cooldown` after a restart still waits.
    pub fn cooldown_remaining(&self, now: DateTime<Utc>, cooldown: Duration) -> Option<Duration> {
        let last = self.last_restart_at?;
        // a clock that moved backwards counts as no time elapsed
        let elapsed = (now - last).to_std().unwrap_or(Duration::ZERO);
        if elapsed <= cooldown {
            Some(cooldown - elapsed)
        } else {
            None
        }
    }
}

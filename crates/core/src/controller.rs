use crate::probe::HealthProbe;
use crate::recovery::{AgentRecoveryState, RecoveryPolicy};
use crate::types::{AgentReport, CycleReport, Decision, GatewayOutcome, PerformanceSample};
use chrono::{DateTime, Utc};
use std::collections::HashMap;
use std::sync::Arc;
use tracing::{error, info, warn};

/// Process-wide counters plus every agent's recovery state.
#[derive(Debug, Clone)]
pub struct MonitorAggregateState {
    pub start_time: DateTime<Utc>,
    /// Completed cycles.
    pub total_checks: u64,
    /// Agent restarts issued.
    pub total_restarts: u64,
    pub gateway_restarts: u64,
    pub last_check_at: Option<DateTime<Utc>>,
    pub latest_sample: Option<PerformanceSample>,
    pub agents: HashMap<String, AgentRecoveryState>,
}

impl MonitorAggregateState {
    pub fn new(start_time: DateTime<Utc>) -> Self {
        Self {
            start_time,
            total_checks: 0,
            total_restarts: 0,
            gateway_restarts: 0,
            last_check_at: None,
            latest_sample: None,
            agents: HashMap::new(),
        }
    }

    /// Recovery state for `name`, created on first reference.
    pub fn agent_mut(&mut self, name: &str) -> &mut AgentRecoveryState {
        self.agents
            .entry(name.to_string())
            .or_insert_with(|| AgentRecoveryState::new(name))
    }
}

/// Runs health-check cycles and owns all recovery state.
pub struct RecoveryController {
    probe: Arc<dyn HealthProbe>,
    policy: RecoveryPolicy,
    agents: Vec<String>,
    state: MonitorAggregateState,
}

impl RecoveryController {
    pub fn new(
        probe: Arc<dyn HealthProbe>,
        policy: RecoveryPolicy,
        agents: Vec<String>,
        start_time: DateTime<Utc>,
    ) -> Self {
        let mut state = MonitorAggregateState::new(start_time);
        for name in &agents {
            state.agent_mut(name);
        }
        Self {
            probe,
            policy,
            agents,
            state,
        }
    }

    pub fn state(&self) -> &MonitorAggregateState {
        &self.state
    }

    pub fn policy(&self) -> &RecoveryPolicy {
        &self.policy
    }

    pub fn record_sample(&mut self, sample: PerformanceSample) {
        self.state.latest_sample = Some(sample);
    }

    /// One pass over the gateway and then every agent, in configured order.
    pub async fn run_cycle(&mut self, now: DateTime<Utc>) -> CycleReport {
        let gateway = self.check_gateway().await;

        let mut agents = Vec::new();
        if gateway.is_reachable() {
            for name in self.agents.clone() {
                agents.push(self.check_agent(&name, now).await);
            }
        } else {
            warn!(
                agents = self.agents.len(),
                "Gateway unreachable, skipping agent checks this cycle"
            );
        }

        self.state.total_checks += 1;
        self.state.last_check_at = Some(now);

        CycleReport {
            started_at: now,
            gateway,
            agents,
            total_checks: self.state.total_checks,
            total_restarts: self.state.total_restarts,
        }
    }

    async fn check_gateway(&mut self) -> GatewayOutcome {
        if self.probe.probe_gateway().await {
            return GatewayOutcome::Healthy;
        }

        warn!("Gateway not reachable, attempting start/restart");
        self.state.gateway_restarts += 1;
        let started = self.probe.start_or_restart_gateway().await;
        if !started {
            warn!("Gateway start/restart command failed");
        }

        if self.probe.probe_gateway().await {
            info!(gateway_restarts = self.state.gateway_restarts, "Gateway recovered");
            GatewayOutcome::Recovered
        } else {
            error!(
                gateway_restarts = self.state.gateway_restarts,
                "Gateway still unreachable after start/restart"
            );
            GatewayOutcome::Unreachable
        }
    }

    async fn check_agent(&mut self, name: &str, now: DateTime<Utc>) -> AgentReport {
        let result = self.probe.probe_agent(name).await;
        let policy = self.policy;
        let decision = self.state.agent_mut(name).record_result(&result, now, &policy);

        let mut restart_succeeded = None;
        match decision {
            Decision::NoAction if result.healthy => {}
            Decision::NoAction => {
                let agent = self.state.agent_mut(name);
                warn!(
                    agent = name,
                    consecutive_failures = agent.consecutive_failures,
                    max_failures = policy.max_failures,
                    error = result.error.as_deref().unwrap_or("unknown"),
                    "Agent degraded"
                );
            }
            Decision::SkipCooldown { remaining } => {
                let agent = self.state.agent_mut(name);
                warn!(
                    agent = name,
                    consecutive_failures = agent.consecutive_failures,
                    remaining_ms = remaining.as_millis() as u64,
                    "Agent unhealthy, restart suppressed by cooldown"
                );
            }
            Decision::Restart => {
                error!(
                    agent = name,
                    consecutive_failures = self.state.agent_mut(name).consecutive_failures,
                    "Failure threshold reached, restarting agent"
                );
                let ok = self.probe.restart_agent(name).await;
                if ok {
                    info!(agent = name, "Agent restart issued");
                } else {
                    error!(agent = name, "Agent restart failed");
                }
                self.state.agent_mut(name).on_restart_issued(now);
                self.state.total_restarts += 1;
                restart_succeeded = Some(ok);
            }
        }

        let agent = self.state.agent_mut(name);
        AgentReport {
            name: name.to_string(),
            healthy: result.healthy,
            consecutive_failures: agent.consecutive_failures,
            decision,
            restarted: restart_succeeded.is_some(),
            restart_succeeded,
            error: result.error,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::HealthResult;
    use async_trait::async_trait;
    use chrono::TimeZone;
    use std::collections::VecDeque;
    use std::sync::Mutex;
    use std::time::Duration;

    /// Replays scripted answers and records every call in order.
    #[derive(Default)]
    struct ScriptedProbe {
        gateway: Mutex<VecDeque<bool>>,
        agents: Mutex<HashMap<String, VecDeque<bool>>>,
        restart_ok: bool,
        calls: Mutex<Vec<String>>,
    }

    impl ScriptedProbe {
        fn new() -> Self {
            Self {
                restart_ok: true,
                ..Default::default()
            }
        }

        fn gateway(self, answers: &[bool]) -> Self {
            self.gateway.lock().unwrap().extend(answers);
            self
        }

        fn agent(self, name: &str, answers: &[bool]) -> Self {
            self.agents
                .lock()
                .unwrap()
                .entry(name.to_string())
                .or_default()
                .extend(answers);
            self
        }

        fn calls(&self) -> Vec<String> {
            self.calls.lock().unwrap().clone()
        }

        fn count(&self, prefix: &str) -> usize {
            self.calls().iter().filter(|c| c.starts_with(prefix)).count()
        }
    }

    #[async_trait]
    impl HealthProbe for ScriptedProbe {
        async fn probe_gateway(&self) -> bool {
            self.calls.lock().unwrap().push("gateway".to_string());
            self.gateway.lock().unwrap().pop_front().unwrap_or(true)
        }

        async fn start_or_restart_gateway(&self) -> bool {
            self.calls.lock().unwrap().push("gateway-restart".to_string());
            true
        }

        async fn probe_agent(&self, name: &str) -> HealthResult {
            self.calls.lock().unwrap().push(format!("probe:{name}"));
            let healthy = self
                .agents
                .lock()
                .unwrap()
                .get_mut(name)
                .and_then(|q| q.pop_front())
                .unwrap_or(true);
            if healthy {
                HealthResult::healthy()
            } else {
                HealthResult::unhealthy("no response")
            }
        }

        async fn restart_agent(&self, name: &str) -> bool {
            self.calls.lock().unwrap().push(format!("restart:{name}"));
            self.restart_ok
        }
    }

    fn t(ms: i64) -> DateTime<Utc> {
        Utc.timestamp_millis_opt(1_700_000_000_000 + ms).unwrap()
    }

    fn controller(probe: Arc<ScriptedProbe>, agents: &[&str]) -> RecoveryController {
        RecoveryController::new(
            probe,
            RecoveryPolicy {
                max_failures: 3,
                cooldown: Duration::from_millis(10_000),
            },
            agents.iter().map(|a| a.to_string()).collect(),
            t(0),
        )
    }

    #[tokio::test]
    async fn restart_fires_on_third_failure_with_wide_spacing() {
        let probe = Arc::new(ScriptedProbe::new().agent("main", &[false, false, false]));
        let mut ctl = controller(probe.clone(), &["main"]);

        let mut reports = Vec::new();
        for cycle in 0..3 {
            reports.push(ctl.run_cycle(t(cycle * 30_000)).await);
        }

        assert!(!reports[0].agents[0].restarted);
        assert!(!reports[1].agents[0].restarted);
        assert_eq!(reports[2].agents[0].decision, Decision::Restart);
        assert!(reports[2].agents[0].restarted);

        let main = &ctl.state().agents["main"];
        assert_eq!(main.total_restarts, 1);
        assert_eq!(main.consecutive_failures, 0);
        assert_eq!(main.last_restart_at, Some(t(60_000)));
        assert_eq!(ctl.state().total_restarts, 1);
        assert_eq!(probe.count("restart:main"), 1);
    }

    #[tokio::test]
    async fn cooldown_prevents_second_restart_on_tight_spacing() {
        let probe = Arc::new(ScriptedProbe::new().agent("main", &[false, false, false, false]));
        let mut ctl = controller(probe.clone(), &["main"]);

        let mut reports = Vec::new();
        for cycle in 0..4 {
            reports.push(ctl.run_cycle(t(cycle * 2_000)).await);
        }

        assert!(reports[2].agents[0].restarted);
        let fourth = &reports[3].agents[0];
        assert!(!fourth.restarted);
        assert_ne!(fourth.decision, Decision::Restart);
        assert_eq!(fourth.consecutive_failures, 1);
        assert_eq!(ctl.state().agents["main"].total_restarts, 1);
        assert_eq!(probe.count("restart:"), 1);
    }

    #[tokio::test]
    async fn failed_restart_still_resets_and_starts_cooldown() {
        let mut scripted = ScriptedProbe::new().agent("main", &[false; 6]);
        scripted.restart_ok = false;
        let probe = Arc::new(scripted);
        let mut ctl = controller(probe.clone(), &["main"]);

        let mut reports = Vec::new();
        for cycle in 0..6 {
            reports.push(ctl.run_cycle(t(cycle * 2_000)).await);
        }

        assert_eq!(reports[2].agents[0].restart_succeeded, Some(false));
        assert_eq!(reports[2].agents[0].consecutive_failures, 0);
        // threshold reached again 6s after the failed restart
        assert_eq!(
            reports[5].agents[0].decision,
            Decision::SkipCooldown {
                remaining: Duration::from_secs(4)
            }
        );
        assert_eq!(probe.count("restart:"), 1);
        assert_eq!(ctl.state().agents["main"].last_restart_at, Some(t(4_000)));
    }

    #[tokio::test]
    async fn unreachable_gateway_skips_agents() {
        let probe = Arc::new(
            ScriptedProbe::new()
                .gateway(&[true, false, false])
                .agent("main", &[false, false, false]),
        );
        let mut ctl = controller(probe.clone(), &["main", "ops"]);

        ctl.run_cycle(t(0)).await;
        let checks_before: Vec<u64> = ["main", "ops"]
            .iter()
            .map(|a| ctl.state().agents[*a].total_checks)
            .collect();

        let report = ctl.run_cycle(t(30_000)).await;
        assert_eq!(report.gateway, GatewayOutcome::Unreachable);
        assert!(report.agents.is_empty());

        let checks_after: Vec<u64> = ["main", "ops"]
            .iter()
            .map(|a| ctl.state().agents[*a].total_checks)
            .collect();
        assert_eq!(checks_before, checks_after);
        assert_eq!(ctl.state().gateway_restarts, 1);
        // cycle still counts
        assert_eq!(ctl.state().total_checks, 2);
        assert_eq!(probe.count("probe:"), 2);
    }

    #[tokio::test]
    async fn recovered_gateway_proceeds_to_agents() {
        let probe = Arc::new(ScriptedProbe::new().gateway(&[false, true]));
        let mut ctl = controller(probe.clone(), &["main"]);

        let report = ctl.run_cycle(t(0)).await;
        assert_eq!(report.gateway, GatewayOutcome::Recovered);
        assert_eq!(report.agents.len(), 1);
        assert_eq!(
            probe.calls(),
            vec!["gateway", "gateway-restart", "gateway", "probe:main"]
        );
    }

    #[tokio::test]
    async fn gateway_checked_before_agents_in_configured_order() {
        let probe = Arc::new(ScriptedProbe::new());
        let mut ctl = controller(probe.clone(), &["zeta", "alpha", "mid"]);

        let report = ctl.run_cycle(t(0)).await;
        assert_eq!(
            probe.calls(),
            vec!["gateway", "probe:zeta", "probe:alpha", "probe:mid"]
        );
        let names: Vec<&str> = report.agents.iter().map(|a| a.name.as_str()).collect();
        assert_eq!(names, vec!["zeta", "alpha", "mid"]);
        assert_eq!(report.healthy_agents(), 3);
    }

    #[tokio::test]
    async fn one_agent_restart_does_not_affect_others() {
        let probe = Arc::new(
            ScriptedProbe::new()
                .agent("main", &[false, false, false])
                .agent("ops", &[true, false, true]),
        );
        let mut ctl = controller(probe.clone(), &["main", "ops"]);

        let mut last = None;
        for cycle in 0..3 {
            last = Some(ctl.run_cycle(t(cycle * 30_000)).await);
        }
        let last = last.unwrap();

        assert_eq!(last.restarts_issued(), 1);
        assert_eq!(ctl.state().agents["ops"].total_restarts, 0);
        assert_eq!(ctl.state().agents["ops"].total_failures, 1);
        assert_eq!(ctl.state().agents["ops"].consecutive_failures, 0);
        assert_eq!(probe.calls().last().map(String::as_str), Some("probe:ops"));
    }

    #[tokio::test]
    async fn agents_are_registered_up_front() {
        let probe = Arc::new(ScriptedProbe::new());
        let ctl = controller(probe, &["main", "ops"]);
        assert_eq!(ctl.state().agents.len(), 2);
        assert_eq!(ctl.state().agents["ops"].total_checks, 0);
        assert_eq!(ctl.state().start_time, t(0));
    }
}

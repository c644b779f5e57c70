use chrono::{DateTime, Utc};
use clawwatch_core::controller::RecoveryController;
use clawwatch_core::probe::HostSampler;
use clawwatch_core::snapshot::SnapshotStore;
use clawwatch_core::types::{CycleReport, GatewayOutcome};
use tracing::{info, warn};

/// Everything one scheduled cycle touches: host sample, health checks, snapshot.
pub struct Watchdog {
    controller: RecoveryController,
    store: SnapshotStore,
    sampler: Option<Box<dyn HostSampler>>,
}

impl Watchdog {
    pub fn new(controller: RecoveryController, store: SnapshotStore) -> Self {
        Self {
            controller,
            store,
            sampler: None,
        }
    }

    pub fn with_sampler(mut self, sampler: Box<dyn HostSampler>) -> Self {
        self.sampler = Some(sampler);
        self
    }

    pub fn controller(&self) -> &RecoveryController {
        &self.controller
    }

    pub fn store(&self) -> &SnapshotStore {
        &self.store
    }

    pub async fn run_cycle(&mut self) -> CycleReport {
        self.run_cycle_at(Utc::now()).await
    }

    pub async fn run_cycle_at(&mut self, now: DateTime<Utc>) -> CycleReport {
        if let Some(sample) = self.sampler.as_mut().and_then(|s| s.sample()) {
            self.controller.record_sample(sample);
        }

        let report = self.controller.run_cycle(now).await;
        log_report(&report);
        self.persist();
        report
    }

    pub fn persist(&self) {
        self.store.save(self.controller.state());
    }
}

fn log_report(report: &CycleReport) {
    if report.gateway == GatewayOutcome::Unreachable {
        warn!(
            total_checks = report.total_checks,
            "Cycle finished without agent checks (gateway unreachable)"
        );
        return;
    }

    info!(
        gateway = ?report.gateway,
        healthy = report.healthy_agents(),
        agents = report.agents.len(),
        restarts = report.restarts_issued(),
        total_checks = report.total_checks,
        total_restarts = report.total_restarts,
        "Health check cycle complete"
    );
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use chrono::TimeZone;
    use clawwatch_core::probe::HealthProbe;
    use clawwatch_core::recovery::RecoveryPolicy;
    use clawwatch_core::types::{HealthResult, PerformanceSample};
    use std::sync::Arc;

    struct AlwaysDown;

    #[async_trait]
    impl HealthProbe for AlwaysDown {
        async fn probe_gateway(&self) -> bool {
            true
        }
        async fn start_or_restart_gateway(&self) -> bool {
            true
        }
        async fn probe_agent(&self, _name: &str) -> HealthResult {
            HealthResult::unhealthy("down")
        }
        async fn restart_agent(&self, _name: &str) -> bool {
            true
        }
    }

    struct FixedSampler;

    impl HostSampler for FixedSampler {
        fn sample(&mut self) -> Option<PerformanceSample> {
            Some(PerformanceSample {
                cpu_percent: 12.5,
                memory_used_bytes: 1024,
                memory_total_bytes: 4096,
                disk_used_bytes: 10,
                disk_total_bytes: 100,
                load1: 0.5,
                load5: 0.25,
                load15: 0.125,
                sampled_at: Utc.timestamp_opt(1_700_000_000, 0).unwrap(),
            })
        }
    }

    #[tokio::test]
    async fn cycle_samples_checks_and_persists() {
        let dir = tempfile::tempdir().unwrap();
        let store = SnapshotStore::new(dir.path().join("state.json"));
        let controller = RecoveryController::new(
            Arc::new(AlwaysDown),
            RecoveryPolicy::default(),
            vec!["main".to_string()],
            Utc::now(),
        );
        let mut watchdog = Watchdog::new(controller, store).with_sampler(Box::new(FixedSampler));

        let start = Utc.timestamp_opt(1_700_000_000, 0).unwrap();
        for i in 0..3 {
            watchdog.run_cycle_at(start + chrono::Duration::seconds(30 * i)).await;
        }

        let snapshot = watchdog.store().read().unwrap();
        assert_eq!(snapshot.total_checks, 3);
        assert_eq!(snapshot.total_restarts, 1);
        assert_eq!(snapshot.agents["main"].consecutive_failures, 0);
        assert_eq!(snapshot.performance.map(|p| p.memory_total_bytes), Some(4096));
    }

    #[tokio::test]
    async fn without_sampler_snapshot_has_no_performance() {
        let dir = tempfile::tempdir().unwrap();
        let store = SnapshotStore::new(dir.path().join("state.json"));
        let controller = RecoveryController::new(
            Arc::new(AlwaysDown),
            RecoveryPolicy::default(),
            vec!["main".to_string()],
            Utc::now(),
        );
        let mut watchdog = Watchdog::new(controller, store);
        watchdog.run_cycle().await;

        let snapshot = watchdog.store().read().unwrap();
        assert!(snapshot.performance.is_none());
        assert_eq!(watchdog.controller().state().agents["main"].consecutive_failures, 1);
    }
}

use crate::types::{HealthResult, PerformanceSample};
use async_trait::async_trait;

/// Health queries and recovery actions against the gateway and its agents.
///
/// Implementations absorb their own failures: a probe that errors or times
/// out reports unhealthy, an action that fails reports `false`.
#[async_trait]
pub trait HealthProbe: Send + Sync {
    async fn probe_gateway(&self) -> bool;

    /// Start the gateway, or restart it if it is already running.
    async fn start_or_restart_gateway(&self) -> bool;

    async fn probe_agent(&self, name: &str) -> HealthResult;

    /// Blocks until the restart attempt completes or times out.
    async fn restart_agent(&self, name: &str) -> bool;
}

/// Source of host performance samples, polled once per cycle.
pub trait HostSampler: Send {
    fn sample(&mut self) -> Option<PerformanceSample>;
}

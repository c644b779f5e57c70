pub mod metrics;
pub mod watchdog;

pub use metrics::{SchedulerMetrics, SchedulerMetricsSnapshot};
pub use watchdog::Watchdog;

use std::future::Future;
use std::sync::Arc;
use tokio::sync::Mutex;
use tokio::task::JoinHandle;
use tokio::time::{interval, Duration, MissedTickBehavior};
use tracing::{error, info, warn};

/// Drives [`Watchdog`] cycles on a fixed period, one at a time.
///
/// A tick that fires while the previous cycle still holds the watchdog is
/// dropped rather than queued. Shutdown waits for the in-flight cycle and
/// persists a final snapshot.
pub struct Scheduler {
    watchdog: Arc<Mutex<Watchdog>>,
    period: Duration,
    metrics: Arc<SchedulerMetrics>,
}

impl Scheduler {
    pub fn new(watchdog: Watchdog, period: Duration) -> Self {
        Self {
            watchdog: Arc::new(Mutex::new(watchdog)),
            period,
            metrics: SchedulerMetrics::new(),
        }
    }

    pub fn metrics(&self) -> Arc<SchedulerMetrics> {
        self.metrics.clone()
    }

    pub fn watchdog(&self) -> Arc<Mutex<Watchdog>> {
        self.watchdog.clone()
    }

    /// Run until `shutdown` resolves. The first cycle starts immediately.
    pub async fn run<F>(self, shutdown: F)
    where
        F: Future<Output = ()>,
    {
        tokio::pin!(shutdown);

        info!(period_ms = self.period.as_millis() as u64, "Scheduler started");
        let mut ticker = interval(self.period);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
        let mut in_flight: Option<JoinHandle<()>> = None;

        loop {
            tokio::select! {
                biased;

                _ = &mut shutdown => {
                    info!("Shutdown requested, no further cycles will start");
                    break;
                }

                _ = ticker.tick() => {
                    if let Some(handle) = in_flight.take() {
                        if handle.is_finished() {
                            self.reap(handle).await;
                        } else {
                            in_flight = Some(handle);
                        }
                    }

                    match self.watchdog.clone().try_lock_owned() {
                        Ok(mut watchdog) => {
                            self.metrics.inc_cycles_started();
                            let metrics = self.metrics.clone();
                            in_flight = Some(tokio::spawn(async move {
                                watchdog.run_cycle().await;
                                metrics.inc_cycles_completed();
                            }));
                        }
                        Err(_) => {
                            self.metrics.inc_ticks_dropped();
                            warn!(
                                ticks_dropped = self.metrics.snapshot().ticks_dropped,
                                "Previous cycle still running, dropping tick"
                            );
                        }
                    }
                }
            }
        }

        if let Some(handle) = in_flight.take() {
            if !handle.is_finished() {
                info!("Waiting for in-flight cycle to finish");
            }
            self.reap(handle).await;
        }

        self.watchdog.lock().await.persist();

        let stats = self.metrics.snapshot();
        info!(
            cycles = stats.cycles_completed,
            failed = stats.cycles_failed,
            ticks_dropped = stats.ticks_dropped,
            "Scheduler stopped, final state persisted"
        );
    }

    /// A panicking cycle is logged and counted; the loop carries on.
    async fn reap(&self, handle: JoinHandle<()>) {
        if let Err(e) = handle.await {
            self.metrics.inc_cycles_failed();
            error!("Health check cycle aborted: {}", e);
        }
    }
}

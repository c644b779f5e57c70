use chrono::{DateTime, Utc};
use clawwatch_core::snapshot::Snapshot;
use clawwatch_core::uptime::format_uptime;
use std::fmt::Write;

const GIB: f64 = 1024.0 * 1024.0 * 1024.0;

fn fmt_time(ts: Option<DateTime<Utc>>) -> String {
    ts.map(|t| t.format("%Y-%m-%d %H:%M:%S UTC").to_string())
        .unwrap_or_else(|| "never".to_string())
}

/// Human-readable summary of a persisted snapshot.
pub fn render_status(snapshot: &Snapshot) -> String {
    let mut out = String::new();
    let uptime = (snapshot.saved_at - snapshot.start_time).num_seconds().max(0) as u64;

    let _ = writeln!(out, "Started: {}", fmt_time(Some(snapshot.start_time)));
    let _ = writeln!(
        out,
        "Saved: {} (uptime {})",
        fmt_time(Some(snapshot.saved_at)),
        format_uptime(uptime)
    );
    let _ = writeln!(out, "Last check: {}", fmt_time(snapshot.last_check));
    let _ = writeln!(out, "Total checks: {}", snapshot.total_checks);
    let _ = writeln!(
        out,
        "Total restarts: {} (gateway: {})",
        snapshot.total_restarts, snapshot.gateway_restarts
    );

    let _ = writeln!(out, "\nAgents:");
    if snapshot.agents.is_empty() {
        let _ = writeln!(out, "  (none)");
    }
    for (name, agent) in &snapshot.agents {
        let mark = if agent.consecutive_failures == 0 { "✓" } else { "✗" };
        let _ = writeln!(
            out,
            "  {} {}  failures: {} in a row / {} total  restarts: {}  last restart: {}",
            mark,
            name,
            agent.consecutive_failures,
            agent.total_failures,
            agent.total_restarts,
            fmt_time(agent.last_restart)
        );
        if let Some(err) = &agent.last_error {
            let _ = writeln!(out, "      last error: {}", err);
        }
    }

    if let Some(perf) = &snapshot.performance {
        let _ = writeln!(out, "\nHost:");
        let _ = writeln!(out, "  CPU: {:.1}%", perf.cpu_percent);
        let _ = writeln!(
            out,
            "  Memory: {:.1} / {:.1} GiB",
            perf.memory_used_bytes as f64 / GIB,
            perf.memory_total_bytes as f64 / GIB
        );
        let _ = writeln!(
            out,
            "  Disk: {:.1} / {:.1} GiB",
            perf.disk_used_bytes as f64 / GIB,
            perf.disk_total_bytes as f64 / GIB
        );
        let _ = writeln!(
            out,
            "  Load: {:.2} {:.2} {:.2}",
            perf.load1, perf.load5, perf.load15
        );
    }

    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use clawwatch_core::snapshot::AgentSnapshot;
    use clawwatch_core::types::PerformanceSample;
    use std::collections::BTreeMap;

    fn snapshot() -> Snapshot {
        let start = Utc.timestamp_opt(1_700_000_000, 0).unwrap();
        let mut agents = BTreeMap::new();
        agents.insert(
            "main".to_string(),
            AgentSnapshot {
                consecutive_failures: 2,
                last_healthy: None,
                last_restart: Some(start),
                last_check: Some(start),
                last_error: Some("no response".to_string()),
                total_checks: 40,
                total_failures: 5,
                total_restarts: 1,
            },
        );
        Snapshot {
            saved_at: start + chrono::Duration::seconds(3661),
            start_time: start,
            total_checks: 40,
            total_restarts: 1,
            gateway_restarts: 0,
            last_check: None,
            agents,
            performance: None,
        }
    }

    #[test]
    fn renders_counters_uptime_and_agents() {
        let text = render_status(&snapshot());
        assert!(text.contains("uptime 1h 1m"), "{text}");
        assert!(text.contains("Total checks: 40"));
        assert!(text.contains("Total restarts: 1 (gateway: 0)"));
        assert!(text.contains("✗ main  failures: 2 in a row / 5 total"));
        assert!(text.contains("last error: no response"));
        assert!(text.contains("Last check: never"));
        assert!(!text.contains("Host:"));
    }

    #[test]
    fn renders_host_sample_when_present() {
        let mut snap = snapshot();
        snap.performance = Some(PerformanceSample {
            cpu_percent: 42.0,
            memory_used_bytes: 2 * 1024 * 1024 * 1024,
            memory_total_bytes: 8 * 1024 * 1024 * 1024,
            disk_used_bytes: 0,
            disk_total_bytes: 0,
            load1: 1.0,
            load5: 0.5,
            load15: 0.25,
            sampled_at: snap.saved_at,
        });

        let text = render_status(&snap);
        assert!(text.contains("CPU: 42.0%"));
        assert!(text.contains("Memory: 2.0 / 8.0 GiB"));
        assert!(text.contains("Load: 1.00 0.50 0.25"));
    }
}

use chrono::Utc;
use clawwatch_core::probe::HostSampler;
use clawwatch_core::types::PerformanceSample;
use std::path::Path;
use sysinfo::{Disks, System};

/// Host CPU, memory, root disk and load average via `sysinfo`.
pub struct SysinfoSampler {
    system: System,
    disks: Disks,
}

impl SysinfoSampler {
    pub fn new() -> Self {
        let mut system = System::new();
        // CPU usage is a delta, so prime it once before the first sample
        system.refresh_cpu();
        system.refresh_memory();
        Self {
            system,
            disks: Disks::new_with_refreshed_list(),
        }
    }

    /// Space on the disk mounted at `/`, or the sum of all disks when there is none.
    fn disk_usage(&self) -> (u64, u64) {
        let disks = self.disks.list();
        let root = disks.iter().find(|d| d.mount_point() == Path::new("/"));
        match root {
            Some(disk) => (
                disk.total_space().saturating_sub(disk.available_space()),
                disk.total_space(),
            ),
            None => disks.iter().fold((0, 0), |(used, total), disk| {
                (
                    used + disk.total_space().saturating_sub(disk.available_space()),
                    total + disk.total_space(),
                )
            }),
        }
    }
}

impl Default for SysinfoSampler {
    fn default() -> Self {
        Self::new()
    }
}

impl HostSampler for SysinfoSampler {
    fn sample(&mut self) -> Option<PerformanceSample> {
        self.system.refresh_cpu();
        self.system.refresh_memory();
        self.disks.refresh();

        let load = System::load_average();
        let (disk_used_bytes, disk_total_bytes) = self.disk_usage();

        Some(PerformanceSample {
            cpu_percent: self.system.global_cpu_info().cpu_usage(),
            memory_used_bytes: self.system.used_memory(),
            memory_total_bytes: self.system.total_memory(),
            disk_used_bytes,
            disk_total_bytes,
            load1: load.one,
            load5: load.five,
            load15: load.fifteen,
            sampled_at: Utc::now(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sample_reports_memory_and_sane_ratios() {
        let mut sampler = SysinfoSampler::new();
        let sample = sampler.sample().expect("sample");

        assert!(sample.memory_total_bytes > 0);
        assert!(sample.memory_used_bytes <= sample.memory_total_bytes);
        assert!(sample.disk_used_bytes <= sample.disk_total_bytes);
        assert!(sample.cpu_percent >= 0.0);
        assert!(sample.load1 >= 0.0);
    }
}

use crate::affinity::CpuMask;
use sysinfo::{CpuRefreshKind, System};

/// Logical CPUs visible on the host.
#[derive(Debug, Clone)]
pub struct Topology {
    pub nof_cpus: usize,
    pub brands: Vec<String>,
}

impl Topology {
    pub fn detect() -> Self {
        let mut system = System::new();
        system.refresh_cpu_specifics(CpuRefreshKind::everything());

        let brands: Vec<String> = system.cpus().iter().map(|cpu| cpu.brand().to_string()).collect();

        // sysinfo may report nothing inside some sandboxes; the scheduler
        // still runs us somewhere.
        let nof_cpus = if brands.is_empty() {
            std::thread::available_parallelism()
                .map(|n| n.get())
                .unwrap_or(1)
        } else {
            brands.len()
        };

        Topology { nof_cpus, brands }
    }

    /// Mask covering every logical CPU on the host.
    pub fn all_cpus(&self) -> CpuMask {
        CpuMask::from_range(0..self.nof_cpus)
    }

    /// Whether every CPU of `mask` exists on the host.
    pub fn covers(&self, mask: &CpuMask) -> bool {
        mask.iter().all(|cpu| cpu < self.nof_cpus)
    }
}

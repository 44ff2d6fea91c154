//! Capacity probes: where the controller samples available resources.

use crate::admission::types::ResourceType;
use parking_lot::Mutex;
use std::collections::BTreeMap;
use std::time::{Duration, Instant};
use sysinfo::{Disks, System};

const BYTES_PER_GB: f64 = 1024.0 * 1024.0 * 1024.0;

pub trait CapacityProbe: Send + Sync {
    /// Currently available amount of `resource`, in its controller unit.
    fn available(&self, resource: ResourceType) -> f64;
}

/// Fixed capacities. Unlisted resources report zero.
#[derive(Debug, Clone, Default)]
pub struct StaticProbe {
    capacity: BTreeMap<ResourceType, f64>,
}

impl StaticProbe {
    pub fn new(capacity: BTreeMap<ResourceType, f64>) -> Self {
        Self { capacity }
    }

    /// Every resource at the same capacity.
    pub fn uniform(amount: f64) -> Self {
        Self::new(ResourceType::ALL.into_iter().map(|t| (t, amount)).collect())
    }

    pub fn with(mut self, resource: ResourceType, amount: f64) -> Self {
        self.capacity.insert(resource, amount);
        self
    }
}

impl CapacityProbe for StaticProbe {
    fn available(&self, resource: ResourceType) -> f64 {
        self.capacity.get(&resource).copied().unwrap_or(0.0)
    }
}

#[derive(Debug, Clone, Copy)]
struct Sample {
    taken_at: Instant,
    cpu_percent: f64,
    memory_gb: f64,
    disk_gb: f64,
}

/// Host sampling through `sysinfo`. Network and gpu have no portable probe,
/// so their capacities are configured.
pub struct SystemProbe {
    system: Mutex<System>,
    last: Mutex<Option<Sample>>,
    refresh_interval: Duration,
    network_mbps: f64,
    gpu_units: f64,
}

impl SystemProbe {
    pub const DEFAULT_REFRESH_INTERVAL: Duration = Duration::from_secs(1);

    pub fn new(network_mbps: f64, gpu_units: f64) -> Self {
        let mut system = System::new();
        // Prime the cpu counters; usage is a delta between refreshes.
        system.refresh_cpu_usage();
        Self {
            system: Mutex::new(system),
            last: Mutex::new(None),
            refresh_interval: Self::DEFAULT_REFRESH_INTERVAL,
            network_mbps,
            gpu_units,
        }
    }

    pub fn with_refresh_interval(mut self, interval: Duration) -> Self {
        self.refresh_interval = interval;
        self
    }

    fn sample(&self) -> Sample {
        let mut last = self.last.lock();
        if let Some(sample) = *last {
            if sample.taken_at.elapsed() < self.refresh_interval {
                return sample;
            }
        }

        let mut system = self.system.lock();
        system.refresh_cpu_usage();
        system.refresh_memory();
        let cpu_used = f64::from(system.global_cpu_usage()).clamp(0.0, 100.0);
        let memory_gb = system.available_memory() as f64 / BYTES_PER_GB;
        let disk_gb = Disks::new_with_refreshed_list()
            .list()
            .iter()
            .map(|disk| disk.available_space() as f64 / BYTES_PER_GB)
            .fold(0.0, f64::max);

        let sample = Sample {
            taken_at: Instant::now(),
            cpu_percent: 100.0 - cpu_used,
            memory_gb,
            disk_gb,
        };
        *last = Some(sample);
        sample
    }
}

impl CapacityProbe for SystemProbe {
    fn available(&self, resource: ResourceType) -> f64 {
        match resource {
            ResourceType::Cpu => self.sample().cpu_percent,
            ResourceType::Memory => self.sample().memory_gb,
            ResourceType::Disk => self.sample().disk_gb,
            ResourceType::Network => self.network_mbps,
            ResourceType::Gpu => self.gpu_units,
        }
    }
}

//! Process RSS sampling used by the pipeline's memory-aware backpressure
//! (§4.8, §9 "Memory awareness").
//!
//! Wraps `sysinfo` behind a trait so tests can fake pressure levels without
//! depending on the actual process footprint.

use std::sync::Mutex;

use sysinfo::{Pid, System};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PressureLevel {
    Normal,
    Soft,
    Hard,
}

pub trait MemorySampler: Send + Sync {
    /// Current resident set size of this process, in bytes.
    fn rss_bytes(&self) -> u64;
}

/// Refreshes a single cached `System` handle rather than rebuilding the
/// process table on every sample; `sysinfo` recommends reusing one instance.
pub struct SysinfoSampler {
    system: Mutex<System>,
    pid: Pid,
}

impl SysinfoSampler {
    pub fn new() -> Self {
        let pid = Pid::from_u32(std::process::id());
        let mut system = System::new();
        system.refresh_process(pid);
        Self { system: Mutex::new(system), pid }
    }
}

impl Default for SysinfoSampler {
    fn default() -> Self {
        Self::new()
    }
}

impl MemorySampler for SysinfoSampler {
    fn rss_bytes(&self) -> u64 {
        let mut system = self.system.lock().unwrap();
        system.refresh_process(self.pid);
        system.process(self.pid).map(|p| p.memory()).unwrap_or(0)
    }
}

#[derive(Debug, Clone, Copy)]
pub struct MemoryThresholds {
    pub soft_limit_bytes: u64,
    pub hard_limit_bytes: u64,
}

impl MemoryThresholds {
    pub fn classify(&self, rss_bytes: u64) -> PressureLevel {
        if rss_bytes >= self.hard_limit_bytes {
            PressureLevel::Hard
        } else if rss_bytes >= self.soft_limit_bytes {
            PressureLevel::Soft
        } else {
            PressureLevel::Normal
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct FixedSampler(u64);
    impl MemorySampler for FixedSampler {
        fn rss_bytes(&self) -> u64 {
            self.0
        }
    }

    #[test]
    fn classifies_by_threshold() {
        let thresholds = MemoryThresholds { soft_limit_bytes: 100, hard_limit_bytes: 200 };
        assert_eq!(thresholds.classify(50), PressureLevel::Normal);
        assert_eq!(thresholds.classify(100), PressureLevel::Soft);
        assert_eq!(thresholds.classify(200), PressureLevel::Hard);
    }

    #[test]
    fn fixed_sampler_reports_constant_value() {
        let sampler = FixedSampler(12345);
        assert_eq!(sampler.rss_bytes(), 12345);
    }

    #[test]
    fn real_sampler_returns_nonzero_for_running_process() {
        let sampler = SysinfoSampler::new();
        assert!(sampler.rss_bytes() > 0);
    }
}

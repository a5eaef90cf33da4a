//! Process metrics sampler wrapping `sysinfo`, gated by frame time.
//!
//! Designed to be polled every frame; the expensive sysinfo refresh only
//! runs once the configured interval has passed on the frame clock.

use sysinfo::{Pid, ProcessesToUpdate, System};

/// Metrics captured at the last refresh.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ProcessMetrics {
    /// Total physical memory in bytes.
    pub mem_total: u64,
    /// Used physical memory in bytes.
    pub mem_used: u64,
    /// Resident set size of this process in bytes.
    pub rss: Option<u64>,
    /// CPU usage of this process as a percentage.
    pub cpu: Option<f32>,
}

pub struct ProcessSampler {
    sys: System,
    pid: Pid,
    interval_seconds: f64,
    last_refresh: Option<f64>,
    metrics: ProcessMetrics,
}

impl ProcessSampler {
    pub fn new(interval_seconds: f64) -> Self {
        Self {
            sys: System::new(),
            pid: Pid::from_u32(std::process::id()),
            interval_seconds,
            last_refresh: None,
            metrics: ProcessMetrics::default(),
        }
    }

    /// Refresh if `now_seconds` is at least one interval past the last
    /// refresh. Returns `true` when a refresh happened.
    pub fn maybe_refresh(&mut self, now_seconds: f64) -> bool {
        let due = self
            .last_refresh
            .map_or(true, |last| now_seconds - last >= self.interval_seconds);
        if !due {
            return false;
        }
        self.last_refresh = Some(now_seconds);

        self.sys.refresh_memory();
        self.sys
            .refresh_processes(ProcessesToUpdate::Some(&[self.pid]), false);

        let process = self.sys.process(self.pid);
        self.metrics = ProcessMetrics {
            mem_total: self.sys.total_memory(),
            mem_used: self.sys.used_memory(),
            rss: process.map(|p| p.memory()),
            cpu: process.map(|p| p.cpu_usage()),
        };
        true
    }

    pub fn metrics(&self) -> &ProcessMetrics {
        &self.metrics
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn first_call_always_refreshes() {
        let mut s = ProcessSampler::new(60.0);
        assert!(s.maybe_refresh(0.0));
    }

    #[test]
    fn second_call_within_interval_skips() {
        let mut s = ProcessSampler::new(1.0);
        assert!(s.maybe_refresh(5.0));
        assert!(!s.maybe_refresh(5.5));
        assert!(s.maybe_refresh(6.0));
    }

    #[test]
    fn refresh_finds_own_process() {
        let mut s = ProcessSampler::new(1.0);
        s.maybe_refresh(0.0);
        assert!(s.metrics().mem_total > 0);
        assert!(s.metrics().rss.is_some());
    }
}

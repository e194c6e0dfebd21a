//! Per-resource activity classification against configured thresholds.

use crate::config::MonitorConfig;
use crate::types::{
    ActivityStatus, Classification, CpuTicks, Measure, NetBytes, RawValue, ResourceSample,
};

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Thresholds {
    pub cpu: f64,
    pub max_cpu: f64,
    pub mem: u64,
    pub net: u64,
}

impl From<&MonitorConfig> for Thresholds {
    fn from(c: &MonitorConfig) -> Self {
        Self {
            cpu: c.cpu_threshold,
            max_cpu: c.max_cpu_threshold,
            mem: c.mem_threshold,
            net: c.net_threshold,
        }
    }
}

/// The last sample seen for each resource.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PreviousStats {
    pub cpu: Option<CpuTicks>,
    pub mem: Option<u64>,
    pub net: Option<NetBytes>,
}

#[derive(Debug, Clone)]
pub struct ActivityClassifier {
    thresholds: Thresholds,
    prev: PreviousStats,
}

impl ActivityClassifier {
    pub fn new(thresholds: Thresholds) -> Self {
        Self {
            thresholds,
            prev: PreviousStats::default(),
        }
    }

    pub fn thresholds(&self) -> &Thresholds {
        &self.thresholds
    }

    pub fn previous(&self) -> &PreviousStats {
        &self.prev
    }

    /// Classify `sample` against the previous sample of the same kind, then
    /// retain it as the new previous sample.
    pub fn classify(&mut self, sample: &ResourceSample) -> Classification {
        let (status, measure) = match sample.value {
            RawValue::Cpu(cur) => {
                let out = match self.prev.cpu {
                    Some(prev) => self.classify_cpu(cpu_percent(prev, cur)),
                    None => (ActivityStatus::Idle, Measure::Baseline),
                };
                self.prev.cpu = Some(cur);
                out
            }
            RawValue::Mem(cur) => {
                let out = match self.prev.mem {
                    Some(prev) => self.classify_mem(prev, cur),
                    None => (ActivityStatus::Idle, Measure::Baseline),
                };
                self.prev.mem = Some(cur);
                out
            }
            RawValue::Net(cur) => {
                let out = match self.prev.net {
                    Some(prev) => self.classify_net(prev, cur),
                    None => (ActivityStatus::Idle, Measure::Baseline),
                };
                self.prev.net = Some(cur);
                out
            }
        };
        Classification {
            kind: sample.kind(),
            status,
            measure,
        }
    }

    fn classify_cpu(&self, percent: f64) -> (ActivityStatus, Measure) {
        // Critical outranks Active.
        let status = if percent > self.thresholds.max_cpu {
            ActivityStatus::Critical
        } else if percent > self.thresholds.cpu {
            ActivityStatus::Active
        } else {
            ActivityStatus::Idle
        };
        (status, Measure::CpuPercent(percent))
    }

    fn classify_mem(&self, prev: u64, cur: u64) -> (ActivityStatus, Measure) {
        let status = if cur.abs_diff(prev) > self.thresholds.mem {
            ActivityStatus::Active
        } else {
            ActivityStatus::Idle
        };
        (status, Measure::MemDelta(i128::from(cur) - i128::from(prev)))
    }

    fn classify_net(&self, prev: NetBytes, cur: NetBytes) -> (ActivityStatus, Measure) {
        // Counters that went backwards (interface removed, wrap) read as no traffic.
        let rx = cur.rx.saturating_sub(prev.rx);
        let tx = cur.tx.saturating_sub(prev.tx);
        let status = if rx > self.thresholds.net || tx > self.thresholds.net {
            ActivityStatus::Active
        } else {
            ActivityStatus::Idle
        };
        (status, Measure::NetDelta { rx, tx })
    }
}

/// Busy share of the ticks elapsed between two samples, 0 when none elapsed.
pub fn cpu_percent(prev: CpuTicks, cur: CpuTicks) -> f64 {
    let total = match cur.total.checked_sub(prev.total) {
        Some(d) if d > 0 => d,
        _ => return 0.0,
    };
    let busy = cur.busy.saturating_sub(prev.busy).min(total);
    100.0 * busy as f64 / total as f64
}

#[cfg(test)]
mod tests {
    use super::*;

    fn classifier() -> ActivityClassifier {
        ActivityClassifier::new(Thresholds {
            cpu: 5.0,
            max_cpu: 90.0,
            mem: 1024,
            net: 100,
        })
    }

    fn cpu(busy: u64, total: u64) -> ResourceSample {
        ResourceSample::new(RawValue::Cpu(CpuTicks { busy, total }))
    }

    fn mem(avail: u64) -> ResourceSample {
        ResourceSample::new(RawValue::Mem(avail))
    }

    fn net(rx: u64, tx: u64) -> ResourceSample {
        ResourceSample::new(RawValue::Net(NetBytes { rx, tx }))
    }

    #[test]
    fn first_sample_of_each_kind_is_a_baseline() {
        let mut c = classifier();
        for s in [cpu(999, 1000), mem(1 << 30), net(1 << 40, 1 << 40)] {
            let out = c.classify(&s);
            assert_eq!(out.status, ActivityStatus::Idle);
            assert_eq!(out.measure, Measure::Baseline);
        }
        assert!(c.previous().cpu.is_some());
        assert!(c.previous().mem.is_some());
        assert!(c.previous().net.is_some());
    }

    #[test]
    fn cpu_tiers() {
        let mut c = classifier();
        c.classify(&cpu(0, 1000));
        assert_eq!(c.classify(&cpu(2, 1100)).status, ActivityStatus::Idle);
        assert_eq!(c.classify(&cpu(52, 1200)).status, ActivityStatus::Active);
        // 95% busy is above both thresholds and must be Critical.
        let out = c.classify(&cpu(147, 1300));
        assert_eq!(out.status, ActivityStatus::Critical);
        assert_eq!(out.measure, Measure::CpuPercent(95.0));
    }

    #[test]
    fn cpu_at_threshold_is_not_above_it() {
        let mut c = classifier();
        c.classify(&cpu(0, 100));
        assert_eq!(c.classify(&cpu(5, 200)).status, ActivityStatus::Idle);
        c.classify(&cpu(0, 1000));
        c.classify(&cpu(0, 1100));
        assert_eq!(c.classify(&cpu(90, 1200)).status, ActivityStatus::Active);
    }

    #[test]
    fn zero_tick_delta_is_idle_whatever_the_busy_counter_says() {
        let mut c = classifier();
        for busy in [0u64, 50, 500, 5_000] {
            c.classify(&cpu(0, 1000));
            let out = c.classify(&cpu(busy, 1000));
            assert_eq!(out.status, ActivityStatus::Idle);
            assert_eq!(out.measure, Measure::CpuPercent(0.0));
        }
        // Counters running backwards count as no elapsed ticks too.
        c.classify(&cpu(900, 1000));
        assert_eq!(c.classify(&cpu(950, 10)).status, ActivityStatus::Idle);
    }

    #[test]
    fn memory_change_is_sign_agnostic() {
        let mut c = classifier();
        c.classify(&mem(500_000));
        let grow = c.classify(&mem(500_000 + 2048));
        assert_eq!(grow.status, ActivityStatus::Active);
        assert_eq!(grow.measure, Measure::MemDelta(2048));

        let shrink = c.classify(&mem(500_000));
        assert_eq!(shrink.status, ActivityStatus::Active);
        assert_eq!(shrink.measure, Measure::MemDelta(-2048));

        assert_eq!(c.classify(&mem(500_000 + 1024)).status, ActivityStatus::Idle);
    }

    #[test]
    fn network_needs_either_direction_over_threshold() {
        let mut c = classifier();
        c.classify(&net(1_000, 1_000));
        assert_eq!(c.classify(&net(1_100, 1_100)).status, ActivityStatus::Idle);
        assert_eq!(c.classify(&net(1_100, 1_201)).status, ActivityStatus::Active);
        assert_eq!(c.classify(&net(1_301, 1_201)).status, ActivityStatus::Active);
        // Counter reset after an interface went away.
        assert_eq!(c.classify(&net(10, 10)).status, ActivityStatus::Idle);
    }

    #[test]
    fn zero_counters_still_seed_a_baseline() {
        let mut c = classifier();
        c.classify(&net(0, 0));
        assert_eq!(c.classify(&net(5_000, 0)).status, ActivityStatus::Active);
    }
}

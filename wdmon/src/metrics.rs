//! Counter sources for the three monitored resources.
//!
//! A [`MetricSource`] only reports current counters; deltas are the
//! classifier's business. A failed read is a [`MetricError`] and the caller
//! skips that cycle.

#[cfg(target_os = "linux")]
use std::fs;
#[cfg(not(target_os = "linux"))]
use std::time::Instant;

use sysinfo::{CpuRefreshKind, MemoryRefreshKind, Networks, RefreshKind, System};

use crate::error::MetricError;
use crate::types::{CpuTicks, NetBytes, RawValue, ResourceKind, ResourceSample};

pub trait MetricSource {
    fn cpu(&mut self) -> Result<CpuTicks, MetricError>;

    /// Available memory in bytes.
    fn memory_available(&mut self) -> Result<u64, MetricError>;

    /// Cumulative RX/TX bytes over all non-loopback interfaces.
    fn network_bytes(&mut self) -> Result<NetBytes, MetricError>;

    fn sample(&mut self, kind: ResourceKind) -> Result<ResourceSample, MetricError> {
        let value = match kind {
            ResourceKind::Cpu => RawValue::Cpu(self.cpu()?),
            ResourceKind::Mem => RawValue::Mem(self.memory_available()?),
            ResourceKind::Net => RawValue::Net(self.network_bytes()?),
        };
        Ok(ResourceSample::new(value))
    }
}

/// Host counters backed by sysinfo, with CPU ticks from /proc/stat on Linux.
pub struct SystemMetrics {
    sys: System,
    networks: Networks,
    #[cfg(not(target_os = "linux"))]
    synthetic: SyntheticTicks,
}

impl SystemMetrics {
    pub fn new() -> Self {
        let refresh_kind = RefreshKind::nothing()
            .with_cpu(CpuRefreshKind::nothing().with_cpu_usage())
            .with_memory(MemoryRefreshKind::nothing().with_ram());
        let sys = System::new_with_specifics(refresh_kind);
        // Keep Networks alive across samples so totals stay cumulative per interface.
        let networks = Networks::new_with_refreshed_list();
        Self {
            sys,
            networks,
            #[cfg(not(target_os = "linux"))]
            synthetic: SyntheticTicks::default(),
        }
    }
}

impl Default for SystemMetrics {
    fn default() -> Self {
        Self::new()
    }
}

impl MetricSource for SystemMetrics {
    #[cfg(target_os = "linux")]
    fn cpu(&mut self) -> Result<CpuTicks, MetricError> {
        let stat = fs::read_to_string("/proc/stat")
            .map_err(|e| MetricError::unavailable(ResourceKind::Cpu, e.to_string()))?;
        parse_proc_stat(&stat)
            .ok_or_else(|| MetricError::unavailable(ResourceKind::Cpu, "no cpu line in /proc/stat"))
    }

    #[cfg(not(target_os = "linux"))]
    fn cpu(&mut self) -> Result<CpuTicks, MetricError> {
        self.sys.refresh_cpu_usage();
        if self.sys.cpus().is_empty() {
            return Err(MetricError::unavailable(ResourceKind::Cpu, "no CPUs reported"));
        }
        Ok(self
            .synthetic
            .advance(self.sys.global_cpu_usage(), Instant::now()))
    }

    fn memory_available(&mut self) -> Result<u64, MetricError> {
        self.sys.refresh_memory();
        if self.sys.total_memory() == 0 {
            return Err(MetricError::unavailable(ResourceKind::Mem, "memory totals not reported"));
        }
        Ok(self.sys.available_memory())
    }

    fn network_bytes(&mut self) -> Result<NetBytes, MetricError> {
        self.networks.refresh(true);
        let totals = self
            .networks
            .iter()
            .filter(|(name, _)| !is_loopback(name))
            .fold(NetBytes::default(), |acc, (_, data)| NetBytes {
                rx: acc.rx.saturating_add(data.total_received()),
                tx: acc.tx.saturating_add(data.total_transmitted()),
            });
        Ok(totals)
    }
}

pub fn is_loopback(iface: &str) -> bool {
    iface == "lo" || iface == "lo0"
}

/// Aggregate tick counters from the first line of /proc/stat:
/// "cpu  user nice system idle iowait irq softirq steal ...".
pub fn parse_proc_stat(stat: &str) -> Option<CpuTicks> {
    let line = stat.lines().next()?;
    let mut fields = line.split_whitespace();
    if fields.next()? != "cpu" {
        return None;
    }
    let ticks: Vec<u64> = fields
        .take(8)
        .map(|tok| tok.parse::<u64>())
        .collect::<Result<_, _>>()
        .ok()?;
    if ticks.len() < 4 {
        return None;
    }
    let total = ticks.iter().fold(0u64, |acc, v| acc.saturating_add(*v));
    let idle = ticks[3];
    Some(CpuTicks {
        busy: total.saturating_sub(idle),
        total,
    })
}

/// Tick counters built from sysinfo's usage percentage, one tick per millisecond.
#[cfg(not(target_os = "linux"))]
#[derive(Debug, Default)]
struct SyntheticTicks {
    last: Option<Instant>,
    ticks: CpuTicks,
}

#[cfg(not(target_os = "linux"))]
impl SyntheticTicks {
    fn advance(&mut self, usage_percent: f32, now: Instant) -> CpuTicks {
        if let Some(last) = self.last {
            let elapsed = now.duration_since(last).as_millis() as u64;
            let usage = f64::from(usage_percent.clamp(0.0, 100.0));
            let busy = (elapsed as f64 * usage / 100.0).round() as u64;
            self.ticks.total = self.ticks.total.saturating_add(elapsed);
            self.ticks.busy = self.ticks.busy.saturating_add(busy.min(elapsed));
        }
        self.last = Some(now);
        self.ticks
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_aggregate_cpu_line() {
        let stat = "cpu  100 5 50 800 20 3 2 0 0 0\ncpu0 50 2 25 400 10 1 1 0 0 0\n";
        let t = parse_proc_stat(stat).unwrap();
        assert_eq!(t.total, 980);
        assert_eq!(t.busy, 180);
    }

    #[test]
    fn tolerates_short_cpu_lines() {
        // Pre-2.6.11 kernels stop after softirq.
        let t = parse_proc_stat("cpu 10 0 10 80 0 0 0\n").unwrap();
        assert_eq!(t.total, 100);
        assert_eq!(t.busy, 20);
    }

    #[test]
    fn rejects_garbage() {
        assert!(parse_proc_stat("").is_none());
        assert!(parse_proc_stat("intr 1 2 3").is_none());
        assert!(parse_proc_stat("cpu a b c d").is_none());
        assert!(parse_proc_stat("cpu 1 2").is_none());
    }

    #[test]
    fn loopback_names() {
        assert!(is_loopback("lo"));
        assert!(is_loopback("lo0"));
        assert!(!is_loopback("eth0"));
        assert!(!is_loopback("wlo1"));
    }

    #[test]
    fn default_sample_dispatches_by_kind() {
        struct Fixed;
        impl MetricSource for Fixed {
            fn cpu(&mut self) -> Result<CpuTicks, MetricError> {
                Ok(CpuTicks { busy: 1, total: 2 })
            }
            fn memory_available(&mut self) -> Result<u64, MetricError> {
                Err(MetricError::unavailable(ResourceKind::Mem, "gone"))
            }
            fn network_bytes(&mut self) -> Result<NetBytes, MetricError> {
                Ok(NetBytes { rx: 3, tx: 4 })
            }
        }
        let mut src = Fixed;
        assert_eq!(src.sample(ResourceKind::Cpu).unwrap().kind(), ResourceKind::Cpu);
        assert_eq!(
            src.sample(ResourceKind::Net).unwrap().value,
            RawValue::Net(NetBytes { rx: 3, tx: 4 })
        );
        assert!(src.sample(ResourceKind::Mem).is_err());
    }

    #[cfg(target_os = "linux")]
    #[test]
    fn reads_live_proc_stat() {
        let mut m = SystemMetrics::new();
        let t = m.cpu().unwrap();
        assert!(t.total >= t.busy);
    }
}

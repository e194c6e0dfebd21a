//! Sample and classification types shared by the metric source, the classifier
//! and the feed engine.

use std::fmt;
use std::time::Instant;

use serde::Serialize;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ResourceKind {
    Cpu,
    Mem,
    Net,
}

impl ResourceKind {
    pub const ALL: [ResourceKind; 3] = [ResourceKind::Cpu, ResourceKind::Mem, ResourceKind::Net];

    pub fn as_str(self) -> &'static str {
        match self {
            ResourceKind::Cpu => "CPU",
            ResourceKind::Mem => "MEM",
            ResourceKind::Net => "NET",
        }
    }
}

impl fmt::Display for ResourceKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Cumulative CPU tick counters since boot.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct CpuTicks {
    pub busy: u64,
    pub total: u64,
}

/// Cumulative RX/TX byte counters summed over all non-loopback interfaces.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct NetBytes {
    pub rx: u64,
    pub tx: u64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RawValue {
    Cpu(CpuTicks),
    /// Available memory in bytes.
    Mem(u64),
    Net(NetBytes),
}

impl RawValue {
    pub fn kind(&self) -> ResourceKind {
        match self {
            RawValue::Cpu(_) => ResourceKind::Cpu,
            RawValue::Mem(_) => ResourceKind::Mem,
            RawValue::Net(_) => ResourceKind::Net,
        }
    }
}

/// One point-in-time reading of a single resource.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ResourceSample {
    pub at: Instant,
    pub value: RawValue,
}

impl ResourceSample {
    pub fn new(value: RawValue) -> Self {
        Self {
            at: Instant::now(),
            value,
        }
    }

    pub fn kind(&self) -> ResourceKind {
        self.value.kind()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ActivityStatus {
    Idle,
    Active,
    /// Only reachable for CPU.
    Critical,
}

impl ActivityStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            ActivityStatus::Idle => "idle",
            ActivityStatus::Active => "active",
            ActivityStatus::Critical => "critical",
        }
    }
}

impl fmt::Display for ActivityStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// What the classifier measured, kept for log lines.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Measure {
    /// No previous sample existed; this reading only seeds the baseline.
    Baseline,
    CpuPercent(f64),
    /// Signed change in available memory (bytes).
    MemDelta(i128),
    NetDelta { rx: u64, tx: u64 },
}

impl fmt::Display for Measure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Measure::Baseline => f.write_str("baseline"),
            Measure::CpuPercent(p) => write!(f, "{p:.2}%"),
            Measure::MemDelta(d) => write!(f, "{d} bytes change"),
            Measure::NetDelta { rx, tx } => write!(f, "RX:{rx} TX:{tx} bytes"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Classification {
    pub kind: ResourceKind,
    pub status: ActivityStatus,
    pub measure: Measure,
}

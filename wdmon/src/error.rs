//! Error types for the monitor, its metric source and the watchdog device.

use std::io;
use std::path::PathBuf;

use thiserror::Error;

use crate::types::ResourceKind;

/// A counter source could not be read. Recoverable: the cycle is skipped.
#[derive(Debug, Error)]
pub enum MetricError {
    #[error("{kind} counters unavailable: {reason}")]
    Unavailable { kind: ResourceKind, reason: String },
}

impl MetricError {
    pub fn unavailable(kind: ResourceKind, reason: impl Into<String>) -> Self {
        Self::Unavailable {
            kind,
            reason: reason.into(),
        }
    }
}

#[derive(Debug, Error)]
pub enum DeviceError {
    #[error("failed to open watchdog device {path}: {source}")]
    Open {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
    #[error("watchdog {op} failed: {source}")]
    Io {
        op: &'static str,
        #[source]
        source: io::Error,
    },
    #[error("watchdog is not armed")]
    NotArmed,
    #[error("watchdog unsupported: {0}")]
    Unsupported(String),
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
    #[error("failed to parse config {path}: {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: toml::de::Error,
    },
}

/// Every way the monitor can fail or deliberately stop feeding.
#[derive(Debug, Error)]
pub enum MonitorError {
    #[error(transparent)]
    MetricUnavailable(#[from] MetricError),
    #[error("failed to arm watchdog: {0}")]
    WatchdogArmFailed(#[source] DeviceError),
    #[error("failed to feed watchdog: {0}")]
    WatchdogFeedFailed(#[source] DeviceError),
    #[error("failed to stop watchdog: {0}")]
    WatchdogStopFailed(#[source] DeviceError),
    #[error("CPU usage {percent:.2}% exceeds maximum threshold {max:.2}%")]
    CriticalResourceExceeded { percent: f64, max: f64 },
    #[error("no system activity for {cycles} cycles (max {max})")]
    GraceExhausted { cycles: u32, max: u32 },
    #[error("event wait failed: {0}")]
    MultiplexWait(#[source] io::Error),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn messages_name_the_resource_and_limits() {
        let e = MetricError::unavailable(ResourceKind::Mem, "no MemAvailable");
        assert_eq!(e.to_string(), "MEM counters unavailable: no MemAvailable");

        let e = MonitorError::CriticalResourceExceeded {
            percent: 95.0,
            max: 90.0,
        };
        assert_eq!(
            e.to_string(),
            "CPU usage 95.00% exceeds maximum threshold 90.00%"
        );

        let e = MonitorError::from(MetricError::unavailable(ResourceKind::Cpu, "no /proc"));
        assert!(matches!(e, MonitorError::MetricUnavailable(_)));
        assert_eq!(e.to_string(), "CPU counters unavailable: no /proc");

        let e = MonitorError::GraceExhausted { cycles: 4, max: 3 };
        assert_eq!(e.to_string(), "no system activity for 4 cycles (max 3)");
    }
}

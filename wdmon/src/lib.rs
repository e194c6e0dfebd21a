//! Keeps a host alive by feeding its hardware watchdog while CPU, memory or
//! network counters show activity, and lets the watchdog reset the host when
//! the system looks hung or a runaway CPU load is detected.

pub mod classifier;
pub mod config;
pub mod device;
pub mod engine;
pub mod error;
pub mod logging;
pub mod metrics;
pub mod monitor;
pub mod mux;
pub mod types;

pub use config::{Config, ConfigPatch, MonitorConfig};
pub use device::{DeviceInfo, SoftWatchdog, WatchdogDevice};
#[cfg(target_os = "linux")]
pub use device::LinuxWatchdog;
pub use engine::{Event, FeedEngine, MonitorState, Phase, TerminationReason};
pub use error::{ConfigError, DeviceError, MetricError, MonitorError};
pub use metrics::{MetricSource, SystemMetrics};
pub use monitor::Monitor;
pub use mux::TimerMultiplexer;

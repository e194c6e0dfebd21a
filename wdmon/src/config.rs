//! Monitor configuration: built-in defaults, an optional TOML file, command-line
//! overrides, and the sanitising pass that runs before the monitor starts.

use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::ConfigError;
use crate::types::ResourceKind;

pub const DEFAULT_CONFIG_FILE: &str = "/etc/wdmon.toml";
pub const DEFAULT_LOG_FILE: &str = "/var/log/wdmon.log";
pub const DEFAULT_DEVICE: &str = "/dev/watchdog";

pub const MIN_WATCHDOG_TIMEOUT: u32 = 10;
/// Highest accepted CPU activity threshold; the critical tier needs room above it.
pub const MAX_CPU_THRESHOLD: f64 = 99.0;

/// Values read by the core. Immutable once the monitor starts.
#[derive(Debug, Clone, PartialEq)]
pub struct MonitorConfig {
    /// Hardware watchdog timeout, seconds.
    pub watchdog_timeout: u32,
    pub max_inactive_cycles: u32,
    /// CPU busy percentage above which the CPU counts as active.
    pub cpu_threshold: f64,
    /// CPU busy percentage above which the host is considered runaway.
    pub max_cpu_threshold: f64,
    /// Change in available memory (bytes) that counts as activity.
    pub mem_threshold: u64,
    /// RX or TX bytes per interval that count as activity.
    pub net_threshold: u64,
    pub cpu_check_interval: u64,
    pub mem_check_interval: u64,
    pub net_check_interval: u64,
}

impl Default for MonitorConfig {
    fn default() -> Self {
        Self {
            watchdog_timeout: 60,
            max_inactive_cycles: 3,
            cpu_threshold: 5.0,
            max_cpu_threshold: 90.0,
            mem_threshold: 1024,
            net_threshold: 100,
            cpu_check_interval: 20,
            mem_check_interval: 20,
            net_check_interval: 20,
        }
    }
}

impl MonitorConfig {
    pub fn check_interval(&self, kind: ResourceKind) -> Duration {
        let secs = match kind {
            ResourceKind::Cpu => self.cpu_check_interval,
            ResourceKind::Mem => self.mem_check_interval,
            ResourceKind::Net => self.net_check_interval,
        };
        Duration::from_secs(secs)
    }

    /// Bounded wait after which a cycle with no timer counts as quiescent.
    pub fn quiescent_timeout(&self) -> Duration {
        Duration::from_secs(u64::from(self.watchdog_timeout)) / 4
    }

    /// Minimum spacing between two grace-period feeds.
    pub fn grace_feed_window(&self) -> Duration {
        Duration::from_secs(u64::from(self.watchdog_timeout)) / 2
    }

    /// Clamp every value into its valid range, returning one message per fix.
    pub fn sanitize(&mut self) -> Vec<String> {
        let mut fixes = Vec::new();

        if self.watchdog_timeout < MIN_WATCHDOG_TIMEOUT {
            fixes.push(format!(
                "watchdog timeout {}s too low, using minimum of {MIN_WATCHDOG_TIMEOUT}s",
                self.watchdog_timeout
            ));
            self.watchdog_timeout = MIN_WATCHDOG_TIMEOUT;
        }

        // Intervals must outlast the quiescent wait or no quiet cycle is ever seen.
        let timeout = u64::from(self.watchdog_timeout);
        let fallback = timeout / 3;
        for (name, interval) in [
            ("cpu", &mut self.cpu_check_interval),
            ("mem", &mut self.mem_check_interval),
            ("net", &mut self.net_check_interval),
        ] {
            if interval.saturating_mul(4) <= timeout || *interval > timeout / 2 {
                fixes.push(format!(
                    "invalid {name} check interval {}s (must be above {:.1}s and at most {}s), using {fallback}s",
                    *interval,
                    timeout as f64 / 4.0,
                    timeout / 2
                ));
                *interval = fallback;
            }
        }

        if self.max_inactive_cycles < 1 {
            fixes.push("max inactive cycles must be at least 1, using 1".to_string());
            self.max_inactive_cycles = 1;
        }

        let default_cpu = MonitorConfig::default().cpu_threshold;
        if self.cpu_threshold.is_nan() {
            fixes.push(format!("CPU threshold is not a number, using {default_cpu:.1}%"));
            self.cpu_threshold = default_cpu;
        } else if self.cpu_threshold < 0.0 {
            fixes.push(format!(
                "CPU threshold {:.1}% is negative, using 0%",
                self.cpu_threshold
            ));
            self.cpu_threshold = 0.0;
        } else if self.cpu_threshold > MAX_CPU_THRESHOLD {
            fixes.push(format!(
                "CPU threshold {:.1}% too high, using {MAX_CPU_THRESHOLD:.1}%",
                self.cpu_threshold
            ));
            self.cpu_threshold = MAX_CPU_THRESHOLD;
        }

        if self.max_cpu_threshold.is_nan() || self.max_cpu_threshold <= self.cpu_threshold {
            let raised = self.cpu_threshold + 50.0;
            fixes.push(format!(
                "max CPU threshold ({:.1}%) must be greater than CPU threshold ({:.1}%), using {raised:.1}%",
                self.max_cpu_threshold, self.cpu_threshold
            ));
            self.max_cpu_threshold = raised;
        }

        if self.max_cpu_threshold > 100.0 {
            fixes.push(format!(
                "max CPU threshold {:.1}% too high, using 100%",
                self.max_cpu_threshold
            ));
            self.max_cpu_threshold = 100.0;
        }

        fixes
    }
}

/// Full runtime configuration of the monitor daemon.
#[derive(Debug, Clone, PartialEq)]
pub struct Config {
    pub monitor: MonitorConfig,
    pub log_file: PathBuf,
    pub log_enabled: bool,
    pub device: PathBuf,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            monitor: MonitorConfig::default(),
            log_file: PathBuf::from(DEFAULT_LOG_FILE),
            log_enabled: true,
            device: PathBuf::from(DEFAULT_DEVICE),
        }
    }
}

impl Config {
    /// Defaults, then the system-wide file if present, then `explicit` if given.
    /// An explicit file that cannot be read or parsed is an error.
    pub fn load(explicit: Option<&Path>) -> Result<Self, ConfigError> {
        let mut cfg = Config::default();
        let system = Path::new(DEFAULT_CONFIG_FILE);
        if system.exists() {
            cfg.apply(&ConfigPatch::from_file(system)?);
        }
        if let Some(path) = explicit {
            cfg.apply(&ConfigPatch::from_file(path)?);
        }
        Ok(cfg)
    }

    pub fn apply(&mut self, patch: &ConfigPatch) {
        let m = &mut self.monitor;
        if let Some(v) = patch.watchdog_timeout {
            m.watchdog_timeout = v;
        }
        if let Some(v) = patch.max_inactive_cycles {
            m.max_inactive_cycles = v;
        }
        if let Some(v) = patch.cpu_threshold {
            m.cpu_threshold = v;
        }
        if let Some(v) = patch.max_cpu_threshold {
            m.max_cpu_threshold = v;
        }
        if let Some(v) = patch.mem_threshold {
            m.mem_threshold = v;
        }
        if let Some(v) = patch.net_threshold {
            m.net_threshold = v;
        }
        // The shorthand goes first so per-resource keys win.
        if let Some(v) = patch.monitor_interval {
            m.cpu_check_interval = v;
            m.mem_check_interval = v;
            m.net_check_interval = v;
        }
        if let Some(v) = patch.cpu_check_interval {
            m.cpu_check_interval = v;
        }
        if let Some(v) = patch.mem_check_interval {
            m.mem_check_interval = v;
        }
        if let Some(v) = patch.net_check_interval {
            m.net_check_interval = v;
        }
        if let Some(v) = &patch.log_file {
            self.log_file = v.clone();
        }
        if let Some(v) = patch.log_enabled {
            self.log_enabled = v;
        }
        if let Some(v) = &patch.device {
            self.device = v.clone();
        }
    }

    /// Render as a fully populated patch, the same shape the loader reads.
    pub fn to_toml(&self) -> Result<String, toml::ser::Error> {
        toml::to_string(&ConfigPatch::from(self))
    }
}

/// A partial configuration: one layer of the file or the command line.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ConfigPatch {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub watchdog_timeout: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub max_inactive_cycles: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub cpu_threshold: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub max_cpu_threshold: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub mem_threshold: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub net_threshold: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub monitor_interval: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub cpu_check_interval: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub mem_check_interval: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub net_check_interval: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub log_file: Option<PathBuf>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub log_enabled: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub device: Option<PathBuf>,
}

impl ConfigPatch {
    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        let text = fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        toml::from_str(&text).map_err(|source| ConfigError::Parse {
            path: path.to_path_buf(),
            source,
        })
    }
}

impl From<&Config> for ConfigPatch {
    fn from(c: &Config) -> Self {
        let m = &c.monitor;
        Self {
            watchdog_timeout: Some(m.watchdog_timeout),
            max_inactive_cycles: Some(m.max_inactive_cycles),
            cpu_threshold: Some(m.cpu_threshold),
            max_cpu_threshold: Some(m.max_cpu_threshold),
            mem_threshold: Some(m.mem_threshold),
            net_threshold: Some(m.net_threshold),
            monitor_interval: None,
            cpu_check_interval: Some(m.cpu_check_interval),
            mem_check_interval: Some(m.mem_check_interval),
            net_check_interval: Some(m.net_check_interval),
            log_file: Some(c.log_file.clone()),
            log_enabled: Some(c.log_enabled),
            device: Some(c.device.clone()),
        }
    }
}

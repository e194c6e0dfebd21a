//! The feed/withhold decision core.
//!
//! [`FeedEngine::handle`] is the single transition function. It consumes one
//! [`Event`] at a time, samples and classifies on timer events, runs the grace
//! logic on quiescent cycles, and ends in a terminal [`Phase`]. Only
//! [`TerminationReason::NormalShutdown`] disarms the device; every other
//! terminal reason leaves it armed and unfed so the hardware resets the host.
//!
//! ```text
//!            TimerFired(kind) ──► sample ─► classify ─┬─ Idle ─────► (no-op)
//!                                                     ├─ Active ───► feed
//!   Running ◄─────────────────────────────────────────┤
//!      │                                              └─ Critical ─► Terminating(CriticalResource)
//!      ├── Quiescent ─► cycle ≤ max ─► grace feed (rate limited)
//!      │                cycle > max ─► Terminating(GraceExhausted)
//!      └── Shutdown ──► stop device ─► Terminating(NormalShutdown)
//! ```

use std::fmt;
use std::time::{Duration, Instant};

use tracing::{debug, error, info, warn};

use crate::classifier::{ActivityClassifier, Thresholds};
use crate::config::MonitorConfig;
use crate::device::WatchdogDevice;
use crate::error::MonitorError;
use crate::metrics::MetricSource;
use crate::types::{ActivityStatus, Classification, Measure, ResourceKind};

/// Minimum spacing of the detailed activity log lines.
const DETAILED_LOG_EVERY: Duration = Duration::from_secs(30);
/// Between detailed lines, every Nth activity feed gets a short line.
const HEALTHY_LOG_EVERY_NTH_FEED: u64 = 6;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Event {
    TimerFired(ResourceKind),
    /// No timer fired within a quarter of the watchdog timeout.
    Quiescent,
    Shutdown,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TerminationReason {
    CriticalResource,
    FeedFailure,
    GraceExhausted,
    NormalShutdown,
}

impl TerminationReason {
    /// Whether the device was disarmed on the way out.
    pub fn stops_watchdog(self) -> bool {
        matches!(self, TerminationReason::NormalShutdown)
    }
}

impl fmt::Display for TerminationReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            TerminationReason::CriticalResource => "critical resource condition",
            TerminationReason::FeedFailure => "watchdog feed failure",
            TerminationReason::GraceExhausted => "grace period exhausted",
            TerminationReason::NormalShutdown => "normal shutdown",
        })
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    Running,
    Terminating(TerminationReason),
}

/// Loop-owned bookkeeping. Created zeroed at startup, never persisted.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MonitorState {
    pub inactive_cycles: u32,
    /// Feeds caused by an Active classification.
    pub feed_count: u64,
    pub grace_feed_count: u64,
    pub last_detailed_log: Option<Instant>,
    pub last_grace_feed: Option<Instant>,
    /// Set by any Active classification, cleared by the next quiescent cycle.
    pub activity_since_check: bool,
}

pub struct FeedEngine<W, M> {
    config: MonitorConfig,
    device: W,
    metrics: M,
    classifier: ActivityClassifier,
    state: MonitorState,
    phase: Phase,
}

impl<W: WatchdogDevice, M: MetricSource> FeedEngine<W, M> {
    pub fn new(config: MonitorConfig, device: W, metrics: M) -> Self {
        let classifier = ActivityClassifier::new(Thresholds::from(&config));
        Self {
            config,
            device,
            metrics,
            classifier,
            state: MonitorState::default(),
            phase: Phase::Running,
        }
    }

    pub fn config(&self) -> &MonitorConfig {
        &self.config
    }

    pub fn state(&self) -> &MonitorState {
        &self.state
    }

    pub fn phase(&self) -> Phase {
        self.phase
    }

    pub fn is_running(&self) -> bool {
        self.phase == Phase::Running
    }

    pub fn device(&self) -> &W {
        &self.device
    }

    pub fn classifier(&self) -> &ActivityClassifier {
        &self.classifier
    }

    /// Arm the device with the configured timeout.
    pub fn arm(&mut self) -> Result<(), MonitorError> {
        self.device
            .arm(self.config.watchdog_timeout)
            .map_err(MonitorError::WatchdogArmFailed)?;
        info!(
            "Watchdog started with timeout: {} seconds",
            self.config.watchdog_timeout
        );
        Ok(())
    }

    /// Apply one event. Once terminal, further events are ignored.
    pub fn handle(&mut self, event: Event, now: Instant) -> Phase {
        if self.phase != Phase::Running {
            return self.phase;
        }
        match event {
            Event::TimerFired(kind) => self.on_timer(kind, now),
            Event::Quiescent => self.on_quiescent(now),
            Event::Shutdown => self.on_shutdown(),
        }
        self.phase
    }

    fn on_timer(&mut self, kind: ResourceKind, now: Instant) {
        let sample = match self.metrics.sample(kind) {
            Ok(s) => s,
            Err(e) => {
                warn!("{}; skipping this {kind} check", MonitorError::from(e));
                return;
            }
        };
        let c = self.classifier.classify(&sample);
        match c.status {
            ActivityStatus::Critical => {
                let percent = match c.measure {
                    Measure::CpuPercent(p) => p,
                    _ => 0.0,
                };
                let err = MonitorError::CriticalResourceExceeded {
                    percent,
                    max: self.config.max_cpu_threshold,
                };
                error!("CRITICAL: {err}!");
                error!("Stopping watchdog feed - system will reboot automatically");
                self.terminate(TerminationReason::CriticalResource);
            }
            ActivityStatus::Active => self.on_activity(c, now),
            ActivityStatus::Idle => {
                info!("{} idle: {} ({})", c.kind, c.measure, self.threshold_text(c.kind))
            }
        }
    }

    fn on_activity(&mut self, c: Classification, now: Instant) {
        let detailed = self.detailed_log_due(now);
        if detailed {
            info!("{} activity: {} ({})", c.kind, c.measure, self.threshold_text(c.kind));
        } else {
            info!("{} activity: {}", c.kind, c.measure);
        }

        self.state.inactive_cycles = 0;
        self.state.activity_since_check = true;

        if let Err(e) = self.device.feed() {
            error!("{}", MonitorError::WatchdogFeedFailed(e));
            error!("Error feeding watchdog! Exiting monitor.");
            self.terminate(TerminationReason::FeedFailure);
            return;
        }
        self.state.feed_count += 1;

        let n = self.state.feed_count;
        if detailed {
            info!("System activity detected - watchdog fed #{n} [{}: active]", c.kind);
            self.state.last_detailed_log = Some(now);
        } else if n % HEALTHY_LOG_EVERY_NTH_FEED == 0 {
            info!("Watchdog fed #{n} - system healthy");
        }
    }

    fn on_quiescent(&mut self, now: Instant) {
        if self.state.activity_since_check {
            info!("Quiet cycle after recent activity, no grace decision needed");
            self.state.activity_since_check = false;
            return;
        }

        let max = self.config.max_inactive_cycles;
        let cycles = self.state.inactive_cycles.saturating_add(1);
        info!("No system activity detected (cycle {cycles}/{max})");

        if cycles > max {
            let err = MonitorError::GraceExhausted { cycles, max };
            error!("CRITICAL: {err}!");
            error!("Stopping watchdog feed - system will reboot automatically");
            self.state.inactive_cycles = cycles;
            self.terminate(TerminationReason::GraceExhausted);
            return;
        }
        self.state.inactive_cycles = cycles;

        let window = self.config.grace_feed_window();
        if let Some(last) = self.state.last_grace_feed {
            let since = now.saturating_duration_since(last);
            if since < window {
                debug!("grace feed skipped, last one {:.1}s ago", since.as_secs_f64());
                return;
            }
        }

        if let Err(e) = self.device.feed() {
            error!("{}", MonitorError::WatchdogFeedFailed(e));
            error!("Error feeding watchdog! Exiting monitor.");
            self.terminate(TerminationReason::FeedFailure);
            return;
        }
        self.state.grace_feed_count += 1;
        self.state.last_grace_feed = Some(now);
        info!("Watchdog fed (grace period, cycle {cycles}/{max})");
    }

    fn on_shutdown(&mut self) {
        info!("Shutdown requested, stopping watchdog");
        match self.device.stop() {
            Ok(()) => info!("Watchdog stopped successfully"),
            Err(e) => warn!("{}", MonitorError::WatchdogStopFailed(e)),
        }
        self.terminate(TerminationReason::NormalShutdown);
    }

    fn terminate(&mut self, reason: TerminationReason) {
        info!("Monitor terminating: {reason}");
        self.phase = Phase::Terminating(reason);
    }

    fn detailed_log_due(&self, now: Instant) -> bool {
        match self.state.last_detailed_log {
            None => true,
            Some(last) => now.saturating_duration_since(last) >= DETAILED_LOG_EVERY,
        }
    }

    fn threshold_text(&self, kind: ResourceKind) -> String {
        match kind {
            ResourceKind::Cpu => format!(
                "threshold: {:.2}%, max: {:.2}%",
                self.config.cpu_threshold, self.config.max_cpu_threshold
            ),
            ResourceKind::Mem => format!("threshold: {}", self.config.mem_threshold),
            ResourceKind::Net => format!("threshold: {}", self.config.net_threshold),
        }
    }
}

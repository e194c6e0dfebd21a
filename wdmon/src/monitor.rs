//! The monitoring loop: the only place the process suspends.

use std::future::Future;
use std::io;

use tracing::info;

use crate::device::WatchdogDevice;
use crate::engine::{FeedEngine, Phase, TerminationReason};
use crate::metrics::MetricSource;
use crate::mux::TimerMultiplexer;

pub struct Monitor<W, M> {
    engine: FeedEngine<W, M>,
    mux: TimerMultiplexer,
}

impl<W: WatchdogDevice, M: MetricSource> Monitor<W, M> {
    pub fn new(engine: FeedEngine<W, M>, mux: TimerMultiplexer) -> Self {
        Self { engine, mux }
    }

    /// Feed events to the engine until it reaches a terminal phase.
    pub async fn run(&mut self) -> TerminationReason {
        info!(
            "Monitoring (quiet cycle after {:.1}s without timer events)",
            self.mux.quiescent_after().as_secs_f64()
        );
        loop {
            let event = self.mux.next_event().await;
            let now = tokio::time::Instant::now().into_std();
            if let Phase::Terminating(reason) = self.engine.handle(event, now) {
                return reason;
            }
        }
    }

    pub fn engine(&self) -> &FeedEngine<W, M> {
        &self.engine
    }

    pub fn into_engine(self) -> FeedEngine<W, M> {
        self.engine
    }
}

/// Resolves on SIGINT or SIGTERM (Ctrl-C off unix).
///
/// Handlers are installed here, so a registration failure surfaces before the
/// watchdog is armed.
#[cfg(unix)]
pub fn shutdown_signal() -> io::Result<impl Future<Output = ()> + Send + 'static> {
    use tokio::signal::unix::{signal, SignalKind};

    let mut sigterm = signal(SignalKind::terminate())?;
    let mut sigint = signal(SignalKind::interrupt())?;
    Ok(async move {
        tokio::select! {
            _ = sigterm.recv() => info!("Received SIGTERM"),
            _ = sigint.recv() => info!("Received SIGINT"),
        }
    })
}

#[cfg(not(unix))]
pub fn shutdown_signal() -> io::Result<impl Future<Output = ()> + Send + 'static> {
    Ok(async {
        match tokio::signal::ctrl_c().await {
            Ok(()) => info!("Received Ctrl+C"),
            Err(e) => {
                tracing::error!("Error waiting for Ctrl+C: {e}");
                std::future::pending::<()>().await;
            }
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::MonitorConfig;
    use crate::device::SoftWatchdog;
    use crate::error::MetricError;
    use crate::types::{CpuTicks, NetBytes, ResourceKind};
    use std::time::Duration;
    use tokio::sync::oneshot;

    /// A host whose counters can never be read.
    struct Blind;

    impl MetricSource for Blind {
        fn cpu(&mut self) -> Result<CpuTicks, MetricError> {
            Err(MetricError::unavailable(ResourceKind::Cpu, "blind"))
        }
        fn memory_available(&mut self) -> Result<u64, MetricError> {
            Err(MetricError::unavailable(ResourceKind::Mem, "blind"))
        }
        fn network_bytes(&mut self) -> Result<NetBytes, MetricError> {
            Err(MetricError::unavailable(ResourceKind::Net, "blind"))
        }
    }

    /// A host whose counters never move.
    struct Still;

    impl MetricSource for Still {
        fn cpu(&mut self) -> Result<CpuTicks, MetricError> {
            Ok(CpuTicks { busy: 10, total: 1000 })
        }
        fn memory_available(&mut self) -> Result<u64, MetricError> {
            Ok(1 << 30)
        }
        fn network_bytes(&mut self) -> Result<NetBytes, MetricError> {
            Ok(NetBytes { rx: 4096, tx: 2048 })
        }
    }

    fn config() -> MonitorConfig {
        MonitorConfig {
            watchdog_timeout: 10,
            max_inactive_cycles: 3,
            cpu_check_interval: 4,
            mem_check_interval: 4,
            net_check_interval: 4,
            ..MonitorConfig::default()
        }
    }

    fn monitor(
        shutdown: impl Future<Output = ()> + Send + 'static,
    ) -> Monitor<SoftWatchdog, Blind> {
        let cfg = config();
        let mut engine = FeedEngine::new(cfg.clone(), SoftWatchdog::new(), Blind);
        engine.arm().unwrap();
        Monitor::new(engine, TimerMultiplexer::new(&cfg, shutdown))
    }

    #[tokio::test(start_paused = true)]
    async fn silent_host_exhausts_grace_and_stays_armed() {
        let mut m = monitor(std::future::pending());
        assert_eq!(m.run().await, TerminationReason::GraceExhausted);

        let engine = m.into_engine();
        // Quiet cycles at ~2.5s, 6.5s, 10.5s; the 6.5s one falls inside the 5s window.
        assert_eq!(engine.state().inactive_cycles, 4);
        assert_eq!(engine.state().grace_feed_count, 2);
        assert!(engine.device().is_armed());
    }

    #[tokio::test(start_paused = true)]
    async fn idle_host_with_default_config_runs_the_grace_period() {
        let mut cfg = MonitorConfig::default();
        assert!(cfg.sanitize().is_empty());
        let mut engine = FeedEngine::new(cfg.clone(), SoftWatchdog::new(), Still);
        engine.arm().unwrap();
        let mut m = Monitor::new(engine, TimerMultiplexer::new(&cfg, std::future::pending()));

        let start = tokio::time::Instant::now();
        let reason = tokio::time::timeout(Duration::from_secs(300), m.run())
            .await
            .expect("monitor never reached a decision");
        assert_eq!(reason, TerminationReason::GraceExhausted);

        // Timers at 0/20/40/60s, quiet cycles at 15/35/55/75s; the 35s one is rate limited.
        let ended = tokio::time::Instant::now();
        let elapsed = ended - start;
        assert!(elapsed > Duration::from_secs(70) && elapsed < Duration::from_secs(80));

        let engine = m.into_engine();
        assert_eq!(engine.state().inactive_cycles, cfg.max_inactive_cycles + 1);
        assert_eq!(engine.state().grace_feed_count, 2);
        assert_eq!(engine.device().feed_count(), 2);
        assert_eq!(engine.state().feed_count, 0);

        // The decision lands before the hardware would have expired on its own.
        let last = engine.state().last_grace_feed.expect("grace feed recorded");
        let since_feed = ended.into_std().saturating_duration_since(last);
        assert!(since_feed < cfg.grace_feed_window() * 2);
        assert!(engine.device().is_armed());
    }

    #[tokio::test(start_paused = true)]
    async fn signal_stops_the_watchdog() {
        let (tx, rx) = oneshot::channel::<()>();
        let mut m = monitor(async move {
            let _ = rx.await;
        });
        tx.send(()).unwrap();
        assert_eq!(m.run().await, TerminationReason::NormalShutdown);
        assert!(!m.engine().device().is_armed());
    }
}

//! Waits on the three per-resource timers, a bounded quiescence deadline and
//! the shutdown signal, and turns whichever completes first into an [`Event`].

use std::future::Future;
use std::pin::Pin;
use std::time::Duration;

use tokio::time::{self, Interval, MissedTickBehavior};

use crate::config::MonitorConfig;
use crate::engine::Event;
use crate::types::ResourceKind;

type ShutdownFuture = Pin<Box<dyn Future<Output = ()> + Send>>;

pub struct TimerMultiplexer {
    cpu: Interval,
    mem: Interval,
    net: Interval,
    quiescent_after: Duration,
    shutdown: ShutdownFuture,
    shutdown_seen: bool,
}

fn periodic(period: Duration) -> Interval {
    // The first tick completes immediately, which seeds each baseline at startup.
    let mut iv = time::interval(period);
    // Consuming a tick clears every expiration that piled up behind it.
    iv.set_missed_tick_behavior(MissedTickBehavior::Skip);
    iv
}

impl TimerMultiplexer {
    /// Must be called from within a tokio runtime.
    pub fn new(config: &MonitorConfig, shutdown: impl Future<Output = ()> + Send + 'static) -> Self {
        Self {
            cpu: periodic(config.check_interval(ResourceKind::Cpu)),
            mem: periodic(config.check_interval(ResourceKind::Mem)),
            net: periodic(config.check_interval(ResourceKind::Net)),
            quiescent_after: config.quiescent_timeout(),
            shutdown: Box::pin(shutdown),
            shutdown_seen: false,
        }
    }

    pub fn quiescent_after(&self) -> Duration {
        self.quiescent_after
    }

    /// Block until the next event.
    ///
    /// Shutdown wins over timers that are ready at the same time. Timers
    /// ready together are reported one per call, in no particular order. The
    /// quiescence deadline restarts on every call.
    pub async fn next_event(&mut self) -> Event {
        let Self {
            cpu,
            mem,
            net,
            quiescent_after,
            shutdown,
            shutdown_seen,
        } = self;

        let timers = async {
            tokio::select! {
                _ = cpu.tick() => Event::TimerFired(ResourceKind::Cpu),
                _ = mem.tick() => Event::TimerFired(ResourceKind::Mem),
                _ = net.tick() => Event::TimerFired(ResourceKind::Net),
            }
        };

        tokio::select! {
            biased;
            _ = shutdown.as_mut(), if !*shutdown_seen => {
                *shutdown_seen = true;
                Event::Shutdown
            }
            fired = time::timeout(*quiescent_after, timers) => fired.unwrap_or(Event::Quiescent),
        }
    }
}

//! Entry point for the wdmon daemon. Loads configuration, arms the watchdog and
//! runs the monitor until shutdown or until the watchdog is left to expire.

use std::path::PathBuf;
use std::process::ExitCode;

use anyhow::Context;
use clap::Parser;
use tracing::{error, info, warn};

use wdmon::config::{Config, ConfigPatch};
use wdmon::device::{SoftWatchdog, WatchdogDevice};
use wdmon::engine::{FeedEngine, TerminationReason};
use wdmon::error::MonitorError;
use wdmon::logging;
use wdmon::metrics::SystemMetrics;
use wdmon::monitor::{shutdown_signal, Monitor};
use wdmon::mux::TimerMultiplexer;

#[derive(Debug, Parser)]
#[command(name = "wdmon", version, about = "Feed the hardware watchdog while the system shows activity")]
struct Args {
    /// Configuration file (TOML)
    #[arg(short = 'c', long = "config", value_name = "FILE")]
    config: Option<PathBuf>,

    /// Watchdog timeout in seconds
    #[arg(short = 'w', long = "timeout", value_name = "SECS")]
    timeout: Option<u32>,

    /// Check interval for all resources, in seconds
    #[arg(short = 'm', long = "monitor", value_name = "SECS")]
    monitor: Option<u64>,

    #[arg(long = "cpu-interval", value_name = "SECS")]
    cpu_interval: Option<u64>,

    #[arg(long = "mem-interval", value_name = "SECS")]
    mem_interval: Option<u64>,

    #[arg(long = "net-interval", value_name = "SECS")]
    net_interval: Option<u64>,

    /// Quiet cycles tolerated before the watchdog is left to expire
    #[arg(short = 'i', long = "inactive", value_name = "N")]
    inactive: Option<u32>,

    /// CPU busy percentage that counts as activity
    #[arg(short = 'p', long = "cpu", value_name = "PERCENT")]
    cpu: Option<f64>,

    /// CPU busy percentage that triggers a reboot
    #[arg(short = 'x', long = "max-cpu", value_name = "PERCENT")]
    max_cpu: Option<f64>,

    /// Available-memory change (bytes) that counts as activity
    #[arg(short = 'e', long = "memory", value_name = "BYTES")]
    memory: Option<u64>,

    /// Network bytes per interval that count as activity
    #[arg(short = 'n', long = "network", value_name = "BYTES")]
    network: Option<u64>,

    #[arg(short = 'l', long = "log-file", value_name = "FILE")]
    log_file: Option<PathBuf>,

    /// Log to the console only
    #[arg(short = 'd', long = "disable-log")]
    disable_log: bool,

    /// Watchdog device path
    #[arg(short = 'D', long = "device", value_name = "PATH")]
    device: Option<PathBuf>,

    /// Use an in-memory watchdog instead of the hardware device
    #[arg(long)]
    simulate: bool,

    /// Print the effective configuration as TOML and exit
    #[arg(long = "print-config")]
    print_config: bool,
}

impl Args {
    fn overrides(&self) -> ConfigPatch {
        ConfigPatch {
            watchdog_timeout: self.timeout,
            max_inactive_cycles: self.inactive,
            cpu_threshold: self.cpu,
            max_cpu_threshold: self.max_cpu,
            mem_threshold: self.memory,
            net_threshold: self.network,
            monitor_interval: self.monitor,
            cpu_check_interval: self.cpu_interval,
            mem_check_interval: self.mem_interval,
            net_check_interval: self.net_interval,
            log_file: self.log_file.clone(),
            log_enabled: self.disable_log.then_some(false),
            device: self.device.clone(),
        }
    }
}

fn open_device(cfg: &Config, simulate: bool) -> anyhow::Result<Box<dyn WatchdogDevice>> {
    if simulate {
        info!("Simulation mode: using in-memory watchdog");
        return Ok(Box::new(SoftWatchdog::new()));
    }
    #[cfg(target_os = "linux")]
    {
        Ok(Box::new(wdmon::device::LinuxWatchdog::new(&cfg.device)))
    }
    #[cfg(not(target_os = "linux"))]
    {
        anyhow::bail!(
            "no hardware watchdog support on this platform for {}; use --simulate",
            cfg.device.display()
        )
    }
}

fn log_summary(cfg: &Config) {
    let m = &cfg.monitor;
    info!("Starting wdmon (device: {})", cfg.device.display());
    info!(
        "Watchdog timeout: {}s, max inactive cycles: {}",
        m.watchdog_timeout, m.max_inactive_cycles
    );
    info!(
        "Check intervals - CPU: {}s, MEM: {}s, NET: {}s",
        m.cpu_check_interval, m.mem_check_interval, m.net_check_interval
    );
    info!(
        "Thresholds - CPU: {:.2}% (max {:.2}%), MEM: {} bytes, NET: {} bytes",
        m.cpu_threshold, m.max_cpu_threshold, m.mem_threshold, m.net_threshold
    );
}

#[tokio::main(flavor = "current_thread")]
async fn main() -> anyhow::Result<ExitCode> {
    let args = Args::parse();

    let mut cfg = Config::load(args.config.as_deref())?;
    cfg.apply(&args.overrides());
    let fixes = cfg.monitor.sanitize();

    if args.print_config {
        print!("{}", cfg.to_toml().context("rendering configuration")?);
        return Ok(ExitCode::SUCCESS);
    }

    let log_file = cfg.log_enabled.then_some(cfg.log_file.as_path());
    if let Some(w) = logging::init(log_file) {
        warn!("{w}; logging to console only");
    }
    for fix in &fixes {
        warn!("Config: {fix}");
    }
    log_summary(&cfg);

    let device = open_device(&cfg, args.simulate)?;
    let shutdown = shutdown_signal().map_err(MonitorError::MultiplexWait)?;

    let mut engine = FeedEngine::new(cfg.monitor.clone(), device, SystemMetrics::new());
    if let Err(e) = engine.arm() {
        error!("{e}");
        return Ok(ExitCode::FAILURE);
    }
    let dev = engine.device().info();
    if !dev.identity.is_empty() {
        info!("Watchdog identity: {} (firmware {})", dev.identity, dev.firmware_version);
    }

    let mux = TimerMultiplexer::new(&cfg.monitor, shutdown);
    let mut monitor = Monitor::new(engine, mux);
    let reason = monitor.run().await;

    let state = monitor.engine().state();
    info!(
        "Fed {} times on activity, {} grace feeds",
        state.feed_count, state.grace_feed_count
    );
    match reason {
        TerminationReason::NormalShutdown => {
            info!("Shutting down normally");
            Ok(ExitCode::SUCCESS)
        }
        other => {
            error!("Monitor stopped ({other}); system will reboot via watchdog timeout");
            // Dropping the device closes it without the magic character.
            drop(monitor);
            Ok(ExitCode::FAILURE)
        }
    }
}

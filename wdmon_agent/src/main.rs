//! wdmon_agent: HTTP control surface for a single watchdog device.

mod api;
mod error;
mod state;
mod types;

use std::net::{IpAddr, SocketAddr};
use std::path::PathBuf;

use anyhow::Context;
use clap::Parser;
use tracing::{info, warn};
use wdmon::config::DEFAULT_DEVICE;
use wdmon::device::{SoftWatchdog, WatchdogDevice};

use state::AppState;

#[derive(Debug, Parser)]
#[command(name = "wdmon_agent", version, about = "HTTP control for a hardware watchdog")]
struct Args {
    /// Listen port
    #[arg(short = 'p', long = "port", default_value_t = 9101)]
    port: u16,

    /// Listen address
    #[arg(short = 'b', long = "bind", default_value = "0.0.0.0")]
    bind: IpAddr,

    /// Watchdog device path
    #[arg(short = 'D', long = "device", default_value = DEFAULT_DEVICE)]
    device: PathBuf,

    /// Timeout used by /api/start when none is given, in seconds
    #[arg(short = 't', long = "timeout", default_value_t = 60)]
    timeout: u32,

    /// Use an in-memory watchdog instead of the hardware device
    #[arg(long)]
    simulate: bool,
}

fn open_device(args: &Args) -> anyhow::Result<Box<dyn WatchdogDevice>> {
    if args.simulate {
        return Ok(Box::new(SoftWatchdog::new()));
    }
    #[cfg(target_os = "linux")]
    {
        Ok(Box::new(wdmon::device::LinuxWatchdog::new(&args.device)))
    }
    #[cfg(not(target_os = "linux"))]
    {
        anyhow::bail!(
            "no hardware watchdog support on this platform for {}; use --simulate",
            args.device.display()
        )
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();
    wdmon::logging::init(None);

    anyhow::ensure!(args.timeout > 0, "timeout must be at least 1 second");
    let device = open_device(&args)?;
    let device_path = if args.simulate {
        "simulated".to_string()
    } else {
        args.device.display().to_string()
    };
    let state = AppState::new(device, args.timeout, device_path);
    let app = api::router(state.clone());

    let addr = SocketAddr::new(args.bind, args.port);
    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .with_context(|| format!("binding {addr}"))?;
    info!("Watchdog control agent listening on http://{addr}");

    let shutdown = wdmon::monitor::shutdown_signal().context("installing signal handlers")?;
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown)
        .await
        .context("serving HTTP")?;

    let mut ctl = state.controller.lock().await;
    if ctl.is_running() {
        match ctl.stop() {
            Ok(()) => info!("Watchdog stopped on exit"),
            Err(e) => warn!("{e}"),
        }
    }
    info!("Agent shut down");
    Ok(())
}

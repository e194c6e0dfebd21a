//! Shared agent state: the one watchdog device and its bookkeeping.

use std::sync::Arc;

use chrono::{DateTime, Local};
use tokio::sync::Mutex;
use tracing::{debug, info};
use wdmon::device::WatchdogDevice;

use crate::error::ApiError;
use crate::types::{InfoResponse, StatusResponse};

pub type SharedController = Arc<Mutex<Controller>>;

#[derive(Clone)]
pub struct AppState {
    pub controller: SharedController,
    pub hostname: String,
    pub device_path: String,
}

impl AppState {
    pub fn new(device: Box<dyn WatchdogDevice>, timeout_secs: u32, device_path: String) -> Self {
        let hostname = hostname::get()
            .map(|h| h.to_string_lossy().into_owned())
            .unwrap_or_else(|_| "unknown".into());
        Self {
            controller: Arc::new(Mutex::new(Controller::new(device, timeout_secs))),
            hostname,
            device_path,
        }
    }
}

/// Start/feed/stop over a single device. Configuration only changes while stopped.
pub struct Controller {
    device: Box<dyn WatchdogDevice>,
    timeout_secs: u32,
    running: bool,
    feed_count: u64,
    armed_at: Option<DateTime<Local>>,
    last_feed: Option<DateTime<Local>>,
}

impl Controller {
    pub fn new(device: Box<dyn WatchdogDevice>, timeout_secs: u32) -> Self {
        Self {
            device,
            timeout_secs,
            running: false,
            feed_count: 0,
            armed_at: None,
            last_feed: None,
        }
    }

    pub fn is_running(&self) -> bool {
        self.running
    }

    pub fn status(&self) -> StatusResponse {
        StatusResponse {
            running: self.running,
            timeout_secs: self.timeout_secs,
            feed_count: self.feed_count,
            armed_at: self.armed_at.map(|t| t.to_rfc3339()),
            last_feed: self.last_feed.map(|t| t.to_rfc3339()),
        }
    }

    pub fn info(&self, hostname: &str, device: &str) -> InfoResponse {
        let d = self.device.info();
        InfoResponse {
            hostname: hostname.to_string(),
            device: device.to_string(),
            identity: d.identity,
            firmware_version: d.firmware_version,
            options: d.options,
        }
    }

    /// Arm with `timeout` if given (which also becomes the stored timeout).
    pub fn start(&mut self, timeout: Option<u32>) -> Result<StatusResponse, ApiError> {
        if self.running {
            return Err(ApiError::Conflict("Watchdog is already running"));
        }
        let timeout = match timeout {
            Some(0) => return Err(ApiError::BadRequest("timeout must be at least 1 second".into())),
            Some(t) => t,
            None => self.timeout_secs,
        };
        self.device
            .arm(timeout)
            .map_err(|e| ApiError::Device("Failed to start watchdog", e))?;
        let now = Local::now();
        self.timeout_secs = timeout;
        self.running = true;
        self.feed_count = 0;
        self.armed_at = Some(now);
        self.last_feed = Some(now);
        info!("Watchdog started with timeout: {timeout} seconds");
        Ok(self.status())
    }

    pub fn trigger(&mut self) -> Result<(), ApiError> {
        if !self.running {
            return Err(ApiError::Conflict("Watchdog is not running"));
        }
        self.device
            .feed()
            .map_err(|e| ApiError::Device("Failed to trigger watchdog", e))?;
        self.feed_count += 1;
        self.last_feed = Some(Local::now());
        debug!("Watchdog triggered #{}", self.feed_count);
        Ok(())
    }

    pub fn stop(&mut self) -> Result<(), ApiError> {
        if !self.running {
            return Err(ApiError::Conflict("Watchdog is not running"));
        }
        self.device
            .stop()
            .map_err(|e| ApiError::Device("Failed to stop watchdog", e))?;
        self.running = false;
        self.armed_at = None;
        info!("Watchdog stopped after {} feeds", self.feed_count);
        Ok(())
    }

    pub fn configure(&mut self, timeout: Option<u32>) -> Result<StatusResponse, ApiError> {
        if self.running {
            return Err(ApiError::Conflict(
                "Cannot configure watchdog while running. Stop it first.",
            ));
        }
        let timeout = match timeout {
            None => return Err(ApiError::BadRequest("missing timeout parameter".into())),
            Some(0) => return Err(ApiError::BadRequest("timeout must be at least 1 second".into())),
            Some(t) => t,
        };
        self.timeout_secs = timeout;
        info!("Watchdog timeout configured: {timeout} seconds");
        Ok(self.status())
    }
}

//! Watchdog device primitives: arm, feed, stop.
//!
//! [`LinuxWatchdog`] drives a kernel watchdog character device. Dropping it
//! without [`WatchdogDevice::stop`] closes the descriptor without the magic
//! close character, so the hardware keeps counting down and resets the host.
//! [`SoftWatchdog`] keeps the same state machine in memory.

use std::time::{Duration, Instant};

use serde::Serialize;
use tracing::debug;

use crate::error::DeviceError;

pub trait WatchdogDevice: Send {
    /// Start the watchdog and reset its countdown to `timeout_secs`.
    fn arm(&mut self, timeout_secs: u32) -> Result<(), DeviceError>;

    /// Reset the countdown without changing the armed state.
    fn feed(&mut self) -> Result<(), DeviceError>;

    /// Disarm. Only used on a clean shutdown.
    fn stop(&mut self) -> Result<(), DeviceError>;

    fn info(&self) -> DeviceInfo {
        DeviceInfo::default()
    }
}

impl<W: WatchdogDevice + ?Sized> WatchdogDevice for Box<W> {
    fn arm(&mut self, timeout_secs: u32) -> Result<(), DeviceError> {
        (**self).arm(timeout_secs)
    }

    fn feed(&mut self) -> Result<(), DeviceError> {
        (**self).feed()
    }

    fn stop(&mut self) -> Result<(), DeviceError> {
        (**self).stop()
    }

    fn info(&self) -> DeviceInfo {
        (**self).info()
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct DeviceInfo {
    pub identity: String,
    pub firmware_version: u32,
    /// Driver option bits (WDIOF_*).
    pub options: u32,
}

/// In-memory watchdog used by `--simulate` and by tests.
#[derive(Debug, Default)]
pub struct SoftWatchdog {
    timeout: Option<Duration>,
    last_feed: Option<Instant>,
    feeds: u64,
}

impl SoftWatchdog {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_armed(&self) -> bool {
        self.timeout.is_some()
    }

    pub fn timeout(&self) -> Option<Duration> {
        self.timeout
    }

    pub fn feed_count(&self) -> u64 {
        self.feeds
    }

    /// Whether the countdown would have reset the host by `now`.
    pub fn expired(&self, now: Instant) -> bool {
        match (self.timeout, self.last_feed) {
            (Some(timeout), Some(last)) => now.saturating_duration_since(last) > timeout,
            _ => false,
        }
    }
}

impl WatchdogDevice for SoftWatchdog {
    fn arm(&mut self, timeout_secs: u32) -> Result<(), DeviceError> {
        self.timeout = Some(Duration::from_secs(u64::from(timeout_secs)));
        self.last_feed = Some(Instant::now());
        debug!("soft watchdog armed ({timeout_secs}s)");
        Ok(())
    }

    fn feed(&mut self) -> Result<(), DeviceError> {
        if !self.is_armed() {
            return Err(DeviceError::NotArmed);
        }
        self.last_feed = Some(Instant::now());
        self.feeds += 1;
        Ok(())
    }

    fn stop(&mut self) -> Result<(), DeviceError> {
        if self.timeout.take().is_none() {
            return Err(DeviceError::NotArmed);
        }
        self.last_feed = None;
        debug!("soft watchdog stopped");
        Ok(())
    }

    fn info(&self) -> DeviceInfo {
        DeviceInfo {
            identity: "Software Watchdog".to_string(),
            firmware_version: 0,
            options: 0,
        }
    }
}

#[cfg(target_os = "linux")]
pub use linux::LinuxWatchdog;

#[cfg(target_os = "linux")]
mod linux {
    use std::fs::{File, OpenOptions};
    use std::io::{self, Write};
    use std::os::unix::io::AsRawFd;
    use std::path::{Path, PathBuf};

    use tracing::debug;

    use super::{DeviceInfo, WatchdogDevice};
    use crate::error::DeviceError;

    // linux/watchdog.h, asm-generic ioctl encoding.
    const WDIOC_GETSUPPORT: u32 = 0x8028_5700;
    const WDIOC_KEEPALIVE: u32 = 0x8004_5705;
    const WDIOC_SETTIMEOUT: u32 = 0xC004_5706;

    #[repr(C)]
    #[derive(Default)]
    struct WatchdogInfo {
        options: u32,
        firmware_version: u32,
        identity: [u8; 32],
    }

    /// Kernel watchdog device such as `/dev/watchdog`.
    pub struct LinuxWatchdog {
        path: PathBuf,
        file: Option<File>,
    }

    impl LinuxWatchdog {
        pub fn new(path: impl AsRef<Path>) -> Self {
            Self {
                path: path.as_ref().to_path_buf(),
                file: None,
            }
        }

        pub fn path(&self) -> &Path {
            &self.path
        }

        fn ioctl<T>(file: &File, request: u32, arg: &mut T, op: &'static str) -> Result<(), DeviceError> {
            // SAFETY: `arg` is a live, exclusively borrowed value of the type the
            // request expects; the kernel writes at most size_of::<T>() bytes.
            let rc = unsafe { libc::ioctl(file.as_raw_fd(), request as _, arg as *mut T) };
            if rc < 0 {
                return Err(DeviceError::Io {
                    op,
                    source: io::Error::last_os_error(),
                });
            }
            Ok(())
        }

        fn keepalive(file: &File) -> Result<(), DeviceError> {
            let mut dummy: libc::c_int = 0;
            Self::ioctl(file, WDIOC_KEEPALIVE, &mut dummy, "keepalive")
        }
    }

    impl WatchdogDevice for LinuxWatchdog {
        fn arm(&mut self, timeout_secs: u32) -> Result<(), DeviceError> {
            if self.file.is_none() {
                // Opening the device starts the countdown.
                let file = OpenOptions::new()
                    .write(true)
                    .open(&self.path)
                    .map_err(|source| DeviceError::Open {
                        path: self.path.clone(),
                        source,
                    })?;
                self.file = Some(file);
            }
            let file = self.file.as_ref().ok_or(DeviceError::NotArmed)?;
            let mut timeout = libc::c_int::try_from(timeout_secs).map_err(|_| {
                DeviceError::Unsupported(format!("timeout {timeout_secs}s out of range"))
            })?;
            Self::ioctl(file, WDIOC_SETTIMEOUT, &mut timeout, "set timeout")?;
            if timeout != timeout_secs as libc::c_int {
                debug!("{} rounded timeout to {timeout}s", self.path.display());
            }
            Self::keepalive(file)
        }

        fn feed(&mut self) -> Result<(), DeviceError> {
            let file = self.file.as_ref().ok_or(DeviceError::NotArmed)?;
            Self::keepalive(file)
        }

        fn stop(&mut self) -> Result<(), DeviceError> {
            let mut file = self.file.take().ok_or(DeviceError::NotArmed)?;
            // Magic close: the driver disarms when 'V' precedes close().
            file.write_all(b"V").map_err(|source| DeviceError::Io {
                op: "magic close",
                source,
            })?;
            Ok(())
        }

        fn info(&self) -> DeviceInfo {
            let Some(file) = self.file.as_ref() else {
                return DeviceInfo::default();
            };
            let mut raw = WatchdogInfo::default();
            match Self::ioctl(file, WDIOC_GETSUPPORT, &mut raw, "get support") {
                Ok(()) => {
                    let end = raw.identity.iter().position(|b| *b == 0).unwrap_or(raw.identity.len());
                    DeviceInfo {
                        identity: String::from_utf8_lossy(&raw.identity[..end]).into_owned(),
                        firmware_version: raw.firmware_version,
                        options: raw.options,
                    }
                }
                Err(e) => {
                    debug!("{e}");
                    DeviceInfo::default()
                }
            }
        }
    }
}

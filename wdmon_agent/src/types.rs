//! JSON bodies returned by the control API.

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StatusResponse {
    pub running: bool,
    pub timeout_secs: u32,
    pub feed_count: u64,
    // RFC 3339, null when absent
    pub armed_at: Option<String>,
    pub last_feed: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InfoResponse {
    pub hostname: String,
    pub device: String,
    pub identity: String,
    pub firmware_version: u32,
    pub options: u32,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ActionResponse {
    pub status: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub watchdog: Option<StatusResponse>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ErrorResponse {
    pub error: String,
}

/// `?timeout=N` on start and configure.
#[derive(Debug, Default, Deserialize)]
pub struct TimeoutQuery {
    pub timeout: Option<u32>,
}

//! API request and response structures

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::state::{SelectedDuration, TimerSnapshot};

/// Body of POST /select
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct SelectRequest {
    #[serde(default)]
    pub hours: u32,
    #[serde(default)]
    pub minutes: u32,
    #[serde(default)]
    pub seconds: u32,
}

/// API response structure for timer command endpoints
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ApiResponse {
    pub status: String,
    pub message: String,
    pub timestamp: DateTime<Utc>,
    pub timer: TimerSnapshot,
}

impl ApiResponse {
    /// Create a new API response whose status is the run state
    pub fn new(message: String, timer: TimerSnapshot) -> Self {
        let status = serde_json::to_value(timer.state)
            .ok()
            .and_then(|value| value.as_str().map(str::to_string))
            .unwrap_or_default();
        Self {
            status,
            message,
            timestamp: Utc::now(),
            timer,
        }
    }
}

/// Full status: timer snapshot, picker state and control enablement
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StatusResponse {
    pub timer: TimerSnapshot,
    pub selection: SelectedDuration,
    pub can_start: bool,
    pub can_reset: bool,
    pub observers: usize,
    pub background_jobs: usize,
    pub uptime: String,
    pub port: u16,
    pub host: String,
    pub last_action: Option<String>,
    pub last_action_time: Option<DateTime<Utc>>,
}

/// Response of POST /background/:run_id/cancel
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BackgroundCancelResponse {
    pub run_id: String,
    pub cancelled: bool,
    pub timestamp: DateTime<Utc>,
}

/// Health check response
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HealthResponse {
    pub status: String,
    pub timestamp: DateTime<Utc>,
    pub version: String,
}

impl HealthResponse {
    /// Create a new health response
    pub fn ok() -> Self {
        Self {
            status: "ok".to_string(),
            timestamp: Utc::now(),
            version: env!("CARGO_PKG_VERSION").to_string(),
        }
    }
}

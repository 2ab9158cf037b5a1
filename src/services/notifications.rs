//! Desktop notification surface used by the background countdown

use async_trait::async_trait;
use tokio::process::Command;
use tracing::{debug, info};

/// Slot tag under which every progress and finish notification is posted.
/// Notification daemons replace a notification carrying the same tag.
pub const PROGRESS_SLOT: &str = "countdown-timer";

/// Where background progress becomes visible to the user.
///
/// Both calls are best-effort: callers log failures and carry on.
#[async_trait]
pub trait NotificationSurface: Send + Sync {
    /// Replace the progress notification in the fixed slot
    async fn post_progress(&self, text: &str) -> Result<(), String>;

    /// Replace the progress notification with the final one
    async fn post_finished(&self, text: &str) -> Result<(), String>;
}

/// Posts notifications through `notify-send`
#[derive(Debug, Clone)]
pub struct DesktopNotifier {
    app_name: String,
    enabled: bool,
}

impl DesktopNotifier {
    pub fn new(app_name: impl Into<String>, enabled: bool) -> Self {
        Self {
            app_name: app_name.into(),
            enabled,
        }
    }

    pub fn is_enabled(&self) -> bool {
        self.enabled
    }

    async fn notify(&self, urgency: &str, text: &str) -> Result<(), String> {
        if !self.enabled {
            debug!("Notifications disabled, skipping: {}", text);
            return Ok(());
        }

        let hint = format!("string:x-canonical-private-synchronous:{}", PROGRESS_SLOT);
        let output = Command::new("notify-send")
            .args(["--app-name", self.app_name.as_str(), "--urgency", urgency, "--hint", hint.as_str()])
            .arg(&self.app_name)
            .arg(text)
            .output()
            .await
            .map_err(|e| format!("Failed to execute notify-send: {}", e))?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(format!("notify-send failed: {}", stderr.trim()));
        }

        debug!("Posted notification: {}", text);
        Ok(())
    }
}

#[async_trait]
impl NotificationSurface for DesktopNotifier {
    async fn post_progress(&self, text: &str) -> Result<(), String> {
        self.notify("low", text).await
    }

    async fn post_finished(&self, text: &str) -> Result<(), String> {
        self.notify("normal", text).await
    }
}

/// Check whether `notify-send` can be executed on this system
pub async fn check_notify_send_available() -> Result<(), String> {
    Command::new("notify-send")
        .arg("--version")
        .output()
        .await
        .map_err(|_| "notify-send is not available, desktop notifications disabled".to_string())?;

    info!("notify-send is available");
    Ok(())
}

//! Completion alert surface

use std::io::Write;

use tokio::{process::Command, runtime::Handle};
use tracing::{debug, info, warn};

/// Plays the audible/visual completion cue. Must not block the caller.
pub trait AlertSurface: Send + Sync {
    fn play_completion_alert(&self);
}

/// Runs a configured tone command, or rings the terminal bell when none
/// is configured.
#[derive(Debug, Clone, Default)]
pub struct ToneAlert {
    command: Option<Vec<String>>,
}

impl ToneAlert {
    /// Build from a whitespace separated command line such as
    /// `paplay /usr/share/sounds/freedesktop/stereo/complete.oga`
    pub fn new(command_line: Option<&str>) -> Self {
        let command = command_line
            .map(|line| line.split_whitespace().map(str::to_string).collect::<Vec<_>>())
            .filter(|parts| !parts.is_empty());
        Self { command }
    }

    fn ring_bell() {
        let mut stdout = std::io::stdout();
        if let Err(e) = stdout.write_all(b"\x07").and_then(|_| stdout.flush()) {
            warn!("Failed to ring terminal bell: {}", e);
        }
    }
}

impl AlertSurface for ToneAlert {
    fn play_completion_alert(&self) {
        let Some(parts) = self.command.clone() else {
            info!("Playing timer finished sound (terminal bell)");
            Self::ring_bell();
            return;
        };

        let Ok(handle) = Handle::try_current() else {
            warn!("No async runtime available, falling back to terminal bell");
            Self::ring_bell();
            return;
        };

        info!("Playing timer finished sound ({})", parts[0]);
        handle.spawn(async move {
            let output = Command::new(&parts[0]).args(&parts[1..]).output().await;
            match output {
                Ok(output) if output.status.success() => debug!("Alert command finished"),
                Ok(output) => {
                    let stderr = String::from_utf8_lossy(&output.stderr);
                    warn!("Alert command failed: {}", stderr.trim());
                }
                Err(e) => warn!("Failed to execute alert command {}: {}", parts[0], e),
            }
        });
    }
}

//! Fire-once latch for the completion alert
//!
//! The foreground and background countdowns may both observe zero for the
//! same run, possibly from different processes. The latch is a marker file
//! per run created with `create_new`, which the filesystem checks and sets
//! as one atomic step; whoever creates it plays the alert.

use std::{
    fs::{self, OpenOptions},
    io::{ErrorKind, Write},
    path::{Path, PathBuf},
    sync::Arc,
};

use chrono::Utc;
use tracing::{debug, error, info, warn};

use crate::{
    error::{Result, TimerError},
    services::AlertSurface,
    state::RunId,
};

pub struct AlertGate {
    dir: PathBuf,
    surface: Arc<dyn AlertSurface>,
}

impl AlertGate {
    pub fn open(dir: impl Into<PathBuf>, surface: Arc<dyn AlertSurface>) -> Result<Self> {
        let dir = dir.into();
        fs::create_dir_all(&dir).map_err(|e| TimerError::store(&dir, e))?;
        Ok(Self { dir, surface })
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Play the alert if nobody has for this run yet. Returns whether this
    /// call was the one that fired.
    pub fn fire_once(&self, run_id: RunId) -> bool {
        let path = self.marker_path(run_id);
        let mut marker = match OpenOptions::new().write(true).create_new(true).open(&path) {
            Ok(file) => file,
            Err(e) if e.kind() == ErrorKind::AlreadyExists => {
                debug!("Alert for run {} already fired", run_id);
                return false;
            }
            Err(e) => {
                error!("Failed to create alert marker {}: {}", path.display(), e);
                return false;
            }
        };

        if let Err(e) = writeln!(marker, "{}", Utc::now().to_rfc3339()).and_then(|_| marker.sync_all()) {
            warn!("Failed to sync alert marker {}: {}", path.display(), e);
        }

        info!("Completion alert for run {}", run_id);
        self.surface.play_completion_alert();
        true
    }

    pub fn has_fired(&self, run_id: RunId) -> bool {
        self.marker_path(run_id).exists()
    }

    /// Drop the marker of a run that will never be counted again
    pub fn forget(&self, run_id: RunId) -> Result<()> {
        let path = self.marker_path(run_id);
        match fs::remove_file(&path) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(()),
            Err(e) => Err(TimerError::store(path, e)),
        }
    }

    fn marker_path(&self, run_id: RunId) -> PathBuf {
        self.dir.join(format!("{}.fired", run_id))
    }
}

//! Mirrors a handed-off run's background progress onto the foreground
//! snapshot channel

use std::sync::Arc;

use tokio::sync::broadcast::{self, error::RecvError};
use tracing::{debug, warn};

use crate::{
    services::JobRecord,
    state::{AppState, RunId},
};

/// Publishes every background record change of `run_id` to attached
/// observers, until the run finishes, is cancelled or replaced.
pub async fn background_mirror_task(
    state: Arc<AppState>,
    run_id: RunId,
    mut updates: broadcast::Receiver<JobRecord>,
) {
    debug!("Mirroring background countdown for run {}", run_id);

    loop {
        // Updates of other runs still wake the mirror, so it notices when
        // this run has been replaced
        match updates.recv().await {
            Ok(_) => {}
            // The store holds the latest record, so a resync covers the gap
            Err(RecvError::Lagged(skipped)) => {
                warn!("Background mirror for run {} skipped {} updates", run_id, skipped);
            }
            Err(RecvError::Closed) => break,
        }

        if !state.mirror_background(run_id) {
            break;
        }
    }

    debug!("Stopped mirroring run {}", run_id);
}

//! Foreground countdown loop

use std::sync::Arc;

use tokio::{sync::watch, time::Instant};
use tracing::debug;

use crate::{
    state::{AppState, RunId, TickControl},
    tasks::Ticker,
};

/// Drives the engine for one run while an observer is attached.
///
/// Exits when the run completes, is cancelled, is reset or is handed off
/// to the background scheduler. The stop signal is polled ahead of the
/// tick, so no tick lands after a stop has been requested.
pub async fn foreground_tick_task(
    state: Arc<AppState>,
    run_id: RunId,
    deadline: Instant,
    mut stop_rx: watch::Receiver<bool>,
) {
    debug!("Starting foreground countdown for run {}", run_id);

    let mut ticker = Ticker::new(state.tick_interval, deadline);

    loop {
        tokio::select! {
            biased;

            Ok(()) = stop_rx.changed() => {
                if *stop_rx.borrow() {
                    debug!("Foreground countdown for run {} stopped", run_id);
                    break;
                }
            }

            now = ticker.tick() => {
                if state.tick(run_id, now) == TickControl::Stop {
                    debug!("Foreground countdown for run {} finished ticking", run_id);
                    break;
                }
            }
        }
    }
}

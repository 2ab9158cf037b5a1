//! Countdown - a countdown timer daemon with background handoff
//!
//! This is the main entry point for the countdown application.

use std::sync::Arc;
use tokio::net::TcpListener;
use tracing::{info, warn};

use countdown::{
    config::Config,
    state::AppState,
    api::create_router,
    services::{check_notify_send_available, AlertGate, DesktopNotifier, JobStore, ToneAlert},
    tasks::BackgroundScheduler,
    utils::shutdown_signal,
};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let config = Config::parse();

    // Initialize tracing with appropriate log level
    tracing_subscriber::fmt()
        .with_env_filter(format!("countdown={},tower_http=info", config.log_level()))
        .init();

    info!("Starting countdown server v{}", env!("CARGO_PKG_VERSION"));
    info!("Configuration: host={}, port={}, tick={}ms, state_dir={}",
          config.host, config.port, config.tick_ms, config.state_dir().display());

    // Notifications are best-effort: a missing notify-send only disables them
    let notify = if config.no_notify {
        false
    } else if let Err(e) = check_notify_send_available().await {
        warn!("{}", e);
        false
    } else {
        true
    };

    let alert_gate = Arc::new(AlertGate::open(
        config.alerts_dir(),
        Arc::new(ToneAlert::new(config.alert_command.as_deref())),
    )?);
    let scheduler = Arc::new(BackgroundScheduler::new(
        JobStore::open(config.jobs_dir())?,
        Arc::clone(&alert_gate),
        Arc::new(DesktopNotifier::new("countdown", notify)),
        config.tick_interval(),
    ));

    // Pick up countdowns handed off by a previous process
    let resumed = scheduler.resume_pending()?;
    if resumed > 0 {
        info!("Resumed {} background countdown(s)", resumed);
    }

    let state = Arc::new(AppState::new(
        config.port,
        config.host.clone(),
        config.tick_interval(),
        Arc::clone(&scheduler),
        alert_gate,
    ));

    // Create HTTP router with all endpoints
    let app = create_router(Arc::clone(&state));

    // Bind to the specified address
    let addr = config.address();
    let listener = TcpListener::bind(&addr).await?;

    info!("Server running on http://{}", addr);
    info!("Endpoints:");
    info!("  POST /select                      - Set hours/minutes/seconds");
    info!("  POST /start                       - Start the countdown");
    info!("  POST /cancel                      - Cancel the countdown");
    info!("  POST /reset                       - Reset the timer");
    info!("  POST /detach                      - Hand the countdown to the background");
    info!("  POST /background/:run_id/cancel   - Cancel a background countdown");
    info!("  GET  /status                      - Current timer status");
    info!("  GET  /watch                       - Stream timer updates (SSE)");
    info!("  GET  /health                      - Health check");

    // Setup graceful shutdown
    let server = axum::serve(listener, app);

    tokio::select! {
        result = server => {
            if let Err(e) = result {
                tracing::error!("Server error: {}", e);
            }
        }
        _ = shutdown_signal() => {
            info!("Shutdown signal received");
        }
    }

    // The foreground goes away with this process; keep the countdown alive
    // as a durable job for the next start.
    match state.detach() {
        Ok(Some(run_id)) => info!("Run {} persisted for the next start", run_id),
        Ok(None) => {}
        Err(e) => tracing::error!("Failed to hand off running countdown: {}", e),
    }
    if scheduler.active_jobs() > 0 {
        info!("{} background countdown(s) will resume on next start", scheduler.active_jobs());
    }

    info!("Server shutdown complete");
    Ok(())
}

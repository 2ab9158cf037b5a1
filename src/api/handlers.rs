//! HTTP endpoint handlers

use std::{convert::Infallible, sync::Arc};
use axum::{
    extract::{Path, State},
    http::StatusCode,
    response::{
        sse::{Event, KeepAlive, Sse},
        Json,
    },
};
use chrono::Utc;
use futures::stream::{self, Stream};
use tokio::sync::watch;
use tracing::{error, info, warn};

use crate::state::{AppState, RunId, TimerSnapshot};
use super::responses::{
    ApiResponse, BackgroundCancelResponse, HealthResponse, SelectRequest, StatusResponse,
};

/// Handle POST /select - Update the picker
pub async fn select_handler(
    State(state): State<Arc<AppState>>,
    Json(request): Json<SelectRequest>,
) -> Result<Json<StatusResponse>, StatusCode> {
    if let Err(e) = state.select_time(request.hours, request.minutes, request.seconds) {
        error!("Failed to select time: {}", e);
        return Err(StatusCode::INTERNAL_SERVER_ERROR);
    }
    status_handler(State(state)).await
}

/// Handle POST /start - Start a run for the selected duration
pub async fn start_handler(State(state): State<Arc<AppState>>) -> Result<Json<ApiResponse>, StatusCode> {
    match state.start() {
        Ok(timer) => {
            info!("Start endpoint called - timer at {}", timer.formatted_time);
            let message = if timer.is_running {
                "Timer running"
            } else {
                "Nothing selected, timer not started"
            };
            Ok(Json(ApiResponse::new(message.to_string(), timer)))
        }
        Err(e) => {
            error!("Failed to start timer: {}", e);
            Err(StatusCode::INTERNAL_SERVER_ERROR)
        }
    }
}

/// Handle POST /cancel - Cancel the foreground run
pub async fn cancel_handler(State(state): State<Arc<AppState>>) -> Result<Json<ApiResponse>, StatusCode> {
    match state.cancel() {
        Ok(timer) => {
            info!("Cancel endpoint called - timer {:?}", timer.state);
            let message = if timer.handed_off {
                "Timer is counting down in the background and cannot be cancelled here"
            } else {
                "Timer cancelled"
            };
            Ok(Json(ApiResponse::new(message.to_string(), timer)))
        }
        Err(e) => {
            error!("Failed to cancel timer: {}", e);
            Err(StatusCode::INTERNAL_SERVER_ERROR)
        }
    }
}

/// Handle POST /reset - Return the timer to idle
pub async fn reset_handler(State(state): State<Arc<AppState>>) -> Result<Json<ApiResponse>, StatusCode> {
    match state.reset() {
        Ok(timer) => {
            info!("Reset endpoint called - timer {:?}", timer.state);
            Ok(Json(ApiResponse::new("Timer reset".to_string(), timer)))
        }
        Err(e) => {
            error!("Failed to reset timer: {}", e);
            Err(StatusCode::INTERNAL_SERVER_ERROR)
        }
    }
}

/// Handle POST /detach - The observer is going away, hand off the countdown
pub async fn detach_handler(State(state): State<Arc<AppState>>) -> Result<Json<ApiResponse>, StatusCode> {
    let message = match state.detach() {
        Ok(Some(run_id)) => format!("Run {} handed off to the background", run_id),
        Ok(None) => "No running countdown to hand off".to_string(),
        Err(e) => {
            error!("Failed to hand off timer: {}", e);
            return Err(StatusCode::INTERNAL_SERVER_ERROR);
        }
    };

    match state.snapshot() {
        Ok(timer) => Ok(Json(ApiResponse::new(message, timer))),
        Err(e) => {
            error!("Failed to read timer state: {}", e);
            Err(StatusCode::INTERNAL_SERVER_ERROR)
        }
    }
}

/// Handle POST /background/:run_id/cancel - Explicitly cancel scheduled work
pub async fn background_cancel_handler(
    State(state): State<Arc<AppState>>,
    Path(run_id): Path<String>,
) -> Result<Json<BackgroundCancelResponse>, StatusCode> {
    let parsed: RunId = run_id.parse().map_err(|e| {
        warn!("Invalid run id {}: {}", run_id, e);
        StatusCode::BAD_REQUEST
    })?;

    match state.scheduler.cancel(parsed) {
        Ok(cancelled) => {
            info!("Background cancel endpoint called for run {} - cancelled={}", parsed, cancelled);
            Ok(Json(BackgroundCancelResponse {
                run_id,
                cancelled,
                timestamp: Utc::now(),
            }))
        }
        Err(e) => {
            error!("Failed to cancel background run {}: {}", parsed, e);
            Err(StatusCode::INTERNAL_SERVER_ERROR)
        }
    }
}

/// Handle GET /status - Return current timer status
pub async fn status_handler(State(state): State<Arc<AppState>>) -> Result<Json<StatusResponse>, StatusCode> {
    let timer = match state.snapshot() {
        Ok(t) => t,
        Err(e) => {
            error!("Failed to get timer state: {}", e);
            return Err(StatusCode::INTERNAL_SERVER_ERROR);
        }
    };

    let selection = match state.get_selection() {
        Ok(s) => s,
        Err(e) => {
            error!("Failed to get selection: {}", e);
            return Err(StatusCode::INTERNAL_SERVER_ERROR);
        }
    };

    let (last_action, last_action_time) = state.get_last_action();

    Ok(Json(StatusResponse {
        can_start: selection.can_start(),
        can_reset: timer.total_ms > 0,
        timer,
        selection,
        observers: state.observer_count(),
        background_jobs: state.scheduler.active_jobs(),
        uptime: state.get_uptime(),
        port: state.port,
        host: state.host.clone(),
        last_action,
        last_action_time,
    }))
}

/// Handle GET /watch - Attach as an observer and stream a snapshot per tick.
/// Closing the stream detaches; the last observer leaving hands a running
/// countdown off to the background.
pub async fn watch_handler(
    State(state): State<Arc<AppState>>,
) -> Result<Sse<impl Stream<Item = Result<Event, Infallible>>>, StatusCode> {
    let initial = state.snapshot().map_err(|e| {
        error!("Failed to get timer state: {}", e);
        StatusCode::INTERNAL_SERVER_ERROR
    })?;
    let guard = state.attach_observer();
    let rx = state.snapshot_tx.subscribe();

    let events = stream::unfold((Some(initial), rx, guard), |(pending, mut rx, guard)| async move {
        let snapshot = match pending {
            Some(snapshot) => snapshot,
            None => {
                rx.changed().await.ok()?;
                latest(&mut rx)
            }
        };
        Some((Ok(snapshot_event(&snapshot)), (None, rx, guard)))
    });

    Ok(Sse::new(events).keep_alive(KeepAlive::default()))
}

/// Handle GET /health - Health check endpoint
pub async fn health_handler() -> Json<HealthResponse> {
    Json(HealthResponse::ok())
}

fn latest(rx: &mut watch::Receiver<TimerSnapshot>) -> TimerSnapshot {
    rx.borrow_and_update().clone()
}

fn snapshot_event(snapshot: &TimerSnapshot) -> Event {
    Event::default().event("tick").json_data(snapshot).unwrap_or_else(|e| {
        warn!("Failed to encode timer snapshot: {}", e);
        Event::default().comment("snapshot unavailable")
    })
}

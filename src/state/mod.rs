//! State management module
//!
//! This module contains the countdown state machine, the picker state and
//! the foreground controller that owns both.

pub mod app_state;
pub mod selection;
pub mod timer_state;

// Re-export main types
pub use app_state::{AppState, ObserverGuard, TickControl};
pub use selection::SelectedDuration;
pub use timer_state::{
    is_critical, progress_fraction, timer_text, HandoffTicket, RunId, RunState, TickOutcome,
    TimerEngine, TimerSnapshot, TICK_INTERVAL_MS,
};

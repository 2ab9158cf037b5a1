//! Countdown - a countdown timer daemon with background handoff
//!
//! This library provides the countdown state machine, the foreground and
//! background countdown loops, and the fire-once completion alert shared by
//! both.

pub mod config;
pub mod error;
pub mod state;
pub mod api;
pub mod services;
pub mod tasks;
pub mod utils;

// Re-export commonly used types
pub use config::Config;
pub use error::{Result, TimerError};
pub use state::AppState;
pub use api::create_router;
pub use utils::signals::shutdown_signal;

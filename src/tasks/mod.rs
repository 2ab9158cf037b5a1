//! Countdown loops
//!
//! This module contains the tick source and the two countdown loops: the
//! foreground one that drives the engine while an observer is attached, and
//! the background scheduler that takes over after a handoff. The mirror task
//! keeps observers current while the background scheduler owns the run.

pub mod background_mirror;
pub mod background_worker;
pub mod foreground_ticker;
pub mod ticker;

// Re-export main types
pub use background_mirror::background_mirror_task;
pub use background_worker::{BackgroundScheduler, BackgroundWorkRequest, JobOutcome};
pub use foreground_ticker::foreground_tick_task;
pub use ticker::Ticker;

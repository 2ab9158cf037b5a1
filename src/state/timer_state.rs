//! Countdown state machine and its derived presentation values
//!
//! The engine has no thread or task of its own. Whoever drives it calls
//! [`TimerEngine::tick`] with the current instant; remaining time is computed
//! from an absolute deadline, so a late tick simply observes a larger
//! decrement instead of accumulating drift.
//!
//! ```text
//! Idle -> Running -> (Completed | Cancelled) -> Idle
//! ```

use std::{fmt, ops::RangeInclusive, time::Duration};

use serde::{Deserialize, Serialize};
use tokio::time::Instant;
use uuid::Uuid;

/// Nominal tick period for both countdown loops
pub const TICK_INTERVAL_MS: u64 = 1_000;

/// Remaining-time window that gets urgent visual treatment
pub const CRITICAL_WINDOW_MS: RangeInclusive<u64> = 1_000..=10_000;

/// Identity of a single start-to-terminal run
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RunId(Uuid);

impl RunId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for RunId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for RunId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

impl std::str::FromStr for RunId {
    type Err = uuid::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Uuid::parse_str(s).map(Self)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RunState {
    Idle,
    Running,
    Cancelled,
    Completed,
}

/// Result of feeding one tick to the engine
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TickOutcome {
    /// The engine is not advancing (not running, or handed off)
    Inactive,
    /// Still running with this much time left
    Progress(u64),
    /// This tick brought the run to zero
    Completed(RunId),
}

/// Payload produced when the foreground gives up a running countdown
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct HandoffTicket {
    pub run_id: RunId,
    pub remaining_ms: u64,
}

/// Observer-facing view of the engine, recomputed on every read
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TimerSnapshot {
    pub run_id: Option<RunId>,
    pub state: RunState,
    pub total_ms: u64,
    pub remaining_ms: u64,
    pub formatted_time: String,
    pub progress: f64,
    pub is_critical: bool,
    pub is_running: bool,
    pub handed_off: bool,
}

/// Core countdown state machine for the single active run
#[derive(Debug, Clone)]
pub struct TimerEngine {
    run_id: Option<RunId>,
    state: RunState,
    total_ms: u64,
    remaining_ms: u64,
    /// Instant at which the run reaches zero; only set while the
    /// foreground is the one advancing the countdown.
    deadline: Option<Instant>,
    handed_off: bool,
}

impl TimerEngine {
    pub fn new() -> Self {
        Self {
            run_id: None,
            state: RunState::Idle,
            total_ms: 0,
            remaining_ms: 0,
            deadline: None,
            handed_off: false,
        }
    }

    // ── Queries ──────────────────────────────────────────────────────

    pub fn state(&self) -> RunState {
        self.state
    }

    pub fn run_id(&self) -> Option<RunId> {
        self.run_id
    }

    pub fn total_ms(&self) -> u64 {
        self.total_ms
    }

    pub fn remaining_ms(&self) -> u64 {
        self.remaining_ms
    }

    pub fn deadline(&self) -> Option<Instant> {
        self.deadline
    }

    pub fn is_running(&self) -> bool {
        self.state == RunState::Running
    }

    /// True while the background scheduler owns the countdown
    pub fn is_handed_off(&self) -> bool {
        self.handed_off
    }

    pub fn snapshot(&self) -> TimerSnapshot {
        TimerSnapshot {
            run_id: self.run_id,
            state: self.state,
            total_ms: self.total_ms,
            remaining_ms: self.remaining_ms,
            formatted_time: timer_text(self.remaining_ms),
            progress: progress_fraction(self.state, self.remaining_ms, self.total_ms),
            is_critical: is_critical(self.state, self.remaining_ms),
            is_running: self.is_running(),
            handed_off: self.handed_off,
        }
    }

    // ── Commands ─────────────────────────────────────────────────────

    /// Begin a new run. Returns `None` without touching state when the
    /// duration is zero or a run is already in progress.
    pub fn start(&mut self, total_ms: u64, now: Instant) -> Option<RunId> {
        if total_ms == 0 || self.state == RunState::Running {
            return None;
        }
        let run_id = RunId::new();
        self.run_id = Some(run_id);
        self.state = RunState::Running;
        self.total_ms = total_ms;
        self.remaining_ms = total_ms;
        self.deadline = Some(now + Duration::from_millis(total_ms));
        self.handed_off = false;
        Some(run_id)
    }

    /// Advance the countdown to `now`.
    pub fn tick(&mut self, now: Instant) -> TickOutcome {
        if self.state != RunState::Running || self.handed_off {
            return TickOutcome::Inactive;
        }
        self.flush(now);
        if self.remaining_ms == 0 {
            self.state = RunState::Completed;
            self.deadline = None;
            return match self.run_id {
                Some(run_id) => TickOutcome::Completed(run_id),
                None => TickOutcome::Inactive,
            };
        }
        TickOutcome::Progress(self.remaining_ms)
    }

    /// Stop a foreground run. A handed-off run cannot be cancelled from here.
    pub fn cancel(&mut self) -> bool {
        if self.state != RunState::Running || self.handed_off {
            return false;
        }
        self.state = RunState::Cancelled;
        self.deadline = None;
        true
    }

    /// Return to `Idle`, cancelling first if a foreground run is active.
    pub fn reset(&mut self) -> bool {
        if self.handed_off {
            return false;
        }
        if self.state == RunState::Running {
            self.cancel();
        }
        self.run_id = None;
        self.state = RunState::Idle;
        self.total_ms = 0;
        self.remaining_ms = 0;
        self.deadline = None;
        true
    }

    /// Give the countdown up to the background scheduler.
    ///
    /// Returns `None` when there is nothing to hand off, including the case
    /// where the final flush reaches zero; the caller then completes the
    /// run in the foreground (`state()` is `Completed`).
    pub fn hand_off(&mut self, now: Instant) -> Option<HandoffTicket> {
        if self.state != RunState::Running || self.handed_off {
            return None;
        }
        let run_id = self.run_id?;
        if let TickOutcome::Completed(_) = self.tick(now) {
            return None;
        }
        self.handed_off = true;
        self.deadline = None;
        Some(HandoffTicket {
            run_id,
            remaining_ms: self.remaining_ms,
        })
    }

    /// Take a handed-off run back, e.g. when the handoff could not be
    /// made durable.
    pub fn reclaim(&mut self, now: Instant) -> bool {
        if !self.handed_off || self.state != RunState::Running {
            return false;
        }
        self.handed_off = false;
        self.deadline = Some(now + Duration::from_millis(self.remaining_ms));
        true
    }

    /// Mirror background progress for display.
    pub fn sync_from_background(&mut self, run_id: RunId, remaining_ms: u64) {
        if self.handed_off && self.run_id == Some(run_id) {
            self.remaining_ms = self.remaining_ms.min(remaining_ms);
        }
    }

    /// Record that the background leg brought the run to zero.
    pub fn finish_from_background(&mut self, run_id: RunId) {
        if self.handed_off && self.run_id == Some(run_id) {
            self.remaining_ms = 0;
            self.state = RunState::Completed;
            self.handed_off = false;
        }
    }

    /// Record that the background leg was cancelled externally.
    pub fn cancel_from_background(&mut self, run_id: RunId) {
        if self.handed_off && self.run_id == Some(run_id) {
            self.state = RunState::Cancelled;
            self.handed_off = false;
        }
    }

    // ── Internal ─────────────────────────────────────────────────────

    fn flush(&mut self, now: Instant) {
        if let Some(deadline) = self.deadline {
            let left = deadline.saturating_duration_since(now).as_millis() as u64;
            self.remaining_ms = self.remaining_ms.min(left);
        }
    }
}

impl Default for TimerEngine {
    fn default() -> Self {
        Self::new()
    }
}

/// Render milliseconds as `HH:MM:SS`, truncating to whole seconds.
pub fn timer_text(remaining_ms: u64) -> String {
    let total_secs = remaining_ms / 1_000;
    format!(
        "{:02}:{:02}:{:02}",
        total_secs / 3_600,
        (total_secs / 60) % 60,
        total_secs % 60
    )
}

pub fn progress_fraction(state: RunState, remaining_ms: u64, total_ms: u64) -> f64 {
    if state == RunState::Running && total_ms > 0 {
        remaining_ms as f64 / total_ms as f64
    } else {
        0.0
    }
}

pub fn is_critical(state: RunState, remaining_ms: u64) -> bool {
    state == RunState::Running && CRITICAL_WINDOW_MS.contains(&remaining_ms)
}

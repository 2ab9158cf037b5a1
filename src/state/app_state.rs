//! Foreground controller: binds the engine to observers and hands off to
//! the background scheduler when the last observer goes away

use std::{
    sync::{Arc, Mutex, MutexGuard},
    time::Duration,
};
use chrono::{DateTime, Utc};
use tokio::{sync::watch, time::Instant};
use tracing::{debug, error, info, warn};

use super::{RunId, SelectedDuration, TickOutcome, TimerEngine, TimerSnapshot};
use crate::{
    error::{Result, TimerError},
    services::{AlertGate, JobStatus},
    tasks::{background_mirror_task, foreground_tick_task, BackgroundScheduler, BackgroundWorkRequest},
};

/// What the foreground loop should do after a tick
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TickControl {
    Continue,
    Stop,
}

/// Main application state: the single timer, its picker and the loops
/// that drive it
pub struct AppState {
    pub engine: Arc<Mutex<TimerEngine>>,
    pub selection: Arc<Mutex<SelectedDuration>>,
    pub tick_interval: Duration,
    pub scheduler: Arc<BackgroundScheduler>,
    pub alert_gate: Arc<AlertGate>,
    /// Server metadata
    pub start_time: std::time::Instant,
    pub port: u16,
    pub host: String,
    /// Last action tracking
    pub last_action: Arc<Mutex<Option<String>>>,
    pub last_action_time: Arc<Mutex<Option<DateTime<Utc>>>>,
    /// Channel for snapshot updates to attached observers
    pub snapshot_tx: watch::Sender<TimerSnapshot>,
    /// Keep the receiver alive to prevent channel closure
    pub _snapshot_rx: watch::Receiver<TimerSnapshot>,
    /// Stop signal of the foreground loop currently running, if any
    stop_tx: Mutex<Option<watch::Sender<bool>>>,
    observers: Mutex<usize>,
}

impl AppState {
    pub fn new(
        port: u16,
        host: String,
        tick_interval: Duration,
        scheduler: Arc<BackgroundScheduler>,
        alert_gate: Arc<AlertGate>,
    ) -> Self {
        let engine = TimerEngine::new();
        let (snapshot_tx, snapshot_rx) = watch::channel(engine.snapshot());

        Self {
            engine: Arc::new(Mutex::new(engine)),
            selection: Arc::new(Mutex::new(SelectedDuration::default())),
            tick_interval,
            scheduler,
            alert_gate,
            start_time: std::time::Instant::now(),
            port,
            host,
            last_action: Arc::new(Mutex::new(None)),
            last_action_time: Arc::new(Mutex::new(None)),
            snapshot_tx,
            _snapshot_rx: snapshot_rx,
            stop_tx: Mutex::new(None),
            observers: Mutex::new(0),
        }
    }

    // ── Observer intents ─────────────────────────────────────────────

    pub fn select_time(&self, hours: u32, minutes: u32, seconds: u32) -> Result<SelectedDuration> {
        let selection = SelectedDuration::new(hours, minutes, seconds);
        *self.selection.lock().map_err(|_| TimerError::Lock("selection"))? = selection;
        debug!("Selected {}h {}m {}s", selection.hours, selection.minutes, selection.seconds);
        self.record_action("select");
        Ok(selection)
    }

    pub fn get_selection(&self) -> Result<SelectedDuration> {
        self.selection
            .lock()
            .map(|selection| *selection)
            .map_err(|_| TimerError::Lock("selection"))
    }

    /// Start a run for the selected duration. Ignored when the selection
    /// is empty or a run is already in progress.
    pub fn start(self: &Arc<Self>) -> Result<TimerSnapshot> {
        let selection = self.get_selection()?;
        let mut engine = self.lock_engine()?;
        self.sync_background(&mut engine);

        let previous = engine.run_id();
        let Some(run_id) = engine.start(selection.total_ms(), Instant::now()) else {
            debug!("Start ignored (state={:?}, selected={}ms)", engine.state(), selection.total_ms());
            return Ok(engine.snapshot());
        };
        let deadline = engine.deadline();
        let snapshot = engine.snapshot();
        drop(engine);

        info!("Starting run {} for {}", run_id, snapshot.formatted_time);
        if let Some(previous) = previous {
            self.forget_run(previous);
        }
        self.publish(snapshot.clone());
        if let Some(deadline) = deadline {
            self.spawn_foreground_loop(run_id, deadline)?;
        }
        self.record_action("start");
        Ok(snapshot)
    }

    pub fn cancel(&self) -> Result<TimerSnapshot> {
        let mut engine = self.lock_engine()?;
        self.sync_background(&mut engine);

        if engine.cancel() {
            self.stop_foreground_loop();
            info!("Cancelled run with {} left", engine.snapshot().formatted_time);
        } else if engine.is_handed_off() {
            warn!("Background countdown cannot be cancelled from the foreground");
        } else {
            debug!("Cancel ignored (state={:?})", engine.state());
        }

        let snapshot = engine.snapshot();
        drop(engine);
        self.publish(snapshot.clone());
        self.record_action("cancel");
        Ok(snapshot)
    }

    pub fn reset(&self) -> Result<TimerSnapshot> {
        let mut engine = self.lock_engine()?;
        self.sync_background(&mut engine);

        let previous = engine.run_id();
        if engine.reset() {
            self.stop_foreground_loop();
            info!("Timer reset");
            if let Some(previous) = previous {
                self.forget_run(previous);
            }
        } else {
            warn!("Reset ignored while the background countdown owns the run");
        }

        let snapshot = engine.snapshot();
        drop(engine);
        self.publish(snapshot.clone());
        self.record_action("reset");
        Ok(snapshot)
    }

    /// Current view of the timer, mirroring background progress when the
    /// run has been handed off
    pub fn snapshot(&self) -> Result<TimerSnapshot> {
        let mut engine = self.lock_engine()?;
        let before = engine.snapshot();
        self.sync_background(&mut engine);
        let snapshot = engine.snapshot();
        drop(engine);

        if snapshot != before {
            self.publish(snapshot.clone());
        }
        Ok(snapshot)
    }

    // ── Handoff ──────────────────────────────────────────────────────

    /// The foreground observer went away: hand the running countdown to
    /// the background scheduler. Returns the handed-off run, if any.
    pub fn detach(self: &Arc<Self>) -> Result<Option<RunId>> {
        let mut engine = self.lock_engine()?;
        if !engine.is_running() || engine.is_handed_off() {
            return Ok(None);
        }

        // Marking the run handed off under the lock is what keeps the
        // foreground loop from decrementing it again.
        let Some(ticket) = engine.hand_off(Instant::now()) else {
            let snapshot = engine.snapshot();
            drop(engine);
            self.stop_foreground_loop();
            if let Some(run_id) = snapshot.run_id {
                info!("Run {} reached zero while detaching", run_id);
                self.alert_gate.fire_once(run_id);
            }
            self.publish(snapshot);
            return Ok(None);
        };

        let request = BackgroundWorkRequest {
            run_id: ticket.run_id,
            remaining_ms: ticket.remaining_ms,
        };
        // Subscribe before enqueueing so the first background tick is seen.
        // The engine stays locked until the job record exists.
        let updates = self.scheduler.subscribe();
        if let Err(e) = self.scheduler.enqueue(request) {
            error!("Handoff of run {} failed, keeping it in the foreground: {}", ticket.run_id, e);
            engine.reclaim(Instant::now());
            return Err(e);
        }
        let snapshot = engine.snapshot();
        drop(engine);

        self.stop_foreground_loop();
        self.publish(snapshot);
        tokio::spawn(background_mirror_task(Arc::clone(self), ticket.run_id, updates));

        info!("Handed off run {} with {}ms left", ticket.run_id, ticket.remaining_ms);
        self.record_action("detach");
        Ok(Some(ticket.run_id))
    }

    /// Register a live observer. Dropping the guard of the last one
    /// detaches the running countdown; an observer attaching meanwhile
    /// waits until that handoff is settled.
    pub fn attach_observer(self: &Arc<Self>) -> ObserverGuard {
        match self.observers.lock() {
            Ok(mut observers) => {
                *observers += 1;
                debug!("Observer attached ({} live)", *observers);
            }
            Err(_) => error!("Failed to lock observer count"),
        }
        ObserverGuard {
            state: Arc::clone(self),
        }
    }

    pub fn observer_count(&self) -> usize {
        self.observers.lock().map(|observers| *observers).unwrap_or(0)
    }


    // ── Foreground loop ──────────────────────────────────────────────

    /// Apply one foreground tick to `run_id`
    pub fn tick(&self, run_id: RunId, now: Instant) -> TickControl {
        let mut engine = match self.lock_engine() {
            Ok(engine) => engine,
            Err(e) => {
                error!("Skipping tick: {}", e);
                return TickControl::Continue;
            }
        };
        if engine.run_id() != Some(run_id) {
            return TickControl::Stop;
        }

        let outcome = engine.tick(now);
        let snapshot = engine.snapshot();
        drop(engine);

        match outcome {
            TickOutcome::Inactive => TickControl::Stop,
            TickOutcome::Progress(_) => {
                self.publish(snapshot);
                TickControl::Continue
            }
            TickOutcome::Completed(run_id) => {
                info!("Run {} completed in the foreground", run_id);
                self.publish(snapshot);
                self.alert_gate.fire_once(run_id);
                TickControl::Stop
            }
        }
    }

    fn spawn_foreground_loop(self: &Arc<Self>, run_id: RunId, deadline: Instant) -> Result<()> {
        let (stop_tx, stop_rx) = watch::channel(false);
        let previous = self
            .stop_tx
            .lock()
            .map_err(|_| TimerError::Lock("foreground loop"))?
            .replace(stop_tx);
        if let Some(previous) = previous {
            let _ = previous.send(true);
        }

        tokio::spawn(foreground_tick_task(Arc::clone(self), run_id, deadline, stop_rx));
        Ok(())
    }

    fn stop_foreground_loop(&self) {
        match self.stop_tx.lock() {
            Ok(mut stop_tx) => {
                if let Some(stop_tx) = stop_tx.take() {
                    let _ = stop_tx.send(true);
                }
            }
            Err(_) => error!("Failed to lock foreground loop handle"),
        }
    }

    /// Apply a background record change to the handed-off run and publish
    /// it. Returns false once the run is no longer handed off as `run_id`.
    pub fn mirror_background(&self, run_id: RunId) -> bool {
        let mut engine = match self.lock_engine() {
            Ok(engine) => engine,
            Err(e) => {
                error!("Skipping background update: {}", e);
                return true;
            }
        };
        if engine.run_id() != Some(run_id) || !engine.is_handed_off() {
            return false;
        }

        let before = engine.snapshot();
        self.sync_background(&mut engine);
        let snapshot = engine.snapshot();
        let still_handed_off = engine.is_handed_off();
        drop(engine);

        if snapshot != before {
            self.publish(snapshot);
        }
        still_handed_off
    }

    // ── Internal ─────────────────────────────────────────────────────

    fn lock_engine(&self) -> Result<MutexGuard<'_, TimerEngine>> {
        self.engine.lock().map_err(|_| TimerError::Lock("timer engine"))
    }

    /// Pull persisted background progress into a handed-off engine
    fn sync_background(&self, engine: &mut TimerEngine) {
        if !engine.is_handed_off() {
            return;
        }
        let Some(run_id) = engine.run_id() else {
            return;
        };

        match self.scheduler.progress(run_id) {
            Ok(Some(record)) => match record.status {
                JobStatus::Pending => engine.sync_from_background(run_id, record.remaining_ms),
                JobStatus::Finished => {
                    info!("Run {} finished in the background", run_id);
                    engine.finish_from_background(run_id);
                }
                JobStatus::Cancelled => {
                    info!("Run {} was cancelled in the background", run_id);
                    engine.cancel_from_background(run_id);
                }
            },
            Ok(None) => {
                warn!("No background record for handed-off run {}, treating it as cancelled", run_id);
                if let Err(e) = self.scheduler.cancel(run_id) {
                    warn!("Failed to stop background countdown for run {}: {}", run_id, e);
                }
                engine.cancel_from_background(run_id);
            }
            Err(e) => warn!("Failed to read background progress for run {}: {}", run_id, e),
        }
    }

    /// Drop the durable leftovers of a run that has been replaced
    fn forget_run(&self, run_id: RunId) {
        if let Err(e) = self.alert_gate.forget(run_id) {
            warn!("Failed to remove alert marker for run {}: {}", run_id, e);
        }
        if let Err(e) = self.scheduler.forget(run_id) {
            warn!("Failed to remove background record for run {}: {}", run_id, e);
        }
    }

    fn publish(&self, snapshot: TimerSnapshot) {
        if let Err(e) = self.snapshot_tx.send(snapshot) {
            warn!("Failed to send timer update: {}", e);
        }
    }

    fn record_action(&self, action: &str) {
        if let Ok(mut last_action) = self.last_action.lock() {
            *last_action = Some(action.to_string());
        }
        if let Ok(mut last_time) = self.last_action_time.lock() {
            *last_time = Some(Utc::now());
        }
    }

    /// Calculate server uptime as a formatted string
    pub fn get_uptime(&self) -> String {
        let duration = self.start_time.elapsed();
        let hours = duration.as_secs() / 3600;
        let minutes = (duration.as_secs() % 3600) / 60;
        let seconds = duration.as_secs() % 60;

        if hours > 0 {
            format!("{}h {}m {}s", hours, minutes, seconds)
        } else if minutes > 0 {
            format!("{}m {}s", minutes, seconds)
        } else {
            format!("{}s", seconds)
        }
    }

    /// Get last action information
    pub fn get_last_action(&self) -> (Option<String>, Option<DateTime<Utc>>) {
        let last_action = self.last_action.lock().ok().and_then(|a| a.clone());
        let last_action_time = self.last_action_time.lock().ok().and_then(|t| *t);
        (last_action, last_action_time)
    }
}

/// Keeps an observer registered for as long as it lives
pub struct ObserverGuard {
    state: Arc<AppState>,
}

impl Drop for ObserverGuard {
    fn drop(&mut self) {
        let mut observers = match self.state.observers.lock() {
            Ok(observers) => observers,
            Err(_) => {
                error!("Failed to lock observer count");
                return;
            }
        };
        *observers = observers.saturating_sub(1);
        debug!("Observer detached ({} live)", *observers);
        if *observers > 0 {
            return;
        }

        // The count stays locked until the handoff decision is made
        match self.state.detach() {
            Ok(Some(run_id)) => info!("Last observer left, run {} continues in the background", run_id),
            Ok(None) => {}
            Err(e) => error!("Failed to hand off after observer left: {}", e),
        }
    }
}

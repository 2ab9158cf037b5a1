//! Background countdown scheduler
//!
//! Takes over a countdown from the foreground using nothing but the
//! remaining duration. Each job is persisted before its task is spawned and
//! runs on its own task, so it keeps going after the foreground observer
//! is gone; only completion or [`BackgroundScheduler::cancel`] stops it.

use std::{
    collections::HashMap,
    sync::{Arc, Mutex},
    time::Duration,
};

use serde::{Deserialize, Serialize};
use tokio::{
    sync::{broadcast, watch},
    time::Instant,
};
use tracing::{debug, error, info, warn};

use crate::{
    error::{Result, TimerError},
    services::{AlertGate, JobRecord, JobStatus, JobStore, NotificationSurface},
    state::{timer_text, RunId},
    tasks::Ticker,
};

/// Text of the terminal notification
pub const FINISHED_TEXT: &str = "Timer is finished!";

const UPDATE_CAPACITY: usize = 64;

/// Handoff payload. Plain data: it holds no reference to the engine.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct BackgroundWorkRequest {
    pub run_id: RunId,
    pub remaining_ms: u64,
}

impl From<&JobRecord> for BackgroundWorkRequest {
    fn from(record: &JobRecord) -> Self {
        Self {
            run_id: record.run_id,
            remaining_ms: record.remaining_ms,
        }
    }
}

/// How a background job ended
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum JobOutcome {
    Finished { fired_alert: bool },
    Cancelled,
}

pub struct BackgroundScheduler {
    store: JobStore,
    alert_gate: Arc<AlertGate>,
    notifier: Arc<dyn NotificationSurface>,
    tick_interval: Duration,
    /// Cancellation senders for jobs running in this process. A job leaves
    /// the table once it is settled, finished or cancelled.
    running: Mutex<HashMap<RunId, watch::Sender<bool>>>,
    updates: broadcast::Sender<JobRecord>,
}

impl BackgroundScheduler {
    pub fn new(
        store: JobStore,
        alert_gate: Arc<AlertGate>,
        notifier: Arc<dyn NotificationSurface>,
        tick_interval: Duration,
    ) -> Self {
        Self {
            store,
            alert_gate,
            notifier,
            tick_interval,
            running: Mutex::new(HashMap::new()),
            updates: broadcast::channel(UPDATE_CAPACITY).0,
        }
    }

    /// Every change to a persisted job record, as it is written
    pub fn subscribe(&self) -> broadcast::Receiver<JobRecord> {
        self.updates.subscribe()
    }

    /// Durably enqueue a job and start counting it down.
    ///
    /// The record is on disk before this returns, so the job survives the
    /// caller's process exiting right after.
    pub fn enqueue(self: &Arc<Self>, request: BackgroundWorkRequest) -> Result<()> {
        if request.remaining_ms == 0 {
            warn!("Rejecting background job for run {}: nothing to count down", request.run_id);
            return Err(TimerError::InvalidHandoff);
        }

        self.store.persist(&JobRecord::pending(request.run_id, request.remaining_ms))?;
        info!("Enqueued background countdown for run {} ({}ms left)", request.run_id, request.remaining_ms);
        self.spawn(request)
    }

    /// Restart every job left pending by a previous process
    pub fn resume_pending(self: &Arc<Self>) -> Result<usize> {
        let pending = self.store.pending()?;
        let mut resumed = 0;

        for record in &pending {
            if self.is_running(record.run_id) {
                continue;
            }
            info!("Resuming background countdown for run {} ({}ms left)", record.run_id, record.remaining_ms);
            match self.spawn(BackgroundWorkRequest::from(record)) {
                Ok(()) => resumed += 1,
                Err(e) => error!("Failed to resume run {}: {}", record.run_id, e),
            }
        }

        Ok(resumed)
    }

    /// Explicit external cancellation of a scheduled job.
    ///
    /// Returns false when the job already settled, including a job that
    /// committed to finishing while this call waited for the job table.
    pub fn cancel(&self, run_id: RunId) -> Result<bool> {
        let mut running = self
            .running
            .lock()
            .map_err(|_| TimerError::Lock("background jobs"))?;

        if let Some(sender) = running.remove(&run_id) {
            info!("Cancelling background countdown for run {}", run_id);
            // The worker marks the record once it observes the signal.
            let _ = sender.send(true);
            return Ok(true);
        }

        match self.store.load(run_id)? {
            Some(record) if record.status == JobStatus::Pending => {
                info!("Cancelling queued background countdown for run {}", run_id);
                self.store.mark(run_id, JobStatus::Cancelled)?;
                drop(running);
                self.announce(run_id);
                Ok(true)
            }
            _ => Ok(false),
        }
    }

    /// Latest persisted state of a job
    pub fn progress(&self, run_id: RunId) -> Result<Option<JobRecord>> {
        self.store.load(run_id)
    }

    /// Remove the record of a job that is no longer running
    pub fn forget(&self, run_id: RunId) -> Result<()> {
        if self.is_running(run_id) {
            debug!("Not forgetting run {} while its countdown is active", run_id);
            return Ok(());
        }
        self.store.remove(run_id)
    }

    pub fn is_running(&self, run_id: RunId) -> bool {
        self.running
            .lock()
            .map(|running| running.contains_key(&run_id))
            .unwrap_or(false)
    }

    pub fn active_jobs(&self) -> usize {
        self.running.lock().map(|running| running.len()).unwrap_or(0)
    }

    fn spawn(self: &Arc<Self>, request: BackgroundWorkRequest) -> Result<()> {
        let (cancel_tx, cancel_rx) = watch::channel(false);
        self.running
            .lock()
            .map_err(|_| TimerError::Lock("background jobs"))?
            .insert(request.run_id, cancel_tx);

        let scheduler = Arc::clone(self);
        tokio::spawn(async move {
            match scheduler.run_countdown(request, cancel_rx).await {
                Ok(outcome) => debug!("Background countdown for run {} ended: {:?}", request.run_id, outcome),
                Err(e) => error!("Background countdown for run {} failed: {}", request.run_id, e),
            }
            if let Ok(mut running) = scheduler.running.lock() {
                running.remove(&request.run_id);
            }
        });

        Ok(())
    }

    /// Count a request down to zero on the calling task.
    pub async fn run_countdown(
        &self,
        request: BackgroundWorkRequest,
        mut cancel_rx: watch::Receiver<bool>,
    ) -> Result<JobOutcome> {
        let run_id = request.run_id;
        if request.remaining_ms == 0 {
            warn!("Background countdown for run {} has nothing to count down", run_id);
            return Err(TimerError::InvalidHandoff);
        }

        let deadline = Instant::now() + Duration::from_millis(request.remaining_ms);
        let mut ticker = Ticker::new(self.tick_interval, deadline);
        let mut remaining_ms = request.remaining_ms;

        loop {
            tokio::select! {
                biased;

                Ok(()) = cancel_rx.changed() => {
                    if *cancel_rx.borrow() {
                        info!("Background countdown for run {} cancelled with {}ms left", run_id, remaining_ms);
                        self.mark_cancelled(run_id);
                        return Ok(JobOutcome::Cancelled);
                    }
                }

                now = ticker.tick() => {
                    let left = deadline.saturating_duration_since(now).as_millis() as u64;
                    remaining_ms = remaining_ms.min(left);
                    self.post_progress(run_id, remaining_ms).await;

                    if remaining_ms == 0 {
                        if !self.settle_finished(run_id, &cancel_rx)? {
                            info!("Background countdown for run {} cancelled before it could finish", run_id);
                            self.mark_cancelled(run_id);
                            return Ok(JobOutcome::Cancelled);
                        }
                        return Ok(self.finish(run_id).await);
                    }
                }
            }
        }
    }

    async fn post_progress(&self, run_id: RunId, remaining_ms: u64) {
        let text = timer_text(remaining_ms);
        debug!("Background run {}: {}", run_id, text);

        if let Err(e) = self.notifier.post_progress(&text).await {
            warn!("Failed to post progress notification: {}", e);
        }
        match self.store.record_progress(run_id, remaining_ms) {
            Ok(()) => self.announce(run_id),
            Err(e) => error!("Failed to persist progress for run {}: {}", run_id, e),
        }
    }

    /// Commit a job that reached zero to finishing, unless a cancellation
    /// got to the job table first. Cancellation and this commit are
    /// serialized by the table lock.
    fn settle_finished(&self, run_id: RunId, cancel_rx: &watch::Receiver<bool>) -> Result<bool> {
        {
            let mut running = self
                .running
                .lock()
                .map_err(|_| TimerError::Lock("background jobs"))?;
            if *cancel_rx.borrow() {
                return Ok(false);
            }
            running.remove(&run_id);
            if let Err(e) = self.store.mark(run_id, JobStatus::Finished) {
                error!("Failed to mark run {} finished: {}", run_id, e);
            }
        }
        self.announce(run_id);
        Ok(true)
    }

    fn mark_cancelled(&self, run_id: RunId) {
        match self.store.mark(run_id, JobStatus::Cancelled) {
            Ok(()) => self.announce(run_id),
            Err(e) => error!("Failed to mark run {} cancelled: {}", run_id, e),
        }
    }

    /// Publish the stored record of a job to subscribers
    fn announce(&self, run_id: RunId) {
        match self.store.load(run_id) {
            // No subscribers is fine
            Ok(Some(record)) => {
                let _ = self.updates.send(record);
            }
            Ok(None) => {}
            Err(e) => warn!("Failed to read job record for run {}: {}", run_id, e),
        }
    }

    async fn finish(&self, run_id: RunId) -> JobOutcome {
        info!("Background countdown for run {} finished", run_id);

        if let Err(e) = self.notifier.post_finished(FINISHED_TEXT).await {
            warn!("Failed to post finished notification: {}", e);
        }

        let fired_alert = self.alert_gate.fire_once(run_id);
        if !fired_alert {
            debug!("Foreground already alerted for run {}", run_id);
        }
        JobOutcome::Finished { fired_alert }
    }
}

#![allow(dead_code)]

use std::{
    sync::{
        atomic::{AtomicUsize, Ordering},
        Arc, Mutex,
    },
    time::Duration,
};

use async_trait::async_trait;
use countdown::{
    services::{AlertGate, AlertSurface, JobStore, NotificationSurface},
    state::AppState,
    tasks::BackgroundScheduler,
};
use tempfile::TempDir;

#[derive(Default)]
pub struct CountingAlert(AtomicUsize);

impl CountingAlert {
    pub fn count(&self) -> usize {
        self.0.load(Ordering::SeqCst)
    }
}

impl AlertSurface for CountingAlert {
    fn play_completion_alert(&self) {
        self.0.fetch_add(1, Ordering::SeqCst);
    }
}

#[derive(Default)]
pub struct RecordingNotifier {
    posts: Mutex<Vec<String>>,
}

impl RecordingNotifier {
    pub fn posts(&self) -> Vec<String> {
        self.posts.lock().unwrap().clone()
    }
}

#[async_trait]
impl NotificationSurface for RecordingNotifier {
    async fn post_progress(&self, text: &str) -> Result<(), String> {
        self.posts.lock().unwrap().push(text.to_string());
        Ok(())
    }

    async fn post_finished(&self, text: &str) -> Result<(), String> {
        self.posts.lock().unwrap().push(text.to_string());
        Ok(())
    }
}

pub struct Harness {
    pub temp_dir: TempDir,
    pub state: Arc<AppState>,
    pub alerts: Arc<CountingAlert>,
    pub notifier: Arc<RecordingNotifier>,
}

pub fn harness() -> Harness {
    let temp_dir = TempDir::new().unwrap();
    let alerts = Arc::new(CountingAlert::default());
    let notifier = Arc::new(RecordingNotifier::default());

    let alert_gate = Arc::new(AlertGate::open(temp_dir.path().join("alerts"), alerts.clone()).unwrap());
    let scheduler = Arc::new(BackgroundScheduler::new(
        JobStore::open(temp_dir.path().join("jobs")).unwrap(),
        Arc::clone(&alert_gate),
        notifier.clone(),
        Duration::from_millis(1_000),
    ));
    let state = Arc::new(AppState::new(
        0,
        "127.0.0.1".to_string(),
        Duration::from_millis(1_000),
        scheduler,
        alert_gate,
    ));

    Harness {
        temp_dir,
        state,
        alerts,
        notifier,
    }
}

pub async fn advance(ms: u64) {
    tokio::time::sleep(Duration::from_millis(ms)).await;
}

//! Durable records for background countdown jobs
//!
//! One JSON file per run under `<state_dir>/jobs/`. Every write goes to a
//! temporary sibling, is synced, then renamed over the record, so a reader
//! (or a restarted daemon) never sees a half-written job.

use std::{
    fs,
    io::Write,
    path::{Path, PathBuf},
};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::{
    error::{Result, TimerError},
    state::RunId,
};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum JobStatus {
    Pending,
    Finished,
    Cancelled,
}

/// Persisted form of an enqueued background countdown
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JobRecord {
    pub run_id: RunId,
    /// Latest remaining time observed by the worker
    pub remaining_ms: u64,
    pub status: JobStatus,
    pub enqueued_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl JobRecord {
    pub fn pending(run_id: RunId, remaining_ms: u64) -> Self {
        let now = Utc::now();
        Self {
            run_id,
            remaining_ms,
            status: JobStatus::Pending,
            enqueued_at: now,
            updated_at: now,
        }
    }
}

#[derive(Debug, Clone)]
pub struct JobStore {
    dir: PathBuf,
}

impl JobStore {
    /// Open (and create if needed) a job directory
    pub fn open(dir: impl Into<PathBuf>) -> Result<Self> {
        let dir = dir.into();
        fs::create_dir_all(&dir).map_err(|e| TimerError::store(&dir, e))?;
        Ok(Self { dir })
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Write a record durably, replacing any previous one for the run
    pub fn persist(&self, record: &JobRecord) -> Result<()> {
        let path = self.record_path(record.run_id);
        let tmp = path.with_extension("json.tmp");
        let bytes = serde_json::to_vec_pretty(record)?;

        let mut file = fs::File::create(&tmp).map_err(|e| TimerError::store(&tmp, e))?;
        file.write_all(&bytes)
            .and_then(|_| file.sync_all())
            .map_err(|e| TimerError::store(&tmp, e))?;
        fs::rename(&tmp, &path).map_err(|e| TimerError::store(&path, e))?;

        debug!("Persisted job {} ({:?}, {}ms left)", record.run_id, record.status, record.remaining_ms);
        Ok(())
    }

    pub fn load(&self, run_id: RunId) -> Result<Option<JobRecord>> {
        let path = self.record_path(run_id);
        match fs::read(&path) {
            Ok(bytes) => Ok(Some(serde_json::from_slice(&bytes)?)),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(TimerError::store(path, e)),
        }
    }

    /// Store the latest remaining time for a pending job
    pub fn record_progress(&self, run_id: RunId, remaining_ms: u64) -> Result<()> {
        self.update(run_id, |record| {
            if record.status == JobStatus::Pending {
                record.remaining_ms = record.remaining_ms.min(remaining_ms);
            }
        })
    }

    pub fn mark(&self, run_id: RunId, status: JobStatus) -> Result<()> {
        self.update(run_id, |record| {
            record.status = status;
            if status == JobStatus::Finished {
                record.remaining_ms = 0;
            }
        })
    }

    /// All records still waiting to be counted down
    pub fn pending(&self) -> Result<Vec<JobRecord>> {
        let entries = fs::read_dir(&self.dir).map_err(|e| TimerError::store(&self.dir, e))?;
        let mut jobs = Vec::new();

        for entry in entries {
            let path = entry.map_err(|e| TimerError::store(&self.dir, e))?.path();
            if path.extension().and_then(|ext| ext.to_str()) != Some("json") {
                continue;
            }
            let record = fs::read(&path)
                .map_err(|e| TimerError::store(&path, e))
                .and_then(|bytes| Ok(serde_json::from_slice::<JobRecord>(&bytes)?));
            match record {
                Ok(record) if record.status == JobStatus::Pending => jobs.push(record),
                Ok(_) => {}
                Err(e) => warn!("Skipping unreadable job record {}: {}", path.display(), e),
            }
        }

        Ok(jobs)
    }

    pub fn remove(&self, run_id: RunId) -> Result<()> {
        let path = self.record_path(run_id);
        match fs::remove_file(&path) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(TimerError::store(path, e)),
        }
    }

    fn update<F>(&self, run_id: RunId, updater: F) -> Result<()>
    where
        F: FnOnce(&mut JobRecord),
    {
        let Some(mut record) = self.load(run_id)? else {
            return Ok(());
        };
        updater(&mut record);
        record.updated_at = Utc::now();
        self.persist(&record)
    }

    fn record_path(&self, run_id: RunId) -> PathBuf {
        self.dir.join(format!("{}.json", run_id))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn persisted_job_survives_reopen() {
        let temp_dir = TempDir::new().unwrap();
        let run_id = RunId::new();

        let store = JobStore::open(temp_dir.path().join("jobs")).unwrap();
        store.persist(&JobRecord::pending(run_id, 5_000)).unwrap();
        drop(store);

        let reopened = JobStore::open(temp_dir.path().join("jobs")).unwrap();
        let record = reopened.load(run_id).unwrap().unwrap();
        assert_eq!(record.remaining_ms, 5_000);
        assert_eq!(record.status, JobStatus::Pending);
        assert_eq!(reopened.pending().unwrap().len(), 1);
    }

    #[test]
    fn progress_never_increases() {
        let temp_dir = TempDir::new().unwrap();
        let store = JobStore::open(temp_dir.path()).unwrap();
        let run_id = RunId::new();
        store.persist(&JobRecord::pending(run_id, 5_000)).unwrap();

        store.record_progress(run_id, 3_000).unwrap();
        store.record_progress(run_id, 4_000).unwrap();
        assert_eq!(store.load(run_id).unwrap().unwrap().remaining_ms, 3_000);
    }

    #[test]
    fn finished_jobs_are_not_pending() {
        let temp_dir = TempDir::new().unwrap();
        let store = JobStore::open(temp_dir.path()).unwrap();
        let done = RunId::new();
        let waiting = RunId::new();
        store.persist(&JobRecord::pending(done, 1_000)).unwrap();
        store.persist(&JobRecord::pending(waiting, 2_000)).unwrap();

        store.mark(done, JobStatus::Finished).unwrap();

        let pending = store.pending().unwrap();
        assert_eq!(pending.len(), 1);
        assert_eq!(pending[0].run_id, waiting);
        assert_eq!(store.load(done).unwrap().unwrap().remaining_ms, 0);
    }

    #[test]
    fn updating_a_missing_job_is_a_no_op() {
        let temp_dir = TempDir::new().unwrap();
        let store = JobStore::open(temp_dir.path()).unwrap();
        let run_id = RunId::new();

        store.record_progress(run_id, 1_000).unwrap();
        store.remove(run_id).unwrap();
        assert!(store.load(run_id).unwrap().is_none());
    }
}

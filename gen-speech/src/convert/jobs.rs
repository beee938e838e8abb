//! In-memory tracking of running conversions.
//!
//! Finished ids are remembered so they cannot be restarted, but only the
//! most recent [`DEFAULT_FINISHED_HISTORY`] of them; older ones are
//! forgotten in the order they finished.

use std::collections::{HashMap, VecDeque};
use std::sync::{Arc, Mutex, MutexGuard};
use thiserror::Error;

/// Lifecycle state of a job.
///
/// The only transitions are `Processing -> Completed` and
/// `Processing -> Failed`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum JobState {
    Processing,
    Completed,
    Failed,
}

/// Snapshot of one job.
#[derive(Debug, Clone, PartialEq)]
pub struct Job {
    pub id: String,
    pub state: JobState,
    pub completed_chunks: usize,
    pub total_chunks: usize,
}

impl Job {
    /// Completion percentage, 0.0 to 100.0.
    pub fn progress(&self) -> f64 {
        if self.total_chunks == 0 {
            return 0.0;
        }
        self.completed_chunks as f64 / self.total_chunks as f64 * 100.0
    }
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum JobError {
    #[error("Job {0} is already running")]
    AlreadyRunning(String),

    #[error("Job {0} has already finished")]
    AlreadyFinished(String),

    #[error("No running job {0}")]
    NotRunning(String),

    #[error("Job tracker lock poisoned")]
    Poisoned,
}

/// Finished ids remembered by [`JobTracker::new`]
pub const DEFAULT_FINISHED_HISTORY: usize = 1024;

#[derive(Debug)]
struct Jobs {
    live: HashMap<String, Job>,
    finished: HashMap<String, JobState>,
    // Oldest first
    finished_order: VecDeque<String>,
    history: usize,
}

impl Jobs {
    fn remember(&mut self, id: &str, state: JobState) {
        if self.finished.insert(id.to_string(), state).is_none() {
            self.finished_order.push_back(id.to_string());
        }
        while self.finished_order.len() > self.history {
            if let Some(oldest) = self.finished_order.pop_front() {
                self.finished.remove(&oldest);
            }
        }
    }
}

/// Shared registry of jobs. Clones refer to the same registry.
#[derive(Debug, Clone)]
pub struct JobTracker {
    inner: Arc<Mutex<Jobs>>,
}

impl Default for JobTracker {
    fn default() -> Self {
        Self::with_history(DEFAULT_FINISHED_HISTORY)
    }
}

impl JobTracker {
    pub fn new() -> Self {
        Self::default()
    }

    /// Tracker that remembers at most `history` finished ids.
    pub fn with_history(history: usize) -> Self {
        Self {
            inner: Arc::new(Mutex::new(Jobs {
                live: HashMap::new(),
                finished: HashMap::new(),
                finished_order: VecDeque::new(),
                history,
            })),
        }
    }

    /// Register a new job in the processing state.
    pub fn start(&self, id: &str, total_chunks: usize) -> Result<(), JobError> {
        let mut jobs = self.lock()?;

        if jobs.live.contains_key(id) {
            return Err(JobError::AlreadyRunning(id.to_string()));
        }
        if jobs.finished.contains_key(id) {
            return Err(JobError::AlreadyFinished(id.to_string()));
        }

        jobs.live.insert(
            id.to_string(),
            Job {
                id: id.to_string(),
                state: JobState::Processing,
                completed_chunks: 0,
                total_chunks,
            },
        );
        Ok(())
    }

    /// Record how many chunks of a running job are done.
    pub fn set_progress(&self, id: &str, completed_chunks: usize) -> Result<(), JobError> {
        let mut jobs = self.lock()?;
        let job = jobs
            .live
            .get_mut(id)
            .ok_or_else(|| JobError::NotRunning(id.to_string()))?;

        job.completed_chunks = completed_chunks.min(job.total_chunks);
        Ok(())
    }

    /// Snapshot of a running job.
    pub fn get(&self, id: &str) -> Option<Job> {
        self.lock().ok()?.live.get(id).cloned()
    }

    /// Move a running job to `Completed` and drop it from the live set.
    pub fn complete(&self, id: &str) -> Result<Job, JobError> {
        self.finish(id, JobState::Completed)
    }

    /// Move a running job to `Failed` and drop it from the live set.
    pub fn fail(&self, id: &str) -> Result<Job, JobError> {
        self.finish(id, JobState::Failed)
    }

    /// Snapshots of all running jobs.
    pub fn active(&self) -> Vec<Job> {
        self.lock()
            .map(|jobs| jobs.live.values().cloned().collect())
            .unwrap_or_default()
    }

    fn finish(&self, id: &str, state: JobState) -> Result<Job, JobError> {
        let mut jobs = self.lock()?;

        let Some(mut job) = jobs.live.remove(id) else {
            return Err(if jobs.finished.contains_key(id) {
                JobError::AlreadyFinished(id.to_string())
            } else {
                JobError::NotRunning(id.to_string())
            });
        };

        job.state = state;
        if state == JobState::Completed {
            job.completed_chunks = job.total_chunks;
        }
        jobs.remember(id, state);
        Ok(job)
    }

    fn lock(&self) -> Result<MutexGuard<'_, Jobs>, JobError> {
        self.inner.lock().map_err(|_| JobError::Poisoned)
    }
}

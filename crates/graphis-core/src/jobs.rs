//! Single-slot background training job controller.
//!
//! At most one training job exists at a time. Submitting while a job is
//! running fails with `JobError::Busy`; jobs are never queued. A finished
//! job's record (result or error) stays readable until the next submission
//! overwrites it.

use std::sync::{Arc, Mutex, PoisonError};

use serde::Serialize;

use crate::error::{GraphisError, JobError};

/// Lifecycle of the training slot.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum JobState {
    Idle,
    Running,
    Completed,
    Failed,
}

/// What a successful run produced.
#[derive(Debug, Clone, Serialize)]
pub struct JobResult {
    pub version: u32,
    pub timestamp: String,
}

/// Snapshot of the training slot, safe to serialize for status endpoints.
#[derive(Debug, Clone, Serialize)]
pub struct TrainingJob {
    pub state: JobState,
    /// Coarse progress: 0 while running, 100 on completion.
    pub progress: u8,
    pub result: Option<JobResult>,
    pub error: Option<String>,
}

impl TrainingJob {
    fn idle() -> Self {
        Self {
            state: JobState::Idle,
            progress: 0,
            result: None,
            error: None,
        }
    }
}

/// Owns the single training slot and runs submitted work off the async
/// runtime's blocking pool.
pub struct JobController {
    job: Arc<Mutex<TrainingJob>>,
}

impl Default for JobController {
    fn default() -> Self {
        Self::new()
    }
}

impl JobController {
    pub fn new() -> Self {
        Self {
            job: Arc::new(Mutex::new(TrainingJob::idle())),
        }
    }

    /// Snapshot of the current job record.
    pub fn status(&self) -> TrainingJob {
        lock(&self.job).clone()
    }

    /// Claim the slot and run `task` on the blocking pool.
    ///
    /// The slot transitions to Running before this returns, so a caller
    /// that polls immediately after a successful submit never observes the
    /// previous job's record. Task panics poison nothing; the lock is
    /// recovered and the slot reports Failed.
    pub fn submit<F>(&self, task: F) -> Result<(), JobError>
    where
        F: FnOnce() -> Result<JobResult, GraphisError> + Send + 'static,
    {
        {
            let mut job = lock(&self.job);
            if job.state == JobState::Running {
                return Err(JobError::Busy);
            }
            *job = TrainingJob {
                state: JobState::Running,
                progress: 0,
                result: None,
                error: None,
            };
        }
        tracing::info!("Training job started");

        let slot = Arc::clone(&self.job);
        tokio::task::spawn_blocking(move || {
            let outcome = std::panic::catch_unwind(std::panic::AssertUnwindSafe(task));
            let mut job = lock(&slot);
            match outcome {
                Ok(Ok(result)) => {
                    tracing::info!(version = result.version, "Training job completed");
                    job.state = JobState::Completed;
                    job.progress = 100;
                    job.result = Some(result);
                }
                Ok(Err(e)) => {
                    tracing::error!(error = %e, "Training job failed");
                    job.state = JobState::Failed;
                    job.error = Some(e.to_string());
                }
                Err(_) => {
                    tracing::error!("Training job panicked");
                    job.state = JobState::Failed;
                    job.error = Some("training task panicked".to_string());
                }
            }
        });
        Ok(())
    }
}

fn lock(job: &Mutex<TrainingJob>) -> std::sync::MutexGuard<'_, TrainingJob> {
    job.lock().unwrap_or_else(PoisonError::into_inner)
}

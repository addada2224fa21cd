//! Registry of in-flight slice-map jobs.
//!
//! Every read-modify-write of the job table happens under one mutex, so the
//! "is a job registered?" check and the spawn of a new job are a single atomic
//! step. Two requests for the same fingerprint can never both start work.

use std::collections::HashMap;
use std::future::Future;
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::{Duration, Instant};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use crate::error::SliceMapError;
use crate::fingerprint::Fingerprint;

/// Outcome recorded by a job's task
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum JobOutcome {
    Running,
    Succeeded,
    Failed(String),
}

/// What a status poll reports
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum JobStatus {
    Running,
    /// Finished successfully, or nothing registered for this key
    Done,
    Failed(String),
}

struct JobEntry {
    handle: JoinHandle<()>,
    outcome: Arc<Mutex<JobOutcome>>,
    cancel: CancellationToken,
    started_at: Instant,
}

impl JobEntry {
    fn is_running(&self) -> bool {
        !self.handle.is_finished()
    }

    /// Final status of a finished task. A task that finished without
    /// recording an outcome panicked.
    fn finished_status(&self) -> JobStatus {
        match lock(&self.outcome).clone() {
            JobOutcome::Succeeded => JobStatus::Done,
            JobOutcome::Failed(reason) => JobStatus::Failed(reason),
            JobOutcome::Running => JobStatus::Failed("job terminated unexpectedly".to_string()),
        }
    }
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

pub struct JobRegistry {
    jobs: Arc<Mutex<HashMap<Fingerprint, JobEntry>>>,
    /// Failures of timed-out jobs, reaped before anyone polled them
    expired: Arc<Mutex<HashMap<Fingerprint, String>>>,
    job_timeout: Option<Duration>,
}

impl Default for JobRegistry {
    fn default() -> Self {
        Self::new(None)
    }
}

impl JobRegistry {
    pub fn new(job_timeout: Option<Duration>) -> Self {
        Self {
            jobs: Arc::new(Mutex::new(HashMap::new())),
            expired: Arc::new(Mutex::new(HashMap::new())),
            job_timeout,
        }
    }

    /// Start `work` for `fingerprint` unless a job (running or finished but not
    /// yet reaped) is already registered. Returns whether a new job started.
    ///
    /// A job that exceeds the timeout is cancelled and removed at once; its
    /// failure is still reported by the next [`poll_status`](Self::poll_status).
    ///
    /// Must be called from within a tokio runtime.
    pub fn try_start<F, Fut>(&self, fingerprint: &Fingerprint, work: F) -> bool
    where
        F: FnOnce(CancellationToken) -> Fut,
        Fut: Future<Output = Result<(), SliceMapError>> + Send + 'static,
    {
        let mut jobs = lock(&self.jobs);

        if jobs.contains_key(fingerprint) {
            tracing::debug!("🔁 Job {} already registered, not starting another", fingerprint);
            return false;
        }

        lock(&self.expired).remove(fingerprint);

        let cancel = CancellationToken::new();
        let outcome = Arc::new(Mutex::new(JobOutcome::Running));
        let future = work(cancel.clone());

        let task_outcome = Arc::clone(&outcome);
        let task_cancel = cancel.clone();
        let task_fingerprint = fingerprint.clone();
        let task_jobs = Arc::clone(&self.jobs);
        let task_expired = Arc::clone(&self.expired);
        let timeout = self.job_timeout;

        let handle = tokio::spawn(async move {
            let (result, timed_out) = match timeout {
                Some(limit) => match tokio::time::timeout(limit, future).await {
                    Ok(result) => (result, false),
                    Err(_) => {
                        task_cancel.cancel();
                        let err = SliceMapError::PipelineFailure(format!(
                            "timed out after {}",
                            humantime::format_duration(limit)
                        ));
                        (Err(err), true)
                    }
                },
                None => (future.await, false),
            };

            let final_outcome = match result {
                Ok(()) => {
                    tracing::info!("✅ Job {} finished", task_fingerprint);
                    JobOutcome::Succeeded
                }
                Err(e) => {
                    tracing::error!("❌ Job {} failed: {}", task_fingerprint, e);
                    JobOutcome::Failed(e.to_string())
                }
            };

            if timed_out {
                if let JobOutcome::Failed(reason) = &final_outcome {
                    let mut jobs = lock(&task_jobs);
                    let same_job = jobs
                        .get(&task_fingerprint)
                        .is_some_and(|entry| Arc::ptr_eq(&entry.outcome, &task_outcome));
                    if same_job {
                        jobs.remove(&task_fingerprint);
                        lock(&task_expired).insert(task_fingerprint.clone(), reason.clone());
                    }
                }
            }

            *lock(&task_outcome) = final_outcome;
        });

        jobs.insert(
            fingerprint.clone(),
            JobEntry {
                handle,
                outcome,
                cancel,
                started_at: Instant::now(),
            },
        );

        tracing::info!("🚀 Started job {} ({} active)", fingerprint, jobs.len());
        true
    }

    /// Report the job's state; a finished job is removed on first observation.
    pub fn poll_status(&self, fingerprint: &Fingerprint) -> JobStatus {
        let mut jobs = lock(&self.jobs);

        let Some(entry) = jobs.get(fingerprint) else {
            return match lock(&self.expired).remove(fingerprint) {
                Some(reason) => JobStatus::Failed(reason),
                None => JobStatus::Done,
            };
        };

        if entry.is_running() {
            return JobStatus::Running;
        }

        let status = entry.finished_status();
        if let Some(entry) = jobs.remove(fingerprint) {
            tracing::debug!(
                "🧹 Reaped job {} after {:?}",
                fingerprint,
                entry.started_at.elapsed()
            );
        }
        status
    }

    pub fn is_registered(&self, fingerprint: &Fingerprint) -> bool {
        lock(&self.jobs).contains_key(fingerprint)
    }

    pub fn len(&self) -> usize {
        lock(&self.jobs).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Signal every registered job to stop. Entries stay registered until polled.
    pub fn cancel_all(&self) {
        let jobs = lock(&self.jobs);
        for (fingerprint, entry) in jobs.iter() {
            if entry.is_running() {
                tracing::info!("🛑 Cancelling job {}", fingerprint);
                entry.cancel.cancel();
            }
        }
    }
}

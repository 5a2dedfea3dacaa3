//! In-memory unlock job store
//!
//! Owns every [`Job`] record and its temporary files, and serializes all
//! lifecycle transitions through one mutex. The state machine is
//! `running -> {done, error, canceled}`; all three targets are terminal and
//! the first terminal write wins. Only three mutators exist for a given job:
//! the creating task, the detached completion task, and an explicit cancel.
//!
//! Files are deleted exactly once, at removal from the store — on result
//! delivery, on terminal-poll delivery, or by the reaper once a terminal job
//! has aged past the retention window.

use crate::error::{Error, Result};
use crate::rate_limit::FailureTracker;
use crate::runner::{UnlockOutcome, UnlockRunner};
use crate::types::{JobId, JobStatus, UnlockErrorKind};
use std::{
    collections::HashMap,
    path::{Path, PathBuf},
    sync::Arc,
    time::{Duration, Instant},
};
use tokio::sync::Mutex;
use tokio_util::sync::CancellationToken;

/// Prefix for per-job temporary working directories
const WORK_DIR_PREFIX: &str = "pdf-unlock-";

/// Name of the uploaded document inside the working directory
const INPUT_FILE: &str = "input.pdf";

/// Name of the decrypted document inside the working directory
const OUTPUT_FILE: &str = "output.pdf";

/// Lifecycle state of a job
///
/// Tagged variant rather than a status string so that illegal transitions
/// (e.g. `done -> error`) are unrepresentable: [`JobStore::settle`] only
/// replaces a `Running` state, and nothing else writes states at all.
#[derive(Debug)]
enum JobState {
    /// Process spawned, no result yet; the token reaches the completion task
    Running { cancel: CancellationToken },
    /// Process exited 0
    Done,
    /// Process failed; kind and message surface on the next poll
    Failed {
        kind: UnlockErrorKind,
        message: String,
    },
    /// Explicitly canceled while running
    Canceled,
}

impl JobState {
    fn status(&self) -> JobStatus {
        match self {
            JobState::Running { .. } => JobStatus::Running,
            JobState::Done => JobStatus::Done,
            JobState::Failed { .. } => JobStatus::Error,
            JobState::Canceled => JobStatus::Canceled,
        }
    }

    fn is_running(&self) -> bool {
        matches!(self, JobState::Running { .. })
    }
}

/// One tracked attempt to remove a password from a single uploaded PDF
#[derive(Debug)]
struct Job {
    client: String,
    work_dir: PathBuf,
    output_path: PathBuf,
    original_name: String,
    state: JobState,
    updated_at: Instant,
}

/// What a poll observes for a given job id
#[derive(Debug)]
pub enum PollOutcome {
    /// No live job under that id
    NotFound,
    /// Still working; poll again shortly
    Running,
    /// Terminal; the job has been removed from the store and its files are
    /// now the caller's to read and then [`FinishedJob::cleanup`]
    Finished(FinishedJob),
}

/// Terminal state of a finished job, detached from the store
#[derive(Debug)]
pub struct FinishedJob {
    /// How the job ended
    pub outcome: FinishedOutcome,
    /// Filename the upload arrived under
    pub original_name: String,
    /// Where the decrypted document was written (valid until `cleanup`)
    pub output_path: PathBuf,
    work_dir: PathBuf,
}

/// Terminal disposition carried by [`FinishedJob`]
#[derive(Debug)]
pub enum FinishedOutcome {
    /// Output file written; stream it to the client
    Done,
    /// Canceled before completion
    Canceled,
    /// Failed; kind selects the HTTP status, message is the body
    Failed {
        /// Machine-readable failure kind
        kind: UnlockErrorKind,
        /// Stored user-facing message
        message: String,
    },
}

impl FinishedJob {
    /// Delete the job's working directory. Best-effort and idempotent;
    /// failures are logged, never raised.
    pub async fn cleanup(self) {
        cleanup_work_dir(&self.work_dir).await;
    }
}

/// Concurrency-safe store of all live unlock jobs
pub struct JobStore {
    jobs: Mutex<HashMap<JobId, Job>>,
    runner: Arc<dyn UnlockRunner>,
    failures: Arc<FailureTracker>,
    retention: Duration,
}

impl JobStore {
    /// Create a store spawning work through `runner`.
    ///
    /// `retention` bounds how long a terminal job may sit unclaimed before
    /// the reaper removes it; it matches the rate-limit window in the
    /// default configuration.
    pub fn new(
        runner: Arc<dyn UnlockRunner>,
        failures: Arc<FailureTracker>,
        retention: Duration,
    ) -> Self {
        Self {
            jobs: Mutex::new(HashMap::new()),
            runner,
            failures,
            retention,
        }
    }

    /// Register a new job: persist the upload, spawn the decrypt process,
    /// and return without waiting for completion.
    ///
    /// A spawn failure still creates the job, already terminal, so the
    /// client learns the outcome on its first poll.
    pub async fn create(
        self: &Arc<Self>,
        file_bytes: &[u8],
        original_name: &str,
        password: &str,
        client: &str,
    ) -> Result<JobId> {
        let id = JobId::new();
        let work_dir = tempfile::Builder::new()
            .prefix(WORK_DIR_PREFIX)
            .tempdir()
            .map_err(Error::Io)?
            .keep();
        let input_path = work_dir.join(INPUT_FILE);
        let output_path = work_dir.join(OUTPUT_FILE);

        if let Err(e) = tokio::fs::write(&input_path, file_bytes).await {
            cleanup_work_dir(&work_dir).await;
            return Err(Error::Io(e));
        }

        // The job must be registered before the completion task can run,
        // or a fast exit would settle against an absent entry.
        let (state, running) = match self.runner.spawn(&input_path, &output_path, password).await {
            Ok(running) => {
                let cancel = CancellationToken::new();
                (JobState::Running { cancel }, Some(running))
            }
            Err(Error::ToolMissing(message)) => {
                tracing::error!(job_id = %id, "qpdf binary not found");
                (
                    JobState::Failed {
                        kind: UnlockErrorKind::QpdfMissing,
                        message,
                    },
                    None,
                )
            }
            Err(e) => {
                tracing::error!(job_id = %id, error = %e, "failed to spawn unlock process");
                (
                    JobState::Failed {
                        kind: UnlockErrorKind::SpawnError,
                        message: "Failed to start unlock process.".to_string(),
                    },
                    None,
                )
            }
        };

        let cancel = match &state {
            JobState::Running { cancel } => Some(cancel.clone()),
            _ => None,
        };

        let job = Job {
            client: client.to_string(),
            work_dir,
            output_path,
            original_name: original_name.to_string(),
            state,
            updated_at: Instant::now(),
        };

        self.jobs.lock().await.insert(id, job);

        if let (Some(running), Some(cancel)) = (running, cancel) {
            self.spawn_completion(id, running, cancel);
        }

        tracing::info!(job_id = %id, name = original_name, "unlock job created");
        Ok(id)
    }

    /// Detach a task that waits for the process and settles the job.
    fn spawn_completion(
        self: &Arc<Self>,
        id: JobId,
        mut running: crate::runner::RunningUnlock,
        cancel: CancellationToken,
    ) {
        let store = Arc::clone(self);
        tokio::spawn(async move {
            let waited = tokio::select! {
                res = running.wait() => res,
                _ = cancel.cancelled() => {
                    running.terminate();
                    running.wait().await
                }
            };

            let outcome = match waited {
                Ok(status) => {
                    let stderr = running.stderr_text().await;
                    crate::runner::classify(status, &stderr, cancel.is_cancelled())
                }
                Err(e) => {
                    tracing::error!(job_id = %id, error = %e, "waiting on unlock process failed");
                    UnlockOutcome::failed(
                        UnlockErrorKind::SpawnError,
                        "Failed to start unlock process.",
                    )
                }
            };

            store.settle(id, outcome).await;
        });
    }

    /// Apply a process outcome to a job that is still running.
    ///
    /// Jobs already terminal (canceled races in particular) and jobs no
    /// longer in the store are left untouched.
    async fn settle(&self, id: JobId, outcome: UnlockOutcome) {
        let client = {
            let mut jobs = self.jobs.lock().await;
            match jobs.get_mut(&id) {
                Some(job) if job.state.is_running() => {
                    job.state = match &outcome {
                        UnlockOutcome::Done => JobState::Done,
                        UnlockOutcome::Canceled => JobState::Canceled,
                        UnlockOutcome::Failed { kind, message } => JobState::Failed {
                            kind: *kind,
                            message: message.clone(),
                        },
                    };
                    job.updated_at = Instant::now();
                    Some(job.client.clone())
                }
                _ => None,
            }
        };

        let Some(client) = client else {
            tracing::debug!(job_id = %id, "completion outcome dropped; job already settled");
            return;
        };
        let client = client.as_str();

        match &outcome {
            UnlockOutcome::Done => {
                tracing::info!(job_id = %id, "unlock job done");
                self.failures.clear(client).await;
            }
            UnlockOutcome::Failed {
                kind: UnlockErrorKind::IncorrectPassword,
                ..
            } => {
                tracing::info!(job_id = %id, "incorrect password");
                self.failures.record_failure(client).await;
            }
            UnlockOutcome::Failed { kind, .. } => {
                tracing::warn!(job_id = %id, kind = kind.as_str(), "unlock job failed");
            }
            UnlockOutcome::Canceled => {
                tracing::info!(job_id = %id, "unlock job canceled");
            }
        }
    }

    /// Current status of a job, if it is still in the store
    pub async fn status(&self, id: JobId) -> Option<JobStatus> {
        self.jobs.lock().await.get(&id).map(|j| j.state.status())
    }

    /// Observe a job for a poll request.
    ///
    /// Terminal jobs are removed from the store here; the returned
    /// [`FinishedJob`] carries everything needed to build the response and
    /// clean up afterwards. Running jobs are left in place.
    pub async fn poll(&self, id: JobId) -> PollOutcome {
        let mut jobs = self.jobs.lock().await;
        match jobs.get(&id) {
            None => return PollOutcome::NotFound,
            Some(job) if job.state.is_running() => return PollOutcome::Running,
            Some(_) => {}
        }

        // Terminal: detach the record so its files are delivered and
        // deleted exactly once.
        let Some(job) = jobs.remove(&id) else {
            return PollOutcome::NotFound;
        };
        let outcome = match job.state {
            JobState::Done => FinishedOutcome::Done,
            JobState::Canceled => FinishedOutcome::Canceled,
            JobState::Failed { kind, message } => FinishedOutcome::Failed { kind, message },
            // unreachable: running jobs returned above and nothing ran since
            JobState::Running { .. } => return PollOutcome::Running,
        };
        PollOutcome::Finished(FinishedJob {
            outcome,
            original_name: job.original_name,
            output_path: job.output_path,
            work_dir: job.work_dir,
        })
    }

    /// Cancel a running job.
    ///
    /// Absent job → `None`. Terminal job → its current status, untouched.
    /// Running job → marked canceled, process signaled, `Canceled` returned.
    pub async fn cancel(&self, id: JobId) -> Option<JobStatus> {
        let mut jobs = self.jobs.lock().await;
        let job = jobs.get_mut(&id)?;
        match &job.state {
            JobState::Running { cancel } => {
                cancel.cancel();
                job.state = JobState::Canceled;
                job.updated_at = Instant::now();
                tracing::info!(job_id = %id, "cancel requested");
                Some(JobStatus::Canceled)
            }
            terminal => Some(terminal.status()),
        }
    }

    /// Remove terminal jobs whose last update is older than the retention
    /// window, deleting their working directories. Running jobs are never
    /// reaped regardless of age.
    pub async fn reap(&self) {
        let now = Instant::now();
        let stale: Vec<(JobId, PathBuf)> = {
            let mut jobs = self.jobs.lock().await;
            let ids: Vec<JobId> = jobs
                .iter()
                .filter(|(_, job)| {
                    !job.state.is_running()
                        && now.duration_since(job.updated_at) > self.retention
                })
                .map(|(id, _)| *id)
                .collect();
            ids.into_iter()
                .filter_map(|id| jobs.remove(&id).map(|job| (id, job.work_dir)))
                .collect()
        };

        for (id, work_dir) in stale {
            tracing::debug!(job_id = %id, "reaping stale unlock job");
            cleanup_work_dir(&work_dir).await;
        }
    }

    /// Spawn the periodic reap task. Stops when `shutdown` fires.
    pub fn spawn_reaper(
        self: &Arc<Self>,
        interval: Duration,
        shutdown: CancellationToken,
    ) -> tokio::task::JoinHandle<()> {
        let store = Arc::clone(self);
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);
            loop {
                tokio::select! {
                    _ = ticker.tick() => store.reap().await,
                    _ = shutdown.cancelled() => break,
                }
            }
            tracing::debug!("job reaper stopped");
        })
    }
}

/// Delete a job's working directory. Idempotent; failures are logged and
/// swallowed so cleanup can never fail a request.
async fn cleanup_work_dir(work_dir: &Path) {
    if let Err(e) = tokio::fs::remove_dir_all(work_dir).await {
        if e.kind() != std::io::ErrorKind::NotFound {
            tracing::warn!(
                work_dir = %work_dir.display(),
                error = %e,
                "failed to delete unlock working directory"
            );
        }
    }
}

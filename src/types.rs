//! Core types shared across the unlock backend.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use utoipa::ToSchema;
use uuid::Uuid;

/// Unique identifier for an unlock job.
///
/// Opaque to clients; issued on start and echoed back on poll/cancel.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize, ToSchema)]
#[schema(value_type = String)]
pub struct JobId(pub Uuid);

impl JobId {
    /// Generate a fresh random job identifier
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for JobId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for JobId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

impl FromStr for JobId {
    type Err = uuid::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(Self(Uuid::parse_str(s)?))
    }
}

/// Externally visible status of an unlock job
///
/// `Done`, `Error` and `Canceled` are terminal: once a job reports one of
/// them it never reports anything else.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "lowercase")]
pub enum JobStatus {
    /// Process spawned, no result yet
    Running,
    /// Process exited successfully and wrote an output file
    Done,
    /// Process failed; see [`UnlockErrorKind`]
    Error,
    /// Explicitly canceled by the client
    Canceled,
}

impl JobStatus {
    /// Lowercase wire representation, matching the serde rename
    pub fn as_str(&self) -> &'static str {
        match self {
            JobStatus::Running => "running",
            JobStatus::Done => "done",
            JobStatus::Error => "error",
            JobStatus::Canceled => "canceled",
        }
    }
}

impl fmt::Display for JobStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Classified failure cause for a job that ended in [`JobStatus::Error`]
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "snake_case")]
pub enum UnlockErrorKind {
    /// The supplied password did not decrypt the document
    IncorrectPassword,
    /// The qpdf binary is not installed on this host
    QpdfMissing,
    /// The process could not be launched at all
    SpawnError,
    /// Any other nonzero exit
    UnlockFailed,
}

impl UnlockErrorKind {
    /// Machine-readable code used in API error bodies
    pub fn as_str(&self) -> &'static str {
        match self {
            UnlockErrorKind::IncorrectPassword => "incorrect_password",
            UnlockErrorKind::QpdfMissing => "qpdf_missing",
            UnlockErrorKind::SpawnError => "spawn_error",
            UnlockErrorKind::UnlockFailed => "unlock_failed",
        }
    }
}

/// Response body for a successfully started job
#[derive(Clone, Debug, Serialize, Deserialize, ToSchema)]
pub struct StartedResponse {
    /// Identifier to poll and cancel with
    #[serde(rename = "jobId")]
    pub job_id: JobId,
    /// Always [`JobStatus::Running`] at start time
    pub status: JobStatus,
}

/// Response body carrying only a job status
#[derive(Clone, Debug, Serialize, Deserialize, ToSchema)]
pub struct JobStatusResponse {
    /// Current (or final) status of the job
    pub status: JobStatus,
}

/// Response body for the health endpoint
#[derive(Clone, Debug, Serialize, Deserialize, ToSchema)]
pub struct HealthResponse {
    /// Always true when the service is up
    pub ok: bool,
}

use cf_core::{Error, ErrorKind, FileFormat, JobId, QualityTier};
use cf_pipeline::{ConversionOutput, Progress};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Process-wide job slot. At most one job is `Running`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "state", rename_all = "lowercase")]
pub enum JobState {
    Idle,
    Running(RunningJob),
}

impl JobState {
    pub fn is_running(&self) -> bool {
        matches!(self, JobState::Running(_))
    }

    pub fn job_id(&self) -> Option<JobId> {
        match self {
            JobState::Idle => None,
            JobState::Running(job) => Some(job.job_id),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RunningJob {
    pub job_id: JobId,
    pub file_name: String,
    pub output_format: FileFormat,
    pub quality: QualityTier,
    pub progress: Progress,
    pub started_at: DateTime<Utc>,
}

/// Answer to a status query.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct JobStatus {
    pub in_progress: bool,
    pub progress: Progress,
}

/// Failure response shown to a surface.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FailureResponse {
    pub error_kind: ErrorKind,
    pub message: String,
}

impl FailureResponse {
    pub fn new(error_kind: ErrorKind, message: impl Into<String>) -> Self {
        Self {
            error_kind,
            message: message.into(),
        }
    }
}

impl From<&Error> for FailureResponse {
    fn from(err: &Error) -> Self {
        Self {
            error_kind: err.kind(),
            message: err.to_string(),
        }
    }
}

/// The retained result of the last finished job.
#[derive(Debug, Clone, PartialEq)]
pub struct FinishedJob {
    pub job_id: JobId,
    pub output_file_name: String,
    pub result: Result<ConversionOutput, FailureResponse>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "outcome", rename_all = "lowercase")]
pub enum JobOutcome {
    Succeeded { mime_type: String, size: u64 },
    Failed { kind: ErrorKind, message: String },
}

/// Summary of a finished job kept in the coordinator's history.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JobRecord {
    pub job_id: JobId,
    pub file_name: String,
    pub output_format: FileFormat,
    pub quality: QualityTier,
    pub outcome: JobOutcome,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
}

impl JobRecord {
    pub fn succeeded(&self) -> bool {
        matches!(self.outcome, JobOutcome::Succeeded { .. })
    }

    pub fn elapsed(&self) -> chrono::Duration {
        self.finished_at - self.started_at
    }
}

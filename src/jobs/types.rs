//! Job records and lifecycle states.

use serde::Serialize;
use time::OffsetDateTime;
use uuid::Uuid;

/// Lifecycle state of an ingestion job.
///
/// Transitions are monotonic within one run: `Pending` → `Processing`
/// (re-entered once per pipeline step) → `Done` or `Failed`. A job never
/// reverts from a terminal state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum JobStatus {
    /// Created by the upload handler, not yet picked up by a worker.
    Pending,
    /// A worker is executing one of the pipeline steps.
    Processing,
    /// All pipeline steps completed.
    Done,
    /// A pipeline step failed; `error` carries the captured message.
    Failed,
}

impl JobStatus {
    /// Whether the status is `Done` or `Failed`.
    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Done | Self::Failed)
    }
}

/// Durable record tracking one run of the upload-to-index pipeline.
#[derive(Debug, Clone, Serialize)]
pub struct Job {
    /// Caller-generated unique identifier, immutable once created.
    pub job_id: Uuid,
    /// Opaque identifier of the owning user, absent for anonymous uploads.
    pub owner: Option<String>,
    /// Original filename supplied with the upload.
    pub filename: String,
    /// Current lifecycle state.
    pub status: JobStatus,
    /// Label of the step currently (or last) executing.
    pub step: Option<String>,
    /// Captured failure message, populated only for `Failed`.
    pub error: Option<String>,
    /// RFC3339 creation timestamp.
    pub created_at: String,
    /// RFC3339 timestamp of the last status change.
    pub updated_at: String,
}

impl Job {
    /// Build a fresh `Pending` record.
    pub fn new(job_id: Uuid, filename: impl Into<String>, owner: Option<String>) -> Self {
        let now = current_timestamp_rfc3339();
        Self {
            job_id,
            owner,
            filename: filename.into(),
            status: JobStatus::Pending,
            step: None,
            error: None,
            created_at: now.clone(),
            updated_at: now,
        }
    }

    /// Overwrite status, step, and error, bumping the updated-at stamp.
    pub fn set_status(&mut self, status: JobStatus, step: Option<String>, error: Option<String>) {
        self.status = status;
        self.step = step;
        self.error = error;
        self.updated_at = current_timestamp_rfc3339();
    }
}

/// Current timestamp formatted for job records and index payloads.
pub(crate) fn current_timestamp_rfc3339() -> String {
    OffsetDateTime::now_utc()
        .format(&time::format_description::well_known::Rfc3339)
        .unwrap_or_else(|_| "1970-01-01T00:00:00Z".to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn new_job_is_pending_with_empty_step_and_error() {
        let id = Uuid::new_v4();
        let job = Job::new(id, "report.pdf", Some("user-1".into()));
        assert_eq!(job.job_id, id);
        assert_eq!(job.status, JobStatus::Pending);
        assert!(job.step.is_none());
        assert!(job.error.is_none());
        assert_eq!(job.created_at, job.updated_at);
    }

    #[test]
    fn set_status_bumps_updated_at() {
        let mut job = Job::new(Uuid::new_v4(), "report.pdf", None);
        let created = job.created_at.clone();
        job.set_status(JobStatus::Processing, Some("Parsing document".into()), None);
        assert_eq!(job.status, JobStatus::Processing);
        assert_eq!(job.step.as_deref(), Some("Parsing document"));
        assert!(job.updated_at >= created);
    }

    #[test]
    fn terminal_states_are_done_and_failed() {
        assert!(JobStatus::Done.is_terminal());
        assert!(JobStatus::Failed.is_terminal());
        assert!(!JobStatus::Pending.is_terminal());
        assert!(!JobStatus::Processing.is_terminal());
    }

    #[test]
    fn timestamp_is_rfc3339_like() {
        let ts = current_timestamp_rfc3339();
        assert!(ts.contains('T') && ts.ends_with('Z'));
    }
}

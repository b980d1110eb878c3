use crate::JobStatus;
use chrono::{DateTime, Utc};

/// A partial update to a job record.
/// Only fields which are `Some` are written, everything else is left untouched.
#[derive(Debug, Clone, PartialEq)]
pub struct JobUpdate {
    pub status: Option<JobStatus>,
    pub message: Option<String>,
    pub output_key: Option<String>,
    pub parent_job_id: Option<String>,
    pub updated_at: DateTime<Utc>,
    pub completed_at: Option<DateTime<Utc>>,
}

impl JobUpdate {
    /// Set the status, stamping `completed_at` if the job has finished.
    pub fn status(status: JobStatus, now: DateTime<Utc>) -> Self {
        JobUpdate {
            status: Some(status),
            message: None,
            output_key: None,
            parent_job_id: None,
            updated_at: now,
            completed_at: status.is_terminal().then_some(now),
        }
    }

    pub fn parent(parent_job_id: String, now: DateTime<Utc>) -> Self {
        JobUpdate {
            status: None,
            message: None,
            output_key: None,
            parent_job_id: Some(parent_job_id),
            updated_at: now,
            completed_at: None,
        }
    }

    pub fn with_message(mut self, message: Option<String>) -> Self {
        self.message = message;
        self
    }

    pub fn with_output_key(mut self, output_key: Option<String>) -> Self {
        self.output_key = output_key;
        self
    }
}

use crate::JobStatus;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Attribute holding the partition key
pub const JOB_ID: &str = "id";
pub const JOB_NAME: &str = "jobName";
pub const JOB_STATUS: &str = "jobStatus";
pub const OUTPUT_KEY: &str = "outputKey";
pub const MESSAGE: &str = "message";
pub const PARENT_JOB_ID: &str = "parentJobId";
pub const UPDATED_AT: &str = "updatedAt";
pub const COMPLETED_AT: &str = "completedAt";

/// A single row tracking a unit of asynchronous work.
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct JobRecord {
    #[serde(rename = "id")]
    pub job_id: String,
    pub job_name: String,
    pub job_type: String,
    #[serde(rename = "jobStatus")]
    pub status: JobStatus,
    pub input_key: String,
    pub bucket_name: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub output_key: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub parent_job_id: Option<String>,

    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub completed_at: Option<DateTime<Utc>>,
}

impl JobRecord {
    /// A freshly created job, always `PENDING`.
    pub fn pending(
        job_id: String,
        job_name: String,
        job_type: String,
        input_key: String,
        bucket_name: String,
        now: DateTime<Utc>,
    ) -> Self {
        JobRecord {
            job_id,
            job_name,
            job_type,
            status: JobStatus::Pending,
            input_key,
            bucket_name,
            output_key: None,
            message: None,
            parent_job_id: None,
            created_at: now,
            updated_at: now,
            completed_at: None,
        }
    }
}

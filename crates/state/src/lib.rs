use async_trait::async_trait;
use model::record::JobRecord;
use model::update::JobUpdate;
use model::Error;
use std::fmt::{Debug, Display, Formatter};

/// Persistence for job records.
///
/// Implementations must apply updates partially, leaving any field absent from
/// the `JobUpdate` untouched, and must never create a record from an update.
#[async_trait]
pub trait JobLogStore: Send + Sync {
    /// Write a full record, replacing any existing record with the same id.
    async fn put_job(&self, record: JobRecord) -> Result<(), StateError>;
    async fn get_job(&self, job_id: &str) -> Result<JobRecord, StateError>;

    /// Apply a partial update, returning the record as it is afterwards.
    /// Fails with `MissingEntry` without writing if the job doesn't exist.
    async fn update_job(&self, job_id: &str, update: JobUpdate) -> Result<JobRecord, StateError>;

    /// Most recently updated job with the given name.
    async fn find_job_by_name(&self, job_name: &str) -> Result<Option<JobRecord>, StateError>;
    /// Most recently updated job which produced the given output key.
    async fn find_job_by_output_key(
        &self,
        output_key: &str,
    ) -> Result<Option<JobRecord>, StateError>;
}

/// Errors arising from reading or writing job state.
#[derive(Debug)]
pub struct StateError {
    pub state_key: String,

    pub operation: StateOperation,
    pub reason: StateErrorReason,
}

#[derive(Debug)]
pub enum StateErrorReason {
    // An expected record was missing.
    MissingEntry,
    // The record couldn't be converted to or from a JobRecord
    BadState(String),
    // A throttled, timed out or otherwise retryable failure
    Transient(Error),
    // Any other error from the underlying store
    BackendFailure(Error),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StateOperation {
    PutJob,
    GetJob,
    UpdateJob,
    FindJobByName,
    FindJobByOutputKey,
}

impl StateError {
    pub fn new(state_key: String, operation: StateOperation, reason: StateErrorReason) -> Self {
        StateError {
            state_key,
            operation,
            reason,
        }
    }

    pub fn is_transient(&self) -> bool {
        matches!(self.reason, StateErrorReason::Transient(_))
    }

    pub fn is_missing(&self) -> bool {
        matches!(self.reason, StateErrorReason::MissingEntry)
    }
}

impl Display for StateOperation {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        let name: &str = match self {
            StateOperation::PutJob => "put_job",
            StateOperation::GetJob => "get_job",
            StateOperation::UpdateJob => "update_job",
            StateOperation::FindJobByName => "find_job_by_name",
            StateOperation::FindJobByOutputKey => "find_job_by_output_key",
        };

        f.write_str(name)
    }
}

impl Display for StateError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match &self.reason {
            StateErrorReason::MissingEntry => {
                write!(f, "{} [{}]: no such job", self.operation, self.state_key)
            }
            StateErrorReason::BadState(detail) => {
                write!(f, "{} [{}]: bad state {}", self.operation, self.state_key, detail)
            }
            StateErrorReason::Transient(err) => {
                write!(f, "{} [{}]: transient failure {}", self.operation, self.state_key, err)
            }
            StateErrorReason::BackendFailure(err) => {
                write!(f, "{} [{}]: backend failure {}", self.operation, self.state_key, err)
            }
        }
    }
}

impl std::error::Error for StateError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match &self.reason {
            StateErrorReason::Transient(err) | StateErrorReason::BackendFailure(err) => {
                Some(err.as_ref())
            }
            _ => None,
        }
    }
}

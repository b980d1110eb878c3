use state::{StateError, StateOperation};
use std::fmt::{Display, Formatter};

/// Errors surfaced to callers of the job log.
#[derive(Debug)]
pub enum JobLogError {
    /// The job, or the parent it should link to, doesn't exist.
    /// Never retried.
    NotFound {
        job_id: String,
        operation: StateOperation,
    },
    /// The store failed permanently or kept failing until retries ran out.
    Persistence { attempts: u32, source: StateError },
}

impl JobLogError {
    pub(crate) fn from_state(err: StateError, attempts: u32) -> Self {
        if err.is_missing() {
            JobLogError::NotFound {
                job_id: err.state_key,
                operation: err.operation,
            }
        } else {
            JobLogError::Persistence {
                attempts,
                source: err,
            }
        }
    }

    pub fn is_not_found(&self) -> bool {
        matches!(self, JobLogError::NotFound { .. })
    }
}

impl Display for JobLogError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            JobLogError::NotFound { job_id, operation } => {
                write!(f, "No job found for [{job_id}] during {operation}")
            }
            JobLogError::Persistence { attempts, source } => {
                write!(f, "Failed to persist after {attempts} attempt(s): {source}")
            }
        }
    }
}

impl std::error::Error for JobLogError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            JobLogError::NotFound { .. } => None,
            JobLogError::Persistence { source, .. } => Some(source),
        }
    }
}

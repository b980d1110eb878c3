//! Records the status of asynchronous jobs, typically file processing pipelines
//! which read an input object and write an output object.
//!
//! ```ignore
//! use aws_config::BehaviorVersion;
//! use job_log::JobLogService;
//! use model::JobStatus;
//! use state_dynamodb::DynamoDbJobLogStore;
//! use std::sync::Arc;
//!
//! let client = aws_sdk_dynamodb::Client::new(&aws_config::load_defaults(BehaviorVersion::latest()).await);
//! let job_log = JobLogService::new(Arc::new(DynamoDbJobLogStore::new(client, "workers-job-status")));
//!
//! let job_id = job_log.create_job_log("ocr-job", "data-processing", "in.csv", "bucket-a").await?;
//! job_log.update_job_status_by_id(&job_id, JobStatus::Complete, None, Some("out.json")).await?;
//! ```

use chrono::Utc;
use model::record::JobRecord;
use model::update::JobUpdate;
use model::JobStatus;
use state::{JobLogStore, StateOperation};
use std::sync::Arc;
use tracing::{Instrument, Span};

mod error;
mod retry;

pub use crate::error::JobLogError;
pub use crate::retry::RetryPolicy;

/// What to do when no parent job produced a given input.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum ParentLinkMode {
    /// Leave the job unlinked and carry on
    #[default]
    Lenient,
    /// Fail with `JobLogError::NotFound`
    Strict,
}

/// Creates and updates job records, retrying transient store failures.
///
/// The target table belongs to the store, so every service built over a store
/// writes to the same table regardless of other services in the process.
pub struct JobLogService {
    store: Arc<dyn JobLogStore>,
    retry_policy: RetryPolicy,
    parent_link_mode: ParentLinkMode,
}

impl JobLogService {
    pub fn new(store: Arc<dyn JobLogStore>) -> Self {
        JobLogService {
            store,
            retry_policy: RetryPolicy::default(),
            parent_link_mode: ParentLinkMode::default(),
        }
    }

    pub fn with_retry_policy(mut self, retry_policy: RetryPolicy) -> Self {
        self.retry_policy = retry_policy;
        self
    }

    pub fn with_parent_link_mode(mut self, parent_link_mode: ParentLinkMode) -> Self {
        self.parent_link_mode = parent_link_mode;
        self
    }

    /// Record a new `PENDING` job, returning its generated id.
    pub async fn create_job_log(
        &self,
        job_name: &str,
        job_type: &str,
        input_key: &str,
        bucket_name: &str,
    ) -> Result<String, JobLogError> {
        // Generated once so a retried put rewrites the same record
        let job_id: String = uuid::Uuid::new_v4().to_string();
        let record: JobRecord = JobRecord::pending(
            job_id.clone(),
            job_name.to_string(),
            job_type.to_string(),
            input_key.to_string(),
            bucket_name.to_string(),
            Utc::now(),
        );

        let span: Span = tracing::span!(tracing::Level::INFO, "create_job_log", job_id = %job_id);

        async {
            self.retry_policy
                .run(|| self.store.put_job(record.clone()))
                .await?;

            tracing::info!(job_name, job_type, input_key, "Created job");

            Ok::<String, JobLogError>(job_id.clone())
        }
        .instrument(span)
        .await
    }

    /// Set the status of a job, along with a message or output key when given.
    /// Fields which aren't given keep their current values.
    pub async fn update_job_status_by_id(
        &self,
        job_id: &str,
        status: JobStatus,
        message: Option<&str>,
        output_key: Option<&str>,
    ) -> Result<JobRecord, JobLogError> {
        let update: JobUpdate = JobUpdate::status(status, Utc::now())
            .with_message(message.map(str::to_string))
            .with_output_key(output_key.map(str::to_string));

        let span: Span = tracing::span!(tracing::Level::INFO, "update_job_status", job_id);

        async {
            let record: JobRecord = self
                .retry_policy
                .run(|| self.store.update_job(job_id, update.clone()))
                .await?;

            tracing::info!(status = %status, "Updated job status");

            Ok::<JobRecord, JobLogError>(record)
        }
        .instrument(span)
        .await
    }

    /// Link a job to the most recent job whose output is this job's input.
    ///
    /// Returns the parent id, or `None` if no parent exists and the mode is lenient.
    pub async fn update_parent_job_id(
        &self,
        job_id: &str,
        input_key: &str,
    ) -> Result<Option<String>, JobLogError> {
        let span: Span = tracing::span!(tracing::Level::INFO, "update_parent_job_id", job_id);

        async {
            let parent: Option<JobRecord> = self
                .retry_policy
                .run(|| self.store.find_job_by_output_key(input_key))
                .await?;

            let Some(parent) = parent else {
                tracing::debug!(input_key, "No parent job found");

                return match self.parent_link_mode {
                    ParentLinkMode::Lenient => Ok(None),
                    ParentLinkMode::Strict => Err(JobLogError::NotFound {
                        job_id: input_key.to_string(),
                        operation: StateOperation::FindJobByOutputKey,
                    }),
                };
            };

            let update: JobUpdate = JobUpdate::parent(parent.job_id.clone(), Utc::now());
            self.retry_policy
                .run(|| self.store.update_job(job_id, update.clone()))
                .await?;

            tracing::info!(parent_job_id = %parent.job_id, "Linked parent job");

            Ok::<Option<String>, JobLogError>(Some(parent.job_id))
        }
        .instrument(span)
        .await
    }

    /// Id of the most recent job with the given name.
    pub async fn get_job_id_by_name(&self, job_name: &str) -> Result<Option<String>, JobLogError> {
        let span: Span = tracing::span!(tracing::Level::INFO, "get_job_id_by_name", job_name);

        async {
            let job: Option<JobRecord> = self
                .retry_policy
                .run(|| self.store.find_job_by_name(job_name))
                .await?;

            if job.is_none() {
                tracing::debug!("No job found");
            }

            Ok::<Option<String>, JobLogError>(job.map(|job| job.job_id))
        }
        .instrument(span)
        .await
    }
}

#[cfg(test)]
mod tests {
    use crate::{JobLogError, JobLogService, ParentLinkMode, RetryPolicy};
    use model::record::JobRecord;
    use model::JobStatus;
    use state::JobLogStore;
    use state_in_memory::InMemoryJobLogStore;
    use std::sync::Arc;
    use std::time::Duration;
    use test_utils::FlakyStore;

    fn fast_retries() -> RetryPolicy {
        RetryPolicy {
            initial_delay: Duration::from_millis(1),
            max_delay: Duration::from_millis(5),
            ..Default::default()
        }
    }

    fn service(store: &InMemoryJobLogStore) -> JobLogService {
        JobLogService::new(Arc::new(store.clone())).with_retry_policy(fast_retries())
    }

    #[tokio::test]
    async fn created_job_is_pending_with_given_fields() {
        let store = InMemoryJobLogStore::default();
        let job_log = service(&store);

        let job_id: String = job_log
            .create_job_log("ocr-job", "data-processing", "in.csv", "bucket-a")
            .await
            .expect("Job should be created");

        let record: JobRecord = store.get_job(&job_id).await.expect("Job should be stored");

        assert_eq!(JobStatus::Pending, record.status);
        assert_eq!("ocr-job", record.job_name);
        assert_eq!("data-processing", record.job_type);
        assert_eq!("in.csv", record.input_key);
        assert_eq!("bucket-a", record.bucket_name);
        assert_eq!(record.created_at, record.updated_at);
        assert_eq!(None, record.output_key);
        assert_eq!(None, record.parent_job_id);
    }

    #[tokio::test]
    async fn created_job_ids_are_unique() {
        let store = InMemoryJobLogStore::default();
        let job_log = service(&store);

        let first: String = job_log
            .create_job_log("job", "type", "a.csv", "bucket")
            .await
            .expect("Job should be created");
        let second: String = job_log
            .create_job_log("job", "type", "a.csv", "bucket")
            .await
            .expect("Job should be created");

        assert_ne!(first, second);
        assert_eq!(2, store.len());
    }

    #[tokio::test]
    async fn completing_job_sets_status_and_output_together() {
        let store = InMemoryJobLogStore::default();
        let job_log = service(&store);

        let job_id: String = job_log
            .create_job_log("ocr-job", "data-processing", "in.csv", "bucket-a")
            .await
            .expect("Job should be created");
        let returned: JobRecord = job_log
            .update_job_status_by_id(&job_id, JobStatus::Complete, None, Some("out.json"))
            .await
            .expect("Job should update");

        let record: JobRecord = store.get_job(&job_id).await.expect("Job should be stored");

        assert_eq!(returned, record);
        assert_eq!(job_id, record.job_id);
        assert_eq!(JobStatus::Complete, record.status);
        assert_eq!(Some("out.json".to_string()), record.output_key);
        assert_eq!("in.csv", record.input_key);
        assert!(record.completed_at.is_some());
    }

    #[tokio::test]
    async fn status_only_update_keeps_message_and_output() {
        let store = InMemoryJobLogStore::default();
        let job_log = service(&store);

        let job_id: String = job_log
            .create_job_log("job", "type", "in.csv", "bucket")
            .await
            .expect("Job should be created");
        job_log
            .update_job_status_by_id(&job_id, JobStatus::Failed, Some("bad row"), Some("partial.json"))
            .await
            .expect("Job should update");

        // Any status may follow any other
        let record: JobRecord = job_log
            .update_job_status_by_id(&job_id, JobStatus::Processing, None, None)
            .await
            .expect("Job should update");

        assert_eq!(JobStatus::Processing, record.status);
        assert_eq!(Some("bad row".to_string()), record.message);
        assert_eq!(Some("partial.json".to_string()), record.output_key);
    }

    #[tokio::test]
    async fn updating_missing_job_is_not_found_without_retry() {
        let store = InMemoryJobLogStore::default();
        let counting = Arc::new(FlakyStore::transient(Arc::new(store.clone()), 0));
        let job_log = JobLogService::new(counting.clone()).with_retry_policy(fast_retries());

        let err: JobLogError = job_log
            .update_job_status_by_id("missing", JobStatus::Complete, None, None)
            .await
            .expect_err("Update should fail");

        assert!(err.is_not_found());
        assert_eq!(1, counting.calls());
        assert!(store.is_empty());
    }

    #[tokio::test]
    async fn parent_is_linked_by_matching_output_key() {
        let store = InMemoryJobLogStore::default();
        let job_log = service(&store);

        let parent_id: String = job_log
            .create_job_log("extract", "data-processing", "raw.pdf", "bucket")
            .await
            .expect("Job should be created");
        job_log
            .update_job_status_by_id(&parent_id, JobStatus::Complete, None, Some("text.json"))
            .await
            .expect("Job should update");
        let child_id: String = job_log
            .create_job_log("summarise", "data-processing", "text.json", "bucket")
            .await
            .expect("Job should be created");

        let linked: Option<String> = job_log
            .update_parent_job_id(&child_id, "text.json")
            .await
            .expect("Link should succeed");

        let child: JobRecord = store.get_job(&child_id).await.expect("Job should be stored");

        assert_eq!(Some(parent_id.clone()), linked);
        assert_eq!(Some(parent_id), child.parent_job_id);
    }

    #[tokio::test]
    async fn missing_parent_depends_on_link_mode() {
        let store = InMemoryJobLogStore::default();
        let lenient = service(&store);
        let strict = service(&store).with_parent_link_mode(ParentLinkMode::Strict);

        let job_id: String = lenient
            .create_job_log("job", "type", "orphan.csv", "bucket")
            .await
            .expect("Job should be created");

        let linked: Option<String> = lenient
            .update_parent_job_id(&job_id, "orphan.csv")
            .await
            .expect("Lenient link should not fail");
        let err: JobLogError = strict
            .update_parent_job_id(&job_id, "orphan.csv")
            .await
            .expect_err("Strict link should fail");

        let record: JobRecord = store.get_job(&job_id).await.expect("Job should be stored");

        assert_eq!(None, linked);
        assert!(err.is_not_found());
        assert_eq!(None, record.parent_job_id);
    }

    #[tokio::test]
    async fn transient_failure_is_retried_without_duplicates() {
        let store = InMemoryJobLogStore::default();
        let flaky = Arc::new(FlakyStore::transient(Arc::new(store.clone()), 1));
        let job_log = JobLogService::new(flaky.clone()).with_retry_policy(fast_retries());

        let job_id: String = job_log
            .create_job_log("job", "type", "in.csv", "bucket")
            .await
            .expect("Job should be created after a retry");

        assert_eq!(2, flaky.calls());
        assert_eq!(1, store.len());
        assert!(store.get_job(&job_id).await.is_ok());
    }

    #[tokio::test]
    async fn retries_stop_at_the_ceiling() {
        let store = InMemoryJobLogStore::default();
        let flaky = Arc::new(FlakyStore::transient(Arc::new(store.clone()), 10));
        let job_log = JobLogService::new(flaky.clone()).with_retry_policy(fast_retries());

        let err: JobLogError = job_log
            .create_job_log("job", "type", "in.csv", "bucket")
            .await
            .expect_err("Create should fail");

        assert!(matches!(err, JobLogError::Persistence { attempts: 3, .. }));
        assert_eq!(3, flaky.calls());
        assert!(store.is_empty());
    }

    #[tokio::test]
    async fn permanent_failure_is_not_retried() {
        let store = InMemoryJobLogStore::default();
        let flaky = Arc::new(FlakyStore::permanent(Arc::new(store.clone()), 1));
        let job_log = JobLogService::new(flaky.clone()).with_retry_policy(fast_retries());

        let err: JobLogError = job_log
            .get_job_id_by_name("job")
            .await
            .expect_err("Lookup should fail");

        assert!(matches!(err, JobLogError::Persistence { attempts: 1, .. }));
        assert_eq!(1, flaky.calls());
    }

    #[tokio::test]
    async fn job_id_is_found_by_name() {
        let store = InMemoryJobLogStore::default();
        let job_log = service(&store);

        let job_id: String = job_log
            .create_job_log("nightly-export", "export", "in.csv", "bucket")
            .await
            .expect("Job should be created");

        assert_eq!(
            Some(job_id),
            job_log
                .get_job_id_by_name("nightly-export")
                .await
                .expect("Lookup should succeed")
        );
        assert_eq!(
            None,
            job_log
                .get_job_id_by_name("unknown")
                .await
                .expect("Lookup should succeed")
        );
    }
}

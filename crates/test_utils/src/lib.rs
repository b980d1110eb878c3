use async_trait::async_trait;
use aws_sdk_dynamodb::operation::put_item::PutItemOutput;
use aws_sdk_dynamodb::types::AttributeValue;
use aws_smithy_mocks::{mock, mock_client, Rule};
use chrono::Utc;
use model::record::JobRecord;
use model::update::JobUpdate;
use state::StateErrorReason::{BackendFailure, Transient};
use state::{JobLogStore, StateError, StateErrorReason, StateOperation};
use std::collections::HashMap;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;

/// Table name used when building stores in tests
pub const TEST_TABLE: &str = "test-table";

/// A pending record with dummy name, type and bucket
pub fn pending_record(job_id: &str, input_key: &str) -> JobRecord {
    JobRecord::pending(
        job_id.to_string(),
        format!("{job_id}-name"),
        "test-type".to_string(),
        input_key.to_string(),
        "test-bucket".to_string(),
        Utc::now(),
    )
}

/// Convert a record into the item DynamoDB would hold for it
pub fn record_item(record: &JobRecord) -> HashMap<String, AttributeValue> {
    serde_dynamo::to_item(record).expect("Test record should convert to an item")
}

/// A default mock DynamoDB client which accepts any put
pub fn create_mock_dynamodb_client() -> aws_sdk_dynamodb::Client {
    let put_item_rule: Rule = mock!(aws_sdk_dynamodb::Client::put_item)
        .match_requests(|_| true)
        .sequence()
        .output(|| PutItemOutput::builder().build())
        .repeatedly()
        .build();

    mock_client!(aws_sdk_dynamodb, [&put_item_rule])
}

/// Wraps a store, failing the first `failures` calls before delegating.
/// Every call is counted, including those which fail.
pub struct FlakyStore {
    inner: Arc<dyn JobLogStore>,
    failures: u32,
    transient: bool,
    calls: AtomicU32,
}

impl FlakyStore {
    /// Fails with retryable errors, as a throttled table would.
    pub fn transient(inner: Arc<dyn JobLogStore>, failures: u32) -> Self {
        FlakyStore {
            inner,
            failures,
            transient: true,
            calls: AtomicU32::new(0),
        }
    }

    /// Fails with errors which should never be retried.
    pub fn permanent(inner: Arc<dyn JobLogStore>, failures: u32) -> Self {
        FlakyStore {
            inner,
            failures,
            transient: false,
            calls: AtomicU32::new(0),
        }
    }

    pub fn calls(&self) -> u32 {
        self.calls.load(Ordering::SeqCst)
    }

    fn check(&self, key: &str, operation: StateOperation) -> Result<(), StateError> {
        let call: u32 = self.calls.fetch_add(1, Ordering::SeqCst);
        if call >= self.failures {
            return Ok(());
        }

        let reason: StateErrorReason = if self.transient {
            Transient("ProvisionedThroughputExceededException".into())
        } else {
            BackendFailure("ValidationException".into())
        };

        Err(StateError::new(key.to_string(), operation, reason))
    }
}

#[async_trait]
impl JobLogStore for FlakyStore {
    async fn put_job(&self, record: JobRecord) -> Result<(), StateError> {
        self.check(&record.job_id, StateOperation::PutJob)?;
        self.inner.put_job(record).await
    }

    async fn get_job(&self, job_id: &str) -> Result<JobRecord, StateError> {
        self.check(job_id, StateOperation::GetJob)?;
        self.inner.get_job(job_id).await
    }

    async fn update_job(&self, job_id: &str, update: JobUpdate) -> Result<JobRecord, StateError> {
        self.check(job_id, StateOperation::UpdateJob)?;
        self.inner.update_job(job_id, update).await
    }

    async fn find_job_by_name(&self, job_name: &str) -> Result<Option<JobRecord>, StateError> {
        self.check(job_name, StateOperation::FindJobByName)?;
        self.inner.find_job_by_name(job_name).await
    }

    async fn find_job_by_output_key(
        &self,
        output_key: &str,
    ) -> Result<Option<JobRecord>, StateError> {
        self.check(output_key, StateOperation::FindJobByOutputKey)?;
        self.inner.find_job_by_output_key(output_key).await
    }
}

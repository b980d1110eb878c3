use crate::error::classify;
use crate::expression::{UpdateExpression, JOB_EXISTS};
use async_trait::async_trait;
use aws_sdk_dynamodb::config::http::HttpResponse;
use aws_sdk_dynamodb::error::SdkError;
use aws_sdk_dynamodb::operation::get_item::{GetItemError, GetItemOutput};
use aws_sdk_dynamodb::operation::put_item::{PutItemError, PutItemOutput};
use aws_sdk_dynamodb::operation::scan::{ScanError, ScanOutput};
use aws_sdk_dynamodb::operation::update_item::{UpdateItemError, UpdateItemOutput};
use aws_sdk_dynamodb::types::{AttributeValue, ReturnValue};
use model::env::{DEFAULT_TABLE_NAME, JOB_STATUS_TABLE_NAME};
use model::record::{JobRecord, JOB_ID, JOB_NAME, OUTPUT_KEY};
use model::update::JobUpdate;
use state::StateErrorReason::{BadState, MissingEntry};
use state::StateOperation::{FindJobByName, FindJobByOutputKey, GetJob, PutJob, UpdateJob};
use state::{JobLogStore, StateError, StateOperation};
use std::collections::HashMap;

mod error;
mod expression;

type Item = HashMap<String, AttributeValue>;

/// Job records stored in a single DynamoDB table keyed on `id`.
/// The table name is fixed when the store is built.
pub struct DynamoDbJobLogStore {
    table_name: String,
    dynamodb_client: aws_sdk_dynamodb::Client,
    consistent_read: bool,
}

impl DynamoDbJobLogStore {
    pub fn new(dynamodb_client: aws_sdk_dynamodb::Client, table_name: impl Into<String>) -> Self {
        DynamoDbJobLogStore {
            table_name: table_name.into(),
            dynamodb_client,
            consistent_read: false,
        }
    }

    /// Pull the table name from `JOB_STATUS_TABLE_NAME`, falling back to `workers-job-status`.
    pub fn from_env(dynamodb_client: aws_sdk_dynamodb::Client) -> Self {
        let table_name: String = std::env::var(JOB_STATUS_TABLE_NAME)
            .unwrap_or_else(|_| DEFAULT_TABLE_NAME.to_string());

        Self::new(dynamodb_client, table_name)
    }

    pub fn with_consistent_read(mut self, consistent_read: bool) -> Self {
        self.consistent_read = consistent_read;
        self
    }

    pub fn table_name(&self) -> &str {
        &self.table_name
    }
}

#[async_trait]
impl JobLogStore for DynamoDbJobLogStore {
    async fn put_job(&self, record: JobRecord) -> Result<(), StateError> {
        let item: Item = serde_dynamo::to_item(&record).map_err(|err| {
            StateError::new(record.job_id.clone(), PutJob, BadState(err.to_string()))
        })?;

        self.put_item(item)
            .await
            .map_err(|err| StateError::new(record.job_id.clone(), PutJob, classify(err)))?;

        tracing::debug!(job_id = %record.job_id, table = %self.table_name, "Inserted job");

        Ok(())
    }

    async fn get_job(&self, job_id: &str) -> Result<JobRecord, StateError> {
        let output: GetItemOutput = self
            .get_item(job_id)
            .await
            .map_err(|err| StateError::new(job_id.to_string(), GetJob, classify(err)))?;

        let item: Item = output
            .item
            .ok_or_else(|| StateError::new(job_id.to_string(), GetJob, MissingEntry))?;

        serde_dynamo::from_item(item)
            .map_err(|err| StateError::new(job_id.to_string(), GetJob, BadState(err.to_string())))
    }

    async fn update_job(&self, job_id: &str, update: JobUpdate) -> Result<JobRecord, StateError> {
        let expression: UpdateExpression = UpdateExpression::from_update(&update).map_err(|err| {
            StateError::new(job_id.to_string(), UpdateJob, BadState(err.to_string()))
        })?;

        let output: UpdateItemOutput =
            self.update_item(job_id, expression).await.map_err(|err| {
                let job_missing: bool = err
                    .as_service_error()
                    .is_some_and(UpdateItemError::is_conditional_check_failed_exception);

                if job_missing {
                    StateError::new(job_id.to_string(), UpdateJob, MissingEntry)
                } else {
                    StateError::new(job_id.to_string(), UpdateJob, classify(err))
                }
            })?;

        tracing::debug!(job_id, table = %self.table_name, "Updated job");

        let item: Item = output.attributes.ok_or_else(|| {
            StateError::new(
                job_id.to_string(),
                UpdateJob,
                BadState("Update returned no attributes".to_string()),
            )
        })?;

        serde_dynamo::from_item(item).map_err(|err| {
            StateError::new(job_id.to_string(), UpdateJob, BadState(err.to_string()))
        })
    }

    async fn find_job_by_name(&self, job_name: &str) -> Result<Option<JobRecord>, StateError> {
        self.find_most_recent(FindJobByName, JOB_NAME, job_name)
            .await
    }

    async fn find_job_by_output_key(
        &self,
        output_key: &str,
    ) -> Result<Option<JobRecord>, StateError> {
        self.find_most_recent(FindJobByOutputKey, OUTPUT_KEY, output_key)
            .await
    }
}

impl DynamoDbJobLogStore {
    async fn find_most_recent(
        &self,
        operation: StateOperation,
        attribute: &str,
        value: &str,
    ) -> Result<Option<JobRecord>, StateError> {
        let items: Vec<Item> = self
            .scan_matching(attribute, value)
            .await
            .map_err(|err| StateError::new(value.to_string(), operation, classify(err)))?;

        // The table has no schema, so partial items written by other clients are skipped
        let records: Vec<JobRecord> = items
            .into_iter()
            .filter_map(|item| {
                let job_id: Option<String> =
                    item.get(JOB_ID).and_then(|id| id.as_s().ok()).cloned();

                serde_dynamo::from_item(item)
                    .inspect_err(|err| {
                        tracing::warn!(%operation, ?job_id, "Skipping unreadable job, {err}");
                    })
                    .ok()
            })
            .collect();

        if records.is_empty() {
            tracing::debug!(attribute, value, "No job found");
        }

        Ok(records.into_iter().max_by_key(|record| record.updated_at))
    }

    async fn get_item(
        &self,
        job_id: &str,
    ) -> Result<GetItemOutput, SdkError<GetItemError, HttpResponse>> {
        self.dynamodb_client
            .get_item()
            .table_name(&self.table_name)
            .consistent_read(self.consistent_read)
            .key(JOB_ID, AttributeValue::S(job_id.to_string()))
            .send()
            .await
    }

    async fn put_item(
        &self,
        item: Item,
    ) -> Result<PutItemOutput, SdkError<PutItemError, HttpResponse>> {
        self.dynamodb_client
            .put_item()
            .table_name(&self.table_name)
            .set_item(Some(item))
            .send()
            .await
    }

    async fn update_item(
        &self,
        job_id: &str,
        expression: UpdateExpression,
    ) -> Result<UpdateItemOutput, SdkError<UpdateItemError, HttpResponse>> {
        self.dynamodb_client
            .update_item()
            .table_name(&self.table_name)
            .key(JOB_ID, AttributeValue::S(job_id.to_string()))
            .update_expression(expression.expression)
            .condition_expression(JOB_EXISTS)
            .set_expression_attribute_names(Some(expression.names))
            .set_expression_attribute_values(Some(expression.values))
            .return_values(ReturnValue::AllNew)
            .send()
            .await
    }

    /// Scan the whole table, following pages until there are none left.
    /// Scan limits apply before filtering, so a single page may hold no matches.
    async fn scan_matching(
        &self,
        attribute: &str,
        value: &str,
    ) -> Result<Vec<Item>, SdkError<ScanError, HttpResponse>> {
        let mut items: Vec<Item> = Vec::new();
        let mut start_key: Option<Item> = None;

        loop {
            let output: ScanOutput = self
                .dynamodb_client
                .scan()
                .table_name(&self.table_name)
                .consistent_read(self.consistent_read)
                .filter_expression("#attribute = :value")
                .expression_attribute_names("#attribute", attribute)
                .expression_attribute_values(":value", AttributeValue::S(value.to_string()))
                .set_exclusive_start_key(start_key)
                .send()
                .await?;

            items.extend(output.items.unwrap_or_default());

            match output.last_evaluated_key {
                Some(key) if !key.is_empty() => start_key = Some(key),
                _ => break,
            }
        }

        Ok(items)
    }
}

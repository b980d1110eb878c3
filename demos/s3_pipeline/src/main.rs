mod pipeline;

use crate::pipeline::handle_s3_event;
use aws_config::BehaviorVersion;
use aws_lambda_events::s3::S3Event;
use job_log::JobLogService;
use lambda_runtime::{service_fn, tracing, Error, LambdaEvent};
use model::env::JOB_TYPE;
use state_dynamodb::DynamoDbJobLogStore;
use std::sync::Arc;

const DEFAULT_JOB_TYPE: &str = "file-processing";

#[tokio::main]
async fn main() -> Result<(), Error> {
    tracing::init_default_subscriber();

    let dynamodb_client: aws_sdk_dynamodb::Client = aws_sdk_dynamodb::Client::new(
        &aws_config::load_defaults(BehaviorVersion::latest()).await,
    );
    let store: DynamoDbJobLogStore = DynamoDbJobLogStore::from_env(dynamodb_client);
    tracing::info!(table = store.table_name(), "Logging jobs");

    let job_log: JobLogService = JobLogService::new(Arc::new(store));
    let job_type: String = std::env::var(JOB_TYPE).unwrap_or_else(|_| DEFAULT_JOB_TYPE.to_string());

    let job_log: &JobLogService = &job_log;
    let job_type: &str = &job_type;

    lambda_runtime::run(service_fn(move |event: LambdaEvent<S3Event>| async move {
        handle_s3_event(job_log, job_type, event.payload).await
    }))
    .await
}

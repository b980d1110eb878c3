use aws_lambda_events::s3::{S3Event, S3EventRecord};
use job_log::{JobLogError, JobLogService};
use lambda_runtime::tracing::instrument::Instrumented;
use lambda_runtime::tracing::{Instrument, Span};
use lambda_runtime::{tracing, Error};
use model::JobStatus;

/// Prefix under which processed objects are written
const OUTPUT_PREFIX: &str = "processed/";

/// Track every object in the event as its own job, processing them concurrently.
pub(crate) async fn handle_s3_event(
    job_log: &JobLogService,
    job_type: &str,
    event: S3Event,
) -> Result<(), Error> {
    let records: Vec<S3EventRecord> = event.records;

    tracing::info!("Handling batch of [{}] objects from S3", records.len());

    let tasks: Vec<Instrumented<_>> = records
        .into_iter()
        .map(|record: S3EventRecord| {
            let bucket: String = record.s3.bucket.name.unwrap_or_default();
            let key: String = record.s3.object.key.unwrap_or_default();

            let object_span: Span = tracing::span!(tracing::Level::INFO, "S3 Object", key);

            async move { process_object(job_log, job_type, &bucket, &key).await }
                .instrument(object_span)
        })
        .collect();

    let results: Vec<Result<JobStatus, JobLogError>> = futures::future::join_all(tasks).await;
    let failures: usize = results.iter().filter(|result| result.is_err()).count();

    if failures > 0 {
        return Err(format!("Failed to record [{failures}] of [{}] jobs", results.len()).into());
    }

    Ok(())
}

/// Drive a single object through the job lifecycle, returning the final status.
/// Processing failures are recorded against the job, store failures are returned.
pub(crate) async fn process_object(
    job_log: &JobLogService,
    job_type: &str,
    bucket: &str,
    key: &str,
) -> Result<JobStatus, JobLogError> {
    let job_id: String = job_log.create_job_log(key, job_type, key, bucket).await?;

    // Objects written by an earlier stage link back to the job which wrote them
    job_log.update_parent_job_id(&job_id, key).await?;
    job_log
        .update_job_status_by_id(&job_id, JobStatus::Processing, None, None)
        .await?;

    let status: JobStatus = match output_key_for(key) {
        Ok(output_key) => {
            job_log
                .update_job_status_by_id(&job_id, JobStatus::Complete, None, Some(&output_key))
                .await?
                .status
        }
        Err(err) => {
            tracing::error!("Failed to process {key}, {err}");

            job_log
                .update_job_status_by_id(&job_id, JobStatus::Failed, Some(&err.to_string()), None)
                .await?
                .status
        }
    };

    Ok(status)
}

fn output_key_for(input_key: &str) -> Result<String, Error> {
    let name: &str = input_key
        .rsplit('/')
        .next()
        .filter(|name| !name.is_empty())
        .ok_or_else(|| format!("[{input_key}] is not an object key"))?;

    Ok(format!("{OUTPUT_PREFIX}{name}.json"))
}

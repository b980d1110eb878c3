/// Environment variable containing the job status table name
pub const JOB_STATUS_TABLE_NAME: &str = "JOB_STATUS_TABLE_NAME";
/// Table used when `JOB_STATUS_TABLE_NAME` is unset
pub const DEFAULT_TABLE_NAME: &str = "workers-job-status";
/// Environment variable containing the job type tag used by pipelines
pub const JOB_TYPE: &str = "JOB_TYPE";

use async_trait::async_trait;
use model::record::JobRecord;
use model::update::JobUpdate;
use state::StateErrorReason::{BackendFailure, MissingEntry};
use state::StateOperation::{FindJobByName, FindJobByOutputKey, GetJob, PutJob, UpdateJob};
use state::{JobLogStore, StateError, StateOperation};
use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

/// Job records held in process memory.
/// Cloning shares the underlying records.
#[derive(Clone, Default)]
pub struct InMemoryJobLogStore {
    jobs: Arc<Mutex<HashMap<String, JobRecord>>>,
}

impl InMemoryJobLogStore {
    pub fn len(&self) -> usize {
        self.jobs
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn lock(
        &self,
        key: &str,
        operation: StateOperation,
    ) -> Result<MutexGuard<'_, HashMap<String, JobRecord>>, StateError> {
        self.jobs.lock().map_err(|err| {
            StateError::new(key.to_string(), operation, BackendFailure(err.to_string().into()))
        })
    }

    fn most_recent(
        &self,
        key: &str,
        operation: StateOperation,
        matches: impl Fn(&JobRecord) -> bool,
    ) -> Result<Option<JobRecord>, StateError> {
        let guard = self.lock(key, operation)?;

        Ok(guard
            .values()
            .filter(|record| matches(record))
            .max_by_key(|record| record.updated_at)
            .cloned())
    }
}

fn apply(record: &mut JobRecord, update: JobUpdate) {
    if let Some(status) = update.status {
        record.status = status;
    }
    if let Some(message) = update.message {
        record.message = Some(message);
    }
    if let Some(output_key) = update.output_key {
        record.output_key = Some(output_key);
    }
    if let Some(parent_job_id) = update.parent_job_id {
        record.parent_job_id = Some(parent_job_id);
    }
    if let Some(completed_at) = update.completed_at {
        record.completed_at = Some(completed_at);
    }
    record.updated_at = update.updated_at;
}

#[async_trait]
impl JobLogStore for InMemoryJobLogStore {
    async fn put_job(&self, record: JobRecord) -> Result<(), StateError> {
        self.lock(&record.job_id, PutJob)?
            .insert(record.job_id.clone(), record);

        Ok(())
    }

    async fn get_job(&self, job_id: &str) -> Result<JobRecord, StateError> {
        let guard = self.lock(job_id, GetJob)?;
        let record: JobRecord = guard
            .get(job_id)
            .ok_or_else(|| StateError::new(job_id.to_string(), GetJob, MissingEntry))?
            .clone();

        Ok(record)
    }

    async fn update_job(&self, job_id: &str, update: JobUpdate) -> Result<JobRecord, StateError> {
        let mut guard = self.lock(job_id, UpdateJob)?;
        let record: &mut JobRecord = guard
            .get_mut(job_id)
            .ok_or_else(|| StateError::new(job_id.to_string(), UpdateJob, MissingEntry))?;

        apply(record, update);

        Ok(record.clone())
    }

    async fn find_job_by_name(&self, job_name: &str) -> Result<Option<JobRecord>, StateError> {
        self.most_recent(job_name, FindJobByName, |record| record.job_name == job_name)
    }

    async fn find_job_by_output_key(
        &self,
        output_key: &str,
    ) -> Result<Option<JobRecord>, StateError> {
        self.most_recent(output_key, FindJobByOutputKey, |record| {
            record.output_key.as_deref() == Some(output_key)
        })
    }
}

#[cfg(test)]
mod tests {
    use crate::InMemoryJobLogStore;
    use chrono::{Duration, Utc};
    use model::record::JobRecord;
    use model::update::JobUpdate;
    use model::JobStatus;
    use state::{JobLogStore, StateError};
    use test_utils::pending_record;

    #[tokio::test]
    async fn update_leaves_absent_fields_untouched() {
        let store = InMemoryJobLogStore::default();
        let mut record: JobRecord = pending_record("job-1", "in.csv");
        record.message = Some("first attempt".to_string());
        record.output_key = Some("out.json".to_string());
        store.put_job(record).await.expect("Should store job");

        let updated: JobRecord = store
            .update_job("job-1", JobUpdate::status(JobStatus::Processing, Utc::now()))
            .await
            .expect("Job should update");

        assert_eq!(JobStatus::Processing, updated.status);
        assert_eq!(Some("first attempt".to_string()), updated.message);
        assert_eq!(Some("out.json".to_string()), updated.output_key);
    }

    #[tokio::test]
    async fn update_of_missing_job_writes_nothing() {
        let store = InMemoryJobLogStore::default();

        let result: Result<JobRecord, StateError> = store
            .update_job("missing", JobUpdate::status(JobStatus::Failed, Utc::now()))
            .await;

        assert!(result.expect_err("Should fail for missing job").is_missing());
        assert!(store.is_empty());
    }

    #[tokio::test]
    async fn poisoned_store_still_reports_its_size() {
        let store = InMemoryJobLogStore::default();
        store
            .put_job(pending_record("job-1", "in.csv"))
            .await
            .expect("Should store job");

        let jobs = store.jobs.clone();
        let _ = std::thread::spawn(move || {
            let _guard = jobs.lock().expect("Lock should be free");
            panic!("poison the lock");
        })
        .join();

        assert_eq!(1, store.len());
        assert!(!store.is_empty());
    }

    #[tokio::test]
    async fn lookup_by_output_key_prefers_most_recent() {
        let store = InMemoryJobLogStore::default();
        let now = Utc::now();

        let mut older: JobRecord = pending_record("older", "a.csv");
        older.output_key = Some("shared.json".to_string());
        older.updated_at = now - Duration::minutes(5);
        let mut newer: JobRecord = pending_record("newer", "b.csv");
        newer.output_key = Some("shared.json".to_string());
        newer.updated_at = now;

        store.put_job(older).await.expect("Should store job");
        store.put_job(newer).await.expect("Should store job");

        let found: Option<JobRecord> = store
            .find_job_by_output_key("shared.json")
            .await
            .expect("Lookup should succeed");

        assert_eq!(Some("newer".to_string()), found.map(|record| record.job_id));
        assert!(store
            .find_job_by_output_key("unknown.json")
            .await
            .expect("Lookup should succeed")
            .is_none());
    }
}

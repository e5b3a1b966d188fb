//! Bulk API 2.0 ingest jobs: JSON control plane, CSV data plane.

use super::csv::{header_line, parse_csv, records_to_csv};
use super::job::{
    BulkJob, IngestData, JobHandle, JobPayload, JobState, JobStore, JobType, Operation,
    RecordResult,
};
use super::processor::{RecordProcessor, type_record};
use crate::core::{MockError, Record, Result, Value};
use crate::storage::{Catalog, RecordStore};
use serde::Deserialize;
use serde_json::json;
use std::time::Instant;
use tracing::{debug, info};

/// Body of a job-create request.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct IngestJobRequest {
    pub object: Option<String>,
    pub operation: Option<String>,
    pub external_id_field_name: Option<String>,
    pub content_type: Option<String>,
    pub line_ending: Option<String>,
    pub column_delimiter: Option<String>,
}

pub struct IngestEngine<'a> {
    catalog: &'a Catalog,
    store: &'a RecordStore,
    jobs: &'a JobStore,
    api_version: &'a str,
}

impl<'a> IngestEngine<'a> {
    pub fn new(catalog: &'a Catalog, store: &'a RecordStore, jobs: &'a JobStore, api_version: &'a str) -> Self {
        Self {
            catalog,
            store,
            jobs,
            api_version,
        }
    }

    pub async fn create(&self, request: IngestJobRequest) -> Result<serde_json::Value> {
        let object = request
            .object
            .filter(|o| !o.is_empty())
            .ok_or_else(|| MockError::InvalidField("object is required".into()))?;
        if !self.catalog.contains(&object) {
            return Err(MockError::InvalidType(format!(
                "sObject type '{}' is not supported.",
                object
            )));
        }

        let operation = request
            .operation
            .as_deref()
            .and_then(Operation::parse)
            .filter(Operation::is_ingest)
            .ok_or_else(|| {
                MockError::InvalidField(
                    "operation must be one of: insert, update, upsert, delete".into(),
                )
            })?;

        let external_id = request.external_id_field_name.filter(|f| !f.is_empty());
        if operation == Operation::Upsert && external_id.is_none() {
            return Err(MockError::InvalidField(
                "externalIdFieldName is required for upsert operations".into(),
            ));
        }

        let mut job = BulkJob::new(operation, object, JobPayload::Ingest(IngestData::default()));
        job.external_id_field_name = external_id;
        job.api_version = self.api_version.trim_start_matches('v').to_string();
        if let Some(content_type) = request.content_type {
            job.content_type = content_type;
        }
        if let Some(line_ending) = request.line_ending {
            job.line_ending = line_ending;
        }
        if let Some(delimiter) = request.column_delimiter {
            job.column_delimiter = delimiter;
        }

        let info = job.to_info_json();
        info!(job_id = %job.id, operation = %job.operation, object = %job.object, "bulk ingest job created");
        self.jobs.insert(job).await;
        Ok(info)
    }

    async fn ingest_job(&self, id: &str) -> Result<JobHandle> {
        let handle = self.jobs.get(id).await?;
        handle.read().await.ingest()?;
        Ok(handle)
    }

    /// Append one CSV chunk. A chunk repeating the buffered header row
    /// contributes only its data rows.
    pub async fn upload(&self, id: &str, body: &str) -> Result<()> {
        let handle = self.ingest_job(id).await?;
        let mut job = handle.write().await;
        if job.state != JobState::Open {
            return Err(MockError::InvalidState(format!(
                "Job {} is not open for uploads (state: {})",
                id, job.state
            )));
        }
        if body.trim().is_empty() {
            return Err(MockError::InvalidField("CSV data is required".into()));
        }

        let data = job.ingest_mut()?;
        if data.csv_data.is_empty() {
            data.csv_data = body.to_string();
        } else {
            let chunk = if header_line(body) == header_line(&data.csv_data) {
                body.split_once('\n').map(|(_, rest)| rest).unwrap_or_default()
            } else {
                body
            };
            if !chunk.is_empty() {
                if !data.csv_data.ends_with('\n') {
                    data.csv_data.push('\n');
                }
                data.csv_data.push_str(chunk);
            }
        }
        let buffered = data.csv_data.len();
        job.touch();
        debug!(job_id = %id, bytes = body.len(), buffered, "bulk ingest data uploaded");
        Ok(())
    }

    /// Handle a state-change request: `UploadComplete` processes the job
    /// synchronously, `Aborted` stops it.
    pub async fn set_state(&self, id: &str, state: &str) -> Result<serde_json::Value> {
        let handle = self.ingest_job(id).await?;
        match state {
            "UploadComplete" => {
                {
                    let mut job = handle.write().await;
                    if job.state != JobState::Open {
                        return Err(MockError::InvalidState(format!(
                            "Job {} cannot be closed from state {}",
                            id, job.state
                        )));
                    }
                    job.set_state(JobState::UploadComplete);
                }
                self.process(&handle).await?;
            }
            "Aborted" => {
                let mut job = handle.write().await;
                if job.state.is_terminal() {
                    return Err(MockError::InvalidState(format!(
                        "Job {} is already {}",
                        id, job.state
                    )));
                }
                job.set_state(JobState::Aborted);
                info!(job_id = %id, "bulk ingest job aborted");
            }
            other => {
                return Err(MockError::InvalidField(format!(
                    "Invalid state: {}. Must be UploadComplete or Aborted",
                    other
                )));
            }
        }
        let job = handle.read().await;
        Ok(job.to_info_json())
    }

    async fn process(&self, handle: &JobHandle) -> Result<()> {
        let mut job = handle.write().await;
        // An abort can land between closing the job and taking this lock.
        if job.state != JobState::UploadComplete {
            info!(job_id = %job.id, state = %job.state, "bulk ingest job not processed");
            return Ok(());
        }
        job.set_state(JobState::InProgress);
        let started = Instant::now();

        let schema = self.catalog.require(&job.object)?;
        let raw = parse_csv(&job.ingest()?.csv_data).records();
        let typed: Vec<Record> = raw.iter().map(|r| type_record(r, schema)).collect();

        let mut results = {
            let collection = self.store.collection(&job.object)?;
            let mut collection = collection.write().await;
            RecordProcessor::new(schema, job.operation)
                .external_id_field(job.external_id_field_name.as_deref())
                .process_all(&mut collection, typed)
        };
        // Report the fields as they were uploaded, not as typed.
        for (result, original) in results.iter_mut().zip(raw) {
            result.input = original;
        }

        let (successful, failed): (Vec<_>, Vec<_>) =
            results.into_iter().partition(RecordResult::is_success);
        job.number_records_processed = successful.len();
        job.number_records_failed = failed.len();
        job.total_processing_time = started.elapsed().as_millis() as u64;
        let state = if successful.is_empty() && !failed.is_empty() {
            JobState::Failed
        } else {
            JobState::JobComplete
        };
        job.set_state(state);

        info!(
            job_id = %job.id,
            operation = %job.operation,
            object = %job.object,
            processed = successful.len(),
            failed = failed.len(),
            state = %state,
            "bulk ingest job completed"
        );
        let data = job.ingest_mut()?;
        data.successful = successful;
        data.failed = failed;
        Ok(())
    }

    pub async fn get(&self, id: &str) -> Result<serde_json::Value> {
        let handle = self.ingest_job(id).await?;
        let job = handle.read().await;
        Ok(job.to_info_json())
    }

    pub async fn list(&self) -> serde_json::Value {
        let records: Vec<_> = self
            .jobs
            .list(Some(JobType::V2Ingest))
            .await
            .iter()
            .map(BulkJob::to_info_json)
            .collect();
        json!({ "done": true, "records": records, "nextRecordsUrl": null })
    }

    pub async fn delete(&self, id: &str) -> Result<()> {
        self.ingest_job(id).await?;
        self.jobs.remove(id).await?;
        info!(job_id = %id, "bulk ingest job deleted");
        Ok(())
    }

    pub async fn successful_results(&self, id: &str) -> Result<String> {
        let handle = self.ingest_job(id).await?;
        let job = handle.read().await;
        ensure_finished(&job)?;
        Ok(results_csv(&job.ingest()?.successful))
    }

    pub async fn failed_results(&self, id: &str) -> Result<String> {
        let handle = self.ingest_job(id).await?;
        let job = handle.read().await;
        ensure_finished(&job)?;
        Ok(results_csv(&job.ingest()?.failed))
    }

    /// The buffered CSV of an aborted job; nothing otherwise.
    pub async fn unprocessed_records(&self, id: &str) -> Result<String> {
        let handle = self.ingest_job(id).await?;
        let job = handle.read().await;
        if job.state == JobState::Aborted {
            Ok(job.ingest()?.csv_data.clone())
        } else {
            Ok(String::new())
        }
    }
}

fn ensure_finished(job: &BulkJob) -> Result<()> {
    match job.state {
        JobState::JobComplete | JobState::Failed => Ok(()),
        state => Err(MockError::InvalidState(format!(
            "Results are not available while the job is {}",
            state
        ))),
    }
}

/// Result rows as CSV: `sf__Id`, then `sf__Created` or `sf__Error`, then the
/// uploaded fields. Columns are the union of every row's fields.
fn results_csv(results: &[RecordResult]) -> String {
    if results.is_empty() {
        return String::new();
    }
    let rows: Vec<Record> = results.iter().map(result_row).collect();
    let mut headers: Vec<String> = Vec::new();
    for row in &rows {
        for key in row.keys() {
            if !headers.iter().any(|h| h == key) {
                headers.push(key.to_string());
            }
        }
    }
    records_to_csv(&headers, &rows)
}

fn result_row(result: &RecordResult) -> Record {
    let mut row = Record::new();
    row.set("sf__Id", Value::Text(result.id.clone().unwrap_or_default()));
    if result.is_success() {
        row.set("sf__Created", Value::Text(result.created.to_string()));
    } else {
        row.set("sf__Error", Value::Text(result.error_summary()));
    }
    for (name, value) in result.input.iter() {
        if !row.contains(name) {
            row.set(name, value.clone());
        }
    }
    row
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::{FieldDef, Schema};

    fn fixtures() -> (Catalog, RecordStore, JobStore) {
        let catalog = Catalog::new().with_schema(
            Schema::builder("Account", "001")
                .field("Name", FieldDef::string(10).required())
                .build(),
        );
        let store = RecordStore::new(&catalog);
        (catalog, store, JobStore::new())
    }

    fn insert_request() -> IngestJobRequest {
        IngestJobRequest {
            object: Some("Account".into()),
            operation: Some("insert".into()),
            ..Default::default()
        }
    }

    #[tokio::test]
    async fn test_create_rejects_bad_requests() {
        let (catalog, store, jobs) = fixtures();
        let engine = IngestEngine::new(&catalog, &store, &jobs, "v59.0");

        let unknown = IngestJobRequest {
            object: Some("Widget__c".into()),
            ..insert_request()
        };
        assert!(matches!(engine.create(unknown).await, Err(MockError::InvalidType(_))));

        let upsert = IngestJobRequest {
            operation: Some("upsert".into()),
            ..insert_request()
        };
        assert!(matches!(engine.create(upsert).await, Err(MockError::InvalidField(_))));
        assert_eq!(jobs.len().await, 0);
    }

    #[tokio::test]
    async fn test_multi_part_upload_merges_headers() {
        let (catalog, store, jobs) = fixtures();
        let engine = IngestEngine::new(&catalog, &store, &jobs, "v59.0");
        let info = engine.create(insert_request()).await.unwrap();
        let id = info["id"].as_str().unwrap();

        engine.upload(id, "Name\nA\n").await.unwrap();
        engine.upload(id, "Name\nB\n").await.unwrap();
        let info = engine.set_state(id, "UploadComplete").await.unwrap();
        assert_eq!(info["state"], "JobComplete");
        assert_eq!(info["numberRecordsProcessed"], 2);
        assert_eq!(store.count("Account").await.unwrap(), 2);

        let csv = engine.successful_results(id).await.unwrap();
        assert!(csv.starts_with("sf__Id,sf__Created,Name\n"));
    }

    #[tokio::test]
    async fn test_abort_keeps_unprocessed_data() {
        let (catalog, store, jobs) = fixtures();
        let engine = IngestEngine::new(&catalog, &store, &jobs, "v59.0");
        let info = engine.create(insert_request()).await.unwrap();
        let id = info["id"].as_str().unwrap();

        engine.upload(id, "Name\nA").await.unwrap();
        assert!(matches!(
            engine.successful_results(id).await,
            Err(MockError::InvalidState(_))
        ));
        engine.set_state(id, "Aborted").await.unwrap();
        assert_eq!(engine.unprocessed_records(id).await.unwrap(), "Name\nA");
        assert!(engine.set_state(id, "Aborted").await.is_err());
    }

    #[tokio::test]
    async fn test_all_failures_fail_the_job() {
        let (catalog, store, jobs) = fixtures();
        let engine = IngestEngine::new(&catalog, &store, &jobs, "v59.0");
        let info = engine.create(insert_request()).await.unwrap();
        let id = info["id"].as_str().unwrap();

        engine.upload(id, "Name\nWayTooLongForTheField").await.unwrap();
        let info = engine.set_state(id, "UploadComplete").await.unwrap();
        assert_eq!(info["state"], "Failed");
        let failed = engine.failed_results(id).await.unwrap();
        assert!(failed.contains("STRING_TOO_LONG:"));
        assert_eq!(engine.successful_results(id).await.unwrap(), "");
    }
}

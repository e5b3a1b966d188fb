//! Bulk API v1: XML job control, batches processed as they are added.

use super::csv::parse_csv;
use super::job::{
    Batch, BatchState, BulkJob, JobHandle, JobPayload, JobState, JobStore, LegacyData, Operation,
    PayloadFormat, RecordResult,
};
use super::processor::{RecordProcessor, type_record};
use super::xml::{XmlDocument, element_text, parse_sobjects};
use crate::core::{MockError, Record, Result};
use crate::storage::{Catalog, RecordStore};
use serde_json::json;
use std::time::Instant;
use tracing::{info, warn};

const XSI_NS: &str = "http://www.w3.org/2001/XMLSchema-instance";

/// `exceptionCode` reported for an engine error.
pub fn exception_code(err: &MockError) -> &'static str {
    match err {
        MockError::BatchNotFound(_) => "InvalidBatch",
        MockError::InvalidState(_) => "InvalidJobState",
        MockError::InvalidBatchState(_) => "InvalidBatchState",
        MockError::NotFound(_) | MockError::InvalidType(_) | MockError::InvalidField(_) => {
            "InvalidJob"
        }
        MockError::MalformedQuery(_) => "InvalidBatch",
        _ => "ClientInputError",
    }
}

/// The `<error>` document returned in place of a jobInfo/batchInfo.
pub fn error_document(err: &MockError) -> String {
    XmlDocument::new("error")
        .element("exceptionCode", exception_code(err))
        .element("exceptionMessage", err)
        .finish()
}

/// Raw payload and the content type it should be returned with.
#[derive(Debug, Clone, PartialEq)]
pub struct ResultDocument {
    pub content_type: &'static str,
    pub body: String,
}

pub struct LegacyBulkEngine<'a> {
    catalog: &'a Catalog,
    store: &'a RecordStore,
    jobs: &'a JobStore,
    api_version: &'a str,
}

impl<'a> LegacyBulkEngine<'a> {
    pub fn new(catalog: &'a Catalog, store: &'a RecordStore, jobs: &'a JobStore, api_version: &'a str) -> Self {
        Self {
            catalog,
            store,
            jobs,
            api_version,
        }
    }

    /// Create a job from a `<jobInfo>` request document.
    pub async fn create_job(&self, xml: &str) -> Result<String> {
        let operation = element_text(xml, "operation")
            .ok_or_else(|| MockError::InvalidField("operation is required".into()))?;
        let operation = Operation::parse(&operation)
            .ok_or_else(|| MockError::InvalidField(format!("Invalid operation: {}", operation)))?;
        let object = element_text(xml, "object")
            .filter(|o| !o.is_empty())
            .ok_or_else(|| MockError::InvalidField("object is required".into()))?;
        if !self.catalog.contains(&object) {
            return Err(MockError::not_supported(&object));
        }

        let mut job = BulkJob::new(operation, object, JobPayload::Legacy(LegacyData::default()));
        job.content_type = element_text(xml, "contentType")
            .filter(|c| !c.is_empty())
            .unwrap_or_else(|| "CSV".to_string());
        job.external_id_field_name = element_text(xml, "externalIdFieldName").filter(|f| !f.is_empty());
        job.api_version = self.api_version.trim_start_matches('v').to_string();

        let document = job_info(&job);
        info!(job_id = %job.id, operation = %job.operation, object = %job.object, "bulk v1 job created");
        self.jobs.insert(job).await;
        Ok(document)
    }

    async fn legacy_job(&self, id: &str) -> Result<JobHandle> {
        let handle = self.jobs.get(id).await?;
        handle.read().await.legacy()?;
        Ok(handle)
    }

    pub async fn get_job(&self, id: &str) -> Result<String> {
        let handle = self.legacy_job(id).await?;
        let job = handle.read().await;
        Ok(job_info(&job))
    }

    /// Apply the `<state>` of a jobInfo update: close or abort.
    pub async fn update_job(&self, id: &str, xml: &str) -> Result<String> {
        let target = element_text(xml, "state")
            .ok_or_else(|| MockError::InvalidField("state is required".into()))?;
        let handle = self.legacy_job(id).await?;
        let mut job = handle.write().await;

        let next = match (job.state, target.as_str()) {
            (JobState::Open, "Closed") => JobState::Closed,
            (JobState::Open | JobState::Closed, "Aborted") => JobState::Aborted,
            (current, requested) => {
                return Err(MockError::InvalidState(format!(
                    "Cannot change job state from {} to {}",
                    current, requested
                )));
            }
        };
        if next == JobState::Aborted {
            for batch in &mut job.legacy_mut()?.batches {
                if matches!(batch.state, BatchState::Queued | BatchState::InProgress) {
                    batch.state = BatchState::NotProcessed;
                }
            }
        }
        job.set_state(next);
        info!(job_id = %id, state = %next, "bulk v1 job state changed");
        Ok(job_info(&job))
    }

    /// Add a batch to an open job and process it before returning.
    pub async fn add_batch(&self, job_id: &str, body: &str) -> Result<String> {
        let handle = self.legacy_job(job_id).await?;
        let mut job = handle.write().await;
        if job.state != JobState::Open {
            return Err(MockError::InvalidState(format!(
                "Job {} is not open (state: {})",
                job_id, job.state
            )));
        }

        let mut batch = Batch::new(job_id);
        let format = PayloadFormat::from_content_type(&job.content_type);
        match parse_payload(body, format) {
            Ok(records) => self.process_batch(&mut job, &mut batch, records).await?,
            Err(err) => {
                warn!(job_id = %job_id, batch_id = %batch.id, error = %err, "bulk v1 batch rejected");
                batch.state = BatchState::Failed;
                batch.state_message = Some(format!("Failed to parse batch data: {}", err));
            }
        }
        batch.system_modstamp = crate::core::now_timestamp();

        let document = batch_info(&batch);
        job.legacy_mut()?.batches.push(batch);
        job.touch();
        Ok(document)
    }

    async fn process_batch(&self, job: &mut BulkJob, batch: &mut Batch, records: Vec<Record>) -> Result<()> {
        batch.state = BatchState::InProgress;
        let started = Instant::now();
        let schema = self.catalog.require(&job.object)?;
        let typed: Vec<Record> = records.iter().map(|r| type_record(r, schema)).collect();

        let mut results = {
            let collection = self.store.collection(&job.object)?;
            let mut collection = collection.write().await;
            RecordProcessor::new(schema, job.operation)
                .external_id_field(job.external_id_field_name.as_deref())
                .process_all(&mut collection, typed)
        };
        for (result, original) in results.iter_mut().zip(records) {
            result.input = original;
        }

        let failed = results.iter().filter(|r| !r.is_success()).count();
        batch.number_records_processed = results.len();
        batch.number_records_failed = failed;
        batch.total_processing_time = started.elapsed().as_millis() as u64;
        batch.state = if failed == results.len() {
            BatchState::Failed
        } else {
            BatchState::Completed
        };
        batch.results = results;

        job.number_records_processed += batch.number_records_processed;
        job.number_records_failed += failed;
        job.total_processing_time += batch.total_processing_time;
        info!(
            job_id = %job.id,
            batch_id = %batch.id,
            processed = batch.number_records_processed,
            failed,
            state = %batch.state,
            "bulk v1 batch processed"
        );
        Ok(())
    }

    pub async fn list_batches(&self, job_id: &str) -> Result<String> {
        let handle = self.legacy_job(job_id).await?;
        let job = handle.read().await;
        let mut doc = XmlDocument::new("batchInfoList");
        for batch in &job.legacy()?.batches {
            doc.open("batchInfo");
            push_batch_fields(&mut doc, batch);
            doc.close("batchInfo");
        }
        Ok(doc.finish())
    }

    pub async fn get_batch(&self, job_id: &str, batch_id: &str) -> Result<String> {
        let handle = self.legacy_job(job_id).await?;
        let job = handle.read().await;
        Ok(batch_info(find_batch(&job, batch_id)?))
    }

    /// Per-record results in the job's content type.
    pub async fn batch_results(&self, job_id: &str, batch_id: &str) -> Result<ResultDocument> {
        let handle = self.legacy_job(job_id).await?;
        let job = handle.read().await;
        let batch = find_batch(&job, batch_id)?;
        if !matches!(batch.state, BatchState::Completed | BatchState::Failed) {
            return Err(MockError::InvalidBatchState(format!(
                "Batch {} is not complete (state: {})",
                batch_id, batch.state
            )));
        }

        let document = match PayloadFormat::from_content_type(&job.content_type) {
            PayloadFormat::Csv => ResultDocument {
                content_type: "text/csv",
                body: results_csv(&batch.results),
            },
            PayloadFormat::Xml => ResultDocument {
                content_type: "application/xml",
                body: results_xml(&batch.results),
            },
            PayloadFormat::Json => ResultDocument {
                content_type: "application/json",
                body: results_json(&batch.results).to_string(),
            },
        };
        Ok(document)
    }
}

fn find_batch<'j>(job: &'j BulkJob, batch_id: &str) -> Result<&'j Batch> {
    job.legacy()?
        .batches
        .iter()
        .find(|b| b.id == batch_id)
        .ok_or_else(|| MockError::BatchNotFound(format!("Batch not found: {}", batch_id)))
}

fn parse_payload(body: &str, format: PayloadFormat) -> Result<Vec<Record>> {
    match format {
        PayloadFormat::Csv => {
            let document = parse_csv(body);
            if document.headers.is_empty() {
                return Err(MockError::InvalidField("CSV header row is missing".into()));
            }
            Ok(document.records())
        }
        PayloadFormat::Xml => {
            if !body.contains("<sObject") {
                return Err(MockError::InvalidField("no sObjects element found".into()));
            }
            Ok(parse_sobjects(body))
        }
        PayloadFormat::Json => match serde_json::from_str::<serde_json::Value>(body)? {
            serde_json::Value::Array(items) => items
                .into_iter()
                .map(|item| {
                    Record::from_json(item)
                        .ok_or_else(|| MockError::InvalidField("expected an array of objects".into()))
                })
                .collect(),
            object @ serde_json::Value::Object(_) => Ok(Record::from_json(object).into_iter().collect()),
            _ => Err(MockError::InvalidField("expected a JSON array or object".into())),
        },
    }
}

pub fn job_info(job: &BulkJob) -> String {
    let legacy = job.legacy().ok();
    let count = |state: BatchState| legacy.map(|l| l.count_batches(state)).unwrap_or(0);
    let total = legacy.map(|l| l.batches.len()).unwrap_or(0);

    let mut doc = XmlDocument::new("jobInfo")
        .element("id", &job.id)
        .element("operation", job.operation)
        .element("object", &job.object)
        .element("createdById", &job.created_by_id)
        .element("createdDate", &job.created_date)
        .element("systemModstamp", &job.system_modstamp)
        .element("state", job.state);
    if let Some(external) = &job.external_id_field_name {
        doc.push_element("externalIdFieldName", external);
    }
    doc.element("concurrencyMode", &job.concurrency_mode)
        .element("contentType", &job.content_type)
        .element("numberBatchesQueued", count(BatchState::Queued))
        .element("numberBatchesInProgress", count(BatchState::InProgress))
        .element("numberBatchesCompleted", count(BatchState::Completed))
        .element("numberBatchesFailed", count(BatchState::Failed))
        .element("numberBatchesTotal", total)
        .element("numberRecordsProcessed", job.number_records_processed)
        .element("numberRetries", job.retries)
        .element("apiVersion", &job.api_version)
        .element("numberRecordsFailed", job.number_records_failed)
        .element("totalProcessingTime", job.total_processing_time)
        .element("apiActiveProcessingTime", job.total_processing_time)
        .element("apexProcessingTime", 0)
        .finish()
}

fn push_batch_fields(doc: &mut XmlDocument, batch: &Batch) {
    doc.push_element("id", &batch.id);
    doc.push_element("jobId", &batch.job_id);
    doc.push_element("state", batch.state.as_str());
    if let Some(message) = &batch.state_message {
        doc.push_element("stateMessage", message);
    }
    doc.push_element("createdDate", &batch.created_date);
    doc.push_element("systemModstamp", &batch.system_modstamp);
    doc.push_element("numberRecordsProcessed", &batch.number_records_processed.to_string());
    doc.push_element("numberRecordsFailed", &batch.number_records_failed.to_string());
    doc.push_element("totalProcessingTime", &batch.total_processing_time.to_string());
    doc.push_element("apiActiveProcessingTime", &batch.total_processing_time.to_string());
    doc.push_element("apexProcessingTime", "0");
}

pub fn batch_info(batch: &Batch) -> String {
    let mut doc = XmlDocument::new("batchInfo");
    push_batch_fields(&mut doc, batch);
    doc.finish()
}

fn quoted(cell: &str) -> String {
    format!("\"{}\"", cell.replace('"', "\"\""))
}

fn results_csv(results: &[RecordResult]) -> String {
    let mut out = String::from("\"Id\",\"Success\",\"Created\",\"Error\"\n");
    for result in results {
        let cells = [
            quoted(result.id.as_deref().unwrap_or_default()),
            quoted(&result.is_success().to_string()),
            quoted(&result.created.to_string()),
            quoted(&result.error_summary()),
        ];
        out.push_str(&cells.join(","));
        out.push('\n');
    }
    out
}

fn results_xml(results: &[RecordResult]) -> String {
    let mut doc = XmlDocument::new("results");
    for result in results {
        doc.open("result");
        match &result.id {
            Some(id) => doc.push_element("id", id),
            None => doc.push_raw(&format!(r#"<id xsi:nil="true" xmlns:xsi="{}"/>"#, XSI_NS)),
        }
        doc.push_element("success", &result.is_success().to_string());
        doc.push_element("created", &result.created.to_string());
        for error in &result.errors {
            doc.open("errors");
            if !error.field.is_empty() {
                doc.push_element("fields", &error.field);
            }
            doc.push_element("message", &error.message);
            doc.push_element("statusCode", error.code.as_str());
            doc.close("errors");
        }
        doc.close("result");
    }
    doc.finish()
}

fn results_json(results: &[RecordResult]) -> serde_json::Value {
    serde_json::Value::Array(
        results
            .iter()
            .map(|result| {
                let errors: Vec<_> = result
                    .errors
                    .iter()
                    .map(|e| json!({ "message": e.message, "statusCode": e.code, "fields": [e.field] }))
                    .collect();
                json!({
                    "id": result.id,
                    "success": result.is_success(),
                    "created": result.created,
                    "errors": errors,
                })
            })
            .collect(),
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::{FieldDef, Schema};

    fn fixtures() -> (Catalog, RecordStore, JobStore) {
        let catalog = Catalog::new().with_schema(
            Schema::builder("Contact", "003")
                .field("LastName", FieldDef::string(20).required())
                .build(),
        );
        let store = RecordStore::new(&catalog);
        (catalog, store, JobStore::new())
    }

    fn job_request(operation: &str, content_type: &str) -> String {
        format!(
            r#"<?xml version="1.0" encoding="UTF-8"?>
<jobInfo xmlns="http://www.force.com/2009/06/asyncapi/dataload">
  <operation>{}</operation>
  <object>Contact</object>
  <contentType>{}</contentType>
</jobInfo>"#,
            operation, content_type
        )
    }

    #[tokio::test]
    async fn test_csv_batch_is_processed_on_add() {
        let (catalog, store, jobs) = fixtures();
        let engine = LegacyBulkEngine::new(&catalog, &store, &jobs, "v59.0");
        let created = engine.create_job(&job_request("insert", "CSV")).await.unwrap();
        let job_id = element_text(&created, "id").unwrap();
        assert_eq!(element_text(&created, "state").as_deref(), Some("Open"));

        let batch = engine
            .add_batch(&job_id, "LastName\nSmith\nThisLastNameIsWayTooLong\n").await.unwrap();
        let batch_id = element_text(&batch, "id").unwrap();
        assert_eq!(element_text(&batch, "state").as_deref(), Some("Completed"));
        assert_eq!(element_text(&batch, "numberRecordsProcessed").as_deref(), Some("2"));
        assert_eq!(element_text(&batch, "numberRecordsFailed").as_deref(), Some("1"));

        let results = engine.batch_results(&job_id, &batch_id).await.unwrap();
        assert_eq!(results.content_type, "text/csv");
        let lines: Vec<_> = results.body.lines().collect();
        assert_eq!(lines[0], r#""Id","Success","Created","Error""#);
        assert!(lines[1].contains(r#""true","true","""#));
        assert!(lines[2].starts_with(r#""","false","false","STRING_TOO_LONG:"#));
        assert_eq!(store.count("Contact").await.unwrap(), 1);
    }

    #[tokio::test]
    async fn test_xml_batch_results() {
        let (catalog, store, jobs) = fixtures();
        let engine = LegacyBulkEngine::new(&catalog, &store, &jobs, "v59.0");
        let created = engine.create_job(&job_request("insert", "XML")).await.unwrap();
        let job_id = element_text(&created, "id").unwrap();

        let payload = r#"<sObjects xmlns="http://www.force.com/2009/06/asyncapi/dataload">
  <sObject><LastName>Jones</LastName></sObject>
</sObjects>"#;
        let batch = engine.add_batch(&job_id, payload).await.unwrap();
        let batch_id = element_text(&batch, "id").unwrap();
        let results = engine.batch_results(&job_id, &batch_id).await.unwrap();
        assert_eq!(results.content_type, "application/xml");
        assert_eq!(element_text(&results.body, "success").as_deref(), Some("true"));
    }

    #[tokio::test]
    async fn test_state_transitions() {
        let (catalog, store, jobs) = fixtures();
        let engine = LegacyBulkEngine::new(&catalog, &store, &jobs, "v59.0");
        let created = engine.create_job(&job_request("insert", "CSV")).await.unwrap();
        let job_id = element_text(&created, "id").unwrap();

        let closed = engine.update_job(&job_id, "<jobInfo><state>Closed</state></jobInfo>").await.unwrap();
        assert_eq!(element_text(&closed, "state").as_deref(), Some("Closed"));

        let err = engine.add_batch(&job_id, "LastName\nLate").await.unwrap_err();
        assert_eq!(exception_code(&err), "InvalidJobState");

        let err = engine
            .update_job(&job_id, "<jobInfo><state>Open</state></jobInfo>")
            .await
            .unwrap_err();
        assert_eq!(exception_code(&err), "InvalidJobState");

        let aborted = engine.update_job(&job_id, "<jobInfo><state>Aborted</state></jobInfo>").await.unwrap();
        assert_eq!(element_text(&aborted, "state").as_deref(), Some("Aborted"));
    }

    #[tokio::test]
    async fn test_unparseable_json_batch_fails() {
        let (catalog, store, jobs) = fixtures();
        let engine = LegacyBulkEngine::new(&catalog, &store, &jobs, "v59.0");
        let created = engine.create_job(&job_request("insert", "JSON")).await.unwrap();
        let job_id = element_text(&created, "id").unwrap();

        let batch = engine.add_batch(&job_id, "{not json").await.unwrap();
        assert_eq!(element_text(&batch, "state").as_deref(), Some("Failed"));
        assert!(element_text(&batch, "stateMessage").unwrap().starts_with("Failed to parse batch data"));
    }

    #[tokio::test]
    async fn test_unknown_object_is_invalid_job() {
        let (catalog, store, jobs) = fixtures();
        let engine = LegacyBulkEngine::new(&catalog, &store, &jobs, "v59.0");
        let request = job_request("insert", "CSV").replace("Contact", "Nope__c");
        let err = engine.create_job(&request).await.unwrap_err();
        assert_eq!(exception_code(&err), "InvalidJob");
        assert!(error_document(&err).contains("<exceptionCode>InvalidJob</exceptionCode>"));
    }
}

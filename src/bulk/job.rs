use crate::core::{MockError, Record, Result, ValidationError, generate_id, now_timestamp};
use serde::Serialize;
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;
use tokio::sync::RwLock;

/// Key prefix of bulk job ids.
pub const JOB_ID_PREFIX: &str = "750";
/// Key prefix of Bulk v1 batch ids.
pub const BATCH_ID_PREFIX: &str = "751";
/// User id reported as the creator of every job.
pub const MOCK_USER_ID: &str = "005000000000000AAA";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub enum Operation {
    Insert,
    Update,
    Upsert,
    Delete,
    Query,
    QueryAll,
}

impl Operation {
    pub fn parse(name: &str) -> Option<Self> {
        match name {
            "insert" => Some(Self::Insert),
            "update" => Some(Self::Update),
            "upsert" => Some(Self::Upsert),
            "delete" => Some(Self::Delete),
            "query" => Some(Self::Query),
            "queryAll" => Some(Self::QueryAll),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Insert => "insert",
            Self::Update => "update",
            Self::Upsert => "upsert",
            Self::Delete => "delete",
            Self::Query => "query",
            Self::QueryAll => "queryAll",
        }
    }

    pub fn is_ingest(&self) -> bool {
        !matches!(self, Self::Query | Self::QueryAll)
    }
}

impl fmt::Display for Operation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum JobType {
    V1Bulk,
    V2Ingest,
    V2Query,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum JobState {
    Open,
    UploadComplete,
    InProgress,
    JobComplete,
    Failed,
    Aborted,
    Closed,
}

impl JobState {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Open => "Open",
            Self::UploadComplete => "UploadComplete",
            Self::InProgress => "InProgress",
            Self::JobComplete => "JobComplete",
            Self::Failed => "Failed",
            Self::Aborted => "Aborted",
            Self::Closed => "Closed",
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::JobComplete | Self::Failed | Self::Aborted)
    }
}

impl fmt::Display for JobState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum BatchState {
    Queued,
    InProgress,
    Completed,
    Failed,
    #[serde(rename = "Not Processed")]
    NotProcessed,
}

impl BatchState {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Queued => "Queued",
            Self::InProgress => "InProgress",
            Self::Completed => "Completed",
            Self::Failed => "Failed",
            Self::NotProcessed => "Not Processed",
        }
    }
}

impl fmt::Display for BatchState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Batch payload encoding, from the job's declared content type.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PayloadFormat {
    Csv,
    Xml,
    Json,
}

impl PayloadFormat {
    /// `ZIP_*` variants are treated as their unzipped counterparts.
    pub fn from_content_type(content_type: &str) -> Self {
        match content_type.trim_start_matches("ZIP_") {
            "XML" => Self::Xml,
            "JSON" => Self::Json,
            _ => Self::Csv,
        }
    }
}

/// Outcome of one input record.
#[derive(Debug, Clone, PartialEq)]
pub struct RecordResult {
    pub id: Option<String>,
    pub created: bool,
    pub errors: Vec<ValidationError>,
    /// The record as submitted.
    pub input: Record,
}

impl RecordResult {
    pub fn success(id: impl Into<String>, created: bool, input: Record) -> Self {
        Self {
            id: Some(id.into()),
            created,
            errors: Vec::new(),
            input,
        }
    }

    pub fn failure(id: Option<String>, errors: Vec<ValidationError>, input: Record) -> Self {
        Self {
            id,
            created: false,
            errors,
            input,
        }
    }

    pub fn is_success(&self) -> bool {
        self.errors.is_empty()
    }

    /// `CODE:message` for every error, joined by `; `.
    pub fn error_summary(&self) -> String {
        self.errors
            .iter()
            .map(ValidationError::summary)
            .collect::<Vec<_>>()
            .join("; ")
    }
}

#[derive(Debug, Clone)]
pub struct Batch {
    pub id: String,
    pub job_id: String,
    pub state: BatchState,
    pub state_message: Option<String>,
    pub created_date: String,
    pub system_modstamp: String,
    pub number_records_processed: usize,
    pub number_records_failed: usize,
    pub total_processing_time: u64,
    pub results: Vec<RecordResult>,
}

impl Batch {
    pub fn new(job_id: &str) -> Self {
        let now = now_timestamp();
        Self {
            id: generate_id(BATCH_ID_PREFIX),
            job_id: job_id.to_string(),
            state: BatchState::Queued,
            state_message: None,
            created_date: now.clone(),
            system_modstamp: now,
            number_records_processed: 0,
            number_records_failed: 0,
            total_processing_time: 0,
            results: Vec::new(),
        }
    }
}

/// Bulk v1 job data.
#[derive(Debug, Clone, Default)]
pub struct LegacyData {
    pub batches: Vec<Batch>,
}

impl LegacyData {
    pub fn count_batches(&self, state: BatchState) -> usize {
        self.batches.iter().filter(|b| b.state == state).count()
    }
}

/// Bulk v2 ingest job data.
#[derive(Debug, Clone, Default)]
pub struct IngestData {
    /// Uploaded CSV, merged across chunks.
    pub csv_data: String,
    pub successful: Vec<RecordResult>,
    pub failed: Vec<RecordResult>,
}

/// Bulk v2 query job data.
#[derive(Debug, Clone, Default)]
pub struct QueryData {
    pub query: String,
    pub results_csv: String,
    pub error_message: Option<String>,
}

/// Generation-specific part of a job.
#[derive(Debug, Clone)]
pub enum JobPayload {
    Legacy(LegacyData),
    Ingest(IngestData),
    Query(QueryData),
}

#[derive(Debug, Clone)]
pub struct BulkJob {
    pub id: String,
    pub operation: Operation,
    pub object: String,
    pub content_type: String,
    pub state: JobState,
    pub external_id_field_name: Option<String>,
    pub concurrency_mode: String,
    pub line_ending: String,
    pub column_delimiter: String,
    pub api_version: String,
    pub created_by_id: String,
    pub created_date: String,
    pub system_modstamp: String,
    pub number_records_processed: usize,
    pub number_records_failed: usize,
    pub retries: u32,
    pub total_processing_time: u64,
    pub payload: JobPayload,
}

impl BulkJob {
    pub fn new(operation: Operation, object: impl Into<String>, payload: JobPayload) -> Self {
        let now = now_timestamp();
        Self {
            id: generate_id(JOB_ID_PREFIX),
            operation,
            object: object.into(),
            content_type: "CSV".to_string(),
            state: JobState::Open,
            external_id_field_name: None,
            concurrency_mode: "Parallel".to_string(),
            line_ending: "LF".to_string(),
            column_delimiter: "COMMA".to_string(),
            api_version: "59.0".to_string(),
            created_by_id: MOCK_USER_ID.to_string(),
            created_date: now.clone(),
            system_modstamp: now,
            number_records_processed: 0,
            number_records_failed: 0,
            retries: 0,
            total_processing_time: 0,
            payload,
        }
    }

    pub fn job_type(&self) -> JobType {
        match self.payload {
            JobPayload::Legacy(_) => JobType::V1Bulk,
            JobPayload::Ingest(_) => JobType::V2Ingest,
            JobPayload::Query(_) => JobType::V2Query,
        }
    }

    pub fn touch(&mut self) {
        self.system_modstamp = now_timestamp();
    }

    pub fn set_state(&mut self, state: JobState) {
        self.state = state;
        self.touch();
    }

    pub fn legacy(&self) -> Result<&LegacyData> {
        match &self.payload {
            JobPayload::Legacy(data) => Ok(data),
            _ => Err(MockError::InvalidType("This is not a Bulk API v1 job".into())),
        }
    }

    pub fn legacy_mut(&mut self) -> Result<&mut LegacyData> {
        match &mut self.payload {
            JobPayload::Legacy(data) => Ok(data),
            _ => Err(MockError::InvalidType("This is not a Bulk API v1 job".into())),
        }
    }

    pub fn ingest(&self) -> Result<&IngestData> {
        match &self.payload {
            JobPayload::Ingest(data) => Ok(data),
            _ => Err(MockError::InvalidType("This is not an ingest job".into())),
        }
    }

    pub fn ingest_mut(&mut self) -> Result<&mut IngestData> {
        match &mut self.payload {
            JobPayload::Ingest(data) => Ok(data),
            _ => Err(MockError::InvalidType("This is not an ingest job".into())),
        }
    }

    pub fn query(&self) -> Result<&QueryData> {
        match &self.payload {
            JobPayload::Query(data) => Ok(data),
            _ => Err(MockError::InvalidType("This is not a query job".into())),
        }
    }

    pub fn query_mut(&mut self) -> Result<&mut QueryData> {
        match &mut self.payload {
            JobPayload::Query(data) => Ok(data),
            _ => Err(MockError::InvalidType("This is not a query job".into())),
        }
    }

    /// Job info in the Bulk API 2.0 JSON shape.
    pub fn to_info_json(&self) -> serde_json::Value {
        let mut info = serde_json::json!({
            "id": self.id,
            "operation": self.operation,
            "object": self.object,
            "createdById": self.created_by_id,
            "createdDate": self.created_date,
            "systemModstamp": self.system_modstamp,
            "state": self.state,
            "concurrencyMode": self.concurrency_mode,
            "contentType": self.content_type,
            "apiVersion": self.api_version_number(),
            "jobType": self.job_type(),
            "lineEnding": self.line_ending,
            "numberRecordsProcessed": self.number_records_processed,
            "retries": self.retries,
            "totalProcessingTime": self.total_processing_time,
        });
        if let Some(map) = info.as_object_mut() {
            match &self.payload {
                JobPayload::Query(data) => {
                    if let Some(message) = &data.error_message {
                        map.insert("errorMessage".into(), message.clone().into());
                    }
                }
                _ => {
                    map.insert(
                        "externalIdFieldName".into(),
                        self.external_id_field_name.clone().into(),
                    );
                    map.insert("columnDelimiter".into(), self.column_delimiter.clone().into());
                    map.insert("numberRecordsFailed".into(), self.number_records_failed.into());
                }
            }
        }
        info
    }

    /// Numeric API version when it parses, the raw string otherwise.
    fn api_version_number(&self) -> serde_json::Value {
        let trimmed = self.api_version.trim_start_matches('v');
        trimmed
            .parse::<f64>()
            .ok()
            .and_then(serde_json::Number::from_f64)
            .map(serde_json::Value::Number)
            .unwrap_or_else(|| serde_json::Value::String(self.api_version.clone()))
    }
}

pub type JobHandle = Arc<RwLock<BulkJob>>;

#[derive(Default)]
struct JobIndex {
    by_id: HashMap<String, JobHandle>,
    order: Vec<String>,
}

/// Job table shared by all bulk generations.
///
/// The index lock is held only to look up or register a handle; work on a
/// job happens under that job's own lock.
#[derive(Default)]
pub struct JobStore {
    index: RwLock<JobIndex>,
}

impl JobStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn insert(&self, job: BulkJob) -> JobHandle {
        let id = job.id.clone();
        let handle = Arc::new(RwLock::new(job));
        let mut index = self.index.write().await;
        index.order.push(id.clone());
        index.by_id.insert(id, Arc::clone(&handle));
        handle
    }

    pub async fn get(&self, id: &str) -> Result<JobHandle> {
        let index = self.index.read().await;
        index
            .by_id
            .get(id)
            .cloned()
            .ok_or_else(|| MockError::NotFound(format!("Job not found: {}", id)))
    }

    pub async fn remove(&self, id: &str) -> Result<()> {
        let mut index = self.index.write().await;
        if index.by_id.remove(id).is_none() {
            return Err(MockError::NotFound(format!("Job not found: {}", id)));
        }
        index.order.retain(|existing| existing != id);
        Ok(())
    }

    /// Jobs in creation order, optionally restricted to one generation.
    pub async fn list(&self, job_type: Option<JobType>) -> Vec<BulkJob> {
        let handles: Vec<JobHandle> = {
            let index = self.index.read().await;
            index
                .order
                .iter()
                .filter_map(|id| index.by_id.get(id).cloned())
                .collect()
        };
        let mut jobs = Vec::with_capacity(handles.len());
        for handle in handles {
            let job = handle.read().await;
            if job_type.is_none_or(|t| job.job_type() == t) {
                jobs.push(job.clone());
            }
        }
        jobs
    }

    pub async fn len(&self) -> usize {
        self.index.read().await.order.len()
    }

    pub async fn clear(&self) -> usize {
        let mut index = self.index.write().await;
        let count = index.order.len();
        index.by_id.clear();
        index.order.clear();
        count
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_info_json_shape() {
        let mut job = BulkJob::new(Operation::Upsert, "Account", JobPayload::Ingest(IngestData::default()));
        job.external_id_field_name = Some("Ext__c".into());
        let info = job.to_info_json();
        assert_eq!(info["operation"], "upsert");
        assert_eq!(info["state"], "Open");
        assert_eq!(info["jobType"], "V2Ingest");
        assert_eq!(info["externalIdFieldName"], "Ext__c");
        assert_eq!(info["apiVersion"], 59.0);
        assert!(info["id"].as_str().unwrap().starts_with(JOB_ID_PREFIX));
    }

    #[test]
    fn test_query_info_has_no_ingest_counters() {
        let job = BulkJob::new(Operation::QueryAll, "", JobPayload::Query(QueryData::default()));
        let info = job.to_info_json();
        assert_eq!(info["operation"], "queryAll");
        assert!(info.get("numberRecordsFailed").is_none());
        assert!(job.ingest().is_err());
    }

    #[tokio::test]
    async fn test_store_lists_in_creation_order() {
        let store = JobStore::new();
        let a = BulkJob::new(Operation::Insert, "Account", JobPayload::Ingest(IngestData::default()));
        let b = BulkJob::new(Operation::Query, "Account", JobPayload::Query(QueryData::default()));
        let c = BulkJob::new(Operation::Delete, "Account", JobPayload::Ingest(IngestData::default()));
        let ids = [a.id.clone(), b.id.clone(), c.id.clone()];
        for job in [a, b, c] {
            store.insert(job).await;
        }

        let ingest: Vec<_> = store
            .list(Some(JobType::V2Ingest))
            .await
            .into_iter()
            .map(|j| j.id)
            .collect();
        assert_eq!(ingest, vec![ids[0].clone(), ids[2].clone()]);

        store.remove(&ids[1]).await.unwrap();
        assert!(store.get(&ids[1]).await.is_err());
        assert_eq!(store.clear().await, 2);
    }
}

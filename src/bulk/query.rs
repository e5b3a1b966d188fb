//! Bulk API 2.0 query jobs. The query runs when the job is created.

use super::csv::records_to_csv;
use super::job::{BulkJob, JobHandle, JobPayload, JobState, JobStore, JobType, Operation, QueryData};
use crate::core::{MockError, Record, Result, Schema};
use crate::query::ast::SelectList;
use crate::query::{QueryEngine, parse_soql};
use crate::storage::{Catalog, RecordStore};
use serde::Deserialize;
use serde_json::json;
use std::time::Instant;
use tracing::{info, warn};

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct QueryJobRequest {
    pub query: Option<String>,
    pub operation: Option<String>,
    pub content_type: Option<String>,
    pub column_delimiter: Option<String>,
    pub line_ending: Option<String>,
}

/// CSV result page plus the metadata sent as response headers.
#[derive(Debug, Clone, PartialEq)]
pub struct QueryResults {
    pub csv: String,
    pub number_of_records: usize,
    /// Always `None`: every result set fits one page.
    pub locator: Option<String>,
}

pub struct BulkQueryEngine<'a> {
    catalog: &'a Catalog,
    store: &'a RecordStore,
    jobs: &'a JobStore,
    api_version: &'a str,
}

impl<'a> BulkQueryEngine<'a> {
    pub fn new(catalog: &'a Catalog, store: &'a RecordStore, jobs: &'a JobStore, api_version: &'a str) -> Self {
        Self {
            catalog,
            store,
            jobs,
            api_version,
        }
    }

    /// Create the job and run its query. Query failures do not fail the call;
    /// they leave the job `Failed` with an `errorMessage`.
    pub async fn create(&self, request: QueryJobRequest) -> Result<serde_json::Value> {
        let soql = request
            .query
            .filter(|q| !q.trim().is_empty())
            .ok_or_else(|| MockError::MalformedQuery("query field is required".into()))?;
        let operation = match request.operation.as_deref() {
            None => Operation::Query,
            Some(name) => Operation::parse(name)
                .filter(|op| !op.is_ingest())
                .ok_or_else(|| {
                    MockError::InvalidField("operation must be one of: query, queryAll".into())
                })?,
        };

        let data = QueryData {
            query: soql.clone(),
            ..Default::default()
        };
        let mut job = BulkJob::new(operation, "", JobPayload::Query(data));
        job.api_version = self.api_version.trim_start_matches('v').to_string();
        if let Some(content_type) = request.content_type {
            job.content_type = content_type;
        }
        if let Some(delimiter) = request.column_delimiter {
            job.column_delimiter = delimiter;
        }
        if let Some(line_ending) = request.line_ending {
            job.line_ending = line_ending;
        }

        let started = Instant::now();
        match self.run(&soql).await {
            Ok((object, count, csv)) => {
                job.object = object;
                job.number_records_processed = count;
                job.query_mut()?.results_csv = csv;
                job.state = JobState::JobComplete;
                info!(job_id = %job.id, object = %job.object, records = count, "bulk query job completed");
            }
            Err(err) => {
                warn!(job_id = %job.id, error = %err, "bulk query job failed");
                if let Ok(parsed) = parse_soql(&soql) {
                    job.object = parsed.object;
                }
                job.number_records_failed = 1;
                job.query_mut()?.error_message = Some(err.to_string());
                job.state = JobState::Failed;
            }
        }
        job.total_processing_time = started.elapsed().as_millis() as u64;
        job.touch();

        let info = job.to_info_json();
        self.jobs.insert(job).await;
        Ok(info)
    }

    async fn run(&self, soql: &str) -> Result<(String, usize, String)> {
        let parsed = parse_soql(soql)?;
        let fields = match &parsed.select {
            SelectList::Count => {
                return Err(MockError::MalformedQuery(
                    "COUNT() is not supported in Bulk API queries".into(),
                ));
            }
            SelectList::Fields(fields) => fields.clone(),
        };
        let records = QueryEngine::new(self.catalog, self.store)
            .execute(&parsed)
            .await?;
        let schema = self.catalog.require(&parsed.object)?;
        let headers = csv_headers(&fields, &records, schema);
        let csv = records_to_csv(&headers, &records);
        Ok((parsed.object, records.len(), csv))
    }

    async fn query_job(&self, id: &str) -> Result<JobHandle> {
        let handle = self.jobs.get(id).await?;
        handle.read().await.query()?;
        Ok(handle)
    }

    pub async fn get(&self, id: &str) -> Result<serde_json::Value> {
        let handle = self.query_job(id).await?;
        let job = handle.read().await;
        Ok(job.to_info_json())
    }

    pub async fn results(&self, id: &str) -> Result<QueryResults> {
        let handle = self.query_job(id).await?;
        let job = handle.read().await;
        if job.state != JobState::JobComplete {
            return Err(MockError::InvalidState(format!(
                "Results are not available while the job is {}",
                job.state
            )));
        }
        Ok(QueryResults {
            csv: job.query()?.results_csv.clone(),
            number_of_records: job.number_records_processed,
            locator: None,
        })
    }

    /// Only `Aborted` is accepted. The query has already run, so this changes
    /// nothing but the reported state.
    pub async fn set_state(&self, id: &str, state: &str) -> Result<serde_json::Value> {
        let handle = self.query_job(id).await?;
        if state != "Aborted" {
            return Err(MockError::InvalidField(format!(
                "Invalid state: {}. Query jobs can only be Aborted",
                state
            )));
        }
        let mut job = handle.write().await;
        job.set_state(JobState::Aborted);
        info!(job_id = %id, "bulk query job aborted");
        Ok(job.to_info_json())
    }

    pub async fn list(&self) -> serde_json::Value {
        let records: Vec<_> = self
            .jobs
            .list(Some(JobType::V2Query))
            .await
            .iter()
            .map(BulkJob::to_info_json)
            .collect();
        json!({ "done": true, "records": records, "nextRecordsUrl": null })
    }

    pub async fn delete(&self, id: &str) -> Result<()> {
        self.query_job(id).await?;
        self.jobs.remove(id).await?;
        info!(job_id = %id, "bulk query job deleted");
        Ok(())
    }
}

/// Columns for the result CSV. `*` takes the first record's fields, or the
/// schema's when nothing matched.
fn csv_headers(fields: &[String], records: &[Record], schema: &Schema) -> Vec<String> {
    if !fields.iter().any(|f| f == "*") {
        return fields.to_vec();
    }
    match records.first() {
        Some(first) => first.keys().map(str::to_string).collect(),
        None => {
            let mut headers = vec!["Id".to_string()];
            for (name, _) in schema.fields() {
                if name != "Id" {
                    headers.push(name.clone());
                }
            }
            headers
        }
    }
}

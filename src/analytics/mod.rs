//! Wave (CRM Analytics) datasets and SAQL query execution.

pub mod dataset;
pub mod pipeline;

pub use dataset::{Dataset, DatasetStore, DatasetVersion};

use crate::core::{Result, generate_id};
use crate::query::saql::parse_saql;
use serde_json::{Value as Json, json};
use std::time::Instant;
use tracing::{debug, info};

const RESPONSE_ID_PREFIX: &str = "0Aq";

pub struct WaveEngine<'a> {
    datasets: &'a DatasetStore,
}

impl<'a> WaveEngine<'a> {
    pub fn new(datasets: &'a DatasetStore) -> Self {
        Self { datasets }
    }

    pub async fn list(&self, version: &str) -> Json {
        let datasets: Vec<Json> = self
            .datasets
            .list()
            .await
            .iter()
            .map(Dataset::summary_json)
            .collect();
        let total = datasets.len();
        json!({
            "datasets": datasets,
            "totalSize": total,
            "url": format!("/services/data/{}/wave/datasets", version),
        })
    }

    pub async fn get(&self, version: &str, id: &str) -> Result<Json> {
        let dataset = self.datasets.get(id).await?;
        let mut body = dataset.summary_json();
        if let Some(fields) = body.as_object_mut() {
            fields.insert(
                "url".into(),
                json!(format!("/services/data/{}/wave/datasets/{}", version, id)),
            );
            fields.insert(
                "versionsUrl".into(),
                json!(format!("/services/data/{}/wave/datasets/{}/versions", version, id)),
            );
        }
        Ok(body)
    }

    pub async fn versions(&self, version: &str, id: &str) -> Result<Json> {
        let dataset = self.datasets.get(id).await?;
        Ok(json!({
            "versions": dataset.versions_json(),
            "url": format!("/services/data/{}/wave/datasets/{}/versions", version, id),
        }))
    }

    /// Parse and run one SAQL query. Parse errors and unknown datasets are
    /// `MalformedQuery`.
    pub async fn query(&self, saql: &str) -> Result<Json> {
        let started = Instant::now();
        let query = parse_saql(saql)?;
        let dataset = self.datasets.resolve(&query.dataset).await?;
        debug!(dataset = %dataset.name, steps = query.steps.len(), "running SAQL query");

        let records = pipeline::run(&query, dataset.rows)?;
        let metadata = pipeline::metadata(&records);
        let records: Vec<Json> = records.iter().map(|r| r.to_json()).collect();
        info!(dataset = %query.dataset, rows = records.len(), "SAQL query executed");

        Ok(json!({
            "action": "query",
            "responseId": generate_id(RESPONSE_ID_PREFIX),
            "results": {
                "metadata": metadata,
                "records": records,
            },
            "query": saql,
            "responseTime": started.elapsed().as_millis() as u64,
            "warnings": [],
        }))
    }
}

//! Inspection and reset endpoints used by test harnesses.

use super::org::MockOrg;
use crate::core::{MockError, Result, now_timestamp};
use serde::Serialize;
use serde_json::{Map, Value as Json, json};
use tracing::info;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ResetSummary {
    pub records_cleared: usize,
    pub bulk_jobs_cleared: usize,
    pub events_cleared: usize,
    pub clients_cleared: usize,
}

impl MockOrg {
    /// Clear records, jobs, events and sessions. Schemas are kept.
    pub async fn reset(&self) -> ResetSummary {
        let records_cleared = self.store().reset().await;
        let bulk_jobs_cleared = self.jobs().clear().await;
        let (events_cleared, clients_cleared) = self.bus().clear().await;
        let summary = ResetSummary {
            records_cleared,
            bulk_jobs_cleared,
            events_cleared,
            clients_cleared,
        };
        info!(
            records = records_cleared,
            jobs = bulk_jobs_cleared,
            events = events_cleared,
            clients = clients_cleared,
            "org reset"
        );
        summary
    }

    pub async fn health(&self) -> Json {
        json!({
            "status": "UP",
            "timestamp": now_timestamp(),
            "objects": self.catalog().len(),
            "totalRecords": self.store().total_records().await,
            "bulkJobs": self.jobs().len().await,
            "events": self.bus().event_count().await,
            "streamingClients": self.bus().client_count().await,
        })
    }

    /// Every object's records: `{Object: {count, records}}`.
    pub async fn dump_all(&self) -> Result<Json> {
        let mut dump = Map::new();
        for name in self.store().object_names() {
            dump.insert(name.clone(), self.dump_object(name).await?);
        }
        Ok(Json::Object(dump))
    }

    pub async fn dump_object(&self, object: &str) -> Result<Json> {
        if !self.catalog().contains(object) {
            return Err(MockError::NotFound(format!(
                "Object '{}' not found in database",
                object
            )));
        }
        let records = self.store().snapshot(object).await?;
        let records: Vec<Json> = records.iter().map(|r| r.to_json()).collect();
        Ok(json!({ "count": records.len(), "records": records }))
    }

    pub fn schemas_json(&self) -> Json {
        let schemas: Map<String, Json> = self
            .catalog()
            .schemas()
            .map(|schema| {
                (
                    schema.name.clone(),
                    serde_json::to_value(schema).unwrap_or(Json::Null),
                )
            })
            .collect();
        Json::Object(schemas)
    }

    /// All bulk jobs of every generation, in creation order.
    pub async fn bulk_jobs_json(&self) -> Json {
        let jobs: Vec<Json> = self
            .jobs()
            .list(None)
            .await
            .iter()
            .map(|job| job.to_info_json())
            .collect();
        json!({ "count": jobs.len(), "jobs": jobs })
    }
}

use crate::core::{MockError, Record, Result, Value};
use serde_json::{Value as Json, json};
use tokio::sync::RwLock;

#[derive(Debug, Clone, PartialEq)]
pub struct DatasetVersion {
    pub id: String,
    pub created_date: String,
}

/// An analytics dataset with its rows. Only the current version holds data.
#[derive(Debug, Clone, PartialEq)]
pub struct Dataset {
    pub id: String,
    pub name: String,
    pub label: String,
    pub description: String,
    pub created_date: String,
    pub last_modified_date: String,
    pub folder_id: String,
    pub folder_name: String,
    pub versions: Vec<DatasetVersion>,
    pub rows: Vec<Record>,
}

impl Dataset {
    pub fn new(id: impl Into<String>, name: impl Into<String>, rows: Vec<Record>) -> Self {
        let id = id.into();
        let name = name.into();
        Self {
            versions: vec![DatasetVersion {
                id: format!("0Fc{}", id.get(3..).unwrap_or_default()),
                created_date: "2024-06-01T14:30:00.000Z".to_string(),
            }],
            label: name.clone(),
            description: String::new(),
            created_date: "2024-01-15T10:00:00.000Z".to_string(),
            last_modified_date: "2024-06-01T14:30:00.000Z".to_string(),
            folder_id: "00lFOLDER0000001".to_string(),
            folder_name: "SharedApp".to_string(),
            id,
            name,
            rows,
        }
    }

    pub fn current_version_id(&self) -> Option<&str> {
        self.versions.last().map(|v| v.id.as_str())
    }

    /// Listing shape: everything but the rows.
    pub fn summary_json(&self) -> Json {
        json!({
            "id": self.id,
            "name": self.name,
            "label": self.label,
            "description": self.description,
            "datasetType": "default",
            "currentVersionId": self.current_version_id(),
            "createdDate": self.created_date,
            "lastModifiedDate": self.last_modified_date,
            "folderId": self.folder_id,
            "folderName": self.folder_name,
        })
    }

    pub fn versions_json(&self) -> Vec<Json> {
        self.versions
            .iter()
            .map(|v| {
                json!({
                    "id": v.id,
                    "datasetId": self.id,
                    "createdDate": v.created_date,
                    "totalRowCount": self.rows.len(),
                })
            })
            .collect()
    }
}

fn row(fields: &[(&str, Value)]) -> Record {
    let mut record = Record::new();
    for (name, value) in fields {
        record.set(*name, value.clone());
    }
    record
}

fn sales_pipeline() -> Dataset {
    let deal = |name: &str, amount: i64, stage: &str, region: &str| {
        row(&[
            ("Name", Value::from(name)),
            ("Amount", Value::Integer(amount)),
            ("Stage", Value::from(stage)),
            ("Region", Value::from(region)),
        ])
    };
    let mut dataset = Dataset::new(
        "0FbSALES00000001",
        "SalesPipeline",
        vec![
            deal("Acme Deal", 50000, "Closed Won", "West"),
            deal("Beta Opportunity", 75000, "Negotiation", "East"),
            deal("Gamma Contract", 120000, "Closed Won", "West"),
            deal("Delta Prospect", 30000, "Prospecting", "Central"),
            deal("Epsilon Renewal", 95000, "Negotiation", "East"),
        ],
    );
    dataset.label = "Sales Pipeline".to_string();
    dataset.description = "Sales pipeline data for testing Wave Analytics queries".to_string();
    dataset.versions[0].id = "0FcSALESV0000001".to_string();
    dataset
}

fn customer_metrics() -> Dataset {
    let customer = |name: &str, score: i64, segment: &str, revenue: i64| {
        row(&[
            ("Customer", Value::from(name)),
            ("Score", Value::Integer(score)),
            ("Segment", Value::from(segment)),
            ("Revenue", Value::Integer(revenue)),
        ])
    };
    let mut dataset = Dataset::new(
        "0FbMETRICS000001",
        "CustomerMetrics",
        vec![
            customer("Acme Corp", 92, "Enterprise", 500000),
            customer("Beta Inc", 78, "Mid-Market", 150000),
            customer("Gamma LLC", 85, "Enterprise", 320000),
        ],
    );
    dataset.label = "Customer Metrics".to_string();
    dataset.description = "Customer satisfaction and segmentation metrics".to_string();
    dataset.created_date = "2024-02-20T09:00:00.000Z".to_string();
    dataset.last_modified_date = "2024-06-10T11:00:00.000Z".to_string();
    dataset.versions[0] = DatasetVersion {
        id: "0FcMETRICSV00001".to_string(),
        created_date: "2024-06-10T11:00:00.000Z".to_string(),
    };
    dataset
}

/// Registered datasets in registration order.
pub struct DatasetStore {
    datasets: RwLock<Vec<Dataset>>,
}

impl Default for DatasetStore {
    fn default() -> Self {
        Self::with_samples()
    }
}

impl DatasetStore {
    pub fn empty() -> Self {
        Self {
            datasets: RwLock::new(Vec::new()),
        }
    }

    /// The two sample datasets every org starts with.
    pub fn with_samples() -> Self {
        Self {
            datasets: RwLock::new(vec![sales_pipeline(), customer_metrics()]),
        }
    }

    /// Add a dataset, replacing one with the same id.
    pub async fn register(&self, dataset: Dataset) {
        let mut datasets = self.datasets.write().await;
        match datasets.iter_mut().find(|d| d.id == dataset.id) {
            Some(existing) => *existing = dataset,
            None => datasets.push(dataset),
        }
    }

    pub async fn list(&self) -> Vec<Dataset> {
        self.datasets.read().await.clone()
    }

    pub async fn get(&self, id: &str) -> Result<Dataset> {
        self.datasets
            .read()
            .await
            .iter()
            .find(|d| d.id == id)
            .cloned()
            .ok_or_else(|| MockError::NotFound(format!("Wave dataset not found: {}", id)))
    }

    /// Resolve a `load` reference: dataset id, `id/versionId`, then name.
    pub async fn resolve(&self, reference: &str) -> Result<Dataset> {
        let datasets = self.datasets.read().await;
        let id = reference.split('/').next().unwrap_or(reference);
        datasets
            .iter()
            .find(|d| d.id == reference || d.id == id)
            .or_else(|| datasets.iter().find(|d| d.name == reference))
            .cloned()
            .ok_or_else(|| {
                MockError::MalformedQuery(format!("Dataset not found for reference: {}", reference))
            })
    }

    pub async fn len(&self) -> usize {
        self.datasets.read().await.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_resolve_by_id_version_and_name() {
        let store = DatasetStore::with_samples();
        assert_eq!(store.resolve("0FbSALES00000001").await.unwrap().name, "SalesPipeline");
        assert_eq!(
            store.resolve("0FbMETRICS000001/0FcMETRICSV00001").await.unwrap().name,
            "CustomerMetrics"
        );
        assert_eq!(store.resolve("CustomerMetrics").await.unwrap().rows.len(), 3);
        assert!(matches!(
            store.resolve("Nope").await,
            Err(MockError::MalformedQuery(_))
        ));
        assert!(matches!(store.get("Nope").await, Err(MockError::NotFound(_))));
    }

    #[tokio::test]
    async fn test_register_replaces_same_id() {
        let store = DatasetStore::empty();
        store.register(Dataset::new("0FbX", "First", Vec::new())).await;
        store.register(Dataset::new("0FbX", "Second", Vec::new())).await;
        assert_eq!(store.len().await, 1);
        assert_eq!(store.get("0FbX").await.unwrap().name, "Second");
    }

    #[test]
    fn test_summary_leaves_rows_out() {
        let summary = sales_pipeline().summary_json();
        assert_eq!(summary["currentVersionId"], "0FcSALESV0000001");
        assert!(summary.get("rows").is_none());
        assert_eq!(sales_pipeline().versions_json()[0]["totalRowCount"], 5);
    }
}

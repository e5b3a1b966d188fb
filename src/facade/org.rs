use crate::analytics::{DatasetStore, WaveEngine};
use crate::bulk::{BulkQueryEngine, IngestEngine, JobStore, LegacyBulkEngine};
use crate::query::QueryEngine;
use crate::storage::{Catalog, RecordStore};
use crate::streaming::{BayeuxServer, EventBus};
use std::time::Duration;

/// Runtime knobs that shape responses but not stored state.
#[derive(Debug, Clone, PartialEq)]
pub struct OrgSettings {
    /// Default API version, without the `v` prefix.
    pub api_version: String,
    /// Upper bound for a streaming `connect` that finds nothing to deliver.
    pub long_poll: Duration,
    /// Base URL handed out by the OAuth token endpoint.
    pub instance_url: String,
}

impl Default for OrgSettings {
    fn default() -> Self {
        Self {
            api_version: "59.0".to_string(),
            long_poll: Duration::ZERO,
            instance_url: "http://localhost:8080".to_string(),
        }
    }
}

/// One emulated org: schemas, records, bulk jobs, the event bus and
/// analytics datasets.
///
/// Each test can own an isolated instance; the server shares one behind an `Arc`.
pub struct MockOrg {
    catalog: Catalog,
    store: RecordStore,
    jobs: JobStore,
    bus: EventBus,
    datasets: DatasetStore,
    settings: OrgSettings,
}

impl MockOrg {
    pub fn new(catalog: Catalog) -> Self {
        Self::with_settings(catalog, OrgSettings::default())
    }

    pub fn with_settings(catalog: Catalog, settings: OrgSettings) -> Self {
        let store = RecordStore::new(&catalog);
        Self {
            catalog,
            store,
            jobs: JobStore::new(),
            bus: EventBus::new(),
            datasets: DatasetStore::with_samples(),
            settings,
        }
    }

    pub fn catalog(&self) -> &Catalog {
        &self.catalog
    }

    pub fn store(&self) -> &RecordStore {
        &self.store
    }

    pub fn jobs(&self) -> &JobStore {
        &self.jobs
    }

    pub fn bus(&self) -> &EventBus {
        &self.bus
    }

    pub fn datasets(&self) -> &DatasetStore {
        &self.datasets
    }

    pub fn settings(&self) -> &OrgSettings {
        &self.settings
    }

    pub fn query_engine(&self) -> QueryEngine<'_> {
        QueryEngine::new(&self.catalog, &self.store)
    }

    pub fn ingest(&self) -> IngestEngine<'_> {
        IngestEngine::new(&self.catalog, &self.store, &self.jobs, &self.settings.api_version)
    }

    pub fn bulk_query(&self) -> BulkQueryEngine<'_> {
        BulkQueryEngine::new(&self.catalog, &self.store, &self.jobs, &self.settings.api_version)
    }

    pub fn legacy_bulk(&self) -> LegacyBulkEngine<'_> {
        LegacyBulkEngine::new(&self.catalog, &self.store, &self.jobs, &self.settings.api_version)
    }

    pub fn wave(&self) -> WaveEngine<'_> {
        WaveEngine::new(&self.datasets)
    }

    pub fn bayeux(&self) -> BayeuxServer<'_> {
        BayeuxServer::new(&self.bus, self.settings.long_poll)
    }
}

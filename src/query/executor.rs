use super::ast::{SelectList, SoqlQuery};
use super::filter::{apply_order_by, apply_where, matches, paginate};
use super::soql::parse_soql;
use super::sosl::{parse_sosl, search_records};
use crate::core::{MockError, Record, Result};
use crate::storage::{Catalog, RecordStore};
use serde::Serialize;
use serde_json::{Map, Value as Json};
use tracing::{debug, warn};

/// REST `/query` response.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct QueryResult {
    pub total_size: usize,
    pub done: bool,
    pub records: Vec<Json>,
}

/// REST `/search` response.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SearchResult {
    pub search_records: Vec<Json>,
}

/// `/services/data/<version>/sobjects/<object>/<id>`
pub fn record_url(version: &str, object: &str, id: &str) -> String {
    format!("/services/data/{}/sobjects/{}/{}", version, object, id)
}

/// Project a record for a REST response: `attributes` first, then the
/// selected fields that are present. An empty selection or `*` keeps all.
pub fn project(record: &Record, object: &str, fields: &[String], version: &str) -> Json {
    let mut row = Map::new();
    row.insert(
        "attributes".into(),
        serde_json::json!({
            "type": object,
            "url": record_url(version, object, record.id().unwrap_or_default()),
        }),
    );

    if fields.is_empty() || fields.iter().any(|f| f == "*") {
        for (name, value) in record.iter() {
            row.insert(name.to_string(), value.to_json());
        }
    } else {
        for field in fields {
            if let Some(value) = record.get(field) {
                row.insert(field.clone(), value.to_json());
            }
        }
    }
    Json::Object(row)
}

/// Read-only engine over the catalog and record store.
pub struct QueryEngine<'a> {
    catalog: &'a Catalog,
    store: &'a RecordStore,
}

impl<'a> QueryEngine<'a> {
    pub fn new(catalog: &'a Catalog, store: &'a RecordStore) -> Self {
        Self { catalog, store }
    }

    /// Run a parsed query: snapshot, filter, sort, then OFFSET and LIMIT.
    pub async fn execute(&self, query: &SoqlQuery) -> Result<Vec<Record>> {
        if !self.catalog.contains(&query.object) {
            return Err(MockError::InvalidType(format!(
                "sObject type '{}' is not supported. Check the spelling or your schema files.",
                query.object
            )));
        }

        let mut records = self.store.snapshot(&query.object).await?;
        if let Some(filter) = &query.filter {
            records = apply_where(records, filter);
        }
        if let Some(order) = &query.order_by {
            records = apply_order_by(records, order);
        }
        Ok(paginate(records, query.offset, query.limit))
    }

    pub async fn query(&self, soql: &str, version: &str) -> Result<QueryResult> {
        let parsed = parse_soql(soql).inspect_err(|err| debug!(error = %err, "SOQL rejected"))?;
        let records = self.execute(&parsed).await?;

        let fields = match &parsed.select {
            SelectList::Count => {
                return Ok(QueryResult {
                    total_size: records.len(),
                    done: true,
                    records: Vec::new(),
                });
            }
            SelectList::Fields(fields) => fields,
        };

        let projected: Vec<Json> = records
            .iter()
            .map(|r| project(r, &parsed.object, fields, version))
            .collect();
        Ok(QueryResult {
            total_size: projected.len(),
            done: true,
            records: projected,
        })
    }

    pub async fn search(&self, sosl: &str, version: &str) -> Result<SearchResult> {
        let parsed = parse_sosl(sosl).inspect_err(|err| debug!(error = %err, "SOSL rejected"))?;

        let mut search_records_out = Vec::new();
        for spec in &parsed.returning {
            if !self.catalog.contains(&spec.object) {
                warn!(object = %spec.object, "SOSL: skipping unknown object");
                continue;
            }
            let records = self.store.snapshot(&spec.object).await?;
            let mut hits = search_records(records, &parsed.term, parsed.scope);
            if let Some(filter) = &spec.filter {
                hits.retain(|r| matches(r, filter));
            }
            if let Some(limit) = spec.limit {
                hits.truncate(limit);
            }
            search_records_out.extend(
                hits.iter()
                    .map(|r| project(r, &spec.object, &spec.fields, version)),
            );
        }

        Ok(SearchResult {
            search_records: search_records_out,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::{FieldDef, Schema, Value};

    async fn fixture() -> (Catalog, RecordStore) {
        let catalog = Catalog::new()
            .with_schema(
                Schema::builder("Account", "001")
                    .field("Name", FieldDef::string(80))
                    .build(),
            )
            .with_schema(Schema::builder("Contact", "003").build());
        let store = RecordStore::new(&catalog);
        for (i, name) in ["Acme", "Globex", "Acme Labs"].iter().enumerate() {
            let mut r = Record::new();
            r.set("Id", Value::from(format!("001{:015}", i)));
            r.set("Name", Value::from(*name));
            r.set("Industry", Value::Null);
            store.insert("Account", r).await.unwrap();
        }
        (catalog, store)
    }

    #[tokio::test]
    async fn test_query_projects_selected_fields() {
        let (catalog, store) = fixture().await;
        let engine = QueryEngine::new(&catalog, &store);
        let result = engine
            .query("SELECT Id, Name, Missing FROM Account WHERE Name LIKE 'Acme%'", "v59.0")
            .await
            .unwrap();

        assert_eq!(result.total_size, 2);
        let first = result.records[0].as_object().unwrap();
        let keys: Vec<_> = first.keys().map(String::as_str).collect();
        assert_eq!(keys, vec!["attributes", "Id", "Name"]);
        assert_eq!(first["attributes"]["type"], "Account");
        assert_eq!(
            first["attributes"]["url"],
            "/services/data/v59.0/sobjects/Account/001000000000000000"
        );
    }

    #[tokio::test]
    async fn test_count_query() {
        let (catalog, store) = fixture().await;
        let engine = QueryEngine::new(&catalog, &store);
        let result = engine.query("SELECT COUNT() FROM Account", "v59.0").await.unwrap();
        assert_eq!(result.total_size, 3);
        assert!(result.records.is_empty());
    }

    #[tokio::test]
    async fn test_unknown_object_is_invalid_type() {
        let (catalog, store) = fixture().await;
        let engine = QueryEngine::new(&catalog, &store);
        let err = engine.query("SELECT Id FROM Opportunity", "v59.0").await.unwrap_err();
        assert!(matches!(err, MockError::InvalidType(_)));
    }

    #[tokio::test]
    async fn test_search_skips_unknown_objects() {
        let (catalog, store) = fixture().await;
        let engine = QueryEngine::new(&catalog, &store);
        let result = engine
            .search("FIND {acme} RETURNING Account(Name LIMIT 1), Nope__c", "v59.0")
            .await
            .unwrap();
        assert_eq!(result.search_records.len(), 1);
        assert_eq!(result.search_records[0]["Name"], "Acme");
    }
}

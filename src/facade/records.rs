//! Single-record REST operations, describe, and the static OAuth/limits mocks.

use super::org::MockOrg;
use crate::bulk::job::MOCK_USER_ID;
use crate::core::id::random_token;
use crate::core::{
    FieldType, MockError, Record, Result, Schema, Value, generate_id, now_timestamp,
};
use crate::query::project;
use crate::storage::{apply_update, new_record};
use crate::validation::{FieldValidator, ValidationMode};
use serde::Serialize;
use serde_json::{Value as Json, json};
use tracing::info;

const ORG_ID: &str = "00D000000000000EAA";
const EVENT_ID_PREFIX: &str = "e00";

/// Body of a successful create, and of an upsert that created.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SaveResult {
    pub id: String,
    pub success: bool,
    pub errors: Vec<Json>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub created: Option<bool>,
}

impl SaveResult {
    fn new(id: String) -> Self {
        Self {
            id,
            success: true,
            errors: Vec::new(),
            created: None,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum UpsertOutcome {
    Created(SaveResult),
    Updated,
}

fn body_fields(body: Json) -> Result<Record> {
    match body {
        Json::Null => Ok(Record::new()),
        other => Record::from_json(other)
            .ok_or_else(|| MockError::InvalidField("Request body must be a JSON object".into())),
    }
}

fn check(fields: &Record, schema: &Schema, mode: ValidationMode) -> Result<()> {
    let errors = FieldValidator::new().validate(fields, schema, mode);
    if errors.is_empty() {
        Ok(())
    } else {
        Err(MockError::Validation(errors))
    }
}

fn record_not_found(id: &str) -> MockError {
    MockError::NotFound(format!(
        "Provided external ID field does not exist or is not accessible: {}",
        id
    ))
}

impl MockOrg {
    /// Schema-derived object metadata.
    pub fn describe(&self, object: &str, version: &str) -> Result<Json> {
        let schema = self.catalog().require(object)?;

        let mut fields = vec![json!({
            "name": "Id",
            "type": "id",
            "label": format!("{} ID", schema.label),
            "length": 18,
            "updateable": false,
            "createable": false,
            "nillable": false,
            "queryable": true,
            "filterable": true,
            "picklistValues": [],
        })];
        for (name, def) in schema.fields().iter().filter(|(name, _)| name != "Id") {
            let picklist: Vec<Json> = def
                .values
                .iter()
                .enumerate()
                .map(|(i, value)| {
                    json!({
                        "value": value,
                        "label": value,
                        "active": true,
                        "defaultValue": i == 0 && def.required,
                    })
                })
                .collect();
            let length = def.max_length.unwrap_or(match def.field_type {
                FieldType::Id => 18,
                _ => 0,
            });
            fields.push(json!({
                "name": name,
                "type": def.field_type,
                "label": def.label.clone().unwrap_or_else(|| name.clone()),
                "length": length,
                "precision": def.precision,
                "scale": def.scale,
                "digits": def.digits,
                "updateable": def.updateable,
                "createable": def.createable,
                "nillable": !def.required,
                "queryable": true,
                "filterable": true,
                "referenceTo": def.reference_to,
                "picklistValues": picklist,
            }));
        }

        let base = format!("/services/data/{}/sobjects/{}", version, object);
        Ok(json!({
            "name": schema.name,
            "label": schema.label,
            "labelPlural": schema.label_plural(),
            "keyPrefix": schema.id_prefix,
            "fields": fields,
            "createable": true,
            "updateable": true,
            "deletable": true,
            "queryable": true,
            "searchable": true,
            "urls": {
                "sobject": base,
                "describe": format!("{}/describe", base),
                "rowTemplate": format!("{}/{{ID}}", base),
            },
        }))
    }

    /// Create a record, or publish it when the object is a platform event.
    pub async fn create_record(&self, object: &str, body: Json) -> Result<SaveResult> {
        if object.ends_with("__e") {
            return self.publish_event(object, body).await;
        }
        let schema = self.catalog().require(object)?;
        let fields = body_fields(body)?;
        check(&fields, schema, ValidationMode::Create)?;

        let record = new_record(schema, &fields);
        let id = record.id().unwrap_or_default().to_string();
        self.store().insert(object, record).await?;
        info!(object, id = %id, "record created");
        Ok(SaveResult::new(id))
    }

    /// Publish a platform event on `/event/<object>`. Events are never stored.
    pub async fn publish_event(&self, object: &str, body: Json) -> Result<SaveResult> {
        let prefix = self
            .catalog()
            .get(object)
            .map(|schema| schema.id_prefix.as_str())
            .unwrap_or(EVENT_ID_PREFIX);
        let event_id = generate_id(prefix);

        let mut payload = body_fields(body)?;
        payload.set("CreatedDate", Value::Text(now_timestamp()));
        payload.set("CreatedById", Value::from(MOCK_USER_ID));
        self.bus()
            .publish(&format!("/event/{}", object), payload.to_json())
            .await;
        Ok(SaveResult::new(event_id))
    }

    pub async fn get_record(&self, object: &str, id: &str, version: &str) -> Result<Json> {
        self.catalog().require(object)?;
        let handle = self.store().collection(object)?;
        let collection = handle.read().await;
        let record = collection.find_by_id(id).ok_or_else(|| record_not_found(id))?;
        Ok(project(record, object, &[], version))
    }

    pub async fn update_record(&self, object: &str, id: &str, body: Json) -> Result<()> {
        let schema = self.catalog().require(object)?;
        let handle = self.store().collection(object)?;
        let mut collection = handle.write().await;
        let record = collection.find_by_id_mut(id).ok_or_else(|| record_not_found(id))?;

        let fields = body_fields(body)?;
        check(&fields, schema, ValidationMode::Update)?;
        apply_update(record, &fields);
        info!(object, id, "record updated");
        Ok(())
    }

    pub async fn delete_record(&self, object: &str, id: &str) -> Result<()> {
        self.catalog().require(object)?;
        let handle = self.store().collection(object)?;
        let mut collection = handle.write().await;
        collection.remove_by_id(id).ok_or_else(|| {
            MockError::EntityIsDeleted(format!("Entity is deleted or does not exist: {}", id))
        })?;
        info!(object, id, "record deleted");
        Ok(())
    }

    /// Update the record whose `ext_field` equals `ext_value`, or create one
    /// carrying that external id.
    pub async fn upsert_record(
        &self,
        object: &str,
        ext_field: &str,
        ext_value: &str,
        body: Json,
    ) -> Result<UpsertOutcome> {
        let schema = self.catalog().require(object)?;
        let fields = body_fields(body)?;
        let handle = self.store().collection(object)?;
        let mut collection = handle.write().await;

        if let Some(record) = collection.find_by_field_mut(ext_field, ext_value) {
            check(&fields, schema, ValidationMode::Update)?;
            apply_update(record, &fields);
            info!(object, ext_field, ext_value, "record upserted (updated)");
            return Ok(UpsertOutcome::Updated);
        }

        let mut created = Record::new();
        created.set(ext_field, Value::from(ext_value));
        created.merge(&fields);
        check(&created, schema, ValidationMode::Create)?;
        let record = new_record(schema, &created);
        let id = record.id().unwrap_or_default().to_string();
        collection.push(record);
        info!(object, id = %id, "record upserted (created)");

        let mut result = SaveResult::new(id);
        result.created = Some(true);
        Ok(UpsertOutcome::Created(result))
    }

    /// OAuth2 token response. Any credentials are accepted.
    pub fn oauth_token(&self) -> Json {
        let issued_at = chrono::Utc::now().timestamp_millis();
        let instance_url = self.settings().instance_url.trim_end_matches('/');
        json!({
            "access_token": format!("00D000000000000!mock.token.{}.{}", issued_at, random_token(13)),
            "instance_url": instance_url,
            "id": format!("{}/id/{}/{}", instance_url, ORG_ID, MOCK_USER_ID),
            "token_type": "Bearer",
            "issued_at": issued_at.to_string(),
            "signature": random_token(44),
        })
    }
}

/// Static org limits, enough for connection checks.
pub fn api_limits() -> Json {
    json!({
        "DailyApiRequests": { "Max": 1_000_000, "Remaining": 999_000 },
        "DailyBulkApiRequests": { "Max": 10_000, "Remaining": 9_900 },
        "ConcurrentAsyncGetReportInstances": { "Max": 200, "Remaining": 200 },
        "ConcurrentSyncReportRuns": { "Max": 20, "Remaining": 20 },
        "DailyAsyncApexExecutions": { "Max": 250_000, "Remaining": 250_000 },
        "HourlyDashboardRefreshes": { "Max": 200, "Remaining": 200 },
    })
}

//! Wave analytics: dataset listing and the SAQL query endpoint.

use super::{ApiResponse, parse_json, respond};
use crate::core::MockError;
use crate::facade::MockOrg;

pub async fn list_datasets(org: &MockOrg, version: &str) -> ApiResponse {
    ApiResponse::ok(org.wave().list(version).await)
}

pub async fn get_dataset(org: &MockOrg, version: &str, id: &str) -> ApiResponse {
    respond(org.wave().get(version, id).await.map(ApiResponse::ok))
}

pub async fn dataset_versions(org: &MockOrg, version: &str, id: &str) -> ApiResponse {
    respond(org.wave().versions(version, id).await.map(ApiResponse::ok))
}

/// `{"query": "<saql>"}`. Every failure here is a `MALFORMED_QUERY`.
pub async fn query(org: &MockOrg, body: &[u8]) -> ApiResponse {
    let result = async {
        let body = parse_json(body)
            .map_err(|_| MockError::MalformedQuery("Invalid JSON in request body".into()))?;
        let saql = body
            .get("query")
            .and_then(|q| q.as_str())
            .filter(|q| !q.trim().is_empty())
            .ok_or_else(|| {
                MockError::MalformedQuery("SAQL query is required. Provide a \"query\" field.".into())
            })?;
        let result = org.wave().query(saql).await.map_err(|err| match err {
            MockError::MalformedQuery(message) => {
                MockError::MalformedQuery(format!("SAQL execution error: {}", message))
            }
            other => other,
        })?;
        Ok(ApiResponse::ok(result))
    };
    respond(result.await)
}

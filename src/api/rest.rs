//! REST data API: OAuth, describe, single-record CRUD, query, search and limits.

use super::{ApiResponse, parse_json, respond};
use crate::core::MockError;
use crate::facade::{MockOrg, UpsertOutcome, api_limits};
use http::StatusCode;

pub fn oauth_token(org: &MockOrg) -> ApiResponse {
    ApiResponse::ok(org.oauth_token())
}

pub fn limits() -> ApiResponse {
    ApiResponse::ok(api_limits())
}

pub fn describe(org: &MockOrg, version: &str, object: &str) -> ApiResponse {
    respond(org.describe(object, version).map(ApiResponse::ok))
}

pub async fn create(org: &MockOrg, object: &str, body: &[u8]) -> ApiResponse {
    let result = async {
        let body = parse_json(body)?;
        let saved = org.create_record(object, body).await?;
        Ok(ApiResponse::json(StatusCode::CREATED, saved))
    };
    respond(result.await)
}

pub async fn get(org: &MockOrg, version: &str, object: &str, id: &str) -> ApiResponse {
    respond(org.get_record(object, id, version).await.map(ApiResponse::ok))
}

pub async fn update(org: &MockOrg, object: &str, id: &str, body: &[u8]) -> ApiResponse {
    let result = async {
        let body = parse_json(body)?;
        org.update_record(object, id, body).await?;
        Ok(ApiResponse::no_content())
    };
    respond(result.await)
}

pub async fn delete(org: &MockOrg, object: &str, id: &str) -> ApiResponse {
    respond(
        org.delete_record(object, id)
            .await
            .map(|_| ApiResponse::no_content()),
    )
}

pub async fn upsert(
    org: &MockOrg,
    object: &str,
    ext_field: &str,
    ext_value: &str,
    body: &[u8],
) -> ApiResponse {
    let result = async {
        let body = parse_json(body)?;
        Ok(
            match org.upsert_record(object, ext_field, ext_value, body).await? {
                UpsertOutcome::Created(saved) => ApiResponse::json(StatusCode::CREATED, saved),
                UpsertOutcome::Updated => ApiResponse::no_content(),
            },
        )
    };
    respond(result.await)
}

/// Decoded content of a binary field, sent as an attachment.
pub async fn download(org: &MockOrg, object: &str, id: &str, field: &str) -> ApiResponse {
    respond(org.download(object, id, field).await.map(|file| {
        let length = file.bytes.len();
        ApiResponse::binary(file.content_type, file.bytes)
            .with_header("content-disposition", format!("attachment; filename=\"{}\"", file.filename))
            .with_header("content-length", length.to_string())
    }))
}

pub async fn query(org: &MockOrg, version: &str, soql: Option<&str>) -> ApiResponse {
    let Some(soql) = soql.filter(|q| !q.trim().is_empty()) else {
        return ApiResponse::error(MockError::MalformedQuery(
            "SOQL query is required. Use ?q=SELECT...".into(),
        ));
    };
    respond(
        org.query_engine()
            .query(soql, version)
            .await
            .map(ApiResponse::ok),
    )
}

pub async fn search(org: &MockOrg, version: &str, sosl: Option<&str>) -> ApiResponse {
    let Some(sosl) = sosl.filter(|q| !q.trim().is_empty()) else {
        return ApiResponse::error(MockError::MalformedQuery(
            "SOSL query is required. Use ?q=FIND+{term}+RETURNING+Object(fields)".into(),
        ));
    };
    respond(
        org.query_engine()
            .search(sosl, version)
            .await
            .map(ApiResponse::ok),
    )
}

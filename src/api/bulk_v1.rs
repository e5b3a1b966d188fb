//! Bulk API v1 (`/services/async/<version>/job...`): XML in, XML out.

use super::{ApiResponse, CONTENT_XML, status_for};
use crate::bulk::v1::error_document;
use crate::bulk::ResultDocument;
use crate::core::{MockError, Result};
use crate::facade::MockOrg;
use http::StatusCode;

fn xml(status: StatusCode, body: String) -> ApiResponse {
    ApiResponse::text(status, CONTENT_XML, body)
}

/// v1 clients expect `<error>` documents, never the JSON array.
fn xml_error(err: MockError) -> ApiResponse {
    xml(status_for(&err), error_document(&err))
}

fn respond_xml(status: StatusCode, result: Result<String>) -> ApiResponse {
    match result {
        Ok(body) => xml(status, body),
        Err(err) => xml_error(err),
    }
}

pub async fn create_job(org: &MockOrg, body: &str) -> ApiResponse {
    respond_xml(StatusCode::CREATED, org.legacy_bulk().create_job(body).await)
}

pub async fn get_job(org: &MockOrg, job_id: &str) -> ApiResponse {
    respond_xml(StatusCode::OK, org.legacy_bulk().get_job(job_id).await)
}

/// POST to the job resource closes or aborts it.
pub async fn update_job(org: &MockOrg, job_id: &str, body: &str) -> ApiResponse {
    respond_xml(StatusCode::OK, org.legacy_bulk().update_job(job_id, body).await)
}

pub async fn add_batch(org: &MockOrg, job_id: &str, body: &str) -> ApiResponse {
    respond_xml(StatusCode::CREATED, org.legacy_bulk().add_batch(job_id, body).await)
}

pub async fn list_batches(org: &MockOrg, job_id: &str) -> ApiResponse {
    respond_xml(StatusCode::OK, org.legacy_bulk().list_batches(job_id).await)
}

pub async fn get_batch(org: &MockOrg, job_id: &str, batch_id: &str) -> ApiResponse {
    respond_xml(StatusCode::OK, org.legacy_bulk().get_batch(job_id, batch_id).await)
}

pub async fn batch_results(org: &MockOrg, job_id: &str, batch_id: &str) -> ApiResponse {
    match org.legacy_bulk().batch_results(job_id, batch_id).await {
        Ok(ResultDocument { content_type, body }) => {
            ApiResponse::text(StatusCode::OK, content_type, body)
        }
        Err(err) => xml_error(err),
    }
}

pub fn method_not_allowed(method: &str) -> ApiResponse {
    xml_error(MockError::MethodNotAllowed(format!("{} not allowed", method)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::{FieldDef, Schema};
    use crate::storage::Catalog;

    #[tokio::test]
    async fn test_unknown_job_is_xml_not_found() {
        let org = MockOrg::new(Catalog::new());
        let response = get_job(&org, "750000000000000AAA").await;
        assert_eq!(response.status, StatusCode::NOT_FOUND);
        let body = response.text_body().unwrap();
        assert!(body.contains("<exceptionCode>InvalidJob</exceptionCode>"));
    }

    #[tokio::test]
    async fn test_create_job_is_created() {
        let org = MockOrg::new(Catalog::new().with_schema(
            Schema::builder("Account", "001")
                .field("Name", FieldDef::string(80))
                .build(),
        ));
        let request = "<jobInfo xmlns=\"http://www.force.com/2009/06/asyncapi/dataload\">\
            <operation>insert</operation><object>Account</object>\
            <contentType>CSV</contentType></jobInfo>";
        let response = create_job(&org, request).await;
        assert_eq!(response.status, StatusCode::CREATED);
        assert!(response.text_body().unwrap().contains("<state>Open</state>"));
    }
}

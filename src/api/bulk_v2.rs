//! Bulk API 2.0 ingest (`/jobs/ingest`) and query (`/jobs/query`) jobs.

use super::{ApiResponse, CONTENT_CSV, respond};
use crate::bulk::{IngestJobRequest, QueryJobRequest};
use crate::core::{MockError, Result};
use crate::facade::MockOrg;
use http::StatusCode;
use serde::Deserialize;
use serde::de::DeserializeOwned;

#[derive(Debug, Default, Deserialize)]
struct StateChange {
    state: Option<String>,
}

fn decode<T: DeserializeOwned + Default>(body: &[u8]) -> Result<T> {
    if body.iter().all(u8::is_ascii_whitespace) {
        return Ok(T::default());
    }
    serde_json::from_slice(body)
        .map_err(|_| MockError::InvalidField("Invalid JSON in request body".into()))
}

fn requested_state(body: &[u8]) -> Result<String> {
    Ok(decode::<StateChange>(body)?.state.unwrap_or_default())
}

fn csv(text: String) -> ApiResponse {
    ApiResponse::text(StatusCode::OK, CONTENT_CSV, text)
}

pub async fn create_ingest_job(org: &MockOrg, body: &[u8]) -> ApiResponse {
    let result = async {
        let request: IngestJobRequest = decode(body)?;
        let info = org.ingest().create(request).await?;
        Ok(ApiResponse::json(StatusCode::CREATED, info))
    };
    respond(result.await)
}

pub async fn list_ingest_jobs(org: &MockOrg) -> ApiResponse {
    ApiResponse::ok(org.ingest().list().await)
}

pub async fn get_ingest_job(org: &MockOrg, job_id: &str) -> ApiResponse {
    respond(org.ingest().get(job_id).await.map(ApiResponse::ok))
}

pub async fn upload_batch(org: &MockOrg, job_id: &str, body: &str) -> ApiResponse {
    respond(
        org.ingest()
            .upload(job_id, body)
            .await
            .map(|_| ApiResponse::empty(StatusCode::CREATED)),
    )
}

pub async fn set_ingest_state(org: &MockOrg, job_id: &str, body: &[u8]) -> ApiResponse {
    let result = async {
        let state = requested_state(body)?;
        Ok(ApiResponse::ok(org.ingest().set_state(job_id, &state).await?))
    };
    respond(result.await)
}

pub async fn delete_ingest_job(org: &MockOrg, job_id: &str) -> ApiResponse {
    respond(
        org.ingest()
            .delete(job_id)
            .await
            .map(|_| ApiResponse::no_content()),
    )
}

pub async fn successful_results(org: &MockOrg, job_id: &str) -> ApiResponse {
    respond(org.ingest().successful_results(job_id).await.map(csv))
}

pub async fn failed_results(org: &MockOrg, job_id: &str) -> ApiResponse {
    respond(org.ingest().failed_results(job_id).await.map(csv))
}

pub async fn unprocessed_records(org: &MockOrg, job_id: &str) -> ApiResponse {
    respond(org.ingest().unprocessed_records(job_id).await.map(csv))
}

pub async fn create_query_job(org: &MockOrg, body: &[u8]) -> ApiResponse {
    let result = async {
        let request: QueryJobRequest = decode(body)
            .map_err(|_| MockError::MalformedQuery("Invalid JSON in request body".into()))?;
        let info = org.bulk_query().create(request).await?;
        Ok(ApiResponse::json(StatusCode::CREATED, info))
    };
    respond(result.await)
}

pub async fn list_query_jobs(org: &MockOrg) -> ApiResponse {
    ApiResponse::ok(org.bulk_query().list().await)
}

pub async fn get_query_job(org: &MockOrg, job_id: &str) -> ApiResponse {
    respond(org.bulk_query().get(job_id).await.map(ApiResponse::ok))
}

pub async fn set_query_state(org: &MockOrg, job_id: &str, body: &[u8]) -> ApiResponse {
    let result = async {
        let state = requested_state(body)?;
        Ok(ApiResponse::ok(
            org.bulk_query().set_state(job_id, &state).await?,
        ))
    };
    respond(result.await)
}

pub async fn delete_query_job(org: &MockOrg, job_id: &str) -> ApiResponse {
    respond(
        org.bulk_query()
            .delete(job_id)
            .await
            .map(|_| ApiResponse::no_content()),
    )
}

/// Results as one CSV page; the locator header is the literal `null`.
pub async fn query_results(org: &MockOrg, job_id: &str) -> ApiResponse {
    respond(org.bulk_query().results(job_id).await.map(|page| {
        csv(page.csv)
            .with_header(
                "Sforce-Locator",
                page.locator.unwrap_or_else(|| "null".to_string()),
            )
            .with_header("Sforce-NumberOfRecords", page.number_of_records.to_string())
    }))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::{FieldDef, Schema};
    use crate::storage::Catalog;

    fn org() -> MockOrg {
        MockOrg::new(Catalog::new().with_schema(
            Schema::builder("Account", "001")
                .field("Name", FieldDef::string(80).required())
                .build(),
        ))
    }

    #[tokio::test]
    async fn test_ingest_lifecycle() {
        let org = org();
        let created = create_ingest_job(&org, br#"{"object":"Account","operation":"insert"}"#).await;
        assert_eq!(created.status, StatusCode::CREATED);
        let id = created.json_body().unwrap()["id"].as_str().unwrap().to_string();

        let uploaded = upload_batch(&org, &id, "Name\nAcme\nGlobex\n").await;
        assert_eq!(uploaded.status, StatusCode::CREATED);
        assert_eq!(uploaded.body, super::super::ApiBody::Empty);

        let closed = set_ingest_state(&org, &id, br#"{"state":"UploadComplete"}"#).await;
        assert_eq!(closed.status, StatusCode::OK);
        assert_eq!(closed.json_body().unwrap()["state"], "JobComplete");

        let results = successful_results(&org, &id).await;
        let text = results.text_body().unwrap();
        assert!(text.starts_with("sf__Id,sf__Created,Name"));
        assert_eq!(text.lines().count(), 3);
    }

    #[tokio::test]
    async fn test_query_results_carry_headers() {
        let org = org();
        org.create_record("Account", serde_json::json!({"Name": "Acme"}))
            .await
            .unwrap();
        let created = create_query_job(
            &org,
            br#"{"operation":"query","query":"SELECT Id, Name FROM Account"}"#,
        )
        .await;
        assert_eq!(created.status, StatusCode::CREATED);
        let id = created.json_body().unwrap()["id"].as_str().unwrap().to_string();

        let page = query_results(&org, &id).await;
        assert_eq!(page.status, StatusCode::OK);
        assert!(page.headers.contains(&("Sforce-Locator", "null".to_string())));
        assert!(page.headers.contains(&("Sforce-NumberOfRecords", "1".to_string())));
    }

    #[tokio::test]
    async fn test_bad_json_is_rejected() {
        let org = org();
        let response = create_ingest_job(&org, b"{nope").await;
        assert_eq!(response.status, StatusCode::BAD_REQUEST);
        assert_eq!(response.json_body().unwrap()[0]["errorCode"], "INVALID_FIELD");
    }
}

//! `/__admin/*` inspection endpoints, health probes and the root index.

use super::{ApiResponse, respond};
use crate::facade::MockOrg;
use serde_json::json;

pub async fn dump_all(org: &MockOrg) -> ApiResponse {
    respond(org.dump_all().await.map(ApiResponse::ok))
}

pub async fn dump_object(org: &MockOrg, object: &str) -> ApiResponse {
    respond(org.dump_object(object).await.map(ApiResponse::ok))
}

pub async fn reset(org: &MockOrg) -> ApiResponse {
    let summary = org.reset().await;
    ApiResponse::ok(json!({
        "status": "reset",
        "recordsCleared": summary.records_cleared,
        "bulkJobsCleared": summary.bulk_jobs_cleared,
        "eventsCleared": summary.events_cleared,
        "clientsCleared": summary.clients_cleared,
    }))
}

pub fn schemas(org: &MockOrg) -> ApiResponse {
    ApiResponse::ok(org.schemas_json())
}

pub async fn bulk_jobs(org: &MockOrg) -> ApiResponse {
    ApiResponse::ok(org.bulk_jobs_json().await)
}

pub async fn events(org: &MockOrg) -> ApiResponse {
    ApiResponse::ok(org.bus().all_events().await)
}

pub async fn streaming_clients(org: &MockOrg) -> ApiResponse {
    ApiResponse::ok(org.bus().clients().await)
}

pub async fn health(org: &MockOrg) -> ApiResponse {
    ApiResponse::ok(org.health().await)
}

/// Liveness probe without any counting.
pub fn liveness() -> ApiResponse {
    ApiResponse::ok(json!({ "status": "healthy" }))
}

pub fn index(base: &str, version: &str) -> ApiResponse {
    let base = base.trim_end_matches('/');
    let bare = version.trim_start_matches('v');
    ApiResponse::ok(json!({
        "service": "sfmock",
        "status": "UP",
        "endpoints": {
            "health": format!("{}/health", base),
            "oauth_token": format!("{}/services/oauth2/token", base),
            "rest_api": format!("{}/services/data/v{}/sobjects/{{Object}}", base, bare),
            "soql_query": format!("{}/services/data/v{}/query?q=SELECT+Id+FROM+Account", base, bare),
            "bulk_v2_ingest": format!("{}/services/data/v{}/jobs/ingest", base, bare),
            "bulk_v2_query": format!("{}/services/data/v{}/jobs/query", base, bare),
            "bulk_v1": format!("{}/services/async/{}/job", base, bare),
            "cometd": format!("{}/cometd/{}", base, bare),
            "admin_db": format!("{}/__admin/db", base),
            "admin_schemas": format!("{}/__admin/schemas", base),
            "admin_reset": format!("{}/__admin/reset", base),
            "admin_bulk_jobs": format!("{}/__admin/bulk-jobs", base),
        },
    }))
}

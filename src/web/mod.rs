//! HTTP adapter: maps the platform's URL layout onto the `api` handlers.

use crate::api::{self, ApiBody, ApiResponse, CONTENT_JSON};
use crate::facade::MockOrg;
use axum::Router;
use axum::body::{Body, Bytes};
use axum::extract::{DefaultBodyLimit, Path, Query, State};
use axum::http::header::CONTENT_TYPE;
use axum::http::{HeaderName, HeaderValue, Method, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::routing::{MethodRouter, get, post};
use std::collections::HashMap;
use std::sync::Arc;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;
use tracing::warn;

pub type AppState = Arc<MockOrg>;

/// Bulk uploads are capped at 150 MB like the platform's own limit.
const MAX_BODY_BYTES: usize = 150 * 1024 * 1024;

impl IntoResponse for ApiResponse {
    fn into_response(self) -> Response {
        let (content_type, body) = match self.body {
            ApiBody::Empty => (None, Body::empty()),
            ApiBody::Json(json) => (
                Some(HeaderValue::from_static(CONTENT_JSON)),
                Body::from(json.to_string()),
            ),
            ApiBody::Text { content_type, text } => {
                (Some(HeaderValue::from_static(content_type)), Body::from(text))
            }
            ApiBody::Binary { content_type, bytes } => {
                let content_type = HeaderValue::from_str(&content_type).unwrap_or_else(|_| {
                    warn!(content_type = %content_type, "stored content type is not a valid header");
                    HeaderValue::from_static("application/octet-stream")
                });
                (Some(content_type), Body::from(bytes))
            }
        };

        let mut response = Response::new(body);
        *response.status_mut() = self.status;
        let headers = response.headers_mut();
        if let Some(content_type) = content_type {
            headers.insert(CONTENT_TYPE, content_type);
        }
        for (name, value) in self.headers {
            match (
                HeaderName::from_bytes(name.as_bytes()),
                HeaderValue::from_str(&value),
            ) {
                (Ok(name), Ok(value)) => {
                    headers.insert(name, value);
                }
                _ => warn!(header = name, "dropping unrepresentable response header"),
            }
        }
        response
    }
}

/// Build the full router over one shared org.
pub fn build_router(org: AppState) -> Router {
    Router::new()
        .route("/", json_only(get(index)))
        .route("/health", json_only(get(health)))
        .route("/services/oauth2/token", json_only(post(oauth_token).get(oauth_token)))
        .nest("/services/data/:version", data_routes())
        .nest("/services/async/:version", legacy_bulk_routes())
        .route("/cometd/:version", json_only(post(cometd)))
        .nest("/__admin", admin_routes())
        .fallback(not_found)
        .layer(DefaultBodyLimit::max(MAX_BODY_BYTES))
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
        .with_state(org)
}

fn data_routes() -> Router<AppState> {
    Router::new()
        .route("/query", json_only(get(soql_query)))
        .route("/search", json_only(get(sosl_search)))
        .route("/limits", json_only(get(limits)))
        .route("/sobjects/:object", json_only(post(create_record)))
        .route("/sobjects/:object/describe", json_only(get(describe)))
        .route(
            "/sobjects/:object/:id",
            json_only(get(get_record).patch(update_record).delete(delete_record)),
        )
        // GET is a binary download (`/sobjects/Attachment/:id/Body`), PATCH an upsert.
        .route(
            "/sobjects/:object/:ext_field/:ext_value",
            json_only(get(download_content).patch(upsert_record)),
        )
        .route("/wave/datasets", json_only(get(wave_datasets)))
        .route("/wave/datasets/:dataset_id", json_only(get(wave_dataset)))
        .route(
            "/wave/datasets/:dataset_id/versions",
            json_only(get(wave_dataset_versions)),
        )
        .route("/wave/query", json_only(post(wave_query)))
        .route(
            "/jobs/ingest",
            json_only(get(list_ingest_jobs).post(create_ingest_job)),
        )
        .route(
            "/jobs/ingest/:job_id",
            json_only(
                get(get_ingest_job)
                    .patch(set_ingest_state)
                    .delete(delete_ingest_job),
            ),
        )
        .route(
            "/jobs/ingest/:job_id/batches",
            json_only(axum::routing::put(upload_batch)),
        )
        .route(
            "/jobs/ingest/:job_id/successfulResults",
            json_only(get(successful_results)),
        )
        .route("/jobs/ingest/:job_id/failedResults", json_only(get(failed_results)))
        .route(
            "/jobs/ingest/:job_id/unprocessedrecords",
            json_only(get(unprocessed_records)),
        )
        .route(
            "/jobs/query",
            json_only(get(list_query_jobs).post(create_query_job)),
        )
        .route(
            "/jobs/query/:job_id",
            json_only(
                get(get_query_job)
                    .patch(set_query_state)
                    .delete(delete_query_job),
            ),
        )
        .route("/jobs/query/:job_id/results", json_only(get(query_results)))
}

fn legacy_bulk_routes() -> Router<AppState> {
    Router::new()
        .route("/job", xml_only(post(v1_create_job)))
        .route("/job/:job_id", xml_only(get(v1_get_job).post(v1_update_job)))
        .route(
            "/job/:job_id/batch",
            xml_only(get(v1_list_batches).post(v1_add_batch)),
        )
        .route("/job/:job_id/batch/:batch_id", xml_only(get(v1_get_batch)))
        .route(
            "/job/:job_id/batch/:batch_id/result",
            xml_only(get(v1_batch_results)),
        )
}

fn admin_routes() -> Router<AppState> {
    Router::new()
        .route("/db", json_only(get(admin_db)))
        .route("/db/:object", json_only(get(admin_db_object)))
        .route("/reset", json_only(post(admin_reset)))
        .route("/schemas", json_only(get(admin_schemas)))
        .route("/bulk-jobs", json_only(get(admin_bulk_jobs)))
        .route("/events", json_only(get(admin_events)))
        .route("/streaming-clients", json_only(get(admin_streaming_clients)))
        .route("/health", json_only(get(admin_health)))
}

fn json_only(route: MethodRouter<AppState>) -> MethodRouter<AppState> {
    route.fallback(|method: Method| async move { ApiResponse::method_not_allowed(method.as_str()) })
}

fn xml_only(route: MethodRouter<AppState>) -> MethodRouter<AppState> {
    route.fallback(|method: Method| async move { api::bulk_v1::method_not_allowed(method.as_str()) })
}

async fn not_found(method: Method, uri: axum::http::Uri) -> ApiResponse {
    ApiResponse::json(
        StatusCode::NOT_FOUND,
        crate::core::format_error(
            crate::core::ErrorCode::NotFound,
            Some(&format!("No resource for {} {}", method, uri.path())),
            &[],
        ),
    )
}

type Params = Query<HashMap<String, String>>;

async fn index(State(org): State<AppState>) -> ApiResponse {
    let settings = org.settings();
    api::admin::index(&settings.instance_url, &settings.api_version)
}

async fn health(State(org): State<AppState>) -> ApiResponse {
    api::admin::health(&org).await
}

async fn oauth_token(State(org): State<AppState>) -> ApiResponse {
    api::rest::oauth_token(&org)
}

async fn limits(Path(_version): Path<String>) -> ApiResponse {
    api::rest::limits()
}

async fn soql_query(
    State(org): State<AppState>,
    Path(version): Path<String>,
    Query(params): Params,
) -> ApiResponse {
    api::rest::query(&org, &version, params.get("q").map(String::as_str)).await
}

async fn sosl_search(
    State(org): State<AppState>,
    Path(version): Path<String>,
    Query(params): Params,
) -> ApiResponse {
    api::rest::search(&org, &version, params.get("q").map(String::as_str)).await
}

async fn describe(
    State(org): State<AppState>,
    Path((version, object)): Path<(String, String)>,
) -> ApiResponse {
    api::rest::describe(&org, &version, &object)
}

async fn create_record(
    State(org): State<AppState>,
    Path((_version, object)): Path<(String, String)>,
    body: Bytes,
) -> ApiResponse {
    api::rest::create(&org, &object, &body).await
}

async fn get_record(
    State(org): State<AppState>,
    Path((version, object, id)): Path<(String, String, String)>,
) -> ApiResponse {
    api::rest::get(&org, &version, &object, &id).await
}

async fn update_record(
    State(org): State<AppState>,
    Path((_version, object, id)): Path<(String, String, String)>,
    body: Bytes,
) -> ApiResponse {
    api::rest::update(&org, &object, &id, &body).await
}

async fn delete_record(
    State(org): State<AppState>,
    Path((_version, object, id)): Path<(String, String, String)>,
) -> ApiResponse {
    api::rest::delete(&org, &object, &id).await
}

async fn upsert_record(
    State(org): State<AppState>,
    Path((_version, object, ext_field, ext_value)): Path<(String, String, String, String)>,
    body: Bytes,
) -> ApiResponse {
    api::rest::upsert(&org, &object, &ext_field, &ext_value, &body).await
}

async fn download_content(
    State(org): State<AppState>,
    Path((_version, object, id, field)): Path<(String, String, String, String)>,
) -> ApiResponse {
    api::rest::download(&org, &object, &id, &field).await
}

async fn wave_datasets(State(org): State<AppState>, Path(version): Path<String>) -> ApiResponse {
    api::wave::list_datasets(&org, &version).await
}

async fn wave_dataset(
    State(org): State<AppState>,
    Path((version, dataset_id)): Path<(String, String)>,
) -> ApiResponse {
    api::wave::get_dataset(&org, &version, &dataset_id).await
}

async fn wave_dataset_versions(
    State(org): State<AppState>,
    Path((version, dataset_id)): Path<(String, String)>,
) -> ApiResponse {
    api::wave::dataset_versions(&org, &version, &dataset_id).await
}

async fn wave_query(
    State(org): State<AppState>,
    Path(_version): Path<String>,
    body: Bytes,
) -> ApiResponse {
    api::wave::query(&org, &body).await
}

async fn list_ingest_jobs(State(org): State<AppState>, Path(_version): Path<String>) -> ApiResponse {
    api::bulk_v2::list_ingest_jobs(&org).await
}

async fn create_ingest_job(
    State(org): State<AppState>,
    Path(_version): Path<String>,
    body: Bytes,
) -> ApiResponse {
    api::bulk_v2::create_ingest_job(&org, &body).await
}

async fn get_ingest_job(
    State(org): State<AppState>,
    Path((_version, job_id)): Path<(String, String)>,
) -> ApiResponse {
    api::bulk_v2::get_ingest_job(&org, &job_id).await
}

async fn set_ingest_state(
    State(org): State<AppState>,
    Path((_version, job_id)): Path<(String, String)>,
    body: Bytes,
) -> ApiResponse {
    api::bulk_v2::set_ingest_state(&org, &job_id, &body).await
}

async fn delete_ingest_job(
    State(org): State<AppState>,
    Path((_version, job_id)): Path<(String, String)>,
) -> ApiResponse {
    api::bulk_v2::delete_ingest_job(&org, &job_id).await
}

async fn upload_batch(
    State(org): State<AppState>,
    Path((_version, job_id)): Path<(String, String)>,
    body: String,
) -> ApiResponse {
    api::bulk_v2::upload_batch(&org, &job_id, &body).await
}

async fn successful_results(
    State(org): State<AppState>,
    Path((_version, job_id)): Path<(String, String)>,
) -> ApiResponse {
    api::bulk_v2::successful_results(&org, &job_id).await
}

async fn failed_results(
    State(org): State<AppState>,
    Path((_version, job_id)): Path<(String, String)>,
) -> ApiResponse {
    api::bulk_v2::failed_results(&org, &job_id).await
}

async fn unprocessed_records(
    State(org): State<AppState>,
    Path((_version, job_id)): Path<(String, String)>,
) -> ApiResponse {
    api::bulk_v2::unprocessed_records(&org, &job_id).await
}

async fn list_query_jobs(State(org): State<AppState>, Path(_version): Path<String>) -> ApiResponse {
    api::bulk_v2::list_query_jobs(&org).await
}

async fn create_query_job(
    State(org): State<AppState>,
    Path(_version): Path<String>,
    body: Bytes,
) -> ApiResponse {
    api::bulk_v2::create_query_job(&org, &body).await
}

async fn get_query_job(
    State(org): State<AppState>,
    Path((_version, job_id)): Path<(String, String)>,
) -> ApiResponse {
    api::bulk_v2::get_query_job(&org, &job_id).await
}

async fn set_query_state(
    State(org): State<AppState>,
    Path((_version, job_id)): Path<(String, String)>,
    body: Bytes,
) -> ApiResponse {
    api::bulk_v2::set_query_state(&org, &job_id, &body).await
}

async fn delete_query_job(
    State(org): State<AppState>,
    Path((_version, job_id)): Path<(String, String)>,
) -> ApiResponse {
    api::bulk_v2::delete_query_job(&org, &job_id).await
}

async fn query_results(
    State(org): State<AppState>,
    Path((_version, job_id)): Path<(String, String)>,
) -> ApiResponse {
    api::bulk_v2::query_results(&org, &job_id).await
}

async fn v1_create_job(
    State(org): State<AppState>,
    Path(_version): Path<String>,
    body: String,
) -> ApiResponse {
    api::bulk_v1::create_job(&org, &body).await
}

async fn v1_get_job(
    State(org): State<AppState>,
    Path((_version, job_id)): Path<(String, String)>,
) -> ApiResponse {
    api::bulk_v1::get_job(&org, &job_id).await
}

async fn v1_update_job(
    State(org): State<AppState>,
    Path((_version, job_id)): Path<(String, String)>,
    body: String,
) -> ApiResponse {
    api::bulk_v1::update_job(&org, &job_id, &body).await
}

async fn v1_list_batches(
    State(org): State<AppState>,
    Path((_version, job_id)): Path<(String, String)>,
) -> ApiResponse {
    api::bulk_v1::list_batches(&org, &job_id).await
}

async fn v1_add_batch(
    State(org): State<AppState>,
    Path((_version, job_id)): Path<(String, String)>,
    body: String,
) -> ApiResponse {
    api::bulk_v1::add_batch(&org, &job_id, &body).await
}

async fn v1_get_batch(
    State(org): State<AppState>,
    Path((_version, job_id, batch_id)): Path<(String, String, String)>,
) -> ApiResponse {
    api::bulk_v1::get_batch(&org, &job_id, &batch_id).await
}

async fn v1_batch_results(
    State(org): State<AppState>,
    Path((_version, job_id, batch_id)): Path<(String, String, String)>,
) -> ApiResponse {
    api::bulk_v1::batch_results(&org, &job_id, &batch_id).await
}

async fn cometd(
    State(org): State<AppState>,
    Path(_version): Path<String>,
    body: Bytes,
) -> ApiResponse {
    api::streaming::cometd(&org, &body).await
}

async fn admin_db(State(org): State<AppState>) -> ApiResponse {
    api::admin::dump_all(&org).await
}

async fn admin_db_object(State(org): State<AppState>, Path(object): Path<String>) -> ApiResponse {
    api::admin::dump_object(&org, &object).await
}

async fn admin_reset(State(org): State<AppState>) -> ApiResponse {
    api::admin::reset(&org).await
}

async fn admin_schemas(State(org): State<AppState>) -> ApiResponse {
    api::admin::schemas(&org)
}

async fn admin_bulk_jobs(State(org): State<AppState>) -> ApiResponse {
    api::admin::bulk_jobs(&org).await
}

async fn admin_events(State(org): State<AppState>) -> ApiResponse {
    api::admin::events(&org).await
}

async fn admin_streaming_clients(State(org): State<AppState>) -> ApiResponse {
    api::admin::streaming_clients(&org).await
}

async fn admin_health() -> ApiResponse {
    api::admin::liveness()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::Catalog;
    use axum::http::Request;
    use http_body_util::BodyExt;
    use tower::ServiceExt;

    fn app() -> Router {
        build_router(Arc::new(MockOrg::new(Catalog::new())))
    }

    #[tokio::test]
    async fn test_unknown_path_is_json_not_found() {
        let response = app()
            .oneshot(Request::get("/nowhere").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::NOT_FOUND);
        let bytes = response.into_body().collect().await.unwrap().to_bytes();
        let body: serde_json::Value = serde_json::from_slice(&bytes).unwrap();
        assert_eq!(body[0]["errorCode"], "NOT_FOUND");
    }

    #[tokio::test]
    async fn test_wrong_method_is_405() {
        let response = app()
            .oneshot(
                Request::delete("/services/data/v59.0/query")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::METHOD_NOT_ALLOWED);
    }

    #[test]
    fn test_extra_headers_are_copied() {
        let response = ApiResponse::text(StatusCode::OK, "text/csv", "a\n")
            .with_header("Sforce-Locator", "null")
            .into_response();
        assert_eq!(response.headers()["sforce-locator"], "null");
        assert_eq!(response.headers()[CONTENT_TYPE], "text/csv");
    }
}

use axum::Router;
use axum::body::Body;
use axum::http::{Method, Request, StatusCode, header};
use http_body_util::BodyExt;
use serde_json::{Value, json};
use sfmock::{Catalog, FieldDef, MockOrg, Schema, build_router};
use std::sync::Arc;
use tower::ServiceExt;

fn app() -> Router {
    let catalog = Catalog::new().with_schema(
        Schema::builder("Account", "001")
            .field("Name", FieldDef::string(40).required())
            .field("Rating", FieldDef::picklist(["Hot", "Warm", "Cold"]))
            .build(),
    );
    build_router(Arc::new(MockOrg::new(catalog)))
}

fn request(method: Method, uri: &str, content_type: &str, body: impl Into<Body>) -> Request<Body> {
    Request::builder()
        .method(method)
        .uri(uri)
        .header(header::CONTENT_TYPE, content_type)
        .body(body.into())
        .unwrap()
}

fn json_request(method: Method, uri: &str, body: Value) -> Request<Body> {
    request(method, uri, "application/json", body.to_string())
}

fn get(uri: &str) -> Request<Body> {
    Request::get(uri).body(Body::empty()).unwrap()
}

async fn send(app: &Router, request: Request<Body>) -> (StatusCode, String) {
    let response = app.clone().oneshot(request).await.unwrap();
    let status = response.status();
    let bytes = response.into_body().collect().await.unwrap().to_bytes();
    (status, String::from_utf8(bytes.to_vec()).unwrap())
}

async fn send_json(app: &Router, request: Request<Body>) -> (StatusCode, Value) {
    let (status, text) = send(app, request).await;
    let body = if text.is_empty() {
        Value::Null
    } else {
        serde_json::from_str(&text).unwrap()
    };
    (status, body)
}

#[tokio::test]
async fn rest_crud_lifecycle() {
    let app = app();
    let base = "/services/data/v59.0/sobjects/Account";

    let (status, created) = send_json(&app, json_request(Method::POST, base, json!({"Name": "Acme"}))).await;
    assert_eq!(status, StatusCode::CREATED);
    assert_eq!(created["success"], true);
    let id = created["id"].as_str().unwrap().to_string();

    let (status, record) = send_json(&app, get(&format!("{}/{}", base, id))).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(record["Name"], "Acme");
    assert_eq!(record["attributes"]["type"], "Account");

    let (status, _) = send(
        &app,
        json_request(Method::PATCH, &format!("{}/{}", base, id), json!({"Rating": "Hot"})),
    )
    .await;
    assert_eq!(status, StatusCode::NO_CONTENT);

    let (_, found) = send_json(
        &app,
        get("/services/data/v59.0/query?q=SELECT+Id,Rating+FROM+Account+WHERE+Rating+=+'Hot'"),
    )
    .await;
    assert_eq!(found["totalSize"], 1);

    let delete = Request::delete(format!("{}/{}", base, id)).body(Body::empty()).unwrap();
    let (status, _) = send(&app, delete).await;
    assert_eq!(status, StatusCode::NO_CONTENT);

    let delete = Request::delete(format!("{}/{}", base, id)).body(Body::empty()).unwrap();
    let (status, body) = send_json(&app, delete).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(body[0]["errorCode"], "ENTITY_IS_DELETED");
}

#[tokio::test]
async fn errors_are_always_arrays() {
    let app = app();
    let (status, body) = send_json(
        &app,
        json_request(
            Method::POST,
            "/services/data/v59.0/sobjects/Account",
            json!({"Rating": "Tepid"}),
        ),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    let codes: Vec<&str> = body
        .as_array()
        .unwrap()
        .iter()
        .map(|e| e["errorCode"].as_str().unwrap())
        .collect();
    assert!(codes.contains(&"REQUIRED_FIELD_MISSING"));
    assert!(codes.contains(&"INVALID_OR_NULL_FOR_RESTRICTED_PICKLIST"));

    let (status, body) = send_json(&app, get("/services/data/v59.0/sobjects/Nope/describe")).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert!(body.is_array());
}

#[tokio::test]
async fn describe_lists_fields_with_picklist_values() {
    let app = app();
    let (status, body) = send_json(&app, get("/services/data/v59.0/sobjects/Account/describe")).await;
    assert_eq!(status, StatusCode::OK);
    let fields = body["fields"].as_array().unwrap();
    assert_eq!(fields[0]["name"], "Id");
    let rating = fields.iter().find(|f| f["name"] == "Rating").unwrap();
    assert_eq!(rating["picklistValues"].as_array().unwrap().len(), 3);
}

#[tokio::test]
async fn bulk_v2_ingest_over_http() {
    let app = app();
    let (status, job) = send_json(
        &app,
        json_request(
            Method::POST,
            "/services/data/v59.0/jobs/ingest",
            json!({"object": "Account", "operation": "insert", "contentType": "CSV"}),
        ),
    )
    .await;
    assert_eq!(status, StatusCode::CREATED);
    let id = job["id"].as_str().unwrap().to_string();
    let job_url = format!("/services/data/v59.0/jobs/ingest/{}", id);

    let (status, _) = send(
        &app,
        request(Method::PUT, &format!("{}/batches", job_url), "text/csv", "Name\nAcme\n,\nGlobex\n"),
    )
    .await;
    assert_eq!(status, StatusCode::CREATED);

    let (status, info) = send_json(
        &app,
        json_request(Method::PATCH, &job_url, json!({"state": "UploadComplete"})),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(info["state"], "JobComplete");
    assert_eq!(info["numberRecordsProcessed"], 2);

    let (status, csv) = send(&app, get(&format!("{}/successfulResults", job_url))).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(csv.lines().count(), 3);

    let (status, _) = send(
        &app,
        request(Method::PUT, &format!("{}/batches", job_url), "text/csv", "Name\nLate\n"),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn bulk_v2_query_results_carry_locator_headers() {
    let app = app();
    send(
        &app,
        json_request(Method::POST, "/services/data/v59.0/sobjects/Account", json!({"Name": "Acme"})),
    )
    .await;

    let (status, job) = send_json(
        &app,
        json_request(
            Method::POST,
            "/services/data/v59.0/jobs/query",
            json!({"operation": "query", "query": "SELECT Id, Name FROM Account"}),
        ),
    )
    .await;
    assert_eq!(status, StatusCode::CREATED);
    assert_eq!(job["state"], "JobComplete");
    let id = job["id"].as_str().unwrap();

    let response = app
        .clone()
        .oneshot(get(&format!("/services/data/v59.0/jobs/query/{}/results", id)))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(response.headers()["sforce-locator"], "null");
    assert_eq!(response.headers()["sforce-numberofrecords"], "1");
    let bytes = response.into_body().collect().await.unwrap().to_bytes();
    let text = String::from_utf8(bytes.to_vec()).unwrap();
    assert!(text.starts_with("Id,Name\n"));
    assert!(text.contains("Acme"));
}

#[tokio::test]
async fn bulk_v1_job_round_trip_in_xml() {
    let app = app();
    let job_xml = "<?xml version=\"1.0\" encoding=\"UTF-8\"?>\
        <jobInfo xmlns=\"http://www.force.com/2009/06/asyncapi/dataload\">\
        <operation>insert</operation><object>Account</object>\
        <contentType>CSV</contentType></jobInfo>";
    let (status, body) = send(
        &app,
        request(Method::POST, "/services/async/59.0/job", "application/xml", job_xml),
    )
    .await;
    assert_eq!(status, StatusCode::CREATED);
    let job_id = extract(&body, "id");

    let (status, body) = send(
        &app,
        request(
            Method::POST,
            &format!("/services/async/59.0/job/{}/batch", job_id),
            "text/csv",
            "Name\nAcme\nThisNameIsFarTooLongForTheFortyCharacterLimit\n",
        ),
    )
    .await;
    assert_eq!(status, StatusCode::CREATED);
    assert!(body.contains("<state>Completed</state>"));
    let batch_id = extract(&body, "id");

    let (status, results) = send(
        &app,
        get(&format!("/services/async/59.0/job/{}/batch/{}/result", job_id, batch_id)),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert!(results.starts_with("\"Id\",\"Success\",\"Created\",\"Error\""));
    assert!(results.contains("STRING_TOO_LONG"));

    let (status, body) = send(&app, get("/services/async/59.0/job/750000000000000XYZ")).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert!(body.contains("<exceptionCode>InvalidJob</exceptionCode>"));
}

#[tokio::test]
async fn cometd_handshake_and_admin_views() {
    let app = app();
    let (status, reply) = send_json(
        &app,
        json_request(
            Method::POST,
            "/cometd/59.0",
            json!([{"channel": "/meta/handshake", "version": "1.0"}]),
        ),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(reply[0]["successful"], true);

    let (status, clients) = send_json(&app, get("/__admin/streaming-clients")).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(clients["count"], 1);

    let (status, health) = send_json(&app, get("/health")).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(health["status"], "UP");
    assert_eq!(health["streamingClients"], 1);

    let (status, reset) = send_json(&app, Request::post("/__admin/reset").body(Body::empty()).unwrap()).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(reset["clientsCleared"], 1);
}

#[tokio::test]
async fn oauth_and_limits_are_mocked() {
    let app = app();
    let (status, token) = send_json(
        &app,
        request(
            Method::POST,
            "/services/oauth2/token",
            "application/x-www-form-urlencoded",
            "grant_type=password&client_id=x&client_secret=y",
        ),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(token["token_type"], "Bearer");
    assert!(token["access_token"].as_str().unwrap().starts_with("00D"));

    let (status, limits) = send_json(&app, get("/services/data/v59.0/limits")).await;
    assert_eq!(status, StatusCode::OK);
    assert!(limits["DailyApiRequests"]["Max"].is_number());
}

fn extract(xml: &str, tag: &str) -> String {
    let open = format!("<{}>", tag);
    let start = xml.find(&open).unwrap() + open.len();
    let end = xml[start..].find(&format!("</{}>", tag)).unwrap() + start;
    xml[start..end].to_string()
}

use axum::Router;
use axum::body::Body;
use axum::http::{Method, Request, StatusCode, header};
use http_body_util::BodyExt;
use serde_json::{Value, json};
use sfmock::{Catalog, FieldDef, FieldType, MockOrg, Schema, build_router};
use std::sync::Arc;
use tower::ServiceExt;

fn app() -> Router {
    let catalog = Catalog::new().with_schema(
        Schema::builder("Attachment", "00P")
            .field("Name", FieldDef::string(255).required())
            .field("ParentId", FieldDef::new(FieldType::Reference))
            .field("Body", FieldDef::new(FieldType::from("base64")))
            .field("ContentType", FieldDef::string(120))
            .build(),
    );
    build_router(Arc::new(MockOrg::new(catalog)))
}

fn json_request(method: Method, uri: &str, body: Value) -> Request<Body> {
    Request::builder()
        .method(method)
        .uri(uri)
        .header(header::CONTENT_TYPE, "application/json")
        .body(Body::from(body.to_string()))
        .unwrap()
}

fn get(uri: &str) -> Request<Body> {
    Request::get(uri).body(Body::empty()).unwrap()
}

async fn send_json(app: &Router, request: Request<Body>) -> (StatusCode, Value) {
    let response = app.clone().oneshot(request).await.unwrap();
    let status = response.status();
    let bytes = response.into_body().collect().await.unwrap().to_bytes();
    (status, serde_json::from_slice(&bytes).unwrap())
}

#[tokio::test]
async fn wave_datasets_are_listed_with_versions() {
    let app = app();
    let (status, list) = send_json(&app, get("/services/data/v59.0/wave/datasets")).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(list["totalSize"], 2);
    assert_eq!(list["url"], "/services/data/v59.0/wave/datasets");
    assert_eq!(list["datasets"][0]["name"], "SalesPipeline");
    assert!(list["datasets"][0].get("rows").is_none());

    let (status, versions) = send_json(
        &app,
        get("/services/data/v59.0/wave/datasets/0FbMETRICS000001/versions"),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(versions["versions"][0]["id"], "0FcMETRICSV00001");
    assert_eq!(versions["versions"][0]["totalRowCount"], 3);

    let (status, missing) = send_json(&app, get("/services/data/v59.0/wave/datasets/0FbNOPE")).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(missing[0]["errorCode"], "NOT_FOUND");
}

#[tokio::test]
async fn saql_query_groups_and_limits() {
    let app = app();
    let saql = r#"q = load "0FbSALES00000001/0FcSALESV0000001";
        q = group q by 'Region';
        q = foreach q generate 'Region', sum('Amount') as 'Total', count() as 'Deals';
        q = order q by 'Total' desc;
        q = limit q 2;"#;
    let (status, body) = send_json(
        &app,
        json_request(Method::POST, "/services/data/v59.0/wave/query", json!({ "query": saql })),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["query"], saql);
    let records = body["results"]["records"].as_array().unwrap();
    assert_eq!(records.len(), 2);
    // Tied totals keep first-seen group order.
    assert_eq!(records[0], json!({"Region": "West", "Total": 170000, "Deals": 2}));
    assert_eq!(records[1], json!({"Region": "East", "Total": 170000, "Deals": 2}));
    assert_eq!(body["results"]["metadata"][1], json!({"lineageId": "Total", "type": "numeric"}));

    let (status, error) = send_json(
        &app,
        json_request(
            Method::POST,
            "/services/data/v59.0/wave/query",
            json!({ "query": "q = load \"SalesPipeline\"; q = filter q by Amount > 1;" }),
        ),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(error[0]["errorCode"], "MALFORMED_QUERY");
}

#[tokio::test]
async fn attachment_body_downloads_as_raw_bytes() {
    let app = app();
    let (status, created) = send_json(
        &app,
        json_request(
            Method::POST,
            "/services/data/v59.0/sobjects/Attachment",
            json!({"Name": "test.txt", "Body": "SGVsbG8=", "ContentType": "text/plain"}),
        ),
    )
    .await;
    assert_eq!(status, StatusCode::CREATED);
    let id = created["id"].as_str().unwrap();

    let response = app
        .clone()
        .oneshot(get(&format!("/services/data/v59.0/sobjects/Attachment/{}/Body", id)))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(response.headers()[header::CONTENT_TYPE], "text/plain");
    assert_eq!(
        response.headers()[header::CONTENT_DISPOSITION],
        "attachment; filename=\"test.txt\""
    );
    let bytes = response.into_body().collect().await.unwrap().to_bytes();
    assert_eq!(&bytes[..], b"Hello");

    let (status, error) = send_json(
        &app,
        get("/services/data/v59.0/sobjects/Attachment/00Pmissing/Body"),
    )
    .await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(error[0]["errorCode"], "NOT_FOUND");

    let (status, _) = send_json(
        &app,
        get(&format!("/services/data/v59.0/sobjects/Attachment/{}/Name", id)),
    )
    .await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

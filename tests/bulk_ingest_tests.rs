use sfmock::bulk::IngestJobRequest;
use sfmock::bulk::csv::parse_csv;
use sfmock::{Catalog, FieldDef, MockError, MockOrg, Schema};

fn org() -> MockOrg {
    MockOrg::new(
        Catalog::new().with_schema(
            Schema::builder("Account", "001")
                .field("Name", FieldDef::string(10).required())
                .field("Code__c", FieldDef::string(20))
                .build(),
        ),
    )
}

fn request(operation: &str, external_id: Option<&str>) -> IngestJobRequest {
    IngestJobRequest {
        object: Some("Account".into()),
        operation: Some(operation.into()),
        external_id_field_name: external_id.map(str::to_string),
        ..Default::default()
    }
}

async fn open_job(org: &MockOrg, operation: &str, external_id: Option<&str>) -> String {
    let info = org
        .ingest()
        .create(request(operation, external_id))
        .await
        .unwrap();
    assert_eq!(info["state"], "Open");
    info["id"].as_str().unwrap().to_string()
}

#[tokio::test]
async fn one_failing_row_does_not_fail_the_job() {
    let org = org();
    let id = open_job(&org, "insert", None).await;
    let ingest = org.ingest();

    ingest
        .upload(&id, "Name\nAcme\nThisNameIsWayTooLong\nGlobex\n")
        .await
        .unwrap();
    let info = ingest.set_state(&id, "UploadComplete").await.unwrap();
    assert_eq!(info["state"], "JobComplete");
    assert_eq!(info["numberRecordsProcessed"], 2);
    assert_eq!(info["numberRecordsFailed"], 1);

    let failed = parse_csv(&ingest.failed_results(&id).await.unwrap());
    assert_eq!(failed.headers[..2], ["sf__Id".to_string(), "sf__Error".to_string()]);
    assert_eq!(failed.rows.len(), 1);
    assert!(failed.rows[0][1].starts_with("STRING_TOO_LONG:"));
    assert_eq!(failed.rows[0][2], "ThisNameIsWayTooLong");

    let succeeded = parse_csv(&ingest.successful_results(&id).await.unwrap());
    assert_eq!(succeeded.rows.len(), 2);
    assert!(succeeded.rows.iter().all(|row| row[1] == "true"));
    assert_eq!(org.store().count("Account").await.unwrap(), 2);
}

#[tokio::test]
async fn repeated_external_id_in_one_batch_creates_once() {
    let org = org();
    let id = open_job(&org, "upsert", Some("Code__c")).await;
    let ingest = org.ingest();

    ingest
        .upload(&id, "Code__c,Name\nX-1,First\nX-1,Second\n")
        .await
        .unwrap();
    let info = ingest.set_state(&id, "UploadComplete").await.unwrap();
    assert_eq!(info["numberRecordsProcessed"], 2);
    assert_eq!(info["numberRecordsFailed"], 0);

    let results = parse_csv(&ingest.successful_results(&id).await.unwrap());
    let created: Vec<&str> = results.rows.iter().map(|row| row[1].as_str()).collect();
    assert_eq!(created, vec!["true", "false"]);
    assert_eq!(results.rows[0][0], results.rows[1][0]);

    let stored = org.store().snapshot("Account").await.unwrap();
    assert_eq!(stored.len(), 1);
    assert_eq!(stored[0].get("Name").unwrap().to_string(), "Second");
}

#[tokio::test]
async fn uploads_after_close_are_rejected_and_buffer_is_kept() {
    let org = org();
    let id = open_job(&org, "insert", None).await;
    let ingest = org.ingest();

    ingest.upload(&id, "Name\nAcme\n").await.unwrap();
    ingest.set_state(&id, "Aborted").await.unwrap();

    let err = ingest.upload(&id, "Name\nGlobex\n").await.unwrap_err();
    assert!(matches!(err, MockError::InvalidState(_)));
    assert_eq!(ingest.unprocessed_records(&id).await.unwrap(), "Name\nAcme\n");
    assert_eq!(org.store().count("Account").await.unwrap(), 0);
}

#[tokio::test]
async fn multi_part_upload_processes_every_chunk() {
    let org = org();
    let id = open_job(&org, "insert", None).await;
    let ingest = org.ingest();

    ingest.upload(&id, "Name\nAcme\n").await.unwrap();
    ingest.upload(&id, "Name\nGlobex\n").await.unwrap();
    let info = ingest.set_state(&id, "UploadComplete").await.unwrap();
    assert_eq!(info["numberRecordsProcessed"], 2);

    let err = ingest.set_state(&id, "Aborted").await.unwrap_err();
    assert!(matches!(err, MockError::InvalidState(_)));
}

#[tokio::test]
async fn results_require_a_finished_job() {
    let org = org();
    let id = open_job(&org, "insert", None).await;
    let err = org.ingest().successful_results(&id).await.unwrap_err();
    assert!(matches!(err, MockError::InvalidState(_)));
}

#[tokio::test]
async fn abort_queued_behind_close_wins_and_stores_nothing() {
    let org = std::sync::Arc::new(org());
    let id = open_job(&org, "insert", None).await;
    org.ingest().upload(&id, "Name\nAcme\n").await.unwrap();

    let handle = org.jobs().get(&id).await.unwrap();
    let guard = handle.write().await;

    let close = {
        let (org, id) = (org.clone(), id.clone());
        tokio::spawn(async move { org.ingest().set_state(&id, "UploadComplete").await })
    };
    tokio::time::sleep(std::time::Duration::from_millis(10)).await;
    let abort = {
        let (org, id) = (org.clone(), id.clone());
        tokio::spawn(async move { org.ingest().set_state(&id, "Aborted").await })
    };
    tokio::time::sleep(std::time::Duration::from_millis(10)).await;
    drop(guard);

    let _ = close.await.unwrap();
    let aborted = abort.await.unwrap().unwrap();
    assert_eq!(aborted["state"], "Aborted");

    let info = org.ingest().get(&id).await.unwrap();
    assert_eq!(info["state"], "Aborted");
    assert_eq!(info["numberRecordsProcessed"], 0);
    assert_eq!(org.store().count("Account").await.unwrap(), 0);
}

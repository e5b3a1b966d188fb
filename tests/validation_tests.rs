use serde_json::json;
use sfmock::core::ErrorCode;
use sfmock::validation::{ValidationMode, validate};
use sfmock::{Catalog, FieldDef, MockError, MockOrg, Record, Schema};

fn account() -> Schema {
    Schema::builder("Account", "001")
        .field("Name", FieldDef::string(10).required())
        .field("Rating", FieldDef::picklist(["Hot", "Warm", "Cold"]))
        .build()
}

fn record(json: serde_json::Value) -> Record {
    Record::from_json(json).unwrap()
}

#[test]
fn long_name_is_too_long_and_missing_name_is_required() {
    let schema = account();

    let errors = validate(
        &record(json!({"Name": "VeryLongNameHere"})),
        &schema,
        ValidationMode::Create,
    );
    assert_eq!(errors.len(), 1);
    assert_eq!(errors[0].code, ErrorCode::StringTooLong);

    let errors = validate(&record(json!({})), &schema, ValidationMode::Create);
    assert_eq!(errors.len(), 1);
    assert_eq!(errors[0].code, ErrorCode::RequiredFieldMissing);
    assert_eq!(errors[0].field, "Name");
}

#[test]
fn update_skips_required_checks_but_not_picklists() {
    let schema = account();
    assert!(validate(&record(json!({})), &schema, ValidationMode::Update).is_empty());

    let errors = validate(
        &record(json!({"Rating": "Lukewarm"})),
        &schema,
        ValidationMode::Update,
    );
    assert_eq!(errors.len(), 1);
    assert_eq!(errors[0].code, ErrorCode::InvalidOrNullForRestrictedPicklist);
}

#[tokio::test]
async fn rest_create_reports_every_violation() {
    let org = MockOrg::new(Catalog::new().with_schema(account()));
    let err = org
        .create_record("Account", json!({"Name": "VeryLongNameHere", "Rating": "Nope"}))
        .await
        .unwrap_err();
    let MockError::Validation(errors) = err else {
        panic!("expected validation failure, got {:?}", err);
    };
    assert_eq!(errors.len(), 2);
    assert_eq!(org.store().count("Account").await.unwrap(), 0);
}

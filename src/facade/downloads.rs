//! Binary content of Attachment, Document and ContentVersion records.
//!
//! The content is stored base64-encoded in a text field, the way it arrives
//! through REST create; downloads hand back the decoded bytes.

use super::org::MockOrg;
use crate::core::{MockError, Record, Result, Value};
use base64::Engine;
use base64::engine::general_purpose::STANDARD;
use tracing::info;

const DEFAULT_CONTENT_TYPE: &str = "application/octet-stream";

/// Objects with downloadable content and the field that holds it.
pub const BINARY_FIELDS: &[(&str, &str)] = &[
    ("Attachment", "Body"),
    ("Document", "Body"),
    ("ContentVersion", "VersionData"),
];

#[derive(Debug, Clone, PartialEq)]
pub struct Download {
    pub content_type: String,
    pub filename: String,
    pub bytes: Vec<u8>,
}

pub fn is_binary_field(object: &str, field: &str) -> bool {
    BINARY_FIELDS.iter().any(|(o, f)| *o == object && *f == field)
}

fn text<'r>(record: &'r Record, field: &str) -> Option<&'r str> {
    record.get(field).and_then(Value::as_str).filter(|s| !s.is_empty())
}

impl MockOrg {
    pub async fn download(&self, object: &str, id: &str, field: &str) -> Result<Download> {
        if !is_binary_field(object, field) {
            return Err(MockError::NotFound(format!(
                "{}.{} is not a downloadable field",
                object, field
            )));
        }
        let not_found = || MockError::NotFound(format!("{} record not found: {}", object, id));
        let handle = self.store().collection(object).map_err(|_| not_found())?;
        let collection = handle.read().await;
        let record = collection.find_by_id(id).ok_or_else(not_found)?;

        let encoded = text(record, field).ok_or_else(|| {
            MockError::NotFound(format!("{} record {} has no {} data", object, id, field))
        })?;
        // Clients often wrap long base64 values.
        let compact: String = encoded.chars().filter(|c| !c.is_whitespace()).collect();
        let bytes = STANDARD.decode(compact).map_err(|err| {
            MockError::InvalidField(format!("{} of {} is not valid base64: {}", field, id, err))
        })?;

        let content_type = text(record, "ContentType").unwrap_or(DEFAULT_CONTENT_TYPE);
        let filename = ["Name", "Title", "PathOnClient"]
            .iter()
            .find_map(|f| text(record, f))
            .unwrap_or("download");
        info!(object, id, field, bytes = bytes.len(), content_type, "binary content downloaded");

        Ok(Download {
            content_type: content_type.to_string(),
            filename: filename.to_string(),
            bytes,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::{FieldDef, FieldType, Schema};
    use crate::storage::Catalog;
    use serde_json::json;

    fn org() -> MockOrg {
        MockOrg::new(
            Catalog::new()
                .with_schema(
                    Schema::builder("Attachment", "00P")
                        .field("Name", FieldDef::string(255))
                        .field("Body", FieldDef::new(FieldType::from("base64")))
                        .field("ContentType", FieldDef::string(120))
                        .build(),
                )
                .with_schema(
                    Schema::builder("ContentVersion", "068")
                        .field("Title", FieldDef::string(255))
                        .field("VersionData", FieldDef::new(FieldType::from("base64")))
                        .build(),
                ),
        )
    }

    #[tokio::test]
    async fn test_download_decodes_body() {
        let org = org();
        let saved = org
            .create_record(
                "Attachment",
                json!({"Name": "hello.txt", "Body": "SGVsbG8=", "ContentType": "text/plain"}),
            )
            .await
            .unwrap();
        let download = org.download("Attachment", &saved.id, "Body").await.unwrap();
        assert_eq!(download.bytes, b"Hello");
        assert_eq!(download.content_type, "text/plain");
        assert_eq!(download.filename, "hello.txt");
    }

    #[tokio::test]
    async fn test_defaults_and_missing_content() {
        let org = org();
        let saved = org
            .create_record("ContentVersion", json!({"Title": "report", "VersionData": "AAEC"}))
            .await
            .unwrap();
        let download = org.download("ContentVersion", &saved.id, "VersionData").await.unwrap();
        assert_eq!(download.bytes, vec![0, 1, 2]);
        assert_eq!(download.content_type, DEFAULT_CONTENT_TYPE);
        assert_eq!(download.filename, "report");

        let empty = org.create_record("ContentVersion", json!({"Title": "x"})).await.unwrap();
        assert!(matches!(
            org.download("ContentVersion", &empty.id, "VersionData").await,
            Err(MockError::NotFound(_))
        ));
        assert!(matches!(
            org.download("Attachment", "00Pmissing", "Body").await,
            Err(MockError::NotFound(_))
        ));
        assert!(matches!(
            org.download("Document", "015x", "Body").await,
            Err(MockError::NotFound(_))
        ));
        assert!(matches!(
            org.download("ContentVersion", &saved.id, "Body").await,
            Err(MockError::NotFound(_))
        ));
    }
}

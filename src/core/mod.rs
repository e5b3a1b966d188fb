pub mod error;
pub mod id;
pub mod types;
pub mod value;

pub use error::{ErrorBody, ErrorCode, MockError, Result, ValidationError, format_error};
pub use id::generate_id;
pub use types::{FieldDef, FieldType, Record, Schema, SchemaBuilder, SYSTEM_FIELDS};
pub use value::Value;

/// ISO-8601 UTC timestamp with millisecond precision, the platform's wire format.
pub fn now_timestamp() -> String {
    chrono::Utc::now().to_rfc3339_opts(chrono::SecondsFormat::Millis, true)
}

use serde::Serialize;
use std::fmt;
use thiserror::Error;

/// Platform error codes as they appear in `errorCode` / `statusCode` fields.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ErrorCode {
    NotFound,
    RequiredFieldMissing,
    InvalidField,
    InvalidType,
    InvalidFieldForInsertUpdate,
    InvalidOrNullForRestrictedPicklist,
    StringTooLong,
    MalformedQuery,
    EntityIsDeleted,
    InvalidCrossReferenceKey,
    InvalidState,
    InvalidOperation,
    InvalidSessionId,
    MissingArgument,
    DuplicateValue,
    MethodNotAllowed,
    UnknownException,
}

impl ErrorCode {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::NotFound => "NOT_FOUND",
            Self::RequiredFieldMissing => "REQUIRED_FIELD_MISSING",
            Self::InvalidField => "INVALID_FIELD",
            Self::InvalidType => "INVALID_TYPE",
            Self::InvalidFieldForInsertUpdate => "INVALID_FIELD_FOR_INSERT_UPDATE",
            Self::InvalidOrNullForRestrictedPicklist => "INVALID_OR_NULL_FOR_RESTRICTED_PICKLIST",
            Self::StringTooLong => "STRING_TOO_LONG",
            Self::MalformedQuery => "MALFORMED_QUERY",
            Self::EntityIsDeleted => "ENTITY_IS_DELETED",
            Self::InvalidCrossReferenceKey => "INVALID_CROSS_REFERENCE_KEY",
            Self::InvalidState => "INVALID_STATE",
            Self::InvalidOperation => "INVALID_OPERATION",
            Self::InvalidSessionId => "INVALID_SESSION_ID",
            Self::MissingArgument => "MISSING_ARGUMENT",
            Self::DuplicateValue => "DUPLICATE_VALUE",
            Self::MethodNotAllowed => "METHOD_NOT_ALLOWED",
            Self::UnknownException => "UNKNOWN_EXCEPTION",
        }
    }

    /// Message used when a caller does not supply one.
    pub fn default_message(&self) -> &'static str {
        match self {
            Self::NotFound => "The requested resource does not exist",
            Self::RequiredFieldMissing => "Required fields are missing",
            Self::InvalidField => "Invalid field",
            Self::InvalidType => "Invalid type",
            Self::InvalidFieldForInsertUpdate => "Unable to create/update fields",
            Self::InvalidOrNullForRestrictedPicklist => {
                "Invalid value for restricted picklist field"
            }
            Self::StringTooLong => "Data value too large",
            Self::MalformedQuery => "SOQL query is malformed",
            Self::EntityIsDeleted => "Entity is deleted",
            Self::InvalidCrossReferenceKey => "Invalid cross reference key",
            Self::InvalidState => "Invalid state transition",
            Self::InvalidOperation => "Unsupported operation",
            Self::InvalidSessionId => "Session expired or invalid",
            Self::MissingArgument => "Required argument is missing",
            Self::DuplicateValue => "Duplicate value found",
            Self::MethodNotAllowed => "HTTP method not allowed for this resource",
            Self::UnknownException => "An error occurred",
        }
    }
}

impl fmt::Display for ErrorCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One element of the JSON error array returned by every failing REST call.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ErrorBody {
    pub message: String,
    pub error_code: ErrorCode,
    pub fields: Vec<String>,
}

/// Build the platform's error payload: always an array, never a bare object.
pub fn format_error(code: ErrorCode, message: Option<&str>, fields: &[&str]) -> Vec<ErrorBody> {
    vec![ErrorBody {
        message: message.unwrap_or(code.default_message()).to_string(),
        error_code: code,
        fields: fields.iter().map(|f| f.to_string()).collect(),
    }]
}

/// A single field-rule violation.
#[derive(Debug, Clone, PartialEq)]
pub struct ValidationError {
    pub code: ErrorCode,
    pub message: String,
    pub field: String,
}

impl ValidationError {
    pub fn new(code: ErrorCode, field: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
            field: field.into(),
        }
    }

    /// `CODE:message`, the form used in bulk failure columns.
    pub fn summary(&self) -> String {
        format!("{}:{}", self.code, self.message)
    }
}

impl From<&ValidationError> for ErrorBody {
    fn from(err: &ValidationError) -> Self {
        ErrorBody {
            message: err.message.clone(),
            error_code: err.code,
            fields: vec![err.field.clone()],
        }
    }
}

#[derive(Error, Debug)]
pub enum MockError {
    #[error("{0}")]
    NotFound(String),

    #[error("{0}")]
    BatchNotFound(String),

    #[error("{0}")]
    InvalidType(String),

    #[error("{0}")]
    InvalidField(String),

    #[error("{0}")]
    MalformedQuery(String),

    #[error("{0}")]
    InvalidState(String),

    #[error("{0}")]
    InvalidBatchState(String),

    #[error("{0}")]
    EntityIsDeleted(String),

    #[error("{0}")]
    MissingArgument(String),

    #[error("{0}")]
    MethodNotAllowed(String),

    #[error("validation failed: {}", summarize(.0))]
    Validation(Vec<ValidationError>),

    #[error("Lock error: {0}")]
    LockError(String),

    #[error("I/O error: {0}")]
    IoError(String),

    #[error("{0}")]
    Internal(String),
}

fn summarize(errors: &[ValidationError]) -> String {
    errors
        .iter()
        .map(ValidationError::summary)
        .collect::<Vec<_>>()
        .join("; ")
}

impl MockError {
    pub fn code(&self) -> ErrorCode {
        match self {
            Self::NotFound(_) | Self::BatchNotFound(_) => ErrorCode::NotFound,
            Self::InvalidType(_) => ErrorCode::InvalidType,
            Self::InvalidField(_) => ErrorCode::InvalidField,
            Self::MalformedQuery(_) => ErrorCode::MalformedQuery,
            Self::InvalidState(_) | Self::InvalidBatchState(_) => ErrorCode::InvalidState,
            Self::EntityIsDeleted(_) => ErrorCode::EntityIsDeleted,
            Self::MissingArgument(_) => ErrorCode::MissingArgument,
            Self::MethodNotAllowed(_) => ErrorCode::MethodNotAllowed,
            Self::Validation(errors) => errors
                .first()
                .map(|e| e.code)
                .unwrap_or(ErrorCode::UnknownException),
            Self::LockError(_) | Self::IoError(_) | Self::Internal(_) => {
                ErrorCode::UnknownException
            }
        }
    }

    /// Render as the JSON error array. Validation failures keep one entry per violation.
    pub fn to_error_bodies(&self) -> Vec<ErrorBody> {
        match self {
            Self::Validation(errors) => errors.iter().map(ErrorBody::from).collect(),
            other => format_error(other.code(), Some(&other.to_string()), &[]),
        }
    }

    pub fn not_supported(object: &str) -> Self {
        Self::NotFound(format!("sObject type '{}' is not supported.", object))
    }
}

pub type Result<T> = std::result::Result<T, MockError>;

impl From<std::io::Error> for MockError {
    fn from(err: std::io::Error) -> Self {
        Self::IoError(err.to_string())
    }
}

impl From<serde_json::Error> for MockError {
    fn from(err: serde_json::Error) -> Self {
        Self::InvalidField(format!("Invalid JSON: {}", err))
    }
}

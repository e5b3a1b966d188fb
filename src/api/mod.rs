//! Transport-agnostic request handlers: parsed inputs in, `ApiResponse` out.

pub mod admin;
pub mod bulk_v1;
pub mod bulk_v2;
pub mod rest;
pub mod streaming;
pub mod wave;

use crate::core::{ErrorCode, MockError, format_error};
use http::StatusCode;
use serde::Serialize;
use serde_json::Value as Json;
use tracing::error;

pub const CONTENT_JSON: &str = "application/json";
pub const CONTENT_XML: &str = "application/xml";
pub const CONTENT_CSV: &str = "text/csv";

#[derive(Debug, Clone, PartialEq)]
pub enum ApiBody {
    Empty,
    Json(Json),
    Text {
        content_type: &'static str,
        text: String,
    },
    /// Raw bytes with a content type taken from stored data.
    Binary {
        content_type: String,
        bytes: Vec<u8>,
    },
}

/// Status, extra headers and body of one response.
#[derive(Debug, Clone, PartialEq)]
pub struct ApiResponse {
    pub status: StatusCode,
    pub headers: Vec<(&'static str, String)>,
    pub body: ApiBody,
}

impl ApiResponse {
    pub fn json(status: StatusCode, body: impl Serialize) -> Self {
        let body = serde_json::to_value(body).unwrap_or(Json::Null);
        Self {
            status,
            headers: Vec::new(),
            body: ApiBody::Json(body),
        }
    }

    pub fn ok(body: impl Serialize) -> Self {
        Self::json(StatusCode::OK, body)
    }

    pub fn text(status: StatusCode, content_type: &'static str, text: impl Into<String>) -> Self {
        Self {
            status,
            headers: Vec::new(),
            body: ApiBody::Text {
                content_type,
                text: text.into(),
            },
        }
    }

    pub fn binary(content_type: impl Into<String>, bytes: Vec<u8>) -> Self {
        Self {
            status: StatusCode::OK,
            headers: Vec::new(),
            body: ApiBody::Binary {
                content_type: content_type.into(),
                bytes,
            },
        }
    }

    pub fn empty(status: StatusCode) -> Self {
        Self {
            status,
            headers: Vec::new(),
            body: ApiBody::Empty,
        }
    }

    pub fn no_content() -> Self {
        Self::empty(StatusCode::NO_CONTENT)
    }

    pub fn with_header(mut self, name: &'static str, value: impl Into<String>) -> Self {
        self.headers.push((name, value.into()));
        self
    }

    /// Body as JSON, when it is JSON.
    pub fn json_body(&self) -> Option<&Json> {
        match &self.body {
            ApiBody::Json(json) => Some(json),
            _ => None,
        }
    }

    pub fn text_body(&self) -> Option<&str> {
        match &self.body {
            ApiBody::Text { text, .. } => Some(text),
            _ => None,
        }
    }

    pub fn bytes_body(&self) -> Option<&[u8]> {
        match &self.body {
            ApiBody::Binary { bytes, .. } => Some(bytes),
            _ => None,
        }
    }

    /// Render an engine error as the platform's JSON error array.
    pub fn error(err: MockError) -> Self {
        let status = status_for(&err);
        if status == StatusCode::INTERNAL_SERVER_ERROR {
            error!(error = %err, "request failed unexpectedly");
        }
        Self::json(status, err.to_error_bodies())
    }

    pub fn method_not_allowed(method: &str) -> Self {
        Self::json(
            StatusCode::METHOD_NOT_ALLOWED,
            format_error(
                ErrorCode::MethodNotAllowed,
                Some(&format!("{} not allowed", method)),
                &[],
            ),
        )
    }
}

impl From<MockError> for ApiResponse {
    fn from(err: MockError) -> Self {
        Self::error(err)
    }
}

pub fn status_for(err: &MockError) -> StatusCode {
    match err {
        MockError::NotFound(_) | MockError::BatchNotFound(_) | MockError::EntityIsDeleted(_) => {
            StatusCode::NOT_FOUND
        }
        MockError::MethodNotAllowed(_) => StatusCode::METHOD_NOT_ALLOWED,
        MockError::LockError(_) | MockError::IoError(_) | MockError::Internal(_) => {
            StatusCode::INTERNAL_SERVER_ERROR
        }
        _ => StatusCode::BAD_REQUEST,
    }
}

/// Decode a JSON request body; an empty body is `null`.
pub fn parse_json(body: &[u8]) -> Result<Json, MockError> {
    if body.iter().all(u8::is_ascii_whitespace) {
        return Ok(Json::Null);
    }
    Ok(serde_json::from_slice(body)?)
}

/// Unwrap a handler result into a response.
pub fn respond(result: Result<ApiResponse, MockError>) -> ApiResponse {
    result.unwrap_or_else(ApiResponse::error)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_errors_render_as_arrays_with_status() {
        let response = ApiResponse::error(MockError::EntityIsDeleted("gone".into()));
        assert_eq!(response.status, StatusCode::NOT_FOUND);
        let body = response.json_body().unwrap();
        assert_eq!(body[0]["errorCode"], "ENTITY_IS_DELETED");
        assert_eq!(body[0]["message"], "gone");

        let response = ApiResponse::error(MockError::Internal("boom".into()));
        assert_eq!(response.status, StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(response.json_body().unwrap()[0]["errorCode"], "UNKNOWN_EXCEPTION");
    }

    #[test]
    fn test_parse_json_accepts_empty_body() {
        assert_eq!(parse_json(b"  ").unwrap(), Json::Null);
        assert!(matches!(parse_json(b"{bad"), Err(MockError::InvalidField(_))));
    }
}

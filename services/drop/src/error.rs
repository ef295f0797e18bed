//! Error taxonomy shared by every component, and its mapping onto HTTP responses.

use axum::extract::multipart::{MultipartError, MultipartRejection};
use axum::extract::rejection::JsonRejection;
use axum::{http::StatusCode, response::IntoResponse, Json};
use serde::Serialize;
use std::convert::Infallible;
use thiserror::Error;
use tracing::{debug, error};

/// Result alias used throughout the crate
pub type Result<T> = std::result::Result<T, DropError>;

/// Errors surfaced by ingestion, retrieval, discovery and QR rendering
#[derive(Error, Debug)]
pub enum DropError {
    #[error("Missing required field: {0}")]
    MissingField(&'static str),

    #[error("Failed to decode request: {0}")]
    DecodeFailure(String),

    #[error("Request body exceeds the upload limit: {0}")]
    PayloadTooLarge(String),

    #[error("Failed to write object: {0}")]
    WriteFailure(#[source] std::io::Error),

    #[error("Failed to read object: {0}")]
    ReadFailure(#[source] std::io::Error),

    #[error("Object not found: {0}")]
    NotFound(String),

    #[error("Invalid object path: {0}")]
    InvalidPath(String),

    #[error("Nothing to encode")]
    EmptyContent,

    #[error("Content does not fit in a QR code ({0} bytes)")]
    ContentTooLong(usize),

    #[error("QR encoding failed: {0}")]
    QrEncode(String),

    #[error("Failed to enumerate network interfaces: {0}")]
    Discovery(#[source] std::io::Error),
}

/// Error response body
#[derive(Debug, Serialize)]
pub struct ErrorResponse {
    pub error: String,
    pub code: String,
}

impl DropError {
    /// HTTP status for this error
    pub fn status(&self) -> StatusCode {
        match self {
            DropError::MissingField(_)
            | DropError::DecodeFailure(_)
            | DropError::InvalidPath(_)
            | DropError::EmptyContent
            | DropError::ContentTooLong(_) => StatusCode::BAD_REQUEST,
            DropError::NotFound(_) => StatusCode::NOT_FOUND,
            DropError::PayloadTooLarge(_) => StatusCode::PAYLOAD_TOO_LARGE,
            DropError::WriteFailure(_)
            | DropError::ReadFailure(_)
            | DropError::QrEncode(_)
            | DropError::Discovery(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    /// Stable machine-readable code for clients
    pub fn code(&self) -> &'static str {
        match self {
            DropError::MissingField(_) => "MISSING_FIELD",
            DropError::DecodeFailure(_) => "DECODE_FAILURE",
            DropError::PayloadTooLarge(_) => "PAYLOAD_TOO_LARGE",
            DropError::WriteFailure(_) => "WRITE_FAILURE",
            DropError::ReadFailure(_) => "READ_FAILURE",
            DropError::NotFound(_) => "NOT_FOUND",
            DropError::InvalidPath(_) => "INVALID_PATH",
            DropError::EmptyContent => "EMPTY_CONTENT",
            DropError::ContentTooLong(_) => "CONTENT_TOO_LONG",
            DropError::QrEncode(_) => "QR_ENCODE_ERROR",
            DropError::Discovery(_) => "DISCOVERY_ERROR",
        }
    }
}

impl IntoResponse for DropError {
    fn into_response(self) -> axum::response::Response {
        let status = self.status();
        if status.is_server_error() {
            error!(error = %self, code = self.code(), "Request failed");
        } else {
            debug!(error = %self, code = self.code(), "Request rejected");
        }

        (
            status,
            Json(ErrorResponse {
                error: self.to_string(),
                code: self.code().to_string(),
            }),
        )
            .into_response()
    }
}

impl DropError {
    /// Classify a malformed or oversized request body by the status axum assigned it
    fn from_body_error(status: StatusCode, message: String) -> Self {
        if status == StatusCode::PAYLOAD_TOO_LARGE {
            DropError::PayloadTooLarge(message)
        } else {
            DropError::DecodeFailure(message)
        }
    }
}

impl From<MultipartError> for DropError {
    fn from(e: MultipartError) -> Self {
        Self::from_body_error(e.status(), e.body_text())
    }
}

impl From<MultipartRejection> for DropError {
    fn from(e: MultipartRejection) -> Self {
        Self::from_body_error(e.status(), e.body_text())
    }
}

impl From<JsonRejection> for DropError {
    fn from(e: JsonRejection) -> Self {
        Self::from_body_error(e.status(), e.body_text())
    }
}

impl From<Infallible> for DropError {
    fn from(e: Infallible) -> Self {
        match e {}
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io;

    #[test]
    fn test_caller_mistakes_are_client_errors() {
        assert_eq!(DropError::MissingField("raw").status(), StatusCode::BAD_REQUEST);
        assert_eq!(
            DropError::InvalidPath("../x".to_string()).status(),
            StatusCode::BAD_REQUEST
        );
        assert_eq!(DropError::EmptyContent.status(), StatusCode::BAD_REQUEST);
        assert_eq!(
            DropError::NotFound("a.txt".to_string()).status(),
            StatusCode::NOT_FOUND
        );
    }

    #[test]
    fn test_filesystem_faults_are_server_errors() {
        let err = DropError::WriteFailure(io::Error::new(io::ErrorKind::Other, "disk full"));
        assert_eq!(err.status(), StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(err.code(), "WRITE_FAILURE");
        assert!(err.to_string().contains("disk full"));
    }

    #[test]
    fn test_body_errors_keep_size_limit_status() {
        let err = DropError::from_body_error(
            StatusCode::PAYLOAD_TOO_LARGE,
            "length limit exceeded".to_string(),
        );
        assert!(matches!(err, DropError::PayloadTooLarge(_)));
        assert_eq!(err.status(), StatusCode::PAYLOAD_TOO_LARGE);
        assert_eq!(err.code(), "PAYLOAD_TOO_LARGE");

        let err = DropError::from_body_error(StatusCode::BAD_REQUEST, "bad json".to_string());
        assert!(matches!(err, DropError::DecodeFailure(_)));
    }

    #[test]
    fn test_into_response_status() {
        let response = DropError::NotFound("missing.bin".to_string()).into_response();
        assert_eq!(response.status(), StatusCode::NOT_FOUND);
    }
}

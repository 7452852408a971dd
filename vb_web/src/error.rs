//! ABOUTME: API error type rendering the failure envelope
//! ABOUTME: Maps core, validation and tool errors to HTTP status and machine codes

use crate::models::ErrorResponse;
use actix_web::{error::JsonPayloadError, http::StatusCode, HttpRequest, HttpResponse, ResponseError};
use std::fmt;
use validator::ValidationErrors;
use vb_core::Error;

/// API error carrying the HTTP status and the envelope to send
#[derive(Debug)]
pub struct ApiError {
    pub status: StatusCode,
    pub body: ErrorResponse,
}

impl ApiError {
    pub fn new(status: StatusCode, code: &str, message: impl Into<String>) -> Self {
        Self {
            status,
            body: ErrorResponse::new(code, message),
        }
    }

    pub fn with_details(mut self, details: serde_json::Value) -> Self {
        self.body = self.body.with_details(details);
        self
    }

    pub fn code(&self) -> &str {
        &self.body.error.code
    }

    pub fn bad_request(message: impl Into<String>) -> Self {
        Self::new(StatusCode::BAD_REQUEST, "bad_request", message)
    }

    pub fn invalid_signature(message: impl Into<String>) -> Self {
        Self::new(StatusCode::UNAUTHORIZED, "invalid_signature", message)
    }

    pub fn forbidden(message: impl Into<String>) -> Self {
        Self::new(StatusCode::FORBIDDEN, "command_not_allowed", message)
    }

    pub fn not_found(message: impl Into<String>) -> Self {
        Self::new(StatusCode::NOT_FOUND, "not_found", message)
    }

    pub fn validation(message: impl Into<String>) -> Self {
        Self::new(StatusCode::UNPROCESSABLE_ENTITY, "validation_failed", message)
    }

    pub fn payload_too_large(limit: usize) -> Self {
        Self::new(
            StatusCode::PAYLOAD_TOO_LARGE,
            "payload_too_large",
            format!("Request body exceeds {} bytes", limit),
        )
    }

    pub fn rate_limited(retry_after_secs: u64) -> Self {
        Self::new(
            StatusCode::TOO_MANY_REQUESTS,
            "rate_limited",
            format!("Rate limit exceeded, retry in {} seconds", retry_after_secs),
        )
    }

    /// The tool ran but could not produce a result
    pub fn tool_failed(message: impl Into<String>) -> Self {
        Self::new(StatusCode::BAD_GATEWAY, "tool_failed", message)
    }

    pub fn internal(message: impl Into<String>) -> Self {
        Self::new(StatusCode::INTERNAL_SERVER_ERROR, "internal_error", message)
    }
}

impl fmt::Display for ApiError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.body.error.code, self.body.error.message)
    }
}

impl ResponseError for ApiError {
    fn status_code(&self) -> StatusCode {
        self.status
    }

    fn error_response(&self) -> HttpResponse {
        HttpResponse::build(self.status).json(&self.body)
    }
}

impl From<ValidationErrors> for ApiError {
    fn from(errors: ValidationErrors) -> Self {
        let fields: serde_json::Map<String, serde_json::Value> = errors
            .field_errors()
            .into_iter()
            .map(|(field, errs)| {
                let codes = errs
                    .iter()
                    .map(|e| serde_json::Value::String(e.code.to_string()))
                    .collect();
                (field.to_string(), serde_json::Value::Array(codes))
            })
            .collect();

        Self::validation("Request validation failed")
            .with_details(serde_json::json!({ "fields": fields }))
    }
}

impl From<Error> for ApiError {
    fn from(error: Error) -> Self {
        match error {
            Error::Validation(msg) => Self::validation(msg),
            Error::NotFound(msg) => Self::not_found(msg),
            Error::CommandNotAllowed(cmd) => {
                Self::forbidden(format!("Command not allowed: {}", cmd))
            }
            Error::External(msg) => Self::tool_failed(msg),
            Error::Database(msg) => {
                tracing::error!("Database error: {}", msg);
                Self::internal("Database error")
            }
            other => {
                tracing::error!(kind = other.kind(), "Internal error: {}", other);
                Self::internal("Internal server error")
            }
        }
    }
}

/// Render malformed or oversized JSON bodies in the error envelope
pub fn json_error_handler(err: JsonPayloadError, _req: &HttpRequest) -> actix_web::Error {
    let api_error = match &err {
        JsonPayloadError::OverflowKnownLength { limit, .. } => ApiError::payload_too_large(*limit),
        JsonPayloadError::Overflow { limit } => ApiError::payload_too_large(*limit),
        other => ApiError::bad_request(format!("Invalid JSON body: {}", other)),
    };
    api_error.into()
}

/// Result type alias for API handlers
pub type ApiResult<T> = Result<T, ApiError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_core_error_mapping() {
        let cases = [
            (Error::Validation("bad".into()), 422, "validation_failed"),
            (Error::NotFound("gone".into()), 404, "not_found"),
            (Error::CommandNotAllowed("rm".into()), 403, "command_not_allowed"),
            (Error::External("dns down".into()), 502, "tool_failed"),
            (Error::Database("locked".into()), 500, "internal_error"),
            (Error::Process("spawn".into()), 500, "internal_error"),
        ];

        for (error, status, code) in cases {
            let api: ApiError = error.into();
            assert_eq!(api.status.as_u16(), status);
            assert_eq!(api.code(), code);
        }
    }

    #[test]
    fn test_database_details_are_not_leaked() {
        let api: ApiError = Error::Database("near \"SELEC\": syntax error".into()).into();
        assert_eq!(api.body.error.message, "Database error");
    }

    #[test]
    fn test_validation_errors_list_fields() {
        let mut errors = ValidationErrors::new();
        errors.add("domain", validator::ValidationError::new("length"));

        let api = ApiError::from(errors);
        assert_eq!(api.status.as_u16(), 422);
        let details = api.body.error.details.unwrap();
        assert_eq!(details["fields"]["domain"][0], "length");
    }
}

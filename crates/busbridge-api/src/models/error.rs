//! Error responses and the mapping from bus errors to HTTP status codes.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use busbridge_core::{BusError, FailureKind};
use serde_json::json;

use super::common::{ApiResponse, ErrorCode};

/// Error returned by handlers; renders as an `ApiResponse` with
/// `success: false` and the mapped status.
#[derive(Debug, Clone)]
pub struct ErrorResponse {
    pub status: StatusCode,
    pub code: String,
    pub message: String,
    pub details: Option<serde_json::Value>,
}

impl ErrorResponse {
    pub fn with_message(status: StatusCode, code: ErrorCode, message: impl Into<String>) -> Self {
        Self {
            status,
            code: code.as_str().to_string(),
            message: message.into(),
            details: None,
        }
    }

    pub fn bad_request(message: impl Into<String>) -> Self {
        Self::with_message(StatusCode::BAD_REQUEST, ErrorCode::BadRequest, message)
    }

    pub fn internal(message: impl Into<String>) -> Self {
        Self::with_message(
            StatusCode::INTERNAL_SERVER_ERROR,
            ErrorCode::InternalError,
            message,
        )
    }

    pub fn method_not_allowed(message: impl Into<String>) -> Self {
        Self::with_message(
            StatusCode::METHOD_NOT_ALLOWED,
            ErrorCode::MethodNotAllowed,
            message,
        )
    }

    pub fn with_details(mut self, details: serde_json::Value) -> Self {
        self.details = Some(details);
        self
    }
}

impl std::fmt::Display for ErrorResponse {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{} ({}): {}", self.code, self.status, self.message)
    }
}

impl IntoResponse for ErrorResponse {
    fn into_response(self) -> Response {
        let status = self.status;
        (status, ApiResponse::<()>::from_error_response(self)).into_response()
    }
}

fn failure_status(kind: FailureKind) -> StatusCode {
    match kind {
        FailureKind::BadRequest => StatusCode::BAD_REQUEST,
        FailureKind::Conflict => StatusCode::CONFLICT,
        FailureKind::Unavailable => StatusCode::SERVICE_UNAVAILABLE,
        FailureKind::Internal => StatusCode::INTERNAL_SERVER_ERROR,
    }
}

impl From<BusError> for ErrorResponse {
    fn from(err: BusError) -> Self {
        let message = err.to_string();
        match err {
            BusError::AddressInvalid(_) => {
                Self::with_message(StatusCode::BAD_REQUEST, ErrorCode::AddressInvalid, message)
            }
            BusError::ObjectNotFound(_) => {
                Self::with_message(StatusCode::NOT_FOUND, ErrorCode::ObjectNotFound, message)
            }
            BusError::NoHandler { .. } => {
                Self::with_message(StatusCode::NOT_FOUND, ErrorCode::NoHandler, message)
            }
            BusError::TransportUnavailable(_) => Self::with_message(
                StatusCode::SERVICE_UNAVAILABLE,
                ErrorCode::TransportUnavailable,
                message,
            ),
            BusError::StalledConsumer { .. } => Self::with_message(
                StatusCode::SERVICE_UNAVAILABLE,
                ErrorCode::StalledConsumer,
                message,
            ),
            BusError::ProcessorFailure { processor, source } => Self::with_message(
                failure_status(source.kind),
                ErrorCode::ProcessorFailed,
                source.message.clone(),
            )
            .with_details(json!({ "processor": processor, "kind": source.kind })),
            BusError::Composition(_) | BusError::Config(_) => Self::internal(message),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use busbridge_core::ProcessorError;

    #[test]
    fn test_bus_error_status_mapping() {
        let cases = [
            (BusError::AddressInvalid("x".into()), StatusCode::BAD_REQUEST),
            (BusError::ObjectNotFound("x".into()), StatusCode::NOT_FOUND),
            (
                BusError::NoHandler {
                    verb: "GET".into(),
                    path: "power".into(),
                    object: "controller-1.zone-1".into(),
                },
                StatusCode::NOT_FOUND,
            ),
            (
                BusError::TransportUnavailable("offline".into()),
                StatusCode::SERVICE_UNAVAILABLE,
            ),
            (BusError::Config("x".into()), StatusCode::INTERNAL_SERVER_ERROR),
        ];
        for (err, status) in cases {
            assert_eq!(ErrorResponse::from(err).status, status);
        }
    }

    #[test]
    fn test_processor_failure_carries_kind() {
        let err = ErrorResponse::from(BusError::ProcessorFailure {
            processor: "volume".into(),
            source: ProcessorError::conflict("zone muted"),
        });
        assert_eq!(err.status, StatusCode::CONFLICT);
        assert_eq!(err.code, "PROCESSOR_FAILED");
        assert_eq!(err.message, "zone muted");
        assert_eq!(err.details.unwrap()["processor"], "volume");
    }
}

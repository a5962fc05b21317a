//! Unified API response models.

use axum::response::IntoResponse;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::error::ErrorResponse;

/// Unified API response wrapper.
///
/// ```json
/// {
///   "success": true,
///   "data": { ... },
///   "meta": {
///     "timestamp": "2024-01-01T00:00:00Z",
///     "request_id": "550e8400-e29b-41d4-a716-446655440000"
///   }
/// }
/// ```
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ApiResponse<T> {
    pub success: bool,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<T>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<ApiError>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub meta: Option<ResponseMeta>,
}

impl<T> ApiResponse<T> {
    pub fn success(data: T) -> Self {
        Self {
            success: true,
            data: Some(data),
            error: None,
            meta: Some(ResponseMeta::default()),
        }
    }

    pub fn from_error_response(err: ErrorResponse) -> Self {
        Self {
            success: false,
            data: None,
            error: Some(err.into()),
            meta: Some(ResponseMeta::default()),
        }
    }
}

impl<T> IntoResponse for ApiResponse<T>
where
    T: Serialize,
{
    fn into_response(self) -> axum::response::Response {
        axum::Json(self).into_response()
    }
}

/// Response metadata.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ResponseMeta {
    pub timestamp: DateTime<Utc>,

    /// Unique request ID for tracing.
    pub request_id: String,
}

impl Default for ResponseMeta {
    fn default() -> Self {
        Self {
            timestamp: Utc::now(),
            request_id: Uuid::new_v4().to_string(),
        }
    }
}

/// Standardized API error format.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ApiError {
    /// Machine-readable error code.
    pub code: String,

    pub message: String,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub details: Option<serde_json::Value>,
}

impl From<ErrorResponse> for ApiError {
    fn from(err: ErrorResponse) -> Self {
        Self {
            code: err.code,
            message: err.message,
            details: err.details,
        }
    }
}

/// Machine-readable error codes carried in `ApiError::code`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorCode {
    BadRequest,
    MethodNotAllowed,
    InternalError,

    // Bus
    AddressInvalid,
    TransportUnavailable,
    StalledConsumer,

    // Routing
    ObjectNotFound,
    NoHandler,
    ProcessorFailed,
}

impl ErrorCode {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::BadRequest => "BAD_REQUEST",
            Self::MethodNotAllowed => "METHOD_NOT_ALLOWED",
            Self::InternalError => "INTERNAL_ERROR",

            Self::AddressInvalid => "ADDRESS_INVALID",
            Self::TransportUnavailable => "TRANSPORT_UNAVAILABLE",
            Self::StalledConsumer => "STALLED_CONSUMER",

            Self::ObjectNotFound => "OBJECT_NOT_FOUND",
            Self::NoHandler => "NO_HANDLER",
            Self::ProcessorFailed => "PROCESSOR_FAILED",
        }
    }
}

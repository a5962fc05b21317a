//! Request and response models for the web API.

pub mod common;
pub mod error;

pub use common::{ApiError, ApiResponse, ErrorCode, ResponseMeta};
pub use error::ErrorResponse;

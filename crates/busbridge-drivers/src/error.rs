//! Driver errors.

use busbridge_core::{BusError, ProcessorError};
use thiserror::Error;

pub type DriverResult<T> = std::result::Result<T, DriverError>;

#[derive(Debug, Clone, Error)]
pub enum DriverError {
    #[error("Value out of range: {0}")]
    OutOfRange(String),

    #[error("Invalid request body: {0}")]
    InvalidBody(String),

    #[error("Unknown parameter: {0}")]
    UnknownParameter(String),

    #[error(transparent)]
    Bus(#[from] BusError),
}

impl From<DriverError> for ProcessorError {
    fn from(err: DriverError) -> Self {
        match err {
            DriverError::OutOfRange(msg)
            | DriverError::InvalidBody(msg)
            | DriverError::UnknownParameter(msg) => ProcessorError::bad_request(msg),
            DriverError::Bus(e) => e.into(),
        }
    }
}

//! Error taxonomy shared by the bus core.
//!
//! Synchronous failures (`AddressInvalid`, `NoHandler`, `ObjectNotFound`) are
//! returned to the immediate caller. Asynchronous failures
//! (`TransportUnavailable`, `StalledConsumer`) travel over a handle's error
//! channel. Nothing in here is process-fatal.

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::address::Address;

/// Result alias used throughout the core.
pub type Result<T> = std::result::Result<T, BusError>;

/// Stable, serializable classification of a [`BusError`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    AddressInvalid,
    TransportUnavailable,
    StalledConsumer,
    NoHandler,
    ProcessorFailure,
    ObjectNotFound,
    Composition,
    Config,
}

impl ErrorKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::AddressInvalid => "ADDRESS_INVALID",
            Self::TransportUnavailable => "TRANSPORT_UNAVAILABLE",
            Self::StalledConsumer => "STALLED_CONSUMER",
            Self::NoHandler => "NO_HANDLER",
            Self::ProcessorFailure => "PROCESSOR_FAILURE",
            Self::ObjectNotFound => "OBJECT_NOT_FOUND",
            Self::Composition => "COMPOSITION_ERROR",
            Self::Config => "CONFIG_ERROR",
        }
    }
}

impl std::fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Errors produced by the bus core.
#[derive(Debug, Clone, Error)]
pub enum BusError {
    /// Malformed coordinate tuple.
    #[error("Invalid address: {0}")]
    AddressInvalid(String),

    /// The bus could not be reached at send or subscribe time.
    #[error("Transport unavailable: {0}")]
    TransportUnavailable(String),

    /// A subscriber exceeded its delivery budget and was dropped.
    #[error("Stalled consumer dropped at {address} after {budget_ms}ms")]
    StalledConsumer { address: Address, budget_ms: u64 },

    /// No registered processor accepted the request.
    #[error("No handler for {verb} /{path} on {object}")]
    NoHandler {
        verb: String,
        path: String,
        object: String,
    },

    /// A matched processor failed while executing.
    #[error("Processor '{processor}' failed: {source}")]
    ProcessorFailure {
        processor: String,
        #[source]
        source: ProcessorError,
    },

    /// The request targeted an object the registry does not know.
    #[error("Object not found: {0}")]
    ObjectNotFound(String),

    /// Registry composition was used incorrectly.
    #[error("Composition error: {0}")]
    Composition(String),

    /// Invalid configuration.
    #[error("Configuration error: {0}")]
    Config(String),
}

impl BusError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::AddressInvalid(_) => ErrorKind::AddressInvalid,
            Self::TransportUnavailable(_) => ErrorKind::TransportUnavailable,
            Self::StalledConsumer { .. } => ErrorKind::StalledConsumer,
            Self::NoHandler { .. } => ErrorKind::NoHandler,
            Self::ProcessorFailure { .. } => ErrorKind::ProcessorFailure,
            Self::ObjectNotFound(_) => ErrorKind::ObjectNotFound,
            Self::Composition(_) => ErrorKind::Composition,
            Self::Config(_) => ErrorKind::Config,
        }
    }
}

/// Errors reported by a [`Transport`](crate::transport::Transport) implementation.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum TransportError {
    #[error("Transport not connected")]
    NotConnected,

    /// The bus answered with a negative acknowledgement.
    #[error("Bus rejected event: {0}")]
    Rejected(String),

    #[error("Send timed out after {0}ms")]
    Timeout(u64),

    #[error("I/O error: {0}")]
    Io(String),
}

impl From<TransportError> for BusError {
    fn from(err: TransportError) -> Self {
        BusError::TransportUnavailable(err.to_string())
    }
}

/// Category of a processor-reported failure.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FailureKind {
    /// The request payload or path was not acceptable.
    BadRequest,
    /// The target is in a state that forbids the operation.
    Conflict,
    /// The bus or a collaborator could not be reached.
    Unavailable,
    /// Anything else, including panics caught by the router.
    Internal,
}

impl std::fmt::Display for FailureKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Self::BadRequest => "bad request",
            Self::Conflict => "conflict",
            Self::Unavailable => "unavailable",
            Self::Internal => "internal",
        };
        f.write_str(s)
    }
}

/// Structured failure returned by a request processor.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
#[error("{kind}: {message}")]
pub struct ProcessorError {
    pub kind: FailureKind,
    pub message: String,
}

impl ProcessorError {
    pub fn new(kind: FailureKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
        }
    }

    pub fn bad_request(message: impl Into<String>) -> Self {
        Self::new(FailureKind::BadRequest, message)
    }

    pub fn conflict(message: impl Into<String>) -> Self {
        Self::new(FailureKind::Conflict, message)
    }

    pub fn unavailable(message: impl Into<String>) -> Self {
        Self::new(FailureKind::Unavailable, message)
    }

    pub fn internal(message: impl Into<String>) -> Self {
        Self::new(FailureKind::Internal, message)
    }
}

impl From<BusError> for ProcessorError {
    fn from(err: BusError) -> Self {
        let kind = match err.kind() {
            ErrorKind::TransportUnavailable | ErrorKind::StalledConsumer => FailureKind::Unavailable,
            ErrorKind::AddressInvalid => FailureKind::BadRequest,
            _ => FailureKind::Internal,
        };
        Self::new(kind, err.to_string())
    }
}

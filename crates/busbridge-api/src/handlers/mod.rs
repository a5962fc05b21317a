//! API handlers.

pub mod basic;
pub mod common;
pub mod objects;

pub use crate::server::ServerState;

pub use basic::health_handler;
pub use objects::{get_object_handler, list_objects_handler, object_request_handler};

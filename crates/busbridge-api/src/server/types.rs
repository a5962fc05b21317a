//! Server state and types.

use std::sync::Arc;

use busbridge_drivers::Bridge;

/// Maximum request body size (64 KB).
pub const MAX_REQUEST_BODY_SIZE: usize = 64 * 1024;

/// Server state shared across all handlers.
#[derive(Clone)]
pub struct ServerState {
    pub bridge: Arc<Bridge>,

    /// Server start time (unix seconds).
    pub started_at: i64,
}

impl ServerState {
    pub fn new(bridge: Arc<Bridge>) -> Self {
        Self {
            bridge,
            started_at: chrono::Utc::now().timestamp(),
        }
    }
}

//! HTTP API for the bus bridge.
//!
//! | Method | Path                        | Purpose                          |
//! |--------|-----------------------------|----------------------------------|
//! | GET    | `/api/health`               | Transport and dispatcher status  |
//! | GET    | `/api/objects`              | Object tree with profile state   |
//! | GET    | `/api/objects/:id`          | One object                       |
//! | any    | `/api/objects/:id/*path`    | Routed to the request processors |

pub mod handlers;
pub mod models;
pub mod server;

pub use models::{ApiError, ApiResponse, ErrorCode, ErrorResponse};
pub use server::{create_router_with_state, run, ServerState};

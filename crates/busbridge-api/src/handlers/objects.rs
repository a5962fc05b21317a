//! Bus object listing and capability-routed requests.

use axum::{
    body::Bytes,
    extract::{Path, State},
    http::Method,
};
use busbridge_core::{BusError, ObjectId, Request, Response, Verb};
use busbridge_drivers::ObjectSummary;

use crate::handlers::{
    common::{ok, HandlerResult},
    ServerState,
};
use crate::models::ErrorResponse;

/// List every bus object with its profiles.
pub async fn list_objects_handler(
    State(state): State<ServerState>,
) -> HandlerResult<Vec<ObjectSummary>> {
    ok(state.bridge.describe_all())
}

pub async fn get_object_handler(
    State(state): State<ServerState>,
    Path(id): Path<String>,
) -> HandlerResult<ObjectSummary> {
    let summary = state
        .bridge
        .describe(&ObjectId::new(id.as_str()))
        .ok_or(BusError::ObjectNotFound(id))?;
    ok(summary)
}

/// Hand `METHOD /api/objects/{id}/{path}` to the request router.
pub async fn object_request_handler(
    State(state): State<ServerState>,
    method: Method,
    Path((id, path)): Path<(String, String)>,
    body: Bytes,
) -> HandlerResult<Response> {
    let verb: Verb = method.as_str().parse().map_err(|_| {
        ErrorResponse::method_not_allowed(format!(
            "{} is not supported on {}/{}",
            method, id, path
        ))
    })?;
    let mut request = Request::new(verb, &path);
    if let Some(body) = parse_body(&body)? {
        request = request.with_body(body);
    }

    tracing::debug!(object = %id, verb = %verb, path = %path, "Object request");
    let response = state.bridge.route(&request, &ObjectId::new(id)).await?;
    ok(response)
}

/// JSON if it parses, otherwise the raw text as a JSON string.
fn parse_body(body: &Bytes) -> Result<Option<serde_json::Value>, ErrorResponse> {
    if body.iter().all(u8::is_ascii_whitespace) {
        return Ok(None);
    }
    if let Ok(value) = serde_json::from_slice(body) {
        return Ok(Some(value));
    }
    let text = std::str::from_utf8(body)
        .map_err(|_| ErrorResponse::bad_request("request body must be JSON or UTF-8 text"))?;
    Ok(Some(serde_json::Value::String(text.trim().to_string())))
}

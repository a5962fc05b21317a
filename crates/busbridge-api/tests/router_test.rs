//! Full-router tests over `tower::ServiceExt::oneshot`.

mod common;

use std::time::Duration;

use axum::body::{to_bytes, Body};
use axum::http::{Request, StatusCode};
use busbridge_api::create_router_with_state;
use serde_json::Value;
use tower::ServiceExt;

use common::create_test_server_state;

async fn send(router: axum::Router, request: Request<Body>) -> (StatusCode, Value) {
    let response = router.oneshot(request).await.unwrap();
    let status = response.status();
    let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
    (status, serde_json::from_slice(&bytes).unwrap())
}

fn get(uri: &str) -> Request<Body> {
    Request::builder().uri(uri).body(Body::empty()).unwrap()
}

#[tokio::test]
async fn test_health_route() {
    let (_transport, state) = create_test_server_state(false).await;
    let (status, body) = send(create_router_with_state(state), get("/api/health")).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "healthy");
    assert_eq!(body["transport"], "loopback");
}

#[tokio::test]
async fn test_object_listing_route() {
    let (_transport, state) = create_test_server_state(false).await;
    let (status, body) = send(create_router_with_state(state), get("/api/objects")).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["success"], true);
    let objects = body["data"].as_array().unwrap();
    assert_eq!(objects.len(), 3);
    assert_eq!(objects[1]["id"], "controller-2.zone-1");
    assert_eq!(objects[1]["kind"], "zone");
}

#[tokio::test]
async fn test_power_round_trip_over_http() {
    let (_transport, state) = create_test_server_state(true).await;
    let router = create_router_with_state(state);

    let put = Request::builder()
        .method("PUT")
        .uri("/api/objects/controller-2/power")
        .header("content-type", "application/json")
        .body(Body::from(r#"{"power":"on"}"#))
        .unwrap();
    let (status, body) = send(router.clone(), put).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["data"]["processor"], "power");

    // The loopback echo reports the new state back on the bus.
    let mut power = Value::Null;
    for _ in 0..100 {
        let (_, body) = send(router.clone(), get("/api/objects/controller-2/power")).await;
        power = body["data"]["body"]["power"].clone();
        if power == "on" {
            break;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    assert_eq!(power, "on");
}

#[tokio::test]
async fn test_error_envelope() {
    let (_transport, state) = create_test_server_state(false).await;
    let router = create_router_with_state(state);

    let (status, body) = send(router.clone(), get("/api/objects/controller-7/power")).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(body["success"], false);
    assert_eq!(body["error"]["code"], "OBJECT_NOT_FOUND");

    let put = Request::builder()
        .method("PUT")
        .uri("/api/objects/controller-2.zone-1/volume")
        .body(Body::from("250"))
        .unwrap();
    let (status, body) = send(router, put).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error"]["code"], "PROCESSOR_FAILED");
    assert_eq!(body["error"]["details"]["processor"], "volume");
}

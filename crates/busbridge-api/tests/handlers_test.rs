//! Handler tests, calling handlers directly with extractors.

mod common;

use axum::body::Bytes;
use axum::extract::{Path, State};
use axum::http::{Method, StatusCode};
use busbridge_api::handlers::{
    get_object_handler, health_handler, list_objects_handler, object_request_handler,
};
use busbridge_core::{Address, EventKind};

use common::create_test_server_state;

#[tokio::test]
async fn test_health_handler() {
    let (transport, state) = create_test_server_state(false).await;
    let health = health_handler(State(state.clone())).await.0;
    assert_eq!(health.status, "healthy");
    assert_eq!(health.service, "busbridge");
    assert_eq!(health.objects, 3);
    assert!(health.connected);

    transport.set_online(false);
    let health = health_handler(State(state)).await.0;
    assert_eq!(health.status, "degraded");
}

#[tokio::test]
async fn test_list_objects_handler() {
    let (_transport, state) = create_test_server_state(false).await;
    let response = list_objects_handler(State(state)).await.unwrap().0;
    assert!(response.success);
    let objects = response.data.unwrap();
    assert_eq!(objects.len(), 3);
    assert_eq!(objects[0].object.id.as_str(), "controller-2");
}

#[tokio::test]
async fn test_get_unknown_object_is_404() {
    let (_transport, state) = create_test_server_state(false).await;
    let err = get_object_handler(State(state), Path("controller-9".to_string()))
        .await
        .unwrap_err();
    assert_eq!(err.status, StatusCode::NOT_FOUND);
    assert_eq!(err.code, "OBJECT_NOT_FOUND");
}

#[tokio::test]
async fn test_object_request_sends_event() {
    let (transport, state) = create_test_server_state(false).await;
    let response = object_request_handler(
        State(state),
        Method::PUT,
        Path(("controller-2".to_string(), "power".to_string())),
        Bytes::from_static(b"on"),
    )
    .await
    .unwrap()
    .0;

    assert_eq!(response.data.unwrap().processor, "power");
    let sent = transport.sent_events();
    assert_eq!(sent.len(), 1);
    assert_eq!(sent[0].kind, EventKind::AllZonesOnOff);
    assert_eq!(sent[0].address, Address::new(2, 0, 0, 7));
}

#[tokio::test]
async fn test_object_request_without_handler_is_404() {
    let (_transport, state) = create_test_server_state(false).await;
    let err = object_request_handler(
        State(state),
        Method::DELETE,
        Path(("controller-2".to_string(), "power".to_string())),
        Bytes::new(),
    )
    .await
    .unwrap_err();
    assert_eq!(err.status, StatusCode::NOT_FOUND);
    assert_eq!(err.code, "NO_HANDLER");
}

#[tokio::test]
async fn test_object_request_on_offline_bus_is_503() {
    let (transport, state) = create_test_server_state(false).await;
    transport.set_online(false);
    let err = object_request_handler(
        State(state),
        Method::POST,
        Path(("controller-2".to_string(), "power".to_string())),
        Bytes::from_static(b"{\"power\": \"off\"}"),
    )
    .await
    .unwrap_err();
    assert_eq!(err.status, StatusCode::SERVICE_UNAVAILABLE);
    assert_eq!(err.code, "PROCESSOR_FAILED");
}

#[tokio::test]
async fn test_unsupported_method_is_405() {
    let (transport, state) = create_test_server_state(false).await;
    let err = object_request_handler(
        State(state),
        Method::OPTIONS,
        Path(("controller-2".to_string(), "power".to_string())),
        Bytes::new(),
    )
    .await
    .unwrap_err();
    assert_eq!(err.status, StatusCode::METHOD_NOT_ALLOWED);
    assert_eq!(err.code, "METHOD_NOT_ALLOWED");
    assert_eq!(err.message, "OPTIONS is not supported on controller-2/power");
    assert!(transport.sent_events().is_empty());
}

//! Request routing over a capability registry.

use std::any::Any;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use busbridge_core::{
    Address, BusError, BusObject, CapabilityRegistry, ErrorKind, FailureKind, ObjectId, ObjectKind,
    ProcessorError, Profile, ProfileKind, ProfileType, Request, RequestProcessor, RequestRouter,
    Target, TypedProcessor, Verb,
};
use serde_json::{json, Value};

struct Switch {
    object: ObjectId,
}

impl Profile for Switch {
    fn kind(&self) -> ProfileKind {
        Self::KIND
    }

    fn object_id(&self) -> &ObjectId {
        &self.object
    }

    fn into_any(self: Arc<Self>) -> Arc<dyn Any + Send + Sync> {
        self
    }
}

impl ProfileType for Switch {
    const KIND: ProfileKind = ProfileKind::from_static("test.switch");
}

struct Meter {
    object: ObjectId,
}

impl Profile for Meter {
    fn kind(&self) -> ProfileKind {
        Self::KIND
    }

    fn object_id(&self) -> &ObjectId {
        &self.object
    }

    fn into_any(self: Arc<Self>) -> Arc<dyn Any + Send + Sync> {
        self
    }
}

impl ProfileType for Meter {
    const KIND: ProfileKind = ProfileKind::from_static("test.meter");
}

/// Serves every request on a `Switch` and counts invocations.
struct CountingSwitch {
    name: &'static str,
    calls: Arc<AtomicUsize>,
}

#[async_trait]
impl TypedProcessor for CountingSwitch {
    type Profile = Switch;

    fn name(&self) -> &str {
        self.name
    }

    fn can_process_typed(&self, _request: &Request, _profile: &Switch) -> bool {
        true
    }

    async fn process_typed(
        &self,
        _request: &Request,
        profile: Arc<Switch>,
    ) -> Result<Value, ProcessorError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        Ok(json!({ "served_by": self.name, "object": profile.object.as_str() }))
    }
}

struct MeterReader;

#[async_trait]
impl TypedProcessor for MeterReader {
    type Profile = Meter;

    fn name(&self) -> &str {
        "meter-reader"
    }

    fn can_process_typed(&self, request: &Request, _profile: &Meter) -> bool {
        request.verb == Verb::Get && request.path_is(&["reading"])
    }

    async fn process_typed(
        &self,
        request: &Request,
        _profile: Arc<Meter>,
    ) -> Result<Value, ProcessorError> {
        match request.body {
            Some(_) => Err(ProcessorError::bad_request("reading takes no body")),
            None => Ok(json!({ "reading": 42 })),
        }
    }
}

/// Untyped processor that accepts everything and panics while processing.
struct Exploding;

#[async_trait]
impl RequestProcessor for Exploding {
    fn name(&self) -> &str {
        "exploding"
    }

    fn profile_kind(&self) -> ProfileKind {
        Meter::KIND
    }

    fn can_process(&self, _request: &Request, target: &Target) -> bool {
        target.has_kind(&Meter::KIND)
    }

    async fn process(&self, _request: &Request, _target: &Target) -> Result<Value, ProcessorError> {
        panic!("meter exploded");
    }
}

struct PanickingProbe;

#[async_trait]
impl RequestProcessor for PanickingProbe {
    fn name(&self) -> &str {
        "panicking-probe"
    }

    fn profile_kind(&self) -> ProfileKind {
        Switch::KIND
    }

    fn can_process(&self, _request: &Request, _target: &Target) -> bool {
        panic!("probe exploded");
    }

    async fn process(&self, _request: &Request, _target: &Target) -> Result<Value, ProcessorError> {
        Ok(Value::Null)
    }
}

fn registry() -> Arc<CapabilityRegistry> {
    let registry = Arc::new(CapabilityRegistry::new());

    let switch_id = ObjectId::for_controller(1);
    registry
        .register_object(BusObject {
            id: switch_id.clone(),
            kind: ObjectKind::Controller,
            address: Address::controller_address(1),
            name: "Switch".to_string(),
        })
        .unwrap();
    registry
        .attach(&switch_id, Arc::new(Switch { object: switch_id.clone() }))
        .unwrap();

    let meter_id = ObjectId::for_zone(1, 1);
    registry
        .register_object(BusObject {
            id: meter_id.clone(),
            kind: ObjectKind::Zone,
            address: Address::zone_address(1, 1),
            name: "Meter".to_string(),
        })
        .unwrap();
    registry
        .attach(&meter_id, Arc::new(Meter { object: meter_id.clone() }))
        .unwrap();

    registry.seal();
    registry
}

#[tokio::test]
async fn test_first_matching_processor_wins() {
    let router = RequestRouter::new(registry());
    let first_calls = Arc::new(AtomicUsize::new(0));
    let second_calls = Arc::new(AtomicUsize::new(0));
    router.register_typed(CountingSwitch {
        name: "first",
        calls: first_calls.clone(),
    });
    router.register_typed(CountingSwitch {
        name: "second",
        calls: second_calls.clone(),
    });

    let response = router
        .route(&Request::new(Verb::Put, "state"), &ObjectId::for_controller(1))
        .await
        .unwrap();

    assert_eq!(response.processor, "first");
    assert_eq!(response.body["served_by"], "first");
    assert_eq!(first_calls.load(Ordering::SeqCst), 1);
    assert_eq!(second_calls.load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn test_processor_only_sees_its_own_capability() {
    let router = RequestRouter::new(registry());
    let calls = Arc::new(AtomicUsize::new(0));
    router.register_typed(CountingSwitch {
        name: "switch",
        calls: calls.clone(),
    });
    router.register_typed(MeterReader);

    let response = router
        .route(&Request::new(Verb::Get, "reading"), &ObjectId::for_zone(1, 1))
        .await
        .unwrap();
    assert_eq!(response.processor, "meter-reader");
    assert_eq!(response.body, json!({ "reading": 42 }));
    assert_eq!(calls.load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn test_no_match_is_no_handler() {
    let router = RequestRouter::new(registry());
    router.register_typed(MeterReader);

    let err = router
        .route(&Request::new(Verb::Delete, "reading"), &ObjectId::for_zone(1, 1))
        .await
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::NoHandler);

    let err = router
        .route(&Request::new(Verb::Get, "reading"), &ObjectId::for_controller(1))
        .await
        .unwrap_err();
    match err {
        BusError::NoHandler { verb, path, object } => {
            assert_eq!(verb, "GET");
            assert_eq!(path, "reading");
            assert_eq!(object, "controller-1");
        }
        other => panic!("unexpected error: {other:?}"),
    }
}

#[tokio::test]
async fn test_empty_router_is_no_handler() {
    let router = RequestRouter::new(registry());
    assert!(router.is_empty());
    let err = router
        .route(&Request::new(Verb::Get, ""), &ObjectId::for_controller(1))
        .await
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::NoHandler);
}

#[tokio::test]
async fn test_unknown_object_is_not_found() {
    let router = RequestRouter::new(registry());
    router.register_typed(MeterReader);
    let err = router
        .route(&Request::new(Verb::Get, "reading"), &ObjectId::new("controller-99"))
        .await
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::ObjectNotFound);
}

#[tokio::test]
async fn test_processor_error_is_wrapped() {
    let router = RequestRouter::new(registry());
    router.register_typed(MeterReader);

    let request = Request::new(Verb::Get, "reading").with_body(json!({ "x": 1 }));
    let err = router
        .route(&request, &ObjectId::for_zone(1, 1))
        .await
        .unwrap_err();
    match err {
        BusError::ProcessorFailure { processor, source } => {
            assert_eq!(processor, "meter-reader");
            assert_eq!(source.kind, FailureKind::BadRequest);
        }
        other => panic!("unexpected error: {other:?}"),
    }
}

#[tokio::test]
async fn test_panicking_processor_is_contained() {
    let router = RequestRouter::new(registry());
    router.register(Arc::new(Exploding));
    router.register_typed(MeterReader);

    let err = router
        .route(&Request::new(Verb::Get, "reading"), &ObjectId::for_zone(1, 1))
        .await
        .unwrap_err();
    match err {
        BusError::ProcessorFailure { processor, source } => {
            assert_eq!(processor, "exploding");
            assert_eq!(source.kind, FailureKind::Internal);
            assert!(source.message.contains("meter exploded"));
        }
        other => panic!("unexpected error: {other:?}"),
    }

    // The router keeps serving after a panic.
    let err = router
        .route(&Request::new(Verb::Get, "reading"), &ObjectId::for_zone(1, 1))
        .await
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::ProcessorFailure);
}

#[tokio::test]
async fn test_panicking_probe_counts_as_no_match() {
    let router = RequestRouter::new(registry());
    let calls = Arc::new(AtomicUsize::new(0));
    router.register(Arc::new(PanickingProbe));
    router.register_typed(CountingSwitch {
        name: "fallback",
        calls: calls.clone(),
    });

    let response = router
        .route(&Request::new(Verb::Post, "state"), &ObjectId::for_controller(1))
        .await
        .unwrap();
    assert_eq!(response.processor, "fallback");
    assert_eq!(calls.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn test_describe_lists_registration_order() {
    let router = RequestRouter::new(registry());
    router.register_typed(MeterReader);
    router.register(Arc::new(Exploding));

    let listing = router.describe();
    assert_eq!(listing.len(), 2);
    assert_eq!(listing[0].position, 0);
    assert_eq!(listing[0].name, "meter-reader");
    assert_eq!(listing[0].profile_kind, Meter::KIND);
    assert_eq!(listing[1].name, "exploding");
}

//! Raw parameter access below an object's address.
//!
//! Values travel as hex strings. Handles are resolved on first use and kept
//! for the profile's lifetime.

use std::any::Any;
use std::collections::BTreeMap;
use std::sync::Arc;

use async_trait::async_trait;
use busbridge_core::prelude::*;
use parking_lot::Mutex;
use serde_json::{json, Map, Value};

use crate::error::{DriverError, DriverResult};

pub struct ParameterProfile {
    object: ObjectId,
    base: Address,
    space: Arc<AddressSpace>,
    handles: Mutex<BTreeMap<u8, DataHandle>>,
}

impl ParameterProfile {
    pub fn new(space: Arc<AddressSpace>, object: &BusObject) -> Arc<Self> {
        Arc::new(Self {
            object: object.id.clone(),
            base: object.address,
            space,
            handles: Mutex::new(BTreeMap::new()),
        })
    }

    pub fn address_of(&self, parameter: u8) -> Address {
        self.base.with_parameter(parameter)
    }

    fn with_handle<T>(&self, parameter: u8, f: impl FnOnce(&DataHandle) -> T) -> T {
        let mut handles = self.handles.lock();
        let handle = handles
            .entry(parameter)
            .or_insert_with(|| self.space.resolve(self.base.with_parameter(parameter)));
        f(handle)
    }

    /// Last value the bus reported for `parameter`.
    pub fn read(&self, parameter: u8) -> Option<Payload> {
        self.with_handle(parameter, DataHandle::read)
    }

    pub fn write(&self, parameter: u8, kind: EventKind, payload: Vec<u8>) -> PendingSend {
        self.with_handle(parameter, |handle| handle.send_event(kind, payload))
    }

    /// Parameters touched so far with their cached values, hex-encoded.
    pub fn known_values(&self) -> BTreeMap<u8, Option<String>> {
        self.handles
            .lock()
            .iter()
            .map(|(parameter, handle)| (*parameter, handle.read().map(hex::encode)))
            .collect()
    }
}

impl Profile for ParameterProfile {
    fn kind(&self) -> ProfileKind {
        Self::KIND
    }

    fn object_id(&self) -> &ObjectId {
        &self.object
    }

    fn snapshot(&self) -> Value {
        let values: Map<String, Value> = self
            .known_values()
            .into_iter()
            .map(|(parameter, value)| (parameter.to_string(), json!(value)))
            .collect();
        json!({ "address": self.base.to_string(), "parameters": values })
    }

    fn into_any(self: Arc<Self>) -> Arc<dyn Any + Send + Sync> {
        self
    }
}

impl ProfileType for ParameterProfile {
    const KIND: ProfileKind = ProfileKind::from_static("bus.parameter");
}

fn parse_index(segment: &str) -> DriverResult<u8> {
    segment
        .parse()
        .map_err(|_| DriverError::UnknownParameter(format!("'{}' is not a parameter index 0-255", segment)))
}

/// Accepts `"0a01"` or `{"value": "0a01", "event": "set_parameter"}`.
fn parse_write(body: Option<&Value>) -> DriverResult<(EventKind, Vec<u8>)> {
    let (value, kind) = match body {
        Some(Value::String(s)) => (s.as_str(), EventKind::SetParameter),
        Some(Value::Object(map)) => {
            let value = map
                .get("value")
                .and_then(Value::as_str)
                .ok_or_else(|| DriverError::InvalidBody("expected hex string 'value'".to_string()))?;
            let kind = match map.get("event") {
                Some(event) => serde_json::from_value(event.clone())
                    .map_err(|e| DriverError::InvalidBody(format!("unknown event: {}", e)))?,
                None => EventKind::SetParameter,
            };
            (value, kind)
        }
        _ => {
            return Err(DriverError::InvalidBody(
                "expected a hex string or {\"value\": ...}".to_string(),
            ))
        }
    };
    let payload = hex::decode(value.trim())
        .map_err(|e| DriverError::InvalidBody(format!("invalid hex value: {}", e)))?;
    Ok((kind, payload))
}

/// Serves `GET parameters`, `GET parameters/{n}` and `PUT|POST parameters/{n}`.
pub struct ParameterProcessor;

#[async_trait]
impl TypedProcessor for ParameterProcessor {
    type Profile = ParameterProfile;

    fn name(&self) -> &str {
        "parameter"
    }

    fn can_process_typed(&self, request: &Request, _profile: &ParameterProfile) -> bool {
        if request.segment(0) != Some("parameters") {
            return false;
        }
        match (request.verb, request.path.len()) {
            (Verb::Get, 1 | 2) => true,
            (Verb::Put | Verb::Post, 2) => true,
            _ => false,
        }
    }

    async fn process_typed(
        &self,
        request: &Request,
        profile: Arc<ParameterProfile>,
    ) -> std::result::Result<Value, ProcessorError> {
        let Some(segment) = request.segment(1) else {
            return Ok(profile.snapshot());
        };
        let parameter = parse_index(segment)?;
        let address = profile.address_of(parameter).to_string();

        if request.verb == Verb::Get {
            let value = profile.read(parameter).map(hex::encode);
            return Ok(json!({ "address": address, "value": value }));
        }

        let (kind, payload) = parse_write(request.body.as_ref())?;
        let written = hex::encode(&payload);
        profile.write(parameter, kind, payload).await?;
        Ok(json!({ "address": address, "event": kind, "written": written }))
    }
}

//! Controller power.
//!
//! A controller reports its power state at parameter 7 below its own
//! address. Switching goes through an `AllZonesOnOff` event; the cached
//! state only changes once the bus reports the new value.

use std::any::Any;
use std::sync::Arc;

use async_trait::async_trait;
use busbridge_core::prelude::*;
use busbridge_core::{EventBusReceiver, HandleError};
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use tokio::sync::broadcast;

use crate::body::parse_switch;

/// Parameter carrying a controller's power state.
pub const POWER_PARAMETER: u8 = 7;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PowerState {
    On,
    Off,
    /// Nothing reported by the bus yet.
    Unknown,
}

impl PowerState {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::On => "on",
            Self::Off => "off",
            Self::Unknown => "unknown",
        }
    }
}

impl From<Option<bool>> for PowerState {
    fn from(value: Option<bool>) -> Self {
        match value {
            Some(true) => Self::On,
            Some(false) => Self::Off,
            None => Self::Unknown,
        }
    }
}

pub struct PowerProfile {
    object: ObjectId,
    handle: DataHandle,
    state: Arc<RwLock<Option<bool>>>,
    changes: EventBus,
}

impl PowerProfile {
    /// Bind to the power parameter of `object`'s controller and start
    /// tracking the reported state.
    pub fn attach(space: &AddressSpace, object: &BusObject) -> Result<Arc<Self>> {
        let address = Address::controller_address(object.address.controller())
            .with_parameter(POWER_PARAMETER);
        let handle = space.resolve(address);
        let state = Arc::new(RwLock::new(None));
        let changes = EventBus::with_name(format!("{}/power", object.id));

        // The callback holds shared state only, never the profile itself.
        let tracked = state.clone();
        let bus = changes.clone();
        let id = object.id.clone();
        handle.subscribe_fn(move |payload: Payload| {
            let Some(&byte) = payload.first() else {
                tracing::warn!(object = %id, "Empty power report ignored");
                return;
            };
            let on = byte != 0;
            let previous = tracked.write().replace(on);
            if previous != Some(on) {
                bus.publish(BridgeEvent::property_changed(
                    id.clone(),
                    PowerProfile::KIND,
                    "power",
                    json!(PowerState::from(Some(on)).as_str()),
                ));
            }
        })?;

        Ok(Arc::new(Self {
            object: object.id.clone(),
            handle,
            state,
            changes,
        }))
    }

    pub fn address(&self) -> Address {
        self.handle.address()
    }

    pub fn power(&self) -> PowerState {
        PowerState::from(*self.state.read())
    }

    /// Switch all zones of the controller on or off.
    pub fn set_power(&self, on: bool) -> PendingSend {
        tracing::debug!(object = %self.object, on, "Switching controller power");
        self.handle
            .send_event(EventKind::AllZonesOnOff, vec![u8::from(on)])
    }

    /// Power state changes as reported by the bus.
    pub fn changes(&self) -> EventBusReceiver {
        self.changes.subscribe()
    }

    pub fn errors(&self) -> broadcast::Receiver<HandleError> {
        self.handle.errors()
    }
}

impl Profile for PowerProfile {
    fn kind(&self) -> ProfileKind {
        Self::KIND
    }

    fn object_id(&self) -> &ObjectId {
        &self.object
    }

    fn snapshot(&self) -> Value {
        json!({ "power": self.power().as_str() })
    }

    fn into_any(self: Arc<Self>) -> Arc<dyn Any + Send + Sync> {
        self
    }
}

impl ProfileType for PowerProfile {
    const KIND: ProfileKind = ProfileKind::from_static("audio.power");
}

/// Serves `GET power` and `PUT|POST power`.
pub struct PowerProcessor;

#[async_trait]
impl TypedProcessor for PowerProcessor {
    type Profile = PowerProfile;

    fn name(&self) -> &str {
        "power"
    }

    fn can_process_typed(&self, request: &Request, _profile: &PowerProfile) -> bool {
        request.path_is(&["power"]) && matches!(request.verb, Verb::Get | Verb::Put | Verb::Post)
    }

    async fn process_typed(
        &self,
        request: &Request,
        profile: Arc<PowerProfile>,
    ) -> std::result::Result<Value, ProcessorError> {
        if request.verb == Verb::Get {
            return Ok(profile.snapshot());
        }

        let on = parse_switch(request.body.as_ref(), "power")?;
        profile.set_power(on).await?;
        Ok(json!({
            "requested": PowerState::from(Some(on)).as_str(),
            "power": profile.power().as_str(),
        }))
    }
}

//! Zone volume, reported at parameter 3 below the zone address.

use std::any::Any;
use std::sync::Arc;

use async_trait::async_trait;
use busbridge_core::prelude::*;
use busbridge_core::EventBusReceiver;
use parking_lot::RwLock;
use serde_json::{json, Value};

use crate::body::parse_level;
use crate::error::{DriverError, DriverResult};

pub const VOLUME_PARAMETER: u8 = 3;
pub const MAX_VOLUME: u8 = 100;

pub struct VolumeProfile {
    object: ObjectId,
    handle: DataHandle,
    level: Arc<RwLock<Option<u8>>>,
    changes: EventBus,
}

impl VolumeProfile {
    pub fn attach(space: &AddressSpace, object: &BusObject) -> Result<Arc<Self>> {
        let handle = space.resolve(object.address.with_parameter(VOLUME_PARAMETER));
        let level = Arc::new(RwLock::new(None));
        let changes = EventBus::with_name(format!("{}/volume", object.id));

        let tracked = level.clone();
        let bus = changes.clone();
        let id = object.id.clone();
        handle.subscribe_fn(move |payload: Payload| {
            let Some(&reported) = payload.first() else {
                tracing::warn!(object = %id, "Empty volume report ignored");
                return;
            };
            let reported = reported.min(MAX_VOLUME);
            if tracked.write().replace(reported) != Some(reported) {
                bus.publish(BridgeEvent::property_changed(
                    id.clone(),
                    VolumeProfile::KIND,
                    "volume",
                    json!(reported),
                ));
            }
        })?;

        Ok(Arc::new(Self {
            object: object.id.clone(),
            handle,
            level,
            changes,
        }))
    }

    pub fn address(&self) -> Address {
        self.handle.address()
    }

    /// Last reported level, 0-100.
    pub fn volume(&self) -> Option<u8> {
        *self.level.read()
    }

    /// Request a new level. Levels above [`MAX_VOLUME`] are rejected before
    /// anything reaches the bus.
    pub fn set_volume(&self, level: u64) -> DriverResult<PendingSend> {
        let level = u8::try_from(level)
            .ok()
            .filter(|l| *l <= MAX_VOLUME)
            .ok_or_else(|| {
                DriverError::OutOfRange(format!("volume must be 0-{}, got {}", MAX_VOLUME, level))
            })?;
        Ok(self.handle.send_event(EventKind::SetVolume, vec![level]))
    }

    pub fn changes(&self) -> EventBusReceiver {
        self.changes.subscribe()
    }
}

impl Profile for VolumeProfile {
    fn kind(&self) -> ProfileKind {
        Self::KIND
    }

    fn object_id(&self) -> &ObjectId {
        &self.object
    }

    fn snapshot(&self) -> Value {
        json!({ "volume": self.volume() })
    }

    fn into_any(self: Arc<Self>) -> Arc<dyn Any + Send + Sync> {
        self
    }
}

impl ProfileType for VolumeProfile {
    const KIND: ProfileKind = ProfileKind::from_static("audio.volume");
}

pub struct VolumeProcessor;

#[async_trait]
impl TypedProcessor for VolumeProcessor {
    type Profile = VolumeProfile;

    fn name(&self) -> &str {
        "volume"
    }

    fn can_process_typed(&self, request: &Request, _profile: &VolumeProfile) -> bool {
        request.path_is(&["volume"]) && matches!(request.verb, Verb::Get | Verb::Put | Verb::Post)
    }

    async fn process_typed(
        &self,
        request: &Request,
        profile: Arc<VolumeProfile>,
    ) -> std::result::Result<Value, ProcessorError> {
        if request.verb == Verb::Get {
            return Ok(profile.snapshot());
        }

        let level = parse_level(request.body.as_ref(), "volume")?;
        profile.set_volume(level)?.await?;
        Ok(json!({ "requested": level, "volume": profile.volume() }))
    }
}

//! Startup composition: objects, profiles and processors.

use std::sync::Arc;

use busbridge_core::{
    AddressSpace, BusObject, CapabilityRegistry, ObjectKind, Profile, RequestRouter, Result,
};

use crate::parameter::{ParameterProcessor, ParameterProfile};
use crate::power::{PowerProcessor, PowerProfile};
use crate::volume::{VolumeProcessor, VolumeProfile};

pub struct Composition {
    pub registry: Arc<CapabilityRegistry>,
    pub router: Arc<RequestRouter>,
}

fn profiles_for(space: &Arc<AddressSpace>, object: &BusObject) -> Result<Vec<Arc<dyn Profile>>> {
    let mut profiles: Vec<Arc<dyn Profile>> = Vec::new();
    match object.kind {
        ObjectKind::Controller => profiles.push(PowerProfile::attach(space, object)?),
        ObjectKind::Zone => profiles.push(VolumeProfile::attach(space, object)?),
    }
    profiles.push(ParameterProfile::new(space.clone(), object));
    Ok(profiles)
}

/// Register every object of the topology with its profiles, seal the
/// registry, then register processors. Processor order is routing priority.
pub fn compose(space: &Arc<AddressSpace>) -> Result<Composition> {
    let registry = Arc::new(CapabilityRegistry::new());

    for object in space.objects() {
        registry.register_object(object.clone())?;
        for profile in profiles_for(space, &object)? {
            registry.attach(&object.id, profile)?;
        }
    }
    registry.seal();

    let router = Arc::new(RequestRouter::new(registry.clone()));
    router.register_typed(PowerProcessor);
    router.register_typed(VolumeProcessor);
    router.register_typed(ParameterProcessor);

    tracing::info!(
        category = "compose",
        objects = registry.len(),
        processors = router.len(),
        "Composition complete"
    );
    Ok(Composition { registry, router })
}

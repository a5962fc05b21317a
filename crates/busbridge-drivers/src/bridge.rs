//! Running bridge: bus link, address space and composed routing.

use std::sync::Arc;

use busbridge_core::{
    downcast_profile, Address, AddressSpace, BridgeConfig, BusLink, BusObject, CapabilityRegistry,
    ObjectId, Profile, ProfileKind, Request, RequestRouter, Response, Result, Transport,
};
use serde::Serialize;

use crate::compose::{compose, Composition};
use crate::power::PowerProfile;
use crate::volume::VolumeProfile;

/// One profile of an object, as listed by the bridge.
#[derive(Debug, Clone, Serialize)]
pub struct ProfileSummary {
    pub kind: ProfileKind,
    /// Address the profile is bound to; for raw parameter access, the base.
    pub address: Address,
    pub state: serde_json::Value,
}

#[derive(Debug, Clone, Serialize)]
pub struct ObjectSummary {
    #[serde(flatten)]
    pub object: BusObject,
    pub profiles: Vec<ProfileSummary>,
}

pub struct Bridge {
    config: BridgeConfig,
    link: Arc<BusLink>,
    space: Arc<AddressSpace>,
    registry: Arc<CapabilityRegistry>,
    router: Arc<RequestRouter>,
}

impl Bridge {
    /// Validate `config`, connect `transport` and compose the object tree.
    pub async fn start(config: BridgeConfig, transport: Arc<dyn Transport>) -> Result<Self> {
        Self::start_with(config, transport, compose).await
    }

    async fn start_with<C>(
        config: BridgeConfig,
        transport: Arc<dyn Transport>,
        compose: C,
    ) -> Result<Self>
    where
        C: FnOnce(&Arc<AddressSpace>) -> Result<Composition>,
    {
        config.validate()?;

        let link = BusLink::new(transport, &config.bus);
        link.start().await?;

        let space = Arc::new(AddressSpace::new(config.topology.clone(), link.clone()));
        let Composition { registry, router } = match compose(&space) {
            Ok(composition) => composition,
            Err(e) => {
                tracing::error!(category = "bridge", error = %e, "Composition failed, disconnecting");
                link.shutdown().await;
                return Err(e);
            }
        };

        tracing::info!(
            category = "bridge",
            transport = %link.transport_name(),
            controllers = config.topology.controllers.len(),
            objects = registry.len(),
            "Bridge started"
        );
        Ok(Self {
            config,
            link,
            space,
            registry,
            router,
        })
    }

    pub async fn shutdown(&self) {
        self.link.shutdown().await;
    }

    pub fn config(&self) -> &BridgeConfig {
        &self.config
    }

    pub fn link(&self) -> &Arc<BusLink> {
        &self.link
    }

    pub fn space(&self) -> &Arc<AddressSpace> {
        &self.space
    }

    pub fn registry(&self) -> &Arc<CapabilityRegistry> {
        &self.registry
    }

    pub fn router(&self) -> &Arc<RequestRouter> {
        &self.router
    }

    pub async fn route(&self, request: &Request, object_id: &ObjectId) -> Result<Response> {
        self.router.route(request, object_id).await
    }

    pub fn describe(&self, object_id: &ObjectId) -> Option<ObjectSummary> {
        let (object, profiles) = self.registry.lookup(object_id)?;
        let profiles = profiles.iter().map(|p| summarize(&object, p)).collect();
        Some(ObjectSummary { object, profiles })
    }

    /// Every object in registration order.
    pub fn describe_all(&self) -> Vec<ObjectSummary> {
        self.registry
            .objects()
            .iter()
            .filter_map(|object| self.describe(&object.id))
            .collect()
    }
}

fn summarize(object: &BusObject, profile: &Arc<dyn Profile>) -> ProfileSummary {
    let address = if let Some(power) = downcast_profile::<PowerProfile>(profile) {
        power.address()
    } else if let Some(volume) = downcast_profile::<VolumeProfile>(profile) {
        volume.address()
    } else {
        object.address
    };
    ProfileSummary {
        kind: profile.kind(),
        address,
        state: profile.snapshot(),
    }
}

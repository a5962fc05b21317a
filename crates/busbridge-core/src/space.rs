//! Address space: the configured bus topology and the entry point for
//! resolving coordinates into data handles.

use std::fmt;
use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::address::Address;
use crate::error::Result;
use crate::handle::DataHandle;
use crate::link::BusLink;

/// Stable identity of a bus object.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ObjectId(String);

impl ObjectId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn for_controller(controller: u8) -> Self {
        Self(format!("controller-{}", controller))
    }

    pub fn for_zone(controller: u8, zone: u8) -> Self {
        Self(format!("controller-{}.zone-{}", controller, zone))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ObjectId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for ObjectId {
    fn from(s: &str) -> Self {
        Self::new(s)
    }
}

impl From<String> for ObjectId {
    fn from(s: String) -> Self {
        Self(s)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ObjectKind {
    Controller,
    Zone,
}

/// An entity on the bus that profiles can be attached to.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BusObject {
    pub id: ObjectId,
    pub kind: ObjectKind,
    pub address: Address,
    pub name: String,
}

/// One configured controller.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ControllerSpec {
    /// Controller number on the bus (first address component).
    pub number: u8,
    #[serde(default)]
    pub name: String,
    /// Zones are numbered `1..=zones`; zone 0 addresses the controller itself.
    #[serde(default)]
    pub zones: u8,
}

impl ControllerSpec {
    pub fn new(number: u8, zones: u8) -> Self {
        Self {
            number,
            name: String::new(),
            zones,
        }
    }

    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = name.into();
        self
    }

    fn display_name(&self) -> String {
        if self.name.is_empty() {
            format!("Controller {}", self.number)
        } else {
            self.name.clone()
        }
    }
}

/// Bus topology, discovered or configured once at startup.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Topology {
    #[serde(default)]
    pub controllers: Vec<ControllerSpec>,
}

impl Topology {
    pub fn new(controllers: Vec<ControllerSpec>) -> Self {
        Self { controllers }
    }

    /// One object per controller followed by its zones.
    pub fn objects(&self) -> Vec<BusObject> {
        let mut objects = Vec::new();
        for controller in &self.controllers {
            let base = controller.display_name();
            objects.push(BusObject {
                id: ObjectId::for_controller(controller.number),
                kind: ObjectKind::Controller,
                address: Address::controller_address(controller.number),
                name: base.clone(),
            });
            for zone in 1..=controller.zones {
                objects.push(BusObject {
                    id: ObjectId::for_zone(controller.number, zone),
                    kind: ObjectKind::Zone,
                    address: Address::zone_address(controller.number, zone),
                    name: format!("{} / Zone {}", base, zone),
                });
            }
        }
        objects
    }

    /// Whether the address falls under a configured controller and zone.
    pub fn contains(&self, address: &Address) -> bool {
        self.controllers
            .iter()
            .any(|c| c.number == address.controller() && address.zone() <= c.zones)
    }
}

/// Resolves coordinates into [`DataHandle`]s bound to a bus link.
pub struct AddressSpace {
    topology: Topology,
    link: Arc<BusLink>,
}

impl AddressSpace {
    pub fn new(topology: Topology, link: Arc<BusLink>) -> Self {
        Self { topology, link }
    }

    /// New, independent handle for `address`. Never fails: whether the slot
    /// physically exists is only discovered at I/O time.
    pub fn resolve(&self, address: Address) -> DataHandle {
        if !self.topology.contains(&address) {
            tracing::debug!(address = %address, "Resolving address outside configured topology");
        }
        DataHandle::new(address, Arc::downgrade(&self.link))
    }

    /// Resolve a raw coordinate tuple, rejecting malformed ones.
    pub fn resolve_coords(&self, coords: &[u32]) -> Result<DataHandle> {
        let address = Address::try_from(coords)?;
        Ok(self.resolve(address))
    }

    /// Resolve an address literal such as `[2,0,0,7]`.
    pub fn resolve_str(&self, literal: &str) -> Result<DataHandle> {
        let address = Address::parse(literal)?;
        Ok(self.resolve(address))
    }

    pub fn topology(&self) -> &Topology {
        &self.topology
    }

    pub fn objects(&self) -> Vec<BusObject> {
        self.topology.objects()
    }

    pub fn object(&self, id: &ObjectId) -> Option<BusObject> {
        self.objects().into_iter().find(|o| &o.id == id)
    }

    pub fn link(&self) -> &Arc<BusLink> {
        &self.link
    }
}

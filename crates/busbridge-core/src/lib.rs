//! Core of the bus bridge.
//!
//! ## Architecture
//!
//! ```text
//! Transport ──updates──▶ EventDispatcher ──▶ DataHandle subscriptions ──▶ profiles
//!     ▲                                                                    │
//!     └──── BusLink write queue ◀── DataHandle::send_event ◀── RequestRouter
//! ```
//!
//! - **AddressSpace** resolves `[controller, zone, group, parameter]`
//!   coordinates into [`DataHandle`]s.
//! - **EventDispatcher** fans bus updates out to subscriptions, per address
//!   in arrival order, dropping subscribers that stall.
//! - **CapabilityRegistry** records which profiles each bus object carries.
//! - **RequestRouter** hands requests to the first processor whose
//!   capability probe accepts the target.

pub mod address;
pub mod capability;
pub mod config;
pub mod dispatcher;
pub mod error;
pub mod eventbus;
pub mod handle;
pub mod link;
pub mod router;
pub mod space;
pub mod transport;

pub use address::{Address, ADDRESS_ARITY};
pub use capability::{downcast_profile, CapabilityRegistry, Profile, ProfileKind, ProfileType};
pub use config::{BridgeConfig, BusSettings, ServerSettings};
pub use dispatcher::{DispatcherStats, EventDispatcher, HandleError, SubscriptionToken};
pub use error::{BusError, ErrorKind, FailureKind, ProcessorError, Result, TransportError};
pub use eventbus::{BridgeEvent, EventBus, EventBusReceiver, EventMetadata, FilteredReceiver};
pub use handle::{DataHandle, PendingSend};
pub use link::BusLink;
pub use router::{
    ProcessorInfo, ProfileProcessor, Request, RequestProcessor, RequestRouter, Response, Target,
    TypedProcessor, Verb,
};
pub use space::{AddressSpace, BusObject, ControllerSpec, ObjectId, ObjectKind, Topology};
pub use transport::{
    BusUpdate, EventKind, LoopbackTransport, OutboundEvent, Payload, Transport, UpdateSink,
};

/// Re-exports for driver crates.
pub mod prelude {
    pub use crate::address::Address;
    pub use crate::capability::{Profile, ProfileKind, ProfileType};
    pub use crate::error::{BusError, ProcessorError, Result};
    pub use crate::eventbus::{BridgeEvent, EventBus};
    pub use crate::handle::{DataHandle, PendingSend};
    pub use crate::router::{Request, TypedProcessor, Verb};
    pub use crate::space::{AddressSpace, BusObject, ObjectId, ObjectKind};
    pub use crate::transport::{EventKind, Payload};
}

pub const VERSION: &str = env!("CARGO_PKG_VERSION");

//! Transport contract.
//!
//! The transport performs raw bus I/O. The core never sees byte-level
//! framing: it hands the transport [`OutboundEvent`]s and receives decoded
//! [`BusUpdate`]s through an [`UpdateSink`].

pub mod loopback;

use async_trait::async_trait;
use bytes::Bytes;
use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;

use crate::address::{Address, ADDRESS_ARITY};
use crate::error::TransportError;

pub use loopback::LoopbackTransport;

/// Raw value carried for one address.
pub type Payload = Bytes;

/// Result type for transport operations.
pub type TransportResult<T> = std::result::Result<T, TransportError>;

/// Channel the transport pushes decoded updates into.
pub type UpdateSink = mpsc::UnboundedSender<BusUpdate>;

/// A value change reported by the bus.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BusUpdate {
    pub address: Address,
    pub payload: Payload,
}

impl BusUpdate {
    pub fn new(address: Address, payload: impl Into<Payload>) -> Self {
        Self {
            address,
            payload: payload.into(),
        }
    }
}

/// Commands understood by controllers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EventKind {
    /// Switch every zone of a controller on or off.
    AllZonesOnOff,
    /// Switch a single zone on or off.
    ZoneOnOff,
    /// Set a zone volume (0-100).
    SetVolume,
    /// Write a raw parameter value.
    SetParameter,
}

impl EventKind {
    /// Numeric event code as used on the bus.
    pub fn code(&self) -> u8 {
        match self {
            Self::AllZonesOnOff => 0x01,
            Self::ZoneOnOff => 0x02,
            Self::SetVolume => 0x10,
            Self::SetParameter => 0x7f,
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            Self::AllZonesOnOff => "all_zones_on_off",
            Self::ZoneOnOff => "zone_on_off",
            Self::SetVolume => "set_volume",
            Self::SetParameter => "set_parameter",
        }
    }
}

impl std::fmt::Display for EventKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.name())
    }
}

/// An event addressed to the bus: `(kind, address, value)`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OutboundEvent {
    pub address: Address,
    pub kind: EventKind,
    pub payload: Payload,
}

impl OutboundEvent {
    pub fn new(address: Address, kind: EventKind, payload: impl Into<Payload>) -> Self {
        Self {
            address,
            kind,
            payload: payload.into(),
        }
    }

    /// Address suffix relative to the controller the event is sent to.
    pub fn suffix(&self) -> [u8; ADDRESS_ARITY - 1] {
        self.address.suffix()
    }
}

/// External collaborator performing bus I/O.
///
/// Implementations must serialize writes internally; the core additionally
/// funnels all writes through a single queue per bus link.
#[async_trait]
pub trait Transport: Send + Sync {
    /// Short identifier used in logs.
    fn name(&self) -> &str;

    async fn connect(&self) -> TransportResult<()>;

    async fn disconnect(&self);

    fn is_connected(&self) -> bool;

    /// Ask the bus to apply an event. Returns once the bus accepted or
    /// rejected it.
    async fn send(&self, event: OutboundEvent) -> TransportResult<()>;

    /// Register a sink for decoded bus updates. Updates for one address must
    /// be pushed in bus-arrival order.
    fn on_update(&self, sink: UpdateSink);
}

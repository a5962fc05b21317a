//! Change-notification bus.
//!
//! Profiles own one `EventBus` each and push property changes through it;
//! the bus link owns another for system events (transport state, dropped
//! subscribers). Subscribers get a broadcast receiver, optionally filtered.

use serde::Serialize;
use tokio::sync::broadcast;
use uuid::Uuid;

use crate::address::Address;
use crate::capability::ProfileKind;
use crate::dispatcher::SubscriptionToken;
use crate::space::ObjectId;

/// Default channel capacity for an event bus.
pub const DEFAULT_CHANNEL_CAPACITY: usize = 256;

/// Events raised by the bridge.
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "type")]
pub enum BridgeEvent {
    /// A profile's cached state changed after a bus update.
    PropertyChanged {
        object: ObjectId,
        profile: ProfileKind,
        property: String,
        value: serde_json::Value,
        timestamp: i64,
    },
    /// A subscriber missed its delivery budget and was removed.
    SubscriptionDropped {
        address: Address,
        token: SubscriptionToken,
        reason: String,
        timestamp: i64,
    },
    TransportConnected {
        transport: String,
        timestamp: i64,
    },
    TransportDisconnected {
        transport: String,
        timestamp: i64,
    },
}

impl BridgeEvent {
    pub fn property_changed(
        object: ObjectId,
        profile: ProfileKind,
        property: impl Into<String>,
        value: serde_json::Value,
    ) -> Self {
        Self::PropertyChanged {
            object,
            profile,
            property: property.into(),
            value,
            timestamp: chrono::Utc::now().timestamp_millis(),
        }
    }

    pub fn type_name(&self) -> &'static str {
        match self {
            Self::PropertyChanged { .. } => "PropertyChanged",
            Self::SubscriptionDropped { .. } => "SubscriptionDropped",
            Self::TransportConnected { .. } => "TransportConnected",
            Self::TransportDisconnected { .. } => "TransportDisconnected",
        }
    }

    /// Object the event belongs to, if any.
    pub fn object(&self) -> Option<&ObjectId> {
        match self {
            Self::PropertyChanged { object, .. } => Some(object),
            _ => None,
        }
    }

    pub fn is_system_event(&self) -> bool {
        !matches!(self, Self::PropertyChanged { .. })
    }
}

/// Metadata attached to every published event.
#[derive(Debug, Clone, Serialize)]
pub struct EventMetadata {
    pub event_id: Uuid,
    pub source: String,
    pub timestamp: i64,
}

impl EventMetadata {
    pub fn new(source: impl Into<String>) -> Self {
        Self {
            event_id: Uuid::new_v4(),
            source: source.into(),
            timestamp: chrono::Utc::now().timestamp_millis(),
        }
    }
}

/// Broadcast bus for [`BridgeEvent`]s.
#[derive(Clone)]
pub struct EventBus {
    tx: broadcast::Sender<(BridgeEvent, EventMetadata)>,
    name: String,
}

impl EventBus {
    pub fn new() -> Self {
        Self::with_capacity(DEFAULT_CHANNEL_CAPACITY)
    }

    /// The capacity determines how many events are buffered for slow subscribers.
    pub fn with_capacity(capacity: usize) -> Self {
        let (tx, _) = broadcast::channel(capacity.max(1));
        Self {
            tx,
            name: "default".to_string(),
        }
    }

    pub fn with_name(name: impl Into<String>) -> Self {
        Self {
            tx: broadcast::channel(DEFAULT_CHANNEL_CAPACITY).0,
            name: name.into(),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn subscriber_count(&self) -> usize {
        self.tx.receiver_count()
    }

    /// Publish with the bus name as source. Returns `true` if at least one
    /// subscriber was listening.
    pub fn publish(&self, event: BridgeEvent) -> bool {
        let metadata = EventMetadata::new(self.name.clone());
        self.publish_with_metadata(event, metadata)
    }

    pub fn publish_with_metadata(&self, event: BridgeEvent, metadata: EventMetadata) -> bool {
        self.tx.send((event, metadata)).is_ok()
    }

    /// Subscribe to every event. A subscriber that falls behind skips the
    /// oldest buffered events.
    pub fn subscribe(&self) -> EventBusReceiver {
        EventBusReceiver {
            rx: self.tx.subscribe(),
        }
    }

    pub fn subscribe_filtered<F>(&self, filter: F) -> FilteredReceiver<F>
    where
        F: Fn(&BridgeEvent) -> bool + Send + 'static,
    {
        FilteredReceiver::new(self.tx.subscribe(), filter)
    }

    pub fn filter(&self) -> FilterBuilder {
        FilterBuilder {
            tx: self.tx.clone(),
        }
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new()
    }
}

/// Receiver for all events of a bus.
pub struct EventBusReceiver {
    rx: broadcast::Receiver<(BridgeEvent, EventMetadata)>,
}

impl EventBusReceiver {
    /// Returns `None` once the bus is closed.
    pub async fn recv(&mut self) -> Option<(BridgeEvent, EventMetadata)> {
        loop {
            match self.rx.recv().await {
                Ok(event) => return Some(event),
                Err(broadcast::error::RecvError::Lagged(skipped)) => {
                    tracing::debug!(skipped, "Event receiver lagged");
                    continue;
                }
                Err(broadcast::error::RecvError::Closed) => return None,
            }
        }
    }

    pub fn try_recv(&mut self) -> Option<(BridgeEvent, EventMetadata)> {
        self.rx.try_recv().ok()
    }
}

/// Receiver that only yields events accepted by a filter.
pub struct FilteredReceiver<F>
where
    F: Fn(&BridgeEvent) -> bool + Send,
{
    rx: broadcast::Receiver<(BridgeEvent, EventMetadata)>,
    filter: F,
}

impl<F> FilteredReceiver<F>
where
    F: Fn(&BridgeEvent) -> bool + Send,
{
    fn new(rx: broadcast::Receiver<(BridgeEvent, EventMetadata)>, filter: F) -> Self {
        Self { rx, filter }
    }

    pub async fn recv(&mut self) -> Option<(BridgeEvent, EventMetadata)> {
        loop {
            match self.rx.recv().await {
                Ok((event, meta)) => {
                    if (self.filter)(&event) {
                        return Some((event, meta));
                    }
                }
                Err(broadcast::error::RecvError::Lagged(_)) => continue,
                Err(broadcast::error::RecvError::Closed) => return None,
            }
        }
    }

    pub fn try_recv(&mut self) -> Option<(BridgeEvent, EventMetadata)> {
        while let Ok((event, meta)) = self.rx.try_recv() {
            if (self.filter)(&event) {
                return Some((event, meta));
            }
        }
        None
    }
}

/// Shortcuts for common filters.
pub struct FilterBuilder {
    tx: broadcast::Sender<(BridgeEvent, EventMetadata)>,
}

impl FilterBuilder {
    /// Property changes of a single object.
    pub fn object(
        self,
        object: ObjectId,
    ) -> FilteredReceiver<impl Fn(&BridgeEvent) -> bool + Send> {
        FilteredReceiver::new(self.tx.subscribe(), move |event: &BridgeEvent| {
            event.object() == Some(&object)
        })
    }

    /// Changes of one named property on any object.
    pub fn property(
        self,
        property: impl Into<String>,
    ) -> FilteredReceiver<impl Fn(&BridgeEvent) -> bool + Send> {
        let wanted = property.into();
        FilteredReceiver::new(self.tx.subscribe(), move |event: &BridgeEvent| {
            matches!(event, BridgeEvent::PropertyChanged { property, .. } if *property == wanted)
        })
    }

    /// Transport and dispatcher events.
    pub fn system_events(self) -> FilteredReceiver<impl Fn(&BridgeEvent) -> bool + Send> {
        FilteredReceiver::new(self.tx.subscribe(), |event: &BridgeEvent| {
            event.is_system_event()
        })
    }
}

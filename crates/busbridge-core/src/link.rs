//! Bus link: owns the shared transport, the dispatcher feeding subscribers,
//! and the write queue that serializes every outbound event.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::{mpsc, oneshot};

use crate::config::BusSettings;
use crate::dispatcher::EventDispatcher;
use crate::error::{BusError, Result};
use crate::eventbus::{BridgeEvent, EventBus};
use crate::transport::{OutboundEvent, Transport};

struct WriteRequest {
    event: OutboundEvent,
    reply: oneshot::Sender<Result<()>>,
}

pub struct BusLink {
    transport: Arc<dyn Transport>,
    dispatcher: Arc<EventDispatcher>,
    events: EventBus,
    writes: mpsc::UnboundedSender<WriteRequest>,
    started: AtomicBool,
    /// Set once the transport's update sink feeds the dispatcher.
    dispatching: AtomicBool,
}

impl BusLink {
    /// Create a link over `transport`.
    ///
    /// Must be called inside a Tokio runtime: the write queue worker is
    /// spawned immediately so sends issued before [`start`](Self::start)
    /// fail fast instead of piling up.
    pub fn new(transport: Arc<dyn Transport>, settings: &BusSettings) -> Arc<Self> {
        let events = EventBus::with_capacity(settings.notification_capacity);
        let dispatcher = Arc::new(EventDispatcher::new(
            settings.delivery_timeout(),
            events.clone(),
        ));

        let (writes, rx) = mpsc::unbounded_channel();
        tokio::spawn(write_loop(transport.clone(), rx, settings.send_timeout()));

        Arc::new(Self {
            transport,
            dispatcher,
            events,
            writes,
            started: AtomicBool::new(false),
            dispatching: AtomicBool::new(false),
        })
    }

    /// Connect the transport and start feeding its updates to the dispatcher.
    ///
    /// Restarting after [`shutdown`](Self::shutdown) reconnects the
    /// transport; the update sink registered on the first start is reused.
    pub async fn start(&self) -> Result<()> {
        if self.started.swap(true, Ordering::SeqCst) {
            return Ok(());
        }

        if let Err(e) = self.transport.connect().await {
            self.started.store(false, Ordering::SeqCst);
            tracing::error!(category = "bus", transport = %self.transport.name(), error = %e, "Failed to connect transport");
            return Err(e.into());
        }

        if !self.dispatching.swap(true, Ordering::SeqCst) {
            let (sink, updates) = mpsc::unbounded_channel();
            self.transport.on_update(sink);
            tokio::spawn(self.dispatcher.clone().run(updates));
        }

        self.events.publish(BridgeEvent::TransportConnected {
            transport: self.transport.name().to_string(),
            timestamp: chrono::Utc::now().timestamp_millis(),
        });
        tracing::info!(category = "bus", transport = %self.transport.name(), "Bus link started");
        Ok(())
    }

    pub async fn shutdown(&self) {
        if !self.started.swap(false, Ordering::SeqCst) {
            return;
        }
        self.transport.disconnect().await;
        self.events.publish(BridgeEvent::TransportDisconnected {
            transport: self.transport.name().to_string(),
            timestamp: chrono::Utc::now().timestamp_millis(),
        });
        tracing::info!(category = "bus", transport = %self.transport.name(), "Bus link shut down");
    }

    pub fn is_connected(&self) -> bool {
        self.transport.is_connected()
    }

    pub fn transport_name(&self) -> &str {
        self.transport.name()
    }

    pub fn dispatcher(&self) -> &Arc<EventDispatcher> {
        &self.dispatcher
    }

    /// System events: transport state changes and dropped subscribers.
    pub fn events(&self) -> &EventBus {
        &self.events
    }

    /// Queue an event for the transport. The receiver resolves with the
    /// transport's outcome; queue order is send order.
    pub(crate) fn enqueue(&self, event: OutboundEvent) -> oneshot::Receiver<Result<()>> {
        let (reply, rx) = oneshot::channel();
        if let Err(mpsc::error::SendError(request)) = self.writes.send(WriteRequest { event, reply }) {
            let _ = request.reply.send(Err(BusError::TransportUnavailable(
                "write queue closed".to_string(),
            )));
        }
        rx
    }
}

async fn write_loop(
    transport: Arc<dyn Transport>,
    mut queue: mpsc::UnboundedReceiver<WriteRequest>,
    send_timeout: Duration,
) {
    while let Some(WriteRequest { event, reply }) = queue.recv().await {
        let address = event.address;
        let kind = event.kind;
        let outcome = match tokio::time::timeout(send_timeout, transport.send(event)).await {
            Ok(Ok(())) => Ok(()),
            Ok(Err(e)) => Err(BusError::from(e)),
            Err(_) => Err(BusError::TransportUnavailable(format!(
                "send timed out after {}ms",
                send_timeout.as_millis()
            ))),
        };

        match &outcome {
            Ok(()) => tracing::debug!(address = %address, kind = %kind, "Event sent"),
            Err(e) => tracing::warn!(category = "bus", address = %address, kind = %kind, error = %e, "Event send failed"),
        }
        let _ = reply.send(outcome);
    }
    tracing::debug!("Write queue closed");
}

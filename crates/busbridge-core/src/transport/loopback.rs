//! In-memory transport.
//!
//! Records every event sent to it and lets callers inject bus updates. With
//! echo enabled, each accepted event is reflected back as an update for the
//! same address, which is how a real controller confirms state changes.

use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use parking_lot::Mutex;

use super::{BusUpdate, OutboundEvent, Payload, Transport, TransportResult, UpdateSink};
use crate::address::Address;
use crate::error::TransportError;

pub struct LoopbackTransport {
    name: String,
    connected: AtomicBool,
    echo: AtomicBool,
    reject_reason: Mutex<Option<String>>,
    send_delay: Mutex<Option<Duration>>,
    sent: Mutex<Vec<OutboundEvent>>,
    sinks: Mutex<Vec<UpdateSink>>,
}

impl LoopbackTransport {
    pub fn new() -> Self {
        Self {
            name: "loopback".to_string(),
            connected: AtomicBool::new(false),
            echo: AtomicBool::new(false),
            reject_reason: Mutex::new(None),
            send_delay: Mutex::new(None),
            sent: Mutex::new(Vec::new()),
            sinks: Mutex::new(Vec::new()),
        }
    }

    /// Loopback that reflects accepted events back as bus updates.
    pub fn with_echo() -> Self {
        let transport = Self::new();
        transport.set_echo(true);
        transport
    }

    pub fn set_echo(&self, echo: bool) {
        self.echo.store(echo, Ordering::SeqCst);
    }

    /// Simulate the bus going away (or coming back) without a disconnect call.
    pub fn set_online(&self, online: bool) {
        self.connected.store(online, Ordering::SeqCst);
    }

    /// Make every subsequent send fail with a bus NACK.
    pub fn set_reject(&self, reason: Option<String>) {
        *self.reject_reason.lock() = reason;
    }

    /// Delay applied to every send before it completes.
    pub fn set_send_delay(&self, delay: Option<Duration>) {
        *self.send_delay.lock() = delay;
    }

    /// Events accepted so far, oldest first.
    pub fn sent_events(&self) -> Vec<OutboundEvent> {
        self.sent.lock().clone()
    }

    pub fn clear_sent(&self) {
        self.sent.lock().clear();
    }

    /// Push an update as if the bus had reported it. Returns how many sinks
    /// received it.
    pub fn inject(&self, address: Address, payload: impl Into<Payload>) -> usize {
        let update = BusUpdate::new(address, payload);
        let mut sinks = self.sinks.lock();
        sinks.retain(|sink| sink.send(update.clone()).is_ok());
        sinks.len()
    }
}

impl Default for LoopbackTransport {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Transport for LoopbackTransport {
    fn name(&self) -> &str {
        &self.name
    }

    async fn connect(&self) -> TransportResult<()> {
        self.connected.store(true, Ordering::SeqCst);
        tracing::debug!(transport = %self.name, "Loopback transport connected");
        Ok(())
    }

    async fn disconnect(&self) {
        self.connected.store(false, Ordering::SeqCst);
        tracing::debug!(transport = %self.name, "Loopback transport disconnected");
    }

    fn is_connected(&self) -> bool {
        self.connected.load(Ordering::SeqCst)
    }

    async fn send(&self, event: OutboundEvent) -> TransportResult<()> {
        let delay = *self.send_delay.lock();
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }

        if !self.is_connected() {
            return Err(TransportError::NotConnected);
        }
        if let Some(reason) = self.reject_reason.lock().clone() {
            return Err(TransportError::Rejected(reason));
        }

        self.sent.lock().push(event.clone());

        if self.echo.load(Ordering::SeqCst) {
            self.inject(event.address, event.payload);
        }
        Ok(())
    }

    fn on_update(&self, sink: UpdateSink) {
        self.sinks.lock().push(sink);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::transport::EventKind;
    use tokio::sync::mpsc;

    #[tokio::test]
    async fn test_send_requires_connection() {
        let transport = LoopbackTransport::new();
        let event = OutboundEvent::new(Address::new(2, 0, 0, 7), EventKind::AllZonesOnOff, vec![1]);

        let err = transport.send(event.clone()).await.unwrap_err();
        assert_eq!(err, TransportError::NotConnected);

        transport.connect().await.unwrap();
        transport.send(event.clone()).await.unwrap();
        assert_eq!(transport.sent_events(), vec![event]);
    }

    #[tokio::test]
    async fn test_echo_reflects_update() {
        let transport = LoopbackTransport::with_echo();
        let (tx, mut rx) = mpsc::unbounded_channel();
        transport.on_update(tx);
        transport.connect().await.unwrap();

        let address = Address::new(2, 0, 0, 7);
        transport
            .send(OutboundEvent::new(address, EventKind::AllZonesOnOff, vec![1]))
            .await
            .unwrap();

        let update = rx.recv().await.unwrap();
        assert_eq!(update.address, address);
        assert_eq!(update.payload.as_ref(), &[1]);
    }

    #[tokio::test]
    async fn test_reject_reports_nack() {
        let transport = LoopbackTransport::new();
        transport.connect().await.unwrap();
        transport.set_reject(Some("busy".to_string()));

        let err = transport
            .send(OutboundEvent::new(Address::new(1, 0, 0, 1), EventKind::SetParameter, vec![0]))
            .await
            .unwrap_err();
        assert!(matches!(err, TransportError::Rejected(_)));
        assert!(transport.sent_events().is_empty());
    }
}

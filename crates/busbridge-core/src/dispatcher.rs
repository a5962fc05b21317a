//! Event dispatcher.
//!
//! Fans decoded bus updates out to every live subscription on the updated
//! address. Each subscription owns a FIFO queue drained by its own worker
//! task, so:
//!
//! - updates for one address reach a subscriber in bus-arrival order,
//! - a slow subscriber never holds up dispatch or its neighbours,
//! - a callback that exceeds the delivery budget is dropped and reported
//!   as [`BusError::StalledConsumer`] on the owner's error channel.
//!
//! The last value seen per address is cached. A new subscription on an
//! address with a cached value receives that value first, before any
//! update dispatched after it registered.

use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Weak};
use std::time::Duration;

use dashmap::DashMap;
use futures::future::BoxFuture;
use serde::{Deserialize, Serialize};
use tokio::sync::{broadcast, mpsc};

use crate::address::Address;
use crate::error::BusError;
use crate::eventbus::{BridgeEvent, EventBus};
use crate::transport::{BusUpdate, Payload};

/// Async callback invoked with each payload delivered to a subscription.
pub type UpdateCallback = Arc<dyn Fn(Payload) -> BoxFuture<'static, ()> + Send + Sync>;

/// Error channel a subscription reports asynchronous failures on.
pub type ErrorReporter = broadcast::Sender<HandleError>;

/// Identifies one subscription. Tokens are never reused.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct SubscriptionToken(u64);

impl SubscriptionToken {
    pub fn id(&self) -> u64 {
        self.0
    }
}

impl std::fmt::Display for SubscriptionToken {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "sub-{}", self.0)
    }
}

/// Asynchronous failure reported on a handle's error channel.
#[derive(Debug, Clone)]
pub struct HandleError {
    pub address: Address,
    /// Subscription concerned, `None` for send failures.
    pub token: Option<SubscriptionToken>,
    pub error: BusError,
}

/// Dispatcher counters.
#[derive(Debug, Clone, Default, Serialize)]
pub struct DispatcherStats {
    pub updates_dispatched: u64,
    pub deliveries: u64,
    pub stalled_dropped: u64,
    pub live_subscriptions: usize,
    pub cached_addresses: usize,
}

struct Subscriber {
    token: SubscriptionToken,
    queue: mpsc::UnboundedSender<Payload>,
    cancelled: Arc<AtomicBool>,
}

#[derive(Default)]
struct AddressSlot {
    last: Option<Payload>,
    subscribers: Vec<Subscriber>,
}

struct TokenEntry {
    address: Address,
    cancelled: Arc<AtomicBool>,
}

pub struct EventDispatcher {
    slots: DashMap<Address, AddressSlot>,
    tokens: DashMap<SubscriptionToken, TokenEntry>,
    next_token: AtomicU64,
    delivery_timeout: Duration,
    events: EventBus,
    updates_dispatched: AtomicU64,
    deliveries: Arc<AtomicU64>,
    stalled_dropped: AtomicU64,
}

impl EventDispatcher {
    pub fn new(delivery_timeout: Duration, events: EventBus) -> Self {
        Self {
            slots: DashMap::new(),
            tokens: DashMap::new(),
            next_token: AtomicU64::new(1),
            delivery_timeout,
            events,
            updates_dispatched: AtomicU64::new(0),
            deliveries: Arc::new(AtomicU64::new(0)),
            stalled_dropped: AtomicU64::new(0),
        }
    }

    pub fn delivery_timeout(&self) -> Duration {
        self.delivery_timeout
    }

    /// Register a callback for `address`.
    ///
    /// Spawns the subscription's worker on the current Tokio runtime.
    pub fn subscribe(
        self: &Arc<Self>,
        address: Address,
        callback: UpdateCallback,
        errors: Option<ErrorReporter>,
    ) -> SubscriptionToken {
        let token = SubscriptionToken(self.next_token.fetch_add(1, Ordering::Relaxed));
        let cancelled = Arc::new(AtomicBool::new(false));
        let (tx, rx) = mpsc::unbounded_channel();

        {
            // Registering under the slot lock orders the cached value ahead
            // of any concurrent dispatch to this address.
            let mut slot = self.slots.entry(address).or_default();
            if let Some(last) = &slot.last {
                let _ = tx.send(last.clone());
            }
            slot.subscribers.push(Subscriber {
                token,
                queue: tx,
                cancelled: cancelled.clone(),
            });
            self.tokens.insert(
                token,
                TokenEntry {
                    address,
                    cancelled: cancelled.clone(),
                },
            );
        }

        let worker = DeliveryWorker {
            token,
            address,
            callback,
            cancelled,
            budget: self.delivery_timeout,
            errors,
            deliveries: self.deliveries.clone(),
            dispatcher: Arc::downgrade(self),
        };
        tokio::spawn(worker.run(rx));

        tracing::debug!(address = %address, token = %token, "Subscription registered");
        token
    }

    /// Cancel a subscription. Returns `false` if the token was unknown or
    /// already cancelled. A delivery already running is left to finish.
    pub fn cancel(&self, token: SubscriptionToken) -> bool {
        let Some((_, entry)) = self.tokens.remove(&token) else {
            return false;
        };
        entry.cancelled.store(true, Ordering::Release);
        if let Some(mut slot) = self.slots.get_mut(&entry.address) {
            slot.subscribers.retain(|s| s.token != token);
        }
        tracing::debug!(address = %entry.address, token = %token, "Subscription cancelled");
        true
    }

    /// Deliver an update to every live subscription on its address. Returns
    /// the number of subscriptions it was queued for.
    pub fn dispatch(&self, update: BusUpdate) -> usize {
        self.updates_dispatched.fetch_add(1, Ordering::Relaxed);
        let mut slot = self.slots.entry(update.address).or_default();
        slot.last = Some(update.payload.clone());
        slot.subscribers.retain(|s| {
            !s.cancelled.load(Ordering::Acquire) && s.queue.send(update.payload.clone()).is_ok()
        });
        let delivered = slot.subscribers.len();
        tracing::trace!(address = %update.address, subscribers = delivered, "Dispatched bus update");
        delivered
    }

    /// Drain updates from a transport sink until it closes.
    pub async fn run(self: Arc<Self>, mut updates: mpsc::UnboundedReceiver<BusUpdate>) {
        tracing::info!(category = "bus", "Event dispatcher started");
        while let Some(update) = updates.recv().await {
            self.dispatch(update);
        }
        tracing::info!(category = "bus", "Event dispatcher stopped: update stream closed");
    }

    /// Last value reported for `address`.
    pub fn last_value(&self, address: &Address) -> Option<Payload> {
        self.slots.get(address).and_then(|slot| slot.last.clone())
    }

    pub fn is_active(&self, token: SubscriptionToken) -> bool {
        self.tokens.contains_key(&token)
    }

    pub fn subscriber_count(&self, address: &Address) -> usize {
        self.slots
            .get(address)
            .map(|slot| slot.subscribers.len())
            .unwrap_or(0)
    }

    pub fn stats(&self) -> DispatcherStats {
        DispatcherStats {
            updates_dispatched: self.updates_dispatched.load(Ordering::Relaxed),
            deliveries: self.deliveries.load(Ordering::Relaxed),
            stalled_dropped: self.stalled_dropped.load(Ordering::Relaxed),
            live_subscriptions: self.tokens.len(),
            cached_addresses: self.slots.iter().filter(|s| s.last.is_some()).count(),
        }
    }

    fn drop_stalled(&self, token: SubscriptionToken, address: Address) {
        if self.cancel(token) {
            self.stalled_dropped.fetch_add(1, Ordering::Relaxed);
            self.events.publish(BridgeEvent::SubscriptionDropped {
                address,
                token,
                reason: format!(
                    "delivery exceeded {}ms budget",
                    self.delivery_timeout.as_millis()
                ),
                timestamp: chrono::Utc::now().timestamp_millis(),
            });
        }
    }
}

struct DeliveryWorker {
    token: SubscriptionToken,
    address: Address,
    callback: UpdateCallback,
    cancelled: Arc<AtomicBool>,
    budget: Duration,
    errors: Option<ErrorReporter>,
    deliveries: Arc<AtomicU64>,
    dispatcher: Weak<EventDispatcher>,
}

impl DeliveryWorker {
    async fn run(self, mut queue: mpsc::UnboundedReceiver<Payload>) {
        while let Some(payload) = queue.recv().await {
            if self.cancelled.load(Ordering::Acquire) {
                break;
            }

            match tokio::time::timeout(self.budget, (self.callback)(payload)).await {
                Ok(()) => {
                    self.deliveries.fetch_add(1, Ordering::Relaxed);
                }
                Err(_) => {
                    let budget_ms = self.budget.as_millis() as u64;
                    tracing::warn!(
                        category = "bus",
                        address = %self.address,
                        token = %self.token,
                        budget_ms,
                        "Subscriber stalled, dropping subscription"
                    );
                    self.cancelled.store(true, Ordering::Release);
                    if let Some(dispatcher) = self.dispatcher.upgrade() {
                        dispatcher.drop_stalled(self.token, self.address);
                    }
                    if let Some(errors) = &self.errors {
                        let _ = errors.send(HandleError {
                            address: self.address,
                            token: Some(self.token),
                            error: BusError::StalledConsumer {
                                address: self.address,
                                budget_ms,
                            },
                        });
                    }
                    break;
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use futures::FutureExt;
    use parking_lot::Mutex;

    fn recording(sink: Arc<Mutex<Vec<u8>>>) -> UpdateCallback {
        Arc::new(move |payload: Payload| {
            let sink = sink.clone();
            async move {
                sink.lock().push(payload[0]);
            }
            .boxed()
        })
    }

    async fn settle() {
        tokio::time::sleep(Duration::from_millis(20)).await;
    }

    #[tokio::test]
    async fn test_cached_value_delivered_once_to_late_subscriber() {
        let dispatcher = Arc::new(EventDispatcher::new(Duration::from_secs(1), EventBus::new()));
        let address = Address::new(2, 0, 0, 7);
        dispatcher.dispatch(BusUpdate::new(address, vec![1]));

        let seen = Arc::new(Mutex::new(Vec::new()));
        dispatcher.subscribe(address, recording(seen.clone()), None);
        dispatcher.dispatch(BusUpdate::new(address, vec![0]));
        settle().await;

        assert_eq!(*seen.lock(), vec![1, 0]);
    }

    #[tokio::test]
    async fn test_no_initial_callback_without_cache() {
        let dispatcher = Arc::new(EventDispatcher::new(Duration::from_secs(1), EventBus::new()));
        let seen = Arc::new(Mutex::new(Vec::new()));
        dispatcher.subscribe(Address::new(1, 1, 0, 3), recording(seen.clone()), None);
        settle().await;
        assert!(seen.lock().is_empty());
    }

    #[tokio::test]
    async fn test_cancel_is_idempotent() {
        let dispatcher = Arc::new(EventDispatcher::new(Duration::from_secs(1), EventBus::new()));
        let address = Address::new(1, 0, 0, 1);
        let seen = Arc::new(Mutex::new(Vec::new()));
        let token = dispatcher.subscribe(address, recording(seen.clone()), None);

        assert!(dispatcher.cancel(token));
        assert!(!dispatcher.cancel(token));
        assert_eq!(dispatcher.dispatch(BusUpdate::new(address, vec![9])), 0);
        settle().await;
        assert!(seen.lock().is_empty());
        assert_eq!(dispatcher.stats().live_subscriptions, 0);
    }

    #[tokio::test]
    async fn test_updates_to_other_addresses_are_not_delivered() {
        let dispatcher = Arc::new(EventDispatcher::new(Duration::from_secs(1), EventBus::new()));
        let seen = Arc::new(Mutex::new(Vec::new()));
        dispatcher.subscribe(Address::new(2, 0, 0, 7), recording(seen.clone()), None);

        dispatcher.dispatch(BusUpdate::new(Address::new(2, 0, 0, 8), vec![5]));
        dispatcher.dispatch(BusUpdate::new(Address::new(2, 0, 0, 7), vec![6]));
        settle().await;

        assert_eq!(*seen.lock(), vec![6]);
        assert_eq!(dispatcher.stats().updates_dispatched, 2);
    }
}

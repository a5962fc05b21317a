//! Data handles.
//!
//! A `DataHandle` is a caller-side reference to one bus address. Handles are
//! never pooled: resolving the same address twice yields two handles with
//! equal addresses and independent subscriptions. Dropping a handle cancels
//! every subscription created through it.

use std::future::Future;
use std::pin::Pin;
use std::sync::{Arc, Weak};
use std::task::{Context, Poll};

use futures::FutureExt;
use parking_lot::Mutex;
use tokio::sync::{broadcast, oneshot};

use crate::address::Address;
use crate::dispatcher::{HandleError, SubscriptionToken, UpdateCallback};
use crate::error::{BusError, Result};
use crate::link::BusLink;
use crate::transport::{EventKind, OutboundEvent, Payload};

const ERROR_CHANNEL_CAPACITY: usize = 32;

pub struct DataHandle {
    address: Address,
    link: Weak<BusLink>,
    tokens: Mutex<Vec<SubscriptionToken>>,
    errors: broadcast::Sender<HandleError>,
}

impl DataHandle {
    pub(crate) fn new(address: Address, link: Weak<BusLink>) -> Self {
        Self {
            address,
            link,
            tokens: Mutex::new(Vec::new()),
            errors: broadcast::channel(ERROR_CHANNEL_CAPACITY).0,
        }
    }

    pub fn address(&self) -> Address {
        self.address
    }

    /// Register an async callback for values reported at this address.
    ///
    /// Returns immediately. If a value is already cached the callback fires
    /// once with it before any newer update. Fails only when the bus link is
    /// gone; a disconnected transport is reported on [`errors`](Self::errors)
    /// and the subscription stays registered.
    pub fn subscribe<F, Fut>(&self, callback: F) -> Result<SubscriptionToken>
    where
        F: Fn(Payload) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = ()> + Send + 'static,
    {
        let callback: UpdateCallback = Arc::new(move |payload| callback(payload).boxed());
        self.subscribe_boxed(callback)
    }

    /// Synchronous-callback variant of [`subscribe`](Self::subscribe).
    ///
    /// The callback runs on Tokio's blocking pool, so the delivery budget
    /// covers it like any async callback. A callback that blocks past the
    /// budget is dropped as stalled; its thread is left to finish.
    pub fn subscribe_fn<F>(&self, callback: F) -> Result<SubscriptionToken>
    where
        F: Fn(Payload) + Send + Sync + 'static,
    {
        let callback = Arc::new(callback);
        let address = self.address;
        let callback: UpdateCallback = Arc::new(move |payload| {
            let callback = callback.clone();
            async move {
                if let Err(e) = tokio::task::spawn_blocking(move || callback(payload)).await {
                    tracing::error!(address = %address, error = %e, "Subscriber callback failed");
                }
            }
            .boxed()
        });
        self.subscribe_boxed(callback)
    }

    fn subscribe_boxed(&self, callback: UpdateCallback) -> Result<SubscriptionToken> {
        let link = self.upgrade()?;
        let token = link
            .dispatcher()
            .subscribe(self.address, callback, Some(self.errors.clone()));
        self.tokens.lock().push(token);

        if !link.is_connected() {
            let _ = self.errors.send(HandleError {
                address: self.address,
                token: Some(token),
                error: BusError::TransportUnavailable(format!(
                    "transport '{}' not connected; waiting for updates",
                    link.transport_name()
                )),
            });
        }
        Ok(token)
    }

    /// Cancel a subscription made through this handle. Idempotent.
    ///
    /// Returns `false` when the token is not a live subscription of this
    /// handle, including one the dispatcher already dropped as stalled.
    pub fn cancel(&self, token: SubscriptionToken) -> bool {
        let Some(link) = self.link.upgrade() else {
            self.tokens.lock().clear();
            return false;
        };
        let owned = {
            let mut tokens = self.tokens.lock();
            let before = tokens.len();
            tokens.retain(|t| *t != token);
            tokens.len() != before
        };
        owned && link.dispatcher().cancel(token)
    }

    /// Last value the bus reported for this address.
    pub fn read(&self) -> Option<Payload> {
        self.link
            .upgrade()
            .and_then(|link| link.dispatcher().last_value(&self.address))
    }

    /// Ask the bus to apply a state change at this address.
    ///
    /// Does not wait for the bus: the event is queued and the returned
    /// [`PendingSend`] resolves with the outcome. Failures are also reported
    /// on the error channel, so dropping the `PendingSend` loses nothing.
    pub fn send_event(&self, kind: EventKind, payload: impl Into<Payload>) -> PendingSend {
        let (tx, rx) = oneshot::channel();
        let event = OutboundEvent::new(self.address, kind, payload);

        let Some(link) = self.link.upgrade() else {
            let error = BusError::TransportUnavailable("bus link has been shut down".to_string());
            self.report(None, error.clone());
            let _ = tx.send(Err(error));
            return PendingSend { rx };
        };

        let reply = link.enqueue(event);
        let errors = self.errors.clone();
        let address = self.address;
        tokio::spawn(async move {
            let outcome = reply.await.unwrap_or_else(|_| {
                Err(BusError::TransportUnavailable(
                    "write queue dropped the request".to_string(),
                ))
            });
            if let Err(e) = &outcome {
                let _ = errors.send(HandleError {
                    address,
                    token: None,
                    error: e.clone(),
                });
            }
            let _ = tx.send(outcome);
        });

        PendingSend { rx }
    }

    /// Asynchronous failures for this handle: send failures and dropped
    /// subscriptions.
    pub fn errors(&self) -> broadcast::Receiver<HandleError> {
        self.errors.subscribe()
    }

    /// Live subscriptions made through this handle. Subscriptions the
    /// dispatcher dropped are pruned here.
    pub fn subscription_count(&self) -> usize {
        let mut tokens = self.tokens.lock();
        match self.link.upgrade() {
            Some(link) => tokens.retain(|t| link.dispatcher().is_active(*t)),
            None => tokens.clear(),
        }
        tokens.len()
    }

    fn upgrade(&self) -> Result<Arc<BusLink>> {
        self.link.upgrade().ok_or_else(|| {
            BusError::TransportUnavailable("bus link has been shut down".to_string())
        })
    }

    fn report(&self, token: Option<SubscriptionToken>, error: BusError) {
        let _ = self.errors.send(HandleError {
            address: self.address,
            token,
            error,
        });
    }
}

impl Drop for DataHandle {
    fn drop(&mut self) {
        let tokens = std::mem::take(self.tokens.get_mut());
        if let Some(link) = self.link.upgrade() {
            for token in tokens {
                link.dispatcher().cancel(token);
            }
        }
    }
}

impl std::fmt::Debug for DataHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DataHandle")
            .field("address", &self.address)
            .field("subscriptions", &self.subscription_count())
            .finish()
    }
}

/// Outcome of a queued [`DataHandle::send_event`].
#[must_use = "the outcome is also reported on the handle's error channel"]
pub struct PendingSend {
    rx: oneshot::Receiver<Result<()>>,
}

impl Future for PendingSend {
    type Output = Result<()>;

    fn poll(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        Pin::new(&mut self.rx).poll(cx).map(|outcome| {
            outcome.unwrap_or_else(|_| {
                Err(BusError::TransportUnavailable(
                    "send outcome was dropped".to_string(),
                ))
            })
        })
    }
}

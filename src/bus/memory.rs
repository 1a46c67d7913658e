//! In-process bus used by tests and local dry runs.

use std::sync::{
    Arc, Mutex,
    atomic::{AtomicBool, AtomicU64, Ordering},
};

use dashmap::DashMap;
use futures::future::BoxFuture;
use tokio::sync::watch;

use super::{Bus, BusError, BusResult, EventHandler, Payload, ProcedureHandler, Subscription};

/// A single event published through the bus.
#[derive(Debug, Clone, PartialEq)]
pub struct Publication {
    /// Topic the event was published on.
    pub topic: String,
    /// Event arguments.
    pub payload: Payload,
}

/// Router stand-in keeping subscriptions, procedures and publications in memory.
///
/// Publications are recorded rather than delivered back to local subscribers,
/// matching a WAMP router's default of excluding the publisher.
pub struct MemoryBus {
    next_id: AtomicU64,
    subscriptions: DashMap<u64, (String, EventHandler)>,
    procedures: DashMap<String, ProcedureHandler>,
    published: Mutex<Vec<Publication>>,
    fail_unsubscribe: AtomicBool,
    closed: watch::Sender<bool>,
}

impl MemoryBus {
    /// Create an empty, connected bus.
    pub fn new() -> Arc<Self> {
        let (closed, _rx) = watch::channel(false);
        Arc::new(Self {
            next_id: AtomicU64::new(1),
            subscriptions: DashMap::new(),
            procedures: DashMap::new(),
            published: Mutex::new(Vec::new()),
            fail_unsubscribe: AtomicBool::new(false),
            closed,
        })
    }

    /// Deliver an event to every handler subscribed to `topic`, awaiting each in turn.
    pub async fn emit(&self, topic: &str, payload: Payload) {
        let handlers: Vec<EventHandler> = self
            .subscriptions
            .iter()
            .filter(|entry| entry.value().0 == topic)
            .map(|entry| entry.value().1.clone())
            .collect();
        for handler in handlers {
            handler(payload.clone()).await;
        }
    }

    /// Make `handler` answer calls to `procedure`, as another router client would.
    pub fn provide(&self, procedure: &str, handler: ProcedureHandler) {
        self.procedures.insert(procedure.to_string(), handler);
    }

    /// Number of live subscriptions on `topic`.
    pub fn subscription_count(&self, topic: &str) -> usize {
        self.subscriptions
            .iter()
            .filter(|entry| entry.value().0 == topic)
            .count()
    }

    /// Total number of live subscriptions.
    pub fn total_subscriptions(&self) -> usize {
        self.subscriptions.len()
    }

    /// Snapshot of everything published so far.
    pub fn published(&self) -> Vec<Publication> {
        self.published
            .lock()
            .map(|guard| guard.clone())
            .unwrap_or_default()
    }

    /// Payloads published on `topic`, oldest first.
    pub fn published_on(&self, topic: &str) -> Vec<Payload> {
        self.published()
            .into_iter()
            .filter(|publication| publication.topic == topic)
            .map(|publication| publication.payload)
            .collect()
    }

    /// Forget recorded publications.
    pub fn clear_published(&self) {
        if let Ok(mut guard) = self.published.lock() {
            guard.clear();
        }
    }

    /// Make subsequent unsubscribe requests fail (the subscription is still dropped).
    pub fn fail_unsubscribes(&self, fail: bool) {
        self.fail_unsubscribe.store(fail, Ordering::SeqCst);
    }

    /// Simulate the router dropping the connection.
    pub fn disconnect(&self) {
        self.closed.send_replace(true);
    }

    fn is_closed(&self) -> bool {
        *self.closed.borrow()
    }
}

impl Bus for MemoryBus {
    fn subscribe(
        &self,
        topic: &str,
        handler: EventHandler,
    ) -> BoxFuture<'static, BusResult<Subscription>> {
        let result = if self.is_closed() {
            Err(BusError::Closed)
        } else {
            let id = self.next_id.fetch_add(1, Ordering::SeqCst);
            self.subscriptions.insert(id, (topic.to_string(), handler));
            Ok(Subscription::new(id, topic))
        };
        Box::pin(async move { result })
    }

    fn unsubscribe(&self, subscription: Subscription) -> BoxFuture<'static, BusResult<()>> {
        let removed = self.subscriptions.remove(&subscription.id()).is_some();
        let result = if self.fail_unsubscribe.load(Ordering::SeqCst) {
            Err(BusError::remote("wamp.error.canceled"))
        } else if removed {
            Ok(())
        } else {
            Err(BusError::remote("wamp.error.no_such_subscription"))
        };
        Box::pin(async move { result })
    }

    fn publish(&self, topic: &str, payload: Payload) -> BusResult<()> {
        if self.is_closed() {
            return Err(BusError::Closed);
        }
        if let Ok(mut guard) = self.published.lock() {
            guard.push(Publication {
                topic: topic.to_string(),
                payload,
            });
        }
        Ok(())
    }

    fn call(&self, procedure: &str, payload: Payload) -> BoxFuture<'static, BusResult<Payload>> {
        let handler = self
            .procedures
            .get(procedure)
            .map(|entry| entry.value().clone());
        Box::pin(async move {
            match handler {
                Some(handler) => handler(payload).await,
                None => Err(BusError::remote("wamp.error.no_such_procedure")),
            }
        })
    }

    fn register(
        &self,
        procedure: &str,
        handler: ProcedureHandler,
    ) -> BoxFuture<'static, BusResult<()>> {
        let result = if self.procedures.contains_key(procedure) {
            Err(BusError::remote("wamp.error.procedure_already_exists"))
        } else {
            self.procedures.insert(procedure.to_string(), handler);
            Ok(())
        };
        Box::pin(async move { result })
    }

    fn closed(&self) -> BoxFuture<'static, ()> {
        let mut rx = self.closed.subscribe();
        Box::pin(async move {
            let _ = rx.wait_for(|closed| *closed).await;
        })
    }

    fn close(&self) -> BoxFuture<'static, ()> {
        self.disconnect();
        Box::pin(async {})
    }
}

//! Publish/subscribe bus abstraction used by the session manager.
//!
//! The [`Bus`] trait is the seam between game logic and the transport: the
//! production implementation speaks WAMP over a WebSocket ([`wamp::WampBus`]),
//! while [`memory::MemoryBus`] keeps everything in-process for tests.

pub mod auth;
pub mod error;
pub mod memory;
pub mod wamp;

use std::sync::Arc;

use futures::future::BoxFuture;
use serde_json::{Map, Value};

pub use self::error::{BusError, BusResult};

/// Positional and keyword arguments carried by events, calls and results.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Payload {
    /// Positional arguments.
    pub args: Vec<Value>,
    /// Keyword arguments.
    pub kwargs: Map<String, Value>,
}

impl Payload {
    /// Build a payload from positional arguments only.
    pub fn args(args: Vec<Value>) -> Self {
        Self {
            args,
            kwargs: Map::new(),
        }
    }

    /// Attach a keyword argument, replacing any previous value under `key`.
    pub fn with_kwarg(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.kwargs.insert(key.into(), value.into());
        self
    }

    /// Look up an argument by position first, then by keyword.
    pub fn get(&self, index: usize, key: &str) -> Option<&Value> {
        self.args.get(index).or_else(|| self.kwargs.get(key))
    }

    /// Keyword argument lookup.
    pub fn kwarg(&self, key: &str) -> Option<&Value> {
        self.kwargs.get(key)
    }
}

/// Handle for a live subscription.
///
/// Not `Clone`: releasing it through [`Bus::unsubscribe`]
/// consumes the handle, so a subscription can only be released once.
#[derive(Debug, PartialEq, Eq)]
pub struct Subscription {
    id: u64,
    topic: String,
}

impl Subscription {
    /// Wrap a transport-assigned subscription id.
    pub fn new(id: u64, topic: impl Into<String>) -> Self {
        Self {
            id,
            topic: topic.into(),
        }
    }

    /// Transport identifier of the subscription.
    pub fn id(&self) -> u64 {
        self.id
    }

    /// Topic this subscription listens on.
    pub fn topic(&self) -> &str {
        &self.topic
    }
}

/// Callback invoked for every event delivered on a subscription.
pub type EventHandler = Arc<dyn Fn(Payload) -> BoxFuture<'static, ()> + Send + Sync>;

/// Callback serving a registered remote procedure.
pub type ProcedureHandler =
    Arc<dyn Fn(Payload) -> BoxFuture<'static, BusResult<Payload>> + Send + Sync>;

/// Minimal surface of a WAMP-style router used by the game session.
pub trait Bus: Send + Sync {
    /// Subscribe `handler` to `topic`.
    fn subscribe(
        &self,
        topic: &str,
        handler: EventHandler,
    ) -> BoxFuture<'static, BusResult<Subscription>>;
    /// Release a subscription obtained from [`Bus::subscribe`].
    fn unsubscribe(&self, subscription: Subscription) -> BoxFuture<'static, BusResult<()>>;
    /// Publish an event; delivery is not acknowledged.
    fn publish(&self, topic: &str, payload: Payload) -> BusResult<()>;
    /// Call a remote procedure and wait for its result.
    fn call(&self, procedure: &str, payload: Payload) -> BoxFuture<'static, BusResult<Payload>>;
    /// Expose `handler` as a remote procedure.
    fn register(
        &self,
        procedure: &str,
        handler: ProcedureHandler,
    ) -> BoxFuture<'static, BusResult<()>>;
    /// Resolve once the transport is gone.
    fn closed(&self) -> BoxFuture<'static, ()>;
    /// Leave the realm politely and close the transport.
    fn close(&self) -> BoxFuture<'static, ()>;
}

/// Wrap an async closure into an [`EventHandler`].
pub fn event_handler<F, Fut>(f: F) -> EventHandler
where
    F: Fn(Payload) -> Fut + Send + Sync + 'static,
    Fut: std::future::Future<Output = ()> + Send + 'static,
{
    Arc::new(move |payload| Box::pin(f(payload)))
}

/// Wrap an async closure into a [`ProcedureHandler`].
pub fn procedure_handler<F, Fut>(f: F) -> ProcedureHandler
where
    F: Fn(Payload) -> Fut + Send + Sync + 'static,
    Fut: std::future::Future<Output = BusResult<Payload>> + Send + 'static,
{
    Arc::new(move |payload| Box::pin(f(payload)))
}

//! WAMP v2 client over a WebSocket, implementing [`Bus`].

mod config;
pub mod messages;

use std::{
    sync::{
        Arc,
        atomic::{AtomicBool, AtomicU64, Ordering},
    },
    time::Duration,
};

use dashmap::DashMap;
use futures::{SinkExt, StreamExt, future::BoxFuture};
use serde_json::{Map, Value, json};
use tokio::sync::{mpsc, oneshot, watch};
use tokio_tungstenite::{
    connect_async,
    tungstenite::{
        Message,
        client::IntoClientRequest,
        http::{HeaderValue, header::SEC_WEBSOCKET_PROTOCOL},
    },
};
use tracing::{debug, info, warn};

use self::messages::{INVOCATION, WampMessage};
use super::{
    Bus, BusError, BusResult, EventHandler, Payload, ProcedureHandler, Subscription,
    auth::{self, WAMP_CRA},
};

pub use self::config::WampConfig;

const SUBPROTOCOL: &str = "wamp.2.json";
const HANDSHAKE_TIMEOUT: Duration = Duration::from_secs(10);
const GOODBYE_TIMEOUT: Duration = Duration::from_secs(2);

/// Milestones of the opening handshake, reported to the caller of [`WampBus::connect`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HandshakeProgress {
    /// WebSocket is open and HELLO has been sent.
    Connected,
    /// The router issued an authentication challenge.
    Challenged,
    /// The router welcomed us into the realm.
    Welcomed,
}

enum Reply {
    Subscribed(u64),
    Unsubscribed,
    Result(Payload),
    Registered(u64),
}

enum PendingHandler {
    Event(EventHandler),
    Procedure(ProcedureHandler),
}

struct PendingRequest {
    reply: oneshot::Sender<BusResult<Reply>>,
    handler: Option<PendingHandler>,
}

/// Live WAMP session. Cheap to clone.
#[derive(Clone)]
pub struct WampBus {
    inner: Arc<Inner>,
}

struct Inner {
    outbound: mpsc::UnboundedSender<Message>,
    next_request: AtomicU64,
    pending: DashMap<u64, PendingRequest>,
    subscriptions: DashMap<u64, EventHandler>,
    registrations: DashMap<u64, ProcedureHandler>,
    goodbye_sent: AtomicBool,
    closed: watch::Sender<bool>,
}

impl WampBus {
    /// Open the WebSocket, authenticate and join the configured realm.
    pub async fn connect<F>(config: &WampConfig, mut on_progress: F) -> BusResult<Self>
    where
        F: FnMut(HandshakeProgress),
    {
        let mut request =
            config
                .url
                .as_str()
                .into_client_request()
                .map_err(|source| BusError::Connect {
                    url: config.url.clone(),
                    source,
                })?;
        request
            .headers_mut()
            .insert(SEC_WEBSOCKET_PROTOCOL, HeaderValue::from_static(SUBPROTOCOL));

        let (ws_stream, _response) =
            connect_async(request)
                .await
                .map_err(|source| BusError::Connect {
                    url: config.url.clone(),
                    source,
                })?;
        let (mut sink, mut stream) = ws_stream.split();

        let hello = WampMessage::Hello {
            realm: config.realm.clone(),
            details: hello_details(&config.authid),
        };
        sink.send(Message::Text(hello.encode()?.into()))
            .await
            .map_err(|err| BusError::Handshake(format!("failed to send HELLO: {err}")))?;
        on_progress(HandshakeProgress::Connected);

        let session = loop {
            let frame = tokio::time::timeout(HANDSHAKE_TIMEOUT, stream.next())
                .await
                .map_err(|_| BusError::Handshake("router did not answer in time".into()))?;
            let text = match frame {
                Some(Ok(Message::Text(text))) => text,
                Some(Ok(Message::Close(_))) | None => {
                    return Err(BusError::Handshake("connection closed during handshake".into()));
                }
                Some(Ok(_)) => continue,
                Some(Err(err)) => return Err(BusError::Handshake(err.to_string())),
            };

            match WampMessage::decode(&text)? {
                WampMessage::Challenge { method, extra } => {
                    on_progress(HandshakeProgress::Challenged);
                    let signature = auth::respond(&method, &extra, &config.secret)?;
                    let authenticate = WampMessage::Authenticate {
                        signature,
                        extra: Map::new(),
                    };
                    sink.send(Message::Text(authenticate.encode()?.into()))
                        .await
                        .map_err(|err| {
                            BusError::Handshake(format!("failed to send AUTHENTICATE: {err}"))
                        })?;
                }
                WampMessage::Welcome { session, .. } => break session,
                WampMessage::Abort { reason, .. } => return Err(BusError::Aborted { reason }),
                other => {
                    return Err(BusError::Protocol(format!(
                        "unexpected message during handshake: {other:?}"
                    )));
                }
            }
        };
        on_progress(HandshakeProgress::Welcomed);
        info!(session, realm = %config.realm, "joined WAMP realm");

        let (outbound_tx, mut outbound_rx) = mpsc::unbounded_channel::<Message>();
        let (closed_tx, _) = watch::channel(false);
        let inner = Arc::new(Inner {
            outbound: outbound_tx,
            next_request: AtomicU64::new(1),
            pending: DashMap::new(),
            subscriptions: DashMap::new(),
            registrations: DashMap::new(),
            goodbye_sent: AtomicBool::new(false),
            closed: closed_tx,
        });

        // Dedicated writer task so handlers never await the socket directly.
        tokio::spawn(async move {
            while let Some(message) = outbound_rx.recv().await {
                let closing = matches!(message, Message::Close(_));
                if sink.send(message).await.is_err() || closing {
                    break;
                }
            }
        });

        let reader = inner.clone();
        tokio::spawn(async move {
            while let Some(frame) = stream.next().await {
                match frame {
                    Ok(Message::Text(text)) => match WampMessage::decode(&text) {
                        Ok(message) => {
                            if !reader.dispatch(message) {
                                break;
                            }
                        }
                        Err(err) => warn!(error = %err, "dropping undecodable WAMP frame"),
                    },
                    Ok(Message::Close(_)) => break,
                    Ok(_) => {}
                    Err(err) => {
                        warn!(error = %err, "websocket receive failed");
                        break;
                    }
                }
            }
            reader.shutdown();
        });

        Ok(Self { inner })
    }
}

fn hello_details(authid: &str) -> Map<String, Value> {
    let details = json!({
        "roles": {
            "caller": {},
            "callee": {},
            "publisher": {},
            "subscriber": {},
        },
        "authmethods": [WAMP_CRA],
        "authid": authid,
    });
    match details {
        Value::Object(map) => map,
        _ => Map::new(),
    }
}

impl Inner {
    fn send(&self, message: WampMessage) -> BusResult<()> {
        if *self.closed.borrow() {
            return Err(BusError::Closed);
        }
        let text = message.encode()?;
        self.outbound
            .send(Message::Text(text.into()))
            .map_err(|_| BusError::Closed)
    }

    fn next_request(&self) -> u64 {
        self.next_request.fetch_add(1, Ordering::Relaxed)
    }

    /// Send a request and wait for the router's correlated reply.
    fn request(
        &self,
        handler: Option<PendingHandler>,
        build: impl FnOnce(u64) -> WampMessage,
    ) -> BoxFuture<'static, BusResult<Reply>> {
        let request = self.next_request();
        let (reply, rx) = oneshot::channel();
        self.pending.insert(request, PendingRequest { reply, handler });
        if let Err(err) = self.send(build(request)) {
            self.pending.remove(&request);
            return Box::pin(async move { Err(err) });
        }
        Box::pin(async move { rx.await.unwrap_or(Err(BusError::Closed)) })
    }

    fn complete(&self, request: u64, result: BusResult<Reply>) {
        match self.pending.remove(&request) {
            Some((_, pending)) => {
                let _ = pending.reply.send(result);
            }
            None => warn!(request, "reply for unknown request"),
        }
    }

    /// Route one inbound message. Returns `false` once the session is over.
    fn dispatch(self: &Arc<Self>, message: WampMessage) -> bool {
        match message {
            WampMessage::Subscribed {
                request,
                subscription,
            } => {
                // Install the handler before the caller resumes so no event is missed.
                if let Some(PendingHandler::Event(handler)) = self
                    .pending
                    .get_mut(&request)
                    .and_then(|mut pending| pending.handler.take())
                {
                    self.subscriptions.insert(subscription, handler);
                }
                self.complete(request, Ok(Reply::Subscribed(subscription)));
            }
            WampMessage::Unsubscribed { request } => self.complete(request, Ok(Reply::Unsubscribed)),
            WampMessage::Result {
                request, payload, ..
            } => self.complete(request, Ok(Reply::Result(payload))),
            WampMessage::Registered {
                request,
                registration,
            } => {
                if let Some(PendingHandler::Procedure(handler)) = self
                    .pending
                    .get_mut(&request)
                    .and_then(|mut pending| pending.handler.take())
                {
                    self.registrations.insert(registration, handler);
                }
                self.complete(request, Ok(Reply::Registered(registration)));
            }
            WampMessage::Error {
                request,
                error,
                payload,
                ..
            } => self.complete(
                request,
                Err(BusError::Remote {
                    error,
                    args: payload.args,
                }),
            ),
            WampMessage::Event {
                subscription,
                payload,
                ..
            } => match self.subscriptions.get(&subscription).map(|h| h.clone()) {
                Some(handler) => {
                    tokio::spawn(handler(payload));
                }
                None => debug!(subscription, "event for released subscription"),
            },
            WampMessage::Invocation {
                request,
                registration,
                payload,
                ..
            } => self.invoke(request, registration, payload),
            WampMessage::Goodbye { reason, .. } => {
                info!(%reason, "router said goodbye");
                if !self.goodbye_sent.swap(true, Ordering::SeqCst) {
                    let _ = self.send(WampMessage::Goodbye {
                        details: Map::new(),
                        reason: "wamp.close.goodbye_and_out".into(),
                    });
                }
                return false;
            }
            WampMessage::Abort { reason, .. } => {
                warn!(%reason, "router aborted the session");
                return false;
            }
            other => warn!(frame = ?other, "unexpected WAMP message"),
        }
        true
    }

    fn invoke(self: &Arc<Self>, request: u64, registration: u64, payload: Payload) {
        let Some(handler) = self.registrations.get(&registration).map(|h| h.clone()) else {
            let _ = self.send(invocation_error(request, "wamp.error.no_such_registration", None));
            return;
        };
        let inner = self.clone();
        tokio::spawn(async move {
            let reply = match handler(payload).await {
                Ok(payload) => WampMessage::Yield {
                    request,
                    options: Map::new(),
                    payload,
                },
                Err(BusError::Remote { error, args }) => WampMessage::Error {
                    request_type: INVOCATION,
                    request,
                    details: Map::new(),
                    error,
                    payload: Payload::args(args),
                },
                Err(err) => invocation_error(request, "wamp.error.runtime_error", Some(err)),
            };
            if let Err(err) = inner.send(reply) {
                warn!(request, error = %err, "failed to answer invocation");
            }
        });
    }

    /// Tear down after the socket ends: fail pending requests and drop handlers.
    fn shutdown(&self) {
        self.closed.send_replace(true);
        let requests: Vec<u64> = self.pending.iter().map(|entry| *entry.key()).collect();
        for request in requests {
            if let Some((_, pending)) = self.pending.remove(&request) {
                let _ = pending.reply.send(Err(BusError::Closed));
            }
        }
        self.subscriptions.clear();
        self.registrations.clear();
        let _ = self.outbound.send(Message::Close(None));
        info!("WAMP session closed");
    }
}

fn invocation_error(request: u64, error: &str, cause: Option<BusError>) -> WampMessage {
    let args = cause
        .map(|err| vec![Value::String(err.to_string())])
        .unwrap_or_default();
    WampMessage::Error {
        request_type: INVOCATION,
        request,
        details: Map::new(),
        error: error.into(),
        payload: Payload::args(args),
    }
}

fn unexpected_reply() -> BusError {
    BusError::Protocol("reply does not match request".into())
}

impl Bus for WampBus {
    /// Note that routers hand out one subscription id per topic and session, so
    /// subscribing twice to the same topic replaces the earlier handler.
    fn subscribe(
        &self,
        topic: &str,
        handler: EventHandler,
    ) -> BoxFuture<'static, BusResult<Subscription>> {
        let topic = topic.to_string();
        let reply = self.inner.request(Some(PendingHandler::Event(handler)), |request| {
            WampMessage::Subscribe {
                request,
                options: Map::new(),
                topic: topic.clone(),
            }
        });
        Box::pin(async move {
            match reply.await? {
                Reply::Subscribed(id) => Ok(Subscription::new(id, topic)),
                _ => Err(unexpected_reply()),
            }
        })
    }

    fn unsubscribe(&self, subscription: Subscription) -> BoxFuture<'static, BusResult<()>> {
        // Stop dispatching right away, even if the router is slow to confirm.
        self.inner.subscriptions.remove(&subscription.id());
        let reply = self.inner.request(None, |request| WampMessage::Unsubscribe {
            request,
            subscription: subscription.id(),
        });
        Box::pin(async move {
            match reply.await? {
                Reply::Unsubscribed => Ok(()),
                _ => Err(unexpected_reply()),
            }
        })
    }

    fn publish(&self, topic: &str, payload: Payload) -> BusResult<()> {
        self.inner.send(WampMessage::Publish {
            request: self.inner.next_request(),
            options: Map::new(),
            topic: topic.to_string(),
            payload,
        })
    }

    fn call(&self, procedure: &str, payload: Payload) -> BoxFuture<'static, BusResult<Payload>> {
        let reply = self.inner.request(None, |request| WampMessage::Call {
            request,
            options: Map::new(),
            procedure: procedure.to_string(),
            payload,
        });
        Box::pin(async move {
            match reply.await? {
                Reply::Result(payload) => Ok(payload),
                _ => Err(unexpected_reply()),
            }
        })
    }

    fn register(
        &self,
        procedure: &str,
        handler: ProcedureHandler,
    ) -> BoxFuture<'static, BusResult<()>> {
        let reply = self
            .inner
            .request(Some(PendingHandler::Procedure(handler)), |request| {
                WampMessage::Register {
                    request,
                    options: Map::new(),
                    procedure: procedure.to_string(),
                }
            });
        Box::pin(async move {
            match reply.await? {
                Reply::Registered(_) => Ok(()),
                _ => Err(unexpected_reply()),
            }
        })
    }

    fn closed(&self) -> BoxFuture<'static, ()> {
        let mut rx = self.inner.closed.subscribe();
        Box::pin(async move {
            let _ = rx.wait_for(|closed| *closed).await;
        })
    }

    fn close(&self) -> BoxFuture<'static, ()> {
        let inner = self.inner.clone();
        Box::pin(async move {
            if inner.goodbye_sent.swap(true, Ordering::SeqCst) {
                return;
            }
            let mut rx = inner.closed.subscribe();
            if inner
                .send(WampMessage::Goodbye {
                    details: Map::new(),
                    reason: "wamp.close.system_shutdown".into(),
                })
                .is_err()
            {
                return;
            }
            if tokio::time::timeout(GOODBYE_TIMEOUT, rx.wait_for(|closed| *closed))
                .await
                .is_err()
            {
                warn!("router did not acknowledge goodbye; closing socket");
                let _ = inner.outbound.send(Message::Close(None));
            }
        })
    }
}

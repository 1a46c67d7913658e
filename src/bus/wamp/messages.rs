//! WAMP v2 message codec for the JSON serialization (`wamp.2.json`).
//!
//! Every frame is a JSON array whose first element is the message code.
//! Trailing `args`/`kwargs` are only written when non-empty.

use serde_json::{Map, Value, json};

use crate::bus::{BusError, BusResult, Payload};

pub const HELLO: u64 = 1;
pub const WELCOME: u64 = 2;
pub const ABORT: u64 = 3;
pub const CHALLENGE: u64 = 4;
pub const AUTHENTICATE: u64 = 5;
pub const GOODBYE: u64 = 6;
pub const ERROR: u64 = 8;
pub const PUBLISH: u64 = 16;
pub const SUBSCRIBE: u64 = 32;
pub const SUBSCRIBED: u64 = 33;
pub const UNSUBSCRIBE: u64 = 34;
pub const UNSUBSCRIBED: u64 = 35;
pub const EVENT: u64 = 36;
pub const CALL: u64 = 48;
pub const RESULT: u64 = 50;
pub const REGISTER: u64 = 64;
pub const REGISTERED: u64 = 65;
pub const INVOCATION: u64 = 68;
pub const YIELD: u64 = 70;

/// Messages exchanged with the router.
#[derive(Debug, Clone, PartialEq)]
pub enum WampMessage {
    Hello {
        realm: String,
        details: Map<String, Value>,
    },
    Welcome {
        session: u64,
        details: Map<String, Value>,
    },
    Abort {
        details: Map<String, Value>,
        reason: String,
    },
    Challenge {
        method: String,
        extra: Map<String, Value>,
    },
    Authenticate {
        signature: String,
        extra: Map<String, Value>,
    },
    Goodbye {
        details: Map<String, Value>,
        reason: String,
    },
    Error {
        request_type: u64,
        request: u64,
        details: Map<String, Value>,
        error: String,
        payload: Payload,
    },
    Publish {
        request: u64,
        options: Map<String, Value>,
        topic: String,
        payload: Payload,
    },
    Subscribe {
        request: u64,
        options: Map<String, Value>,
        topic: String,
    },
    Subscribed {
        request: u64,
        subscription: u64,
    },
    Unsubscribe {
        request: u64,
        subscription: u64,
    },
    Unsubscribed {
        request: u64,
    },
    Event {
        subscription: u64,
        publication: u64,
        details: Map<String, Value>,
        payload: Payload,
    },
    Call {
        request: u64,
        options: Map<String, Value>,
        procedure: String,
        payload: Payload,
    },
    Result {
        request: u64,
        details: Map<String, Value>,
        payload: Payload,
    },
    Register {
        request: u64,
        options: Map<String, Value>,
        procedure: String,
    },
    Registered {
        request: u64,
        registration: u64,
    },
    Invocation {
        request: u64,
        registration: u64,
        details: Map<String, Value>,
        payload: Payload,
    },
    Yield {
        request: u64,
        options: Map<String, Value>,
        payload: Payload,
    },
}

impl WampMessage {
    /// Serialize into the frame text sent over the socket.
    pub fn encode(&self) -> BusResult<String> {
        serde_json::to_string(&self.to_value()).map_err(BusError::Encode)
    }

    /// Parse a text frame received from the router.
    pub fn decode(text: &str) -> BusResult<Self> {
        let value: Value = serde_json::from_str(text)
            .map_err(|err| BusError::Protocol(format!("invalid JSON frame: {err}")))?;
        let Value::Array(items) = value else {
            return Err(BusError::Protocol("frame is not an array".into()));
        };
        let frame = Frame(&items);

        let message = match frame.id(0)? {
            HELLO => WampMessage::Hello {
                realm: frame.text(1)?,
                details: frame.dict(2)?,
            },
            WELCOME => WampMessage::Welcome {
                session: frame.id(1)?,
                details: frame.dict(2)?,
            },
            ABORT => WampMessage::Abort {
                details: frame.dict(1)?,
                reason: frame.text(2)?,
            },
            CHALLENGE => WampMessage::Challenge {
                method: frame.text(1)?,
                extra: frame.dict(2)?,
            },
            AUTHENTICATE => WampMessage::Authenticate {
                signature: frame.text(1)?,
                extra: frame.dict(2)?,
            },
            GOODBYE => WampMessage::Goodbye {
                details: frame.dict(1)?,
                reason: frame.text(2)?,
            },
            ERROR => WampMessage::Error {
                request_type: frame.id(1)?,
                request: frame.id(2)?,
                details: frame.dict(3)?,
                error: frame.text(4)?,
                payload: frame.payload(5)?,
            },
            PUBLISH => WampMessage::Publish {
                request: frame.id(1)?,
                options: frame.dict(2)?,
                topic: frame.text(3)?,
                payload: frame.payload(4)?,
            },
            SUBSCRIBE => WampMessage::Subscribe {
                request: frame.id(1)?,
                options: frame.dict(2)?,
                topic: frame.text(3)?,
            },
            SUBSCRIBED => WampMessage::Subscribed {
                request: frame.id(1)?,
                subscription: frame.id(2)?,
            },
            UNSUBSCRIBE => WampMessage::Unsubscribe {
                request: frame.id(1)?,
                subscription: frame.id(2)?,
            },
            UNSUBSCRIBED => WampMessage::Unsubscribed {
                request: frame.id(1)?,
            },
            EVENT => WampMessage::Event {
                subscription: frame.id(1)?,
                publication: frame.id(2)?,
                details: frame.dict(3)?,
                payload: frame.payload(4)?,
            },
            CALL => WampMessage::Call {
                request: frame.id(1)?,
                options: frame.dict(2)?,
                procedure: frame.text(3)?,
                payload: frame.payload(4)?,
            },
            RESULT => WampMessage::Result {
                request: frame.id(1)?,
                details: frame.dict(2)?,
                payload: frame.payload(3)?,
            },
            REGISTER => WampMessage::Register {
                request: frame.id(1)?,
                options: frame.dict(2)?,
                procedure: frame.text(3)?,
            },
            REGISTERED => WampMessage::Registered {
                request: frame.id(1)?,
                registration: frame.id(2)?,
            },
            INVOCATION => WampMessage::Invocation {
                request: frame.id(1)?,
                registration: frame.id(2)?,
                details: frame.dict(3)?,
                payload: frame.payload(4)?,
            },
            YIELD => WampMessage::Yield {
                request: frame.id(1)?,
                options: frame.dict(2)?,
                payload: frame.payload(3)?,
            },
            other => return Err(BusError::Protocol(format!("unsupported message code {other}"))),
        };

        Ok(message)
    }

    fn to_value(&self) -> Value {
        let mut items = match self {
            WampMessage::Hello { realm, details } => vec![json!(HELLO), json!(realm), json!(details)],
            WampMessage::Welcome { session, details } => {
                vec![json!(WELCOME), json!(session), json!(details)]
            }
            WampMessage::Abort { details, reason } => {
                vec![json!(ABORT), json!(details), json!(reason)]
            }
            WampMessage::Challenge { method, extra } => {
                vec![json!(CHALLENGE), json!(method), json!(extra)]
            }
            WampMessage::Authenticate { signature, extra } => {
                vec![json!(AUTHENTICATE), json!(signature), json!(extra)]
            }
            WampMessage::Goodbye { details, reason } => {
                vec![json!(GOODBYE), json!(details), json!(reason)]
            }
            WampMessage::Error {
                request_type,
                request,
                details,
                error,
                ..
            } => vec![
                json!(ERROR),
                json!(request_type),
                json!(request),
                json!(details),
                json!(error),
            ],
            WampMessage::Publish {
                request,
                options,
                topic,
                ..
            } => vec![json!(PUBLISH), json!(request), json!(options), json!(topic)],
            WampMessage::Subscribe {
                request,
                options,
                topic,
            } => vec![json!(SUBSCRIBE), json!(request), json!(options), json!(topic)],
            WampMessage::Subscribed {
                request,
                subscription,
            } => vec![json!(SUBSCRIBED), json!(request), json!(subscription)],
            WampMessage::Unsubscribe {
                request,
                subscription,
            } => vec![json!(UNSUBSCRIBE), json!(request), json!(subscription)],
            WampMessage::Unsubscribed { request } => vec![json!(UNSUBSCRIBED), json!(request)],
            WampMessage::Event {
                subscription,
                publication,
                details,
                ..
            } => vec![
                json!(EVENT),
                json!(subscription),
                json!(publication),
                json!(details),
            ],
            WampMessage::Call {
                request,
                options,
                procedure,
                ..
            } => vec![json!(CALL), json!(request), json!(options), json!(procedure)],
            WampMessage::Result {
                request, details, ..
            } => vec![json!(RESULT), json!(request), json!(details)],
            WampMessage::Register {
                request,
                options,
                procedure,
            } => vec![json!(REGISTER), json!(request), json!(options), json!(procedure)],
            WampMessage::Registered {
                request,
                registration,
            } => vec![json!(REGISTERED), json!(request), json!(registration)],
            WampMessage::Invocation {
                request,
                registration,
                details,
                ..
            } => vec![
                json!(INVOCATION),
                json!(request),
                json!(registration),
                json!(details),
            ],
            WampMessage::Yield {
                request, options, ..
            } => vec![json!(YIELD), json!(request), json!(options)],
        };

        if let Some(payload) = self.payload() {
            if !payload.args.is_empty() || !payload.kwargs.is_empty() {
                items.push(Value::Array(payload.args.clone()));
            }
            if !payload.kwargs.is_empty() {
                items.push(Value::Object(payload.kwargs.clone()));
            }
        }

        Value::Array(items)
    }

    fn payload(&self) -> Option<&Payload> {
        match self {
            WampMessage::Error { payload, .. }
            | WampMessage::Publish { payload, .. }
            | WampMessage::Event { payload, .. }
            | WampMessage::Call { payload, .. }
            | WampMessage::Result { payload, .. }
            | WampMessage::Invocation { payload, .. }
            | WampMessage::Yield { payload, .. } => Some(payload),
            _ => None,
        }
    }
}

/// Positional accessors over a decoded frame.
struct Frame<'a>(&'a [Value]);

impl Frame<'_> {
    fn field(&self, index: usize) -> BusResult<&Value> {
        self.0
            .get(index)
            .ok_or_else(|| BusError::Protocol(format!("frame is missing element {index}")))
    }

    fn id(&self, index: usize) -> BusResult<u64> {
        self.field(index)?
            .as_u64()
            .ok_or_else(|| BusError::Protocol(format!("element {index} is not an id")))
    }

    fn text(&self, index: usize) -> BusResult<String> {
        self.field(index)?
            .as_str()
            .map(str::to_string)
            .ok_or_else(|| BusError::Protocol(format!("element {index} is not a string")))
    }

    fn dict(&self, index: usize) -> BusResult<Map<String, Value>> {
        self.field(index)?
            .as_object()
            .cloned()
            .ok_or_else(|| BusError::Protocol(format!("element {index} is not a dict")))
    }

    fn payload(&self, start: usize) -> BusResult<Payload> {
        let args = match self.0.get(start) {
            None => Vec::new(),
            Some(Value::Array(args)) => args.clone(),
            Some(_) => return Err(BusError::Protocol("args element is not a list".into())),
        };
        let kwargs = match self.0.get(start + 1) {
            None => Map::new(),
            Some(Value::Object(kwargs)) => kwargs.clone(),
            Some(_) => return Err(BusError::Protocol("kwargs element is not a dict".into())),
        };
        Ok(Payload { args, kwargs })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn decodes_event_with_args_and_kwargs() {
        let message =
            WampMessage::decode(r#"[36, 5512315355, 4429313566, {}, ["a"], {"timestamp": 900}]"#)
                .unwrap();
        match message {
            WampMessage::Event {
                subscription,
                payload,
                ..
            } => {
                assert_eq!(subscription, 5512315355);
                assert_eq!(payload.args, vec![json!("a")]);
                assert_eq!(payload.kwarg("timestamp"), Some(&json!(900)));
            }
            other => panic!("unexpected message {other:?}"),
        }
    }

    #[test]
    fn encodes_publish_with_kwargs_only() {
        let message = WampMessage::Publish {
            request: 7,
            options: Map::new(),
            topic: "badge.1.text".into(),
            payload: Payload::default().with_kwarg("style", 1),
        };
        assert_eq!(
            message.encode().unwrap(),
            r#"[16,7,{},"badge.1.text",[],{"style":1}]"#
        );
    }

    #[test]
    fn omits_empty_payload() {
        let message = WampMessage::Call {
            request: 1,
            options: Map::new(),
            procedure: "game.x.get_config".into(),
            payload: Payload::default(),
        };
        assert_eq!(message.encode().unwrap(), r#"[48,1,{},"game.x.get_config"]"#);
    }

    #[test]
    fn decodes_error_reply() {
        let message =
            WampMessage::decode(r#"[8, 48, 3, {}, "wamp.error.no_such_procedure"]"#).unwrap();
        assert_eq!(
            message,
            WampMessage::Error {
                request_type: CALL,
                request: 3,
                details: Map::new(),
                error: "wamp.error.no_such_procedure".into(),
                payload: Payload::default(),
            }
        );
    }

    #[test]
    fn rejects_malformed_frames() {
        assert!(WampMessage::decode("{}").is_err());
        assert!(WampMessage::decode("[999]").is_err());
        assert!(WampMessage::decode(r#"[33, "x", 1]"#).is_err());
    }
}

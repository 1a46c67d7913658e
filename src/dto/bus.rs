//! Arguments exchanged with the router: registration, button events and badge commands.

use serde::{Deserialize, Serialize};
use serde_json::{Value, json};

use crate::{
    bus::Payload,
    error::ServiceError,
    state::{
        actor::ActorId,
        color::Color,
        interaction::{LIGHT_SLOTS, Timestamp},
        station::Button,
    },
};

/// Reply of the `game.register` call.
#[derive(Debug, Default, Deserialize)]
pub struct RegisterReply {
    #[serde(default)]
    pub error: Option<String>,
    /// Badges already joined to the game, replayed as joins.
    #[serde(default)]
    pub players: Vec<Value>,
}

impl TryFrom<Payload> for RegisterReply {
    type Error = ServiceError;

    fn try_from(payload: Payload) -> Result<Self, Self::Error> {
        serde_json::from_value(Value::Object(payload.kwargs))
            .map_err(|err| ServiceError::InvalidPayload(format!("register reply: {err}")))
    }
}

/// Arguments of the `game.register` call.
pub fn register_request(game_id: &str, sequence: &str, location: &str) -> Payload {
    Payload::args(vec![json!(game_id)])
        .with_kwarg("sequence", sequence)
        .with_kwarg("location", location)
}

/// Normalise an actor id sent as a JSON string or number.
pub fn actor_id_from_value(value: &Value) -> Option<ActorId> {
    match value {
        Value::String(id) if !id.is_empty() => Some(ActorId::new(id.clone())),
        Value::Number(id) => Some(ActorId::new(id.to_string())),
        _ => None,
    }
}

/// Actor id carried by a join or leave event.
pub fn actor_id_from_payload(payload: &Payload) -> Result<ActorId, ServiceError> {
    payload
        .get(0, "badge_id")
        .and_then(actor_id_from_value)
        .ok_or_else(|| ServiceError::InvalidPayload("missing badge id".into()))
}

/// A decoded `button.press` or `button.release` event.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ButtonEvent {
    pub button: Button,
    pub timestamp: Timestamp,
}

impl TryFrom<&Payload> for ButtonEvent {
    type Error = ServiceError;

    fn try_from(payload: &Payload) -> Result<Self, Self::Error> {
        let button = payload
            .get(0, "button")
            .and_then(Value::as_str)
            .ok_or_else(|| ServiceError::InvalidPayload("missing button".into()))?
            .parse::<Button>()
            .map_err(|err| ServiceError::InvalidPayload(err.to_string()))?;

        let timestamp = match payload.get(1, "timestamp") {
            None | Some(Value::Null) => 0,
            Some(value) => value.as_u64().ok_or_else(|| {
                ServiceError::InvalidPayload(format!("timestamp `{value}` is not a millisecond count"))
            })?,
        };

        Ok(Self { button, timestamp })
    }
}

/// Arguments of `badge.<id>.lights_static`, in slot order.
pub fn lights_command(lights: [Color; LIGHT_SLOTS]) -> Payload {
    Payload::args(lights.iter().map(|color| json!(color.0)).collect())
}

/// Arguments of `badge.<id>.text`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TextCommand {
    pub x: u32,
    pub y: u32,
    pub text: String,
    pub style: u32,
}

impl From<&TextCommand> for Payload {
    fn from(command: &TextCommand) -> Self {
        Payload::args(vec![json!(command.x), json!(command.y), json!(command.text)])
            .with_kwarg("style", command.style)
    }
}

/// Serialize `value` as the keyword arguments of a payload.
pub fn kwargs_payload<T: Serialize>(value: &T) -> Result<Payload, ServiceError> {
    match serde_json::to_value(value) {
        Ok(Value::Object(kwargs)) => Ok(Payload {
            args: Vec::new(),
            kwargs,
        }),
        Ok(other) => Err(ServiceError::InvalidPayload(format!(
            "expected an object, got `{other}`"
        ))),
        Err(err) => Err(ServiceError::InvalidPayload(err.to_string())),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn actor_ids_accept_strings_and_numbers() {
        assert_eq!(actor_id_from_value(&json!("42")), Some(ActorId::new("42")));
        assert_eq!(actor_id_from_value(&json!(42)), Some(ActorId::new("42")));
        assert_eq!(actor_id_from_value(&json!("")), None);
        assert_eq!(actor_id_from_value(&json!(null)), None);
    }

    #[test]
    fn button_event_from_positional_args() {
        let payload = Payload::args(vec![json!("a"), json!(900)]);
        assert_eq!(
            ButtonEvent::try_from(&payload).unwrap(),
            ButtonEvent {
                button: Button::A,
                timestamp: 900
            }
        );
    }

    #[test]
    fn button_event_from_kwargs_defaults_timestamp() {
        let payload = Payload::default().with_kwarg("button", "select");
        assert_eq!(
            ButtonEvent::try_from(&payload).unwrap(),
            ButtonEvent {
                button: Button::Select,
                timestamp: 0
            }
        );
    }

    #[test]
    fn button_event_rejects_unknown_buttons() {
        let payload = Payload::args(vec![json!("x")]);
        assert!(matches!(
            ButtonEvent::try_from(&payload),
            Err(ServiceError::InvalidPayload(_))
        ));
        let payload = Payload::args(vec![json!("a"), json!(-5)]);
        assert!(ButtonEvent::try_from(&payload).is_err());
    }

    #[test]
    fn register_reply_reads_kwargs() {
        let payload = Payload::default().with_kwarg("players", json!([1, "2"]));
        let reply = RegisterReply::try_from(payload).unwrap();
        assert!(reply.error.is_none());
        assert_eq!(reply.players.len(), 2);

        let payload = Payload::default().with_kwarg("error", "taken");
        let reply = RegisterReply::try_from(payload).unwrap();
        assert_eq!(reply.error.as_deref(), Some("taken"));
    }

    #[test]
    fn text_command_carries_style_as_kwarg() {
        let payload = Payload::from(&TextCommand {
            x: 0,
            y: 24,
            text: "hi".into(),
            style: 1,
        });
        assert_eq!(payload.args, vec![json!(0), json!(24), json!("hi")]);
        assert_eq!(payload.kwarg("style"), Some(&json!(1)));
    }
}

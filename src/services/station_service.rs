//! Remote procedures of the station game.

use serde_json::Value;
use tracing::{info, warn};

use crate::{
    bus::{Bus, BusError, BusResult, Payload, procedure_handler},
    dto::{
        bus::{actor_id_from_payload, kwargs_payload},
        station::{GameConfigReply, PlayerSnapshot, StationConfig, StationUpdated},
    },
    error::ServiceError,
    state::{SharedState, actor::ActorId, station::Button},
};

use super::{button_service::publish_player_updated, topics};

pub const GET_CONFIG: &str = "get_config";
pub const SET_STATION: &str = "set_station";
pub const RESET_BUTTON: &str = "reset_button";

/// Register the station procedures on `bus`.
pub async fn register_procedures(state: &SharedState, bus: &dyn Bus) -> BusResult<()> {
    let game_id = state.game_id();

    let handler_state = state.clone();
    bus.register(
        &topics::procedure(game_id, GET_CONFIG),
        procedure_handler(move |_payload| {
            let state = handler_state.clone();
            async move { get_config(&state).await.map_err(BusError::from) }
        }),
    )
    .await?;

    let handler_state = state.clone();
    bus.register(
        &topics::procedure(game_id, SET_STATION),
        procedure_handler(move |payload| {
            let state = handler_state.clone();
            async move {
                set_station(&state, &payload)
                    .await
                    .map(bool_reply)
                    .map_err(BusError::from)
            }
        }),
    )
    .await?;

    let handler_state = state.clone();
    bus.register(
        &topics::procedure(game_id, RESET_BUTTON),
        procedure_handler(move |payload| {
            let state = handler_state.clone();
            async move {
                reset_button(&state, &payload)
                    .await
                    .map(bool_reply)
                    .map_err(BusError::from)
            }
        }),
    )
    .await?;

    info!(game_id, "station procedures registered");
    Ok(())
}

fn bool_reply(value: bool) -> Payload {
    Payload::args(vec![Value::Bool(value)])
}

/// Every live player plus the station directory.
pub async fn get_config(state: &SharedState) -> Result<Payload, ServiceError> {
    let mut players = Vec::new();
    for id in state.population().ids() {
        let lock = state.population().lock(&id).await;
        if let Some(actor) = lock.actor() {
            players.push(PlayerSnapshot::from(actor));
        }
    }
    kwargs_payload(&GameConfigReply::new(players, state.stations()))
}

/// `set_station(badge_id, station_id)`: `false` when either is unknown.
pub async fn set_station(state: &SharedState, payload: &Payload) -> Result<bool, ServiceError> {
    let badge_id = actor_id_from_payload(payload)?;
    let station_id = payload
        .get(1, "station_id")
        .and_then(Value::as_str)
        .ok_or_else(|| ServiceError::InvalidPayload("missing station id".into()))?;

    match assign_station(state, &badge_id, station_id).await {
        Ok(update) => {
            let bus = state.bus().await?;
            bus.publish(
                &topics::station_updated(state.game_id()),
                kwargs_payload(&update)?,
            )?;
            info!(badge_id = %badge_id, station = station_id, "station assigned");
            Ok(true)
        }
        Err(err @ (ServiceError::UnknownActor(_) | ServiceError::UnknownStation(_))) => {
            warn!(badge_id = %badge_id, error = %err, "station not assigned");
            Ok(false)
        }
        Err(err) => Err(err),
    }
}

async fn assign_station(
    state: &SharedState,
    badge_id: &ActorId,
    station_id: &str,
) -> Result<StationUpdated, ServiceError> {
    let station = state
        .stations()
        .get(station_id)
        .ok_or_else(|| ServiceError::UnknownStation(station_id.to_string()))?;

    let mut lock = state.population().lock(badge_id).await;
    let actor = lock
        .actor_mut()
        .ok_or_else(|| ServiceError::UnknownActor(badge_id.to_string()))?;
    actor.station = Some(station.name.clone());

    Ok(StationUpdated {
        id: station.name.clone(),
        config: StationConfig::from(station),
    })
}

/// `reset_button(badge_id, button)`: rearm a button and drop its flag.
pub async fn reset_button(state: &SharedState, payload: &Payload) -> Result<bool, ServiceError> {
    let badge_id = actor_id_from_payload(payload)?;
    let button = payload
        .get(1, "button")
        .and_then(Value::as_str)
        .ok_or_else(|| ServiceError::InvalidPayload("missing button".into()))?
        .parse::<Button>()
        .map_err(|err| ServiceError::InvalidPayload(err.to_string()))?;

    let snapshot = {
        let mut lock = state.population().lock(&badge_id).await;
        let Some(actor) = lock.actor_mut() else {
            warn!(badge_id = %badge_id, "reset requested for unknown badge");
            return Ok(false);
        };
        let action = actor
            .station
            .as_deref()
            .and_then(|name| state.stations().get(name))
            .and_then(|station| station.action(button))
            .cloned();
        actor.reset(button, action.as_ref());
        PlayerSnapshot::from(&*actor)
    };

    info!(badge_id = %badge_id, %button, "button reset");
    publish_player_updated(state, &snapshot).await?;
    Ok(true)
}

//! Button press/release handling for both game variants.

use tracing::{debug, warn};
use uuid::Uuid;

use crate::{
    bus::Payload,
    config::GameMode,
    dto::{
        bus::{ButtonEvent, TextCommand, kwargs_payload},
        station::PlayerSnapshot,
    },
    error::ServiceError,
    state::{
        SharedState,
        actor::{Actor, ActorId},
        interaction::{PressOutcome, ReleaseOutcome},
        station::{Action, Button},
    },
};

use super::{
    lights_service::{self, Feedback},
    topics, webhook_service,
};

/// Text shown when the select button is pressed in the simple game.
pub const SELECT_TEXT: &str = "You pressed select! Wow!";

/// Whether a button event is a press or a release.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ButtonEdge {
    Press,
    Release,
}

/// Entry point for a button event delivered on a per-badge subscription.
///
/// `session` is the token of the join that created the subscription; events
/// for an earlier session of the same badge are dropped. Failures are logged
/// here and never leave the handler.
pub async fn handle_button_event(
    state: SharedState,
    badge_id: ActorId,
    session: Uuid,
    edge: ButtonEdge,
    payload: Payload,
) {
    let result = match ButtonEvent::try_from(&payload) {
        Ok(event) => match (state.mode(), edge) {
            (GameMode::Simple, ButtonEdge::Press) => {
                simple_press(&state, &badge_id, session, event.button).await
            }
            (GameMode::Simple, ButtonEdge::Release) => Ok(()),
            (GameMode::Station, ButtonEdge::Press) => {
                station_press(&state, &badge_id, session, event).await
            }
            (GameMode::Station, ButtonEdge::Release) => {
                station_release(&state, &badge_id, session, event).await
            }
        },
        Err(err) => Err(err),
    };

    if let Err(err) = result {
        warn!(badge_id = %badge_id, ?edge, error = %err, "button event failed");
    }
}

/// Lock `badge_id` and run `f` on its actor if `session` is still live.
async fn with_live_actor<T>(
    state: &SharedState,
    badge_id: &ActorId,
    session: Uuid,
    f: impl FnOnce(&mut Actor) -> T,
) -> Result<Option<T>, ServiceError> {
    let mut lock = state.population().lock(badge_id).await;
    match lock.actor_mut() {
        Some(actor) if actor.session == session => Ok(Some(f(actor))),
        Some(_) => {
            debug!(badge_id = %badge_id, "dropping event from an earlier session");
            Ok(None)
        }
        None => Err(ServiceError::UnknownActor(badge_id.to_string())),
    }
}

/// Simple game: the button map edits lights, then the lights are republished.
async fn simple_press(
    state: &SharedState,
    badge_id: &ActorId,
    session: Uuid,
    button: Button,
) -> Result<(), ServiceError> {
    let bus = state.bus().await?;
    let lights = with_live_actor(state, badge_id, session, |actor| {
        match button {
            Button::Up => actor.next_selected_color(),
            Button::Down => actor.prev_selected_color(),
            Button::Left => actor.select_next_light(),
            Button::Right => actor.select_prev_light(),
            Button::A => actor.brighten(),
            Button::B => actor.dim(),
            Button::Select | Button::Start => {}
        }
        actor.rendered_lights()
    })
    .await?;
    let Some(lights) = lights else {
        return Ok(());
    };

    debug!(badge_id = %badge_id, %button, "simple press handled");
    if button == Button::Select {
        lights_service::publish_text(
            bus.as_ref(),
            badge_id,
            &TextCommand {
                x: 0,
                y: 0,
                text: SELECT_TEXT.into(),
                style: 1,
            },
        )?;
    }
    lights_service::publish_raw_lights(bus.as_ref(), badge_id, lights)
}

fn action_for(state: &SharedState, actor: &Actor, button: Button) -> Option<Action> {
    let station = actor.station.as_deref()?;
    state.stations().get(station)?.action(button).cloned()
}

/// Station game: start a hold, or fire zero-hold actions immediately.
async fn station_press(
    state: &SharedState,
    badge_id: &ActorId,
    session: Uuid,
    event: ButtonEvent,
) -> Result<(), ServiceError> {
    let outcome = with_live_actor(state, badge_id, session, |actor| {
        let action = action_for(state, actor, event.button);
        actor.press(event.button, action.as_ref(), event.timestamp)
    })
    .await?;

    match outcome {
        None | Some(PressOutcome::Ignored) => {
            debug!(badge_id = %badge_id, button = %event.button, "press ignored");
        }
        Some(PressOutcome::Fired { message }) => {
            webhook_service::emit_message(state, badge_id, &message);
            spawn_feedback(state, badge_id, session, Feedback::Success);
        }
        Some(PressOutcome::Holding { press, plan }) => {
            let state = state.clone();
            let badge_id = badge_id.clone();
            tokio::spawn(async move {
                let progress = lights_service::run_progress(
                    &state,
                    &badge_id,
                    session,
                    event.button,
                    press,
                    plan,
                );
                if let Err(err) = progress.await {
                    warn!(badge_id = %badge_id, error = %err, "progress feedback failed");
                }
            });
        }
    }
    Ok(())
}

/// Station game: judge the hold from badge timestamps.
async fn station_release(
    state: &SharedState,
    badge_id: &ActorId,
    session: Uuid,
    event: ButtonEvent,
) -> Result<(), ServiceError> {
    let outcome = with_live_actor(state, badge_id, session, |actor| {
        let action = action_for(state, actor, event.button);
        let outcome = actor.release(event.button, action.as_ref(), event.timestamp);
        let snapshot = matches!(outcome, ReleaseOutcome::Succeeded { .. })
            .then(|| PlayerSnapshot::from(&*actor));
        (outcome, snapshot)
    })
    .await?;

    let Some((outcome, snapshot)) = outcome else {
        return Ok(());
    };
    match outcome {
        ReleaseOutcome::Ignored => {
            debug!(badge_id = %badge_id, button = %event.button, "release ignored");
        }
        ReleaseOutcome::Failed(reason) => {
            debug!(badge_id = %badge_id, button = %event.button, ?reason, "hold failed");
            spawn_feedback(state, badge_id, session, Feedback::Failure);
        }
        ReleaseOutcome::Succeeded {
            press_count,
            message,
            flagged,
        } => {
            debug!(badge_id = %badge_id, button = %event.button, press_count, flagged, "hold counted");
            spawn_feedback(state, badge_id, session, Feedback::Success);
            if let Some(message) = message {
                webhook_service::emit_message(state, badge_id, &message);
            }
            if let Some(snapshot) = snapshot {
                publish_player_updated(state, &snapshot).await?;
            }
        }
    }
    Ok(())
}

/// Broadcast a player's counters and flags.
pub async fn publish_player_updated(
    state: &SharedState,
    snapshot: &PlayerSnapshot,
) -> Result<(), ServiceError> {
    let bus = state.bus().await?;
    bus.publish(
        &topics::player_updated(state.game_id()),
        kwargs_payload(snapshot)?,
    )?;
    Ok(())
}

fn spawn_feedback(state: &SharedState, badge_id: &ActorId, session: Uuid, feedback: Feedback) {
    let state = state.clone();
    let badge_id = badge_id.clone();
    tokio::spawn(async move {
        if let Err(err) = lights_service::play_feedback(&state, &badge_id, session, feedback).await {
            warn!(badge_id = %badge_id, ?feedback, error = %err, "feedback sequence failed");
        }
    });
}

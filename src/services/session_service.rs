//! Session lifecycle: connection, population channels, registration, joins and leaves.

use std::{future::Future, sync::Arc};

use futures::future::join_all;
use tracing::{debug, info, warn};

use crate::{
    bus::{
        Bus, BusError, BusResult, Payload, Subscription, event_handler,
        wamp::{HandshakeProgress, WampBus},
    },
    config::GameMode,
    dto::bus::{
        RegisterReply, TextCommand, actor_id_from_payload, actor_id_from_value, register_request,
    },
    error::ServiceError,
    state::{
        SharedState,
        actor::{Actor, ActorId},
        session::SessionEvent,
    },
};

use super::{
    button_service::{self, ButtonEdge},
    lights_service, station_service, topics,
};

/// Text shown on a badge when it joins the simple game.
pub const WELCOME_TEXT: &str = "THANK YOU for supporting us!";

/// Open the WAMP session, mirroring handshake progress into the session phase.
pub async fn connect(state: &SharedState) -> Result<Arc<dyn Bus>, ServiceError> {
    state.apply_session_event(SessionEvent::Connect);
    let progress_state = state.clone();
    let connected = WampBus::connect(&state.config().bus, move |progress| {
        let event = match progress {
            HandshakeProgress::Connected => return,
            HandshakeProgress::Challenged => SessionEvent::Challenged,
            HandshakeProgress::Welcomed => SessionEvent::Welcomed,
        };
        progress_state.apply_session_event(event);
    })
    .await;

    match connected {
        Ok(bus) => Ok(Arc::new(bus)),
        Err(err) => {
            state.apply_session_event(SessionEvent::Disconnected);
            Err(err.into())
        }
    }
}

/// Drive a joined session until the transport closes or `shutdown` resolves.
pub async fn run<F>(state: SharedState, bus: Arc<dyn Bus>, shutdown: F) -> Result<(), ServiceError>
where
    F: Future<Output = ()>,
{
    if let Err(err) = start(&state, bus.clone()).await {
        bus.close().await;
        finish(&state).await;
        return Err(err);
    }

    tokio::select! {
        _ = bus.closed() => info!("bus connection closed"),
        _ = shutdown => {
            info!("shutdown requested; leaving realm");
            bus.close().await;
        }
    }

    finish(&state).await;
    Ok(())
}

/// Install `bus`, subscribe to the population channels and register the game.
///
/// Registration problems are logged and leave the session running unregistered.
pub async fn start(state: &SharedState, bus: Arc<dyn Bus>) -> Result<(), ServiceError> {
    state.install_bus(bus.clone()).await;
    let game_id = state.game_id();

    let join_state = state.clone();
    bus.subscribe(
        &topics::player_join(game_id),
        event_handler(move |payload| {
            let state = join_state.clone();
            async move { on_population_event(&state, payload, PopulationEdge::Join).await }
        }),
    )
    .await?;

    let leave_state = state.clone();
    bus.subscribe(
        &topics::player_leave(game_id),
        event_handler(move |payload| {
            let state = leave_state.clone();
            async move { on_population_event(&state, payload, PopulationEdge::Leave).await }
        }),
    )
    .await?;

    let register_state = state.clone();
    bus.subscribe(
        topics::REQUEST_REGISTER,
        event_handler(move |_payload| {
            let state = register_state.clone();
            async move {
                info!("router requested registration");
                if let Err(err) = register(&state).await {
                    warn!(error = %err, "registration failed");
                }
            }
        }),
    )
    .await?;

    if state.mode() == GameMode::Station {
        station_service::register_procedures(state, bus.as_ref()).await?;
    }

    if let Err(err) = register(state).await {
        warn!(error = %err, "registration failed");
    }
    Ok(())
}

async fn finish(state: &SharedState) {
    state.set_registered(false);
    state.clear_bus().await;
    state.apply_session_event(SessionEvent::Disconnected);
}

#[derive(Debug, Clone, Copy)]
enum PopulationEdge {
    Join,
    Leave,
}

async fn on_population_event(state: &SharedState, payload: Payload, edge: PopulationEdge) {
    let badge_id = match actor_id_from_payload(&payload) {
        Ok(id) => id,
        Err(err) => {
            warn!(?edge, error = %err, "ignoring population event");
            return;
        }
    };
    let result = match edge {
        PopulationEdge::Join => handle_join(state, &badge_id).await,
        PopulationEdge::Leave => handle_leave(state, &badge_id).await,
    };
    if let Err(err) = result {
        warn!(badge_id = %badge_id, ?edge, error = %err, "population event failed");
    }
}

/// Register with the directory service and replay the joins it reports.
pub async fn register(state: &SharedState) -> Result<(), ServiceError> {
    let _gate = state.registration_gate().lock().await;
    let bus = state.bus().await?;
    let game = &state.config().game;

    state.apply_session_event(SessionEvent::RegistrationStarted);
    let reply = bus
        .call(
            topics::REGISTER,
            register_request(&game.id, &game.join_sequence, &game.join_location),
        )
        .await
        .map_err(ServiceError::from)
        .and_then(RegisterReply::try_from);
    state.apply_session_event(SessionEvent::RegistrationFinished);

    let reply = match reply {
        Ok(reply) => reply,
        Err(err) => {
            state.set_registered(false);
            return Err(err);
        }
    };
    if let Some(error) = reply.error {
        state.set_registered(false);
        return Err(ServiceError::Registration(error));
    }

    state.set_registered(true);
    info!(game_id = %game.id, players = reply.players.len(), "game registered");

    let replays = reply.players.iter().filter_map(|value| {
        let id = actor_id_from_value(value);
        if id.is_none() {
            warn!(player = %value, "ignoring malformed player id in register reply");
        }
        id
    });
    let results = join_all(replays.map(|id| async move {
        let result = handle_join(state, &id).await;
        (id, result)
    }))
    .await;
    for (id, result) in results {
        if let Err(err) = result {
            warn!(badge_id = %id, error = %err, "failed to replay join");
        }
    }
    Ok(())
}

/// Create fresh state for `badge_id` and subscribe to its buttons.
///
/// A badge that is already live is torn down first.
pub async fn handle_join(state: &SharedState, badge_id: &ActorId) -> Result<(), ServiceError> {
    let bus = state.bus().await?;
    let mut lock = state.population().lock(badge_id).await;

    if let Some(previous) = lock.take() {
        debug!(badge_id = %badge_id, "badge joined again; releasing previous session");
        let failures = previous.release_subscriptions(bus.as_ref()).await;
        report_release_failures(badge_id, &failures);
    }

    let mut actor = Actor::new(badge_id.clone());
    let mut edges = vec![(ButtonEdge::Press, topics::button_press(badge_id))];
    if state.mode() == GameMode::Station {
        edges.push((ButtonEdge::Release, topics::button_release(badge_id)));
    }

    for (edge, topic) in edges {
        match subscribe_button(state, bus.as_ref(), &actor, edge, &topic).await {
            Ok(subscription) => actor.add_subscription(subscription),
            Err(err) => {
                let failures = actor.release_subscriptions(bus.as_ref()).await;
                report_release_failures(badge_id, &failures);
                return Err(err.into());
            }
        }
    }

    lights_service::publish_lights(bus.as_ref(), &actor)?;
    if state.mode() == GameMode::Simple {
        lights_service::publish_text(
            bus.as_ref(),
            badge_id,
            &TextCommand {
                x: 0,
                y: 24,
                text: WELCOME_TEXT.into(),
                style: 1,
            },
        )?;
    }

    lock.insert(actor);
    info!(badge_id = %badge_id, "badge joined");
    Ok(())
}

async fn subscribe_button(
    state: &SharedState,
    bus: &dyn Bus,
    actor: &Actor,
    edge: ButtonEdge,
    topic: &str,
) -> BusResult<Subscription> {
    let state = state.clone();
    let badge_id = actor.id.clone();
    let session = actor.session;
    bus.subscribe(
        topic,
        event_handler(move |payload| {
            button_service::handle_button_event(
                state.clone(),
                badge_id.clone(),
                session,
                edge,
                payload,
            )
        }),
    )
    .await
}

/// Release `badge_id`'s subscriptions and forget it.
///
/// The badge stays locked until every release has completed, so a concurrent
/// join waits for the old subscriptions to be gone.
pub async fn handle_leave(state: &SharedState, badge_id: &ActorId) -> Result<(), ServiceError> {
    let bus = state.bus().await?;
    let mut lock = state.population().lock(badge_id).await;
    let actor = lock
        .take()
        .ok_or_else(|| ServiceError::UnknownActor(badge_id.to_string()))?;

    let failures = actor.release_subscriptions(bus.as_ref()).await;
    info!(badge_id = %badge_id, "badge left");
    if failures.is_empty() {
        Ok(())
    } else {
        Err(ServiceError::Release {
            badge_id: badge_id.to_string(),
            failures,
        })
    }
}

fn report_release_failures(badge_id: &ActorId, failures: &[BusError]) {
    for failure in failures {
        warn!(badge_id = %badge_id, error = %failure, "failed to release subscription");
    }
}

//! Badge display commands and the timed feedback sequences built on them.

use std::time::Duration;

use tokio::time::{Instant, sleep};
use tracing::debug;
use uuid::Uuid;

use crate::{
    bus::Bus,
    dto::bus::{TextCommand, lights_command},
    error::ServiceError,
    state::{
        SharedState,
        actor::{Actor, ActorId},
        color::Color,
        interaction::{LIGHT_SLOTS, ProgressPlan, TickVerdict},
        station::Button,
    },
};

use super::topics;

const FLASHES: usize = 2;
const FLASH_ON: Duration = Duration::from_millis(150);
const FLASH_OFF: Duration = Duration::from_millis(100);
const PROGRESS_COLOR: Color = Color::GREEN;
const PENDING_COLOR: Color = Color::ORANGE;

/// Outcome shown on the badge once an interaction settles.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Feedback {
    Success,
    Failure,
}

impl Feedback {
    fn color(self) -> Color {
        match self {
            Feedback::Success => Color::GREEN,
            Feedback::Failure => Color::RED,
        }
    }
}

/// Publish four light colors, ordered bottom-left, bottom-right, top-right, top-left.
pub fn publish_raw_lights(
    bus: &dyn Bus,
    badge_id: &ActorId,
    lights: [Color; LIGHT_SLOTS],
) -> Result<(), ServiceError> {
    bus.publish(&topics::lights_static(badge_id), lights_command(lights))?;
    Ok(())
}

/// Publish the actor's own lights, scaled by its brightness.
pub fn publish_lights(bus: &dyn Bus, actor: &Actor) -> Result<(), ServiceError> {
    publish_raw_lights(bus, &actor.id, actor.rendered_lights())
}

pub fn publish_text(
    bus: &dyn Bus,
    badge_id: &ActorId,
    command: &TextCommand,
) -> Result<(), ServiceError> {
    bus.publish(&topics::text(badge_id), command.into())?;
    Ok(())
}

/// Lights shown at a progress tick: `lit` slots done, the rest pending.
fn progress_lights(lit: usize) -> [Color; LIGHT_SLOTS] {
    std::array::from_fn(|slot| if slot < lit { PROGRESS_COLOR } else { PENDING_COLOR })
}

/// Publish `lights` for `badge_id` while `session` is still the live one.
///
/// Returns `false` without publishing once the badge has left or rejoined.
async fn publish_if_live(
    state: &SharedState,
    badge_id: &ActorId,
    session: Uuid,
    lights: Option<[Color; LIGHT_SLOTS]>,
) -> Result<bool, ServiceError> {
    let bus = state.bus().await?;
    let lock = state.population().lock(badge_id).await;
    match lock.actor() {
        Some(actor) if actor.session == session => {
            // `None` republishes the actor's own lights.
            publish_raw_lights(
                bus.as_ref(),
                badge_id,
                lights.unwrap_or_else(|| actor.rendered_lights()),
            )?;
            Ok(true)
        }
        _ => Ok(false),
    }
}

/// Flash the badge in the feedback color, then restore its lights.
///
/// Stops quietly if the session ends part way through.
pub async fn play_feedback(
    state: &SharedState,
    badge_id: &ActorId,
    session: Uuid,
    feedback: Feedback,
) -> Result<(), ServiceError> {
    let frames = [
        (feedback.color(), FLASH_ON),
        (Color::OFF, FLASH_OFF),
    ];
    for _ in 0..FLASHES {
        for (color, hold) in frames {
            if !publish_if_live(state, badge_id, session, Some([color; LIGHT_SLOTS])).await? {
                debug!(badge_id = %badge_id, ?feedback, "session ended; feedback stopped");
                return Ok(());
            }
            sleep(hold).await;
        }
    }
    publish_if_live(state, badge_id, session, None).await?;
    Ok(())
}

/// Fill the lights while `button` is held for `press`.
///
/// Stops quietly once the hold ends (the release plays its own feedback) and
/// flashes failure when sampling falls behind the hold window.
pub async fn run_progress(
    state: &SharedState,
    badge_id: &ActorId,
    session: Uuid,
    button: Button,
    press: u64,
    plan: ProgressPlan,
) -> Result<(), ServiceError> {
    let started = Instant::now();
    for tick in 1..=plan.ticks {
        sleep(plan.tick).await;

        let still_holding = {
            let lock = state.population().lock(badge_id).await;
            lock.actor().is_some_and(|actor| {
                actor.session == session && actor.timing(button).is_holding(press)
            })
        };
        if !still_holding {
            debug!(badge_id = %badge_id, %button, tick, "hold ended; progress stopped");
            return Ok(());
        }

        match plan.verdict(tick, started.elapsed()) {
            TickVerdict::Progress { lit } => {
                let bus = state.bus().await?;
                publish_raw_lights(bus.as_ref(), badge_id, progress_lights(lit))?;
            }
            TickVerdict::Overrun => {
                debug!(badge_id = %badge_id, %button, tick, "progress fell behind the hold window");
                return play_feedback(state, badge_id, session, Feedback::Failure).await;
            }
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn progress_lights_fill_from_the_first_slot() {
        assert_eq!(progress_lights(0), [PENDING_COLOR; LIGHT_SLOTS]);
        assert_eq!(
            progress_lights(2),
            [PROGRESS_COLOR, PROGRESS_COLOR, PENDING_COLOR, PENDING_COLOR]
        );
        assert_eq!(progress_lights(4), [PROGRESS_COLOR; LIGHT_SLOTS]);
    }
}
